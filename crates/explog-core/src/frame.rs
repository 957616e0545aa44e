//! Tabular data going in and out of the store.
//!
//! Tables are Arrow [`RecordBatch`]es plus an explicit row index kept beside
//! them. Helpers here turn row-oriented [`Value`]s into batches and back.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, LargeStringArray, StringArray, UInt16Array, UInt32Array,
    UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::display::array_value_to_string;

use crate::error::{ExplogError, Result};
use crate::models::{Fields, Value};

/// Name of the row-index pseudo-column; user data may not use it.
pub const INDEX_COLUMN: &str = "index";

/// Rows selected from a table: their indices and the projected columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: Vec<u64>,
    batch: RecordBatch,
}

impl Frame {
    pub fn new(index: Vec<u64>, batch: RecordBatch) -> Result<Self> {
        if index.len() != batch.num_rows() {
            return Err(ExplogError::SchemaViolation(format!(
                "index has {} entries but the batch has {} rows",
                index.len(),
                batch.num_rows()
            )));
        }
        Ok(Self { index, batch })
    }

    pub fn index(&self) -> &[u64] {
        &self.index
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Cell at physical row `row` of column `column`.
    pub fn value(&self, row: usize, column: &str) -> Option<Value> {
        if row >= self.num_rows() {
            return None;
        }
        if column == INDEX_COLUMN {
            return Some(Value::Int(self.index[row] as i64));
        }
        let col = self.batch.column_by_name(column)?;
        Some(array_value(col, row))
    }

    /// Row-major copy of the data columns.
    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        (0..self.num_rows())
            .map(|row| {
                self.batch
                    .columns()
                    .iter()
                    .map(|col| array_value(col, row))
                    .collect()
            })
            .collect()
    }
}

/// Data handed to `add_data`: a batch, or a single row given as a mapping.
#[derive(Debug, Clone)]
pub enum TableData {
    Batch(RecordBatch),
    Row(Fields),
}

impl TableData {
    pub fn into_batch(self) -> Result<RecordBatch> {
        let batch = match self {
            TableData::Batch(batch) => batch,
            TableData::Row(fields) => batch_from_fields(std::slice::from_ref(&fields))?,
        };
        if batch.schema().field_with_name(INDEX_COLUMN).is_ok() {
            return Err(ExplogError::SchemaViolation(format!(
                "column name '{INDEX_COLUMN}' is reserved for the row index"
            )));
        }
        Ok(normalize_batch(&batch)?)
    }
}

impl From<RecordBatch> for TableData {
    fn from(b: RecordBatch) -> Self {
        TableData::Batch(b)
    }
}
impl From<Fields> for TableData {
    fn from(f: Fields) -> Self {
        TableData::Row(f)
    }
}
impl From<Frame> for TableData {
    fn from(f: Frame) -> Self {
        TableData::Batch(f.batch)
    }
}

/// Build a batch from named columns and row-major values.
///
/// Column types come from the first non-null value in each column; integer
/// and float values mixed in one column are stored as Float64.
pub fn batch_from_rows<S: AsRef<str>>(columns: &[S], rows: &[Vec<Value>]) -> Result<RecordBatch> {
    for (i, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(ExplogError::SchemaViolation(format!(
                "row {i} has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
    }

    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
    for (c, name) in columns.iter().enumerate() {
        let name = name.as_ref();
        let values: Vec<&Value> = rows.iter().map(|r| &r[c]).collect();
        let data_type = infer_type(name, &values)?;
        arrays.push(values_to_array(&data_type, &values));
        fields.push(Field::new(name, data_type, true));
    }

    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &options,
    )?)
}

/// Build a batch from row maps; the column set is the union of all keys and
/// missing entries are null.
pub fn batch_from_fields(rows: &[Fields]) -> Result<RecordBatch> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }
    let values: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| {
            names
                .iter()
                .map(|n| row.get(n).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    batch_from_rows(&names, &values)
}

fn infer_type(column: &str, values: &[&Value]) -> Result<DataType> {
    let mut data_type = DataType::Null;
    for value in values {
        let t = match value {
            Value::Null => continue,
            Value::Bool(_) => DataType::Boolean,
            Value::Int(_) => DataType::Int64,
            Value::Float(_) => DataType::Float64,
            Value::Text(_) => DataType::Utf8,
        };
        data_type = match (&data_type, &t) {
            (DataType::Null, _) => t.clone(),
            (a, b) if a == b => t.clone(),
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                DataType::Float64
            }
            (a, b) => {
                return Err(ExplogError::SchemaViolation(format!(
                    "column '{column}' mixes {a} and {b} values"
                )))
            }
        };
    }
    Ok(data_type)
}

fn values_to_array(data_type: &DataType, values: &[&Value]) -> ArrayRef {
    match data_type {
        DataType::Boolean => Arc::new(BooleanArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Int64 => Arc::new(Int64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Float(f) => Some(*f),
                    Value::Int(i) => Some(*i as f64),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Utf8 => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Text(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        other => new_null_array(other, values.len()),
    }
}

/// Reads one cell as a [`Value`].
pub fn array_value(array: &ArrayRef, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    let any = array.as_any();
    macro_rules! int_cell {
        ($t:ty) => {
            if let Some(a) = any.downcast_ref::<$t>() {
                return Value::Int(a.value(row) as i64);
            }
        };
    }
    int_cell!(Int64Array);
    int_cell!(Int32Array);
    int_cell!(Int16Array);
    int_cell!(Int8Array);
    int_cell!(UInt32Array);
    int_cell!(UInt16Array);
    int_cell!(UInt8Array);
    if let Some(a) = any.downcast_ref::<UInt64Array>() {
        return i64::try_from(a.value(row))
            .map(Value::Int)
            .unwrap_or(Value::Float(a.value(row) as f64));
    }
    if let Some(a) = any.downcast_ref::<Float64Array>() {
        return Value::Float(a.value(row));
    }
    if let Some(a) = any.downcast_ref::<Float32Array>() {
        return Value::Float(a.value(row) as f64);
    }
    if let Some(a) = any.downcast_ref::<BooleanArray>() {
        return Value::Bool(a.value(row));
    }
    if let Some(a) = any.downcast_ref::<StringArray>() {
        return Value::Text(a.value(row).to_string());
    }
    if let Some(a) = any.downcast_ref::<LargeStringArray>() {
        return Value::Text(a.value(row).to_string());
    }
    array_value_to_string(array, row)
        .map(Value::Text)
        .unwrap_or(Value::Null)
}

/// Strips metadata and marks every field nullable, so that schemas compare
/// on column names and types only.
pub fn normalize_schema(schema: &Schema) -> SchemaRef {
    Arc::new(Schema::new(
        schema
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), f.data_type().clone(), true))
            .collect::<Vec<_>>(),
    ))
}

fn normalize_batch(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = normalize_schema(&batch.schema());
    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        schema,
        batch.columns().to_vec(),
        &options,
    )?)
}

/// Result tables of one configuration, keyed by result name.
pub type ResultSet = BTreeMap<String, Frame>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_infer_types_and_widen_ints() {
        let batch = batch_from_rows(
            &["a", "b", "c"],
            &[
                vec![Value::Int(1), Value::Float(0.5), Value::from("x")],
                vec![Value::Float(2.5), Value::Null, Value::from("y")],
            ],
        )
        .unwrap();
        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Float64);
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(schema.field(2).data_type(), &DataType::Utf8);
        assert_eq!(batch.num_rows(), 2);
    }

    #[test]
    fn mixed_text_and_int_is_rejected() {
        let err = batch_from_rows(&["a"], &[vec![Value::Int(1)], vec![Value::from("x")]]);
        assert!(matches!(err, Err(ExplogError::SchemaViolation(_))));
    }

    #[test]
    fn reserved_index_column_is_rejected() {
        let mut row = Fields::new();
        row.insert("index".into(), Value::Int(3));
        assert!(matches!(
            TableData::Row(row).into_batch(),
            Err(ExplogError::SchemaViolation(_))
        ));
    }

    #[test]
    fn frame_reads_cells_and_index() {
        let batch = batch_from_rows(&["p"], &[vec![Value::Int(7)], vec![Value::Int(8)]]).unwrap();
        let frame = Frame::new(vec![4, 9], batch).unwrap();
        assert_eq!(frame.value(1, "p"), Some(Value::Int(8)));
        assert_eq!(frame.value(1, "index"), Some(Value::Int(9)));
        assert_eq!(frame.value(2, "p"), None);
        assert_eq!(frame.to_rows(), vec![vec![Value::Int(7)], vec![Value::Int(8)]]);
    }
}
