//! Storage layer: a hierarchical tree of nodes, each of which may hold one
//! Arrow table and any number of named children.
//!
//! The whole tree lives in memory. It is persisted as a single image: a JSON
//! manifest describing the nodes followed by one Arrow IPC stream per table.
//! Individual tables can also be exported to / imported from Parquet.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{new_null_array, Array, ArrayRef, BooleanArray, UInt32Array, UInt64Array};
use arrow::compute::{concat, filter, take};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ExplogError, Result};
use crate::frame::{array_value, normalize_schema, Frame, INDEX_COLUMN};
use crate::models::{RowRange, Value};
use crate::predicate::Expr;

// ─── Paths ───────────────────────────────────────────────────────────────────

/// Splits a slash-separated path into its segments. Leading, trailing and
/// doubled slashes are ignored.
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|seg| {
            if seg.chars().any(char::is_whitespace) {
                Err(ExplogError::InvalidPath(format!(
                    "segment '{seg}' of '{path}' contains whitespace"
                )))
            } else {
                Ok(seg)
            }
        })
        .collect()
}

pub fn join_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        format!("/{name}")
    } else if parent.starts_with('/') {
        format!("{parent}/{name}")
    } else {
        format!("/{parent}/{name}")
    }
}

// ─── Tables ──────────────────────────────────────────────────────────────────

/// One table: its schema, the explicit row index and the column data.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    index: Vec<u64>,
    batch: RecordBatch,
}

impl Table {
    fn new(index: Vec<u64>, batch: RecordBatch) -> Result<Self> {
        if index.len() != batch.num_rows() {
            return Err(ExplogError::SchemaViolation(format!(
                "{} indices for {} rows",
                index.len(),
                batch.num_rows()
            )));
        }
        Ok(Self {
            schema: batch.schema(),
            index,
            batch,
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &[u64] {
        &self.index
    }

    /// One past the last row index; 0 for an empty table.
    pub fn next_index(&self) -> u64 {
        self.index.last().map_or(0, |i| i + 1)
    }

    fn check_columns<'a>(&self, columns: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for column in columns {
            if column != INDEX_COLUMN && self.schema.field_with_name(column).is_err() {
                return Err(ExplogError::SchemaViolation(format!(
                    "column '{column}' does not exist in the table"
                )));
            }
        }
        Ok(())
    }

    /// Physical positions of the rows inside `range` that satisfy `expr`.
    fn matching_rows(&self, expr: Option<&Expr>, range: RowRange) -> Result<Vec<usize>> {
        let (start, stop) = range.bounds(self.num_rows());
        let Some(expr) = expr else {
            return Ok((start..stop).collect());
        };

        let referenced = expr.columns();
        self.check_columns(referenced.iter().copied())?;
        let arrays: HashMap<&str, &ArrayRef> = referenced
            .iter()
            .filter_map(|name| self.batch.column_by_name(name).map(|a| (*name, a)))
            .collect();

        Ok((start..stop)
            .filter(|&row| {
                expr.eval(&|column: &str| {
                    if column == INDEX_COLUMN {
                        Value::Int(self.index[row] as i64)
                    } else {
                        arrays
                            .get(column)
                            .map_or(Value::Null, |a| array_value(a, row))
                    }
                })
            })
            .collect())
    }

    fn take_rows(&self, rows: &[usize], columns: Option<&[&str]>) -> Result<Frame> {
        let positions = UInt32Array::from(
            rows.iter()
                .map(|&r| u32::try_from(r))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| ExplogError::SchemaViolation("table too large".to_string()))?,
        );

        let selected: Vec<usize> = match columns {
            None => (0..self.schema.fields().len()).collect(),
            Some(names) => {
                self.check_columns(names.iter().copied())?;
                names
                    .iter()
                    .filter(|n| **n != INDEX_COLUMN)
                    .filter_map(|n| self.schema.index_of(n).ok())
                    .collect()
            }
        };

        let fields: Vec<Field> = selected
            .iter()
            .map(|&i| self.schema.field(i).clone())
            .collect();
        let arrays = selected
            .iter()
            .map(|&i| take(self.batch.column(i).as_ref(), &positions, None))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
        let batch =
            RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;
        let index = rows.iter().map(|&r| self.index[r]).collect();
        Frame::new(index, batch)
    }

    /// Reorders the columns of `batch` to this table's schema, or reports how
    /// the two schemas differ.
    fn align(&self, batch: &RecordBatch) -> Result<Vec<ArrayRef>> {
        let incoming = batch.schema();
        let expected: Vec<&str> = self.schema.fields().iter().map(|f| f.name().as_str()).collect();
        let got: Vec<&str> = incoming.fields().iter().map(|f| f.name().as_str()).collect();
        if expected.len() != got.len() {
            return Err(ExplogError::SchemaViolation(format!(
                "table has columns {expected:?}, data has {got:?}"
            )));
        }

        let mut columns = Vec::with_capacity(expected.len());
        for field in self.schema.fields() {
            let Some((i, f)) = incoming.column_with_name(field.name()) else {
                return Err(ExplogError::SchemaViolation(format!(
                    "table has columns {expected:?}, data has {got:?}"
                )));
            };
            if f.data_type() == field.data_type() {
                columns.push(batch.column(i).clone());
            } else if f.data_type() == &DataType::Null {
                columns.push(new_null_array(field.data_type(), batch.num_rows()));
            } else {
                return Err(ExplogError::SchemaViolation(format!(
                    "column '{}' is {} in the table but {} in the data",
                    field.name(),
                    field.data_type(),
                    f.data_type()
                )));
            }
        }
        Ok(columns)
    }

    fn append(&mut self, index: Vec<u64>, batch: &RecordBatch) -> Result<()> {
        let incoming = self.align(batch)?;
        let arrays = self
            .batch
            .columns()
            .iter()
            .zip(&incoming)
            .map(|(old, new)| concat(&[old.as_ref(), new.as_ref()]))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let rows = self.num_rows() + batch.num_rows();
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        let merged = RecordBatch::try_new_with_options(self.schema.clone(), arrays, &options)?;

        self.batch = merged;
        self.index.extend(index);
        Ok(())
    }

    fn remove_rows(&mut self, rows: &[usize]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut keep = vec![true; self.num_rows()];
        for &r in rows {
            keep[r] = false;
        }
        let mask = BooleanArray::from(keep.clone());
        let arrays = self
            .batch
            .columns()
            .iter()
            .map(|col| filter(col.as_ref(), &mask))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let remaining = self.num_rows() - rows.len();
        let options = RecordBatchOptions::new().with_row_count(Some(remaining));
        self.batch = RecordBatch::try_new_with_options(self.schema.clone(), arrays, &options)?;
        let mut flags = keep.into_iter();
        self.index.retain(|_| flags.next().unwrap_or(false));
        Ok(rows.len())
    }

    /// The table as one batch with the index as leading `UInt64` column.
    fn with_index_column(&self) -> Result<RecordBatch> {
        let mut fields = vec![Field::new(INDEX_COLUMN, DataType::UInt64, false)];
        fields.extend(self.schema.fields().iter().map(|f| f.as_ref().clone()));
        let mut arrays: Vec<ArrayRef> = vec![Arc::new(UInt64Array::from(self.index.clone()))];
        arrays.extend(self.batch.columns().iter().cloned());
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }

    fn from_index_column(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let index = match schema.fields().first() {
            Some(f) if f.name() == INDEX_COLUMN && f.data_type() == &DataType::UInt64 => batch
                .column(0)
                .as_any()
                .downcast_ref::<UInt64Array>()
                .map(|a| a.values().to_vec())
                .ok_or_else(|| ExplogError::CorruptImage("unreadable index column".into()))?,
            _ => {
                return Err(ExplogError::CorruptImage(
                    "table is missing its index column".into(),
                ))
            }
        };
        let data_fields: Vec<Field> = schema.fields()[1..]
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
        let data = RecordBatch::try_new_with_options(
            normalize_schema(&Schema::new(data_fields)),
            batch.columns()[1..].to_vec(),
            &options,
        )?;
        Table::new(index, data)
    }
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

/// A node of the tree. A node without a table is a pure grouping node.
#[derive(Debug, Clone, Default)]
pub struct Node {
    table: Option<Table>,
    children: BTreeMap<String, Node>,
}

impl Node {
    pub fn is_table(&self) -> bool {
        self.table.is_some()
    }

    pub fn child_names(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    fn walk<'a>(&'a self, path: String, out: &mut Vec<(String, &'a Node)>) {
        for (name, child) in &self.children {
            let child_path = format!("{path}/{name}");
            out.push((child_path.clone(), child));
            child.walk(child_path, out);
        }
    }
}

// ─── Image format ────────────────────────────────────────────────────────────

const MAGIC: &[u8; 8] = b"EXPLOG\x00\x01";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ImageManifest {
    format_version: u32,
    written_at: DateTime<Utc>,
    nodes: Vec<NodeEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeEntry {
    path: String,
    table: Option<TableEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableEntry {
    offset: u64,
    len: u64,
}

fn encode_table(table: &Table) -> Result<Vec<u8>> {
    let batch = table.with_index_column()?;
    let mut writer = StreamWriter::try_new(Vec::new(), &batch.schema())?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(writer.into_inner()?)
}

fn decode_table(bytes: &[u8]) -> Result<Table> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();
    let mut batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    let batch = match batches.len() {
        0 => RecordBatch::new_empty(schema),
        1 => batches.remove(0),
        _ => arrow::compute::concat_batches(&schema, &batches)?,
    };
    Table::from_index_column(&batch)
}

// ─── Parquet I/O ─────────────────────────────────────────────────────────────

pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<RecordBatch> {
    let file = fs::File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;
    let mut batches = vec![];
    for batch in reader {
        batches.push(batch?);
    }
    match batches.len() {
        0 => Ok(RecordBatch::new_empty(schema)),
        1 => Ok(batches.remove(0)),
        _ => Ok(arrow::compute::concat_batches(&schema, &batches)?),
    }
}

// ─── PathStore ───────────────────────────────────────────────────────────────

/// The hierarchical table container, optionally backed by an image file.
#[derive(Debug, Default)]
pub struct PathStore {
    root: Node,
    backing: Option<PathBuf>,
}

impl PathStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the image file at `path`, creating it if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let existed = path.exists();
        let mut store = if existed {
            Self::from_image(&fs::read(&path)?)?
        } else {
            Self::in_memory()
        };
        store.backing = Some(path);
        if !existed {
            store.flush()?;
        }
        info!(path = ?store.backing, existed, "store opened");
        Ok(store)
    }

    pub fn backing_file(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    /// Points later flushes at `path` without reading it.
    pub fn set_backing_file(&mut self, path: impl Into<PathBuf>) {
        self.backing = Some(path.into());
    }

    // ─── navigation ──────────────────────────────────────────────────────

    pub fn get_node(&self, path: &str) -> Result<Option<&Node>> {
        let mut node = &self.root;
        for seg in split_path(path)? {
            match node.children.get(seg) {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    fn get_node_mut(&mut self, path: &str) -> Result<Option<&mut Node>> {
        let mut node = &mut self.root;
        for seg in split_path(path)? {
            match node.children.get_mut(seg) {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    fn node_or_create(&mut self, segments: &[&str]) -> &mut Node {
        let mut node = &mut self.root;
        for seg in segments {
            node = node.children.entry((*seg).to_string()).or_default();
        }
        node
    }

    fn table(&self, path: &str) -> Result<&Table> {
        match self.get_node(path)? {
            None => Err(ExplogError::NotFound(format!("No node at path '{path}'."))),
            Some(node) => node
                .table
                .as_ref()
                .ok_or_else(|| ExplogError::TypeMismatch(format!("Node '{path}' is not a table."))),
        }
    }

    fn table_mut(&mut self, path: &str) -> Result<&mut Table> {
        match self.get_node_mut(path)? {
            None => Err(ExplogError::NotFound(format!("No node at path '{path}'."))),
            Some(node) => node
                .table
                .as_mut()
                .ok_or_else(|| ExplogError::TypeMismatch(format!("Node '{path}' is not a table."))),
        }
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.get_node(path)?.is_some())
    }

    pub fn is_table(&self, path: &str) -> Result<bool> {
        Ok(self.get_node(path)?.is_some_and(Node::is_table))
    }

    /// Whether `path` is a table with at least one row matching `expr`.
    /// An absent node is simply `false`.
    pub fn exists_where(&self, path: &str, expr: Option<&Expr>) -> Result<bool> {
        if !self.exists(path)? {
            return Ok(false);
        }
        let table = self.table(path)?;
        Ok(!table.matching_rows(expr, RowRange::ALL)?.is_empty())
    }

    pub fn children(&self, path: &str) -> Result<Option<Vec<String>>> {
        Ok(self.get_node(path)?.map(Node::child_names))
    }

    pub fn nrows(&self, path: &str) -> Result<usize> {
        Ok(self.table(path)?.num_rows())
    }

    /// First index an append to `path` would assign; 0 for an absent node.
    pub fn next_index(&self, path: &str) -> Result<u64> {
        if !self.exists(path)? {
            return Ok(0);
        }
        Ok(self.table(path)?.next_index())
    }

    // ─── reads ───────────────────────────────────────────────────────────

    pub fn select(
        &self,
        path: &str,
        expr: Option<&Expr>,
        range: RowRange,
        columns: Option<&[&str]>,
    ) -> Result<Frame> {
        let table = self.table(path)?;
        let rows = table.matching_rows(expr, range)?;
        table.take_rows(&rows, columns)
    }

    // ─── writes ──────────────────────────────────────────────────────────

    fn writable_segments<'a>(&self, path: &'a str) -> Result<Vec<&'a str>> {
        let segments = split_path(path)?;
        if segments.is_empty() {
            return Err(ExplogError::InvalidPath(
                "the root node cannot hold a table".to_string(),
            ));
        }
        if let Some(node) = self.get_node(path)? {
            if !node.is_table() {
                return Err(ExplogError::TypeMismatch(format!(
                    "Node '{path}' exists and is not a table."
                )));
            }
        }
        Ok(segments)
    }

    /// Creates or replaces the table at `path`. Children of the node are kept.
    pub fn put(&mut self, path: &str, index: Vec<u64>, batch: RecordBatch) -> Result<()> {
        let segments = self.writable_segments(path)?;
        let table = Table::new(index, batch)?;
        debug!(path, rows = table.num_rows(), "put table");
        self.node_or_create(&segments).table = Some(table);
        Ok(())
    }

    /// Appends rows; creates the table if `path` is absent.
    pub fn append(&mut self, path: &str, index: Vec<u64>, batch: RecordBatch) -> Result<()> {
        let segments = self.writable_segments(path)?;
        if index.len() != batch.num_rows() {
            return Err(ExplogError::SchemaViolation(format!(
                "{} indices for {} rows",
                index.len(),
                batch.num_rows()
            )));
        }
        debug!(path, rows = batch.num_rows(), "append rows");
        let node = self.node_or_create(&segments);
        match node.table.as_mut() {
            Some(table) => table.append(index, &batch),
            None => {
                node.table = Some(Table::new(index, batch)?);
                Ok(())
            }
        }
    }

    /// Removes the node at `path` with its whole subtree when neither a
    /// predicate nor a row window is given; otherwise removes matching rows.
    /// Returns the number of table rows removed.
    pub fn remove(&mut self, path: &str, expr: Option<&Expr>, range: RowRange) -> Result<usize> {
        if expr.is_none() && range.is_full() {
            let segments = split_path(path)?;
            let Some((name, parent)) = segments.split_last() else {
                return Err(ExplogError::InvalidPath(
                    "the root node cannot be removed".to_string(),
                ));
            };
            let removed = self
                .get_node_mut(&parent.join("/"))?
                .and_then(|p| p.children.remove(*name))
                .ok_or_else(|| ExplogError::NotFound(format!("No node at path '{path}'.")))?;
            debug!(path, "removed node");
            return Ok(removed.table.map_or(0, |t| t.num_rows()));
        }

        let table = self.table_mut(path)?;
        let rows = table.matching_rows(expr, range)?;
        let removed = table.remove_rows(&rows)?;
        debug!(path, removed, "removed rows");
        Ok(removed)
    }

    /// Adds an empty grouping node `name` under the existing node `parent`.
    pub fn add_group(&mut self, parent: &str, name: &str) -> Result<String> {
        let name_segments = split_path(name)?;
        if name_segments.len() != 1 {
            return Err(ExplogError::InvalidPath(format!(
                "'{name}' is not a single node name"
            )));
        }
        let full = join_path(parent, name_segments[0]);
        let node = self
            .get_node_mut(parent)?
            .ok_or_else(|| ExplogError::NotFound(format!("No node at path '{parent}'.")))?;
        if node.children.contains_key(name_segments[0]) {
            return Err(ExplogError::Conflict(format!("Node '{full}' already exists.")));
        }
        node.children
            .insert(name_segments[0].to_string(), Node::default());
        Ok(full)
    }

    // ─── image ───────────────────────────────────────────────────────────

    /// Serializes the whole tree.
    pub fn image(&self) -> Result<Vec<u8>> {
        let mut nodes = Vec::new();
        self.root.walk(String::new(), &mut nodes);

        let mut blobs: Vec<u8> = Vec::new();
        let mut entries = Vec::with_capacity(nodes.len());
        for (path, node) in nodes {
            let table = match &node.table {
                Some(t) => {
                    let bytes = encode_table(t)?;
                    let entry = TableEntry {
                        offset: blobs.len() as u64,
                        len: bytes.len() as u64,
                    };
                    blobs.extend_from_slice(&bytes);
                    Some(entry)
                }
                None => None,
            };
            entries.push(NodeEntry { path, table });
        }

        let manifest = serde_json::to_vec(&ImageManifest {
            format_version: FORMAT_VERSION,
            written_at: Utc::now(),
            nodes: entries,
        })?;

        let mut out = Vec::with_capacity(16 + manifest.len() + blobs.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(manifest.len() as u64).to_le_bytes());
        out.extend_from_slice(&manifest);
        out.extend_from_slice(&blobs);
        Ok(out)
    }

    /// Rebuilds a tree from [`PathStore::image`] output.
    pub fn from_image(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 16 || &bytes[..8] != MAGIC {
            return Err(ExplogError::CorruptImage("bad magic header".to_string()));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[8..16]);
        let manifest_len = usize::try_from(u64::from_le_bytes(len_bytes))
            .map_err(|_| ExplogError::CorruptImage("manifest too large".to_string()))?;
        let manifest_end = 16usize
            .checked_add(manifest_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| ExplogError::CorruptImage("truncated manifest".to_string()))?;
        let manifest: ImageManifest = serde_json::from_slice(&bytes[16..manifest_end])
            .map_err(|e| ExplogError::CorruptImage(format!("unreadable manifest: {e}")))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(ExplogError::CorruptImage(format!(
                "unsupported format version {}",
                manifest.format_version
            )));
        }

        let blobs = &bytes[manifest_end..];
        let mut store = Self::in_memory();
        for entry in manifest.nodes {
            let segments = split_path(&entry.path)?;
            let node = store.node_or_create(&segments);
            if let Some(t) = entry.table {
                let start = usize::try_from(t.offset).ok();
                let end = start
                    .zip(usize::try_from(t.len).ok())
                    .and_then(|(s, l)| s.checked_add(l));
                let blob = match (start, end) {
                    (Some(s), Some(e)) if e <= blobs.len() => &blobs[s..e],
                    _ => {
                        return Err(ExplogError::CorruptImage(format!(
                            "table data of '{}' is out of bounds",
                            entry.path
                        )))
                    }
                };
                let table = decode_table(blob).map_err(|e| match e {
                    ExplogError::Arrow(e) => ExplogError::CorruptImage(format!(
                        "table data of '{}' is unreadable: {e}",
                        entry.path
                    )),
                    other => other,
                })?;
                node.table = Some(table);
            }
        }
        Ok(store)
    }

    /// Writes the image to the backing file, if any.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.backing else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let image = self.image()?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &image)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), bytes = image.len(), "image flushed");
        Ok(())
    }

    // ─── parquet exchange ────────────────────────────────────────────────

    /// Writes the table at `path` (with its index column) to a Parquet file.
    pub fn export_parquet(&self, path: &str, file: &Path) -> Result<usize> {
        let table = self.table(path)?;
        write_parquet(file, &table.with_index_column()?)?;
        Ok(table.num_rows())
    }
}
