//! `ExperimentLog`: the owned handle over a [`PathStore`].
//!
//! Holds the store, applies the table write policies and, for file-backed
//! logs, rewrites the image after each mutating call. Configuration
//! resolution and the result tree are implemented on the same type in
//! [`crate::resolve`] and [`crate::results`].

use std::ops::Range;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::LogConfig;
use crate::error::{ExplogError, Result};
use crate::frame::{Frame, TableData, INDEX_COLUMN};
use crate::models::{AddMode, RowRange};
use crate::predicate::Expr;
use crate::specifier::Specifier;
use crate::store::{join_path, read_parquet, PathStore};

/// Compiles a specifier into a parsed predicate; `None` selects every row.
pub(crate) fn compile(conf: &Specifier) -> Result<Option<Expr>> {
    match conf.to_where()? {
        None => Ok(None),
        Some(w) => Expr::parse(&w),
    }
}

pub struct ExperimentLog {
    store: Option<PathStore>,
    config: LogConfig,
}

impl ExperimentLog {
    /// Opens (or creates) a file-backed log with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(LogConfig::new(path.as_ref()), None)
    }

    pub fn in_memory() -> Self {
        Self {
            store: Some(PathStore::in_memory()),
            config: LogConfig::in_memory(),
        }
    }

    /// Rebuilds an in-memory log from bytes produced by [`ExperimentLog::image`].
    pub fn from_image(bytes: &[u8]) -> Result<Self> {
        Self::with_config(LogConfig::in_memory(), Some(bytes))
    }

    /// Creates a log from `config`. When `image` is given it seeds the
    /// store, replacing whatever the configured file held.
    pub fn with_config(config: LogConfig, image: Option<&[u8]>) -> Result<Self> {
        let store = match (image, &config.path) {
            (Some(bytes), path) => {
                let mut store = PathStore::from_image(bytes)?;
                if let Some(p) = path {
                    store.set_backing_file(p);
                    store.flush()?;
                }
                store
            }
            (None, Some(path)) => PathStore::open(path)?,
            (None, None) => PathStore::in_memory(),
        };
        Ok(Self {
            store: Some(store),
            config,
        })
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_none()
    }

    pub fn store(&self) -> Result<&PathStore> {
        self.store.as_ref().ok_or(ExplogError::StoreClosed)
    }

    pub(crate) fn store_mut(&mut self) -> Result<&mut PathStore> {
        self.store.as_mut().ok_or(ExplogError::StoreClosed)
    }

    /// Serialized image of the whole store.
    pub fn image(&self) -> Result<Vec<u8>> {
        self.store()?.image()
    }

    /// Writes the image to the backing file; a no-op for in-memory logs.
    pub fn flush(&self) -> Result<()> {
        self.store()?.flush()
    }

    pub(crate) fn commit(&self) -> Result<()> {
        if self.config.autoflush {
            self.flush()?;
        }
        Ok(())
    }

    /// Flushes and releases the store. Later calls fail with
    /// [`ExplogError::StoreClosed`]; closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(store) = self.store.take() {
            store.flush()?;
            info!(path = ?store.backing_file(), "experiment log closed");
        }
        Ok(())
    }

    /// Path of the result folder of configuration row `index`.
    pub fn conf_path(&self, folder: &str, index: u64) -> String {
        join_path(folder, &format!("{}{index}", self.config.conf_prefix))
    }

    // ─── queries ─────────────────────────────────────────────────────────

    pub fn exists(&self, path: &str) -> Result<bool> {
        self.store()?.exists(path)
    }

    /// With a match-all specifier this is [`ExperimentLog::exists`];
    /// otherwise `path` must be a table with at least one matching row.
    pub fn exists_where(&self, path: &str, conf: &Specifier) -> Result<bool> {
        match compile(&conf.normalized())? {
            None => self.exists(path),
            Some(expr) => self.store()?.exists_where(path, Some(&expr)),
        }
    }

    /// Whether `folder` holds a configuration matching `conf`.
    pub fn has_entry(&self, folder: &str, conf: &Specifier) -> Result<bool> {
        self.exists_where(folder, conf)
    }

    /// Names of the children of `path`, or `None` if it does not exist.
    pub fn get_keys(&self, path: &str) -> Result<Option<Vec<String>>> {
        self.store()?.children(path)
    }

    pub fn num_rows(&self, path: &str) -> Result<usize> {
        self.store()?.nrows(path)
    }

    pub fn select(
        &self,
        path: &str,
        conf: &Specifier,
        range: RowRange,
        columns: Option<&[&str]>,
    ) -> Result<Frame> {
        let expr = compile(conf)?;
        self.store()?.select(path, expr.as_ref(), range, columns)
    }

    // ─── mutations ───────────────────────────────────────────────────────

    /// Writes `data` to the table at `path` and returns the row indices it
    /// was given. Any index the caller attached is discarded.
    pub fn add_data(
        &mut self,
        path: &str,
        data: impl Into<TableData>,
        mode: AddMode,
    ) -> Result<Range<u64>> {
        let assigned = self.write_table(path, data.into(), mode)?;
        self.commit()?;
        Ok(assigned)
    }

    pub(crate) fn write_table(
        &mut self,
        path: &str,
        data: TableData,
        mode: AddMode,
    ) -> Result<Range<u64>> {
        let batch = data.into_batch()?;
        let rows = batch.num_rows() as u64;
        let store = self.store_mut()?;
        let start = match mode {
            AddMode::Replace => 0,
            AddMode::Append | AddMode::Exception => store.next_index(path)?,
        };
        let index: Vec<u64> = (start..start + rows).collect();
        match mode {
            AddMode::Replace => store.put(path, index, batch)?,
            AddMode::Append => store.append(path, index, batch)?,
            AddMode::Exception => {
                if store.exists(path)? {
                    return Err(ExplogError::Conflict(format!(
                        "Node '{path}' already exists."
                    )));
                }
                store.put(path, index, batch)?
            }
        }
        debug!(path, %mode, start, rows, "table written");
        Ok(start..start + rows)
    }

    /// Removes matching rows of the table at `path`, or the whole node with
    /// its subtree for a match-all specifier over the full row range.
    pub fn remove(&mut self, path: &str, conf: &Specifier, range: RowRange) -> Result<usize> {
        let expr = compile(&conf.normalized())?;
        let removed = self.store_mut()?.remove(path, expr.as_ref(), range)?;
        self.commit()?;
        Ok(removed)
    }

    /// Creates the empty folder `name` under `parent`.
    pub fn add_folder(&mut self, parent: &str, name: &str) -> Result<String> {
        let path = self.store_mut()?.add_group(parent, name)?;
        self.commit()?;
        info!(path = %path, "folder added");
        Ok(path)
    }

    // ─── parquet exchange ────────────────────────────────────────────────

    /// Exports the table at `path` to a Parquet file; returns the row count.
    pub fn export_parquet(&self, path: &str, file: &Path) -> Result<usize> {
        let rows = self.store()?.export_parquet(path, file)?;
        info!(path, file = %file.display(), rows, "table exported");
        Ok(rows)
    }

    /// Writes the rows of a Parquet file to `path`. An `index` column in the
    /// file is dropped and fresh indices are assigned.
    pub fn import_parquet(&mut self, file: &Path, path: &str, mode: AddMode) -> Result<Range<u64>> {
        let mut batch = read_parquet(file)?;
        if let Ok(i) = batch.schema().index_of(INDEX_COLUMN) {
            batch.remove_column(i);
        }
        let assigned = self.add_data(path, batch, mode)?;
        info!(path, file = %file.display(), rows = assigned.end - assigned.start, "table imported");
        Ok(assigned)
    }
}

impl Drop for ExperimentLog {
    fn drop(&mut self) {
        // Best-effort flush of a file-backed log that was never closed
        if let Some(store) = self.store.take() {
            if store.backing_file().is_some() {
                if let Err(e) = store.flush() {
                    warn!(error = %e, "failed to flush experiment log on drop");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{fields, Value};

    #[test]
    fn add_modes_assign_indices() {
        let mut log = ExperimentLog::in_memory();
        let r = log
            .add_data("t", fields([("a", 1)]), AddMode::Append)
            .unwrap();
        assert_eq!(r, 0..1);
        let r = log
            .add_data("t", fields([("a", 2)]), AddMode::Append)
            .unwrap();
        assert_eq!(r, 1..2);
        assert!(matches!(
            log.add_data("t", fields([("a", 3)]), AddMode::Exception),
            Err(ExplogError::Conflict(_))
        ));
        let r = log
            .add_data("t", fields([("a", 9)]), AddMode::Replace)
            .unwrap();
        assert_eq!(r, 0..1);
        let f = log.select("t", &Specifier::All, RowRange::ALL, None).unwrap();
        assert_eq!(f.to_rows(), vec![vec![Value::Int(9)]]);
    }

    #[test]
    fn match_all_remove_with_window_keeps_node() {
        let mut log = ExperimentLog::in_memory();
        for a in 0..4 {
            log.add_data("t", fields([("a", a)]), AddMode::Append).unwrap();
        }
        assert_eq!(log.remove("t", &Specifier::All, RowRange::from(1..3)).unwrap(), 2);
        assert_eq!(log.num_rows("t").unwrap(), 2);
        assert_eq!(log.remove("t", &Specifier::All, RowRange::ALL).unwrap(), 2);
        assert!(!log.exists("t").unwrap());
    }

    #[test]
    fn empty_mapping_means_every_row() {
        let mut log = ExperimentLog::in_memory();
        log.add_data("t", fields([("a", 1)]), AddMode::Append).unwrap();
        let empty = Specifier::Fields(Default::default());
        assert!(log.exists_where("t", &empty).unwrap());
        assert!(!log.exists_where("missing", &empty).unwrap());
        assert_eq!(log.select("t", &empty, RowRange::ALL, None).unwrap().num_rows(), 1);
        assert_eq!(log.remove("t", &empty, RowRange::ALL).unwrap(), 1);
        assert!(!log.exists("t").unwrap());
    }

    #[test]
    fn closed_log_rejects_calls() {
        let mut log = ExperimentLog::in_memory();
        log.close().unwrap();
        log.close().unwrap();
        assert!(matches!(log.exists("x"), Err(ExplogError::StoreClosed)));
        assert!(matches!(
            log.add_data("t", fields([("a", 1)]), AddMode::Append),
            Err(ExplogError::StoreClosed)
        ));
    }
}
