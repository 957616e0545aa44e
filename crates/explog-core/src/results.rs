//! The result tree: named result tables stored under one folder per
//! configuration row (`<folder>/conf_<i>/<key>`).

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::error::{ExplogError, Result};
use crate::frame::{ResultSet, TableData, INDEX_COLUMN};
use crate::log::ExperimentLog;
use crate::models::{AddMode, KeySelector, Nested, ResultsMode, RowRange, Value};
use crate::predicate::Expr;
use crate::resolve::ResolveOptions;
use crate::specifier::Specifier;
use crate::store::{join_path, split_path};

/// Result tables of one configuration, keyed by result name.
pub type ResultMap = BTreeMap<String, TableData>;

/// Results handed to [`ExperimentLog::add_results`].
#[derive(Debug, Clone)]
pub enum Results {
    /// Written to every resolved configuration.
    Shared(ResultMap),
    /// One entry per resolved configuration, in resolution order.
    PerConf(Vec<ResultMap>),
}

impl Results {
    fn maps(&self) -> Vec<&ResultMap> {
        match self {
            Results::Shared(map) => vec![map],
            Results::PerConf(list) => list.iter().collect(),
        }
    }
}

impl From<ResultMap> for Results {
    fn from(map: ResultMap) -> Self {
        Results::Shared(map)
    }
}
impl From<Vec<ResultMap>> for Results {
    fn from(list: Vec<ResultMap>) -> Self {
        Results::PerConf(list)
    }
}

/// Builds a [`ResultMap`] from `(key, data)` pairs.
pub fn results<K, D, I>(pairs: I) -> ResultMap
where
    K: Into<String>,
    D: Into<TableData>,
    I: IntoIterator<Item = (K, D)>,
{
    pairs
        .into_iter()
        .map(|(k, d)| (k.into(), d.into()))
        .collect()
}

impl ExperimentLog {
    // ─── reads ───────────────────────────────────────────────────────────

    /// Result tables of the configurations matching `conf`.
    ///
    /// A bare existing index gives `Nested::One`; everything else a list.
    /// Keys that were never logged are left out, so a configuration
    /// without results yields an empty map.
    pub fn select_results(
        &self,
        folder: &str,
        conf: &Specifier,
        keys: &KeySelector,
        range: RowRange,
        columns: Option<&[&str]>,
    ) -> Result<Nested<ResultSet>> {
        let conf = conf.normalized();
        if !self.folder_readable(folder, &conf)? {
            return Ok(Nested::empty());
        }
        self.resolve(folder, &conf)?
            .try_map(|i| self.select_children(&self.conf_path(folder, i), keys, range, columns))
    }

    /// Names of the result tables of the configurations matching `conf`.
    pub fn result_keys(&self, folder: &str, conf: &Specifier) -> Result<Nested<Vec<String>>> {
        let conf = conf.normalized();
        if !self.folder_readable(folder, &conf)? {
            return Ok(Nested::empty());
        }
        self.resolve(folder, &conf)?
            .try_map(|i| self.table_children(&self.conf_path(folder, i)))
    }

    /// `false` when `folder` is absent and `conf` matches everything, which
    /// reads as empty. Naming a configuration of an absent folder is
    /// `NotFound`.
    fn folder_readable(&self, folder: &str, conf: &Specifier) -> Result<bool> {
        if self.exists(folder)? {
            return Ok(true);
        }
        if conf.is_all() {
            return Ok(false);
        }
        Err(ExplogError::NotFound(format!("experiment folder '{folder}'")))
    }

    /// Reads the tables directly below `path`. An absent `path` reads as
    /// empty.
    pub fn select_children(
        &self,
        path: &str,
        keys: &KeySelector,
        range: RowRange,
        columns: Option<&[&str]>,
    ) -> Result<ResultSet> {
        let store = self.store()?;
        let mut out = ResultSet::new();
        for key in self.selected_keys(path, keys)? {
            let frame = store.select(&join_path(path, &key), None, range, columns)?;
            out.insert(key, frame);
        }
        Ok(out)
    }

    fn table_children(&self, path: &str) -> Result<Vec<String>> {
        let store = self.store()?;
        let mut out = Vec::new();
        for name in store.children(path)?.unwrap_or_default() {
            if store.is_table(&join_path(path, &name))? {
                out.push(name);
            }
        }
        Ok(out)
    }

    fn selected_keys(&self, path: &str, keys: &KeySelector) -> Result<Vec<String>> {
        let tables = self.table_children(path)?;
        Ok(match keys {
            KeySelector::All => tables,
            KeySelector::Keys(wanted) => wanted
                .iter()
                .filter(|k| tables.contains(k))
                .cloned()
                .collect(),
        })
    }

    // ─── writes ──────────────────────────────────────────────────────────

    /// Logs `results` for the configurations matching `conf`, creating the
    /// configuration (and the folder) when nothing matches.
    ///
    /// On failure every configuration row added by this call is removed
    /// together with its result folder, and a folder created by this call
    /// is removed entirely, before the error is returned.
    pub fn add_results(
        &mut self,
        folder: &str,
        conf: &Specifier,
        results: impl Into<Results>,
        mode: ResultsMode,
    ) -> Result<Nested<u64>> {
        let results = results.into();
        for map in results.maps() {
            for key in map.keys() {
                self.check_result_key(key)?;
            }
        }

        let created_root = self.first_missing_ancestor(folder)?;
        let mut added = Vec::new();
        match self.try_add_results(folder, conf, &results, mode, &mut added) {
            Ok(indices) => {
                self.commit()?;
                info!(folder, ?mode, added = added.len(), "results added");
                Ok(indices)
            }
            Err(err) => {
                self.rollback(folder, created_root.as_deref(), &added);
                if let Err(e) = self.commit() {
                    warn!(folder, error = %e, "failed to flush after rollback");
                }
                Err(err)
            }
        }
    }

    fn try_add_results(
        &mut self,
        folder: &str,
        conf: &Specifier,
        results: &Results,
        mode: ResultsMode,
        added: &mut Vec<u64>,
    ) -> Result<Nested<u64>> {
        let opts = ResolveOptions::find_or_create()
            .with_always_add_conf(mode == ResultsMode::AddNew);
        let indices = self.resolve_into(folder, conf, opts, added)?;

        let targets: Vec<u64> = indices.leaves().into_iter().copied().collect();
        let per_conf: Vec<&ResultMap> = match results {
            Results::Shared(map) => vec![map; targets.len()],
            Results::PerConf(list) => {
                if list.len() != targets.len() {
                    return Err(ExplogError::ArityMismatch {
                        expected: targets.len(),
                        actual: list.len(),
                    });
                }
                list.iter().collect()
            }
        };

        let write_mode = match mode {
            ResultsMode::Append => AddMode::Append,
            ResultsMode::Replace | ResultsMode::AddNew => AddMode::Replace,
        };
        for (i, map) in targets.iter().zip(per_conf) {
            let conf_path = self.conf_path(folder, *i);
            for (key, data) in map {
                self.write_table(&join_path(&conf_path, key), data.clone(), write_mode)?;
            }
        }
        Ok(indices)
    }

    fn rollback(&mut self, folder: &str, created_root: Option<&str>, added: &[u64]) {
        if added.is_empty() && created_root.is_none() {
            return;
        }
        let conf_paths: Vec<String> = added.iter().map(|i| self.conf_path(folder, *i)).collect();
        let Ok(store) = self.store_mut() else {
            return;
        };

        if let Some(root) = created_root {
            match store.remove(root, None, RowRange::ALL) {
                Ok(_) => warn!(folder, "rolled back folder created by a failed add_results"),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(folder, error = %e, "rollback failed to remove folder"),
            }
            return;
        }

        for path in &conf_paths {
            if let Err(e) = store.remove(path, None, RowRange::ALL) {
                if !e.is_not_found() {
                    warn!(path = %path, error = %e, "rollback failed to remove result folder");
                }
            }
        }
        let rows = Expr::In {
            column: INDEX_COLUMN.to_string(),
            values: added.iter().map(|i| Value::Int(*i as i64)).collect(),
        };
        if let Err(e) = store.remove(folder, Some(&rows), RowRange::ALL) {
            warn!(folder, error = %e, "rollback failed to remove configuration rows");
        }
        warn!(
            folder,
            rows = added.len(),
            "rolled back configurations added by a failed add_results"
        );
    }

    /// The shallowest ancestor of `path` (or `path` itself) that does not
    /// exist yet.
    fn first_missing_ancestor(&self, path: &str) -> Result<Option<String>> {
        let mut prefix = String::new();
        for seg in split_path(path)? {
            prefix = join_path(&prefix, seg);
            if !self.exists(&prefix)? {
                return Ok(Some(prefix));
            }
        }
        Ok(None)
    }

    fn check_result_key(&self, key: &str) -> Result<()> {
        let prefix = &self.config().conf_prefix;
        let looks_like_conf = key
            .strip_prefix(prefix.as_str())
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()));
        if key.is_empty()
            || key.contains('/')
            || key.chars().any(char::is_whitespace)
            || looks_like_conf
        {
            return Err(ExplogError::InvalidPath(format!(
                "'{key}' cannot be used as a result name"
            )));
        }
        Ok(())
    }

    // ─── removal ─────────────────────────────────────────────────────────

    /// Removes results of the configurations matching `conf`. Fails with
    /// `NotFound`, before removing anything, if some part of `conf` matches
    /// no configuration.
    pub fn remove_results(
        &mut self,
        folder: &str,
        conf: &Specifier,
        keys: &KeySelector,
        range: RowRange,
    ) -> Result<()> {
        let indices = self.resolve(folder, conf)?;
        if indices.has_empty_level() {
            return Err(ExplogError::NotFound(format!(
                "No configuration in '{folder}' matches {conf:?}."
            )));
        }
        let paths: Vec<String> = indices
            .leaves()
            .into_iter()
            .map(|i| self.conf_path(folder, *i))
            .collect();
        for path in &paths {
            self.remove_children_inner(path, keys, range)?;
        }
        self.commit()?;
        info!(folder, configurations = paths.len(), "results removed");
        Ok(())
    }

    /// Removes tables directly below `path`, or all of `path` when every key
    /// and every row is selected. Missing keys are skipped.
    pub fn remove_children(
        &mut self,
        path: &str,
        keys: &KeySelector,
        range: RowRange,
    ) -> Result<()> {
        self.remove_children_inner(path, keys, range)?;
        self.commit()
    }

    fn remove_children_inner(
        &mut self,
        path: &str,
        keys: &KeySelector,
        range: RowRange,
    ) -> Result<()> {
        if *keys == KeySelector::All && range.is_full() {
            if self.exists(path)? {
                self.store_mut()?.remove(path, None, range)?;
            }
            return Ok(());
        }
        for key in self.selected_keys(path, keys)? {
            self.store_mut()?.remove(&join_path(path, &key), None, range)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fields;

    #[test]
    fn result_names_are_checked() {
        let log = ExperimentLog::in_memory();
        for bad in ["", "a/b", "conf_3", "two words"] {
            assert!(matches!(
                log.check_result_key(bad),
                Err(ExplogError::InvalidPath(_))
            ));
        }
        for ok in ["loss", "conf_", "conf_x", "confusion"] {
            assert!(log.check_result_key(ok).is_ok());
        }
    }

    #[test]
    fn shared_results_fan_out() {
        let mut log = ExperimentLog::in_memory();
        let conf = Specifier::fields([("p", 1)]);
        log.add_results("e", &conf, results([("m", fields([("v", 1)]))]), ResultsMode::AddNew)
            .unwrap();
        log.add_results("e", &conf, results([("m", fields([("v", 2)]))]), ResultsMode::AddNew)
            .unwrap();

        let idx = log
            .add_results(
                "e",
                &conf,
                results([("n", fields([("w", 0)]))]),
                ResultsMode::Append,
            )
            .unwrap();
        assert_eq!(idx, Nested::many_of([0, 1]));
        assert_eq!(
            log.result_keys("e", &conf).unwrap(),
            Nested::Many(vec![
                Nested::One(vec!["m".to_string(), "n".to_string()]),
                Nested::One(vec!["m".to_string(), "n".to_string()]),
            ])
        );
    }

    #[test]
    fn per_conf_results_need_matching_length() {
        let mut log = ExperimentLog::in_memory();
        let err = log
            .add_results(
                "e",
                &Specifier::fields([("p", 1)]),
                vec![results([("m", fields([("v", 1)]))]); 2],
                ResultsMode::Append,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ExplogError::ArityMismatch {
                expected: 1,
                actual: 2
            }
        ));
        assert!(!log.exists("e").unwrap());
    }

    #[test]
    fn remove_children_skips_missing_keys() {
        let mut log = ExperimentLog::in_memory();
        log.add_data("r/a", fields([("v", 1)]), AddMode::Append).unwrap();
        log.add_data("r/b", fields([("v", 1)]), AddMode::Append).unwrap();
        log.remove_children("r", &KeySelector::from(vec!["a", "zz"]), RowRange::ALL)
            .unwrap();
        assert_eq!(log.get_keys("r").unwrap().unwrap(), vec!["b"]);
        log.remove_children("nowhere", &KeySelector::All, RowRange::ALL)
            .unwrap();
    }
}
