//! Configuration resolution: turning a [`Specifier`] into row indices of an
//! experiment folder, inserting configurations when asked to.

use tracing::debug;

use crate::error::{ExplogError, Result};
use crate::frame::TableData;
use crate::log::{compile, ExperimentLog};
use crate::models::{AddMode, Nested, RowRange};
use crate::predicate::{CmpOp, Expr};
use crate::specifier::{check_column_name, Specifier};

/// Side effects [`ExperimentLog::conf2idx`] may perform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Insert the configuration when nothing matches it.
    pub add_non_existent: bool,
    /// Create the folder table when the folder does not exist yet.
    pub add_missing_folder: bool,
    /// Insert the configuration even if an identical one exists.
    pub always_add_conf: bool,
    /// Physical row window searched for matches.
    pub range: RowRange,
}

impl ResolveOptions {
    pub fn find_or_create() -> Self {
        Self {
            add_non_existent: true,
            add_missing_folder: true,
            ..Self::default()
        }
    }

    pub fn with_add_non_existent(mut self, yes: bool) -> Self {
        self.add_non_existent = yes;
        self
    }

    pub fn with_add_missing_folder(mut self, yes: bool) -> Self {
        self.add_missing_folder = yes;
        self
    }

    pub fn with_always_add_conf(mut self, yes: bool) -> Self {
        self.always_add_conf = yes;
        self
    }

    pub fn with_range(mut self, range: impl Into<RowRange>) -> Self {
        self.range = range.into();
        self
    }

    fn may_insert(&self) -> bool {
        self.add_non_existent || self.always_add_conf
    }
}

/// Outcome of [`ExperimentLog::conf2idx`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub indices: Nested<u64>,
    /// Rows inserted by this call, in insertion order.
    pub added: Vec<u64>,
}

impl ExperimentLog {
    /// Resolves `conf` to row indices of the configuration table at
    /// `folder`.
    ///
    /// A bare index resolves to `Nested::One` when the row exists and to an
    /// empty list otherwise. Every other shape resolves to a list of
    /// `Nested::One`, and a list specifier to a list of per-element
    /// resolutions.
    pub fn conf2idx(
        &mut self,
        folder: &str,
        conf: &Specifier,
        opts: ResolveOptions,
    ) -> Result<Resolution> {
        let mut added = Vec::new();
        let indices = self.resolve_into(folder, conf, opts, &mut added)?;
        if !added.is_empty() {
            self.commit()?;
        }
        Ok(Resolution { indices, added })
    }

    /// Read-only resolution: finds rows, never creates anything.
    pub fn resolve(&self, folder: &str, conf: &Specifier) -> Result<Nested<u64>> {
        match conf.normalized() {
            Specifier::Index(i) => Ok(if self.row_exists(folder, i)? {
                Nested::One(i)
            } else {
                Nested::empty()
            }),
            Specifier::Many(items) => Ok(Nested::Many(
                items
                    .iter()
                    .map(|item| self.resolve(folder, item))
                    .collect::<Result<_>>()?,
            )),
            other => {
                if !self.exists(folder)? {
                    return Err(folder_missing(folder));
                }
                Ok(Nested::many_of(self.lookup(folder, &other, RowRange::ALL)?))
            }
        }
    }

    pub(crate) fn resolve_into(
        &mut self,
        folder: &str,
        conf: &Specifier,
        opts: ResolveOptions,
        added: &mut Vec<u64>,
    ) -> Result<Nested<u64>> {
        let conf = conf.normalized();
        match &conf {
            Specifier::Index(i) => {
                if self.row_exists(folder, *i)? {
                    Ok(Nested::One(*i))
                } else if opts.may_insert() {
                    Err(ExplogError::Conflict(format!(
                        "Row {i} does not exist in '{folder}'; a full configuration, \
                         not a bare index, is required to create a row."
                    )))
                } else {
                    Ok(Nested::empty())
                }
            }
            Specifier::Many(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_into(folder, item, opts, added)?);
                }
                Ok(Nested::Many(out))
            }
            _ => {
                let is_all = conf.is_all();
                if opts.always_add_conf && !is_all {
                    let i = self.insert_conf(folder, &conf, opts, added)?;
                    return Ok(Nested::many_of([i]));
                }
                if !self.exists(folder)? {
                    if !opts.add_missing_folder {
                        return Err(folder_missing(folder));
                    }
                    if is_all {
                        return Ok(Nested::empty());
                    }
                    let i = self.insert_conf(folder, &conf, opts, added)?;
                    return Ok(Nested::many_of([i]));
                }
                let found = self.lookup(folder, &conf, opts.range)?;
                if found.is_empty() && opts.add_non_existent && !is_all {
                    let i = self.insert_conf(folder, &conf, opts, added)?;
                    return Ok(Nested::many_of([i]));
                }
                Ok(Nested::many_of(found))
            }
        }
    }

    fn row_exists(&self, folder: &str, index: u64) -> Result<bool> {
        let expr = Expr::Cmp {
            column: crate::frame::INDEX_COLUMN.to_string(),
            op: CmpOp::Eq,
            value: (index as i64).into(),
        };
        self.store()?.exists_where(folder, Some(&expr))
    }

    fn lookup(&self, folder: &str, conf: &Specifier, range: RowRange) -> Result<Vec<u64>> {
        let expr = compile(conf)?;
        let frame = self
            .store()?
            .select(folder, expr.as_ref(), range, Some(&[][..]))?;
        Ok(frame.index().to_vec())
    }

    fn insert_conf(
        &mut self,
        folder: &str,
        conf: &Specifier,
        opts: ResolveOptions,
        added: &mut Vec<u64>,
    ) -> Result<u64> {
        let Specifier::Fields(fields) = conf else {
            return Err(ExplogError::Conflict(format!(
                "Cannot add '{}' to '{folder}': only a mapping of parameter values \
                 describes a full configuration.",
                conf.to_where()?.unwrap_or_default()
            )));
        };
        if !opts.add_missing_folder && !self.exists(folder)? {
            return Err(folder_missing(folder));
        }
        for key in fields.keys() {
            check_column_name(key)?;
        }
        let assigned = self.write_table(folder, TableData::Row(fields.clone()), AddMode::Append)?;
        debug!(folder, index = assigned.start, "configuration added");
        added.push(assigned.start);
        Ok(assigned.start)
    }
}

fn folder_missing(folder: &str) -> ExplogError {
    ExplogError::NotFound(format!("Folder '{folder}' does not exist."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn log_with_confs() -> ExperimentLog {
        let mut log = ExperimentLog::in_memory();
        for p in [1, 2, 2] {
            log.conf2idx(
                "exp",
                &Specifier::fields([("p", p)]),
                ResolveOptions::default().with_always_add_conf(true).with_add_missing_folder(true),
            )
            .unwrap();
        }
        log
    }

    #[test]
    fn bare_index_shapes() {
        let log = log_with_confs();
        assert_eq!(log.resolve("exp", &Specifier::Index(1)).unwrap(), Nested::One(1));
        assert_eq!(log.resolve("exp", &Specifier::Index(9)).unwrap(), Nested::empty());
        assert_eq!(log.resolve("nowhere", &Specifier::Index(0)).unwrap(), Nested::empty());
    }

    #[test]
    fn row_window_limits_the_search() {
        let mut log = log_with_confs();
        let two = Specifier::fields([("p", 2)]);
        let found = log
            .conf2idx("exp", &two, ResolveOptions::find_or_create().with_range(2..))
            .unwrap();
        assert_eq!(found.indices, Nested::many_of([2]));
        assert!(found.added.is_empty());

        let outside = log
            .conf2idx("exp", &two, ResolveOptions::default().with_range(..1))
            .unwrap();
        assert_eq!(outside.indices, Nested::empty());

        // a match outside the window does not count
        let one = Specifier::fields([("p", 1)]);
        let inserted = log
            .conf2idx("exp", &one, ResolveOptions::find_or_create().with_range(1..))
            .unwrap();
        assert_eq!(inserted.indices, Nested::many_of([3]));
        assert_eq!(inserted.added, vec![3]);
        assert_eq!(log.resolve("exp", &one).unwrap(), Nested::many_of([0, 3]));
    }

    #[test]
    fn predicates_and_mappings_list_matches() {
        let log = log_with_confs();
        assert_eq!(
            log.resolve("exp", &Specifier::fields([("p", 2)])).unwrap(),
            Nested::many_of([1, 2])
        );
        assert_eq!(
            log.resolve("exp", &Specifier::from("p < 2")).unwrap(),
            Nested::many_of([0])
        );
        assert_eq!(log.resolve("exp", &Specifier::All).unwrap(), Nested::many_of([0, 1, 2]));
    }

    #[test]
    fn lists_resolve_element_wise() {
        let log = log_with_confs();
        let spec = Specifier::Many(vec![Specifier::Index(0), Specifier::fields([("p", 2)])]);
        assert_eq!(
            log.resolve("exp", &spec).unwrap(),
            Nested::Many(vec![Nested::One(0), Nested::many_of([1, 2])])
        );
    }

    #[test]
    fn find_or_create_is_idempotent() {
        let mut log = ExperimentLog::in_memory();
        let spec = Specifier::fields([("lr", Value::Float(0.1)), ("opt", Value::from("sgd"))]);
        let first = log.conf2idx("e", &spec, ResolveOptions::find_or_create()).unwrap();
        let second = log.conf2idx("e", &spec, ResolveOptions::find_or_create()).unwrap();
        assert_eq!(first.indices, Nested::many_of([0]));
        assert_eq!(first.added, vec![0]);
        assert_eq!(second.indices, first.indices);
        assert!(second.added.is_empty());
    }

    #[test]
    fn insertion_needs_a_full_configuration() {
        let mut log = log_with_confs();
        let opts = ResolveOptions::find_or_create();
        assert!(matches!(
            log.conf2idx("exp", &Specifier::Index(7), opts),
            Err(ExplogError::Conflict(_))
        ));
        assert!(matches!(
            log.conf2idx("exp", &Specifier::from("p = 5"), opts),
            Err(ExplogError::Conflict(_))
        ));
        assert_eq!(log.num_rows("exp").unwrap(), 3);
    }

    #[test]
    fn missing_folder_handling() {
        let mut log = ExperimentLog::in_memory();
        assert!(matches!(
            log.conf2idx("e", &Specifier::fields([("p", 1)]), ResolveOptions::default()),
            Err(ExplogError::NotFound(_))
        ));
        assert!(matches!(
            log.conf2idx(
                "e",
                &Specifier::fields([("p", 1)]),
                ResolveOptions::default().with_always_add_conf(true)
            ),
            Err(ExplogError::NotFound(_))
        ));
        let r = log
            .conf2idx("e", &Specifier::All, ResolveOptions::find_or_create())
            .unwrap();
        assert_eq!(r.indices, Nested::empty());
        assert!(!log.exists("e").unwrap());
    }

    #[test]
    fn grouping_folder_is_not_a_table() {
        let mut log = ExperimentLog::in_memory();
        log.add_folder("/", "group").unwrap();
        assert!(matches!(
            log.resolve("group", &Specifier::fields([("p", 1)])),
            Err(ExplogError::TypeMismatch(_))
        ));
    }
}
