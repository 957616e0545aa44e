//! explog-core: hierarchical experiment logging over an embedded columnar
//! table store.
//!
//! An experiment folder holds one configuration table (one row per
//! configuration) and, per row `i`, a `conf_<i>` folder of named result
//! tables. Configurations are addressed with a [`Specifier`] and resolved to
//! row indices by [`ExperimentLog::conf2idx`]; results are written with
//! [`ExperimentLog::add_results`], which undoes its own inserts on failure.

pub mod config;
pub mod error;
pub mod frame;
pub mod log;
pub mod logging;
pub mod models;
pub mod predicate;
pub mod resolve;
pub mod results;
pub mod specifier;
pub mod store;

pub use config::LogConfig;
pub use error::{ExplogError, Result};
pub use frame::{batch_from_fields, batch_from_rows, Frame, ResultSet, TableData};
pub use log::ExperimentLog;
pub use logging::init_tracing;
pub use models::{fields, AddMode, Fields, KeySelector, Nested, ResultsMode, RowRange, Value};
pub use predicate::Expr;
pub use resolve::{Resolution, ResolveOptions};
pub use results::{results, ResultMap, Results};
pub use specifier::Specifier;
pub use store::PathStore;
