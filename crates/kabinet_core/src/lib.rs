//! # Kabinet Core
//!
//! Client layer over the Kabinet storage engines.
//!
//! This crate provides:
//! - [`HashDatabase`]: unique byte keys
//! - [`BTreeDatabase`]: ordered keys, duplicates, custom comparators and
//!   [`Cursor`]s
//! - [`FixedDatabase`]: integer ids and fixed-width values
//! - [`TableDatabase`]: column documents, secondary indexes and queries
//!
//! Every store implements [`Database`] (file operations, size, clear,
//! transactions). The hash and ordered stores share the [`KeyValue`]
//! contract; the fixed-width and document stores offer the same
//! operations on their own key and value types.
//!
//! ## Design Principles
//!
//! - Engine "no record" and "existing record" outcomes become `None` and
//!   `false`; every other engine failure is a [`CoreError::Cabinet`]
//! - Problems that must not stop a caller (unknown tuning letters,
//!   unsupported modes, superseded arguments) are [`Advisory`] values,
//!   logged and kept on the store
//! - Cursors and queries release their engine resources on every exit path
//!
//! ## Example
//!
//! ```rust
//! use kabinet_core::{Config, Database, KeyValue};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut db = kabinet_core::open(dir.path().join("example.tcb"), Config::default()).unwrap();
//! let tree = db.as_btree().unwrap();
//!
//! tree.transaction(|tree| {
//!     tree.store("b", "2")?;
//!     tree.store("a", "1")
//! })
//! .unwrap();
//! assert_eq!(tree.keys(&Default::default()).unwrap(), vec![b"a".to_vec(), b"b".to_vec()]);
//! db.close().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod base;
mod btree;
mod config;
mod database;
mod diagnostics;
mod error;
mod fixed;
mod hash;
mod options;
mod registry;
mod store;
mod table;
mod transaction;
mod translate;

pub use btree::{BTreeDatabase, Cursor};
pub use config::{Config, SharedComparator};
pub use database::Database;
pub use diagnostics::Advisory;
pub use error::{CoreError, CoreResult, FinishSignal};
pub use fixed::{FixedDatabase, FixedDefault, FixedKey, FixedMap, FixedOptions, IdQuery};
pub use hash::HashDatabase;
pub use options::{leading_integer, mode_letters, opts_letters, parse_mode, parse_opts, ModeSpec};
pub use registry::{open, open_with, AnyDatabase, DatabaseKind};
pub use store::{
    DefaultMap, DefaultValue, KeyQuery, KeyValue, Number, StoreMode, StoreOptions, ValueDefault,
    ValueMap, ValueOptions,
};
pub use table::{
    document, parse_index_type, Condition, Document, DocumentDefault, DocumentMap,
    DocumentOptions, Expression, Order, Page, PageRequest, QueryAction, QueryResults, QuerySpec,
    ReturnShape, Select, TableDatabase, Tuple, DEFAULT_PER_PAGE, PRIMARY_KEY_COLUMN,
};
pub use transaction::NestingPolicy;

pub use kabinet_engine::{ErrorCode, IndexType, OpenMode, OrderType, TuneOpts};
