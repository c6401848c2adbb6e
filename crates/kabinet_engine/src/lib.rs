//! # Kabinet Engine
//!
//! Primitive storage engine interface and the bundled reference engines.
//!
//! This crate is the lowest layer of Kabinet. It defines one trait per
//! engine variant and ships a reference implementation of each:
//!
//! - [`HashFile`] implements [`HashEngine`]: unique keys in a hash table
//! - [`TreeFile`] implements [`OrderedEngine`]: ordered keys with duplicates,
//!   custom comparators and cursors
//! - [`FixedFile`] implements [`FixedEngine`]: integer ids and fixed-width
//!   values
//! - [`TableFile`] implements [`TableEngine`]: column documents, indexes and
//!   queries
//!
//! ## Design Principles
//!
//! - Engines know nothing about the client object model
//! - Every failure carries an [`ErrorCode`]; the last one is also readable
//!   through [`Engine::ecode`]
//! - Expected outcomes such as a missing record are ordinary error codes,
//!   left to the caller to interpret
//!
//! ## Example
//!
//! ```rust
//! use kabinet_engine::{Engine, HashEngine, HashFile, OpenMode, ErrorCode};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut db = HashFile::new();
//! db.open(&dir.path().join("example.tch"), OpenMode::WRITER | OpenMode::CREATE)
//!     .unwrap();
//! db.put(b"hello", b"world").unwrap();
//! assert_eq!(db.get(b"hello").unwrap(), b"world");
//! assert_eq!(db.get(b"missing").unwrap_err().code, ErrorCode::NoRecord);
//! db.close().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod counter;
mod error;
mod eval;
mod file;
mod fixed;
mod flags;
mod hash;
mod table;
mod tree;

pub use backend::{
    ColumnsResolver, Comparator, Engine, FixedEngine, HashEngine, OrderedEngine,
    QueryProcessor, TableEngine, ValueResolver,
};
pub use error::{EngineError, EngineResult, ErrorCode};
pub use fixed::{FixedFile, DEFAULT_LIMSIZ, DEFAULT_WIDTH};
pub use flags::{
    Columns, ConditionOp, CursorId, FixedId, FixedTuning, HashTuning, IndexCommand, IndexType,
    OpenMode, OrderType, ProcAction, QueryCondition, QueryId, SetOp, TreeTuning, TuneOpts,
};
pub use hash::HashFile;
pub use table::{TableFile, NUMBER_COLUMN};
pub use tree::TreeFile;
