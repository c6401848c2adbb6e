//! Bitmasks, handles and enumerations shared by every engine variant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};

/// Column map stored by table engines: column name to column value.
pub type Columns = BTreeMap<Vec<u8>, Vec<u8>>;

/// Mode bitmask used when opening a database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenMode(u32);

impl OpenMode {
    /// Open as a reader.
    pub const READER: Self = Self(1 << 0);
    /// Open as a writer.
    pub const WRITER: Self = Self(1 << 1);
    /// Create the file if it does not exist.
    pub const CREATE: Self = Self(1 << 2);
    /// Truncate existing contents.
    pub const TRUNCATE: Self = Self(1 << 3);
    /// Open without locking.
    pub const NO_LOCK: Self = Self(1 << 4);
    /// Lock without blocking.
    pub const LOCK_NONBLOCKING: Self = Self(1 << 5);
    /// Synchronize on every transaction.
    pub const SYNC: Self = Self(1 << 6);

    /// Creates a mode from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for OpenMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Storage option bitmask passed to `tune`/`optimize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TuneOpts(u8);

impl TuneOpts {
    /// 64-bit bucket array (files larger than 2GB).
    pub const LARGE: Self = Self(1 << 0);
    /// Deflate record compression.
    pub const DEFLATE: Self = Self(1 << 1);
    /// BZIP2 record compression.
    pub const BZIP: Self = Self(1 << 2);
    /// Custom codec compression.
    pub const TCBS: Self = Self(1 << 3);
    /// Keep the current options (only meaningful for `optimize`).
    pub const UNCHANGED: Self = Self(0xFF);

    /// Creates options from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TuneOpts {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TuneOpts {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Parameters for hash-structured files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashTuning {
    /// Number of buckets (0 keeps the default).
    pub bnum: i64,
    /// Record alignment power (-1 keeps the default).
    pub apow: i8,
    /// Free block pool power (-1 keeps the default).
    pub fpow: i8,
    /// Storage options.
    pub opts: TuneOpts,
}

impl Default for HashTuning {
    fn default() -> Self {
        Self {
            bnum: 0,
            apow: -1,
            fpow: -1,
            opts: TuneOpts::default(),
        }
    }
}

/// Parameters for tree-structured files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TreeTuning {
    /// Members per leaf page (0 keeps the default).
    pub lmemb: i32,
    /// Members per non-leaf page (0 keeps the default).
    pub nmemb: i32,
    /// Hash parameters of the underlying page store.
    pub hash: HashTuning,
}

/// Parameters for fixed-width files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FixedTuning {
    /// Width of each value (0 keeps the current width).
    pub width: i32,
    /// Maximum file size (0 keeps the current limit).
    pub limsiz: i64,
}

/// Record id accepted by fixed-width engines.
///
/// The sentinel variants are resolved by the engine at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedId {
    /// A concrete record id (1 or greater).
    Id(u64),
    /// The smallest existing id.
    Min,
    /// One below the smallest existing id.
    Prev,
    /// The largest existing id.
    Max,
    /// One above the largest existing id.
    Next,
}

/// Type of a secondary index on a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// Lexical string index.
    Lexical,
    /// Decimal (numeric) index.
    Decimal,
    /// Token inverted index.
    Token,
    /// Q-gram inverted index.
    QGram,
}

/// Operation requested through `TableEngine::set_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCommand {
    /// Build (or rebuild) an index.
    Build {
        /// The index type.
        kind: IndexType,
        /// Fail with `Keep` instead of rebuilding an existing index.
        keep: bool,
    },
    /// Optimize an existing index.
    Optimize,
    /// Remove an existing index.
    Remove,
}

/// Comparison operator of a table query condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOp {
    /// String is equal to.
    StrEq,
    /// String is included in.
    StrInclude,
    /// String begins with.
    StrBeginsWith,
    /// String ends with.
    StrEndsWith,
    /// String includes all tokens in.
    StrAllTokens,
    /// String includes at least one token in.
    StrAnyToken,
    /// String is equal to at least one token in.
    StrEqAnyToken,
    /// String matches a regular expression.
    StrRegex,
    /// Number is equal to.
    NumEq,
    /// Number is greater than.
    NumGt,
    /// Number is greater than or equal to.
    NumGe,
    /// Number is less than.
    NumLt,
    /// Number is less than or equal to.
    NumLe,
    /// Number is between two tokens.
    NumBetween,
    /// Number is equal to at least one token.
    NumEqAny,
    /// Full-text search with a phrase.
    FtsPhrase,
    /// Full-text search with all tokens.
    FtsAllTokens,
    /// Full-text search with at least one token.
    FtsAnyToken,
    /// Full-text search with a compound expression.
    FtsExpression,
}

/// A compiled condition handed to `TableEngine::query_add_condition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCondition {
    /// Column name; empty for the primary key.
    pub column: Vec<u8>,
    /// The operator.
    pub op: ConditionOp,
    /// Negate the operator.
    pub negate: bool,
    /// Do not use an index for this condition.
    pub no_index: bool,
    /// Operand.
    pub expr: Vec<u8>,
}

/// Ordering applied to query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderType {
    /// String ascending.
    #[default]
    StrAsc,
    /// String descending.
    StrDesc,
    /// Numeric ascending.
    NumAsc,
    /// Numeric descending.
    NumDesc,
}

/// Set operation used to combine several queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOp {
    /// Records matched by any query.
    Union,
    /// Records matched by every query.
    Intersection,
    /// Records matched by the first query and none of the others.
    Difference,
}

/// Outcome returned by a query processing callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcAction {
    /// Write the (possibly modified) columns back.
    pub put: bool,
    /// Remove the record.
    pub out: bool,
    /// Stop processing.
    pub stop: bool,
}

/// Handle of an engine cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(pub(crate) u64);

/// Handle of an engine query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub(crate) u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_mode_bits_combine() {
        let mode = OpenMode::WRITER | OpenMode::CREATE;
        assert!(mode.contains(OpenMode::WRITER));
        assert!(mode.contains(OpenMode::CREATE));
        assert!(!mode.contains(OpenMode::TRUNCATE));
        assert_eq!(mode.bits(), 0b110);
    }

    #[test]
    fn tune_opts_bits_combine() {
        let mut opts = TuneOpts::LARGE;
        opts |= TuneOpts::DEFLATE;
        assert_eq!(opts.bits(), 0b11);
        assert!(opts.contains(TuneOpts::LARGE));
        assert!(!opts.contains(TuneOpts::BZIP));
    }
}
