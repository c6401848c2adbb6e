//! Opening a store by file extension.

use crate::btree::BTreeDatabase;
use crate::config::Config;
use crate::database::Database;
use crate::diagnostics::Advisory;
use crate::error::{CoreError, CoreResult};
use crate::fixed::FixedDatabase;
use crate::hash::HashDatabase;
use crate::table::TableDatabase;
use std::path::Path;
use tracing::warn;

/// The four store variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    /// `.tch`
    Hash,
    /// `.tcb`
    BTree,
    /// `.tcf`
    Fixed,
    /// `.tct`
    Table,
}

impl DatabaseKind {
    /// Picks the variant from the file extension, ignoring case.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` for any other extension.
    pub fn from_path(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("tch") => Ok(Self::Hash),
            Some("tcb") => Ok(Self::BTree),
            Some("tcf") => Ok(Self::Fixed),
            Some("tct") => Ok(Self::Table),
            _ => Err(CoreError::invalid_argument(format!(
                "cannot pick a database type for {}; use .tch, .tcb, .tcf or .tct",
                path.display()
            ))),
        }
    }

    /// Returns the canonical file extension.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Hash => "tch",
            Self::BTree => "tcb",
            Self::Fixed => "tcf",
            Self::Table => "tct",
        }
    }
}

/// A store of any variant.
pub enum AnyDatabase {
    /// Hash store.
    Hash(HashDatabase),
    /// Ordered store.
    BTree(BTreeDatabase),
    /// Fixed-width store.
    Fixed(FixedDatabase),
    /// Document store.
    Table(TableDatabase),
}

macro_rules! each_variant {
    ($value:expr, $db:ident => $body:expr) => {
        match $value {
            AnyDatabase::Hash($db) => $body,
            AnyDatabase::BTree($db) => $body,
            AnyDatabase::Fixed($db) => $body,
            AnyDatabase::Table($db) => $body,
        }
    };
}

impl AnyDatabase {
    /// Returns the variant.
    pub const fn kind(&self) -> DatabaseKind {
        match self {
            Self::Hash(_) => DatabaseKind::Hash,
            Self::BTree(_) => DatabaseKind::BTree,
            Self::Fixed(_) => DatabaseKind::Fixed,
            Self::Table(_) => DatabaseKind::Table,
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        each_variant!(self, db => db.path())
    }

    /// Returns true until the store is closed.
    pub fn is_open(&self) -> bool {
        each_variant!(self, db => db.is_open())
    }

    /// Returns true if the store was opened without write access.
    pub fn is_read_only(&self) -> bool {
        each_variant!(self, db => db.is_read_only())
    }

    /// Returns the number of records.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn size(&self) -> CoreResult<u64> {
        each_variant!(self, db => db.size())
    }

    /// Flushes pending writes.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn flush(&mut self) -> CoreResult<()> {
        each_variant!(self, db => db.flush())
    }

    /// Closes the store.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` on a second close.
    pub fn close(&mut self) -> CoreResult<()> {
        each_variant!(self, db => db.close())
    }

    /// Drains the advisories raised so far.
    pub fn take_advisories(&mut self) -> Vec<Advisory> {
        each_variant!(self, db => db.take_advisories())
    }

    /// Returns the hash store, if this is one.
    pub fn as_hash(&mut self) -> Option<&mut HashDatabase> {
        match self {
            Self::Hash(db) => Some(db),
            _ => None,
        }
    }

    /// Returns the ordered store, if this is one.
    pub fn as_btree(&mut self) -> Option<&mut BTreeDatabase> {
        match self {
            Self::BTree(db) => Some(db),
            _ => None,
        }
    }

    /// Returns the fixed-width store, if this is one.
    pub fn as_fixed(&mut self) -> Option<&mut FixedDatabase> {
        match self {
            Self::Fixed(db) => Some(db),
            _ => None,
        }
    }

    /// Returns the document store, if this is one.
    pub fn as_table(&mut self) -> Option<&mut TableDatabase> {
        match self {
            Self::Table(db) => Some(db),
            _ => None,
        }
    }
}

/// Opens the store variant named by the extension of `path`.
///
/// # Errors
///
/// Fails with `InvalidArgument` for an unknown extension and with the
/// variant's open errors otherwise.
pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<AnyDatabase> {
    let path = path.as_ref();
    Ok(match DatabaseKind::from_path(path)? {
        DatabaseKind::Hash => AnyDatabase::Hash(HashDatabase::open(path, config)?),
        DatabaseKind::BTree => AnyDatabase::BTree(BTreeDatabase::open(path, config)?),
        DatabaseKind::Fixed => AnyDatabase::Fixed(FixedDatabase::open(path, config)?),
        DatabaseKind::Table => AnyDatabase::Table(TableDatabase::open(path, config)?),
    })
}

/// Opens a store, runs `block` on it and closes it on every exit path.
///
/// The block's error wins over a close error; a close error after a
/// successful block is returned.
///
/// # Errors
///
/// See [`open`].
pub fn open_with<T>(
    path: impl AsRef<Path>,
    config: Config,
    block: impl FnOnce(&mut AnyDatabase) -> CoreResult<T>,
) -> CoreResult<T> {
    let mut db = open(path, config)?;
    let result = block(&mut db);
    let closed = if db.is_open() { db.close() } else { Ok(()) };
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(path = %db.path().display(), error = %close_err, "close failed after block error");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyValue;
    use crate::table::document;
    use tempfile::tempdir;

    #[test]
    fn extensions_pick_the_variant() {
        assert_eq!(DatabaseKind::from_path("a.tch").unwrap(), DatabaseKind::Hash);
        assert_eq!(DatabaseKind::from_path("dir/a.TCB").unwrap(), DatabaseKind::BTree);
        assert_eq!(DatabaseKind::from_path("a.tcf").unwrap(), DatabaseKind::Fixed);
        assert_eq!(DatabaseKind::from_path("a.Tct").unwrap(), DatabaseKind::Table);
        assert!(matches!(DatabaseKind::from_path("a.db"), Err(CoreError::InvalidArgument(_))));
        assert!(matches!(DatabaseKind::from_path("noext"), Err(CoreError::InvalidArgument(_))));
        assert_eq!(DatabaseKind::Table.extension(), "tct");
    }

    #[test]
    fn open_dispatches_on_extension() {
        let dir = tempdir().unwrap();
        for kind in [DatabaseKind::Hash, DatabaseKind::BTree, DatabaseKind::Fixed, DatabaseKind::Table] {
            let path = dir.path().join(format!("data.{}", kind.extension()));
            let mut db = open(&path, Config::default()).unwrap();
            assert_eq!(db.kind(), kind);
            assert_eq!(db.path(), path.as_path());
            assert_eq!(db.size().unwrap(), 0);
            db.close().unwrap();
            assert!(matches!(db.close(), Err(CoreError::Closed)));
        }
    }

    #[test]
    fn open_with_closes_on_every_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("block.tch");

        let value = open_with(&path, Config::default(), |db| {
            let hash = db.as_hash().ok_or(CoreError::Closed)?;
            hash.store("key", "value")?;
            hash.fetch("key")
        })
        .unwrap();
        assert_eq!(value, b"value");

        let err = open_with(&path, Config::default(), |db| {
            assert!(db.as_table().is_none());
            Err::<(), _>(CoreError::query("boom"))
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::Query(_)));

        open_with(dir.path().join("docs.tct"), Config::default(), |db| {
            db.as_table()
                .ok_or(CoreError::Closed)?
                .store("pk", document([("a", "1")]))
        })
        .unwrap();

        // Both blocks released the hash store's lock.
        let mut db = open(&path, Config::default()).unwrap();
        assert_eq!(db.as_hash().map(|hash| hash.size().unwrap()), Some(1));
    }
}
