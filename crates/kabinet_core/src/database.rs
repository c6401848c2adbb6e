//! Operations shared by every store variant.

use crate::base::Handle;
use crate::config::Config;
use crate::diagnostics::Advisory;
use crate::error::CoreResult;
use crate::transaction;
use crate::translate::check;
use kabinet_engine::Engine;
use std::path::Path;

/// File-level operations and transactions shared by every store.
///
/// Implemented by [`HashDatabase`](crate::HashDatabase),
/// [`BTreeDatabase`](crate::BTreeDatabase),
/// [`FixedDatabase`](crate::FixedDatabase) and
/// [`TableDatabase`](crate::TableDatabase); it cannot be implemented outside
/// this crate.
///
/// # Transactions
///
/// ```rust
/// use kabinet_core::{Config, Database, HashDatabase, KeyValue};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut db = HashDatabase::open(dir.path().join("txn.tch"), Config::default()).unwrap();
/// db.store("data", "before").unwrap();
///
/// let finished = db
///     .transaction(|db| {
///         db.store("data", "after")?;
///         db.abort()?;
///         db.store("other", "never")
///     })
///     .unwrap();
///
/// assert_eq!(finished, None);
/// assert_eq!(db.fetch("data").unwrap(), b"before");
/// assert!(!db.contains("other").unwrap());
/// ```
///
/// The supertrait is out of reach, so outside stores cannot join in:
///
/// ```compile_fail
/// use kabinet_core::base::Handle;
/// ```
pub trait Database: Handle {
    /// Re-tunes an open store.
    ///
    /// Only the knobs set in `options` change; storage options left unset
    /// keep their current value.
    ///
    /// # Errors
    ///
    /// Fails on a read-only store or when the engine rejects the tuning.
    fn optimize(&mut self, options: &Config) -> CoreResult<()>;

    /// Returns the path the store was opened at.
    fn path(&self) -> &Path {
        self.base().path()
    }

    /// Returns true until the store is closed.
    fn is_open(&self) -> bool {
        self.base().is_open()
    }

    /// Returns true if the store was opened without write access.
    fn is_read_only(&self) -> bool {
        self.base().is_read_only()
    }

    /// Returns the size of the store file in bytes.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    fn file_size(&self) -> CoreResult<u64> {
        Ok(self.base().engine()?.file_size())
    }

    /// Writes pending changes to disk.
    ///
    /// # Errors
    ///
    /// Fails when the engine cannot write its file.
    fn flush(&mut self) -> CoreResult<()> {
        check(self.base_mut().engine_mut()?.sync())
    }

    /// Alias of [`Database::flush`].
    ///
    /// # Errors
    ///
    /// See [`Database::flush`].
    fn sync(&mut self) -> CoreResult<()> {
        self.flush()
    }

    /// Writes a copy of the store to `dest`; the copy can be opened.
    ///
    /// # Errors
    ///
    /// Fails when the copy cannot be written.
    fn copy(&self, dest: &Path) -> CoreResult<()> {
        check(self.base().engine()?.copy(dest))
    }

    /// Defragments the store file; `steps` of 0 or less means all of it.
    ///
    /// # Errors
    ///
    /// Fails when the engine cannot defragment.
    fn defrag(&mut self, steps: i64) -> CoreResult<()> {
        check(self.base_mut().engine_mut()?.defrag(steps))
    }

    /// Returns the number of records (duplicates included).
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    fn size(&self) -> CoreResult<u64> {
        Ok(self.base().engine()?.record_count())
    }

    /// Returns true if the store holds no records.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.size()? == 0)
    }

    /// Removes every record.
    ///
    /// # Errors
    ///
    /// Fails on a read-only store.
    fn clear(&mut self) -> CoreResult<()> {
        check(self.base_mut().engine_mut()?.vanish())
    }

    /// Flushes and closes the store.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` when already closed, or when the final flush fails.
    fn close(&mut self) -> CoreResult<()> {
        self.base_mut().close()
    }

    /// Returns the advisories raised so far.
    fn advisories(&self) -> Vec<Advisory> {
        self.base().advisories.snapshot()
    }

    /// Returns and forgets the advisories raised so far.
    fn take_advisories(&mut self) -> Vec<Advisory> {
        self.base().advisories.take()
    }

    /// Returns true while a transaction block is running.
    fn in_transaction(&self) -> bool {
        self.base().txn.is_active()
    }

    /// Runs `block` in a transaction.
    ///
    /// The transaction commits when the block returns `Ok` and aborts when it
    /// returns an error. [`Database::commit`] and [`Database::abort`] end
    /// the block early; the transaction then yields `Ok(None)`.
    ///
    /// Inside another transaction the configured
    /// [`NestingPolicy`](crate::NestingPolicy) applies: `Ignore` runs the
    /// block as part of the outer transaction, `Fail` returns
    /// `CoreError::Transaction`.
    ///
    /// # Errors
    ///
    /// Returns the block's error, a nesting error, or an engine failure to
    /// begin or finish the transaction.
    fn transaction<T, F>(&mut self, block: F) -> CoreResult<Option<T>>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> CoreResult<T>,
    {
        transaction::run(self, block)
    }

    /// Commits the running transaction and ends its block.
    ///
    /// Always returns an error: propagate it with `?`.
    ///
    /// # Errors
    ///
    /// Fails with `CoreError::Transaction` outside a transaction.
    fn commit(&mut self) -> CoreResult<()>
    where
        Self: Sized,
    {
        transaction::commit(self)
    }

    /// Aborts the running transaction and ends its block.
    ///
    /// Always returns an error: propagate it with `?`.
    ///
    /// # Errors
    ///
    /// Fails with `CoreError::Transaction` outside a transaction.
    fn abort(&mut self) -> CoreResult<()>
    where
        Self: Sized,
    {
        transaction::abort(self)
    }
}
