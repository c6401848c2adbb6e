//! Primitive engine trait definitions.
//!
//! Each trait mirrors the call surface of one storage engine variant. The
//! client layer only talks to these traits, so any engine that honors the
//! error-code contract can be plugged in underneath it.
//!
//! # Failure contract
//!
//! Every fallible primitive returns [`EngineResult`]. The `Err` arm is the
//! failure sentinel and carries an [`ErrorCode`]; the engine also records the
//! code so it can be read back through [`Engine::ecode`]. Callers decide per
//! operation which codes are expected outcomes (for example
//! [`ErrorCode::NoRecord`] on a read) and which are genuine failures.

use crate::error::{EngineResult, ErrorCode};
use crate::flags::{
    Columns, CursorId, FixedId, FixedTuning, HashTuning, IndexCommand, OpenMode, OrderType,
    ProcAction, QueryCondition, QueryId, SetOp, TreeTuning,
};
use std::cmp::Ordering;
use std::path::Path;

/// A caller-supplied total order over keys.
pub type Comparator = Box<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// Resolver invoked by `put_proc` when the key already exists.
///
/// Receives the stored value and returns the value to store.
pub type ValueResolver<'a> = &'a mut dyn FnMut(&[u8]) -> Vec<u8>;

/// Resolver invoked by table `put_proc` when the key already exists.
pub type ColumnsResolver<'a> = &'a mut dyn FnMut(&Columns) -> Columns;

/// Callback invoked for every record matched by a table query.
pub type QueryProcessor<'a> = &'a mut dyn FnMut(&[u8], &mut Columns) -> ProcAction;

/// Operations shared by every engine variant.
pub trait Engine: Send {
    /// Opens the file at `path`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoFile`] when the file is missing and the mode
    /// does not allow creating it, [`ErrorCode::Lock`] when a non-blocking
    /// lock cannot be taken, and [`ErrorCode::Meta`] when the file belongs to
    /// another engine variant.
    fn open(&mut self, path: &Path, mode: OpenMode) -> EngineResult<()>;

    /// Flushes (for writers) and closes the file.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] if the engine is not open.
    fn close(&mut self) -> EngineResult<()>;

    /// Returns the path of the open file.
    fn path(&self) -> Option<&Path>;

    /// Returns the code of the last failure.
    fn ecode(&self) -> ErrorCode;

    /// Enables the internal mutex. Must be called before `open`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] after `open`.
    fn set_mutex(&mut self) -> EngineResult<()>;

    /// Sets the size of the extra mapped memory. Must be called before `open`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] after `open`.
    fn set_xmsiz(&mut self, xmsiz: i64) -> EngineResult<()>;

    /// Sets the auto defragmentation unit. Must be called before `open`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] after `open`.
    fn set_dfunit(&mut self, dfunit: i32) -> EngineResult<()>;

    /// Makes all written records durable.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer or the write fails.
    fn sync(&mut self) -> EngineResult<()>;

    /// Returns the size of the database file in bytes.
    fn file_size(&self) -> u64;

    /// Writes a consistent copy of the database to `dest`.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open or the copy cannot be written.
    fn copy(&self, dest: &Path) -> EngineResult<()>;

    /// Runs `steps` steps of defragmentation (0 means all).
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn defrag(&mut self, steps: i64) -> EngineResult<()>;

    /// Removes every record.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn vanish(&mut self) -> EngineResult<()>;

    /// Returns the number of records.
    fn record_count(&self) -> u64;

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] if a transaction is already running
    /// or the engine is not open as a writer.
    fn tran_begin(&mut self) -> EngineResult<()>;

    /// Commits the running transaction.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] if no transaction is running.
    fn tran_commit(&mut self) -> EngineResult<()>;

    /// Aborts the running transaction, restoring the state at `tran_begin`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] if no transaction is running.
    fn tran_abort(&mut self) -> EngineResult<()>;

    /// Returns true if the engine was opened as a writer.
    fn is_writer(&self) -> bool;
}

/// Primitives of the hash engine.
pub trait HashEngine: Engine {
    /// Sets tuning parameters. Must be called before `open`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] after `open`.
    fn tune(&mut self, tuning: HashTuning) -> EngineResult<()>;

    /// Rebuilds the open file with new tuning parameters.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn optimize(&mut self, tuning: HashTuning) -> EngineResult<()>;

    /// Sets the record cache size. Must be called before `open`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] after `open`.
    fn set_cache(&mut self, rcnum: i32) -> EngineResult<()>;

    /// Stores a record, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn put(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()>;

    /// Stores a record only if the key is absent.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Keep`] if the key exists.
    fn put_keep(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()>;

    /// Appends `value` to the existing value, or stores it.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn put_cat(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()>;

    /// Stores a record through the write buffer.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn put_async(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()>;

    /// Stores `value`, or the resolver's result when the key exists.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn put_proc(&mut self, key: &[u8], value: &[u8], resolver: ValueResolver<'_>)
        -> EngineResult<()>;

    /// Adds to an integer counter and returns the new total.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Keep`] if the existing value is not an integer
    /// counter.
    fn add_int(&mut self, key: &[u8], num: i32) -> EngineResult<i32>;

    /// Adds to a floating point counter and returns the new total.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Keep`] if the existing value is not a floating
    /// point counter.
    fn add_double(&mut self, key: &[u8], num: f64) -> EngineResult<f64>;

    /// Fetches the value of `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the key is absent.
    fn get(&self, key: &[u8]) -> EngineResult<Vec<u8>>;

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the key is absent.
    fn out(&mut self, key: &[u8]) -> EngineResult<()>;

    /// Lists keys starting with `prefix`, up to `limit` keys.
    fn fwmkeys(&self, prefix: &[u8], limit: Option<usize>) -> Vec<Vec<u8>>;

    /// Resets the record iterator.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open.
    fn iter_init(&mut self) -> EngineResult<()>;

    /// Returns the next key of the iterator.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] once the iterator is exhausted.
    fn iter_next(&mut self) -> EngineResult<Vec<u8>>;

    /// Returns the next record of the iterator.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] once the iterator is exhausted.
    fn iter_next_pair(&mut self) -> EngineResult<(Vec<u8>, Vec<u8>)>;
}

/// Primitives of the ordered (B-tree) engine.
///
/// Keys may carry several values once `put_dup` is used. Single-value
/// primitives inherited from [`HashEngine`] act on the first value.
pub trait OrderedEngine: HashEngine {
    /// Sets tree tuning parameters. Must be called before `open`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] after `open`.
    fn tune_tree(&mut self, tuning: TreeTuning) -> EngineResult<()>;

    /// Rebuilds the open file with new tree tuning parameters.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn optimize_tree(&mut self, tuning: TreeTuning) -> EngineResult<()>;

    /// Sets leaf and non-leaf page cache sizes. Must be called before `open`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] after `open`.
    fn set_tree_cache(&mut self, lcnum: i32, ncnum: i32) -> EngineResult<()>;

    /// Installs the key comparator. Must be called before `open`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] after `open`.
    fn set_comparator(&mut self, comparator: Comparator) -> EngineResult<()>;

    /// Appends another value under `key`.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn put_dup(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()>;

    /// Returns every value stored under `key` in insertion order.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the key is absent.
    fn get_list(&self, key: &[u8]) -> EngineResult<Vec<Vec<u8>>>;

    /// Removes every value stored under `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the key is absent.
    fn out_list(&mut self, key: &[u8]) -> EngineResult<()>;

    /// Returns the number of values stored under `key`.
    fn value_count(&self, key: &[u8]) -> usize;

    /// Lists unique keys between `start` and `finish` in store order.
    ///
    /// `None` bounds are open ended.
    fn range(
        &self,
        start: Option<&[u8]>,
        start_inclusive: bool,
        finish: Option<&[u8]>,
        finish_inclusive: bool,
        limit: Option<usize>,
    ) -> Vec<Vec<u8>>;

    /// Creates a cursor.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open.
    fn cursor_new(&mut self) -> EngineResult<CursorId>;

    /// Moves the cursor to the first record.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] on an empty store.
    fn cursor_first(&mut self, cursor: CursorId) -> EngineResult<()>;

    /// Moves the cursor to the last record.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] on an empty store.
    fn cursor_last(&mut self, cursor: CursorId) -> EngineResult<()>;

    /// Moves the cursor to the first record whose key is at or after `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if no such record exists.
    fn cursor_jump(&mut self, cursor: CursorId, key: &[u8]) -> EngineResult<()>;

    /// Moves the cursor to the last record whose key is at or before `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if no such record exists.
    fn cursor_jump_back(&mut self, cursor: CursorId, key: &[u8]) -> EngineResult<()>;

    /// Moves the cursor one record forward.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] past the last record.
    fn cursor_next(&mut self, cursor: CursorId) -> EngineResult<()>;

    /// Moves the cursor one record back.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] before the first record.
    fn cursor_prev(&mut self, cursor: CursorId) -> EngineResult<()>;

    /// Returns the key under the cursor.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the cursor is not on a record.
    fn cursor_key(&self, cursor: CursorId) -> EngineResult<Vec<u8>>;

    /// Returns the value under the cursor.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the cursor is not on a record.
    fn cursor_value(&self, cursor: CursorId) -> EngineResult<Vec<u8>>;

    /// Returns the record under the cursor.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the cursor is not on a record.
    fn cursor_record(&self, cursor: CursorId) -> EngineResult<(Vec<u8>, Vec<u8>)>;

    /// Removes the record under the cursor and moves to the following one.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the cursor is not on a record.
    fn cursor_out(&mut self, cursor: CursorId) -> EngineResult<()>;

    /// Releases a cursor.
    fn cursor_free(&mut self, cursor: CursorId);
}

/// Primitives of the fixed-width engine.
pub trait FixedEngine: Engine {
    /// Sets width and size limit. Must be called before `open`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] after `open`.
    fn tune(&mut self, tuning: FixedTuning) -> EngineResult<()>;

    /// Changes width and size limit of the open file, truncating values.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn optimize(&mut self, tuning: FixedTuning) -> EngineResult<()>;

    /// Returns the current value width.
    fn width(&self) -> u32;

    /// Resolves an id or sentinel against the stored ids.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] when the id falls below 1 or past
    /// the size limit.
    fn resolve_id(&self, id: FixedId) -> EngineResult<u64>;

    /// Stores a record and returns the resolved id.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an id that cannot be resolved
    /// or lies past the size limit.
    fn put(&mut self, id: FixedId, value: &[u8]) -> EngineResult<u64>;

    /// Stores a record only if the id is free.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Keep`] if the id is taken.
    fn put_keep(&mut self, id: FixedId, value: &[u8]) -> EngineResult<u64>;

    /// Appends to an existing value, or stores it.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an unresolvable id.
    fn put_cat(&mut self, id: FixedId, value: &[u8]) -> EngineResult<u64>;

    /// Stores `value`, or the resolver's result when the id is taken.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an unresolvable id.
    fn put_proc(&mut self, id: FixedId, value: &[u8], resolver: ValueResolver<'_>)
        -> EngineResult<u64>;

    /// Adds to an integer counter and returns the new total.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Keep`] if the existing value is not an integer
    /// counter.
    fn add_int(&mut self, id: FixedId, num: i32) -> EngineResult<i32>;

    /// Adds to a floating point counter and returns the new total.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Keep`] if the existing value is not a floating
    /// point counter.
    fn add_double(&mut self, id: FixedId, num: f64) -> EngineResult<f64>;

    /// Fetches a record.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the id is free.
    fn get(&self, id: FixedId) -> EngineResult<Vec<u8>>;

    /// Removes a record.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the id is free.
    fn out(&mut self, id: FixedId) -> EngineResult<()>;

    /// Resets the id iterator.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open.
    fn iter_init(&mut self) -> EngineResult<()>;

    /// Returns the next id in ascending order.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] once the iterator is exhausted.
    fn iter_next(&mut self) -> EngineResult<u64>;

    /// Lists ids between `lower` and `upper` inclusive.
    fn range(&self, lower: FixedId, upper: FixedId, limit: Option<usize>) -> Vec<u64>;
}

/// Primitives of the table engine.
pub trait TableEngine: Engine {
    /// Sets tuning parameters. Must be called before `open`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] after `open`.
    fn tune(&mut self, tuning: HashTuning) -> EngineResult<()>;

    /// Rebuilds the open file with new tuning parameters.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn optimize(&mut self, tuning: HashTuning) -> EngineResult<()>;

    /// Sets record, leaf and non-leaf cache sizes. Must be called before
    /// `open`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] after `open`.
    fn set_cache(&mut self, rcnum: i32, lcnum: i32, ncnum: i32) -> EngineResult<()>;

    /// Stores a document, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an empty primary key.
    fn put(&mut self, pk: &[u8], columns: &Columns) -> EngineResult<()>;

    /// Stores a document only if the primary key is free.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Keep`] if the key exists.
    fn put_keep(&mut self, pk: &[u8], columns: &Columns) -> EngineResult<()>;

    /// Adds columns missing from the existing document, or stores it.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an empty primary key.
    fn put_cat(&mut self, pk: &[u8], columns: &Columns) -> EngineResult<()>;

    /// Stores `columns`, or the resolver's result when the key exists.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an empty primary key.
    fn put_proc(&mut self, pk: &[u8], columns: &Columns, resolver: ColumnsResolver<'_>)
        -> EngineResult<()>;

    /// Adds an integer to the `_num` column and returns the new total.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn add_int(&mut self, pk: &[u8], num: i32) -> EngineResult<i32>;

    /// Adds a float to the `_num` column and returns the new total.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn add_double(&mut self, pk: &[u8], num: f64) -> EngineResult<f64>;

    /// Fetches a document.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the key is absent.
    fn get(&self, pk: &[u8]) -> EngineResult<Columns>;

    /// Removes a document.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] if the key is absent.
    fn out(&mut self, pk: &[u8]) -> EngineResult<()>;

    /// Lists primary keys starting with `prefix`, up to `limit` keys.
    fn fwmkeys(&self, prefix: &[u8], limit: Option<usize>) -> Vec<Vec<u8>>;

    /// Resets the record iterator.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open.
    fn iter_init(&mut self) -> EngineResult<()>;

    /// Returns the next primary key of the iterator.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] once the iterator is exhausted.
    fn iter_next(&mut self) -> EngineResult<Vec<u8>>;

    /// Builds, optimizes or removes a column index.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::NoRecord`] when optimizing or removing a
    /// missing index and [`ErrorCode::Keep`] when a kept index exists.
    fn set_index(&mut self, column: &[u8], command: IndexCommand) -> EngineResult<()>;

    /// Generates a new unique id.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open as a writer.
    fn gen_uid(&mut self) -> EngineResult<i64>;

    /// Creates an empty query.
    ///
    /// # Errors
    ///
    /// Fails if the engine is not open.
    fn query_new(&mut self) -> EngineResult<QueryId>;

    /// Adds a condition to a query.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an unknown query.
    fn query_add_condition(&mut self, query: QueryId, condition: QueryCondition)
        -> EngineResult<()>;

    /// Sets the result order of a query.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an unknown query.
    fn query_set_order(&mut self, query: QueryId, column: &[u8], order: OrderType)
        -> EngineResult<()>;

    /// Sets the result limit and offset of a query.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an unknown query.
    fn query_set_limit(&mut self, query: QueryId, limit: Option<usize>, offset: usize)
        -> EngineResult<()>;

    /// Returns the primary keys matched by a query.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an unknown query.
    fn query_search(&self, query: QueryId) -> EngineResult<Vec<Vec<u8>>>;

    /// Runs `processor` on every matched record, applying its actions.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an unknown query or when a
    /// write is requested on a reader.
    fn query_process(&mut self, query: QueryId, processor: QueryProcessor<'_>)
        -> EngineResult<()>;

    /// Releases a query.
    fn query_free(&mut self, query: QueryId);

    /// Combines the results of several queries.
    ///
    /// Order, limit and offset of the first query apply to the combined
    /// result.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorCode::Invalid`] for an unknown or missing query.
    fn meta_search(&self, queries: &[QueryId], op: SetOp) -> EngineResult<Vec<Vec<u8>>>;
}
