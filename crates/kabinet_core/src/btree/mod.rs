//! Ordered store: sorted byte keys, duplicates, cursors and key ranges.

mod cursor;

pub use cursor::Cursor;

use crate::base::{Handle, StoreBase};
use crate::config::{cache_size, Config};
use crate::database::Database;
use crate::diagnostics::Advisory;
use crate::error::CoreResult;
use crate::options::ModeSpec;
use crate::store::{KeyQuery, KeyValue, KvHandle, StoreMode, ValueDefault};
use crate::translate::{check, optional, removed};
use kabinet_engine::{OrderedEngine, TreeFile};
use std::ops::{Bound, ControlFlow};
use std::path::Path;

/// A B-tree database.
///
/// Keys are kept in order: lexical byte order by default, or the order of
/// the comparator installed through [`Config::comparator`].
///
/// ```rust
/// use kabinet_core::{BTreeDatabase, Config, KeyValue, StoreMode};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut db = BTreeDatabase::open(dir.path().join("names.tcb"), Config::default()).unwrap();
///
/// db.store("Gray", "Dana").unwrap();
/// db.store_mode("Gray", "James", StoreMode::Dup).unwrap();
/// assert_eq!(db.fetch("Gray").unwrap(), b"Dana");
/// assert_eq!(db.values_for("Gray").unwrap(), vec![b"Dana".to_vec(), b"James".to_vec()]);
/// ```
pub struct BTreeDatabase<E: OrderedEngine = TreeFile> {
    base: StoreBase<E>,
    default: Option<ValueDefault>,
}

impl BTreeDatabase<TreeFile> {
    /// Opens (by default creating) an ordered store at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened in the resolved mode.
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        Self::with_engine(TreeFile::new(), path, None, config)
    }

    /// Opens an ordered store with an explicit mode argument.
    ///
    /// A mode set in `config` wins over `mode`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened in the resolved mode.
    pub fn open_with_mode(
        path: impl AsRef<Path>,
        mode: impl Into<ModeSpec>,
        config: Config,
    ) -> CoreResult<Self> {
        Self::with_engine(TreeFile::new(), path, Some(mode.into()), config)
    }
}

impl<E: OrderedEngine> BTreeDatabase<E> {
    /// Opens an ordered store on a caller-supplied engine.
    ///
    /// # Errors
    ///
    /// Fails when the engine rejects the tuning or cannot open the file.
    pub fn with_engine(
        mut engine: E,
        path: impl AsRef<Path>,
        mode: Option<ModeSpec>,
        mut config: Config,
    ) -> CoreResult<Self> {
        let mode = config.open_mode(mode);
        if config.has_tree_tuning() {
            check(engine.tune_tree(config.tree_tuning()))?;
        }
        if config.lcnum.is_some() || config.ncnum.is_some() {
            check(engine.set_tree_cache(cache_size(config.lcnum), cache_size(config.ncnum)))?;
        }
        if let Some(comparator) = config.comparator.clone() {
            check(engine.set_comparator(Box::new(move |a: &[u8], b: &[u8]| comparator(a, b))))?;
        }
        Ok(Self {
            base: StoreBase::open(engine, path.as_ref(), mode, config)?,
            default: None,
        })
    }

    /// Sets the default consulted by [`KeyValue::get`].
    #[must_use]
    pub fn with_default(mut self, default: ValueDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Opens a forward cursor at the first key, or the first key at or after
    /// `start`.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn cursor(&mut self, start: Option<&[u8]>) -> CoreResult<Cursor<'_, E>> {
        Cursor::open(self.base.engine_mut()?, start, false)
    }

    /// Opens a reverse cursor at the last key, or the last key at or before
    /// `start`.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn reverse_cursor(&mut self, start: Option<&[u8]>) -> CoreResult<Cursor<'_, E>> {
        Cursor::open(self.base.engine_mut()?, start, true)
    }

    /// Calls `f` with every record from `start` on, in key order.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn each_from(
        &mut self,
        start: Option<&[u8]>,
        f: impl FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> CoreResult<&mut Self> {
        self.walk(start, false, f)?;
        Ok(self)
    }

    /// Calls `f` with the key of every record from `start` on.
    ///
    /// Keys holding duplicates are visited once per value.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn each_key_from(
        &mut self,
        start: Option<&[u8]>,
        mut f: impl FnMut(&[u8]) -> ControlFlow<()>,
    ) -> CoreResult<&mut Self> {
        self.walk(start, false, |key, _| f(key))?;
        Ok(self)
    }

    /// Calls `f` with every value from `start` on.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn each_value_from(
        &mut self,
        start: Option<&[u8]>,
        mut f: impl FnMut(&[u8]) -> ControlFlow<()>,
    ) -> CoreResult<&mut Self> {
        self.walk(start, false, |_, value| f(value))?;
        Ok(self)
    }

    /// Calls `f` with every record from `start` back, in reverse key order.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn reverse_each(
        &mut self,
        start: Option<&[u8]>,
        f: impl FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> CoreResult<&mut Self> {
        self.walk(start, true, f)?;
        Ok(self)
    }

    /// Deletes every record from `start` on for which `f` returns true.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn delete_if_from(
        &mut self,
        start: Option<&[u8]>,
        mut f: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> CoreResult<&mut Self> {
        let mut cursor = Cursor::open(self.base.engine_mut()?, start, false)?;
        while let Some((key, value)) = cursor.pair()? {
            let moved = if f(&key, &value) {
                cursor.delete()?
            } else {
                cursor.next()?
            };
            if !moved {
                break;
            }
        }
        drop(cursor);
        Ok(self)
    }

    /// Returns every value stored under `key`, in insertion order.
    ///
    /// A missing key yields an empty list.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn values_for(&self, key: impl AsRef<[u8]>) -> CoreResult<Vec<Vec<u8>>> {
        Ok(optional(self.base.engine()?.get_list(key.as_ref()))?.unwrap_or_default())
    }

    /// Removes every value stored under `key` and returns them.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn delete_all(&mut self, key: impl AsRef<[u8]>) -> CoreResult<Vec<Vec<u8>>> {
        let key = key.as_ref();
        let engine = self.base.engine_mut()?;
        let Some(values) = optional(engine.get_list(key))? else {
            return Ok(Vec::new());
        };
        removed(engine.out_list(key))?;
        Ok(values)
    }

    /// Returns the number of values stored under `key`.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn count(&self, key: impl AsRef<[u8]>) -> CoreResult<usize> {
        Ok(self.base.engine()?.value_count(key.as_ref()))
    }

    fn walk(
        &mut self,
        start: Option<&[u8]>,
        reverse: bool,
        mut f: impl FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> CoreResult<()> {
        let mut cursor = Cursor::open(self.base.engine_mut()?, start, reverse)?;
        while let Some((key, value)) = cursor.pair()? {
            if f(&key, &value).is_break() || !cursor.next()? {
                break;
            }
        }
        Ok(())
    }
}

fn split_bound(bound: Bound<&[u8]>) -> (Option<&[u8]>, bool) {
    match bound {
        Bound::Included(key) => (Some(key), true),
        Bound::Excluded(key) => (Some(key), false),
        Bound::Unbounded => (None, true),
    }
}

impl<E: OrderedEngine> Handle for BTreeDatabase<E> {
    type Engine = E;

    fn base(&self) -> &StoreBase<E> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StoreBase<E> {
        &mut self.base
    }
}

impl<E: OrderedEngine> Database for BTreeDatabase<E> {
    fn optimize(&mut self, options: &Config) -> CoreResult<()> {
        self.base.advise_config(options);
        let tuning = options.tree_tuning();
        check(self.base.engine_mut()?.optimize_tree(tuning))
    }
}

impl<E: OrderedEngine> KvHandle for BTreeDatabase<E> {
    type Kv = E;

    const VARIANT: &'static str = "b-tree";

    fn kv_base(&self) -> &StoreBase<E> {
        &self.base
    }

    fn kv_base_mut(&mut self) -> &mut StoreBase<E> {
        &mut self.base
    }

    fn kv_default(&self) -> Option<&ValueDefault> {
        self.default.as_ref()
    }

    fn kv_default_mut(&mut self) -> &mut Option<ValueDefault> {
        &mut self.default
    }

    fn supports(_mode: StoreMode) -> bool {
        true
    }

    fn put_duplicate(&mut self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        check(self.base.engine_mut()?.put_dup(key, value))
    }
}

impl<E: OrderedEngine> KeyValue for BTreeDatabase<E> {
    /// Lists unique keys by prefix, or by range in store order.
    ///
    /// A range wins over a prefix, with an advisory.
    fn keys(&self, query: &KeyQuery) -> CoreResult<Vec<Vec<u8>>> {
        let engine = self.base.engine()?;
        let Some((start, finish)) = query.bounds() else {
            let prefix = query.prefix.as_deref().unwrap_or_default();
            return Ok(engine.fwmkeys(prefix, query.limit));
        };
        if query.prefix.is_some() {
            self.base.advise(Advisory::RangeSupersedesPrefix);
        }
        let (start, start_inclusive) = split_bound(start);
        let (finish, finish_inclusive) = split_bound(finish);
        Ok(engine.range(start, start_inclusive, finish, finish_inclusive, query.limit))
    }

    fn each(
        &mut self,
        f: impl FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> CoreResult<&mut Self> {
        self.each_from(None, f)
    }

    fn each_key(&mut self, f: impl FnMut(&[u8]) -> ControlFlow<()>) -> CoreResult<&mut Self> {
        self.each_key_from(None, f)
    }

    fn each_value(&mut self, f: impl FnMut(&[u8]) -> ControlFlow<()>) -> CoreResult<&mut Self> {
        self.each_value_from(None, f)
    }

    fn delete_if(&mut self, f: impl FnMut(&[u8], &[u8]) -> bool) -> CoreResult<&mut Self> {
        self.delete_if_from(None, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::store::Number;
    use tempfile::{tempdir, TempDir};

    fn open_db(dir: &TempDir) -> BTreeDatabase {
        BTreeDatabase::open(dir.path().join("test.tcb"), Config::default()).unwrap()
    }

    fn letters(db: &mut BTreeDatabase) {
        for key in ["a", "b", "c", "d", "e"] {
            db.store(key, key.to_uppercase()).unwrap();
        }
    }

    fn collect_keys(db: &mut BTreeDatabase, start: Option<&[u8]>, reverse: bool) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        let visit = |key: &[u8], _: &[u8]| {
            keys.push(key.to_vec());
            ControlFlow::Continue(())
        };
        if reverse {
            db.reverse_each(start, visit).unwrap();
        } else {
            db.each_from(start, visit).unwrap();
        }
        keys
    }

    #[test]
    fn duplicates_are_kept_in_insertion_order() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        db.store("Gray", "Dana").unwrap();
        db.store_mode("Gray", "James", StoreMode::Dup).unwrap();
        db.store("Matsumoto", "Yukihiro").unwrap();

        assert_eq!(db.fetch("Gray").unwrap(), b"Dana");
        assert_eq!(db.count("Gray").unwrap(), 2);
        assert_eq!(db.count("Nobody").unwrap(), 0);
        assert_eq!(db.size().unwrap(), 3);
        assert_eq!(db.keys(&KeyQuery::new()).unwrap().len(), 2);
        assert_eq!(db.values().unwrap().len(), 3);

        assert_eq!(db.delete("Gray").unwrap(), Some(b"Dana".to_vec()));
        assert_eq!(db.values_for("Gray").unwrap(), vec![b"James".to_vec()]);

        db.store_mode("Gray", "Dana", StoreMode::Dup).unwrap();
        assert_eq!(
            db.delete_all("Gray").unwrap(),
            vec![b"James".to_vec(), b"Dana".to_vec()]
        );
        assert!(db.values_for("Gray").unwrap().is_empty());
        assert!(db.delete_all("Gray").unwrap().is_empty());
    }

    #[test]
    fn iteration_visits_every_duplicate() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        db.store("k", "1").unwrap();
        db.store_mode("k", "2", StoreMode::Dup).unwrap();

        let mut pairs = Vec::new();
        db.each(|key, value| {
            pairs.push((key.to_vec(), value.to_vec()));
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(
            pairs,
            vec![(b"k".to_vec(), b"1".to_vec()), (b"k".to_vec(), b"2".to_vec())]
        );
    }

    #[test]
    fn iteration_from_a_start_key() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        letters(&mut db);

        assert_eq!(collect_keys(&mut db, Some(b"bb"), false).len(), 3);
        assert_eq!(collect_keys(&mut db, Some(b"c"), false)[0], b"c");
        assert_eq!(
            collect_keys(&mut db, Some(b"cc"), true),
            vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]
        );
        assert_eq!(collect_keys(&mut db, None, true)[0], b"e");

        let mut values = Vec::new();
        db.each_value_from(Some(b"d"), |value| {
            values.push(value.to_vec());
            ControlFlow::Break(())
        })
        .unwrap();
        assert_eq!(values, vec![b"D".to_vec()]);
    }

    #[test]
    fn delete_if_from_a_start_key() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        letters(&mut db);

        db.delete_if_from(Some(b"c"), |key, _| key != b"d").unwrap();
        assert_eq!(
            db.keys(&KeyQuery::new()).unwrap(),
            vec![b"a".to_vec(), b"b".to_vec(), b"d".to_vec()]
        );

        db.delete_if(|_, _| true).unwrap();
        assert!(db.is_empty().unwrap());
    }

    #[test]
    fn cursor_walks_both_ways() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        letters(&mut db);

        let mut cursor = db.cursor(Some(b"d")).unwrap();
        assert_eq!(cursor.pair().unwrap(), Some((b"d".to_vec(), b"D".to_vec())));
        assert!(cursor.next().unwrap());
        assert!(!cursor.next().unwrap());
        assert_eq!(cursor.key().unwrap(), None);
        drop(cursor);

        let mut cursor = db.reverse_cursor(None).unwrap();
        assert_eq!(cursor.key().unwrap(), Some(b"e".to_vec()));
        assert!(cursor.delete().unwrap());
        assert_eq!(cursor.key().unwrap(), Some(b"d".to_vec()));
        drop(cursor);
        assert_eq!(db.size().unwrap(), 4);
    }

    #[test]
    fn key_ranges() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        letters(&mut db);

        let keys = |db: &BTreeDatabase, query: KeyQuery| db.keys(&query).unwrap();
        assert_eq!(keys(&db, KeyQuery::new().between("b", "d")).len(), 3);
        assert_eq!(keys(&db, KeyQuery::new().range("b".."d")).len(), 2);
        assert_eq!(
            keys(&db, KeyQuery::new().between("b", "d").exclude_start(true)),
            vec![b"c".to_vec(), b"d".to_vec()]
        );
        assert_eq!(keys(&db, KeyQuery::new().between("b", "d").exclude_end(true)).len(), 2);
        assert_eq!(keys(&db, KeyQuery::new().range("c"..)).len(), 3);
        assert_eq!(keys(&db, KeyQuery::new().range(.."b")), vec![b"a".to_vec()]);
        assert_eq!(keys(&db, KeyQuery::new().between("aa", "cc").limit(1)), vec![b"b".to_vec()]);

        db.take_advisories();
        assert_eq!(keys(&db, KeyQuery::new().prefix("a").between("d", "e")).len(), 2);
        assert_eq!(db.take_advisories(), vec![Advisory::RangeSupersedesPrefix]);
    }

    #[test]
    fn comparator_governs_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reverse.tcb");
        let config = Config::new().comparator(|a: &[u8], b: &[u8]| b.cmp(a));
        let mut db = BTreeDatabase::open(&path, config).unwrap();
        letters(&mut db);

        assert_eq!(db.keys(&KeyQuery::new()).unwrap()[0], b"e");
        assert_eq!(
            db.keys(&KeyQuery::new().between("d", "b")).unwrap(),
            vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec()]
        );
        assert_eq!(collect_keys(&mut db, Some(b"cc"), false)[0], b"c");

        let by_length = Config::new().comparator(|a: &[u8], b: &[u8]| {
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        });
        let mut other = BTreeDatabase::open(dir.path().join("length.tcb"), by_length).unwrap();
        other.update([("ccc", "3"), ("a", "1"), ("bb", "2")]).unwrap();
        let ordered = other.keys(&KeyQuery::new()).unwrap();
        assert_eq!(ordered, vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
    }

    #[test]
    fn counters_keep_their_type() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        assert_eq!(db.add("count", 0).unwrap(), Number::Int(0));
        assert_eq!(db.add("count", 1).unwrap(), Number::Int(1));
        assert_eq!(db.add("count", -1).unwrap(), Number::Int(0));
        assert!(matches!(db.add("count", 1.0), Err(CoreError::Cabinet { .. })));
        assert_eq!(db.add("ratio", 1.5).unwrap(), Number::Float(1.5));
        assert!(matches!(db.add("ratio", 1), Err(CoreError::Cabinet { .. })));
    }

    #[test]
    fn tuning_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tuned.tcb");
        let config = Config::new().lmemb(64).nmemb(128).bnum(100).lcnum(10).ncnum(5);
        let mut db = BTreeDatabase::open(&path, config).unwrap();
        letters(&mut db);
        db.optimize(&Config::new().lmemb(32)).unwrap();
        db.close().unwrap();
        assert!(matches!(db.cursor(None), Err(CoreError::Closed)));

        let mut db = BTreeDatabase::open_with_mode(&path, "r", Config::default()).unwrap();
        assert_eq!(collect_keys(&mut db, None, false).len(), 5);
    }
}
