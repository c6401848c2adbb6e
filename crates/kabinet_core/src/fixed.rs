//! Fixed-width store: positive integer ids and values cut to a fixed width.

use crate::base::{Handle, StoreBase};
use crate::config::Config;
use crate::database::Database;
use crate::diagnostics::Advisory;
use crate::error::{CoreError, CoreResult};
use crate::options::{leading_integer, ModeSpec};
use crate::store::{DefaultMap, DefaultValue, Number, StoreMode, StoreOptions};
use crate::translate::{check, optional, removed, translate};
use kabinet_engine::{ErrorCode, FixedEngine, FixedFile, FixedId};
use std::collections::BTreeMap;
use std::ops::{Bound, ControlFlow, RangeBounds};
use std::path::Path;

/// Key of a fixed-width store: an id or a sentinel resolved at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedKey {
    /// A concrete id; ids start at 1.
    Id(u64),
    /// The smallest stored id.
    Min,
    /// The largest stored id.
    Max,
    /// One below the smallest stored id.
    Prev,
    /// One above the largest stored id, or 1 in an empty store.
    Next,
}

impl From<u64> for FixedKey {
    fn from(id: u64) -> Self {
        Self::Id(id)
    }
}

impl From<u32> for FixedKey {
    fn from(id: u32) -> Self {
        Self::Id(u64::from(id))
    }
}

impl From<&str> for FixedKey {
    /// Reads `min`, `max`, `prev` and `next` in any case; anything else is
    /// read as a leading decimal integer, with 0 for text without one.
    fn from(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "min" => Self::Min,
            "max" => Self::Max,
            "prev" => Self::Prev,
            "next" => Self::Next,
            other => Self::Id(
                leading_integer(other)
                    .and_then(|id| u64::try_from(id).ok())
                    .unwrap_or(0),
            ),
        }
    }
}

impl From<FixedKey> for FixedId {
    fn from(key: FixedKey) -> Self {
        match key {
            FixedKey::Id(id) => Self::Id(id),
            FixedKey::Min => Self::Min,
            FixedKey::Max => Self::Max,
            FixedKey::Prev => Self::Prev,
            FixedKey::Next => Self::Next,
        }
    }
}

/// Selects ids for [`FixedDatabase::keys`].
///
/// Ranges are closed unless made exclusive; an open end reaches the
/// smallest or largest stored id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdQuery {
    prefix: Option<Vec<u8>>,
    range: Option<(Bound<FixedKey>, Bound<FixedKey>)>,
    exclude_start: bool,
    exclude_end: bool,
    limit: Option<usize>,
}

impl IdQuery {
    /// Creates a query selecting every id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key prefix; fixed-width stores reject prefixes without a
    /// range.
    #[must_use]
    pub fn prefix(mut self, prefix: impl AsRef<[u8]>) -> Self {
        self.prefix = Some(prefix.as_ref().to_vec());
        self
    }

    /// Keeps ids inside `range`.
    #[must_use]
    pub fn range<K: Into<FixedKey> + Copy>(mut self, range: impl RangeBounds<K>) -> Self {
        let convert = |bound: Bound<&K>| match bound {
            Bound::Included(key) => Bound::Included((*key).into()),
            Bound::Excluded(key) => Bound::Excluded((*key).into()),
            Bound::Unbounded => Bound::Unbounded,
        };
        self.range = Some((convert(range.start_bound()), convert(range.end_bound())));
        self
    }

    /// Keeps ids from `start` to `finish`, both included.
    #[must_use]
    pub fn between(mut self, start: impl Into<FixedKey>, finish: impl Into<FixedKey>) -> Self {
        self.range = Some((Bound::Included(start.into()), Bound::Included(finish.into())));
        self
    }

    /// Leaves the lower bound out of the range.
    #[must_use]
    pub const fn exclude_start(mut self, value: bool) -> Self {
        self.exclude_start = value;
        self
    }

    /// Leaves the upper bound out of the range.
    #[must_use]
    pub const fn exclude_end(mut self, value: bool) -> Self {
        self.exclude_end = value;
        self
    }

    /// Returns at most `limit` ids.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Default for fixed-width stores.
pub type FixedDefault = DefaultValue<u64, Vec<u8>>;

/// Options for [`FixedDatabase::store_with`]; the resolver receives the
/// resolved id.
pub type FixedOptions<'a> = StoreOptions<'a, u64, [u8]>;

/// A materialized fixed-width store.
pub type FixedMap = DefaultMap<u64, Vec<u8>>;

/// A fixed-width database.
///
/// ```rust
/// use kabinet_core::{Config, FixedDatabase, FixedKey};
///
/// let dir = tempfile::tempdir().unwrap();
/// let config = Config::new().width(4);
/// let mut db = FixedDatabase::open(dir.path().join("ids.tcf"), config).unwrap();
///
/// assert_eq!(db.store(FixedKey::Next, "three").unwrap(), 1);
/// assert_eq!(db.fetch(1u64).unwrap(), b"thre");
/// ```
pub struct FixedDatabase<E: FixedEngine = FixedFile> {
    base: StoreBase<E>,
    default: Option<FixedDefault>,
}

impl FixedDatabase<FixedFile> {
    /// Opens (by default creating) a fixed-width store at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened in the resolved mode.
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        Self::with_engine(FixedFile::new(), path, None, config)
    }

    /// Opens a fixed-width store with an explicit mode argument.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened in the resolved mode.
    pub fn open_with_mode(
        path: impl AsRef<Path>,
        mode: impl Into<ModeSpec>,
        config: Config,
    ) -> CoreResult<Self> {
        Self::with_engine(FixedFile::new(), path, Some(mode.into()), config)
    }
}

impl<E: FixedEngine> FixedDatabase<E> {
    /// Opens a fixed-width store on a caller-supplied engine.
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
        if config.has_fixed_tuning() {
            check(engine.tune(config.fixed_tuning()))?;
        }
        Ok(Self {
            base: StoreBase::open(engine, path.as_ref(), mode, config)?,
            default: None,
        })
    }

    /// Sets the default consulted by [`FixedDatabase::get`].
    #[must_use]
    pub fn with_default(mut self, default: FixedDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Returns the value width in bytes.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn width(&self) -> CoreResult<u32> {
        Ok(self.base.engine()?.width())
    }

    /// Stores `value` under `key` and returns the id written.
    ///
    /// # Errors
    ///
    /// Fails with `Cabinet` for ids outside the store's limits, and on a
    /// read-only or closed store.
    pub fn store(&mut self, key: impl Into<FixedKey>, value: impl AsRef<[u8]>) -> CoreResult<u64> {
        check(self.base.engine_mut()?.put(key.into().into(), value.as_ref()))
    }

    /// Stores `value` in the given mode.
    ///
    /// Returns the id written, or `None` when [`StoreMode::Keep`] found an
    /// existing value. Modes other than replace, keep and cat fall back to a
    /// plain store with an advisory.
    ///
    /// # Errors
    ///
    /// See [`FixedDatabase::store`].
    pub fn store_mode(
        &mut self,
        key: impl Into<FixedKey>,
        value: impl AsRef<[u8]>,
        mode: StoreMode,
    ) -> CoreResult<Option<u64>> {
        let (id, value) = (FixedId::from(key.into()), value.as_ref());
        let mode = match mode {
            StoreMode::Replace | StoreMode::Keep | StoreMode::Cat => mode,
            other => {
                self.base.advise(Advisory::UnsupportedMode {
                    mode: other,
                    store: "fixed-width",
                });
                StoreMode::Replace
            }
        };

        let engine = self.base.engine_mut()?;
        match mode {
            StoreMode::Keep => translate(engine.put_keep(id, value).map(Some), &[(ErrorCode::Keep, None)]),
            StoreMode::Cat => check(engine.put_cat(id, value)).map(Some),
            _ => check(engine.put(id, value)).map(Some),
        }
    }

    /// Stores `value` with [`FixedOptions`].
    ///
    /// # Errors
    ///
    /// See [`FixedDatabase::store`].
    pub fn store_with(
        &mut self,
        key: impl Into<FixedKey>,
        value: impl AsRef<[u8]>,
        options: FixedOptions<'_>,
    ) -> CoreResult<Option<u64>> {
        let StoreOptions { mode, resolver } = options;
        let Some(mut resolver) = resolver else {
            return self.store_mode(key, value, mode.unwrap_or_default());
        };
        if mode.is_some() {
            self.base.advise(Advisory::ResolverSupersedesMode);
        }

        let id = self.resolve(key.into())?;
        let value = value.as_ref();
        let engine = self.base.engine_mut()?;
        check(engine.put_proc(FixedId::Id(id), value, &mut |old: &[u8]| resolver(&id, old, value)))
            .map(Some)
    }

    /// Adds `amount` to the counter under `key` and returns the new total.
    ///
    /// # Errors
    ///
    /// Fails with `Cabinet` when the width cannot hold the counter or the
    /// value is not a counter of the same type.
    pub fn add(&mut self, key: impl Into<FixedKey>, amount: impl Into<Number>) -> CoreResult<Number> {
        let id = FixedId::from(key.into());
        let engine = self.base.engine_mut()?;
        match amount.into() {
            Number::Int(num) => check(engine.add_int(id, num)).map(Number::Int),
            Number::Float(num) => check(engine.add_double(id, num)).map(Number::Float),
        }
    }

    /// Returns the value under `key`.
    ///
    /// # Errors
    ///
    /// Fails with `KeyNotFound` for a missing id, and with `Cabinet` when a
    /// sentinel cannot be resolved.
    pub fn fetch(&self, key: impl Into<FixedKey>) -> CoreResult<Vec<u8>> {
        self.lookup(key.into())?.ok_or(CoreError::KeyNotFound)
    }

    /// Returns the value under `key`, or `default` when it is missing.
    ///
    /// # Errors
    ///
    /// Fails when a sentinel cannot be resolved.
    pub fn fetch_or(&self, key: impl Into<FixedKey>, default: impl Into<Vec<u8>>) -> CoreResult<Vec<u8>> {
        Ok(self.lookup(key.into())?.unwrap_or_else(|| default.into()))
    }

    /// Returns the value under `key`, or computes one when it is missing.
    ///
    /// # Errors
    ///
    /// Fails when a sentinel cannot be resolved.
    pub fn fetch_or_else(
        &self,
        key: impl Into<FixedKey>,
        missing: impl FnOnce(u64) -> Vec<u8>,
    ) -> CoreResult<Vec<u8>> {
        let key = key.into();
        match self.lookup(key)? {
            Some(value) => Ok(value),
            None => Ok(missing(self.resolve(key)?)),
        }
    }

    /// Returns the value under `key`, falling back to `function` and then to
    /// `default`; the function wins over the default with an advisory.
    ///
    /// # Errors
    ///
    /// Fails with `KeyNotFound` when the id is missing and neither fallback
    /// is given.
    pub fn fetch_with(
        &self,
        key: impl Into<FixedKey>,
        default: Option<Vec<u8>>,
        function: Option<&dyn Fn(u64) -> Vec<u8>>,
    ) -> CoreResult<Vec<u8>> {
        let key = key.into();
        if let Some(value) = self.lookup(key)? {
            return Ok(value);
        }
        match (function, default) {
            (Some(function), default) => {
                if default.is_some() {
                    self.base.advise(Advisory::FunctionSupersedesDefault);
                }
                Ok(function(self.resolve(key)?))
            }
            (None, Some(default)) => Ok(default),
            (None, None) => Err(CoreError::KeyNotFound),
        }
    }

    /// Indexing accessor: the value under `key`, else the store default.
    ///
    /// # Errors
    ///
    /// Fails when a sentinel cannot be resolved.
    pub fn get(&self, key: impl Into<FixedKey>) -> CoreResult<Option<Vec<u8>>> {
        let key = key.into();
        if let Some(value) = self.lookup(key)? {
            return Ok(Some(value));
        }
        match &self.default {
            Some(default) => Ok(Some(default.resolve(&self.resolve(key)?))),
            None => Ok(None),
        }
    }

    /// Replaces the store default.
    pub fn set_default(&mut self, default: Option<FixedDefault>) {
        self.default = default;
    }

    /// Removes `key` and returns its value.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn delete(&mut self, key: impl Into<FixedKey>) -> CoreResult<Option<Vec<u8>>> {
        let id = FixedId::from(key.into());
        let engine = self.base.engine_mut()?;
        let Some(value) = optional(engine.get(id))? else {
            return Ok(None);
        };
        removed(engine.out(id))?;
        Ok(Some(value))
    }

    /// Removes `key` and returns its value, or runs `missing`.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn delete_or_else(
        &mut self,
        key: impl Into<FixedKey>,
        missing: impl FnOnce(u64) -> Vec<u8>,
    ) -> CoreResult<Vec<u8>> {
        let key = key.into();
        match self.delete(key)? {
            Some(value) => Ok(value),
            None => Ok(missing(self.resolve(key)?)),
        }
    }

    /// Returns true if `key` is stored.
    ///
    /// # Errors
    ///
    /// Fails when a sentinel cannot be resolved.
    pub fn contains(&self, key: impl Into<FixedKey>) -> CoreResult<bool> {
        Ok(self.lookup(key.into())?.is_some())
    }

    /// Looks up several keys through the indexing accessor.
    ///
    /// # Errors
    ///
    /// See [`FixedDatabase::get`].
    pub fn values_at<K: Into<FixedKey>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> CoreResult<Vec<Option<Vec<u8>>>> {
        keys.into_iter().map(|key| self.get(key)).collect()
    }

    /// Lists ids selected by `query` in ascending order.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` for a prefix without a range.
    pub fn keys(&self, query: &IdQuery) -> CoreResult<Vec<u64>> {
        let engine = self.base.engine()?;
        let (start, finish) = match (&query.range, &query.prefix) {
            (None, Some(_)) => {
                return Err(CoreError::invalid_argument(
                    "fixed-width stores do not support key prefixes",
                ))
            }
            (Some(_), Some(_)) => {
                self.base.advise(Advisory::RangeSupersedesPrefix);
                query.range.unwrap_or((Bound::Unbounded, Bound::Unbounded))
            }
            (range, None) => range.unwrap_or((Bound::Unbounded, Bound::Unbounded)),
        };

        let (lower, skip_first) = lower_bound(exclude(start, query.exclude_start));
        let (upper, skip_last) = upper_bound(exclude(finish, query.exclude_end));
        let mut ids = match (lower, upper) {
            (Some(lower), Some(upper)) => engine.range(lower, upper, None),
            _ => Vec::new(),
        };
        if skip_first && !ids.is_empty() {
            ids.remove(0);
        }
        if skip_last {
            ids.pop();
        }
        if let Some(limit) = query.limit {
            ids.truncate(limit);
        }
        Ok(ids)
    }

    /// Returns every value in id order.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn values(&mut self) -> CoreResult<Vec<Vec<u8>>> {
        let mut values = Vec::new();
        self.each_value(|value| {
            values.push(value.to_vec());
            ControlFlow::Continue(())
        })?;
        Ok(values)
    }

    /// Calls `f` with every id and value in ascending id order until it
    /// breaks.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn each(&mut self, mut f: impl FnMut(u64, &[u8]) -> ControlFlow<()>) -> CoreResult<&mut Self> {
        let engine = self.base.engine_mut()?;
        check(engine.iter_init())?;
        while let Some(id) = optional(engine.iter_next())? {
            let Some(value) = optional(engine.get(FixedId::Id(id)))? else {
                continue;
            };
            if f(id, &value).is_break() {
                break;
            }
        }
        Ok(self)
    }

    /// Calls `f` with every id until it breaks.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn each_key(&mut self, mut f: impl FnMut(u64) -> ControlFlow<()>) -> CoreResult<&mut Self> {
        let engine = self.base.engine_mut()?;
        check(engine.iter_init())?;
        while let Some(id) = optional(engine.iter_next())? {
            if f(id).is_break() {
                break;
            }
        }
        Ok(self)
    }

    /// Calls `f` with every value until it breaks.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn each_value(&mut self, mut f: impl FnMut(&[u8]) -> ControlFlow<()>) -> CoreResult<&mut Self> {
        self.each(|_, value| f(value))
    }

    /// Deletes every record for which `f` returns true.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn delete_if(&mut self, mut f: impl FnMut(u64, &[u8]) -> bool) -> CoreResult<&mut Self> {
        let engine = self.base.engine_mut()?;
        check(engine.iter_init())?;
        while let Some(id) = optional(engine.iter_next())? {
            let Some(value) = optional(engine.get(FixedId::Id(id)))? else {
                continue;
            };
            if f(id, &value) {
                removed(engine.out(FixedId::Id(id)))?;
            }
        }
        Ok(self)
    }

    /// Stores every pair, replacing existing values.
    ///
    /// # Errors
    ///
    /// See [`FixedDatabase::store`].
    pub fn update<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>) -> CoreResult<&mut Self>
    where
        K: Into<FixedKey>,
        V: AsRef<[u8]>,
    {
        for (key, value) in pairs {
            self.store(key, value)?;
        }
        Ok(self)
    }

    /// Stores every pair, resolving existing ids with `resolver`.
    ///
    /// # Errors
    ///
    /// See [`FixedDatabase::store`].
    pub fn update_with<K, V>(
        &mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
        mut resolver: impl FnMut(&u64, &[u8], &[u8]) -> Vec<u8>,
    ) -> CoreResult<&mut Self>
    where
        K: Into<FixedKey>,
        V: AsRef<[u8]>,
    {
        for (key, value) in pairs {
            let options: FixedOptions<'_> = StoreOptions::new().resolver(&mut resolver);
            self.store_with(key, value, options)?;
        }
        Ok(self)
    }

    /// Materializes every record, optionally keeping the store default.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    pub fn to_map(&mut self, keep_default: bool) -> CoreResult<FixedMap> {
        let mut entries = BTreeMap::new();
        self.each(|id, value| {
            entries.insert(id, value.to_vec());
            ControlFlow::Continue(())
        })?;
        let default = if keep_default { self.default.clone() } else { None };
        Ok(DefaultMap::new(entries, default))
    }

    fn lookup(&self, key: FixedKey) -> CoreResult<Option<Vec<u8>>> {
        optional(self.base.engine()?.get(key.into()))
    }

    fn resolve(&self, key: FixedKey) -> CoreResult<u64> {
        check(self.base.engine()?.resolve_id(key.into()))
    }
}

fn exclude(bound: Bound<FixedKey>, exclude: bool) -> Bound<FixedKey> {
    match bound {
        Bound::Included(key) if exclude => Bound::Excluded(key),
        other => other,
    }
}

/// Inclusive engine bound for a lower range end, and whether the first id
/// found must be dropped.
fn lower_bound(bound: Bound<FixedKey>) -> (Option<FixedId>, bool) {
    match bound {
        Bound::Unbounded => (Some(FixedId::Min), false),
        Bound::Included(key) => (Some(key.into()), false),
        Bound::Excluded(FixedKey::Id(id)) => (id.checked_add(1).map(FixedId::Id), false),
        Bound::Excluded(FixedKey::Min) => (Some(FixedId::Min), true),
        Bound::Excluded(key) => (Some(key.into()), false),
    }
}

/// Inclusive engine bound for an upper range end, and whether the last id
/// found must be dropped.
fn upper_bound(bound: Bound<FixedKey>) -> (Option<FixedId>, bool) {
    match bound {
        Bound::Unbounded => (Some(FixedId::Max), false),
        Bound::Included(key) => (Some(key.into()), false),
        Bound::Excluded(FixedKey::Id(id)) => (id.checked_sub(1).map(FixedId::Id), false),
        Bound::Excluded(FixedKey::Max) => (Some(FixedId::Max), true),
        Bound::Excluded(key) => (Some(key.into()), false),
    }
}

impl<E: FixedEngine> Handle for FixedDatabase<E> {
    type Engine = E;

    fn base(&self) -> &StoreBase<E> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StoreBase<E> {
        &mut self.base
    }
}

impl<E: FixedEngine> Database for FixedDatabase<E> {
    fn optimize(&mut self, options: &Config) -> CoreResult<()> {
        self.base.advise_config(options);
        let tuning = options.fixed_tuning();
        check(self.base.engine_mut()?.optimize(tuning))
    }

    /// Fixed-width files never fragment; this only checks the store is
    /// open.
    fn defrag(&mut self, _steps: i64) -> CoreResult<()> {
        self.base.engine()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn open_db(dir: &TempDir, config: Config) -> FixedDatabase {
        FixedDatabase::open(dir.path().join("test.tcf"), config).unwrap()
    }

    #[test]
    fn keys_parse_from_text() {
        assert_eq!(FixedKey::from("MIN"), FixedKey::Min);
        assert_eq!(FixedKey::from("next"), FixedKey::Next);
        assert_eq!(FixedKey::from("42abc"), FixedKey::Id(42));
        assert_eq!(FixedKey::from("-3"), FixedKey::Id(0));
        assert_eq!(FixedKey::from(7u32), FixedKey::Id(7));
    }

    #[test]
    fn sentinels_resolve_against_stored_ids() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir, Config::default());

        assert!(matches!(db.fetch(FixedKey::Min), Err(CoreError::Cabinet { .. })));
        assert!(matches!(db.store(FixedKey::Prev, "x"), Err(CoreError::Cabinet { .. })));
        assert_eq!(db.store(FixedKey::Next, "one").unwrap(), 1);
        assert_eq!(db.store(FixedKey::Next, "two").unwrap(), 2);
        assert_eq!(db.store(10u64, "ten").unwrap(), 10);

        assert_eq!(db.fetch(FixedKey::Min).unwrap(), b"one");
        assert_eq!(db.fetch(FixedKey::Max).unwrap(), b"ten");
        assert_eq!(db.fetch("2").unwrap(), b"two");
        assert!(matches!(db.fetch(5u64), Err(CoreError::KeyNotFound)));
        assert_eq!(db.fetch_or_else(FixedKey::Next, |id| id.to_string().into_bytes()).unwrap(), b"11");
    }

    #[test]
    fn sentinels_on_an_empty_store_fail_to_resolve() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir, Config::default());

        assert!(matches!(db.resolve(FixedKey::Min), Err(CoreError::Cabinet { .. })));
        assert!(matches!(db.resolve(FixedKey::Id(0)), Err(CoreError::Cabinet { .. })));
        assert_eq!(db.resolve(FixedKey::Next).unwrap(), 1);

        let options = FixedOptions::new().resolver(|_: &u64, old: &[u8], _: &[u8]| old.to_vec());
        assert!(matches!(db.store_with(FixedKey::Prev, "x", options), Err(CoreError::Cabinet { .. })));
        assert!(db.is_empty().unwrap());
    }

    #[test]
    fn values_are_cut_to_width() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir, Config::new().width(4));

        assert_eq!(db.width().unwrap(), 4);
        db.store(1u64, "three").unwrap();
        assert_eq!(db.fetch(1u64).unwrap(), b"thre");

        db.optimize(&Config::new().width(2)).unwrap();
        assert_eq!(db.fetch(1u64).unwrap(), b"th");
    }

    #[test]
    fn size_limit_rejects_far_ids() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir, Config::new().width(4).limsiz(1024));
        assert!(matches!(db.store(1_000_000u64, "far"), Err(CoreError::Cabinet { .. })));
    }

    #[test]
    fn modes_and_resolvers() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir, Config::default());

        assert_eq!(db.store_mode(1u64, "a", StoreMode::Keep).unwrap(), Some(1));
        assert_eq!(db.store_mode(1u64, "b", StoreMode::Keep).unwrap(), None);
        db.store_mode(1u64, "c", StoreMode::Cat).unwrap();
        assert_eq!(db.fetch(1u64).unwrap(), b"ac");

        db.store_mode(1u64, "d", StoreMode::Dup).unwrap();
        assert_eq!(db.fetch(1u64).unwrap(), b"d");
        assert_eq!(
            db.take_advisories(),
            vec![Advisory::UnsupportedMode {
                mode: StoreMode::Dup,
                store: "fixed-width"
            }]
        );

        let options = FixedOptions::new().resolver(|id: &u64, old: &[u8], new: &[u8]| {
            [id.to_string().as_bytes(), old, new].concat()
        });
        assert_eq!(db.store_with(1u64, "e", options).unwrap(), Some(1));
        assert_eq!(db.fetch(1u64).unwrap(), b"1de");

        db.update_with([(1u64, "f"), (2u64, "g")], |_, old, new| [new, old].concat())
            .unwrap();
        assert_eq!(db.fetch(1u64).unwrap(), b"f1de");
        assert_eq!(db.fetch(2u64).unwrap(), b"g");
    }

    #[test]
    fn counters_need_room() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir, Config::default());
        assert_eq!(db.add(1u64, 5).unwrap(), Number::Int(5));
        assert_eq!(db.add(1u64, -2).unwrap(), Number::Int(3));

        let dir = tempdir().unwrap();
        let mut narrow = open_db(&dir, Config::new().width(2));
        assert!(matches!(narrow.add(1u64, 1), Err(CoreError::Cabinet { .. })));
    }

    #[test]
    fn key_ranges_and_prefixes() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir, Config::default());
        db.update([3u64, 1, 2, 5, 6].map(|id| (id, "v"))).unwrap();

        assert_eq!(db.keys(&IdQuery::new()).unwrap(), vec![1, 2, 3, 5, 6]);
        assert_eq!(db.keys(&IdQuery::new().between(2u64, 5u64)).unwrap(), vec![2, 3, 5]);
        assert_eq!(db.keys(&IdQuery::new().range(2u64..5)).unwrap(), vec![2, 3]);
        assert_eq!(
            db.keys(&IdQuery::new().between(2u64, 5u64).exclude_start(true)).unwrap(),
            vec![3, 5]
        );
        assert_eq!(
            db.keys(&IdQuery::new().between(FixedKey::Min, FixedKey::Max).exclude_end(true))
                .unwrap(),
            vec![1, 2, 3, 5]
        );
        assert_eq!(db.keys(&IdQuery::new().range(3u64..).limit(2)).unwrap(), vec![3, 5]);

        assert!(matches!(
            db.keys(&IdQuery::new().prefix("1")),
            Err(CoreError::InvalidArgument(_))
        ));
        assert_eq!(db.keys(&IdQuery::new().prefix("1").between(5u64, 6u64)).unwrap(), vec![5, 6]);
        assert_eq!(db.take_advisories(), vec![Advisory::RangeSupersedesPrefix]);
    }

    #[test]
    fn iteration_and_defaults() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir, Config::default());
        db.update([(2u64, "b"), (1u64, "a"), (3u64, "c")]).unwrap();

        let mut ids = Vec::new();
        db.each_key(|id| {
            ids.push(id);
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(db.values().unwrap(), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        db.delete_if(|id, _| id % 2 == 1).unwrap();
        assert_eq!(db.keys(&IdQuery::new()).unwrap(), vec![2]);
        assert_eq!(db.delete(2u64).unwrap(), Some(b"b".to_vec()));
        assert_eq!(db.delete_or_else(2u64, |id| vec![b'0' + id as u8]).unwrap(), b"2");

        db.set_default(Some(FixedDefault::function(|id: &u64| id.to_string().into_bytes())));
        assert_eq!(db.get(9u64).unwrap(), Some(b"9".to_vec()));
        assert_eq!(db.values_at([9u64]).unwrap(), vec![Some(b"9".to_vec())]);
        assert_eq!(db.to_map(true).unwrap().get(&4), Some(b"4".to_vec()));
        assert!(!db.contains(9u64).unwrap());
        db.defrag(0).unwrap();
    }
}
