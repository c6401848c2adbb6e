//! The key-value contract shared by the hash and ordered stores, and the
//! value types every store uses.

use crate::base::StoreBase;
use crate::database::Database;
use crate::diagnostics::Advisory;
use crate::error::{CoreError, CoreResult};
use crate::translate::{check, kept, optional, removed};
use kabinet_engine::HashEngine;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Bound, ControlFlow, RangeBounds};
use std::sync::Arc;

/// How `store_mode` writes a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreMode {
    /// Replace any existing value.
    #[default]
    Replace,
    /// Leave an existing value alone and report `false`.
    Keep,
    /// Append to an existing value, or create it.
    Cat,
    /// Buffered write; durable after the next flush.
    Async,
    /// Add another value under the key (ordered stores only).
    Dup,
}

/// An accumulator delta, and the accumulated total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integer accumulation.
    Int(i32),
    /// Floating point accumulation.
    Float(f64),
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl Number {
    /// Returns the integer total, if this is one.
    #[must_use]
    pub const fn as_int(self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(value),
            Self::Float(_) => None,
        }
    }

    /// Returns the total as a float.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => f64::from(value),
            Self::Float(value) => value,
        }
    }
}

/// Fallback for keys a store does not hold.
///
/// Consulted by the indexing accessor (`get`), never by `fetch`.
pub enum DefaultValue<K: ?Sized, V> {
    /// The same value for every key.
    Value(V),
    /// A value computed from the key.
    Function(Arc<dyn Fn(&K) -> V + Send + Sync>),
}

impl<K: ?Sized, V: Clone> DefaultValue<K, V> {
    /// Creates a constant default.
    pub fn value(value: impl Into<V>) -> Self {
        Self::Value(value.into())
    }

    /// Creates a default computed from the key.
    pub fn function(function: impl Fn(&K) -> V + Send + Sync + 'static) -> Self {
        Self::Function(Arc::new(function))
    }

    /// Returns the default for `key`.
    pub fn resolve(&self, key: &K) -> V {
        match self {
            Self::Value(value) => value.clone(),
            Self::Function(function) => function(key),
        }
    }
}

impl<K: ?Sized, V: Clone> Clone for DefaultValue<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(value) => Self::Value(value.clone()),
            Self::Function(function) => Self::Function(Arc::clone(function)),
        }
    }
}

impl<K: ?Sized, V: fmt::Debug> fmt::Debug for DefaultValue<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Default for byte-keyed stores.
pub type ValueDefault = DefaultValue<[u8], Vec<u8>>;

/// Options for `store_with`.
///
/// A resolver receives `(key, old value, new value)` when the key already
/// exists and returns the value to store. It supersedes the mode.
pub struct StoreOptions<'a, K: ?Sized, V: ?Sized + ToOwned> {
    pub(crate) mode: Option<StoreMode>,
    pub(crate) resolver: Option<Resolver<'a, K, V>>,
}

type Resolver<'a, K, V> = Box<dyn FnMut(&K, &V, &V) -> <V as ToOwned>::Owned + 'a>;

/// Options for byte-keyed stores.
pub type ValueOptions<'a> = StoreOptions<'a, [u8], [u8]>;

impl<'a, K: ?Sized, V: ?Sized + ToOwned> StoreOptions<'a, K, V> {
    /// Creates options with no mode and no resolver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: None,
            resolver: None,
        }
    }

    /// Sets the store mode.
    #[must_use]
    pub fn mode(mut self, mode: StoreMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the resolver used when the key already exists.
    #[must_use]
    pub fn resolver(mut self, resolver: impl FnMut(&K, &V, &V) -> V::Owned + 'a) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }
}

impl<K: ?Sized, V: ?Sized + ToOwned> Default for StoreOptions<'_, K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Selects keys for `keys`.
///
/// Every store honors `prefix` and `limit`. Ordered stores also honor a
/// range: closed by default, with `exclude_start` dropping the lower bound
/// and an exclusive range or `exclude_end` dropping the upper bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyQuery {
    pub(crate) prefix: Option<Vec<u8>>,
    pub(crate) range: Option<(Bound<Vec<u8>>, Bound<Vec<u8>>)>,
    pub(crate) exclude_start: bool,
    pub(crate) exclude_end: bool,
    pub(crate) limit: Option<usize>,
}

impl KeyQuery {
    /// Creates a query selecting every key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps keys starting with `prefix`.
    #[must_use]
    pub fn prefix(mut self, prefix: impl AsRef<[u8]>) -> Self {
        self.prefix = Some(prefix.as_ref().to_vec());
        self
    }

    /// Keeps keys inside `range`.
    #[must_use]
    pub fn range<K: AsRef<[u8]>>(mut self, range: impl RangeBounds<K>) -> Self {
        self.range = Some((
            owned_bound(range.start_bound()),
            owned_bound(range.end_bound()),
        ));
        self
    }

    /// Keeps keys from `start` to `finish`, both included.
    #[must_use]
    pub fn between(self, start: impl AsRef<[u8]>, finish: impl AsRef<[u8]>) -> Self {
        self.range(start.as_ref()..=finish.as_ref())
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

    /// Returns at most `limit` keys.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Lower and upper bounds with the exclusion flags applied.
    pub(crate) fn bounds(&self) -> Option<(Bound<&[u8]>, Bound<&[u8]>)> {
        let (start, finish) = self.range.as_ref()?;
        Some((
            apply_exclusion(start, self.exclude_start),
            apply_exclusion(finish, self.exclude_end),
        ))
    }
}

fn owned_bound<K: AsRef<[u8]>>(bound: Bound<&K>) -> Bound<Vec<u8>> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_ref().to_vec()),
        Bound::Excluded(key) => Bound::Excluded(key.as_ref().to_vec()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

fn apply_exclusion(bound: &Bound<Vec<u8>>, exclude: bool) -> Bound<&[u8]> {
    match bound {
        Bound::Included(key) if exclude => Bound::Excluded(key),
        Bound::Included(key) => Bound::Included(key),
        Bound::Excluded(key) => Bound::Excluded(key),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// A materialized store: its entries plus, optionally, its default.
#[derive(Debug, Clone)]
pub struct DefaultMap<K: Ord, V, Q: ?Sized = K> {
    entries: BTreeMap<K, V>,
    default: Option<DefaultValue<Q, V>>,
}

impl<K: Ord, V: Clone, Q: ?Sized + Ord> DefaultMap<K, V, Q>
where
    K: Borrow<Q>,
{
    pub(crate) fn new(entries: BTreeMap<K, V>, default: Option<DefaultValue<Q, V>>) -> Self {
        Self { entries, default }
    }

    /// Returns the stored value, or the default for missing keys.
    pub fn get(&self, key: &Q) -> Option<V> {
        self.entries
            .get(key)
            .cloned()
            .or_else(|| self.default.as_ref().map(|default| default.resolve(key)))
    }

    /// Returns the materialized entries.
    pub const fn entries(&self) -> &BTreeMap<K, V> {
        &self.entries
    }

    /// Returns true if the map kept a default.
    pub const fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entries, dropping the default.
    pub fn into_entries(self) -> BTreeMap<K, V> {
        self.entries
    }
}

/// A materialized byte-keyed store.
pub type ValueMap = DefaultMap<Vec<u8>, Vec<u8>, [u8]>;

/// Store-side hooks behind [`KeyValue`].
///
/// Public because it bounds [`KeyValue`], but not re-exported: code outside
/// this crate cannot name it, so only this crate's stores implement it.
pub trait KvHandle {
    /// The engine the store drives.
    type Kv: HashEngine;

    /// Store variant name used in advisories.
    const VARIANT: &'static str;

    /// Returns the shared state.
    fn kv_base(&self) -> &StoreBase<Self::Kv>;

    /// Returns the shared state mutably.
    fn kv_base_mut(&mut self) -> &mut StoreBase<Self::Kv>;

    /// Returns the default resolver.
    fn kv_default(&self) -> Option<&ValueDefault>;

    /// Returns the default resolver slot.
    fn kv_default_mut(&mut self) -> &mut Option<ValueDefault>;

    /// Returns true if the store implements `mode`.
    fn supports(mode: StoreMode) -> bool;

    /// Writes a duplicate value.
    fn put_duplicate(&mut self, key: &[u8], value: &[u8]) -> CoreResult<()>;
}

/// Byte-keyed CRUD, counters and iteration.
///
/// Implemented by [`HashDatabase`](crate::HashDatabase) and
/// [`BTreeDatabase`](crate::BTreeDatabase).
///
/// ```compile_fail
/// use kabinet_core::store::KvHandle;
/// ```
pub trait KeyValue: Database + KvHandle {
    /// Stores `value` under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    fn store(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> CoreResult<()> {
        self.store_mode(key, value, StoreMode::Replace).map(|_| ())
    }

    /// Stores `value` under `key` in the given mode.
    ///
    /// Returns `false` when [`StoreMode::Keep`] found an existing value and
    /// `true` otherwise. A mode the store does not support is replaced by a
    /// plain store with an advisory.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    fn store_mode(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        mode: StoreMode,
    ) -> CoreResult<bool> {
        let (key, value) = (key.as_ref(), value.as_ref());
        let mode = if Self::supports(mode) {
            mode
        } else {
            self.kv_base().advise(Advisory::UnsupportedMode {
                mode,
                store: Self::VARIANT,
            });
            StoreMode::Replace
        };
        if mode == StoreMode::Dup {
            return self.put_duplicate(key, value).map(|()| true);
        }

        let engine = self.kv_base_mut().engine_mut()?;
        match mode {
            StoreMode::Keep => kept(engine.put_keep(key, value)),
            StoreMode::Cat => check(engine.put_cat(key, value)).map(|()| true),
            StoreMode::Async => check(engine.put_async(key, value)).map(|()| true),
            StoreMode::Replace | StoreMode::Dup => check(engine.put(key, value)).map(|()| true),
        }
    }

    /// Stores `value` under `key` with [`StoreOptions`].
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    fn store_with(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        options: ValueOptions<'_>,
    ) -> CoreResult<bool> {
        let StoreOptions { mode, resolver } = options;
        let Some(mut resolver) = resolver else {
            return self.store_mode(key, value, mode.unwrap_or_default());
        };
        if mode.is_some() {
            self.kv_base().advise(Advisory::ResolverSupersedesMode);
        }

        let (key, value) = (key.as_ref(), value.as_ref());
        let engine = self.kv_base_mut().engine_mut()?;
        check(engine.put_proc(key, value, &mut |old: &[u8]| resolver(key, old, value)))?;
        Ok(true)
    }

    /// Adds `amount` to the counter under `key` and returns the new total.
    ///
    /// The first call seeds the counter.
    ///
    /// # Errors
    ///
    /// Fails with `Cabinet` when the value is not a counter of the same type.
    fn add(&mut self, key: impl AsRef<[u8]>, amount: impl Into<Number>) -> CoreResult<Number> {
        let key = key.as_ref();
        let engine = self.kv_base_mut().engine_mut()?;
        match amount.into() {
            Number::Int(num) => check(engine.add_int(key, num)).map(Number::Int),
            Number::Float(num) => check(engine.add_double(key, num)).map(Number::Float),
        }
    }

    /// Returns the value under `key`.
    ///
    /// # Errors
    ///
    /// Fails with `KeyNotFound` when the key is missing.
    fn fetch(&self, key: impl AsRef<[u8]>) -> CoreResult<Vec<u8>> {
        optional(self.kv_base().engine()?.get(key.as_ref()))?.ok_or(CoreError::KeyNotFound)
    }

    /// Returns the value under `key`, or `default` when it is missing.
    ///
    /// # Errors
    ///
    /// Fails on engine errors other than a missing record.
    fn fetch_or(&self, key: impl AsRef<[u8]>, default: impl Into<Vec<u8>>) -> CoreResult<Vec<u8>> {
        Ok(optional(self.kv_base().engine()?.get(key.as_ref()))?.unwrap_or_else(|| default.into()))
    }

    /// Returns the value under `key`, or computes one when it is missing.
    ///
    /// # Errors
    ///
    /// Fails on engine errors other than a missing record.
    fn fetch_or_else(
        &self,
        key: impl AsRef<[u8]>,
        missing: impl FnOnce(&[u8]) -> Vec<u8>,
    ) -> CoreResult<Vec<u8>> {
        let key = key.as_ref();
        Ok(optional(self.kv_base().engine()?.get(key))?.unwrap_or_else(|| missing(key)))
    }

    /// Returns the value under `key`, falling back to `function` and then to
    /// `default`.
    ///
    /// When the key is missing and both fallbacks are given, the function
    /// wins and an advisory is raised.
    ///
    /// # Errors
    ///
    /// Fails with `KeyNotFound` when the key is missing and neither fallback
    /// is given.
    fn fetch_with(
        &self,
        key: impl AsRef<[u8]>,
        default: Option<Vec<u8>>,
        function: Option<&dyn Fn(&[u8]) -> Vec<u8>>,
    ) -> CoreResult<Vec<u8>> {
        let key = key.as_ref();
        if let Some(value) = optional(self.kv_base().engine()?.get(key))? {
            return Ok(value);
        }
        match (function, default) {
            (Some(function), default) => {
                if default.is_some() {
                    self.kv_base().advise(Advisory::FunctionSupersedesDefault);
                }
                Ok(function(key))
            }
            (None, Some(default)) => Ok(default),
            (None, None) => Err(CoreError::KeyNotFound),
        }
    }

    /// Indexing accessor: the value under `key`, else the store default.
    ///
    /// # Errors
    ///
    /// Fails on engine errors other than a missing record.
    fn get(&self, key: impl AsRef<[u8]>) -> CoreResult<Option<Vec<u8>>> {
        let key = key.as_ref();
        match self.fetch(key) {
            Ok(value) => Ok(Some(value)),
            Err(CoreError::KeyNotFound) => Ok(self.default_for(key)),
            Err(err) => Err(err),
        }
    }

    /// Returns the store default for `key`, if a default is set.
    fn default_for(&self, key: impl AsRef<[u8]>) -> Option<Vec<u8>> {
        self.kv_default().map(|default| default.resolve(key.as_ref()))
    }

    /// Replaces the store default.
    fn set_default(&mut self, default: Option<ValueDefault>) {
        *self.kv_default_mut() = default;
    }

    /// Removes `key` and returns its value.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    fn delete(&mut self, key: impl AsRef<[u8]>) -> CoreResult<Option<Vec<u8>>> {
        let key = key.as_ref();
        let engine = self.kv_base_mut().engine_mut()?;
        let Some(value) = optional(engine.get(key))? else {
            return Ok(None);
        };
        removed(engine.out(key))?;
        Ok(Some(value))
    }

    /// Removes `key` and returns its value, or runs `missing` when the key
    /// is not there.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    fn delete_or_else(
        &mut self,
        key: impl AsRef<[u8]>,
        missing: impl FnOnce(&[u8]) -> Vec<u8>,
    ) -> CoreResult<Vec<u8>> {
        let key = key.as_ref();
        Ok(self.delete(key)?.unwrap_or_else(|| missing(key)))
    }

    /// Returns true if `key` is stored.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    fn contains(&self, key: impl AsRef<[u8]>) -> CoreResult<bool> {
        Ok(optional(self.kv_base().engine()?.get(key.as_ref()))?.is_some())
    }

    /// Looks up several keys through the indexing accessor.
    ///
    /// # Errors
    ///
    /// Fails on engine errors other than a missing record.
    fn values_at<K: AsRef<[u8]>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> CoreResult<Vec<Option<Vec<u8>>>> {
        keys.into_iter().map(|key| self.get(key)).collect()
    }

    /// Lists keys selected by `query`.
    ///
    /// This store lists by prefix only; a range is ignored with an advisory.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    fn keys(&self, query: &KeyQuery) -> CoreResult<Vec<Vec<u8>>> {
        if query.range.is_some() {
            self.kv_base().advise(Advisory::RangeUnsupported);
        }
        let prefix = query.prefix.as_deref().unwrap_or_default();
        Ok(self.kv_base().engine()?.fwmkeys(prefix, query.limit))
    }

    /// Returns every value.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    fn values(&mut self) -> CoreResult<Vec<Vec<u8>>> {
        let mut values = Vec::new();
        self.each_value(|value| {
            values.push(value.to_vec());
            ControlFlow::Continue(())
        })?;
        Ok(values)
    }

    /// Calls `f` with every key and value until it breaks.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    fn each(
        &mut self,
        mut f: impl FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> CoreResult<&mut Self> {
        let engine = self.kv_base_mut().engine_mut()?;
        check(engine.iter_init())?;
        while let Some((key, value)) = optional(engine.iter_next_pair())? {
            if f(&key, &value).is_break() {
                break;
            }
        }
        Ok(self)
    }

    /// Calls `f` with every key until it breaks.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    fn each_key(&mut self, mut f: impl FnMut(&[u8]) -> ControlFlow<()>) -> CoreResult<&mut Self> {
        let engine = self.kv_base_mut().engine_mut()?;
        check(engine.iter_init())?;
        while let Some(key) = optional(engine.iter_next())? {
            if f(&key).is_break() {
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
    fn each_value(
        &mut self,
        mut f: impl FnMut(&[u8]) -> ControlFlow<()>,
    ) -> CoreResult<&mut Self> {
        self.each(|_, value| f(value))
    }

    /// Deletes every entry for which `f` returns true.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    fn delete_if(&mut self, mut f: impl FnMut(&[u8], &[u8]) -> bool) -> CoreResult<&mut Self> {
        let engine = self.kv_base_mut().engine_mut()?;
        check(engine.iter_init())?;
        while let Some((key, value)) = optional(engine.iter_next_pair())? {
            if f(&key, &value) {
                removed(engine.out(&key))?;
            }
        }
        Ok(self)
    }

    /// Stores every pair, replacing existing values.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    fn update<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>) -> CoreResult<&mut Self>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        for (key, value) in pairs {
            self.store(key, value)?;
        }
        Ok(self)
    }

    /// Stores every pair, resolving existing keys with `resolver`.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    fn update_with<K, V>(
        &mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
        mut resolver: impl FnMut(&[u8], &[u8], &[u8]) -> Vec<u8>,
    ) -> CoreResult<&mut Self>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        for (key, value) in pairs {
            let options: ValueOptions<'_> = StoreOptions::new().resolver(&mut resolver);
            self.store_with(key, value, options)?;
        }
        Ok(self)
    }

    /// Materializes every pair.
    ///
    /// With `keep_default` the map answers missing keys with the store
    /// default.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` after close.
    fn to_map(&mut self, keep_default: bool) -> CoreResult<ValueMap> {
        let mut entries = BTreeMap::new();
        self.each(|key, value| {
            entries.insert(key.to_vec(), value.to_vec());
            ControlFlow::Continue(())
        })?;
        let default = if keep_default {
            self.kv_default().cloned()
        } else {
            None
        };
        Ok(DefaultMap::new(entries, default))
    }
}
