//! Document store: column documents under unique primary keys, secondary
//! indexes and the query engine.

mod compile;
mod paginate;
mod query;
mod results;

pub use paginate::{Page, PageRequest, DEFAULT_PER_PAGE};
pub use query::{Condition, Expression, Order, QuerySpec};
pub use results::{QueryAction, QueryResults, ReturnShape, Select, Tuple};

use crate::base::{Handle, StoreBase};
use crate::config::{cache_size, Config};
use crate::database::Database;
use crate::diagnostics::Advisory;
use crate::error::{CoreError, CoreResult};
use crate::options::ModeSpec;
use crate::store::{DefaultMap, DefaultValue, KeyQuery, Number, StoreMode, StoreOptions};
use crate::translate::{check, kept, optional, removed};
use compile::CompiledQueries;
use kabinet_engine::{Columns, IndexCommand, IndexType, SetOp, TableEngine, TableFile};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::Path;

/// A document: column name to column value.
pub type Document = Columns;

/// Column that carries the primary key in merged results.
pub const PRIMARY_KEY_COLUMN: &[u8] = b"";

/// Builds a document from column pairs.
pub fn document<K, V>(columns: impl IntoIterator<Item = (K, V)>) -> Document
where
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    columns
        .into_iter()
        .map(|(name, value)| (name.as_ref().to_vec(), value.as_ref().to_vec()))
        .collect()
}

/// Default for documents.
pub type DocumentDefault = DefaultValue<[u8], Document>;

/// Options for [`TableDatabase::store_with`]; the resolver receives
/// documents.
pub type DocumentOptions<'a> = StoreOptions<'a, [u8], Document>;

/// A materialized document store.
pub type DocumentMap = DefaultMap<Vec<u8>, Document, [u8]>;

/// Parses an index type name: `lexical`/`string`, `decimal`/`numeric`,
/// `token` or `qgram`.
///
/// # Errors
///
/// Fails with `Index` for any other name.
pub fn parse_index_type(name: &str) -> CoreResult<IndexType> {
    match name.to_ascii_lowercase().as_str() {
        "lexical" | "string" | "str" => Ok(IndexType::Lexical),
        "decimal" | "numeric" | "num" => Ok(IndexType::Decimal),
        "token" => Ok(IndexType::Token),
        "qgram" | "q_gram" => Ok(IndexType::QGram),
        _ => Err(CoreError::index(format!("unknown index type {name:?}"))),
    }
}

/// A table database.
///
/// ```rust
/// use kabinet_core::{document, Config, QuerySpec, TableDatabase};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut db = TableDatabase::open(dir.path().join("people.tct"), Config::default()).unwrap();
///
/// db.store("dana", document([("first", "Dana"), ("age", "34")])).unwrap();
/// db.store("jim", document([("first", "Jim"), ("age", "53")])).unwrap();
///
/// let spec = QuerySpec::new().filter("age", ">", 40).unwrap();
/// assert_eq!(db.all(&spec).unwrap().primary_keys(), vec![b"jim".to_vec()]);
/// ```
pub struct TableDatabase<E: TableEngine = TableFile> {
    base: StoreBase<E>,
    default: Option<DocumentDefault>,
}

impl TableDatabase<TableFile> {
    /// Opens (by default creating) a table store at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened in the resolved mode.
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        Self::with_engine(TableFile::new(), path, None, config)
    }

    /// Opens a table store with an explicit mode argument.
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
        Self::with_engine(TableFile::new(), path, Some(mode.into()), config)
    }
}

impl<E: TableEngine> TableDatabase<E> {
    /// Opens a table store on a caller-supplied engine.
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
        if config.has_hash_tuning() {
            check(engine.tune(config.hash_tuning()))?;
        }
        if config.rcnum.is_some() || config.lcnum.is_some() || config.ncnum.is_some() {
            check(engine.set_cache(
                cache_size(config.rcnum),
                cache_size(config.lcnum),
                cache_size(config.ncnum),
            ))?;
        }
        Ok(Self {
            base: StoreBase::open(engine, path.as_ref(), mode, config)?,
            default: None,
        })
    }

    /// Sets the default consulted by [`TableDatabase::get`].
    #[must_use]
    pub fn with_default(mut self, default: DocumentDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Stores `doc` under `key`, replacing any existing document.
    ///
    /// # Errors
    ///
    /// Fails with `Cabinet` for an empty key, and on a read-only or closed
    /// store.
    pub fn store(&mut self, key: impl AsRef<[u8]>, doc: Document) -> CoreResult<()> {
        check(self.base.engine_mut()?.put(key.as_ref(), &doc))
    }

    /// Stores `doc` in the given mode.
    ///
    /// [`StoreMode::Keep`] returns false when the key exists;
    /// [`StoreMode::Cat`] adds only the columns the stored document lacks.
    /// Other modes fall back to a plain store with an advisory.
    ///
    /// # Errors
    ///
    /// See [`TableDatabase::store`].
    pub fn store_mode(&mut self, key: impl AsRef<[u8]>, doc: Document, mode: StoreMode) -> CoreResult<bool> {
        let key = key.as_ref();
        let mode = match mode {
            StoreMode::Replace | StoreMode::Keep | StoreMode::Cat => mode,
            other => {
                self.base.advise(Advisory::UnsupportedMode {
                    mode: other,
                    store: "table",
                });
                StoreMode::Replace
            }
        };

        let engine = self.base.engine_mut()?;
        match mode {
            StoreMode::Keep => kept(engine.put_keep(key, &doc)),
            StoreMode::Cat => check(engine.put_cat(key, &doc)).map(|()| true),
            _ => check(engine.put(key, &doc)).map(|()| true),
        }
    }

    /// Stores `doc` with [`DocumentOptions`].
    ///
    /// # Errors
    ///
    /// See [`TableDatabase::store`].
    pub fn store_with(
        &mut self,
        key: impl AsRef<[u8]>,
        doc: Document,
        options: DocumentOptions<'_>,
    ) -> CoreResult<bool> {
        let StoreOptions { mode, resolver } = options;
        let Some(mut resolver) = resolver else {
            return self.store_mode(key, doc, mode.unwrap_or_default());
        };
        if mode.is_some() {
            self.base.advise(Advisory::ResolverSupersedesMode);
        }

        let key = key.as_ref();
        let engine = self.base.engine_mut()?;
        check(engine.put_proc(key, &doc, &mut |old: &Columns| resolver(key, old, &doc)))?;
        Ok(true)
    }

    /// Adds `amount` to the `_num` column of `key` and returns the total.
    ///
    /// Integer additions truncate the stored number; text that is not a
    /// number counts as zero.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn add(&mut self, key: impl AsRef<[u8]>, amount: impl Into<Number>) -> CoreResult<Number> {
        let key = key.as_ref();
        let engine = self.base.engine_mut()?;
        match amount.into() {
            Number::Int(num) => check(engine.add_int(key, num)).map(Number::Int),
            Number::Float(num) => check(engine.add_double(key, num)).map(Number::Float),
        }
    }

    /// Returns the document under `key`.
    ///
    /// # Errors
    ///
    /// Fails with `KeyNotFound` for a missing key.
    pub fn fetch(&self, key: impl AsRef<[u8]>) -> CoreResult<Document> {
        self.lookup(key.as_ref())?.ok_or(CoreError::KeyNotFound)
    }

    /// Returns the document under `key`, or `default`.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn fetch_or(&self, key: impl AsRef<[u8]>, default: Document) -> CoreResult<Document> {
        Ok(self.lookup(key.as_ref())?.unwrap_or(default))
    }

    /// Returns the document under `key`, or computes one.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn fetch_or_else(
        &self,
        key: impl AsRef<[u8]>,
        missing: impl FnOnce(&[u8]) -> Document,
    ) -> CoreResult<Document> {
        let key = key.as_ref();
        Ok(self.lookup(key)?.unwrap_or_else(|| missing(key)))
    }

    /// Returns the document under `key`, falling back to `function` and
    /// then to `default`; the function wins over the default with an
    /// advisory.
    ///
    /// # Errors
    ///
    /// Fails with `KeyNotFound` when the key is missing and neither fallback
    /// is given.
    pub fn fetch_with(
        &self,
        key: impl AsRef<[u8]>,
        default: Option<Document>,
        function: Option<&dyn Fn(&[u8]) -> Document>,
    ) -> CoreResult<Document> {
        let key = key.as_ref();
        if let Some(doc) = self.lookup(key)? {
            return Ok(doc);
        }
        match (function, default) {
            (Some(function), default) => {
                if default.is_some() {
                    self.base.advise(Advisory::FunctionSupersedesDefault);
                }
                Ok(function(key))
            }
            (None, Some(default)) => Ok(default),
            (None, None) => Err(CoreError::KeyNotFound),
        }
    }

    /// Indexing accessor: the document under `key`, else the store default.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn get(&self, key: impl AsRef<[u8]>) -> CoreResult<Option<Document>> {
        let key = key.as_ref();
        match self.lookup(key)? {
            Some(doc) => Ok(Some(doc)),
            None => Ok(self.default_for(key)),
        }
    }

    /// Returns the store default for `key`.
    pub fn default_for(&self, key: impl AsRef<[u8]>) -> Option<Document> {
        self.default.as_ref().map(|default| default.resolve(key.as_ref()))
    }

    /// Replaces the store default.
    pub fn set_default(&mut self, default: Option<DocumentDefault>) {
        self.default = default;
    }

    /// Returns true if `key` holds a document.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn contains(&self, key: impl AsRef<[u8]>) -> CoreResult<bool> {
        Ok(self.lookup(key.as_ref())?.is_some())
    }

    /// Returns [`TableDatabase::get`] for each key.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn values_at<K: AsRef<[u8]>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> CoreResult<Vec<Option<Document>>> {
        keys.into_iter().map(|key| self.get(key)).collect()
    }

    /// Removes `key` and returns its document.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> CoreResult<Option<Document>> {
        let key = key.as_ref();
        let engine = self.base.engine_mut()?;
        let Some(doc) = optional(engine.get(key))? else {
            return Ok(None);
        };
        removed(engine.out(key))?;
        Ok(Some(doc))
    }

    /// Removes `key` and returns its document, or runs `missing`.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn delete_or_else(
        &mut self,
        key: impl AsRef<[u8]>,
        missing: impl FnOnce(&[u8]) -> Document,
    ) -> CoreResult<Document> {
        let key = key.as_ref();
        Ok(self.delete(key)?.unwrap_or_else(|| missing(key)))
    }

    /// Lists primary keys. Prefix and limit apply; a range is ignored with
    /// an advisory.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn keys(&self, query: &KeyQuery) -> CoreResult<Vec<Vec<u8>>> {
        if query.range.is_some() {
            self.base.advise(Advisory::RangeUnsupported);
        }
        let prefix = query.prefix.as_deref().unwrap_or_default();
        Ok(self.base.engine()?.fwmkeys(prefix, query.limit))
    }

    /// Returns every document.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn values(&mut self) -> CoreResult<Vec<Document>> {
        let mut docs = Vec::new();
        self.each_value(|doc| {
            docs.push(doc.clone());
            ControlFlow::Continue(())
        })?;
        Ok(docs)
    }

    /// Calls `f` with every key and document until it breaks.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn each(
        &mut self,
        mut f: impl FnMut(&[u8], &Document) -> ControlFlow<()>,
    ) -> CoreResult<&mut Self> {
        let engine = self.base.engine_mut()?;
        check(engine.iter_init())?;
        while let Some(key) = optional(engine.iter_next())? {
            let Some(doc) = optional(engine.get(&key))? else {
                continue;
            };
            if f(&key, &doc).is_break() {
                break;
            }
        }
        Ok(self)
    }

    /// Calls `f` with every key until it breaks.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn each_key(&mut self, mut f: impl FnMut(&[u8]) -> ControlFlow<()>) -> CoreResult<&mut Self> {
        let engine = self.base.engine_mut()?;
        check(engine.iter_init())?;
        while let Some(key) = optional(engine.iter_next())? {
            if f(&key).is_break() {
                break;
            }
        }
        Ok(self)
    }

    /// Calls `f` with every document until it breaks.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn each_value(
        &mut self,
        mut f: impl FnMut(&Document) -> ControlFlow<()>,
    ) -> CoreResult<&mut Self> {
        self.each(|_, doc| f(doc))
    }

    /// Removes every document for which `f` returns true.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn delete_if(&mut self, mut f: impl FnMut(&[u8], &Document) -> bool) -> CoreResult<&mut Self> {
        let engine = self.base.engine_mut()?;
        check(engine.iter_init())?;
        while let Some(key) = optional(engine.iter_next())? {
            let Some(doc) = optional(engine.get(&key))? else {
                continue;
            };
            if f(&key, &doc) {
                removed(engine.out(&key))?;
            }
        }
        Ok(self)
    }

    /// Stores every pair, replacing existing documents.
    ///
    /// # Errors
    ///
    /// See [`TableDatabase::store`].
    pub fn update<K: AsRef<[u8]>>(
        &mut self,
        docs: impl IntoIterator<Item = (K, Document)>,
    ) -> CoreResult<&mut Self> {
        for (key, doc) in docs {
            self.store(key, doc)?;
        }
        Ok(self)
    }

    /// Stores every pair, resolving existing keys with `resolver`.
    ///
    /// # Errors
    ///
    /// See [`TableDatabase::store`].
    pub fn update_with<K: AsRef<[u8]>>(
        &mut self,
        docs: impl IntoIterator<Item = (K, Document)>,
        mut resolver: impl FnMut(&[u8], &Document, &Document) -> Document,
    ) -> CoreResult<&mut Self> {
        for (key, doc) in docs {
            let options: DocumentOptions<'_> = StoreOptions::new().resolver(&mut resolver);
            self.store_with(key, doc, options)?;
        }
        Ok(self)
    }

    /// Materializes the store, optionally keeping its default.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn to_map(&mut self, keep_default: bool) -> CoreResult<DocumentMap> {
        let mut entries = BTreeMap::new();
        self.each(|key, doc| {
            entries.insert(key.to_vec(), doc.clone());
            ControlFlow::Continue(())
        })?;
        let default = if keep_default { self.default.clone() } else { None };
        Ok(DefaultMap::new(entries, default))
    }

    /// Builds an index on `column`, rebuilding an existing one unless
    /// `keep` is set.
    ///
    /// Returns false when `keep` found an existing index.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn add_index(&mut self, column: impl AsRef<[u8]>, kind: IndexType, keep: bool) -> CoreResult<bool> {
        let command = IndexCommand::Build { kind, keep };
        kept(self.base.engine_mut()?.set_index(column.as_ref(), command))
    }

    /// Removes the index on `column`; false when there was none.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn remove_index(&mut self, column: impl AsRef<[u8]>) -> CoreResult<bool> {
        removed(self.base.engine_mut()?.set_index(column.as_ref(), IndexCommand::Remove))
    }

    /// Optimizes the index on `column`; false when there is none.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn optimize_index(&mut self, column: impl AsRef<[u8]>) -> CoreResult<bool> {
        removed(self.base.engine_mut()?.set_index(column.as_ref(), IndexCommand::Optimize))
    }

    /// Returns the next unique id, starting at 1.
    ///
    /// Ids are persisted with the store and never reused.
    ///
    /// # Errors
    ///
    /// Fails on a read-only or closed store.
    pub fn generate_unique_id(&mut self) -> CoreResult<i64> {
        check(self.base.engine_mut()?.gen_uid())
    }

    /// Alias of [`TableDatabase::generate_unique_id`].
    ///
    /// # Errors
    ///
    /// See [`TableDatabase::generate_unique_id`].
    pub fn uid(&mut self) -> CoreResult<i64> {
        self.generate_unique_id()
    }

    /// Runs a query and collects its results.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn all(&mut self, spec: &QuerySpec) -> CoreResult<QueryResults> {
        let keys = self.search(spec)?;
        self.collect(spec, keys)
    }

    /// Runs a query, handing every result to `f`.
    ///
    /// The returned [`QueryAction`] can write the tuple's document back,
    /// delete the record or stop the query. On a read-only store update and
    /// delete are ignored with an advisory.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn all_each(
        &mut self,
        spec: &QuerySpec,
        mut f: impl FnMut(&mut Tuple) -> QueryAction,
    ) -> CoreResult<&mut Self> {
        let read_only = self.base.is_read_only();
        let (select, shape) = (spec.select, spec.effective_shape());
        let mut ignored = false;
        {
            let mut queries = CompiledQueries::new(self.base.engine_mut()?);
            let id = queries.compile(spec)?;
            check(queries.engine().query_process(id, &mut |pk: &[u8], columns: &mut Columns| {
                let mut tuple = Tuple::build(select, shape, pk, columns.clone());
                let mut action = f(&mut tuple);
                if read_only && action.is_destructive() {
                    ignored = true;
                    action = action.read_only();
                }
                if action.contains(QueryAction::UPDATE) {
                    if let Some(doc) = tuple.into_document() {
                        *columns = doc;
                    }
                }
                action.to_proc()
            }))?;
        }
        if ignored {
            self.base.advise(Advisory::ReadOnlyQueryAction);
        }
        Ok(self)
    }

    /// Returns the first result of a query.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn first(&mut self, spec: &QuerySpec) -> CoreResult<Option<Tuple>> {
        let limited = spec.clone().limit(1);
        let Some(pk) = self.search(&limited)?.into_iter().next() else {
            return Ok(None);
        };
        let doc = if spec.select == Select::Keys {
            Document::new()
        } else {
            match self.lookup(&pk)? {
                Some(doc) => doc,
                None => return Ok(None),
            }
        };
        Ok(Some(Tuple::build(spec.select, spec.effective_shape(), &pk, doc)))
    }

    /// Counts the results of a query, honoring its limit and offset.
    ///
    /// # Errors
    ///
    /// Fails on a closed store.
    pub fn count(&mut self, spec: &QuerySpec) -> CoreResult<usize> {
        Ok(self.search(spec)?.len())
    }

    /// Runs one page of a query.
    ///
    /// The query's own limit and offset are replaced by the page's.
    ///
    /// # Errors
    ///
    /// Fails with `Query` for page 0 or a page size of 0.
    pub fn paginate(&mut self, spec: &QuerySpec, request: PageRequest) -> CoreResult<Page> {
        let (page, per_page) = request.resolve()?;
        let mut paged = spec.clone();
        paged.limit = None;
        paged.offset = 0;
        let total = self.count(&paged)? as u64;

        let offset = (page - 1).saturating_mul(per_page);
        paged.limit = Some(usize::try_from(per_page).unwrap_or(usize::MAX));
        paged.offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let results = self.all(&paged)?;
        Ok(Page::new(results, page, per_page, total))
    }

    /// Documents matched by any of the queries.
    ///
    /// Select, shape and order come from the first query.
    ///
    /// # Errors
    ///
    /// Fails with `Query` when `specs` is empty.
    pub fn union(&mut self, specs: &[QuerySpec]) -> CoreResult<QueryResults> {
        self.combine(specs, SetOp::Union)
    }

    /// Documents matched by the first query and every other one.
    ///
    /// # Errors
    ///
    /// Fails with `Query` when `specs` is empty.
    pub fn intersection(&mut self, specs: &[QuerySpec]) -> CoreResult<QueryResults> {
        self.combine(specs, SetOp::Intersection)
    }

    /// Documents matched by the first query and none of the others.
    ///
    /// # Errors
    ///
    /// Fails with `Query` when `specs` is empty.
    pub fn difference(&mut self, specs: &[QuerySpec]) -> CoreResult<QueryResults> {
        self.combine(specs, SetOp::Difference)
    }

    /// [`TableDatabase::union`], handing every result to `f` as
    /// [`TableDatabase::all_each`] does.
    ///
    /// # Errors
    ///
    /// Fails with `Query` when `specs` is empty.
    pub fn union_each(
        &mut self,
        specs: &[QuerySpec],
        f: impl FnMut(&mut Tuple) -> QueryAction,
    ) -> CoreResult<&mut Self> {
        self.combine_each(specs, SetOp::Union, f)
    }

    /// [`TableDatabase::intersection`] with a block.
    ///
    /// # Errors
    ///
    /// Fails with `Query` when `specs` is empty.
    pub fn intersection_each(
        &mut self,
        specs: &[QuerySpec],
        f: impl FnMut(&mut Tuple) -> QueryAction,
    ) -> CoreResult<&mut Self> {
        self.combine_each(specs, SetOp::Intersection, f)
    }

    /// [`TableDatabase::difference`] with a block.
    ///
    /// # Errors
    ///
    /// Fails with `Query` when `specs` is empty.
    pub fn difference_each(
        &mut self,
        specs: &[QuerySpec],
        f: impl FnMut(&mut Tuple) -> QueryAction,
    ) -> CoreResult<&mut Self> {
        self.combine_each(specs, SetOp::Difference, f)
    }

    fn lookup(&self, key: &[u8]) -> CoreResult<Option<Document>> {
        optional(self.base.engine()?.get(key))
    }

    fn search(&mut self, spec: &QuerySpec) -> CoreResult<Vec<Vec<u8>>> {
        let mut queries = CompiledQueries::new(self.base.engine_mut()?);
        let id = queries.compile(spec)?;
        check(queries.engine().query_search(id))
    }

    fn combined_keys(&mut self, specs: &[QuerySpec], op: SetOp) -> CoreResult<Vec<Vec<u8>>> {
        if specs.is_empty() {
            return Err(CoreError::query("a set operation needs at least one query"));
        }
        let mut queries = CompiledQueries::new(self.base.engine_mut()?);
        let ids = queries.compile_all(specs)?;
        check(queries.engine().meta_search(&ids, op))
    }

    fn collect(&self, spec: &QuerySpec, keys: Vec<Vec<u8>>) -> CoreResult<QueryResults> {
        if spec.select == Select::Keys {
            return Ok(QueryResults::Keys(keys));
        }
        let engine = self.base.engine()?;
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(doc) = optional(engine.get(&key))? {
                rows.push((key, doc));
            }
        }
        Ok(QueryResults::collect(spec.select, spec.effective_shape(), rows))
    }

    fn combine(&mut self, specs: &[QuerySpec], op: SetOp) -> CoreResult<QueryResults> {
        let keys = self.combined_keys(specs, op)?;
        match specs.first() {
            Some(first) => self.collect(first, keys),
            None => Err(CoreError::query("a set operation needs at least one query")),
        }
    }

    fn combine_each(
        &mut self,
        specs: &[QuerySpec],
        op: SetOp,
        mut f: impl FnMut(&mut Tuple) -> QueryAction,
    ) -> CoreResult<&mut Self> {
        let keys = self.combined_keys(specs, op)?;
        let Some(first) = specs.first() else {
            return Ok(self);
        };
        let (select, shape) = (first.select, first.effective_shape());
        let read_only = self.base.is_read_only();
        let mut ignored = false;

        let engine = self.base.engine_mut()?;
        for key in keys {
            let Some(doc) = optional(engine.get(&key))? else {
                continue;
            };
            let mut tuple = Tuple::build(select, shape, &key, doc);
            let mut action = f(&mut tuple);
            if read_only && action.is_destructive() {
                ignored = true;
                action = action.read_only();
            }
            if action.contains(QueryAction::DELETE) {
                removed(engine.out(&key))?;
            } else if action.contains(QueryAction::UPDATE) {
                if let Some(doc) = tuple.into_document() {
                    check(engine.put(&key, &doc))?;
                }
            }
            if action.contains(QueryAction::STOP) {
                break;
            }
        }
        if ignored {
            self.base.advise(Advisory::ReadOnlyQueryAction);
        }
        Ok(self)
    }
}

impl<E: TableEngine> Handle for TableDatabase<E> {
    type Engine = E;

    fn base(&self) -> &StoreBase<E> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StoreBase<E> {
        &mut self.base
    }
}

impl<E: TableEngine> Database for TableDatabase<E> {
    fn optimize(&mut self, options: &Config) -> CoreResult<()> {
        self.base.advise_config(options);
        let tuning = options.hash_tuning();
        check(self.base.engine_mut()?.optimize(tuning))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn open_db(dir: &TempDir) -> TableDatabase {
        TableDatabase::open(dir.path().join("test.tct"), Config::default()).unwrap()
    }

    fn load_condition_data(db: &mut TableDatabase) {
        db.store(
            "dana",
            document([("first", "Dana"), ("middle", "Ann Leslie"), ("last", "Gray"), ("age", "34")]),
        )
        .unwrap();
        db.store("james", document([("first", "James"), ("last", "Gray"), ("age", "33")]))
            .unwrap();
        db.store("jim", document([("first", "Jim"), ("last", "Gray"), ("age", "53")]))
            .unwrap();
    }

    #[test]
    fn documents_round_trip() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        let doc = document([("a", "1"), ("b", "2")]);
        db.store("pk", doc.clone()).unwrap();
        assert_eq!(db.fetch("pk").unwrap(), doc);
        assert!(matches!(db.fetch("missing"), Err(CoreError::KeyNotFound)));
        assert!(db.contains("pk").unwrap());
        assert_eq!(db.size().unwrap(), 1);
    }

    #[test]
    fn keep_and_cat_modes() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        let original = document([("a", "1"), ("c", "old")]);
        assert!(db.store_mode("cols", original.clone(), StoreMode::Keep).unwrap());
        assert!(!db.store_mode("cols", document([("a", "2")]), StoreMode::Keep).unwrap());
        assert_eq!(db.fetch("cols").unwrap(), original);

        db.store_mode("cols", document([("c", "new"), ("d", "4")]), StoreMode::Cat)
            .unwrap();
        assert_eq!(
            db.fetch("cols").unwrap(),
            document([("a", "1"), ("c", "old"), ("d", "4")])
        );

        db.store_mode("cols", document([("x", "y")]), StoreMode::Dup).unwrap();
        assert_eq!(db.fetch("cols").unwrap(), document([("x", "y")]));
        assert!(matches!(
            db.take_advisories().as_slice(),
            [Advisory::UnsupportedMode { mode: StoreMode::Dup, store: "table" }]
        ));
    }

    #[test]
    fn resolvers_receive_documents() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        db.store("pk", document([("n", "1")])).unwrap();
        let options: DocumentOptions<'_> = StoreOptions::new()
            .mode(StoreMode::Keep)
            .resolver(|_, old: &Document, new: &Document| {
                let mut merged = old.clone();
                merged.extend(new.iter().map(|(k, v)| (k.clone(), v.clone())));
                merged
            });
        db.store_with("pk", document([("m", "2")]), options).unwrap();
        assert_eq!(db.fetch("pk").unwrap(), document([("m", "2"), ("n", "1")]));
        assert_eq!(db.take_advisories(), vec![Advisory::ResolverSupersedesMode]);
    }

    #[test]
    fn counters_live_in_the_number_column() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        assert_eq!(db.add("i", 42).unwrap(), Number::Int(42));
        assert_eq!(db.fetch("i").unwrap(), document([("_num", "42")]));

        db.store("f", document([("type", "Float")])).unwrap();
        assert_eq!(db.add("f", 2.25).unwrap(), Number::Float(2.25));
        assert_eq!(db.fetch("f").unwrap(), document([("type", "Float"), ("_num", "2.25")]));

        db.store("junk", document([("_num", "junk")])).unwrap();
        assert_eq!(db.add("junk", 1).unwrap(), Number::Int(1));

        assert_eq!(db.add("mixed", 1).unwrap(), Number::Int(1));
        assert_eq!(db.add("mixed", 1.5).unwrap(), Number::Float(2.5));
        assert_eq!(db.add("mixed", 1).unwrap(), Number::Int(3));
        assert_eq!(db.fetch("mixed").unwrap(), document([("_num", "3")]));
    }

    #[test]
    fn unique_ids_are_not_documents() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        assert_eq!(db.generate_unique_id().unwrap(), 1);
        let next: Vec<i64> = (0..4).map(|_| db.uid().unwrap()).collect();
        assert_eq!(next, vec![2, 3, 4, 5]);
        assert_eq!(db.size().unwrap(), 0);
    }

    #[test]
    fn index_management() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        for name in ["string", "numeric", "token", "qgram"] {
            assert!(db.add_index(name, parse_index_type(name).unwrap(), false).unwrap());
        }
        assert!(db.add_index("string", IndexType::Lexical, false).unwrap());
        assert!(!db.add_index("string", IndexType::Lexical, true).unwrap());
        assert!(db.optimize_index("string").unwrap());
        assert!(db.remove_index("string").unwrap());
        assert!(!db.remove_index("string").unwrap());
        assert!(!db.optimize_index("missing").unwrap());
        assert!(matches!(parse_index_type("unknown"), Err(CoreError::Index(_))));
    }

    #[test]
    fn iteration_and_listing() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        load_condition_data(&mut db);

        assert_eq!(db.keys(&KeyQuery::new().prefix("ja")).unwrap(), vec![b"james".to_vec()]);
        assert_eq!(db.keys(&KeyQuery::new().limit(2)).unwrap().len(), 2);
        assert_eq!(db.keys(&KeyQuery::new().between("a", "z")).unwrap().len(), 3);
        assert_eq!(db.take_advisories(), vec![Advisory::RangeUnsupported]);

        let mut seen = 0;
        db.each(|_, doc| {
            seen += 1;
            assert_eq!(doc.get(&b"last"[..]), Some(&b"Gray".to_vec()));
            ControlFlow::Break(())
        })
        .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(db.values().unwrap().len(), 3);

        db.delete_if(|key, _| key.starts_with(b"j")).unwrap();
        assert_eq!(db.keys(&KeyQuery::new()).unwrap(), vec![b"dana".to_vec()]);
        assert_eq!(db.delete("dana").unwrap().map(|doc| doc.len()), Some(4));
        assert_eq!(db.delete("dana").unwrap(), None);
    }

    #[test]
    fn defaults_and_materialization() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir).with_default(DocumentDefault::function(|key: &[u8]| {
            document([("missing", key)])
        }));
        db.store("a", document([("x", "1")])).unwrap();

        assert_eq!(
            db.values_at(["a", "b"]).unwrap(),
            vec![Some(document([("x", "1")])), Some(document([("missing", "b")]))]
        );
        let map = db.to_map(true).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(b"zz"), Some(document([("missing", "zz")])));
        assert!(!db.to_map(false).unwrap().has_default());
    }

    #[test]
    fn queries_filter_order_and_limit() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        load_condition_data(&mut db);

        let spec = QuerySpec::new().filter("age", "!>", 33).unwrap();
        assert_eq!(db.all(&spec).unwrap().primary_keys(), vec![b"james".to_vec()]);

        let spec = QuerySpec::new()
            .filter("last", "==", "Gray")
            .unwrap()
            .order(Order::parse("age", "NUM_DESC").unwrap())
            .select(Select::Keys);
        assert_eq!(
            db.all(&spec).unwrap(),
            QueryResults::Keys(vec![b"jim".to_vec(), b"dana".to_vec(), b"james".to_vec()])
        );
        assert_eq!(db.count(&spec.clone().limit(2).offset(2)).unwrap(), 1);

        let first = db.first(&QuerySpec::new().order_by("first")).unwrap();
        assert_eq!(first.as_ref().and_then(Tuple::key), Some(&b"dana"[..]));
        assert_eq!(db.first(&QuerySpec::new().offset(10)).unwrap(), None);
    }

    #[test]
    fn blocks_update_delete_and_stop() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        load_condition_data(&mut db);

        db.all_each(&QuerySpec::new(), |tuple| {
            if tuple.key() != Some(&b"dana"[..]) {
                return QueryAction::NONE;
            }
            if let Some(doc) = tuple.doc_mut() {
                doc.insert(b"salutation".to_vec(), b"Mrs.".to_vec());
                doc.remove(&b"age"[..]);
            }
            QueryAction::UPDATE
        })
        .unwrap();
        assert_eq!(
            db.fetch("dana").unwrap(),
            document([("first", "Dana"), ("middle", "Ann Leslie"), ("last", "Gray"), ("salutation", "Mrs.")])
        );

        let mut visited = 0;
        db.all_each(&QuerySpec::new().select(Select::Keys), |_| {
            visited += 1;
            QueryAction::DELETE | QueryAction::STOP
        })
        .unwrap();
        assert_eq!(visited, 1);
        assert_eq!(db.size().unwrap(), 2);
    }

    #[test]
    fn read_only_blocks_cannot_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.tct");
        {
            let mut db = TableDatabase::open(&path, Config::default()).unwrap();
            load_condition_data(&mut db);
            db.close().unwrap();
        }

        let mut db = TableDatabase::open_with_mode(&path, "r", Config::default()).unwrap();
        db.all_each(&QuerySpec::new(), |_| QueryAction::DELETE).unwrap();
        assert_eq!(db.size().unwrap(), 3);
        assert_eq!(db.take_advisories(), vec![Advisory::ReadOnlyQueryAction]);

        db.union_each(&[QuerySpec::new()], |_| QueryAction::UPDATE | QueryAction::STOP)
            .unwrap();
        assert_eq!(db.take_advisories(), vec![Advisory::ReadOnlyQueryAction]);
    }

    #[test]
    fn set_operations_need_a_query() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        assert!(matches!(db.union(&[]), Err(CoreError::Query(_))));
        assert!(matches!(db.difference_each(&[], |_| QueryAction::NONE), Err(CoreError::Query(_))));
    }

    #[test]
    fn tuning_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tuned.tct");
        let config = Config::new().bnum(1024).opts("ld").rcnum(10).lcnum(20).ncnum(30);
        {
            let mut db = TableDatabase::open(&path, config).unwrap();
            db.store("a", document([("b", "c")])).unwrap();
            db.optimize(&Config::new().bnum(2048)).unwrap();
            db.close().unwrap();
        }
        let db = TableDatabase::open_with_mode(&path, "r", Config::default()).unwrap();
        assert!(db.is_read_only());
        assert_eq!(db.fetch("a").unwrap(), document([("b", "c")]));
    }
}
