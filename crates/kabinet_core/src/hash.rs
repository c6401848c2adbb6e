//! Hash store: unique byte keys, unordered.

use crate::base::{Handle, StoreBase};
use crate::config::{saturate_i32, Config};
use crate::database::Database;
use crate::error::CoreResult;
use crate::options::ModeSpec;
use crate::store::{KeyValue, KvHandle, StoreMode, ValueDefault};
use crate::translate::check;
use kabinet_engine::{HashEngine, HashFile};
use std::path::Path;

/// A hash database.
///
/// ```rust
/// use kabinet_core::{Config, HashDatabase, KeyValue, StoreMode};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut db = HashDatabase::open(dir.path().join("data.tch"), Config::default()).unwrap();
///
/// db.store("name", "James").unwrap();
/// assert!(!db.store_mode("name", "Dana", StoreMode::Keep).unwrap());
/// assert_eq!(db.fetch("name").unwrap(), b"James");
/// ```
pub struct HashDatabase<E: HashEngine = HashFile> {
    base: StoreBase<E>,
    default: Option<ValueDefault>,
}

impl HashDatabase<HashFile> {
    /// Opens (by default creating) a hash store at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened in the resolved mode.
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        Self::with_engine(HashFile::new(), path, None, config)
    }

    /// Opens a hash store with an explicit mode argument.
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
        Self::with_engine(HashFile::new(), path, Some(mode.into()), config)
    }
}

impl<E: HashEngine> HashDatabase<E> {
    /// Opens a hash store on a caller-supplied engine.
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
        if let Some(rcnum) = config.rcnum {
            check(engine.set_cache(saturate_i32(rcnum)))?;
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
}

impl<E: HashEngine> Handle for HashDatabase<E> {
    type Engine = E;

    fn base(&self) -> &StoreBase<E> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StoreBase<E> {
        &mut self.base
    }
}

impl<E: HashEngine> Database for HashDatabase<E> {
    fn optimize(&mut self, options: &Config) -> CoreResult<()> {
        self.base.advise_config(options);
        let tuning = options.hash_tuning();
        check(self.base.engine_mut()?.optimize(tuning))
    }
}

impl<E: HashEngine> KvHandle for HashDatabase<E> {
    type Kv = E;

    const VARIANT: &'static str = "hash";

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

    fn supports(mode: StoreMode) -> bool {
        mode != StoreMode::Dup
    }

    fn put_duplicate(&mut self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        check(self.base.engine_mut()?.put(key, value))
    }
}

impl<E: HashEngine> KeyValue for HashDatabase<E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Advisory;
    use crate::error::CoreError;
    use crate::store::{KeyQuery, Number, ValueOptions};
    use std::ops::ControlFlow;
    use tempfile::{tempdir, TempDir};

    fn open_db(dir: &TempDir) -> HashDatabase {
        HashDatabase::open(dir.path().join("test.tch"), Config::default()).unwrap()
    }

    #[test]
    fn store_modes() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        db.store("key", "one").unwrap();
        assert!(!db.store_mode("key", "two", StoreMode::Keep).unwrap());
        assert_eq!(db.fetch("key").unwrap(), b"one");

        assert!(db.store_mode("key", "-two", StoreMode::Cat).unwrap());
        assert_eq!(db.fetch("key").unwrap(), b"one-two");

        db.store_mode("async", "later", StoreMode::Async).unwrap();
        db.flush().unwrap();
        assert_eq!(db.fetch("async").unwrap(), b"later");
    }

    #[test]
    fn duplicate_mode_falls_back_to_replace() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        db.store("key", "one").unwrap();
        assert!(db.store_mode("key", "two", StoreMode::Dup).unwrap());
        assert_eq!(db.fetch("key").unwrap(), b"two");
        assert_eq!(
            db.take_advisories(),
            vec![Advisory::UnsupportedMode {
                mode: StoreMode::Dup,
                store: "hash"
            }]
        );
    }

    #[test]
    fn resolver_merges_and_supersedes_mode() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        db.store("key", "old").unwrap();
        let options = ValueOptions::new()
            .mode(StoreMode::Keep)
            .resolver(|key: &[u8], old: &[u8], new: &[u8]| [key, old, new].join(&b'|'));
        assert!(db.store_with("key", "new", options).unwrap());
        assert_eq!(db.fetch("key").unwrap(), b"key|old|new");
        assert_eq!(db.take_advisories(), vec![Advisory::ResolverSupersedesMode]);

        let options = ValueOptions::new().resolver(|_: &[u8], _: &[u8], _: &[u8]| b"unused".to_vec());
        db.store_with("fresh", "value", options).unwrap();
        assert_eq!(db.fetch("fresh").unwrap(), b"value");
    }

    #[test]
    fn counters_accumulate() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        assert_eq!(db.add("int", 40).unwrap(), Number::Int(40));
        assert_eq!(db.add("int", 2).unwrap(), Number::Int(42));
        assert_eq!(db.add("float", 1.5).unwrap(), Number::Float(1.5));
        assert_eq!(db.add("float", 1.0).unwrap(), Number::Float(2.5));

        db.store("text", "abc").unwrap();
        assert!(matches!(db.add("text", 1), Err(CoreError::Cabinet { .. })));
    }

    #[test]
    fn counters_step_back_and_keep_their_type() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);

        assert_eq!(db.add("count", 0).unwrap(), Number::Int(0));
        assert_eq!(db.add("count", 1).unwrap(), Number::Int(1));
        assert_eq!(db.add("count", -1).unwrap(), Number::Int(0));

        assert!(matches!(db.add("count", 1.0), Err(CoreError::Cabinet { .. })));
        db.add("ratio", 0.5).unwrap();
        assert!(matches!(db.add("ratio", 1), Err(CoreError::Cabinet { .. })));
        assert_eq!(db.add("count", 2).unwrap(), Number::Int(2));
    }

    #[test]
    fn optimize_raises_config_advisories() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        db.store("key", "value").unwrap();

        db.optimize(&Config::new().set_option("opts", "z")).unwrap();
        assert_eq!(db.take_advisories(), vec![Advisory::UnrecognizedOpt('z')]);
        assert_eq!(db.fetch("key").unwrap(), b"value");
    }

    #[test]
    fn open_raises_config_advisories() {
        let dir = tempdir().unwrap();
        let config = Config::new().set_option("mode", "wcx").set_option("bnum", "lots");
        let mut db = HashDatabase::open(dir.path().join("advised.tch"), config).unwrap();

        assert_eq!(
            db.take_advisories(),
            vec![
                Advisory::UnreadableSetting {
                    name: "bnum".to_string(),
                    value: "lots".to_string(),
                },
                Advisory::UnrecognizedMode('x'),
            ]
        );
    }

    #[test]
    fn fetch_variants() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        db.store("present", "yes").unwrap();

        assert!(matches!(db.fetch("missing"), Err(CoreError::KeyNotFound)));
        assert_eq!(db.fetch_or("missing", "fallback").unwrap(), b"fallback");
        assert_eq!(db.fetch_or("present", "fallback").unwrap(), b"yes");
        assert_eq!(
            db.fetch_or_else("missing", |key| key.to_ascii_uppercase()).unwrap(),
            b"MISSING"
        );

        let upper = |key: &[u8]| key.to_ascii_uppercase();
        assert_eq!(
            db.fetch_with("gone", Some(b"d".to_vec()), Some(&upper)).unwrap(),
            b"GONE"
        );
        assert_eq!(db.take_advisories(), vec![Advisory::FunctionSupersedesDefault]);
        assert_eq!(db.fetch_with("gone", Some(b"d".to_vec()), None).unwrap(), b"d");
        assert!(db.fetch_with("gone", None, None).is_err());
    }

    #[test]
    fn defaults_serve_the_indexing_accessor() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        db.store("a", "1").unwrap();

        assert_eq!(db.get("b").unwrap(), None);
        db.set_default(Some(ValueDefault::function(|key: &[u8]| [key, key].concat())));
        assert_eq!(db.get("b").unwrap(), Some(b"bb".to_vec()));
        assert_eq!(db.get("a").unwrap(), Some(b"1".to_vec()));
        assert!(matches!(db.fetch("b"), Err(CoreError::KeyNotFound)));
        assert_eq!(
            db.values_at(["a", "z"]).unwrap(),
            vec![Some(b"1".to_vec()), Some(b"zz".to_vec())]
        );

        let map = db.to_map(true).unwrap();
        assert_eq!(map.get(b"q"), Some(b"qq".to_vec()));
        assert_eq!(db.to_map(false).unwrap().get(b"q"), None);
    }

    #[test]
    fn delete_variants() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        db.update([("a", "1"), ("b", "2"), ("c", "3")]).unwrap();

        assert_eq!(db.delete("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(db.delete("a").unwrap(), None);
        assert_eq!(db.delete_or_else("a", |_| b"gone".to_vec()).unwrap(), b"gone");

        db.delete_if(|_, value| value == b"2").unwrap();
        assert!(!db.contains("b").unwrap());
        assert!(db.contains("c").unwrap());
        assert_eq!(db.size().unwrap(), 1);

        db.clear().unwrap();
        assert!(db.is_empty().unwrap());
    }

    #[test]
    fn iteration_stops_on_break() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        db.update((0..10).map(|n| (format!("k{n}"), format!("v{n}")))).unwrap();

        let mut seen = 0;
        db.each(|_, _| {
            seen += 1;
            if seen == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert_eq!(seen, 3);

        let mut keys = Vec::new();
        db.each_key(|key| {
            keys.push(key.to_vec());
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(keys.len(), 10);
        assert_eq!(db.values().unwrap().len(), 10);
    }

    #[test]
    fn keys_by_prefix_ignore_ranges() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        db.update([("user:1", "a"), ("user:2", "b"), ("post:1", "c")]).unwrap();

        let mut users = db.keys(&KeyQuery::new().prefix("user:")).unwrap();
        users.sort();
        assert_eq!(users, vec![b"user:1".to_vec(), b"user:2".to_vec()]);
        assert_eq!(db.keys(&KeyQuery::new().prefix("user:").limit(1)).unwrap().len(), 1);

        assert_eq!(db.keys(&KeyQuery::new().between("a", "b")).unwrap().len(), 3);
        assert_eq!(db.take_advisories(), vec![Advisory::RangeUnsupported]);
    }

    #[test]
    fn update_with_resolves_conflicts() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        db.store("a", "1").unwrap();

        db.update_with([("a", "2"), ("b", "3")], |_, old, new| [old, new].concat())
            .unwrap();
        assert_eq!(db.fetch("a").unwrap(), b"12");
        assert_eq!(db.fetch("b").unwrap(), b"3");
    }

    #[test]
    fn tuned_store_reopens_read_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tuned.tch");
        let config = Config::new().bnum(1000).opts("ld").rcnum(10).mutex(true);
        let mut db = HashDatabase::open(&path, config).unwrap();
        db.store("k", "v").unwrap();
        db.optimize(&Config::new().bnum(2000)).unwrap();
        db.close().unwrap();
        assert!(!db.is_open());
        assert!(matches!(db.fetch("k"), Err(CoreError::Closed)));

        let mut reader = HashDatabase::open_with_mode(&path, "r", Config::default()).unwrap();
        assert!(reader.is_read_only());
        assert_eq!(reader.fetch("k").unwrap(), b"v");
        assert!(reader.store("k", "w").is_err());
    }

    #[test]
    fn copies_open_independently() {
        let dir = tempdir().unwrap();
        let mut db = open_db(&dir);
        db.store("k", "v").unwrap();
        let copy = dir.path().join("copy.tch");
        db.copy(&copy).unwrap();
        db.defrag(0).unwrap();
        assert!(db.file_size().unwrap() > 0);

        let other = HashDatabase::open(&copy, Config::default()).unwrap();
        assert_eq!(other.fetch("k").unwrap(), b"v");
        assert_eq!(other.path(), copy.as_path());
    }
}
