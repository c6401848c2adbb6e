//! Reference hash engine.

use crate::backend::{HashEngine, ValueResolver};
use crate::counter;
use crate::error::{EngineError, EngineResult};
use crate::file::{delegate_engine, FileShell, Image};
use crate::flags::{HashTuning, TuneOpts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::vec;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct HashImage {
    tuning: HashTuning,
    rcnum: i32,
    records: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Image for HashImage {
    const KIND: u8 = 1;

    fn record_count(&self) -> u64 {
        self.records.len() as u64
    }

    fn payload_size(&self) -> u64 {
        self.records
            .iter()
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum()
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}

/// Merges `requested` into `current`, keeping values marked as unchanged.
pub(crate) fn merge_tuning(current: HashTuning, requested: HashTuning) -> HashTuning {
    HashTuning {
        bnum: if requested.bnum > 0 { requested.bnum } else { current.bnum },
        apow: if requested.apow >= 0 { requested.apow } else { current.apow },
        fpow: if requested.fpow >= 0 { requested.fpow } else { current.fpow },
        opts: if requested.opts == TuneOpts::UNCHANGED {
            current.opts
        } else {
            requested.opts
        },
    }
}

/// A hash database file.
///
/// Keys are unique; iteration visits every key once.
pub struct HashFile {
    shell: FileShell<HashImage>,
    iter: Option<vec::IntoIter<Vec<u8>>>,
}

impl HashFile {
    /// Creates an engine that is not yet open.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: FileShell::new(HashImage::default()),
            iter: None,
        }
    }

    fn load_hook(&mut self) {
        self.iter = None;
    }

    fn reset_handles(&mut self) {
        self.iter = None;
    }

    fn write_value(
        &mut self,
        key: &[u8],
        update: impl FnOnce(Option<&Vec<u8>>) -> EngineResult<Vec<u8>>,
    ) -> EngineResult<()> {
        self.shell.ensure_writer()?;
        let mut image = self.shell.write();
        let result = update(image.records.get(key)).map(|value| {
            image.records.insert(key.to_vec(), value);
        });
        drop(image);
        self.shell.record(result)
    }
}

impl Default for HashFile {
    fn default() -> Self {
        Self::new()
    }
}

delegate_engine!(HashFile);

impl HashEngine for HashFile {
    fn tune(&mut self, tuning: HashTuning) -> EngineResult<()> {
        self.shell.ensure_closed()?;
        let mut image = self.shell.write();
        image.tuning = merge_tuning(image.tuning, tuning);
        Ok(())
    }

    fn optimize(&mut self, tuning: HashTuning) -> EngineResult<()> {
        self.shell.ensure_writer()?;
        let mut image = self.shell.write();
        image.tuning = merge_tuning(image.tuning, tuning);
        debug!(bnum = image.tuning.bnum, opts = image.tuning.opts.bits(), "optimized hash file");
        Ok(())
    }

    fn set_cache(&mut self, rcnum: i32) -> EngineResult<()> {
        self.shell.ensure_closed()?;
        self.shell.write().rcnum = rcnum;
        Ok(())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write_value(key, |_| Ok(value.to_vec()))
    }

    fn put_keep(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write_value(key, |old| match old {
            Some(_) => Err(EngineError::keep()),
            None => Ok(value.to_vec()),
        })
    }

    fn put_cat(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write_value(key, |old| {
            let mut joined = old.cloned().unwrap_or_default();
            joined.extend_from_slice(value);
            Ok(joined)
        })
    }

    fn put_async(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.put(key, value)
    }

    fn put_proc(
        &mut self,
        key: &[u8],
        value: &[u8],
        resolver: ValueResolver<'_>,
    ) -> EngineResult<()> {
        self.write_value(key, |old| {
            Ok(match old {
                Some(old) => resolver(old),
                None => value.to_vec(),
            })
        })
    }

    fn add_int(&mut self, key: &[u8], num: i32) -> EngineResult<i32> {
        let mut total = 0;
        self.write_value(key, |old| {
            let (sum, bytes) = counter::add_int(old.map(Vec::as_slice), num)?;
            total = sum;
            Ok(bytes)
        })?;
        Ok(total)
    }

    fn add_double(&mut self, key: &[u8], num: f64) -> EngineResult<f64> {
        let mut total = 0.0;
        self.write_value(key, |old| {
            let (sum, bytes) = counter::add_double(old.map(Vec::as_slice), num)?;
            total = sum;
            Ok(bytes)
        })?;
        Ok(total)
    }

    fn get(&self, key: &[u8]) -> EngineResult<Vec<u8>> {
        self.shell.ensure_open()?;
        let found = self.shell.read().records.get(key).cloned();
        self.shell.record(found.ok_or_else(EngineError::no_record))
    }

    fn out(&mut self, key: &[u8]) -> EngineResult<()> {
        self.shell.ensure_writer()?;
        let removed = self.shell.write().records.remove(key);
        self.shell
            .record(removed.map(|_| ()).ok_or_else(EngineError::no_record))
    }

    fn fwmkeys(&self, prefix: &[u8], limit: Option<usize>) -> Vec<Vec<u8>> {
        let image = self.shell.read();
        image
            .records
            .range(prefix.to_vec()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    fn iter_init(&mut self) -> EngineResult<()> {
        self.shell.ensure_open()?;
        let keys: Vec<Vec<u8>> = self.shell.read().records.keys().cloned().collect();
        self.iter = Some(keys.into_iter());
        Ok(())
    }

    fn iter_next(&mut self) -> EngineResult<Vec<u8>> {
        self.iter_next_pair().map(|(key, _)| key)
    }

    fn iter_next_pair(&mut self) -> EngineResult<(Vec<u8>, Vec<u8>)> {
        let image = self.shell.read();
        let next = self.iter.as_mut().and_then(|keys| {
            keys.find_map(|key| image.records.get(&key).map(|value| (key, value.clone())))
        });
        drop(image);
        self.shell.record(next.ok_or_else(EngineError::no_record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Engine;
    use crate::error::ErrorCode;
    use crate::flags::OpenMode;
    use tempfile::tempdir;

    fn open_hash(dir: &tempfile::TempDir) -> HashFile {
        let mut db = HashFile::new();
        db.open(&dir.path().join("test.tch"), OpenMode::WRITER | OpenMode::CREATE)
            .unwrap();
        db
    }

    #[test]
    fn put_get_out() {
        let dir = tempdir().unwrap();
        let mut db = open_hash(&dir);

        db.put(b"key", b"value").unwrap();
        assert_eq!(db.get(b"key").unwrap(), b"value");
        db.out(b"key").unwrap();
        assert_eq!(db.get(b"key").unwrap_err().code, ErrorCode::NoRecord);
        assert_eq!(db.ecode(), ErrorCode::NoRecord);
        assert_eq!(db.out(b"key").unwrap_err().code, ErrorCode::NoRecord);
    }

    #[test]
    fn keep_and_cat_modes() {
        let dir = tempdir().unwrap();
        let mut db = open_hash(&dir);

        db.put_keep(b"k", b"one").unwrap();
        assert_eq!(db.put_keep(b"k", b"two").unwrap_err().code, ErrorCode::Keep);
        db.put_cat(b"k", b"+").unwrap();
        assert_eq!(db.get(b"k").unwrap(), b"one+");
    }

    #[test]
    fn put_proc_resolves_existing_values() {
        let dir = tempdir().unwrap();
        let mut db = open_hash(&dir);

        db.put_proc(b"k", b"first", &mut |_| b"unused".to_vec()).unwrap();
        assert_eq!(db.get(b"k").unwrap(), b"first");
        db.put_proc(b"k", b"second", &mut |old| [old, b"!"].concat())
            .unwrap();
        assert_eq!(db.get(b"k").unwrap(), b"first!");
    }

    #[test]
    fn prefix_keys_and_iteration() {
        let dir = tempdir().unwrap();
        let mut db = open_hash(&dir);
        for key in ["alpha", "alps", "beta"] {
            db.put(key.as_bytes(), b"").unwrap();
        }

        assert_eq!(db.fwmkeys(b"al", None), vec![b"alpha".to_vec(), b"alps".to_vec()]);
        assert_eq!(db.fwmkeys(b"al", Some(1)).len(), 1);

        db.iter_init().unwrap();
        let mut seen = Vec::new();
        while let Ok(key) = db.iter_next() {
            if key == b"alps" {
                db.out(b"beta").unwrap();
            }
            seen.push(key);
        }
        assert_eq!(seen, vec![b"alpha".to_vec(), b"alps".to_vec()]);
    }

    #[test]
    fn counters() {
        let dir = tempdir().unwrap();
        let mut db = open_hash(&dir);

        assert_eq!(db.add_int(b"i", 0).unwrap(), 0);
        assert_eq!(db.add_int(b"i", 1).unwrap(), 1);
        assert_eq!(db.add_int(b"i", -1).unwrap(), 0);
        assert_eq!(db.add_double(b"i", 1.0).unwrap_err().code, ErrorCode::Keep);
        assert!((db.add_double(b"f", 1.5).unwrap() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn tuning_only_before_open() {
        let dir = tempdir().unwrap();
        let mut db = HashFile::new();
        db.tune(HashTuning { bnum: 42, ..HashTuning::default() }).unwrap();
        db.set_cache(10).unwrap();
        db.open(&dir.path().join("t.tch"), OpenMode::WRITER | OpenMode::CREATE)
            .unwrap();
        assert_eq!(db.tune(HashTuning::default()).unwrap_err().code, ErrorCode::Invalid);
        db.optimize(HashTuning { opts: TuneOpts::LARGE, ..HashTuning::default() })
            .unwrap();
    }
}
