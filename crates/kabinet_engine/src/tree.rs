//! Reference ordered (B-tree) engine.
//!
//! Records live in a vector of `(key, values)` entries kept sorted by the
//! active comparator. Duplicate values of one key are kept in insertion
//! order. Cursor positions are stored as `(key, duplicate index)` so they
//! stay meaningful while records are added and removed around them.

use crate::backend::{Comparator, HashEngine, OrderedEngine, ValueResolver};
use crate::counter;
use crate::error::{EngineError, EngineResult};
use crate::file::{delegate_engine, FileShell, Image};
use crate::flags::{CursorId, HashTuning, TreeTuning, TuneOpts};
use crate::hash::merge_tuning;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

type Entry = (Vec<u8>, Vec<Vec<u8>>);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Position {
    key: Vec<u8>,
    dup: usize,
}

impl Position {
    fn first_of(entry: &Entry) -> Self {
        Self {
            key: entry.0.clone(),
            dup: 0,
        }
    }

    fn last_of(entry: &Entry) -> Self {
        Self {
            key: entry.0.clone(),
            dup: entry.1.len().saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct TreeImage {
    tuning: TreeTuning,
    lcnum: i32,
    ncnum: i32,
    entries: Vec<Entry>,
}

impl Image for TreeImage {
    const KIND: u8 = 2;

    fn record_count(&self) -> u64 {
        self.entries.iter().map(|(_, values)| values.len() as u64).sum()
    }

    fn payload_size(&self) -> u64 {
        self.entries
            .iter()
            .map(|(key, values)| {
                values
                    .iter()
                    .map(|v| (key.len() + v.len()) as u64)
                    .sum::<u64>()
            })
            .sum()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

fn compare(comparator: &Option<Comparator>, a: &[u8], b: &[u8]) -> Ordering {
    match comparator {
        Some(cmp) => cmp(a, b),
        None => a.cmp(b),
    }
}

fn search(comparator: &Option<Comparator>, entries: &[Entry], key: &[u8]) -> Result<usize, usize> {
    entries.binary_search_by(|(k, _)| compare(comparator, k, key))
}

/// A B-tree database file.
pub struct TreeFile {
    shell: FileShell<TreeImage>,
    comparator: Option<Comparator>,
    cursors: BTreeMap<u64, Option<Position>>,
    next_cursor: u64,
    iter: Option<Position>,
}

impl TreeFile {
    /// Creates an engine that is not yet open.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: FileShell::new(TreeImage::default()),
            comparator: None,
            cursors: BTreeMap::new(),
            next_cursor: 1,
            iter: None,
        }
    }

    fn load_hook(&mut self) {
        let comparator = &self.comparator;
        self.shell
            .write()
            .entries
            .sort_by(|a, b| compare(comparator, &a.0, &b.0));
        self.iter = None;
    }

    fn reset_handles(&mut self) {
        self.cursors.clear();
        self.iter = None;
    }

    fn write_entry<T>(
        &mut self,
        key: &[u8],
        update: impl FnOnce(&mut Vec<Entry>, Result<usize, usize>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.shell.ensure_writer()?;
        let mut image = self.shell.write();
        let found = search(&self.comparator, &image.entries, key);
        let result = update(&mut image.entries, found);
        drop(image);
        self.shell.record(result)
    }

    fn record_at(&self, position: Option<&Position>) -> EngineResult<(Vec<u8>, Vec<u8>)> {
        let image = self.shell.read();
        let record = position.and_then(|pos| {
            let index = search(&self.comparator, &image.entries, &pos.key).ok()?;
            let (key, values) = &image.entries[index];
            values.get(pos.dup).map(|value| (key.clone(), value.clone()))
        });
        drop(image);
        self.shell.record(record.ok_or_else(EngineError::no_record))
    }

    fn step_forward(&self, position: &Position) -> Option<Position> {
        let image = self.shell.read();
        let entries = &image.entries;
        match search(&self.comparator, entries, &position.key) {
            Ok(index) if position.dup + 1 < entries[index].1.len() => Some(Position {
                key: position.key.clone(),
                dup: position.dup + 1,
            }),
            Ok(index) => entries.get(index + 1).map(Position::first_of),
            Err(index) => entries.get(index).map(Position::first_of),
        }
    }

    fn step_back(&self, position: &Position) -> Option<Position> {
        let image = self.shell.read();
        let entries = &image.entries;
        match search(&self.comparator, entries, &position.key) {
            Ok(index) if position.dup > 0 => Some(Position {
                key: position.key.clone(),
                dup: (position.dup - 1).min(entries[index].1.len().saturating_sub(1)),
            }),
            Ok(index) | Err(index) => index
                .checked_sub(1)
                .and_then(|prev| entries.get(prev))
                .map(Position::last_of),
        }
    }

    fn position(&self, cursor: CursorId) -> EngineResult<Option<&Position>> {
        match self.cursors.get(&cursor.0) {
            Some(position) => Ok(position.as_ref()),
            None => self
                .shell
                .record(Err(EngineError::invalid("unknown cursor"))),
        }
    }

    fn move_cursor(
        &mut self,
        cursor: CursorId,
        target: impl FnOnce(&Self, Option<&Position>) -> Option<Position>,
    ) -> EngineResult<()> {
        let current = self.position(cursor)?.cloned();
        let next = target(self, current.as_ref());
        let found = next.is_some();
        self.cursors.insert(cursor.0, next);
        if found {
            Ok(())
        } else {
            self.shell.record(Err(EngineError::no_record()))
        }
    }
}

impl Default for TreeFile {
    fn default() -> Self {
        Self::new()
    }
}

delegate_engine!(TreeFile);

impl HashEngine for TreeFile {
    fn tune(&mut self, tuning: HashTuning) -> EngineResult<()> {
        self.shell.ensure_closed()?;
        let mut image = self.shell.write();
        image.tuning.hash = merge_tuning(image.tuning.hash, tuning);
        Ok(())
    }

    fn optimize(&mut self, tuning: HashTuning) -> EngineResult<()> {
        let current = self.shell.read().tuning;
        self.optimize_tree(TreeTuning {
            lmemb: 0,
            nmemb: 0,
            hash: merge_tuning(current.hash, tuning),
        })
    }

    fn set_cache(&mut self, rcnum: i32) -> EngineResult<()> {
        self.set_tree_cache(rcnum, 0)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write_entry(key, |entries, found| {
            match found {
                Ok(index) => entries[index].1[0] = value.to_vec(),
                Err(index) => entries.insert(index, (key.to_vec(), vec![value.to_vec()])),
            }
            Ok(())
        })
    }

    fn put_keep(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write_entry(key, |entries, found| match found {
            Ok(_) => Err(EngineError::keep()),
            Err(index) => {
                entries.insert(index, (key.to_vec(), vec![value.to_vec()]));
                Ok(())
            }
        })
    }

    fn put_cat(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write_entry(key, |entries, found| {
            match found {
                Ok(index) => entries[index].1[0].extend_from_slice(value),
                Err(index) => entries.insert(index, (key.to_vec(), vec![value.to_vec()])),
            }
            Ok(())
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
        self.write_entry(key, |entries, found| {
            match found {
                Ok(index) => {
                    let first = &mut entries[index].1[0];
                    *first = resolver(first);
                }
                Err(index) => entries.insert(index, (key.to_vec(), vec![value.to_vec()])),
            }
            Ok(())
        })
    }

    fn add_int(&mut self, key: &[u8], num: i32) -> EngineResult<i32> {
        self.write_entry(key, |entries, found| match found {
            Ok(index) => {
                let first = &mut entries[index].1[0];
                let (total, bytes) = counter::add_int(Some(first), num)?;
                *first = bytes;
                Ok(total)
            }
            Err(index) => {
                let (total, bytes) = counter::add_int(None, num)?;
                entries.insert(index, (key.to_vec(), vec![bytes]));
                Ok(total)
            }
        })
    }

    fn add_double(&mut self, key: &[u8], num: f64) -> EngineResult<f64> {
        self.write_entry(key, |entries, found| match found {
            Ok(index) => {
                let first = &mut entries[index].1[0];
                let (total, bytes) = counter::add_double(Some(first), num)?;
                *first = bytes;
                Ok(total)
            }
            Err(index) => {
                let (total, bytes) = counter::add_double(None, num)?;
                entries.insert(index, (key.to_vec(), vec![bytes]));
                Ok(total)
            }
        })
    }

    fn get(&self, key: &[u8]) -> EngineResult<Vec<u8>> {
        self.shell.ensure_open()?;
        let image = self.shell.read();
        let found = search(&self.comparator, &image.entries, key)
            .ok()
            .map(|index| image.entries[index].1[0].clone());
        drop(image);
        self.shell.record(found.ok_or_else(EngineError::no_record))
    }

    fn out(&mut self, key: &[u8]) -> EngineResult<()> {
        self.write_entry(key, |entries, found| match found {
            Ok(index) => {
                entries[index].1.remove(0);
                if entries[index].1.is_empty() {
                    entries.remove(index);
                }
                Ok(())
            }
            Err(_) => Err(EngineError::no_record()),
        })
    }

    fn fwmkeys(&self, prefix: &[u8], limit: Option<usize>) -> Vec<Vec<u8>> {
        self.shell
            .read()
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn iter_init(&mut self) -> EngineResult<()> {
        self.shell.ensure_open()?;
        self.iter = self.shell.read().entries.first().map(Position::first_of);
        Ok(())
    }

    fn iter_next(&mut self) -> EngineResult<Vec<u8>> {
        self.iter_next_pair().map(|(key, _)| key)
    }

    fn iter_next_pair(&mut self) -> EngineResult<(Vec<u8>, Vec<u8>)> {
        let record = self.record_at(self.iter.as_ref())?;
        self.iter = self.iter.as_ref().and_then(|pos| self.step_forward(pos));
        Ok(record)
    }
}

impl OrderedEngine for TreeFile {
    fn tune_tree(&mut self, tuning: TreeTuning) -> EngineResult<()> {
        self.shell.ensure_closed()?;
        let mut image = self.shell.write();
        image.tuning = TreeTuning {
            lmemb: if tuning.lmemb > 0 { tuning.lmemb } else { image.tuning.lmemb },
            nmemb: if tuning.nmemb > 0 { tuning.nmemb } else { image.tuning.nmemb },
            hash: merge_tuning(image.tuning.hash, tuning.hash),
        };
        Ok(())
    }

    fn optimize_tree(&mut self, tuning: TreeTuning) -> EngineResult<()> {
        self.shell.ensure_writer()?;
        let mut image = self.shell.write();
        if tuning.lmemb > 0 {
            image.tuning.lmemb = tuning.lmemb;
        }
        if tuning.nmemb > 0 {
            image.tuning.nmemb = tuning.nmemb;
        }
        image.tuning.hash = merge_tuning(image.tuning.hash, tuning.hash);
        debug!(
            lmemb = image.tuning.lmemb,
            nmemb = image.tuning.nmemb,
            large = image.tuning.hash.opts.contains(TuneOpts::LARGE),
            "optimized tree file"
        );
        Ok(())
    }

    fn set_tree_cache(&mut self, lcnum: i32, ncnum: i32) -> EngineResult<()> {
        self.shell.ensure_closed()?;
        let mut image = self.shell.write();
        image.lcnum = lcnum;
        image.ncnum = ncnum;
        Ok(())
    }

    fn set_comparator(&mut self, comparator: Comparator) -> EngineResult<()> {
        self.shell.ensure_closed()?;
        self.comparator = Some(comparator);
        Ok(())
    }

    fn put_dup(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write_entry(key, |entries, found| {
            match found {
                Ok(index) => entries[index].1.push(value.to_vec()),
                Err(index) => entries.insert(index, (key.to_vec(), vec![value.to_vec()])),
            }
            Ok(())
        })
    }

    fn get_list(&self, key: &[u8]) -> EngineResult<Vec<Vec<u8>>> {
        self.shell.ensure_open()?;
        let image = self.shell.read();
        let found = search(&self.comparator, &image.entries, key)
            .ok()
            .map(|index| image.entries[index].1.clone());
        drop(image);
        self.shell.record(found.ok_or_else(EngineError::no_record))
    }

    fn out_list(&mut self, key: &[u8]) -> EngineResult<()> {
        self.write_entry(key, |entries, found| match found {
            Ok(index) => {
                entries.remove(index);
                Ok(())
            }
            Err(_) => Err(EngineError::no_record()),
        })
    }

    fn value_count(&self, key: &[u8]) -> usize {
        let image = self.shell.read();
        search(&self.comparator, &image.entries, key)
            .map(|index| image.entries[index].1.len())
            .unwrap_or(0)
    }

    fn range(
        &self,
        start: Option<&[u8]>,
        start_inclusive: bool,
        finish: Option<&[u8]>,
        finish_inclusive: bool,
        limit: Option<usize>,
    ) -> Vec<Vec<u8>> {
        let image = self.shell.read();
        let first = match start {
            Some(start) => image.entries.partition_point(|(key, _)| match compare(&self.comparator, key, start) {
                Ordering::Less => true,
                Ordering::Equal => !start_inclusive,
                Ordering::Greater => false,
            }),
            None => 0,
        };
        image.entries[first..]
            .iter()
            .take_while(|(key, _)| match finish {
                Some(finish) => match compare(&self.comparator, key, finish) {
                    Ordering::Less => true,
                    Ordering::Equal => finish_inclusive,
                    Ordering::Greater => false,
                },
                None => true,
            })
            .take(limit.unwrap_or(usize::MAX))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn cursor_new(&mut self) -> EngineResult<CursorId> {
        self.shell.ensure_open()?;
        let id = self.next_cursor;
        self.next_cursor += 1;
        self.cursors.insert(id, None);
        Ok(CursorId(id))
    }

    fn cursor_first(&mut self, cursor: CursorId) -> EngineResult<()> {
        self.move_cursor(cursor, |db, _| {
            db.shell.read().entries.first().map(Position::first_of)
        })
    }

    fn cursor_last(&mut self, cursor: CursorId) -> EngineResult<()> {
        self.move_cursor(cursor, |db, _| {
            db.shell.read().entries.last().map(Position::last_of)
        })
    }

    fn cursor_jump(&mut self, cursor: CursorId, key: &[u8]) -> EngineResult<()> {
        self.move_cursor(cursor, |db, _| {
            let image = db.shell.read();
            let index = image
                .entries
                .partition_point(|(k, _)| compare(&db.comparator, k, key) == Ordering::Less);
            image.entries.get(index).map(Position::first_of)
        })
    }

    fn cursor_jump_back(&mut self, cursor: CursorId, key: &[u8]) -> EngineResult<()> {
        self.move_cursor(cursor, |db, _| {
            let image = db.shell.read();
            let index = image
                .entries
                .partition_point(|(k, _)| compare(&db.comparator, k, key) != Ordering::Greater);
            index
                .checked_sub(1)
                .and_then(|last| image.entries.get(last))
                .map(Position::last_of)
        })
    }

    fn cursor_next(&mut self, cursor: CursorId) -> EngineResult<()> {
        self.move_cursor(cursor, |db, current| {
            current.and_then(|pos| db.step_forward(pos))
        })
    }

    fn cursor_prev(&mut self, cursor: CursorId) -> EngineResult<()> {
        self.move_cursor(cursor, |db, current| current.and_then(|pos| db.step_back(pos)))
    }

    fn cursor_key(&self, cursor: CursorId) -> EngineResult<Vec<u8>> {
        self.record_at(self.position(cursor)?).map(|(key, _)| key)
    }

    fn cursor_value(&self, cursor: CursorId) -> EngineResult<Vec<u8>> {
        self.record_at(self.position(cursor)?).map(|(_, value)| value)
    }

    fn cursor_record(&self, cursor: CursorId) -> EngineResult<(Vec<u8>, Vec<u8>)> {
        self.record_at(self.position(cursor)?)
    }

    fn cursor_out(&mut self, cursor: CursorId) -> EngineResult<()> {
        self.shell.ensure_writer()?;
        let Some(position) = self.position(cursor)?.cloned() else {
            return self.shell.record(Err(EngineError::no_record()));
        };

        let mut image = self.shell.write();
        let Ok(index) = search(&self.comparator, &image.entries, &position.key) else {
            drop(image);
            return self.shell.record(Err(EngineError::no_record()));
        };
        if position.dup >= image.entries[index].1.len() {
            drop(image);
            return self.shell.record(Err(EngineError::no_record()));
        }

        image.entries[index].1.remove(position.dup);
        let next = if image.entries[index].1.is_empty() {
            image.entries.remove(index);
            image.entries.get(index).map(Position::first_of)
        } else if position.dup < image.entries[index].1.len() {
            Some(position)
        } else {
            image.entries.get(index + 1).map(Position::first_of)
        };
        drop(image);
        self.cursors.insert(cursor.0, next);
        Ok(())
    }

    fn cursor_free(&mut self, cursor: CursorId) {
        self.cursors.remove(&cursor.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Engine;
    use crate::error::ErrorCode;
    use crate::flags::OpenMode;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn open_tree(dir: &tempfile::TempDir, comparator: Option<Comparator>) -> TreeFile {
        let mut db = TreeFile::new();
        if let Some(cmp) = comparator {
            db.set_comparator(cmp).unwrap();
        }
        db.open(&dir.path().join("test.tcb"), OpenMode::WRITER | OpenMode::CREATE)
            .unwrap();
        db
    }

    fn abc(db: &mut TreeFile) {
        for key in ["a", "b", "c"] {
            db.put(key.as_bytes(), key.as_bytes()).unwrap();
        }
    }

    #[test]
    fn duplicates_keep_insertion_order() {
        let dir = tempdir().unwrap();
        let mut db = open_tree(&dir, None);

        db.put_dup(b"Gray", b"Dana").unwrap();
        db.put_dup(b"Gray", b"James").unwrap();
        assert_eq!(db.get(b"Gray").unwrap(), b"Dana");
        assert_eq!(db.get_list(b"Gray").unwrap(), vec![b"Dana".to_vec(), b"James".to_vec()]);
        assert_eq!(db.value_count(b"Gray"), 2);
        assert_eq!(db.record_count(), 2);

        db.out(b"Gray").unwrap();
        assert_eq!(db.get_list(b"Gray").unwrap(), vec![b"James".to_vec()]);
        db.out_list(b"Gray").unwrap();
        assert_eq!(db.get_list(b"Gray").unwrap_err().code, ErrorCode::NoRecord);
    }

    #[test]
    fn range_bounds() {
        let dir = tempdir().unwrap();
        let mut db = open_tree(&dir, None);
        abc(&mut db);

        let keys = |v: &[&str]| v.iter().map(|k| k.as_bytes().to_vec()).collect::<Vec<_>>();
        assert_eq!(db.range(Some(b"b"), true, Some(b"c"), true, None), keys(&["b", "c"]));
        assert_eq!(db.range(Some(b"b"), true, Some(b"c"), false, None), keys(&["b"]));
        assert_eq!(db.range(Some(b"b"), false, Some(b"c"), true, None), keys(&["c"]));
        assert_eq!(db.range(Some(b"ab"), true, Some(b"f"), true, None), keys(&["b", "c"]));
        assert_eq!(db.range(None, true, None, true, Some(2)), keys(&["a", "b"]));
    }

    #[test]
    fn custom_comparator_orders_keys() {
        let dir = tempdir().unwrap();
        let numeric: Comparator = Box::new(|a, b| {
            let parse = |s: &[u8]| String::from_utf8_lossy(s).parse::<i64>().unwrap_or(0);
            parse(a).cmp(&parse(b))
        });
        let mut db = open_tree(&dir, Some(numeric));
        for key in ["1", "11", "2"] {
            db.put(key.as_bytes(), b"").unwrap();
        }

        let keys = db.range(Some(b"2"), true, Some(b"100"), true, None);
        assert_eq!(keys, vec![b"2".to_vec(), b"11".to_vec()]);
    }

    #[test]
    fn cursor_walks_and_jumps() {
        let dir = tempdir().unwrap();
        let mut db = open_tree(&dir, None);
        abc(&mut db);

        let cur = db.cursor_new().unwrap();
        db.cursor_jump(cur, b"ab").unwrap();
        assert_eq!(db.cursor_key(cur).unwrap(), b"b");
        db.cursor_next(cur).unwrap();
        assert_eq!(db.cursor_key(cur).unwrap(), b"c");
        assert_eq!(db.cursor_next(cur).unwrap_err().code, ErrorCode::NoRecord);
        assert_eq!(db.cursor_key(cur).unwrap_err().code, ErrorCode::NoRecord);

        db.cursor_jump_back(cur, b"bz").unwrap();
        assert_eq!(db.cursor_key(cur).unwrap(), b"b");
        db.cursor_prev(cur).unwrap();
        assert_eq!(db.cursor_key(cur).unwrap(), b"a");
        assert!(db.cursor_prev(cur).is_err());

        assert!(db.cursor_jump(cur, b"z").is_err());
        db.cursor_free(cur);
    }

    #[test]
    fn cursor_out_moves_to_following_record() {
        let dir = tempdir().unwrap();
        let mut db = open_tree(&dir, None);
        abc(&mut db);
        db.put_dup(b"a", b"a2").unwrap();

        let cur = db.cursor_new().unwrap();
        db.cursor_first(cur).unwrap();
        db.cursor_out(cur).unwrap();
        assert_eq!(db.cursor_record(cur).unwrap(), (b"a".to_vec(), b"a2".to_vec()));
        db.cursor_out(cur).unwrap();
        assert_eq!(db.cursor_key(cur).unwrap(), b"b");
        assert_eq!(db.record_count(), 2);
    }

    #[test]
    fn reverse_cursor_visits_duplicates_backwards() {
        let dir = tempdir().unwrap();
        let mut db = open_tree(&dir, None);
        db.put(b"Gray", b"Dana").unwrap();
        db.put_dup(b"Gray", b"James").unwrap();
        db.put(b"Matsumoto", b"Yukihiro").unwrap();

        let cur = db.cursor_new().unwrap();
        db.cursor_last(cur).unwrap();
        let mut values = Vec::new();
        loop {
            values.push(db.cursor_value(cur).unwrap());
            if db.cursor_prev(cur).is_err() {
                break;
            }
        }
        assert_eq!(
            values,
            vec![b"Yukihiro".to_vec(), b"James".to_vec(), b"Dana".to_vec()]
        );
    }

    #[test]
    fn order_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.tcb");
        let mut db = TreeFile::new();
        db.open(&path, OpenMode::WRITER | OpenMode::CREATE).unwrap();
        abc(&mut db);
        db.close().unwrap();

        let mut db = TreeFile::new();
        db.open(&path, OpenMode::READER).unwrap();
        assert_eq!(db.range(None, true, None, true, None).len(), 3);
        assert_eq!(db.put(b"d", b"d").unwrap_err().code, ErrorCode::Invalid);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn range_matches_sorted_unique_keys(
            keys in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..8), 0..32)
        ) {
            let dir = tempdir().unwrap();
            let mut db = open_tree(&dir, None);
            for key in &keys {
                db.put_dup(key, b"v").unwrap();
            }

            let mut expected = keys.clone();
            expected.sort();
            expected.dedup();
            prop_assert_eq!(db.range(None, true, None, true, None), expected);
            prop_assert_eq!(db.record_count(), keys.len() as u64);
        }
    }
}
