//! Reference table engine.
//!
//! Documents are column maps keyed by primary key. Queries scan the records,
//! so index definitions are kept and persisted but not consulted while
//! searching.

use crate::backend::{ColumnsResolver, QueryProcessor, TableEngine};
use crate::error::{EngineError, EngineResult};
use crate::eval;
use crate::file::{delegate_engine, FileShell, Image};
use crate::flags::{
    Columns, HashTuning, IndexCommand, IndexType, OrderType, QueryCondition, QueryId, SetOp,
};
use crate::hash::merge_tuning;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::vec;
use tracing::{debug, trace};

/// Column updated by `add_int` and `add_double`.
pub const NUMBER_COLUMN: &[u8] = b"_num";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct TableImage {
    tuning: HashTuning,
    caches: (i32, i32, i32),
    uid: i64,
    indexes: BTreeMap<Vec<u8>, IndexType>,
    records: BTreeMap<Vec<u8>, Columns>,
}

impl Image for TableImage {
    const KIND: u8 = 4;

    fn record_count(&self) -> u64 {
        self.records.len() as u64
    }

    fn payload_size(&self) -> u64 {
        self.records
            .iter()
            .map(|(pk, columns)| {
                pk.len() as u64
                    + columns
                        .iter()
                        .map(|(k, v)| (k.len() + v.len()) as u64)
                        .sum::<u64>()
            })
            .sum()
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}

#[derive(Debug, Clone, Default)]
struct QueryState {
    conditions: Vec<eval::Matcher>,
    order: Option<(Vec<u8>, OrderType)>,
    limit: Option<usize>,
    offset: usize,
}

impl QueryState {
    /// Primary keys whose records satisfy every condition, in key order.
    fn matching(&self, image: &TableImage) -> Vec<Vec<u8>> {
        image
            .records
            .iter()
            .filter(|(pk, columns)| {
                self.conditions
                    .iter()
                    .all(|matcher| matcher.matches(pk, columns))
            })
            .map(|(pk, _)| pk.clone())
            .collect()
    }

    /// Applies order, offset and limit to a list of primary keys.
    fn arrange(&self, image: &TableImage, mut keys: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        if let Some((column, order)) = &self.order {
            let empty = Columns::new();
            let mut keyed: Vec<(Vec<u8>, Vec<u8>)> = keys
                .into_iter()
                .map(|pk| {
                    let columns = image.records.get(&pk).unwrap_or(&empty);
                    let value = eval::column_value(&pk, columns, column)
                        .map(<[u8]>::to_vec)
                        .unwrap_or_default();
                    (value, pk)
                })
                .collect();
            keyed.sort_by(|a, b| eval::compare(*order, &a.0, &b.0));
            keys = keyed.into_iter().map(|(_, pk)| pk).collect();
        }
        keys.into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

fn strip_primary_key(columns: &Columns) -> Columns {
    columns
        .iter()
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// A table database file.
pub struct TableFile {
    shell: FileShell<TableImage>,
    queries: BTreeMap<u64, QueryState>,
    next_query: u64,
    iter: Option<vec::IntoIter<Vec<u8>>>,
}

impl TableFile {
    /// Creates an engine that is not yet open.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: FileShell::new(TableImage::default()),
            queries: BTreeMap::new(),
            next_query: 1,
            iter: None,
        }
    }

    fn load_hook(&mut self) {
        self.iter = None;
    }

    fn reset_handles(&mut self) {
        self.queries.clear();
        self.iter = None;
    }

    fn write_record<T>(
        &mut self,
        pk: &[u8],
        update: impl FnOnce(Option<&Columns>) -> EngineResult<(T, Columns)>,
    ) -> EngineResult<T> {
        self.shell.ensure_writer()?;
        if pk.is_empty() {
            return self
                .shell
                .record(Err(EngineError::invalid("empty primary key")));
        }
        let mut image = self.shell.write();
        let result = update(image.records.get(pk)).map(|(out, columns)| {
            image.records.insert(pk.to_vec(), strip_primary_key(&columns));
            out
        });
        drop(image);
        self.shell.record(result)
    }

    fn query(&self, query: QueryId) -> EngineResult<&QueryState> {
        match self.queries.get(&query.0) {
            Some(state) => Ok(state),
            None => self.shell.record(Err(EngineError::invalid("unknown query"))),
        }
    }

    fn query_mut(&mut self, query: QueryId) -> EngineResult<&mut QueryState> {
        match self.queries.get_mut(&query.0) {
            Some(state) => Ok(state),
            None => self.shell.record(Err(EngineError::invalid("unknown query"))),
        }
    }
}

impl Default for TableFile {
    fn default() -> Self {
        Self::new()
    }
}

delegate_engine!(TableFile);

impl TableEngine for TableFile {
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
        debug!(bnum = image.tuning.bnum, "optimized table file");
        Ok(())
    }

    fn set_cache(&mut self, rcnum: i32, lcnum: i32, ncnum: i32) -> EngineResult<()> {
        self.shell.ensure_closed()?;
        self.shell.write().caches = (rcnum, lcnum, ncnum);
        Ok(())
    }

    fn put(&mut self, pk: &[u8], columns: &Columns) -> EngineResult<()> {
        self.write_record(pk, |_| Ok(((), columns.clone())))
    }

    fn put_keep(&mut self, pk: &[u8], columns: &Columns) -> EngineResult<()> {
        self.write_record(pk, |old| match old {
            Some(_) => Err(EngineError::keep()),
            None => Ok(((), columns.clone())),
        })
    }

    fn put_cat(&mut self, pk: &[u8], columns: &Columns) -> EngineResult<()> {
        self.write_record(pk, |old| {
            let mut merged = old.cloned().unwrap_or_default();
            for (name, value) in columns {
                merged.entry(name.clone()).or_insert_with(|| value.clone());
            }
            Ok(((), merged))
        })
    }

    fn put_proc(
        &mut self,
        pk: &[u8],
        columns: &Columns,
        resolver: ColumnsResolver<'_>,
    ) -> EngineResult<()> {
        self.write_record(pk, |old| {
            Ok((
                (),
                match old {
                    Some(old) => resolver(old),
                    None => columns.clone(),
                },
            ))
        })
    }

    fn add_int(&mut self, pk: &[u8], num: i32) -> EngineResult<i32> {
        self.write_record(pk, |old| {
            let mut columns = old.cloned().unwrap_or_default();
            let current = columns
                .get(NUMBER_COLUMN)
                .map_or(0, |value| eval::leading_int(value));
            let total = current.wrapping_add(i64::from(num)) as i32;
            columns.insert(NUMBER_COLUMN.to_vec(), total.to_string().into_bytes());
            Ok((total, columns))
        })
    }

    fn add_double(&mut self, pk: &[u8], num: f64) -> EngineResult<f64> {
        self.write_record(pk, |old| {
            let mut columns = old.cloned().unwrap_or_default();
            let current = columns
                .get(NUMBER_COLUMN)
                .map_or(0.0, |value| eval::leading_float(value));
            let total = current + num;
            columns.insert(NUMBER_COLUMN.to_vec(), total.to_string().into_bytes());
            Ok((total, columns))
        })
    }

    fn get(&self, pk: &[u8]) -> EngineResult<Columns> {
        self.shell.ensure_open()?;
        let found = self.shell.read().records.get(pk).cloned();
        self.shell.record(found.ok_or_else(EngineError::no_record))
    }

    fn out(&mut self, pk: &[u8]) -> EngineResult<()> {
        self.shell.ensure_writer()?;
        let removed = self.shell.write().records.remove(pk);
        self.shell
            .record(removed.map(|_| ()).ok_or_else(EngineError::no_record))
    }

    fn fwmkeys(&self, prefix: &[u8], limit: Option<usize>) -> Vec<Vec<u8>> {
        self.shell
            .read()
            .records
            .range(prefix.to_vec()..)
            .map(|(pk, _)| pk)
            .take_while(|pk| pk.starts_with(prefix))
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
        let image = self.shell.read();
        let next = self
            .iter
            .as_mut()
            .and_then(|keys| keys.find(|pk| image.records.contains_key(pk)));
        drop(image);
        self.shell.record(next.ok_or_else(EngineError::no_record))
    }

    fn set_index(&mut self, column: &[u8], command: IndexCommand) -> EngineResult<()> {
        self.shell.ensure_writer()?;
        let mut image = self.shell.write();
        let result = match command {
            IndexCommand::Build { kind, keep } => {
                if keep && image.indexes.contains_key(column) {
                    Err(EngineError::keep())
                } else {
                    image.indexes.insert(column.to_vec(), kind);
                    Ok(())
                }
            }
            IndexCommand::Optimize => {
                if image.indexes.contains_key(column) {
                    Ok(())
                } else {
                    Err(EngineError::no_record())
                }
            }
            IndexCommand::Remove => image
                .indexes
                .remove(column)
                .map(|_| ())
                .ok_or_else(EngineError::no_record),
        };
        drop(image);
        debug!(column = %String::from_utf8_lossy(column), ?command, ok = result.is_ok(), "index command");
        self.shell.record(result)
    }

    fn gen_uid(&mut self) -> EngineResult<i64> {
        self.shell.ensure_writer()?;
        let mut image = self.shell.write();
        image.uid += 1;
        Ok(image.uid)
    }

    fn query_new(&mut self) -> EngineResult<QueryId> {
        self.shell.ensure_open()?;
        let id = self.next_query;
        self.next_query += 1;
        self.queries.insert(id, QueryState::default());
        Ok(QueryId(id))
    }

    fn query_add_condition(
        &mut self,
        query: QueryId,
        condition: QueryCondition,
    ) -> EngineResult<()> {
        self.query_mut(query)?.conditions.push(eval::Matcher::new(condition));
        Ok(())
    }

    fn query_set_order(
        &mut self,
        query: QueryId,
        column: &[u8],
        order: OrderType,
    ) -> EngineResult<()> {
        self.query_mut(query)?.order = Some((column.to_vec(), order));
        Ok(())
    }

    fn query_set_limit(
        &mut self,
        query: QueryId,
        limit: Option<usize>,
        offset: usize,
    ) -> EngineResult<()> {
        let state = self.query_mut(query)?;
        state.limit = limit;
        state.offset = offset;
        Ok(())
    }

    fn query_search(&self, query: QueryId) -> EngineResult<Vec<Vec<u8>>> {
        let state = self.query(query)?;
        let image = self.shell.read();
        let keys = state.arrange(&image, state.matching(&image));
        trace!(matched = keys.len(), "query search");
        Ok(keys)
    }

    fn query_process(
        &mut self,
        query: QueryId,
        processor: QueryProcessor<'_>,
    ) -> EngineResult<()> {
        let keys = self.query_search(query)?;
        let writer = self.shell.is_writer();
        for pk in keys {
            let found = self.shell.read().records.get(&pk).cloned();
            let Some(mut columns) = found else {
                continue;
            };
            let action = processor(pk.as_slice(), &mut columns);
            if (action.put || action.out) && !writer {
                return self
                    .shell
                    .record(Err(EngineError::invalid("database is read-only")));
            }
            if action.out {
                self.shell.write().records.remove(&pk);
            } else if action.put {
                self.shell
                    .write()
                    .records
                    .insert(pk, strip_primary_key(&columns));
            }
            if action.stop {
                break;
            }
        }
        Ok(())
    }

    fn query_free(&mut self, query: QueryId) {
        self.queries.remove(&query.0);
    }

    fn meta_search(&self, queries: &[QueryId], op: SetOp) -> EngineResult<Vec<Vec<u8>>> {
        let Some((first, rest)) = queries.split_first() else {
            return self.shell.record(Err(EngineError::invalid("no queries")));
        };
        let first = self.query(*first)?;
        let rest = rest
            .iter()
            .map(|query| self.query(*query))
            .collect::<EngineResult<Vec<_>>>()?;

        let image = self.shell.read();
        let mut combined = first.matching(&image);
        let others: Vec<Vec<Vec<u8>>> = rest.iter().map(|state| state.matching(&image)).collect();
        match op {
            SetOp::Union => {
                let mut seen: HashSet<Vec<u8>> = combined.iter().cloned().collect();
                for pk in others.into_iter().flatten() {
                    if seen.insert(pk.clone()) {
                        combined.push(pk);
                    }
                }
            }
            SetOp::Intersection | SetOp::Difference => {
                let sets: Vec<HashSet<Vec<u8>>> = others
                    .into_iter()
                    .map(|keys| keys.into_iter().collect())
                    .collect();
                let keep_common = op == SetOp::Intersection;
                combined.retain(|pk| sets.iter().all(|set| set.contains(pk) == keep_common));
            }
        }
        Ok(first.arrange(&image, combined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Engine;
    use crate::error::ErrorCode;
    use crate::flags::{ConditionOp, OpenMode, ProcAction};
    use tempfile::tempdir;

    fn open_table(dir: &tempfile::TempDir) -> TableFile {
        let mut db = TableFile::new();
        db.open(&dir.path().join("test.tct"), OpenMode::WRITER | OpenMode::CREATE)
            .unwrap();
        db
    }

    fn doc(pairs: &[(&str, &str)]) -> Columns {
        pairs
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect()
    }

    fn people(db: &mut TableFile) {
        db.put(b"dana", &doc(&[("first", "Dana"), ("age", "34")])).unwrap();
        db.put(b"james", &doc(&[("first", "James"), ("age", "33")])).unwrap();
        db.put(b"yuki", &doc(&[("first", "Yukihiro"), ("age", "44")])).unwrap();
    }

    fn condition(column: &str, op: ConditionOp, expr: &str) -> QueryCondition {
        QueryCondition {
            column: column.as_bytes().to_vec(),
            op,
            negate: false,
            no_index: false,
            expr: expr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn put_modes() {
        let dir = tempdir().unwrap();
        let mut db = open_table(&dir);

        db.put(b"k", &doc(&[("a", "1"), ("", "ignored")])).unwrap();
        assert_eq!(db.get(b"k").unwrap(), doc(&[("a", "1")]));
        assert_eq!(db.put_keep(b"k", &doc(&[])).unwrap_err().code, ErrorCode::Keep);
        db.put_cat(b"k", &doc(&[("a", "2"), ("b", "3")])).unwrap();
        assert_eq!(db.get(b"k").unwrap(), doc(&[("a", "1"), ("b", "3")]));
        assert_eq!(db.put(b"", &doc(&[])).unwrap_err().code, ErrorCode::Invalid);
    }

    #[test]
    fn number_column_counters() {
        let dir = tempdir().unwrap();
        let mut db = open_table(&dir);

        assert_eq!(db.add_int(b"n", 2).unwrap(), 2);
        assert_eq!(db.add_int(b"n", 3).unwrap(), 5);
        assert!((db.add_double(b"n", 0.5).unwrap() - 5.5).abs() < f64::EPSILON);
        assert_eq!(db.add_int(b"n", 1).unwrap(), 6);
        assert_eq!(db.get(b"n").unwrap(), doc(&[("_num", "6")]));
    }

    #[test]
    fn indexes_and_uids() {
        let dir = tempdir().unwrap();
        let mut db = open_table(&dir);

        let build = IndexCommand::Build { kind: IndexType::Decimal, keep: false };
        db.set_index(b"age", build).unwrap();
        db.set_index(b"age", build).unwrap();
        let keep = IndexCommand::Build { kind: IndexType::Decimal, keep: true };
        assert_eq!(db.set_index(b"age", keep).unwrap_err().code, ErrorCode::Keep);
        db.set_index(b"age", IndexCommand::Optimize).unwrap();
        db.set_index(b"age", IndexCommand::Remove).unwrap();
        assert_eq!(
            db.set_index(b"age", IndexCommand::Remove).unwrap_err().code,
            ErrorCode::NoRecord
        );

        assert_eq!(db.gen_uid().unwrap(), 1);
        assert_eq!(db.gen_uid().unwrap(), 2);
    }

    #[test]
    fn ordered_limited_search() {
        let dir = tempdir().unwrap();
        let mut db = open_table(&dir);
        people(&mut db);

        let q = db.query_new().unwrap();
        db.query_add_condition(q, condition("age", ConditionOp::NumGe, "34")).unwrap();
        db.query_set_order(q, b"age", OrderType::NumDesc).unwrap();
        assert_eq!(db.query_search(q).unwrap(), vec![b"yuki".to_vec(), b"dana".to_vec()]);

        db.query_set_limit(q, Some(1), 1).unwrap();
        assert_eq!(db.query_search(q).unwrap(), vec![b"dana".to_vec()]);
        db.query_free(q);
        assert_eq!(db.query_search(q).unwrap_err().code, ErrorCode::Invalid);
    }

    #[test]
    fn process_updates_and_deletes() {
        let dir = tempdir().unwrap();
        let mut db = open_table(&dir);
        people(&mut db);

        let q = db.query_new().unwrap();
        db.query_process(q, &mut |pk, columns| {
            if pk == b"dana" {
                columns.insert(b"seen".to_vec(), b"yes".to_vec());
                ProcAction { put: true, ..ProcAction::default() }
            } else if pk == b"james" {
                ProcAction { out: true, stop: true, ..ProcAction::default() }
            } else {
                ProcAction::default()
            }
        })
        .unwrap();

        assert_eq!(db.get(b"dana").unwrap().get(&b"seen"[..]), Some(&b"yes".to_vec()));
        assert_eq!(db.get(b"james").unwrap_err().code, ErrorCode::NoRecord);
        assert_eq!(db.record_count(), 2);
    }

    #[test]
    fn set_operations() {
        let dir = tempdir().unwrap();
        let mut db = open_table(&dir);
        people(&mut db);

        let young = db.query_new().unwrap();
        db.query_add_condition(young, condition("age", ConditionOp::NumLt, "40")).unwrap();
        let named_j = db.query_new().unwrap();
        db.query_add_condition(named_j, condition("first", ConditionOp::StrBeginsWith, "J"))
            .unwrap();

        let keys = |v: &[&str]| v.iter().map(|k| k.as_bytes().to_vec()).collect::<Vec<_>>();
        assert_eq!(
            db.meta_search(&[young, named_j], SetOp::Intersection).unwrap(),
            keys(&["james"])
        );
        assert_eq!(
            db.meta_search(&[young, named_j], SetOp::Difference).unwrap(),
            keys(&["dana"])
        );
        assert_eq!(
            db.meta_search(&[named_j, young], SetOp::Union).unwrap(),
            keys(&["james", "dana"])
        );
    }
}
