//! Engine queries compiled from [`QuerySpec`]s, freed on every exit path.

use crate::error::CoreResult;
use crate::table::query::QuerySpec;
use crate::translate::check;
use kabinet_engine::{QueryId, TableEngine};
use tracing::trace;

/// Engine queries compiled for one operation.
///
/// Every query is released when the guard drops.
pub(crate) struct CompiledQueries<'a, E: TableEngine> {
    engine: &'a mut E,
    ids: Vec<QueryId>,
}

impl<'a, E: TableEngine> CompiledQueries<'a, E> {
    pub(crate) fn new(engine: &'a mut E) -> Self {
        Self {
            engine,
            ids: Vec::new(),
        }
    }

    /// Compiles a [`QuerySpec`] and returns its engine query.
    pub(crate) fn compile(&mut self, spec: &QuerySpec) -> CoreResult<QueryId> {
        let id = check(self.engine.query_new())?;
        self.ids.push(id);
        for condition in &spec.conditions {
            check(self.engine.query_add_condition(id, condition.to_engine()))?;
        }
        if let Some(order) = &spec.order {
            check(self.engine.query_set_order(id, order.column(), order.kind()))?;
        }
        if spec.limit.is_some() || spec.offset > 0 {
            check(self.engine.query_set_limit(id, spec.limit, spec.offset))?;
        }
        trace!(
            conditions = spec.conditions.len(),
            ordered = spec.order.is_some(),
            "compiled query"
        );
        Ok(id)
    }

    /// Compiles every spec, in order.
    pub(crate) fn compile_all(&mut self, specs: &[QuerySpec]) -> CoreResult<Vec<QueryId>> {
        specs.iter().map(|spec| self.compile(spec)).collect()
    }

    pub(crate) fn engine(&mut self) -> &mut E {
        &mut *self.engine
    }
}

impl<E: TableEngine> Drop for CompiledQueries<'_, E> {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.engine.query_free(id);
        }
    }
}
