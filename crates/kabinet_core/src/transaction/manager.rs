//! Transaction boundaries.

use crate::base::Handle;
use crate::error::{CoreError, CoreResult, FinishSignal};
use crate::transaction::NestingPolicy;
use crate::translate::check;
use kabinet_engine::Engine;
use tracing::{debug, warn};

/// Runs `block` inside a transaction on `store`.
///
/// Returns `Ok(Some(value))` when the block completes, `Ok(None)` when it
/// ended early through `commit` or `abort`, and the block's error otherwise.
pub(crate) fn run<S, T, F>(store: &mut S, block: F) -> CoreResult<Option<T>>
where
    S: Handle,
    F: FnOnce(&mut S) -> CoreResult<T>,
{
    if store.base().txn.is_active() {
        return match store.base().txn.policy() {
            NestingPolicy::Ignore => block(store).map(Some),
            NestingPolicy::Fail => Err(CoreError::transaction("nested transaction")),
        };
    }

    let base = store.base_mut();
    check(base.engine_mut()?.tran_begin())?;
    base.txn.begin();
    debug!(path = %base.path().display(), "transaction started");

    let outcome = block(store);

    let base = store.base_mut();
    let abort = base.txn.abort_requested()
        || matches!(&outcome, Err(err) if !err.is_finish_signal());
    base.txn.finish();
    let finished = base.engine_mut().and_then(|engine| {
        check(if abort {
            engine.tran_abort()
        } else {
            engine.tran_commit()
        })
    });
    debug!(path = %base.path().display(), abort, "transaction finished");

    match outcome {
        Ok(value) => finished.map(|()| Some(value)),
        Err(err) if err.is_finish_signal() => finished.map(|()| None),
        Err(err) => {
            if let Err(finish_err) = finished {
                warn!(error = %finish_err, "failed to abort transaction");
            }
            Err(err)
        }
    }
}

/// Ends the running transaction block and commits it.
pub(crate) fn commit<S: Handle>(store: &mut S) -> CoreResult<()> {
    if !store.base().txn.is_active() {
        return Err(CoreError::transaction("not in transaction"));
    }
    Err(CoreError::TransactionFinished(FinishSignal::new()))
}

/// Ends the running transaction block and aborts it.
pub(crate) fn abort<S: Handle>(store: &mut S) -> CoreResult<()> {
    if !store.base().txn.is_active() {
        return Err(CoreError::transaction("not in transaction"));
    }
    store.base_mut().txn.request_abort();
    Err(CoreError::TransactionFinished(FinishSignal::new()))
}
