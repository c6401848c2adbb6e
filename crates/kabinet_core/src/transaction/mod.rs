//! Store-scoped transactions.
//!
//! A store is either idle or inside one transaction. `transaction` begins an
//! engine transaction, runs a block and commits it, or aborts it when the
//! block fails or asks to abort. `commit` and `abort` end the block early:
//! they return an early-exit error that the block propagates with `?`.

mod manager;
mod state;

pub(crate) use manager::{abort, commit, run};
pub(crate) use state::TxnState;
pub use state::NestingPolicy;
