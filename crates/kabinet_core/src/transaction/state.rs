//! Transaction state.

/// What happens when a transaction is started inside another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NestingPolicy {
    /// Run the inner block inside the running transaction.
    Ignore,
    /// Fail with a transaction error.
    #[default]
    Fail,
}

/// Per-store transaction flags.
///
/// Not persisted; a store starts idle and returns to idle on close.
#[derive(Debug, Default)]
pub(crate) struct TxnState {
    active: bool,
    pending_abort: bool,
    policy: NestingPolicy,
}

impl TxnState {
    pub(crate) fn new(policy: NestingPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub(crate) const fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) const fn policy(&self) -> NestingPolicy {
        self.policy
    }

    pub(crate) const fn abort_requested(&self) -> bool {
        self.pending_abort
    }

    pub(crate) fn begin(&mut self) {
        self.active = true;
        self.pending_abort = false;
    }

    pub(crate) fn request_abort(&mut self) {
        self.pending_abort = true;
    }

    pub(crate) fn finish(&mut self) {
        self.active = false;
        self.pending_abort = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_returns_to_idle() {
        let mut state = TxnState::new(NestingPolicy::Ignore);
        assert!(!state.is_active());

        state.begin();
        state.request_abort();
        assert!(state.is_active());
        assert!(state.abort_requested());

        state.finish();
        assert!(!state.is_active());
        assert!(!state.abort_requested());
        assert_eq!(state.policy(), NestingPolicy::Ignore);
    }
}
