//! Non-fatal diagnostics recorded on a store.

use crate::store::StoreMode;
use parking_lot::Mutex;
use std::fmt;
use tracing::warn;

/// A non-fatal diagnostic.
///
/// Advisories are logged at `warn` level when raised and kept on the store
/// until taken with `Database::take_advisories`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// A mode letter was not recognized and was skipped.
    UnrecognizedMode(char),
    /// An option letter was not recognized and was skipped.
    UnrecognizedOpt(char),
    /// A configuration option name was not recognized.
    UnrecognizedSetting(String),
    /// A configuration value could not be read and was skipped.
    UnreadableSetting {
        /// The option name.
        name: String,
        /// The rejected value.
        value: String,
    },
    /// Both a mode argument and a mode option were given.
    ModeOptionSupersedesArgument,
    /// Both a resolver and a store mode were given.
    ResolverSupersedesMode,
    /// Both a default function and a default value were given.
    FunctionSupersedesDefault,
    /// The store does not support a mode; a plain store was used.
    UnsupportedMode {
        /// The requested mode.
        mode: StoreMode,
        /// The store variant.
        store: &'static str,
    },
    /// Both a range and a prefix were given; the range was used.
    RangeSupersedesPrefix,
    /// The store cannot list key ranges; the range was ignored.
    RangeUnsupported,
    /// A query callback asked to modify a read-only store.
    ReadOnlyQueryAction,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedMode(letter) => write!(f, "skipping unrecognized mode {letter:?}"),
            Self::UnrecognizedOpt(letter) => write!(f, "skipping unrecognized opt {letter:?}"),
            Self::UnrecognizedSetting(name) => write!(f, "skipping unrecognized option {name:?}"),
            Self::UnreadableSetting { name, value } => {
                write!(f, "skipping unreadable value {value:?} for option {name:?}")
            }
            Self::ModeOptionSupersedesArgument => f.write_str("mode option supersedes mode argument"),
            Self::ResolverSupersedesMode => f.write_str("block supersedes mode argument"),
            Self::FunctionSupersedesDefault => {
                f.write_str("block supersedes default value argument")
            }
            Self::UnsupportedMode { mode, store } => {
                write!(f, "{mode:?} mode is not supported by {store} stores, storing normally")
            }
            Self::RangeSupersedesPrefix => f.write_str("range supersedes prefix"),
            Self::RangeUnsupported => f.write_str("range queries are not supported, ignoring range"),
            Self::ReadOnlyQueryAction => {
                f.write_str("ignoring update and delete actions on a read-only database")
            }
        }
    }
}

/// Advisory log owned by a store.
#[derive(Debug, Default)]
pub(crate) struct Advisories {
    entries: Mutex<Vec<Advisory>>,
}

impl Advisories {
    /// Starts a log with advisories collected before the store opened.
    ///
    /// Each is logged as if raised.
    pub(crate) fn new(initial: Vec<Advisory>) -> Self {
        let log = Self::default();
        log.extend(initial);
        log
    }

    pub(crate) fn raise(&self, advisory: Advisory) {
        warn!(%advisory, "advisory");
        self.entries.lock().push(advisory);
    }

    pub(crate) fn extend(&self, advisories: impl IntoIterator<Item = Advisory>) {
        for advisory in advisories {
            self.raise(advisory);
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Advisory> {
        self.entries.lock().clone()
    }

    pub(crate) fn take(&self) -> Vec<Advisory> {
        std::mem::take(&mut *self.entries.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_advisories_are_kept_until_taken() {
        let log = Advisories::new(vec![Advisory::ModeOptionSupersedesArgument]);
        log.raise(Advisory::RangeUnsupported);

        assert_eq!(log.snapshot().len(), 2);
        assert_eq!(
            log.take(),
            vec![Advisory::ModeOptionSupersedesArgument, Advisory::RangeUnsupported]
        );
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn messages_name_the_conflict() {
        assert_eq!(
            Advisory::ModeOptionSupersedesArgument.to_string(),
            "mode option supersedes mode argument"
        );
        assert_eq!(
            Advisory::UnrecognizedMode('x').to_string(),
            "skipping unrecognized mode 'x'"
        );
    }
}
