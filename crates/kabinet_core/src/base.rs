//! State shared by every store: the engine handle, transaction flags and
//! advisories.

use crate::config::{saturate_i32, Config};
use crate::diagnostics::{Advisories, Advisory};
use crate::error::{CoreError, CoreResult};
use crate::options::mode_letters;
use crate::transaction::TxnState;
use crate::translate::check;
use kabinet_engine::{Engine, OpenMode};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Access to a store's shared state.
///
/// Public because it bounds [`Database`](crate::Database), but not
/// re-exported: code outside this crate cannot name it, so only this
/// crate's stores implement it.
pub trait Handle {
    /// The engine the store drives.
    type Engine: Engine;

    /// Returns the shared state.
    fn base(&self) -> &StoreBase<Self::Engine>;

    /// Returns the shared state mutably.
    fn base_mut(&mut self) -> &mut StoreBase<Self::Engine>;
}

/// An open engine plus the client-side state kept next to it.
pub struct StoreBase<E: Engine> {
    engine: Option<E>,
    path: PathBuf,
    read_only: bool,
    pub(crate) txn: TxnState,
    pub(crate) advisories: Advisories,
}

impl<E: Engine> StoreBase<E> {
    /// Applies the settings every variant shares, then opens the engine.
    ///
    /// Variant tuning must already be applied to `engine`.
    pub(crate) fn open(mut engine: E, path: &Path, mode: OpenMode, config: Config) -> CoreResult<Self> {
        if config.mutex {
            check(engine.set_mutex())?;
        }
        if let Some(xmsiz) = config.xmsiz {
            check(engine.set_xmsiz(xmsiz))?;
        }
        if let Some(dfunit) = config.dfunit {
            check(engine.set_dfunit(saturate_i32(dfunit)))?;
        }
        check(engine.open(path, mode))?;
        debug!(path = %path.display(), mode = %mode_letters(mode), "opened store");

        let read_only = !engine.is_writer();
        Ok(Self {
            engine: Some(engine),
            path: path.to_path_buf(),
            read_only,
            txn: TxnState::new(config.nesting),
            advisories: Advisories::new(config.advisories),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) const fn is_open(&self) -> bool {
        self.engine.is_some()
    }

    pub(crate) const fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn engine(&self) -> CoreResult<&E> {
        self.engine.as_ref().ok_or(CoreError::Closed)
    }

    pub(crate) fn engine_mut(&mut self) -> CoreResult<&mut E> {
        self.engine.as_mut().ok_or(CoreError::Closed)
    }

    pub(crate) fn advise(&self, advisory: Advisory) {
        self.advisories.raise(advisory);
    }

    /// Raises the advisories a [`Config`] collected while it was built.
    pub(crate) fn advise_config(&self, config: &Config) {
        self.advisories.extend(config.advisories.iter().cloned());
    }

    /// Flushes and releases the engine.
    ///
    /// A second close fails with [`CoreError::Closed`].
    pub(crate) fn close(&mut self) -> CoreResult<()> {
        let mut engine = self.engine.take().ok_or(CoreError::Closed)?;
        self.txn.finish();
        check(engine.close())?;
        debug!(path = %self.path.display(), "closed store");
        Ok(())
    }
}

impl<E: Engine> Drop for StoreBase<E> {
    fn drop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            if let Err(err) = engine.close() {
                warn!(path = %self.path.display(), error = %err, "failed to close store on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kabinet_engine::{HashEngine, HashFile};
    use tempfile::tempdir;

    #[test]
    fn close_releases_the_engine_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("base.tch");
        let mut base = StoreBase::open(
            HashFile::new(),
            &path,
            OpenMode::WRITER | OpenMode::CREATE,
            Config::default(),
        )
        .unwrap();
        assert!(base.is_open());
        assert!(!base.is_read_only());

        base.close().unwrap();
        assert!(!base.is_open());
        assert!(matches!(base.close(), Err(CoreError::Closed)));
        assert!(matches!(base.engine(), Err(CoreError::Closed)));
    }

    #[test]
    fn drop_flushes_an_open_engine() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drop.tch");
        {
            let mut base = StoreBase::open(
                HashFile::new(),
                &path,
                OpenMode::WRITER | OpenMode::CREATE,
                Config::default(),
            )
            .unwrap();
            base.engine_mut().unwrap().put(b"kept", b"yes").unwrap();
        }

        let base = StoreBase::open(HashFile::new(), &path, OpenMode::READER, Config::default())
            .unwrap();
        assert!(base.is_read_only());
        assert_eq!(base.engine().unwrap().get(b"kept").unwrap(), b"yes");
    }
}
