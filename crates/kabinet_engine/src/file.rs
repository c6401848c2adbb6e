//! File handling shared by the reference engines.
//!
//! A reference engine keeps its whole record image in memory behind a
//! `parking_lot::RwLock` and persists it as a CBOR snapshot:
//!
//! ```text
//! +-------+------+----------------------+
//! | magic | kind | CBOR encoded image   |
//! | 4 B   | 1 B  | ...                  |
//! +-------+------+----------------------+
//! ```
//!
//! The snapshot is written when a writer creates, syncs, copies or closes the
//! file. The open file handle carries an `fs2` advisory lock for as long as
//! the engine stays open.

use crate::error::{EngineError, EngineResult, ErrorCode};
use crate::flags::OpenMode;
use fs2::FileExt;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Magic bytes at the start of every snapshot.
const MAGIC: &[u8; 4] = b"KBNT";

/// Size of the snapshot header.
pub(crate) const HEADER_SIZE: u64 = 256;

/// Per-record bookkeeping counted by `file_size`.
pub(crate) const RECORD_OVERHEAD: u64 = 16;

/// An in-memory record image that can be persisted.
pub(crate) trait Image: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Kind byte distinguishing engine variants on disk.
    const KIND: u8;

    /// Number of records in the image.
    fn record_count(&self) -> u64;

    /// Total bytes of keys and values.
    fn payload_size(&self) -> u64;

    /// Removes every record.
    fn clear(&mut self);
}

/// Settings recorded before `open`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ShellSettings {
    pub(crate) mutex: bool,
    pub(crate) xmsiz: i64,
    pub(crate) dfunit: i32,
}

/// Open file, lock and image shared by the reference engines.
pub(crate) struct FileShell<I> {
    path: Option<PathBuf>,
    file: Option<File>,
    mode: OpenMode,
    image: RwLock<I>,
    backup: Option<I>,
    last_error: Mutex<ErrorCode>,
    settings: ShellSettings,
}

impl<I: Image> FileShell<I> {
    pub(crate) fn new(image: I) -> Self {
        Self {
            path: None,
            file: None,
            mode: OpenMode::default(),
            image: RwLock::new(image),
            backup: None,
            last_error: Mutex::new(ErrorCode::Success),
            settings: ShellSettings::default(),
        }
    }

    /// Records the code of a failed result so `ecode` can report it.
    pub(crate) fn record<T>(&self, result: EngineResult<T>) -> EngineResult<T> {
        if let Err(err) = &result {
            trace!(code = err.code.as_i32(), "engine call failed");
            *self.last_error.lock() = err.code;
        }
        result
    }

    pub(crate) fn ecode(&self) -> ErrorCode {
        *self.last_error.lock()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub(crate) fn is_writer(&self) -> bool {
        self.is_open() && self.mode.contains(OpenMode::WRITER)
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn settings_mut(&mut self) -> EngineResult<&mut ShellSettings> {
        self.ensure_closed()?;
        Ok(&mut self.settings)
    }

    pub(crate) fn ensure_closed(&self) -> EngineResult<()> {
        if self.is_open() {
            return self.record(Err(EngineError::invalid("database is already open")));
        }
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> EngineResult<()> {
        if !self.is_open() {
            return self.record(Err(EngineError::invalid("database is not open")));
        }
        Ok(())
    }

    pub(crate) fn ensure_writer(&self) -> EngineResult<()> {
        self.ensure_open()?;
        if !self.mode.contains(OpenMode::WRITER) {
            return self.record(Err(EngineError::invalid("database is read-only")));
        }
        Ok(())
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, I> {
        self.image.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, I> {
        self.image.write()
    }

    /// Replaces the image prototype used for a freshly created file.
    pub(crate) fn set_prototype(&mut self, image: I) -> EngineResult<()> {
        self.ensure_closed()?;
        *self.image.get_mut() = image;
        Ok(())
    }

    /// Opens `path`, locking it and loading (or creating) its snapshot.
    pub(crate) fn open(&mut self, path: &Path, mode: OpenMode) -> EngineResult<()> {
        self.ensure_closed()?;
        let result = self.open_file(path, mode);
        self.record(result)
    }

    fn open_file(&mut self, path: &Path, mode: OpenMode) -> EngineResult<()> {
        let writer = mode.contains(OpenMode::WRITER);
        let exists = path.exists();
        if !exists && !(writer && mode.contains(OpenMode::CREATE)) {
            return Err(EngineError::with_detail(
                ErrorCode::NoFile,
                path.display().to_string(),
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(writer)
            .create(writer && mode.contains(OpenMode::CREATE))
            .truncate(false)
            .open(path)
            .map_err(|e| EngineError::io(ErrorCode::Open, e))?;
        lock(&file, mode)?;

        let len = file
            .metadata()
            .map_err(|e| EngineError::io(ErrorCode::Stat, e))?
            .len();
        let fresh = len == 0 || (writer && mode.contains(OpenMode::TRUNCATE));
        if fresh {
            if len > 0 {
                self.image.get_mut().clear();
            }
            if writer {
                write_snapshot(&file, &*self.image.read())?;
            }
        } else {
            *self.image.get_mut() = read_snapshot(&file)?;
        }

        debug!(
            path = %path.display(),
            mode = mode.bits(),
            fresh,
            mutex = self.settings.mutex,
            xmsiz = self.settings.xmsiz,
            dfunit = self.settings.dfunit,
            "opened database file"
        );
        self.path = Some(path.to_path_buf());
        self.file = Some(file);
        self.mode = mode;
        Ok(())
    }

    /// Aborts any running transaction, writes the final snapshot and
    /// releases the lock.
    pub(crate) fn close(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        if let Some(backup) = self.backup.take() {
            *self.image.get_mut() = backup;
        }
        let result = match &self.file {
            Some(file) if self.mode.contains(OpenMode::WRITER) => {
                write_snapshot(file, &*self.image.read())
            }
            _ => Ok(()),
        };
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
        debug!(path = ?self.path, "closed database file");
        self.record(result)
    }

    /// Writes the current image to the open file.
    pub(crate) fn sync(&self) -> EngineResult<()> {
        self.ensure_writer()?;
        let result = match &self.file {
            Some(file) => write_snapshot(file, &*self.image.read()),
            None => Err(EngineError::invalid("database is not open")),
        };
        self.record(result)
    }

    /// Writes the current image to a new file at `dest`.
    pub(crate) fn copy(&self, dest: &Path) -> EngineResult<()> {
        self.ensure_open()?;
        let result = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(dest)
            .map_err(|e| EngineError::io(ErrorCode::Open, e))
            .and_then(|file| write_snapshot(&file, &*self.image.read()));
        debug!(dest = %dest.display(), "copied database file");
        self.record(result)
    }

    pub(crate) fn file_size(&self) -> u64 {
        if !self.is_open() {
            return 0;
        }
        let image = self.image.read();
        HEADER_SIZE + image.payload_size() + image.record_count() * RECORD_OVERHEAD
    }

    pub(crate) fn record_count(&self) -> u64 {
        if !self.is_open() {
            return 0;
        }
        self.image.read().record_count()
    }

    pub(crate) fn vanish(&mut self) -> EngineResult<()> {
        self.ensure_writer()?;
        self.image.get_mut().clear();
        Ok(())
    }

    pub(crate) fn defrag(&mut self, steps: i64) -> EngineResult<()> {
        self.ensure_writer()?;
        trace!(steps, "defragmentation requested");
        Ok(())
    }

    pub(crate) fn tran_begin(&mut self) -> EngineResult<()> {
        self.ensure_writer()?;
        if self.backup.is_some() {
            return self.record(Err(EngineError::invalid("transaction already running")));
        }
        self.backup = Some(self.image.get_mut().clone());
        Ok(())
    }

    pub(crate) fn tran_commit(&mut self) -> EngineResult<()> {
        self.ensure_writer()?;
        if self.backup.take().is_none() {
            return self.record(Err(EngineError::invalid("no transaction running")));
        }
        if self.mode.contains(OpenMode::SYNC) {
            self.sync()?;
        }
        Ok(())
    }

    pub(crate) fn tran_abort(&mut self) -> EngineResult<()> {
        self.ensure_writer()?;
        match self.backup.take() {
            Some(backup) => {
                *self.image.get_mut() = backup;
                Ok(())
            }
            None => self.record(Err(EngineError::invalid("no transaction running"))),
        }
    }
}

fn lock(file: &File, mode: OpenMode) -> EngineResult<()> {
    if mode.contains(OpenMode::NO_LOCK) {
        return Ok(());
    }
    let exclusive = mode.contains(OpenMode::WRITER);
    let result = match (exclusive, mode.contains(OpenMode::LOCK_NONBLOCKING)) {
        (true, true) => file.try_lock_exclusive(),
        (true, false) => file.lock_exclusive(),
        (false, true) => FileExt::try_lock_shared(file),
        (false, false) => FileExt::lock_shared(file),
    };
    result.map_err(|e| EngineError::with_detail(ErrorCode::Lock, e.to_string()))
}

fn write_snapshot<I: Image>(file: &File, image: &I) -> EngineResult<()> {
    let write_err = |e: std::io::Error| EngineError::io(ErrorCode::Write, e);
    file.set_len(0)
        .map_err(|e| EngineError::io(ErrorCode::Truncate, e))?;
    let mut handle = file;
    handle
        .seek(SeekFrom::Start(0))
        .map_err(|e| EngineError::io(ErrorCode::Seek, e))?;

    let mut writer = BufWriter::new(handle);
    writer.write_all(MAGIC).map_err(write_err)?;
    writer.write_all(&[I::KIND]).map_err(write_err)?;
    ciborium::into_writer(image, &mut writer)
        .map_err(|e| EngineError::with_detail(ErrorCode::Write, e.to_string()))?;
    writer.flush().map_err(write_err)?;
    drop(writer);

    file.sync_data()
        .map_err(|e| EngineError::io(ErrorCode::Sync, e))
}

fn read_snapshot<I: Image>(file: &File) -> EngineResult<I> {
    let mut handle = file;
    handle
        .seek(SeekFrom::Start(0))
        .map_err(|e| EngineError::io(ErrorCode::Seek, e))?;
    let mut reader = BufReader::new(handle);

    let mut header = [0u8; 5];
    reader
        .read_exact(&mut header)
        .map_err(|e| EngineError::with_detail(ErrorCode::Meta, e.to_string()))?;
    if &header[..4] != MAGIC {
        return Err(EngineError::with_detail(ErrorCode::Meta, "bad magic"));
    }
    if header[4] != I::KIND {
        return Err(EngineError::with_detail(
            ErrorCode::Meta,
            format!("file holds engine kind {}, expected {}", header[4], I::KIND),
        ));
    }
    ciborium::from_reader(reader)
        .map_err(|e| EngineError::with_detail(ErrorCode::Header, e.to_string()))
}

/// Implements [`crate::Engine`] for a type with a `shell: FileShell<_>` field.
///
/// The type must provide `fn load_hook(&mut self)`, run whenever the image
/// is replaced by `open` or `tran_abort`, and `fn reset_handles(&mut self)`,
/// run before `close`.
macro_rules! delegate_engine {
    ($ty:ty) => {
        impl $crate::backend::Engine for $ty {
            fn open(
                &mut self,
                path: &std::path::Path,
                mode: $crate::flags::OpenMode,
            ) -> $crate::error::EngineResult<()> {
                self.shell.open(path, mode)?;
                self.load_hook();
                Ok(())
            }

            fn close(&mut self) -> $crate::error::EngineResult<()> {
                self.reset_handles();
                self.shell.close()
            }

            fn path(&self) -> Option<&std::path::Path> {
                self.shell.path()
            }

            fn ecode(&self) -> $crate::error::ErrorCode {
                self.shell.ecode()
            }

            fn set_mutex(&mut self) -> $crate::error::EngineResult<()> {
                self.shell.settings_mut()?.mutex = true;
                Ok(())
            }

            fn set_xmsiz(&mut self, xmsiz: i64) -> $crate::error::EngineResult<()> {
                self.shell.settings_mut()?.xmsiz = xmsiz;
                Ok(())
            }

            fn set_dfunit(&mut self, dfunit: i32) -> $crate::error::EngineResult<()> {
                self.shell.settings_mut()?.dfunit = dfunit;
                Ok(())
            }

            fn sync(&mut self) -> $crate::error::EngineResult<()> {
                self.shell.sync()
            }

            fn file_size(&self) -> u64 {
                self.shell.file_size()
            }

            fn copy(&self, dest: &std::path::Path) -> $crate::error::EngineResult<()> {
                self.shell.copy(dest)
            }

            fn defrag(&mut self, steps: i64) -> $crate::error::EngineResult<()> {
                self.shell.defrag(steps)
            }

            fn vanish(&mut self) -> $crate::error::EngineResult<()> {
                self.shell.vanish()
            }

            fn record_count(&self) -> u64 {
                self.shell.record_count()
            }

            fn tran_begin(&mut self) -> $crate::error::EngineResult<()> {
                self.shell.tran_begin()
            }

            fn tran_commit(&mut self) -> $crate::error::EngineResult<()> {
                self.shell.tran_commit()
            }

            fn tran_abort(&mut self) -> $crate::error::EngineResult<()> {
                self.shell.tran_abort()?;
                self.load_hook();
                Ok(())
            }

            fn is_writer(&self) -> bool {
                self.shell.is_writer()
            }
        }
    };
}

pub(crate) use delegate_engine;
