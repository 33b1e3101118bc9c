//! Slot backends.

use crate::error::{CounterError, Result};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File holding the serialized state inside a slot directory.
const STATE_FILE: &str = "state.json";

/// Scratch file for atomic replacement of [`STATE_FILE`].
const STATE_TMP_FILE: &str = "state.json.tmp";

/// A durable key-value slot holding one serialized state.
pub trait StateSlot {
    /// Read the slot, `None` if nothing has been written.
    fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the slot contents.
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Remove the slot entirely. Removing an empty slot is not an error.
    fn remove(&self) -> Result<()>;
}

/// In-memory slot.
///
/// Clones share the same contents, so a clone handed to a second session
/// behaves like the same storage seen after a reload.
#[derive(Clone, Debug, Default)]
pub struct MemorySlot {
    contents: Arc<Mutex<Option<Vec<u8>>>>,

    /// Writes larger than this fail with [`CounterError::QuotaExceeded`].
    quota: Option<usize>,
}

impl MemorySlot {
    /// Create an empty, unbounded slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty slot that rejects writes above `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            contents: Arc::default(),
            quota: Some(quota),
        }
    }

    /// Create a slot pre-filled with `bytes`.
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: Arc::new(Mutex::new(Some(bytes.into()))),
            quota: None,
        }
    }

    /// Snapshot of the current contents.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents.lock().clone()
    }
}

impl StateSlot for MemorySlot {
    fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.contents())
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        if let Some(quota) = self.quota {
            if bytes.len() > quota {
                return Err(CounterError::QuotaExceeded {
                    size: bytes.len(),
                    quota,
                });
            }
        }
        *self.contents.lock() = Some(bytes.to_vec());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        self.contents.lock().take();
        Ok(())
    }
}

/// Slot stored as a JSON file in a directory.
///
/// The directory is locked exclusively for the lifetime of the slot, so
/// only one process writes it at a time.
#[derive(Debug)]
pub struct FileSlot {
    /// Slot directory.
    path: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,
}

impl FileSlot {
    /// Open the slot directory, creating it if `create_if_missing`.
    pub fn open(path: impl AsRef<Path>, create_if_missing: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            if !create_if_missing {
                return Err(CounterError::NotInitialized);
            }
            fs::create_dir_all(&path)?;
        }

        let lock_file = Self::acquire_lock(&path)?;

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// Slot directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state_path(&self) -> PathBuf {
        self.path.join(STATE_FILE)
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| CounterError::Locked)?;

        Ok(lock_file)
    }
}

impl StateSlot for FileSlot {
    fn read(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(self.state_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let tmp_path = self.path.join(STATE_TMP_FILE);

        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, self.state_path())?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        match fs::remove_file(self.state_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
