//! Thread-safe buffer layer

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::LogFile;
use crate::error::{Error, Result};

/// Outermost layer guarding the whole chain with a read/write lock
///
/// Mutating calls take the write lock for their full duration; `size` and
/// `time_since_sync` share the read lock. Clones share the same file, so a
/// timer thread and the ingestion path can hold one handle each.
#[derive(Clone)]
pub struct SynchronizedLogFile {
    path: PathBuf,
    inner: Arc<RwLock<Box<dyn LogFile>>>,
}

impl SynchronizedLogFile {
    pub fn new(child: Box<dyn LogFile>) -> Self {
        Self {
            path: child.path().to_path_buf(),
            inner: Arc::new(RwLock::new(child)),
        }
    }

    fn with_write<T>(&self, op: impl FnOnce(&mut dyn LogFile) -> Result<T>) -> Result<T> {
        let mut child = self
            .inner
            .write()
            .map_err(|_| Error::LockPoisoned("log file"))?;
        op(child.as_mut())
    }

    fn with_read<T>(&self, op: impl FnOnce(&dyn LogFile) -> T) -> T {
        let child = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        op(child.as_ref())
    }
}

impl LogFile for SynchronizedLogFile {
    fn write(&mut self, chunks: &[&[u8]]) -> Result<()> {
        self.with_write(|child| child.write(chunks))
    }

    fn fsync(&mut self) -> Result<()> {
        self.with_write(|child| child.fsync())
    }

    fn close(&mut self) -> Result<()> {
        self.with_write(|child| child.close())
    }

    fn size(&self) -> Result<u64> {
        self.with_read(|child| child.size())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn time_since_sync(&self) -> Duration {
        self.with_read(|child| child.time_since_sync())
    }
}
