//! Plain text buffer file

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::LogFile;
use crate::error::{Error, Result};

/// Innermost layer: an append-mode file handle
///
/// Writes go straight to the OS without user-space buffering, so `size`
/// always reflects everything written so far.
pub struct PlainLogFile {
    path: PathBuf,
    file: Option<File>,
    last_sync: Instant,
}

impl PlainLogFile {
    /// Open (or create) `path` for appending
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        Ok(Self {
            path,
            file: Some(file),
            last_sync: Instant::now(),
        })
    }

    /// Check if the file handle has been released
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn handle(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::LogFileClosed(self.path.clone()))
    }
}

impl LogFile for PlainLogFile {
    fn write(&mut self, chunks: &[&[u8]]) -> Result<()> {
        let file = self.handle()?;
        for chunk in chunks {
            file.write_all(chunk)?;
        }
        Ok(())
    }

    fn fsync(&mut self) -> Result<()> {
        self.handle()?.sync_all()?;
        self.last_sync = Instant::now();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Released even if the final sync fails
        let mut file = self
            .file
            .take()
            .ok_or_else(|| Error::LogFileClosed(self.path.clone()))?;
        file.flush()?;
        file.sync_all()?;
        self.last_sync = Instant::now();
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn time_since_sync(&self) -> Duration {
        self.last_sync.elapsed()
    }
}
