//! Layered Buffer Files
//!
//! A buffer file is built from independent layers, innermost first:
//!
//! ```text
//! PlainLogFile -> GzipLogFile (content) -> GzipLogFile (encoding) -> SynchronizedLogFile
//! ```
//!
//! Every layer implements [`LogFile`] and only talks to the next layer
//! inward through that trait. The synchronized layer must be outermost so
//! the whole chain runs as one critical section per call.

mod gzip;
mod plain;
mod synchronized;

pub use gzip::GzipLogFile;
pub use plain::PlainLogFile;
pub use synchronized::SynchronizedLogFile;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Operations shared by every buffer file layer
///
/// `close` is not idempotent: any `write`, `fsync` or `close` after a
/// successful close fails with [`Error::LogFileClosed`].
pub trait LogFile: Send + Sync {
    /// Append each chunk in order
    fn write(&mut self, chunks: &[&[u8]]) -> Result<()>;

    /// Flush buffered data and force it to stable storage
    fn fsync(&mut self) -> Result<()>;

    /// Flush, finalize and release the underlying file
    fn close(&mut self) -> Result<()>;

    /// Size of the file on disk (only bytes already handed to the OS)
    fn size(&self) -> Result<u64>;

    /// Path of the file on disk
    fn path(&self) -> &Path;

    /// Elapsed time since the last successful fsync (or open)
    fn time_since_sync(&self) -> Duration;
}

/// Which layers to stack on top of the plain file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogFileOptions {
    /// Gzip the file contents
    pub gzip: bool,
    /// Add a second gzip layer for transfer encoding
    pub gzip_encoded: bool,
    /// Guard the chain with a read/write lock
    pub synchronize: bool,
}

/// Open a buffer file at `path` with the requested layers
pub fn open_log_file(path: impl Into<PathBuf>, options: LogFileOptions) -> Result<Box<dyn LogFile>> {
    let mut file: Box<dyn LogFile> = Box::new(PlainLogFile::open(path)?);
    if options.gzip {
        file = Box::new(GzipLogFile::new(file));
    }
    if options.gzip_encoded {
        file = Box::new(GzipLogFile::new(file));
    }
    if options.synchronize {
        file = Box::new(SynchronizedLogFile::new(file));
    }
    Ok(file)
}

/// Carry a crate error through an `io::Write` boundary
pub(crate) fn into_io(err: Error) -> io::Error {
    match err {
        Error::Io(e) => e,
        other => io::Error::other(other),
    }
}

/// Recover a crate error that was carried through an `io::Write` boundary
pub(crate) fn from_io(err: io::Error) -> Error {
    if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        return Error::Io(err);
    }
    let kind = err.kind();
    match err.into_inner().map(|inner| inner.downcast::<Error>()) {
        Some(Ok(inner)) => *inner,
        _ => Error::Io(io::Error::from(kind)),
    }
}
