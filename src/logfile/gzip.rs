//! Gzip buffer layer

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;

use super::{from_io, into_io, LogFile};
use crate::error::{Error, Result};

/// Adapts the inner layer to `io::Write` for the encoder
struct ChildWriter {
    child: Box<dyn LogFile>,
}

impl Write for ChildWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.child.write(&[buf]).map_err(into_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compresses everything written through it into the inner layer
///
/// Layers nest: a gzip layer around another gzip layer produces a file that
/// needs two decodes.
pub struct GzipLogFile {
    encoder: GzEncoder<ChildWriter>,
    closed: bool,
}

impl GzipLogFile {
    pub fn new(child: Box<dyn LogFile>) -> Self {
        Self {
            encoder: GzEncoder::new(ChildWriter { child }, Compression::default()),
            closed: false,
        }
    }

    fn child(&self) -> &dyn LogFile {
        self.encoder.get_ref().child.as_ref()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::LogFileClosed(self.path().to_path_buf()));
        }
        Ok(())
    }
}

impl LogFile for GzipLogFile {
    fn write(&mut self, chunks: &[&[u8]]) -> Result<()> {
        self.ensure_open()?;
        for chunk in chunks {
            self.encoder.write_all(chunk).map_err(from_io)?;
        }
        Ok(())
    }

    fn fsync(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.encoder.flush().map_err(from_io)?;
        self.encoder.get_mut().child.fsync()
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        // The trailer must be fully written before the inner layer closes.
        self.encoder.try_finish().map_err(from_io)?;
        self.closed = true;
        self.encoder.get_mut().child.close()
    }

    fn size(&self) -> Result<u64> {
        self.child().size()
    }

    fn path(&self) -> &Path {
        self.child().path()
    }

    fn time_since_sync(&self) -> Duration {
        self.child().time_since_sync()
    }
}
