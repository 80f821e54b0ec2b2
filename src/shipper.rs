//! Shipper
//!
//! Wires a [`LogRotate`] buffer to an [`Uploader`]: every retired buffer is
//! posted to the [`WorkerPool`], uploaded and then deleted locally. A
//! [`Schedule`] forces periodic rotation and flush checks so quiet periods
//! still ship data once the date bucket rolls over.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::WolfShipConfig;
use crate::error::{Error, Result};
use crate::event::{Event, OutputFormat};
use crate::path::PathFactory;
use crate::pool::{PoolStats, WorkerPool};
use crate::rotate::LogRotate;
use crate::schedule::Schedule;
use crate::upload::{RetryingUploader, UploadTarget, Uploader};

/// Buffers records locally and ships retired buffers
pub struct Shipper {
    rotater: Arc<LogRotate>,
    workers: Arc<WorkerPool>,
    timer: Mutex<Option<Schedule>>,
    format: OutputFormat,
    buffer_dir: PathBuf,
    closed: AtomicBool,
}

impl Shipper {
    /// Create the buffer directory, open the first buffer and start the
    /// rotation timer
    pub fn start<U>(config: &WolfShipConfig, uploader: U) -> Result<Self>
    where
        U: Uploader + 'static,
    {
        config.validate()?;

        let buffer_dir = config.buffer_dir();
        if !buffer_dir.is_dir() {
            tracing::debug!("Creating buffer directory {}", buffer_dir.display());
            fs::create_dir_all(&buffer_dir)?;
        }

        let paths = PathFactory::builder()
            .directory(&buffer_dir)
            .prefix(config.buffer.prefix.as_str())
            .include_host(config.buffer.include_hostname)
            .date_pattern(config.buffer.date_pattern.as_str())
            .include_part(config.include_part())
            .include_uuid(config.buffer.include_uuid)
            .is_gzipped(config.buffer.gzip)
            .build()?;

        let rotater = Arc::new(LogRotate::new(
            Arc::new(paths),
            config.max_file_size_bytes(),
            config.log_file_options(),
            config.flush_interval(),
        )?);

        let workers = Arc::new(WorkerPool::new(
            config.upload_workers(),
            config.upload.upload_synchronous,
        )?);

        let uploader: Arc<dyn Uploader> = Arc::new(RetryingUploader::new(
            uploader,
            config.upload.max_retries,
            config.retry_delay(),
        ));
        let content_encoding = config.content_encoding();
        let content_type = config.content_type();

        let pool = Arc::clone(&workers);
        rotater.on_rotate(move |retired| {
            let target = UploadTarget::for_file(retired, content_encoding, content_type);
            let local = retired.to_path_buf();
            let uploader = Arc::clone(&uploader);
            if let Err(e) = pool.post(move || upload_and_delete(uploader.as_ref(), &local, &target)) {
                tracing::error!("Failed to queue upload of {}: {}", retired.display(), e);
            }
        })?;

        let ticker = Arc::clone(&rotater);
        let timer = Schedule::every(config.uploader_interval(), move || {
            if let Err(e) = ticker.write(None) {
                tracing::error!("Periodic rotation check failed: {}", e);
            }
        })?;

        tracing::info!(
            "Shipper started: buffer={} workers={} synchronous={}",
            buffer_dir.display(),
            config.upload_workers(),
            workers.is_synchronous()
        );

        Ok(Self {
            rotater,
            workers,
            timer: Mutex::new(Some(timer)),
            format: config.buffer.output_format,
            buffer_dir,
            closed: AtomicBool::new(false),
        })
    }

    /// Encode an event and append it to the current buffer
    pub fn receive(&self, event: &Event) -> Result<()> {
        let line = event.encode(self.format)?;
        self.write_line(&line)
    }

    /// Append a pre-formatted line to the current buffer
    pub fn write_line(&self, line: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        self.rotater.write(Some(line))
    }

    /// Stop the timer, retire the current buffer and wait for uploads
    ///
    /// Calling this more than once is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let timer = self
            .timer
            .lock()
            .map_err(|_| Error::LockPoisoned("shipper timer"))?
            .take();
        if let Some(mut timer) = timer {
            timer.kill();
        }

        let rotated = self.rotater.rotate_log();
        let stopped = self.workers.stop();
        rotated?;
        stopped?;

        // rotate_log always opens a successor; drop it if nothing landed there
        let leftover = self.rotater.current_path()?;
        match fs::metadata(&leftover) {
            Ok(meta) if meta.len() == 0 => fs::remove_file(&leftover)?,
            Ok(_) => tracing::warn!(
                "Records written during shutdown remain in {}",
                leftover.display()
            ),
            Err(e) => tracing::debug!("No leftover buffer at {}: {}", leftover.display(), e),
        }

        tracing::info!(
            "Shipper closed: {} uploads completed, {} panicked",
            self.workers.stats().completed(),
            self.workers.stats().panicked()
        );
        Ok(())
    }

    /// Directory holding buffer files
    pub fn buffer_dir(&self) -> &Path {
        &self.buffer_dir
    }

    /// Path of the buffer currently receiving records
    pub fn current_path(&self) -> Result<PathBuf> {
        self.rotater.current_path()
    }

    /// Upload job counters
    pub fn stats(&self) -> &PoolStats {
        self.workers.stats()
    }
}

impl Drop for Shipper {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to close shipper: {}", e);
        }
    }
}

/// Upload a retired buffer and delete it locally
///
/// Empty buffers are deleted without uploading. A failed upload keeps the
/// local file so no data is lost.
fn upload_and_delete(uploader: &dyn Uploader, path: &Path, target: &UploadTarget) {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            tracing::error!("Cannot stat retired buffer {}: {}", path.display(), e);
            return;
        }
    };

    if size > 0 {
        if let Err(e) = uploader.upload(path, target) {
            tracing::error!(
                "Upload of {} failed, keeping local file: {}",
                path.display(),
                e
            );
            return;
        }
    } else {
        tracing::debug!("Buffer {} is empty, skipping upload", path.display());
    }

    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("Deleted local buffer {}", path.display()),
        Err(e) => tracing::error!("Failed to delete {}: {}", path.display(), e),
    }
}
