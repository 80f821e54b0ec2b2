//! Upload Boundary
//!
//! Retired buffers leave the process through an [`Uploader`]. The transfer
//! itself, credentials and the remote store are the uploader's business;
//! this crate only asks it to store one local file under one object name.

mod local;

pub use local::{LocalDirUploader, ObjectMetadata};

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::error::Result;

/// Where and how an uploaded file is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// Remote object name
    pub object_name: String,
    /// Content-Encoding of the stored object (`gzip` or `identity`)
    pub content_encoding: String,
    /// Content-Type of the stored object
    pub content_type: String,
}

impl UploadTarget {
    /// Target named after the local file's base name
    pub fn for_file(path: &Path, content_encoding: &str, content_type: &str) -> Self {
        let object_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            object_name,
            content_encoding: content_encoding.to_string(),
            content_type: content_type.to_string(),
        }
    }
}

/// Stores local files in a remote location
///
/// Implementations must be safe to call from any worker thread.
pub trait Uploader: Send + Sync {
    fn upload(&self, local_path: &Path, target: &UploadTarget) -> Result<()>;
}

/// Retries retryable upload failures a bounded number of times
pub struct RetryingUploader<U> {
    inner: U,
    max_retries: u32,
    retry_delay: Duration,
}

impl<U: Uploader> RetryingUploader<U> {
    pub fn new(inner: U, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            retry_delay,
        }
    }

    pub fn inner(&self) -> &U {
        &self.inner
    }
}

impl<U: Uploader> Uploader for RetryingUploader<U> {
    fn upload(&self, local_path: &Path, target: &UploadTarget) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.inner.upload(local_path, target) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Upload of {} failed (attempt {}/{}), retrying: {}",
                        local_path.display(),
                        attempt,
                        self.max_retries + 1,
                        e
                    );
                    thread::sleep(self.retry_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
