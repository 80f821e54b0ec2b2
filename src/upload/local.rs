//! Directory-backed object store

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{UploadTarget, Uploader};
use crate::error::{Error, Result};

/// Metadata stored next to every object as `<name>.meta.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub name: String,
    pub content_encoding: String,
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Uploader that stores objects as files under a destination directory
///
/// Objects are copied under a temporary name and renamed into place, so a
/// reader never sees a partially written object.
#[derive(Debug, Clone)]
pub struct LocalDirUploader {
    destination: PathBuf,
}

impl LocalDirUploader {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Path of a stored object
    pub fn object_path(&self, name: &str) -> PathBuf {
        self.destination.join(name)
    }

    /// Read the metadata stored for an object
    pub fn metadata(&self, name: &str) -> Result<ObjectMetadata> {
        let content = fs::read_to_string(self.metadata_path(name))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.destination.join(format!("{}.meta.json", name))
    }

    fn store(&self, local_path: &Path, target: &UploadTarget) -> Result<u64> {
        fs::create_dir_all(&self.destination)?;

        let staging = self.destination.join(format!(".{}.partial", target.object_name));
        let size = fs::copy(local_path, &staging)?;
        fs::rename(&staging, self.object_path(&target.object_name))?;

        let metadata = ObjectMetadata {
            name: target.object_name.clone(),
            content_encoding: target.content_encoding.clone(),
            content_type: target.content_type.clone(),
            size,
            uploaded_at: Utc::now(),
        };
        fs::write(
            self.metadata_path(&target.object_name),
            serde_json::to_string_pretty(&metadata)?,
        )?;
        Ok(size)
    }
}

impl Uploader for LocalDirUploader {
    fn upload(&self, local_path: &Path, target: &UploadTarget) -> Result<()> {
        if target.object_name.is_empty() {
            return Err(Error::Config(format!(
                "no object name for {}",
                local_path.display()
            )));
        }

        let size = self.store(local_path, target).map_err(|e| Error::Upload {
            path: local_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        tracing::info!(
            "Uploaded {} to {} ({} bytes)",
            local_path.display(),
            self.object_path(&target.object_name).display(),
            size
        );
        Ok(())
    }
}
