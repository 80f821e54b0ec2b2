//! WolfShip Configuration
//!
//! This module provides configuration structures for buffering, rotation
//! and upload of log files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::event::OutputFormat;
use crate::logfile::LogFileOptions;
use crate::path::validate_date_pattern;
use crate::tuning;

/// Main WolfShip configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WolfShipConfig {
    /// Local buffer and rotation configuration
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local buffer and rotation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Directory holding buffer files (empty = generated temp directory)
    #[serde(default)]
    pub directory: PathBuf,

    /// File name prefix
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Include the host name in file names
    #[serde(default = "default_true")]
    pub include_hostname: bool,

    /// Include a random uuid in file names
    #[serde(default)]
    pub include_uuid: bool,

    /// strftime pattern for the date part of file names
    #[serde(default = "default_date_pattern")]
    pub date_pattern: String,

    /// Rotate when a buffer reaches this size (0 = never rotate on size)
    #[serde(default = "default_max_file_size_kbytes")]
    pub max_file_size_kbytes: u64,

    /// Sync buffers to disk at most this often
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Gzip buffer contents
    #[serde(default)]
    pub gzip: bool,

    /// Add a gzip transfer-encoding layer
    #[serde(default)]
    pub gzip_content_encoding: bool,

    /// Line format for records
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory objects are stored in
    #[serde(default = "default_destination")]
    pub destination: PathBuf,

    /// Upload worker count (0 = auto-tune)
    #[serde(default)]
    pub max_concurrent_uploads: usize,

    /// Run uploads on the writing thread
    #[serde(default)]
    pub upload_synchronous: bool,

    /// Interval of forced rotation/flush checks in seconds
    #[serde(default = "default_uploader_interval_secs")]
    pub uploader_interval_secs: u64,

    /// Retries for a failed upload
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between upload retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_prefix() -> String {
    "wolfship".to_string()
}

fn default_true() -> bool {
    true
}

fn default_date_pattern() -> String {
    "%Y-%m-%dT%H:00".to_string()
}

fn default_max_file_size_kbytes() -> u64 {
    10000
}

fn default_flush_interval_secs() -> u64 {
    2
}

fn default_destination() -> PathBuf {
    PathBuf::from("/var/lib/wolfship/bucket")
}

fn default_uploader_interval_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            prefix: default_prefix(),
            include_hostname: true,
            include_uuid: false,
            date_pattern: default_date_pattern(),
            max_file_size_kbytes: default_max_file_size_kbytes(),
            flush_interval_secs: default_flush_interval_secs(),
            gzip: false,
            gzip_content_encoding: false,
            output_format: OutputFormat::Plain,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            max_concurrent_uploads: 0,
            upload_synchronous: false,
            uploader_interval_secs: default_uploader_interval_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WolfShipConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfShipConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        validate_date_pattern(&self.buffer.date_pattern)?;

        if self.buffer.max_file_size_kbytes > u64::MAX / 1024 {
            return Err(crate::Error::Config(format!(
                "buffer.max_file_size_kbytes must be at most {}",
                u64::MAX / 1024
            )));
        }

        if self.upload.destination.as_os_str().is_empty() {
            return Err(crate::Error::Config("upload.destination cannot be empty".into()));
        }

        if self.upload.uploader_interval_secs == 0 {
            return Err(crate::Error::Config(
                "upload.uploader_interval_secs must be greater than 0".into(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "compact") {
            return Err(crate::Error::Config(format!(
                "logging.format must be pretty or compact, got {:?}",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Buffer directory, generating a unique temp directory if unset
    pub fn buffer_dir(&self) -> PathBuf {
        if self.buffer.directory.as_os_str().is_empty() {
            std::env::temp_dir().join(format!("wolfship-{}", uuid::Uuid::new_v4()))
        } else {
            self.buffer.directory.clone()
        }
    }

    /// File names carry a part counter only when size rotation is on
    pub fn include_part(&self) -> bool {
        self.buffer.max_file_size_kbytes > 0
    }

    /// Size rotation threshold in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.buffer.max_file_size_kbytes.saturating_mul(1024)
    }

    /// Get flush interval as Duration
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.buffer.flush_interval_secs)
    }

    /// Get rotation check interval as Duration
    pub fn uploader_interval(&self) -> Duration {
        Duration::from_secs(self.upload.uploader_interval_secs)
    }

    /// Get upload retry delay as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.upload.retry_delay_ms)
    }

    /// Number of upload workers, auto-tuned when unset
    pub fn upload_workers(&self) -> usize {
        if self.upload.max_concurrent_uploads > 0 {
            self.upload.max_concurrent_uploads
        } else {
            tuning::auto_tune().upload_workers
        }
    }

    /// Content-Type of uploaded objects
    pub fn content_type(&self) -> &'static str {
        if self.buffer.gzip {
            "application/gzip"
        } else {
            "text/plain"
        }
    }

    /// Content-Encoding of uploaded objects
    pub fn content_encoding(&self) -> &'static str {
        if self.buffer.gzip_content_encoding {
            "gzip"
        } else {
            "identity"
        }
    }

    /// Layers for buffer files
    pub fn log_file_options(&self) -> LogFileOptions {
        LogFileOptions {
            gzip: self.buffer.gzip,
            gzip_encoded: self.buffer.gzip_content_encoding,
            synchronize: true,
        }
    }
}

/// Commented configuration written by `wolfship init`
pub fn default_config_template(destination: &str) -> String {
    // Quoted and escaped as a TOML string
    let destination = toml::Value::String(destination.to_string());
    format!(
        r#"# WolfShip Configuration
# Generated configuration file

[buffer]
# directory = "/var/spool/wolfship"   # empty = generated temp directory
prefix = "wolfship"
include_hostname = true
include_uuid = false
date_pattern = "%Y-%m-%dT%H:00"
max_file_size_kbytes = 10000
flush_interval_secs = 2
gzip = false
gzip_content_encoding = false
output_format = "plain"

[upload]
destination = {destination}
max_concurrent_uploads = 0   # 0 = auto-tune from CPU count
upload_synchronous = false
uploader_interval_secs = 60
max_retries = 3
retry_delay_ms = 1000

[logging]
level = "info"
format = "pretty"
"#
    )
}
