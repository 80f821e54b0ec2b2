//! WolfShip - Rotating Local Log Buffer with Background Upload
//!
//! Records are appended to a local buffer file whose name is derived from a
//! prefix, the host name, a date bucket, a part counter and an optional
//! uuid. When the date bucket changes or the buffer grows past a size limit
//! the buffer is closed and handed to a pool of upload workers, which store
//! it in object storage and delete the local copy.
//!
//! # Architecture
//!
//! - [`path::PathFactory`] names buffers and decides when the date bucket changed
//! - [`logfile`] stacks plain, gzip and locking layers over a file
//! - [`rotate::LogRotate`] owns the current buffer and retires it
//! - [`pool::WorkerPool`] runs upload jobs with caller-runs back-pressure
//! - [`shipper::Shipper`] wires them to an [`upload::Uploader`]
//!
//! # Features
//!
//! - Part counter recovered from files already in the buffer directory
//! - Optional gzip content and a second gzip layer for transfer encoding
//! - Periodic forced rotation so idle buffers still ship
//! - Bounded retries for failed uploads, local copy kept on failure

pub mod config;
pub mod error;
pub mod event;
pub mod logfile;
pub mod path;
pub mod pool;
pub mod rotate;
pub mod schedule;
pub mod shipper;
pub mod tuning;
pub mod upload;

pub use config::WolfShipConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfShipConfig;
    pub use crate::error::{Error, Result};
    pub use crate::event::{Event, OutputFormat};
    pub use crate::logfile::{open_log_file, LogFile, LogFileOptions};
    pub use crate::path::{PathFactory, PathProvider};
    pub use crate::pool::WorkerPool;
    pub use crate::rotate::LogRotate;
    pub use crate::shipper::Shipper;
    pub use crate::upload::{LocalDirUploader, UploadTarget, Uploader};
}
