//! Auto-tuning module
//!
//! Detects hardware capabilities and derives the default upload
//! concurrency. Uploads are I/O bound, so half the cores is plenty and the
//! rest stay free for whatever produces the records.

use sysinfo::System;

/// Upper bound on auto-tuned upload workers
const MAX_UPLOAD_WORKERS: usize = 8;

/// Tuned configuration values based on hardware detection
#[derive(Debug, Clone)]
pub struct TunedConfig {
    /// Number of upload worker threads
    pub upload_workers: usize,
    /// Detected CPU cores
    pub detected_cores: usize,
}

impl Default for TunedConfig {
    fn default() -> Self {
        Self {
            upload_workers: 2,
            detected_cores: 4,
        }
    }
}

/// Detect the number of available CPU cores
pub fn detect_cpu_cores() -> usize {
    let sys = System::new_all();
    sys.cpus().len().max(1)
}

/// Upload workers for a given core count: half the cores, 1 to 8
pub fn upload_workers_for(cores: usize) -> usize {
    (cores / 2).clamp(1, MAX_UPLOAD_WORKERS)
}

/// Auto-tune configuration based on detected hardware
pub fn auto_tune() -> TunedConfig {
    let cores = detect_cpu_cores();
    let tuned = TunedConfig {
        upload_workers: upload_workers_for(cores),
        detected_cores: cores,
    };

    tracing::debug!(
        "Auto-tuned: {} cores detected, {} upload workers",
        tuned.detected_cores,
        tuned.upload_workers
    );

    tuned
}
