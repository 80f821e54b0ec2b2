//! Periodic background task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::Result;

/// Runs a task on a dedicated thread every `period` until killed
pub struct Schedule {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Schedule {
    /// Start calling `task` every `period`, first call after one period
    pub fn every<F>(period: Duration, task: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("rotation-timer".to_string())
            .spawn(move || run(period, flag, task))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop the timer and wait for an in-progress task to finish
    pub fn kill(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::error!("Scheduled task panicked");
            }
        }
    }
}

impl Drop for Schedule {
    fn drop(&mut self) {
        self.kill();
    }
}

fn run<F: FnMut()>(period: Duration, stop: Arc<AtomicBool>, mut task: F) {
    loop {
        let deadline = Instant::now() + period;
        // park_timeout may wake early, so wait out the full period
        loop {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
        task();
    }
}
