//! Upload Worker Pool
//!
//! Bounded pool of worker threads draining a job queue that holds at most
//! one pending job per worker. When the queue is full the submitting thread
//! runs the job itself (caller-runs), so memory stays bounded and no job is
//! ever dropped. A synchronous pool runs every job inline.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{Error, Result};

/// Unit of work executed by the pool
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Counters describing where jobs ran
#[derive(Debug, Default)]
pub struct PoolStats {
    dispatched: AtomicU64,
    ran_inline: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl PoolStats {
    /// Jobs handed to the worker queue
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Jobs run on the submitting thread (synchronous mode or caller-runs)
    pub fn ran_inline(&self) -> u64 {
        self.ran_inline.load(Ordering::Relaxed)
    }

    /// Jobs that returned normally
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Jobs that panicked
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }
}

/// Pool of upload workers
pub struct WorkerPool {
    synchronous: bool,
    max_workers: usize,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// `true` once stopped. `post` holds a read guard across the check and
    /// any inline run, so `stop` cannot return while such a job is running.
    stopped: RwLock<bool>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Create a pool of `max_workers` threads, or an inline pool if
    /// `synchronous` is set
    pub fn new(max_workers: usize, synchronous: bool) -> Result<Self> {
        if max_workers == 0 {
            return Err(Error::Config("worker pool needs at least one worker".into()));
        }

        let stats = Arc::new(PoolStats::default());
        let mut pool = Self {
            synchronous,
            max_workers,
            sender: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            stopped: RwLock::new(false),
            stats,
        };

        if synchronous {
            return Ok(pool);
        }

        // One pending slot per worker
        let (sender, receiver) = mpsc::channel::<Job>(max_workers);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(max_workers);
        for id in 0..max_workers {
            let receiver = Arc::clone(&receiver);
            let stats = Arc::clone(&pool.stats);
            let handle = thread::Builder::new()
                .name(format!("upload-worker-{}", id))
                .spawn(move || worker_loop(receiver, stats))?;
            workers.push(handle);
        }

        pool.sender = Mutex::new(Some(sender));
        pool.workers = Mutex::new(workers);
        tracing::debug!("Started worker pool with {} workers", max_workers);
        Ok(pool)
    }

    /// Submit a job
    ///
    /// Synchronous pools run the job before returning. Otherwise the job is
    /// queued, or run on the calling thread if the queue is full. Fails with
    /// [`Error::PoolStopped`] after [`WorkerPool::stop`].
    pub fn post<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let stopped = self.read_gate()?;
        if *stopped {
            return Err(Error::PoolStopped);
        }

        if self.synchronous {
            self.stats.ran_inline.fetch_add(1, Ordering::Relaxed);
            run_job(Box::new(task), &self.stats);
            return Ok(());
        }

        let rejected = {
            let sender = self
                .sender
                .lock()
                .map_err(|_| Error::LockPoisoned("worker pool"))?;
            let Some(sender) = sender.as_ref() else {
                return Err(Error::PoolStopped);
            };
            match sender.try_send(Box::new(task)) {
                Ok(()) => {
                    self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
                    None
                }
                Err(TrySendError::Full(job)) => Some(job),
                Err(TrySendError::Closed(_)) => return Err(Error::PoolStopped),
            }
        };

        if let Some(job) = rejected {
            tracing::warn!(
                "Upload queue full ({} pending), running task on caller thread",
                self.max_workers
            );
            self.stats.ran_inline.fetch_add(1, Ordering::Relaxed);
            run_job(job, &self.stats);
        }

        drop(stopped);
        Ok(())
    }

    /// Stop accepting jobs and wait for queued and running jobs to finish
    ///
    /// This includes jobs running inline on other threads. Must not be
    /// called from inside a job.
    pub fn stop(&self) -> Result<()> {
        // Waits for every inline run holding a read guard
        *self
            .stopped
            .write()
            .map_err(|_| Error::LockPoisoned("worker pool"))? = true;

        // Dropping the sender lets workers drain the queue and exit
        let sender = self
            .sender
            .lock()
            .map_err(|_| Error::LockPoisoned("worker pool"))?
            .take();
        drop(sender);

        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .map_err(|_| Error::LockPoisoned("worker pool"))?,
        );
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("Upload worker thread panicked");
            }
        }

        tracing::debug!(
            "Worker pool stopped: dispatched={} inline={} completed={} panicked={}",
            self.stats.dispatched(),
            self.stats.ran_inline(),
            self.stats.completed(),
            self.stats.panicked()
        );
        Ok(())
    }

    /// Check if the pool still accepts jobs
    pub fn is_running(&self) -> bool {
        !*self.stopped.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if jobs run inline
    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    /// Job counters
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    fn read_gate(&self) -> Result<RwLockReadGuard<'_, bool>> {
        self.stopped
            .read()
            .map_err(|_| Error::LockPoisoned("worker pool"))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                tracing::error!("Failed to stop worker pool: {}", e);
            }
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<mpsc::Receiver<Job>>>, stats: Arc<PoolStats>) {
    loop {
        let job = receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blocking_recv();
        match job {
            Some(job) => run_job(job, &stats),
            None => break,
        }
    }
}

/// Run a job, keeping a panic from taking down the calling thread
fn run_job(job: Job, stats: &PoolStats) {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(()) => {
            stats.completed.fetch_add(1, Ordering::Relaxed);
        }
        Err(_) => {
            stats.panicked.fetch_add(1, Ordering::Relaxed);
            tracing::error!("Worker task panicked");
        }
    }
}
