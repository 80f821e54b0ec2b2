//! Buffer Rotation
//!
//! [`LogRotate`] owns the buffer currently receiving records and decides
//! when to cut over to a new one. Rotation always happens in this order,
//! under a single lock:
//!
//! 1. close the current buffer
//! 2. hand its path to the rotation callback (if any)
//! 3. advance the path provider
//! 4. open the next buffer
//!
//! No write can observe a half-rotated state, and once construction
//! succeeds exactly one buffer is open at any time.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::logfile::{open_log_file, LogFile, LogFileOptions};
use crate::path::PathProvider;

/// Handler called with the path of every retired buffer
pub type RotateCallback = Box<dyn Fn(&Path) + Send + Sync>;

/// State guarded by the rotation lock
struct RotateState {
    file: Box<dyn LogFile>,
    callback: Option<RotateCallback>,
}

/// Rotating buffer writer
pub struct LogRotate {
    paths: Arc<dyn PathProvider>,
    /// Size threshold in bytes (0 = no size rotation)
    max_file_size_bytes: u64,
    options: LogFileOptions,
    flush_interval: Duration,
    state: Mutex<RotateState>,
}

impl LogRotate {
    /// Create a rotating writer and open its first buffer
    ///
    /// The path provider is advanced once to name the first buffer.
    pub fn new(
        paths: Arc<dyn PathProvider>,
        max_file_size_bytes: u64,
        options: LogFileOptions,
        flush_interval: Duration,
    ) -> Result<Self> {
        let path = paths.rotate_path();
        let file = open_log_file(&path, options)?;
        tracing::debug!("Opened buffer {}", path.display());

        Ok(Self {
            paths,
            max_file_size_bytes,
            options,
            flush_interval,
            state: Mutex::new(RotateState {
                file,
                callback: None,
            }),
        })
    }

    /// Write a message and a line terminator, rotating and syncing as needed
    ///
    /// `None` writes nothing but still runs the rotation and flush checks,
    /// which is how a timer forces periodic rotation.
    pub fn write(&self, message: Option<&str>) -> Result<()> {
        let mut state = self.lock()?;

        if self.should_rotate(&state)? {
            self.rotate_locked(&mut state)?;
        }

        if let Some(message) = message {
            state.file.write(&[message.as_bytes(), b"\n"])?;
        }

        if state.file.time_since_sync() >= self.flush_interval {
            state.file.fsync()?;
        }

        Ok(())
    }

    /// Close the current buffer, notify the callback and open the next one
    ///
    /// Runs regardless of size or time thresholds; used at shutdown so the
    /// final partial buffer is still handed off.
    pub fn rotate_log(&self) -> Result<()> {
        let mut state = self.lock()?;
        self.rotate_locked(&mut state)
    }

    /// Set the handler called with each retired buffer's path
    ///
    /// Replaces any previously registered handler. The handler runs while
    /// the rotation lock is held, so it must not call back into this
    /// `LogRotate` (that deadlocks); hand the path to another thread instead.
    pub fn on_rotate<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.lock()?.callback = Some(Box::new(callback));
        Ok(())
    }

    /// Path of the buffer currently receiving writes
    pub fn current_path(&self) -> Result<PathBuf> {
        Ok(self.lock()?.file.path().to_path_buf())
    }

    fn lock(&self) -> Result<MutexGuard<'_, RotateState>> {
        self.state
            .lock()
            .map_err(|_| Error::LockPoisoned("log rotation"))
    }

    fn should_rotate(&self, state: &RotateState) -> Result<bool> {
        if self.paths.should_rotate() {
            return Ok(true);
        }
        if self.max_file_size_bytes == 0 {
            return Ok(false);
        }
        Ok(state.file.size()? >= self.max_file_size_bytes)
    }

    fn rotate_locked(&self, state: &mut RotateState) -> Result<()> {
        state.file.close()?;

        let retired = state.file.path().to_path_buf();
        tracing::debug!("Rotated out buffer {}", retired.display());
        if let Some(callback) = &state.callback {
            callback(&retired);
        }

        let path = self.paths.rotate_path();
        state.file = open_log_file(&path, self.options)?;
        tracing::debug!("Opened buffer {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathFactory;
    use flate2::read::GzDecoder;
    use std::fs;
    use std::io::Read;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use tempfile::{tempdir, TempDir};

    /// Path provider that counts rotations and can force a date change
    struct CountingPaths {
        inner: PathFactory,
        rotations: AtomicUsize,
        force_rotate: AtomicBool,
    }

    impl PathProvider for CountingPaths {
        fn current_path(&self) -> PathBuf {
            self.inner.current_path()
        }

        fn should_rotate(&self) -> bool {
            self.force_rotate.load(Ordering::SeqCst) || self.inner.should_rotate()
        }

        fn rotate_path(&self) -> PathBuf {
            self.rotations.fetch_add(1, Ordering::SeqCst);
            self.inner.rotate_path()
        }
    }

    fn counting_paths(dir: &TempDir, gzip: bool) -> Arc<CountingPaths> {
        let inner = PathFactory::new(dir.path(), "prefix", true, "", true, true, gzip).unwrap();
        Arc::new(CountingPaths {
            inner,
            rotations: AtomicUsize::new(0),
            force_rotate: AtomicBool::new(false),
        })
    }

    fn plain_options() -> LogFileOptions {
        LogFileOptions {
            synchronize: true,
            ..Default::default()
        }
    }

    fn new_rotate(paths: &Arc<CountingPaths>, max_size: u64) -> LogRotate {
        LogRotate::new(
            Arc::clone(paths) as Arc<dyn PathProvider>,
            max_size,
            plain_options(),
            Duration::from_secs(30),
        )
        .unwrap()
    }

    fn recording_callback(rotate: &LogRotate) -> Arc<Mutex<Vec<PathBuf>>> {
        let retired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&retired);
        rotate
            .on_rotate(move |path| sink.lock().unwrap().push(path.to_path_buf()))
            .unwrap();
        retired
    }

    #[test]
    fn test_opens_first_file() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = new_rotate(&paths, 10);

        assert_eq!(paths.rotations.load(Ordering::SeqCst), 1);
        assert!(rotate.current_path().unwrap().exists());
        assert_eq!(rotate.current_path().unwrap(), paths.current_path());
    }

    #[test]
    fn test_does_not_rotate_if_small_and_same_path() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = new_rotate(&paths, 10);
        let retired = recording_callback(&rotate);

        rotate.write(Some("foo")).unwrap();

        assert_eq!(paths.rotations.load(Ordering::SeqCst), 1);
        assert!(retired.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rotates_if_size_too_big() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = new_rotate(&paths, 10);
        let retired = recording_callback(&rotate);
        let first = rotate.current_path().unwrap();

        let long = "this line is longer than ten characters".repeat(1000);
        rotate.write(Some(&long)).unwrap();
        rotate.write(Some("flush")).unwrap();

        assert_eq!(paths.rotations.load(Ordering::SeqCst), 2);
        assert_eq!(*retired.lock().unwrap(), vec![first.clone()]);

        // The message that tripped the threshold lands in the new buffer
        assert_eq!(fs::read_to_string(&first).unwrap(), format!("{}\n", long));
        let second = rotate.current_path().unwrap();
        assert_eq!(fs::read_to_string(second).unwrap(), "flush\n");
    }

    #[test]
    fn test_size_rotation_disabled_at_zero() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = new_rotate(&paths, 0);

        for _ in 0..10 {
            rotate.write(Some(&"x".repeat(100))).unwrap();
        }
        assert_eq!(paths.rotations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rotates_if_path_changed() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = new_rotate(&paths, 10);
        paths.force_rotate.store(true, Ordering::SeqCst);

        rotate.write(Some("foo")).unwrap();

        assert_eq!(paths.rotations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_writes_the_message() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = new_rotate(&paths, 0);

        rotate.write(Some("foo")).unwrap();
        rotate.write(Some("bar")).unwrap();

        let contents = fs::read_to_string(rotate.current_path().unwrap()).unwrap();
        assert_eq!(contents, "foo\nbar\n");
    }

    #[test]
    fn test_does_not_write_without_message() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = new_rotate(&paths, 0);

        rotate.write(None).unwrap();

        assert_eq!(fs::metadata(rotate.current_path().unwrap()).unwrap().len(), 0);
        assert_eq!(paths.rotations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_without_message_still_rotates() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = new_rotate(&paths, 0);
        let retired = recording_callback(&rotate);
        paths.force_rotate.store(true, Ordering::SeqCst);

        rotate.write(None).unwrap();

        assert_eq!(retired.lock().unwrap().len(), 1);
    }

    fn gzip_rotate(paths: &Arc<CountingPaths>, flush_interval: Duration) -> LogRotate {
        let options = LogFileOptions {
            gzip: true,
            synchronize: true,
            ..Default::default()
        };
        LogRotate::new(Arc::clone(paths) as Arc<dyn PathProvider>, 0, options, flush_interval)
            .unwrap()
    }

    #[test]
    fn test_does_not_fsync_before_interval() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, true);
        let rotate = gzip_rotate(&paths, Duration::from_secs(3600));

        rotate.write(Some("foo")).unwrap();

        // Only the gzip header has reached the disk
        assert_eq!(fs::metadata(rotate.current_path().unwrap()).unwrap().len(), 10);
    }

    #[test]
    fn test_fsyncs_after_interval() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, true);
        let rotate = gzip_rotate(&paths, Duration::ZERO);

        rotate.write(Some("foo")).unwrap();

        assert!(fs::metadata(rotate.current_path().unwrap()).unwrap().len() > 10);
    }

    #[test]
    fn test_rotate_log_closes_old_file() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, true);
        let rotate = gzip_rotate(&paths, Duration::from_secs(3600));
        let retired = recording_callback(&rotate);
        let first = rotate.current_path().unwrap();

        rotate.write(Some("foo")).unwrap();
        rotate.rotate_log().unwrap();

        // A complete trailer means the old buffer was fully closed
        let mut decoded = String::new();
        GzDecoder::new(fs::File::open(&first).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "foo\n");
        assert_eq!(*retired.lock().unwrap(), vec![first]);
    }

    #[test]
    fn test_rotate_log_opens_new_file() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = new_rotate(&paths, 0);
        let first = rotate.current_path().unwrap();

        rotate.rotate_log().unwrap();
        rotate.write(Some("foo")).unwrap();

        let second = rotate.current_path().unwrap();
        assert_ne!(first, second);
        assert_eq!(second, paths.current_path());
        assert_eq!(fs::read_to_string(second).unwrap(), "foo\n");
        assert_eq!(fs::read_to_string(first).unwrap(), "");
    }

    #[test]
    fn test_on_rotate_replaces_callback() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = new_rotate(&paths, 0);

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&first);
        rotate
            .on_rotate(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let counter = Arc::clone(&second);
        rotate
            .on_rotate(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        rotate.rotate_log().unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_hand_off_sees_successor() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = Arc::new(new_rotate(&paths, 0));
        let first = rotate.current_path().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let handle = Arc::clone(&rotate);
        rotate
            .on_rotate(move |retired| {
                let retired = retired.to_path_buf();
                let rotate = Arc::clone(&handle);
                let tx = tx.clone();
                // Blocks until the rotation that fired us has finished
                thread::spawn(move || {
                    tx.send((retired, rotate.current_path().unwrap())).unwrap();
                });
            })
            .unwrap();

        rotate.rotate_log().unwrap();

        let (retired, current) = rx.recv().unwrap();
        assert_eq!(retired, first);
        assert_ne!(current, first);
        assert_eq!(current, rotate.current_path().unwrap());
    }

    #[test]
    fn test_concurrent_writes_and_rotations() {
        let dir = tempdir().unwrap();
        let paths = counting_paths(&dir, false);
        let rotate = Arc::new(new_rotate(&paths, 256));
        let retired = recording_callback(&rotate);

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let rotate = Arc::clone(&rotate);
                thread::spawn(move || {
                    for i in 0..200 {
                        rotate.write(Some(&format!("writer-{}-{}", t, i))).unwrap();
                    }
                })
            })
            .collect();
        let timer = {
            let rotate = Arc::clone(&rotate);
            thread::spawn(move || {
                for _ in 0..20 {
                    rotate.write(None).unwrap();
                    rotate.rotate_log().unwrap();
                }
            })
        };
        for handle in writers {
            handle.join().unwrap();
        }
        timer.join().unwrap();
        rotate.rotate_log().unwrap();

        let retired = retired.lock().unwrap().clone();
        let mut unique = retired.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), retired.len(), "a buffer was retired twice");
        assert_eq!(retired.len() + 1, paths.rotations.load(Ordering::SeqCst));

        let lines: usize = retired
            .iter()
            .map(|path| fs::read_to_string(path).unwrap().lines().count())
            .sum();
        assert_eq!(lines, 800);
    }
}
