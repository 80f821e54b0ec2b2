//! Buffer Path Naming
//!
//! Derives buffer file names from a small template of time and identity
//! fields and decides when the rotation identity (the "base") has changed.
//!
//! File names follow two patterns built from the naming flags:
//!
//! - base: `prefix[_host]_date`
//! - full: `base[.partNNN][.uuid].log[.gz]`
//!
//! The base alone decides whether a date bucket rolled over; the full name
//! is what lands on disk.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

use crate::error::{Error, Result};

/// Snapshot of every template variable at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub prefix: String,
    pub host: String,
    pub date: String,
    pub part: u32,
    pub uuid: String,
}

impl TemplateVars {
    /// Zero-padded part number as it appears in file names
    pub fn partf(&self) -> String {
        format!("{:03}", self.part)
    }
}

/// Source of the non-deterministic template inputs
///
/// Production code uses [`SystemSource`]; tests substitute fixed clocks
/// and identifiers.
pub trait TemplateSource: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Local>;

    /// Local host name
    fn hostname(&self) -> String;

    /// Fresh random token
    fn uuid(&self) -> String;
}

/// Template source backed by the system clock, host name and UUIDv4
#[derive(Debug, Clone)]
pub struct SystemSource {
    hostname: String,
}

impl SystemSource {
    pub fn new() -> Self {
        let hostname = match hostname::get() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                tracing::warn!("Failed to resolve host name, using localhost: {}", e);
                "localhost".to_string()
            }
        };
        Self { hostname }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateSource for SystemSource {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn uuid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Path operations the rotating writer depends on
pub trait PathProvider: Send + Sync {
    /// Full path of the current buffer
    fn current_path(&self) -> PathBuf;

    /// True if the date bucket changed since the last rotation
    fn should_rotate(&self) -> bool;

    /// Advance to the next path and return it
    fn rotate_path(&self) -> PathBuf;
}

/// Check that a strftime pattern only contains items chrono understands
pub fn validate_date_pattern(pattern: &str) -> Result<()> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(Error::InvalidDatePattern(pattern.to_string()));
    }
    Ok(())
}

/// Which optional fields make up a file name
#[derive(Debug, Clone, Copy)]
struct NamePattern {
    include_host: bool,
    include_part: bool,
    include_uuid: bool,
    is_gzipped: bool,
}

impl NamePattern {
    fn base(&self, vars: &TemplateVars) -> String {
        let mut name = vars.prefix.clone();
        if self.include_host {
            name.push('_');
            name.push_str(&vars.host);
        }
        name.push('_');
        name.push_str(&vars.date);
        name
    }

    fn full(&self, vars: &TemplateVars) -> String {
        let mut name = self.base(vars);
        if self.include_part {
            name.push_str(".part");
            name.push_str(&vars.partf());
        }
        if self.include_uuid {
            name.push('.');
            name.push_str(&vars.uuid);
        }
        name.push_str(".log");
        if self.is_gzipped {
            name.push_str(".gz");
        }
        name
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{prefix}")?;
        if self.include_host {
            f.write_str("_{host}")?;
        }
        f.write_str("_{date}")?;
        if self.include_part {
            f.write_str(".part{part}")?;
        }
        if self.include_uuid {
            f.write_str(".{uuid}")?;
        }
        f.write_str(".log")?;
        if self.is_gzipped {
            f.write_str(".gz")?;
        }
        Ok(())
    }
}

/// Current snapshot and the part counter it was built with
struct PathState {
    part: u32,
    current: TemplateVars,
}

/// Creates paths for rotating buffer files
pub struct PathFactory {
    directory: PathBuf,
    prefix: String,
    date_pattern: String,
    pattern: NamePattern,
    source: Arc<dyn TemplateSource>,
    state: RwLock<PathState>,
}

impl PathFactory {
    /// Create a path factory using the system clock and host name
    pub fn new(
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
        include_host: bool,
        date_pattern: impl Into<String>,
        include_part: bool,
        include_uuid: bool,
        is_gzipped: bool,
    ) -> Result<Self> {
        PathFactoryBuilder::new()
            .directory(directory)
            .prefix(prefix)
            .include_host(include_host)
            .date_pattern(date_pattern)
            .include_part(include_part)
            .include_uuid(include_uuid)
            .is_gzipped(is_gzipped)
            .build()
    }

    /// Start building a path factory
    pub fn builder() -> PathFactoryBuilder {
        PathFactoryBuilder::new()
    }

    /// Directory every path is joined to
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Current part counter
    pub fn part(&self) -> u32 {
        self.read_state().part
    }

    /// Render a path for an explicit snapshot instead of the current one
    pub fn current_path_with(&self, vars: &TemplateVars) -> PathBuf {
        self.directory.join(self.pattern.full(vars))
    }

    fn snapshot(&self, part: u32) -> TemplateVars {
        TemplateVars {
            prefix: self.prefix.clone(),
            host: self.source.hostname(),
            date: self.source.now().format(&self.date_pattern).to_string(),
            part,
            uuid: self.source.uuid(),
        }
    }

    // The state is only ever replaced wholesale, so a guard recovered from a
    // poisoned lock still holds a consistent snapshot.
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, PathState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, PathState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PathProvider for PathFactory {
    fn current_path(&self) -> PathBuf {
        self.current_path_with(&self.read_state().current)
    }

    fn should_rotate(&self) -> bool {
        let state = self.read_state();
        let next = self.snapshot(state.part);
        self.pattern.base(&next) != self.pattern.base(&state.current)
    }

    fn rotate_path(&self) -> PathBuf {
        let mut state = self.write_state();
        let next = self.snapshot(state.part);
        let part = if self.pattern.base(&next) == self.pattern.base(&state.current) {
            state.part.saturating_add(1)
        } else {
            0
        };
        state.part = part;
        state.current = TemplateVars { part, ..next };
        self.current_path_with(&state.current)
    }
}

/// Search the directory for files sharing `base` and return the next free
/// part number so files from a previous run are never clobbered.
fn starting_part(directory: &Path, base: &str) -> Result<u32> {
    if !directory.is_dir() {
        return Ok(0);
    }

    let marker = format!("{}.part", base);
    let mut highest: Option<u32> = None;

    for entry in fs::read_dir(directory)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        let Some(rest) = name.strip_prefix(&marker) else {
            continue;
        };
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(part) = digits.parse::<u32>() {
            highest = highest.max(Some(part));
        }
    }

    match highest {
        None => Ok(0),
        Some(part) => part.checked_add(1).ok_or_else(|| {
            Error::Config(format!(
                "part counter exhausted for {} in {}",
                base,
                directory.display()
            ))
        }),
    }
}

/// Builder for [`PathFactory`]
pub struct PathFactoryBuilder {
    directory: PathBuf,
    prefix: String,
    include_host: bool,
    date_pattern: String,
    include_part: bool,
    include_uuid: bool,
    is_gzipped: bool,
    source: Option<Arc<dyn TemplateSource>>,
}

impl PathFactoryBuilder {
    pub fn new() -> Self {
        Self {
            directory: PathBuf::new(),
            prefix: String::new(),
            include_host: false,
            date_pattern: String::new(),
            include_part: false,
            include_uuid: false,
            is_gzipped: false,
            source: None,
        }
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn include_host(mut self, include_host: bool) -> Self {
        self.include_host = include_host;
        self
    }

    pub fn date_pattern(mut self, date_pattern: impl Into<String>) -> Self {
        self.date_pattern = date_pattern.into();
        self
    }

    pub fn include_part(mut self, include_part: bool) -> Self {
        self.include_part = include_part;
        self
    }

    pub fn include_uuid(mut self, include_uuid: bool) -> Self {
        self.include_uuid = include_uuid;
        self
    }

    pub fn is_gzipped(mut self, is_gzipped: bool) -> Self {
        self.is_gzipped = is_gzipped;
        self
    }

    /// Override the clock, host name and uuid source
    pub fn source(mut self, source: Arc<dyn TemplateSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Build the factory, recovering the part counter from `directory`
    pub fn build(self) -> Result<PathFactory> {
        validate_date_pattern(&self.date_pattern)?;

        let pattern = NamePattern {
            include_host: self.include_host,
            include_part: self.include_part,
            include_uuid: self.include_uuid,
            is_gzipped: self.is_gzipped,
        };
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(SystemSource::new()));

        let mut factory = PathFactory {
            directory: self.directory,
            prefix: self.prefix,
            date_pattern: self.date_pattern,
            pattern,
            source,
            state: RwLock::new(PathState {
                part: 0,
                current: TemplateVars {
                    prefix: String::new(),
                    host: String::new(),
                    date: String::new(),
                    part: 0,
                    uuid: String::new(),
                },
            }),
        };

        let probe = factory.snapshot(0);
        let part = starting_part(&factory.directory, &pattern.base(&probe))?;
        let current = factory.snapshot(part);
        *factory.state.get_mut().unwrap_or_else(PoisonError::into_inner) =
            PathState { part, current };

        tracing::debug!(
            "Path factory ready: pattern={} directory={} starting part={}",
            pattern,
            factory.directory.display(),
            part
        );

        Ok(factory)
    }
}

impl Default for PathFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Clock that advances one second on every read
    struct TickingSource {
        now: Mutex<DateTime<Local>>,
    }

    impl TickingSource {
        fn new() -> Arc<Self> {
            let start = Local.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
            Arc::new(Self {
                now: Mutex::new(start),
            })
        }
    }

    impl TemplateSource for TickingSource {
        fn now(&self) -> DateTime<Local> {
            let mut now = self.now.lock().unwrap();
            *now += Duration::seconds(1);
            *now
        }

        fn hostname(&self) -> String {
            "hostname".to_string()
        }

        fn uuid(&self) -> String {
            "00000000-0000-0000-0000-000000000000".to_string()
        }
    }

    fn fixed_vars() -> TemplateVars {
        TemplateVars {
            prefix: "prefix".to_string(),
            host: "hostname".to_string(),
            date: "2018-01-01".to_string(),
            part: 333,
            uuid: "00000000-0000-0000-0000-000000000000".to_string(),
        }
    }

    #[test]
    fn test_includes_optional_fields() {
        let pf = PathFactory::new("path/to/directory", "prefix", true, "", true, true, true).unwrap();

        let expected = Path::new("path/to/directory").join(
            "prefix_hostname_2018-01-01.part333.00000000-0000-0000-0000-000000000000.log.gz",
        );
        assert_eq!(pf.current_path_with(&fixed_vars()), expected);
    }

    #[test]
    fn test_excludes_optional_fields() {
        let pf = PathFactory::new("path/to/directory", "prefix", false, "", false, false, false)
            .unwrap();

        let expected = Path::new("path/to/directory").join("prefix_2018-01-01.log");
        assert_eq!(pf.current_path_with(&fixed_vars()), expected);
    }

    #[test]
    fn test_loads_path_immediately() {
        let bare = PathFactory::new("", "", false, "", false, false, false).unwrap();
        assert_eq!(bare.current_path(), PathBuf::from("_.log"));

        let full = PathFactory::new("", "", true, "%Y", true, true, true).unwrap();
        let name = full.current_path().to_string_lossy().into_owned();
        assert!(name.ends_with(".log.gz"));
        assert!(name.contains(".part000."));
    }

    #[test]
    fn test_recovers_starting_part() {
        let dir = tempdir().unwrap();
        for name in ["pre_date.part009.log.gz", "pre_date.part091.log.gz", "pre_date.part000.log.gz"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        // Different base, must not count
        fs::write(dir.path().join("other_date.part500.log.gz"), b"").unwrap();

        let pf = PathFactory::new(dir.path(), "pre", false, "date", true, false, false).unwrap();

        assert_eq!(pf.part(), 92);
        assert!(pf.current_path().to_string_lossy().contains("part092"));
    }

    #[test]
    fn test_exhausted_part_counter_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("pre_date.part4294967295.log"), b"").unwrap();

        let result = PathFactory::new(dir.path(), "pre", false, "date", true, false, false);
        assert!(matches!(result, Err(Error::Config(_))));

        // The file from the previous run is left alone
        assert!(dir.path().join("pre_date.part4294967295.log").exists());
    }

    #[test]
    fn test_missing_directory_starts_at_zero() {
        let dir = tempdir().unwrap();
        let pf = PathFactory::new(dir.path().join("absent"), "pre", false, "date", true, false, false)
            .unwrap();
        assert_eq!(pf.part(), 0);
    }

    #[test]
    fn test_rotate_increments_part() {
        let pf = PathFactory::new("dir", "pre", false, "date", true, false, false).unwrap();
        assert_eq!(pf.current_path(), Path::new("dir").join("pre_date.part000.log"));

        let after = pf.rotate_path();
        assert_eq!(after, Path::new("dir").join("pre_date.part001.log"));
        assert_eq!(pf.current_path(), after);

        for expected in 2..10 {
            pf.rotate_path();
            assert_eq!(pf.part(), expected);
        }
    }

    #[test]
    fn test_rotate_resets_part_when_base_changes() {
        let pf = PathFactory::builder()
            .directory("dir")
            .prefix("pre")
            .date_pattern("%H%M%S")
            .include_part(true)
            .source(TickingSource::new())
            .build()
            .unwrap();
        assert!(pf.current_path().to_string_lossy().contains("part000"));

        pf.rotate_path();
        assert!(pf.current_path().to_string_lossy().contains("part000"));
        assert_eq!(pf.part(), 0);
    }

    #[test]
    fn test_should_rotate() {
        let same = PathFactory::new("", "", false, "", false, false, false).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(!same.should_rotate());

        let ticking = PathFactory::builder()
            .date_pattern("%S")
            .source(TickingSource::new())
            .build()
            .unwrap();
        assert!(ticking.should_rotate());
    }

    #[test]
    fn test_joins_directory_and_filename() {
        let pf = PathFactory::new("dir", "pre", false, "date", false, false, false).unwrap();
        assert_eq!(pf.current_path(), Path::new("dir").join("pre_date.log"));
    }

    #[test]
    fn test_injected_source_fills_host_and_uuid() {
        let pf = PathFactory::builder()
            .directory("dir")
            .prefix("pre")
            .include_host(true)
            .include_uuid(true)
            .date_pattern("%Y-%m-%d")
            .source(TickingSource::new())
            .build()
            .unwrap();
        assert_eq!(
            pf.current_path(),
            Path::new("dir").join("pre_hostname_2018-01-01.00000000-0000-0000-0000-000000000000.log")
        );
    }

    #[test]
    fn test_rejects_invalid_date_pattern() {
        let result = PathFactory::new("dir", "pre", false, "%Q", false, false, false);
        assert!(matches!(result, Err(Error::InvalidDatePattern(_))));
    }

    #[test]
    fn test_concurrent_rotation_is_serialized() {
        let pf = Arc::new(PathFactory::new("dir", "pre", false, "date", true, false, false).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pf = Arc::clone(&pf);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        pf.rotate_path();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pf.part(), 200);
        assert_eq!(pf.current_path(), Path::new("dir").join("pre_date.part200.log"));
    }

    #[test]
    fn test_pattern_display() {
        let pattern = NamePattern {
            include_host: true,
            include_part: true,
            include_uuid: false,
            is_gzipped: true,
        };
        assert_eq!(pattern.to_string(), "{prefix}_{host}_{date}.part{part}.log.gz");
    }
}
