//! Raw entry capture for local directory trees.
//!
//! Two traversal modes over the `ignore` crate's walker:
//!
//! - [`LocalWalk`]: lazy, depth-first, one thread, sorted by file name
//! - [`capture_directory`] with `threads != 1`: parallel walk across subtrees,
//!   each worker owning its own [`DriveTracker`]
//!
//! The walk start is captured too, with its real parent declared. Entries
//! that cannot be read are logged and counted, never fatal.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use ignore::overrides::OverrideBuilder;
use ignore::{DirEntry, WalkBuilder, WalkState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{EntryError, Result, StrataError};
use crate::types::RawEntry;
use crate::volume::{DriveTracker, VolumeResolver};

/// Options for a local capture.
#[derive(Clone, Debug, Default)]
pub struct CaptureOptions {
    /// Glob patterns whose matches (and their subtrees) are skipped.
    pub ignore_patterns: Vec<String>,
    pub follow_symlinks: bool,
    /// Walker threads. `1` walks sequentially, `0` lets the walker choose.
    pub threads: usize,
    /// Stop descending once this much time has passed.
    pub deadline: Option<Duration>,
}

/// Entries and statistics from one capture.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CaptureResult {
    pub root: PathBuf,
    pub entries: Vec<RawEntry>,
    pub dir_count: usize,
    pub file_count: usize,
    /// Entries that could not be read.
    pub error_count: usize,
    /// Why each of those entries was skipped.
    #[serde(skip)]
    pub errors: Vec<EntryError>,
    /// `false` when the deadline cut the walk short.
    pub completed: bool,
    pub duration_ms: f64,
}

impl CaptureResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn epoch_secs(time: std::io::Result<SystemTime>) -> Option<f64> {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
}

fn insert_time(map: &mut Map<String, Value>, key: &str, secs: Option<f64>) {
    if let Some(secs) = secs {
        map.insert(key.to_string(), Value::from(secs));
    }
}

/// stat-style metadata map for one entry.
#[cfg(unix)]
fn metadata_map(meta: &Metadata) -> Map<String, Value> {
    use std::os::unix::fs::MetadataExt;

    let mut map = Map::new();
    map.insert("st_mode".into(), Value::from(meta.mode()));
    map.insert("st_ino".into(), Value::from(meta.ino()));
    map.insert("st_dev".into(), Value::from(meta.dev()));
    map.insert("st_nlink".into(), Value::from(meta.nlink()));
    map.insert("st_uid".into(), Value::from(meta.uid()));
    map.insert("st_gid".into(), Value::from(meta.gid()));
    map.insert("st_size".into(), Value::from(meta.size()));
    let nanos = |secs: i64, ns: i64| Some(secs as f64 + ns as f64 / 1e9);
    insert_time(&mut map, "st_atime", nanos(meta.atime(), meta.atime_nsec()));
    insert_time(&mut map, "st_mtime", nanos(meta.mtime(), meta.mtime_nsec()));
    insert_time(&mut map, "st_ctime", nanos(meta.ctime(), meta.ctime_nsec()));
    insert_time(&mut map, "st_birthtime", epoch_secs(meta.created()));
    map
}

#[cfg(windows)]
fn metadata_map(meta: &Metadata) -> Map<String, Value> {
    use std::os::windows::fs::MetadataExt;

    let mut map = Map::new();
    map.insert("st_file_attributes".into(), Value::from(meta.file_attributes()));
    map.insert("st_mode".into(), Value::from(synthetic_mode(meta)));
    map.insert("st_size".into(), Value::from(meta.file_size()));
    insert_time(&mut map, "st_atime", epoch_secs(meta.accessed()));
    insert_time(&mut map, "st_mtime", epoch_secs(meta.modified()));
    insert_time(&mut map, "st_birthtime", epoch_secs(meta.created()));
    map
}

#[cfg(not(any(unix, windows)))]
fn metadata_map(meta: &Metadata) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("st_mode".into(), Value::from(synthetic_mode(meta)));
    map.insert("st_size".into(), Value::from(meta.len()));
    insert_time(&mut map, "st_atime", epoch_secs(meta.accessed()));
    insert_time(&mut map, "st_mtime", epoch_secs(meta.modified()));
    insert_time(&mut map, "st_birthtime", epoch_secs(meta.created()));
    map
}

#[cfg(not(unix))]
fn synthetic_mode(meta: &Metadata) -> u64 {
    let ft = meta.file_type();
    if ft.is_dir() {
        0o040777
    } else if ft.is_symlink() {
        0o120777
    } else {
        0o100666
    }
}

#[cfg(unix)]
fn local_identifier(_path: &Path, meta: &Metadata) -> String {
    use std::os::unix::fs::MetadataExt;
    format!("{}:{}", meta.dev(), meta.ino())
}

#[cfg(not(unix))]
fn local_identifier(path: &Path, _meta: &Metadata) -> String {
    path.to_string_lossy().into_owned()
}

/// Build a [`RawEntry`] for a path whose metadata has been read.
pub fn raw_entry(
    path: &Path,
    meta: &Metadata,
    tracker: &mut DriveTracker,
    resolver: &dyn VolumeResolver,
) -> RawEntry {
    let native = path.to_string_lossy().into_owned();
    let parent = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| native.clone());
    let location = tracker.resolve(&native, resolver);

    RawEntry {
        local_identifier: local_identifier(path, meta),
        path: native,
        parent,
        name,
        uri: Some(location.uri),
        volume: location.volume,
        metadata: metadata_map(meta),
    }
}

/// Path an `ignore` error refers to, if it carries one.
fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::Loop { child, .. } => Some(child.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

fn unreadable(path: Option<&Path>, message: impl ToString) -> EntryError {
    let err = EntryError::Unreadable {
        path: path.map(|p| p.display().to_string()).unwrap_or_default(),
        message: message.to_string(),
    };
    warn!(path = %err.path(), error = %err, "skipping unreadable entry");
    err
}

fn absolute_root(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        return Err(StrataError::InputNotFound {
            path: root.to_path_buf(),
        });
    }
    if root.is_absolute() {
        Ok(root.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(root))
    }
}

fn walk_builder(root: &Path, options: &CaptureOptions) -> WalkBuilder {
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false) // storage catalog: every entry counts
        .follow_links(options.follow_symlinks)
        .threads(options.threads);

    if !options.ignore_patterns.is_empty() {
        let mut overrides = OverrideBuilder::new(root);
        for pattern in &options.ignore_patterns {
            // `!` turns the override into an exclusion
            if let Err(e) = overrides.add(&format!("!{}", pattern)) {
                warn!(pattern = %pattern, error = %e, "invalid ignore pattern");
            }
        }
        match overrides.build() {
            Ok(overrides) => {
                builder.overrides(overrides);
            }
            Err(e) => warn!(error = %e, "ignore patterns not applied"),
        }
    }
    builder
}

/// Lazy depth-first walk yielding one [`RawEntry`] per readable entry.
pub struct LocalWalk<'a> {
    walker: ignore::Walk,
    tracker: &'a mut DriveTracker,
    resolver: &'a dyn VolumeResolver,
    deadline: Option<Instant>,
    dir_count: usize,
    file_count: usize,
    errors: Vec<EntryError>,
    expired: bool,
}

impl<'a> LocalWalk<'a> {
    pub fn new(
        root: &Path,
        options: &CaptureOptions,
        tracker: &'a mut DriveTracker,
        resolver: &'a dyn VolumeResolver,
    ) -> Result<Self> {
        let root = absolute_root(root)?;
        let mut builder = walk_builder(&root, options);
        builder.sort_by_file_name(|a, b| a.cmp(b));
        Ok(Self {
            walker: builder.build(),
            tracker,
            resolver,
            deadline: options.deadline.map(|d| Instant::now() + d),
            dir_count: 0,
            file_count: 0,
            errors: Vec::new(),
            expired: false,
        })
    }

    pub fn dir_count(&self) -> usize {
        self.dir_count
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Entries skipped so far, and why.
    pub fn errors(&self) -> &[EntryError] {
        &self.errors
    }

    /// `true` once the deadline stopped the walk.
    pub fn expired(&self) -> bool {
        self.expired
    }
}

impl Iterator for LocalWalk<'_> {
    type Item = RawEntry;

    fn next(&mut self) -> Option<RawEntry> {
        if self.expired {
            return None;
        }
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    self.errors.push(unreadable(error_path(&e), &e));
                    continue;
                }
            };
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            if is_dir && self.deadline.is_some_and(|d| Instant::now() >= d) {
                info!(path = %entry.path().display(), "capture deadline reached");
                self.expired = true;
                return None;
            }
            match entry.metadata() {
                Ok(meta) => {
                    if is_dir {
                        self.dir_count += 1;
                    } else {
                        self.file_count += 1;
                    }
                    return Some(raw_entry(entry.path(), &meta, self.tracker, self.resolver));
                }
                Err(e) => self.errors.push(unreadable(Some(entry.path()), &e)),
            }
        }
    }
}

/// Capture a local tree.
///
/// `options.threads == 1` runs a sequential [`LocalWalk`] with the caller's
/// `tracker`. Any other value runs the parallel walker; entries are sorted
/// by path afterwards so output is stable.
pub fn capture_directory(
    root: &Path,
    options: &CaptureOptions,
    tracker: &mut DriveTracker,
    resolver: &dyn VolumeResolver,
) -> Result<CaptureResult> {
    let start = Instant::now();
    let result = if options.threads == 1 {
        let mut walk = LocalWalk::new(root, options, tracker, resolver)?;
        let entries: Vec<RawEntry> = walk.by_ref().collect();
        CaptureResult {
            root: absolute_root(root)?,
            entries,
            dir_count: walk.dir_count(),
            file_count: walk.file_count(),
            error_count: walk.error_count(),
            completed: !walk.expired(),
            errors: walk.errors,
            duration_ms: 0.0,
        }
    } else {
        capture_parallel(root, options, resolver)?
    };

    let result = CaptureResult {
        duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        ..result
    };
    info!(
        root = %result.root.display(),
        dirs = result.dir_count,
        files = result.file_count,
        errors = result.error_count,
        completed = result.completed,
        "capture finished"
    );
    Ok(result)
}

fn capture_parallel(
    root: &Path,
    options: &CaptureOptions,
    resolver: &dyn VolumeResolver,
) -> Result<CaptureResult> {
    let root = absolute_root(root)?;
    let deadline = options.deadline.map(|d| Instant::now() + d);

    let entries = Mutex::new(Vec::new());
    let dirs = AtomicUsize::new(0);
    let files = AtomicUsize::new(0);
    let errors = Mutex::new(Vec::new());
    let expired = AtomicBool::new(false);

    walk_builder(&root, options).build_parallel().run(|| {
        let mut tracker = DriveTracker::new();
        let (entries, dirs, files, errors, expired) = (&entries, &dirs, &files, &errors, &expired);
        Box::new(move |result: std::result::Result<DirEntry, ignore::Error>| {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    let err = unreadable(error_path(&e), &e);
                    if let Ok(mut errors) = errors.lock() {
                        errors.push(err);
                    }
                    return WalkState::Continue;
                }
            };
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            if is_dir && deadline.is_some_and(|d| Instant::now() >= d) {
                if !expired.swap(true, Ordering::Relaxed) {
                    info!(path = %entry.path().display(), "capture deadline reached");
                }
                return WalkState::Quit;
            }
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    let err = unreadable(Some(entry.path()), &e);
                    if let Ok(mut errors) = errors.lock() {
                        errors.push(err);
                    }
                    return WalkState::Continue;
                }
            };
            if is_dir {
                dirs.fetch_add(1, Ordering::Relaxed);
            } else {
                files.fetch_add(1, Ordering::Relaxed);
            }
            let raw = raw_entry(entry.path(), &meta, &mut tracker, resolver);
            debug!(path = %raw.path, "captured");
            if let Ok(mut entries) = entries.lock() {
                entries.push(raw);
            }
            WalkState::Continue
        })
    });

    let mut entries = entries.into_inner().unwrap_or_default();
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    let errors = errors.into_inner().unwrap_or_default();

    Ok(CaptureResult {
        root,
        entries,
        dir_count: dirs.load(Ordering::Relaxed),
        file_count: files.load(Ordering::Relaxed),
        error_count: errors.len(),
        completed: !expired.load(Ordering::Relaxed),
        errors,
        duration_ms: 0.0,
    })
}
