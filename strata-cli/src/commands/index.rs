//! Index command - capture a local tree as raw entries

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use strata_core::capture::{capture_directory, CaptureResult};
use strata_core::pipeline::write_capture;
use strata_core::types::Platform;
use strata_core::volume::DriveTracker;

use super::{create_spinner, display, output_dir, walk_options};
use crate::config::StrataConfig;
use crate::output::{Output, OutputFormat, TableDisplay, TableOutput};
use crate::WalkArgs;

/// Result of writing one index file.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub platform: Platform,
    /// Walked directory or imported listing
    pub source: String,
    pub index_file: String,
    pub dirs: usize,
    pub files: usize,
    pub errors: usize,
    /// False when the walk deadline cut the capture short
    pub completed: bool,
    pub duration_ms: f64,
}

impl IndexSummary {
    pub fn new(capture: &CaptureResult, platform: Platform, index_file: &Path) -> Self {
        Self {
            platform,
            source: display(&capture.root),
            index_file: display(index_file),
            dirs: capture.dir_count,
            files: capture.file_count,
            errors: capture.error_count,
            completed: capture.completed,
            duration_ms: capture.duration_ms,
        }
    }
}

impl TableDisplay for IndexSummary {
    fn to_table(&self) -> String {
        let header = if self.completed {
            format!("{}", "Index complete".green().bold())
        } else {
            format!("{}", "Index incomplete (deadline reached)".yellow().bold())
        };
        let table = TableOutput::format_key_value(&[
            ("Platform", self.platform.to_string()),
            ("Source", self.source.clone()),
            ("Directories", self.dirs.to_string()),
            ("Files", self.files.to_string()),
            ("Errors", self.errors.to_string()),
            ("Index file", self.index_file.clone()),
        ]);
        format!(
            "{}\n{}\n{}",
            header,
            table,
            format!("({:.0} ms)", self.duration_ms).dimmed()
        )
    }
}

/// Walk `root` with config and flag settings, behind a spinner.
///
/// `output` is left out of the walk when it lies inside `root`.
pub fn capture_local(
    root: &Path,
    output: &Path,
    walk: &WalkArgs,
    config: &StrataConfig,
    show_progress: bool,
) -> Result<CaptureResult> {
    let mut options = walk_options(walk, config);
    if let Some(pattern) = nested_dir_pattern(root, output) {
        tracing::debug!(pattern = %pattern, "excluding output directory from walk");
        options.ignore_patterns.push(pattern);
    }
    let resolver = config.volume_map();
    let mut tracker = DriveTracker::new();

    let spinner = create_spinner(show_progress);
    spinner.set_message(format!("Walking {}...", root.display()));
    let capture = capture_directory(root, &options, &mut tracker, &resolver);
    spinner.finish_and_clear();

    let capture = capture.with_context(|| format!("Failed to capture {}", root.display()))?;
    if !capture.completed {
        tracing::warn!(
            root = %root.display(),
            entries = capture.len(),
            "walk deadline reached, capture is incomplete"
        );
    }
    Ok(capture)
}

/// Root-anchored ignore pattern for `dir` when it sits below `root`.
fn nested_dir_pattern(root: &Path, dir: &Path) -> Option<String> {
    let root = root.canonicalize().ok()?;
    let dir = dir.canonicalize().ok()?;
    let relative = dir.strip_prefix(&root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(format!("/{}", parts.join("/")))
}

/// Run the index command.
pub fn run(
    root: &Path,
    output: Option<&Path>,
    walk: &WalkArgs,
    config: &StrataConfig,
    show_progress: bool,
    format: OutputFormat,
) -> Result<()> {
    let platform = Platform::host();
    let dir = output_dir(output, config)?;
    let capture = capture_local(root, &dir, walk, config, show_progress)?;
    let index_file = write_capture(
        &capture,
        platform,
        config.machine_id(),
        config.file_prefix(),
        &dir,
    )
    .context("Failed to write index file")?;

    Output::new(IndexSummary::new(&capture, platform, &index_file), format).render()
}
