//! Command implementations for the Strata CLI
//!
//! Each command module provides a `run` function that executes the command logic.

pub mod codec;
pub mod import;
pub mod index;
pub mod ingest;
pub mod run;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use strata_core::capture::CaptureOptions;
use strata_core::pipeline::IngestOptions;
use strata_core::types::Platform;

use crate::config::StrataConfig;
use crate::output::is_tty;
use crate::{IngestArgs, WalkArgs};

/// Spinner tick interval in milliseconds.
const SPINNER_TICK_MS: u64 = 100;

/// Create a spinner for progress display. Hidden unless `enabled` and stderr
/// is a terminal.
fn create_spinner(enabled: bool) -> ProgressBar {
    if !enabled || !is_tty() {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    spinner
}

/// Artifact directory: the flag, else the configured one. Created if missing.
fn output_dir(explicit: Option<&Path>, config: &StrataConfig) -> Result<PathBuf> {
    let dir = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.data_dir());
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    Ok(dir)
}

/// Capture settings from config, with command-line flags on top.
fn walk_options(args: &WalkArgs, config: &StrataConfig) -> CaptureOptions {
    let mut options = config.capture_options();
    options.ignore_patterns.extend(args.ignore.iter().cloned());
    if let Some(threads) = args.threads {
        options.threads = threads;
    }
    if let Some(secs) = args.deadline {
        options.deadline = Some(Duration::from_secs(secs));
    }
    options.follow_symlinks |= args.follow_symlinks;
    options
}

/// Ingest settings from config, with command-line flags on top.
fn ingest_options(
    args: &IngestArgs,
    platform: Option<Platform>,
    config: &StrataConfig,
) -> IngestOptions {
    let mut options = config.ingest_options(platform);
    if let Some(codec) = args.codec {
        options.codec = codec.into();
    }
    options.strict_duplicates |= args.strict_duplicates;
    options
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
