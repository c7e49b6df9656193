//! Run command - index and ingest a local tree in one step
//!
//! The index file is still written so the raw capture can be re-ingested
//! later with different settings.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use strata_core::emit::JsonlSink;
use strata_core::pipeline::{ingest_entries, write_capture};
use strata_core::types::{Platform, RunCounters};

use super::index::{capture_local, IndexSummary};
use super::ingest::{ingest_artifact_name, IngestSummary};
use super::{display, ingest_options, output_dir};
use crate::config::StrataConfig;
use crate::output::{Output, OutputFormat, TableDisplay};
use crate::{IngestArgs, WalkArgs};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub index: IndexSummary,
    pub ingest: IngestSummary,
}

impl TableDisplay for RunSummary {
    fn to_table(&self) -> String {
        format!("{}\n\n{}", self.index.to_table(), self.ingest.to_table())
    }
}

pub fn run(
    root: &Path,
    output: Option<&Path>,
    walk: &WalkArgs,
    args: &IngestArgs,
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

    let options = ingest_options(args, Some(platform), config);
    let resolver = config.volume_map();
    let mut sink = JsonlSink::new(&dir, ingest_artifact_name(&index_file, platform, config));
    // Unreadable walk entries count against the run.
    let mut counters = RunCounters {
        error_count: capture.error_count,
        ..Default::default()
    };
    let outcome = ingest_entries(
        &capture.entries,
        platform,
        &options,
        &resolver,
        &mut sink,
        &mut counters,
    )
    .with_context(|| format!("Failed to ingest {}", root.display()))?;

    let summary = RunSummary {
        index: IndexSummary::new(&capture, platform, &index_file),
        ingest: IngestSummary::new(platform, &display(&index_file), &outcome),
    };
    Output::new(summary, format).render()
}
