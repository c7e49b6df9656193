//! Import command - turn a cloud provider listing into an index file

use std::path::Path;

use anyhow::{Context, Result};
use strata_core::cloud::load_provider_records;
use strata_core::pipeline::write_capture;
use strata_core::types::Platform;

use super::index::IndexSummary;
use super::output_dir;
use crate::config::StrataConfig;
use crate::output::{Output, OutputFormat};

pub fn run(
    records: &Path,
    platform: Platform,
    output: Option<&Path>,
    config: &StrataConfig,
    format: OutputFormat,
) -> Result<()> {
    let capture = load_provider_records(records, platform)
        .with_context(|| format!("Failed to import {}", records.display()))?;
    let dir = output_dir(output, config)?;
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
