//! Ingest command - normalize raw entries and emit the catalog artifacts

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;
use strata_core::emit::JsonlSink;
use strata_core::graph::DirectoryConflict;
use strata_core::naming::{ArtifactName, SERVICE_INGEST};
use strata_core::pipeline::{ingest_file, resolve_platform, IngestOutcome};
use strata_core::types::{Platform, RunCounters};
use uuid::Uuid;

use super::{display, ingest_options, output_dir};
use crate::config::StrataConfig;
use crate::output::{Output, OutputFormat, TableDisplay, TableOutput};
use crate::IngestArgs;

/// Result of one ingest run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub platform: Platform,
    pub input: String,
    pub counters: RunCounters,
    pub objects_file: Option<String>,
    pub relationships_file: Option<String>,
    pub descriptor_file: Option<String>,
    pub conflicts: Vec<DirectoryConflict>,
    /// Structural problems found while verifying the containment graph
    pub violations: usize,
    pub duration_ms: f64,
}

impl IngestSummary {
    pub fn new(platform: Platform, input: &str, outcome: &IngestOutcome) -> Self {
        let report = &outcome.report;
        Self {
            platform,
            input: input.to_string(),
            counters: outcome.counters.clone(),
            objects_file: report.objects_path.as_deref().map(display),
            relationships_file: report.relationships_path.as_deref().map(display),
            descriptor_file: report.descriptor_path.as_deref().map(display),
            conflicts: outcome.conflicts.clone(),
            violations: outcome.violations.len(),
            duration_ms: outcome.duration_ms,
        }
    }
}

impl TableDisplay for IngestSummary {
    fn to_table(&self) -> String {
        let c = &self.counters;
        let mut lines = vec![format!("{}", "Ingest complete".green().bold())];

        let mut pairs = vec![
            ("Platform", self.platform.to_string()),
            ("Input", self.input.clone()),
            ("Entries read", c.input_count.to_string()),
            ("Directories", c.dir_count.to_string()),
            ("Files", c.file_count.to_string()),
            ("Edges", c.edge_count.to_string()),
            ("Orphans", c.orphan_count.to_string()),
            ("Roots", c.root_count.to_string()),
            ("Duplicate dirs", c.duplicate_dir_count.to_string()),
            ("Errors", c.error_count.to_string()),
            ("Objects written", c.output_count.to_string()),
        ];
        if let Some(descriptor) = &self.descriptor_file {
            pairs.push(("Load descriptor", descriptor.clone()));
        }
        lines.push(TableOutput::format_key_value(&pairs));

        if !self.conflicts.is_empty() {
            lines.push(format!("{}", "Duplicate directory paths:".yellow()));
            let rows: Vec<Vec<String>> = self
                .conflicts
                .iter()
                .map(|conflict| {
                    vec![
                        conflict.path.clone(),
                        conflict.kept.to_string(),
                        conflict.replaced.to_string(),
                    ]
                })
                .collect();
            lines.push(TableOutput::from_rows(&["Path", "Kept", "Replaced"], &rows));
        }

        if self.violations > 0 {
            lines.push(format!(
                "{}: {} containment violation(s), see log",
                "Warning".yellow().bold(),
                self.violations
            ));
        }

        lines.push(format!("({:.0} ms)", self.duration_ms).dimmed().to_string());
        lines.join("\n")
    }
}

/// Artifact name for an ingest run, carrying machine and storage ids forward
/// from the input's own name when present.
pub fn ingest_artifact_name(input: &Path, platform: Platform, config: &StrataConfig) -> ArtifactName {
    let source = ArtifactName::parse(&input.to_string_lossy()).ok();
    let machine = source
        .as_ref()
        .and_then(|name| name.machine)
        .or_else(|| Uuid::parse_str(config.machine_id()).ok());

    ArtifactName::new(config.file_prefix(), platform, SERVICE_INGEST, Utc::now())
        .with_machine(machine)
        .with_storage(source.and_then(|name| name.storage))
}

/// Run the ingest command.
pub fn run(
    input: &Path,
    platform: Option<Platform>,
    output: Option<&Path>,
    args: &IngestArgs,
    config: &StrataConfig,
    format: OutputFormat,
) -> Result<()> {
    let platform = resolve_platform(input, platform)
        .with_context(|| format!("Cannot infer the platform of {}, pass --platform", input.display()))?;
    let options = ingest_options(args, Some(platform), config);

    let dir = output_dir(output, config)?;
    let mut sink = JsonlSink::new(&dir, ingest_artifact_name(input, platform, config));
    let resolver = config.volume_map();
    let outcome = ingest_file(input, &options, &resolver, &mut sink)
        .with_context(|| format!("Failed to ingest {}", input.display()))?;

    Output::new(IngestSummary::new(platform, &display(input), &outcome), format).render()
}
