//! One ingest run: normalize, assign identity, build the containment graph,
//! emit.
//!
//! Normalization is data-parallel (rayon). Identity assignment and graph
//! construction run single-threaded over the materialized object set.

use std::path::{Path, PathBuf};
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::CaptureResult;
use crate::emit::{BatchSink, EmitReport};
use crate::error::{EntryError, Result, StrataError};
use crate::graph::{build_containment, ContainmentGraph, DirectoryConflict, GraphViolation};
use crate::identity::IdentityResolver;
use crate::jsonl;
use crate::naming::{extract_keys, ArtifactName, SERVICE_INDEX};
use crate::normalize::{self, NormalizedAttrs};
use crate::path::{canonicalize, split_native, PathCodec};
use crate::types::{Platform, RawEntry, RunCounters, SourceDescriptor, StorageObject};
use crate::volume::{DriveTracker, VolumeResolver};

/// Settings for one ingest run.
#[derive(Clone, Debug)]
pub struct IngestOptions {
    /// Platform of the input. `None` infers it from the input file name.
    pub platform: Option<Platform>,
    pub machine_id: String,
    pub codec: PathCodec,
    /// Fail the run on duplicate directory paths instead of keeping the last.
    pub strict_duplicates: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            platform: None,
            machine_id: "local".to_string(),
            codec: PathCodec::default(),
            strict_duplicates: false,
        }
    }
}

/// Everything an ingest run produced besides the artifacts themselves.
#[derive(Debug, Default, Serialize)]
pub struct IngestOutcome {
    pub counters: RunCounters,
    pub report: EmitReport,
    pub conflicts: Vec<DirectoryConflict>,
    #[serde(skip)]
    pub violations: Vec<GraphViolation>,
    #[serde(skip)]
    pub entry_errors: Vec<EntryError>,
    pub duration_ms: f64,
}

/// Platform for an input file: explicit, or read from its structured name.
pub fn resolve_platform(input: &Path, explicit: Option<Platform>) -> Result<Platform> {
    if let Some(platform) = explicit {
        return Ok(platform);
    }
    let name = input.to_string_lossy();
    let keys = extract_keys(&name).map_err(|_| StrataError::UnknownPlatform {
        name: format!("cannot infer platform from {}", name),
    })?;
    match keys.get("plt") {
        Some(plt) => plt.parse(),
        None => Err(StrataError::UnknownPlatform {
            name: format!("no platform in {}", name),
        }),
    }
}

/// base64 of the MessagePack-encoded native metadata.
fn encode_raw(raw: &RawEntry) -> std::result::Result<String, EntryError> {
    rmp_serde::to_vec(&raw.metadata)
        .map(|bytes| STANDARD.encode(bytes))
        .map_err(|e| EntryError::MalformedMetadata {
            path: raw.path.clone(),
            message: e.to_string(),
        })
}

/// Declared parent and name of `raw`, filled in from its path when absent.
///
/// Top-level cloud entries have no parent: the provider root is never listed.
fn parent_and_name(raw: &RawEntry, platform: Platform) -> (Option<&str>, &str) {
    let (derived_parent, derived_name) = split_native(&raw.path, platform.path_style());
    let parent = match raw.parent.as_deref() {
        Some(parent) => Some(parent),
        None if platform.is_cloud() => derived_parent.filter(|p| !p.trim_matches('/').is_empty()),
        None => derived_parent,
    };
    let name = if raw.name.is_empty() {
        derived_name
    } else {
        raw.name.as_str()
    };
    (parent, name)
}

struct ObjectFactory<'a> {
    platform: Platform,
    codec: PathCodec,
    source: SourceDescriptor,
    tracker: DriveTracker,
    resolver: &'a dyn VolumeResolver,
}

impl ObjectFactory<'_> {
    fn build(&mut self, id: Uuid, raw: &RawEntry, attrs: NormalizedAttrs, raw_data: String) -> StorageObject {
        let style = self.platform.path_style();
        let (uri, volume) = match (&raw.uri, self.platform.cloud_uri(&raw.path)) {
            (Some(uri), _) => (uri.clone(), raw.volume.clone()),
            (None, Some(uri)) => (uri, None),
            (None, None) => {
                let location = self.tracker.resolve(&raw.path, self.resolver);
                (location.uri, location.volume)
            }
        };
        let mut attributes = raw.metadata.clone();
        attributes.extend(attrs.flag_attributes());
        let (parent, name) = parent_and_name(raw, self.platform);

        StorageObject {
            object_identifier: id,
            label: name.to_string(),
            path: canonicalize(&raw.path, style, self.codec),
            parent_path: parent.map(|p| canonicalize(p, style, self.codec)),
            local_identifier: raw.local_identifier.clone(),
            uri,
            volume,
            size: attrs.size,
            timestamps: attrs.timestamps,
            attributes,
            raw_data,
            is_directory: attrs.is_directory,
            source: self.source.clone(),
        }
    }
}

fn record_error(err: EntryError, counters: &mut RunCounters, errors: &mut Vec<EntryError>) {
    warn!(path = %err.path(), error = %err, "skipping entry");
    counters.error_count += 1;
    errors.push(err);
}

/// Ingest an in-memory batch of raw entries into `sink`.
///
/// Fails before anything reaches the sink when duplicate directory paths are
/// found and `options.strict_duplicates` is set.
pub fn ingest_entries(
    entries: &[RawEntry],
    platform: Platform,
    options: &IngestOptions,
    resolver: &dyn VolumeResolver,
    sink: &mut dyn BatchSink,
    counters: &mut RunCounters,
) -> Result<IngestOutcome> {
    let start = Instant::now();
    counters.input_count += entries.len();
    info!(platform = %platform, entries = entries.len(), "ingest started");

    let normalizer = normalize::for_platform(platform);
    let normalized: Vec<std::result::Result<(NormalizedAttrs, String), EntryError>> = entries
        .par_iter()
        .map(|raw| {
            let attrs = normalizer.normalize(raw)?;
            let raw_data = encode_raw(raw)?;
            Ok((attrs, raw_data))
        })
        .collect();

    let mut identity = IdentityResolver::new(platform, &options.machine_id);
    let mut factory = ObjectFactory {
        platform,
        codec: options.codec,
        source: SourceDescriptor::for_platform(platform),
        tracker: DriveTracker::new(),
        resolver,
    };
    let mut entry_errors = Vec::new();
    let mut objects = Vec::with_capacity(entries.len());

    for (raw, result) in entries.iter().zip(normalized) {
        let (attrs, raw_data) = match result {
            Ok(ok) => ok,
            Err(e) => {
                record_error(e, counters, &mut entry_errors);
                continue;
            }
        };
        let id = match identity.resolve(raw) {
            Ok(id) => id,
            Err(e) => {
                record_error(e, counters, &mut entry_errors);
                continue;
            }
        };
        if attrs.is_directory {
            counters.dir_count += 1;
        } else {
            counters.file_count += 1;
        }
        debug!(path = %raw.path, %id, "object");
        objects.push(factory.build(id, raw, attrs, raw_data));
    }

    let graph = build_containment(&objects, counters);
    if options.strict_duplicates {
        if let Some(first) = graph.conflicts.first() {
            return Err(StrataError::DuplicateDirectories {
                count: graph.conflicts.len(),
                first: first.path.clone(),
            });
        }
    }

    let violations = ContainmentGraph::new(&objects, &graph.edges).verify();
    for violation in &violations {
        warn!(?violation, "containment graph violation");
    }

    let report = sink.emit(&objects, &graph.edges)?;
    counters.output_count += report.object_count;

    info!(
        dirs = counters.dir_count,
        files = counters.file_count,
        edges = counters.edge_count,
        orphans = counters.orphan_count,
        roots = counters.root_count,
        errors = counters.error_count,
        "ingest finished"
    );

    Ok(IngestOutcome {
        counters: counters.clone(),
        report,
        conflicts: graph.conflicts,
        violations,
        entry_errors,
        duration_ms: start.elapsed().as_secs_f64() * 1000.0,
    })
}

/// Ingest an indexer output file.
pub fn ingest_file(
    input: &Path,
    options: &IngestOptions,
    resolver: &dyn VolumeResolver,
    sink: &mut dyn BatchSink,
) -> Result<IngestOutcome> {
    let platform = resolve_platform(input, options.platform)?;
    let loaded = jsonl::read_records::<RawEntry>(input)?;
    let mut counters = RunCounters {
        input_count: loaded.skipped,
        error_count: loaded.skipped,
        ..Default::default()
    };
    ingest_entries(&loaded.records, platform, options, resolver, sink, &mut counters)
}

/// Write a capture as an indexer output file in `dir`. Returns its path.
pub fn write_capture(
    capture: &CaptureResult,
    platform: Platform,
    machine_id: &str,
    prefix: &str,
    dir: &Path,
) -> Result<PathBuf> {
    let storage = capture
        .entries
        .first()
        .and_then(|e| e.volume.as_deref())
        .and_then(|v| Uuid::parse_str(v).ok());
    let name = ArtifactName::new(prefix, platform, SERVICE_INDEX, chrono::Utc::now())
        .with_machine(Uuid::parse_str(machine_id).ok())
        .with_storage(storage);
    let path = dir.join(name.to_file_name(".jsonl"));
    jsonl::write_records(&path, &capture.entries)?;
    Ok(path)
}
