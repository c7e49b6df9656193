//! Strata core - storage metadata catalog pipeline.
//!
//! Turns raw, platform-specific file-system metadata into a canonical object
//! catalog plus a directed containment graph ready for bulk loading.
//!
//! # Pipeline
//!
//! ```text
//! capture / cloud -> normalize -> identity + path + volume -> graph -> emit
//! ```
//!
//! - **Capture**: lazy or parallel local walks, provider listings for cloud
//! - **Normalize**: per-platform static attribute tables behind [`normalize::Normalizer`]
//! - **Identity**: provider UUIDs verbatim, UUIDv5 for local native ids
//! - **Graph**: Contains/ContainedBy edges from a flat listing, orphans counted
//! - **Emit**: NDJSON artifacts moved into place before the load descriptor
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use strata_core::capture::{capture_directory, CaptureOptions};
//! use strata_core::emit::MemorySink;
//! use strata_core::pipeline::{ingest_entries, IngestOptions};
//! use strata_core::types::{Platform, RunCounters};
//! use strata_core::volume::{DriveTracker, NoVolumes};
//!
//! let mut tracker = DriveTracker::new();
//! let capture = capture_directory(Path::new("/data"), &CaptureOptions::default(), &mut tracker, &NoVolumes)?;
//! let mut sink = MemorySink::default();
//! let mut counters = RunCounters::default();
//! ingest_entries(&capture.entries, Platform::host(), &IngestOptions::default(), &NoVolumes, &mut sink, &mut counters)?;
//! # Ok::<(), strata_core::error::StrataError>(())
//! ```

pub mod capture;
pub mod cloud;
pub mod emit;
pub mod error;
pub mod graph;
pub mod identity;
pub mod jsonl;
pub mod naming;
pub mod normalize;
pub mod path;
pub mod pipeline;
pub mod types;
pub mod volume;

pub use error::{EntryError, Result, StrataError};
pub use types::{ContainmentEdge, Platform, RawEntry, RunCounters, StorageObject};
