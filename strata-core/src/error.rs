//! Error types for strata-core.
//!
//! Two layers: [`StrataError`] fails a whole run before any output is
//! written, [`EntryError`] fails a single entry and is counted, logged and
//! skipped by the pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for strata-core operations.
pub type Result<T> = std::result::Result<T, StrataError>;

/// Run-level failures.
#[derive(Error, Debug)]
pub enum StrataError {
    /// Input file or directory does not exist.
    #[error("Input not found: {}", path.display())]
    InputNotFound {
        /// Path that was requested.
        path: PathBuf,
    },

    /// Input file has an extension the loader does not understand.
    #[error("Unknown input format for {}: expected .json or .jsonl", path.display())]
    UnknownFormat {
        /// Offending input path.
        path: PathBuf,
    },

    /// Platform tag could not be parsed or inferred.
    #[error("Unknown platform: {name}")]
    UnknownPlatform {
        /// The unrecognized platform name.
        name: String,
    },

    /// A line of an NDJSON or JSON input could not be decoded.
    #[error("Malformed input {}:{line}: {message}", path.display())]
    MalformedInput {
        /// Input path.
        path: PathBuf,
        /// 1-based line number (0 for whole-file JSON arrays).
        line: usize,
        /// Decoder message.
        message: String,
    },

    /// Duplicate directory paths found while building the path index in strict mode.
    #[error("{count} duplicate directory path(s), first: {first}")]
    DuplicateDirectories {
        /// Number of conflicting paths.
        count: usize,
        /// First conflicting canonical path.
        first: String,
    },

    /// Artifact name does not follow the structured naming scheme.
    #[error("Invalid artifact name: {name}")]
    InvalidArtifactName {
        /// The file name that failed to parse.
        name: String,
    },

    /// Temporary artifact could not be moved into place.
    #[error("Failed to persist {}: {source}", path.display())]
    Persist {
        /// Final destination.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Load descriptor encoding error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Per-entry failures. These never abort a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    /// The entry could not be read from the file system.
    #[error("Unreadable entry {path}: {message}")]
    Unreadable { path: String, message: String },

    /// Native metadata is missing a required field or has the wrong shape.
    #[error("Malformed metadata for {path}: {message}")]
    MalformedMetadata { path: String, message: String },

    /// Provider-supplied identifier is not a UUID.
    #[error("Invalid object identifier {value:?} for {path}")]
    InvalidIdentifier { path: String, value: String },

    /// Identifier already assigned earlier in the same batch.
    #[error("Duplicate object identifier {id} for {path}")]
    DuplicateIdentifier { path: String, id: String },

    /// Cloud record carries neither a folder nor a file marker.
    #[error("Entry {path} is neither a folder nor a file")]
    UnknownKind { path: String },
}

impl EntryError {
    /// Path of the entry the error refers to.
    pub fn path(&self) -> &str {
        match self {
            EntryError::Unreadable { path, .. }
            | EntryError::MalformedMetadata { path, .. }
            | EntryError::InvalidIdentifier { path, .. }
            | EntryError::DuplicateIdentifier { path, .. }
            | EntryError::UnknownKind { path } => path,
        }
    }
}
