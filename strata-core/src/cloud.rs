//! Raw entry capture from pre-fetched cloud provider listings.

use std::path::Path;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::capture::CaptureResult;
use crate::error::{EntryError, Result, StrataError};
use crate::identity::OBJECT_IDENTIFIER_KEY;
use crate::jsonl;
use crate::types::{Platform, RawEntry};

fn is_folder_record(record: &Map<String, Value>) -> bool {
    record.contains_key("FolderMetadata")
        || record.get(".tag").and_then(Value::as_str) == Some("folder")
}

/// Convert one provider record into a [`RawEntry`].
///
/// Records without an `ObjectIdentifier` get a fresh random one. Entries
/// directly under the provider root (`/`) are roots and have no parent.
pub fn raw_entry_from_record(
    mut record: Map<String, Value>,
    platform: Platform,
) -> std::result::Result<RawEntry, EntryError> {
    let path = record
        .get("path_display")
        .and_then(Value::as_str)
        .filter(|p| p.starts_with('/') && p.len() > 1)
        .map(|p| p.trim_end_matches('/').to_string())
        .ok_or_else(|| EntryError::MalformedMetadata {
            path: record
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string(),
            message: "missing or invalid path_display".to_string(),
        })?;

    if !record.contains_key(OBJECT_IDENTIFIER_KEY) {
        record.insert(
            OBJECT_IDENTIFIER_KEY.to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
    }

    let (parent, name) = match path.rsplit_once('/') {
        Some(("", name)) => (None, name.to_string()),
        Some((parent, name)) => (Some(parent.to_string()), name.to_string()),
        None => (None, path.clone()),
    };
    let name = record
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(name);
    let local_identifier = record
        .get("id")
        .and_then(Value::as_str)
        .or_else(|| record.get(OBJECT_IDENTIFIER_KEY).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    Ok(RawEntry {
        uri: platform.cloud_uri(&path),
        path,
        parent,
        name,
        local_identifier,
        volume: None,
        metadata: record,
    })
}

/// Load a provider listing (`.json` array or `.jsonl`) as a capture result.
pub fn load_provider_records(path: &Path, platform: Platform) -> Result<CaptureResult> {
    if !platform.is_cloud() {
        return Err(StrataError::UnknownPlatform {
            name: format!("{} is not a cloud provider", platform),
        });
    }
    let start = Instant::now();
    let loaded = jsonl::read_records::<Map<String, Value>>(path)?;

    let mut result = CaptureResult {
        root: path.to_path_buf(),
        error_count: loaded.skipped,
        completed: true,
        ..Default::default()
    };
    for record in loaded.records {
        let is_folder = is_folder_record(&record);
        match raw_entry_from_record(record, platform) {
            Ok(entry) => {
                if is_folder {
                    result.dir_count += 1;
                } else {
                    result.file_count += 1;
                }
                result.entries.push(entry);
            }
            Err(e) => {
                warn!(error = %e, "skipping provider record");
                result.error_count += 1;
                result.errors.push(e);
            }
        }
    }
    result.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    info!(
        platform = %platform,
        dirs = result.dir_count,
        files = result.file_count,
        errors = result.error_count,
        "provider listing loaded"
    );
    Ok(result)
}
