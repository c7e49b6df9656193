//! Structured artifact file names.
//!
//! ```text
//! strata-plt=linux-svc=ingest-machine=<hex>-collection=Objects-ts=2024_01_19T01#12#01.057294+00#00.jsonl
//! ```
//!
//! Values may not contain `-` (it separates fields), so it is written as `_`.
//! Timestamps also swap `:` for `#` to stay legal on every file system.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::{Result, StrataError};
use crate::types::Platform;

/// Indexer output.
pub const SERVICE_INDEX: &str = "index";
/// Ingester output.
pub const SERVICE_INGEST: &str = "ingest";

const SUFFIXES: [&str; 3] = [".jsonl", ".json", ".toml"];

/// Fields encoded in an artifact file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactName {
    pub prefix: String,
    pub platform: Platform,
    pub service: String,
    pub machine: Option<Uuid>,
    pub storage: Option<Uuid>,
    pub collection: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ArtifactName {
    pub fn new(prefix: &str, platform: Platform, service: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            prefix: prefix.to_string(),
            platform,
            service: service.to_string(),
            machine: None,
            storage: None,
            collection: None,
            timestamp,
        }
    }

    pub fn with_machine(mut self, machine: Option<Uuid>) -> Self {
        self.machine = machine;
        self
    }

    pub fn with_storage(mut self, storage: Option<Uuid>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collection = Some(collection.to_string());
        self
    }

    /// Render the name with the given suffix (including the dot).
    pub fn to_file_name(&self, suffix: &str) -> String {
        let mut name = format!(
            "{}-plt={}-svc={}",
            escape(&self.prefix),
            self.platform.as_str(),
            escape(&self.service)
        );
        if let Some(machine) = self.machine {
            name.push_str(&format!("-machine={}", machine.simple()));
        }
        if let Some(storage) = self.storage {
            name.push_str(&format!("-storage={}", storage.simple()));
        }
        if let Some(collection) = &self.collection {
            name.push_str(&format!("-collection={}", escape(collection)));
        }
        let ts = self
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, false)
            .replace(':', "#");
        name.push_str(&format!("-ts={}{}", escape(&ts), suffix));
        name
    }

    /// Parse a file name (or path) produced by [`ArtifactName::to_file_name`].
    pub fn parse(file_name: &str) -> Result<Self> {
        let invalid = || StrataError::InvalidArtifactName {
            name: file_name.to_string(),
        };
        let keys = extract_keys(file_name)?;
        let platform = keys.get("plt").ok_or_else(invalid)?.parse::<Platform>()?;
        let service = keys.get("svc").ok_or_else(invalid)?.clone();
        let ts = keys
            .get("ts")
            .ok_or_else(invalid)?
            .replace('_', "-")
            .replace('#', ":");
        let timestamp = DateTime::parse_from_rfc3339(&ts)
            .map_err(|_| invalid())?
            .with_timezone(&Utc);
        let uuid_key = |key: &str| -> Result<Option<Uuid>> {
            keys.get(key)
                .map(|v| Uuid::parse_str(v).map_err(|_| invalid()))
                .transpose()
        };

        Ok(Self {
            prefix: keys.get("prefix").cloned().unwrap_or_default(),
            platform,
            service,
            machine: uuid_key("machine")?,
            storage: uuid_key("storage")?,
            collection: keys.get("collection").cloned(),
            timestamp,
        })
    }
}

fn escape(value: &str) -> String {
    value.replace('-', "_")
}

/// Split an artifact file name into its raw `key=value` fields.
///
/// The leading field is returned under `prefix`. Values are returned exactly
/// as written in the name.
pub fn extract_keys(file_name: &str) -> Result<BTreeMap<String, String>> {
    let invalid = || StrataError::InvalidArtifactName {
        name: file_name.to_string(),
    };
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(invalid)?;
    let stem = SUFFIXES
        .iter()
        .find_map(|s| base.strip_suffix(s))
        .unwrap_or(base);

    let mut fields = stem.split('-');
    let mut keys = BTreeMap::new();
    let prefix = fields.next().ok_or_else(invalid)?;
    if prefix.contains('=') {
        return Err(invalid());
    }
    keys.insert("prefix".to_string(), prefix.to_string());
    for field in fields {
        let (key, value) = field.split_once('=').ok_or_else(invalid)?;
        keys.insert(key.to_string(), value.to_string());
    }
    Ok(keys)
}
