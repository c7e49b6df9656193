//! Object identifier assignment.
//!
//! Cloud providers hand us identifiers, local file systems hand us inode-style
//! native ids. Both end up as a UUID that is unique within the batch.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::EntryError;
use crate::normalize::{S_IFDIR, S_IFMT};
use crate::types::{Platform, RawEntry};

/// Metadata key carrying a provider-assigned identifier.
pub const OBJECT_IDENTIFIER_KEY: &str = "ObjectIdentifier";

/// Namespace for synthesized identifiers on one machine and platform.
pub fn namespace(machine_id: &str, platform: Platform) -> Uuid {
    let name = format!("strata:{}:{}", machine_id, platform.as_str());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// Assigns and validates identifiers for one batch.
#[derive(Debug)]
pub struct IdentityResolver {
    platform: Platform,
    namespace: Uuid,
    seen: HashSet<Uuid>,
}

impl IdentityResolver {
    pub fn new(platform: Platform, machine_id: &str) -> Self {
        Self {
            platform,
            namespace: namespace(machine_id, platform),
            seen: HashSet::new(),
        }
    }

    /// Number of identifiers handed out so far.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Identifier for a local native id. Same input, same output.
    pub fn synthesize(&self, local_identifier: &str) -> Uuid {
        Uuid::new_v5(&self.namespace, local_identifier.as_bytes())
    }

    /// Resolve the identifier for `raw`, rejecting malformed or repeated ones.
    ///
    /// Every link of a hard-linked file is its own catalog entry, so the path
    /// joins the native id in the identifier name.
    pub fn resolve(&mut self, raw: &RawEntry) -> Result<Uuid, EntryError> {
        let id = if self.platform.is_cloud() {
            provider_identifier(raw)?
        } else if is_linked_file(raw) {
            self.synthesize(&format!("{}|{}", raw.local_identifier, raw.path))
        } else {
            self.synthesize(&raw.local_identifier)
        };

        if !self.seen.insert(id) {
            debug!(path = %raw.path, %id, "duplicate identifier");
            return Err(EntryError::DuplicateIdentifier {
                path: raw.path.clone(),
                id: id.to_string(),
            });
        }
        Ok(id)
    }
}

/// A non-directory entry with more than one link (`st_nlink > 1`).
fn is_linked_file(raw: &RawEntry) -> bool {
    let field = |key: &str| raw.metadata.get(key).and_then(Value::as_u64);
    let links = field("st_nlink").unwrap_or(1);
    let is_dir = field("st_mode").is_some_and(|mode| mode & S_IFMT == S_IFDIR);
    links > 1 && !is_dir
}

fn provider_identifier(raw: &RawEntry) -> Result<Uuid, EntryError> {
    let value = match raw.metadata.get(OBJECT_IDENTIFIER_KEY) {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(EntryError::InvalidIdentifier {
                path: raw.path.clone(),
                value: other.to_string(),
            })
        }
        None => "",
    };
    Uuid::parse_str(value).map_err(|_| EntryError::InvalidIdentifier {
        path: raw.path.clone(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn local(path: &str, native: &str) -> RawEntry {
        RawEntry {
            path: path.to_string(),
            local_identifier: native.to_string(),
            ..Default::default()
        }
    }

    fn cloud(path: &str, id: Value) -> RawEntry {
        let mut entry = local(path, "");
        entry.metadata.insert(OBJECT_IDENTIFIER_KEY.to_string(), id);
        entry
    }

    #[test]
    fn test_synthesized_ids_are_stable() {
        let mut first = IdentityResolver::new(Platform::Linux, "host-a");
        let mut second = IdentityResolver::new(Platform::Linux, "host-a");
        let a = first.resolve(&local("/a", "66306:12")).unwrap();
        let b = second.resolve(&local("/a", "66306:12")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 5);
    }

    #[test]
    fn test_namespace_separates_machines() {
        let a = IdentityResolver::new(Platform::Linux, "host-a").synthesize("1:1");
        let b = IdentityResolver::new(Platform::Linux, "host-b").synthesize("1:1");
        let c = IdentityResolver::new(Platform::Mac, "host-a").synthesize("1:1");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_duplicate_local_identifier_fails_later_record() {
        let mut resolver = IdentityResolver::new(Platform::Linux, "m");
        assert!(resolver.resolve(&local("/a", "1:7")).is_ok());
        let err = resolver.resolve(&local("/hardlink", "1:7")).unwrap_err();
        assert!(matches!(err, EntryError::DuplicateIdentifier { .. }));
        assert_eq!(err.path(), "/hardlink");
        assert_eq!(resolver.len(), 1);
    }

    fn linked(path: &str, native: &str, mode: u64, links: u64) -> RawEntry {
        let mut entry = local(path, native);
        entry.metadata.insert("st_mode".to_string(), json!(mode));
        entry.metadata.insert("st_nlink".to_string(), json!(links));
        entry
    }

    #[test]
    fn test_hard_links_get_one_identifier_each() {
        let mut resolver = IdentityResolver::new(Platform::Linux, "m");
        let a = resolver.resolve(&linked("/t/a/f", "1:9", 0o100644, 2)).unwrap();
        let b = resolver.resolve(&linked("/t/b/f", "1:9", 0o100644, 2)).unwrap();
        assert_ne!(a, b);

        let again = IdentityResolver::new(Platform::Linux, "m")
            .resolve(&linked("/t/b/f", "1:9", 0o100644, 2))
            .unwrap();
        assert_eq!(again, b);
    }

    #[test]
    fn test_directory_link_count_is_not_a_hard_link() {
        let mut resolver = IdentityResolver::new(Platform::Linux, "m");
        let dir = resolver.resolve(&linked("/t/a", "1:5", 0o040755, 3)).unwrap();
        assert_eq!(dir, resolver.synthesize("1:5"));
        assert!(resolver.resolve(&linked("/t/moved", "1:5", 0o040755, 3)).is_err());
    }

    #[test]
    fn test_provider_identifier_verbatim() {
        let mut resolver = IdentityResolver::new(Platform::Dropbox, "m");
        let id = "2c5fe0f7-2a5b-4c36-9a66-6bd0c6b1c0a1";
        let got = resolver.resolve(&cloud("/Docs", json!(id))).unwrap();
        assert_eq!(got.to_string(), id);
    }

    #[test]
    fn test_malformed_provider_identifier() {
        let mut resolver = IdentityResolver::new(Platform::ICloud, "m");
        for bad in [json!("not-a-uuid"), json!(17)] {
            let err = resolver.resolve(&cloud("/x", bad)).unwrap_err();
            assert!(matches!(err, EntryError::InvalidIdentifier { .. }));
        }
        let missing = local("/y", "");
        assert!(resolver.resolve(&missing).is_err());
        assert!(resolver.is_empty());
    }
}
