//! Shared record types for the catalog pipeline.
//!
//! Field names on the serialized records are PascalCase because they are the
//! load-ready wire shape consumed by the external bulk loader.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StrataError;
use crate::path::PathStyle;

/// Semantic timestamp labels.
pub mod labels {
    use uuid::Uuid;

    pub const CREATED: Uuid = Uuid::from_u128(0x6b3f16ec_52d2_4e9b_afd0_e02a875ec6e6);
    pub const MODIFIED: Uuid = Uuid::from_u128(0x434f7ac1_f71a_4cea_a830_e2ea9a47db5a);
    pub const ACCESSED: Uuid = Uuid::from_u128(0x581b5332_4d37_49c7_892a_854824f5d66f);
    pub const CHANGED: Uuid = Uuid::from_u128(0x3bdc4130_774f_4e99_914e_0bec9ee47aab);
}

/// Relationship UUID for a directory containing an object.
pub const DIRECTORY_CONTAINS: Uuid = Uuid::from_u128(0xcde81295_f171_45be_8607_8100f4611430);

/// Relationship UUID for an object contained by a directory.
pub const CONTAINED_BY_DIRECTORY: Uuid = Uuid::from_u128(0x3d4b772d_b4b0_4203_a410_ecac5dc6dafa);

/// Source platform of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Mac,
    Windows,
    Dropbox,
    #[serde(rename = "icloud")]
    ICloud,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Linux,
        Platform::Mac,
        Platform::Windows,
        Platform::Dropbox,
        Platform::ICloud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Mac => "mac",
            Platform::Windows => "windows",
            Platform::Dropbox => "dropbox",
            Platform::ICloud => "icloud",
        }
    }

    /// Platform of the machine this binary runs on.
    pub fn host() -> Platform {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Mac
        } else {
            Platform::Linux
        }
    }

    pub fn is_cloud(&self) -> bool {
        matches!(self, Platform::Dropbox | Platform::ICloud)
    }

    pub fn path_style(&self) -> PathStyle {
        match self {
            Platform::Windows => PathStyle::Windows,
            _ => PathStyle::Posix,
        }
    }

    /// Identifier of the ingester that produces records for this platform.
    pub fn ingester_id(&self) -> Uuid {
        match self {
            Platform::Linux => Uuid::from_u128(0xbef019bf_b762_4297_bbe2_bf79a65027ae),
            Platform::Mac => Uuid::from_u128(0x07670255_1e82_4079_ad6f_f2bb39f44f8f),
            Platform::Windows => Uuid::from_u128(0x429f1f3c_7a21_463f_b7aa_cd731bb202b1),
            Platform::Dropbox => Uuid::from_u128(0x389ce9e0_3924_4cd1_be8d_5dc4b268e668),
            Platform::ICloud => Uuid::from_u128(0xc2b887b3_2a2f_4fbf_83dd_062743f31477),
        }
    }

    /// Web URI for a cloud path. `None` for local platforms.
    pub fn cloud_uri(&self, path: &str) -> Option<String> {
        match self {
            Platform::Dropbox => Some(format!("https://www.dropbox.com/home{}", path)),
            Platform::ICloud => Some(format!("https://www.icloud.com/iclouddrive{}", path)),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" | "unix" => Ok(Platform::Linux),
            "mac" | "macos" | "darwin" => Ok(Platform::Mac),
            "windows" | "win32" => Ok(Platform::Windows),
            "dropbox" => Ok(Platform::Dropbox),
            "icloud" => Ok(Platform::ICloud),
            _ => Err(StrataError::UnknownPlatform {
                name: s.to_string(),
            }),
        }
    }
}

/// One captured file-system entry, exactly as the platform reported it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawEntry {
    /// Native path of the entry.
    pub path: String,

    /// Native path of the parent directory. When absent it is derived from
    /// `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Final path component. Empty means "take it from `path`".
    #[serde(default)]
    pub name: String,

    /// Native identifier (`dev:ino` on Unix, provider id in the cloud).
    #[serde(default)]
    pub local_identifier: String,

    /// Pre-computed URI, when capture could resolve one.
    #[serde(rename = "URI", default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Volume GUID the entry lives on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,

    /// Native metadata blob (stat fields or provider record).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A labeled point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Timestamp {
    pub label: Uuid,
    pub value: DateTime<Utc>,
    pub description: String,
}

impl Timestamp {
    pub fn new(label: Uuid, value: DateTime<Utc>, description: &str) -> Self {
        Self {
            label,
            value,
            description: description.to_string(),
        }
    }
}

/// Who produced a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceDescriptor {
    pub identifier: Uuid,
    pub version: String,
}

impl SourceDescriptor {
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            identifier: platform.ingester_id(),
            version: "1.0".to_string(),
        }
    }
}

/// Canonical catalog record for one file-system entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageObject {
    pub object_identifier: Uuid,
    pub label: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<String>,
    pub local_identifier: String,
    #[serde(rename = "URI")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    pub size: u64,
    pub timestamps: Vec<Timestamp>,
    pub attributes: Map<String, Value>,
    /// base64 of the MessagePack-encoded native metadata.
    pub raw_data: String,
    pub is_directory: bool,
    pub source: SourceDescriptor,
}

/// Direction of a containment edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Contains,
    ContainedBy,
}

impl EdgeKind {
    pub fn relationship(&self) -> Uuid {
        match self {
            EdgeKind::Contains => DIRECTORY_CONTAINS,
            EdgeKind::ContainedBy => CONTAINED_BY_DIRECTORY,
        }
    }
}

/// A directed containment relationship between two objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainmentEdge {
    pub kind: EdgeKind,
    pub source: Uuid,
    pub target: Uuid,
    pub relationship: Uuid,
    pub descriptor: SourceDescriptor,
}

impl ContainmentEdge {
    /// Parent directory -> child.
    pub fn contains(parent: Uuid, child: Uuid, descriptor: SourceDescriptor) -> Self {
        Self {
            kind: EdgeKind::Contains,
            source: parent,
            target: child,
            relationship: DIRECTORY_CONTAINS,
            descriptor,
        }
    }

    /// Child -> parent directory.
    pub fn contained_by(child: Uuid, parent: Uuid, descriptor: SourceDescriptor) -> Self {
        Self {
            kind: EdgeKind::ContainedBy,
            source: child,
            target: parent,
            relationship: CONTAINED_BY_DIRECTORY,
            descriptor,
        }
    }
}

/// Counters for one pipeline invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub input_count: usize,
    pub dir_count: usize,
    pub file_count: usize,
    pub edge_count: usize,
    pub orphan_count: usize,
    pub root_count: usize,
    pub error_count: usize,
    pub duplicate_dir_count: usize,
    pub output_count: usize,
}

impl RunCounters {
    /// Objects that made it into the catalog.
    pub fn object_count(&self) -> usize {
        self.dir_count + self.file_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse() {
        assert_eq!("linux".parse::<Platform>().unwrap(), Platform::Linux);
        assert_eq!("Darwin".parse::<Platform>().unwrap(), Platform::Mac);
        assert_eq!("icloud".parse::<Platform>().unwrap(), Platform::ICloud);
        assert!("amiga".parse::<Platform>().is_err());
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
    }

    #[test]
    fn test_cloud_uri() {
        assert_eq!(
            Platform::Dropbox.cloud_uri("/Docs/a.txt").as_deref(),
            Some("https://www.dropbox.com/home/Docs/a.txt")
        );
        assert!(Platform::Linux.cloud_uri("/x").is_none());
        assert!(Platform::ICloud.is_cloud());
        assert!(!Platform::Windows.is_cloud());
    }

    #[test]
    fn test_edge_constructors() {
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();
        let src = SourceDescriptor::for_platform(Platform::Linux);

        let down = ContainmentEdge::contains(parent, child, src.clone());
        assert_eq!(down.kind, EdgeKind::Contains);
        assert_eq!(down.source, parent);
        assert_eq!(down.relationship, EdgeKind::Contains.relationship());

        let up = ContainmentEdge::contained_by(child, parent, src);
        assert_eq!(up.source, child);
        assert_eq!(up.target, parent);
        assert_eq!(
            up.relationship.to_string(),
            "3d4b772d-b4b0-4203-a410-ecac5dc6dafa"
        );
    }

    #[test]
    fn test_label_constants() {
        assert_eq!(
            labels::MODIFIED.to_string(),
            "434f7ac1-f71a-4cea-a830-e2ea9a47db5a"
        );
        assert_eq!(
            DIRECTORY_CONTAINS.to_string(),
            "cde81295-f171-45be-8607-8100f4611430"
        );
    }

    #[test]
    fn test_raw_entry_wire_shape() {
        let entry = RawEntry {
            path: "/a/b".to_string(),
            parent: Some("/a".to_string()),
            name: "b".to_string(),
            local_identifier: "1:2".to_string(),
            uri: Some("file:///a/b".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["URI"], "file:///a/b");
        assert_eq!(json["LocalIdentifier"], "1:2");
        assert!(json.get("Volume").is_none());
        let back: RawEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_raw_entry_minimal_record() {
        let entry: RawEntry = serde_json::from_str(
            r#"{"Path":"/root/sub/b.txt","LocalIdentifier":"1:3","Metadata":{"st_mode":33188}}"#,
        )
        .unwrap();
        assert!(entry.parent.is_none());
        assert!(entry.name.is_empty());
        assert_eq!(entry.metadata["st_mode"], 33188);
    }
}
