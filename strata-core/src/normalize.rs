//! Platform normalizers.
//!
//! Each normalizer maps a platform's native attribute bits onto the same
//! shape ([`NormalizedAttrs`]) using a static lookup table. Directory
//! detection only ever looks at attribute bits or provider markers.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::EntryError;
use crate::types::{labels, Platform, RawEntry, Timestamp};

pub const S_IFMT: u64 = 0o170000;
pub const S_IFDIR: u64 = 0o040000;
pub const S_IFREG: u64 = 0o100000;

/// POSIX file type table, matched against `st_mode & S_IFMT`.
pub static POSIX_FILE_TYPES: &[(&str, u64)] = &[
    ("S_IFSOCK", 0o140000),
    ("S_IFLNK", 0o120000),
    ("S_IFREG", S_IFREG),
    ("S_IFBLK", 0o060000),
    ("S_IFDIR", S_IFDIR),
    ("S_IFCHR", 0o020000),
    ("S_IFIFO", 0o010000),
];

pub const FILE_ATTRIBUTE_DIRECTORY: u64 = 0x0000_0010;
pub const FILE_ATTRIBUTE_NORMAL: u64 = 0x0000_0080;

/// Windows `st_file_attributes` flag table.
pub static WINDOWS_FILE_ATTRIBUTES: &[(&str, u64)] = &[
    ("FILE_ATTRIBUTE_READONLY", 0x0000_0001),
    ("FILE_ATTRIBUTE_HIDDEN", 0x0000_0002),
    ("FILE_ATTRIBUTE_SYSTEM", 0x0000_0004),
    ("FILE_ATTRIBUTE_DIRECTORY", FILE_ATTRIBUTE_DIRECTORY),
    ("FILE_ATTRIBUTE_ARCHIVE", 0x0000_0020),
    ("FILE_ATTRIBUTE_DEVICE", 0x0000_0040),
    ("FILE_ATTRIBUTE_NORMAL", FILE_ATTRIBUTE_NORMAL),
    ("FILE_ATTRIBUTE_TEMPORARY", 0x0000_0100),
    ("FILE_ATTRIBUTE_SPARSE_FILE", 0x0000_0200),
    ("FILE_ATTRIBUTE_REPARSE_POINT", 0x0000_0400),
    ("FILE_ATTRIBUTE_COMPRESSED", 0x0000_0800),
    ("FILE_ATTRIBUTE_OFFLINE", 0x0000_1000),
    ("FILE_ATTRIBUTE_NOT_CONTENT_INDEXED", 0x0000_2000),
    ("FILE_ATTRIBUTE_ENCRYPTED", 0x0000_4000),
    ("FILE_ATTRIBUTE_INTEGRITY_STREAM", 0x0000_8000),
    ("FILE_ATTRIBUTE_VIRTUAL", 0x0001_0000),
    ("FILE_ATTRIBUTE_NO_SCRUB_DATA", 0x0002_0000),
    ("FILE_ATTRIBUTE_EA", 0x0004_0000),
    ("FILE_ATTRIBUTE_PINNED", 0x0008_0000),
    ("FILE_ATTRIBUTE_UNPINNED", 0x0010_0000),
    ("FILE_ATTRIBUTE_RECALL_ON_DATA_ACCESS", 0x0040_0000),
    ("FILE_ATTRIBUTE_STRICTLY_SEQUENTIAL", 0x2000_0000),
];

/// Attribute map key for POSIX flag names.
pub const UNIX_ATTRIBUTES_KEY: &str = "UnixFileAttributes";
/// Attribute map key for Windows flag names.
pub const WINDOWS_ATTRIBUTES_KEY: &str = "WindowsFileAttributes";

/// Platform-independent view of one entry's attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedAttrs {
    pub is_directory: bool,
    pub is_regular_file: bool,
    /// 0 for directories.
    pub size: u64,
    pub timestamps: Vec<Timestamp>,
    /// Matched flag names, keyed by the attribute map key they belong under.
    pub flags: Vec<(&'static str, Vec<&'static str>)>,
}

impl NormalizedAttrs {
    /// Flag names joined the way they are stored in the attribute map.
    pub fn flag_attributes(&self) -> Map<String, Value> {
        self.flags
            .iter()
            .map(|(key, names)| (key.to_string(), Value::String(names.join(" | "))))
            .collect()
    }
}

/// Maps a [`RawEntry`] to [`NormalizedAttrs`].
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &RawEntry) -> Result<NormalizedAttrs, EntryError>;
}

/// Normalizer for the given platform.
pub fn for_platform(platform: Platform) -> &'static dyn Normalizer {
    match platform {
        Platform::Linux | Platform::Mac => &PosixNormalizer,
        Platform::Windows => &WindowsNormalizer,
        Platform::Dropbox | Platform::ICloud => &CloudNormalizer,
    }
}

/// Windows flag names whose bits are fully set in `bits`.
pub fn windows_flag_names(bits: u64) -> Vec<&'static str> {
    if bits == 0 {
        return vec!["FILE_ATTRIBUTE_NORMAL"];
    }
    WINDOWS_FILE_ATTRIBUTES
        .iter()
        .filter(|(_, flag)| bits & flag == *flag)
        .map(|(name, _)| *name)
        .collect()
}

/// Name of the POSIX file type encoded in `mode`.
pub fn posix_type_name(mode: u64) -> Option<&'static str> {
    let file_type = mode & S_IFMT;
    POSIX_FILE_TYPES
        .iter()
        .find(|(_, value)| *value == file_type)
        .map(|(name, _)| *name)
}

fn u64_field(meta: &Map<String, Value>, key: &str) -> Option<u64> {
    meta.get(key).and_then(Value::as_u64)
}

fn epoch_field(meta: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let secs = meta.get(key)?.as_f64()?;
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

fn rfc3339_field(meta: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let text = meta.get(key)?.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// stat-style timestamps in canonical order. Missing fields are skipped.
fn stat_timestamps(meta: &Map<String, Value>) -> Vec<Timestamp> {
    [
        ("st_birthtime", labels::CREATED, "Created"),
        ("st_mtime", labels::MODIFIED, "Modified"),
        ("st_atime", labels::ACCESSED, "Accessed"),
        ("st_ctime", labels::CHANGED, "Changed"),
    ]
    .into_iter()
    .filter_map(|(key, label, description)| {
        epoch_field(meta, key).map(|value| Timestamp::new(label, value, description))
    })
    .collect()
}

/// Linux and macOS: `st_mode` file type bits.
#[derive(Clone, Copy, Debug, Default)]
pub struct PosixNormalizer;

impl Normalizer for PosixNormalizer {
    fn normalize(&self, raw: &RawEntry) -> Result<NormalizedAttrs, EntryError> {
        let mode = u64_field(&raw.metadata, "st_mode").ok_or_else(|| {
            EntryError::MalformedMetadata {
                path: raw.path.clone(),
                message: "missing st_mode".to_string(),
            }
        })?;
        let file_type = mode & S_IFMT;
        let is_directory = file_type == S_IFDIR;
        let size = if is_directory {
            0
        } else {
            u64_field(&raw.metadata, "st_size").unwrap_or(0)
        };
        let flags = posix_type_name(mode)
            .map(|name| vec![(UNIX_ATTRIBUTES_KEY, vec![name])])
            .unwrap_or_default();

        Ok(NormalizedAttrs {
            is_directory,
            is_regular_file: file_type == S_IFREG,
            size,
            timestamps: stat_timestamps(&raw.metadata),
            flags,
        })
    }
}

/// Windows: `st_file_attributes`, falling back to `st_mode` when absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowsNormalizer;

impl Normalizer for WindowsNormalizer {
    fn normalize(&self, raw: &RawEntry) -> Result<NormalizedAttrs, EntryError> {
        let Some(bits) = u64_field(&raw.metadata, "st_file_attributes") else {
            return PosixNormalizer.normalize(raw);
        };
        let is_directory = bits & FILE_ATTRIBUTE_DIRECTORY != 0;
        let size = if is_directory {
            0
        } else {
            u64_field(&raw.metadata, "st_size").unwrap_or(0)
        };
        let mut flags = vec![(WINDOWS_ATTRIBUTES_KEY, windows_flag_names(bits))];
        if let Some(name) = u64_field(&raw.metadata, "st_mode").and_then(posix_type_name) {
            flags.push((UNIX_ATTRIBUTES_KEY, vec![name]));
        }

        Ok(NormalizedAttrs {
            is_directory,
            is_regular_file: !is_directory && bits & 0x0000_0440 == 0,
            size,
            timestamps: stat_timestamps(&raw.metadata),
            flags,
        })
    }
}

/// Dropbox and iCloud: folder and file markers on the provider record.
#[derive(Clone, Copy, Debug, Default)]
pub struct CloudNormalizer;

impl CloudNormalizer {
    fn is_folder(meta: &Map<String, Value>) -> Option<bool> {
        if meta.contains_key("FolderMetadata") {
            return Some(true);
        }
        if meta.contains_key("FileMetadata") {
            return Some(false);
        }
        match meta.get(".tag").and_then(Value::as_str) {
            Some("folder") => Some(true),
            Some("file") => Some(false),
            _ => None,
        }
    }
}

impl Normalizer for CloudNormalizer {
    fn normalize(&self, raw: &RawEntry) -> Result<NormalizedAttrs, EntryError> {
        let is_directory =
            Self::is_folder(&raw.metadata).ok_or_else(|| EntryError::UnknownKind {
                path: raw.path.clone(),
            })?;

        let (size, timestamps) = if is_directory {
            (0, Vec::new())
        } else {
            let mut timestamps = Vec::new();
            if let Some(value) = rfc3339_field(&raw.metadata, "client_modified") {
                timestamps.push(Timestamp::new(labels::MODIFIED, value, "Client Modified"));
            }
            if let Some(value) = rfc3339_field(&raw.metadata, "server_modified") {
                timestamps.push(Timestamp::new(labels::CHANGED, value, "Server Modified"));
            }
            (u64_field(&raw.metadata, "size").unwrap_or(0), timestamps)
        };

        let (unix, windows) = if is_directory {
            ("S_IFDIR", "FILE_ATTRIBUTE_DIRECTORY")
        } else {
            ("S_IFREG", "FILE_ATTRIBUTE_NORMAL")
        };

        Ok(NormalizedAttrs {
            is_directory,
            is_regular_file: !is_directory,
            size,
            timestamps,
            flags: vec![
                (UNIX_ATTRIBUTES_KEY, vec![unix]),
                (WINDOWS_ATTRIBUTES_KEY, vec![windows]),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(meta: Value) -> RawEntry {
        RawEntry {
            path: "/x".to_string(),
            name: "x".to_string(),
            metadata: meta.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    #[test]
    fn test_posix_directory() {
        let raw = entry(json!({"st_mode": 0o040755, "st_size": 4096, "st_mtime": 1700000000.5}));
        let attrs = PosixNormalizer.normalize(&raw).unwrap();
        assert!(attrs.is_directory);
        assert!(!attrs.is_regular_file);
        assert_eq!(attrs.size, 0);
        assert_eq!(attrs.timestamps.len(), 1);
        assert_eq!(attrs.timestamps[0].label, labels::MODIFIED);
        assert_eq!(
            attrs.flag_attributes()[UNIX_ATTRIBUTES_KEY],
            Value::String("S_IFDIR".to_string())
        );
    }

    #[test]
    fn test_posix_mask_not_bitwise_and() {
        // A socket shares bits with both S_IFDIR and S_IFREG.
        let raw = entry(json!({"st_mode": 0o140777}));
        let attrs = PosixNormalizer.normalize(&raw).unwrap();
        assert!(!attrs.is_directory);
        assert!(!attrs.is_regular_file);
        assert_eq!(attrs.flags[0].1, vec!["S_IFSOCK"]);
    }

    #[test]
    fn test_posix_missing_mode() {
        let raw = entry(json!({"st_size": 10}));
        assert!(matches!(
            PosixNormalizer.normalize(&raw),
            Err(EntryError::MalformedMetadata { .. })
        ));
    }

    #[test]
    fn test_posix_timestamp_order() {
        let raw = entry(json!({
            "st_mode": 0o100644,
            "st_size": 12,
            "st_ctime": 3.0,
            "st_atime": 2.0,
            "st_mtime": 1.0,
            "st_birthtime": 0.0
        }));
        let attrs = PosixNormalizer.normalize(&raw).unwrap();
        let order: Vec<_> = attrs.timestamps.iter().map(|t| t.label).collect();
        assert_eq!(
            order,
            vec![labels::CREATED, labels::MODIFIED, labels::ACCESSED, labels::CHANGED]
        );
        assert_eq!(attrs.size, 12);
    }

    #[test]
    fn test_windows_flags() {
        assert_eq!(windows_flag_names(0), vec!["FILE_ATTRIBUTE_NORMAL"]);
        assert_eq!(
            windows_flag_names(0x11),
            vec!["FILE_ATTRIBUTE_READONLY", "FILE_ATTRIBUTE_DIRECTORY"]
        );

        let raw = entry(json!({"st_file_attributes": 0x10, "st_size": 99}));
        let attrs = WindowsNormalizer.normalize(&raw).unwrap();
        assert!(attrs.is_directory);
        assert_eq!(attrs.size, 0);
    }

    #[test]
    fn test_windows_falls_back_to_mode() {
        let raw = entry(json!({"st_mode": 0o100644, "st_size": 5}));
        let attrs = WindowsNormalizer.normalize(&raw).unwrap();
        assert!(attrs.is_regular_file);
        assert_eq!(attrs.size, 5);
        assert_eq!(attrs.flags[0].0, UNIX_ATTRIBUTES_KEY);
    }

    #[test]
    fn test_cloud_markers() {
        let folder = entry(json!({"FolderMetadata": {}, "path_display": "/Docs"}));
        assert!(CloudNormalizer.normalize(&folder).unwrap().is_directory);

        let file = entry(json!({
            ".tag": "file",
            "size": 42,
            "client_modified": "2023-01-02T03:04:05Z",
            "server_modified": "2023-01-02T03:04:06Z"
        }));
        let attrs = CloudNormalizer.normalize(&file).unwrap();
        assert!(!attrs.is_directory);
        assert_eq!(attrs.size, 42);
        assert_eq!(attrs.timestamps.len(), 2);
        assert_eq!(attrs.timestamps[0].description, "Client Modified");
        assert_eq!(attrs.timestamps[1].label, labels::CHANGED);

        let neither = entry(json!({"size": 1}));
        assert!(matches!(
            CloudNormalizer.normalize(&neither),
            Err(EntryError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let file = entry(json!({"FileMetadata": {}}));
        let attrs = CloudNormalizer.normalize(&file).unwrap();
        assert_eq!(attrs.size, 0);
        assert!(attrs.timestamps.is_empty());
    }
}
