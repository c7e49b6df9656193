//! Drive-letter to volume resolution and URI construction.

use std::collections::HashMap;

use tracing::debug;

use crate::path::drive_prefix;

/// Looks up the stable volume GUID for a drive letter.
pub trait VolumeResolver: Send + Sync {
    /// Bare GUID (no braces) for `drive`, or `None` if it cannot be resolved.
    fn volume_guid(&self, drive: char) -> Option<String>;
}

/// Resolver that never finds a volume. Every drive falls back to its letter.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoVolumes;

impl VolumeResolver for NoVolumes {
    fn volume_guid(&self, _drive: char) -> Option<String> {
        None
    }
}

/// Resolver backed by a fixed drive -> GUID table, usually from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticVolumeMap {
    volumes: HashMap<char, String>,
}

impl StaticVolumeMap {
    /// Build from `("C", "{guid}")`-style pairs. Keys that are not a single
    /// letter (optionally followed by `:`) are ignored.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut volumes = HashMap::new();
        for (key, guid) in pairs {
            let key = key.as_ref().trim_end_matches(':');
            let mut chars = key.chars();
            if let (Some(letter), None) = (chars.next(), chars.next()) {
                if letter.is_ascii_alphabetic() {
                    let guid = guid
                        .as_ref()
                        .trim_start_matches('{')
                        .trim_end_matches('}')
                        .to_string();
                    volumes.insert(letter.to_ascii_uppercase(), guid);
                }
            }
        }
        Self { volumes }
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

impl VolumeResolver for StaticVolumeMap {
    fn volume_guid(&self, drive: char) -> Option<String> {
        self.volumes.get(&drive.to_ascii_uppercase()).cloned()
    }
}

/// URI and volume resolved for one path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub uri: String,
    pub volume: Option<String>,
}

/// Remembers the last drive seen so consecutive entries on the same drive
/// share one volume lookup.
///
/// Each capture worker owns its own tracker.
#[derive(Debug, Default)]
pub struct DriveTracker {
    last_drive: Option<char>,
    last_prefix: String,
    last_volume: Option<String>,
    lookups: usize,
}

impl DriveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resolver calls made so far.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Resolve the URI for a native path.
    ///
    /// Drive paths become `\\?\Volume{GUID}\rest` when the volume is known and
    /// `\\?\C:\rest` otherwise. Everything else becomes a `file://` URI.
    pub fn resolve(&mut self, native: &str, resolver: &dyn VolumeResolver) -> ResolvedLocation {
        let Some(drive) = drive_prefix(native) else {
            return ResolvedLocation {
                uri: format!("file://{}", native),
                volume: None,
            };
        };

        if self.last_drive != Some(drive) {
            self.lookups += 1;
            self.last_volume = resolver.volume_guid(drive);
            self.last_prefix = match &self.last_volume {
                Some(guid) => format!("\\\\?\\Volume{{{}}}\\", guid),
                None => format!("\\\\?\\{}:", drive),
            };
            self.last_drive = Some(drive);
            debug!(drive = %drive, volume = ?self.last_volume, "resolved drive");
        }

        let rest = &native[2..];
        let uri = if self.last_volume.is_some() {
            format!("{}{}", self.last_prefix, rest.trim_start_matches(['\\', '/']))
        } else {
            format!("{}{}", self.last_prefix, rest)
        };
        ResolvedLocation {
            uri,
            volume: self.last_volume.clone(),
        }
    }
}
