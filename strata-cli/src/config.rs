//! Strata configuration loading from `strata.toml`.
//!
//! Configuration is optional. Without a file every setting falls back to its
//! default, and command-line flags override whatever the file says.
//!
//! # Example Configuration
//!
//! ```toml
//! [strata]
//! version = "1.0"
//! machine_id = "6f1c2a44-0d9e-4c55-9a52-3f4f0b1f7e21"
//!
//! [capture]
//! ignore = ["*.tmp", "node_modules"]
//! follow_symlinks = false
//! threads = 0
//! deadline_secs = 600
//!
//! [volumes]
//! C = "{2f0c6a4e-1f2b-11ef-9c1a-806e6f6e6963}"
//!
//! [ingest]
//! path_codec = "percent"
//! strict_duplicates = false
//!
//! [output]
//! data_dir = "./data"
//! file_prefix = "strata"
//! format = "table"
//! color = true
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use strata_core::capture::CaptureOptions;
use strata_core::path::PathCodec;
use strata_core::pipeline::IngestOptions;
use strata_core::types::Platform;
use strata_core::volume::StaticVolumeMap;

/// File name searched for in the working directory and the user config dir.
pub const CONFIG_FILE_NAME: &str = "strata.toml";

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_FILE_PREFIX: &str = "strata";
const DEFAULT_MACHINE_ID: &str = "local";

/// Root configuration structure loaded from `strata.toml`.
#[derive(Debug, Deserialize, Default)]
pub struct StrataConfig {
    /// General settings.
    #[serde(default)]
    pub strata: StrataSection,

    /// Local walk settings.
    #[serde(default)]
    pub capture: CaptureSettings,

    /// Drive letter to volume GUID, e.g. `C = "{...}"`.
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,

    /// Normalization and graph settings.
    #[serde(default)]
    pub ingest: IngestSettings,

    /// Where artifacts go and how results are shown.
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Deserialize, Default)]
pub struct StrataSection {
    /// Configuration schema version. Informational only.
    #[serde(default)]
    pub version: Option<String>,

    /// Identifier of this machine. When it parses as a UUID it is also written
    /// into artifact names.
    #[serde(default)]
    pub machine_id: Option<String>,
}

/// Local walk settings.
#[derive(Debug, Deserialize, Default)]
pub struct CaptureSettings {
    /// Glob patterns excluded from the walk.
    #[serde(default)]
    pub ignore: Vec<String>,

    #[serde(default)]
    pub follow_symlinks: bool,

    /// Walker threads. `0` lets the walker choose, `1` walks sequentially.
    #[serde(default)]
    pub threads: Option<usize>,

    /// Stop descending once the walk has run this long.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct IngestSettings {
    /// `percent` (default) or `legacy-tokens`.
    #[serde(default)]
    pub path_codec: PathCodec,

    /// Fail the run on duplicate directory paths.
    #[serde(default)]
    pub strict_duplicates: bool,
}

/// Output preferences. Command-line flags take precedence.
#[derive(Debug, Deserialize, Default)]
pub struct OutputSettings {
    /// Directory that receives index and ingest artifacts.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// First segment of every artifact file name.
    #[serde(default)]
    pub file_prefix: Option<String>,

    /// Default output format: `table` or `json`.
    #[serde(default)]
    pub format: Option<String>,

    /// Whether to use colored output. Unset means auto-detect.
    #[serde(default)]
    pub color: Option<bool>,
}

/// Find the configuration file to load.
///
/// An explicit path must exist. Otherwise `./strata.toml` is tried, then
/// `<user config dir>/strata/strata.toml`.
pub fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(Some(local));
    }

    Ok(dirs::config_dir()
        .map(|dir| dir.join("strata").join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file()))
}

impl StrataConfig {
    /// Load configuration, falling back to defaults.
    ///
    /// Read and parse errors are logged as warnings. With `strict` they fail
    /// the run instead.
    pub fn load(explicit: Option<&Path>, strict: bool) -> Result<Self> {
        let Some(path) = locate(explicit)? else {
            return Ok(Self::default());
        };
        match Self::from_file(&path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded configuration");
                Ok(config)
            }
            Err(e) if strict => Err(e),
            Err(e) => {
                tracing::warn!("{:#}", e);
                Ok(Self::default())
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn machine_id(&self) -> &str {
        self.strata.machine_id.as_deref().unwrap_or(DEFAULT_MACHINE_ID)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.output
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    pub fn file_prefix(&self) -> &str {
        self.output.file_prefix.as_deref().unwrap_or(DEFAULT_FILE_PREFIX)
    }

    /// Get the default output format, if configured.
    pub fn default_format(&self) -> Option<&str> {
        self.output.format.as_deref()
    }

    /// Returns the configured value, or `None` to use auto-detection.
    pub fn use_color(&self) -> Option<bool> {
        self.output.color
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            ignore_patterns: self.capture.ignore.clone(),
            follow_symlinks: self.capture.follow_symlinks,
            threads: self.capture.threads.unwrap_or(0),
            deadline: self.capture.deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn ingest_options(&self, platform: Option<Platform>) -> IngestOptions {
        IngestOptions {
            platform,
            machine_id: self.machine_id().to_string(),
            codec: self.ingest.path_codec,
            strict_duplicates: self.ingest.strict_duplicates,
        }
    }

    pub fn volume_map(&self) -> StaticVolumeMap {
        StaticVolumeMap::new(&self.volumes)
    }
}
