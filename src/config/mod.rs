//! Application Configuration
//!
//! User settings stored in TOML format. Every section has defaults, so a
//! partial file (or none at all) is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::vision::{PageSegMode, RecognitionConfig, DEFAULT_CROP_MARGIN, DEFAULT_WHITELIST};

/// Name of the config file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Knowledge base location
    pub knowledge_base: KnowledgeBaseSettings,
    /// Default recognition options
    pub recognition: RecognitionSettings,
    /// OCR engine settings
    pub engine: EngineSettings,
    /// Marking region settings
    pub region: RegionSettings,
    /// Batch settings
    pub batch: BatchSettings,
    /// Inspection history
    pub history: HistorySettings,
}

/// Knowledge base settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseSettings {
    /// Directory holding one YAML record per part
    pub dir: PathBuf,
    /// Load all records once and serve lookups from memory
    pub cache: bool,
}

impl Default for KnowledgeBaseSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("kb"),
            cache: false,
        }
    }
}

/// Recognition defaults, overridable per command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Page segmentation mode (6, 7, 8, 11 or 13)
    pub psm: PageSegMode,
    /// Adaptive threshold instead of Otsu
    pub adaptive_threshold: bool,
    /// Characters the engine may emit
    pub whitelist: String,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            psm: PageSegMode::Block,
            adaptive_threshold: true,
            whitelist: DEFAULT_WHITELIST.to_string(),
        }
    }
}

impl RecognitionSettings {
    pub fn to_recognition_config(&self) -> RecognitionConfig {
        RecognitionConfig {
            psm: self.psm,
            use_adaptive_threshold: self.adaptive_threshold,
            char_whitelist: self.whitelist.clone(),
        }
    }
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Tesseract language code
    pub language: String,
    /// Tessdata directory; system default when unset
    pub datapath: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            datapath: None,
        }
    }
}

/// Marking region settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    /// Fraction cut from each side of the image
    pub margin: f64,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            margin: DEFAULT_CROP_MARGIN,
        }
    }
}

/// Batch settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Worker threads; 0 uses available parallelism
    pub workers: usize,
}

/// History settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Append each inspection to the history log
    pub enabled: bool,
    /// Log file; defaults to history.jsonl in the data directory
    pub path: Option<PathBuf>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Write the default configuration to `path`
///
/// Creates missing parent directories. An existing file is left alone
/// unless `overwrite` is set; returns whether the file was written.
pub fn write_default_config(path: &Path, overwrite: bool) -> Result<bool> {
    if path.exists() && !overwrite {
        info!("Config {:?} already exists, not overwriting", path);
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    save_config(&AppConfig::default(), path)
        .with_context(|| format!("Failed to write config {:?}", path))?;
    info!("Wrote default config to {:?}", path);
    Ok(true)
}

/// Resolve the active configuration
///
/// An explicit path must exist and parse. Otherwise the file in the config
/// directory is used when present, and defaults when it is not.
pub fn resolve_config(explicit: Option<&Path>, config_dir: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        info!("Loading config from {:?}", path);
        return load_config(path).with_context(|| format!("Failed to load config {:?}", path));
    }

    if let Some(dir) = config_dir {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            info!("Loading config from {:?}", path);
            return load_config(&path).with_context(|| format!("Failed to load config {:?}", path));
        }
    }

    debug!("No config file found, using defaults");
    Ok(AppConfig::default())
}
