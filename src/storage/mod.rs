//! Storage Layer
//!
//! Platform directories and the inspection history log.

pub mod history;

pub use history::{HistoryEntry, HistoryLog, HISTORY_FILE_NAME};

use anyhow::Result;
use std::path::PathBuf;

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "icmarking", "ic-marking-inspector")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
///
/// Not created; a missing directory just means no config file.
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Default location of the history log
pub fn default_history_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(HISTORY_FILE_NAME))
}
