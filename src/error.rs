//! Error types surfaced by the inspection core

use std::path::PathBuf;
use thiserror::Error;

/// Faults that abort a single inspection
///
/// Everything else (unknown parts, malformed patterns, empty OCR output)
/// is folded into the [`InspectionResult`](crate::analysis::InspectionResult).
#[derive(Error, Debug)]
pub enum InspectError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Text engine failure: {0}")]
    Engine(String),
}

impl From<image::ImageError> for InspectError {
    fn from(err: image::ImageError) -> Self {
        InspectError::InvalidImage(err.to_string())
    }
}

/// Errors reading a knowledge-base record file
#[derive(Error, Debug)]
pub enum KbError {
    #[error("Failed to read record {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Record for '{part_id}' was unreadable when cached: {message}")]
    Unreadable { part_id: String, message: String },
}
