//! IC Marking Inspector - counterfeit screening for integrated circuits
//!
//! Reads the top marking of a package photo and compares it with the
//! expected markings for the claimed part, producing a three-way verdict
//! (`Genuine`, `Suspect`, `Reject`) with reason codes and a confidence score.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ic_marking_inspector::kb::KbStore;
//! use ic_marking_inspector::pipeline::Inspector;
//! use ic_marking_inspector::vision::{RecognitionConfig, TextEngine, TextRecognizer};
//!
//! # fn run(engine: impl TextEngine + 'static, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let inspector = Inspector::new(Arc::new(KbStore::new("kb")), TextRecognizer::new(engine));
//! let result = inspector.inspect(bytes, "LM7805", &RecognitionConfig::default())?;
//! println!("{}", serde_json::to_string(&result)?);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod batch;
pub mod config;
pub mod error;
pub mod kb;
pub mod pipeline;
pub mod storage;
pub mod vision;

pub use analysis::{decide, InspectionResult, ReasonCode, Verdict};
pub use error::{InspectError, KbError};
pub use pipeline::{decode_image, Inspector};
