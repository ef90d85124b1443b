//! Inspection outcome types
//!
//! The serialized shape of [`InspectionResult`] is the compatibility contract
//! for clients rendering results:
//!
//! ```json
//! {"verdict": "Suspect", "reason_codes": ["RULE_LOGO_FAIL"],
//!  "scores": {"ocr_conf": 0.9, "final_conf": 0.618},
//!  "bbox": [128, 96, 384, 288], "extracted": {"text": "LM7805 XX"}}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::vision::BoundingBox;

/// Three-way authenticity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Genuine,
    Suspect,
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Genuine => "Genuine",
            Verdict::Suspect => "Suspect",
            Verdict::Reject => "Reject",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of a failed check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    #[serde(rename = "KB_PART_UNKNOWN")]
    KbPartUnknown,
    #[serde(rename = "RULE_PARTCODE_FAIL")]
    PartCodeFail,
    #[serde(rename = "RULE_DATECODE_FAIL")]
    DateCodeFail,
    #[serde(rename = "RULE_LOTCODE_FAIL")]
    LotCodeFail,
    #[serde(rename = "RULE_LOGO_FAIL")]
    LogoFail,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::KbPartUnknown => "KB_PART_UNKNOWN",
            ReasonCode::PartCodeFail => "RULE_PARTCODE_FAIL",
            ReasonCode::DateCodeFail => "RULE_DATECODE_FAIL",
            ReasonCode::LotCodeFail => "RULE_LOTCODE_FAIL",
            ReasonCode::LogoFail => "RULE_LOGO_FAIL",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence scores, both in [0, 1]
///
/// Empty for unknown parts, where no scoring takes place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// Raw recognizer confidence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_conf: Option<f64>,
    /// Composite score after rule penalties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_conf: Option<f64>,
}

/// Text pulled from the marking region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extracted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Result of one inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionResult {
    pub verdict: Verdict,
    /// Failed checks in evaluation order
    pub reason_codes: Vec<ReasonCode>,
    pub scores: Scores,
    /// Marking region in original-image coordinates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub extracted: Extracted,
}

impl InspectionResult {
    /// Result for a part with no knowledge-base record
    pub fn unknown_part() -> Self {
        Self {
            verdict: Verdict::Suspect,
            reason_codes: vec![ReasonCode::KbPartUnknown],
            scores: Scores::default(),
            bbox: None,
            extracted: Extracted::default(),
        }
    }

    /// Attach the region the text was read from
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Composite score, 0.0 when the part was not scored
    pub fn final_conf(&self) -> f64 {
        self.scores.final_conf.unwrap_or(0.0)
    }

    /// Reason codes joined by spaces
    pub fn reasons_joined(&self) -> String {
        self.reason_codes
            .iter()
            .map(ReasonCode::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
