//! Knowledge-base record schema
//!
//! One YAML file per part describes the expected top marking:
//!
//! ```yaml
//! oem: Texas Instruments
//! part_number: LM7805CT
//! patterns:
//!   part_code: "^LM7805"
//!   date_code: "\\d{4}"
//!   lot_code: ""
//! logo_hint: TI
//! ```
//!
//! Patterns are compiled once when the record is loaded. A pattern that does
//! not compile is kept as [`PatternRule::Malformed`] and always fails its rule.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::warn;

use crate::error::KbError;

/// Raw marking patterns as written in a record file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkingPatterns {
    #[serde(default, deserialize_with = "scalar_string")]
    pub part_code: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub date_code: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub lot_code: Option<String>,
}

/// On-disk shape of a record file
///
/// Unknown keys are ignored so records can carry extra operator notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFile {
    #[serde(default, deserialize_with = "scalar_string")]
    pub oem: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub part_number: Option<String>,
    #[serde(default)]
    pub patterns: Option<MarkingPatterns>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub logo_hint: Option<String>,
}

/// Accept any YAML scalar as a string (part numbers like `7805` parse as ints)
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_yaml::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a scalar value, found {:?}",
            other
        ))),
    }
}

/// A single compiled marking rule
#[derive(Debug, Clone)]
pub enum PatternRule {
    /// Pattern absent or empty; the rule always passes
    NotEnforced,
    /// Valid regular expression, evaluated with search semantics
    Compiled(Regex),
    /// Pattern failed to compile; the rule always fails
    Malformed { pattern: String, error: String },
}

impl PatternRule {
    /// Compile an optional pattern string
    pub fn compile(pattern: Option<&str>) -> Self {
        match pattern {
            None | Some("") => PatternRule::NotEnforced,
            Some(p) => match Regex::new(p) {
                Ok(re) => PatternRule::Compiled(re),
                Err(e) => PatternRule::Malformed {
                    pattern: p.to_string(),
                    error: e.to_string(),
                },
            },
        }
    }

    /// Whether the rule contributes a reason code when it fails
    pub fn is_enforced(&self) -> bool {
        !matches!(self, PatternRule::NotEnforced)
    }

    /// Whether `text` satisfies the rule (any substring match passes)
    pub fn matches(&self, text: &str) -> bool {
        match self {
            PatternRule::NotEnforced => true,
            PatternRule::Compiled(re) => re.is_match(text),
            PatternRule::Malformed { .. } => false,
        }
    }

    /// The pattern source, if any
    pub fn source(&self) -> Option<&str> {
        match self {
            PatternRule::NotEnforced => None,
            PatternRule::Compiled(re) => Some(re.as_str()),
            PatternRule::Malformed { pattern, .. } => Some(pattern),
        }
    }
}

/// Compiled rules for the three marking fields
#[derive(Debug, Clone)]
pub struct RulePatterns {
    pub part_code: PatternRule,
    pub date_code: PatternRule,
    pub lot_code: PatternRule,
}

impl Default for RulePatterns {
    fn default() -> Self {
        Self {
            part_code: PatternRule::NotEnforced,
            date_code: PatternRule::NotEnforced,
            lot_code: PatternRule::NotEnforced,
        }
    }
}

/// Expected marking specification for one part
#[derive(Debug, Clone)]
pub struct KnowledgeBaseRecord {
    /// Identifier derived from the record's file stem
    pub part_id: String,
    /// Manufacturer, descriptive only
    pub oem: String,
    /// Manufacturer part number, descriptive only
    pub part_number: String,
    /// Compiled marking rules
    pub patterns: RulePatterns,
    /// Substring that must appear in the marking (case-insensitive)
    pub logo_hint: Option<String>,
}

impl KnowledgeBaseRecord {
    /// Build a record from its parsed file contents
    pub fn from_file(part_id: &str, file: RecordFile) -> Self {
        let patterns = file.patterns.unwrap_or_default();
        let record = Self {
            part_id: part_id.to_string(),
            oem: file.oem.unwrap_or_default(),
            part_number: file.part_number.unwrap_or_default(),
            patterns: RulePatterns {
                part_code: PatternRule::compile(patterns.part_code.as_deref()),
                date_code: PatternRule::compile(patterns.date_code.as_deref()),
                lot_code: PatternRule::compile(patterns.lot_code.as_deref()),
            },
            logo_hint: file.logo_hint.filter(|hint| !hint.is_empty()),
        };

        for (field, rule) in record.rules() {
            if let PatternRule::Malformed { pattern, error } = rule {
                warn!(
                    "Part '{}': {} pattern {:?} is not a valid regex ({}); rule will always fail",
                    part_id, field, pattern, error
                );
            }
        }

        record
    }

    /// Parse a record from YAML text
    pub fn from_yaml(part_id: &str, yaml: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file is a record with no rules
        if yaml.trim().is_empty() {
            return Ok(Self::from_file(part_id, RecordFile::default()));
        }
        let file: Option<RecordFile> = serde_yaml::from_str(yaml)?;
        Ok(Self::from_file(part_id, file.unwrap_or_default()))
    }

    /// Read and parse a record file
    pub fn read(part_id: &str, path: &Path) -> Result<Self, KbError> {
        let content = std::fs::read_to_string(path).map_err(|source| KbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(part_id, &content).map_err(|source| KbError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The three pattern rules in evaluation order, with their field names
    pub fn rules(&self) -> [(&'static str, &PatternRule); 3] {
        [
            ("part_code", &self.patterns.part_code),
            ("date_code", &self.patterns.date_code),
            ("lot_code", &self.patterns.lot_code),
        ]
    }

    /// Metadata entry used by listings
    pub fn summary(&self) -> PartSummary {
        PartSummary {
            part_id: self.part_id.clone(),
            oem: self.oem.clone(),
            part_number: self.part_number.clone(),
        }
    }
}

/// Listing entry for part selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSummary {
    pub part_id: String,
    pub oem: String,
    pub part_number: String,
}

impl PartSummary {
    /// Entry for a record that could not be parsed
    pub fn unreadable(part_id: &str) -> Self {
        Self {
            part_id: part_id.to_string(),
            oem: String::new(),
            part_number: String::new(),
        }
    }
}
