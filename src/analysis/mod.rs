//! Analysis Layer
//!
//! Rule evaluation and verdict classification for recognized markings.

pub mod decision;
pub mod rules;
pub mod verdict;

pub use decision::{classify, composite_confidence, decide};
pub use rules::{evaluate_rules, MarkingRule, RuleResult};
pub use verdict::{Extracted, InspectionResult, ReasonCode, Scores, Verdict};
