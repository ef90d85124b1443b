//! Marking rules evaluated against recognized text

use super::verdict::ReasonCode;
use crate::kb::{KnowledgeBaseRecord, PatternRule};
use tracing::debug;

/// A marking check, listed in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkingRule {
    PartCode,
    DateCode,
    LotCode,
    Logo,
}

impl MarkingRule {
    /// Fixed evaluation order; reason codes follow it
    pub const ORDER: [MarkingRule; 4] = [
        MarkingRule::PartCode,
        MarkingRule::DateCode,
        MarkingRule::LotCode,
        MarkingRule::Logo,
    ];

    /// Reason code emitted when this rule fails
    pub fn failure_code(self) -> ReasonCode {
        match self {
            MarkingRule::PartCode => ReasonCode::PartCodeFail,
            MarkingRule::DateCode => ReasonCode::DateCodeFail,
            MarkingRule::LotCode => ReasonCode::LotCodeFail,
            MarkingRule::Logo => ReasonCode::LogoFail,
        }
    }
}

/// Result of evaluating one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleResult {
    pub rule: MarkingRule,
    /// Whether the record configures this rule at all
    pub enforced: bool,
    /// Unenforced rules always pass
    pub passed: bool,
}

impl RuleResult {
    /// Whether this result counts as a penalty
    pub fn failed(&self) -> bool {
        self.enforced && !self.passed
    }
}

/// Evaluate every rule of `record` against uppercased text
pub fn evaluate_rules(text_upper: &str, record: &KnowledgeBaseRecord) -> [RuleResult; 4] {
    MarkingRule::ORDER.map(|rule| match rule {
        MarkingRule::PartCode => pattern_result(rule, &record.patterns.part_code, text_upper, record),
        MarkingRule::DateCode => pattern_result(rule, &record.patterns.date_code, text_upper, record),
        MarkingRule::LotCode => pattern_result(rule, &record.patterns.lot_code, text_upper, record),
        MarkingRule::Logo => match &record.logo_hint {
            None => RuleResult { rule, enforced: false, passed: true },
            Some(hint) => RuleResult {
                rule,
                enforced: true,
                passed: text_upper.contains(&hint.to_uppercase()),
            },
        },
    })
}

fn pattern_result(
    rule: MarkingRule,
    pattern: &PatternRule,
    text_upper: &str,
    record: &KnowledgeBaseRecord,
) -> RuleResult {
    if let PatternRule::Malformed { pattern, error } = pattern {
        debug!(
            "Part '{}': {:?} rule failed on malformed pattern {:?} ({})",
            record.part_id, rule, pattern, error
        );
    }
    RuleResult {
        rule,
        enforced: pattern.is_enforced(),
        passed: pattern.matches(text_upper),
    }
}
