//! Knowledge Base
//!
//! Per-part expected-marking records loaded from a directory of YAML files.
//! The store is read-only: records are edited externally and never mutated
//! in-process.

pub mod record;
pub mod store;

pub use record::{KnowledgeBaseRecord, MarkingPatterns, PartSummary, PatternRule, RecordFile, RulePatterns};
pub use store::{CachedKbStore, KbStore, KnowledgeBase};

use strsim::normalized_levenshtein;

/// Minimum similarity for a known part to be offered as a suggestion
const SUGGESTION_THRESHOLD: f64 = 0.6;

/// Maximum number of suggestions returned
const MAX_SUGGESTIONS: usize = 3;

/// Suggest known part identifiers close to an unknown one
pub fn suggest_part_ids(parts: &[PartSummary], query: &str) -> Vec<String> {
    let query = query.to_lowercase();
    let mut scored: Vec<(f64, &str)> = parts
        .iter()
        .map(|p| (normalized_levenshtein(&query, &p.part_id.to_lowercase()), p.part_id.as_str()))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, id)| id.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(ids: &[&str]) -> Vec<PartSummary> {
        ids.iter().map(|id| PartSummary::unreadable(id)).collect()
    }

    #[test]
    fn test_suggest_close_match() {
        let known = parts(&["LM7805", "NE555", "ATMEGA328P"]);
        assert_eq!(suggest_part_ids(&known, "LM7806"), vec!["LM7805".to_string()]);
    }

    #[test]
    fn test_suggest_is_case_insensitive() {
        let known = parts(&["LM7805"]);
        assert_eq!(suggest_part_ids(&known, "lm7805"), vec!["LM7805".to_string()]);
    }

    #[test]
    fn test_suggest_nothing_for_unrelated() {
        let known = parts(&["LM7805", "NE555"]);
        assert!(suggest_part_ids(&known, "STM32F103").is_empty());
    }

    #[test]
    fn test_suggest_ordered_and_capped() {
        let known = parts(&["LM7805", "LM7806", "LM7808", "LM7809", "LM7812"]);
        let suggestions = suggest_part_ids(&known, "LM7805");
        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0], "LM7805");
    }
}
