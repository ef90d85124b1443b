//! Decision engine
//!
//! Scores recognized text against a knowledge-base record and classifies the
//! outcome. The engine is a pure function: it never fails, and malformed or
//! missing configuration degrades to "rule not enforced" or "rule failed".

use tracing::debug;

use super::rules::evaluate_rules;
use super::verdict::{Extracted, InspectionResult, ReasonCode, Scores, Verdict};
use crate::kb::KnowledgeBaseRecord;

/// Base trust when the part-code rule passes
pub const BASE_PART_CODE_PASS: f64 = 0.8;
/// Base trust when the part-code rule fails
pub const BASE_PART_CODE_FAIL: f64 = 0.4;
/// Share of the base that is granted regardless of recognizer confidence
pub const BASE_FLOOR: f64 = 0.6;
/// Share of the base scaled by recognizer confidence
pub const OCR_WEIGHT: f64 = 0.4;
/// Deduction per failed rule
pub const PENALTY_PER_FAILURE: f64 = 0.15;
/// Minimum composite score for a clean Genuine verdict
pub const GENUINE_THRESHOLD: f64 = 0.75;
/// Minimum composite score for a Suspect verdict
pub const SUSPECT_THRESHOLD: f64 = 0.5;
/// Most rule failures still compatible with a Suspect verdict
pub const SUSPECT_MAX_PENALTIES: usize = 1;

/// Decide on a marking
///
/// `record` is `None` for parts missing from the knowledge base, which are
/// flagged Suspect with [`ReasonCode::KbPartUnknown`] rather than rejected.
pub fn decide(text: &str, record: Option<&KnowledgeBaseRecord>, ocr_conf: f64) -> InspectionResult {
    let Some(record) = record else {
        return InspectionResult::unknown_part();
    };

    let ocr_conf = sanitize_confidence(ocr_conf);
    let text_upper = text.to_uppercase();

    let results = evaluate_rules(&text_upper, record);
    let part_code_passed = results[0].passed;
    let reason_codes: Vec<ReasonCode> = results
        .iter()
        .filter(|r| r.failed())
        .map(|r| r.rule.failure_code())
        .collect();

    let penalties = reason_codes.len();
    let final_conf = composite_confidence(part_code_passed, ocr_conf, penalties);
    let verdict = classify(penalties, final_conf);

    debug!(
        "Part '{}': verdict={} final_conf={:.3} ocr_conf={:.3} penalties={}",
        record.part_id, verdict, final_conf, ocr_conf, penalties
    );

    InspectionResult {
        verdict,
        reason_codes,
        scores: Scores {
            ocr_conf: Some(ocr_conf),
            final_conf: Some(final_conf),
        },
        bbox: None,
        extracted: Extracted {
            text: Some(text.to_string()),
        },
    }
}

/// Composite score, clamped to [0, 1]
pub fn composite_confidence(part_code_passed: bool, ocr_conf: f64, penalties: usize) -> f64 {
    let base = if part_code_passed {
        BASE_PART_CODE_PASS
    } else {
        BASE_PART_CODE_FAIL
    };
    let raw = base * (BASE_FLOOR + OCR_WEIGHT * ocr_conf) - PENALTY_PER_FAILURE * penalties as f64;
    raw.clamp(0.0, 1.0)
}

/// Map penalties and composite score to a verdict (first match wins)
pub fn classify(penalties: usize, final_conf: f64) -> Verdict {
    if penalties == 0 && final_conf >= GENUINE_THRESHOLD {
        Verdict::Genuine
    } else if penalties <= SUSPECT_MAX_PENALTIES && final_conf >= SUSPECT_THRESHOLD {
        Verdict::Suspect
    } else {
        Verdict::Reject
    }
}

/// Clamp recognizer confidence into [0, 1]; NaN counts as no confidence
fn sanitize_confidence(conf: f64) -> f64 {
    if conf.is_nan() {
        0.0
    } else {
        conf.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn record(yaml: &str) -> KnowledgeBaseRecord {
        KnowledgeBaseRecord::from_yaml("TEST", yaml).unwrap()
    }

    fn lm7805_with_logo() -> KnowledgeBaseRecord {
        record("patterns:\n  part_code: \"^LM7805\"\nlogo_hint: TI\n")
    }

    #[test]
    fn test_scenario_genuine() {
        let result = decide("LM7805TI DATE2024", Some(&lm7805_with_logo()), 1.0);
        assert_eq!(result.verdict, Verdict::Genuine);
        assert!(result.reason_codes.is_empty());
        assert!((result.final_conf() - 0.8).abs() < EPS);
        assert_eq!(result.scores.ocr_conf, Some(1.0));
        assert_eq!(result.extracted.text.as_deref(), Some("LM7805TI DATE2024"));
    }

    #[test]
    fn test_scenario_logo_missing_is_suspect() {
        let result = decide("LM7805 XX", Some(&lm7805_with_logo()), 0.9);
        assert_eq!(result.verdict, Verdict::Suspect);
        assert_eq!(result.reason_codes, vec![ReasonCode::LogoFail]);
        assert!((result.final_conf() - 0.618).abs() < EPS);
    }

    #[test]
    fn test_scenario_wrong_part_code_is_reject() {
        let rec = record("patterns:\n  part_code: \"^LM7805\"\n");
        let result = decide("WRONG123", Some(&rec), 0.5);
        assert_eq!(result.verdict, Verdict::Reject);
        assert_eq!(result.reason_codes, vec![ReasonCode::PartCodeFail]);
        assert!((result.final_conf() - 0.17).abs() < EPS);
    }

    #[test]
    fn test_unknown_part_ignores_text_and_confidence() {
        for (text, conf) in [("LM7805", 1.0), ("", 0.0), ("GARBAGE", 0.42)] {
            let result = decide(text, None, conf);
            assert_eq!(result.verdict, Verdict::Suspect);
            assert_eq!(result.reason_codes, vec![ReasonCode::KbPartUnknown]);
            assert_eq!(result.scores, Scores::default());
            assert_eq!(result.extracted, Extracted::default());
        }
    }

    #[test]
    fn test_empty_record_has_no_penalties() {
        let rec = record("");
        for i in 0..=10 {
            let conf = i as f64 / 10.0;
            let result = decide("MARK", Some(&rec), conf);
            assert!(result.reason_codes.is_empty());
            assert_eq!(
                result.verdict == Verdict::Genuine,
                result.final_conf() >= GENUINE_THRESHOLD,
                "conf={}",
                conf
            );
        }
    }

    #[test]
    fn test_empty_record_blocks_only_on_near_zero_confidence() {
        let rec = record("");
        // 0.8 * (0.6 + 0.4 * c) < 0.5  <=>  c < 0.0625
        assert_eq!(decide("MARK", Some(&rec), 0.1).verdict, Verdict::Suspect);
        assert_eq!(decide("MARK", Some(&rec), 0.0).verdict, Verdict::Reject);
    }

    #[test]
    fn test_empty_record_genuine_boundary() {
        let rec = record("");
        // 0.8 * (0.6 + 0.4 * c) >= 0.75  <=>  c >= 0.84375
        assert_eq!(decide("X", Some(&rec), 0.9).verdict, Verdict::Genuine);
        assert_eq!(decide("X", Some(&rec), 0.8).verdict, Verdict::Suspect);
    }

    #[test]
    fn test_monotonic_in_ocr_confidence() {
        let rec = lm7805_with_logo();
        for text in ["LM7805TI", "LM7805", "NOPE"] {
            let mut previous = f64::MIN;
            for i in 0..=20 {
                let conf = i as f64 / 20.0;
                let score = decide(text, Some(&rec), conf).final_conf();
                assert!(score >= previous, "text={} conf={}", text, conf);
                previous = score;
            }
        }
    }

    #[test]
    fn test_each_failure_costs_fixed_penalty() {
        for penalties in 0..3 {
            let a = composite_confidence(true, 1.0, penalties);
            let b = composite_confidence(true, 1.0, penalties + 1);
            assert!((a - b - PENALTY_PER_FAILURE).abs() < EPS);
        }
    }

    #[test]
    fn test_penalty_counts_all_failures() {
        let rec = record(
            "patterns:\n  part_code: \"^LM7805\"\n  date_code: \"DC\\\\d{4}\"\n  lot_code: \"L[0-9]+\"\nlogo_hint: TI\n",
        );
        let result = decide("LM7805", Some(&rec), 1.0);
        assert_eq!(
            result.reason_codes,
            vec![ReasonCode::DateCodeFail, ReasonCode::LotCodeFail, ReasonCode::LogoFail]
        );
        assert!((result.final_conf() - (0.8 - 0.45)).abs() < EPS);
        assert_eq!(result.verdict, Verdict::Reject);
    }

    #[test]
    fn test_score_clamped_to_zero() {
        let rec = record(
            "patterns:\n  part_code: A\n  date_code: B\n  lot_code: C\nlogo_hint: D\n",
        );
        let result = decide("ZZZ", Some(&rec), 0.0);
        assert_eq!(result.reason_codes.len(), 4);
        assert_eq!(result.final_conf(), 0.0);
        assert_eq!(result.verdict, Verdict::Reject);
    }

    #[test]
    fn test_reason_code_order() {
        let rec = record("patterns:\n  part_code: A\n  lot_code: C\nlogo_hint: D\n");
        let result = decide("B", Some(&rec), 1.0);
        assert_eq!(
            result.reason_codes,
            vec![ReasonCode::PartCodeFail, ReasonCode::LotCodeFail, ReasonCode::LogoFail]
        );
    }

    #[test]
    fn test_regex_search_not_full_match() {
        let rec = record("patterns:\n  part_code: AB12\n");
        let result = decide("XYZAB12Q", Some(&rec), 1.0);
        assert!(result.reason_codes.is_empty());
    }

    #[test]
    fn test_text_uppercased_before_matching() {
        let rec = record("patterns:\n  part_code: \"^LM7805\"\n");
        let result = decide("lm7805ct", Some(&rec), 1.0);
        assert!(result.reason_codes.is_empty());
        assert_eq!(result.extracted.text.as_deref(), Some("lm7805ct"));
    }

    #[test]
    fn test_malformed_pattern_counts_as_failure() {
        let rec = record("patterns:\n  part_code: \"(LM7805\"\n");
        let result = decide("(LM7805", Some(&rec), 1.0);
        assert_eq!(result.reason_codes, vec![ReasonCode::PartCodeFail]);
        assert!((result.final_conf() - 0.25).abs() < EPS);
        assert_eq!(result.verdict, Verdict::Reject);
    }

    #[test]
    fn test_empty_text_zero_confidence() {
        let rec = lm7805_with_logo();
        let result = decide("", Some(&rec), 0.0);
        assert_eq!(result.reason_codes, vec![ReasonCode::PartCodeFail, ReasonCode::LogoFail]);
        assert_eq!(result.verdict, Verdict::Reject);
        assert_eq!(result.extracted.text.as_deref(), Some(""));
    }

    #[test]
    fn test_decide_is_idempotent() {
        let rec = lm7805_with_logo();
        let a = decide("LM7805 XX", Some(&rec), 0.73);
        let b = decide("LM7805 XX", Some(&rec), 0.73);
        assert_eq!(a, b);
        assert_eq!(
            a.final_conf().to_bits(),
            b.final_conf().to_bits()
        );
    }

    #[test]
    fn test_out_of_range_confidence_clamped() {
        let rec = record("");
        assert_eq!(decide("X", Some(&rec), 7.0).scores.ocr_conf, Some(1.0));
        assert_eq!(decide("X", Some(&rec), -1.0).scores.ocr_conf, Some(0.0));
        assert_eq!(decide("X", Some(&rec), f64::NAN).scores.ocr_conf, Some(0.0));
    }

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(classify(0, 0.75), Verdict::Genuine);
        assert_eq!(classify(0, 0.7499), Verdict::Suspect);
        assert_eq!(classify(1, 0.99), Verdict::Suspect);
        assert_eq!(classify(1, 0.4999), Verdict::Reject);
        assert_eq!(classify(2, 0.99), Verdict::Reject);
    }
}
