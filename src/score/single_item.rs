use crate::compare::{compare_records, miss_outcomes};
use crate::config::ScoringConfig;
use crate::model::{CellLineDocument, SectionScore, SectionStatus};

use super::{SectionOutcome, tally_outcomes};

/// Scores a section contractually expected to hold exactly one record.
///
/// Terminal cases, in order:
/// 1. empty ground-truth section → `missing_section`, excluded from
///    aggregation;
/// 2. ground truth holds more than one record → `gt_cardinality_violation`,
///    excluded: the single-item precondition fails on the reference side;
/// 3. empty model section → every non-missing ground-truth field counts as
///    a miss;
/// 4. model holds more than one record → same full miss, tagged
///    `model_cardinality_violation`; the denominator still counts;
/// 5. one record on both sides → field-wise comparison.
pub fn score_section(
    config: &ScoringConfig,
    gt: &CellLineDocument,
    model: &CellLineDocument,
    section: &str,
) -> SectionOutcome {
    let gt_records = gt.section(section);
    let model_records = model.section(section);
    let mut score = SectionScore::new(section, gt_records.len(), model_records.len());

    if gt_records.is_empty() {
        score.status = SectionStatus::MissingSection;
        score.message = format!("ground truth missing {section} section");
        return SectionOutcome {
            score,
            fields: Vec::new(),
        };
    }

    if gt_records.len() > 1 {
        score.status = SectionStatus::GtCardinalityViolation;
        score.message = format!(
            "ground truth has {} records in {section}, expected 1; section skipped",
            gt_records.len()
        );
        return SectionOutcome {
            score,
            fields: Vec::new(),
        };
    }

    let gt_record = &gt_records[0];

    let fields = if model_records.is_empty() {
        score.status = SectionStatus::PartialMatchWithConservativePenalty;
        score.message = format!("model output missing {section} section");
        miss_outcomes(section, gt_record)
    } else if model_records.len() > 1 {
        score.status = SectionStatus::ModelCardinalityViolation;
        score.message = format!(
            "model output has {} records in {section}, expected 1; no matches counted",
            model_records.len()
        );
        miss_outcomes(section, gt_record)
    } else {
        let fields = compare_records(section, gt_record, &model_records[0], config.comparators());
        score.matched_pairs = 1;
        fields
    };

    let (matched, total) = tally_outcomes(&fields);
    score.set_counts(matched, total);
    if score.status == SectionStatus::Success {
        score.message = format!("compared {total} ground-truth fields, {matched} matched");
    }

    SectionOutcome { score, fields }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::ScoringConfig;
    use crate::model::{CellLineDocument, SectionStatus};

    use super::score_section;

    fn document(value: serde_json::Value) -> CellLineDocument {
        CellLineDocument::from_value(value).expect("test document should build")
    }

    #[test]
    fn one_record_each_side_compares_field_wise() {
        let config = ScoringConfig::stem_cell_registry();
        let gt = document(json!({"donor": [{"age": "30", "sex": "Male"}]}));
        let model = document(json!({"donor": [{"age": "30", "sex": "Female"}]}));

        let outcome = score_section(&config, &gt, &model, "donor");
        assert_eq!(outcome.score.status, SectionStatus::Success);
        assert_eq!(outcome.score.matched_fields, 1);
        assert_eq!(outcome.score.total_gt_fields, 2);
        assert_eq!(outcome.score.recall, 0.5);
        assert_eq!(outcome.score.matched_pairs, 1);
    }

    #[test]
    fn empty_ground_truth_section_is_excluded_from_aggregation() {
        let config = ScoringConfig::stem_cell_registry();
        let gt = document(json!({}));
        let model = document(json!({"donor": [{"age": "30"}]}));

        let outcome = score_section(&config, &gt, &model, "donor");
        assert_eq!(outcome.score.status, SectionStatus::MissingSection);
        assert_eq!(outcome.score.total_gt_fields, 0);
        assert_eq!(outcome.score.recall, 0.0);
        assert!(outcome.fields.is_empty());
        assert!(!outcome.score.status.counts_toward_aggregate());
    }

    #[test]
    fn ground_truth_cardinality_violation_skips_the_section() {
        let config = ScoringConfig::stem_cell_registry();
        let gt = document(json!({"donor": [{"age": "30"}, {"age": "31"}]}));
        let model = document(json!({"donor": [{"age": "30"}]}));

        let outcome = score_section(&config, &gt, &model, "donor");
        assert_eq!(outcome.score.status, SectionStatus::GtCardinalityViolation);
        assert!(outcome.fields.is_empty());
        assert!(!outcome.score.status.counts_toward_aggregate());
    }

    #[test]
    fn empty_model_section_is_a_full_miss() {
        let config = ScoringConfig::stem_cell_registry();
        let gt = document(json!({"donor": [{"age": "30", "sex": "Male", "notes": "Missing"}]}));
        let model = document(json!({}));

        let outcome = score_section(&config, &gt, &model, "donor");
        assert_eq!(
            outcome.score.status,
            SectionStatus::PartialMatchWithConservativePenalty
        );
        assert_eq!(outcome.score.matched_fields, 0);
        assert_eq!(outcome.score.total_gt_fields, 2);
        assert_eq!(outcome.score.recall, 0.0);
    }

    #[test]
    fn model_cardinality_violation_still_counts_the_denominator() {
        let config = ScoringConfig::stem_cell_registry();
        let gt = document(json!({"donor": [{"age": "30", "sex": "Male"}]}));
        let model = document(json!({"donor": [{"age": "30"}, {"age": "30"}]}));

        let outcome = score_section(&config, &gt, &model, "donor");
        assert_eq!(
            outcome.score.status,
            SectionStatus::ModelCardinalityViolation
        );
        assert_eq!(outcome.score.matched_fields, 0);
        assert_eq!(outcome.score.total_gt_fields, 2);
        assert!(outcome.score.status.counts_toward_aggregate());
    }

    #[test]
    fn age_range_override_changes_the_donor_age_verdict() {
        let gt = document(json!({"donor": [{"age": "25_29"}]}));
        let model = document(json!({"donor": [{"age": "27"}]}));

        let exact = ScoringConfig::stem_cell_registry();
        let outcome = score_section(&exact, &gt, &model, "donor");
        assert_eq!(outcome.score.matched_fields, 0);
        assert_eq!(outcome.score.total_gt_fields, 1);

        let semantic = ScoringConfig::stem_cell_registry()
            .with_semantic_age()
            .expect("config should build");
        let outcome = score_section(&semantic, &gt, &model, "donor");
        assert_eq!(outcome.score.matched_fields, 1);
    }
}
