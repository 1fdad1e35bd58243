use crate::compare::{compare_records, miss_outcomes};
use crate::config::ScoringConfig;
use crate::model::{CellLineDocument, Record, SectionScore, SectionStatus};
use crate::normalize::normalize;

use super::{SectionOutcome, tally_outcomes};

/// Scores a section that may hold any number of records, pairing ground
/// truth to model records one-to-one on the section's matching key.
///
/// Matching is greedy in ground-truth order over not-yet-consumed model
/// records. Per ground-truth record:
/// - missing key value → excluded from scoring (identity cannot be
///   established), tallied in `unkeyed_items`;
/// - exactly one candidate → field-wise comparison, model record consumed;
/// - no candidate → every non-missing field counts as a miss;
/// - several candidates → excluded from both counts (attribution is
///   undecidable), tallied in `ambiguous_items`.
pub fn score_section(
    config: &ScoringConfig,
    gt: &CellLineDocument,
    model: &CellLineDocument,
    section: &str,
    key_field: &str,
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

    let model_keys: Vec<Option<String>> = model_records
        .iter()
        .map(|record| key_value(record, key_field))
        .collect();
    let mut consumed = vec![false; model_records.len()];

    let mut fields = Vec::new();
    let mut unmatched_items = 0;

    for gt_record in gt_records {
        let Some(gt_key) = key_value(gt_record, key_field) else {
            score.unkeyed_items += 1;
            continue;
        };

        let candidates: Vec<usize> = model_keys
            .iter()
            .enumerate()
            .filter(|(index, key)| !consumed[*index] && key.as_deref() == Some(gt_key.as_str()))
            .map(|(index, _)| index)
            .collect();

        match candidates.as_slice() {
            [] => {
                fields.extend(miss_outcomes(section, gt_record));
                unmatched_items += 1;
            }
            [index] => {
                consumed[*index] = true;
                fields.extend(compare_records(
                    section,
                    gt_record,
                    &model_records[*index],
                    config.comparators(),
                ));
                score.matched_pairs += 1;
            }
            _ => score.ambiguous_items += 1,
        }
    }

    let (matched, total) = tally_outcomes(&fields);
    score.set_counts(matched, total);

    if score.ambiguous_items > 0 {
        score.status = SectionStatus::AmbiguousMatchesSkipped;
        score.message = format!(
            "matched {} pairs, excluded {} ground-truth records with multiple model candidates",
            score.matched_pairs, score.ambiguous_items
        );
    } else if model_records.is_empty() {
        score.status = SectionStatus::PartialMatchWithConservativePenalty;
        score.message = format!("model output missing {section} section");
    } else if unmatched_items > 0 {
        score.status = SectionStatus::PartialMatchWithConservativePenalty;
        score.message = format!(
            "matched {} pairs; {} ground-truth records had no model match",
            score.matched_pairs, unmatched_items
        );
    } else if total == 0 {
        score.message = format!("no ground-truth records with a usable {key_field} value");
    } else {
        score.message = format!(
            "matched {} pairs, compared {total} ground-truth fields",
            score.matched_pairs
        );
    }

    SectionOutcome { score, fields }
}

fn key_value(record: &Record, key_field: &str) -> Option<String> {
    record.get(key_field).and_then(normalize)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::ScoringConfig;
    use crate::model::{CellLineDocument, SectionStatus};
    use crate::score::SectionOutcome;

    use super::score_section;

    fn document(value: serde_json::Value) -> CellLineDocument {
        CellLineDocument::from_value(value).expect("test document should build")
    }

    fn score(
        gt: serde_json::Value,
        model: serde_json::Value,
        section: &str,
        key_field: &str,
    ) -> SectionOutcome {
        let config = ScoringConfig::stem_cell_registry();
        score_section(&config, &document(gt), &document(model), section, key_field)
    }

    #[test]
    fn unique_key_matches_compare_field_wise() {
        let outcome = score(
            json!({"ethics": [
                {"ethics_number": "E1", "institute": "UQ"},
                {"ethics_number": "E2", "institute": "Monash"}
            ]}),
            json!({"ethics": [
                {"ethics_number": "E2", "institute": "Monash"},
                {"ethics_number": "E1", "institute": "Sydney"}
            ]}),
            "ethics",
            "ethics_number",
        );

        assert_eq!(outcome.score.status, SectionStatus::Success);
        assert_eq!(outcome.score.matched_pairs, 2);
        // ethics_number matches twice, institute once.
        assert_eq!(outcome.score.matched_fields, 3);
        assert_eq!(outcome.score.total_gt_fields, 4);
    }

    #[test]
    fn empty_model_section_penalizes_every_ground_truth_field() {
        let outcome = score(
            json!({"contact": [{"last_name": "Smith", "email": "a@x.com"}]}),
            json!({}),
            "contact",
            "last_name",
        );

        assert_eq!(
            outcome.score.status,
            SectionStatus::PartialMatchWithConservativePenalty
        );
        assert_eq!(outcome.score.matched_fields, 0);
        assert_eq!(outcome.score.total_gt_fields, 2);
    }

    #[test]
    fn unmatched_ground_truth_record_is_a_conservative_full_miss() {
        let outcome = score(
            json!({"contact": [
                {"last_name": "Smith", "email": "a@x.com"},
                {"last_name": "Jones", "email": "b@x.com"}
            ]}),
            json!({"contact": [{"last_name": "Smith", "email": "a@x.com"}]}),
            "contact",
            "last_name",
        );

        assert_eq!(
            outcome.score.status,
            SectionStatus::PartialMatchWithConservativePenalty
        );
        assert_eq!(outcome.score.matched_pairs, 1);
        assert_eq!(outcome.score.matched_fields, 2);
        assert_eq!(outcome.score.total_gt_fields, 4);
    }

    #[test]
    fn duplicate_model_keys_exclude_the_ground_truth_record_entirely() {
        let outcome = score(
            json!({"ethics": [{"ethics_number": "E1", "institute": "UQ"}]}),
            json!({"ethics": [
                {"ethics_number": "E1", "institute": "UQ"},
                {"ethics_number": "E1", "institute": "Other"}
            ]}),
            "ethics",
            "ethics_number",
        );

        assert_eq!(outcome.score.status, SectionStatus::AmbiguousMatchesSkipped);
        assert_eq!(outcome.score.matched_fields, 0);
        assert_eq!(outcome.score.total_gt_fields, 0);
        assert_eq!(outcome.score.recall, 0.0);
        assert_eq!(outcome.score.ambiguous_items, 1);
        assert!(outcome.fields.is_empty());
    }

    #[test]
    fn consumed_model_records_are_not_rematched() {
        // Two GT records share a key but only one model record carries it:
        // the first consumes it, the second is a conservative miss rather
        // than a second match against the same record.
        let outcome = score(
            json!({"contact": [
                {"last_name": "Smith", "email": "a@x.com"},
                {"last_name": "Smith", "email": "b@x.com"}
            ]}),
            json!({"contact": [{"last_name": "Smith", "email": "a@x.com"}]}),
            "contact",
            "last_name",
        );

        assert_eq!(outcome.score.matched_pairs, 1);
        assert_eq!(outcome.score.matched_fields, 2);
        assert_eq!(outcome.score.total_gt_fields, 4);
    }

    #[test]
    fn ground_truth_records_without_a_key_are_excluded() {
        let outcome = score(
            json!({"contact": [
                {"last_name": "Missing", "email": "a@x.com"},
                {"last_name": "Jones", "email": "b@x.com"}
            ]}),
            json!({"contact": [{"last_name": "Jones", "email": "b@x.com"}]}),
            "contact",
            "last_name",
        );

        assert_eq!(outcome.score.status, SectionStatus::Success);
        assert_eq!(outcome.score.unkeyed_items, 1);
        assert_eq!(outcome.score.matched_fields, 2);
        assert_eq!(outcome.score.total_gt_fields, 2);
    }

    #[test]
    fn empty_ground_truth_section_is_reported_as_missing() {
        let outcome = score(
            json!({"contact": []}),
            json!({"contact": [{"last_name": "Smith"}]}),
            "contact",
            "last_name",
        );

        assert_eq!(outcome.score.status, SectionStatus::MissingSection);
        assert!(outcome.fields.is_empty());
    }

    #[test]
    fn matching_keys_are_normalized_before_comparison() {
        let outcome = score(
            json!({"contact": [{"last_name": " Smith ", "email": "a@x.com"}]}),
            json!({"contact": [{"last_name": "Smith", "email": "a@x.com"}]}),
            "contact",
            "last_name",
        );

        assert_eq!(outcome.score.matched_pairs, 1);
        assert_eq!(outcome.score.matched_fields, 2);
    }
}
