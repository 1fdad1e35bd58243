pub mod aggregate;
pub mod multi_item;
pub mod single_item;

use crate::compare::FieldOutcome;
use crate::config::{ScoringConfig, SectionKind};
use crate::model::{CellLineDocument, SectionScore};

/// Section score plus the per-field outcomes behind it. `fields` is empty
/// for sections excluded from aggregation (missing ground truth, ground
/// truth cardinality violation); otherwise `score.matched_fields` and
/// `score.total_gt_fields` are derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionOutcome {
    pub score: SectionScore,
    pub fields: Vec<FieldOutcome>,
}

/// Scores every configured section of a ground-truth/model document pair.
/// Pure over its inputs; documents are never mutated.
pub fn score_document_pair(
    config: &ScoringConfig,
    gt: &CellLineDocument,
    model: &CellLineDocument,
) -> Vec<SectionOutcome> {
    config
        .sections()
        .map(|(section, kind)| match kind {
            SectionKind::SingleItem => single_item::score_section(config, gt, model, section),
            SectionKind::MultiItem { key_field } => {
                multi_item::score_section(config, gt, model, section, key_field)
            }
        })
        .collect()
}

pub(crate) fn tally_outcomes(fields: &[FieldOutcome]) -> (u64, u64) {
    let matched = fields.iter().filter(|outcome| outcome.matched).count() as u64;
    (matched, fields.len() as u64)
}
