use std::collections::BTreeMap;

use crate::model::Record;
use crate::normalize::normalize;

/// Outcome of comparing one non-missing ground-truth field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub field_path: String,
    pub matched: bool,
}

/// Equality strategy for one field, applied to normalized values.
pub trait FieldComparator: Send + Sync {
    fn values_match(&self, gt_value: &str, model_value: &str) -> bool;
}

/// Default strategy: normalized exact string equality.
pub struct ExactComparator;

impl FieldComparator for ExactComparator {
    fn values_match(&self, gt_value: &str, model_value: &str) -> bool {
        gt_value == model_value
    }
}

/// Per-field-path comparator overrides with an exact-match default.
pub struct ComparatorRegistry {
    default: Box<dyn FieldComparator>,
    overrides: BTreeMap<String, Box<dyn FieldComparator>>,
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        Self {
            default: Box::new(ExactComparator),
            overrides: BTreeMap::new(),
        }
    }
}

impl ComparatorRegistry {
    pub fn register(&mut self, field_path: &str, comparator: Box<dyn FieldComparator>) {
        self.overrides.insert(field_path.to_string(), comparator);
    }

    pub fn comparator_for(&self, field_path: &str) -> &dyn FieldComparator {
        match self.overrides.get(field_path) {
            Some(comparator) => &**comparator,
            None => &*self.default,
        }
    }
}

pub fn field_path(section: &str, field: &str) -> String {
    format!("{section}.{field}")
}

/// Compares two records field by field, one outcome per non-missing
/// ground-truth field. Missing ground-truth fields never enter the
/// denominator; fields present only in the model record are ignored
/// (this is a recall metric, not precision).
pub fn compare_records(
    section: &str,
    gt_record: &Record,
    model_record: &Record,
    registry: &ComparatorRegistry,
) -> Vec<FieldOutcome> {
    let mut outcomes = Vec::new();

    for (field_name, gt_value) in gt_record {
        let Some(gt_norm) = normalize(gt_value) else {
            continue;
        };
        let path = field_path(section, field_name);
        let matched = model_record
            .get(field_name)
            .and_then(normalize)
            .map(|model_norm| {
                registry
                    .comparator_for(&path)
                    .values_match(&gt_norm, &model_norm)
            })
            .unwrap_or(false);

        outcomes.push(FieldOutcome {
            field_path: path,
            matched,
        });
    }

    outcomes
}

/// Conservative-penalty outcomes: every non-missing ground-truth field
/// counted as a miss. Used when no model record could be paired.
pub fn miss_outcomes(section: &str, gt_record: &Record) -> Vec<FieldOutcome> {
    gt_record
        .iter()
        .filter(|(_, value)| normalize(value).is_some())
        .map(|(field_name, _)| FieldOutcome {
            field_path: field_path(section, field_name),
            matched: false,
        })
        .collect()
}
