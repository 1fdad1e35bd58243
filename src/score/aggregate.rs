use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::SectionOutcome;

/// Matched/total counts for one field path, summed across documents.
/// Division happens only at read time; a zero total reads as 0.0 recall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTally {
    pub matched: u64,
    pub total: u64,
}

impl FieldTally {
    pub fn recall(&self) -> f64 {
        if self.total > 0 {
            self.matched as f64 / self.total as f64
        } else {
            0.0
        }
    }

    fn record(&mut self, matched: bool) {
        self.total += 1;
        if matched {
            self.matched += 1;
        }
    }
}

/// Per-field tallies for one model across every scored document.
#[derive(Debug, Clone, Default)]
pub struct ModelAggregate {
    tallies: BTreeMap<String, FieldTally>,
}

impl ModelAggregate {
    pub fn from_tallies(tallies: BTreeMap<String, FieldTally>) -> Self {
        Self { tallies }
    }

    /// Folds one section outcome in. Outcomes whose status is excluded from
    /// aggregation contribute nothing.
    pub fn absorb(&mut self, outcome: &SectionOutcome) {
        if !outcome.score.status.counts_toward_aggregate() {
            return;
        }
        for field in &outcome.fields {
            self.tallies
                .entry(field.field_path.clone())
                .or_default()
                .record(field.matched);
        }
    }

    pub fn tallies(&self) -> &BTreeMap<String, FieldTally> {
        &self.tallies
    }

    pub fn recalls(&self) -> BTreeMap<String, f64> {
        self.tallies
            .iter()
            .map(|(path, tally)| (path.clone(), tally.recall()))
            .collect()
    }

    /// Mean of the per-field recalls; 0.0 when no field was scored.
    pub fn mean_recall(&self) -> f64 {
        if self.tallies.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.tallies.values().map(FieldTally::recall).sum();
        sum / self.tallies.len() as f64
    }
}

/// model → field-path → tally, with cross-model summaries.
#[derive(Debug, Clone, Default)]
pub struct AggregateReport {
    models: BTreeMap<String, ModelAggregate>,
}

impl AggregateReport {
    /// Rebuilds a report from the tallies of a persisted batch manifest.
    pub fn from_tallies(tallies: BTreeMap<String, BTreeMap<String, FieldTally>>) -> Self {
        Self {
            models: tallies
                .into_iter()
                .map(|(name, tallies)| (name, ModelAggregate::from_tallies(tallies)))
                .collect(),
        }
    }

    pub fn model_mut(&mut self, model_name: &str) -> &mut ModelAggregate {
        self.models.entry(model_name.to_string()).or_default()
    }

    pub fn models(&self) -> impl Iterator<Item = (&str, &ModelAggregate)> {
        self.models
            .iter()
            .map(|(name, aggregate)| (name.as_str(), aggregate))
    }

    pub fn field_recall_by_model(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        self.models
            .iter()
            .map(|(name, aggregate)| (name.clone(), aggregate.recalls()))
            .collect()
    }

    pub fn field_tallies_by_model(&self) -> BTreeMap<String, BTreeMap<String, FieldTally>> {
        self.models
            .iter()
            .map(|(name, aggregate)| (name.clone(), aggregate.tallies().clone()))
            .collect()
    }

    /// Every field path seen under any model.
    pub fn all_field_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .models
            .values()
            .flat_map(|aggregate| aggregate.tallies().keys().cloned())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Per-field recall averaged across models; a model that never scored
    /// the field contributes 0.0, matching the conservative reading.
    pub fn field_averages(&self) -> BTreeMap<String, f64> {
        if self.models.is_empty() {
            return BTreeMap::new();
        }
        let model_count = self.models.len() as f64;
        self.all_field_paths()
            .into_iter()
            .map(|path| {
                let sum: f64 = self
                    .models
                    .values()
                    .map(|aggregate| {
                        aggregate
                            .tallies()
                            .get(&path)
                            .map(FieldTally::recall)
                            .unwrap_or(0.0)
                    })
                    .sum();
                (path, sum / model_count)
            })
            .collect()
    }

    /// Fields whose cross-model average recall reaches `threshold`,
    /// best first.
    pub fn fields_at_or_above(&self, threshold: f64) -> Vec<(String, f64)> {
        let mut fields: Vec<(String, f64)> = self
            .field_averages()
            .into_iter()
            .filter(|(_, average)| *average >= threshold)
            .collect();
        fields.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        fields
    }

    /// Fields whose cross-model average recall falls below `threshold`,
    /// worst first.
    pub fn fields_below(&self, threshold: f64) -> Vec<(String, f64)> {
        let mut fields: Vec<(String, f64)> = self
            .field_averages()
            .into_iter()
            .filter(|(_, average)| *average < threshold)
            .collect();
        fields.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        fields
    }
}

#[cfg(test)]
mod tests {
    use crate::compare::FieldOutcome;
    use crate::model::{SectionScore, SectionStatus};
    use crate::score::SectionOutcome;

    use super::{AggregateReport, FieldTally};

    fn outcome(status: SectionStatus, fields: Vec<(&str, bool)>) -> SectionOutcome {
        let mut score = SectionScore::new("donor", 1, 1);
        score.status = status;
        let fields: Vec<FieldOutcome> = fields
            .into_iter()
            .map(|(path, matched)| FieldOutcome {
                field_path: path.to_string(),
                matched,
            })
            .collect();
        let matched = fields.iter().filter(|field| field.matched).count() as u64;
        score.set_counts(matched, fields.len() as u64);
        SectionOutcome { score, fields }
    }

    #[test]
    fn zero_total_recall_is_zero_not_an_error() {
        let tally = FieldTally::default();
        assert_eq!(tally.recall(), 0.0);
    }

    #[test]
    fn tallies_sum_across_documents_before_dividing() {
        let mut report = AggregateReport::default();
        let model = report.model_mut("gpt-test");
        model.absorb(&outcome(
            SectionStatus::Success,
            vec![("donor.age", true), ("donor.sex", false)],
        ));
        model.absorb(&outcome(
            SectionStatus::Success,
            vec![("donor.age", true), ("donor.age", true)],
        ));

        let tally = model.tallies()["donor.age"];
        assert_eq!(tally, FieldTally {
            matched: 3,
            total: 3
        });

        let recalls = report.field_recall_by_model();
        assert_eq!(recalls["gpt-test"]["donor.age"], 1.0);
        assert_eq!(recalls["gpt-test"]["donor.sex"], 0.0);
    }

    #[test]
    fn two_documents_with_partial_matches_aggregate_to_three_quarters() {
        let mut report = AggregateReport::default();
        let model = report.model_mut("gpt-test");
        model.absorb(&outcome(
            SectionStatus::Success,
            vec![("donor.age", true), ("donor.age", false)],
        ));
        model.absorb(&outcome(
            SectionStatus::Success,
            vec![("donor.age", true), ("donor.age", true)],
        ));

        assert_eq!(model.tallies()["donor.age"].recall(), 0.75);
    }

    #[test]
    fn excluded_statuses_contribute_nothing() {
        let mut report = AggregateReport::default();
        let model = report.model_mut("gpt-test");
        model.absorb(&outcome(SectionStatus::MissingSection, vec![]));
        model.absorb(&outcome(SectionStatus::GtCardinalityViolation, vec![]));

        assert!(model.tallies().is_empty());
        assert_eq!(model.mean_recall(), 0.0);
    }

    #[test]
    fn threshold_summaries_average_across_models() {
        let mut report = AggregateReport::default();
        report.model_mut("model-a").absorb(&outcome(
            SectionStatus::Success,
            vec![("donor.age", true), ("donor.sex", false)],
        ));
        report.model_mut("model-b").absorb(&outcome(
            SectionStatus::Success,
            vec![("donor.age", true), ("donor.sex", true)],
        ));

        let best = report.fields_at_or_above(0.8);
        assert_eq!(best, vec![("donor.age".to_string(), 1.0)]);

        let worst = report.fields_below(0.8);
        assert_eq!(worst, vec![("donor.sex".to_string(), 0.5)]);
    }

    #[test]
    fn field_unseen_by_one_model_averages_with_zero() {
        let mut report = AggregateReport::default();
        report.model_mut("model-a").absorb(&outcome(
            SectionStatus::Success,
            vec![("donor.age", true)],
        ));
        report
            .model_mut("model-b")
            .absorb(&outcome(SectionStatus::Success, vec![("donor.sex", true)]));

        let averages = report.field_averages();
        assert_eq!(averages["donor.age"], 0.5);
        assert_eq!(averages["donor.sex"], 0.5);
    }
}
