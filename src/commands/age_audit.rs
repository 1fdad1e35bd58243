use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::age::AgeMatcher;
use crate::cli::AgeAuditArgs;
use crate::config::{ScoringConfig, SectionKind};
use crate::model::CellLineDocument;
use crate::normalize::normalize;
use crate::util::{now_utc_string, write_json_pretty};

use super::batch::discover_model_runs;

/// Exact vs semantic match counts over one field's comparisons.
#[derive(Debug, Clone, Default, Serialize)]
struct AuditCounts {
    total_comparisons: usize,
    exact_matches: usize,
    semantic_matches: usize,
    exact_recall: f64,
    semantic_recall: f64,
}

impl AuditCounts {
    fn record(&mut self, exact: bool, semantic: bool) {
        self.total_comparisons += 1;
        if exact {
            self.exact_matches += 1;
        }
        if semantic {
            self.semantic_matches += 1;
        }
    }

    fn finalize(&mut self) {
        if self.total_comparisons > 0 {
            self.exact_recall = self.exact_matches as f64 / self.total_comparisons as f64;
            self.semantic_recall = self.semantic_matches as f64 / self.total_comparisons as f64;
        }
    }
}

/// A comparison that matched semantically but not exactly: the recall the
/// exact comparator leaves on the table.
#[derive(Debug, Clone, Serialize)]
struct AuditCase {
    cell_line: String,
    ground_truth: String,
    model_output: String,
}

#[derive(Debug, Clone, Serialize)]
struct ModelAudit {
    model_name: String,
    counts: AuditCounts,
    semantic_only: Vec<AuditCase>,
}

#[derive(Debug, Clone, Serialize)]
struct AgeAuditReport {
    generated_at: String,
    field_path: String,
    models: Vec<ModelAudit>,
    overall: AuditCounts,
}

pub fn run(args: AgeAuditArgs) -> Result<()> {
    let Some((section, field)) = args.field_path.split_once('.') else {
        bail!("field path must be section.field, got {}", args.field_path);
    };

    let config = ScoringConfig::stem_cell_registry();
    match config.section_kind(section) {
        Some(SectionKind::SingleItem) => {}
        Some(SectionKind::MultiItem { .. }) => {
            bail!("age audit supports single-item sections only, {section} is multi-item")
        }
        None => bail!("unknown section {section}"),
    }

    let matcher = AgeMatcher::new()?;
    let runs = discover_model_runs(&args.results_dir)?;

    let mut models = Vec::with_capacity(runs.len());
    let mut overall = AuditCounts::default();

    for run in &runs {
        let mut counts = AuditCounts::default();
        let mut semantic_only = Vec::new();

        for pair in &run.pairs {
            let gt = match CellLineDocument::load(&pair.gt_path) {
                Ok(document) => document,
                Err(err) => {
                    warn!(cell_line = %pair.cell_line, error = %err, "skipping unreadable ground truth");
                    continue;
                }
            };
            let model = match CellLineDocument::load(&pair.model_path) {
                Ok(document) => document,
                Err(err) => {
                    warn!(cell_line = %pair.cell_line, error = %err, "skipping unreadable model output");
                    continue;
                }
            };

            // Same single-item contract as the scorer: the ground truth
            // must hold exactly one record, and the model value only exists
            // when the model also produced exactly one.
            let gt_section = gt.section(section);
            if gt_section.len() != 1 {
                continue;
            }
            let Some(gt_value) = gt_section[0].get(field).and_then(|value| normalize(value))
            else {
                continue;
            };

            let model_section = model.section(section);
            let model_value = if model_section.len() == 1 {
                model_section[0].get(field).and_then(|value| normalize(value))
            } else {
                None
            };

            let (exact, semantic) = match model_value.as_deref() {
                Some(model_value) => (
                    gt_value == model_value,
                    matcher.equivalent(&gt_value, model_value),
                ),
                None => (false, false),
            };

            counts.record(exact, semantic);
            overall.record(exact, semantic);

            if semantic && !exact {
                semantic_only.push(AuditCase {
                    cell_line: pair.cell_line.clone(),
                    ground_truth: gt_value,
                    model_output: model_value.unwrap_or_default(),
                });
            }
        }

        counts.finalize();
        models.push(ModelAudit {
            model_name: run.model_name.clone(),
            counts,
            semantic_only,
        });
    }

    overall.finalize();

    let report = AgeAuditReport {
        generated_at: now_utc_string(),
        field_path: args.field_path.clone(),
        models,
        overall,
    };

    write_text_summary(&report)?;

    if let Some(report_path) = &args.report_path {
        write_json_pretty(report_path, &report)?;
        info!(path = %report_path.display(), "wrote age audit report");
    }

    Ok(())
}

fn write_text_summary(report: &AgeAuditReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Age audit for {}", report.field_path)?;
    for model in &report.models {
        writeln!(
            output,
            "{}: exact {:.3} ({}/{}) semantic {:.3} ({}/{}) semantic-only {}",
            model.model_name,
            model.counts.exact_recall,
            model.counts.exact_matches,
            model.counts.total_comparisons,
            model.counts.semantic_recall,
            model.counts.semantic_matches,
            model.counts.total_comparisons,
            model.semantic_only.len(),
        )?;
        for case in &model.semantic_only {
            writeln!(
                output,
                "\t{}: gt='{}' model='{}'",
                case.cell_line, case.ground_truth, case.model_output
            )?;
        }
    }
    writeln!(
        output,
        "overall: exact {:.3} semantic {:.3} over {} comparisons",
        report.overall.exact_recall, report.overall.semantic_recall,
        report.overall.total_comparisons
    )?;
    output.flush().context("failed to flush audit summary")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::AuditCounts;

    #[test]
    fn counts_finalize_to_recall_fractions() {
        let mut counts = AuditCounts::default();
        counts.record(true, true);
        counts.record(false, true);
        counts.record(false, false);
        counts.finalize();

        assert_eq!(counts.total_comparisons, 3);
        assert_eq!(counts.exact_matches, 1);
        assert_eq!(counts.semantic_matches, 2);
        assert!((counts.exact_recall - 1.0 / 3.0).abs() < 1e-9);
        assert!((counts.semantic_recall - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_audit_reports_zero_recall() {
        let mut counts = AuditCounts::default();
        counts.finalize();
        assert_eq!(counts.exact_recall, 0.0);
        assert_eq!(counts.semantic_recall, 0.0);
    }
}
