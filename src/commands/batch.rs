use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::BatchArgs;
use crate::config::ScoringConfig;
use crate::model::{
    BatchReportManifest, BatchSummary, CellLineDocument, DocumentFailure, DocumentReport,
    ModelRunReport,
};
use crate::score::aggregate::AggregateReport;
use crate::score::score_document_pair;
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

use super::score::build_config;

const MANIFEST_VERSION: u32 = 1;
const GT_SUFFIX: &str = "_gt.json";
const MODEL_SUFFIX: &str = "_m.json";

/// One scoreable (ground-truth, model-output) file pair.
#[derive(Debug, Clone)]
pub struct DocumentPair {
    pub cell_line: String,
    pub gt_path: PathBuf,
    pub model_path: PathBuf,
}

/// Every pair discovered for one model directory, plus the cell lines whose
/// ground-truth file was absent.
#[derive(Debug, Clone)]
pub struct ModelRun {
    pub model_name: String,
    pub pairs: Vec<DocumentPair>,
    pub missing_gt: Vec<String>,
}

pub fn run(args: BatchArgs) -> Result<()> {
    let config = build_config(args.semantic_age)?;
    let runs = discover_model_runs(&args.results_dir)?;

    if runs.is_empty() {
        bail!(
            "no model directories found under {}",
            args.results_dir.join("model_output").display()
        );
    }

    let mut aggregate = AggregateReport::default();
    let mut model_reports = Vec::with_capacity(runs.len());
    let mut documents_scored = 0;
    let mut failure_count = 0;

    for run in &runs {
        info!(
            model = %run.model_name,
            pairs = run.pairs.len(),
            "scoring model outputs"
        );

        let mut documents = Vec::new();
        let mut failures: Vec<DocumentFailure> = run
            .missing_gt
            .iter()
            .map(|cell_line| DocumentFailure {
                cell_line: cell_line.clone(),
                reason: "ground truth file not found".to_string(),
            })
            .collect();

        for pair in &run.pairs {
            match score_pair(&run.model_name, pair, &mut aggregate, &config) {
                Ok(report) => {
                    documents_scored += 1;
                    documents.push(report);
                }
                Err(err) => {
                    warn!(
                        model = %run.model_name,
                        cell_line = %pair.cell_line,
                        error = %err,
                        "skipping unscoreable document pair"
                    );
                    failures.push(DocumentFailure {
                        cell_line: pair.cell_line.clone(),
                        reason: format!("{err:#}"),
                    });
                }
            }
        }

        failure_count += failures.len();
        model_reports.push(ModelRunReport {
            model_name: run.model_name.clone(),
            documents,
            failures,
        });
    }

    for (model_name, model_aggregate) in aggregate.models() {
        info!(
            model = %model_name,
            fields = model_aggregate.tallies().len(),
            mean_recall = model_aggregate.mean_recall(),
            "model aggregate"
        );
    }

    let manifest = BatchReportManifest {
        manifest_version: MANIFEST_VERSION,
        generated_at: now_utc_string(),
        results_dir: args.results_dir.display().to_string(),
        models: model_reports,
        field_tallies_by_model: aggregate.field_tallies_by_model(),
        field_recall_by_model: aggregate.field_recall_by_model(),
        summary: BatchSummary {
            total_models: runs.len(),
            total_documents_scored: documents_scored,
            total_failures: failure_count,
            total_unique_fields: aggregate.all_field_paths().len(),
        },
    };

    let report_path = args
        .report_path
        .unwrap_or_else(|| args.results_dir.join("field_recall_results.json"));
    write_json_pretty(&report_path, &manifest)?;

    info!(path = %report_path.display(), "wrote batch report manifest");
    info!(
        models = manifest.summary.total_models,
        documents = manifest.summary.total_documents_scored,
        failures = manifest.summary.total_failures,
        fields = manifest.summary.total_unique_fields,
        "batch scoring completed"
    );

    Ok(())
}

fn score_pair(
    model_name: &str,
    pair: &DocumentPair,
    aggregate: &mut AggregateReport,
    config: &ScoringConfig,
) -> Result<DocumentReport> {
    let gt = CellLineDocument::load(&pair.gt_path)?;
    let model = CellLineDocument::load(&pair.model_path)?;

    let outcomes = score_document_pair(config, &gt, &model);
    let model_aggregate = aggregate.model_mut(model_name);
    for outcome in &outcomes {
        model_aggregate.absorb(outcome);
    }

    Ok(DocumentReport {
        cell_line: pair.cell_line.clone(),
        gt_sha256: sha256_file(&pair.gt_path)?,
        model_sha256: sha256_file(&pair.model_path)?,
        sections: outcomes.into_iter().map(|outcome| outcome.score).collect(),
    })
}

/// Walks `<results>/model_output/<model>/*_m.json`, pairing each file with
/// `<results>/ground_truth/<line>_gt.json`.
pub fn discover_model_runs(results_dir: &Path) -> Result<Vec<ModelRun>> {
    let gt_dir = results_dir.join("ground_truth");
    let model_root = results_dir.join("model_output");

    if !gt_dir.is_dir() {
        bail!("ground truth directory not found: {}", gt_dir.display());
    }
    if !model_root.is_dir() {
        bail!("model output directory not found: {}", model_root.display());
    }

    let mut model_dirs: Vec<PathBuf> = fs::read_dir(&model_root)
        .with_context(|| format!("failed to read {}", model_root.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_dir())
        .collect();
    model_dirs.sort();

    let mut runs = Vec::with_capacity(model_dirs.len());
    for model_dir in model_dirs {
        let model_name = model_dir
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 directory name: {}", model_dir.display()))?;

        let mut model_files: Vec<PathBuf> = fs::read_dir(&model_dir)
            .with_context(|| format!("failed to read {}", model_dir.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(MODEL_SUFFIX))
            })
            .collect();
        model_files.sort();

        let mut pairs = Vec::new();
        let mut missing_gt = Vec::new();
        for model_path in model_files {
            let file_name = model_path
                .file_name()
                .and_then(|name| name.to_str())
                .with_context(|| format!("invalid UTF-8 filename: {}", model_path.display()))?;
            let Some(cell_line) = cell_line_stem(file_name) else {
                continue;
            };

            let gt_path = gt_dir.join(format!("{cell_line}{GT_SUFFIX}"));
            if !gt_path.is_file() {
                warn!(
                    model = %model_name,
                    cell_line = %cell_line,
                    "no ground truth file for model output"
                );
                missing_gt.push(cell_line.to_string());
                continue;
            }

            pairs.push(DocumentPair {
                cell_line: cell_line.to_string(),
                gt_path,
                model_path,
            });
        }

        runs.push(ModelRun {
            model_name,
            pairs,
            missing_gt,
        });
    }

    Ok(runs)
}

/// Cell line identity from a model output filename (`UQi001-A_m.json`).
pub fn cell_line_stem(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(MODEL_SUFFIX)
        .filter(|stem| !stem.is_empty())
}

#[cfg(test)]
mod tests {
    use super::cell_line_stem;

    #[test]
    fn cell_line_stem_strips_the_model_suffix() {
        assert_eq!(cell_line_stem("UQi001-A_m.json"), Some("UQi001-A"));
        assert_eq!(cell_line_stem("UQi001-A_gt.json"), None);
        assert_eq!(cell_line_stem("_m.json"), None);
        assert_eq!(cell_line_stem("notes.txt"), None);
    }
}
