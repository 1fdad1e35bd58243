use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ScoreArgs;
use crate::config::ScoringConfig;
use crate::model::{CellLineDocument, SectionScore};
use crate::score::{SectionOutcome, score_document_pair};
use crate::util::now_utc_string;

#[derive(Debug, Serialize)]
struct PairScoreReport {
    generated_at: String,
    gt_path: String,
    model_path: String,
    sections: Vec<SectionScore>,
    overall_matched_fields: u64,
    overall_total_gt_fields: u64,
    overall_recall: f64,
}

pub fn run(args: ScoreArgs) -> Result<()> {
    let config = build_config(args.semantic_age)?;

    let gt = CellLineDocument::load(&args.gt_path)?;
    let model = CellLineDocument::load(&args.model_path)?;

    info!(
        gt = %args.gt_path.display(),
        model = %args.model_path.display(),
        "scoring document pair"
    );

    let outcomes = score_document_pair(&config, &gt, &model);
    let (matched, total) = overall_counts(&outcomes);

    if args.json {
        let report = PairScoreReport {
            generated_at: now_utc_string(),
            gt_path: args.gt_path.display().to_string(),
            model_path: args.model_path.display().to_string(),
            sections: outcomes.iter().map(|outcome| outcome.score.clone()).collect(),
            overall_matched_fields: matched,
            overall_total_gt_fields: total,
            overall_recall: if total > 0 {
                matched as f64 / total as f64
            } else {
                0.0
            },
        };

        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &report)
            .context("failed to serialize pair score json output")?;
        writeln!(output)?;
        output.flush()?;
        return Ok(());
    }

    write_text_report(&outcomes, matched, total, args.show_fields)
}

pub fn build_config(semantic_age: bool) -> Result<ScoringConfig> {
    let config = ScoringConfig::stem_cell_registry();
    if semantic_age {
        return config.with_semantic_age();
    }
    Ok(config)
}

/// Sums matched/total over the sections that count toward aggregation.
fn overall_counts(outcomes: &[SectionOutcome]) -> (u64, u64) {
    outcomes
        .iter()
        .filter(|outcome| outcome.score.status.counts_toward_aggregate())
        .fold((0, 0), |(matched, total), outcome| {
            (
                matched + outcome.score.matched_fields,
                total + outcome.score.total_gt_fields,
            )
        })
}

fn write_text_report(
    outcomes: &[SectionOutcome],
    matched: u64,
    total: u64,
    show_fields: bool,
) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    for outcome in outcomes {
        let score = &outcome.score;
        writeln!(
            output,
            "{}: {:.3} ({}/{})\t[{}] gt_items={} model_items={} pairs={}",
            score.section,
            score.recall,
            score.matched_fields,
            score.total_gt_fields,
            score.status.as_str(),
            score.gt_items,
            score.model_items,
            score.matched_pairs,
        )?;
        if !score.message.is_empty() {
            writeln!(output, "\t{}", score.message)?;
        }

        if show_fields {
            for field in &outcome.fields {
                let marker = if field.matched { "match" } else { "miss " };
                writeln!(output, "\t{marker}\t{}", field.field_path)?;
            }
        }
    }

    let overall = if total > 0 {
        matched as f64 / total as f64
    } else {
        0.0
    };
    writeln!(output, "overall: {overall:.3} ({matched}/{total})")?;
    output.flush()?;

    Ok(())
}
