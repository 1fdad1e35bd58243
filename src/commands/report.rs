use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::ReportArgs;
use crate::model::BatchReportManifest;
use crate::score::aggregate::AggregateReport;
use crate::util::read_json;

pub fn run(args: ReportArgs) -> Result<()> {
    let manifest: BatchReportManifest = read_json(&args.results_path)?;
    let markdown = render_markdown(&manifest, args.high_threshold, args.low_threshold);

    let output_path = args.output_path.unwrap_or_else(|| {
        let mut path = args.results_path.clone();
        path.set_file_name("field_recall_report.md");
        path
    });

    fs::write(&output_path, markdown)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    info!(path = %output_path.display(), "wrote field recall report");
    Ok(())
}

pub fn render_markdown(
    manifest: &BatchReportManifest,
    high_threshold: f64,
    low_threshold: f64,
) -> String {
    let aggregate = AggregateReport::from_tallies(manifest.field_tallies_by_model.clone());
    let models: Vec<&str> = aggregate.models().map(|(name, _)| name).collect();
    let sections = fields_by_section(&aggregate.all_field_paths());

    let mut out = String::new();
    let _ = writeln!(out, "# Field Recall Analysis Report");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Per-field recall of vision-model stem cell line curation against \
         human-curated ground truth."
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "- Generated at: {}", manifest.generated_at);
    let _ = writeln!(out, "- Models analyzed: {}", manifest.summary.total_models);
    let _ = writeln!(
        out,
        "- Documents scored: {}",
        manifest.summary.total_documents_scored
    );
    let _ = writeln!(
        out,
        "- Unique fields: {}",
        manifest.summary.total_unique_fields
    );
    let _ = writeln!(
        out,
        "- Unscoreable documents: {}",
        manifest.summary.total_failures
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "## Model Performance Summary");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Model | Avg Recall | Fields Analyzed |");
    let _ = writeln!(out, "|-------|------------|-----------------|");
    for (model, model_aggregate) in aggregate.models() {
        let _ = writeln!(
            out,
            "| {model} | {:.3} | {} |",
            model_aggregate.mean_recall(),
            model_aggregate.tallies().len()
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Field Recall by Section");
    let _ = writeln!(out);
    for (section, field_paths) in &sections {
        let _ = writeln!(out, "### {}", section_heading(section));
        let _ = writeln!(out);
        let mut header = "| Field |".to_string();
        let mut divider = "|-------|".to_string();
        for model in &models {
            let _ = write!(header, " {model} |");
            divider.push_str("--------|");
        }
        let _ = writeln!(out, "{header}");
        let _ = writeln!(out, "{divider}");

        for field_path in field_paths {
            let field_name = field_path.split_once('.').map_or("", |(_, name)| name);
            let mut row = format!("| {field_name} |");
            for (_, model_aggregate) in aggregate.models() {
                let recall = model_aggregate
                    .tallies()
                    .get(field_path)
                    .map(|tally| tally.recall())
                    .unwrap_or(0.0);
                let _ = write!(row, " {recall:.3} |");
            }
            let _ = writeln!(out, "{row}");
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## Performance Insights");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "### Best Performing Fields (avg recall >= {high_threshold:.1})"
    );
    let _ = writeln!(out);
    let best = aggregate.fields_at_or_above(high_threshold);
    if best.is_empty() {
        let _ = writeln!(
            out,
            "No fields reached average recall {high_threshold:.1} across models."
        );
    } else {
        for (path, average) in best {
            let _ = writeln!(out, "- **{path}**: {average:.3}");
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "### Challenging Fields (avg recall < {low_threshold:.1})"
    );
    let _ = writeln!(out);
    let worst = aggregate.fields_below(low_threshold);
    if worst.is_empty() {
        let _ = writeln!(
            out,
            "All fields reached average recall {low_threshold:.1} across models."
        );
    } else {
        for (path, average) in worst {
            let _ = writeln!(out, "- **{path}**: {average:.3}");
        }
    }

    out
}

/// Field paths grouped by section, each group sorted by field name.
fn fields_by_section(field_paths: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for field_path in field_paths {
        let Some((section, _)) = field_path.split_once('.') else {
            continue;
        };
        sections
            .entry(section.to_string())
            .or_default()
            .push(field_path.clone());
    }
    for group in sections.values_mut() {
        group.sort();
        group.dedup();
    }
    sections
}

fn section_heading(section: &str) -> String {
    section
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
