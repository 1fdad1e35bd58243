use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::score::aggregate::FieldTally;

/// One extracted record: field name to scalar value.
pub type Record = serde_json::Map<String, Value>;

/// A cell line described as section-name → record array. Every section body
/// is an array even when the section is contractually single-item; that
/// contract lives in `ScoringConfig`, not in the document shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellLineDocument {
    sections: BTreeMap<String, Vec<Record>>,
}

impl CellLineDocument {
    /// Builds a document from raw JSON, tolerating the scalar bookkeeping
    /// keys and stray shapes the upstream flattening stage can emit:
    /// non-array section bodies and non-object records are skipped with a
    /// warning rather than failing the whole document.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(top) = value else {
            bail!("document root must be a JSON object");
        };

        let mut sections = BTreeMap::new();
        for (section_name, body) in top {
            let Value::Array(items) = body else {
                warn!(section = %section_name, "skipping non-array section body");
                continue;
            };

            let mut records = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Object(record) => records.push(record),
                    _ => warn!(section = %section_name, "skipping non-object record"),
                }
            }
            sections.insert(section_name, records);
        }

        Ok(Self { sections })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let value: Value = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Self::from_value(value).with_context(|| format!("invalid document {}", path.display()))
    }

    /// Records of a section; absent sections read as empty.
    pub fn section(&self, name: &str) -> &[Record] {
        self.sections.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Success,
    MissingSection,
    GtCardinalityViolation,
    ModelCardinalityViolation,
    PartialMatchWithConservativePenalty,
    AmbiguousMatchesSkipped,
}

impl SectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::MissingSection => "missing_section",
            Self::GtCardinalityViolation => "gt_cardinality_violation",
            Self::ModelCardinalityViolation => "model_cardinality_violation",
            Self::PartialMatchWithConservativePenalty => "partial_match_with_conservative_penalty",
            Self::AmbiguousMatchesSkipped => "ambiguous_matches_skipped",
        }
    }

    /// Ground-truth-side data issues are excluded from aggregate sums;
    /// model-side failures still contribute their denominators.
    pub fn counts_toward_aggregate(self) -> bool {
        !matches!(self, Self::MissingSection | Self::GtCardinalityViolation)
    }
}

/// Immutable per-(document-pair, section) scoring result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionScore {
    pub section: String,
    pub matched_fields: u64,
    pub total_gt_fields: u64,
    pub recall: f64,
    pub status: SectionStatus,
    pub message: String,
    pub gt_items: usize,
    pub model_items: usize,
    pub matched_pairs: usize,
    /// Ground-truth records excluded because several model records shared
    /// their matching key.
    pub ambiguous_items: usize,
    /// Ground-truth records excluded because their matching key was missing.
    pub unkeyed_items: usize,
}

impl SectionScore {
    pub fn new(section: &str, gt_items: usize, model_items: usize) -> Self {
        Self {
            section: section.to_string(),
            matched_fields: 0,
            total_gt_fields: 0,
            recall: 0.0,
            status: SectionStatus::Success,
            message: String::new(),
            gt_items,
            model_items,
            matched_pairs: 0,
            ambiguous_items: 0,
            unkeyed_items: 0,
        }
    }

    /// Sets matched/total and the derived recall (0.0 on a zero total).
    pub fn set_counts(&mut self, matched: u64, total: u64) {
        self.matched_fields = matched;
        self.total_gt_fields = total;
        self.recall = if total > 0 {
            matched as f64 / total as f64
        } else {
            0.0
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub cell_line: String,
    pub gt_sha256: String,
    pub model_sha256: String,
    pub sections: Vec<SectionScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub cell_line: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRunReport {
    pub model_name: String,
    pub documents: Vec<DocumentReport>,
    pub failures: Vec<DocumentFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_models: usize,
    pub total_documents_scored: usize,
    pub total_failures: usize,
    pub total_unique_fields: usize,
}

/// Versioned output of the `batch` subcommand and input to `report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReportManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub results_dir: String,
    pub models: Vec<ModelRunReport>,
    pub field_tallies_by_model: BTreeMap<String, BTreeMap<String, FieldTally>>,
    pub field_recall_by_model: BTreeMap<String, BTreeMap<String, f64>>,
    pub summary: BatchSummary,
}
