use std::collections::BTreeMap;

use anyhow::Result;

use crate::age::AgeMatcher;
use crate::compare::ComparatorRegistry;

/// Cardinality contract for a section, fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionKind {
    SingleItem,
    MultiItem { key_field: String },
}

/// Sections of the Australian stem cell curation schema expected to hold
/// exactly one record.
const SINGLE_ITEM_SECTIONS: &[&str] = &[
    "basic_data",
    "culture_medium",
    "donor",
    "embryonic_derivation",
    "generator",
    "genomic_characterisation",
    "induced_derivation",
    "publications",
    "undifferentiated_characterisation",
];

/// Multi-item sections and the field used to pair records one-to-one.
const MULTI_ITEM_SECTIONS: &[(&str, &str)] = &[
    ("contact", "last_name"),
    ("differentiation_results", "cell_type"),
    ("ethics", "ethics_number"),
    ("genomic_modifications", "loci_name"),
];

/// Section classification plus the per-field comparator registry. Built
/// once and passed explicitly into every scorer entry point; nothing in the
/// scoring engine reads configuration from anywhere else.
pub struct ScoringConfig {
    sections: BTreeMap<String, SectionKind>,
    comparators: ComparatorRegistry,
}

impl ScoringConfig {
    pub fn new(sections: BTreeMap<String, SectionKind>) -> Self {
        Self {
            sections,
            comparators: ComparatorRegistry::default(),
        }
    }

    /// The production stem cell registry classification.
    pub fn stem_cell_registry() -> Self {
        let mut sections = BTreeMap::new();
        for section in SINGLE_ITEM_SECTIONS {
            sections.insert(section.to_string(), SectionKind::SingleItem);
        }
        for (section, key_field) in MULTI_ITEM_SECTIONS {
            sections.insert(
                section.to_string(),
                SectionKind::MultiItem {
                    key_field: key_field.to_string(),
                },
            );
        }
        Self::new(sections)
    }

    /// Registers the age-range comparator for `donor.age`, so a single
    /// reported age scores as a match against a ground-truth range.
    pub fn with_semantic_age(mut self) -> Result<Self> {
        self.comparators
            .register("donor.age", Box::new(AgeMatcher::new()?));
        Ok(self)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &SectionKind)> {
        self.sections
            .iter()
            .map(|(name, kind)| (name.as_str(), kind))
    }

    pub fn section_kind(&self, name: &str) -> Option<&SectionKind> {
        self.sections.get(name)
    }

    pub fn comparators(&self) -> &ComparatorRegistry {
        &self.comparators
    }
}
