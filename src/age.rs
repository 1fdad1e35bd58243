use anyhow::{Context, Result};
use regex::Regex;

use crate::compare::FieldComparator;

/// Age-range-aware equivalence for the `donor.age` field.
///
/// Registries record donor ages either as a single integer (`"27"`) or as a
/// five-year bucket (`"25_29"`, sometimes hyphenated). The default exact
/// comparator scores `"27"` against `"25_29"` as a miss even though the value
/// is semantically consistent; this matcher recognizes the equivalence.
pub struct AgeMatcher {
    range_pattern: Regex,
}

impl AgeMatcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            range_pattern: Regex::new(r"^(\d{1,3})\s*[_-]\s*(\d{1,3})$")
                .context("failed to compile age range pattern")?,
        })
    }

    /// Parses a delimited range like `"25_29"` or `"25-29"` into inclusive
    /// bounds. Returns `None` for anything else.
    pub fn parse_range(&self, raw: &str) -> Option<(i64, i64)> {
        let captures = self.range_pattern.captures(raw.trim())?;
        let low = captures.get(1)?.as_str().parse().ok()?;
        let high = captures.get(2)?.as_str().parse().ok()?;
        Some((low, high))
    }

    /// Parses a single age, tolerating float renderings like `"25.0"`.
    pub fn parse_single(&self, raw: &str) -> Option<i64> {
        let trimmed = raw.trim();
        if let Ok(age) = trimmed.parse::<i64>() {
            return Some(age);
        }
        trimmed.parse::<f64>().ok().map(|age| age.trunc() as i64)
    }

    /// Whether two age values describe the same donor age.
    ///
    /// Holds for an exact string match, a single age inside the other side's
    /// range (either direction), or two ranges with identical bounds.
    /// Unparseable values are never equivalent.
    pub fn equivalent(&self, gt_value: &str, model_value: &str) -> bool {
        let gt_value = gt_value.trim();
        let model_value = model_value.trim();
        if gt_value.is_empty() || model_value.is_empty() {
            return false;
        }
        if gt_value == model_value {
            return true;
        }

        if let Some((low, high)) = self.parse_range(gt_value) {
            if let Some(age) = self.parse_single(model_value) {
                return low <= age && age <= high;
            }
            if let Some(model_range) = self.parse_range(model_value) {
                return (low, high) == model_range;
            }
            return false;
        }

        if let Some(age) = self.parse_single(gt_value) {
            if let Some((low, high)) = self.parse_range(model_value) {
                return low <= age && age <= high;
            }
            if let Some(model_age) = self.parse_single(model_value) {
                return age == model_age;
            }
        }

        false
    }
}

impl FieldComparator for AgeMatcher {
    fn values_match(&self, gt_value: &str, model_value: &str) -> bool {
        self.equivalent(gt_value, model_value)
    }
}
