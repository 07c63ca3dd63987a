//! Constraint and metadata parameter sets.
//!
//! A [`ParameterSet`] maps a constraint column (e.g. `package`, `version`,
//! `osname`) to a value. The same type carries match constraints going into
//! resolution and the narrowed metadata coming out of it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Characters that turn a parameter value into a glob pattern.
const GLOB_META: &[char] = &['*', '?', '['];

/// Operators that turn a parameter value into a version range.
const RANGE_OPERATORS: &[char] = &['^', '~', '>', '<', '=', ','];

/// The key synthesized for the artifact basename after validation.
pub const FILENAME_KEY: &str = "filename";

/// Ordered mapping from constraint column to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: BTreeMap<String, String>,
}

impl ParameterSet {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by column.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    /// Remove a column.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Check whether a column is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Iterate over columns in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over column names in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Merge `other` into `self` without overwriting existing keys.
    ///
    /// Keys already present win; only missing keys are taken from `other`.
    pub fn merge_missing(&mut self, other: &ParameterSet) {
        for (key, value) in &other.values {
            self.values
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// A copy of this set without the given column.
    #[must_use]
    pub fn without(&self, key: &str) -> Self {
        let mut values = self.values.clone();
        values.remove(key);
        Self { values }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// How a single parameter value constrains a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A literal value that must match exactly.
    Scalar,
    /// A glob pattern (`*`, `?`, `[..]`).
    Glob,
    /// A semver range such as `>=1.2, <2` or `^1.0`.
    Range,
}

impl ValueKind {
    /// Classify a raw parameter value.
    #[must_use]
    pub fn of(value: &str) -> Self {
        if value.contains(GLOB_META) {
            Self::Glob
        } else if value.starts_with(RANGE_OPERATORS) || value.contains(',') {
            Self::Range
        } else {
            Self::Scalar
        }
    }

    /// Whether the value leaves the column open to more than one candidate.
    #[must_use]
    pub fn is_pattern(self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_missing_keeps_existing_values() {
        let mut resolved: ParameterSet = [("package", "libfoo"), ("version", "2.0")]
            .into_iter()
            .collect();
        let tie_break: ParameterSet = [("version", "9.9"), ("osname", "linux")]
            .into_iter()
            .collect();

        resolved.merge_missing(&tie_break);

        assert_eq!(resolved.get("version"), Some("2.0"));
        assert_eq!(resolved.get("osname"), Some("linux"));
        assert_eq!(resolved.len(), 3);
    }

    #[test]
    fn without_drops_only_named_column() {
        let params: ParameterSet = [("package", "libfoo"), ("version", "1.0")]
            .into_iter()
            .collect();
        let rest = params.without("package");
        assert!(!rest.contains_key("package"));
        assert_eq!(rest.get("version"), Some("1.0"));
        assert!(params.contains_key("package"));
    }

    #[test]
    fn classify_values() {
        assert_eq!(ValueKind::of("1.0"), ValueKind::Scalar);
        assert_eq!(ValueKind::of("1.*"), ValueKind::Glob);
        assert_eq!(ValueKind::of("x86_[36]4"), ValueKind::Glob);
        assert_eq!(ValueKind::of(">=1.2"), ValueKind::Range);
        assert_eq!(ValueKind::of("^1.0"), ValueKind::Range);
        assert_eq!(ValueKind::of(">=1, <2"), ValueKind::Range);
        assert!(!ValueKind::Scalar.is_pattern());
    }

    #[test]
    fn display_is_ordered() {
        let params: ParameterSet = [("version", "1.0"), ("package", "a")].into_iter().collect();
        assert_eq!(params.to_string(), "{package: a, version: 1.0}");
    }
}
