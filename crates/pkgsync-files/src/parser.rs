//! Contracts for the path-template and dependency-file parser.
//!
//! Resolution treats the parser as an opaque service: it expands dependency
//! rows into path templates, validates candidate paths and properties, and
//! breaks ties between valid candidates.

use crate::artifact::ArtifactPath;
use crate::candidate::CandidateArtifact;
use crate::params::ParameterSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while parsing templates or dependency files.
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("failed to read dependency file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("dependency row {line} in {path} has {found} columns, expected at most {expected}")]
    TooManyColumns {
        path: PathBuf,
        line: usize,
        found: usize,
        expected: usize,
    },

    #[error("template regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// A repository location that path templates are expanded against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Display name used in logs.
    pub name: String,
    /// Root directory substituted for the `{root}` placeholder.
    pub root: PathBuf,
}

impl Source {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }
}

/// The dependencies to resolve: explicit rows or a dependency file.
#[derive(Debug, Clone)]
pub enum DependencyInput {
    Rows(Vec<ParameterSet>),
    File(PathBuf),
}

/// One logical package: its constraints and candidate path templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGroup {
    pub params: ParameterSet,
    pub paths: Vec<String>,
}

/// A valid candidate that survived tie-breaking, with the parameters the
/// tie-break derived for it.
#[derive(Debug, Clone)]
pub struct Survivor {
    pub candidate: CandidateArtifact,
    pub params: ParameterSet,
}

impl Survivor {
    #[must_use]
    pub fn path(&self) -> &ArtifactPath {
        &self.candidate.location
    }
}

/// The template parser consumed by resolution.
pub trait Parser: Send + Sync {
    /// Expand dependencies into one [`PathGroup`] per logical package.
    fn get_paths(
        &self,
        input: &DependencyInput,
        source: &Source,
    ) -> Result<Vec<PathGroup>, ParserError>;

    /// Split a concrete template into its literal prefix and glob suffix.
    fn split_fixed_pattern(&self, path: &str) -> (PathBuf, String);

    /// Structural check of a discovered path against the constraints.
    fn validate_path(&self, path: &str, params: &ParameterSet) -> bool;

    /// Check properties of the given kind against the constraints.
    ///
    /// Returns whether they match and the constraints refined by them.
    fn validate(
        &self,
        properties: &ParameterSet,
        kind: &str,
        params: &ParameterSet,
    ) -> (bool, ParameterSet);

    /// Reduce valid candidates to as few as possible.
    fn filter_one(&self, candidates: Vec<CandidateArtifact>, params: &ParameterSet)
        -> Vec<Survivor>;
}

/// Reads a dependency file into constraint rows.
pub trait DependencyParser: Send + Sync {
    fn find_dependencies(&self, deps_file: &Path) -> Result<Vec<ParameterSet>, ParserError>;
}
