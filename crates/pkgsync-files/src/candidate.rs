//! Candidate enumeration and validation for a single path template.

use crate::artifact::{ArtifactPath, ArtifactSource};
use crate::params::{ParameterSet, FILENAME_KEY};
use crate::parser::Parser;
use crate::transport::TransportLog;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// Property kind handed to [`Parser::validate`].
pub const PROPERTIES_KIND: &str = "properties";

/// A concrete template: literal prefix, glob suffix and constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    pub fixed_prefix: PathBuf,
    pub glob_suffix: String,
    pub constraints: ParameterSet,
}

impl PathTemplate {
    /// Split a concrete template string with the parser.
    pub fn split(parser: &dyn Parser, path: &str, constraints: &ParameterSet) -> Self {
        let (fixed_prefix, glob_suffix) = parser.split_fixed_pattern(path);
        Self {
            fixed_prefix,
            glob_suffix,
            constraints: constraints.clone(),
        }
    }
}

/// How far a candidate got through validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Mark {
    /// Enumerated only.
    Found,
    /// Passed structural validation.
    Match,
    /// Passed property validation too.
    Valid,
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found => write!(f, "found"),
            Self::Match => write!(f, "match"),
            Self::Valid => write!(f, "valid"),
        }
    }
}

/// A filesystem entry discovered under a template.
#[derive(Debug, Clone)]
pub struct CandidateArtifact {
    pub location: ArtifactPath,
    /// Fetched only once the candidate matches structurally.
    pub properties: Option<ParameterSet>,
    /// Constraints narrowed to this entry, plus `filename`.
    pub derived: ParameterSet,
}

impl CandidateArtifact {
    #[must_use]
    pub fn new(location: ArtifactPath) -> Self {
        Self {
            location,
            properties: None,
            derived: ParameterSet::new(),
        }
    }
}

/// Enumerate the template and keep the candidates that pass both checks.
///
/// A transport error ends the enumeration for this template; it is logged
/// through `log` and whatever was validated before it is kept.
pub fn valid_candidates(
    source: &dyn ArtifactSource,
    parser: &dyn Parser,
    template: &PathTemplate,
    log: &mut TransportLog,
) -> Vec<CandidateArtifact> {
    let mut valid = Vec::new();

    for entry in source.enumerate(&template.fixed_prefix, &template.glob_suffix) {
        let artifact = match entry {
            Ok(artifact) => artifact,
            Err(err) => {
                log.log(&err);
                break;
            }
        };

        let (mark, candidate) = validate(parser, CandidateArtifact::new(artifact), template);
        debug!("  {}: {}", mark, candidate.location);
        if mark == Mark::Valid {
            valid.push(candidate);
        }
    }

    valid
}

/// Run structural then property validation on one candidate.
pub fn validate(
    parser: &dyn Parser,
    mut candidate: CandidateArtifact,
    template: &PathTemplate,
) -> (Mark, CandidateArtifact) {
    let location = candidate.location.path().to_string_lossy().into_owned();
    if !parser.validate_path(&location, &template.constraints) {
        return (Mark::Found, candidate);
    }

    let properties = match candidate.location.properties() {
        Ok(properties) => properties,
        Err(e) => {
            debug!("  properties unavailable for {}: {}", candidate.location, e);
            return (Mark::Match, candidate);
        }
    };

    let (ok, mut params) = parser.validate(&properties, PROPERTIES_KIND, &template.constraints);
    candidate.properties = Some(properties);
    if !ok {
        return (Mark::Match, candidate);
    }

    params.insert(FILENAME_KEY, candidate.location.name());
    candidate.derived = params;
    (Mark::Valid, candidate)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::artifact::{Artifacts, MemoryProperties};
    use crate::parser::{DependencyInput, ParserError, PathGroup, Source, Survivor};
    use crate::transport::TransportError;
    use std::path::Path;
    use std::sync::Arc;

    /// Parser that validates `version` by equality and passes everything else.
    pub(crate) struct EqParser;

    impl Parser for EqParser {
        fn get_paths(
            &self,
            _input: &DependencyInput,
            _source: &Source,
        ) -> Result<Vec<PathGroup>, ParserError> {
            Ok(Vec::new())
        }

        fn split_fixed_pattern(&self, path: &str) -> (PathBuf, String) {
            let (fixed, pattern) = path.rsplit_once('/').unwrap_or(("", path));
            (PathBuf::from(fixed), pattern.to_string())
        }

        fn validate_path(&self, path: &str, params: &ParameterSet) -> bool {
            params.get("package").map_or(true, |name| path.contains(name))
        }

        fn validate(
            &self,
            properties: &ParameterSet,
            _kind: &str,
            params: &ParameterSet,
        ) -> (bool, ParameterSet) {
            let mut out = params.clone();
            for (key, value) in properties.iter() {
                match params.get(key) {
                    Some(expected) if expected != "*" && expected != value => {
                        return (false, ParameterSet::new())
                    }
                    _ => {
                        out.insert(key, value);
                    }
                }
            }
            (true, out)
        }

        fn filter_one(
            &self,
            candidates: Vec<CandidateArtifact>,
            _params: &ParameterSet,
        ) -> Vec<Survivor> {
            candidates
                .into_iter()
                .map(|candidate| Survivor {
                    candidate,
                    params: ParameterSet::new(),
                })
                .collect()
        }
    }

    /// Source replaying a fixed script of results.
    pub(crate) struct Scripted(pub Vec<Result<&'static str, TransportError>>);

    impl ArtifactSource for Scripted {
        fn enumerate<'a>(&'a self, _fixed: &Path, _pattern: &str) -> Artifacts<'a> {
            Box::new(
                self.0
                    .iter()
                    .map(|r| r.clone().map(ArtifactPath::bare)),
            )
        }
    }

    fn template(params: &[(&str, &str)]) -> PathTemplate {
        PathTemplate {
            fixed_prefix: PathBuf::from("/repo"),
            glob_suffix: "*.pkg".to_string(),
            constraints: params.iter().copied().collect(),
        }
    }

    #[test]
    fn structural_mismatch_is_only_found() {
        let candidate = CandidateArtifact::new(ArtifactPath::bare("/repo/libbar-1.0.pkg"));
        let (mark, candidate) = validate(&EqParser, candidate, &template(&[("package", "libfoo")]));
        assert_eq!(mark, Mark::Found);
        assert!(candidate.properties.is_none());
    }

    #[test]
    fn property_mismatch_is_only_match() {
        let store = Arc::new(MemoryProperties::new().with(
            "/repo/libfoo-1.0.pkg",
            [("version", "1.0")].into_iter().collect(),
        ));
        let candidate = CandidateArtifact::new(ArtifactPath::new("/repo/libfoo-1.0.pkg", store));
        let (mark, candidate) = validate(
            &EqParser,
            candidate,
            &template(&[("package", "libfoo"), ("version", "2.0")]),
        );
        assert_eq!(mark, Mark::Match);
        assert!(candidate.derived.is_empty());
    }

    #[test]
    fn valid_candidate_gets_filename() {
        let store = Arc::new(MemoryProperties::new().with(
            "/repo/libfoo-2.0.pkg",
            [("version", "2.0")].into_iter().collect(),
        ));
        let candidate = CandidateArtifact::new(ArtifactPath::new("/repo/libfoo-2.0.pkg", store));
        let (mark, candidate) = validate(
            &EqParser,
            candidate,
            &template(&[("package", "libfoo"), ("version", "*")]),
        );
        assert_eq!(mark, Mark::Valid);
        assert_eq!(candidate.derived.get("version"), Some("2.0"));
        assert_eq!(candidate.derived.get(FILENAME_KEY), Some("libfoo-2.0.pkg"));
    }

    #[test]
    fn transport_error_stops_enumeration() {
        let source = Scripted(vec![
            Ok("/repo/libfoo-1.0.pkg"),
            Err(TransportError::new(404, "Not Found")),
            Ok("/repo/libfoo-2.0.pkg"),
        ]);
        let mut log = TransportLog::new();
        let valid = valid_candidates(&source, &EqParser, &template(&[("package", "libfoo")]), &mut log);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].location.name(), "libfoo-1.0.pkg");
    }
}
