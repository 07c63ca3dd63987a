//! Resolution of one logical package name against one source.
//!
//! Each path template of a [`PathGroup`] is enumerated and validated into a
//! [`TemplateOutcome`], then reduced by the parser's tie-break:
//! - no survivor: try the next template
//! - one survivor: that is the package
//! - several survivors: [`ResolveError::MultipleInstances`], no fallback

use crate::artifact::ArtifactSource;
use crate::candidate::{valid_candidates, CandidateArtifact, PathTemplate};
use crate::package::ResolvedPackage;
use crate::params::ParameterSet;
use crate::parser::{Parser, PathGroup, Survivor};
use crate::sync::PackageFetcher;
use crate::transport::TransportLog;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors that can occur during resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// More than one valid candidate survived the tie-break.
    #[error("Multiple instances found for package [{package}]: {}", .candidates.join(", "))]
    MultipleInstances {
        package: String,
        candidates: Vec<String>,
    },

    /// The path group has no value for the name column.
    #[error("dependency has no '{column}' column: {params}")]
    MissingName {
        column: String,
        params: ParameterSet,
    },
}

/// The valid candidates one template produced.
#[derive(Debug, Clone)]
pub struct TemplateOutcome {
    pub template: PathTemplate,
    pub candidates: Vec<CandidateArtifact>,
}

/// Reduce valid candidates to at most one survivor.
pub fn disambiguate(
    parser: &dyn Parser,
    package: &str,
    candidates: Vec<CandidateArtifact>,
    params: &ParameterSet,
) -> Result<Option<Survivor>, ResolveError> {
    if candidates.is_empty() {
        return Ok(None);
    }

    let mut survivors = parser.filter_one(candidates, params);
    match survivors.len() {
        0 => Ok(None),
        1 => Ok(survivors.pop()),
        _ => Err(ResolveError::MultipleInstances {
            package: package.to_string(),
            candidates: survivors
                .iter()
                .map(|s| s.path().id().to_string())
                .collect(),
        }),
    }
}

/// Resolves path groups against an artifact source.
pub struct Resolver {
    source: Arc<dyn ArtifactSource>,
    parser: Arc<dyn Parser>,
    fetcher: Arc<dyn PackageFetcher>,
}

impl Resolver {
    pub fn new(
        source: Arc<dyn ArtifactSource>,
        parser: Arc<dyn Parser>,
        fetcher: Arc<dyn PackageFetcher>,
    ) -> Self {
        Self {
            source,
            parser,
            fetcher,
        }
    }

    /// Enumerate and validate one concrete template.
    pub fn outcome(&self, path: &str, params: &ParameterSet, log: &mut TransportLog) -> TemplateOutcome {
        let template = PathTemplate::split(self.parser.as_ref(), path, params);
        let candidates = valid_candidates(self.source.as_ref(), self.parser.as_ref(), &template, log);
        TemplateOutcome {
            template,
            candidates,
        }
    }

    /// Resolve `name` by trying each template of `group` in order.
    ///
    /// Returns `Ok(None)` when no template yields a package.
    pub fn resolve_group(
        &self,
        name: &str,
        group: &PathGroup,
    ) -> Result<Option<ResolvedPackage>, ResolveError> {
        let mut log = TransportLog::new();

        for path in &group.paths {
            let outcome = self.outcome(path, &group.params, &mut log);
            let Some(survivor) = disambiguate(
                self.parser.as_ref(),
                name,
                outcome.candidates,
                &outcome.template.constraints,
            )?
            else {
                continue;
            };

            info!("  chosen: {}", survivor.path());
            return Ok(Some(self.promote(name, survivor, &group.params)));
        }

        Ok(None)
    }

    /// Turn the surviving candidate into a resolved package.
    ///
    /// Values derived during validation win over tie-break values.
    fn promote(&self, name: &str, survivor: Survivor, constraints: &ParameterSet) -> ResolvedPackage {
        let mut params = survivor.candidate.derived;
        params.merge_missing(&survivor.params);
        ResolvedPackage::new(
            name,
            survivor.candidate.location,
            constraints.clone(),
            params,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.parser),
        )
    }
}
