//! The local-filesystem adapter.
//!
//! [`FilesAdapter::get_packages`] drives one resolution pass:
//! 1. the parser expands the dependencies into path groups
//! 2. each group is resolved against the artifact source
//! 3. the outcome is offered to the downloader and recorded in the registry
//! 4. newly accepted packages are synced into the cache and their
//!    dependency files handed to the dependency parser

use crate::artifact::{ArtifactPath, ArtifactSource, LocalFiles};
use crate::cascade::{self, CascadeError};
use crate::config::Config;
use crate::downloader::Downloader;
use crate::package::ResolvedPackage;
use crate::parser::{DependencyInput, DependencyParser, Parser, ParserError, PathGroup, Source};
use crate::registry::PackageRegistry;
use crate::resolve::{ResolveError, Resolver};
use crate::sync::{PackageFetcher, SyncError, SyncOutcome, Synchronizer};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that abort a resolution pass.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Cascade(#[from] CascadeError),
}

/// Resolves and syncs packages stored on a filesystem.
pub struct FilesAdapter {
    config: Config,
    source: Arc<dyn ArtifactSource>,
    fetcher: Arc<Synchronizer>,
    deps_parser: Option<Arc<dyn DependencyParser>>,
}

impl FilesAdapter {
    /// Create an adapter over the local filesystem.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source: Arc::new(LocalFiles::new()),
            fetcher: Arc::new(Synchronizer),
            deps_parser: None,
        }
    }

    /// Enumerate artifacts through `source` instead.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn ArtifactSource>) -> Self {
        self.source = source;
        self
    }

    /// Follow dependency files of materialized packages with `parser`.
    #[must_use]
    pub fn with_dependency_parser(mut self, parser: Arc<dyn DependencyParser>) -> Self {
        self.deps_parser = Some(parser);
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve every dependency in `input` against `source`.
    ///
    /// Ambiguity and sync failures abort the pass. Names that resolve to
    /// nothing are recorded as absent unless `no_fails` is set.
    pub fn get_packages(
        &self,
        source: &Source,
        parser: &Arc<dyn Parser>,
        downloader: &dyn Downloader,
        input: &DependencyInput,
    ) -> Result<PackageRegistry, AdapterError> {
        let groups = parser.get_paths(input, source)?;
        let resolver = Resolver::new(
            Arc::clone(&self.source),
            Arc::clone(parser),
            Arc::clone(&self.fetcher) as Arc<dyn PackageFetcher>,
        );
        let registry = PackageRegistry::new();

        info!("{}: {} dependencies", source.name, groups.len());
        if self.config.parallel {
            self.resolve_parallel(&resolver, &groups, downloader, &registry)?;
        } else {
            self.resolve_sequential(&resolver, &groups, downloader, &registry)?;
        }
        Ok(registry)
    }

    fn resolve_sequential(
        &self,
        resolver: &Resolver,
        groups: &[PathGroup],
        downloader: &dyn Downloader,
        registry: &PackageRegistry,
    ) -> Result<(), AdapterError> {
        let mut last_name: Option<String> = None;
        for group in groups {
            let name = self.package_name(group)?;
            if last_name.as_deref() != Some(name) {
                info!("{}: {}", name, group.params.without(&self.config.name_column));
                last_name = Some(name.to_string());
            }

            let package = resolver.resolve_group(name, group)?;
            if let Some(accepted) = self.register(name, package, downloader, registry) {
                self.materialize(&accepted, downloader)?;
            }
        }
        Ok(())
    }

    /// Resolve groups on the rayon pool, then register them in input order.
    ///
    /// Accepted packages target distinct cache paths and are materialized
    /// concurrently.
    fn resolve_parallel(
        &self,
        resolver: &Resolver,
        groups: &[PathGroup],
        downloader: &dyn Downloader,
        registry: &PackageRegistry,
    ) -> Result<(), AdapterError> {
        let resolved = groups
            .par_iter()
            .map(|group| -> Result<_, AdapterError> {
                let name = self.package_name(group)?;
                info!("{}: {}", name, group.params.without(&self.config.name_column));
                Ok((name, resolver.resolve_group(name, group)?))
            })
            .collect::<Result<Vec<_>, AdapterError>>()?;

        let accepted: Vec<_> = resolved
            .into_iter()
            .filter_map(|(name, package)| self.register(name, package, downloader, registry))
            .collect();

        accepted
            .par_iter()
            .try_for_each(|package| self.materialize(package, downloader))
    }

    fn package_name<'g>(&self, group: &'g PathGroup) -> Result<&'g str, ResolveError> {
        group
            .params
            .get(&self.config.name_column)
            .ok_or_else(|| ResolveError::MissingName {
                column: self.config.name_column.clone(),
                params: group.params.clone(),
            })
    }

    /// Offer one outcome to the downloader and record its answer.
    ///
    /// A package the downloader already holds for the name is recorded even
    /// when this source found nothing. Returns the package when it was newly
    /// accepted.
    fn register(
        &self,
        name: &str,
        package: Option<ResolvedPackage>,
        downloader: &dyn Downloader,
        registry: &PackageRegistry,
    ) -> Option<Arc<ResolvedPackage>> {
        let (added, held) = if package.is_some() || !self.config.no_fails {
            downloader.add_package(name, package)
        } else {
            (false, None)
        };

        match held {
            Some(held) => {
                let recorded = registry.record_resolved(held);
                added.then_some(recorded)
            }
            None if added => {
                if registry.record_absent(name) {
                    debug!("{}: not found", name);
                }
                None
            }
            None => None,
        }
    }

    fn materialize(
        &self,
        package: &ResolvedPackage,
        downloader: &dyn Downloader,
    ) -> Result<(), AdapterError> {
        if !downloader.do_load() {
            return Ok(());
        }
        cascade::materialize(
            package,
            &self.config,
            downloader.temp_path(),
            self.deps_parser.as_deref(),
        )?;
        Ok(())
    }

    /// Copy `package` to `dest` unless an up-to-date copy exists.
    pub fn download_package(
        &self,
        package: &ResolvedPackage,
        dest: &Path,
    ) -> Result<SyncOutcome, SyncError> {
        self.fetcher.sync(package, dest)
    }

    /// Basename of an artifact.
    #[must_use]
    pub fn get_package_filename(&self, artifact: &ArtifactPath) -> String {
        artifact.name()
    }

    /// Full path of an artifact.
    #[must_use]
    pub fn get_package_path(&self, artifact: &ArtifactPath) -> String {
        artifact.path().to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::tests::Scripted;
    use crate::downloader::SessionDownloader;
    use crate::params::ParameterSet;
    use crate::template::TemplateParser;
    use crate::transport::TransportError;

    fn rows(names: &[&str]) -> DependencyInput {
        DependencyInput::Rows(
            names
                .iter()
                .map(|name| [("package", *name)].into_iter().collect())
                .collect(),
        )
    }

    fn parser() -> Arc<dyn Parser> {
        Arc::new(
            TemplateParser::new(["package", "version"])
                .with_template("{root}/{package}-{version}.pkg")
                .unwrap(),
        )
    }

    fn adapter(config: Config, script: Vec<Result<&'static str, TransportError>>) -> FilesAdapter {
        FilesAdapter::new(config).with_source(Arc::new(Scripted(script)))
    }

    fn resolve(adapter: &FilesAdapter, input: &DependencyInput) -> Result<PackageRegistry, AdapterError> {
        let downloader = SessionDownloader::new("/tmp/unused").without_load();
        adapter.get_packages(&Source::new("local", "/repo"), &parser(), &downloader, input)
    }

    #[test]
    fn missing_name_column_is_an_error() {
        let adapter = adapter(Config::default(), vec![]);
        let input = DependencyInput::Rows(vec![[("version", "1.0")].into_iter().collect::<ParameterSet>()]);
        assert!(matches!(
            resolve(&adapter, &input),
            Err(AdapterError::Resolve(ResolveError::MissingName { .. }))
        ));
    }

    #[test]
    fn unresolved_name_is_absent_when_required() {
        let adapter = adapter(Config::default(), vec![]);
        let registry = resolve(&adapter, &rows(&["libfoo"])).unwrap();
        assert!(registry.is_absent("libfoo"));
    }

    #[test]
    fn unresolved_name_is_omitted_with_no_fails() {
        let config = Config {
            no_fails: true,
            ..Config::default()
        };
        let registry = resolve(&adapter(config, vec![]), &rows(&["libfoo"])).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn repeated_name_resolves_once() {
        let adapter = adapter(Config::default(), vec![Ok("/repo/libfoo-1.0.pkg")]);
        let registry = resolve(&adapter, &rows(&["libfoo", "libfoo"])).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("libfoo").unwrap().filename(), "libfoo-1.0.pkg");
    }

    #[test]
    fn earlier_resolution_is_recorded_by_a_source_without_it() {
        let downloader = SessionDownloader::new("/tmp/unused").without_load();
        let source = Source::new("local", "/repo");
        let input = rows(&["libfoo"]);

        let first = adapter(Config::default(), vec![Ok("/repo/libfoo-1.0.pkg")])
            .get_packages(&source, &parser(), &downloader, &input)
            .unwrap();
        let second = adapter(Config::default(), vec![])
            .get_packages(&source, &parser(), &downloader, &input)
            .unwrap();

        let held = second.resolve("libfoo").unwrap();
        assert!(Arc::ptr_eq(&held, &first.resolve("libfoo").unwrap()));
        assert!(!second.is_absent("libfoo"));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn parallel_pass_matches_sequential() {
        let config = Config {
            parallel: true,
            ..Config::default()
        };
        let adapter = adapter(config, vec![Ok("/repo/libfoo-1.0.pkg"), Ok("/repo/libbar-2.0.pkg")]);
        let registry = resolve(&adapter, &rows(&["libfoo", "libbar", "libbaz"])).unwrap();
        assert_eq!(
            registry.resolve("libfoo").unwrap().location().name(),
            "libfoo-1.0.pkg"
        );
        assert_eq!(
            registry.resolve("libbar").unwrap().location().name(),
            "libbar-2.0.pkg"
        );
        assert!(registry.is_absent("libbaz"));
    }

    #[test]
    fn artifact_helpers() {
        let adapter = FilesAdapter::new(Config::default());
        let artifact = ArtifactPath::bare("/repo/libfoo/libfoo-2.0.pkg");
        assert_eq!(adapter.get_package_filename(&artifact), "libfoo-2.0.pkg");
        assert_eq!(adapter.get_package_path(&artifact), "/repo/libfoo/libfoo-2.0.pkg");
    }
}
