//! Materialization of newly resolved packages and the dependency cascade.
//!
//! Once a package is accepted for loading it is synced into the cache, then
//! its lock-style dependency file (or, failing that, its plain dependency
//! file) is handed to the dependency parser.

use crate::config::Config;
use crate::package::{PackageError, ResolvedPackage};
use crate::parser::{DependencyParser, ParserError};
use crate::sync::{SyncError, SyncOutcome};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while materializing a package or following its
/// dependency file.
#[derive(Error, Debug)]
pub enum CascadeError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("failed to inspect package {package}: {source}")]
    Package {
        package: String,
        #[source]
        source: PackageError,
    },

    #[error(transparent)]
    Parser(#[from] ParserError),
}

/// What materializing one package did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub sync: SyncOutcome,
    pub deps_file: Option<PathBuf>,
    /// Dependency rows handed over by the dependency parser.
    pub dependencies: usize,
}

/// Locate the dependency file shipped with `package`.
///
/// The lock file wins; the plain dependency file is consulted only when
/// configured and no lock file exists.
pub fn dependency_file(
    package: &ResolvedPackage,
    config: &Config,
    temp_path: &Path,
) -> Result<Option<PathBuf>, PackageError> {
    if let Some(lock) = package.get_file(&config.deps_lock_file_name, temp_path)? {
        return Ok(Some(lock));
    }
    match &config.deps_file_name {
        Some(name) => package.get_file(name, temp_path),
        None => Ok(None),
    }
}

/// Sync `package` into the cache and follow its dependency file.
pub fn materialize(
    package: &ResolvedPackage,
    config: &Config,
    temp_path: &Path,
    deps_parser: Option<&dyn DependencyParser>,
) -> Result<CascadeOutcome, CascadeError> {
    let dest = config.cache.path_packed(package);
    let sync = package.download(&dest)?;

    let deps_file =
        dependency_file(package, config, temp_path).map_err(|source| CascadeError::Package {
            package: package.name().to_string(),
            source,
        })?;

    let mut dependencies = 0;
    match (&deps_file, deps_parser) {
        (Some(file), Some(parser)) => {
            dependencies = package.find_dependencies(file, parser)?;
            info!(
                "{}: {} dependencies from {}",
                package.name(),
                dependencies,
                file.display()
            );
        }
        (Some(file), None) => {
            debug!("{}: no dependency parser for {}", package.name(), file.display());
        }
        (None, _) => {}
    }

    Ok(CascadeOutcome {
        sync,
        deps_file,
        dependencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::tests::package_at;
    use crate::params::ParameterSet;
    use std::fs;
    use tempfile::TempDir;

    /// Counts lines as dependency rows.
    struct LineParser;

    impl DependencyParser for LineParser {
        fn find_dependencies(&self, deps_file: &Path) -> Result<Vec<ParameterSet>, ParserError> {
            let content = fs::read_to_string(deps_file).map_err(|source| ParserError::Io {
                path: deps_file.to_path_buf(),
                source,
            })?;
            Ok(content
                .lines()
                .map(|line| [("package", line)].into_iter().collect())
                .collect())
        }
    }

    fn fixture(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("libfoo-2.0.pkg"), "payload").unwrap();
        for (name, content) in files {
            fs::write(repo.join(name), content).unwrap();
        }
        let artifact = repo.join("libfoo-2.0.pkg");
        (tmp, artifact)
    }

    fn config(tmp: &TempDir) -> Config {
        Config::default().with_cache_root(tmp.path().join("cache"))
    }

    #[test]
    fn lock_file_wins_over_plain_file() {
        let (tmp, artifact) = fixture(&[
            ("dependencies.txt.lock", "libbar\nlibbaz"),
            ("dependencies.txt", "libqux"),
        ]);
        let mut config = config(&tmp);
        config.deps_file_name = Some("dependencies.txt".to_string());
        let pkg = package_at("libfoo", &artifact);

        let outcome = materialize(&pkg, &config, &tmp.path().join("temp"), Some(&LineParser)).unwrap();

        assert!(outcome.sync.copied);
        assert_eq!(
            outcome.deps_file.as_deref(),
            Some(tmp.path().join("repo/dependencies.txt.lock").as_path())
        );
        assert_eq!(outcome.dependencies, 2);
        assert_eq!(pkg.dependencies().len(), 2);
        assert!(pkg.deps_file().is_some());
        assert_eq!(pkg.packed_path(), Some(outcome.sync.path.clone()));
    }

    #[test]
    fn falls_back_to_plain_file_when_configured() {
        let (tmp, artifact) = fixture(&[("dependencies.txt", "libqux")]);
        let mut config = config(&tmp);
        let pkg = package_at("libfoo", &artifact);

        assert_eq!(dependency_file(&pkg, &config, tmp.path()).unwrap(), None);

        config.deps_file_name = Some("dependencies.txt".to_string());
        let outcome = materialize(&pkg, &config, tmp.path(), Some(&LineParser)).unwrap();
        assert_eq!(outcome.dependencies, 1);
    }

    #[test]
    fn no_dependency_file_is_fine() {
        let (tmp, artifact) = fixture(&[]);
        let pkg = package_at("libfoo", &artifact);
        let outcome = materialize(&pkg, &config(&tmp), tmp.path(), Some(&LineParser)).unwrap();
        assert_eq!(outcome.deps_file, None);
        assert_eq!(outcome.dependencies, 0);
        assert!(pkg.dependencies().is_empty());
    }

    #[test]
    fn sync_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let pkg = package_at("libfoo", &tmp.path().join("absent.pkg"));
        let err = materialize(&pkg, &config(&tmp), tmp.path(), None).unwrap_err();
        assert!(matches!(err, CascadeError::Sync(_)));
    }
}
