//! Resolved packages and sidecar file lookup.
//!
//! A [`ResolvedPackage`] is the single candidate chosen for a logical
//! package name. Besides identifying the artifact, it can materialize it
//! through its source adapter and locate dependency files shipped with it:
//! ```text
//! libfoo-2.0.tgz            # archive: unpacked under <temp>/<name>/<basename>/
//! libfoo-2.0/               # directory artifact: looked up inside
//! libfoo-2.0.pkg            # plain file: sidecar looked up next to it
//! dependencies.txt.lock
//! ```

use crate::artifact::ArtifactPath;
use crate::params::{ParameterSet, FILENAME_KEY};
use crate::parser::{DependencyParser, Parser, ParserError};
use crate::sync::{PackageFetcher, StatSignature, SyncError, SyncOutcome};
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors that can occur when inspecting a package's contents.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to unpack {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Archive formats that are unpacked to look for sidecar files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    /// Detect the archive format from the file name.
    #[must_use]
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    fn unpack(self, archive: &Path, dest: &Path) -> Result<(), PackageError> {
        fs::create_dir_all(dest)?;
        match self {
            Self::TarGz => {
                let decoder = flate2::read::GzDecoder::new(File::open(archive)?);
                tar::Archive::new(decoder).unpack(dest)?;
            }
            Self::Zip => {
                let zip_err = |source| PackageError::Zip {
                    path: archive.to_path_buf(),
                    source,
                };
                let mut zip = zip::ZipArchive::new(File::open(archive)?).map_err(zip_err)?;
                zip.extract(dest).map_err(zip_err)?;
            }
        }
        Ok(())
    }
}

/// The package chosen for a logical name.
pub struct ResolvedPackage {
    name: String,
    location: ArtifactPath,
    constraints: ParameterSet,
    params: ParameterSet,
    adapter: Arc<dyn PackageFetcher>,
    parser: Arc<dyn Parser>,
    state: Mutex<Materialized>,
}

/// What the latest download and dependency lookup attached.
#[derive(Debug, Default)]
struct Materialized {
    packed: Option<PathBuf>,
    deps_file: Option<PathBuf>,
    dependencies: Vec<ParameterSet>,
}

impl ResolvedPackage {
    pub fn new(
        name: impl Into<String>,
        location: ArtifactPath,
        constraints: ParameterSet,
        params: ParameterSet,
        adapter: Arc<dyn PackageFetcher>,
        parser: Arc<dyn Parser>,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            constraints,
            params,
            adapter,
            parser,
            state: Mutex::new(Materialized::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, Materialized> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn location(&self) -> &ArtifactPath {
        &self.location
    }

    /// The constraints the package was resolved against.
    #[must_use]
    pub fn constraints(&self) -> &ParameterSet {
        &self.constraints
    }

    /// Resolved metadata: validated constraints, `filename`, tie-break values.
    #[must_use]
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    #[must_use]
    pub fn parser(&self) -> &Arc<dyn Parser> {
        &self.parser
    }

    /// The artifact basename as recorded during validation.
    #[must_use]
    pub fn filename(&self) -> String {
        self.params
            .get(FILENAME_KEY)
            .map_or_else(|| self.location.name(), str::to_string)
    }

    /// `name`, or `name: <location>` when `with_path` is set.
    #[must_use]
    pub fn name_and_path(&self, with_path: bool) -> String {
        if with_path {
            format!("{}: {}", self.name, self.location.id())
        } else {
            self.name.clone()
        }
    }

    /// Stat signature of the source artifact.
    pub fn stat(&self) -> std::io::Result<StatSignature> {
        StatSignature::of(self.location.path())
    }

    /// Materialize the artifact at `dest` through the source adapter.
    ///
    /// The latest successful download determines [`Self::packed_path`].
    pub fn download(&self, dest: &Path) -> Result<SyncOutcome, SyncError> {
        let outcome = self.adapter.download_package(self, dest)?;
        self.state().packed = Some(outcome.path.clone());
        Ok(outcome)
    }

    /// Where the artifact was last materialized.
    #[must_use]
    pub fn packed_path(&self) -> Option<PathBuf> {
        self.state().packed.clone()
    }

    /// Locate a file shipped with the package.
    ///
    /// Archives are unpacked from the source artifact under `temp_path`
    /// first; the cached copy is never read, so its timestamps stay those
    /// of the last sync. Returns `None` when the file does not exist.
    pub fn get_file(&self, filename: &str, temp_path: &Path) -> Result<Option<PathBuf>, PackageError> {
        let artifact = self.location.path();

        if let Some(kind) = ArchiveKind::detect(artifact) {
            let unpacked = temp_path.join(&self.name).join(self.location.name());
            if !unpacked.exists() {
                kind.unpack(artifact, &unpacked)?;
            }
            return Ok(existing(unpacked.join(filename)));
        }

        if artifact.is_dir() {
            return Ok(existing(artifact.join(filename)));
        }
        Ok(artifact.parent().and_then(|dir| existing(dir.join(filename))))
    }

    /// Attach a dependency file and the rows parsed from it, replacing
    /// whatever an earlier call attached.
    pub fn find_dependencies(
        &self,
        deps_file: &Path,
        parser: &dyn DependencyParser,
    ) -> Result<usize, ParserError> {
        let rows = parser.find_dependencies(deps_file)?;
        let count = rows.len();
        let mut state = self.state();
        state.deps_file = Some(deps_file.to_path_buf());
        state.dependencies = rows;
        Ok(count)
    }

    #[must_use]
    pub fn deps_file(&self) -> Option<PathBuf> {
        self.state().deps_file.clone()
    }

    /// Rows of the attached dependency file.
    #[must_use]
    pub fn dependencies(&self) -> Vec<ParameterSet> {
        self.state().dependencies.clone()
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

impl fmt::Debug for ResolvedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedPackage")
            .field("name", &self.name)
            .field("location", &self.location.id())
            .field("params", &self.params)
            .field("packed", &self.packed_path())
            .field("deps_file", &self.deps_file())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ResolvedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)
    }
}
