//! Filesystem-backed artifact paths and their property stores.
//!
//! An [`ArtifactPath`] pairs a location with a [`PropertyStore`] that holds
//! its metadata. An [`ArtifactSource`] expands a fixed prefix plus glob
//! pattern into the artifacts that exist under it.

use crate::params::ParameterSet;
use crate::transport::TransportError;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors raised by property stores.
#[derive(Error, Debug)]
pub enum PropertyError {
    #[error("property store lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata capability attached to artifacts.
pub trait PropertyStore: Send + Sync + fmt::Debug {
    /// Fetch every property of the artifact at `path`.
    fn get(&self, path: &ArtifactId) -> Result<ParameterSet, PropertyError>;

    /// Add or modify the given properties.
    fn set(&self, path: &ArtifactId, properties: &ParameterSet) -> Result<(), PropertyError>;

    /// Remove the named properties.
    fn delete(&self, path: &ArtifactId, keys: &[String]) -> Result<(), PropertyError>;
}

/// The local filesystem carries no artifact metadata.
///
/// Reads are empty; writes are accepted and discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProperties;

impl PropertyStore for NullProperties {
    fn get(&self, _path: &ArtifactId) -> Result<ParameterSet, PropertyError> {
        Ok(ParameterSet::new())
    }

    fn set(&self, _path: &ArtifactId, _properties: &ParameterSet) -> Result<(), PropertyError> {
        Ok(())
    }

    fn delete(&self, _path: &ArtifactId, _keys: &[String]) -> Result<(), PropertyError> {
        Ok(())
    }
}

/// Process-local property store.
#[derive(Debug, Default)]
pub struct MemoryProperties {
    entries: RwLock<HashMap<ArtifactId, ParameterSet>>,
}

impl MemoryProperties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert used when seeding a store.
    #[must_use]
    pub fn with(self, path: impl AsRef<Path>, properties: ParameterSet) -> Self {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(ArtifactId::new(path), properties);
        }
        self
    }
}

impl PropertyStore for MemoryProperties {
    fn get(&self, path: &ArtifactId) -> Result<ParameterSet, PropertyError> {
        let entries = self.entries.read().map_err(|_| PropertyError::Poisoned)?;
        Ok(entries.get(path).cloned().unwrap_or_default())
    }

    fn set(&self, path: &ArtifactId, properties: &ParameterSet) -> Result<(), PropertyError> {
        let mut entries = self.entries.write().map_err(|_| PropertyError::Poisoned)?;
        let entry = entries.entry(path.clone()).or_default();
        for (key, value) in properties.iter() {
            entry.insert(key, value);
        }
        Ok(())
    }

    fn delete(&self, path: &ArtifactId, keys: &[String]) -> Result<(), PropertyError> {
        let mut entries = self.entries.write().map_err(|_| PropertyError::Poisoned)?;
        if let Some(entry) = entries.get_mut(path) {
            for key in keys {
                entry.remove(key);
            }
        }
        Ok(())
    }
}

/// Opaque artifact identity: the normalized absolute path string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Normalize a path into an identifier.
    ///
    /// Relative paths are anchored at the current directory; `.` and `..`
    /// components are folded lexically without touching the filesystem.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };

        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other.as_os_str()),
            }
        }
        Self(normalized.to_string_lossy().into_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A filesystem location plus the store holding its properties.
#[derive(Debug, Clone)]
pub struct ArtifactPath {
    path: PathBuf,
    id: ArtifactId,
    store: Arc<dyn PropertyStore>,
}

impl ArtifactPath {
    /// Create an artifact path backed by `store`.
    pub fn new(path: impl Into<PathBuf>, store: Arc<dyn PropertyStore>) -> Self {
        let path = path.into();
        let id = ArtifactId::new(&path);
        Self { path, id, store }
    }

    /// Create an artifact path with no metadata.
    pub fn bare(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Arc::new(NullProperties))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn id(&self) -> &ArtifactId {
        &self.id
    }

    /// The final path component, or an empty string for a root path.
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Fetch the artifact's properties.
    pub fn properties(&self) -> Result<ParameterSet, PropertyError> {
        self.store.get(&self.id)
    }

    /// Replace the artifact's properties.
    pub fn set_properties(&self, properties: &ParameterSet) -> Result<(), PropertyError> {
        self.del_properties()?;
        self.store.set(&self.id, properties)
    }

    /// Drop every property of the artifact.
    pub fn del_properties(&self) -> Result<(), PropertyError> {
        let keys: Vec<String> = self.properties()?.keys().map(str::to_string).collect();
        self.store.delete(&self.id, &keys)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn PropertyStore> {
        &self.store
    }
}

impl PartialEq for ArtifactPath {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ArtifactPath {}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Sequence of artifacts produced by one enumeration.
pub type Artifacts<'a> = Box<dyn Iterator<Item = Result<ArtifactPath, TransportError>> + 'a>;

/// A backend that lists artifacts matching a pattern.
///
/// Each call starts a fresh enumeration.
pub trait ArtifactSource: Send + Sync {
    fn enumerate<'a>(&'a self, fixed: &Path, pattern: &str) -> Artifacts<'a>;
}

/// Enumerates artifacts on the local filesystem with `glob`.
#[derive(Debug, Clone)]
pub struct LocalFiles {
    store: Arc<dyn PropertyStore>,
}

impl Default for LocalFiles {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalFiles {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(NullProperties),
        }
    }

    /// Attach a property store to every enumerated artifact.
    #[must_use]
    pub fn with_properties(store: Arc<dyn PropertyStore>) -> Self {
        Self { store }
    }
}

impl ArtifactSource for LocalFiles {
    fn enumerate<'a>(&'a self, fixed: &Path, pattern: &str) -> Artifacts<'a> {
        let escaped = glob::Pattern::escape(&fixed.to_string_lossy());
        let full = if escaped.is_empty() {
            pattern.to_string()
        } else if pattern.is_empty() {
            escaped
        } else {
            format!("{}/{}", escaped.trim_end_matches('/'), pattern)
        };

        match glob::glob(&full) {
            Ok(paths) => Box::new(paths.map(move |entry| {
                entry
                    .map(|path| ArtifactPath::new(path, Arc::clone(&self.store)))
                    .map_err(|e| TransportError::from_io(e.error()))
            })),
            Err(e) => Box::new(std::iter::once(Err(TransportError::new(
                400,
                format!("invalid pattern '{full}': {}", e.msg),
            )))),
        }
    }
}
