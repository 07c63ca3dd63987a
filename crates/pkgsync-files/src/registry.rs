//! Registry of packages found during one resolution pass.
//!
//! Resolved packages are keyed by their display identity
//! (`name: <location>`); an explicit absence is keyed by the bare name.
//! A name resolves at most once: later resolutions of the same name return
//! the established package, and a resolution supersedes an earlier absence
//! marker for that name.

use crate::package::ResolvedPackage;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// What the registry holds for a key.
#[derive(Debug, Clone)]
pub enum Entry {
    Resolved(Arc<ResolvedPackage>),
    /// The name was required but not found.
    Absent,
}

impl Entry {
    #[must_use]
    pub fn package(&self) -> Option<&Arc<ResolvedPackage>> {
        match self {
            Self::Resolved(pkg) => Some(pkg),
            Self::Absent => None,
        }
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    /// Logical name to the display key of its resolution.
    resolved: HashMap<String, String>,
}

/// Thread-safe registry; every update is one critical section.
#[derive(Debug, Default)]
pub struct PackageRegistry {
    inner: Mutex<Inner>,
}

impl PackageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a resolved package.
    ///
    /// Returns the package now registered for its name, which is the
    /// earlier one if the name was already resolved.
    pub fn record_resolved(&self, package: Arc<ResolvedPackage>) -> Arc<ResolvedPackage> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .resolved
            .get(package.name())
            .and_then(|key| inner.entries.get(key))
            .and_then(Entry::package)
        {
            return Arc::clone(existing);
        }

        let key = package.name_and_path(true);
        let name = package.name().to_string();
        if matches!(inner.entries.get(&name), Some(Entry::Absent)) {
            inner.entries.remove(&name);
        }
        inner.resolved.insert(name, key.clone());
        inner.entries.insert(key, Entry::Resolved(Arc::clone(&package)));
        package
    }

    /// Register that `name` was required but not found.
    ///
    /// Returns `false` if the name already has an entry of either kind.
    pub fn record_absent(&self, name: &str) -> bool {
        let mut inner = self.lock();
        if inner.resolved.contains_key(name) || inner.entries.contains_key(name) {
            return false;
        }
        inner.entries.insert(name.to_string(), Entry::Absent);
        true
    }

    /// The package resolved for a logical name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<ResolvedPackage>> {
        let inner = self.lock();
        inner
            .resolved
            .get(name)
            .and_then(|key| inner.entries.get(key))
            .and_then(Entry::package)
            .cloned()
    }

    /// Whether `name` carries an absence marker.
    #[must_use]
    pub fn is_absent(&self, name: &str) -> bool {
        matches!(self.lock().entries.get(name), Some(Entry::Absent))
    }

    /// Look up an entry by its display key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Entry> {
        self.lock().entries.get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Snapshot of every entry in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Entry)> {
        self.lock()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Names that were required but not found.
    #[must_use]
    pub fn absent(&self) -> Vec<String> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_absent())
            .map(|(key, _)| key.clone())
            .collect()
    }
}
