//! Session-wide package bookkeeping shared by all sources.

use crate::package::ResolvedPackage;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// The downloader that collects packages across sources.
pub trait Downloader: Send + Sync {
    /// Offer a package (or its absence) for `name`.
    ///
    /// Returns whether the offer was taken, and the package now held for
    /// the name.
    fn add_package(
        &self,
        name: &str,
        package: Option<ResolvedPackage>,
    ) -> (bool, Option<Arc<ResolvedPackage>>);

    /// Whether accepted packages should be materialized.
    fn do_load(&self) -> bool;

    /// Scratch directory for unpacking archives.
    fn temp_path(&self) -> &Path;
}

/// In-memory downloader for one run.
#[derive(Debug)]
pub struct SessionDownloader {
    packages: Mutex<BTreeMap<String, Option<Arc<ResolvedPackage>>>>,
    do_load: bool,
    temp_path: PathBuf,
}

impl SessionDownloader {
    pub fn new(temp_path: impl Into<PathBuf>) -> Self {
        Self {
            packages: Mutex::new(BTreeMap::new()),
            do_load: true,
            temp_path: temp_path.into(),
        }
    }

    /// Resolve only; never materialize.
    #[must_use]
    pub fn without_load(mut self) -> Self {
        self.do_load = false;
        self
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Option<Arc<ResolvedPackage>>>> {
        self.packages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The package held for `name`, if any.
    #[must_use]
    pub fn package(&self, name: &str) -> Option<Arc<ResolvedPackage>> {
        self.lock().get(name).cloned().flatten()
    }

    /// Names offered only as absent.
    #[must_use]
    pub fn missing(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, pkg)| pkg.is_none())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl Downloader for SessionDownloader {
    fn add_package(
        &self,
        name: &str,
        package: Option<ResolvedPackage>,
    ) -> (bool, Option<Arc<ResolvedPackage>>) {
        let mut packages = self.lock();
        match packages.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                let held = package.map(Arc::new);
                slot.insert(held.clone());
                (true, held)
            }
            Entry::Occupied(mut slot) => {
                if let Some(existing) = slot.get() {
                    return (false, Some(Arc::clone(existing)));
                }
                match package {
                    Some(package) => {
                        let held = Arc::new(package);
                        slot.insert(Some(Arc::clone(&held)));
                        (true, Some(held))
                    }
                    None => (false, None),
                }
            }
        }
    }

    fn do_load(&self) -> bool {
        self.do_load
    }

    fn temp_path(&self) -> &Path {
        &self.temp_path
    }
}
