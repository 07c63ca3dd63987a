//! Copying resolved artifacts into the local cache.
//!
//! A copy happens only when the cached file's [`StatSignature`] differs from
//! the source's. After copying, the destination timestamps are set to the
//! source's as they stand once the copy has read it, so the next comparison
//! sees an identical signature.

use crate::package::ResolvedPackage;
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while materializing a package.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Any I/O failure while copying a package into the cache.
    #[error("FAILED to download package {package} at url: [{location}]")]
    DownloadFailed {
        package: String,
        location: String,
        #[source]
        source: io::Error,
    },
}

/// Staleness fingerprint of a file.
///
/// `created` is read from the access-time slot: it is the second timestamp
/// that can be written back on every platform, so a copy can reproduce the
/// source signature exactly. Reading a file may move it, so the signature
/// applied to a copy is taken after the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatSignature {
    pub created: FileTime,
    pub modified: FileTime,
    pub size: u64,
}

impl StatSignature {
    pub fn of(path: &Path) -> io::Result<Self> {
        fs::metadata(path).map(|meta| Self::from_metadata(&meta))
    }

    #[must_use]
    pub fn from_metadata(meta: &fs::Metadata) -> Self {
        Self {
            created: FileTime::from_last_access_time(meta),
            modified: FileTime::from_last_modification_time(meta),
            size: meta.len(),
        }
    }

    /// Stamp `path` with this signature's timestamps.
    pub fn apply(&self, path: &Path) -> io::Result<()> {
        filetime::set_file_times(path, self.created, self.modified)
    }
}

/// Result of a sync: where the artifact lives and whether it was copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub path: PathBuf,
    pub copied: bool,
}

/// Something that can materialize a package at a destination path.
pub trait PackageFetcher: Send + Sync {
    fn download_package(&self, package: &ResolvedPackage, dest: &Path)
        -> Result<SyncOutcome, SyncError>;
}

/// Local-filesystem copy with stat-signature staleness detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct Synchronizer;

impl Synchronizer {
    /// Copy `package` to `dest` unless an identical copy is already there.
    pub fn sync(&self, package: &ResolvedPackage, dest: &Path) -> Result<SyncOutcome, SyncError> {
        let source = package.location().path();
        let failed = |source_err: io::Error| SyncError::DownloadFailed {
            package: package.name().to_string(),
            location: source.display().to_string(),
            source: source_err,
        };

        let signature = StatSignature::of(source).map_err(failed)?;

        let mut copy = true;
        match dest.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => {
                fs::create_dir_all(dir).map_err(failed)?;
            }
            _ if dest.exists() => {
                let cached = StatSignature::of(dest).map_err(failed)?;
                copy = cached != signature;
                if copy {
                    debug!("{}: cached copy is stale, removing {}", package.name(), dest.display());
                    fs::remove_file(dest).map_err(failed)?;
                }
            }
            _ => {}
        }

        if copy {
            info!("{}: copying {} -> {}", package.name(), source.display(), dest.display());
            if let Err(e) = copy_with_times(source, dest) {
                let _ = fs::remove_file(dest);
                return Err(failed(e));
            }
        } else {
            debug!("{}: up to date at {}", package.name(), dest.display());
        }

        Ok(SyncOutcome {
            path: dest.to_path_buf(),
            copied: copy,
        })
    }
}

fn copy_with_times(source: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(source, dest)?;
    StatSignature::of(source)?.apply(dest)
}

impl PackageFetcher for Synchronizer {
    fn download_package(
        &self,
        package: &ResolvedPackage,
        dest: &Path,
    ) -> Result<SyncOutcome, SyncError> {
        self.sync(package, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::tests::package_at;
    use tempfile::TempDir;

    fn source_file(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("repo").join("libfoo-2.0.pkg");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn creates_missing_directories_and_stamps_times() {
        let tmp = TempDir::new().unwrap();
        let source = source_file(tmp.path(), "payload");
        let pkg = package_at("libfoo", &source);
        let dest = tmp.path().join("cache/packed/libfoo/libfoo-2.0.pkg");

        let outcome = Synchronizer.sync(&pkg, &dest).unwrap();

        assert!(outcome.copied);
        assert_eq!(outcome.path, dest);
        let src_sig = StatSignature::of(&source).unwrap();
        let dest_sig = StatSignature::of(&dest).unwrap();
        assert_eq!(dest_sig.created, src_sig.created);
        assert_eq!(dest_sig.modified, src_sig.modified);
        assert_eq!(dest_sig, src_sig);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
    }

    #[test]
    fn freshly_written_source_syncs_once() {
        let tmp = TempDir::new().unwrap();
        let source = source_file(tmp.path(), "payload");
        let pkg = package_at("libfoo", &source);
        let dest = tmp.path().join("cache/libfoo-2.0.pkg");

        assert!(Synchronizer.sync(&pkg, &dest).unwrap().copied);
        let second = Synchronizer.sync(&pkg, &dest).unwrap();
        let third = Synchronizer.sync(&pkg, &dest).unwrap();

        assert!(!second.copied);
        assert!(!third.copied);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
    }

    #[test]
    fn modified_time_change_forces_recopy() {
        let tmp = TempDir::new().unwrap();
        let source = source_file(tmp.path(), "payload");
        let pkg = package_at("libfoo", &source);
        let dest = tmp.path().join("cache/libfoo-2.0.pkg");
        Synchronizer.sync(&pkg, &dest).unwrap();

        // Same size, older modification time.
        fs::write(&source, "PAYLOAD").unwrap();
        let modified = StatSignature::of(&source).unwrap().modified;
        let older = FileTime::from_unix_time(modified.unix_seconds() - 3600, 0);
        filetime::set_file_mtime(&source, older).unwrap();

        let outcome = Synchronizer.sync(&pkg, &dest).unwrap();
        assert!(outcome.copied);
        assert_eq!(StatSignature::of(&dest).unwrap(), StatSignature::of(&source).unwrap());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "PAYLOAD");
    }

    #[test]
    fn created_time_change_forces_recopy() {
        let tmp = TempDir::new().unwrap();
        let source = source_file(tmp.path(), "payload");
        let pkg = package_at("libfoo", &source);
        let dest = tmp.path().join("cache/libfoo-2.0.pkg");
        Synchronizer.sync(&pkg, &dest).unwrap();

        let sig = StatSignature::of(&dest).unwrap();
        let earlier = FileTime::from_unix_time(sig.created.unix_seconds() - 60, 0);
        filetime::set_file_atime(&dest, earlier).unwrap();

        assert!(Synchronizer.sync(&pkg, &dest).unwrap().copied);
        assert_eq!(StatSignature::of(&dest).unwrap(), StatSignature::of(&source).unwrap());
    }

    #[test]
    fn size_change_alone_forces_recopy() {
        let tmp = TempDir::new().unwrap();
        let source = source_file(tmp.path(), "payload");
        let pkg = package_at("libfoo", &source);
        let dest = tmp.path().join("cache/libfoo-2.0.pkg");
        Synchronizer.sync(&pkg, &dest).unwrap();

        // Same timestamps, different size in the cache.
        let sig = StatSignature::of(&dest).unwrap();
        fs::write(&dest, "tampered-with").unwrap();
        sig.apply(&dest).unwrap();

        assert!(Synchronizer.sync(&pkg, &dest).unwrap().copied);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
    }

    #[test]
    fn copies_when_directory_exists_but_file_does_not() {
        let tmp = TempDir::new().unwrap();
        let source = source_file(tmp.path(), "payload");
        let pkg = package_at("libfoo", &source);
        let cache = tmp.path().join("cache");
        fs::create_dir(&cache).unwrap();

        let outcome = Synchronizer.sync(&pkg, &cache.join("libfoo-2.0.pkg")).unwrap();
        assert!(outcome.copied);
    }

    #[test]
    fn missing_source_is_a_download_failure() {
        let tmp = TempDir::new().unwrap();
        let pkg = package_at("libfoo", &tmp.path().join("absent.pkg"));
        let dest = tmp.path().join("cache/absent.pkg");

        let err = Synchronizer.sync(&pkg, &dest).unwrap_err();
        let SyncError::DownloadFailed { package, location, .. } = &err;
        assert_eq!(package, "libfoo");
        assert!(location.ends_with("absent.pkg"));
        assert!(err.to_string().starts_with("FAILED to download package libfoo"));
        assert!(!dest.exists());
    }

    #[test]
    fn copy_failure_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        // A directory cannot be copied with a file copy.
        let source = tmp.path().join("repo").join("libfoo-2.0");
        fs::create_dir_all(&source).unwrap();
        let pkg = package_at("libfoo", &source);
        let dest = tmp.path().join("cache/libfoo-2.0");

        assert!(Synchronizer.sync(&pkg, &dest).is_err());
        assert!(!dest.exists());
    }
}
