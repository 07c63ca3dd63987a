//! Adapter configuration (`pkgsync.toml`) parsing.
//!
//! ```toml
//! name_column = "package"
//! no_fails = false
//! deps_lock_file_name = "dependencies.txt.lock"
//! deps_file_name = "dependencies.txt"
//!
//! [cache]
//! root = "/var/cache/pkgsync"
//! ```

use crate::package::ResolvedPackage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default column holding the logical package name.
pub const DEFAULT_NAME_COLUMN: &str = "package";

/// Default lock-style dependency file shipped with packages.
pub const DEFAULT_DEPS_LOCK_FILE: &str = "dependencies.txt.lock";

/// Subdirectory of the cache root holding packed artifacts.
pub const PACKED_DIR: &str = "packed";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config field '{0}' must not be empty")]
    Empty(&'static str),
}

/// Adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Column whose value names the logical package.
    #[serde(default = "default_name_column")]
    pub name_column: String,

    /// When false, every requested name must resolve; misses are recorded
    /// as explicit absences.
    #[serde(default)]
    pub no_fails: bool,

    /// Lock-style dependency file looked up first.
    #[serde(default = "default_deps_lock_file")]
    pub deps_lock_file_name: String,

    /// Plain dependency file looked up when no lock file exists.
    #[serde(default)]
    pub deps_file_name: Option<String>,

    /// Resolve independent package names on the rayon pool.
    #[serde(default)]
    pub parallel: bool,

    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_name_column() -> String {
    DEFAULT_NAME_COLUMN.to_string()
}

fn default_deps_lock_file() -> String {
    DEFAULT_DEPS_LOCK_FILE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name_column: default_name_column(),
            no_fails: false,
            deps_lock_file_name: default_deps_lock_file(),
            deps_file_name: None,
            parallel: false,
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load a config from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a config from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name_column.is_empty() {
            return Err(ConfigError::Empty("name_column"));
        }
        if self.deps_lock_file_name.is_empty() {
            return Err(ConfigError::Empty("deps_lock_file_name"));
        }
        Ok(())
    }

    /// Use `root` as the cache directory.
    #[must_use]
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache.root = root.into();
        self
    }
}

/// Local cache layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".pkgsync").join("cache"),
        }
    }
}

impl CacheConfig {
    /// Destination of a package's packed artifact:
    /// `<root>/packed/<name>/<filename>`.
    #[must_use]
    pub fn path_packed(&self, package: &ResolvedPackage) -> PathBuf {
        self.root
            .join(PACKED_DIR)
            .join(package.name())
            .join(package.filename())
    }
}
