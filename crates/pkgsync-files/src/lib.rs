//! Artifact package resolution and sync for filesystem repositories.
//!
//! This crate provides:
//! - Enumeration of artifacts under glob templates with pluggable property stores
//! - Structural and property validation of candidates
//! - Tie-breaking and fatal ambiguity detection per package name
//! - A per-pass registry of resolved and explicitly absent packages
//! - Timestamp-preserving sync into a local cache
//! - Discovery of dependency files shipped with packages

mod adapter;
mod artifact;
mod candidate;
mod cascade;
mod config;
mod downloader;
mod package;
mod params;
mod parser;
mod registry;
mod resolve;
mod sync;
mod template;
mod transport;

pub use adapter::{AdapterError, FilesAdapter};
pub use artifact::{
    ArtifactId, ArtifactPath, ArtifactSource, Artifacts, LocalFiles, MemoryProperties,
    NullProperties, PropertyError, PropertyStore,
};
pub use candidate::{valid_candidates, CandidateArtifact, Mark, PathTemplate, PROPERTIES_KIND};
pub use cascade::{dependency_file, materialize, CascadeError, CascadeOutcome};
pub use config::{
    CacheConfig, Config, ConfigError, DEFAULT_DEPS_LOCK_FILE, DEFAULT_NAME_COLUMN, PACKED_DIR,
};
pub use downloader::{Downloader, SessionDownloader};
pub use package::{ArchiveKind, PackageError, ResolvedPackage};
pub use params::{ParameterSet, ValueKind, FILENAME_KEY};
pub use parser::{
    DependencyInput, DependencyParser, Parser, ParserError, PathGroup, Source, Survivor,
};
pub use registry::{Entry, PackageRegistry};
pub use resolve::{disambiguate, ResolveError, Resolver, TemplateOutcome};
pub use sync::{PackageFetcher, StatSignature, SyncError, SyncOutcome, Synchronizer};
pub use template::{
    parse_version, value_matches, TemplateParser, DEFAULT_VERSION_COLUMN, ROOT_PLACEHOLDER,
};
pub use transport::{TransportError, TransportFailure, TransportLog, UNKNOWN_STATUS};
