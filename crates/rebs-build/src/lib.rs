//! REBS build pipeline
//!
//! Core infrastructure for building packages:
//! - Package resolution and metadata consolidation
//! - Incremental build planning over a persisted dependency graph
//! - Staged, parallel command execution
//! - Persistent package-ID and dependency indexes

pub mod context;
pub mod depfile;
pub mod deps;
pub mod error;
pub mod exec;
pub mod layout;
pub mod metadata;
pub mod package_id;
pub mod placeholder;
pub mod planner;
pub mod queue;
pub mod registry;
pub mod timestamps;

// Re-export main types
pub use context::{BuildContext, ConfigSource};
pub use deps::DependencyStore;
pub use error::{BuildError, BuildResult};
pub use layout::{OptLevel, TempLayout};
pub use metadata::{MetadataStore, PackageMetadata, PackageType};
pub use package_id::PackageIdRegistry;
pub use placeholder::Placeholders;
pub use planner::Planner;
pub use queue::{CommandQueue, DeferredCommand, ExecutionSettings, Stage};
pub use registry::{InvocationInputs, PackageRegistry};
pub use timestamps::TimestampCache;

// Re-export the config types the pipeline consumes
pub use rebs_config::GlobalConfig;
