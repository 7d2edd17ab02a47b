//! The build context: every store the pipeline needs, threaded explicitly
//! through the planner and scheduler instead of living in process globals.
//! Tests construct independent contexts against temporary layouts.

use crate::deps::DependencyStore;
use crate::error::{BuildError, BuildResult};
use crate::layout::TempLayout;
use crate::metadata::MetadataStore;
use crate::package_id::PackageIdRegistry;
use crate::placeholder::Placeholders;
use crate::registry::{InvocationInputs, PackageRegistry};
use crate::timestamps::TimestampCache;
use rebs_config::GlobalConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Source of evaluated package configurations. The real implementation
/// shells out to the jsonnet evaluator; tests substitute plain JSON.
pub trait ConfigSource {
    /// The evaluated config tree for a package and its metadata timestamp
    /// (the max of the package config's mtime and all global config
    /// mtimes).
    fn package_config(
        &mut self,
        package_path: &Path,
        package_scratch: &Path,
    ) -> BuildResult<(Value, u64)>;
}

impl ConfigSource for rebs_config::Evaluator {
    fn package_config(
        &mut self,
        package_path: &Path,
        package_scratch: &Path,
    ) -> BuildResult<(Value, u64)> {
        rebs_config::Evaluator::package_config(self, package_path, package_scratch)
            .map_err(BuildError::from)
    }
}

pub struct BuildContext {
    pub timestamps: TimestampCache,
    pub layout: TempLayout,
    pub ids: PackageIdRegistry,
    pub registry: PackageRegistry,
    pub metadata: MetadataStore,
    pub deps: DependencyStore,
    pub placeholders: Placeholders,
    pub config: GlobalConfig,
    pub config_source: Box<dyn ConfigSource>,
    pub inputs: InvocationInputs,
    pub working_dir: PathBuf,
    pub verbose: bool,
}

impl BuildContext {
    /// Assembles a context. Loads the package-ID map, scans the package
    /// directories, and registers the global placeholders.
    pub fn new(
        layout: TempLayout,
        config: GlobalConfig,
        config_source: Box<dyn ConfigSource>,
        inputs: InvocationInputs,
        working_dir: PathBuf,
        verbose: bool,
    ) -> Self {
        let mut timestamps = TimestampCache::new();
        let ids = PackageIdRegistry::load(&layout, &mut timestamps);
        let registry = PackageRegistry::initialize(&inputs, &config.package_directories, &working_dir);

        let mut placeholders = Placeholders::new();
        placeholders.set("temp directory", layout.current().display().to_string());

        Self {
            timestamps,
            layout,
            ids,
            registry,
            metadata: MetadataStore::default(),
            deps: DependencyStore::new(),
            placeholders,
            config,
            config_source,
            inputs,
            working_dir,
            verbose,
        }
    }

    /// Writes back every dirty persistent index. Called once at shutdown.
    pub fn flush(&mut self) {
        self.deps.flush(&self.layout);
        self.ids.flush(&self.layout);
    }
}
