//! Scratch directory layout.
//!
//! Everything REBS persists between invocations lives under a single
//! scratch root: the system temp directory by default, or a `.build`
//! directory inside the working directory when it is a universe root. Each
//! optimization level gets its own subtree (`current`), and each package a
//! numbered directory inside that, keyed by its package ID. Cached
//! repositories live directly under the root, shared across optimization
//! levels.

use std::fs;
use std::path::{Path, PathBuf};

/// The subdirectory of the system temp directory hosting the scratch root.
const TEMP_SUBDIRECTORY: &str = "rebs";

/// The scratch root inside a universe's working directory.
const LOCAL_SCRATCH_SUBDIRECTORY: &str = ".build";

/// Optimization level to build packages with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    /// All debug symbols.
    Debug,
    /// Default level, for building really quickly.
    #[default]
    Fast,
    /// Aggressive, whole program optimization.
    Optimized,
}

impl OptLevel {
    /// Human readable name, also the name of the per-level scratch
    /// subdirectory and the value of the evaluator's `optimization_level`
    /// external variable.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Fast => "fast",
            Self::Optimized => "optimized",
        }
    }
}

/// Deterministic path algebra for the scratch tree.
#[derive(Debug, Clone)]
pub struct TempLayout {
    root: PathBuf,
    current: PathBuf,
}

impl TempLayout {
    /// Computes the layout for an invocation. `universe_root` is set when
    /// the working directory contains a universe config file, which forces
    /// the scratch tree to a local path.
    pub fn new(level: OptLevel, working_dir: &Path, universe_root: bool) -> Self {
        let root = if universe_root {
            working_dir.join(LOCAL_SCRATCH_SUBDIRECTORY)
        } else {
            std::env::temp_dir().join(TEMP_SUBDIRECTORY)
        };
        let current = root.join(level.name());
        ensure_directories_exist(&current);
        Self { root, current }
    }

    /// The scratch root, shared across optimization levels. Cached
    /// repositories live here.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The scratch tree for the current optimization level.
    pub fn current(&self) -> &Path {
        &self.current
    }

    /// The scratch directory for a package, created on first use.
    pub fn package_dir(&self, package_id: u64) -> PathBuf {
        let path = self.current.join(package_id.to_string());
        ensure_directories_exist(&path);
        path
    }

    /// The scratch directory for a package without creating it.
    pub fn package_dir_path(&self, package_id: u64) -> PathBuf {
        self.current.join(package_id.to_string())
    }
}

/// Creates a directory and its parents. Failures are diagnostics, not
/// errors: a build can often proceed and fail later with better context.
pub fn ensure_directories_exist(path: &Path) {
    if let Err(error) = fs::create_dir_all(path) {
        eprintln!("Cannot create directory \"{}\": {error}", path.display());
    }
}

/// Removes a directory tree, tolerating a missing target.
pub fn delete_folder_if_exists(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(error) = fs::remove_dir_all(path) {
        eprintln!("Cannot delete directory \"{}\": {error}", path.display());
    }
}
