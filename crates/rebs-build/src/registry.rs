//! Package name → path registry.
//!
//! User arguments that look like paths are pre-registered before the
//! configured package directories are scanned, so an explicitly supplied
//! path wins any name collision. Scanning is one level deep: every
//! non-hidden subdirectory of a package directory is a candidate package,
//! registered under its directory name, first-seen wins.

use crate::error::{BuildError, BuildResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How the user's input packages are enumerated.
#[derive(Debug, Clone, Default)]
pub struct InvocationInputs {
    /// Raw name-or-path package arguments, in order.
    pub packages: Vec<String>,
    /// Apply the action to every known package instead.
    pub all_packages: bool,
    /// The working directory is a universe root, so the empty input does
    /// not implicitly resolve to it.
    pub universe_root: bool,
}

#[derive(Debug, Default)]
pub struct PackageRegistry {
    paths_by_name: BTreeMap<String, PathBuf>,
}

/// Whether a user argument is a path rather than a short name.
pub fn looks_like_path(name_or_path: &str) -> bool {
    name_or_path.starts_with('.') || name_or_path.starts_with('/') || name_or_path.contains(':')
}

/// The short name of a package: the last component of its path.
pub fn package_name_from_path(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl PackageRegistry {
    /// Registers the explicitly-supplied input paths, then scans the
    /// configured package directories.
    pub fn initialize(
        inputs: &InvocationInputs,
        package_directories: &[PathBuf],
        working_dir: &Path,
    ) -> Self {
        let mut registry = Self::default();

        if !inputs.all_packages {
            if inputs.packages.is_empty() {
                if !inputs.universe_root {
                    registry.register_path(working_dir);
                }
            } else {
                for name_or_path in &inputs.packages {
                    if looks_like_path(name_or_path) {
                        let path = Path::new(name_or_path);
                        if path.exists() {
                            registry.register_path(path);
                        }
                    }
                }
            }
        }

        for package_directory in package_directories {
            registry.scan_directory(package_directory);
        }

        registry
    }

    /// Registers a package by its path unless its name is already taken.
    pub fn register_path(&mut self, path: &Path) {
        let name = package_name_from_path(path);
        if name.is_empty() {
            return;
        }
        self.paths_by_name
            .entry(name)
            .or_insert_with(|| path.to_path_buf());
    }

    /// Scans one level deep for non-hidden subdirectories.
    fn scan_directory(&mut self, package_directory: &Path) {
        let Ok(entries) = std::fs::read_dir(package_directory) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = package_name_from_path(&path);
            if name.is_empty() || name.starts_with('.') {
                continue;
            }
            self.register_path(&path);
        }
    }

    /// Exact name lookup.
    pub fn path_from_name(&self, name: &str) -> Option<&Path> {
        self.paths_by_name.get(name).map(PathBuf::as_path)
    }

    /// Resolves a user argument to a package path. The empty input is the
    /// working directory; a path-looking input must exist; anything else is
    /// a name lookup.
    pub fn resolve(&self, name_or_path: &str, working_dir: &Path) -> BuildResult<PathBuf> {
        if name_or_path.is_empty() {
            return Ok(working_dir.to_path_buf());
        }
        if looks_like_path(name_or_path) {
            let path = Path::new(name_or_path);
            if !path.exists() {
                return Err(BuildError::PackagePathMissing {
                    input: name_or_path.to_string(),
                });
            }
            return Ok(path.to_path_buf());
        }
        self.path_from_name(name_or_path)
            .map(Path::to_path_buf)
            .ok_or_else(|| BuildError::unknown_package(name_or_path))
    }

    /// The paths of the packages this invocation operates on: everything
    /// known under `--all`, otherwise each resolvable user argument (the
    /// empty argument list stands for the working directory outside a
    /// universe root). Unresolvable arguments are reported and skipped.
    pub fn input_packages(&self, inputs: &InvocationInputs, working_dir: &Path) -> Vec<PathBuf> {
        if inputs.all_packages {
            return self.paths_by_name.values().cloned().collect();
        }

        let raw_inputs: Vec<String> = if inputs.packages.is_empty() {
            if inputs.universe_root {
                Vec::new()
            } else {
                vec![String::new()]
            }
        } else {
            inputs.packages.clone()
        };

        let mut paths = Vec::new();
        for raw in &raw_inputs {
            match self.resolve(raw, working_dir) {
                Ok(path) => paths.push(path),
                Err(error) => eprintln!("{error}"),
            }
        }
        paths
    }

    /// Iterates all known packages in name order.
    pub fn known_packages(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.paths_by_name
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.paths_by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths_by_name.is_empty()
    }
}
