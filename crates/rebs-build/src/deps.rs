//! Per-package persistent dependency graph.
//!
//! Each package's scratch directory holds a `dependencies` file recording,
//! for every object file, the source files it was built from (as reported
//! by the compiler's dependency output). The store loads a package's map
//! lazily on first access, tracks which packages changed, and flushes only
//! those at shutdown.
//!
//! File format: blocks separated by blank lines; each block is the object
//! file path on its own line followed by one dependency path per line.

use crate::depfile;
use crate::layout::TempLayout;
use crate::timestamps::TimestampCache;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// The dependency record file inside a package's scratch directory.
const DEPENDENCIES_FILE: &str = "dependencies";

/// Prefix of the per-worker file compilers write their dependency output
/// to. There is one per running worker.
const WORKER_DEPFILE_PREFIX: &str = "deps";

type FileDependencies = BTreeMap<PathBuf, Vec<PathBuf>>;

#[derive(Debug, Default)]
pub struct DependencyStore {
    dependencies_by_package: HashMap<u64, FileDependencies>,
    dirty_packages: HashSet<u64>,
}

impl DependencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `object_file` must be rebuilt: it is missing, older than the
    /// threshold (the package's metadata timestamp), has no dependency
    /// record, or any recorded dependency vanished or is newer than it.
    pub fn is_stale(
        &mut self,
        timestamps: &mut TimestampCache,
        layout: &TempLayout,
        package_id: u64,
        threshold_timestamp: u64,
        object_file: &Path,
    ) -> bool {
        let object_timestamp = timestamps.timestamp_of(object_file);
        if object_timestamp == 0 || threshold_timestamp > object_timestamp {
            return true;
        }

        let Some(dependencies) = self.package_map(layout, package_id).get(object_file) else {
            // No record of what this file was built from; rebuild it.
            return true;
        };

        for dependency in dependencies {
            let dependency_timestamp = timestamps.timestamp_of(dependency);
            if dependency_timestamp == 0 || dependency_timestamp > object_timestamp {
                // Either the dependency disappeared or it is newer than the
                // object.
                return true;
            }
        }
        false
    }

    /// Records the dependencies of an object file. An element-wise equal
    /// list leaves the store clean.
    pub fn set_dependencies(
        &mut self,
        layout: &TempLayout,
        package_id: u64,
        object_file: &Path,
        dependencies: Vec<PathBuf>,
    ) {
        let map = self.package_map(layout, package_id);
        if map.get(object_file) == Some(&dependencies) {
            return;
        }
        map.insert(object_file.to_path_buf(), dependencies);
        self.dirty_packages.insert(package_id);
    }

    /// Rewrites the dependency file of every package that changed.
    pub fn flush(&mut self, layout: &TempLayout) {
        for package_id in std::mem::take(&mut self.dirty_packages) {
            let Some(map) = self.dependencies_by_package.get(&package_id) else {
                continue;
            };

            let mut contents = String::new();
            for (object_file, dependencies) in map {
                contents.push_str(&format!("{}\n", object_file.display()));
                for dependency in dependencies {
                    contents.push_str(&format!("{}\n", dependency.display()));
                }
                contents.push('\n');
            }

            let path = file_path(layout, package_id);
            if fs::write(&path, contents).is_err() {
                eprintln!(
                    "Cannot write to {}. Output cannot be cached.",
                    path.display()
                );
            }
        }
    }

    /// The path of the compiler's dependency output file unique to a
    /// worker, quoted into `${deps file}` at execution time.
    pub fn worker_depfile_path(layout: &TempLayout, worker_index: usize) -> PathBuf {
        layout
            .current()
            .join(format!("{WORKER_DEPFILE_PREFIX}{worker_index}"))
    }

    /// Reads a compiler dependency file into the list of source paths.
    pub fn read_compiler_depfile(path: &Path) -> Vec<PathBuf> {
        depfile::read_depfile(path)
    }

    fn package_map(&mut self, layout: &TempLayout, package_id: u64) -> &mut FileDependencies {
        self.dependencies_by_package
            .entry(package_id)
            .or_insert_with(|| load_package_file(&file_path(layout, package_id)))
    }
}

fn file_path(layout: &TempLayout, package_id: u64) -> PathBuf {
    layout.package_dir_path(package_id).join(DEPENDENCIES_FILE)
}

fn load_package_file(path: &Path) -> FileDependencies {
    let mut map = FileDependencies::new();
    let Ok(contents) = fs::read_to_string(path) else {
        return map;
    };

    let mut current: Option<PathBuf> = None;
    for line in contents.lines() {
        if line.is_empty() {
            current = None;
            continue;
        }
        match &current {
            None => {
                let object_file = PathBuf::from(line);
                map.insert(object_file.clone(), Vec::new());
                current = Some(object_file);
            }
            Some(object_file) => {
                if let Some(dependencies) = map.get_mut(object_file) {
                    dependencies.push(PathBuf::from(line));
                }
            }
        }
    }
    map
}
