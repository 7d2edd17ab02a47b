//! Global configuration keys consumed by the build core.

use serde_json::Value;
use std::path::PathBuf;

/// The global-config keys the build core consumes, extracted from the
/// evaluated JSON tree. Everything else in the tree is package-level data
/// that the metadata builder reads directly.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConfig {
    /// Maximum number of commands to run in parallel within a stage.
    pub parallel_tasks: usize,
    /// Directories scanned one level deep for packages.
    pub package_directories: Vec<PathBuf>,
    /// When set, `run` executes this single command instead of the built
    /// applications.
    pub global_run_command: Option<String>,
}

impl GlobalConfig {
    /// Extract the global keys from an evaluated config tree. Missing or
    /// mistyped keys fall back to defaults rather than failing: a package
    /// config evaluated standalone is still a valid global tree.
    pub fn from_value(config: &Value) -> Self {
        let parallel_tasks = config
            .get("parallel_tasks")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .filter(|n| *n > 0)
            .unwrap_or_else(default_parallelism);

        let package_directories = config
            .get("package_directories")
            .and_then(Value::as_array)
            .map(|dirs| {
                dirs.iter()
                    .filter_map(Value::as_str)
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        let global_run_command = config
            .get("global_run_command")
            .and_then(Value::as_str)
            .filter(|cmd| !cmd.is_empty())
            .map(str::to_string);

        Self {
            parallel_tasks,
            package_directories,
            global_run_command,
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            parallel_tasks: default_parallelism(),
            package_directories: Vec::new(),
            global_run_command: None,
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
