//! Shared fixtures: a workspace of fake packages on disk and a config
//! source that serves plain JSON instead of invoking the evaluator.

use rebs_build::{
    BuildContext, BuildResult, ConfigSource, GlobalConfig, InvocationInputs, OptLevel, TempLayout,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Serves pre-registered JSON trees keyed by package path, with a
/// per-package metadata timestamp.
pub struct JsonConfigSource {
    configs_by_path: HashMap<PathBuf, (Value, u64)>,
}

impl ConfigSource for JsonConfigSource {
    fn package_config(
        &mut self,
        package_path: &Path,
        _package_scratch: &Path,
    ) -> BuildResult<(Value, u64)> {
        Ok(self
            .configs_by_path
            .get(package_path)
            .cloned()
            .unwrap_or_else(|| (serde_json::json!({}), 1)))
    }
}

/// A workspace under a temporary root: packages live in `<root>/packages`,
/// scratch in `<root>/.build`.
pub struct Workspace {
    pub root: PathBuf,
    configs_by_path: HashMap<PathBuf, (Value, u64)>,
}

impl Workspace {
    pub fn new(root: &Path) -> Self {
        fs::create_dir_all(root.join("packages")).unwrap();
        Self {
            root: root.to_path_buf(),
            configs_by_path: HashMap::new(),
        }
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    /// Creates a package directory with a config served at timestamp 1.
    pub fn add_package(&mut self, name: &str, config: Value) -> PathBuf {
        self.add_package_at(name, config, 1)
    }

    /// Creates a package directory with a config served at a chosen
    /// metadata timestamp.
    pub fn add_package_at(&mut self, name: &str, config: Value, timestamp: u64) -> PathBuf {
        let path = self.packages_dir().join(name);
        fs::create_dir_all(&path).unwrap();
        self.configs_by_path.insert(path.clone(), (config, timestamp));
        path
    }

    /// Writes a source file inside a package.
    pub fn write_file(&self, package: &str, relative: &str, contents: &str) -> PathBuf {
        let path = self.packages_dir().join(package).join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    /// A fresh build context over this workspace, as a new invocation
    /// would construct it.
    pub fn context(&self, inputs: &[&str]) -> BuildContext {
        let layout = TempLayout::new(OptLevel::Fast, &self.root, true);
        let config = GlobalConfig {
            parallel_tasks: 2,
            package_directories: vec![self.packages_dir()],
            global_run_command: None,
        };
        let invocation = InvocationInputs {
            packages: inputs.iter().map(|name| name.to_string()).collect(),
            all_packages: false,
            universe_root: true,
        };
        BuildContext::new(
            layout,
            config,
            Box::new(JsonConfigSource {
                configs_by_path: self.configs_by_path.clone(),
            }),
            invocation,
            self.root.clone(),
            false,
        )
    }
}

/// Bumps a file's mtime by rewriting it after a short sleep, so ms-granular
/// timestamps observe the change.
pub fn touch(path: &Path) {
    std::thread::sleep(std::time::Duration::from_millis(15));
    let contents = fs::read(path).unwrap();
    fs::write(path, contents).unwrap();
}
