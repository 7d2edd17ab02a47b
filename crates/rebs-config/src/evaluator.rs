//! Invocation of the external jsonnet evaluator.
//!
//! The configuration DSL is jsonnet. REBS never evaluates it in-process:
//! the global config chain (root config plus the universe-local config) and
//! the package config are concatenated with jsonnet's `+` operator, staged
//! into the scratch directory, and handed to the `jsonnet` binary. The
//! evaluated JSON output is cached next to the staging file and reused while
//! it is at least as new as every input.

use crate::{
    ConfigError, ConfigResult, CONFIG_FILE, CONFIG_JSON_FILE, PACKAGE_CONFIG_FILE,
    TEMP_CONFIG_FILE, UNIVERSE_CONFIG_FILE,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::UNIX_EPOCH;

/// The generated package config inside a package's scratch directory.
const GENERATED_PACKAGE_CONFIG: &str = "package.rebs.json";

/// The default root config written on first use.
const DEFAULT_CONFIG_CONTENTS: &str = r#"local optimization_level = std.extVar("optimization_level");
{
  local cpp_compiler = "clang++",
  local archiver = "llvm-ar",
  "build_commands": {
    // C and C++:
    local c_optimizations =
      if optimization_level == "optimized" then
        " -g -O3 -fomit-frame-pointer -flto"
      else if optimization_level == "debug" then
        " -g -Og"
      else
        "",
    local cpp_command = cpp_compiler + c_optimizations +
      " -c -std=c++20 ${cdefines} ${cincludes} -MD -MF ${deps file} -o ${out} ${in}",

    "cc": cpp_command,
    "cpp": cpp_command,
    "c": cpp_compiler + c_optimizations +
      " -c -std=c17 ${cdefines} ${cincludes} -MD -MF ${deps file} -o ${out} ${in}",

    // Intel ASM:
    "asm": cpp_compiler + c_optimizations + " -c -MD -MF ${deps file} -o ${out} ${in}",

    // AT&T ASM:
    local att_asm = 'nasm -o ${out} ${in}',
    "s": att_asm,
    "S": att_asm
  },
  local application_linker_optimizations =
      if optimization_level == "optimized" then
        " -O3 -g -s --gc-sections"
      else " -g",
  "linker_command":
    if self.package_type == "application" then
      cpp_compiler + application_linker_optimizations + " -o ${out} ${in}"
    else if self.package_type == "library" then
      archiver + " rcs ${out} ${in}"
    else
      "",
  "output_extension":
    if self.package_type == "application" then
      ""
    else if self.package_type == "library" then
      "lib"
    else
      "",
  "source_directories": [
    ""
  ],
  "package_type": "application",
  "package_directories": [
${package_directories}
  ],
  "parallel_tasks": ${parallel_tasks}
}
"#;

/// Returns the user's home directory, honoring `HOME` then `USERPROFILE`.
pub fn home_directory() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home);
    }
    if let Some(home) = std::env::var_os("USERPROFILE") {
        return PathBuf::from(home);
    }
    // Fallback. This usually doesn't work but something is better than
    // nothing.
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
}

/// Returns the path of the root config file. `REBS_CONFIG` overrides the
/// default of `<home>/.rebs.jsonnet`.
pub fn root_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("REBS_CONFIG") {
        return PathBuf::from(path);
    }
    home_directory().join(CONFIG_FILE)
}

/// Evaluator for the jsonnet configuration chain.
pub struct Evaluator {
    /// The current scratch directory, hosting the staging file and the
    /// cached evaluated global config.
    scratch_dir: PathBuf,
    /// External variables passed to every evaluation.
    ext_vars: Vec<(String, String)>,
    /// The global config files, in concatenation order.
    global_files: Vec<PathBuf>,
    /// Max mtime across the global config files.
    global_timestamp: u64,
    /// The evaluated global config tree.
    global_value: Option<Value>,
    /// The concatenated global sources plus a trailing "+", ready for a
    /// package config to be appended.
    prepended_sources: Option<String>,
}

impl Evaluator {
    pub fn new(scratch_dir: PathBuf, optimization_level: &str, target_os: &str, target_arch: &str) -> Self {
        Self {
            scratch_dir,
            ext_vars: vec![
                ("optimization_level".into(), optimization_level.into()),
                ("target_os".into(), target_os.into()),
                ("target_architecture".into(), target_arch.into()),
            ],
            global_files: Vec::new(),
            global_timestamp: 0,
            global_value: None,
            prepended_sources: None,
        }
    }

    /// Loads the global config chain, creating the default root config on
    /// first use. `working_dir` is checked for a universe-local config to
    /// append to the chain.
    pub fn load_global(&mut self, working_dir: &Path) -> ConfigResult<(&Value, u64)> {
        let root_config = root_config_path();
        if file_timestamp(&root_config) == 0 {
            create_default_config(&root_config);
        }

        self.global_files = vec![root_config];
        let local_config = working_dir.join(UNIVERSE_CONFIG_FILE);
        if local_config.is_file() {
            self.global_files.push(local_config);
        }

        self.global_timestamp = self
            .global_files
            .iter()
            .map(|file| file_timestamp(file))
            .max()
            .unwrap_or(0);

        let generated = self.scratch_dir.join(CONFIG_JSON_FILE);
        if self.global_timestamp > file_timestamp(&generated) {
            // One of the config files is newer than the cached evaluation.
            let sources = self.concatenated_global_sources()?;
            self.evaluate(&sources, &generated)?;
        }

        let value = parse_json_file(&generated)?;
        self.global_value = Some(value);
        Ok((self.global_value.as_ref().unwrap(), self.global_timestamp))
    }

    /// The max mtime across the global config files, in ms.
    pub fn global_timestamp(&self) -> u64 {
        self.global_timestamp
    }

    /// The evaluated global config tree. Only valid after `load_global`.
    pub fn global_value(&self) -> Option<&Value> {
        self.global_value.as_ref()
    }

    /// Loads the evaluated config for a package. Packages without their own
    /// config file inherit the global tree. Returns the tree and the
    /// metadata timestamp: the max of the package config's mtime and every
    /// global config mtime.
    pub fn package_config(
        &mut self,
        package_path: &Path,
        package_scratch: &Path,
    ) -> ConfigResult<(Value, u64)> {
        let config_path = package_path.join(PACKAGE_CONFIG_FILE);
        let config_timestamp = file_timestamp(&config_path);
        if config_timestamp == 0 {
            let global = self
                .global_value
                .clone()
                .ok_or_else(|| ConfigError::NotFound(config_path))?;
            return Ok((global, self.global_timestamp));
        }

        let timestamp = self.global_timestamp.max(config_timestamp);
        let generated = package_scratch.join(GENERATED_PACKAGE_CONFIG);
        if timestamp > file_timestamp(&generated) {
            if self.prepended_sources.is_none() {
                self.prepended_sources = Some(format!("{}+", self.concatenated_global_sources()?));
            }
            let mut sources = self.prepended_sources.clone().unwrap();
            sources.push_str(&fs::read_to_string(&config_path)?);
            self.evaluate(&sources, &generated)?;
        }

        Ok((parse_json_file(&generated)?, timestamp))
    }

    /// Reads the global config files and joins them with jsonnet's `+`.
    fn concatenated_global_sources(&self) -> ConfigResult<String> {
        let mut sources = String::new();
        for file in &self.global_files {
            if let Ok(contents) = fs::read_to_string(file) {
                if !sources.is_empty() {
                    sources.push('+');
                }
                sources.push_str(&contents);
            }
        }
        Ok(sources)
    }

    /// Stages `sources` into the scratch directory and runs the evaluator,
    /// writing the JSON output to `output`.
    fn evaluate(&self, sources: &str, output: &Path) -> ConfigResult<()> {
        let staging = self.scratch_dir.join(TEMP_CONFIG_FILE);
        fs::write(&staging, sources)?;

        let mut command = Command::new("jsonnet");
        for (name, value) in &self.ext_vars {
            command.arg("--ext-str").arg(format!("{name}={value}"));
        }
        command.arg("-o").arg(output).arg(&staging);

        let result = command.output().map_err(|error| ConfigError::EvalFailure {
            file: staging.clone(),
            error: error.to_string(),
        })?;
        if !result.status.success() {
            return Err(ConfigError::EvalFailure {
                file: staging,
                error: String::from_utf8_lossy(&result.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

/// Writes the default config file, announcing the default package
/// directories it picked.
fn create_default_config(config_path: &Path) {
    let home = home_directory();
    let mut package_directories = String::new();
    println!("The default package directories are:");
    for sub_directory in ["applications", "libraries", "third_party"] {
        let directory = home.join("sources").join(sub_directory);
        println!("  {}", directory.display());
        package_directories.push_str(&format!("    \"{}\",\n", directory.display()));
    }

    let parallel_tasks = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let contents = DEFAULT_CONFIG_CONTENTS
        .replace("${package_directories}", package_directories.trim_end())
        .replace("${parallel_tasks}", &parallel_tasks.to_string());

    match fs::write(config_path, contents) {
        Ok(()) => println!("Writing config file to {}", config_path.display()),
        Err(error) => eprintln!(
            "Cannot write a config file to {}: {error}\n\
             You can set the environment variable REBS_CONFIG to the path you want to use.",
            config_path.display()
        ),
    }
}

/// The mtime of a file in integer milliseconds since the epoch, or 0 when
/// the file is missing.
pub fn file_timestamp(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

fn parse_json_file(path: &Path) -> ConfigResult<Value> {
    let contents = fs::read_to_string(path)
        .map_err(|_| ConfigError::NotFound(path.to_path_buf()))?;
    let value: Value = serde_json::from_str(&contents).map_err(|error| ConfigError::InvalidJson {
        file: path.to_path_buf(),
        error,
    })?;
    if !value.is_object() {
        return Err(ConfigError::EvalFailure {
            file: path.to_path_buf(),
            error: "evaluated configuration is not an object".into(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_timestamp_missing_file_is_zero() {
        assert_eq!(file_timestamp(Path::new("/no/such/file")), 0);
    }

    #[test]
    fn test_file_timestamp_existing_file_is_nonzero() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("present");
        fs::write(&file, "x").unwrap();
        assert!(file_timestamp(&file) > 0);
    }

    #[test]
    fn test_default_config_substitutes_placeholders() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.jsonnet");
        create_default_config(&config);

        let contents = fs::read_to_string(&config).unwrap();
        assert!(!contents.contains("${package_directories}"));
        assert!(!contents.contains("${parallel_tasks}"));
        // The worker-unique dependency file placeholder must survive into
        // the build commands untouched.
        assert!(contents.contains("${deps file}"));
    }

    #[test]
    fn test_parse_json_file_rejects_non_object() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("out.json");
        fs::write(&file, "[1, 2, 3]").unwrap();
        assert!(parse_json_file(&file).is_err());
    }

    #[test]
    fn test_concatenated_global_sources_joins_with_plus() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("a.jsonnet");
        let second = temp.path().join("b.jsonnet");
        fs::write(&first, "{ a: 1 }").unwrap();
        fs::write(&second, "{ b: 2 }").unwrap();

        let mut evaluator = Evaluator::new(temp.path().to_path_buf(), "fast", "linux", "x86_64");
        evaluator.global_files = vec![first, second];
        let sources = evaluator.concatenated_global_sources().unwrap();
        assert_eq!(sources, "{ a: 1 }+{ b: 2 }");
    }
}
