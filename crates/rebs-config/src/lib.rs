//! REBS configuration system
//!
//! Provides the configuration layer for REBS builds:
//! - Root config file resolution (`REBS_CONFIG`, `<home>/.rebs.jsonnet`)
//! - Default config bootstrap when no config exists yet
//! - Evaluation of the jsonnet configuration chain via the external
//!   `jsonnet` evaluator, with caching of the evaluated JSON
//! - Parsing of the global-config keys consumed by the build core
//!
//! The build core never parses the configuration DSL itself; it consumes the
//! already-evaluated JSON tree produced here.

pub mod evaluator;
pub mod global;

use std::path::PathBuf;
use thiserror::Error;

/// The name of the root config file inside the user's home directory.
pub const CONFIG_FILE: &str = ".rebs.jsonnet";
/// The name of the config file at the root of a package.
pub const PACKAGE_CONFIG_FILE: &str = ".package.rebs.jsonnet";
/// The config file that marks the working directory as a self-contained
/// universe and is appended to the global config chain.
pub const UNIVERSE_CONFIG_FILE: &str = ".universe.rebs.jsonnet";
/// The cached evaluated global config inside the scratch directory.
pub const CONFIG_JSON_FILE: &str = "rebs.json";
/// The staging file the concatenated jsonnet sources are written to before
/// invoking the evaluator.
pub const TEMP_CONFIG_FILE: &str = "temp.jsonnet";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("The configuration evaluator failed for {file}: {error}")]
    EvalFailure { file: PathBuf, error: String },

    #[error("Evaluated configuration at {file} is not a JSON object: {error}")]
    InvalidJson {
        file: PathBuf,
        error: serde_json::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

pub use evaluator::Evaluator;
pub use global::GlobalConfig;

/// Returns whether `dir` is the root of a self-contained universe.
pub fn is_universe_root(dir: &std::path::Path) -> bool {
    dir.join(UNIVERSE_CONFIG_FILE).is_file()
}
