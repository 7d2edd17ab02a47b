//! REBS third-party vendoring
//!
//! Materializes third-party code described by a package's
//! `third_party.json`: remote repositories (git, zip, plain downloads) are
//! cached under the repository registry's numbered directories, and a small
//! operation language (`copy`, `set`, `execute`, ...) stages their contents
//! into the package. Every produced file is recorded so it can be cleaned
//! again.

pub mod expand;
pub mod interpreter;
pub mod repositories;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VendorError {
    #[error("Failed to parse {path}: {error}")]
    ParseError {
        path: PathBuf,
        error: serde_json::Error,
    },

    #[error("Invalid repository metadata")]
    InvalidRepository,

    #[error("Unknown repository type: {0}")]
    UnknownRepositoryType(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Source does not exist: {0}")]
    MissingSource(PathBuf),

    #[error("Source and destination count mismatch in copy operation: {sources} sources, {destinations} destinations")]
    CopyCountMismatch {
        sources: usize,
        destinations: usize,
    },

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Failed to evaluate expression: {0}")]
    EvaluateFailed(String),

    #[error("Input does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("Directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("Invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type VendorResult<T> = Result<T, VendorError>;

pub use expand::MultiPlaceholders;
pub use interpreter::{clean_third_party, maybe_update_before_building, update_third_party};
pub use repositories::RepositoryRegistry;
