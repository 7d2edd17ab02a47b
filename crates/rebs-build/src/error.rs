/// Build system error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Can't find package named \"{name}\"")]
    UnknownPackage { name: String },

    #[error("\"{input}\" looks like a path but it can't be found")]
    PackagePathMissing { input: String },

    #[error("Package \"{package}\" has unknown package type \"{package_type}\"")]
    UnknownPackageType {
        package: String,
        package_type: String,
    },

    #[error("\"{package}\" depends on \"{dependency}\" but the latter isn't found")]
    MissingDependency {
        package: String,
        dependency: String,
    },

    #[error("\"{package}\" depends on \"{dependency}\" but the latter isn't a library")]
    DependencyNotLibrary {
        package: String,
        dependency: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] rebs_config::ConfigError),

    #[error("Unable to build \"{package}\": {error}")]
    PackageBuildFailed { package: String, error: String },

    #[error("Nothing to run")]
    NothingToRun,

    #[error("I/O error at {path}: {error}")]
    IoAt {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Create an unknown-package error
    pub fn unknown_package(name: impl Into<String>) -> Self {
        Self::UnknownPackage { name: name.into() }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoAt {
            path: path.into(),
            error,
        }
    }

    /// Create a dependency-not-library error
    pub fn dependency_not_library(
        package: impl Into<String>,
        dependency: impl Into<String>,
    ) -> Self {
        Self::DependencyNotLibrary {
            package: package.into(),
            dependency: dependency.into(),
        }
    }
}
