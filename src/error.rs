use std::path::PathBuf;
use thiserror::Error;

/// Main error type for depscope operations
#[derive(Error, Debug)]
pub enum DepscopeError {
    #[error("File system error at {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    PathResolution(#[from] PathResolutionError),

    #[error("Configuration error in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Cycle detection failed: {0}")]
    CycleDetection(String),

    #[error("Cache snapshot error: {0}")]
    CacheFormat(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DepscopeError {
    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    pub fn config(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::ConfigParse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Failure attached to a single `ResolvedPath`; never aborts a run.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PathResolutionError {
    #[error("Permission denied while checking {path}: {message}")]
    PermissionDenied { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, DepscopeError>;
