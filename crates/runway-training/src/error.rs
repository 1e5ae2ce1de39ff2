use std::path::PathBuf;
use thiserror::Error;

pub type LayoutResult<T> = std::result::Result<T, LayoutError>;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    /// A previous attempt exists but its snapshot cannot be used to continue it.
    #[error("cannot resume from {path}: {reason}")]
    ResumeLineage { path: PathBuf, reason: String },

    #[error("more than {max_attempts} attempts found under {run_root}")]
    TooManyAttempts { run_root: PathBuf, max_attempts: u32 },

    #[error("rank coordination failed: {0}")]
    Coordination(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LayoutError {
    pub fn resume_lineage(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ResumeLineage { path: path.into(), reason: reason.into() }
    }
}
