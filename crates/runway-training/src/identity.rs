use crate::error::{LayoutError, LayoutResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_NAME: &str = "default_name";
pub const DEFAULT_VERSION: &str = "version_0";
pub const DEFAULT_BASE_DIR: &str = "logs";

/// Identifies one logical experiment run.
///
/// Logs for a run live under `<base_dir>/<name>/<version>/<subcommand>[N]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub base_dir: PathBuf,
    pub name: String,
    pub version: String,
    /// Pipeline stage (e.g. `fit`, `validate`, `test`).
    pub subcommand: String,
}

impl RunIdentity {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        name: impl Into<String>,
        version: impl Into<String>,
        subcommand: impl Into<String>,
    ) -> LayoutResult<Self> {
        let identity =
            Self { base_dir: base_dir.into(), name: name.into(), version: version.into(), subcommand: subcommand.into() };
        identity.validate()?;
        Ok(identity)
    }

    pub fn validate(&self) -> LayoutResult<()> {
        validate_component("name", &self.name)?;
        validate_component("version", &self.version)?;
        validate_component("subcommand", &self.subcommand)?;
        Ok(())
    }

    /// `<base_dir>/<name>/<version>`, the parent of every attempt directory.
    #[must_use]
    pub fn run_root(&self) -> PathBuf {
        self.base_dir.join(&self.name).join(&self.version)
    }

    #[must_use]
    pub fn attempt_dir(&self, sub_dir: &str) -> PathBuf {
        self.run_root().join(sub_dir)
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

fn validate_component(field: &str, value: &str) -> LayoutResult<()> {
    if value.trim().is_empty() {
        return Err(LayoutError::InvalidConfig(format!("{field} is required")));
    }
    if value == "." || value == ".." {
        return Err(LayoutError::InvalidConfig(format!("{field} must not be `{value}`")));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(LayoutError::InvalidConfig(format!("{field} must not contain path separators: {value}")));
    }
    Ok(())
}
