//! User-wide defaults for `runway`, read from TOML files and the environment.
//!
//! Configuration precedence:
//! 1. CLI arguments (handled by clap)
//! 2. Environment variables (`RUNWAY_*`)
//! 3. Local config file (./.runwayrc)
//! 4. Global config file (~/.runway/config.toml)
//! 5. Defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// User-wide defaults for the training harness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Root directory for run logs
    #[serde(default)]
    pub save_dir: Option<PathBuf>,

    /// Root directory that checkpoint directories are nested under
    #[serde(default)]
    pub ckpt_dirpath: Option<PathBuf>,

    /// Highest attempt suffix probed before giving up
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Stage that resumes earlier attempts
    #[serde(default)]
    pub training_stage: Option<String>,

    /// Log level
    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Error)]
pub enum CliConfigError {
    #[error("Cannot read runway config {0}")]
    ReadError(String),

    #[error("Malformed runway config {0}")]
    ParseError(String),

    /// An environment override that does not parse.
    #[error("Bad value in environment: {0}")]
    InvalidValue(String),
}

pub type CliConfigResult<T> = std::result::Result<T, CliConfigError>;

impl CliConfig {
    /// Load configuration from a TOML file. A missing file yields `None`.
    pub fn load_from_file(path: &Path) -> CliConfigResult<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CliConfigError::ReadError(format!("{}: {}", path.display(), e))),
        };

        toml::from_str(&content)
            .map(Some)
            .map_err(|e| CliConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// `~/.runway/config.toml`, or `$RUNWAY_HOME/config.toml` when set.
    pub fn default_global_path() -> PathBuf {
        std::env::var_os("RUNWAY_HOME")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".runway")))
            .unwrap_or_else(|| PathBuf::from(".runway"))
            .join("config.toml")
    }

    /// Per-project overrides in the working directory.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".runwayrc")
    }

    /// Discover and load configuration files and environment overrides.
    ///
    /// A file that exists but cannot be parsed is an error rather than silently ignored.
    pub fn discover_and_load() -> CliConfigResult<Self> {
        let mut config = Self::default();

        if let Some(global) = Self::load_from_file(&Self::default_global_path())? {
            config.merge(&global);
        }

        // Local config overrides global
        if let Some(local) = Self::load_from_file(&Self::default_local_path())? {
            config.merge(&local);
        }

        config.merge(&Self::from_env(|key| std::env::var(key).ok())?);
        Ok(config)
    }

    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> CliConfigResult<Self> {
        let max_attempts = match lookup("RUNWAY_MAX_ATTEMPTS") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| CliConfigError::InvalidValue(format!("RUNWAY_MAX_ATTEMPTS={raw}")))?,
            ),
            None => None,
        };

        Ok(Self {
            save_dir: lookup("RUNWAY_SAVE_DIR").map(PathBuf::from),
            ckpt_dirpath: lookup("RUNWAY_CKPT_DIRPATH").map(PathBuf::from),
            max_attempts,
            training_stage: lookup("RUNWAY_TRAINING_STAGE"),
            log_level: lookup("RUNWAY_LOG_LEVEL"),
        })
    }

    /// Overlay every value `other` sets onto `self`.
    pub fn merge(&mut self, other: &Self) {
        if let Some(ref save_dir) = other.save_dir {
            self.save_dir = Some(save_dir.clone());
        }
        if let Some(ref ckpt_dirpath) = other.ckpt_dirpath {
            self.ckpt_dirpath = Some(ckpt_dirpath.clone());
        }
        if let Some(max_attempts) = other.max_attempts {
            self.max_attempts = Some(max_attempts);
        }
        if let Some(ref training_stage) = other.training_stage {
            self.training_stage = Some(training_stage.clone());
        }
        if let Some(ref log_level) = other.log_level {
            self.log_level = Some(log_level.clone());
        }
    }
}
