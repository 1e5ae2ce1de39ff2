//! Run configuration and its `config.yaml` snapshot.
//!
//! The trainer persists the fully-resolved configuration of every attempt into the
//! attempt's log directory. A later attempt reads it back to find the checkpoint
//! directory it should resume from.

use crate::error::{LayoutError, LayoutResult};
use crate::identity::{RunIdentity, DEFAULT_BASE_DIR, DEFAULT_NAME, DEFAULT_VERSION};
use crate::layout::ResolvedLayout;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_FILE: &str = "config.yaml";

/// Untyped sections carried through unchanged (model, data, trainer options, ...).
pub type ExtraSections = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Checkpoint the trainer restores before starting.
    #[serde(default)]
    pub ckpt_path: Option<PathBuf>,
    #[serde(default)]
    pub trainer: TrainerSection,
    #[serde(default)]
    pub model_ckpt: CheckpointSection,
    #[serde(default)]
    pub lr_monitor: LrMonitorSection,
    #[serde(flatten)]
    pub extra: ExtraSections,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerSection {
    #[serde(default)]
    pub logger: LoggerSection,
    #[serde(flatten)]
    pub extra: ExtraSections,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerSection {
    #[serde(default = "default_logger_class")]
    pub class_path: String,
    #[serde(default)]
    pub init_args: LoggerArgs,
}

impl Default for LoggerSection {
    fn default() -> Self {
        Self { class_path: default_logger_class(), init_args: LoggerArgs::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerArgs {
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub sub_dir: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraSections,
}

impl Default for LoggerArgs {
    fn default() -> Self {
        Self { save_dir: default_save_dir(), name: None, version: None, sub_dir: None, extra: ExtraSections::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMode {
    Min,
    Max,
}

/// Checkpoint callback settings. `dirpath`, when given before resolution, is the
/// root that per-attempt checkpoint directories are nested under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSection {
    #[serde(default)]
    pub dirpath: Option<PathBuf>,
    #[serde(default = "default_monitor")]
    pub monitor: String,
    #[serde(default = "default_mode")]
    pub mode: MonitorMode,
    #[serde(default = "default_true")]
    pub save_last: bool,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(flatten)]
    pub extra: ExtraSections,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            dirpath: None,
            monitor: default_monitor(),
            mode: default_mode(),
            save_last: true,
            filename: default_filename(),
            extra: ExtraSections::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingInterval {
    Epoch,
    Step,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrMonitorSection {
    #[serde(default = "default_logging_interval")]
    pub logging_interval: LoggingInterval,
}

impl Default for LrMonitorSection {
    fn default() -> Self {
        Self { logging_interval: default_logging_interval() }
    }
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_logger_class() -> String {
    "lightning.pytorch.loggers.TensorBoardLogger".to_string()
}

fn default_save_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BASE_DIR)
}

fn default_monitor() -> String {
    "val/loss".to_string()
}

fn default_mode() -> MonitorMode {
    MonitorMode::Min
}

fn default_true() -> bool {
    true
}

fn default_filename() -> String {
    crate::layout::BEST_CHECKPOINT_STEM.to_string()
}

fn default_logging_interval() -> LoggingInterval {
    LoggingInterval::Epoch
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            ckpt_path: None,
            trainer: TrainerSection::default(),
            model_ckpt: CheckpointSection::default(),
            lr_monitor: LrMonitorSection::default(),
            extra: ExtraSections::new(),
        }
    }
}

impl RunConfig {
    pub fn from_yaml_str(text: &str) -> LayoutResult<Self> {
        // An empty document deserializes as null; treat it as "all defaults".
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> LayoutResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml_string(&self) -> LayoutResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The run this configuration describes, for the given stage.
    pub fn identity(&self, subcommand: &str) -> LayoutResult<RunIdentity> {
        RunIdentity::new(self.trainer.logger.init_args.save_dir.clone(), &self.name, &self.version, subcommand)
    }

    /// Override one value by dotted key, e.g. `model.lr=0.01` or `trainer.max_epochs=5`.
    ///
    /// The value is parsed as YAML, so `5` is a number and `[1, 2]` a list; anything
    /// that is not valid YAML is kept as a plain string.
    pub fn set_dotted(&mut self, key: &str, raw_value: &str) -> LayoutResult<()> {
        let keys: Vec<&str> = key.split('.').collect();
        if keys.iter().any(|k| k.trim().is_empty()) {
            return Err(LayoutError::InvalidConfig(format!("invalid override key: {key:?}")));
        }
        let value = serde_yaml::from_str::<Value>(raw_value).unwrap_or_else(|_| Value::String(raw_value.to_string()));

        let mut root = serde_yaml::to_value(&*self)?;
        let (last, parents) = keys.split_last().ok_or_else(|| LayoutError::InvalidConfig("empty override key".to_string()))?;

        let mut node = &mut root;
        for part in parents {
            let map = node
                .as_mapping_mut()
                .ok_or_else(|| LayoutError::InvalidConfig(format!("cannot set {key}: `{part}` is not a section")))?;
            let section = Value::String((*part).to_string());
            if map.get(&section).is_none_or(Value::is_null) {
                map.insert(section.clone(), Value::Mapping(Mapping::new()));
            }
            node = map
                .get_mut(&section)
                .ok_or_else(|| LayoutError::InvalidConfig(format!("cannot set {key}: `{part}` is missing")))?;
        }
        let map = node
            .as_mapping_mut()
            .ok_or_else(|| LayoutError::InvalidConfig(format!("cannot set {key}: parent is not a section")))?;
        map.insert(Value::String((*last).to_string()), value);

        *self = serde_yaml::from_value(root)
            .map_err(|e| LayoutError::InvalidConfig(format!("override {key}={raw_value} rejected: {e}")))?;
        Ok(())
    }

    /// Write a resolved layout into the logger and checkpoint sections.
    pub fn apply_layout(&mut self, layout: &ResolvedLayout) {
        let args = &mut self.trainer.logger.init_args;
        args.name = Some(self.name.clone());
        args.version = Some(self.version.clone());
        args.sub_dir = Some(layout.sub_dir.clone());

        self.model_ckpt.dirpath = Some(layout.checkpoint_dir.clone());
        if let Some(ref resume) = layout.resume_checkpoint_path {
            self.ckpt_path = Some(resume.clone());
        }
    }
}

/// Extract the checkpoint directory recorded in a snapshot.
pub fn read_checkpoint_root(text: &str, key_path: &[String]) -> LayoutResult<PathBuf> {
    let doc: Value = serde_yaml::from_str(text)?;
    let dotted = key_path.join(".");

    let mut node = &doc;
    for key in key_path {
        node = node
            .get(key.as_str())
            .ok_or_else(|| LayoutError::InvalidConfig(format!("snapshot has no `{dotted}` entry")))?;
    }

    match node {
        Value::String(s) if !s.trim().is_empty() => Ok(PathBuf::from(s)),
        Value::Null => Err(LayoutError::InvalidConfig(format!("`{dotted}` is null in snapshot"))),
        _ => Err(LayoutError::InvalidConfig(format!("`{dotted}` is not a path in snapshot"))),
    }
}

/// Create `log_dir` and write the configuration snapshot into it.
pub fn write_snapshot(config: &RunConfig, log_dir: &Path, file_name: &str) -> LayoutResult<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_dir.join(file_name);
    std::fs::write(&path, config.to_yaml_string()?)?;
    tracing::debug!(path = %path.display(), "wrote config snapshot");
    Ok(path)
}
