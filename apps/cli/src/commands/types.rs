//! Command type definitions shared between main.rs and tests.

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Pipeline stage selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fit,
    Validate,
    Test,
    Predict,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Validate => "validate",
            Self::Test => "test",
            Self::Predict => "predict",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Experiment name [default: default_name]
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Experiment version [default: version_0]
    #[arg(short = 'v', long)]
    pub version: Option<String>,

    /// Base run configuration (YAML)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Root directory for run logs [default: logs]
    #[arg(long, value_name = "DIR")]
    pub save_dir: Option<PathBuf>,

    /// Root directory that checkpoint directories are nested under
    #[arg(long, value_name = "DIR")]
    pub ckpt_dirpath: Option<PathBuf>,

    /// Override a configuration value by dotted key (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Highest attempt suffix probed before giving up
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Output the resolved layout as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the fully-resolved run configuration (YAML) and exit
    #[arg(long, conflicts_with = "json")]
    pub print_config: bool,

    /// Write the resolved configuration snapshot into the log directory
    #[arg(long)]
    pub write_snapshot: bool,

    /// Write the resolved layout to FILE for other ranks to load
    #[arg(long, value_name = "FILE")]
    pub emit_layout: Option<PathBuf>,

    /// Use the layout in FILE instead of resolving it (non-coordinator ranks)
    #[arg(long, value_name = "FILE", conflicts_with = "emit_layout")]
    pub layout: Option<PathBuf>,

    /// Trainer command to run with the resolved layout (after `--`)
    #[arg(last = true, value_name = "TRAINER")]
    pub trainer: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum GroupsCommand {
    /// Check that a class → group map file is total and well-formed
    Validate {
        /// Map file (YAML mapping of class: group)
        path: PathBuf,

        /// Number of classes the map must cover (inferred when omitted)
        #[arg(long)]
        num_classes: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the built-in ten-class table
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
