//! Stage command implementation (`fit`, `validate`, `test`, `predict`).
//!
//! Resolves where the run logs and checkpoints, then either reports the layout or
//! hands it to a trainer process through environment variables.

use crate::commands::types::{RunArgs, Stage};
use crate::config::CliConfig;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use runway_training::{
    write_snapshot, Broadcast, LayoutResolver, RankInfo, ResolvedLayout, ResolverOptions, RunConfig, SingleProcess,
    DEFAULT_BASE_DIR, SNAPSHOT_FILE,
};
use serde_json::json;
use std::path::Path;

/// Execute a stage command and return the process exit code.
pub async fn execute(stage: Stage, args: RunArgs, cli_config: &CliConfig) -> Result<i32> {
    let mut run_config = build_run_config(&args, cli_config)?;
    let options = resolver_options(&args, cli_config, &run_config);
    let rank = RankInfo::from_env().context("Failed to read process rank")?;

    let layout = match args.layout {
        Some(ref path) => load_layout(path, stage)?,
        None if !rank.is_coordinator() => bail!(
            "rank {} of {} must not resolve the run layout; pass the coordinator's layout with --layout",
            rank.rank,
            rank.world_size
        ),
        None => {
            let identity = run_config.identity(stage.as_str())?;
            let resolver = LayoutResolver::new(options);
            SingleProcess
                .broadcast_from_coordinator(|| resolver.resolve(&identity))
                .with_context(|| format!("Failed to resolve run layout for `{stage}`"))?
        }
    };
    run_config.apply_layout(&layout);
    tracing::debug!(stage = %stage, sub_dir = %layout.sub_dir, log_dir = %layout.log_dir.display(), "resolved run layout");

    if args.print_config {
        print!("{}", run_config.to_yaml_string()?);
        return Ok(0);
    }

    if let Some(ref path) = args.emit_layout {
        layout.save_json(path).with_context(|| format!("Failed to write layout to {}", path.display()))?;
    }

    let snapshot_path = layout.log_dir.join(SNAPSHOT_FILE);
    let owns_snapshot = rank.is_coordinator() && (args.write_snapshot || !args.trainer.is_empty());
    if owns_snapshot {
        write_snapshot(&run_config, &layout.log_dir, SNAPSHOT_FILE)
            .with_context(|| format!("Failed to write config snapshot into {}", layout.log_dir.display()))?;
    }

    if args.trainer.is_empty() {
        report(stage, &layout, owns_snapshot.then_some(snapshot_path.as_path()), args.json)?;
        return Ok(0);
    }

    run_trainer(stage, &args.trainer, &layout, &snapshot_path).await
}

fn build_run_config(args: &RunArgs, cli_config: &CliConfig) -> Result<RunConfig> {
    let mut config = match args.config {
        Some(ref path) => {
            RunConfig::load(path).with_context(|| format!("Failed to load run config: {}", path.display()))?
        }
        None => RunConfig::default(),
    };

    // User-wide defaults only fill in what the run config left at its built-in value.
    if config.trainer.logger.init_args.save_dir == Path::new(DEFAULT_BASE_DIR) {
        if let Some(ref save_dir) = cli_config.save_dir {
            config.trainer.logger.init_args.save_dir = save_dir.clone();
        }
    }
    if config.model_ckpt.dirpath.is_none() {
        config.model_ckpt.dirpath = cli_config.ckpt_dirpath.clone();
    }

    if let Some(ref name) = args.name {
        config.name = name.clone();
    }
    if let Some(ref version) = args.version {
        config.version = version.clone();
    }
    if let Some(ref save_dir) = args.save_dir {
        config.trainer.logger.init_args.save_dir = save_dir.clone();
    }
    if let Some(ref ckpt_dirpath) = args.ckpt_dirpath {
        config.model_ckpt.dirpath = Some(ckpt_dirpath.clone());
    }

    for raw in &args.overrides {
        let (key, value) = raw.split_once('=').with_context(|| format!("Override must look like KEY=VALUE: {raw}"))?;
        config.set_dotted(key.trim(), value)?;
    }

    Ok(config)
}

fn resolver_options(args: &RunArgs, cli_config: &CliConfig, run_config: &RunConfig) -> ResolverOptions {
    let defaults = ResolverOptions::default();
    ResolverOptions {
        training_stage: cli_config.training_stage.clone().unwrap_or(defaults.training_stage),
        checkpoint_root: run_config.model_ckpt.dirpath.clone(),
        max_attempts: args.max_attempts.or(cli_config.max_attempts).unwrap_or(defaults.max_attempts),
        ..defaults
    }
}

fn load_layout(path: &Path, stage: Stage) -> Result<ResolvedLayout> {
    let layout = ResolvedLayout::load_json(path).with_context(|| format!("Failed to load layout: {}", path.display()))?;
    if layout.stage != stage.as_str() {
        bail!("layout in {} was resolved for `{}`, not `{stage}`", path.display(), layout.stage);
    }
    Ok(layout)
}

fn report(stage: Stage, layout: &ResolvedLayout, snapshot: Option<&Path>, json_output: bool) -> Result<()> {
    if json_output {
        let out = json!({
            "stage": layout.stage,
            "sub_dir": layout.sub_dir,
            "attempt": layout.attempt,
            "log_dir": layout.log_dir,
            "checkpoint_dir": layout.checkpoint_dir,
            "resume_checkpoint_path": layout.resume_checkpoint_path,
            "previous_sub_dir": layout.previous.as_ref().map(|p| p.sub_dir.clone()),
            "snapshot": snapshot,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Run layout ({stage})").bold().cyan());
    println!("  Sub-run:     {} (attempt {})", layout.sub_dir.cyan(), layout.attempt);
    println!("  Log dir:     {}", layout.log_dir.display());
    println!("  Checkpoints: {}", layout.checkpoint_dir.display());
    match layout.resume_checkpoint_path {
        Some(ref resume) => println!("  Resume from: {}", resume.display().to_string().yellow()),
        None => println!("  Resume from: {}", "fresh start".dimmed()),
    }
    if let Some(path) = snapshot {
        println!("  Snapshot:    {}", path.display().to_string().dimmed());
    }
    println!();
    Ok(())
}

async fn run_trainer(stage: Stage, command: &[String], layout: &ResolvedLayout, snapshot: &Path) -> Result<i32> {
    let (program, rest) = command.split_first().context("Trainer command is empty")?;

    let mut child = tokio::process::Command::new(program);
    child
        .args(rest)
        .env("RUNWAY_STAGE", stage.as_str())
        .env("RUNWAY_LOG_DIR", &layout.log_dir)
        .env("RUNWAY_CHECKPOINT_DIR", &layout.checkpoint_dir)
        .env("RUNWAY_CONFIG", snapshot);
    match layout.resume_checkpoint_path {
        Some(ref resume) => child.env("RUNWAY_RESUME_CHECKPOINT", resume),
        None => child.env_remove("RUNWAY_RESUME_CHECKPOINT"),
    };

    tracing::info!(program = %program, log_dir = %layout.log_dir.display(), "starting trainer");
    let status = child.status().await.with_context(|| format!("Failed to start trainer `{program}`"))?;

    // A trainer killed by a signal has no exit code.
    let code = status.code().unwrap_or(1);
    if !status.success() {
        tracing::warn!(code, "trainer exited with failure");
    }
    Ok(code)
}
