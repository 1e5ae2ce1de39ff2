//! Runway CLI - training run harness
//!
//! The `runway` command decides where a training run logs and checkpoints,
//! detects whether an invocation continues an earlier attempt, and launches the
//! trainer with that layout.

mod commands;
mod config;

use clap::{CommandFactory, Parser, Subcommand};
use commands::{groups, train, GroupsCommand, RunArgs, Stage};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Runway CLI - training run layout and resume harness
#[derive(Parser, Debug)]
#[command(
    name = "runway",
    author,
    version,
    about = "Runway - training run layout and resume harness",
    long_about = "Runway resolves log and checkpoint directories for training runs.\nRe-running `fit` for the same name and version continues from the last checkpoint of the previous attempt."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model, resuming the previous attempt if one exists
    Fit(RunArgs),

    /// Validate a model
    Validate(RunArgs),

    /// Test a model
    Test(RunArgs),

    /// Run prediction
    Predict(RunArgs),

    /// Inspect class → group maps used by the grouped loss
    #[command(subcommand)]
    Groups(GroupsCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let cli_config = config::CliConfig::discover_and_load()?;

    // Initialize tracing; logs go to stderr so stdout stays machine-readable
    let level = match args.log_level.as_deref().or(cli_config.log_level.as_deref()).unwrap_or("info") {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // If no command provided, show help
    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let code = match command {
        Command::Fit(run) => train::execute(Stage::Fit, run, &cli_config).await?,
        Command::Validate(run) => train::execute(Stage::Validate, run, &cli_config).await?,
        Command::Test(run) => train::execute(Stage::Test, run, &cli_config).await?,
        Command::Predict(run) => train::execute(Stage::Predict, run, &cli_config).await?,
        Command::Groups(cmd) => {
            groups::execute(cmd)?;
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
