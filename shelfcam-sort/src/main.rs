//! shelfcam-sort - robot image sorter
//!
//! Sorts the earliest staged robot run into per-box batches, labels each
//! batch with its experiment from the QR code in the box, and renders videos
//! of experiments that have stopped growing.
//!
//! Exit codes: 0 on completion, 2 when junk review needs an operator, 1 on
//! fatal error.

use anyhow::{Context, Result};
use clap::Parser;
use shelfcam_common::config::{self, LoggingConfig};
use shelfcam_sort::context::ContextOverrides;
use shelfcam_sort::{RunOptions, RunOutcome, SortContext, SortPipeline};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for shelfcam-sort
#[derive(Parser, Debug)]
#[command(name = "shelfcam-sort")]
#[command(about = "Sorts, labels and renders robot shelf images")]
#[command(version)]
struct Args {
    /// Boxes per shelf (default 1)
    #[arg(short = 'b', long)]
    boxes_per_shelf: Option<u32>,

    /// Transfer all current experiments to finished without sorting a run
    #[arg(short = 't', long)]
    transfer: bool,

    /// Do not stabilize rendered videos
    #[arg(short = 'd', long)]
    do_not_stabilize: bool,

    /// Robot number the data came from (1, 2, 3, ...); omit for a single robot
    #[arg(short = 'r', long)]
    robot_number: Option<String>,

    /// Install root holding the data/ tree
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(RunOutcome::ReviewRequired { pending, .. }) => {
            info!(pending, "Waiting for junk review");
            ExitCode::from(2)
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("shelfcam-sort: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<RunOutcome> {
    let toml_config =
        config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&toml_config.logging)?;

    info!("Starting shelfcam-sort");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    info!("Root folder: {}", root_folder.display());

    let overrides = ContextOverrides {
        robot_number: args.robot_number.clone(),
        boxes_per_shelf: args.boxes_per_shelf,
    };
    let ctx = SortContext::from_config(root_folder, &toml_config, &overrides)
        .context("Invalid sorter configuration")?;
    info!(
        robot = %ctx.layout.robot,
        boxes_per_shelf = ctx.params.boxes_per_shelf,
        remainder_policy = %ctx.params.remainder_policy,
        grace_runs = ctx.params.grace_runs,
        "Sorter configured"
    );

    let options = RunOptions {
        transfer_only: args.transfer,
        stabilize: !args.do_not_stabilize,
    };

    let mut pipeline = SortPipeline::with_defaults(ctx);
    let outcome = pipeline.execute_run(options).context("Sort run failed")?;

    match &outcome {
        RunOutcome::Completed { run, promotion } => info!(
            run = run.as_ref().map(|r| r.run_name.as_str()).unwrap_or("-"),
            promoted = promotion.promoted.len(),
            render_failures = promotion
                .promoted
                .iter()
                .filter(|p| p.render_error.is_some())
                .count(),
            "Done"
        ),
        RunOutcome::ReviewRequired { run, pending } => info!(
            run = %run.run_name,
            pending,
            "Done, promotion skipped until junk review is resolved"
        ),
        RunOutcome::NothingStaged => info!("Done, nothing to sort"),
    }

    Ok(outcome)
}

/// `RUST_LOG` wins over the configured level; logs go to stderr unless a
/// log file is configured
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let (stderr_layer, file_layer) = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false);
            (None, Some(layer))
        }
        None => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}
