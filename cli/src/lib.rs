//! Trustlens command-line shell
//!
//! This is the thin shell that parses arguments, wires the pipeline and prints
//! results. Core logic lives in the `crates/` directory.

pub mod error;
pub mod report;
pub mod state;

use anyhow::Context;
use clap::Parser;
use futures::stream::{self, StreamExt};
use report::TargetReport;
use state::AppState;
use std::path::PathBuf;
use tracing::info;
use trustlens_core::{AppConfig, Marketplace, Target};

/// Score how trustworthy a product's reviews look.
#[derive(Debug, Parser)]
#[command(name = "trustlens", version, about)]
pub struct Cli {
    /// Targets as MARKETPLACE:PRODUCT_ID, or bare product IDs in the default marketplace
    pub targets: Vec<String>,

    /// Read more targets from a file, one per line (`#` starts a comment)
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Config file to use instead of the user config
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// SQLite file for snapshot history (overrides `database.path`)
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
}

/// Initialize tracing subscriber for logging.
///
/// Logs go to stderr so JSON output on stdout stays clean.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,trustlens=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Resolve configuration: explicit file or user config, then env overrides,
/// then command-line flags.
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::load().context("failed to load user config")?,
    };
    config.apply_env_overrides();

    if let Some(db) = &cli.db {
        config.database.path = Some(db.clone());
    }
    if cli.headful {
        config.browser.headless = false;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Targets from arguments and `--file`, deduplicated in first-seen order.
pub fn collect_targets(cli: &Cli, default_marketplace: Marketplace) -> anyhow::Result<Vec<Target>> {
    let mut raw: Vec<String> = cli.targets.clone();
    if let Some(path) = &cli.file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read targets from {}", path.display()))?;
        raw.extend(
            contents
                .lines()
                .map(|line| line.split('#').next().unwrap_or_default().trim())
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }

    let mut targets: Vec<Target> = Vec::with_capacity(raw.len());
    for entry in &raw {
        let target = Target::parse_with_default(entry, default_marketplace)
            .with_context(|| format!("invalid target '{entry}'"))?;
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    Ok(targets)
}

/// Run one CLI invocation. Returns whether every target was scored.
pub async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(&cli)?;
    let targets = collect_targets(&cli, config.scraping.default_marketplace)?;
    if targets.is_empty() {
        anyhow::bail!("no targets given; pass product IDs or --file");
    }

    info!(
        "Starting Trustlens v{} for {} targets",
        env!("CARGO_PKG_VERSION"),
        targets.len()
    );

    let app = AppState::start(&config).await?;
    let scheduler = &app.scheduler;

    // At most queue_depth submissions outstanding
    let scrapes = stream::iter(targets)
        .map(|target| async move {
            let result = scheduler.submit(target.clone()).await;
            TargetReport::new(&target, &result)
        })
        .buffered(config.scheduler.queue_depth.max(1))
        .collect::<Vec<_>>();

    let reports = tokio::select! {
        reports = scrapes => Some(reports),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; stopping scheduler");
            None
        }
    };

    scheduler.shutdown().await;

    let Some(reports) = reports else {
        return Ok(false);
    };

    if cli.json {
        println!("{}", report::render_json(&reports)?);
    } else {
        print!("{}", report::render_text(&reports));
    }

    Ok(reports.iter().all(TargetReport::is_success))
}
