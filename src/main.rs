//! `catalog-watch` command-line entry point

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::future::join_all;

use catalog_watch::application::{report_site, run_site};
use catalog_watch::infrastructure::config::{AppConfig, LoggingConfig, SiteConfig};
use catalog_watch::infrastructure::logging::init_logging_with_config;

#[derive(Debug, Parser)]
#[command(name = "catalog-watch", version, about = "Product catalog monitor", long_about = None)]
struct Cli {
    /// Process-level config file (logging); defaults to the user config directory
    #[arg(long, global = true, env = "CATALOG_WATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, reconcile and notify for one or more sites
    Run(RunArgs),
    /// List stored products at or above a discount
    Report(ReportArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Site config files; sites run concurrently
    #[arg(required = true)]
    sites: Vec<PathBuf>,

    /// Log notifications instead of sending them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct ReportArgs {
    /// Site config file
    site: PathBuf,

    /// Minimum discount percentage; defaults to the site's notification threshold
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    min_discount: Option<u8>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let app = AppConfig::load(cli.config.as_deref()).context("failed to load application config")?;
    let _logging = init_logging_with_config(&app.logging).context("failed to initialize logging")?;

    match cli.command {
        Commands::Run(args) => run_sites(&args, &app.logging).await,
        Commands::Report(args) => report(&args).await,
    }
}

async fn run_one(path: &Path, logging: &LoggingConfig, dry_run: bool) -> Result<catalog_watch::application::RunReport> {
    let site = SiteConfig::load(path).with_context(|| format!("failed to load {}", path.display()))?;
    let report = run_site(&site, logging, dry_run)
        .await
        .with_context(|| format!("run for {} failed", site.site_name))?;
    Ok(report)
}

async fn run_sites(args: &RunArgs, logging: &LoggingConfig) -> Result<ExitCode> {
    let results = join_all(args.sites.iter().map(|path| run_one(path, logging, args.dry_run))).await;

    let mut failed = false;
    for (path, result) in args.sites.iter().zip(results) {
        match result {
            Ok(report) => {
                failed |= report.is_failure();
                println!("{report}");
            }
            Err(e) => {
                failed = true;
                eprintln!("{}: {e:#}", path.display());
            }
        }
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

async fn report(args: &ReportArgs) -> Result<ExitCode> {
    let site = SiteConfig::load(&args.site).with_context(|| format!("failed to load {}", args.site.display()))?;
    let min_discount = args.min_discount.unwrap_or(site.run.discount_threshold);
    let report = report_site(&site, min_discount)
        .await
        .with_context(|| format!("failed to read the catalog of {}", site.site_name))?;
    print!("{report}");
    Ok(ExitCode::SUCCESS)
}
