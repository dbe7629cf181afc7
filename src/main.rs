use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod accounts;
mod aggregate;
mod campaign;
mod config;
mod dates;
mod db;
mod error;
mod export;
mod extract;
mod models;
mod report;
mod session;
mod transform;

use crate::campaign::CampaignResult;
use crate::config::{RunOptions, SiteConfig};
use crate::models::Granularity;
use crate::session::Session;

#[derive(Parser)]
#[command(name = "kepco-usage-crawler")]
#[command(about = "Collects interval electricity usage from the KEPCO Power Planner portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the warehouse schema
    InitDb,
    /// Crawl every account over its date range and publish the results
    Crawl {
        /// Account sheet export (.csv) or secret payload (.json)
        #[arg(long)]
        accounts: PathBuf,
        /// JSON overrides for portal URLs, locators and wait bounds
        #[arg(long)]
        site_config: Option<PathBuf>,
        #[arg(long, default_value = "http://localhost:4444")]
        webdriver: String,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
        #[arg(long, default_value = "out")]
        out: PathBuf,
        /// Skip the 15-minute lookups
        #[arg(long)]
        no_fine: bool,
        /// Skip the 30-minute lookups
        #[arg(long)]
        no_coarse: bool,
        #[arg(long, default_value_t = 2000)]
        settle_ms: u64,
        /// Markdown summary path (defaults to <out>/crawl_report.md)
        #[arg(long)]
        report: Option<PathBuf>,
        /// Also load long-format rows into Postgres (needs DATABASE_URL)
        #[arg(long)]
        warehouse: bool,
    },
    /// Print the days a range covers
    Dates {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Parse the usage table out of a saved page source
    Extract {
        #[arg(long)]
        html: PathBuf,
        #[arg(long, default_value = "tableListChart")]
        table_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect_pool().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Crawl {
            accounts,
            site_config,
            webdriver,
            headed,
            out,
            no_fine,
            no_coarse,
            settle_ms,
            report,
            warehouse,
        } => {
            let site = SiteConfig::load(site_config.as_deref())?;
            let accounts = accounts::load(&accounts)?;
            info!(count = accounts.len(), "loaded account records");

            let options = RunOptions {
                fine: !no_fine,
                coarse: !no_coarse,
                settle_after_mode: std::time::Duration::from_millis(settle_ms),
            };
            let granularities = options.granularities();
            if granularities.is_empty() {
                anyhow::bail!("--no-fine and --no-coarse leave nothing to crawl");
            }

            let pool = if warehouse {
                Some(connect_pool().await?)
            } else {
                None
            };

            let mut session = Session::connect(&webdriver, !headed, site).await?;
            let result = campaign::run(&mut session, &accounts, &options).await;
            info!(state = ?session.state(), "campaign finished, closing browser");
            if let Err(err) = session.close().await {
                warn!(error = %err, "browser teardown failed");
            }

            let run_stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
            for granularity in &granularities {
                if let Err(err) =
                    publish(&result, *granularity, &out, &run_stamp, pool.as_ref()).await
                {
                    error!(%granularity, error = %format!("{err:#}"), "publishing failed");
                }
            }

            let summary = report::build_report(&run_stamp, &result, &granularities);
            let report_path = report.unwrap_or_else(|| out.join("crawl_report.md"));
            match std::fs::create_dir_all(&out).and_then(|_| std::fs::write(&report_path, &summary)) {
                Ok(()) => println!("Report written to {}.", report_path.display()),
                Err(err) => warn!(path = %report_path.display(), error = %err, "could not write report"),
            }

            println!(
                "Crawl finished: {} accounts ({} skipped), {} dates failed.",
                result.accounts.len(),
                result.skipped_accounts(),
                result.failed_dates()
            );
            for granularity in &granularities {
                println!(
                    "- {}: {} rows",
                    granularity,
                    result.frames.rows(*granularity)
                );
            }
        }
        Commands::Dates { start, end } => {
            let range = dates::DateRange::parse(&start, &end)?;
            for day in &range {
                println!("{day}");
            }
            println!("{} days.", range.len());
        }
        Commands::Extract { html, table_id } => {
            let source = std::fs::read_to_string(&html)
                .with_context(|| format!("failed to read {}", html.display()))?;
            let table = extract::extract_table(&source, &table_id)?;
            println!("{}", table.columns.join("\t"));
            for row in &table.rows {
                println!("{}", row.join("\t"));
            }
            println!("{} rows.", table.len());
        }
    }

    Ok(())
}

async fn connect_pool() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the warehouse Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Merge, export and optionally load one granularity.
async fn publish(
    result: &CampaignResult,
    granularity: Granularity,
    out: &Path,
    run_stamp: &str,
    pool: Option<&PgPool>,
) -> anyhow::Result<()> {
    if result.frames.count(granularity) == 0 {
        info!(%granularity, "no data collected, nothing to publish");
        return Ok(());
    }

    let dataset = aggregate::merge_frames(result.frames.all(), granularity)?;
    let path = export::write_dataset(out, &dataset, run_stamp)?;
    println!("Wrote {} {} rows to {}.", dataset.len(), granularity, path.display());

    if let Some(pool) = pool {
        let records = aggregate::to_long_format(&dataset, Utc::now());
        let inserted = db::insert_measurements(pool, granularity, &records).await?;
        println!("Loaded {inserted} {granularity} measurements into the warehouse.");
    }

    Ok(())
}
