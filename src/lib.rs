pub mod aggregate;
pub mod classify;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod export;
pub mod flags;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod rag;
pub mod weeks;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;

use crate::dashboard::DashboardService;
use crate::db::{Database, SnapshotSource};
use crate::errors::{AppError, AppResult};
use crate::models::DashboardSettings;
use crate::pipeline::{FilterSpec, SortState};

static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

#[derive(Parser, Debug)]
#[command(name = "client-health", version, about = "Client engagement health dashboard")]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database; overrides the settings file and environment
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default, Clone)]
struct QueryArgs {
    /// Filter as KEY=VALUE, e.g. `pcpl_range=0-500`; repeatable
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    filters: Vec<String>,

    /// Drop the default relationship status filter
    #[arg(long)]
    all_statuses: bool,

    /// Sort field, e.g. `reply_rate_7d`
    #[arg(long)]
    sort: Option<String>,

    /// `asc` or `desc`
    #[arg(long)]
    order: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Live dashboard rows as JSON
    Live(QueryArgs),
    /// Snapshot, daily trend and campaign breakdown for one client
    Client {
        code: String,
        /// Reference date for the trend and campaign windows (default: today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Aggregated view over historical weeks
    Historical {
        /// Comma-separated week numbers, 1 = most recent
        #[arg(long)]
        weeks: String,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Historical weeks available for selection
    Weeks,
    /// Distinct values for the dropdown filters
    Filters,
    /// Clients and reporting names that failed to match
    Unmatched,
    /// CSV export of the live view, or of historical weeks with --weeks
    Export {
        #[arg(long)]
        weeks: Option<String>,
        /// Restrict to these client ids
        #[arg(long = "select", value_delimiter = ',')]
        select: Vec<i64>,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Check that the database answers
    Health,
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        settings.database_path = Some(db);
    }
    let db_path = config::require_database_path(&settings)?.to_path_buf();

    let log_dir = settings
        .log_dir
        .clone()
        .unwrap_or_else(|| db_path.parent().unwrap_or_else(|| Path::new(".")).join("logs"));
    init_tracing(&log_dir, &settings.log_level)?;

    let database = Database::new(&db_path)?;
    tracing::info!(db_path = %database.path().display(), "opened dashboard database");
    let service = DashboardService::new(Arc::new(database), settings);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let output = runtime.block_on(execute(&service, cli.command))?;
    println!("{}", output);
    Ok(())
}

async fn execute<S: SnapshotSource + 'static>(service: &DashboardService<S>, command: Commands) -> AppResult<String> {
    match command {
        Commands::Live(query) => {
            let (filters, sort) = query_state(service.settings(), &query)?;
            to_json(&service.live_dashboard(filters, sort).await?)
        }
        Commands::Client { code, as_of } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            to_json(&service.client_detail(&code, as_of).await?)
        }
        Commands::Historical { weeks, query } => {
            let (filters, sort) = query_state(service.settings(), &query)?;
            to_json(&service.historical_dashboard(&weeks, filters, sort).await?)
        }
        Commands::Weeks => to_json(&service.available_weeks().await?),
        Commands::Filters => to_json(&service.filter_options().await?),
        Commands::Unmatched => to_json(&service.unmatched_mappings().await?),
        Commands::Export { weeks, select, query } => {
            let (filters, sort) = query_state(service.settings(), &query)?;
            let selection: HashSet<i64> = select.into_iter().collect();
            match weeks {
                Some(weeks) => {
                    service
                        .export_historical_csv(&weeks, filters, sort, Some(&selection))
                        .await
                }
                None => service.export_live_csv(filters, sort, Some(&selection)).await,
            }
        }
        Commands::Health => {
            service.health_check().await?;
            Ok("ok".to_string())
        }
    }
}

fn query_state(settings: &DashboardSettings, query: &QueryArgs) -> AppResult<(FilterSpec, SortState)> {
    let mut pairs = Vec::with_capacity(query.filters.len());
    for raw in &query.filters {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| AppError::Validation(format!("filter '{}' must be KEY=VALUE", raw)))?;
        pairs.push((key.trim(), value));
    }

    let mut filters = FilterSpec::from_query_pairs(pairs)?;
    if !query.all_statuses && filters.relationship_status.is_none() {
        filters.relationship_status = settings.default_relationship_status.clone();
    }
    let sort = SortState::from_query(query.sort.as_deref(), query.order.as_deref())?;
    Ok((filters, sort))
}

fn to_json<T: serde::Serialize>(value: &T) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn init_tracing(log_dir: &Path, level: &str) -> AppResult<()> {
    std::fs::create_dir_all(log_dir).map_err(|error| AppError::Io(error.to_string()))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "client-health.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
