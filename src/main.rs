use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tracing::error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use nonprofit_dashboard_widgets::dashboard::{check_widgets, evaluate_widgets, load_widgets};
use nonprofit_dashboard_widgets::db::{self, PgSnapshotSource};
use nonprofit_dashboard_widgets::snapshot::{
    self, load_snapshot, run_refresh_loop, FileSnapshotSource, PreparedSnapshot,
};
use nonprofit_dashboard_widgets::{
    check_equation, format_value, report, Dataset, Equation, ValueFormat, Widget,
    WidgetResult,
};

#[derive(Parser)]
#[command(name = "dashboard-widgets")]
#[command(about = "Evaluate nonprofit dashboard widget equations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// Read records from a JSON snapshot file instead of Postgres
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Read widgets from a JSON file instead of Postgres
    #[arg(long)]
    widgets: Option<PathBuf>,
    /// Only count records owned by this organization
    #[arg(long)]
    organization: Option<Uuid>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data and widgets
    Seed,
    /// Import records for one dataset from a CSV file
    Import {
        #[arg(long, value_parser = parse_dataset)]
        table: Dataset,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Evaluate a single equation given as JSON
    Eval {
        #[arg(long)]
        equation: String,
        #[arg(long, default_value = ValueFormat::Number.code())]
        format: String,
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Evaluate every active widget
    Dashboard {
        #[command(flatten)]
        sources: SourceArgs,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report authoring issues in widget equations
    Check {
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        sources: SourceArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Re-evaluate widgets whenever the records change
    Watch {
        #[command(flatten)]
        sources: SourceArgs,
        #[arg(long, default_value_t = snapshot::DEFAULT_REFRESH.as_secs())]
        refresh_secs: u64,
    },
}

fn parse_dataset(name: &str) -> Result<Dataset, String> {
    Dataset::parse(name).ok_or_else(|| {
        format!("expected one of donations, requests, scholarships, events; got '{name}'")
    })
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set unless --snapshot and --widgets are given")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Connects to Postgres on first use only, so file-backed commands run offline.
struct Store {
    pool: OnceCell<PgPool>,
}

impl Store {
    fn new() -> Self {
        Self {
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> anyhow::Result<&PgPool> {
        self.pool.get_or_try_init(connect).await
    }

    async fn snapshot(&self, sources: &SourceArgs) -> anyhow::Result<PreparedSnapshot> {
        let snapshot = match &sources.snapshot {
            Some(path) => load_snapshot(path).await?,
            None => db::fetch_snapshot(self.pool().await?)
                .await
                .context("failed to fetch records")?,
        };
        Ok(scoped(PreparedSnapshot::new(snapshot), sources.organization))
    }

    async fn widgets(&self, sources: &SourceArgs) -> anyhow::Result<Vec<Widget>> {
        let widgets = match &sources.widgets {
            Some(path) => load_widgets(path).await?,
            None => db::fetch_widgets(self.pool().await?)
                .await
                .context("failed to fetch widgets")?,
        };
        Ok(widgets)
    }
}

fn scoped(prepared: PreparedSnapshot, organization: Option<Uuid>) -> PreparedSnapshot {
    match organization {
        Some(id) => PreparedSnapshot::new(prepared.snapshot.for_organization(id)),
        None => prepared,
    }
}

fn print_results(results: &[WidgetResult]) {
    if results.is_empty() {
        println!("No active widgets configured.");
        return;
    }

    for result in results {
        println!("- [{}] {}: {}", result.section, result.title, result.formatted);
    }
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
    let store = Store::new();

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool().await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(store.pool().await?).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { table, csv } => {
            let inserted = db::import_csv(store.pool().await?, table, &csv).await?;
            println!("Inserted {inserted} {table} from {}.", csv.display());
        }
        Commands::Eval {
            equation,
            format,
            sources,
        } => {
            let equation: Equation =
                serde_json::from_str(&equation).context("--equation must be a JSON list")?;
            for issue in check_equation(&equation) {
                println!("warning: {issue}");
            }
            let prepared = store.snapshot(&sources).await?;
            let value = prepared.evaluator().evaluate(&equation);
            println!("{} ({value})", format_value(value, &format));
        }
        Commands::Dashboard { sources, json } => {
            let prepared = store.snapshot(&sources).await?;
            let widgets = store.widgets(&sources).await?;
            let results = evaluate_widgets(&widgets, &prepared);
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
        }
        Commands::Check { sources } => {
            let widgets = store.widgets(&sources).await?;
            let flagged = check_widgets(&widgets);
            if flagged.is_empty() {
                println!("All {} widgets look good.", widgets.len());
                return Ok(());
            }

            for (widget, issues) in &flagged {
                println!("{} ({}):", widget.title, widget.id);
                for issue in issues {
                    println!("  - {issue}");
                }
            }
            anyhow::bail!("{} of {} widgets have equation issues", flagged.len(), widgets.len());
        }
        Commands::Report { sources, out } => {
            let prepared = store.snapshot(&sources).await?;
            let widgets = store.widgets(&sources).await?;
            let results = evaluate_widgets(&widgets, &prepared);
            let label = sources.organization.map(|id| id.to_string());
            let report = report::build_report(label.as_deref(), &prepared, &results, Utc::now());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Watch {
            sources,
            refresh_secs,
        } => {
            let period = Duration::from_secs(refresh_secs.max(1));
            let (changes_tx, changes_rx) = snapshot::change_bus(64);
            let (publisher, mut feed) = snapshot::snapshot_channel();

            match &sources.snapshot {
                Some(path) => {
                    let source = FileSnapshotSource::new(path.clone());
                    tokio::spawn(run_refresh_loop(source, period, changes_rx, publisher));
                }
                None => {
                    let pool = store.pool().await?.clone();
                    let listener_pool = pool.clone();
                    let forwarder = changes_tx.clone();
                    tokio::spawn(async move {
                        if let Err(err) = db::forward_changes(&listener_pool, forwarder).await {
                            error!(error = %err, "change feed stopped");
                        }
                    });
                    let source = PgSnapshotSource::new(pool);
                    tokio::spawn(run_refresh_loop(source, period, changes_rx, publisher));
                }
            }

            while feed.changed().await.is_ok() {
                let Some(latest) = feed.borrow_and_update().clone() else {
                    continue;
                };
                let prepared = scoped(latest.as_ref().clone(), sources.organization);
                let widgets = match store.widgets(&sources).await {
                    Ok(widgets) => widgets,
                    Err(err) => {
                        error!(error = %err, "failed to load widgets");
                        continue;
                    }
                };
                println!("Snapshot {}:", prepared.fetched_at.format("%H:%M:%S"));
                print_results(&evaluate_widgets(&widgets, &prepared));
            }
            drop(changes_tx);
        }
    }

    Ok(())
}
