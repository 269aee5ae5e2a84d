//! # DevStats Collector CLI (`devstats`)
//!
//! The `devstats` binary is the primary interface for the collector. It
//! provides commands for database initialization, per-source collection,
//! full pipeline runs, correlation, browsing the canonical tables, and
//! starting the job dispatch server.
//!
//! ## Usage
//!
//! ```bash
//! devstats --config ./config/devstats.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `devstats init` | Create the SQLite database and the canonical schema |
//! | `devstats sources` | List registered sources and whether they are configured |
//! | `devstats collect <source>` | Collect one source and upsert its records |
//! | `devstats pipeline` | Collect every source, then derive deployments/incidents |
//! | `devstats correlate` | Recompute deployments and incidents from stored data |
//! | `devstats show <table>` | Page through a canonical table |
//! | `devstats serve` | Start the HTTP dispatch endpoint with an embedded worker |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! devstats init --config ./config/devstats.toml
//!
//! # Collect commits and pull requests from the configured repository
//! devstats collect git --config ./config/devstats.toml
//!
//! # Full run: every source, then correlation
//! devstats pipeline --config ./config/devstats.toml
//!
//! # Browse the most recent issues
//! devstats show issues --limit 20 --config ./config/devstats.toml
//!
//! # Start the dispatch endpoint
//! devstats serve --config ./config/devstats.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use devstats_collector::{config, correlate, db, migrate, pipeline, query, server, traits};

/// DevStats Collector — an ETL service for engineering metrics.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/devstats.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "devstats",
    about = "DevStats Collector — pluggable connectors, canonical storage, and derived deployment/incident metrics",
    version,
    long_about = "DevStats Collector provides a connector-driven pipeline for collecting engineering \
    data from multiple sources (git repositories, issue trackers, CI servers, quality scanners, test \
    harnesses), normalizing it into a canonical relational schema, and deriving deployment and \
    incident records for DORA-style metrics."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/devstats.toml`. Database, server, pipeline,
    /// and per-source settings are read from this file.
    #[arg(long, global = true, default_value = "./config/devstats.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all canonical tables
    /// (commits, issues, code_reviews, builds, build_commits, deployments,
    /// incidents, quality_metrics, test_runs). This command is
    /// idempotent — running it multiple times is safe.
    Init,

    /// List registered sources and their configuration status.
    ///
    /// Shows every source the registry knows, its description, and
    /// whether the config file carries a section for it. Useful for
    /// verifying configuration before running a collection.
    Sources,

    /// Collect one source and upsert its records.
    ///
    /// Runs the source's connector, normalizes the raw records into
    /// canonical entities, and upserts each entity batch. Collection is
    /// a full re-read of the configured scope; repeated runs converge
    /// without creating duplicates.
    Collect {
        /// Source name: `git`, `tracker`, `ci`, `quality`, or `tests`.
        source: String,
    },

    /// Run the full pipeline: collect every source, then correlate.
    ///
    /// Equivalent to `collect` for each registered source followed by
    /// `correlate`.
    Pipeline,

    /// Recompute deployments and incidents from the stored base tables.
    ///
    /// Reads builds, build_commits, and bug issues; rewrites the
    /// deployments and incidents tables. Idempotent.
    Correlate,

    /// Page through a canonical table.
    Show {
        #[command(subcommand)]
        table: ShowTable,
    },

    /// Start the HTTP dispatch endpoint.
    ///
    /// Binds to the address configured in `[server].bind`, accepts
    /// collection jobs on `POST /jobs`, and runs them on an embedded
    /// worker.
    Serve,
}

/// Tables browsable via `devstats show`.
#[derive(Subcommand)]
enum ShowTable {
    /// Recent commits, newest first.
    Commits {
        #[arg(long, default_value_t = 0)]
        skip: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Recent issues, newest first.
    Issues {
        #[arg(long, default_value_t = 0)]
        skip: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// One issue, looked up by its tracker key.
    Issue {
        /// Tracker issue key (e.g. `PROJ-42`).
        key: String,
    },
    /// Derived deployments, newest first.
    Deployments {
        #[arg(long, default_value_t = 0)]
        skip: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Derived incidents, newest first.
    Incidents {
        #[arg(long, default_value_t = 0)]
        skip: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            let registry = traits::CollectorRegistry::builtins()?;
            list_sources(&cfg, &registry)?;
        }
        Commands::Collect { source } => {
            let registry = traits::CollectorRegistry::builtins()?;
            let pool = db::connect(&cfg).await?;
            run_collect(&cfg, &registry, &pool, &source).await?;
        }
        Commands::Pipeline => {
            let registry = traits::CollectorRegistry::builtins()?;
            let pool = db::connect(&cfg).await?;
            let stats = pipeline::run_pipeline(&cfg, &registry, &pool).await?;
            for collection in &stats.collections {
                print_collection(collection);
            }
            println!("correlate");
            println!("  deployments: {}", stats.deployments);
            println!("  incidents: {}", stats.incidents);
            println!("  ok");
        }
        Commands::Correlate => {
            let pool = db::connect(&cfg).await?;
            let (deployments, incidents) =
                correlate::run_correlation(&pool, &cfg.pipeline.deployment_job_pattern).await?;
            println!("correlate");
            println!("  deployments: {deployments}");
            println!("  incidents: {incidents}");
            println!("  ok");
        }
        Commands::Show { table } => {
            let pool = db::connect(&cfg).await?;
            run_show(&pool, table).await?;
        }
        Commands::Serve => {
            let registry = Arc::new(traits::CollectorRegistry::builtins()?);
            server::run_server(cfg, registry).await?;
        }
    }

    Ok(())
}

/// Print registered sources with their configuration status. Status
/// comes from the connector itself, so custom registrations report
/// correctly too.
fn list_sources(cfg: &config::Config, registry: &traits::CollectorRegistry) -> anyhow::Result<()> {
    println!("Sources:");
    for source in registry.sources() {
        let Some((factory, _)) = registry.resolve(source) else {
            continue;
        };
        let connector = factory(cfg)?;
        let status = if connector.configured() {
            "OK"
        } else {
            "not configured"
        };
        println!("  {:<10} [{}] {}", source, status, connector.description());
    }
    Ok(())
}

async fn run_collect(
    cfg: &config::Config,
    registry: &traits::CollectorRegistry,
    pool: &sqlx::SqlitePool,
    source: &str,
) -> anyhow::Result<()> {
    match pipeline::run_collection(cfg, registry, pool, source).await? {
        Some(stats) => {
            print_collection(&stats);
            Ok(())
        }
        None => {
            anyhow::bail!(
                "Unknown source '{}'. Registered sources: {}",
                source,
                registry.sources().join(", ")
            );
        }
    }
}

fn print_collection(stats: &pipeline::CollectionStats) {
    println!("collect {}", stats.source);
    println!("  fetched: {}", stats.fetched);
    for (entity, count) in &stats.upserted {
        println!("  upserted {}: {}", entity.table(), count);
    }
    println!("  ok");
}

async fn run_show(pool: &sqlx::SqlitePool, table: ShowTable) -> anyhow::Result<()> {
    match table {
        ShowTable::Commits { skip, limit } => {
            let commits = query::list_commits(pool, skip, limit).await?;
            if commits.is_empty() {
                println!("No commits.");
            }
            for commit in commits {
                println!(
                    "{}  {}  {}",
                    commit.sha,
                    commit.author_name.as_deref().unwrap_or("-"),
                    first_line(commit.message.as_deref().unwrap_or(""))
                );
            }
        }
        ShowTable::Issues { skip, limit } => {
            let issues = query::list_issues(pool, skip, limit).await?;
            if issues.is_empty() {
                println!("No issues.");
            }
            for issue in issues {
                print_issue(&issue);
            }
        }
        ShowTable::Issue { key } => match query::get_issue(pool, &key).await? {
            Some(issue) => print_issue(&issue),
            None => anyhow::bail!("Issue not found: {key}"),
        },
        ShowTable::Deployments { skip, limit } => {
            let deployments = query::list_deployments(pool, skip, limit).await?;
            if deployments.is_empty() {
                println!("No deployments.");
            }
            for deployment in deployments {
                println!(
                    "{}  commit: {}  finished: {}",
                    deployment.id,
                    deployment.commit_sha.as_deref().unwrap_or("-"),
                    deployment
                        .finish_time
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        ShowTable::Incidents { skip, limit } => {
            let incidents = query::list_incidents(pool, skip, limit).await?;
            if incidents.is_empty() {
                println!("No incidents.");
            }
            for incident in incidents {
                println!(
                    "{}  deployment: {}",
                    incident.id,
                    incident.deployment_id.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

fn print_issue(issue: &query::IssueSummary) {
    println!(
        "{}  [{}/{}]  {}",
        issue.id,
        issue.issue_type.as_deref().unwrap_or("-"),
        issue.status.as_deref().unwrap_or("-"),
        issue.title.as_deref().unwrap_or("")
    );
    if let Some(minutes) = issue.lead_time_minutes {
        println!("  lead time: {minutes} min");
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
