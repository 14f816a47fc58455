//! Trawler main entry point
//!
//! This is the command-line interface for running crawl jobs and the
//! crawl-then-analyse scheduler.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use trawler::config::{load_config_with_hash, Config};
use trawler::notify::TracingNotifier;
use trawler::storage::{with_store, ScheduleUpdate};
use trawler::{JobStatus, Orchestrator};
use tracing_subscriber::EnvFilter;

/// Trawler: same-host crawl jobs and scheduled analysis
///
/// Trawler crawls a single site breadth-first up to a depth and page limit,
/// and runs recurring schedules that re-crawl a site and hand the pages to
/// an extraction service.
#[derive(Parser, Debug)]
#[command(name = "trawler")]
#[command(version = "1.0.0")]
#[command(about = "Same-host crawl jobs and scheduled analysis", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and print it
    Check,

    /// Run one crawl job in the foreground (Ctrl-C requests a stop)
    Crawl {
        /// Start URL; a missing scheme defaults to https
        url: String,

        /// Owner the job belongs to
        #[arg(long, default_value_t = 1)]
        owner: i64,

        /// Maximum link depth (defaults to the configured value)
        #[arg(long)]
        depth: Option<u32>,

        /// Maximum number of pages (defaults to the configured value)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Register every enabled schedule and run until Ctrl-C
    Serve,

    /// Manage scheduled jobs
    #[command(subcommand)]
    Schedule(ScheduleCommand),

    /// List crawl jobs of an owner
    Jobs {
        #[arg(long)]
        owner: i64,

        /// Only show jobs with this status (STARTED, COMPLETED, STOPPED, ERROR)
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ScheduleCommand {
    /// Create a schedule from a finished crawl job
    Add {
        #[arg(long, default_value_t = 1)]
        owner: i64,

        #[arg(long)]
        name: String,

        /// Five-field cron expression, e.g. "0 6 * * 1-5"
        #[arg(long)]
        cron: String,

        #[arg(long)]
        prompt: String,

        /// Crawl job whose URL, depth and limit are reused on every run
        #[arg(long)]
        template: i64,
    },

    /// List the schedules of an owner
    List {
        #[arg(long, default_value_t = 1)]
        owner: i64,
    },

    /// Edit a schedule
    Update {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        cron: Option<String>,

        #[arg(long)]
        prompt: Option<String>,

        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        #[arg(long)]
        disable: bool,
    },

    /// Delete a schedule
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Check => handle_check(&config),
        Command::Crawl {
            url,
            owner,
            depth,
            limit,
        } => handle_crawl(&config, owner, &url, depth, limit).await,
        Command::Serve => handle_serve(&config).await,
        Command::Schedule(command) => handle_schedule(&config, command),
        Command::Jobs { owner, status } => handle_jobs(&config, owner, status.as_deref()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trawler=info,warn"),
            1 => EnvFilter::new("trawler=debug,info"),
            2 => EnvFilter::new("trawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    Orchestrator::from_config(config, Arc::new(TracingNotifier))
        .context("Failed to set up job services")
}

/// Handles `check`: prints the validated configuration
fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== Trawler Configuration ===\n");

    println!("Crawler:");
    println!("  Default depth: {}", config.crawler.default_depth);
    println!("  Default limit: {}", config.crawler.default_limit);
    println!("  Page timeout: {}s", config.crawler.page_timeout_secs);
    println!("  Connect timeout: {}s", config.crawler.connect_timeout_secs);
    let blocked: Vec<&str> = config
        .crawler
        .blocked_resources
        .iter()
        .map(|kind| kind.as_str())
        .collect();
    println!("  Blocked resources: {}", blocked.join(", "));

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nScheduler:");
    println!("  Allow overlap: {}", config.scheduler.allow_overlap);

    match &config.analyser {
        Some(analyser) => {
            println!("\nAnalyser:");
            println!("  Endpoint: {}", analyser.endpoint);
            println!("  Timeout: {}s", analyser.timeout_secs);
        }
        None => println!("\nAnalyser: not configured (scheduled runs will fail)"),
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles `crawl`: runs one job and prints its pages
async fn handle_crawl(
    config: &Config,
    owner: i64,
    url: &str,
    depth: Option<u32>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let orchestrator = Arc::new(orchestrator(config)?);

    let worker = Arc::clone(&orchestrator);
    let url = url.to_string();
    let mut crawl =
        tokio::spawn(async move { worker.start_crawl(owner, &url, depth, limit).await });

    let joined = tokio::select! {
        joined = &mut crawl => joined,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, stopping crawl");
            for job_id in orchestrator.running_crawls() {
                orchestrator.request_stop(job_id);
            }
            crawl.await
        }
    };
    let job = joined.context("Crawl task failed")??;

    println!("Crawl job {} finished: {}", job.id, job.status);
    for page in &job.pages {
        match &page.error {
            Some(error) => println!("  ✗ {} ({})", page.url, error),
            None => println!("  ✓ {} [{}] links: {}", page.url, page.title, page.links_found),
        }
    }

    Ok(())
}

/// Handles `serve`: keeps every enabled schedule registered until Ctrl-C
async fn handle_serve(config: &Config) -> anyhow::Result<()> {
    if config.analyser.is_none() {
        bail!("`serve` needs an [analyser] section in the configuration");
    }

    let orchestrator = orchestrator(config)?;
    let registered = orchestrator.initialize()?;
    tracing::info!("Serving {} schedule(s), press Ctrl-C to stop", registered);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    orchestrator.shutdown();
    Ok(())
}

/// Handles `schedule add|list|update|delete`
fn handle_schedule(config: &Config, command: ScheduleCommand) -> anyhow::Result<()> {
    let orchestrator = orchestrator(config)?;

    match command {
        ScheduleCommand::Add {
            owner,
            name,
            cron,
            prompt,
            template,
        } => {
            let job = orchestrator.create_schedule(owner, &name, &cron, &prompt, template)?;
            println!("✓ Created schedule {} ({})", job.id, job.cron_expression);
            if let Some(next_run) = job.next_run {
                println!("  Next run: {}", next_run.to_rfc3339());
            }
        }
        ScheduleCommand::List { owner } => {
            let jobs = with_store(orchestrator.store(), |s| s.list_scheduled_jobs(owner))?;
            println!("Schedules for owner {} ({}):", owner, jobs.len());
            for job in &jobs {
                let state = if job.enabled { "enabled" } else { "disabled" };
                let last = job
                    .last_run_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "never run".to_string());
                println!(
                    "  {} {} [{}] {} (template {}, last: {})",
                    job.id, job.name, job.cron_expression, state, job.crawl_job_id, last
                );
                if let Some(error) = &job.last_error {
                    println!("      error: {}", error);
                }
            }
        }
        ScheduleCommand::Update {
            id,
            name,
            cron,
            prompt,
            enable,
            disable,
        } => {
            let update = ScheduleUpdate {
                name,
                cron_expression: cron,
                prompt,
                enabled: match (enable, disable) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            };
            if update.is_empty() {
                bail!("Nothing to update");
            }

            let job = orchestrator.update_schedule(id, update)?;
            println!("✓ Updated schedule {}", job.id);
        }
        ScheduleCommand::Delete { id } => {
            orchestrator.delete_schedule(id)?;
            println!("✓ Deleted schedule {}", id);
        }
    }

    orchestrator.shutdown();
    Ok(())
}

/// Handles `jobs`: lists crawl jobs
fn handle_jobs(config: &Config, owner: i64, status: Option<&str>) -> anyhow::Result<()> {
    let status = match status {
        Some(s) => match JobStatus::from_db_string(&s.to_uppercase()) {
            Some(status) => Some(status),
            None => bail!("Unknown status: {}", s),
        },
        None => None,
    };

    let orchestrator = orchestrator(config)?;
    let jobs = with_store(orchestrator.store(), |s| s.list_crawl_jobs(owner, status))?;

    println!("Crawl jobs for owner {} ({}):", owner, jobs.len());
    for job in &jobs {
        println!(
            "  {} {} {} (depth {}, limit {}, {} pages) {}",
            job.id,
            job.status,
            job.initial_url,
            job.max_depth,
            job.page_limit,
            job.pages.len(),
            job.created_at.to_rfc3339()
        );
    }

    Ok(())
}
