// Copyright 2026 Modscout Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod browser;
mod cache;
mod cli;
mod config;
mod credentials;
mod enrich;
mod error;
mod navigator;
mod normalize;
mod orchestrator;
mod progress;
mod reconcile;
mod session;
mod store;
mod vacancy;

#[derive(Parser)]
#[command(
    name = "modscout",
    about = "Modscout — find exchange universities that map your modules",
    version,
    after_help = "Run 'modscout <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Path to the YAML config file
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store portal credentials
    Setup {
        /// Identity the credentials are stored under
        #[arg(long, default_value = "default")]
        identity: String,
    },
    /// Parse and filter the vacancy PDF (no browser needed)
    Extract {
        /// Override the configured PDF path
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    /// Full bulk crawl of every country and university into the store
    Crawl {
        /// Identity whose credentials to use
        #[arg(long, default_value = "default")]
        identity: String,
        /// Show the browser window (needed for manual MFA)
        #[arg(long)]
        headed: bool,
    },
    /// Rank exchange options for your modules
    Search {
        /// Identity whose credentials to use
        #[arg(long, default_value = "default")]
        identity: String,
        /// Home module codes (defaults to target_modules from the config)
        #[arg(long, num_args = 1..)]
        modules: Vec<String>,
        /// Countries to consider (defaults to target_countries)
        #[arg(long, num_args = 1..)]
        countries: Vec<String>,
        /// Minimum mappable modules for a university to appear
        #[arg(long, default_value = "2")]
        min_mappable: usize,
        /// Query the pre-crawled store instead of scraping live
        #[arg(long)]
        from_store: bool,
        /// Discard checkpoint and cached results before searching
        #[arg(long)]
        fresh: bool,
        /// Show the browser window (needed for manual MFA)
        #[arg(long)]
        headed: bool,
    },
    /// Show store statistics and job state
    Status {
        /// Job id (defaults to the running job, if any)
        job: Option<i64>,
    },
    /// Cancel a running crawl job owned by this process
    Cancel { job: i64 },
    /// Force-cancel stale jobs left behind by an unclean shutdown
    Maintenance {
        /// Also delete the incremental checkpoint
        #[arg(long)]
        reset_checkpoint: bool,
    },
    /// Manage the on-disk cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Clear cached data (all of it, or only search results)
    Clear {
        /// Only clear cached search results
        #[arg(long)]
        searches: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Export global flags so all modules can check them without plumbing.
    if args.json {
        std::env::set_var("MODSCOUT_JSON", "1");
    }
    if args.quiet {
        std::env::set_var("MODSCOUT_QUIET", "1");
    }
    if args.verbose {
        std::env::set_var("MODSCOUT_VERBOSE", "1");
    }

    init_tracing(args.verbose);

    let config_path = args.config.clone();
    let result = match args.command {
        Commands::Setup { identity } => cli::setup_cmd::run(&config_path, &identity),
        Commands::Extract { pdf } => cli::extract_cmd::run(&config_path, pdf),
        Commands::Crawl { identity, headed } => {
            cli::crawl_cmd::run(&config_path, &identity, !headed).await
        }
        Commands::Search {
            identity,
            modules,
            countries,
            min_mappable,
            from_store,
            fresh,
            headed,
        } => {
            cli::search_cmd::run(
                &config_path,
                &identity,
                modules,
                countries,
                min_mappable,
                from_store,
                fresh,
                !headed,
            )
            .await
        }
        Commands::Status { job } => cli::status_cmd::run(&config_path, job),
        Commands::Cancel { job } => cancel_job(&config_path, job),
        Commands::Maintenance { reset_checkpoint } => {
            cli::maintenance_cmd::run(&config_path, reset_checkpoint)
        }
        Commands::Cache { action } => match action {
            CacheAction::Clear { searches } => cli::cache_cmd::run_clear(&config_path, searches),
        },
        Commands::Doctor => cli::doctor::run(&config_path),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "modscout", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}

fn cancel_job(config_path: &std::path::Path, job: i64) -> Result<()> {
    use crate::orchestrator::JobRegistry;
    use crate::store::sqlite::SqliteStore;
    use std::sync::Arc;

    let config = config::Config::load_or_default(config_path)?;
    let store = Arc::new(SqliteStore::open(&config.db_path())?);
    let registry = JobRegistry::new(store);
    registry.cancel(job)?;
    cli::output::say(&format!("  job {job} cancelled"));
    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "modscout=debug" } else { "modscout=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
