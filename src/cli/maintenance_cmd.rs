//! `modscout maintenance` — recover from unclean shutdowns.
//!
//! Force-terminalizes stale `running` job rows and clears the incremental
//! checkpoint on request. Safe to run any time no crawl is active.

use crate::cli::output;
use crate::config::Config;
use crate::orchestrator::incremental::IncrementalCrawler;
use crate::store::{sqlite::SqliteStore, MappingStore};
use anyhow::Result;
use std::path::Path;

pub fn run(config_path: &Path, reset_checkpoint: bool) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let store = SqliteStore::open(&config.db_path())?;

    let cancelled = store.force_cancel_stale_running_jobs()?;
    let checkpoint_cleared = if reset_checkpoint {
        IncrementalCrawler::new(config).reset()?
    } else {
        false
    };

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "stale_jobs_cancelled": cancelled,
            "checkpoint_cleared": checkpoint_cleared,
        }));
        return Ok(());
    }
    output::say(&format!("  stale jobs cancelled: {cancelled}"));
    if reset_checkpoint {
        output::say(&format!("  checkpoint cleared: {checkpoint_cleared}"));
    }
    Ok(())
}
