//! `modscout status` — store statistics and job state.

use crate::cache::SearchCache;
use crate::cli::output;
use crate::config::Config;
use crate::store::{sqlite::SqliteStore, MappingStore};
use anyhow::Result;
use std::path::Path;

pub fn run(config_path: &Path, job_id: Option<i64>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let store = SqliteStore::open(&config.db_path())?;

    let stats = store.stats()?;
    let job = match job_id {
        Some(id) => store.get_job(id)?,
        None => store.running_job()?,
    };
    let index = SearchCache::new(config.cache_dir())
        .ok()
        .and_then(|cache| cache.get_index());

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "store": stats,
            "job": job,
            "country_index": index.as_ref().map(|i| serde_json::json!({
                "countries": i.data.total_countries(),
                "universities": i.data.total_universities(),
                "cached_at": i.cached_at,
            })),
        }));
        return Ok(());
    }

    match &index {
        Some(cached) => output::say(&format!(
            "  country index: {} countries, {} universities (cached {})",
            cached.data.total_countries(),
            cached.data.total_universities(),
            cached.cached_at.format("%Y-%m-%d")
        )),
        None => output::say("  country index: not cached yet"),
    }

    output::say(&format!(
        "  store: {} countries, {} universities, {} mappings ({} distinct modules)",
        stats.total_countries, stats.total_universities, stats.total_mappings,
        stats.unique_modules
    ));
    match stats.last_completed_crawl {
        Some(ts) => output::say(&format!("  last completed crawl: {}", ts.format("%Y-%m-%d %H:%M UTC"))),
        None => output::say("  no completed crawl yet"),
    }

    match job {
        Some(job) => {
            output::say(&format!(
                "  job {}: {} — {}/{} countries, {}/{} universities",
                job.id,
                job.status,
                job.completed_countries,
                job.total_countries,
                job.completed_universities,
                job.total_universities
            ));
            if let (Some(country), Some(university)) = (&job.current_country, &job.current_university)
            {
                output::say(&format!("    currently at: {university} ({country})"));
            }
            if let Some(error) = &job.error_message {
                output::say(&format!("    message: {error}"));
            }
        }
        None => {
            if job_id.is_some() {
                output::say("  no such job");
            } else {
                output::say("  no job running");
            }
        }
    }
    Ok(())
}
