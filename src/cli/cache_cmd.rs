//! `modscout cache` — manage the on-disk search cache.

use crate::cache::SearchCache;
use crate::cli::output;
use crate::config::Config;
use anyhow::Result;
use std::path::Path;

pub fn run_clear(config_path: &Path, searches_only: bool) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let cache = SearchCache::new(config.cache_dir())?;

    let cleared = if searches_only {
        cache.clear_searches()?
    } else {
        cache.clear_all()?
    };

    if output::is_json() {
        output::print_json(&serde_json::json!({ "cleared": cleared }));
    } else {
        output::say(&format!("  cleared {cleared} cache file(s)"));
    }
    Ok(())
}
