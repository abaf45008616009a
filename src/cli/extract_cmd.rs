//! `modscout extract` — parse and filter the vacancy PDF, no browser.

use crate::cli::output;
use crate::config::Config;
use crate::normalize::group_variations;
use crate::reconcile::rank::summarize_by_country;
use crate::reconcile::{combine, IntegratedUniversityRecord};
use crate::vacancy;
use anyhow::Result;
use std::path::{Path, PathBuf};

pub fn run(config_path: &Path, pdf_override: Option<PathBuf>) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;
    if let Some(pdf) = pdf_override {
        config.vacancy_pdf = pdf;
    }

    let records = vacancy::extract_records(&config.vacancy_pdf)?;
    let filtered = vacancy::filter_records(&records, &config);
    let grouped = group_variations(&filtered);

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "extracted_rows": records.len(),
            "after_filters": filtered.len(),
            "after_grouping": grouped.len(),
            "universities": grouped,
        }));
        return Ok(());
    }

    output::say(&format!(
        "  {} rows extracted, {} after filters, {} after grouping campus variations",
        records.len(),
        filtered.len(),
        grouped.len()
    ));
    output::say("");
    output::say(&format!(
        "  {:<44} {:<16} {:>5} {:>6} {:>10}",
        "university", "country", "spots", "cgpa", "variants"
    ));
    for profile in grouped.values() {
        output::say(&format!(
            "  {:<44} {:<16} {:>5} {:>6.2} {:>10}",
            profile.name, profile.country, profile.sem1_spots, profile.min_cgpa,
            profile.variation_count
        ));
    }

    // Country breakdown over the grouped set.
    let placeholder: Vec<IntegratedUniversityRecord> =
        combine(&grouped, &Default::default());
    let summary = summarize_by_country(&placeholder);
    output::say("");
    output::say("  by country:");
    for (country, stats) in &summary {
        output::say(&format!(
            "    {country}: {} universities, {} sem-1 spots",
            stats.count, stats.total_spots
        ));
    }
    Ok(())
}
