//! `modscout search` — rank exchange options for one student's modules.
//!
//! Two data paths produce the same ranked output: `--from-store` reads a
//! previously crawled store and enriches it with vacancy data, while the
//! default path runs the checkpointed incremental crawl (or serves it from
//! the search cache) for exactly the universities the vacancy filter kept.

use crate::browser::chromium::ChromiumBrowser;
use crate::browser::BrowserEngine;
use crate::cache::SearchCache;
use crate::cli::output;
use crate::config::Config;
use crate::credentials::{CredentialVault, FileVault};
use crate::enrich::{MatchConfidence, VacancyDataService};
use crate::normalize::group_variations;
use crate::orchestrator::incremental::IncrementalCrawler;
use crate::orchestrator::MappingData;
use crate::reconcile::rank::filter_and_rank;
use crate::reconcile::{combine, IntegratedUniversityRecord};
use crate::session::PortalSession;
use crate::store::{sqlite::SqliteStore, MappingStore};
use crate::vacancy::{self, UniversityProfile};
use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config_path: &Path,
    identity: &str,
    modules_override: Vec<String>,
    countries_override: Vec<String>,
    min_mappable: usize,
    from_store: bool,
    fresh: bool,
    headless: bool,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;
    if !countries_override.is_empty() {
        config.target_countries = countries_override;
    }
    let modules: Vec<String> = if modules_override.is_empty() {
        config.target_modules.clone()
    } else {
        modules_override
    }
    .iter()
    .map(|m| m.to_uppercase())
    .collect();
    if modules.is_empty() {
        bail!("no modules requested — pass --modules or set target_modules in the config");
    }

    let cache = SearchCache::new(config.cache_dir())?;
    if fresh {
        IncrementalCrawler::new(config.clone()).reset()?;
        cache.clear_searches()?;
    }

    let records = if from_store {
        search_from_store(&config, &modules)?
    } else {
        search_live(&config, identity, &modules, &cache, headless).await?
    };

    let ranked = filter_and_rank(records, min_mappable);
    render(&ranked, &modules, min_mappable);
    Ok(())
}

/// Default path: vacancy filter → incremental crawl (cache-backed).
async fn search_live(
    config: &Config,
    identity: &str,
    modules: &[String],
    cache: &SearchCache,
    headless: bool,
) -> Result<Vec<IntegratedUniversityRecord>> {
    let universities = load_vacancy_profiles(config, cache)?;
    output::say(&format!(
        "  {} universities after vacancy filtering",
        universities.len()
    ));

    let mapping_data = match cache.get_search(&config.target_countries, modules, identity) {
        Some(cached) => {
            output::say(&format!(
                "  using cached search results from {}",
                cached.cached_at.format("%Y-%m-%d")
            ));
            cached.data
        }
        None => {
            let data = run_incremental_crawl(config, identity, &universities, modules, headless)
                .await?;
            cache.put_search(&config.target_countries, modules, identity, &data)?;
            data
        }
    };

    Ok(combine(&universities, &mapping_data))
}

/// Extract and filter the vacancy PDF, grouped, via the year-scale cache.
fn load_vacancy_profiles(
    config: &Config,
    cache: &SearchCache,
) -> Result<BTreeMap<String, UniversityProfile>> {
    if let Some(cached) = cache.get_vacancies(&config.target_countries, &config.student_college) {
        return Ok(cached.data);
    }

    let records = vacancy::extract_records(&config.vacancy_pdf)?;
    let filtered = vacancy::filter_records(&records, config);
    let grouped = group_variations(&filtered);
    cache.put_vacancies(&config.target_countries, &config.student_college, &grouped)?;
    Ok(grouped)
}

async fn run_incremental_crawl(
    config: &Config,
    identity: &str,
    universities: &BTreeMap<String, UniversityProfile>,
    modules: &[String],
    headless: bool,
) -> Result<MappingData> {
    let vault = FileVault::in_data_dir(&config.data_dir);
    let credentials = vault.get_credentials(identity)?;

    output::say(&format!(
        "  searching {} universities for {} modules (this is rate-limited and will take a while)",
        universities.len(),
        modules.len()
    ));

    let engine = ChromiumBrowser::launch(headless).await?;
    let page = engine.new_page().await?;
    let mut session = PortalSession::new(page, credentials, config.clone());

    let crawler = IncrementalCrawler::new(config.clone());
    let result = crawler.run(&mut session, universities, modules).await;

    // Release the browser whether the crawl succeeded or not.
    if let Err(e) = session.close().await {
        tracing::warn!("failed to close browser page: {e:#}");
    }
    engine.shutdown().await?;

    result
}

/// Store-backed path: instant query over a previous bulk crawl, enriched
/// with vacancy data by name (fuzzy matches flagged).
fn search_from_store(config: &Config, modules: &[String]) -> Result<Vec<IntegratedUniversityRecord>> {
    let store = SqliteStore::open(&config.db_path())?;
    if !store.is_populated()? {
        bail!("store is empty — run `modscout crawl` first or drop --from-store");
    }

    let stored = store.query_by_modules(modules, Some(&config.target_countries))?;
    output::say(&format!("  {} universities found in store", stored.len()));

    let vacancy_records =
        vacancy::extract_records(&config.vacancy_pdf).context("vacancy PDF needed to enrich store results")?;
    let enrichment = VacancyDataService::new(vacancy_records);

    let mut profiles = BTreeMap::new();
    let mut mapping_data = MappingData::new();
    let mut fuzzy: HashMap<String, u32> = HashMap::new();

    for uni in &stored {
        let id = format!("{}_{}", uni.country, uni.university);

        let mut profile = UniversityProfile {
            name: uni.university.clone(),
            country: uni.country.clone(),
            university_code: String::new(),
            university_sub_code: String::new(),
            sem1_spots: 0,
            min_cgpa: 0.0,
            remarks: String::new(),
            all_codes: Vec::new(),
            all_sub_codes: Vec::new(),
            variation_count: 1,
            merged_keys: Vec::new(),
        };
        if let Some(hit) = enrichment.lookup(&uni.university, &uni.country) {
            profile.university_code = hit.record.university_code.clone();
            profile.sem1_spots = hit.record.sem1_spots;
            profile.min_cgpa = hit.record.min_cgpa;
            profile.remarks = hit.record.remarks.clone();
            if let MatchConfidence::Fuzzy(score) = hit.confidence {
                fuzzy.insert(id.clone(), score);
            }
        }

        // Requested modules the store has nothing for are recorded empty so
        // coverage counts them as unmappable.
        let mut group = BTreeMap::new();
        for module in modules {
            let code = module.to_uppercase();
            group.insert(
                code.clone(),
                uni.mappings.get(&code).cloned().unwrap_or_default(),
            );
        }

        profiles.insert(id.clone(), profile);
        mapping_data.insert(id, group);
    }

    let mut records = combine(&profiles, &mapping_data);
    // Surface low-confidence enrichment rather than presenting it as fact.
    for record in &mut records {
        if let Some(score) = fuzzy.get(&record.id) {
            record.remarks = if record.remarks.is_empty() {
                format!("[fuzzy vacancy match, score {score}]")
            } else {
                format!("{} [fuzzy vacancy match, score {score}]", record.remarks)
            };
        }
    }
    Ok(records)
}

fn render(ranked: &[IntegratedUniversityRecord], modules: &[String], min_mappable: usize) {
    if output::is_json() {
        output::print_json(&serde_json::json!({
            "requested_modules": modules,
            "min_mappable": min_mappable,
            "results": ranked,
        }));
        return;
    }

    if ranked.is_empty() {
        output::say(&format!(
            "  no universities can map at least {min_mappable} of your modules"
        ));
        return;
    }

    output::say("");
    output::say(&format!(
        "  {:>4}  {:<42} {:<14} {:>8} {:>6} {:>6} {:>9}",
        "rank", "university", "country", "mappable", "spots", "cgpa", "coverage"
    ));
    for record in ranked {
        output::say(&format!(
            "  {:>4}  {:<42} {:<14} {:>5}/{:<2} {:>6} {:>6.2} {:>8.1}%",
            record.rank.unwrap_or(0),
            truncate(&record.name, 42),
            truncate(&record.country, 14),
            record.mappable_count,
            record.mappable_count + record.unmappable_modules.len(),
            record.sem1_spots,
            record.min_cgpa,
            record.coverage_score,
        ));
        if output::is_verbose() {
            for (module, mappings) in &record.mappable_modules {
                let partners: Vec<&str> = mappings
                    .iter()
                    .map(|m| m.partner_module_code.as_str())
                    .collect();
                output::say(&format!("          {module} → {}", partners.join(", ")));
            }
            if !record.unmappable_modules.is_empty() {
                output::say(&format!(
                    "          no mapping: {}",
                    record.unmappable_modules.join(", ")
                ));
            }
            if !record.remarks.is_empty() {
                output::say(&format!("          remarks: {}", record.remarks));
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}
