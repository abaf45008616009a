//! Dropdown-driven portal navigation.
//!
//! The search page is a country → university → course cascading selector:
//! choosing a country repopulates the university list server-side, so
//! dependent options must be re-read after every selection and element
//! handles are never kept across one. The selector names below are the
//! portal's own; this module makes no attempt to generalize past them.

pub mod parse;

pub use parse::ModuleMapping;

use crate::config::Config;
use crate::session::PortalSession;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Name of the country `<select>`.
const COUNTRY_SELECT: &str = "which_cty";
/// Name of the dependent university `<select>`.
const UNIVERSITY_SELECT: &str = "which_uni_val";
/// Name of the course `<select>`.
const COURSE_SELECT: &str = "which_course";
/// Sentinel option meaning "all courses" / "all universities".
pub const ALL_SENTINEL: &str = "ALL";

/// How long the dependent selector takes to repopulate after a selection.
const CASCADE_SETTLE: Duration = Duration::from_millis(1_500);
/// How long the result page takes to render after submit.
const RESULT_SETTLE: Duration = Duration::from_secs(3);

/// Mappings for one university, grouped by upper-cased home module code.
pub type UniversityMappings = BTreeMap<String, Vec<ModuleMapping>>;

/// Country → universities, exactly as the portal's selectors expose them
/// (document order, placeholder options excluded). This is the source of
/// truth for what exists to be scraped; sorting is the caller's concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryUniversityIndex {
    pub entries: Vec<CountryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryEntry {
    /// Display text of the country option.
    pub country: String,
    /// Option value, used when re-selecting.
    pub country_value: String,
    /// University option texts, in document order.
    pub universities: Vec<String>,
}

impl CountryUniversityIndex {
    pub fn total_countries(&self) -> usize {
        self.entries.len()
    }

    pub fn total_universities(&self) -> usize {
        self.entries.iter().map(|e| e.universities.len()).sum()
    }
}

/// Walks the cascading selectors of an authenticated session.
pub struct Navigator<'a> {
    session: &'a mut PortalSession,
    config: Config,
}

impl<'a> Navigator<'a> {
    pub fn new(session: &'a mut PortalSession, config: &Config) -> Self {
        Self {
            session,
            config: config.clone(),
        }
    }

    /// Enumerate every (country, university) pair the portal offers.
    ///
    /// A country whose university list cannot be read is recorded with an
    /// empty list and the walk continues; a session that cannot be brought
    /// back to the search page is fatal to the enumeration.
    pub async fn enumerate_countries_and_universities(&mut self) -> Result<CountryUniversityIndex> {
        if !self.session.ensure_active().await? {
            bail!("session invalid — cannot enumerate countries");
        }
        self.goto_search_page().await?;

        // Read values and texts up front; the elements themselves go stale
        // as soon as the first selection fires.
        let country_options = self.session.page().options_of(COUNTRY_SELECT).await?;
        let countries: Vec<_> = country_options
            .into_iter()
            .skip(1) // placeholder
            .filter(|o| !o.value.trim().is_empty())
            .collect();

        tracing::info!("enumerating {} countries", countries.len());

        let mut index = CountryUniversityIndex::default();
        for option in countries {
            let universities = match self.read_universities_for(&option.value).await {
                Ok(list) => list,
                Err(e) => {
                    tracing::warn!("failed to read universities for {}: {e:#}", option.text);
                    Vec::new()
                }
            };
            index.entries.push(CountryEntry {
                country: option.text,
                country_value: option.value,
                universities,
            });

            // Light politeness delay between selections.
            crate::orchestrator::jitter_delay(500, 1_000).await;
        }

        tracing::info!(
            "enumerated {} countries, {} universities",
            index.total_countries(),
            index.total_universities()
        );
        Ok(index)
    }

    async fn read_universities_for(&mut self, country_value: &str) -> Result<Vec<String>> {
        let page = self.session.page();
        if !page.select_value(COUNTRY_SELECT, country_value).await? {
            bail!("country option '{country_value}' not selectable");
        }
        tokio::time::sleep(CASCADE_SETTLE).await;

        let options = self.session.page().options_of(UNIVERSITY_SELECT).await?;
        Ok(options
            .into_iter()
            .skip(1) // placeholder
            .map(|o| o.text)
            .filter(|t| !t.is_empty())
            .collect())
    }

    /// Search all module mappings for one university.
    ///
    /// Returns the mappings grouped by home module code. A university that
    /// is absent from the portal's own dropdown is a legitimate case and
    /// yields an empty map, not an error — the vacancy PDF routinely
    /// advertises partners the mapping system has never seen.
    pub async fn search_university_mappings(
        &mut self,
        university_name: &str,
        country: &str,
    ) -> Result<UniversityMappings> {
        if !self.session.ensure_active().await? {
            tracing::warn!("session invalid, skipping search for {university_name}");
            return Ok(UniversityMappings::new());
        }
        self.goto_search_page().await?;

        // Country first; its value list is upper-cased country names.
        let page = self.session.page();
        let selected = page
            .select_value(COUNTRY_SELECT, &country.to_uppercase())
            .await?
            || page.select_value(COUNTRY_SELECT, country).await?;
        if !selected {
            tracing::warn!("could not select country '{country}'");
            return Ok(UniversityMappings::new());
        }
        tokio::time::sleep(CASCADE_SETTLE).await;

        // Re-read the dependent university list and pick the best match.
        let options = self.session.page().options_of(UNIVERSITY_SELECT).await?;
        let Some(matched) = best_university_option(
            university_name,
            options.iter().map(|o| o.text.as_str()),
        ) else {
            tracing::debug!("'{university_name}' not present in portal dropdown");
            return Ok(UniversityMappings::new());
        };
        let matched = matched.to_string();
        if !self
            .session
            .page()
            .select_value(UNIVERSITY_SELECT, &matched)
            .await?
        {
            tracing::warn!("university option '{matched}' went stale before selection");
            return Ok(UniversityMappings::new());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Course filter stays at its "all courses" sentinel; some page
        // variants have no course selector at all.
        let _ = self
            .session
            .page()
            .select_value(COURSE_SELECT, ALL_SENTINEL)
            .await;

        self.submit_search().await?;
        tokio::time::sleep(RESULT_SETTLE).await;

        let html = self.session.page().html().await?;
        let mappings = parse::parse_mapping_table(&html, &self.config.approved_years);

        let mut grouped = UniversityMappings::new();
        for mapping in mappings {
            let code = mapping.home_module_code.to_uppercase();
            if code.is_empty() {
                continue;
            }
            grouped.entry(code).or_insert_with(Vec::new).push(mapping);
        }

        tracing::debug!(
            "{university_name}: {} modules with retained mappings",
            grouped.len()
        );
        Ok(grouped)
    }

    /// Bring the page to the search form and wait for the country selector.
    ///
    /// Expiry announces itself here: navigating to the deep link while the
    /// session is dead bounces to SSO. `ensure_active` notices that, does
    /// its one re-login, and this navigation is the retried operation.
    async fn goto_search_page(&mut self) -> Result<()> {
        let student_id = self.session.student_id().to_string();
        let url = self.config.deep_link(&student_id);
        let timeouts = self.config.timeouts.clone();
        self.session
            .page_mut()
            .navigate(&url, timeouts.page_load_ms)
            .await?;

        if !self.session.ensure_active().await? {
            bail!("session could not be re-established");
        }

        let selector = format!("select[name='{COUNTRY_SELECT}']");
        if !self
            .session
            .page()
            .wait_for(&selector, timeouts.element_wait_ms)
            .await?
        {
            bail!("search form did not load (no country selector)");
        }
        Ok(())
    }

    /// Submit via the portal's button, any submit input, or a raw form post.
    async fn submit_search(&mut self) -> Result<()> {
        let page = self.session.page();
        if page
            .click("input[type='submit'][value='Submit']")
            .await?
        {
            return Ok(());
        }
        if page.click("input[type='submit']").await? {
            return Ok(());
        }
        page.submit_form().await
    }
}

/// Pick the dropdown option for a university name.
///
/// Case-insensitive exact substring match first; if nothing hits, fall back
/// to requiring the first two words of the target to each appear in the
/// option text.
fn best_university_option<'o>(
    target: &str,
    options: impl Iterator<Item = &'o str> + Clone,
) -> Option<&'o str> {
    let needle = target.to_lowercase();
    if let Some(hit) = options
        .clone()
        .find(|text| text.to_lowercase().contains(&needle))
    {
        return Some(hit);
    }

    let words: Vec<String> = needle.split_whitespace().take(2).map(String::from).collect();
    if words.is_empty() {
        return None;
    }
    options
        .clone()
        .find(|text| {
            let lower = text.to_lowercase();
            words.iter().all(|w| lower.contains(w.as_str()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_substring_match_wins() {
        let options = ["-- select --", "University of Queensland", "Queensland University of Technology"];
        let hit = best_university_option("University of Queensland", options.iter().copied());
        assert_eq!(hit, Some("University of Queensland"));
    }

    #[test]
    fn test_partial_match_on_first_two_words() {
        let options = ["Aarhus University, Denmark"];
        let hit = best_university_option("Aarhus University School of Engineering", options.iter().copied());
        assert_eq!(hit, Some("Aarhus University, Denmark"));
    }

    #[test]
    fn test_no_match_returns_none() {
        let options = ["University of Melbourne"];
        assert_eq!(
            best_university_option("Technical University of Denmark", options.iter().copied()),
            None
        );
    }

    #[test]
    fn test_index_totals() {
        let index = CountryUniversityIndex {
            entries: vec![
                CountryEntry {
                    country: "Australia".to_string(),
                    country_value: "AUSTRALIA".to_string(),
                    universities: vec!["A".to_string(), "B".to_string()],
                },
                CountryEntry {
                    country: "Denmark".to_string(),
                    country_value: "DENMARK".to_string(),
                    universities: vec!["C".to_string()],
                },
            ],
        };
        assert_eq!(index.total_countries(), 2);
        assert_eq!(index.total_universities(), 3);
    }
}
