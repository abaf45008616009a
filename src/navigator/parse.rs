//! Result-table parsing for the module-mapping search page.
//!
//! The portal renders results as an alternating-row table (`tr.row0` /
//! `tr.row1`). A data row is distinguished from an annotation/detail row by
//! a `colspan="2"` marker on its first cell; columns are positional:
//!
//! ```text
//! 0 Home code (colspan 2) | 1 Home name | 2 Home type | 3 Partner code
//! | 4 Partner name | 5 AU | 6 Status | 7 Year | 8 Semester
//! ```
//!
//! Only rows whose status contains "approved" (case-insensitively) and whose
//! approval year falls in the configured recent-years set survive; everything
//! else is dropped here, at parse time, and never stored.
//!
//! When structured element lookup finds no candidate rows at all, a
//! regex-based extraction over the raw markup runs instead. That path is a
//! degraded-mode parser for markup drift, not the primary one.

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// One approved credit-equivalency record scraped from the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMapping {
    pub home_module_code: String,
    pub home_module_name: String,
    pub home_module_type: String,
    pub partner_module_code: String,
    pub partner_module_name: String,
    pub academic_units: String,
    pub status: String,
    pub approval_year: String,
    pub semester: String,
}

/// Parse the search-result page into retained mappings.
pub fn parse_mapping_table(html: &str, approved_years: &[String]) -> Vec<ModuleMapping> {
    let (mappings, candidate_rows) = parse_structured(html, approved_years);
    if candidate_rows > 0 {
        return mappings;
    }
    let fallback = parse_fallback(html, approved_years);
    if !fallback.is_empty() {
        tracing::warn!(
            "structured table lookup found nothing; pattern fallback recovered {} mappings",
            fallback.len()
        );
    }
    fallback
}

/// DOM-based parse. Returns the retained mappings plus how many candidate
/// data rows were seen, so the caller can tell "no approved rows" apart from
/// "no table at all".
fn parse_structured(html: &str, approved_years: &[String]) -> (Vec<ModuleMapping>, usize) {
    let document = Html::parse_document(html);
    let row_sel = Selector::parse("tr.row0, tr.row1").expect("static selector");
    let cell_sel = Selector::parse("td").expect("static selector");

    let mut mappings = Vec::new();
    let mut candidate_rows = 0usize;

    for row in document.select(&row_sel) {
        let cells: Vec<_> = row.select(&cell_sel).collect();
        // Detail/annotation rows have too few columns.
        if cells.len() < 8 {
            continue;
        }
        // Data rows carry the colspan marker on the first cell.
        if cells[0].value().attr("colspan") != Some("2") {
            continue;
        }
        candidate_rows += 1;

        let text = |i: usize| {
            cells
                .get(i)
                .map(|c| c.text().collect::<String>().trim().to_string())
                .unwrap_or_default()
        };

        let status = text(6);
        let year = text(7);
        if !is_retained(&status, &year, approved_years) {
            continue;
        }

        mappings.push(ModuleMapping {
            home_module_code: text(0),
            home_module_name: text(1),
            home_module_type: text(2),
            partner_module_code: text(3),
            partner_module_name: text(4),
            academic_units: text(5),
            status,
            approval_year: year,
            semester: text(8),
        });
    }

    (mappings, candidate_rows)
}

/// Regex extraction over the raw markup for when the DOM walk comes up empty.
fn parse_fallback(html: &str, approved_years: &[String]) -> Vec<ModuleMapping> {
    let pattern = Regex::new(
        r#"(?s)<tr class="row[01]"[^>]*>\s*<td[^>]*colspan="2"[^>]*>([^<]+)</td>\s*<td[^>]*>([^<]*)</td>\s*<td[^>]*>([^<]*)</td>\s*<td[^>]*>([^<]*)</td>\s*<td[^>]*>([^<]*)</td>\s*<td[^>]*>([^<]*)</td>\s*<td[^>]*>([^<]*)</td>\s*<td[^>]*>([^<]*)</td>\s*<td[^>]*>([^<]*)</td>"#,
    )
    .expect("static pattern");

    pattern
        .captures_iter(html)
        .filter_map(|caps| {
            let field = |i: usize| caps.get(i).map_or(String::new(), |m| m.as_str().trim().to_string());
            let status = field(7);
            let year = field(8);
            if !is_retained(&status, &year, approved_years) {
                return None;
            }
            Some(ModuleMapping {
                home_module_code: field(1),
                home_module_name: field(2),
                home_module_type: field(3),
                partner_module_code: field(4),
                partner_module_name: field(5),
                academic_units: field(6),
                status,
                approval_year: year,
                semester: field(9),
            })
        })
        .collect()
}

/// Approved status in a recent year. Year cells sometimes carry extra text,
/// so membership is a substring check against each configured year.
fn is_retained(status: &str, year: &str, approved_years: &[String]) -> bool {
    status.to_lowercase().contains("approved") && approved_years.iter().any(|y| year.contains(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn years() -> Vec<String> {
        vec!["2024".to_string(), "2025".to_string()]
    }

    fn row(class: &str, code: &str, status: &str, year: &str) -> String {
        format!(
            r#"<tr class="{class}">
                <td colspan="2">{code}</td><td>Neural Networks</td><td>Core</td>
                <td>COMP3308</td><td>Introduction to AI</td><td>3</td>
                <td>{status}</td><td>{year}</td><td>1</td>
            </tr>"#
        )
    }

    fn table(rows: &[String]) -> String {
        format!("<html><body><table>{}</table></body></html>", rows.join("\n"))
    }

    #[test]
    fn test_parses_approved_recent_rows() {
        let html = table(&[row("row0", "SC4001", "Approved", "2024")]);
        let mappings = parse_mapping_table(&html, &years());
        assert_eq!(mappings.len(), 1);
        let m = &mappings[0];
        assert_eq!(m.home_module_code, "SC4001");
        assert_eq!(m.partner_module_code, "COMP3308");
        assert_eq!(m.academic_units, "3");
        assert_eq!(m.semester, "1");
    }

    #[test]
    fn test_rejected_and_stale_rows_are_dropped() {
        let html = table(&[
            row("row0", "SC4001", "Approved", "2024"),
            row("row1", "SC4002", "Rejected", "2024"),
            row("row0", "SC4003", "Approved", "2020"),
        ]);
        let mappings = parse_mapping_table(&html, &years());
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].home_module_code, "SC4001");
    }

    #[test]
    fn test_annotation_rows_without_colspan_are_skipped() {
        let html = table(&[
            row("row0", "SC4001", "Approved", "2025"),
            r#"<tr class="row1"><td>Note</td><td>a</td><td>b</td><td>c</td><td>d</td><td>e</td><td>f</td><td>g</td></tr>"#.to_string(),
        ]);
        let mappings = parse_mapping_table(&html, &years());
        assert_eq!(mappings.len(), 1);
    }

    #[test]
    fn test_short_detail_rows_are_skipped() {
        let html = table(&[
            r#"<tr class="row0"><td colspan="2">detail text spanning the table</td></tr>"#
                .to_string(),
            row("row1", "SC4002", "Approved", "2025"),
        ]);
        let mappings = parse_mapping_table(&html, &years());
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].home_module_code, "SC4002");
    }

    #[test]
    fn test_year_match_is_substring_membership() {
        let html = table(&[row("row0", "SC4001", "Approved", "AY2024/25")]);
        assert_eq!(parse_mapping_table(&html, &years()).len(), 1);
    }

    #[test]
    fn test_candidate_rows_without_matches_do_not_trigger_fallback() {
        // One candidate row, filtered out: the structured pass owns the
        // result and the fallback must not resurrect it.
        let html = table(&[row("row0", "SC4001", "Rejected", "2024")]);
        assert!(parse_mapping_table(&html, &years()).is_empty());
    }

    #[test]
    fn test_fallback_recovers_rows_when_dom_walk_finds_none() {
        // Table rows hidden inside a comment defeat the DOM walk but not
        // the raw-markup pattern.
        let html = format!("<html><body><!-- broken wrapper {}", row("row0", "SC4001", "Approved", "2024"));
        let mappings = parse_mapping_table(&html, &years());
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].home_module_code, "SC4001");
    }

    #[test]
    fn test_empty_page_yields_empty() {
        assert!(parse_mapping_table("<html><body>No records found</body></html>", &years()).is_empty());
    }
}
