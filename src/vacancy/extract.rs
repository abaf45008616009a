//! Text-layer parsing of the vacancy table.
//!
//! `pdf-extract` gives us the PDF's text with layout spacing preserved, so a
//! data row arrives as one line whose cells are separated by runs of two or
//! more spaces. Columns are positional:
//!
//! ```text
//! 0 Continent | 1 Country | 2 Code | 3 Sub-code | 4 University | 5 Status
//! | 6 For | 7 Full-year | 8 Sem 1 | 9 Sem 2 | 10 Min CGPA | 11 Remarks
//! ```
//!
//! An empty cell leaves no trace in the text layer, so rows are validated
//! structurally: the code column must look like a university code, and a row
//! that comes up one cell short has the routinely-empty sub-code column
//! reinserted. Numeric cells are scrubbed of everything but digits (and the
//! decimal point for CGPA) before conversion; malformed values become
//! 0 / 0.0 rather than errors. Header rows and rows missing a university
//! name or country are discarded, not reported.

use super::VacancyRecord;

/// Name-cell tokens that mark a header row.
const HEADER_TOKENS: &[&str] = &["University", "University Name"];

/// Parse the full extracted text of the PDF into vacancy records.
pub fn parse_document(text: &str) -> Vec<VacancyRecord> {
    text.lines()
        .filter_map(|line| {
            let cells = normalize_cells(split_columns(line));
            if cells.len() < 8 {
                return None;
            }
            parse_row(&cells)
        })
        .collect()
}

/// Parse one row's cells into a record, or `None` for headers and rows
/// missing the identity-bearing fields.
fn parse_row(cells: &[String]) -> Option<VacancyRecord> {
    let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("").trim();

    let country = cell(1).to_string();
    let university_code = cell(2).to_string();
    let university_name = cell(4).to_string();

    if !looks_like_code(&university_code) {
        return None;
    }
    if university_name.is_empty() || HEADER_TOKENS.contains(&university_name.as_str()) {
        return None;
    }
    if country.is_empty() {
        return None;
    }

    Some(VacancyRecord {
        continent: cell(0).to_string(),
        country,
        university_code,
        university_sub_code: cell(3).to_string(),
        university_name,
        status: cell(5).to_string(),
        eligible_colleges: cell(6).to_string(),
        full_year_spots: parse_number(cell(7)),
        sem1_spots: parse_number(cell(8)),
        sem2_spots: parse_number(cell(9)),
        min_cgpa: parse_float(cell(10)),
        remarks: cell(11).to_string(),
    })
}

/// Reinsert the sub-code column when it was empty in the source.
///
/// Sub-code is the only interior column that is routinely blank; when a row
/// arrives one cell short and index 3 holds something too long to be a
/// sub-code, the blank cell is restored so every later index lines up.
fn normalize_cells(mut cells: Vec<String>) -> Vec<String> {
    if cells.len() == 11 && !looks_like_sub_code(&cells[3]) {
        cells.insert(3, String::new());
    }
    cells
}

/// University codes are short dash-joined uppercase tokens, e.g. `AU-UQ`.
fn looks_like_code(cell: &str) -> bool {
    !cell.is_empty()
        && cell.len() <= 12
        && cell.chars().any(|c| c.is_ascii_uppercase())
        && cell
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
}

/// Sub-codes are at most a few uppercase characters.
fn looks_like_sub_code(cell: &str) -> bool {
    !cell.is_empty() && cell.len() <= 4 && cell.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Split a text line into cells on runs of two or more whitespace characters.
fn split_columns(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut space_run = 0usize;

    for ch in line.chars() {
        if ch.is_whitespace() {
            space_run += 1;
        } else {
            if space_run >= 2 && !current.is_empty() {
                cells.push(std::mem::take(&mut current));
            } else if space_run == 1 && !current.is_empty() {
                current.push(' ');
            }
            space_run = 0;
            current.push(ch);
        }
    }
    if !current.is_empty() {
        cells.push(current);
    }
    cells
}

/// Parse an integer cell, stripping every non-digit character first.
/// Malformed input yields 0, never an error.
pub fn parse_number(value: &str) -> u32 {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Parse a float cell, keeping only digits and the decimal point.
/// Malformed input yields 0.0, never an error.
pub fn parse_float(value: &str) -> f64 {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_never_fails() {
        assert_eq!(parse_number("3"), 3);
        assert_eq!(parse_number(" 2 spots "), 2);
        assert_eq!(parse_number("N/A"), 0);
        assert_eq!(parse_number(""), 0);
        assert_eq!(parse_number("-"), 0);
    }

    #[test]
    fn test_parse_float_never_fails() {
        assert_eq!(parse_float("3.5"), 3.5);
        assert_eq!(parse_float("CGPA 4.0"), 4.0);
        assert_eq!(parse_float("nil"), 0.0);
        assert_eq!(parse_float(""), 0.0);
        // Two decimal points make the cleaned string unparseable.
        assert_eq!(parse_float("3.5.1"), 0.0);
    }

    #[test]
    fn test_parse_document_skips_headers_and_invalid_rows() {
        let text = "\
Continent  Country/Region  Code  Sub  University Name  Status  For  FY  S1  S2  CGPA  Remarks
Oceania  Australia  AU-UQ    University of Queensland  Active  All  2  3  1  3.50  Group of Eight
Oceania    Ghost University  Active  All  1  1  1  3.00  no code column
short line";
        let records = parse_document(text);
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.country, "Australia");
        assert_eq!(rec.university_code, "AU-UQ");
        assert_eq!(rec.university_sub_code, "");
        assert_eq!(rec.university_name, "University of Queensland");
        assert_eq!(rec.full_year_spots, 2);
        assert_eq!(rec.sem1_spots, 3);
        assert_eq!(rec.sem2_spots, 1);
        assert_eq!(rec.min_cgpa, 3.5);
        assert_eq!(rec.remarks, "Group of Eight");
    }

    #[test]
    fn test_sub_code_column_survives_when_present() {
        let text =
            "Asia  Japan  JP-TIT  A  Tokyo Institute of Technology  Open  CCDS  TBC  -  n/a  tbd";
        let records = parse_document(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].university_sub_code, "A");
        assert_eq!(records[0].university_name, "Tokyo Institute of Technology");
        // Malformed numeric cells default to zero.
        assert_eq!(records[0].full_year_spots, 0);
        assert_eq!(records[0].sem1_spots, 0);
        assert_eq!(records[0].min_cgpa, 0.0);
    }

    #[test]
    fn test_single_spaces_stay_inside_a_cell() {
        let cells = split_columns(
            "Europe  Denmark  DK-DTU  X  Technical University of Denmark  Open  All  0  2  2  3.70  ",
        );
        assert_eq!(cells[4], "Technical University of Denmark");
        assert_eq!(cells[1], "Denmark");
    }
}
