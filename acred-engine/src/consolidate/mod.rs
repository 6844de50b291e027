//! Profile consolidator
//!
//! Joins the subject table with experience, production and allocation
//! tables into one `SubjectProfile`, and builds the paginated summary
//! listing. Every read for one request happens inside a single
//! transaction so the aggregate comes from one snapshot.

pub mod models;

use crate::cache::CacheKey;
use crate::error::{EngineError, Result};
use crate::pagination::calculate_pagination;
use crate::registry::{
    ALLOCATION_DETAIL_TABLE, ALLOCATION_MATRIX_TABLE, EXPERIENCE_TABLE, PRODUCTION_TABLE,
    SUBJECT_TABLE,
};
use crate::store::{read_rows_matching, read_table_rows};
use crate::EngineState;
use acred_common::db::{table_columns, table_exists};
use acred_common::text::{collapse_whitespace, fold_diacritics, match_key};
use chrono::NaiveDate;
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

pub use models::{
    AllocationFields, EducationRecord, ExperienceEntry, ProductionEntry, SubjectProfile,
    SubjectSummary, SummaryPage, SummaryQuery,
};

/// Matrix columns holding accreditation flags, in tag form
const ACCREDITATION_COLUMNS: [(&str, &str); 4] = [
    ("aacsb", "AACSB"),
    ("equis", "EQUIS"),
    ("amba", "AMBA"),
    ("abet", "ABET"),
];

/// Cell values counted as a set flag
const TRUTHY_FLAGS: [&str; 5] = ["SIM", "YES", "TRUE", "1", "Y"];

/// Date cells meaning "no information"
const DATE_PLACEHOLDERS: [&str; 2] = ["SEM INFORMACAO", "NSA"];

/// Experience languages kept in profiles (empty cell also kept)
const EXPERIENCE_LANGUAGE: &str = "EN";

/// Legacy area codes and their display labels
const AREA_LABELS: [(&str, &str); 9] = [
    ("FIN", "Finance"),
    ("MGT", "Management"),
    ("QTM", "Quantitative Methods"),
    ("NSA", "No Specific Area"),
    ("LEG", "Legal Studies"),
    ("ECO", "Economics"),
    ("MKT", "Marketing"),
    ("ACC", "Accounting"),
    ("ITO", "IT and Operations"),
];

/// Rows of one stored table with column lookup by name
struct TableRows {
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl TableRows {
    fn new(columns: &[String], rows: Vec<Vec<String>>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { index, rows }
    }

    fn cell<'a>(&self, row: &'a [String], column: &str) -> &'a str {
        self.index
            .get(column)
            .and_then(|i| row.get(*i))
            .map(|v| v.trim())
            .unwrap_or("")
    }
}

/// Read a whole table, or `None` when it was never loaded
async fn load_table(conn: &mut SqliteConnection, table: &str) -> Result<Option<TableRows>> {
    if !table_exists(&mut *conn, table).await? {
        return Ok(None);
    }
    let columns = table_columns(&mut *conn, table).await?;
    let rows = read_table_rows(&mut *conn, table, &columns).await?;
    Ok(Some(TableRows::new(&columns, rows)))
}

/// Read rows of `table` whose `column` equals `value`
async fn load_matching(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    value: &str,
) -> Result<Option<TableRows>> {
    if !table_exists(&mut *conn, table).await? {
        return Ok(None);
    }
    let columns = table_columns(&mut *conn, table).await?;
    if !columns.iter().any(|c| c == column) {
        return Ok(Some(TableRows::new(&columns, Vec::new())));
    }
    let rows = read_rows_matching(&mut *conn, table, &columns, column, value).await?;
    Ok(Some(TableRows::new(&columns, rows)))
}

/// Allocation facts for one subject
#[derive(Debug, Default, Clone)]
struct AllocationInfo {
    count: usize,
    disciplines: Vec<String>,
    accreditations: BTreeSet<String>,
}

/// Allocation detail joined with the accreditation matrix, keyed by name
#[derive(Debug, Default)]
struct AllocationIndex {
    /// Detail table exists and holds rows
    available: bool,
    by_name: HashMap<String, AllocationInfo>,
}

impl AllocationIndex {
    async fn load(conn: &mut SqliteConnection) -> Result<Self> {
        let mut discipline_tags: HashMap<String, BTreeSet<String>> = HashMap::new();
        if let Some(matrix) = load_table(&mut *conn, ALLOCATION_MATRIX_TABLE).await? {
            for row in &matrix.rows {
                let Some(discipline) = match_key(matrix.cell(row, "disciplina")) else {
                    continue;
                };
                let tags = ACCREDITATION_COLUMNS
                    .iter()
                    .filter(|(column, _)| is_truthy(matrix.cell(row, column)))
                    .map(|(_, tag)| tag.to_string());
                discipline_tags.entry(discipline).or_default().extend(tags);
            }
        }

        let mut index = AllocationIndex::default();
        let Some(detail) = load_table(&mut *conn, ALLOCATION_DETAIL_TABLE).await? else {
            return Ok(index);
        };
        index.available = !detail.rows.is_empty();

        for row in &detail.rows {
            let Some(name) = match_key(detail.cell(row, "nome_completo")) else {
                continue;
            };
            let entry = index.by_name.entry(name).or_default();
            entry.count += 1;

            let discipline = collapse_whitespace(detail.cell(row, "disciplina"));
            if discipline.is_empty() {
                continue;
            }
            if let Some(tags) = match_key(&discipline).and_then(|k| discipline_tags.get(&k)) {
                entry.accreditations.extend(tags.iter().cloned());
            }
            if !entry.disciplines.contains(&discipline) {
                entry.disciplines.push(discipline);
            }
        }

        Ok(index)
    }

    fn get(&self, name_key: Option<&String>) -> Option<&AllocationInfo> {
        name_key.and_then(|k| self.by_name.get(k))
    }
}

/// Build the consolidated profile of one subject (cached)
pub async fn build_profile(state: &EngineState, subject_id: &str) -> Result<SubjectProfile> {
    let subject_id = subject_id.trim().to_string();
    let key = CacheKey::new("build_profile", subject_id.clone());
    state
        .cache
        .get_or_compute(key, || load_profile(state, &subject_id))
        .await
}

async fn load_profile(state: &EngineState, subject_id: &str) -> Result<SubjectProfile> {
    let mut tx = state.db.begin().await?;

    let subjects = load_matching(&mut *tx, SUBJECT_TABLE, "id", subject_id)
        .await?
        .ok_or_else(|| EngineError::TableNotLoaded(SUBJECT_TABLE.to_string()))?;
    let subject_row = subjects
        .rows
        .first()
        .ok_or_else(|| EngineError::NotFound(subject_id.to_string()))?;

    let basic_fields: BTreeMap<String, String> = subjects
        .index
        .iter()
        .filter_map(|(column, i)| {
            let value = subject_row.get(*i)?.trim();
            (!value.is_empty()).then(|| (column.clone(), value.to_string()))
        })
        .collect();
    let name = collapse_whitespace(subjects.cell(subject_row, "nome_padrao"));
    let name_key = match_key(&name);
    let education = education_records(&subjects, subject_row);

    let experiences = match load_matching(&mut *tx, EXPERIENCE_TABLE, "id", subject_id).await? {
        Some(table) => experience_entries(&table),
        None => Vec::new(),
    };

    let productions = match (load_table(&mut *tx, PRODUCTION_TABLE).await?, &name_key) {
        (Some(table), Some(key)) => production_entries(&table, key, subject_id),
        _ => Vec::new(),
    };

    let allocation_index = AllocationIndex::load(&mut *tx).await?;
    tx.commit().await?;

    let (allocation, accreditations) = match allocation_index.get(name_key.as_ref()) {
        Some(info) => (
            AllocationFields {
                count: info.count,
                disciplines: info.disciplines.clone(),
            },
            info.accreditations.clone(),
        ),
        None => (AllocationFields::default(), BTreeSet::new()),
    };

    debug!(
        subject = subject_id,
        experiences = experiences.len(),
        productions = productions.len(),
        allocations = allocation.count,
        "Built subject profile"
    );

    Ok(SubjectProfile {
        subject_id: subject_id.to_string(),
        name,
        basic_fields,
        education,
        experiences,
        productions,
        accreditations,
        allocation,
    })
}

/// Doctorate and master's records, else the highest-degree column alone
fn education_records(subjects: &TableRows, row: &[String]) -> Vec<EducationRecord> {
    let mut records = Vec::new();
    for prefix in ["t_dout", "t_mestrado"] {
        let degree = subjects.cell(row, &format!("{}_en", prefix));
        if degree.is_empty() {
            continue;
        }
        records.push(EducationRecord {
            degree: degree.to_string(),
            institution: subjects.cell(row, &format!("{}_ies", prefix)).to_string(),
            year: extract_year(subjects.cell(row, &format!("{}_ano", prefix))),
            country: subjects.cell(row, &format!("{}_pais_en", prefix)).to_string(),
        });
    }

    let highest = subjects.cell(row, "tit_maxima");
    if records.is_empty() && !highest.is_empty() {
        records.push(EducationRecord {
            degree: highest.to_string(),
            institution: String::new(),
            year: None,
            country: String::new(),
        });
    }
    records
}

fn experience_entries(table: &TableRows) -> Vec<ExperienceEntry> {
    let mut entries: Vec<ExperienceEntry> = table
        .rows
        .iter()
        .filter(|row| {
            let language = table.cell(row, "idioma");
            language.is_empty() || language.eq_ignore_ascii_case(EXPERIENCE_LANGUAGE)
        })
        .map(|row| ExperienceEntry {
            role: table.cell(row, "cargo_role").to_string(),
            institution: table.cell(row, "empresa_company").to_string(),
            city: table.cell(row, "cidade_city").to_string(),
            country: table.cell(row, "pais_country").to_string(),
            category: table.cell(row, "categoria_prof_res_tch").to_string(),
            start_date: parse_date(table.cell(row, "inicio")),
            end_date: parse_date(table.cell(row, "fim")),
        })
        .collect();

    // Most recent start first; undated entries last
    entries.sort_by(|a, b| match (a.start_date, b.start_date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    entries
}

fn production_entries(table: &TableRows, name_key: &str, subject_id: &str) -> Vec<ProductionEntry> {
    let mut entries = Vec::new();
    for (index, row) in table.rows.iter().enumerate() {
        if match_key(table.cell(row, "professor")).as_deref() != Some(name_key) {
            continue;
        }
        let title = collapse_whitespace(table.cell(row, "titulo"));
        if title.is_empty() {
            warn!(
                subject = subject_id,
                row = index + 1,
                "Skipping production row without title"
            );
            continue;
        }
        entries.push(ProductionEntry {
            title,
            year: extract_year(table.cell(row, "ano")),
            kind: table.cell(row, "tipo").to_string(),
            venue: table.cell(row, "veiculo_ou_natureza").to_string(),
            classification: table.cell(row, "classificacao").to_string(),
            peer_review: table.cell(row, "revisao").to_string(),
            savi_status: table.cell(row, "status_savi").to_string(),
            library_status: table.cell(row, "status_biblioteca").to_string(),
            evidence_source: table.cell(row, "fonte_da_evidencia").to_string(),
            lattes_info: table.cell(row, "informacao_cv_lattes").to_string(),
        });
    }
    entries
}

/// Paginated subject listing (cached)
///
/// Filters run before pagination. `allocated_only` only applies when
/// allocation detail data exists; `accreditations` is an OR filter.
pub async fn list_summaries(state: &EngineState, query: &SummaryQuery) -> Result<SummaryPage> {
    let mut filter: Vec<String> = query
        .accreditations
        .iter()
        .map(|tag| tag.trim().to_uppercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    filter.sort();
    filter.dedup();

    let normalized = SummaryQuery {
        page: query.page,
        page_size: query.page_size,
        allocated_only: query.allocated_only,
        accreditations: filter,
    };
    let key = CacheKey::new(
        "list_summaries",
        format!(
            "{}|{}|{}|{}",
            normalized.page,
            normalized.page_size,
            normalized.allocated_only,
            normalized.accreditations.join(",")
        ),
    );

    state
        .cache
        .get_or_compute(key, || load_summaries(state, &normalized))
        .await
}

async fn load_summaries(state: &EngineState, query: &SummaryQuery) -> Result<SummaryPage> {
    let mut tx = state.db.begin().await?;
    let subjects = load_table(&mut *tx, SUBJECT_TABLE)
        .await?
        .ok_or_else(|| EngineError::TableNotLoaded(SUBJECT_TABLE.to_string()))?;
    let allocation_index = AllocationIndex::load(&mut *tx).await?;
    tx.commit().await?;

    let filter: BTreeSet<&str> = query.accreditations.iter().map(String::as_str).collect();

    let mut summaries: Vec<SubjectSummary> = Vec::new();
    for row in &subjects.rows {
        let id = subjects.cell(row, "id");
        let name = collapse_whitespace(subjects.cell(row, "nome_padrao"));
        if id.is_empty() || name.is_empty() {
            continue;
        }

        let info = allocation_index.get(match_key(&name).as_ref());
        let allocation_count = info.map_or(0, |i| i.count);
        let accreditations: Vec<String> = info
            .map(|i| i.accreditations.iter().cloned().collect())
            .unwrap_or_default();
        let has_allocation = allocation_count > 0;

        if query.allocated_only && allocation_index.available && !has_allocation {
            continue;
        }
        if !filter.is_empty() && !accreditations.iter().any(|t| filter.contains(t.as_str())) {
            continue;
        }

        let new_area = subjects.cell(row, "nova_area");
        let area = if new_area.is_empty() {
            area_label(subjects.cell(row, "area"))
        } else {
            new_area.to_string()
        };

        summaries.push(SubjectSummary {
            id: id.to_string(),
            name,
            area,
            unit: subjects.cell(row, "unid_acad").to_string(),
            allocation_count,
            accreditations,
            has_allocation,
        });
    }

    summaries.sort_by_cached_key(|s| s.name.to_lowercase());

    let total = summaries.len() as i64;
    let pagination =
        calculate_pagination(total, query.page, query.page_size, state.summary_page_cap);
    let items = summaries
        .into_iter()
        .skip(pagination.offset as usize)
        .take(pagination.page_size as usize)
        .collect();

    Ok(SummaryPage {
        items,
        total,
        page: pagination.page,
        page_size: pagination.page_size,
        total_pages: pagination.total_pages,
    })
}

/// Display label for a legacy area code; unknown codes pass through
pub fn area_label(code: &str) -> String {
    let code = code.trim();
    AREA_LABELS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(code))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| code.to_string())
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim().to_uppercase();
    TRUTHY_FLAGS.contains(&value.as_str())
}

/// Parse an experience date cell
///
/// Accepts `dd/mm/yyyy`, `mm/dd/yyyy`, `yyyy-mm-dd` and a bare year
/// (January 1st). Placeholders and unparsable text are `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    let folded = fold_diacritics(text).to_uppercase();
    if DATE_PLACEHOLDERS.contains(&folded.as_str()) {
        return None;
    }

    for format in ["%d/%m/%Y", "%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        return text
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1));
    }
    None
}

/// First standalone four-digit 19xx/20xx year in `text`
pub fn extract_year(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    if bytes.len() < 4 {
        return None;
    }
    for start in 0..=bytes.len() - 4 {
        let window = &bytes[start..start + 4];
        if !window.iter().all(u8::is_ascii_digit) {
            continue;
        }
        if !(window.starts_with(b"19") || window.starts_with(b"20")) {
            continue;
        }
        let before = start.checked_sub(1).map(|i| bytes[i]);
        let after = bytes.get(start + 4).copied();
        if before.is_some_and(|b| b.is_ascii_digit()) || after.is_some_and(|b| b.is_ascii_digit()) {
            continue;
        }
        return std::str::from_utf8(window).ok()?.parse().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("25/12/2020"), NaiveDate::from_ymd_opt(2020, 12, 25));
        assert_eq!(parse_date("12/25/2020"), NaiveDate::from_ymd_opt(2020, 12, 25));
        assert_eq!(parse_date("2020-12-25"), NaiveDate::from_ymd_opt(2020, 12, 25));
        assert_eq!(parse_date("2019"), NaiveDate::from_ymd_opt(2019, 1, 1));
    }

    #[test]
    fn test_parse_date_placeholders() {
        assert_eq!(parse_date("SEM INFORMAÇÃO"), None);
        assert_eq!(parse_date("sem informacao"), None);
        assert_eq!(parse_date("NSA"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("last spring"), None);
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year("2021"), Some(2021));
        assert_eq!(extract_year("Published 1999 (rev. 2004)"), Some(1999));
        assert_eq!(extract_year("ISBN 9781234567890"), None);
        assert_eq!(extract_year("n/a"), None);
        assert_eq!(extract_year("2150"), None);
    }

    #[test]
    fn test_area_label() {
        assert_eq!(area_label("fin"), "Finance");
        assert_eq!(area_label(" ITO "), "IT and Operations");
        assert_eq!(area_label("Strategy"), "Strategy");
    }

    #[test]
    fn test_truthy_flags() {
        assert!(is_truthy(" sim "));
        assert!(is_truthy("Y"));
        assert!(!is_truthy("NÃO"));
        assert!(!is_truthy(""));
    }
}
