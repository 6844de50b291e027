//! Tabular source reader
//!
//! Decodes an uploaded payload (delimited text or spreadsheet) into a
//! header row and data rows, then sanitizes the header. Nothing here
//! touches the store.

use crate::error::{EngineError, Result};
use crate::sanitize::sanitize_headers;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::Timelike;
use csv::ReaderBuilder;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Delimiters tried by detection, in tie-report order
pub const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Separator used for single-column text; ASCII unit separator, absent from real exports
pub const SINGLE_COLUMN: u8 = 0x1f;

/// Non-blank lines inspected by delimiter detection
const DETECTION_SAMPLE_LINES: usize = 20;

/// Container format of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// CSV, TSV or other separated text
    Delimited,
    /// Excel workbook (first sheet is read)
    Spreadsheet,
}

impl SourceFormat {
    /// Pick the format from the file extension
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = Path::new(filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" | "tsv" | "txt" => Ok(SourceFormat::Delimited),
            "xlsx" | "xlsm" | "xls" => Ok(SourceFormat::Spreadsheet),
            _ => Err(EngineError::parse(format!(
                "Unsupported file type '{}': expected .csv, .tsv, .txt, .xlsx, .xlsm or .xls",
                filename
            ))),
        }
    }
}

/// Parsed source: sanitized columns plus positional rows
///
/// Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Reorder cells to match `target` (a permutation of `columns`)
    pub fn reorder(self, target: &[String]) -> RawTable {
        let positions: Vec<Option<usize>> = target
            .iter()
            .map(|column| self.columns.iter().position(|c| c == column))
            .collect();

        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|p| p.and_then(|i| row.get(i).cloned()).unwrap_or_default())
                    .collect()
            })
            .collect();

        RawTable {
            columns: target.to_vec(),
            rows,
        }
    }
}

/// Read a payload into a `RawTable`
///
/// `preamble_rows` leading lines (or sheet rows) are discarded before the
/// header row.
pub fn read_table(bytes: &[u8], filename: &str, preamble_rows: usize) -> Result<RawTable> {
    if bytes.is_empty() {
        return Err(EngineError::parse(format!("File '{}' is empty", filename)));
    }

    let grid = match SourceFormat::from_filename(filename)? {
        SourceFormat::Delimited => read_delimited(bytes, preamble_rows)?,
        SourceFormat::Spreadsheet => read_spreadsheet(bytes, preamble_rows)?,
    };

    let table = shape_grid(grid)?;
    debug!(
        file = filename,
        columns = table.columns.len(),
        rows = table.rows.len(),
        "Parsed source file"
    );
    Ok(table)
}

/// UTF-8 first, Windows-1252 for spreadsheet exports saved with a legacy codepage
fn decode_text(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    };
    text.trim_start_matches('\u{feff}').to_string()
}

fn skip_lines(text: &str, count: usize) -> &str {
    let mut rest = text;
    for _ in 0..count {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

fn read_delimited(bytes: &[u8], preamble_rows: usize) -> Result<Vec<Vec<String>>> {
    let text = decode_text(bytes);
    let body = skip_lines(&text, preamble_rows);
    let delimiter = detect_delimiter(body)?;

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(body.as_bytes());

    let mut grid = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| EngineError::parse(format!("Malformed record {}: {}", index + 1, e)))?;
        grid.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }
    Ok(grid)
}

/// Detect the field separator of a delimited text sample
///
/// A candidate is plausible when it splits the header into more than one
/// field and no sampled row into more fields than the header (short rows
/// are padded later). The plausible candidate with the widest header wins;
/// a tie is ambiguous. When no candidate splits the header at all the file
/// has a single column, and [`SINGLE_COLUMN`] is returned so that candidate
/// characters inside data cells stay part of the cell.
pub fn detect_delimiter(text: &str) -> Result<u8> {
    let sample: String = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(DETECTION_SAMPLE_LINES)
        .collect::<Vec<_>>()
        .join("\n");

    if sample.is_empty() {
        return Err(EngineError::parse("No header row found"));
    }

    let mut header_split = false;
    let mut best: Vec<(u8, usize)> = Vec::new();
    for delimiter in DELIMITER_CANDIDATES {
        if !sample.as_bytes().contains(&delimiter) {
            continue;
        }
        let fields = match header_width(&sample, delimiter) {
            HeaderFit::Single => continue,
            HeaderFit::Overflow => {
                header_split = true;
                continue;
            }
            HeaderFit::Fields(fields) => fields,
        };
        header_split = true;
        match best.first() {
            Some((_, top)) if fields < *top => {}
            Some((_, top)) if fields == *top => best.push((delimiter, fields)),
            _ => best = vec![(delimiter, fields)],
        }
    }

    match best.as_slice() {
        [] if !header_split => Ok(SINGLE_COLUMN),
        [] => Err(EngineError::parse(
            "Undetectable delimiter: no candidate splits the header without overflowing a row",
        )),
        [(delimiter, _)] => Ok(*delimiter),
        tied => Err(EngineError::parse(format!(
            "Ambiguous delimiter: {} all split the header into {} fields",
            tied.iter()
                .map(|(d, _)| describe_delimiter(*d))
                .collect::<Vec<_>>()
                .join(", "),
            tied[0].1
        ))),
    }
}

/// How a candidate delimiter splits the sampled header
enum HeaderFit {
    /// Header stays one field
    Single,
    /// Header splits, but a sampled row has more fields than it
    Overflow,
    Fields(usize),
}

fn header_width(sample: &str, delimiter: u8) -> HeaderFit {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(sample.as_bytes());

    let mut records = reader.records();
    let width = match records.next() {
        Some(Ok(header)) => header.len(),
        _ => return HeaderFit::Single,
    };
    if width < 2 {
        return HeaderFit::Single;
    }
    for record in records {
        match record {
            Ok(record) if record.len() <= width => {}
            _ => return HeaderFit::Overflow,
        }
    }
    HeaderFit::Fields(width)
}

fn describe_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "TAB".to_string(),
        other => format!("'{}'", other as char),
    }
}

fn read_spreadsheet(bytes: &[u8], preamble_rows: usize) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| EngineError::parse(format!("Unreadable spreadsheet: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EngineError::parse("Spreadsheet has no sheets"))?
        .map_err(|e| EngineError::parse(format!("Unreadable first sheet: {}", e)))?;

    Ok(range
        .rows()
        .skip(preamble_rows)
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        // Whole numbers typed into Excel come back as floats
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if value.num_seconds_from_midnight() == 0 => {
                value.format("%d/%m/%Y").to_string()
            }
            Some(value) => value.format("%d/%m/%Y %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        other => other.to_string().trim().to_string(),
    }
}

/// Split header from data, drop blank rows and normalize row widths
fn shape_grid(grid: Vec<Vec<String>>) -> Result<RawTable> {
    let mut rows = grid.into_iter().skip_while(|row| is_blank(row));

    let mut header = rows
        .next()
        .ok_or_else(|| EngineError::parse("No header row found"))?;
    while header.last().is_some_and(|cell| cell.is_empty()) {
        header.pop();
    }
    if header.is_empty() {
        return Err(EngineError::parse("Header row is empty"));
    }

    let columns = sanitize_headers(&header)?;
    let width = columns.len();

    let mut data = Vec::new();
    for (index, mut row) in rows.enumerate() {
        if is_blank(&row) {
            continue;
        }
        if row.len() > width {
            if row[width..].iter().any(|cell| !cell.is_empty()) {
                return Err(EngineError::parse_at(
                    index + 1,
                    format!("Row has {} cells but the header has {}", row.len(), width),
                ));
            }
            row.truncate(width);
        }
        row.resize(width, String::new());
        data.push(row);
    }

    Ok(RawTable {
        columns,
        rows: data,
    })
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            SourceFormat::from_filename("Base.CSV").unwrap(),
            SourceFormat::Delimited
        );
        assert_eq!(
            SourceFormat::from_filename("matrix.xlsx").unwrap(),
            SourceFormat::Spreadsheet
        );
        assert!(SourceFormat::from_filename("notes.pdf").is_err());
        assert!(SourceFormat::from_filename("no_extension").is_err());
    }

    #[test]
    fn test_detect_each_candidate() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3").unwrap(), b',');
        assert_eq!(detect_delimiter("a;b;c\n1;2;3").unwrap(), b';');
        assert_eq!(detect_delimiter("a\tb\n1\t2").unwrap(), b'\t');
        assert_eq!(detect_delimiter("a|b\n1|2").unwrap(), b'|');
    }

    #[test]
    fn test_detect_prefers_consistent_candidate() {
        // Commas inside quoted cells do not fool detection
        let text = "nome;area\n\"Silva, Ana\";FIN\n\"Souza, Rui\";MGT";
        assert_eq!(detect_delimiter(text).unwrap(), b';');
    }

    #[test]
    fn test_detect_single_column() {
        assert_eq!(
            detect_delimiter("disciplina\nADM01\nADM02").unwrap(),
            SINGLE_COLUMN
        );
        // Candidates inside data cells only
        assert_eq!(
            detect_delimiter("disciplina\nADM, Finance\nMKT; Sales").unwrap(),
            SINGLE_COLUMN
        );
    }

    #[test]
    fn test_single_column_cells_keep_separators() {
        let table = read_table(b"disciplina\nADM, Finance\nMKT|Sales\n", "m.csv", 0).unwrap();
        assert_eq!(table.columns, vec!["disciplina"]);
        assert_eq!(
            table.rows,
            vec![vec!["ADM, Finance".to_string()], vec!["MKT|Sales".to_string()]]
        );
    }

    #[test]
    fn test_detect_ambiguous_is_error() {
        let result = detect_delimiter("a;b,c\n1;2,3");
        match result {
            Err(EngineError::Parse { message, .. }) => assert!(message.contains("Ambiguous")),
            other => panic!("expected ambiguity error, got {:?}", other),
        }
    }

    #[test]
    fn test_detect_undetectable_is_error() {
        let result = detect_delimiter("a,b\n1,2,3,4");
        match result {
            Err(EngineError::Parse { message, .. }) => assert!(message.contains("Undetectable")),
            other => panic!("expected undetectable error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_table_sanitizes_and_pads() {
        let bytes = "\u{feff}ID;Nome Padrão;Área\n1; Ana ;FIN\n\n2;Rui\n".as_bytes();
        let table = read_table(bytes, "base.csv", 0).unwrap();
        assert_eq!(table.columns, vec!["id", "nome_padrao", "area"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["1".to_string(), "Ana".to_string(), "FIN".to_string()],
                vec!["2".to_string(), "Rui".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn test_read_table_skips_preamble() {
        let bytes = b"Exported 2025-01-01\nprofessor,ano\nAna,2024\n";
        let table = read_table(bytes, "producao.csv", 1).unwrap();
        assert_eq!(table.columns, vec!["professor", "ano"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_long_row_reports_data_row_index() {
        let grid = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["1".to_string(), "2".to_string()],
            vec!["3".to_string(), "4".to_string(), "5".to_string()],
        ];
        match shape_grid(grid) {
            Err(EngineError::Parse { row, .. }) => assert_eq!(row, Some(2)),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_empty_cells_are_not_overflow() {
        let table = read_table(b"a,b,\n1,2,\n", "t.csv", 0).unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }

    #[test]
    fn test_read_table_windows_1252_fallback() {
        // "Área" encoded as Windows-1252
        let bytes: &[u8] = &[0xC1, b'r', b'e', b'a', b'\n', b'F', b'I', b'N', b'\n'];
        let table = read_table(bytes, "t.csv", 0).unwrap();
        assert_eq!(table.columns, vec!["area"]);
        assert_eq!(table.rows, vec![vec!["FIN".to_string()]]);
    }

    #[test]
    fn test_read_table_empty_payload() {
        assert!(matches!(
            read_table(b"", "t.csv", 0),
            Err(EngineError::Parse { .. })
        ));
    }

    #[test]
    fn test_reorder_follows_target() {
        let table = RawTable {
            columns: vec!["b".into(), "a".into()],
            rows: vec![vec!["2".into(), "1".into()]],
        };
        let reordered = table.reorder(&["a".to_string(), "b".to_string()]);
        assert_eq!(reordered.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }
}
