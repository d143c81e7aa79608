//! Raw grid sources with encoding, delimiter and format auto-detection.
//!
//! Turns an uploaded document into a [`RawGrid`] without interpreting it:
//! no header row is assumed and every row is kept, so the header locator
//! sees the file exactly as the user wrote it.
//!
//! | Input | Detection | Reader |
//! |-------|-----------|--------|
//! | `.xlsx` / `.xlsm` / `.xlsb` / `.ods` | `PK` zip magic or extension | `calamine` |
//! | `.xls` | OLE magic or extension | `calamine` |
//! | anything else | fallback | `csv` after `chardet` + `encoding_rs` decoding |
//!
//! Reading is all or nothing: a source either yields a complete grid or a
//! single [`SourceError`].

use calamine::{Data, Reader};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;

use crate::error::{SourceError, SourceResult};
use crate::models::{Cell, RawGrid};

/// Lines inspected when guessing the delimiter
const DELIMITER_SAMPLE_LINES: usize = 10;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// How the source was read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceFormat {
    Delimited { encoding: String, delimiter: char },
    Workbook { sheet: String },
}

/// Metadata about a read source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub file_name: String,
    pub format: SourceFormat,
    pub rows: usize,
    pub columns: usize,
}

/// A fully read source
#[derive(Debug, Clone)]
pub struct GridSource {
    pub grid: RawGrid,
    pub info: SourceInfo,
}

// =============================================================================
// Entry points
// =============================================================================

/// Read an uploaded document into a grid.
///
/// `file_name` is only used for format detection and reporting.
pub fn read_grid(bytes: &[u8], file_name: &str) -> SourceResult<GridSource> {
    let (grid, format) = if is_workbook(bytes, file_name) {
        let (grid, sheet) = parse_workbook(bytes)?;
        (grid, SourceFormat::Workbook { sheet })
    } else {
        let encoding = detect_encoding(bytes);
        let content = decode_content(bytes, &encoding)?;
        let delimiter = detect_delimiter(&content);
        let grid = parse_delimited(&content, delimiter)?;
        (grid, SourceFormat::Delimited { encoding, delimiter })
    };

    if grid.is_empty() {
        return Err(SourceError::EmptyFile);
    }

    let info = SourceInfo {
        file_name: file_name.to_string(),
        format,
        rows: grid.len(),
        columns: grid.width(),
    };
    Ok(GridSource { grid, info })
}

/// Read a file from disk.
pub fn read_grid_file<P: AsRef<Path>>(path: P) -> SourceResult<GridSource> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    read_grid(&bytes, &file_name_of(path))
}

/// Read a file from disk without blocking the runtime.
pub async fn read_grid_file_async<P: AsRef<Path>>(path: P) -> SourceResult<GridSource> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await?;
    read_grid(&bytes, &file_name_of(path))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

fn is_workbook(bytes: &[u8], file_name: &str) -> bool {
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        return true;
    }
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| WORKBOOK_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

// =============================================================================
// Delimited text
// =============================================================================

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    // chardet guesses poorly on short Spanish text; valid UTF-8 is taken as-is
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }

    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        "" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> SourceResult<String> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(enc) => enc.decode(bytes).0.into_owned(),
            None => {
                return Err(SourceError::EncodingError(format!(
                    "unsupported encoding '{}'",
                    encoding
                )))
            }
        },
    };

    Ok(decoded.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the first lines
pub fn detect_delimiter(content: &str) -> char {
    let sample: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(DELIMITER_SAMPLE_LINES)
        .collect();

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ';';
    let mut best_count = 0;

    for &sep in &separators {
        let count: usize = sample.iter().map(|line| line.matches(sep).count()).sum();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse delimited text into a grid. Every record becomes a row.
pub fn parse_delimited(content: &str, delimiter: char) -> SourceResult<RawGrid> {
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| SourceError::ParseError(format!("delimiter '{}' is not ASCII", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| SourceError::ParseError(format!("record {}: {}", line + 1, e)))?;
        rows.push(record.iter().map(Cell::from_text).collect());
    }

    Ok(RawGrid::new(rows))
}

// =============================================================================
// Workbooks
// =============================================================================

/// Read the first non-empty sheet of a workbook. Returns the grid and sheet name.
pub fn parse_workbook(bytes: &[u8]) -> SourceResult<(RawGrid, String)> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| SourceError::WorkbookError(e.to_string()))?;

    for sheet in workbook.sheet_names().to_vec() {
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| SourceError::WorkbookError(e.to_string()))?;
        if range.is_empty() {
            continue;
        }

        // Ranges start at the first used cell; pad so indices match the sheet
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row as usize];
        for row in range.rows() {
            let mut cells = vec![Cell::Empty; start_col as usize];
            cells.extend(row.iter().map(workbook_cell));
            rows.push(cells);
        }

        return Ok((RawGrid::new(rows), sheet));
    }

    Err(SourceError::EmptyFile)
}

fn workbook_cell(data: &Data) -> Cell {
    match data {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::String(s) => Cell::from_text(s),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or(Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) => s
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::from_text(s)),
        Data::DurationIso(s) => Cell::from_text(s),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}

/// Convert a workbook date serial (days since 1899-12-30) to a date.
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.trunc() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_keeps_title_rows() {
        let csv = "Reporte de compras;;\n;;\nFecha;Proveedor;Total\n05/01/2024;ACME;1.500\n";
        let source = read_grid(csv.as_bytes(), "compras.csv").unwrap();

        assert_eq!(source.grid.len(), 4);
        assert_eq!(source.grid.cell(2, 1), &Cell::from("Proveedor"));
        assert!(source.grid.is_blank_row(1));
        assert_eq!(
            source.info.format,
            SourceFormat::Delimited {
                encoding: "utf-8".into(),
                delimiter: ';'
            }
        );
        assert_eq!(source.info.columns, 3);
    }

    #[test]
    fn test_quoted_values_and_ragged_rows() {
        let grid = parse_delimited("a,b\n\"Hello, World\",2,extra\n1\n", ',').unwrap();
        assert_eq!(grid.cell(1, 0), &Cell::from("Hello, World"));
        assert_eq!(grid.cell(1, 2), &Cell::from("extra"));
        assert_eq!(grid.cell(2, 1), &Cell::Empty);
        assert_eq!(grid.width(), 3);
    }

    #[test]
    fn test_cells_are_trimmed_text() {
        let grid = parse_delimited("  x ; ;3\n", ';').unwrap();
        assert_eq!(grid.row(0).unwrap(), &[Cell::from("x"), Cell::Empty, Cell::from("3")]);
    }

    #[test]
    fn test_empty_source_is_error() {
        assert!(matches!(read_grid(b"", "vacio.csv"), Err(SourceError::EmptyFile)));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        // Title line without separators does not decide
        assert_eq!(detect_delimiter("Informe\na,b,c\n1,2,3"), ',');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Año;Señal" in ISO-8859-1
        let bytes: &[u8] = &[0x41, 0xF1, 0x6F, 0x3B, 0x53, 0x65, 0xF1, 0x61, 0x6C];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        let grid = parse_delimited(&decoded, ';').unwrap();
        assert_eq!(grid.cell(0, 0), &Cell::from("Año"));
        assert_eq!(grid.cell(0, 1), &Cell::from("Señal"));
    }

    #[test]
    fn test_utf8_is_taken_as_is() {
        assert_eq!(detect_encoding("Año;Señal".as_bytes()), "utf-8");
    }

    #[test]
    fn test_bom_is_stripped() {
        let bytes = b"\xEF\xBB\xBFFecha;Monto\n";
        let source = read_grid(bytes, "bom.csv").unwrap();
        assert_eq!(source.grid.cell(0, 0), &Cell::from("Fecha"));
    }

    #[test]
    fn test_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("propinas.tsv");
        std::fs::write(&path, "Fecha\tPropina\n2024-01-05\t3000\n").unwrap();

        let source = read_grid_file(&path).unwrap();
        assert_eq!(source.info.file_name, "propinas.tsv");
        assert_eq!(source.grid.cell(1, 1), &Cell::from("3000"));
    }

    #[tokio::test]
    async fn test_read_from_disk_async() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compras.csv");
        std::fs::write(&path, "Fecha,Total\n2024-01-05,1500\n").unwrap();

        let source = read_grid_file_async(&path).await.unwrap();
        assert_eq!(source.info.rows, 2);
        assert!(matches!(source.info.format, SourceFormat::Delimited { delimiter: ',', .. }));

        assert!(read_grid_file_async(dir.path().join("missing.csv")).await.is_err());
    }

    #[test]
    fn test_workbook_detection() {
        assert!(is_workbook(b"PK\x03\x04rest", "upload"));
        assert!(is_workbook(b"whatever", "Libro.XLSX"));
        assert!(!is_workbook(b"a;b", "datos.csv"));
    }

    #[test]
    fn test_broken_workbook_is_error() {
        let result = read_grid(b"PK\x03\x04not really a zip", "libro.xlsx");
        assert!(matches!(result, Err(SourceError::WorkbookError(_))));
    }

    #[test]
    fn test_workbook_cell_conversion() {
        assert_eq!(workbook_cell(&Data::Int(3)), Cell::Number(3.0));
        assert_eq!(workbook_cell(&Data::String("  ".into())), Cell::Empty);
        assert_eq!(
            workbook_cell(&Data::DateTimeIso("2024-03-15T00:00:00".into())),
            Cell::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        );
        assert_eq!(
            excel_serial_to_date(45000.0),
            NaiveDate::from_ymd_opt(2023, 3, 15)
        );
    }
}
