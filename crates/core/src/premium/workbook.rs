use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::premium::rate_table::{RateRow, RateTable, AGE_BAND_COLUMN};

/// Ordered set of rate tables keyed by sheet name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<RateTable>,
}

impl Workbook {
    pub fn new(sheets: Vec<RateTable>) -> Self {
        Self { sheets }
    }

    pub fn sheet(&self, name: &str) -> Option<&RateTable> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|sheet| sheet.name.clone()).collect()
    }
}

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("workbook `{0}` does not exist")]
    NotFound(PathBuf),
    #[error("could not read workbook `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse workbook `{path}`: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
    #[error("could not open spreadsheet `{path}`: {source}")]
    Spreadsheet { path: PathBuf, source: calamine::Error },
    #[error("workbook `{0}` has no usable sheets")]
    Empty(PathBuf),
}

pub trait WorkbookLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Workbook, WorkbookError>;
}

/// Loads `.json` workbooks through serde and every other extension through
/// calamine (xlsx, xls, xlsb, ods).
#[derive(Clone, Copy, Debug, Default)]
pub struct FileWorkbookLoader;

impl WorkbookLoader for FileWorkbookLoader {
    fn load(&self, path: &Path) -> Result<Workbook, WorkbookError> {
        if !path.exists() {
            return Err(WorkbookError::NotFound(path.to_path_buf()));
        }

        let is_json = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| extension.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let workbook = if is_json { load_json(path)? } else { load_spreadsheet(path)? };
        if workbook.sheets.is_empty() {
            return Err(WorkbookError::Empty(path.to_path_buf()));
        }

        info!(
            event_name = "premium.workbook.loaded",
            path = %path.display(),
            sheets = workbook.sheets.len(),
            "loaded premium workbook"
        );
        Ok(workbook)
    }
}

fn load_json(path: &Path) -> Result<Workbook, WorkbookError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| WorkbookError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_str(&raw).map_err(|source| WorkbookError::Json { path: path.to_path_buf(), source })
}

fn load_spreadsheet(path: &Path) -> Result<Workbook, WorkbookError> {
    let mut spreadsheet = open_workbook_auto(path)
        .map_err(|source| WorkbookError::Spreadsheet { path: path.to_path_buf(), source })?;
    let sheet_names: Vec<String> = spreadsheet.sheet_names().to_vec();

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for sheet_name in &sheet_names {
        let range = match spreadsheet.worksheet_range(sheet_name) {
            Ok(range) => range,
            Err(error) => {
                debug!(
                    event_name = "premium.workbook.sheet_skipped",
                    sheet = %sheet_name,
                    error = %error,
                    "could not read sheet"
                );
                continue;
            }
        };
        if range.is_empty() {
            continue;
        }

        let rows: Vec<Vec<Data>> = range.rows().map(|row| row.to_vec()).collect();
        if let Some(table) = table_from_rows(sheet_name, &rows) {
            sheets.push(table);
        }
    }

    Ok(Workbook::new(sheets))
}

/// Builds a rate table from raw cells: the first row is the header, the
/// "Age Band" column (or the first column) holds the row labels.
fn table_from_rows(sheet_name: &str, rows: &[Vec<Data>]) -> Option<RateTable> {
    let (header, body) = rows.split_first()?;
    let headers: Vec<String> = header.iter().map(|cell| cell_to_string(cell).trim().to_string()).collect();
    let age_index = headers
        .iter()
        .position(|name| name.eq_ignore_ascii_case(AGE_BAND_COLUMN))
        .unwrap_or(0);

    let columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(index, name)| *index != age_index && !name.is_empty())
        .map(|(index, name)| (index, name.clone()))
        .collect();

    let mut table = RateTable::new(sheet_name, columns.iter().map(|(_, name)| name.clone()).collect());
    table.age_column = headers.get(age_index).cloned().unwrap_or_else(|| AGE_BAND_COLUMN.to_string());

    for cells in body {
        let label = cells.get(age_index).map(cell_to_string).unwrap_or_default();
        let label = label.trim();
        if label.is_empty() {
            continue;
        }

        let mut row = RateRow::new(label);
        for (index, column) in &columns {
            if let Some(premium) = cells.get(*index).and_then(cell_to_decimal) {
                row.premiums.insert(column.clone(), premium);
            }
        }
        table.rows.push(row);
    }

    Some(table)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        Data::Int(value) => value.to_string(),
        Data::Float(value) => {
            if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                (*value as i64).to_string()
            } else {
                value.to_string()
            }
        }
        Data::Bool(value) => value.to_string(),
        Data::Error(error) => format!("#ERR:{error:?}"),
        Data::DateTime(value) => value.to_string(),
        Data::DateTimeIso(value) | Data::DurationIso(value) => value.clone(),
    }
}

fn cell_to_decimal(cell: &Data) -> Option<Decimal> {
    match cell {
        Data::Int(value) => Some(Decimal::from(*value)),
        Data::Float(value) => Decimal::from_f64(*value).map(|premium| premium.normalize()),
        Data::String(value) => {
            let cleaned: String = value.chars().filter(|ch| *ch != ',' && !ch.is_whitespace()).collect();
            cleaned.parse::<Decimal>().ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use calamine::Data;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{table_from_rows, FileWorkbookLoader, WorkbookError, WorkbookLoader};

    fn text(value: &str) -> Data {
        Data::String(value.to_string())
    }

    #[test]
    fn header_row_defines_columns_and_age_column() {
        let rows = vec![
            vec![text("Sum Insured"), text("Age Band"), text("5L"), Data::Float(1_000_000.0)],
            vec![Data::Empty, text("18-25"), Data::Float(5400.0), Data::Int(7900)],
            vec![Data::Empty, text("26-35"), text("6,887"), Data::Empty],
            vec![Data::Empty, Data::Empty, Data::Float(1.0), Data::Float(2.0)],
        ];

        let table = table_from_rows("Individual", &rows).expect("table should build");

        assert_eq!(table.age_column, "Age Band");
        assert_eq!(table.columns, vec!["Sum Insured", "5L", "1000000"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].premiums.get("5L"), Some(&Decimal::new(5400, 0)));
        assert_eq!(table.rows[0].premiums.get("1000000"), Some(&Decimal::new(7900, 0)));
        assert_eq!(table.rows[1].premiums.get("5L"), Some(&Decimal::new(6887, 0)));
        assert!(!table.rows[1].premiums.contains_key("1000000"));
    }

    #[test]
    fn first_column_is_age_column_without_age_band_header() {
        let rows = vec![
            vec![text("Age"), text("3L")],
            vec![Data::Int(30), Data::Float(4999.5)],
        ];

        let table = table_from_rows("2 Adults", &rows).expect("table should build");

        assert_eq!(table.age_column, "Age");
        assert_eq!(table.rows[0].age_band, "30");
        assert_eq!(table.rows[0].premiums.get("3L"), Some(&Decimal::new(49995, 1)));
    }

    #[test]
    fn json_workbook_loads_through_serde() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("assure.json");
        fs::write(
            &path,
            r#"{"sheets":[{"name":"Individual","columns":["5L"],"rows":[{"age_band":"26-35","premiums":{"5L":"6887"}}]}]}"#,
        )
        .expect("write workbook");

        let workbook = FileWorkbookLoader.load(&path).expect("workbook should load");

        assert_eq!(workbook.sheet_names(), vec!["Individual"]);
        let sheet = workbook.sheet("Individual").expect("sheet present");
        assert_eq!(sheet.age_column, "Age Band");
        assert_eq!(sheet.lookup(35, 500_000).map(|cell| cell.premium), Some(Decimal::new(6887, 0)));
    }

    #[test]
    fn missing_and_empty_workbooks_are_errors() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("missing.xlsx");
        assert!(matches!(FileWorkbookLoader.load(&missing), Err(WorkbookError::NotFound(_))));

        let empty = dir.path().join("empty.json");
        fs::write(&empty, r#"{"sheets":[]}"#).expect("write workbook");
        assert!(matches!(FileWorkbookLoader.load(&empty), Err(WorkbookError::Empty(_))));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{").expect("write workbook");
        assert!(matches!(FileWorkbookLoader.load(&broken), Err(WorkbookError::Json { .. })));
    }
}
