//! Spreadsheet source contracts plus Google Sheets and in-memory implementations.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use roster_core::ColumnSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

mod google;

pub use google::{
    AccessTokenProvider, GoogleSheetsSource, ServiceAccountKey, ServiceAccountTokenProvider,
    StaticToken, DEFAULT_SHEETS_API_BASE, SHEETS_SCOPES,
};

pub const CRATE_NAME: &str = "roster-adapters";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} from {url}: {body}")]
    HttpStatus {
        status: u16,
        url: String,
        body: String,
    },
    #[error("credentials: {0}")]
    Credentials(String),
    #[error("worksheet {0:?} not found")]
    MissingWorksheet(String),
    #[error("invalid sheets endpoint: {0}")]
    Endpoint(String),
}

/// Rectangular block of cells. Rows are 1-based like the sheet UI, columns
/// are 0-based schema indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: usize,
    pub first_col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl CellRange {
    pub fn writable_block(schema: &ColumnSchema, record_count: usize) -> Self {
        let columns = schema.writable_columns();
        Self {
            first_row: 2,
            first_col: columns.start,
            rows: record_count,
            cols: columns.len(),
        }
    }

    pub fn to_a1(&self, worksheet: &str) -> String {
        let last_row = self.first_row + self.rows.max(1) - 1;
        let last_col = self.first_col + self.cols.max(1) - 1;
        format!(
            "{}!{}{}:{}{}",
            quote_sheet_title(worksheet),
            column_letters(self.first_col),
            self.first_row,
            column_letters(last_col),
            last_row
        )
    }
}

/// Zero-based column index to A1 letters (0 -> A, 25 -> Z, 26 -> AA).
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

pub fn quote_sheet_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

#[async_trait]
pub trait SpreadsheetSource: Send + Sync {
    async fn fetch_rows(&self, worksheet: &str) -> Result<Vec<Vec<String>>, SourceError>;

    async fn fetch_header(&self, worksheet: &str) -> Result<Vec<String>, SourceError> {
        Ok(self
            .fetch_rows(worksheet)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    async fn write_range(
        &self,
        worksheet: &str,
        range: &CellRange,
        rows: &[Vec<String>],
    ) -> Result<(), SourceError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureWorkbook {
    pub worksheets: BTreeMap<String, Vec<Vec<String>>>,
}

pub fn load_fixture_workbook(path: impl AsRef<Path>) -> anyhow::Result<FixtureWorkbook> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Default)]
pub struct MemorySheetSource {
    worksheets: Mutex<BTreeMap<String, Vec<Vec<String>>>>,
}

impl MemorySheetSource {
    pub fn new(worksheets: BTreeMap<String, Vec<Vec<String>>>) -> Self {
        Self {
            worksheets: Mutex::new(worksheets),
        }
    }

    pub fn from_fixture_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::new(load_fixture_workbook(path)?.worksheets))
    }

    pub async fn worksheet(&self, name: &str) -> Option<Vec<Vec<String>>> {
        self.worksheets.lock().await.get(name).cloned()
    }

    pub async fn set_worksheet(&self, name: impl Into<String>, rows: Vec<Vec<String>>) {
        self.worksheets.lock().await.insert(name.into(), rows);
    }
}

#[async_trait]
impl SpreadsheetSource for MemorySheetSource {
    async fn fetch_rows(&self, worksheet: &str) -> Result<Vec<Vec<String>>, SourceError> {
        self.worksheet(worksheet)
            .await
            .ok_or_else(|| SourceError::MissingWorksheet(worksheet.to_string()))
    }

    async fn write_range(
        &self,
        worksheet: &str,
        range: &CellRange,
        rows: &[Vec<String>],
    ) -> Result<(), SourceError> {
        let mut sheets = self.worksheets.lock().await;
        let grid = sheets
            .get_mut(worksheet)
            .ok_or_else(|| SourceError::MissingWorksheet(worksheet.to_string()))?;
        for (r, values) in rows.iter().enumerate().take(range.rows) {
            let row_idx = range.first_row - 1 + r;
            if grid.len() <= row_idx {
                grid.resize(row_idx + 1, Vec::new());
            }
            let row = &mut grid[row_idx];
            for (c, value) in values.iter().enumerate().take(range.cols) {
                let col_idx = range.first_col + c;
                if row.len() <= col_idx {
                    row.resize(col_idx + 1, String::new());
                }
                row[col_idx] = value.clone();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::SCHEMA_V3;

    #[test]
    fn column_letters_roll_over() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn a1_range_quotes_sheet_titles() {
        let range = CellRange {
            first_row: 2,
            first_col: 14,
            rows: 3,
            cols: 2,
        };
        assert_eq!(range.to_a1("2020"), "'2020'!O2:P4");
        assert_eq!(range.to_a1("Alice's"), "'Alice''s'!O2:P4");
    }

    #[test]
    fn writable_block_covers_schema_writable_columns() {
        let block = CellRange::writable_block(&SCHEMA_V3, 5);
        let columns = SCHEMA_V3.writable_columns();
        assert_eq!(block.first_row, 2);
        assert_eq!(block.first_col, columns.start);
        assert_eq!(block.cols, columns.len());
        assert_eq!(block.rows, 5);
    }

    #[tokio::test]
    async fn memory_source_writes_only_the_target_block() {
        let source = MemorySheetSource::default();
        source
            .set_worksheet(
                "2020",
                vec![
                    vec!["h1".into(), "h2".into(), "h3".into()],
                    vec!["a".into()],
                ],
            )
            .await;
        let range = CellRange {
            first_row: 2,
            first_col: 2,
            rows: 2,
            cols: 1,
        };
        source
            .write_range("2020", &range, &[vec!["x".into()], vec!["y".into()]])
            .await
            .expect("write");

        let grid = source.worksheet("2020").await.expect("sheet");
        assert_eq!(grid[0], vec!["h1", "h2", "h3"]);
        assert_eq!(grid[1], vec!["a", "", "x"]);
        assert_eq!(grid[2], vec!["", "", "y"]);
    }

    #[tokio::test]
    async fn missing_worksheet_is_an_error() {
        let source = MemorySheetSource::default();
        assert!(matches!(
            source.fetch_rows("1999").await,
            Err(SourceError::MissingWorksheet(_))
        ));
    }
}
