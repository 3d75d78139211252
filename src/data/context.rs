use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::constants::{DATETIME_FORMATS, DATE_FORMATS};
use crate::utils::DataError;

/// Columns derived from `date` when the dataset has one
pub const DERIVED_COLUMNS: [&str; 3] = ["quarter", "month", "year"];

/// The tabular dataset bound into generated code as `df`
///
/// Cells are kept as text; typing is left to the interpreter that loads the
/// snapshot. The column set never changes after [`DataContext::load`].
#[derive(Debug, Clone)]
pub struct DataContext {
    source: PathBuf,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl DataContext {
    /// Load a CSV file and derive date parts when a `date` column exists
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(path, file).map_err(|e| match e {
            DataError::Csv(source) => DataError::Read {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    /// Parse CSV from any reader; `source` is only used for reporting
    pub fn from_reader<R: Read>(source: &Path, reader: R) -> Result<Self, DataError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect();
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            return Err(DataError::MissingHeader(source.display().to_string()));
        }

        let width = columns.len();
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            // Ragged rows are padded or cut to the header width
            let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        let mut context = Self {
            source: source.to_path_buf(),
            columns,
            rows,
        };
        context.derive_date_parts();
        Ok(context)
    }

    /// Normalise `date` to ISO form and fill quarter, month and year
    ///
    /// Unparseable dates become empty cells, and so do their derived parts.
    fn derive_date_parts(&mut self) {
        let Some(date_idx) = self.column_index("date") else {
            return;
        };

        let derived_idx: Vec<usize> = DERIVED_COLUMNS
            .iter()
            .map(|name| match self.column_index(name) {
                Some(idx) => idx,
                None => {
                    self.columns.push(name.to_string());
                    for row in &mut self.rows {
                        row.push(String::new());
                    }
                    self.columns.len() - 1
                }
            })
            .collect();

        for row in &mut self.rows {
            let parsed = parse_date(&row[date_idx]);
            // Unparsed cells stay as read; only the derived parts go blank
            if let Some(date) = parsed {
                row[date_idx] = date.format("%Y-%m-%d").to_string();
            }

            let parts = parsed.map(|d| [(d.month() - 1) / 3 + 1, d.month(), d.year() as u32]);
            for (slot, idx) in derived_idx.iter().enumerate() {
                row[*idx] = parts.map(|p| p[slot].to_string()).unwrap_or_default();
            }
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate over the cells of one column
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row[idx].as_str()))
    }

    /// Human-readable schema, one `- name: kind` line per column
    pub fn schema_text(&self) -> String {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, name)| format!("- {}: {}", name, self.infer_kind(idx)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn infer_kind(&self, idx: usize) -> &'static str {
        let mut cells = self
            .rows
            .iter()
            .map(|row| row[idx].as_str())
            .filter(|c| !c.is_empty())
            .peekable();

        if cells.peek().is_none() {
            return "empty";
        }

        let values: Vec<&str> = cells.collect();
        if values.iter().all(|v| v.parse::<i64>().is_ok()) {
            "integer"
        } else if values.iter().all(|v| v.parse::<f64>().is_ok()) {
            "number"
        } else if values.iter().all(|v| parse_date(v).is_some()) {
            "date"
        } else {
            "text"
        }
    }

    /// First `n` rows as a plain-text table, for logs
    pub fn head(&self, n: usize) -> String {
        let mut out = self.columns.join(" | ");
        for row in self.rows.iter().take(n) {
            out.push('\n');
            out.push_str(&row.join(" | "));
        }
        out
    }

    /// Write the prepared dataset as CSV
    pub fn write_csv(&self, path: &Path) -> Result<(), DataError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the prepared dataset to a temporary CSV removed on drop
    pub fn snapshot(&self) -> Result<NamedTempFile, DataError> {
        let file = tempfile::Builder::new()
            .prefix("plotline-df-")
            .suffix(".csv")
            .tempfile()?;
        self.write_csv(file.path())?;
        Ok(file)
    }
}

/// Parse a date cell, accepting date-only and date-time spellings
fn parse_date(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(cell, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(cell, fmt).ok())
                .map(|dt| dt.date())
        })
}
