//! Source table reading
//!
//! Rows arrive as ordered `column -> raw text` pairs; order is preserved
//! from the file through to the plan.

use crate::error::{Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One input row: ordered column name to raw value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRow {
    values: Vec<(String, String)>,
}

impl SourceRow {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column value
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.push((column.into(), value.into()));
    }

    /// Builder-style [`SourceRow::push`]
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(column, value);
        self
    }

    /// Raw value of a column
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Column names in order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate over `(column, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SourceRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Reads a headed CSV file into [`SourceRow`]s
#[derive(Debug, Clone)]
pub struct CsvSourceReader {
    path: PathBuf,
    delimiter: u8,
}

impl CsvSourceReader {
    /// Create a reader for a file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    /// Set the field delimiter
    #[must_use]
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Path being read
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row, keeping only `columns`
    ///
    /// A column in `columns` that the header lacks is a configuration error.
    pub fn read(&self, columns: &[&str]) -> Result<Vec<SourceRow>> {
        if !self.path.exists() {
            return Err(Error::FileNotFound {
                path: self.path.display().to_string(),
            });
        }
        let file = std::fs::File::open(&self.path)?;
        let rows = read_csv(file, self.delimiter, columns)?;
        debug!("Read {} rows from {}", rows.len(), self.path.display());
        Ok(rows)
    }
}

/// Read CSV from any reader, keeping only `columns`
pub fn read_csv<R: Read>(reader: R, delimiter: u8, columns: &[&str]) -> Result<Vec<SourceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut positions = Vec::with_capacity(columns.len());
    for column in columns {
        let index = headers
            .iter()
            .position(|h| h == *column)
            .ok_or_else(|| {
                Error::config(format!(
                    "Column '{column}' is mapped but missing from the input table"
                ))
            })?;
        positions.push((*column, index));
    }

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| Error::source_error(format!("row {}: {e}", line + 1)))?;
        let row: SourceRow = positions
            .iter()
            .map(|(column, index)| (*column, record.get(*index).unwrap_or_default()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_source_row_preserves_order() {
        let row = SourceRow::new().with("b", "2").with("a", "1");
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(row.get("a"), Some("1"));
        assert_eq!(row.get("c"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_read_csv_keeps_mapped_columns() {
        let data = "email,name,ignored\na@x.com,Ann,zzz\nb@x.com,\"Bob, Jr\",\n";
        let rows = read_csv(data.as_bytes(), b',', &["name", "email"]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1].iter().collect::<Vec<_>>(),
            vec![("name", "Bob, Jr"), ("email", "b@x.com")]
        );
    }

    #[test]
    fn test_read_csv_missing_mapped_column() {
        let err = read_csv("a,b\n1,2\n".as_bytes(), b',', &["c"]).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);
    }

    #[test]
    fn test_read_csv_custom_delimiter() {
        let rows = read_csv("a;b\n1;2\n".as_bytes(), b';', &["b"]).unwrap();
        assert_eq!(rows[0].get("b"), Some("2"));
    }

    #[test]
    fn test_reader_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,value").unwrap();
        writeln!(file, "1,x").unwrap();
        let rows = CsvSourceReader::new(file.path()).read(&["id"]).unwrap();
        assert_eq!(rows, vec![SourceRow::new().with("id", "1")]);
    }

    #[test]
    fn test_reader_missing_file() {
        let err = CsvSourceReader::new("/nonexistent/input.csv")
            .read(&["id"])
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}
