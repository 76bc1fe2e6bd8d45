// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record sources: CSV files with a header row and JSON files holding an array
//! of objects (or a single object).
//!
//! Sources only yield [`RawRecord`]s. Names are passed through exactly as
//! written and every value is handed over as text, typing happens later.

use crate::config::ConfigError;
use crate::record::RawRecord;
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read CSV record #{row}: {source}")]
    Csv { row: u64, source: csv::Error },

    #[error("Failed to parse JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON element #{index} is not an object")]
    NotAnObject { index: usize },
}

/// Supported input layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputFormat {
    #[default]
    Csv,
    Json,
}

impl InputFormat {
    /// Picks the format from the file extension, defaulting to CSV.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => InputFormat::Json,
            _ => InputFormat::Csv,
        }
    }
}

impl FromStr for InputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(InputFormat::Csv),
            "json" => Ok(InputFormat::Json),
            other => Err(ConfigError::Invalid(format!(
                "Invalid input format '{other}'. Must be one of: csv, json"
            ))),
        }
    }
}

/// Boxed stream of records, as produced by [`open`].
pub type Records = Box<dyn Iterator<Item = Result<RawRecord, SourceError>>>;

/// Opens `path` as a record stream in the given format.
pub fn open(path: &Path, format: InputFormat) -> Result<Records, SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    debug!("Reading {format:?} records from {}", path.display());
    Ok(match format {
        InputFormat::Csv => Box::new(CsvSource::new(reader)?),
        InputFormat::Json => Box::new(JsonSource::new(reader)?),
    })
}

/// Streams CSV rows keyed by the header row.
///
/// Short rows yield absent values for the missing trailing columns; cells past
/// the last header are ignored.
pub struct CsvSource<R: Read> {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<R>,
    row: u64,
}

impl<R: Read> CsvSource<R> {
    pub fn new(reader: R) -> Result<Self, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|source| SourceError::Csv { row: 0, source })?
            .iter()
            .enumerate()
            .map(|(i, header)| {
                if i == 0 {
                    header.trim_start_matches('\u{feff}').to_string()
                } else {
                    header.to_string()
                }
            })
            .collect();
        Ok(Self {
            headers,
            records: reader.into_records(),
            row: 0,
        })
    }
}

impl<R: Read> Iterator for CsvSource<R> {
    type Item = Result<RawRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.records.next()?;
        self.row += 1;
        let row = self.row;
        Some(
            next.map_err(|source| SourceError::Csv { row, source })
                .map(|record| {
                    self.headers
                        .iter()
                        .enumerate()
                        .map(|(i, name)| (name.as_str(), record.get(i).map(str::to_string)))
                        .collect()
                }),
        )
    }
}

/// Yields the objects of a JSON document, in key order.
///
/// Scalars become their JSON text (`42`, `true`), `null` becomes absent, and
/// nested arrays or objects are passed on as compact JSON strings.
pub struct JsonSource {
    values: std::iter::Enumerate<std::vec::IntoIter<Value>>,
}

impl JsonSource {
    pub fn new<R: Read>(reader: R) -> Result<Self, SourceError> {
        let document: Value = serde_json::from_reader(reader)?;
        Ok(Self::from_value(document))
    }

    #[must_use]
    pub fn from_value(document: Value) -> Self {
        let values = match document {
            Value::Array(values) => values,
            other => vec![other],
        };
        Self {
            values: values.into_iter().enumerate(),
        }
    }
}

impl Iterator for JsonSource {
    type Item = Result<RawRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, value) = self.values.next()?;
        let Value::Object(object) = value else {
            return Some(Err(SourceError::NotAnObject { index }));
        };
        Some(Ok(object
            .into_iter()
            .map(|(name, value)| (name, json_text(value)))
            .collect()))
    }
}

fn json_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn collect<I: Iterator<Item = Result<RawRecord, SourceError>>>(iter: I) -> Vec<RawRecord> {
        iter.map(Result::unwrap).collect()
    }

    #[test]
    fn test_csv_rows_keyed_by_header() {
        let input = "\u{feff}A 1,Qty,Note\ntrue,42,\nfalse,3.5,hello\n";
        let records = collect(CsvSource::new(input.as_bytes()).unwrap());

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("A 1"), Some(Some("true")));
        assert_eq!(records[0].get("Qty"), Some(Some("42")));
        assert_eq!(records[0].get("Note"), Some(Some("")));
        assert_eq!(records[1].get("Note"), Some(Some("hello")));
    }

    #[test]
    fn test_csv_short_rows_yield_absent_values() {
        let input = "a,b,c\n1\n1,2,3,4\n";
        let records = collect(CsvSource::new(input.as_bytes()).unwrap());
        assert_eq!(records[0].get("b"), Some(None));
        assert_eq!(records[0].len(), 3);
        assert_eq!(records[1].len(), 3);
        assert_eq!(records[1].get("c"), Some(Some("3")));
    }

    #[test]
    fn test_csv_quoted_fields() {
        let input = "name,comment\n\"Smith, J\",\"said \"\"hi\"\"\"\n";
        let records = collect(CsvSource::new(input.as_bytes()).unwrap());
        assert_eq!(records[0].get("name"), Some(Some("Smith, J")));
        assert_eq!(records[0].get("comment"), Some(Some("said \"hi\"")));
    }

    #[test]
    fn test_json_array_of_objects_keeps_key_order() {
        let input = r#"[{"z":1,"a":"x","n":null,"nested":{"k":[1,2]}},{"flag":true}]"#;
        let records = collect(JsonSource::new(input.as_bytes()).unwrap());

        let names: Vec<&str> = records[0].iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["z", "a", "n", "nested"]);
        assert_eq!(records[0].get("z"), Some(Some("1")));
        assert_eq!(records[0].get("n"), Some(None));
        assert_eq!(records[0].get("nested"), Some(Some(r#"{"k":[1,2]}"#)));
        assert_eq!(records[1].get("flag"), Some(Some("true")));
    }

    #[test]
    fn test_json_single_object() {
        let records = collect(JsonSource::new(r#"{"a":"b"}"#.as_bytes()).unwrap());
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_json_rejects_non_objects() {
        let mut source = JsonSource::new("[1]".as_bytes()).unwrap();
        assert!(matches!(
            source.next(),
            Some(Err(SourceError::NotAnObject { index: 0 }))
        ));
    }

    #[test]
    fn test_open_reads_files_by_format() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"a":"1"}},{{"a":"2"}}]"#).unwrap();

        let format = InputFormat::from_path(file.path());
        assert_eq!(format, InputFormat::Json);
        let records = collect(open(file.path(), format).unwrap());
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_open_missing_file() {
        let result = open(Path::new("/nonexistent/records.csv"), InputFormat::Csv);
        assert!(matches!(result, Err(SourceError::Open { .. })));
    }

    #[test]
    fn test_input_format_parse() {
        assert_eq!("CSV".parse::<InputFormat>().unwrap(), InputFormat::Csv);
        assert_eq!(" json ".parse::<InputFormat>().unwrap(), InputFormat::Json);
        assert!("xml".parse::<InputFormat>().is_err());
    }
}
