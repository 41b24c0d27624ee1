use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use batchline_common::{Error, ObjectKey, Record, Result, RowSet};
use csv::ReaderBuilder;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::backend::StorageBackend;

/// Column used for JSON lines that are not objects.
pub const SCALAR_COLUMN: &str = "value";

/// What to do with a JSON line that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Abort the whole read on the first bad line.
    #[default]
    Strict,
    /// Skip bad lines and report them alongside the rows.
    Lenient,
}

impl FromStr for ParseMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ParseMode::Strict),
            "lenient" => Ok(ParseMode::Lenient),
            other => Err(Error::ConfigInvalid {
                key: "PARSE_MODE".to_string(),
                reason: format!("expected 'strict' or 'lenient', got '{other}'"),
            }),
        }
    }
}

impl fmt::Display for ParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMode::Strict => f.write_str("strict"),
            ParseMode::Lenient => f.write_str("lenient"),
        }
    }
}

/// How an object's body is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectFormat {
    /// Decide from the key: `.csv` is CSV, anything else JSON lines.
    #[default]
    Auto,
    JsonLines,
    Csv,
}

impl ObjectFormat {
    pub fn resolve(self, key: &ObjectKey) -> ObjectFormat {
        match self {
            ObjectFormat::Auto => match key.extension().as_deref() {
                Some("csv") => ObjectFormat::Csv,
                _ => ObjectFormat::JsonLines,
            },
            explicit => explicit,
        }
    }
}

impl FromStr for ObjectFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ObjectFormat::Auto),
            "jsonl" | "jsonlines" | "ndjson" => Ok(ObjectFormat::JsonLines),
            "csv" => Ok(ObjectFormat::Csv),
            other => Err(Error::ConfigInvalid {
                key: "OBJECT_FORMAT".to_string(),
                reason: format!("expected 'auto', 'jsonl' or 'csv', got '{other}'"),
            }),
        }
    }
}

/// A line dropped by a lenient read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the object.
    pub line: usize,
    pub reason: String,
}

/// The rows parsed out of one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRows {
    pub key: ObjectKey,
    pub rows: RowSet,
    pub skipped: Vec<SkippedLine>,
}

/// Fetches whole objects and parses them into row sets.
///
/// Every read is exactly one full-object fetch; nothing is cached.
#[derive(Clone)]
pub struct ObjectReader {
    backend: Arc<dyn StorageBackend>,
    mode: ParseMode,
}

impl ObjectReader {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend, mode: ParseMode::Strict }
    }

    pub fn with_mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    pub async fn read(&self, bucket: &str, key: &ObjectKey, format: ObjectFormat) -> Result<ObjectRows> {
        match format.resolve(key) {
            ObjectFormat::Csv => self.read_csv(bucket, key).await,
            _ => self.read_jsonlines(bucket, key).await,
        }
    }

    pub async fn read_jsonlines(&self, bucket: &str, key: &ObjectKey) -> Result<ObjectRows> {
        let text = self.fetch_text(bucket, key).await?;
        parse_jsonlines(key, &text, self.mode)
    }

    pub async fn read_csv(&self, bucket: &str, key: &ObjectKey) -> Result<ObjectRows> {
        let text = self.fetch_text(bucket, key).await?;
        parse_csv(key, &text)
    }

    async fn fetch_text(&self, bucket: &str, key: &ObjectKey) -> Result<String> {
        let body = self.backend.get_object(bucket, key.as_str()).await?;
        debug!(bucket, key = %key, bytes = body.len(), "fetched object");
        String::from_utf8(body.to_vec())
            .map_err(|e| Error::malformed(key.as_str(), None, format!("object is not valid UTF-8: {e}")))
    }
}

/// One JSON value per non-blank line.
pub fn parse_jsonlines(key: &ObjectKey, text: &str, mode: ParseMode) -> Result<ObjectRows> {
    let mut rows = RowSet::new();
    let mut skipped = Vec::new();

    for (idx, line) in text.split('\n').enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => rows.push(into_record(value)),
            Err(e) => match mode {
                ParseMode::Strict => return Err(Error::malformed(key.as_str(), Some(idx + 1), e.to_string())),
                ParseMode::Lenient => {
                    warn!(key = %key, line = idx + 1, error = %e, "skipping malformed line");
                    skipped.push(SkippedLine { line: idx + 1, reason: e.to_string() });
                }
            },
        }
    }

    debug!(key = %key, rows = rows.len(), skipped = skipped.len(), "parsed json lines");
    Ok(ObjectRows { key: key.clone(), rows, skipped })
}

fn into_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        scalar => {
            let mut record = Map::new();
            record.insert(SCALAR_COLUMN.to_string(), scalar);
            record
        }
    }
}

/// CSV with a header row; the header names the columns.
///
/// Values stay strings, empty fields become `null`.
pub fn parse_csv(key: &ObjectKey, text: &str) -> Result<ObjectRows> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());

    let headers = unique_headers(rdr.headers().map_err(|e| csv_error(key, &e))?.iter());
    let mut rows = RowSet::with_columns(headers.iter().cloned());

    for result in rdr.records() {
        let record = result.map_err(|e| csv_error(key, &e))?;
        let row: Record = headers
            .iter()
            .zip(record.iter())
            .map(|(name, field)| {
                let value = if field.is_empty() { Value::Null } else { Value::String(field.to_string()) };
                (name.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    debug!(key = %key, rows = rows.len(), columns = rows.columns().len(), "parsed csv");
    Ok(ObjectRows { key: key.clone(), rows, skipped: Vec::new() })
}

/// Repeated header names get a `.1`, `.2`, ... suffix so every field keeps
/// its own column.
fn unique_headers<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut headers = Vec::new();
    for name in names {
        let mut header = name.to_string();
        let mut suffix = 1;
        while !seen.insert(header.clone()) {
            header = format!("{name}.{suffix}");
            suffix += 1;
        }
        headers.push(header);
    }
    headers
}

fn csv_error(key: &ObjectKey, err: &csv::Error) -> Error {
    let line = err.position().map(|p| p.line() as usize);
    let reason = match err.kind() {
        csv::ErrorKind::UnequalLengths { expected_len, len, .. } => {
            format!("expected {expected_len} fields, found {len}")
        }
        _ => err.to_string(),
    };
    Error::malformed(key.as_str(), line, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::from(name)
    }

    #[test]
    fn test_jsonlines_skips_blank_lines_and_keeps_values() {
        let text = "{\"id\":1,\"label\":\"a\"}\n\n{\"id\":2,\"score\":0.5}\r\n";
        let parsed = parse_jsonlines(&key("b.jsonl"), text, ParseMode::Strict).unwrap();

        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows.columns(), ["id", "label", "score"]);
        assert_eq!(parsed.rows.records()[1]["score"], json!(0.5));
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn test_jsonlines_scalar_lines_use_value_column() {
        let parsed = parse_jsonlines(&key("s.jsonl"), "1\n\"two\"\n", ParseMode::Strict).unwrap();
        assert_eq!(parsed.rows.columns(), [SCALAR_COLUMN]);
        assert_eq!(parsed.rows.records()[1][SCALAR_COLUMN], json!("two"));
    }

    #[test]
    fn test_strict_and_lenient_modes_on_bad_line() {
        let text = "{\"id\":1}\n{\"id\":\n{\"id\":3}\n";

        let err = parse_jsonlines(&key("bad.jsonl"), text, ParseMode::Strict).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { line: Some(2), ref key, .. } if key == "bad.jsonl"));

        let parsed = parse_jsonlines(&key("bad.jsonl"), text, ParseMode::Lenient).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].line, 2);
    }

    #[test]
    fn test_csv_header_becomes_columns() {
        let parsed = parse_csv(&key("t.csv"), "a,b,c\n1,2,3\n4,,6\n").unwrap();
        assert_eq!(parsed.rows.columns(), ["a", "b", "c"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows.records()[0]["a"], json!("1"));
        assert_eq!(parsed.rows.records()[1]["b"], Value::Null);
    }

    #[test]
    fn test_csv_short_row_is_malformed() {
        let err = parse_csv(&key("t.csv"), "a,b,c\n1,2,3\n4,5\n").unwrap_err();
        match err {
            Error::MalformedRecord { line, reason, .. } => {
                assert_eq!(line, Some(3));
                assert!(reason.contains("expected 3 fields"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_csv_repeated_headers_keep_every_field() {
        let parsed = parse_csv(&key("t.csv"), "a,a,b,a.1\n1,2,3,4\n").unwrap();
        assert_eq!(parsed.rows.columns(), ["a", "a.1", "b", "a.1.1"]);
        let record = &parsed.rows.records()[0];
        assert_eq!(record["a"], json!("1"));
        assert_eq!(record["a.1"], json!("2"));
        assert_eq!(record["b"], json!("3"));
        assert_eq!(record["a.1.1"], json!("4"));
    }

    #[test]
    fn test_csv_header_only_has_columns_but_no_rows() {
        let parsed = parse_csv(&key("t.csv"), "a,b\n").unwrap();
        assert_eq!(parsed.rows.columns(), ["a", "b"]);
        assert!(parsed.rows.is_empty());
    }

    #[test]
    fn test_format_resolution_and_parsing() {
        assert_eq!(ObjectFormat::Auto.resolve(&key("x/part.CSV")), ObjectFormat::Csv);
        assert_eq!(ObjectFormat::Auto.resolve(&key("x/part.json")), ObjectFormat::JsonLines);
        assert_eq!(ObjectFormat::Csv.resolve(&key("x/part.json")), ObjectFormat::Csv);
        assert_eq!("ndjson".parse::<ObjectFormat>().unwrap(), ObjectFormat::JsonLines);
        assert!("parquet".parse::<ObjectFormat>().is_err());
        assert_eq!("Lenient".parse::<ParseMode>().unwrap(), ParseMode::Lenient);
    }
}
