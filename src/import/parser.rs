//! Delimited-file reader producing raw header-keyed rows.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ImportError, SkipReason};

/// One source row keyed by trimmed header name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// 1-based line number in the source file.
    pub line: u64,
    pub fields: BTreeMap<String, String>,
}

impl RawRecord {
    /// Value for `column`, or `None` when absent or blank.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// A parsed row: either usable or already rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRow {
    Record(RawRecord),
    Skipped(SkipReason),
}

/// Lazy, non-restartable reader over a delimited stream.
///
/// The first non-empty row is the header. Blank rows are skipped silently.
pub struct RecordParser<R: Read> {
    reader: csv::Reader<R>,
    headers: Option<Vec<String>>,
    record: csv::StringRecord,
    finished: bool,
}

impl RecordParser<File> {
    /// Open a file on disk.
    pub fn open(path: &Path, delimiter: u8) -> Result<Self, ImportError> {
        let file = File::open(path)?;
        Ok(Self::from_reader(file, delimiter))
    }
}

impl<R: Read> RecordParser<R> {
    pub fn from_reader(reader: R, delimiter: u8) -> Self {
        let reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        Self {
            reader,
            headers: None,
            record: csv::StringRecord::new(),
            finished: false,
        }
    }

    /// Header cells, once the header row has been read.
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    /// Read up to `max` rows. An empty vector means the stream is exhausted.
    pub fn read_batch(&mut self, max: usize) -> Result<Vec<ParsedRow>, ImportError> {
        let mut batch = Vec::with_capacity(max.min(1024));
        while batch.len() < max {
            match self.next() {
                Some(row) => batch.push(row?),
                None => break,
            }
        }
        Ok(batch)
    }

    fn convert(&self, line: u64) -> Option<ParsedRow> {
        let headers = self.headers.as_ref()?;
        if self.record.len() != headers.len() {
            return Some(ParsedRow::Skipped(SkipReason::ColumnMismatch {
                line,
                expected: headers.len(),
                found: self.record.len(),
            }));
        }

        let fields = headers
            .iter()
            .zip(self.record.iter())
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect();
        Some(ParsedRow::Record(RawRecord { line, fields }))
    }
}

impl<R: Read> Iterator for RecordParser<R> {
    type Item = Result<ParsedRow, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.reader.read_record(&mut self.record) {
                Ok(false) => self.finished = true,
                Ok(true) => {
                    let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                    if self.record.iter().all(|cell| cell.trim().is_empty()) {
                        continue;
                    }
                    if self.headers.is_none() {
                        self.headers =
                            Some(self.record.iter().map(|h| h.trim().to_string()).collect());
                        continue;
                    }
                    return self.convert(line).map(Ok);
                }
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    match e.into_kind() {
                        csv::ErrorKind::Io(io) => {
                            self.finished = true;
                            return Some(Err(ImportError::Io(io)));
                        }
                        kind if self.headers.is_none() => {
                            self.finished = true;
                            return Some(Err(ImportError::Csv(format!(
                                "unreadable header row: {:?}",
                                kind
                            ))));
                        }
                        kind => {
                            let message = match kind {
                                csv::ErrorKind::Utf8 { err, .. } => err.to_string(),
                                other => format!("{:?}", other),
                            };
                            tracing::debug!("Malformed row at line {}: {}", line, message);
                            return Some(Ok(ParsedRow::Skipped(SkipReason::Malformed {
                                line,
                                message,
                            })));
                        }
                    }
                }
            }
        }
        None
    }
}
