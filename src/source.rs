//! Where raw bet records come from.
//!
//! Agencies keep their bets in a comma separated file, one bet per line:
//!
//! ```text
//! first_name,last_name,document,birthdate,number
//! ```
//!
//! [`CsvSource`] reads it lazily, one record per [`RecordSource::next_record`] call, so
//! only the batch being built is ever held in memory. Fields may be quoted, and
//! whitespace around them is trimmed.
use std::{
    collections::VecDeque,
    fs::File,
    io,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;

use crate::RawBet;

const FIELDS_PER_RECORD: usize = 5;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open '{path}': {cause}")]
    Open { path: PathBuf, cause: io::Error },
    #[error("failed to read record: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: expected 5 fields, found {found}")]
    FieldCount { line: u64, found: usize },
}

/// Produces raw records until the input runs out.
pub trait RecordSource {
    /// Next record, or `None` once the input is exhausted.
    fn next_record(&mut self) -> Result<Option<RawBet>, SourceError>;

    /// Releases the underlying handle. Further reads report exhaustion.
    fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

pub struct CsvSource<R = File> {
    reader: Option<csv::Reader<R>>,
    record: StringRecord,
}

impl CsvSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|cause| SourceError::Open {
            path: path.to_path_buf(),
            cause,
        })?;
        Ok(Self::from_reader(file))
    }
}

impl<R: io::Read> CsvSource<R> {
    pub fn from_reader(reader: R) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        Self {
            reader: Some(reader),
            record: StringRecord::new(),
        }
    }
}

impl<R: io::Read> RecordSource for CsvSource<R> {
    fn next_record(&mut self) -> Result<Option<RawBet>, SourceError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        if !reader.read_record(&mut self.record)? {
            return Ok(None);
        }

        let record = &self.record;
        if record.len() != FIELDS_PER_RECORD {
            return Err(SourceError::FieldCount {
                line: record.position().map_or(0, |pos| pos.line()),
                found: record.len(),
            });
        }

        Ok(Some(RawBet::new(
            &record[0], &record[1], &record[2], &record[3], &record[4],
        )))
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.reader = None;
        Ok(())
    }
}

/// Records held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: VecDeque<RawBet>,
}

impl MemorySource {
    pub fn new(records: impl IntoIterator<Item = RawBet>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }
}

impl RecordSource for MemorySource {
    fn next_record(&mut self) -> Result<Option<RawBet>, SourceError> {
        Ok(self.records.pop_front())
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.records.clear();
        Ok(())
    }
}
