//! Record source capability
//!
//! A source is pull-based: the exporter asks for the next batch until the
//! source reports end of stream. Sources make no promise about how they batch
//! internally; the exporter re-chunks everything to `chunk_size`.

use crate::error::BoxError;
use crate::record::Record;
use serde_json::Value;
use std::io::BufRead;
use thiserror::Error;

const DEFAULT_SOURCE_BATCH: usize = 1024;

/// Failures raised while pulling records from a source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error while reading source: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON on line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line} is not a JSON object")]
    NotAnObject { line: u64 },

    #[error("{0}")]
    Other(BoxError),
}

/// Pull-based producer of records.
pub trait RecordSource {
    /// Next batch of records, or `None` at end of stream.
    fn next_batch(&mut self) -> Result<Option<Vec<Record>>, SourceError>;

    /// Fast-forward past `n` records without materializing them.
    ///
    /// Returns the number of records actually skipped, or `None` when the
    /// source has no cheaper way than pulling batches (the exporter then
    /// discards pulled records itself).
    fn skip(&mut self, n: u64) -> Result<Option<u64>, SourceError> {
        let _ = n;
        Ok(None)
    }
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn next_batch(&mut self) -> Result<Option<Vec<Record>>, SourceError> {
        (**self).next_batch()
    }

    fn skip(&mut self, n: u64) -> Result<Option<u64>, SourceError> {
        (**self).skip(n)
    }
}

impl<S: RecordSource + ?Sized> RecordSource for &mut S {
    fn next_batch(&mut self) -> Result<Option<Vec<Record>>, SourceError> {
        (**self).next_batch()
    }

    fn skip(&mut self, n: u64) -> Result<Option<u64>, SourceError> {
        (**self).skip(n)
    }
}

/// Adapts any record iterator into a batched source.
pub struct IterSource<I> {
    iter: I,
    batch_size: usize,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Record>,
{
    pub fn new(iter: I) -> Self {
        Self {
            iter,
            batch_size: DEFAULT_SOURCE_BATCH,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl<I> RecordSource for IterSource<I>
where
    I: Iterator<Item = Record>,
{
    fn next_batch(&mut self) -> Result<Option<Vec<Record>>, SourceError> {
        let batch: Vec<Record> = self.iter.by_ref().take(self.batch_size).collect();
        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }
}

/// Newline-delimited JSON objects, one record per non-blank line.
pub struct JsonLinesSource<R> {
    reader: R,
    batch_size: usize,
    line: u64,
    line_buf: String,
    done: bool,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            batch_size: DEFAULT_SOURCE_BATCH,
            line: 0,
            line_buf: String::new(),
            done: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Lines consumed so far, blank lines included.
    pub fn lines_read(&self) -> u64 {
        self.line
    }

    fn read_line(&mut self) -> Result<bool, SourceError> {
        if self.done {
            return Ok(false);
        }
        self.line_buf.clear();
        if self.reader.read_line(&mut self.line_buf)? == 0 {
            self.done = true;
            return Ok(false);
        }
        self.line += 1;
        Ok(true)
    }
}

impl<R: BufRead> RecordSource for JsonLinesSource<R> {
    fn next_batch(&mut self) -> Result<Option<Vec<Record>>, SourceError> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            if !self.read_line()? {
                break;
            }
            let trimmed = self.line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(trimmed).map_err(|source| {
                SourceError::Parse {
                    line: self.line,
                    source,
                }
            })?;
            match value {
                Value::Object(record) => batch.push(record),
                _ => return Err(SourceError::NotAnObject { line: self.line }),
            }
        }

        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    fn skip(&mut self, n: u64) -> Result<Option<u64>, SourceError> {
        let mut skipped = 0;
        while skipped < n && self.read_line()? {
            if !self.line_buf.trim().is_empty() {
                skipped += 1;
            }
        }
        Ok(Some(skipped))
    }
}

/// Flattens a batched source into a record-at-a-time stream.
pub(crate) struct RecordStream<'a, S: ?Sized> {
    source: &'a mut S,
    pending: std::vec::IntoIter<Record>,
    exhausted: bool,
}

impl<'a, S: RecordSource + ?Sized> RecordStream<'a, S> {
    pub(crate) fn new(source: &'a mut S) -> Self {
        Self {
            source,
            pending: Vec::new().into_iter(),
            exhausted: false,
        }
    }

    /// Skip `n` records, returning how many were actually skipped.
    pub(crate) fn skip(&mut self, n: u64) -> Result<u64, SourceError> {
        if n == 0 {
            return Ok(0);
        }
        if self.pending.len() == 0 {
            if let Some(skipped) = self.source.skip(n)? {
                return Ok(skipped);
            }
        }

        let mut skipped = 0;
        while skipped < n {
            let buffered = self.pending.len() as u64;
            if buffered > 0 {
                let take = (n - skipped).min(buffered);
                self.pending.nth(take as usize - 1);
                skipped += take;
                continue;
            }
            if !self.refill()? {
                break;
            }
        }
        Ok(skipped)
    }

    pub(crate) fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        loop {
            if let Some(record) = self.pending.next() {
                return Ok(Some(record));
            }
            if !self.refill()? {
                return Ok(None);
            }
        }
    }

    fn refill(&mut self) -> Result<bool, SourceError> {
        if self.exhausted {
            return Ok(false);
        }
        match self.source.next_batch()? {
            Some(batch) => {
                self.pending = batch.into_iter();
                Ok(true)
            }
            None => {
                self.exhausted = true;
                Ok(false)
            }
        }
    }
}
