//! Feeding records to an [`Engine`].
//!
//! Input is one JSON object, a JSON array of objects, or newline-delimited
//! JSON. Line streams are parsed and matched in bounded batches on a rayon
//! pool; results reach the sink in input order and always on the calling
//! thread, so the sink needs no synchronization.

use std::io::{self, BufRead};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde_json::Value;

use crate::engine::Engine;
use crate::error::IngestError;
use crate::result::RuleMeta;

pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Worker count used when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestConfig {
    /// Worker threads for line streams. `0` means [`default_workers`].
    pub workers: usize,
    /// Lines buffered per batch. `0` is treated as `1`.
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            workers: 0,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl IngestConfig {
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            default_workers()
        } else {
            self.workers
        }
    }

    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

// =============================================================================
// Input shape
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    /// One JSON object.
    Single,
    /// A JSON array of objects.
    Array,
    /// Newline-delimited JSON objects.
    Lines,
}

impl InputShape {
    /// Guess the shape from the first bytes of the input.
    ///
    /// A leading `[` is an array. Text starting with `{` is a line stream
    /// when its first line is a complete JSON value and more content follows
    /// it; anything else is read as a single document.
    pub fn detect(head: &[u8]) -> Self {
        let text = head.trim_ascii_start();
        match text.first() {
            Some(b'[') => InputShape::Array,
            Some(b'{') => {
                let Some(end) = text.iter().position(|&b| b == b'\n') else {
                    return InputShape::Single;
                };
                let (first, rest) = text.split_at(end);
                if !rest.trim_ascii().is_empty()
                    && serde_json::from_slice::<Value>(first).is_ok()
                {
                    InputShape::Lines
                } else {
                    InputShape::Single
                }
            }
            _ => InputShape::Single,
        }
    }

    /// Read enough of `reader` to [`detect`](Self::detect) its shape.
    ///
    /// Whole lines are read until two non-blank ones are seen, or the first
    /// non-blank line does not open an object, or the input ends. A partial
    /// first line on a slow pipe therefore cannot be mistaken for a single
    /// document. The consumed bytes are returned so the caller can replay
    /// them in front of the rest of the reader.
    pub fn sniff<R: BufRead>(reader: &mut R) -> io::Result<(Self, Vec<u8>)> {
        let mut head = Vec::new();
        let mut lines = 0;
        loop {
            let start = head.len();
            if reader.read_until(b'\n', &mut head)? == 0 {
                break;
            }
            let line = head[start..].trim_ascii();
            if line.is_empty() {
                continue;
            }
            lines += 1;
            if lines == 2 || line[0] != b'{' {
                break;
            }
        }
        Ok((Self::detect(&head), head))
    }
}

// =============================================================================
// Summary
// =============================================================================

/// End-of-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Records evaluated.
    pub records: u64,
    /// Records with at least one matching rule.
    pub hits: u64,
    pub elapsed: Duration,
}

impl ScanSummary {
    fn count(&mut self, matches: &[RuleMeta]) {
        self.records += 1;
        if !matches.is_empty() {
            self.hits += 1;
        }
    }
}

// =============================================================================
// Ingestion
// =============================================================================

/// Runs input through an engine and hands every evaluated record, with its
/// matches, to a sink.
pub struct Ingest<'e> {
    engine: &'e Engine,
    config: IngestConfig,
}

impl<'e> Ingest<'e> {
    pub fn new(engine: &'e Engine, config: IngestConfig) -> Self {
        Ingest { engine, config }
    }

    /// Read `reader` as `shape`.
    pub fn run<R, F>(
        &self,
        shape: InputShape,
        mut reader: R,
        sink: F,
    ) -> Result<ScanSummary, IngestError>
    where
        R: BufRead,
        F: FnMut(&Value, &[RuleMeta]),
    {
        match shape {
            InputShape::Lines => self.run_lines(reader, sink),
            InputShape::Single | InputShape::Array => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                self.run_slice(&bytes, sink)
            }
        }
    }

    /// Parse `bytes` as one JSON document and run it.
    pub fn run_slice<F>(&self, bytes: &[u8], sink: F) -> Result<ScanSummary, IngestError>
    where
        F: FnMut(&Value, &[RuleMeta]),
    {
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(self.run_value(&value, sink))
    }

    /// Evaluate a single object, or each element of an array, in order.
    /// Non-object entries are skipped.
    pub fn run_value<F>(&self, input: &Value, mut sink: F) -> ScanSummary
    where
        F: FnMut(&Value, &[RuleMeta]),
    {
        let start = Instant::now();
        let mut summary = ScanSummary::default();

        let records: &[Value] = match input {
            Value::Array(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        for record in records {
            if !record.is_object() {
                log::debug!("skipping non-object record");
                continue;
            }
            let matches = self.engine.evaluate(record);
            summary.count(&matches);
            sink(record, &matches);
        }

        summary.elapsed = start.elapsed();
        summary
    }

    /// Evaluate a newline-delimited JSON stream on a worker pool.
    ///
    /// Blank lines are ignored. Lines that are not JSON objects are dropped
    /// and logged at debug level. An I/O error on `reader` ends the run.
    pub fn run_lines<R, F>(&self, mut reader: R, mut sink: F) -> Result<ScanSummary, IngestError>
    where
        R: BufRead,
        F: FnMut(&Value, &[RuleMeta]),
    {
        let start = Instant::now();
        let workers = self.config.effective_workers();
        let batch_size = self.config.effective_batch_size();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fsigma-ingest-{i}"))
            .build()?;
        log::debug!("scanning lines with {workers} workers, batch size {batch_size}");

        let mut summary = ScanSummary::default();
        let mut batch: Vec<(u64, Vec<u8>)> = Vec::with_capacity(batch_size);
        let mut line_no = 0u64;

        loop {
            let mut line = Vec::new();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            line_no += 1;
            if line.trim_ascii().is_empty() {
                continue;
            }
            batch.push((line_no, line));
            if batch.len() >= batch_size {
                self.flush(&pool, &mut batch, &mut summary, &mut sink);
            }
        }
        self.flush(&pool, &mut batch, &mut summary, &mut sink);

        summary.elapsed = start.elapsed();
        Ok(summary)
    }

    fn flush<F>(
        &self,
        pool: &rayon::ThreadPool,
        batch: &mut Vec<(u64, Vec<u8>)>,
        summary: &mut ScanSummary,
        sink: &mut F,
    ) where
        F: FnMut(&Value, &[RuleMeta]),
    {
        if batch.is_empty() {
            return;
        }
        // `collect` on an indexed parallel iterator keeps input order.
        let results: Vec<Option<(Value, Vec<RuleMeta>)>> = pool.install(|| {
            batch
                .par_iter()
                .map(|(line_no, line)| self.evaluate_line(*line_no, line))
                .collect()
        });
        batch.clear();

        for (record, matches) in results.into_iter().flatten() {
            summary.count(&matches);
            sink(&record, &matches);
        }
    }

    fn evaluate_line(&self, line_no: u64, line: &[u8]) -> Option<(Value, Vec<RuleMeta>)> {
        match serde_json::from_slice::<Value>(line) {
            Ok(record) if record.is_object() => {
                let matches = self.engine.evaluate(&record);
                Some((record, matches))
            }
            Ok(_) => {
                log::debug!("line {line_no}: not a JSON object, skipped");
                None
            }
            Err(e) => {
                log::debug!("line {line_no}: invalid JSON ({e}), skipped");
                None
            }
        }
    }
}
