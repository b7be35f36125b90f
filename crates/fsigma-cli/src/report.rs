use std::io::{self, Write};

use fsigma_eval::{RuleMeta, ScanSummary};
use serde::Serialize;
use serde_json::Value;

/// Record keys tried, in order, for the header of a report block.
const HEADER_KEYS: [&str; 2] = ["Image", "CommandLine"];
const HEADER_FALLBACK: &str = "<record>";

/// Writes one block per record with at least one match.
///
/// Human blocks are a header line taken from the record followed by one
/// line per matched rule; `json` mode writes one NDJSON object per record
/// instead.
pub struct Reporter<W: Write> {
    out: W,
    json: bool,
}

#[derive(Serialize)]
struct JsonHit<'a> {
    record: &'a Value,
    matches: &'a [RuleMeta],
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, json: bool) -> Self {
        Reporter { out, json }
    }

    pub fn record(&mut self, record: &Value, matches: &[RuleMeta]) -> io::Result<()> {
        if matches.is_empty() {
            return Ok(());
        }
        if self.json {
            serde_json::to_writer(&mut self.out, &JsonHit { record, matches })?;
            return writeln!(self.out);
        }

        writeln!(self.out, "{}", header(record))?;
        for m in matches {
            write!(self.out, "  - {}", m.title)?;
            if !m.level.is_empty() {
                write!(self.out, " [{}]", m.level)?;
            }
            if let Some(id) = &m.id {
                write!(self.out, " (id: {id})")?;
            }
            writeln!(self.out)?;
            if !m.description.is_empty() {
                writeln!(self.out, "      {}", m.description)?;
            }
        }
        writeln!(self.out)
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// The first header key holding a non-empty value. `null`, `false`, zero,
/// `""`, `[]` and `{}` count as empty.
fn header(record: &Value) -> String {
    HEADER_KEYS
        .iter()
        .filter_map(|key| record.get(key))
        .find(|value| !is_empty_value(value))
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| HEADER_FALLBACK.to_string())
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// End-of-run counters, e.g. `120 records, 3 hits in 0.042s`.
pub fn summary_line(summary: &ScanSummary) -> String {
    format!(
        "{} records, {} hits in {:.3}s",
        summary.records,
        summary.hits,
        summary.elapsed.as_secs_f64()
    )
}
