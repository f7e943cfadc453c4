//! Avalanche event table extraction
//!
//! Projects a stored event batch onto a fixed column set and normalizes the
//! numeric columns, producing a gzip CSV table ready for analysis.

use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use super::{ProcessError, ProcessResult};
use crate::store::gz::write_csv_rows_gzip_atomic;
use crate::store::{Compression, JsonlReader};

/// Columns of the event table, in output order
pub const EVENT_COLUMNS: [&str; 19] = [
    "ID",
    "event_date",
    "event_time",
    "zone",
    "pathname",
    "elevation",
    "lat",
    "lng",
    "aspect",
    "slope_angle",
    "destructive_size",
    "relative_size",
    "depth",
    "avy_trigger",
    "fldType",
    "fatality",
    "observer",
    "affiliation",
    "notes",
];

/// Columns that carry numbers
const NUMERIC_COLUMNS: [&str; 8] = [
    "ID",
    "elevation",
    "lat",
    "lng",
    "destructive_size",
    "relative_size",
    "depth",
    "fatality",
];

/// Project the event batch stored at `input` onto [`EVENT_COLUMNS`] and write
/// it as a gzip CSV table at `output`. Returns the number of events written.
///
/// Missing fields become empty cells. Numeric columns are rewritten in
/// canonical form when they parse; values that do not parse as numbers pass
/// through untouched rather than voiding the record.
pub fn normalize_events(input: &Path, output: &Path) -> ProcessResult<u64> {
    let mut reader: JsonlReader<Value> = JsonlReader::open(input, Compression::Gzip)?;
    let batch = reader
        .next()
        .ok_or_else(|| ProcessError::Input(format!("{}: empty event store", input.display())))??;
    let events = batch
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ProcessError::Input(format!("{}: event batch has no data array", input.display()))
        })?;

    let mut rows = Vec::with_capacity(events.len());
    for event in events {
        let mut row = Vec::with_capacity(EVENT_COLUMNS.len());
        for column in EVENT_COLUMNS {
            let raw = field_text(event, column);
            if NUMERIC_COLUMNS.contains(&column) {
                row.push(normalize_number(&raw));
            } else {
                row.push(raw);
            }
        }
        rows.push(row);
    }
    if let Some(extra) = reader.next() {
        extra?;
        warn!(path = %input.display(), "Event store has extra records past the batch, ignoring");
    }

    write_csv_rows_gzip_atomic(output, &EVENT_COLUMNS, &rows)?;
    info!(events = rows.len(), path = %output.display(), "Wrote event table");
    Ok(rows.len() as u64)
}

/// Field value as text; missing and null fields become the empty string.
fn field_text(event: &Value, key: &str) -> String {
    match event.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Canonical numeric form when the value parses, the raw text otherwise.
fn normalize_number(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(v) => v.to_string(),
        Err(_) => raw.to_string(),
    }
}
