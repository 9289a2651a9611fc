use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Datelike, FixedOffset};
use serde_json::{Map, Value};

/// Epoch values above this are milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Oldest year a sidecar timestamp may decode to before it is considered a placeholder.
pub const MIN_SIDECAR_YEAR: i32 = 2000;

/// The parts of a Takeout sidecar the pipeline consumes. Fields are read
/// leniently: a value of an unexpected type counts as absent and never
/// invalidates the rest of the document.
#[derive(Debug, Clone, Default)]
pub struct SidecarRecord {
    pub title: Option<String>,
    /// `photoTakenTime.timestamp`; Google writes a string, some exports a number
    pub taken_timestamp: Option<Value>,
    /// `photoTakenTime.formatted`, informational only
    pub taken_formatted: Option<String>,
}

impl SidecarRecord {
    fn from_object(map: &Map<String, Value>) -> Self {
        let taken = map.get("photoTakenTime").and_then(Value::as_object);
        Self {
            title: map.get("title").and_then(Value::as_str).map(str::to_owned),
            taken_timestamp: taken.and_then(|t| t.get("timestamp")).cloned(),
            taken_formatted: taken
                .and_then(|t| t.get("formatted"))
                .and_then(Value::as_str)
                .map(str::to_owned),
        }
    }
}

/// Parse sidecar bytes. Returns `Ok(None)` for documents that are valid JSON
/// but carry nothing (not an object, or an empty object).
pub fn parse_sidecar(json_bytes: &[u8]) -> anyhow::Result<Option<SidecarRecord>> {
    let data: Value = serde_json::from_slice(json_bytes)?;
    match &data {
        Value::Object(map) if !map.is_empty() => Ok(Some(SidecarRecord::from_object(map))),
        _ => Ok(None),
    }
}

/// Read and parse a sidecar from disk.
pub fn load_sidecar(path: &Path) -> anyhow::Result<Option<SidecarRecord>> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    parse_sidecar(&bytes).with_context(|| format!("parsing {}", path.display()))
}

impl SidecarRecord {
    /// Raw `photoTakenTime.timestamp` as epoch seconds.
    pub fn taken_epoch(&self) -> Option<i64> {
        let raw = self.taken_timestamp.as_ref()?;
        let epoch = match raw {
            Value::String(s) => s.trim().parse::<i64>().ok()?,
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
            _ => return None,
        };
        if epoch > MILLIS_THRESHOLD {
            Some(epoch / 1000)
        } else {
            Some(epoch)
        }
    }

    /// Taken time converted into `offset`, or `None` when absent or outside
    /// `[MIN_SIDECAR_YEAR, max_year]`.
    pub fn taken_time(&self, offset: &FixedOffset, max_year: i32) -> Option<DateTime<FixedOffset>> {
        let utc = DateTime::from_timestamp(self.taken_epoch()?, 0)?;
        let local = utc.with_timezone(offset);
        if (MIN_SIDECAR_YEAR..=max_year).contains(&local.year()) {
            Some(local)
        } else {
            None
        }
    }
}
