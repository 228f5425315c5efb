use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema version written into every pushed [`SyncDocument`].
pub const SCHEMA_VERSION: u32 = 1;

/// `chrono` format of the ISO date keys stored in a [`CompletionRecord`].
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A user-defined recurring activity tracked by day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub name: String,
    /// Hex color, e.g. `#68d391`.
    pub color: String,
}

impl Habit {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
        }
    }
}

/// Habit id → set of completed `YYYY-MM-DD` dates.
///
/// A set per habit, so toggling the same date twice never accumulates
/// duplicates. Serializes as `{ "<id>": ["2024-01-01", ...] }`.
pub type CompletionRecord = BTreeMap<String, BTreeSet<String>>;

/// Render a date as a completion key.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a completion key back into a date. `None` for anything malformed.
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, DATE_FORMAT).ok()
}

/// The replicated part of the domain state: habit list plus completions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitData {
    pub habits: Vec<Habit>,
    pub app_data: CompletionRecord,
}

// ============================================================================
// SyncDocument
// ============================================================================

/// The shared remote document, one per sync session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDocument {
    pub schema_version: u32,
    pub habits: Vec<Habit>,
    pub app_data: CompletionRecord,
    /// Epoch millis of the write.
    pub updated_at_ms: i64,
    /// Client id of the writer.
    pub updated_by: String,
}

impl SyncDocument {
    /// Build the payload a client pushes for `data` at `updated_at_ms`.
    pub fn new(data: HabitData, updated_at_ms: i64, updated_by: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            habits: data.habits,
            app_data: data.app_data,
            updated_at_ms,
            updated_by: updated_by.into(),
        }
    }

    /// JSON object form used for merge-set writes.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "schemaVersion": self.schema_version,
            "habits": self.habits,
            "appData": self.app_data,
            "updatedAtMs": self.updated_at_ms,
            "updatedBy": self.updated_by,
        })
    }

    pub fn data(&self) -> HabitData {
        HabitData {
            habits: self.habits.clone(),
            app_data: self.app_data.clone(),
        }
    }
}

// ============================================================================
// Lenient readers over raw remote documents
// ============================================================================

/// `updatedBy` of a raw remote document, if it is a string.
pub fn remote_updated_by(doc: &Value) -> Option<&str> {
    doc.get("updatedBy").and_then(Value::as_str)
}

/// `updatedAtMs` of a raw remote document; `0` when absent or non-numeric.
pub fn remote_updated_at_ms(doc: &Value) -> i64 {
    match doc.get("updatedAtMs") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    }
}

/// Validate and extract `habits` / `appData` from a raw remote document.
///
/// Returns `None` unless `habits` is a sequence of habits and `appData` is a
/// mapping of habit id to a sequence of date strings. Either field being
/// malformed rejects the whole document.
pub fn parse_remote_data(doc: &Value) -> Option<HabitData> {
    let obj = doc.as_object()?;
    let habits = obj.get("habits")?;
    let app_data = obj.get("appData")?;
    if !habits.is_array() || !app_data.is_object() {
        return None;
    }
    let habits: Vec<Habit> = serde_json::from_value(habits.clone()).ok()?;
    let app_data: CompletionRecord = serde_json::from_value(app_data.clone()).ok()?;
    Some(HabitData { habits, app_data })
}
