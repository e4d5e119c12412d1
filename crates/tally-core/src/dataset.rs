use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::history::History;
use crate::tracker::Tracker;

pub const DATASET_VERSION: u32 = 1;
pub const CONTENT_TYPE: &str = "application/json";
pub const INVALID_FILE_MESSAGE: &str = "That file is not a valid tally export.";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("document has no usable version")]
    MissingVersion,
    #[error("document has neither activeTracker nor history")]
    MissingPayload,
    #[error("{field} has an unexpected shape: {source}")]
    Malformed {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to parse dataset: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid dataset: {0}")]
    Schema(#[from] SchemaError),
}

impl DatasetError {
    /// What the user sees. Parse and schema failures read the same.
    pub fn user_message(&self) -> &'static str {
        INVALID_FILE_MESSAGE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDocument {
    pub version: u32,
    pub active_tracker: Option<Tracker>,
    pub history: History,
}

impl DatasetDocument {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// The two structures an accepted document carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedData {
    pub active_tracker: Option<Tracker>,
    pub history: History,
}

pub fn export(active_tracker: Option<&Tracker>, history: &History) -> DatasetDocument {
    DatasetDocument {
        version: DATASET_VERSION,
        active_tracker: active_tracker.cloned(),
        history: history.clone(),
    }
}

pub fn export_filename(date: NaiveDate) -> String {
    format!(
        "tally-backup-{:04}-{:02}-{:02}.json",
        date.year(),
        date.month(),
        date.day()
    )
}

/// Validates the document's shape and hands back its contents verbatim.
///
/// Only the envelope is checked: `version` must be truthy and at least one
/// of `activeTracker` / `history` must be present. Counters and timestamps
/// inside the trackers are trusted as-is, so a hand-edited tracker with
/// `current > target` is accepted.
pub fn import_document(raw: &[u8]) -> Result<ImportedData, DatasetError> {
    let document: Value = serde_json::from_slice(raw)?;

    let version = document.get("version").unwrap_or(&Value::Null);
    if !is_truthy(version) {
        return Err(SchemaError::MissingVersion.into());
    }

    let active = present(&document, "activeTracker");
    let history = present(&document, "history");
    if active.is_none() && history.is_none() {
        return Err(SchemaError::MissingPayload.into());
    }

    let active_tracker = match active {
        Some(value) => Some(decode::<Tracker>(value, "activeTracker")?),
        None => None,
    };
    let history = match history {
        Some(value) => decode::<History>(value, "history")?,
        None => History::new(),
    };

    Ok(ImportedData {
        active_tracker,
        history,
    })
}

fn present<'a>(document: &'a Value, key: &str) -> Option<&'a Value> {
    document.get(key).filter(|value| !value.is_null())
}

fn decode<T: serde::de::DeserializeOwned>(
    value: &Value,
    field: &'static str,
) -> Result<T, SchemaError> {
    T::deserialize(value).map_err(|source| SchemaError::Malformed { field, source })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
