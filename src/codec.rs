use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Multi-value text fields (causas, solucion) ---

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("could not encode list: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("stored step list is not a valid JSON array: {0}")]
    Decode(#[source] serde_json::Error),
}

/// normalize_lines
///
/// Turns a textarea submission into list items: one item per line, trimmed, blank lines
/// discarded.
pub fn normalize_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rebuilds the editable textarea text for a stored list.
pub fn to_textarea(items: &[String]) -> String {
    items.join("\n")
}

/// encode_list
///
/// Storage form for `causas` and `solucion`: a JSON array of strings, so items may contain
/// any character (including `|`). An empty list is stored as `[]`; the empty-string form
/// belongs to [`legacy::encode`].
pub fn encode_list(items: &[String]) -> Result<String, CodecError> {
    serde_json::to_string(items).map_err(CodecError::Encode)
}

/// decode_list
///
/// Reads a stored list. Rows written before the JSON migration still hold legacy text (pipe
/// joined, or one item per line), so anything that is not a JSON string array is read that way.
pub fn decode_list(stored: &str) -> Vec<String> {
    let trimmed = stored.trim();
    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return items;
        }
    }
    legacy::decode(stored)
}

/// True when the stored value is already a JSON array (i.e. needs no migration).
pub fn is_json_list(stored: &str) -> bool {
    serde_json::from_str::<Vec<String>>(stored.trim()).is_ok()
}

/// Pipe-joined list format used by earlier revisions. Only used to import old rows and seed
/// data; an item containing `|` cannot be represented and splits on decode.
///
/// Some old rows hold the raw textarea instead (one item per line, no pipes), so decoding
/// splits on line breaks as well. `encode(&[])` is `""`.
pub mod legacy {
    pub const DELIMITER: char = '|';

    pub fn encode(items: &[String]) -> String {
        items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn decode(stored: &str) -> Vec<String> {
        stored
            .split(|c: char| c == DELIMITER || c == '\n' || c == '\r')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// --- Structured step records (pasos) ---

/// StepRecord
///
/// One step of a visual guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct StepRecord {
    pub titulo: String,
    #[serde(default)]
    pub descripcion: String,
    /// Image path or URL; empty when the step has no image.
    #[serde(default)]
    pub imagen: String,
}

pub fn encode_steps(steps: &[StepRecord]) -> Result<String, CodecError> {
    serde_json::to_string(steps).map_err(CodecError::Encode)
}

pub fn decode_steps(stored: &str) -> Result<Vec<StepRecord>, CodecError> {
    if stored.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(stored).map_err(CodecError::Decode)
}

pub fn step_title_field(index: usize) -> String {
    format!("paso_titulo_{index}")
}

pub fn step_description_field(index: usize) -> String {
    format!("paso_descripcion_{index}")
}

pub fn step_image_field(index: usize) -> String {
    format!("paso_imagen_{index}")
}

/// collect_steps
///
/// Reads a variable-length step list out of a flat form submission by probing indices
/// 0, 1, 2, ... and stopping at the first index without a (non-blank) title. Fields past
/// the first gap are never read.
pub fn collect_steps(form: &HashMap<String, String>) -> Vec<StepRecord> {
    let field = |key: String| {
        form.get(&key)
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };

    let mut steps = Vec::new();
    for index in 0.. {
        let titulo = field(step_title_field(index));
        if titulo.is_empty() {
            break;
        }
        steps.push(StepRecord {
            titulo,
            descripcion: field(step_description_field(index)),
            imagen: field(step_image_field(index)),
        });
    }
    steps
}
