//! Conversion between artifact text and in-memory values.
//!
//! Structured formats decode into [`serde_json::Value`] (built with
//! `preserve_order`, so map keys keep their document order through a
//! decode/encode cycle). Markdown and plain text stay opaque strings.

use bindery_types::{ArtifactBlob, ArtifactFormat};
use serde_json::Value;
use thiserror::Error;

/// Failure to parse or serialize a document.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML document: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Decodes raw artifact text according to its declared format.
///
/// JSON-tagged text, and structured or unknown text whose first non-blank
/// character opens a JSON object or array, is parsed as JSON. YAML and unknown
/// formats go through the YAML parser (an empty document is `null`).
/// Markdown and text come back unchanged as a string value.
pub fn decode(raw: &str, format: ArtifactFormat) -> Result<Value, CodecError> {
    if matches!(format, ArtifactFormat::Md | ArtifactFormat::Txt) {
        return Ok(Value::String(raw.to_string()));
    }

    let trimmed = raw.trim_start();
    if format == ArtifactFormat::Json || trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(serde_json::from_str(raw)?);
    }

    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_yaml::from_str(raw)?)
}

/// Decodes a resolved blob using the format it was resolved with.
pub fn decode_blob(blob: &ArtifactBlob) -> Result<Value, CodecError> {
    decode(&blob.raw, blob.format)
}

/// Encodes a value for storage in the given format.
///
/// JSON is pretty-printed with two-space indentation, YAML is emitted in
/// block style; both keep map keys in insertion order. Other formats receive
/// the value's plain text form.
pub fn encode(value: &Value, format: ArtifactFormat) -> Result<String, CodecError> {
    match format {
        ArtifactFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        ArtifactFormat::Yaml | ArtifactFormat::Yml => to_yaml_block(value),
        ArtifactFormat::Md | ArtifactFormat::Txt | ArtifactFormat::Unknown => Ok(value_to_text(value)),
    }
}

/// Serializes a value as block YAML.
pub fn to_yaml_block(value: &Value) -> Result<String, CodecError> {
    Ok(serde_yaml::to_string(value)?)
}

/// Plain text form of a value.
///
/// - Strings are returned as-is
/// - `null` becomes the empty string
/// - Everything else is compact JSON
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}
