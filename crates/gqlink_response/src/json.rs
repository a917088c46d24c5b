//! JSON text codec for document trees.

use crate::value::Value;
use thiserror::Error;

/// A codec failure.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The text is not a valid serialized document tree.
    #[error("invalid JSON document: {0}")]
    Parse(#[source] serde_json::Error),
    /// The tree could not be rendered as JSON text.
    #[error("failed to serialize response document: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Serializes a document tree to JSON text.
pub fn to_json(value: &Value) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(CodecError::Serialize)
}

/// Parses JSON text into a document tree.
pub fn parse_json(text: &str) -> Result<Value, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Parse)
}
