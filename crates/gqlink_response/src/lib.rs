//! Response document trees and the JSON codec for gqlink.
//!
//! This crate provides:
//! - `value`: The generic tagged document tree
//! - `json`: The JSON text codec (`to_json` / `parse_json`)
//! - `envelope`: The `{data, errors}` error envelope shape

pub mod envelope;
pub mod json;
pub mod value;

pub use envelope::{error_document, message_errors, DATA, ERRORS};
pub use json::{parse_json, to_json, CodecError};
pub use value::{Map, Value};
