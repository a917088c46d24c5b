//! The `{data, errors}` response envelope.
//!
//! Successful results pass through the codec unchanged; failures of any
//! origin are normalized into one envelope shape so callers only ever have
//! to understand a single error document format.

use crate::value::{Map, Value};

/// Member name of the result payload.
pub const DATA: &str = "data";

/// Member name of the error list.
pub const ERRORS: &str = "errors";

/// Builds a `{data: null, errors: <errors>}` document.
pub fn error_document(errors: Value) -> Value {
    let mut members = Map::with_capacity(2);
    members.insert(DATA.to_string(), Value::Null);
    members.insert(ERRORS.to_string(), errors);
    Value::Map(members)
}

/// Builds a one-message error list.
pub fn message_errors(message: impl Into<String>) -> Value {
    Value::List(vec![Value::String(message.into())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::{parse_json, to_json};

    #[test]
    fn test_error_document_shape() {
        let document = error_document(message_errors("boom"));
        assert!(document.get(DATA).is_some_and(Value::is_null));
        let errors = document.get(ERRORS).and_then(Value::as_list).unwrap();
        assert_eq!(errors, &[Value::from("boom")]);
    }

    #[test]
    fn test_envelope_round_trips() {
        let document = error_document(message_errors("boom"));
        let text = to_json(&document).unwrap();
        let parsed = parse_json(&text).unwrap();
        assert_eq!(parsed, document);
        assert!(parsed.get(DATA).is_some_and(Value::is_null));
        assert!(!parsed
            .get(ERRORS)
            .and_then(Value::as_list)
            .unwrap()
            .is_empty());
    }
}
