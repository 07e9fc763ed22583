use crate::{Error, Record, Result};
use serde_json::Value;

/// Decodes a raw payload into a [`Record`]. The payload has to be a JSON
/// object; arrays and scalars are malformed input.
pub fn decode(payload: &[u8]) -> Result<Record> {
    match serde_json::from_slice::<Value>(payload)? {
        Value::Object(fields) => Ok(Record::from(fields)),
        other => Err(Error::Decode(format!(
            "expected a JSON object, found {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
