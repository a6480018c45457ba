//! Strict decoding of structured model output.
//!
//! Each JSON flow declares the shape it expects ([`ModelOutput::response_schema`]) so the
//! provider can constrain generation, then runs the reply through [`decode`]: parse or fail,
//! followed by value checks. Nothing partially shaped gets past this point.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::SchemaError;
use crate::util::{strip_code_fence, trunc_for_log};

pub trait ModelOutput: DeserializeOwned {
  /// OpenAPI-subset schema sent alongside the prompt.
  fn response_schema() -> Value;

  /// Value-level constraints serde cannot express.
  fn check(&self) -> Result<(), SchemaError> {
    Ok(())
  }
}

pub fn decode<T: ModelOutput>(text: &str) -> Result<T, SchemaError> {
  let value: T = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
    debug!(target: "flow", error = %e, raw = %trunc_for_log(text, 200), "Model output did not parse");
    e
  })?;
  value.check()?;
  Ok(value)
}

/// Object schema where every listed property is a required string.
pub fn string_object(fields: &[&str]) -> Value {
  let properties: serde_json::Map<String, Value> = fields
    .iter()
    .map(|f| (f.to_string(), json!({ "type": "STRING" })))
    .collect();
  json!({ "type": "OBJECT", "properties": properties, "required": fields })
}

pub fn require_non_blank(field: &str, value: &str) -> Result<(), SchemaError> {
  if value.trim().is_empty() {
    return Err(SchemaError::Invalid(format!("'{field}' must not be empty")));
  }
  Ok(())
}
