//! Payloads of uncertain shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A parsed JSON payload whose shape has not been checked yet.
///
/// Use it as the orchestrator's `T` when the caller cannot commit to a type
/// up front. Nothing reads through it implicitly: callers either inspect the
/// raw value or [`narrow`](Unknown::narrow) it into a concrete type, which is
/// where shape errors surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unknown(serde_json::Value);

impl Unknown {
    pub fn new(value: serde_json::Value) -> Self {
        Unknown(value)
    }

    /// Deserialize into `U`, failing if the payload has a different shape.
    pub fn narrow<U: DeserializeOwned>(&self) -> Result<U> {
        Ok(U::deserialize(&self.0)?)
    }

    /// JSON kind of the payload: `null`, `bool`, `number`, `string`, `array` or `object`.
    pub fn kind(&self) -> &'static str {
        match &self.0 {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "bool",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        }
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}
