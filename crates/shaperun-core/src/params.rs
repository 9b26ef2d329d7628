//! Named scalar parameters bound into a script's scope.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// A single parameter value. Only scalars are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ParamValue {
    /// Convert a JSON value, refusing anything that is not a scalar.
    pub fn from_json(value: &Value) -> Result<Self, CoreError> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| CoreError::InvalidInput(format!("number out of range: {}", n))),
            Value::String(s) => Ok(Self::String(s.clone())),
            other => Err(CoreError::InvalidInput(format!(
                "parameter values must be strings, numbers or booleans, got {}",
                json_type_name(other)
            ))),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::String(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

/// Mapping from parameter name to scalar value.
///
/// Serializes as a flat JSON object, which is also the on-disk format of the
/// task's args file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, ParamValue>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Validate and convert a JSON object of parameters.
    pub fn from_json(value: &Value) -> Result<Self, CoreError> {
        let object = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(CoreError::InvalidInput(format!(
                    "parameters must be an object, got {}",
                    json_type_name(other)
                )))
            }
        };

        let mut params = BTreeMap::new();
        for (name, raw) in object {
            if !is_identifier(name) {
                return Err(CoreError::InvalidInput(format!(
                    "parameter name '{}' is not a valid identifier",
                    name
                )));
            }
            let value = ParamValue::from_json(raw).map_err(|e| match e {
                CoreError::InvalidInput(msg) => {
                    CoreError::InvalidInput(format!("parameter '{}': {}", name, msg))
                }
                other => other,
            })?;
            params.insert(name.clone(), value);
        }
        Ok(Self(params))
    }

    /// Parse the JSON text of an args file.
    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }

    pub fn to_json_string(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Script identifiers: ASCII letter or `_`, then letters, digits or `_`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
