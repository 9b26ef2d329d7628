//! `--param name=value` parsing.

use serde_json::{Map, Value};
use shaperun_core::params::is_identifier;

use crate::error::ClientError;

/// Parse `name=value` pairs into a JSON parameter object.
///
/// Values that read as JSON numbers or booleans keep that type; anything
/// else is a string. Quote a value (`name="10"`) to force a string.
pub fn parse_params<S: AsRef<str>>(pairs: &[S]) -> Result<Map<String, Value>, ClientError> {
    let mut params = Map::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (name, raw) = pair.split_once('=').ok_or_else(|| {
            ClientError::InvalidParam(pair.to_string(), "expected name=value".into())
        })?;
        let name = name.trim();
        if !is_identifier(name) {
            return Err(ClientError::InvalidParam(
                pair.to_string(),
                "name is not a valid identifier".into(),
            ));
        }
        params.insert(name.to_string(), parse_value(raw));
    }
    Ok(params)
}

fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::String(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}
