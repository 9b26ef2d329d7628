//! Values a script can bind.

use std::fmt;

use shaperun_core::ParamValue;

use crate::shape::{Assembly, ShapeHandle, Workplane, Wrapped};

/// Anything a scope binding can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Number(f64),
    Str(String),
    Workplane(Workplane),
    Assembly(Assembly),
    Shape(ShapeHandle),
    Wrapped(Wrapped),
}

impl Value {
    /// Type name used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "str",
            Value::Workplane(_) => "Workplane",
            Value::Assembly(_) => "Assembly",
            Value::Shape(_) => "Shape",
            Value::Wrapped(w) => &w.type_name,
        }
    }

    /// False for none, `false`, zero and the empty string.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }
}

impl From<&ParamValue> for Value {
    fn from(param: &ParamValue) -> Self {
        match param {
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Number(n) => Value::Number(*n),
            ParamValue::String(s) => Value::Str(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(s),
            other => write!(f, "<{}>", other.type_name()),
        }
    }
}
