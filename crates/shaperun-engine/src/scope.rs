//! Per-task execution scope.

use std::collections::HashMap;

use shaperun_core::Parameters;

use crate::Value;

/// Bindings visible to one script run.
///
/// A scope is built fresh for every task and dropped with it; nothing a
/// script binds can leak into the next task. The global layer only exists
/// so `global name = ...` assignments have somewhere to go, and is consulted
/// after the local layer.
#[derive(Debug, Default)]
pub struct Scope {
    locals: HashMap<String, Value>,
    globals: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope with every parameter bound as a local.
    pub fn with_parameters(params: &Parameters) -> Self {
        let locals = params
            .iter()
            .map(|(name, value)| (name.clone(), Value::from(value)))
            .collect();
        Self {
            locals,
            globals: HashMap::new(),
        }
    }

    /// Local binding, else global.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.locals.get(name).or_else(|| self.globals.get(name))
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.get(name)
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Remove and return `result`, falling back to the global layer.
    pub fn take_result(&mut self) -> Option<Value> {
        self.locals
            .remove("result")
            .or_else(|| self.globals.remove("result"))
    }

    /// Upper-cased string form of a truthy `material` binding.
    pub fn material(&self) -> Option<String> {
        self.get("material")
            .filter(|value| value.is_truthy())
            .map(|value| value.to_string().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_are_locals() {
        let scope = Scope::with_parameters(&Parameters::new().with("height", 12.0));
        assert_eq!(scope.local("height"), Some(&Value::Number(12.0)));
        assert!(scope.global("height").is_none());
    }

    #[test]
    fn test_result_global_fallback() {
        let mut scope = Scope::new();
        scope.set_global("result", Value::Number(1.0));
        assert_eq!(scope.take_result(), Some(Value::Number(1.0)));
        assert_eq!(scope.take_result(), None);
    }

    #[test]
    fn test_local_result_wins() {
        let mut scope = Scope::new();
        scope.set_global("result", Value::Number(1.0));
        scope.set("result", Value::Number(2.0));
        assert_eq!(scope.take_result(), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_material() {
        let mut scope = Scope::new();
        assert_eq!(scope.material(), None);
        scope.set_global("material", Value::Str("concrete".into()));
        assert_eq!(scope.material().as_deref(), Some("CONCRETE"));
        scope.set("material", Value::Str("steel".into()));
        assert_eq!(scope.material().as_deref(), Some("STEEL"));
        scope.set("material", Value::Str(String::new()));
        assert_eq!(scope.material(), None);
    }
}
