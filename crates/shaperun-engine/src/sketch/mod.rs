//! The sketch kernel: a line-based modeling language and BREP text format.
//!
//! Each non-blank line is `[global] name = expr` or a bare expression.
//! `recv.f(args)` is sugar for `f(recv, args)`. Builtins:
//!
//! | builtin | returns |
//! |---|---|
//! | `box(dx, dy, dz)`, `cylinder(r, h)`, `sphere(r)` | Workplane |
//! | `workplane()` | empty Workplane |
//! | `val(x)` | the raw Shape |
//! | `translate(x, dx, dy, dz)`, `union(a, b, ...)` | same kind / Workplane |
//! | `assembly()`, `add(asm, name, x)` | Assembly |
//! | `wrap(type_name[, x])` | foreign shape-like object |
//! | `show_object(x)` | binds `result` |
//! | `fail(msg)`, `sleep(ms)`, `abort()` | test hooks |

mod brep;
mod interp;
mod lexer;
mod parser;

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::{EngineFailure, Primitive, Scope, ShapeEngine, ShapeHandle, Solid};

pub use brep::HEADER as BREP_HEADER;

#[derive(Debug, Default)]
pub struct SketchEngine {
    warmed: bool,
}

impl SketchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an artifact written by [`ShapeEngine::export`].
    pub fn import(&self, path: &Path) -> Result<ShapeHandle, EngineFailure> {
        let text = fs::read_to_string(path)
            .map_err(|e| EngineFailure::Import(format!("{}: {}", path.display(), e)))?;
        brep::decode(&text).map_err(EngineFailure::Import)
    }

    pub fn is_warm(&self) -> bool {
        self.warmed
    }
}

impl ShapeEngine for SketchEngine {
    fn name(&self) -> &str {
        "sketch"
    }

    fn warm_up(&mut self) -> Result<(), EngineFailure> {
        // Round-trip a probe solid through the codec once.
        let probe = ShapeHandle::from_solid(Solid::new(Primitive::Box {
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
        }));
        let decoded = brep::decode(&brep::encode(&probe)).map_err(EngineFailure::WarmUp)?;
        if decoded != probe {
            return Err(EngineFailure::WarmUp("BREP self-check mismatch".to_string()));
        }
        self.warmed = true;
        debug!("sketch kernel warmed up");
        Ok(())
    }

    fn execute(&self, script: &str, scope: &mut Scope) -> Result<(), EngineFailure> {
        let program = parser::parse_program(script)
            .map_err(|(line, message)| EngineFailure::script(line, message))?;
        interp::run(&program, scope)
    }

    fn export(&self, shape: &ShapeHandle, path: &Path) -> Result<(), EngineFailure> {
        if shape.is_degenerate() {
            return Err(EngineFailure::Export("shape has degenerate solids".to_string()));
        }
        fs::write(path, brep::encode(shape))
            .map_err(|e| EngineFailure::Export(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ShapeResult, Value};
    use shaperun_core::Parameters;

    #[test]
    fn test_export_import_cube() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cube.brep");

        let mut engine = SketchEngine::new();
        engine.warm_up().unwrap();
        assert!(engine.is_warm());

        let mut scope = Scope::with_parameters(&Parameters::new().with("w", 100.0));
        engine.execute("result = box(w, w, w)", &mut scope).unwrap();
        let shape = ShapeResult::classify(scope.take_result().unwrap())
            .unwrap()
            .extract()
            .unwrap();
        engine.export(&shape, &out).unwrap();

        let back = engine.import(&out).unwrap();
        assert_eq!(back, shape);
        assert_eq!(back.volume(), 1_000_000.0);
        assert!(!back.is_degenerate());
    }

    #[test]
    fn test_syntax_error_line() {
        let engine = SketchEngine::new();
        let mut scope = Scope::new();
        let err = engine
            .execute("a = 1\n\nresult = box(1, 1", &mut scope)
            .unwrap_err();
        assert!(matches!(err, EngineFailure::Script { line: 3, .. }));
        // Nothing executes when the program does not parse.
        assert!(scope.get("a").is_none());
    }

    #[test]
    fn test_global_result() {
        let engine = SketchEngine::new();
        let mut scope = Scope::new();
        engine
            .execute("global result = sphere(2)\nglobal material = 'steel'", &mut scope)
            .unwrap();
        assert!(scope.local("result").is_none());
        assert_eq!(scope.material().as_deref(), Some("STEEL"));
        assert!(matches!(scope.take_result(), Some(Value::Workplane(_))));
    }

    #[test]
    fn test_export_rejects_degenerate() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SketchEngine::new();
        let mut scope = Scope::new();
        engine.execute("result = box(0, 1, 1)", &mut scope).unwrap();
        let shape = ShapeResult::classify(scope.take_result().unwrap())
            .unwrap()
            .extract()
            .unwrap();
        let err = engine.export(&shape, &dir.path().join("x.brep")).unwrap_err();
        assert!(matches!(err, EngineFailure::Export(_)));
        assert!(!dir.path().join("x.brep").exists());
    }
}
