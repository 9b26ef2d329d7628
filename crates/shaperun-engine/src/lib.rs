//! Shape engine contract for shaperun.
//!
//! A worker never does geometry itself. It binds parameters into a fresh
//! [`Scope`], hands the script to a [`ShapeEngine`], classifies whatever the
//! script bound as `result` into a [`ShapeResult`], and asks the engine to
//! export the extracted [`ShapeHandle`].
//!
//! [`SketchEngine`] is the bundled implementation: a small line-based
//! modeling language with box/cylinder/sphere primitives and a textual BREP
//! format.
//!
//! # Example
//!
//! ```rust
//! use shaperun_core::Parameters;
//! use shaperun_engine::{Scope, ShapeEngine, ShapeResult, SketchEngine};
//!
//! let engine = SketchEngine::new();
//! let mut scope = Scope::with_parameters(&Parameters::new().with("w", 100.0));
//! engine.execute("result = box(w, w, w)", &mut scope).unwrap();
//!
//! let value = scope.take_result().unwrap();
//! let shape = ShapeResult::classify(value).unwrap().extract().unwrap();
//! assert_eq!(shape.volume(), 1_000_000.0);
//! ```

mod engine;
mod error;
mod scope;
mod shape;
pub mod sketch;
mod value;

pub use engine::ShapeEngine;
pub use error::EngineFailure;
pub use scope::Scope;
pub use shape::{Assembly, Primitive, ShapeHandle, ShapeResult, Solid, Workplane, Wrapped};
pub use sketch::SketchEngine;
pub use value::Value;
