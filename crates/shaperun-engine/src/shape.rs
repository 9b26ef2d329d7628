//! Shape values and the closed set of result variants.

use std::f64::consts::PI;

use crate::{EngineFailure, Value};

/// Primitive solid, positioned by its origin corner (box) or base centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Box { dx: f64, dy: f64, dz: f64 },
    Cylinder { radius: f64, height: f64 },
    Sphere { radius: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solid {
    pub primitive: Primitive,
    pub origin: [f64; 3],
}

impl Solid {
    pub fn new(primitive: Primitive) -> Self {
        Self {
            primitive,
            origin: [0.0; 3],
        }
    }

    pub fn volume(&self) -> f64 {
        match self.primitive {
            Primitive::Box { dx, dy, dz } => dx * dy * dz,
            Primitive::Cylinder { radius, height } => PI * radius * radius * height,
            Primitive::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
        }
    }

    /// A solid with zero, negative or non-finite extent.
    pub fn is_degenerate(&self) -> bool {
        let dims: &[f64] = match &self.primitive {
            Primitive::Box { dx, dy, dz } => &[*dx, *dy, *dz],
            Primitive::Cylinder { radius, height } => &[*radius, *height],
            Primitive::Sphere { radius } => &[*radius],
        };
        dims.iter().any(|d| !d.is_finite() || *d <= 0.0)
            || self.origin.iter().any(|c| !c.is_finite())
    }

    pub fn translated(mut self, offset: [f64; 3]) -> Self {
        for (c, d) in self.origin.iter_mut().zip(offset) {
            *c += d;
        }
        self
    }
}

/// The engine's native shape: a compound of solids. Empty means null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeHandle {
    solids: Vec<Solid>,
}

impl ShapeHandle {
    pub fn null() -> Self {
        Self::default()
    }

    pub fn from_solid(solid: Solid) -> Self {
        Self {
            solids: vec![solid],
        }
    }

    pub fn compound(shapes: impl IntoIterator<Item = ShapeHandle>) -> Self {
        Self {
            solids: shapes.into_iter().flat_map(|s| s.solids).collect(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.solids.is_empty()
    }

    pub fn solids(&self) -> &[Solid] {
        &self.solids
    }

    pub fn volume(&self) -> f64 {
        self.solids.iter().map(Solid::volume).sum()
    }

    pub fn is_degenerate(&self) -> bool {
        self.is_null() || self.solids.iter().any(Solid::is_degenerate)
    }

    pub fn translated(&self, offset: [f64; 3]) -> Self {
        Self {
            solids: self.solids.iter().map(|s| s.translated(offset)).collect(),
        }
    }
}

/// A modeling stack; `val()` is its first item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workplane {
    pub stack: Vec<ShapeHandle>,
}

impl Workplane {
    pub fn with_shape(shape: ShapeHandle) -> Self {
        Self { stack: vec![shape] }
    }

    pub fn val(&self) -> ShapeHandle {
        self.stack.first().cloned().unwrap_or_default()
    }
}

/// Named parts combined into one compound on export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembly {
    pub parts: Vec<(String, ShapeHandle)>,
}

impl Assembly {
    pub fn to_compound(&self) -> ShapeHandle {
        ShapeHandle::compound(self.parts.iter().map(|(_, shape)| shape.clone()))
    }
}

/// A foreign object that only exposes its underlying native shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Wrapped {
    pub type_name: String,
    pub wrapped: Option<ShapeHandle>,
}

/// What `result` may be bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeResult {
    Workplane(Workplane),
    Assembly(Assembly),
    Shape(ShapeHandle),
    ShapeLike(Wrapped),
}

impl ShapeResult {
    /// Sort a `result` binding into its variant.
    pub fn classify(value: Value) -> Result<Self, EngineFailure> {
        match value {
            Value::Workplane(w) => Ok(Self::Workplane(w)),
            Value::Assembly(a) => Ok(Self::Assembly(a)),
            Value::Shape(s) => Ok(Self::Shape(s)),
            Value::Wrapped(w) => Ok(Self::ShapeLike(w)),
            other => Err(EngineFailure::UnsupportedResult(
                other.type_name().to_string(),
            )),
        }
    }

    /// The concrete shape to export. Null shapes are rejected.
    pub fn extract(self) -> Result<ShapeHandle, EngineFailure> {
        let shape = match self {
            Self::Workplane(w) => w.val(),
            Self::Assembly(a) => a.to_compound(),
            Self::Shape(s) => s,
            Self::ShapeLike(w) => w.wrapped.unwrap_or_default(),
        };
        if shape.is_null() {
            return Err(EngineFailure::NullShape);
        }
        Ok(shape)
    }
}
