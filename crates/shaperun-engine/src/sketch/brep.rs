//! Textual BREP format.
//!
//! ```text
//! SKETCH-BREP 1
//! solids 2
//! box 0 0 0 100 100 100
//! cylinder 0 0 100 5 20
//! end
//! ```
//!
//! Coordinates come first, then primitive dimensions. Floats are written
//! with their shortest round-tripping representation.

use std::fmt::Write as _;

use crate::{Primitive, ShapeHandle, Solid};

pub const HEADER: &str = "SKETCH-BREP 1";

pub fn encode(shape: &ShapeHandle) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", HEADER);
    let _ = writeln!(out, "solids {}", shape.solids().len());
    for solid in shape.solids() {
        let [x, y, z] = solid.origin;
        let _ = match solid.primitive {
            Primitive::Box { dx, dy, dz } => {
                writeln!(out, "box {} {} {} {} {} {}", x, y, z, dx, dy, dz)
            }
            Primitive::Cylinder { radius, height } => {
                writeln!(out, "cylinder {} {} {} {} {}", x, y, z, radius, height)
            }
            Primitive::Sphere { radius } => writeln!(out, "sphere {} {} {} {}", x, y, z, radius),
        };
    }
    out.push_str("end\n");
    out
}

pub fn decode(text: &str) -> Result<ShapeHandle, String> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    if lines.next() != Some(HEADER) {
        return Err("missing SKETCH-BREP header".to_string());
    }

    let count = lines
        .next()
        .and_then(|l| l.strip_prefix("solids "))
        .and_then(|n| n.trim().parse::<usize>().ok())
        .ok_or_else(|| "missing solid count".to_string())?;

    let mut solids = Vec::new();
    for _ in 0..count {
        let line = lines
            .next()
            .ok_or_else(|| format!("expected {} solids, found {}", count, solids.len()))?;
        solids.push(decode_solid(line)?);
    }

    if lines.next() != Some("end") {
        return Err("missing end marker".to_string());
    }

    Ok(ShapeHandle::compound(
        solids.into_iter().map(ShapeHandle::from_solid),
    ))
}

fn decode_solid(line: &str) -> Result<Solid, String> {
    let mut fields = line.split_whitespace();
    let kind = fields.next().unwrap_or_default();
    let numbers = fields
        .map(|f| f.parse::<f64>().map_err(|_| format!("bad number '{}'", f)))
        .collect::<Result<Vec<_>, _>>()?;

    let primitive = match (kind, numbers.len()) {
        ("box", 6) => Primitive::Box {
            dx: numbers[3],
            dy: numbers[4],
            dz: numbers[5],
        },
        ("cylinder", 5) => Primitive::Cylinder {
            radius: numbers[3],
            height: numbers[4],
        },
        ("sphere", 4) => Primitive::Sphere { radius: numbers[3] },
        _ => return Err(format!("malformed solid record '{}'", line)),
    };

    Ok(Solid {
        primitive,
        origin: [numbers[0], numbers[1], numbers[2]],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let shape = ShapeHandle::from_solid(Solid::new(Primitive::Box {
            dx: 100.0,
            dy: 100.0,
            dz: 100.0,
        }));
        assert_eq!(
            encode(&shape),
            "SKETCH-BREP 1\nsolids 1\nbox 0 0 0 100 100 100\nend\n"
        );
    }

    #[test]
    fn test_decode_mixed() {
        let text = "SKETCH-BREP 1\nsolids 2\nbox 0 0 0 1 2 3\nsphere 1.5 0 -2 0.25\nend\n";
        let shape = decode(text).unwrap();
        assert_eq!(shape.solids().len(), 2);
        assert_eq!(shape.solids()[1].origin, [1.5, 0.0, -2.0]);
        assert_eq!(shape.solids()[0].volume(), 6.0);
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert!(decode("SKETCH-BREP 1\nsolids 2\nbox 0 0 0 1 1 1\nend\n").is_err());
        assert!(decode("STEP\n").is_err());
        assert!(decode("SKETCH-BREP 1\nsolids 1\nbox 0 0 1 1\nend\n").is_err());
    }

    #[test]
    fn test_decode_huge_count_is_error() {
        let err = decode("SKETCH-BREP 1\nsolids 99999999999999999\n").unwrap_err();
        assert!(err.contains("expected 99999999999999999 solids, found 0"), "{}", err);
    }
}
