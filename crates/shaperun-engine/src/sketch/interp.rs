//! Tree-walking evaluator for parsed sketch programs.

use std::time::Duration;

use tracing::trace;

use super::parser::{BinOp, Expr, Stmt, StmtKind};
use crate::{Assembly, EngineFailure, Primitive, Scope, ShapeHandle, Solid, Value, Workplane, Wrapped};

/// Execute `program` statement by statement against `scope`.
pub fn run(program: &[Stmt], scope: &mut Scope) -> Result<(), EngineFailure> {
    for stmt in program {
        trace!(line = stmt.line, "sketch statement");
        let at_line = |message: String| EngineFailure::script(stmt.line, message);
        match &stmt.kind {
            StmtKind::Assign {
                name,
                global,
                value,
            } => {
                let value = eval(value, scope).map_err(at_line)?;
                if *global {
                    scope.set_global(name.clone(), value);
                } else {
                    scope.set(name.clone(), value);
                }
            }
            StmtKind::Expr(expr) => {
                eval(expr, scope).map_err(at_line)?;
            }
        }
    }
    Ok(())
}

fn eval(expr: &Expr, scope: &mut Scope) -> Result<Value, String> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::None => Ok(Value::None),
        Expr::Name(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| format!("name '{}' is not defined", name)),
        Expr::Neg(inner) => match eval(inner, scope)? {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(format!("bad operand type for unary -: '{}'", other.type_name())),
        },
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, scope)?;
            let rhs = eval(rhs, scope)?;
            binary(*op, lhs, rhs)
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, args, scope)
        }
    }
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, String> {
    match (op, lhs, rhs) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (_, Value::Number(a), Value::Number(b)) => match op {
            BinOp::Add => Ok(Value::Number(a + b)),
            BinOp::Sub => Ok(Value::Number(a - b)),
            BinOp::Mul => Ok(Value::Number(a * b)),
            BinOp::Div if b == 0.0 => Err("division by zero".to_string()),
            BinOp::Div => Ok(Value::Number(a / b)),
        },
        (op, a, b) => Err(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            symbol(op),
            a.type_name(),
            b.type_name()
        )),
    }
}

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
    }
}

fn call(name: &str, args: Vec<Value>, scope: &mut Scope) -> Result<Value, String> {
    match name {
        "box" => {
            let [dx, dy, dz] = numbers::<3>(name, &args)?;
            Ok(primitive(Primitive::Box { dx, dy, dz }))
        }
        "cylinder" => {
            let [radius, height] = numbers::<2>(name, &args)?;
            Ok(primitive(Primitive::Cylinder { radius, height }))
        }
        "sphere" => {
            let [radius] = numbers::<1>(name, &args)?;
            Ok(primitive(Primitive::Sphere { radius }))
        }
        "workplane" => {
            arity(name, &args, 0)?;
            Ok(Value::Workplane(Workplane::default()))
        }
        "val" => {
            arity(name, &args, 1)?;
            Ok(Value::Shape(shape_of(&args[0])?))
        }
        "translate" => {
            arity(name, &args, 4)?;
            let [x, y, z] = numbers::<3>(name, &args[1..])?;
            translate(&args[0], [x, y, z])
        }
        "union" => {
            if args.is_empty() {
                return Err("union() expects at least 1 argument".to_string());
            }
            let shapes = args.iter().map(shape_of).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Workplane(Workplane::with_shape(
                ShapeHandle::compound(shapes),
            )))
        }
        "assembly" => {
            arity(name, &args, 0)?;
            Ok(Value::Assembly(Assembly::default()))
        }
        "add" => {
            arity(name, &args, 3)?;
            let mut assembly = match &args[0] {
                Value::Assembly(a) => a.clone(),
                other => return Err(format!("add() expects an Assembly, got '{}'", other.type_name())),
            };
            let part = match &args[1] {
                Value::Str(s) => s.clone(),
                other => return Err(format!("add() part name must be str, got '{}'", other.type_name())),
            };
            assembly.parts.push((part, shape_of(&args[2])?));
            Ok(Value::Assembly(assembly))
        }
        "wrap" => {
            let type_name = match args.first() {
                Some(Value::Str(s)) if !s.is_empty() => s.clone(),
                _ => return Err("wrap() expects a type name".to_string()),
            };
            let wrapped = match args.get(1) {
                None | Some(Value::None) => None,
                Some(inner) => Some(shape_of(inner)?),
            };
            Ok(Value::Wrapped(Wrapped { type_name, wrapped }))
        }
        "show_object" => {
            arity(name, &args, 1)?;
            scope.set("result", args[0].clone());
            Ok(Value::None)
        }
        "fail" => Err(args
            .first()
            .map(Value::to_string)
            .unwrap_or_else(|| "script failed".to_string())),
        "sleep" => {
            let [ms] = numbers::<1>(name, &args)?;
            std::thread::sleep(Duration::from_millis(ms.max(0.0) as u64));
            Ok(Value::None)
        }
        "abort" => std::process::abort(),
        _ => Err(format!("name '{}' is not defined", name)),
    }
}

fn primitive(primitive: Primitive) -> Value {
    Value::Workplane(Workplane::with_shape(ShapeHandle::from_solid(Solid::new(
        primitive,
    ))))
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), String> {
    if args.len() != expected {
        return Err(format!(
            "{}() takes {} arguments but {} were given",
            name,
            expected,
            args.len()
        ));
    }
    Ok(())
}

fn numbers<const N: usize>(name: &str, args: &[Value]) -> Result<[f64; N], String> {
    arity(name, args, N)?;
    let mut out = [0.0; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = match arg {
            Value::Number(n) => *n,
            other => {
                return Err(format!(
                    "{}() expects numbers, got '{}'",
                    name,
                    other.type_name()
                ))
            }
        };
    }
    Ok(out)
}

fn shape_of(value: &Value) -> Result<ShapeHandle, String> {
    match value {
        Value::Workplane(w) => Ok(w.val()),
        Value::Assembly(a) => Ok(a.to_compound()),
        Value::Shape(s) => Ok(s.clone()),
        Value::Wrapped(w) => Ok(w.wrapped.clone().unwrap_or_default()),
        other => Err(format!("'{}' is not a shape", other.type_name())),
    }
}

fn translate(value: &Value, offset: [f64; 3]) -> Result<Value, String> {
    match value {
        Value::Workplane(w) => Ok(Value::Workplane(Workplane {
            stack: w.stack.iter().map(|s| s.translated(offset)).collect(),
        })),
        Value::Assembly(a) => Ok(Value::Assembly(Assembly {
            parts: a
                .parts
                .iter()
                .map(|(n, s)| (n.clone(), s.translated(offset)))
                .collect(),
        })),
        Value::Shape(s) => Ok(Value::Shape(s.translated(offset))),
        other => Err(format!("cannot translate '{}'", other.type_name())),
    }
}
