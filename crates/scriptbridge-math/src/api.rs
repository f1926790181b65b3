use scriptbridge::{
    BridgeError, BridgeResult, CallContext, FunctionDescriptor, HostApi, NativeValue, Operator,
    Session, TypeBuilder, TypeDescriptor, ValueKind,
};
use tracing::debug;

use crate::{
    functions::{self, integer},
    vector3::Vector3,
};

/// Module the scalar helpers are registered under.
pub const MODULE: &str = "math";

/// Installs [`Vector3`] and the `math` module into a session.
#[derive(Debug, Default, Clone, Copy)]
pub struct MathApi;

impl HostApi for MathApi {
    fn name(&self) -> &str {
        "math"
    }

    fn install(&self, session: &mut Session) -> BridgeResult<()> {
        session.register_type(vector3_type())?;
        let functions = math_functions();
        let count = functions.len();
        for function in functions {
            session.register_module_function(MODULE, function)?;
        }
        debug!(module = MODULE, functions = count, "math API installed");
        Ok(())
    }
}

fn number(args: &[NativeValue], index: usize) -> BridgeResult<f64> {
    args.get(index)
        .ok_or_else(|| BridgeError::type_mismatch(ValueKind::Number, "nothing"))?
        .as_number()
}

fn component(value: NativeValue) -> BridgeResult<f64> {
    let n = value.as_number()?;
    if n.is_finite() {
        Ok(n)
    } else {
        Err(BridgeError::domain(format!("vector component must be finite, got {n}")))
    }
}

fn vector(ctx: &CallContext<'_>, value: &NativeValue) -> BridgeResult<Vector3> {
    ctx.get::<Vector3>(value)
}

/// Type name for objects, kind name otherwise.
fn describe(ctx: &CallContext<'_>, value: &NativeValue) -> BridgeResult<String> {
    match value {
        NativeValue::Object(_) => ctx.type_name(value),
        other => Ok(other.kind().name().to_string()),
    }
}

fn vector_result(ctx: &mut CallContext<'_>, value: BridgeResult<Vector3>) -> BridgeResult<NativeValue> {
    ctx.alloc(value?)
}

/// Descriptor for the script-visible `Vector3` type.
pub fn vector3_type() -> TypeDescriptor {
    use ValueKind::{Number, Object};

    TypeBuilder::<Vector3>::new("Vector3")
        .constructor(&[], |_, _| Ok(Vector3::ZERO))
        .constructor(&[Number, Number, Number], |_, args| {
            Vector3::checked(
                number(args, 0)?,
                number(args, 1)?,
                number(args, 2)?,
                "Vector3",
            )
        })
        .field("x", Number, |v| v.x.into(), |v, n| {
            v.x = component(n)?;
            Ok(())
        })
        .field("y", Number, |v| v.y.into(), |v, n| {
            v.y = component(n)?;
            Ok(())
        })
        .field("z", Number, |v| v.z.into(), |v, n| {
            v.z = component(n)?;
            Ok(())
        })
        .method("length", &[], |_, v, _| Ok(v.length()?.into()))
        .method("length_squared", &[], |_, v, _| Ok(v.length_squared()?.into()))
        .method("normalize", &[], |ctx, v, _| vector_result(ctx, v.normalize()))
        .method("dot", &[Object], |ctx, v, args| {
            Ok(v.dot(vector(ctx, &args[0])?)?.into())
        })
        .method("cross", &[Object], |ctx, v, args| {
            let other = vector(ctx, &args[0])?;
            vector_result(ctx, v.cross(other))
        })
        .method("distance", &[Object], |ctx, v, args| {
            Ok(v.distance(vector(ctx, &args[0])?)?.into())
        })
        .method("rotated", &[Object, Number], |ctx, v, args| {
            let axis = vector(ctx, &args[0])?;
            vector_result(ctx, v.rotated(axis, number(args, 1)?))
        })
        .method("lerp", &[Object, Number], |ctx, v, args| {
            let other = vector(ctx, &args[0])?;
            vector_result(ctx, v.lerp(other, number(args, 1)?))
        })
        .operator(Operator::Add, Object, Object, |ctx, l, r| {
            let (l, r) = (vector(ctx, l)?, vector(ctx, r)?);
            vector_result(ctx, l.add(r))
        })
        .operator(Operator::Sub, Object, Object, |ctx, l, r| {
            let (l, r) = (vector(ctx, l)?, vector(ctx, r)?);
            vector_result(ctx, l.subtract(r))
        })
        .operator(Operator::Mul, Object, Number, |ctx, l, r| {
            let l = vector(ctx, l)?;
            vector_result(ctx, l.scale(r.as_number()?))
        })
        .operator(Operator::Mul, Number, Object, |ctx, l, r| {
            let r = vector(ctx, r)?;
            vector_result(ctx, r.scale(l.as_number()?))
        })
        .operator(Operator::Div, Object, Number, |ctx, l, r| {
            let l = vector(ctx, l)?;
            vector_result(ctx, l.divide(r.as_number()?))
        })
        .operator(Operator::Eq, Object, Object, |ctx, l, r| {
            Ok((vector(ctx, l)? == vector(ctx, r)?).into())
        })
        .operator(Operator::Ne, Object, Object, |ctx, l, r| {
            Ok((vector(ctx, l)? != vector(ctx, r)?).into())
        })
        .unary_operator(Operator::Neg, |ctx, v| {
            let v = vector(ctx, v)?;
            ctx.alloc(v.neg())
        })
        .display(Vector3::to_string)
        .build()
}

/// The `math` module functions.
pub fn math_functions() -> Vec<FunctionDescriptor> {
    use ValueKind::{Any, Number};

    vec![
        FunctionDescriptor::new("radians", &[Number], |_, args| {
            Ok(functions::radians(number(args, 0)?).into())
        }),
        FunctionDescriptor::new("degrees", &[Number], |_, args| {
            Ok(functions::degrees(number(args, 0)?).into())
        }),
        FunctionDescriptor::new("lerp", &[Any, Any, Number], |ctx, args| {
            let t = number(args, 2)?;
            let (a, b) = (&args[0], &args[1]);
            if let (NativeValue::Number(a), NativeValue::Number(b)) = (a, b) {
                return Ok(functions::lerp(*a, *b, t).into());
            }
            if ctx.is::<Vector3>(a) && ctx.is::<Vector3>(b) {
                let (a, b) = (vector(ctx, a)?, vector(ctx, b)?);
                return vector_result(ctx, a.lerp(b, t));
            }
            let (expected, found) = match a {
                NativeValue::Number(_) => (ValueKind::Number, b),
                _ if ctx.is::<Vector3>(a) => (ValueKind::Object, b),
                _ => (ValueKind::Number, a),
            };
            Err(BridgeError::type_mismatch(expected, describe(ctx, found)?))
        }),
        FunctionDescriptor::new("clamp", &[Number, Number, Number], |_, args| {
            Ok(functions::clamp(number(args, 0)?, number(args, 1)?, number(args, 2)?)?.into())
        }),
        FunctionDescriptor::new("random", &[Number, Number], |ctx, args| {
            Ok(functions::random(ctx.rng(), number(args, 0)?, number(args, 1)?)?.into())
        }),
        FunctionDescriptor::new("random_int", &[Number, Number], |ctx, args| {
            let min = integer(number(args, 0)?, "min")?;
            let max = integer(number(args, 1)?, "max")?;
            Ok((functions::random_int(ctx.rng(), min, max)? as f64).into())
        }),
    ]
}
