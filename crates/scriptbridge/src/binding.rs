//! Installs registry entries into the Rhai engine.
//!
//! Rhai resolves functions by name and parameter types, while native
//! callables declare parameter kinds at runtime. Every entry point is therefore
//! registered once per arity with `Dynamic` parameters and dispatches through
//! the descriptors, so argument errors surface as typed bridge errors rather
//! than interpreter lookup failures.

use std::{cell::RefCell, rc::Rc};

use rand::rngs::StdRng;
use rhai::{Dynamic, Engine, EvalAltResult, Module};

use crate::{
    context::CallContext,
    error::{BridgeError, BridgeResult},
    functions::FunctionDescriptor,
    heap::ObjectHeap,
    marshal::{OBJECT_TYPE_NAME, ScriptObject},
    types::{Operand, Operator, TypeDescriptor, TypeId, TypeRegistry, check_args},
    value::{NativeValue, ValueKind},
};

type RhaiResult = Result<Dynamic, Box<EvalAltResult>>;
type Dispatch = Rc<dyn Fn(Vec<Dynamic>) -> RhaiResult>;
type MethodDispatch = Rc<dyn Fn(&ScriptObject, Vec<Dynamic>) -> RhaiResult>;

/// Register `$dispatch` under `$name` for every arity up to `MAX_NATIVE_ARGS`.
macro_rules! register_arities {
    ($target:ident . $register:ident ($name:expr, $dispatch:expr)) => {{
        let name: &str = $name;
        let d = $dispatch.clone();
        $target.$register(name, move || d(Vec::new()));
        let d = $dispatch.clone();
        $target.$register(name, move |a: Dynamic| d(vec![a]));
        let d = $dispatch.clone();
        $target.$register(name, move |a: Dynamic, b: Dynamic| d(vec![a, b]));
        let d = $dispatch.clone();
        $target.$register(name, move |a: Dynamic, b: Dynamic, c: Dynamic| d(vec![a, b, c]));
        let d = $dispatch.clone();
        $target.$register(name, move |a: Dynamic, b: Dynamic, c: Dynamic, e: Dynamic| {
            d(vec![a, b, c, e])
        });
        let d = $dispatch.clone();
        $target.$register(
            name,
            move |a: Dynamic, b: Dynamic, c: Dynamic, e: Dynamic, f: Dynamic| {
                d(vec![a, b, c, e, f])
            },
        );
        let d = $dispatch.clone();
        $target.$register(
            name,
            move |a: Dynamic, b: Dynamic, c: Dynamic, e: Dynamic, f: Dynamic, g: Dynamic| {
                d(vec![a, b, c, e, f, g])
            },
        );
    }};
}

/// Same as `register_arities!`, with a native object receiver in front.
macro_rules! register_method_arities {
    ($engine:ident, $name:expr, $dispatch:expr) => {{
        let name: &str = $name;
        let d = $dispatch.clone();
        $engine.register_fn(name, move |this: &mut ScriptObject| d(this, Vec::new()));
        let d = $dispatch.clone();
        $engine.register_fn(name, move |this: &mut ScriptObject, a: Dynamic| d(this, vec![a]));
        let d = $dispatch.clone();
        $engine.register_fn(name, move |this: &mut ScriptObject, a: Dynamic, b: Dynamic| {
            d(this, vec![a, b])
        });
        let d = $dispatch.clone();
        $engine.register_fn(
            name,
            move |this: &mut ScriptObject, a: Dynamic, b: Dynamic, c: Dynamic| {
                d(this, vec![a, b, c])
            },
        );
        let d = $dispatch.clone();
        $engine.register_fn(
            name,
            move |this: &mut ScriptObject, a: Dynamic, b: Dynamic, c: Dynamic, e: Dynamic| {
                d(this, vec![a, b, c, e])
            },
        );
        let d = $dispatch.clone();
        $engine.register_fn(
            name,
            move |this: &mut ScriptObject,
                  a: Dynamic,
                  b: Dynamic,
                  c: Dynamic,
                  e: Dynamic,
                  f: Dynamic| { d(this, vec![a, b, c, e, f]) },
        );
        let d = $dispatch.clone();
        $engine.register_fn(
            name,
            move |this: &mut ScriptObject,
                  a: Dynamic,
                  b: Dynamic,
                  c: Dynamic,
                  e: Dynamic,
                  f: Dynamic,
                  g: Dynamic| { d(this, vec![a, b, c, e, f, g]) },
        );
    }};
}

/// Session state reachable from engine callbacks.
pub(crate) struct Shared {
    pub(crate) heap: RefCell<ObjectHeap>,
    pub(crate) types: RefCell<TypeRegistry>,
    rng: RefCell<StdRng>,
}

impl Shared {
    pub(crate) fn new(rng: StdRng) -> Self {
        Self {
            heap: RefCell::new(ObjectHeap::new()),
            types: RefCell::new(TypeRegistry::default()),
            rng: RefCell::new(rng),
        }
    }

    /// Run `f` with a call context. Released script references are
    /// collected on the way in and out; allocations `f` neither anchored for
    /// the script nor pinned for the host are freed afterwards.
    pub(crate) fn with_context<R>(
        &self,
        f: impl FnOnce(&mut CallContext<'_>) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        let types = self.types.borrow();
        let mut heap = self.heap.borrow_mut();
        heap.collect();
        let mut rng = self.rng.borrow_mut();
        let mut ctx = CallContext::new(&mut heap, &types, &mut rng);
        let result = f(&mut ctx);
        let fresh = ctx.into_fresh();
        heap.sweep(&fresh);
        heap.collect();
        result
    }

    /// Text for `print`, `to_string` and interpolation.
    pub(crate) fn display(&self, object: &ScriptObject) -> String {
        let heap = self.heap.borrow();
        let types = self.types.borrow();
        let handle = object.handle();
        match (heap.get_any(handle), types.get(object.type_id())) {
            (Ok(value), Some(desc)) => desc.display(value, handle),
            _ => format!("<stale {handle}>"),
        }
    }
}

/// Run a native call on behalf of the script and marshal the result back.
fn script_call(
    shared: &Shared,
    f: impl FnOnce(&mut CallContext<'_>) -> BridgeResult<NativeValue>,
) -> RhaiResult {
    shared
        .with_context(|ctx| {
            let value = f(ctx)?;
            ctx.to_script(&value)
        })
        .map_err(BridgeError::into_eval)
}

/// Marshal script arguments against declared kinds. Surplus arguments are
/// marshalled as `Any` so the arity check downstream sees the real count.
fn marshal_all(
    ctx: &CallContext<'_>,
    params: &[ValueKind],
    args: &[Dynamic],
) -> BridgeResult<Vec<NativeValue>> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| ctx.to_native(arg, params.get(i).copied().unwrap_or(ValueKind::Any)))
        .collect()
}

pub(crate) fn construct(
    ctx: &mut CallContext<'_>,
    type_id: TypeId,
    args: &[NativeValue],
) -> BridgeResult<NativeValue> {
    let desc = ctx.descriptor_by_id(type_id)?;
    let value = desc.construct(ctx, args)?;
    Ok(NativeValue::Object(ctx.insert(type_id, value)))
}

pub(crate) fn call_method(
    ctx: &mut CallContext<'_>,
    this: &NativeValue,
    name: &str,
    args: &[NativeValue],
) -> BridgeResult<NativeValue> {
    let handle = this.as_object()?;
    let desc = ctx.descriptor(handle)?;
    let method = desc.method(name)?;
    check_args(&format!("{}.{name}", desc.name()), &method.params, args)?;
    (method.call)(ctx, handle, args)
}

pub(crate) fn get_field(ctx: &CallContext<'_>, this: &NativeValue, name: &str) -> BridgeResult<NativeValue> {
    let handle = this.as_object()?;
    let desc = ctx.descriptor(handle)?;
    let field = desc.field(name)?;
    (field.get)(ctx.heap().get_any(handle)?)
}

pub(crate) fn set_field(
    ctx: &mut CallContext<'_>,
    this: &NativeValue,
    name: &str,
    value: NativeValue,
) -> BridgeResult<()> {
    let handle = this.as_object()?;
    let desc = ctx.descriptor(handle)?;
    let field = desc.field(name)?;
    let Some(set) = &field.set else {
        return Err(BridgeError::UnknownField {
            type_name: desc.name().to_string(),
            field: format!("{name} (read-only)"),
        });
    };
    value.expect_kind(field.kind)?;
    set(ctx.heap_mut().get_any_mut(handle)?, value)
}

fn operand(ctx: &CallContext<'_>, value: &NativeValue) -> BridgeResult<Operand> {
    match value {
        NativeValue::Object(handle) => Ok(Operand::object(ctx.heap().type_of(*handle)?)),
        other => Ok(Operand::value(other.kind())),
    }
}

fn describe_operand(ctx: &CallContext<'_>, value: &NativeValue) -> String {
    match value {
        NativeValue::Object(_) => ctx
            .type_name(value)
            .unwrap_or_else(|_| ValueKind::Object.to_string()),
        other => other.kind().to_string(),
    }
}

/// Resolve an operator through the lhs object's table, then the rhs
/// object's.
fn apply_operator(
    ctx: &mut CallContext<'_>,
    op: Operator,
    lhs: &NativeValue,
    rhs: Option<&NativeValue>,
) -> BridgeResult<NativeValue> {
    let lhs_operand = operand(ctx, lhs)?;
    let rhs_operand = rhs.map(|rhs| operand(ctx, rhs)).transpose()?;
    let mut owner = None;
    for type_id in [Some(lhs_operand), rhs_operand]
        .into_iter()
        .flatten()
        .filter_map(Operand::type_id)
    {
        let desc = ctx.descriptor_by_id(type_id)?;
        if let Some(apply) = desc.operator(op, type_id, lhs_operand, rhs_operand) {
            return apply(ctx, lhs, rhs.unwrap_or(&NativeValue::Null));
        }
        owner.get_or_insert(desc);
    }
    let operands = [Some(lhs), rhs]
        .into_iter()
        .flatten()
        .map(|value| describe_operand(ctx, value))
        .collect::<Vec<_>>()
        .join(", ");
    match owner {
        Some(desc) => Err(desc.unsupported(op, operands)),
        None => Err(BridgeError::UnsupportedOperator {
            type_name: OBJECT_TYPE_NAME.to_string(),
            operator: op.symbol().to_string(),
            operands,
        }),
    }
}

/// Register the object wrapper type and its type-independent entry points.
pub(crate) fn bind_object_type(engine: &mut Engine, shared: &Rc<Shared>) {
    engine.register_type_with_name::<ScriptObject>(OBJECT_TYPE_NAME);

    for name in ["to_string", "to_debug"] {
        let s = shared.clone();
        engine.register_fn(name, move |this: &mut ScriptObject| s.display(this));
    }

    for op in Operator::BINARY {
        let symbol = op.symbol();
        let binary: Rc<dyn Fn(Dynamic, Dynamic) -> RhaiResult> = {
            let s = shared.clone();
            Rc::new(move |lhs: Dynamic, rhs: Dynamic| {
                script_call(&s, |ctx| {
                    let lhs = ctx.to_native(&lhs, ValueKind::Any)?;
                    let rhs = ctx.to_native(&rhs, ValueKind::Any)?;
                    apply_operator(ctx, op, &lhs, Some(&rhs))
                })
            })
        };
        let d = binary.clone();
        engine.register_fn(symbol, move |a: ScriptObject, b: ScriptObject| {
            d(Dynamic::from(a), Dynamic::from(b))
        });
        let d = binary.clone();
        engine.register_fn(symbol, move |a: ScriptObject, b: Dynamic| d(Dynamic::from(a), b));
        let d = binary;
        engine.register_fn(symbol, move |a: Dynamic, b: ScriptObject| d(a, Dynamic::from(b)));
    }

    let s = shared.clone();
    engine.register_fn(Operator::Neg.symbol(), move |a: ScriptObject| {
        script_call(&s, |ctx| {
            apply_operator(ctx, Operator::Neg, &NativeValue::Object(a.handle()), None)
        })
    });
}

/// Bind a registered type's constructor, methods and fields.
pub(crate) fn bind_type(engine: &mut Engine, shared: &Rc<Shared>, type_id: TypeId, desc: &TypeDescriptor) {
    let s = shared.clone();
    let constructor: Dispatch = Rc::new(move |args: Vec<Dynamic>| {
        script_call(&s, |ctx| {
            let args = marshal_all(ctx, &[], &args)?;
            construct(ctx, type_id, &args)
        })
    });
    register_arities!(engine.register_fn(desc.name(), constructor));

    for name in desc.method_names() {
        let s = shared.clone();
        let method = name.to_string();
        let dispatch: MethodDispatch = Rc::new(move |this: &ScriptObject, args: Vec<Dynamic>| {
            script_call(&s, |ctx| {
                let handle = this.handle();
                let desc = ctx.descriptor(handle)?;
                let args = marshal_all(ctx, &desc.method(&method)?.params, &args)?;
                call_method(ctx, &NativeValue::Object(handle), &method, &args)
            })
        });
        register_method_arities!(engine, name, dispatch);
    }

    for name in desc.field_names() {
        let s = shared.clone();
        let field = name.to_string();
        engine.register_get(name, move |this: &mut ScriptObject| {
            script_call(&s, |ctx| get_field(ctx, &NativeValue::Object(this.handle()), &field))
        });

        let s = shared.clone();
        let field = name.to_string();
        engine.register_set(name, move |this: &mut ScriptObject, value: Dynamic| {
            script_call(&s, |ctx| {
                let this = NativeValue::Object(this.handle());
                let desc = ctx.descriptor(this.as_object()?)?;
                let kind = desc.field(&field)?.kind;
                let value = ctx.to_native(&value, kind)?;
                set_field(ctx, &this, &field, value)?;
                Ok(NativeValue::Null)
            })
            .map(|_| ())
        });
    }
}

/// Bind a function in the global namespace.
pub(crate) fn bind_function(engine: &mut Engine, shared: &Rc<Shared>, desc: Rc<FunctionDescriptor>) {
    let dispatch = function_dispatch(shared, desc.clone());
    register_arities!(engine.register_fn(desc.name(), dispatch));
}

/// Rebuild the static module `name` from its functions.
pub(crate) fn bind_module<'a>(
    engine: &mut Engine,
    shared: &Rc<Shared>,
    name: &str,
    functions: impl Iterator<Item = &'a Rc<FunctionDescriptor>>,
) {
    let mut module = Module::new();
    for desc in functions {
        let dispatch = function_dispatch(shared, desc.clone());
        register_arities!(module.set_native_fn(desc.name(), dispatch));
    }
    module.build_index();
    engine.register_static_module(name, module.into());
}

fn function_dispatch(shared: &Rc<Shared>, desc: Rc<FunctionDescriptor>) -> Dispatch {
    let s = shared.clone();
    Rc::new(move |args: Vec<Dynamic>| script_call(&s, |ctx| desc.invoke(ctx, &args)))
}
