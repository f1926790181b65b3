//! Native type descriptors and the per-session type registry.

use std::{any, any::Any, collections::HashMap, fmt, marker::PhantomData, rc::Rc};

use crate::{
    context::CallContext,
    error::{BridgeError, BridgeResult},
    heap::ObjectHandle,
    value::{NativeValue, ValueKind},
};

/// Identifier of a registered native type, dense within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

/// Operators a native type can overload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
    /// `-a`
    Neg,
    /// `a == b`
    Eq,
    /// `a != b`
    Ne,
}

impl Operator {
    /// Binary operators, in registration order.
    pub const BINARY: [Operator; 6] = [
        Operator::Add,
        Operator::Sub,
        Operator::Mul,
        Operator::Div,
        Operator::Eq,
        Operator::Ne,
    ];

    /// Script-level symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub | Self::Neg => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

type ConstructorFn = Rc<dyn Fn(&mut CallContext<'_>, &[NativeValue]) -> BridgeResult<Box<dyn Any>>>;
type GetterFn = Rc<dyn Fn(&dyn Any) -> BridgeResult<NativeValue>>;
type SetterFn = Rc<dyn Fn(&mut dyn Any, NativeValue) -> BridgeResult<()>>;
type MethodFn =
    Rc<dyn Fn(&mut CallContext<'_>, ObjectHandle, &[NativeValue]) -> BridgeResult<NativeValue>>;
type OperatorFn =
    Rc<dyn Fn(&mut CallContext<'_>, &NativeValue, &NativeValue) -> BridgeResult<NativeValue>>;
type DisplayFn = Rc<dyn Fn(&dyn Any) -> String>;

/// Kind of an operator operand, plus its registered type for objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Operand {
    kind: ValueKind,
    type_id: Option<TypeId>,
}

impl Operand {
    pub(crate) fn value(kind: ValueKind) -> Self {
        Self {
            kind,
            type_id: None,
        }
    }

    pub(crate) fn object(type_id: TypeId) -> Self {
        Self {
            kind: ValueKind::Object,
            type_id: Some(type_id),
        }
    }

    pub(crate) fn type_id(self) -> Option<TypeId> {
        self.type_id
    }

    fn matches(self, declared: ValueKind, owner: TypeId) -> bool {
        declared.accepts(self.kind)
            && (self.kind != ValueKind::Object || self.type_id == Some(owner))
    }
}

/// Check `args` against declared parameter kinds.
pub(crate) fn check_args(name: &str, params: &[ValueKind], args: &[NativeValue]) -> BridgeResult<()> {
    if params.len() != args.len() {
        return Err(BridgeError::arity(name, params.len().to_string(), args.len()));
    }
    params
        .iter()
        .zip(args)
        .try_for_each(|(kind, arg)| arg.expect_kind(*kind))
}

fn downcast<T: 'static>(value: &dyn Any) -> BridgeResult<&T> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| BridgeError::type_mismatch(ValueKind::Object, "object of another type"))
}

fn downcast_mut<T: 'static>(value: &mut dyn Any) -> BridgeResult<&mut T> {
    value
        .downcast_mut::<T>()
        .ok_or_else(|| BridgeError::type_mismatch(ValueKind::Object, "object of another type"))
}

struct Constructor {
    params: Vec<ValueKind>,
    build: ConstructorFn,
}

pub(crate) struct Field {
    pub(crate) kind: ValueKind,
    pub(crate) get: GetterFn,
    pub(crate) set: Option<SetterFn>,
}

pub(crate) struct Method {
    pub(crate) params: Vec<ValueKind>,
    pub(crate) call: MethodFn,
}

struct OperatorEntry {
    op: Operator,
    lhs: ValueKind,
    rhs: Option<ValueKind>,
    apply: OperatorFn,
}

/// Everything the bridge knows about one native type.
///
/// Built with [`TypeBuilder`]; immutable once registered.
pub struct TypeDescriptor {
    name: String,
    rust_type: any::TypeId,
    constructors: Vec<Constructor>,
    fields: HashMap<String, Field>,
    methods: HashMap<String, Method>,
    operators: Vec<OperatorEntry>,
    display: Option<DisplayFn>,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("fields", &self.field_names().collect::<Vec<_>>())
            .field("methods", &self.method_names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl TypeDescriptor {
    /// Name bound in the script's global namespace.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn rust_type(&self) -> any::TypeId {
        self.rust_type
    }

    /// Names of all fields.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Names of all methods.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Pick the constructor overload for `args` and build an instance.
    pub(crate) fn construct(
        &self,
        ctx: &mut CallContext<'_>,
        args: &[NativeValue],
    ) -> BridgeResult<Box<dyn Any>> {
        let mut candidates = self
            .constructors
            .iter()
            .filter(|c| c.params.len() == args.len())
            .peekable();
        let Some(first) = candidates.peek().map(|c| &c.params) else {
            let mut arities: Vec<_> = self.constructors.iter().map(|c| c.params.len()).collect();
            arities.sort_unstable();
            arities.dedup();
            let expected = arities
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(" or ");
            return Err(BridgeError::arity(&self.name, expected, args.len()));
        };
        let first_error = check_args(&self.name, first, args).err();
        for ctor in candidates {
            if check_args(&self.name, &ctor.params, args).is_ok() {
                return (ctor.build)(ctx, args);
            }
        }
        Err(first_error.unwrap_or_else(|| BridgeError::arity(&self.name, "?", args.len())))
    }

    pub(crate) fn field(&self, name: &str) -> BridgeResult<&Field> {
        self.fields.get(name).ok_or_else(|| BridgeError::UnknownField {
            type_name: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub(crate) fn method(&self, name: &str) -> BridgeResult<&Method> {
        self.methods.get(name).ok_or_else(|| BridgeError::UnknownMethod {
            type_name: self.name.clone(),
            method: name.to_string(),
        })
    }

    /// Find the operator entry matching the operands, in declaration order.
    /// An object operand only matches when it is an instance of `owner`, the
    /// id this descriptor was registered under.
    pub(crate) fn operator(
        &self,
        op: Operator,
        owner: TypeId,
        lhs: Operand,
        rhs: Option<Operand>,
    ) -> Option<&OperatorFn> {
        self.operators
            .iter()
            .find(|e| {
                e.op == op
                    && lhs.matches(e.lhs, owner)
                    && match (e.rhs, rhs) {
                        (Some(expected), Some(found)) => found.matches(expected, owner),
                        (None, None) => true,
                        _ => false,
                    }
            })
            .map(|e| &e.apply)
    }

    pub(crate) fn unsupported(&self, op: Operator, operands: String) -> BridgeError {
        BridgeError::UnsupportedOperator {
            type_name: self.name.clone(),
            operator: op.symbol().to_string(),
            operands,
        }
    }

    pub(crate) fn display(&self, value: &dyn Any, handle: ObjectHandle) -> String {
        match &self.display {
            Some(display) => display(value),
            None => format!("{}{}", self.name, handle),
        }
    }
}

/// Typed builder for a [`TypeDescriptor`].
///
/// ```ignore
/// let desc = TypeBuilder::<Point>::new("Point")
///     .constructor(&[ValueKind::Number, ValueKind::Number], |_, args| {
///         Ok(Point::new(args[0].as_number()?, args[1].as_number()?))
///     })
///     .field("x", ValueKind::Number, |p| p.x.into(), |p, v| { p.x = v.as_number()?; Ok(()) })
///     .build();
/// ```
pub struct TypeBuilder<T> {
    descriptor: TypeDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> TypeBuilder<T> {
    /// Start describing a type bound under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: TypeDescriptor {
                name: name.into(),
                rust_type: any::TypeId::of::<T>(),
                constructors: Vec::new(),
                fields: HashMap::new(),
                methods: HashMap::new(),
                operators: Vec::new(),
                display: None,
            },
            _marker: PhantomData,
        }
    }

    /// Add a constructor overload. Overloads are selected by arity, then by
    /// parameter kinds in declaration order.
    pub fn constructor<F>(mut self, params: &[ValueKind], build: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[NativeValue]) -> BridgeResult<T> + 'static,
    {
        self.descriptor.constructors.push(Constructor {
            params: params.to_vec(),
            build: Rc::new(move |ctx, args| Ok(Box::new(build(ctx, args)?) as Box<dyn Any>)),
        });
        self
    }

    /// Add a readable and writable field.
    pub fn field<G, S>(mut self, name: impl Into<String>, kind: ValueKind, get: G, set: S) -> Self
    where
        G: Fn(&T) -> NativeValue + 'static,
        S: Fn(&mut T, NativeValue) -> BridgeResult<()> + 'static,
    {
        self.descriptor.fields.insert(
            name.into(),
            Field {
                kind,
                get: Rc::new(move |value| Ok(get(downcast::<T>(value)?))),
                set: Some(Rc::new(move |value, new| set(downcast_mut::<T>(value)?, new))),
            },
        );
        self
    }

    /// Add a field scripts can read but not assign.
    pub fn readonly_field<G>(mut self, name: impl Into<String>, kind: ValueKind, get: G) -> Self
    where
        G: Fn(&T) -> NativeValue + 'static,
    {
        self.descriptor.fields.insert(
            name.into(),
            Field {
                kind,
                get: Rc::new(move |value| Ok(get(downcast::<T>(value)?))),
                set: None,
            },
        );
        self
    }

    /// Add a method. The receiver is passed by reference to a copy of the
    /// instance, so the callable is free to allocate new objects.
    pub fn method<F>(mut self, name: impl Into<String>, params: &[ValueKind], call: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &T, &[NativeValue]) -> BridgeResult<NativeValue> + 'static,
    {
        self.descriptor.methods.insert(
            name.into(),
            Method {
                params: params.to_vec(),
                call: Rc::new(move |ctx, handle, args| {
                    let this = ctx.get_handle::<T>(handle)?;
                    call(ctx, &this, args)
                }),
            },
        );
        self
    }

    /// Add a binary operator entry for the given operand kinds.
    pub fn operator<F>(mut self, op: Operator, lhs: ValueKind, rhs: ValueKind, apply: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &NativeValue, &NativeValue) -> BridgeResult<NativeValue>
            + 'static,
    {
        self.descriptor.operators.push(OperatorEntry {
            op,
            lhs,
            rhs: Some(rhs),
            apply: Rc::new(apply),
        });
        self
    }

    /// Add a unary operator entry.
    pub fn unary_operator<F>(mut self, op: Operator, apply: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &NativeValue) -> BridgeResult<NativeValue> + 'static,
    {
        self.descriptor.operators.push(OperatorEntry {
            op,
            lhs: ValueKind::Object,
            rhs: None,
            apply: Rc::new(move |ctx, operand, _| apply(ctx, operand)),
        });
        self
    }

    /// Text used by `print` and string interpolation.
    pub fn display<F>(mut self, display: F) -> Self
    where
        F: Fn(&T) -> String + 'static,
    {
        self.descriptor.display = Some(Rc::new(move |value| match value.downcast_ref::<T>() {
            Some(v) => display(v),
            None => String::from("<invalid>"),
        }));
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

/// All types registered in one session.
#[derive(Default)]
pub(crate) struct TypeRegistry {
    types: Vec<Rc<TypeDescriptor>>,
    by_name: HashMap<String, TypeId>,
    by_rust: HashMap<any::TypeId, TypeId>,
}

impl TypeRegistry {
    pub(crate) fn register(
        &mut self,
        descriptor: TypeDescriptor,
    ) -> BridgeResult<(TypeId, Rc<TypeDescriptor>)> {
        if self.by_name.contains_key(&descriptor.name)
            || self.by_rust.contains_key(&descriptor.rust_type)
        {
            return Err(BridgeError::DuplicateType(descriptor.name));
        }
        let id = TypeId(u32::try_from(self.types.len()).unwrap_or(u32::MAX));
        self.by_name.insert(descriptor.name.clone(), id);
        self.by_rust.insert(descriptor.rust_type(), id);
        let descriptor = Rc::new(descriptor);
        self.types.push(descriptor.clone());
        Ok((id, descriptor))
    }

    pub(crate) fn get(&self, id: TypeId) -> Option<Rc<TypeDescriptor>> {
        self.types.get(id.0 as usize).cloned()
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn id_of<T: 'static>(&self) -> Option<TypeId> {
        self.by_rust.get(&any::TypeId::of::<T>()).copied()
    }

    pub(crate) fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.types.len()
    }

    pub(crate) fn name_of(&self, id: TypeId) -> String {
        self.get(id)
            .map(|d| d.name().to_string())
            .unwrap_or_else(|| format!("type#{}", id.0))
    }
}
