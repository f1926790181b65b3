//! Native callables exposed to scripts by name.

use std::{collections::BTreeMap, fmt, rc::Rc};

use rhai::Dynamic;

use crate::{
    MAX_NATIVE_ARGS,
    context::CallContext,
    error::{BridgeError, BridgeResult},
    value::{NativeValue, ValueKind},
};

/// Namespace of functions callable without a module prefix.
pub const GLOBAL_NAMESPACE: &str = "global";

/// Signature of a native callable.
pub type NativeFn = Rc<dyn Fn(&mut CallContext<'_>, &[NativeValue]) -> BridgeResult<NativeValue>>;

/// Number of arguments a function takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many.
    Fixed(usize),
    /// Anything from zero up to the bridge's argument limit.
    Variadic,
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Variadic => write!(f, "0 to {MAX_NATIVE_ARGS}"),
        }
    }
}

/// A native function and its declared parameters.
#[derive(Clone)]
pub struct FunctionDescriptor {
    name: String,
    arity: Arity,
    params: Vec<ValueKind>,
    func: NativeFn,
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl FunctionDescriptor {
    /// A function taking exactly `params.len()` arguments of the given kinds.
    pub fn new<F>(name: impl Into<String>, params: &[ValueKind], func: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[NativeValue]) -> BridgeResult<NativeValue> + 'static,
    {
        Self {
            name: name.into(),
            arity: Arity::Fixed(params.len()),
            params: params.to_vec(),
            func: Rc::new(func),
        }
    }

    /// A function taking any number of arguments of any kind.
    pub fn variadic<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[NativeValue]) -> BridgeResult<NativeValue> + 'static,
    {
        Self {
            name: name.into(),
            arity: Arity::Variadic,
            params: Vec::new(),
            func: Rc::new(func),
        }
    }

    /// Name the function is bound under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared arity.
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Marshal script arguments, then run the callable.
    pub(crate) fn invoke(&self, ctx: &mut CallContext<'_>, args: &[Dynamic]) -> BridgeResult<NativeValue> {
        let native = match self.arity {
            Arity::Fixed(_) => {
                if args.len() != self.params.len() {
                    return Err(BridgeError::arity(&self.name, self.arity.to_string(), args.len()));
                }
                self.params
                    .iter()
                    .zip(args)
                    .map(|(kind, arg)| ctx.to_native(arg, *kind))
                    .collect::<BridgeResult<Vec<_>>>()?
            }
            Arity::Variadic => args
                .iter()
                .map(|arg| ctx.to_native(arg, ValueKind::Any))
                .collect::<BridgeResult<Vec<_>>>()?,
        };
        (self.func)(ctx, &native)
    }
}

/// Functions registered in one session, grouped by namespace.
#[derive(Default)]
pub(crate) struct FunctionRegistry {
    namespaces: BTreeMap<String, BTreeMap<String, Rc<FunctionDescriptor>>>,
}

impl FunctionRegistry {
    pub(crate) fn register(
        &mut self,
        namespace: &str,
        descriptor: FunctionDescriptor,
    ) -> BridgeResult<Rc<FunctionDescriptor>> {
        let functions = self.namespaces.entry(namespace.to_string()).or_default();
        if functions.contains_key(&descriptor.name) {
            return Err(BridgeError::DuplicateFunction {
                namespace: namespace.to_string(),
                name: descriptor.name,
            });
        }
        let descriptor = Rc::new(descriptor);
        functions.insert(descriptor.name.clone(), descriptor.clone());
        Ok(descriptor)
    }

    pub(crate) fn contains(&self, namespace: &str, name: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|functions| functions.contains_key(name))
    }

    /// Every function in a namespace, by name.
    pub(crate) fn namespace(&self, namespace: &str) -> impl Iterator<Item = &Rc<FunctionDescriptor>> {
        self.namespaces
            .get(namespace)
            .into_iter()
            .flat_map(|functions| functions.values())
    }

    pub(crate) fn len(&self) -> usize {
        self.namespaces.values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(name: &str) -> FunctionDescriptor {
        FunctionDescriptor::new(name, &[], |_, _| Ok(NativeValue::Number(1.0)))
    }

    #[test]
    fn test_duplicate_in_same_namespace() {
        let mut registry = FunctionRegistry::default();
        registry.register(GLOBAL_NAMESPACE, constant("one")).unwrap();
        registry.register("math", constant("one")).unwrap();
        assert_eq!(
            registry.register("math", constant("one")).unwrap_err(),
            BridgeError::DuplicateFunction {
                namespace: "math".into(),
                name: "one".into()
            }
        );
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("math", "one"));
        assert!(!registry.contains("math", "two"));
    }

    #[test]
    fn test_arity_display() {
        assert_eq!(Arity::Fixed(2).to_string(), "2");
        assert_eq!(
            Arity::Variadic.to_string(),
            format!("0 to {MAX_NATIVE_ARGS}")
        );
        assert_eq!(constant("one").arity(), Arity::Fixed(0));
    }
}
