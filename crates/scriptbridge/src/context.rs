use std::{any::Any, rc::Rc};

use rand::rngs::StdRng;
use rhai::Dynamic;

use crate::{
    error::{BridgeError, BridgeResult},
    heap::{ObjectHandle, ObjectHeap},
    marshal,
    types::{TypeDescriptor, TypeId, TypeRegistry},
    value::{NativeValue, ValueKind},
};

/// Access to session state for a native callable while it runs.
///
/// Objects allocated through the context and not handed back to the script
/// are reclaimed when the call returns.
pub struct CallContext<'a> {
    heap: &'a mut ObjectHeap,
    types: &'a TypeRegistry,
    rng: &'a mut StdRng,
    fresh: Vec<ObjectHandle>,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(
        heap: &'a mut ObjectHeap,
        types: &'a TypeRegistry,
        rng: &'a mut StdRng,
    ) -> Self {
        Self {
            heap,
            types,
            rng,
            fresh: Vec::new(),
        }
    }

    /// Copy of the instance behind an object value.
    pub fn get<T: Clone + 'static>(&self, value: &NativeValue) -> BridgeResult<T> {
        self.get_handle(value.as_object()?)
    }

    /// Copy of the instance behind a handle.
    pub fn get_handle<T: Clone + 'static>(&self, handle: ObjectHandle) -> BridgeResult<T> {
        let actual = self.heap.type_of(handle)?;
        if self.types.id_of::<T>() != Some(actual) {
            return Err(BridgeError::type_mismatch(
                ValueKind::Object,
                self.types.name_of(actual),
            ));
        }
        self.heap.get::<T>(handle).cloned()
    }

    /// Whether `value` is a live instance of the type registered for `T`.
    pub fn is<T: 'static>(&self, value: &NativeValue) -> bool {
        let NativeValue::Object(handle) = value else {
            return false;
        };
        match (self.types.id_of::<T>(), self.heap.type_of(*handle)) {
            (Some(expected), Ok(actual)) => expected == actual,
            _ => false,
        }
    }

    /// Registered type name of an object value.
    pub fn type_name(&self, value: &NativeValue) -> BridgeResult<String> {
        let handle = value.as_object()?;
        Ok(self.types.name_of(self.heap.type_of(handle)?))
    }

    /// Allocate a new instance of a registered type.
    pub fn alloc<T: 'static>(&mut self, value: T) -> BridgeResult<NativeValue> {
        let type_id = self.types.id_of::<T>().ok_or_else(|| {
            BridgeError::InvalidState(format!(
                "{} is not a registered type",
                std::any::type_name::<T>()
            ))
        })?;
        Ok(NativeValue::Object(self.insert(type_id, Box::new(value))))
    }

    /// Number of native instances alive in the session.
    pub fn live_objects(&self) -> usize {
        self.heap.len()
    }

    /// Session random number generator.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut *self.rng
    }

    pub(crate) fn descriptor(&self, handle: ObjectHandle) -> BridgeResult<Rc<TypeDescriptor>> {
        self.descriptor_by_id(self.heap.type_of(handle)?)
    }

    pub(crate) fn descriptor_by_id(&self, type_id: TypeId) -> BridgeResult<Rc<TypeDescriptor>> {
        self.types
            .get(type_id)
            .ok_or_else(|| BridgeError::InvalidState(format!("unregistered type {type_id:?}")))
    }

    pub(crate) fn heap(&self) -> &ObjectHeap {
        &*self.heap
    }

    pub(crate) fn heap_mut(&mut self) -> &mut ObjectHeap {
        &mut *self.heap
    }

    pub(crate) fn insert(&mut self, type_id: TypeId, value: Box<dyn Any>) -> ObjectHandle {
        let handle = self.heap.insert(type_id, value, false);
        self.fresh.push(handle);
        handle
    }

    pub(crate) fn to_native(&self, value: &Dynamic, expected: ValueKind) -> BridgeResult<NativeValue> {
        marshal::to_native(&*self.heap, value, expected)
    }

    pub(crate) fn to_script(&mut self, value: &NativeValue) -> BridgeResult<Dynamic> {
        marshal::to_script(&mut *self.heap, value)
    }

    /// Allocations made during this call.
    pub(crate) fn into_fresh(self) -> Vec<ObjectHandle> {
        self.fresh
    }
}
