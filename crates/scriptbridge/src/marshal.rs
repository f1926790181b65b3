//! Conversion between [`NativeValue`] and the interpreter's [`Dynamic`].

use std::rc::Rc;

use rhai::{Dynamic, INT, ImmutableString};

use crate::{
    error::{BridgeError, BridgeResult},
    heap::{ObjectHandle, ObjectHeap, ScriptAnchor},
    types::TypeId,
    value::{NativeValue, ValueKind},
};

/// Interpreter-visible type name of every native object.
pub const OBJECT_TYPE_NAME: &str = "NativeObject";

/// Largest integer magnitude that converts to `f64` without rounding.
const MAX_EXACT_INT: u64 = 1 << 53;

/// Script-side wrapper for a native instance.
///
/// Clones share one anchor; the instance is released once every clone held
/// by the interpreter has been dropped.
#[derive(Debug, Clone)]
pub struct ScriptObject {
    handle: ObjectHandle,
    type_id: TypeId,
    _anchor: Rc<ScriptAnchor>,
}

impl ScriptObject {
    /// Handle of the wrapped instance.
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }
}

/// Convert a host value for the interpreter.
pub(crate) fn to_script(heap: &mut ObjectHeap, value: &NativeValue) -> BridgeResult<Dynamic> {
    Ok(match value {
        NativeValue::Number(n) => Dynamic::from_float(*n),
        NativeValue::Boolean(b) => Dynamic::from_bool(*b),
        NativeValue::String(s) => Dynamic::from(ImmutableString::from(s.as_str())),
        NativeValue::Null => Dynamic::UNIT,
        NativeValue::Object(handle) => {
            let type_id = heap.type_of(*handle)?;
            let anchor = heap.anchor(*handle)?;
            Dynamic::from(ScriptObject {
                handle: *handle,
                type_id,
                _anchor: anchor,
            })
        }
    })
}

/// Convert an interpreter value for the host, checking it against `expected`.
pub(crate) fn to_native(
    heap: &ObjectHeap,
    value: &Dynamic,
    expected: ValueKind,
) -> BridgeResult<NativeValue> {
    let native = classify(value)
        .ok_or_else(|| BridgeError::type_mismatch(expected, describe(value)))?;
    if !expected.accepts(native.kind()) {
        return Err(BridgeError::type_mismatch(expected, native.kind().name()));
    }
    if let NativeValue::Object(handle) = native {
        heap.type_of(handle)?;
    }
    Ok(native)
}

fn classify(value: &Dynamic) -> Option<NativeValue> {
    if value.is_unit() {
        return Some(NativeValue::Null);
    }
    if let Ok(b) = value.as_bool() {
        return Some(NativeValue::Boolean(b));
    }
    if let Ok(f) = value.as_float() {
        return Some(NativeValue::Number(f64::from(f)));
    }
    if let Ok(i) = value.as_int() {
        return exact_int(i).map(NativeValue::Number);
    }
    if value.is_string() {
        return value.clone().into_string().ok().map(NativeValue::String);
    }
    value
        .read_lock::<ScriptObject>()
        .map(|obj| NativeValue::Object(obj.handle))
}

fn exact_int(i: INT) -> Option<f64> {
    (i.unsigned_abs() <= MAX_EXACT_INT).then_some(i as f64)
}

/// Diagnostic name for a value that has no native counterpart.
fn describe(value: &Dynamic) -> String {
    match value.as_int() {
        Ok(i) => format!("integer {i} (not exactly representable)"),
        Err(_) => value.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_convert_both_ways() {
        let mut heap = ObjectHeap::new();
        for value in [
            NativeValue::Number(0.1),
            NativeValue::Boolean(true),
            NativeValue::from("hello"),
            NativeValue::Null,
        ] {
            let script = to_script(&mut heap, &value).unwrap();
            assert_eq!(to_native(&heap, &script, ValueKind::Any).unwrap(), value);
        }
    }

    #[test]
    fn test_float_is_bit_exact() {
        let heap = ObjectHeap::new();
        let x = 0.1_f64 + 0.2;
        let native = to_native(&heap, &Dynamic::from_float(x), ValueKind::Number).unwrap();
        assert_eq!(native.as_number().unwrap().to_bits(), x.to_bits());
    }

    #[test]
    fn test_integers_are_accepted_only_when_exact() {
        let heap = ObjectHeap::new();
        assert_eq!(
            to_native(&heap, &Dynamic::from_int(42), ValueKind::Number).unwrap(),
            NativeValue::Number(42.0)
        );
        let big = Dynamic::from_int((1 << 53) + 1);
        assert!(matches!(
            to_native(&heap, &big, ValueKind::Number),
            Err(BridgeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_kind_mismatch_is_reported() {
        let heap = ObjectHeap::new();
        match to_native(&heap, &Dynamic::from_bool(true), ValueKind::Number) {
            Err(BridgeError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, ValueKind::Number);
                assert_eq!(found, "boolean");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_values_are_rejected() {
        let heap = ObjectHeap::new();
        let array = Dynamic::from_array(vec![Dynamic::from_int(1)]);
        assert!(matches!(
            to_native(&heap, &array, ValueKind::Any),
            Err(BridgeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_objects_share_an_anchor_and_detect_staleness() {
        let mut heap = ObjectHeap::new();
        let handle = heap.insert(TypeId(0), Box::new(1.0_f64), false);
        let script = to_script(&mut heap, &NativeValue::Object(handle)).unwrap();
        assert_eq!(
            to_native(&heap, &script, ValueKind::Object).unwrap(),
            NativeValue::Object(handle)
        );
        heap.clear();
        assert_eq!(
            to_native(&heap, &script, ValueKind::Object),
            Err(BridgeError::StaleHandle(handle))
        );
        assert_eq!(
            to_script(&mut heap, &NativeValue::Object(handle)).unwrap_err(),
            BridgeError::StaleHandle(handle)
        );
    }
}
