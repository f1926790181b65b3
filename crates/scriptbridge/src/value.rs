use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{BridgeError, BridgeResult},
    heap::ObjectHandle,
};

/// A value as seen by native code on the host side of the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NativeValue {
    /// IEEE-754 double.
    Number(f64),
    /// Boolean.
    Boolean(bool),
    /// Owned string.
    String(String),
    /// Reference to a live instance of a registered native type.
    Object(ObjectHandle),
    /// Absence of a value.
    Null,
}

/// The kind of a value, used to declare what a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueKind {
    /// A number.
    Number,
    /// A boolean.
    Boolean,
    /// A string.
    String,
    /// A native object handle.
    Object,
    /// The unit value.
    Null,
    /// Any representable value.
    Any,
}

impl ValueKind {
    /// Whether a value of kind `found` satisfies this expected kind.
    pub fn accepts(self, found: ValueKind) -> bool {
        self == ValueKind::Any || self == found
    }

    /// Lowercase name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Object => "object",
            Self::Null => "null",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl NativeValue {
    /// Runtime kind of this value. Never [`ValueKind::Any`].
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::String(_) => ValueKind::String,
            Self::Object(_) => ValueKind::Object,
            Self::Null => ValueKind::Null,
        }
    }

    /// Check this value against an expected kind.
    pub fn expect_kind(&self, expected: ValueKind) -> BridgeResult<()> {
        if expected.accepts(self.kind()) {
            Ok(())
        } else {
            Err(BridgeError::type_mismatch(expected, self.kind().name()))
        }
    }

    /// The number, or a `TypeMismatch`.
    pub fn as_number(&self) -> BridgeResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            other => Err(BridgeError::type_mismatch(
                ValueKind::Number,
                other.kind().name(),
            )),
        }
    }

    /// The boolean, or a `TypeMismatch`.
    pub fn as_bool(&self) -> BridgeResult<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            other => Err(BridgeError::type_mismatch(
                ValueKind::Boolean,
                other.kind().name(),
            )),
        }
    }

    /// The string, or a `TypeMismatch`.
    pub fn as_str(&self) -> BridgeResult<&str> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(BridgeError::type_mismatch(
                ValueKind::String,
                other.kind().name(),
            )),
        }
    }

    /// The object handle, or a `TypeMismatch`.
    pub fn as_object(&self) -> BridgeResult<ObjectHandle> {
        match self {
            Self::Object(h) => Ok(*h),
            other => Err(BridgeError::type_mismatch(
                ValueKind::Object,
                other.kind().name(),
            )),
        }
    }

    /// True for [`NativeValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::String(s) => f.write_str(s),
            Self::Object(h) => write!(f, "{h}"),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<f64> for NativeValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<ObjectHandle> for NativeValue {
    fn from(h: ObjectHandle) -> Self {
        Self::Object(h)
    }
}

impl From<()> for NativeValue {
    fn from(_: ()) -> Self {
        Self::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_acceptance() {
        assert!(ValueKind::Any.accepts(ValueKind::Object));
        assert!(ValueKind::Number.accepts(ValueKind::Number));
        assert!(!ValueKind::Number.accepts(ValueKind::String));
    }

    #[test]
    fn test_accessor_mismatch() {
        let v = NativeValue::from("hello");
        match v.as_number() {
            Err(BridgeError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, ValueKind::Number);
                assert_eq!(found, "string");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(v.as_str().unwrap(), "hello");
    }

    #[test]
    fn test_serialization_is_untagged() {
        let json = serde_json::to_string(&NativeValue::Number(1.5)).unwrap();
        assert_eq!(json, "1.5");
        let json = serde_json::to_string(&NativeValue::Null).unwrap();
        assert_eq!(json, "null");
        let parsed: NativeValue = serde_json::from_str("true").unwrap();
        assert_eq!(parsed, NativeValue::Boolean(true));
    }
}
