use std::io;

use rhai::{Dynamic, EvalAltResult, ParseError, Position};
use serde::{Deserialize, Serialize};

use crate::{heap::ObjectHandle, marshal::OBJECT_TYPE_NAME, value::ValueKind};

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by the bridge.
///
/// Every failure at the host/script boundary maps onto exactly one variant.
/// Errors raised by native callables travel through the interpreter unchanged
/// and are recovered when control returns to the host.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// A value's runtime kind cannot satisfy the expected kind.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Kind the receiver required.
        expected: ValueKind,
        /// Description of what was supplied.
        found: String,
    },
    /// Wrong number of arguments for a callable.
    #[error("Arity mismatch for '{name}': expected {expected} argument(s), got {got}")]
    ArityMismatch {
        /// Callable name.
        name: String,
        /// Accepted argument counts.
        expected: String,
        /// Supplied argument count.
        got: usize,
    },
    /// A type with this name is already registered.
    #[error("Duplicate type: {0}")]
    DuplicateType(String),
    /// A function with this name already exists in the namespace.
    #[error("Duplicate function '{name}' in namespace '{namespace}'")]
    DuplicateFunction {
        /// Namespace the function was registered in.
        namespace: String,
        /// Function name.
        name: String,
    },
    /// No operator table entry matches the operands.
    #[error("Unsupported operator '{operator}' for {type_name} ({operands})")]
    UnsupportedOperator {
        /// Type whose table was consulted.
        type_name: String,
        /// Operator symbol.
        operator: String,
        /// Operand type names for objects and kinds otherwise, comma separated.
        operands: String,
    },
    /// The receiver's type has no method with this name.
    ///
    /// When no registered type declares the name at all, the interpreter
    /// rejects the call before it reaches the receiver, and `type_name` is
    /// the wrapper name `NativeObject`.
    #[error("Unknown method '{method}' on {type_name}")]
    UnknownMethod {
        /// Receiver type.
        type_name: String,
        /// Method name.
        method: String,
    },
    /// The receiver's type has no such field, or the field is read-only.
    /// Names no registered type declares report `NativeObject`, as for
    /// [`BridgeError::UnknownMethod`].
    #[error("Unknown field '{field}' on {type_name}")]
    UnknownField {
        /// Receiver type.
        type_name: String,
        /// Field name.
        field: String,
    },
    /// The handle no longer names a live instance.
    #[error("Stale handle: {0}")]
    StaleHandle(ObjectHandle),
    /// An argument is outside the operation's domain.
    #[error("Domain error: {0}")]
    Domain(String),
    /// No script function with this name exists.
    #[error("Undefined function: {0}")]
    UndefinedFunction(String),
    /// The script raised an error.
    #[error("Script error: {message}")]
    ScriptRuntime {
        /// Interpreter diagnostic.
        message: String,
        /// Location in the script, when available.
        location: Option<String>,
    },
    /// The script failed to parse.
    #[error("Parse error: {message}")]
    Parse {
        /// Parser diagnostic.
        message: String,
        /// Location in the script, when available.
        location: Option<String>,
    },
    /// The session has been torn down.
    #[error("Session closed")]
    SessionClosed,
    /// The session has not been initialized.
    #[error("Session not initialized")]
    NotInitialized,
    /// The operation is not valid in the session's current state.
    #[error("Invalid session state: {0}")]
    InvalidState(String),
    /// I/O failure reading a script.
    #[error("IO error: {message}")]
    Io {
        /// Error message details.
        message: String,
    },
}

/// Serializable error details, for hosts that report diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Short error category.
    pub error_type: String,
    /// Human-readable error message.
    pub message: String,
    /// Location in the script, when available.
    pub location: Option<String>,
}

impl BridgeError {
    /// Create a `TypeMismatch` error.
    pub fn type_mismatch(expected: ValueKind, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            found: found.into(),
        }
    }

    /// Create a `Domain` error.
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(message.into())
    }

    /// Create an `ArityMismatch` error.
    pub fn arity(name: impl Into<String>, expected: impl Into<String>, got: usize) -> Self {
        Self::ArityMismatch {
            name: name.into(),
            expected: expected.into(),
            got,
        }
    }

    /// Short, stable category name for this error.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::ArityMismatch { .. } => "arity_mismatch",
            Self::DuplicateType(_) => "duplicate_type",
            Self::DuplicateFunction { .. } => "duplicate_function",
            Self::UnsupportedOperator { .. } => "unsupported_operator",
            Self::UnknownMethod { .. } => "unknown_method",
            Self::UnknownField { .. } => "unknown_field",
            Self::StaleHandle(_) => "stale_handle",
            Self::Domain(_) => "domain",
            Self::UndefinedFunction(_) => "undefined_function",
            Self::ScriptRuntime { .. } => "runtime",
            Self::Parse { .. } => "parse",
            Self::SessionClosed => "session_closed",
            Self::NotInitialized => "not_initialized",
            Self::InvalidState(_) => "invalid_state",
            Self::Io { .. } => "io",
        }
    }

    /// Convert to a structured, serializable form.
    pub fn info(&self) -> ErrorInfo {
        let location = match self {
            Self::ScriptRuntime { location, .. } | Self::Parse { location, .. } => {
                location.clone()
            }
            _ => None,
        };
        ErrorInfo {
            error_type: self.kind_name().to_string(),
            message: self.to_string(),
            location,
        }
    }

    /// Wrap this error so it can be raised from a native callable.
    ///
    /// The interpreter carries the value opaquely; [`BridgeError::from_eval`]
    /// recovers it on the way out.
    pub(crate) fn into_eval(self) -> Box<EvalAltResult> {
        EvalAltResult::ErrorRuntime(Dynamic::from(self), Position::NONE).into()
    }

    /// Translate an interpreter error into a bridge error.
    ///
    /// A bridge error raised by a native callable anywhere in the call chain
    /// wins over the interpreter's own wrapping.
    pub(crate) fn from_eval(err: &EvalAltResult) -> Self {
        if let Some(inner) = find_bridge_error(err) {
            return inner;
        }
        if let EvalAltResult::ErrorFunctionNotFound(signature, _) = err
            && let Some(member) = member_of_native_object(signature)
        {
            let type_name = OBJECT_TYPE_NAME.to_string();
            return match member.strip_prefix("get$").or_else(|| member.strip_prefix("set$")) {
                Some(field) => Self::UnknownField {
                    type_name,
                    field: field.to_string(),
                },
                None => Self::UnknownMethod {
                    type_name,
                    method: member,
                },
            };
        }
        if let EvalAltResult::ErrorDotExpr(message, _) = err
            && let Some(field) = property_of_native_object(message)
        {
            return Self::UnknownField {
                type_name: OBJECT_TYPE_NAME.to_string(),
                field,
            };
        }
        Self::ScriptRuntime {
            message: err.to_string(),
            location: format_location(err.position()),
        }
    }

    pub(crate) fn from_parse(err: &ParseError) -> Self {
        Self::Parse {
            message: err.to_string(),
            location: format_location(err.position()),
        }
    }
}

impl From<io::Error> for BridgeError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

fn find_bridge_error(err: &EvalAltResult) -> Option<BridgeError> {
    match err {
        EvalAltResult::ErrorRuntime(value, _) => value.clone().try_cast::<BridgeError>(),
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => find_bridge_error(inner),
        EvalAltResult::ErrorInModule(_, inner, _) => find_bridge_error(inner),
        _ => None,
    }
}

/// Extract the function name from a "function not found" signature whose
/// receiver is a native object, e.g. `frobnicate (NativeObject, i64)`.
fn member_of_native_object(signature: &str) -> Option<String> {
    let (name, args) = signature.split_once(" (")?;
    let first = args.trim_end_matches(')').split(',').next()?.trim();
    let first = first.strip_prefix("&mut ").unwrap_or(first);
    (first == OBJECT_TYPE_NAME).then(|| name.trim().to_string())
}

/// Extract the property from an interpreter message such as
/// `Unknown property 'w' - a getter is not registered for type 'NativeObject'`.
fn property_of_native_object(message: &str) -> Option<String> {
    if !message.ends_with(&format!("'{OBJECT_TYPE_NAME}'")) {
        return None;
    }
    let (_, rest) = message.split_once('\'')?;
    let (property, _) = rest.split_once('\'')?;
    Some(property.to_string())
}

fn format_location(pos: Position) -> Option<String> {
    if pos.is_none() {
        None
    } else {
        Some(format!("line {}", pos.line().unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_survives_interpreter_round_trip() {
        let raised = BridgeError::domain("length is zero").into_eval();
        assert_eq!(
            BridgeError::from_eval(&raised),
            BridgeError::Domain("length is zero".into())
        );
    }

    #[test]
    fn test_nested_function_error_is_unwrapped() {
        let inner = BridgeError::StaleHandle(ObjectHandle::new(3, 1)).into_eval();
        let wrapped = EvalAltResult::ErrorInFunctionCall(
            "outer".into(),
            String::new(),
            inner,
            Position::NONE,
        );
        assert!(matches!(
            BridgeError::from_eval(&wrapped),
            BridgeError::StaleHandle(_)
        ));
    }

    #[test]
    fn test_plain_runtime_error_is_wrapped() {
        let err: Box<EvalAltResult> = "boom".into();
        match BridgeError::from_eval(&err) {
            BridgeError::ScriptRuntime { message, .. } => assert!(message.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_member_on_object_signature() {
        assert_eq!(
            member_of_native_object(&format!("frobnicate ({OBJECT_TYPE_NAME}, i64)")),
            Some("frobnicate".to_string())
        );
        assert_eq!(member_of_native_object("frobnicate (i64)"), None);

        let missing = EvalAltResult::ErrorFunctionNotFound(
            format!("get$w ({OBJECT_TYPE_NAME})"),
            Position::NONE,
        );
        assert_eq!(
            BridgeError::from_eval(&missing),
            BridgeError::UnknownField {
                type_name: OBJECT_TYPE_NAME.into(),
                field: "w".into()
            }
        );
    }

    #[test]
    fn test_missing_property_message() {
        let missing = EvalAltResult::ErrorDotExpr(
            format!("Unknown property 'w' - a getter is not registered for type '{OBJECT_TYPE_NAME}'"),
            Position::NONE,
        );
        assert_eq!(
            BridgeError::from_eval(&missing),
            BridgeError::UnknownField {
                type_name: OBJECT_TYPE_NAME.into(),
                field: "w".into()
            }
        );
        assert_eq!(property_of_native_object("Unknown property 'w' for 'Map'"), None);
    }

    #[test]
    fn test_error_info_serializes() {
        let info = BridgeError::UndefinedFunction("nope".into()).info();
        assert_eq!(info.error_type, "undefined_function");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["message"], "Undefined function: nope");
    }
}
