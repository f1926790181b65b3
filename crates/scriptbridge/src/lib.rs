#![warn(missing_docs)]

//! A bridge between a Rust host and embedded Rhai scripts.
//!
//! The host registers native types ([`TypeBuilder`]) and functions
//! ([`FunctionDescriptor`]) on a [`Session`]; scripts construct and use them as
//! ordinary values, and the host calls back into functions the scripts define.
//! Native instances live in a session-owned heap and cross the boundary as
//! [`ObjectHandle`]s, so a dropped or torn-down object is detected rather than
//! dereferenced.
//!
//! ```ignore
//! let mut session = Session::new(BridgeConfig::default());
//! session.initialize()?;
//! session.register_function(FunctionDescriptor::new(
//!     "half",
//!     &[ValueKind::Number],
//!     |_, args| Ok((args[0].as_number()? / 2.0).into()),
//! ))?;
//! session.run("fn quarter(x) { half(half(x)) }")?;
//! let value = session.call_script_function("quarter", &[8.0.into()])?;
//! session.teardown()?;
//! ```

mod binding;
mod config;
mod context;
mod engine;
mod error;
mod functions;
mod heap;
mod invoker;
mod marshal;
mod session;
mod types;
mod value;

pub use config::BridgeConfig;
pub use context::CallContext;
pub use error::{BridgeError, BridgeResult, ErrorInfo};
pub use functions::{Arity, FunctionDescriptor, GLOBAL_NAMESPACE, NativeFn};
pub use heap::ObjectHandle;
pub use marshal::{OBJECT_TYPE_NAME, ScriptObject};
pub use session::{HostApi, Session, SessionState, SessionStats};
pub use types::{Operator, TypeBuilder, TypeDescriptor, TypeId};
pub use value::{NativeValue, ValueKind};

/// Most arguments a native callable can receive from a script.
pub const MAX_NATIVE_ARGS: usize = 6;
