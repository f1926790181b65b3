//! Calls from the host into functions defined by scripts.

use rhai::{AST, Dynamic};
use tracing::debug;

use crate::{
    error::{BridgeError, BridgeResult},
    marshal,
    session::Session,
    value::NativeValue,
};

/// Check that the library defines `name` with `arity` parameters.
fn resolve(library: &AST, name: &str, arity: usize) -> BridgeResult<()> {
    let mut arities: Vec<usize> = library
        .iter_functions()
        .filter(|f| f.name == name)
        .map(|f| f.params.len())
        .collect();
    if arities.is_empty() {
        return Err(BridgeError::UndefinedFunction(name.to_string()));
    }
    if arities.contains(&arity) {
        return Ok(());
    }
    arities.sort_unstable();
    arities.dedup();
    let expected = arities
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" or ");
    Err(BridgeError::arity(name, expected, arity))
}

impl Session {
    /// Call a function defined by a script.
    ///
    /// The name is resolved at call time against everything the session has
    /// run so far. An object in the result is pinned for the host.
    pub fn call_script_function(
        &mut self,
        name: &str,
        args: &[NativeValue],
    ) -> BridgeResult<NativeValue> {
        self.check_ready()?;
        let script_args = {
            let mut heap = self.shared.heap.borrow_mut();
            args.iter()
                .map(|arg| marshal::to_script(&mut heap, arg))
                .collect::<BridgeResult<Vec<Dynamic>>>()?
        };
        let runtime = self.runtime_mut()?;
        resolve(&runtime.library, name, args.len())?;
        debug!(name, args = args.len(), "calling script function");
        let result = runtime.engine.call_fn::<Dynamic>(
            &mut runtime.scope,
            &runtime.library,
            name,
            script_args,
        );
        self.export(result.map_err(|e| BridgeError::from_eval(&e)))
    }

    /// Whether the library defines a function with this name.
    pub fn has_script_function(&self, name: &str) -> bool {
        self.runtime
            .as_ref()
            .is_some_and(|runtime| runtime.library.iter_functions().any(|f| f.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(script: &str) -> Session {
        let mut session = Session::default();
        session.initialize().unwrap();
        session.run(script).unwrap();
        session
    }

    #[test]
    fn test_resolution_is_late_bound() {
        let mut session = session_with("fn twice(x) { x * 2.0 }");
        assert_eq!(
            session
                .call_script_function("twice", &[NativeValue::Number(4.0)])
                .unwrap(),
            NativeValue::Number(8.0)
        );
        session.run("fn twice(x) { x * 3.0 }").unwrap();
        assert_eq!(
            session
                .call_script_function("twice", &[NativeValue::Number(4.0)])
                .unwrap(),
            NativeValue::Number(12.0)
        );
    }

    #[test]
    fn test_undefined_and_wrong_arity() {
        let mut session = session_with("fn one(a) { a }");
        assert_eq!(
            session.call_script_function("missing", &[]),
            Err(BridgeError::UndefinedFunction("missing".into()))
        );
        match session.call_script_function("one", &[]) {
            Err(BridgeError::ArityMismatch { name, expected, got }) => {
                assert_eq!(name, "one");
                assert_eq!(expected, "1");
                assert_eq!(got, 0);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(session.has_script_function("one"));
        assert!(!session.has_script_function("missing"));
    }

    #[test]
    fn test_script_throw_is_runtime_error() {
        let mut session = session_with(r#"fn fail() { throw "nope"; }"#);
        match session.call_script_function("fail", &[]) {
            Err(BridgeError::ScriptRuntime { message, .. }) => assert!(message.contains("nope")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
