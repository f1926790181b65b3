use std::{fs, path::Path, rc::Rc};

use rand::{SeedableRng, rngs::StdRng};
use rhai::{AST, Dynamic, Engine, Scope};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    binding::{self, Shared},
    config::BridgeConfig,
    engine::{OutputBuffer, build_engine},
    error::{BridgeError, BridgeResult},
    functions::{FunctionDescriptor, FunctionRegistry, GLOBAL_NAMESPACE},
    heap::ObjectHandle,
    marshal,
    types::{TypeDescriptor, TypeId},
    value::{NativeValue, ValueKind},
};

const LANGUAGE_NAME: &str = "Rhai";
const EXTENSIONS: &[&str] = &["rhai"];
const LANGUAGE_VERSION: &str = "1.20";

/// Keywords and reserved words a script cannot use as a variable name.
const RESERVED: &[&str] = &[
    "true", "false", "let", "const", "if", "else", "switch", "do", "while", "until", "loop",
    "for", "in", "break", "continue", "return", "throw", "try", "catch", "import", "export",
    "as", "global", "private", "fn", "Fn", "call", "curry", "this", "is_shared", "is_def_fn",
    "is_def_var", "print", "debug", "type_of", "eval", "var", "static", "shared", "goto",
    "exit", "match", "case", "public", "protected", "new", "use", "with", "module", "package",
    "super", "thread", "spawn", "go", "await", "async", "sync", "yield", "default", "void",
    "null", "nil",
];

/// A set of native types and functions a host exposes to scripts.
pub trait HostApi {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Register types and functions on the session.
    fn install(&self, session: &mut Session) -> BridgeResult<()>;
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Created, engine not yet built.
    Uninitialized,
    /// Accepting registrations, scripts and calls.
    Ready,
    /// Torn down; every handle is invalid.
    TornDown,
}

/// Counters describing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStats {
    /// Native instances currently alive.
    pub live_objects: usize,
    /// Registered native types.
    pub types: usize,
    /// Registered native functions, across namespaces.
    pub functions: usize,
    /// Script functions in the library.
    pub script_functions: usize,
}

pub(crate) struct Runtime {
    pub(crate) engine: Engine,
    pub(crate) scope: Scope<'static>,
    /// Functions defined by every script run so far.
    pub(crate) library: AST,
}

/// Owns an interpreter and everything registered into it.
///
/// A session is single-threaded. Values handed to the host as
/// [`ObjectHandle`]s stay valid until [`Session::release_object`] or
/// [`Session::teardown`].
pub struct Session {
    config: BridgeConfig,
    state: SessionState,
    pub(crate) shared: Rc<Shared>,
    functions: FunctionRegistry,
    pub(crate) runtime: Option<Runtime>,
    output: OutputBuffer,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl Session {
    /// Create an uninitialized session.
    pub fn new(config: BridgeConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            state: SessionState::Uninitialized,
            shared: Rc::new(Shared::new(rng)),
            functions: FunctionRegistry::default(),
            runtime: None,
            output: OutputBuffer::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Name of the embedded language.
    pub fn language_name(&self) -> &'static str {
        LANGUAGE_NAME
    }

    /// Rhai version the session is built against.
    pub fn language_version(&self) -> &'static str {
        LANGUAGE_VERSION
    }

    /// File extensions of scripts this session runs.
    pub fn supported_extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    /// Build the interpreter and make the session ready.
    pub fn initialize(&mut self) -> BridgeResult<()> {
        match self.state {
            SessionState::Ready => Err(BridgeError::InvalidState(
                "session is already initialized".into(),
            )),
            SessionState::TornDown => Err(BridgeError::SessionClosed),
            SessionState::Uninitialized => {
                let mut engine = build_engine(&self.config, &self.output);
                binding::bind_object_type(&mut engine, &self.shared);
                self.runtime = Some(Runtime {
                    engine,
                    scope: Scope::new(),
                    library: AST::empty(),
                });
                self.state = SessionState::Ready;
                info!(language = LANGUAGE_NAME, "session initialized");
                Ok(())
            }
        }
    }

    pub(crate) fn check_ready(&self) -> BridgeResult<()> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Uninitialized => Err(BridgeError::NotInitialized),
            SessionState::TornDown => Err(BridgeError::SessionClosed),
        }
    }

    pub(crate) fn runtime_mut(&mut self) -> BridgeResult<&mut Runtime> {
        self.check_ready()?;
        self.runtime.as_mut().ok_or(BridgeError::NotInitialized)
    }

    /// Register a native type and bind its constructor under the type name.
    pub fn register_type(&mut self, descriptor: TypeDescriptor) -> BridgeResult<TypeId> {
        self.check_ready()?;
        if self.functions.contains(GLOBAL_NAMESPACE, descriptor.name()) {
            return Err(BridgeError::DuplicateType(descriptor.name().to_string()));
        }
        let (type_id, descriptor) = self.shared.types.borrow_mut().register(descriptor)?;
        let runtime = self.runtime.as_mut().ok_or(BridgeError::NotInitialized)?;
        binding::bind_type(&mut runtime.engine, &self.shared, type_id, &descriptor);
        debug!(name = descriptor.name(), ?type_id, "registered native type");
        Ok(type_id)
    }

    /// Register a function callable from scripts without a module prefix.
    pub fn register_function(&mut self, descriptor: FunctionDescriptor) -> BridgeResult<()> {
        self.check_ready()?;
        if self.shared.types.borrow().contains_name(descriptor.name()) {
            return Err(BridgeError::DuplicateFunction {
                namespace: GLOBAL_NAMESPACE.into(),
                name: descriptor.name().to_string(),
            });
        }
        let descriptor = self.functions.register(GLOBAL_NAMESPACE, descriptor)?;
        let runtime = self.runtime.as_mut().ok_or(BridgeError::NotInitialized)?;
        binding::bind_function(&mut runtime.engine, &self.shared, descriptor.clone());
        debug!(name = descriptor.name(), "registered native function");
        Ok(())
    }

    /// Register a function called from scripts as `module::name(...)`.
    pub fn register_module_function(
        &mut self,
        module: &str,
        descriptor: FunctionDescriptor,
    ) -> BridgeResult<()> {
        if module == GLOBAL_NAMESPACE {
            return self.register_function(descriptor);
        }
        self.check_ready()?;
        if !is_identifier(module) {
            return Err(BridgeError::InvalidState(format!(
                "'{module}' is not a valid module name"
            )));
        }
        let name = descriptor.name().to_string();
        self.functions.register(module, descriptor)?;
        let runtime = self.runtime.as_mut().ok_or(BridgeError::NotInitialized)?;
        binding::bind_module(
            &mut runtime.engine,
            &self.shared,
            module,
            self.functions.namespace(module),
        );
        debug!(module, name, "registered module function");
        Ok(())
    }

    /// Let a host API register its types and functions.
    pub fn install<A: HostApi + ?Sized>(&mut self, api: &A) -> BridgeResult<()> {
        self.check_ready()?;
        info!(api = api.name(), "installing host API");
        api.install(self)
    }

    /// Run a script. Top-level variables persist in the session's global
    /// scope and function definitions join the library, replacing any with
    /// the same name and arity.
    pub fn run(&mut self, script: &str) -> BridgeResult<()> {
        let runtime = self.runtime_mut()?;
        let ast = runtime
            .engine
            .compile_with_scope(&runtime.scope, script)
            .map_err(|e| BridgeError::from_parse(&e))?;
        let merged = runtime.library.merge(&ast);
        let result = runtime.engine.run_ast_with_scope(&mut runtime.scope, &merged);
        runtime.library = merged.clone_functions_only();
        drop(merged);
        self.collect();
        result.map_err(|e| BridgeError::from_eval(&e))
    }

    /// Run a script file.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> BridgeResult<()> {
        self.check_ready()?;
        let path = path.as_ref();
        debug!(path = %path.display(), "running script file");
        let script = fs::read_to_string(path)?;
        self.run(&script)
    }

    /// Evaluate an expression against the global scope and library.
    pub fn eval(&mut self, expression: &str) -> BridgeResult<NativeValue> {
        let runtime = self.runtime_mut()?;
        let ast = runtime
            .engine
            .compile_expression_with_scope(&runtime.scope, expression)
            .map_err(|e| BridgeError::from_parse(&e))?;
        let merged = runtime.library.merge(&ast);
        let result = runtime
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut runtime.scope, &merged);
        self.export(result.map_err(|e| BridgeError::from_eval(&e)))
    }

    /// Read a global variable.
    pub fn global(&mut self, name: &str) -> BridgeResult<NativeValue> {
        let runtime = self.runtime_mut()?;
        let value = runtime
            .scope
            .get_value::<Dynamic>(name)
            .ok_or_else(|| BridgeError::ScriptRuntime {
                message: format!("Variable not found: {name}"),
                location: None,
            });
        self.export(value)
    }

    /// Bind a global variable, replacing any existing binding. The name must
    /// be an identifier a script can refer to.
    pub fn set_global(&mut self, name: &str, value: &NativeValue) -> BridgeResult<()> {
        self.check_ready()?;
        if !is_identifier(name) || RESERVED.contains(&name) {
            return Err(BridgeError::InvalidState(format!(
                "'{name}' is not a valid variable name"
            )));
        }
        let value = marshal::to_script(&mut self.shared.heap.borrow_mut(), value)?;
        let runtime = self.runtime_mut()?;
        if runtime.scope.is_constant(name) == Some(true) {
            return Err(BridgeError::InvalidState(format!("'{name}' is a constant")));
        }
        runtime.scope.set_value(name, value);
        Ok(())
    }

    /// Convert a script result for the host, pinning returned objects.
    pub(crate) fn export(&self, value: BridgeResult<Dynamic>) -> BridgeResult<NativeValue> {
        let native = value.and_then(|value| {
            let mut heap = self.shared.heap.borrow_mut();
            let native = marshal::to_native(&heap, &value, ValueKind::Any)?;
            if let NativeValue::Object(handle) = native {
                heap.pin(handle)?;
            }
            Ok(native)
        });
        self.collect();
        native
    }

    fn collect(&self) -> usize {
        self.shared.heap.borrow_mut().collect()
    }

    /// Construct a registered type from the host. The object is pinned.
    pub fn create_object(&mut self, type_name: &str, args: &[NativeValue]) -> BridgeResult<ObjectHandle> {
        self.check_ready()?;
        let type_id = self
            .shared
            .types
            .borrow()
            .lookup(type_name)
            .ok_or_else(|| BridgeError::UndefinedFunction(type_name.to_string()))?;
        self.shared.with_context(|ctx| {
            let handle = binding::construct(ctx, type_id, args)?.as_object()?;
            ctx.heap_mut().pin(handle)?;
            Ok(handle)
        })
    }

    /// Move a host value into the heap as an instance of its registered
    /// type. The object is pinned.
    pub fn insert_object<T: 'static>(&mut self, value: T) -> BridgeResult<ObjectHandle> {
        self.check_ready()?;
        self.shared.with_context(|ctx| {
            let handle = ctx.alloc(value)?.as_object()?;
            ctx.heap_mut().pin(handle)?;
            Ok(handle)
        })
    }

    /// Read an instance as its concrete type.
    pub fn with_object<T: 'static, R>(
        &self,
        handle: ObjectHandle,
        f: impl FnOnce(&T) -> R,
    ) -> BridgeResult<R> {
        self.check_ready()?;
        let heap = self.shared.heap.borrow();
        heap.get::<T>(handle).map(f)
    }

    /// Call a method on an instance from the host.
    pub fn call_method(
        &mut self,
        handle: ObjectHandle,
        name: &str,
        args: &[NativeValue],
    ) -> BridgeResult<NativeValue> {
        self.check_ready()?;
        self.shared.with_context(|ctx| {
            let value = binding::call_method(ctx, &NativeValue::Object(handle), name, args)?;
            if let NativeValue::Object(result) = value {
                ctx.heap_mut().pin(result)?;
            }
            Ok(value)
        })
    }

    /// Read a field of an instance.
    pub fn get_field(&mut self, handle: ObjectHandle, name: &str) -> BridgeResult<NativeValue> {
        self.check_ready()?;
        self.shared.with_context(|ctx| {
            let value = binding::get_field(ctx, &NativeValue::Object(handle), name)?;
            if let NativeValue::Object(result) = value {
                ctx.heap_mut().pin(result)?;
            }
            Ok(value)
        })
    }

    /// Write a field of an instance.
    pub fn set_field(
        &mut self,
        handle: ObjectHandle,
        name: &str,
        value: NativeValue,
    ) -> BridgeResult<()> {
        self.check_ready()?;
        self.shared
            .with_context(|ctx| binding::set_field(ctx, &NativeValue::Object(handle), name, value))
    }

    /// Registered type name of an instance.
    pub fn object_type_name(&self, handle: ObjectHandle) -> BridgeResult<String> {
        self.check_ready()?;
        let type_id = self.shared.heap.borrow().type_of(handle)?;
        Ok(self.shared.types.borrow().name_of(type_id))
    }

    /// Whether the handle names a live instance.
    pub fn is_live(&self, handle: ObjectHandle) -> bool {
        self.shared.heap.borrow().contains(handle)
    }

    /// Give up the host's claim on an instance. It is freed once no script
    /// value refers to it.
    pub fn release_object(&mut self, handle: ObjectHandle) -> BridgeResult<()> {
        self.check_ready()?;
        self.shared.heap.borrow_mut().unpin(handle)?;
        debug!(%handle, "released host object");
        Ok(())
    }

    /// Free instances whose script references have been dropped. Returns
    /// the number freed.
    pub fn collect_garbage(&mut self) -> BridgeResult<usize> {
        self.check_ready()?;
        Ok(self.collect())
    }

    /// Lines printed by scripts since the last call.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    /// Current counters.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            live_objects: self.shared.heap.borrow().len(),
            types: self.shared.types.borrow().len(),
            functions: self.functions.len(),
            script_functions: self
                .runtime
                .as_ref()
                .map_or(0, |runtime| runtime.library.iter_functions().count()),
        }
    }

    /// Drop the interpreter and invalidate every handle.
    pub fn teardown(&mut self) -> BridgeResult<()> {
        if self.state == SessionState::TornDown {
            return Err(BridgeError::SessionClosed);
        }
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        // Script values hold anchors into the heap; drop them first.
        self.runtime = None;
        let freed = self.shared.heap.borrow_mut().clear();
        self.state = SessionState::TornDown;
        info!(freed, "session torn down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state == SessionState::Ready {
            warn!("session dropped without teardown");
            self.shutdown();
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
