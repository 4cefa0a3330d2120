//! # Loader
//!
//! Turns emitted module images into invokable units.
//!
//! ```text
//! bytes -> decode (magic, version, checksum) -> link references by name
//!       -> Module { image, links, statics } -> invoke(symbol, args)
//! ```
//!
//! [`InterpreterLoader`] executes bytecode on a stack machine. Reference
//! units are linked from the catalog on first use and shared by every unit
//! the loader loads; each loaded unit gets its own static field storage.

mod interp;
mod intrinsics;
pub mod value;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use miette::Diagnostic;
use thiserror::Error;

use crate::config::CompilerConfig;
use crate::image::{self, MethodDef, ModuleImage, TypeDef, TypeSig};
use crate::reference::ReferenceCatalog;

pub use value::{Object, Value};

// =============================================================================
// Errors
// =============================================================================

/// Failure to bring a module image into memory.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Invalid module image: {message}")]
    #[diagnostic(code(fiddle::load::invalid_image))]
    InvalidImage { message: String },

    #[error("Referenced unit '{name}' is not in the catalog")]
    #[diagnostic(
        code(fiddle::load::missing_reference),
        help("The module was compiled against a different reference catalog")
    )]
    MissingReference { name: String },

    #[error("Reference cycle through '{name}'")]
    #[diagnostic(code(fiddle::load::reference_cycle))]
    ReferenceCycle { name: String },
}

/// Failure while running loaded code.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum InvokeError {
    #[error("No method matches '{symbol}'")]
    #[diagnostic(code(fiddle::invoke::unknown_symbol))]
    UnknownSymbol { symbol: String },

    #[error("'{symbol}' matches more than one method")]
    #[diagnostic(
        code(fiddle::invoke::ambiguous_symbol),
        help("Qualify the method with its type, e.g. Type.Method")
    )]
    AmbiguousSymbol { symbol: String },

    #[error("Arguments do not match '{symbol}': {message}")]
    #[diagnostic(code(fiddle::invoke::argument_mismatch))]
    ArgumentMismatch { symbol: String, message: String },

    #[error("The unit has no entry point")]
    #[diagnostic(
        code(fiddle::invoke::no_entry_point),
        help("Compile with top-level statements or declare a static Main method")
    )]
    NoEntryPoint,

    #[error("Attempted to divide by zero.")]
    #[diagnostic(code(fiddle::runtime::divide_by_zero))]
    DivideByZero,

    #[error("Arithmetic operation resulted in an overflow.")]
    #[diagnostic(code(fiddle::runtime::overflow))]
    Overflow,

    #[error("Object reference not set to an instance of an object.")]
    #[diagnostic(code(fiddle::runtime::null_reference))]
    NullReference,

    #[error("The input string '{input}' was not in a correct format.")]
    #[diagnostic(code(fiddle::runtime::format))]
    Format { input: String },

    #[error("Call depth exceeded {limit}")]
    #[diagnostic(code(fiddle::runtime::stack_overflow))]
    StackOverflow { limit: usize },

    #[error("Execution stopped after {limit} steps")]
    #[diagnostic(
        code(fiddle::runtime::step_budget),
        help("Raise maxSteps in the configuration if the program is expected to run longer")
    )]
    StepBudgetExhausted { limit: u64 },

    #[error("Invalid program: {message}")]
    #[diagnostic(code(fiddle::runtime::invalid_program))]
    InvalidProgram { message: String },
}

// =============================================================================
// Loader
// =============================================================================

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Return value; [`Value::Void`] for `void` methods.
    pub value: Value,
    /// Everything written through `System.Console`.
    pub output: String,
}

/// A capability that loads module images and invokes their methods.
pub trait Loader {
    type Handle;

    fn load(&self, bytes: &[u8]) -> Result<Self::Handle, LoadError>;

    /// Invokes `symbol` (`Type.Method`, `Namespace.Type.Method` or a
    /// unique method name) with `args`.
    fn invoke(&self, handle: &Self::Handle, symbol: &str, args: &[Value]) -> Result<Invocation, InvokeError>;
}

/// Execution limits per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_steps: u64,
    pub max_call_depth: usize,
}

impl Limits {
    pub fn from_config(config: &CompilerConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            max_call_depth: config.max_call_depth,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::from_config(&CompilerConfig::default())
    }
}

/// Static field values of one type.
#[derive(Debug, Default)]
struct TypeStatics {
    initialized: bool,
    values: Vec<Value>,
}

/// A loaded module image.
#[derive(Debug)]
pub struct Module {
    image: Arc<ModuleImage>,
    /// Linked reference modules, parallel to `image.references`.
    links: Vec<Arc<Module>>,
    statics: Mutex<Vec<TypeStatics>>,
}

impl Module {
    fn new(image: Arc<ModuleImage>, links: Vec<Arc<Module>>) -> Self {
        let statics = image
            .types
            .iter()
            .map(|ty| TypeStatics {
                initialized: ty.static_init.is_none(),
                values: ty
                    .fields
                    .iter()
                    .map(|f| if f.is_static { Value::default_for(f.ty) } else { Value::Void })
                    .collect(),
            })
            .collect();
        Self {
            image,
            links,
            statics: Mutex::new(statics),
        }
    }

    pub fn image(&self) -> &ModuleImage {
        &self.image
    }

    fn statics(&self) -> MutexGuard<'_, Vec<TypeStatics>> {
        self.statics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn type_def(&self, index: u32) -> Option<&TypeDef> {
        self.image.types.get(index as usize)
    }

    fn method_def(&self, ty: u32, index: u32) -> Option<&MethodDef> {
        self.type_def(ty)?.methods.get(index as usize)
    }

    /// Finds the method `symbol` names that accepts `args`.
    fn resolve_symbol(&self, symbol: &str, args: &[Value]) -> Result<(u32, u32), InvokeError> {
        let (type_part, method_name) = match symbol.rsplit_once('.') {
            Some((ty, method)) => (Some(ty), method),
            None => (None, symbol),
        };

        let named: Vec<(u32, u32, &MethodDef)> = self
            .image
            .types
            .iter()
            .enumerate()
            .filter(|(_, ty)| match type_part {
                Some(part) => ty.full_name() == part || ty.name == part,
                None => true,
            })
            .flat_map(|(ti, ty)| {
                ty.methods
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.name == method_name && !m.is_special())
                    .map(move |(mi, m)| (ti as u32, mi as u32, m))
            })
            .collect();

        if named.is_empty() {
            return Err(InvokeError::UnknownSymbol {
                symbol: symbol.to_string(),
            });
        }

        let applicable: Vec<&(u32, u32, &MethodDef)> = named
            .iter()
            .filter(|(_, _, m)| {
                m.params.len() == args.len()
                    && m.params.iter().zip(args).all(|(p, a)| a.coerce_to(p.ty).is_some())
            })
            .collect();

        match applicable.as_slice() {
            [] => Err(InvokeError::ArgumentMismatch {
                symbol: symbol.to_string(),
                message: format!("no overload takes {} argument(s) of these types", args.len()),
            }),
            [(ty, method, _)] => Ok((*ty, *method)),
            many => {
                let exact: Vec<_> = many
                    .iter()
                    .filter(|(_, _, m)| m.params.iter().zip(args).all(|(p, a)| a.matches_exactly(p.ty)))
                    .collect();
                match exact.as_slice() {
                    [(ty, method, _)] => Ok((*ty, *method)),
                    _ => Err(InvokeError::AmbiguousSymbol {
                        symbol: symbol.to_string(),
                    }),
                }
            }
        }
    }
}

/// Loads images against a reference catalog and interprets their bytecode.
#[derive(Debug)]
pub struct InterpreterLoader {
    catalog: Arc<ReferenceCatalog>,
    limits: Limits,
    references: Mutex<HashMap<String, Arc<Module>>>,
}

impl InterpreterLoader {
    pub fn new(catalog: Arc<ReferenceCatalog>, limits: Limits) -> Self {
        Self {
            catalog,
            limits,
            references: Mutex::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Loads an already decoded image.
    pub fn load_image(&self, image: ModuleImage) -> Result<Arc<Module>, LoadError> {
        let links = self.link(&image, &mut Vec::new())?;
        log::debug!("loaded module '{}' ({} type(s))", image.name, image.types.len());
        Ok(Arc::new(Module::new(Arc::new(image), links)))
    }

    fn link(&self, image: &ModuleImage, loading: &mut Vec<String>) -> Result<Vec<Arc<Module>>, LoadError> {
        image
            .references
            .iter()
            .map(|name| self.reference(name, loading))
            .collect()
    }

    fn reference(&self, name: &str, loading: &mut Vec<String>) -> Result<Arc<Module>, LoadError> {
        if let Some(module) = self.cached(name) {
            return Ok(module);
        }
        if loading.iter().any(|n| n == name) {
            return Err(LoadError::ReferenceCycle { name: name.to_string() });
        }
        let unit = self
            .catalog
            .get(name)
            .ok_or_else(|| LoadError::MissingReference { name: name.to_string() })?;

        loading.push(name.to_string());
        let links = self.link(unit.image(), loading)?;
        loading.pop();

        let module = Arc::new(Module::new(unit.image_arc(), links));
        log::trace!("linked reference unit '{}'", name);
        let mut cache = self.references.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(name.to_string()).or_insert(module)))
    }

    fn cached(&self, name: &str) -> Option<Arc<Module>> {
        self.references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Runs the module's entry point.
    pub fn run_entry_point(&self, module: &Arc<Module>) -> Result<Invocation, InvokeError> {
        let entry = module.image.entry_point.ok_or(InvokeError::NoEntryPoint)?;
        interp::run(module, entry.ty.index, entry.index, Vec::new(), self.limits)
    }
}

impl Loader for InterpreterLoader {
    type Handle = Arc<Module>;

    fn load(&self, bytes: &[u8]) -> Result<Arc<Module>, LoadError> {
        let image = image::decode(bytes).map_err(|e| LoadError::InvalidImage { message: e.to_string() })?;
        self.load_image(image)
    }

    fn invoke(&self, handle: &Arc<Module>, symbol: &str, args: &[Value]) -> Result<Invocation, InvokeError> {
        let (ty, method) = handle.resolve_symbol(symbol, args)?;
        let params: Vec<TypeSig> = handle
            .method_def(ty, method)
            .map(|m| m.params.iter().map(|p| p.ty).collect())
            .unwrap_or_default();
        let args = params
            .iter()
            .zip(args)
            .map(|(sig, arg)| arg.coerce_to(*sig))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| InvokeError::ArgumentMismatch {
                symbol: symbol.to_string(),
                message: "argument conversion failed".to_string(),
            })?;

        log::debug!("invoking {} with {} argument(s)", symbol, args.len());
        let invocation = interp::run(handle, ty, method, args, self.limits)?;
        for line in invocation.output.lines() {
            log::debug!(target: "fiddle::console", "{}", line);
        }
        Ok(invocation)
    }
}

// =============================================================================
// Compiled Unit
// =============================================================================

/// A successfully compiled and loaded unit, owned by the caller.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    bytes: Arc<[u8]>,
    module: Arc<Module>,
    loader: Arc<InterpreterLoader>,
}

impl CompiledUnit {
    /// Loads `bytes` with `loader`.
    pub fn load(bytes: Vec<u8>, loader: Arc<InterpreterLoader>) -> Result<Self, LoadError> {
        let module = loader.load(&bytes)?;
        Ok(Self {
            bytes: bytes.into(),
            module,
            loader,
        })
    }

    /// Assembly name of the unit.
    pub fn name(&self) -> &str {
        &self.module.image.name
    }

    /// The emitted module image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn image(&self) -> &ModuleImage {
        self.module.image()
    }

    pub fn has_entry_point(&self) -> bool {
        self.module.image.entry_point.is_some()
    }

    pub fn invoke(&self, symbol: &str, args: &[Value]) -> Result<Invocation, InvokeError> {
        self.loader.invoke(&self.module, symbol, args)
    }

    pub fn run_entry_point(&self) -> Result<Invocation, InvokeError> {
        let invocation = self.loader.run_entry_point(&self.module)?;
        for line in invocation.output.lines() {
            log::debug!(target: "fiddle::console", "{}", line);
        }
        Ok(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompilerConfig, OutputKind};
    use crate::frontend::{create_backend, CompilationOptions, ParseOptions};

    fn compile(source: &str, config: &CompilerConfig) -> Vec<u8> {
        let backend = create_backend("csharp").unwrap();
        let tree = backend.parse(source, &ParseOptions::default()).unwrap();
        let compilation = backend
            .compile(&tree, &ReferenceCatalog::core_only(), &CompilationOptions::from_config(config))
            .unwrap();
        assert!(!compilation.has_errors(), "{:?}", compilation.diagnostics);
        backend.emit(&compilation).unwrap()
    }

    fn load_with(source: &str, config: &CompilerConfig) -> CompiledUnit {
        let loader = Arc::new(InterpreterLoader::new(
            Arc::new(ReferenceCatalog::core_only()),
            Limits::from_config(config),
        ));
        CompiledUnit::load(compile(source, config), loader).unwrap()
    }

    fn load(source: &str) -> CompiledUnit {
        load_with(source, &CompilerConfig::default())
    }

    #[test]
    fn test_invoke_static_method() {
        let unit = load("public static class C { public static int Add(int a, int b) => a + b; }");
        assert_eq!(unit.invoke("C.Add", &[Value::Int(2), Value::Int(3)]).unwrap().value, Value::Int(5));
        assert_eq!(unit.invoke("Add", &[Value::Int(2), Value::Int(3)]).unwrap().value, Value::Int(5));
    }

    #[test]
    fn test_symbol_errors() {
        let unit = load("class C { static int F(int a) => a; static int F(long a) => 1; static int G() => 0; }");
        assert!(matches!(unit.invoke("C.Missing", &[]), Err(InvokeError::UnknownSymbol { .. })));
        assert!(matches!(
            unit.invoke("G", &[Value::Int(1)]),
            Err(InvokeError::ArgumentMismatch { .. })
        ));
        // Exact kind wins when several overloads apply.
        assert_eq!(unit.invoke("F", &[Value::Long(4)]).unwrap().value, Value::Int(1));
        assert_eq!(unit.invoke("F", &[Value::Int(4)]).unwrap().value, Value::Int(4));
    }

    #[test]
    fn test_instance_method_runs_on_fresh_instance() {
        let unit = load("class Counter { int n = 10; public int Next() { n++; return n; } }");
        assert_eq!(unit.invoke("Counter.Next", &[]).unwrap().value, Value::Int(11));
        assert_eq!(unit.invoke("Counter.Next", &[]).unwrap().value, Value::Int(11));
    }

    #[test]
    fn test_static_state_persists_per_unit() {
        let source = "class S { static int count = 100; public static int Bump() { count += 1; return count; } }";
        let unit = load(source);
        assert_eq!(unit.invoke("S.Bump", &[]).unwrap().value, Value::Int(101));
        assert_eq!(unit.invoke("S.Bump", &[]).unwrap().value, Value::Int(102));
        let other = load(source);
        assert_eq!(other.invoke("S.Bump", &[]).unwrap().value, Value::Int(101));
    }

    #[test]
    fn test_entry_point_output() {
        let config = CompilerConfig::default().with_output_kind(OutputKind::ConsoleApplication);
        let unit = load_with("System.Console.WriteLine(\"hi \" + 1 + true);", &config);
        let invocation = unit.run_entry_point().unwrap();
        assert_eq!(invocation.output, "hi 1True\n");
        assert_eq!(invocation.value, Value::Void);
    }

    #[test]
    fn test_no_entry_point() {
        let unit = load("class C { }");
        assert!(!unit.has_entry_point());
        assert_eq!(unit.run_entry_point(), Err(InvokeError::NoEntryPoint));
    }

    #[test]
    fn test_rejects_corrupt_bytes() {
        let loader = InterpreterLoader::new(Arc::new(ReferenceCatalog::core_only()), Limits::default());
        assert!(matches!(loader.load(b"nope"), Err(LoadError::InvalidImage { .. })));
    }

    #[test]
    fn test_rejects_missing_reference() {
        let mut image = ModuleImage::new("M");
        image.references.push("Other.dll".to_string());
        let loader = InterpreterLoader::new(Arc::new(ReferenceCatalog::core_only()), Limits::default());
        assert_eq!(
            loader.load_image(image).unwrap_err(),
            LoadError::MissingReference {
                name: "Other.dll".to_string()
            }
        );
    }
}
