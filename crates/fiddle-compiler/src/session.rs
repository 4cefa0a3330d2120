//! Compile session.
//!
//! A [`Session`] owns everything one user of the service needs: the
//! configuration, the compile backend, the readiness gate guarding the
//! reference catalog and the loader that runs compiled units. Nothing is
//! process-wide; two sessions never share state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::config::CompilerConfig;
use crate::diagnostic::{log_diagnostics, CompilerError, Diagnostic, Severity};
use crate::formatter;
use crate::frontend::{create_backend, CompilationOptions, CompilerBackend, ParseOptions};
use crate::gate::{ReadinessGate, ReadinessState};
use crate::loader::{CompiledUnit, InterpreterLoader, Limits};
use crate::reference::{self, ReferenceCatalog, UnitSource};

// =============================================================================
// Cancellation
// =============================================================================

/// Cooperative cancellation flag for a compilation.
///
/// Clones share the flag. The compiler checks it between phases and between
/// method bodies.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of a compilation that ran to completion.
///
/// Source errors are not a [`CompilerError`]: they come back as
/// [`CompileOutcome::Failure`] with the full diagnostic set.
#[derive(Debug)]
pub enum CompileOutcome {
    Success {
        unit: CompiledUnit,
        /// Warnings and infos reported alongside the unit.
        diagnostics: Vec<Diagnostic>,
    },
    Failure {
        diagnostics: Vec<Diagnostic>,
    },
}

impl CompileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CompileOutcome::Success { .. })
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileOutcome::Success { diagnostics, .. } | CompileOutcome::Failure { diagnostics } => diagnostics,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics()
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn unit(&self) -> Option<&CompiledUnit> {
        match self {
            CompileOutcome::Success { unit, .. } => Some(unit),
            CompileOutcome::Failure { .. } => None,
        }
    }

    pub fn into_unit(self) -> Option<CompiledUnit> {
        match self {
            CompileOutcome::Success { unit, .. } => Some(unit),
            CompileOutcome::Failure { .. } => None,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

pub struct Session {
    config: CompilerConfig,
    backend: Box<dyn CompilerBackend>,
    gate: ReadinessGate,
    /// Created on first successful compile; shared by every unit so
    /// reference statics are initialized once per session.
    loader: OnceLock<Arc<InterpreterLoader>>,
    emitted: AtomicUsize,
}

impl Session {
    /// Creates a session with the backend named by `config.language`.
    pub fn new(config: CompilerConfig) -> Result<Self, CompilerError> {
        config.validate()?;
        let backend = create_backend(&config.language)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Creates a session around an explicit backend.
    pub fn with_backend(config: CompilerConfig, backend: Box<dyn CompilerBackend>) -> Self {
        Self {
            config,
            backend,
            gate: ReadinessGate::new(),
            loader: OnceLock::new(),
            emitted: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn state(&self) -> ReadinessState {
        self.gate.state()
    }

    /// The published catalog, if population has finished.
    pub fn catalog(&self) -> Option<Arc<ReferenceCatalog>> {
        self.gate.catalog()
    }

    /// Number of module images emitted so far.
    pub fn emitted_units(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Population
    // =========================================================================

    /// Builds the reference catalog from `source` and opens the gate.
    ///
    /// Only the first call proceeds; later calls fail with
    /// [`CompilerError::AlreadyPopulated`]. If population fails the session
    /// stays in progress and never becomes ready.
    pub async fn populate<S: UnitSource>(&self, source: &S) -> Result<Arc<ReferenceCatalog>, CompilerError> {
        self.gate.begin()?;
        log::info!("populating reference catalog");
        let catalog = reference::populate(source, &self.config).await.map_err(|e| {
            log::error!("reference catalog population failed: {}", e);
            e
        })?;
        log::info!("reference catalog ready: {}", catalog.names().join(", "));
        self.gate.publish(catalog)
    }

    /// Opens the gate with an already built catalog.
    pub fn publish(&self, catalog: ReferenceCatalog) -> Result<Arc<ReferenceCatalog>, CompilerError> {
        self.gate.begin()?;
        self.gate.publish(catalog)
    }

    /// Runs `continuation` once the catalog is ready (immediately if it is).
    pub fn on_ready<F>(&self, continuation: F)
    where
        F: FnOnce(&Arc<ReferenceCatalog>) + Send + 'static,
    {
        self.gate.on_ready(continuation);
    }

    /// Waits for the catalog.
    pub async fn ready(&self) -> Arc<ReferenceCatalog> {
        self.gate.ready().await
    }

    // =========================================================================
    // Compilation
    // =========================================================================

    /// Compiles `source` against the published catalog.
    pub fn compile(&self, source: &str) -> Result<CompileOutcome, CompilerError> {
        let catalog = self.require_catalog()?;
        self.compile_against(&catalog, source, CompilationOptions::from_config(&self.config))
    }

    /// Waits for the catalog, then compiles.
    pub async fn compile_when_ready(&self, source: &str) -> Result<CompileOutcome, CompilerError> {
        let catalog = self.gate.ready().await;
        self.compile_against(&catalog, source, CompilationOptions::from_config(&self.config))
    }

    pub fn compile_with_cancellation(
        &self,
        source: &str,
        token: CancellationToken,
    ) -> Result<CompileOutcome, CompilerError> {
        let catalog = self.require_catalog()?;
        let options = CompilationOptions::from_config(&self.config).with_cancellation(token);
        self.compile_against(&catalog, source, options)
    }

    /// Reformats `source`. Does not need the catalog.
    pub fn format(&self, source: &str) -> String {
        formatter::format(source)
    }

    fn require_catalog(&self) -> Result<Arc<ReferenceCatalog>, CompilerError> {
        self.gate.catalog().ok_or_else(|| CompilerError::NotReady {
            state: self.gate.state(),
        })
    }

    fn compile_against(
        &self,
        catalog: &Arc<ReferenceCatalog>,
        source: &str,
        options: CompilationOptions,
    ) -> Result<CompileOutcome, CompilerError> {
        options.check_cancelled()?;
        let parse_options = ParseOptions {
            language_version: self.config.language_version,
        };
        let tree = self.backend.parse(source, &parse_options)?;

        options.check_cancelled()?;
        let compilation = self.backend.compile(&tree, catalog, &options)?;
        log_diagnostics(&compilation.diagnostics);
        if compilation.has_errors() {
            return Ok(CompileOutcome::Failure {
                diagnostics: compilation.diagnostics,
            });
        }

        options.check_cancelled()?;
        let bytes = self.backend.emit(&compilation)?;
        self.emitted.fetch_add(1, Ordering::SeqCst);
        log::debug!("emitted {} bytes for '{}'", bytes.len(), options.assembly_name);

        let unit = CompiledUnit::load(bytes, self.loader(catalog)).map_err(|e| CompilerError::LoadFailed {
            name: options.assembly_name.clone(),
            message: e.to_string(),
        })?;
        Ok(CompileOutcome::Success {
            unit,
            diagnostics: compilation.diagnostics,
        })
    }

    fn loader(&self, catalog: &Arc<ReferenceCatalog>) -> Arc<InterpreterLoader> {
        let loader = self.loader.get_or_init(|| {
            Arc::new(InterpreterLoader::new(
                Arc::clone(catalog),
                Limits::from_config(&self.config),
            ))
        });
        Arc::clone(loader)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("language", &self.backend.language())
            .field("state", &self.gate.state())
            .field("emitted", &self.emitted_units())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputKind;
    use crate::loader::Value;
    use crate::reference::MemorySource;
    use std::sync::Mutex;

    const ADDER: &str = "public static class M { public static int Add(int a, int b) => a + b; }";

    async fn ready_session(config: CompilerConfig) -> Session {
        let session = Session::new(config).unwrap();
        session.populate(&MemorySource::new()).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_compile_before_ready_is_rejected() {
        let session = Session::new(CompilerConfig::default()).unwrap();
        let err = session.compile(ADDER).unwrap_err();
        assert!(matches!(
            err,
            CompilerError::NotReady {
                state: ReadinessState::NotStarted
            }
        ));
        assert_eq!(session.emitted_units(), 0);
    }

    #[tokio::test]
    async fn test_second_populate_is_rejected() {
        let session = ready_session(CompilerConfig::default()).await;
        let err = session.populate(&MemorySource::new()).await.unwrap_err();
        assert!(matches!(err, CompilerError::AlreadyPopulated { .. }));
        assert_eq!(session.state(), ReadinessState::Ready);
    }

    #[tokio::test]
    async fn test_compile_and_invoke() {
        let session = ready_session(CompilerConfig::default()).await;
        let outcome = session.compile(ADDER).unwrap();
        let unit = outcome.unit().unwrap();
        let result = unit.invoke("M.Add", &[Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(result.value, Value::Int(5));
        assert_eq!(session.emitted_units(), 1);
    }

    #[tokio::test]
    async fn test_errors_skip_emission() {
        let session = ready_session(CompilerConfig::default()).await;
        let outcome = session
            .compile("public static class M { public static int F() { return 1 } }")
            .unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.errors().any(|d| d.id == "CS1002"));
        assert_eq!(session.emitted_units(), 0);
    }

    #[tokio::test]
    async fn test_compile_when_ready_waits_for_population() {
        let session = Session::new(CompilerConfig::default()).unwrap();
        let (outcome, populated) = tokio::join!(session.compile_when_ready(ADDER), async {
            tokio::task::yield_now().await;
            session.populate(&MemorySource::new()).await
        });
        assert!(populated.is_ok());
        assert!(outcome.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_cancelled_compile() {
        let session = ready_session(CompilerConfig::default()).await;
        let token = CancellationToken::new();
        token.cancel();
        let err = session.compile_with_cancellation(ADDER, token).unwrap_err();
        assert!(matches!(err, CompilerError::Cancelled));
        assert_eq!(session.emitted_units(), 0);
    }

    #[tokio::test]
    async fn test_on_ready_runs_after_population() {
        let session = Session::new(CompilerConfig::default()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_ready(move |catalog| sink.lock().unwrap().push(catalog.len()));
        assert!(seen.lock().unwrap().is_empty());

        session.populate(&MemorySource::new()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_console_application_entry_point() {
        let config = CompilerConfig::default().with_output_kind(OutputKind::ConsoleApplication);
        let session = ready_session(config).await;
        let outcome = session
            .compile("int x = 40; System.Console.WriteLine(x + 2);")
            .unwrap();
        let unit = outcome.into_unit().unwrap();
        assert!(unit.has_entry_point());
        assert_eq!(unit.run_entry_point().unwrap().output, "42\n");
    }

    #[test]
    fn test_publish_prebuilt_catalog() {
        let session = Session::new(CompilerConfig::default()).unwrap();
        session.publish(ReferenceCatalog::core_only()).unwrap();
        assert_eq!(session.state(), ReadinessState::Ready);
        assert!(session.compile(ADDER).unwrap().is_success());
    }
}
