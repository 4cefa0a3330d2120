//! Compiler error types.
#![allow(unused_assignments)]

use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::gate::ReadinessState;

/// Errors that abort an operation.
///
/// Source defects are never reported through this type: they are ordinary
/// [`crate::diagnostic::Diagnostic`]s inside a
/// [`crate::CompileOutcome::Failure`].
#[allow(unused_assignments)]
#[derive(Error, Diagnostic, Debug)]
pub enum CompilerError {
    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("Failed to access '{path}': {message}")]
    #[diagnostic(code(fiddle::io::access_failed))]
    IoError { path: PathBuf, message: String },

    // =========================================================================
    // Initialization Errors
    // =========================================================================
    #[error("Failed to read the reference manifest: {message}")]
    #[diagnostic(
        code(fiddle::init::manifest_failed),
        help("The manifest lists the reference units to load, e.g. boot.json with an \"assemblyReferences\" array")
    )]
    ManifestFailed { message: String },

    #[error("Failed to fetch reference unit '{name}': {message}")]
    #[diagnostic(
        code(fiddle::init::fetch_failed),
        help("Population aborted; restart the session once the unit is available")
    )]
    UnitFetchFailed { name: String, message: String },

    #[error("Timed out after {timeout:?} fetching reference unit '{name}'")]
    #[diagnostic(code(fiddle::init::fetch_timeout))]
    UnitTimedOut { name: String, timeout: Duration },

    #[error("Reference unit '{name}' is not a valid module image: {message}")]
    #[diagnostic(code(fiddle::init::invalid_unit))]
    InvalidUnit { name: String, message: String },

    #[error("Reference unit '{name}' is listed more than once")]
    #[diagnostic(code(fiddle::init::duplicate_unit))]
    DuplicateUnit { name: String },

    // =========================================================================
    // Precondition Errors
    // =========================================================================
    #[error("The reference catalog is not ready (state: {state})")]
    #[diagnostic(
        code(fiddle::session::not_ready),
        help("Await Session::ready() or use compile_when_ready() before compiling")
    )]
    NotReady { state: ReadinessState },

    #[error("The reference catalog has already been populated (state: {state})")]
    #[diagnostic(
        code(fiddle::session::already_populated),
        help("populate() may be called once per session; create a new session to reload references")
    )]
    AlreadyPopulated { state: ReadinessState },

    // =========================================================================
    // Orchestration Errors
    // =========================================================================
    #[error("Failed to initialize parser")]
    #[diagnostic(code(fiddle::parse::init_failed))]
    ParserInitFailed,

    #[error("The parser produced no syntax tree")]
    #[diagnostic(code(fiddle::parse::parse_failed))]
    ParseFailed,

    #[error("Failed to emit module image: {message}")]
    #[diagnostic(code(fiddle::emit::emit_failed))]
    EmitFailed { message: String },

    #[error("Failed to load emitted module '{name}': {message}")]
    #[diagnostic(
        code(fiddle::load::load_failed),
        help("This is an environment problem, not a defect in the submitted source")
    )]
    LoadFailed { name: String, message: String },

    #[error("Compilation was cancelled")]
    #[diagnostic(code(fiddle::compile::cancelled))]
    Cancelled,

    // =========================================================================
    // Frontend Errors
    // =========================================================================
    #[error("Unsupported language: {language}")]
    #[diagnostic(
        code(fiddle::frontend::unsupported_language),
        help("Supported languages: csharp")
    )]
    UnsupportedLanguage { language: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(fiddle::config::invalid))]
    InvalidConfig { message: String },
}

impl CompilerError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::IoError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for failures that abort reference catalog population.
    pub fn is_initialization_failure(&self) -> bool {
        matches!(
            self,
            Self::ManifestFailed { .. }
                | Self::UnitFetchFailed { .. }
                | Self::UnitTimedOut { .. }
                | Self::InvalidUnit { .. }
                | Self::DuplicateUnit { .. }
        )
    }

    /// True for failures of the compile service itself, as opposed to
    /// problems in the submitted source.
    pub fn is_orchestration_failure(&self) -> bool {
        matches!(
            self,
            Self::ParserInitFailed
                | Self::ParseFailed
                | Self::EmitFailed { .. }
                | Self::LoadFailed { .. }
                | Self::Cancelled
                | Self::UnsupportedLanguage { .. }
        )
    }
}
