//! Language frontends (compile services).
//!
//! Each backend is responsible for:
//! 1. Parsing source text in its language into a syntax tree
//! 2. Binding the tree against a reference catalog into the common IR
//! 3. Emitting a module image from a compilation without errors
//!
//! The session only talks to [`CompilerBackend`], so flow analysis, code
//! generation and loading are shared by every language.

pub mod csharp;

use crate::config::{CompilerConfig, LanguageVersion, OutputKind};
use crate::diagnostic::{CompilerError, Diagnostic};
use crate::ir::ProgramIR;
use crate::reference::ReferenceCatalog;
use crate::session::CancellationToken;

/// Options for parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub language_version: LanguageVersion,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            language_version: LanguageVersion::Preview,
        }
    }
}

/// A parsed source text.
pub struct SyntaxTree {
    pub source: String,
    pub tree: tree_sitter::Tree,
    pub options: ParseOptions,
}

impl std::fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("len", &self.source.len())
            .field("options", &self.options)
            .field("has_errors", &self.tree.root_node().has_error())
            .finish()
    }
}

/// Options for binding and emission.
#[derive(Debug, Clone)]
pub struct CompilationOptions {
    pub assembly_name: String,
    pub output_kind: OutputKind,
    pub language_version: LanguageVersion,
    /// Checked between phases and between method bodies.
    pub cancellation: Option<CancellationToken>,
}

impl CompilationOptions {
    pub fn from_config(config: &CompilerConfig) -> Self {
        Self {
            assembly_name: config.assembly_name.clone(),
            output_kind: config.output_kind,
            language_version: config.language_version,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), CompilerError> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(CompilerError::Cancelled),
            _ => Ok(()),
        }
    }
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self::from_config(&CompilerConfig::default())
    }
}

/// A bound program with every diagnostic found while building it.
#[derive(Debug)]
pub struct Compilation {
    pub program: ProgramIR,
    /// Syntax, binding and flow diagnostics, ordered by location.
    pub diagnostics: Vec<Diagnostic>,
}

impl Compilation {
    pub fn has_errors(&self) -> bool {
        crate::diagnostic::has_blocking_error(&self.diagnostics)
    }
}

/// Trait for compile services.
pub trait CompilerBackend: Send + Sync {
    /// Returns the language name (e.g., "csharp").
    fn language(&self) -> &str;

    /// Returns file extensions this backend handles (e.g., ["cs"]).
    fn extensions(&self) -> &[&str];

    /// Parses source text. Malformed input still yields a tree.
    fn parse(&self, source: &str, options: &ParseOptions) -> Result<SyntaxTree, CompilerError>;

    /// Binds a tree against the catalog and runs flow analysis.
    fn compile(
        &self,
        tree: &SyntaxTree,
        catalog: &ReferenceCatalog,
        options: &CompilationOptions,
    ) -> Result<Compilation, CompilerError>;

    /// Emits the module image of an error-free compilation.
    fn emit(&self, compilation: &Compilation) -> Result<Vec<u8>, CompilerError>;
}

/// Creates a backend for the given language.
pub fn create_backend(language: &str) -> Result<Box<dyn CompilerBackend>, CompilerError> {
    match language.to_ascii_lowercase().as_str() {
        "csharp" | "cs" | "c#" => Ok(Box::new(csharp::CSharpBackend::new())),
        _ => Err(CompilerError::UnsupportedLanguage {
            language: language.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_backend_by_alias() {
        for name in ["csharp", "cs", "C#"] {
            let backend = create_backend(name).unwrap();
            assert_eq!(backend.language(), "csharp");
            assert_eq!(backend.extensions(), &["cs"]);
        }
    }

    #[test]
    fn test_unknown_language() {
        assert!(matches!(
            create_backend("cobol").err(),
            Some(CompilerError::UnsupportedLanguage { .. })
        ));
    }

    #[test]
    fn test_options_follow_config() {
        let config = CompilerConfig::default()
            .with_assembly_name("Snippet")
            .with_output_kind(OutputKind::ConsoleApplication);
        let options = CompilationOptions::from_config(&config);
        assert_eq!(options.assembly_name, "Snippet");
        assert_eq!(options.output_kind, OutputKind::ConsoleApplication);
        assert!(options.check_cancelled().is_ok());

        let token = CancellationToken::new();
        let options = options.with_cancellation(token.clone());
        token.cancel();
        assert!(matches!(options.check_cancelled(), Err(CompilerError::Cancelled)));
    }
}
