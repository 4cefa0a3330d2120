//! # Fiddle Compiler
//!
//! This crate compiles C# snippets in-process against a catalog of reference
//! units and loads the result as an invokable unit. Source errors come back
//! as structured diagnostics; nothing is written to disk.
//!
//! ## Supported Languages
//!
//! - C# (a documented subset, parsed with tree-sitter)
//!
//! ## Architecture
//!
//! ```text
//! Reference units (boot.json + *.dll images)
//!        │  populate (async, once)
//!        ▼
//! ┌──────────────┐
//! │   Catalog    │  Published through the readiness gate
//! └──────┬───────┘
//!        │
//! Source │
//!        ▼
//! ┌──────────────┐
//! │   Frontend   │  tree-sitter parse, syntax diagnostics
//! │  (C# → AST)  │
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │      IR      │  Binding against the catalog
//! │  (AST → IR)  │
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │   Validate   │  Flow analysis, unused locals
//! │   (IR)       │
//! └──────┬───────┘
//!        │  no errors
//!        ▼
//! ┌──────────────┐
//! │   Codegen    │  Stack-machine bytecode
//! │ (IR → image) │
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │    Loader    │  Verify, link, interpret
//! └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fiddle_compiler::{CompilerConfig, MemorySource, Session, Value};
//!
//! let session = Session::new(CompilerConfig::default())?;
//! session.populate(&MemorySource::new()).await?;
//!
//! let outcome = session.compile("public static class M { public static int Add(int a, int b) => a + b; }")?;
//! if let Some(unit) = outcome.unit() {
//!     let result = unit.invoke("M.Add", &[Value::Int(2), Value::Int(3)])?;
//!     assert_eq!(result.value, Value::Int(5));
//! }
//! ```

pub mod codegen;
pub mod config;
pub mod diagnostic;
pub mod formatter;
pub mod frontend;
pub mod gate;
pub mod image;
pub mod ir;
pub mod loader;
pub mod reference;
pub mod session;
pub mod validate;

pub use config::{CompilerConfig, LanguageVersion, OutputKind};
pub use diagnostic::{classify, has_blocking_error, Classified, CompilerError, Diagnostic, Location, Severity};
pub use formatter::{format, format_with, FormatterConfig};
pub use gate::{ReadinessGate, ReadinessState};
pub use loader::{CompiledUnit, Invocation, InvokeError, LoadError, Value};
pub use reference::{DirectorySource, MemorySource, ReferenceCatalog, ReferenceUnit, UnitSource};
pub use session::{CancellationToken, CompileOutcome, Session};
