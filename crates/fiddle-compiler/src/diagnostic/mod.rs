//! Diagnostic types for error reporting.

mod error;
mod report;
mod span;

pub use error::CompilerError;
pub use report::{
    classify, has_blocking_error, log_diagnostics, Classified, Diagnostic, DiagnosticBag, Severity,
};
pub use span::{LineIndex, Location};
