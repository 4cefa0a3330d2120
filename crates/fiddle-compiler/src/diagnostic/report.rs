//! Compiler-produced messages and their classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::span::Location;

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(text)
    }
}

/// A structured compiler message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable identifier such as `CS1002`.
    pub id: String,
    pub severity: Severity,
    pub message: String,
    pub location: Location,
}

impl Diagnostic {
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            message: message.into(),
            location,
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>, location: Location) -> Self {
        Self::new(id, Severity::Error, message, location)
    }

    pub fn warning(id: impl Into<String>, message: impl Into<String>, location: Location) -> Self {
        Self::new(id, Severity::Warning, message, location)
    }

    pub fn info(id: impl Into<String>, message: impl Into<String>, location: Location) -> Self {
        Self::new(id, Severity::Info, message, location)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.location.is_none() {
            write!(f, "{}: ", self.location)?;
        }
        write!(f, "{} {}: {}", self.severity, self.id, self.message)
    }
}

/// Diagnostics split by severity, each group in input order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Classified {
    pub infos: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
}

impl Classified {
    pub fn total(&self) -> usize {
        self.infos.len() + self.warnings.len() + self.errors.len()
    }
}

/// Splits diagnostics into infos, warnings and errors.
pub fn classify(diagnostics: &[Diagnostic]) -> Classified {
    let mut classified = Classified::default();
    for diagnostic in diagnostics {
        let bucket = match diagnostic.severity {
            Severity::Info => &mut classified.infos,
            Severity::Warning => &mut classified.warnings,
            Severity::Error => &mut classified.errors,
        };
        bucket.push(diagnostic.clone());
    }
    classified
}

/// True iff any diagnostic has [`Severity::Error`].
pub fn has_blocking_error(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Writes each diagnostic to the log sink at a level matching its severity.
pub fn log_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Severity::Info => log::info!("{}", diagnostic),
            Severity::Warning => log::warn!("{}", diagnostic),
            Severity::Error => log::error!("{}", diagnostic),
        }
    }
}

/// Accumulates diagnostics during a compilation phase.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    items: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, id: &str, message: impl Into<String>, location: Location) {
        self.push(Diagnostic::error(id, message, location));
    }

    pub fn warning(&mut self, id: &str, message: impl Into<String>, location: Location) {
        self.push(Diagnostic::warning(id, message, location));
    }

    pub fn info(&mut self, id: &str, message: impl Into<String>, location: Location) {
        self.push(Diagnostic::info(id, message, location));
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        has_blocking_error(&self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the diagnostics ordered by location, errors first on ties.
    pub fn into_sorted(mut self) -> Vec<Diagnostic> {
        self.items.sort_by(|a, b| {
            (a.location.line, a.location.column)
                .cmp(&(b.location.line, b.location.column))
                .then(b.severity.cmp(&a.severity))
        });
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Diagnostic> {
        vec![
            Diagnostic::info("CS8019", "Unnecessary using directive.", Location::point(1, 1)),
            Diagnostic::warning("CS0168", "The variable 'x' is declared but never used", Location::point(3, 9)),
            Diagnostic::error("CS1002", "; expected", Location::point(4, 18)),
            Diagnostic::warning("CS0162", "Unreachable code detected", Location::point(5, 9)),
        ]
    }

    #[test]
    fn test_classify_preserves_order_within_groups() {
        let classified = classify(&sample());
        assert_eq!(classified.infos.len(), 1);
        assert_eq!(classified.warnings.len(), 2);
        assert_eq!(classified.errors.len(), 1);
        assert_eq!(classified.warnings[0].id, "CS0168");
        assert_eq!(classified.warnings[1].id, "CS0162");
        assert_eq!(classified.total(), 4);
    }

    #[test]
    fn test_has_blocking_error() {
        let diagnostics = sample();
        assert!(has_blocking_error(&diagnostics));
        let non_blocking: Vec<_> = diagnostics.into_iter().filter(|d| !d.is_error()).collect();
        assert!(!has_blocking_error(&non_blocking));
        assert!(!has_blocking_error(&[]));
    }

    #[test]
    fn test_display_matches_compiler_style() {
        let diagnostic = Diagnostic::error("CS1002", "; expected", Location::new(1, 31, 1, 31));
        assert_eq!(diagnostic.to_string(), "(1,31): error CS1002: ; expected");

        let unlocated = Diagnostic::error("CS8805", "no location", Location::none());
        assert_eq!(unlocated.to_string(), "error CS8805: no location");
    }

    #[test]
    fn test_bag_sorts_by_location() {
        let mut bag = DiagnosticBag::new();
        bag.warning("CS0162", "late", Location::point(9, 1));
        bag.error("CS0103", "early", Location::point(2, 4));
        let sorted = bag.into_sorted();
        assert_eq!(sorted[0].id, "CS0103");
        assert_eq!(sorted[1].id, "CS0162");
    }
}
