//! Fiddle CLI UI primitives.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use fiddle_compiler::{Classified, Diagnostic, Severity};

/// Color palette
pub mod colors {
    use console::Color;

    pub const CYAN: Color = Color::Color256(51);
    pub const MAGENTA: Color = Color::Color256(201);
    pub const AMBER: Color = Color::Color256(214);
    pub const NEON_GREEN: Color = Color::Color256(82);
    pub const DIM: Color = Color::Color256(240);
}

pub mod symbols {
    pub const DIAMOND: &str = "\u{25C6}"; // ◆
    pub const DIAMOND_OUTLINE: &str = "\u{25C7}"; // ◇
    pub const TARGET_FILLED: &str = "\u{25C9}"; // ◉
    pub const TRIANGLE: &str = "\u{25B8}"; // ▸
    pub const DOT: &str = "\u{00B7}"; // ·
}

/// Print a success message
pub fn success(msg: &str) {
    println!(
        "  {} {}",
        style(symbols::TARGET_FILLED).fg(colors::NEON_GREEN),
        msg
    );
}

/// Print an info message
pub fn info(msg: &str) {
    println!(
        "  {} {}",
        style(symbols::DIAMOND_OUTLINE).fg(colors::CYAN),
        msg
    );
}

/// Print a dim/secondary message
pub fn dim(msg: &str) {
    println!("  {}", style(msg).fg(colors::DIM));
}

/// Create a spinner
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("\u{25CE}\u{25C9}\u{25CE}\u{25C9}") // ◎◉◎◉
        .template("  {spinner:.cyan} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(150));
    pb
}

/// Print a divider line
pub fn divider() {
    println!();
    let line = "\u{254C}".repeat(53); // ╌
    println!("  {}", style(line).fg(colors::DIM));
    println!();
}

/// Renders one diagnostic as `file(line,col): severity ID: message`.
pub fn diagnostic_line(file: &str, diagnostic: &Diagnostic) -> String {
    if diagnostic.location.is_none() {
        format!("{}: {}", file, diagnostic)
    } else {
        format!("{}{}", file, diagnostic)
    }
}

/// Print every diagnostic, colored by severity.
pub fn diagnostics(file: &str, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let line = diagnostic_line(file, diagnostic);
        let (symbol, color) = match diagnostic.severity {
            Severity::Error => (symbols::DIAMOND, colors::MAGENTA),
            Severity::Warning => (symbols::TRIANGLE, colors::AMBER),
            Severity::Info => (symbols::DOT, colors::DIM),
        };
        println!("  {} {}", style(symbol).fg(color), style(line).fg(color));
    }
}

/// Print the error/warning/info counts.
pub fn summary(classified: &Classified) {
    println!(
        "    {} errors {} {} warnings {} {} infos",
        classified.errors.len(),
        symbols::DOT,
        classified.warnings.len(),
        symbols::DOT,
        classified.infos.len()
    );
}

/// Print program output between dividers.
pub fn program_output(output: &str) {
    if output.is_empty() {
        return;
    }
    divider();
    print!("{}", output);
    if !output.ends_with('\n') {
        println!();
    }
    divider();
}

/// Print timing information
pub fn timing(label: &str, duration_ms: u128) {
    println!(
        "  {} {} in {}ms",
        style(symbols::DIAMOND_OUTLINE).fg(colors::CYAN),
        label,
        duration_ms
    );
}

/// Print "Nope" error header (for check failures)
pub fn nope_header() {
    println!();
    println!(
        "  {} {}",
        style(symbols::DIAMOND).fg(colors::MAGENTA).bold(),
        style("Nope.").fg(colors::MAGENTA).bold()
    );
    println!();
}

/// Print "Looking good" success for check
pub fn looking_good() {
    println!(
        "  {} {}",
        style(symbols::TARGET_FILLED).fg(colors::NEON_GREEN),
        style("Looking good.").bold()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiddle_compiler::Location;

    #[test]
    fn test_diagnostic_line_with_location() {
        let d = Diagnostic::error("CS1002", "; expected", Location::point(3, 14));
        assert_eq!(diagnostic_line("a.cs", &d), "a.cs(3,14): error CS1002: ; expected");
    }

    #[test]
    fn test_diagnostic_line_without_location() {
        let d = Diagnostic::warning("CS8019", "Unnecessary using directive", Location::none());
        assert_eq!(
            diagnostic_line("a.cs", &d),
            "a.cs: warning CS8019: Unnecessary using directive"
        );
    }
}
