//! Formatter configuration.

use serde::{Deserialize, Serialize};

/// Layout options for [`super::format_with`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormatterConfig {
    /// Spaces per indentation level (ignored with `use_tabs`).
    pub indent_width: usize,

    /// Indent with one tab per level.
    pub use_tabs: bool,

    /// End non-empty output with a newline.
    pub final_newline: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            indent_width: 4,
            use_tabs: false,
            final_newline: true,
        }
    }
}

impl FormatterConfig {
    pub fn with_indent_width(mut self, width: usize) -> Self {
        self.indent_width = width;
        self
    }

    pub fn with_tabs(mut self, use_tabs: bool) -> Self {
        self.use_tabs = use_tabs;
        self
    }

    /// Text of one indentation level.
    pub(super) fn indent_unit(&self) -> String {
        if self.use_tabs {
            "\t".to_string()
        } else {
            " ".repeat(self.indent_width)
        }
    }
}
