//! Token reprinter.
//!
//! The printer sees only the leaf tokens of the syntax tree, each tagged
//! with the grammar kinds of its parent and grandparent. Layout depends on
//! those tokens alone, never on the input's whitespace (except whether a
//! comment started its own line), which is what makes formatting
//! idempotent.

use tree_sitter::Node;

use super::config::FormatterConfig;

/// Nodes printed verbatim.
fn is_atomic(kind: &str) -> bool {
    matches!(
        kind,
        "comment"
            | "string_literal"
            | "verbatim_string_literal"
            | "raw_string_literal"
            | "interpolated_string_expression"
            | "character_literal"
    ) || kind.starts_with("preproc")
}

/// Parents whose braces stay on the line (`new[] { 1, 2 }`).
const INLINE_BRACE_PARENTS: &[&str] = &[
    "initializer_expression",
    "anonymous_object_creation_expression",
    "switch_expression",
    "property_pattern_clause",
    "interpolation",
];

/// Keywords followed by a space before `(`.
const SPACED_KEYWORDS: &[&str] = &[
    "if", "while", "for", "foreach", "switch", "catch", "using", "lock", "fixed", "return", "when", "in",
    "await", "throw", "else", "is", "as", "case", "not", "and", "or", "yield", "from", "where", "select",
];

/// Colons spaced like binary operators.
const SPACED_COLON_PARENTS: &[&str] = &[
    "conditional_expression",
    "base_list",
    "constructor_initializer",
    "type_parameter_constraints_clause",
];

/// Colons that end a label; a new line follows them.
const LABEL_COLON_PARENTS: &[&str] = &[
    "switch_section",
    "switch_label",
    "case_switch_label",
    "case_pattern_switch_label",
    "default_switch_label",
    "labeled_statement",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Word,
    Open,
    Close,
    Comma,
    Semicolon,
    /// Member access and similar tight infix tokens.
    Dot,
    Prefix,
    Postfix,
    GenericOpen,
    GenericClose,
    Binary,
    Colon,
    LabelColon,
    BlockOpen,
    BlockClose,
    InlineOpen,
    InlineClose,
    Comment,
    Directive,
}

#[derive(Debug)]
struct Token<'s> {
    text: &'s str,
    parent: &'static str,
    grandparent: &'static str,
    /// The source had a line break between this token and the previous one.
    newline_before: bool,
    role: Role,
}

/// Reprints the tree of `source` in canonical layout.
pub(super) fn print(root: Node, source: &str, config: &FormatterConfig) -> String {
    let mut tokens = Vec::new();
    let mut last_end = 0;
    collect(root, source, &mut tokens, &mut last_end);

    let mut printer = Printer {
        out: String::with_capacity(source.len()),
        unit: config.indent_unit(),
        indent: 0,
        at_line_start: true,
        pending_newline: false,
        parens: vec![0],
        sections: vec![false],
    };
    for (i, token) in tokens.iter().enumerate() {
        let prev = i.checked_sub(1).and_then(|p| tokens.get(p));
        printer.token(prev, token, tokens.get(i + 1));
    }
    printer.finish(config.final_newline)
}

// =============================================================================
// Tokens
// =============================================================================

fn collect<'s>(node: Node, source: &'s str, tokens: &mut Vec<Token<'s>>, last_end: &mut usize) {
    if node.is_missing() || node.start_byte() == node.end_byte() {
        return;
    }
    if node.child_count() > 0 && !is_atomic(node.kind()) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            collect(child, source, tokens, last_end);
        }
        return;
    }

    let Some(text) = source.get(node.start_byte()..node.end_byte()) else {
        return;
    };
    let text = text.trim_end();
    if text.is_empty() {
        return;
    }
    let gap = source.get(*last_end..node.start_byte()).unwrap_or("");
    *last_end = node.end_byte();

    let parent = node.parent();
    let parent_kind = parent.map_or("", |p| p.kind());
    let grandparent = parent.and_then(|p| p.parent()).map_or("", |g| g.kind());
    tokens.push(Token {
        text,
        parent: parent_kind,
        grandparent,
        newline_before: gap.contains('\n'),
        role: classify(node.kind(), text, parent_kind),
    });
}

fn classify(kind: &str, text: &str, parent: &str) -> Role {
    if kind == "comment" {
        return Role::Comment;
    }
    if kind.starts_with("preproc") {
        return Role::Directive;
    }
    let first = text.chars().next().unwrap_or(' ');
    if first.is_alphanumeric() || matches!(first, '_' | '@' | '"' | '\'' | '$') {
        return Role::Word;
    }

    let inline = INLINE_BRACE_PARENTS.contains(&parent);
    let generic = matches!(parent, "type_argument_list" | "type_parameter_list");
    match text {
        "{" if inline => Role::InlineOpen,
        "}" if inline => Role::InlineClose,
        "{" => Role::BlockOpen,
        "}" => Role::BlockClose,
        "(" | "[" => Role::Open,
        ")" | "]" => Role::Close,
        "," => Role::Comma,
        ";" => Role::Semicolon,
        "." | "::" | "->" | "?." => Role::Dot,
        "<" if generic => Role::GenericOpen,
        ">" if generic => Role::GenericClose,
        "?" if parent == "nullable_type" => Role::Postfix,
        "?" if parent == "conditional_access_expression" => Role::Dot,
        ":" if SPACED_COLON_PARENTS.contains(&parent) => Role::Binary,
        ":" if LABEL_COLON_PARENTS.contains(&parent) => Role::LabelColon,
        ":" => Role::Colon,
        _ if parent == "postfix_unary_expression" => Role::Postfix,
        _ if matches!(parent, "prefix_unary_expression" | "unary_expression") => Role::Prefix,
        _ => Role::Binary,
    }
}

/// `case` or `default` opening a switch label.
fn is_switch_label_start(token: &Token) -> bool {
    matches!(token.text, "case" | "default")
        && token.parent != "labeled_statement"
        && LABEL_COLON_PARENTS.contains(&token.parent)
}

/// Whether a space separates two tokens on the same line.
fn spaced(prev: &Token, next: &Token) -> bool {
    use Role::*;

    match (prev.role, next.role) {
        (_, Comma | Semicolon | Close | Dot | Postfix | GenericOpen | GenericClose | Colon | LabelColon) => false,
        // `- -x` must not become `--x`.
        (Prefix, Prefix) => prev.text.ends_with(next.text.chars().next().unwrap_or(' ')),
        (Open | Dot | Prefix | GenericOpen, _) => false,
        (Word, Open) => SPACED_KEYWORDS.contains(&prev.text),
        (Binary | Comma | Semicolon | Colon | LabelColon | InlineOpen | Comment, Open) => true,
        (_, Open) => false,
        (Close, _) if prev.parent == "cast_expression" => false,
        _ => true,
    }
}

// =============================================================================
// Printer
// =============================================================================

struct Printer {
    out: String,
    unit: String,
    indent: usize,
    at_line_start: bool,
    /// A line break is due before the next token (unless it is a
    /// trailing comment).
    pending_newline: bool,
    /// Open parenthesis/bracket depth per brace block.
    parens: Vec<usize>,
    /// Per brace block: statements of a switch section are indented.
    sections: Vec<bool>,
}

impl Printer {
    fn newline(&mut self) {
        if !self.at_line_start {
            let kept = self.out.trim_end_matches([' ', '\t']).len();
            self.out.truncate(kept);
            self.out.push('\n');
            self.at_line_start = true;
        }
        self.pending_newline = false;
    }

    fn write(&mut self, text: &str, space: bool) {
        if self.at_line_start {
            for _ in 0..self.indent {
                self.out.push_str(&self.unit);
            }
        } else if space {
            self.out.push(' ');
        }
        self.out.push_str(text);
        self.at_line_start = false;
    }

    fn depth(&mut self) -> &mut usize {
        if self.parens.is_empty() {
            self.parens.push(0);
        }
        let last = self.parens.len() - 1;
        &mut self.parens[last]
    }

    fn section(&mut self) -> &mut bool {
        if self.sections.is_empty() {
            self.sections.push(false);
        }
        let last = self.sections.len() - 1;
        &mut self.sections[last]
    }

    fn leave_section(&mut self) {
        if std::mem::take(self.section()) {
            self.indent = self.indent.saturating_sub(1);
        }
    }

    fn token(&mut self, prev: Option<&Token>, token: &Token, next: Option<&Token>) {
        let space = prev.is_some_and(|p| spaced(p, token));

        if is_switch_label_start(token) {
            self.leave_section();
        }

        match token.role {
            Role::BlockOpen | Role::Directive => self.newline(),
            Role::BlockClose => {
                self.leave_section();
                self.indent = self.indent.saturating_sub(1);
                self.newline();
            }
            Role::Comment if token.newline_before => self.newline(),
            // A block comment right after `{` leads the first statement.
            Role::Comment if token.text.starts_with("/*") && prev.is_some_and(|p| p.role == Role::BlockOpen) => {
                self.newline()
            }
            // Trailing comments stay on their line.
            Role::Comment => {}
            _ => {
                if self.pending_newline {
                    self.newline();
                }
            }
        }

        if token.role == Role::Directive {
            // Directives start at column 0.
            self.out.push_str(token.text);
            self.at_line_start = false;
        } else {
            self.write(token.text, space);
        }

        match token.role {
            Role::BlockOpen => {
                self.indent += 1;
                self.parens.push(0);
                self.sections.push(false);
                self.pending_newline = true;
            }
            Role::BlockClose => {
                if self.parens.len() > 1 {
                    self.parens.pop();
                }
                if self.sections.len() > 1 {
                    self.sections.pop();
                }
                let attached = next.is_some_and(|n| matches!(n.role, Role::Semicolon | Role::Comma | Role::Close));
                self.pending_newline = !attached;
            }
            Role::Open => *self.depth() += 1,
            Role::Close => {
                let depth = self.depth();
                *depth = depth.saturating_sub(1);
                if token.text == "]" && token.parent == "attribute_list" && token.grandparent != "parameter" {
                    self.pending_newline = true;
                }
            }
            Role::Semicolon => {
                if *self.depth() == 0 {
                    self.pending_newline = true;
                }
            }
            Role::LabelColon => {
                if token.parent != "labeled_statement" && !*self.section() {
                    *self.section() = true;
                    self.indent += 1;
                }
                self.pending_newline = true;
            }
            Role::Directive => self.pending_newline = true,
            Role::Comment => {
                let line_comment = token.text.starts_with("//");
                if line_comment || next.is_some_and(|n| n.newline_before) {
                    self.pending_newline = true;
                }
            }
            _ => {}
        }
    }

    fn finish(mut self, final_newline: bool) -> String {
        self.newline();
        let kept = self.out.trim_end().len();
        self.out.truncate(kept);
        if final_newline && !self.out.is_empty() {
            self.out.push('\n');
        }
        self.out
    }
}
