//! C# parser using tree-sitter.
//!
//! Parsing never fails on malformed input: tree-sitter recovers and marks
//! the damage with `ERROR` and zero-width `MISSING` nodes. [`lower`] turns
//! those into syntax diagnostics and the rest of the tree into the AST.

use tree_sitter::{Node, Parser, Tree};

use super::ast::*;
use crate::config::LanguageVersion;
use crate::diagnostic::{CompilerError, DiagnosticBag, LineIndex, Location};

/// C# parser.
pub struct CSharpParser {
    parser: Parser,
}

impl CSharpParser {
    /// Creates a new C# parser.
    pub fn new() -> Result<Self, CompilerError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_c_sharp::LANGUAGE.into())
            .map_err(|_| CompilerError::ParserInitFailed)?;
        Ok(Self { parser })
    }

    /// Parses C# source into a concrete syntax tree.
    pub fn parse(&mut self, source: &str) -> Result<Tree, CompilerError> {
        self.parser.parse(source, None).ok_or(CompilerError::ParseFailed)
    }
}

/// Converts a syntax tree to the AST, collecting syntax and language
/// version diagnostics.
pub fn lower(source: &str, tree: &Tree, version: LanguageVersion) -> (CompilationUnit, DiagnosticBag) {
    let mut visitor = Visitor::new(source, version);
    let root = tree.root_node();
    visitor.collect_syntax_errors(root);
    let unit = visitor.visit_compilation_unit(root);
    (unit, visitor.diagnostics)
}

// =============================================================================
// Node helpers
// =============================================================================

fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// Named, non-extra children (comments and region directives are skipped).
fn named<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    children(node)
        .into_iter()
        .filter(|n| n.is_named() && !n.is_extra())
        .collect()
}

/// Children that can hold an expression: named nodes plus the `this` token.
fn expression_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    children(node)
        .into_iter()
        .filter(|n| (n.is_named() && !n.is_extra()) || n.kind() == "this")
        .collect()
}

fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

fn has_token(node: Node, token: &str) -> bool {
    children(node).iter().any(|c| !c.is_named() && c.kind() == token)
}

/// Human-readable name of a grammar node kind, e.g. `switch statement`.
fn describe_kind(kind: &str) -> String {
    kind.replace('_', " ")
}

// =============================================================================
// Visitor
// =============================================================================

struct Visitor<'a> {
    source: &'a str,
    index: LineIndex<'a>,
    version: LanguageVersion,
    diagnostics: DiagnosticBag,
}

impl<'a> Visitor<'a> {
    fn new(source: &'a str, version: LanguageVersion) -> Self {
        Self {
            source,
            index: LineIndex::new(source),
            version,
            diagnostics: DiagnosticBag::new(),
        }
    }

    fn location(&self, node: Node) -> Location {
        self.index.location(node.start_byte(), node.end_byte())
    }

    fn node_text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Text with whitespace and comments removed, for dotted names.
    fn compact_text(&self, node: Node) -> String {
        self.node_text(node).chars().filter(|c| !c.is_whitespace()).collect()
    }

    // =========================================================================
    // Syntax errors
    // =========================================================================

    fn collect_syntax_errors(&mut self, node: Node) {
        if node.is_missing() {
            self.report_missing(node);
            return;
        }
        if node.is_error() && node.parent().is_some() {
            self.report_error_node(node);
            return;
        }
        if !node.has_error() {
            return;
        }
        for child in children(node) {
            self.collect_syntax_errors(child);
        }
    }

    fn report_missing(&mut self, node: Node) {
        // Reported at the end of the preceding token, where the token
        // should have been.
        let end = self.source[..node.start_byte().min(self.source.len())]
            .trim_end()
            .len();
        let (line, column) = self.index.position(end);
        let location = Location::point(line, column);
        let (id, message) = match node.kind() {
            ";" => ("CS1002", "; expected".to_string()),
            ")" => ("CS1026", ") expected".to_string()),
            "}" => ("CS1513", "} expected".to_string()),
            "{" => ("CS1514", "{ expected".to_string()),
            "identifier" => ("CS1001", "Identifier expected".to_string()),
            kind if kind.chars().all(|c| c.is_ascii_punctuation()) => {
                ("CS1003", format!("Syntax error, '{}' expected", kind))
            }
            _ => ("CS1525", "Invalid expression term".to_string()),
        };
        self.diagnostics.error(id, message, location);
    }

    fn report_error_node(&mut self, node: Node) {
        let token = first_leaf(node)
            .map(|leaf| self.node_text(leaf).to_string())
            .unwrap_or_default();
        let start = self.location(node);
        let location = Location::point(start.line, start.column);
        let parent = node.parent().map(|p| p.kind()).unwrap_or("");
        match parent {
            "compilation_unit" if token == "}" => self.diagnostics.error(
                "CS1022",
                "Type or namespace definition, or end-of-file expected",
                location,
            ),
            "declaration_list" => self.diagnostics.error(
                "CS1519",
                format!(
                    "Invalid token '{}' in class, record, struct, or interface member declaration",
                    token
                ),
                location,
            ),
            _ => self.diagnostics.error(
                "CS1525",
                format!("Invalid expression term '{}'", token),
                location,
            ),
        }
    }

    fn require(&mut self, feature: &str, minimum: LanguageVersion, node: Node) {
        if self.version >= minimum {
            return;
        }
        let location = self.location(node);
        self.diagnostics.error(
            feature_error_id(self.version),
            format!(
                "Feature '{}' is not available in C# {}. Please use language version {} or greater.",
                feature,
                version_text(self.version),
                version_text(minimum)
            ),
            location,
        );
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn visit_compilation_unit(&mut self, root: Node) -> CompilationUnit {
        let mut unit = CompilationUnit::default();
        let mut namespace = String::new();
        let mut seen_declaration = false;
        let mut seen_file_scoped = false;

        for child in named(root) {
            match child.kind() {
                "using_directive" => unit.usings.push(self.visit_using(child)),
                "global_statement" => {
                    self.require("top-level statements", LanguageVersion::CSharp9, child);
                    if seen_declaration || seen_file_scoped {
                        let location = self.location(child);
                        self.diagnostics.error(
                            "CS8803",
                            "Top-level statements must precede namespace and type declarations.",
                            location,
                        );
                    }
                    if let Some(stmt) = named(child).into_iter().next() {
                        unit.globals.push(self.visit_statement(stmt));
                    }
                }
                "file_scoped_namespace_declaration" => {
                    self.require("file-scoped namespace", LanguageVersion::CSharp10, child);
                    let location = self.location(child);
                    if seen_file_scoped {
                        self.diagnostics.error(
                            "CS8954",
                            "Source file can only contain one file-scoped namespace declaration.",
                            location,
                        );
                    } else if seen_declaration {
                        self.diagnostics.error(
                            "CS8956",
                            "File-scoped namespace must precede all other members in a file.",
                            location,
                        );
                    }
                    seen_file_scoped = true;
                    if let Some(name) = child.child_by_field_name("name") {
                        namespace = self.compact_text(name);
                    }
                }
                "namespace_declaration" => {
                    seen_declaration = true;
                    self.visit_namespace(child, &namespace, &mut unit);
                }
                "class_declaration" => {
                    seen_declaration = true;
                    let class = self.visit_class(child, &namespace);
                    unit.classes.push(class);
                }
                "ERROR" | "shebang_directive" => {}
                kind => {
                    seen_declaration = true;
                    unit.unsupported.push((describe_kind(kind), self.location(child)));
                }
            }
        }
        unit
    }

    fn visit_using(&mut self, node: Node) -> UsingDecl {
        let name = named(node)
            .into_iter()
            .last()
            .map(|n| self.compact_text(n))
            .unwrap_or_default();
        UsingDecl {
            name,
            is_static: has_token(node, "static"),
            is_alias: node.child_by_field_name("name").is_some(),
            location: self.location(node),
        }
    }

    fn visit_namespace(&mut self, node: Node, outer: &str, unit: &mut CompilationUnit) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.compact_text(n))
            .unwrap_or_default();
        let namespace = if outer.is_empty() {
            name
        } else {
            format!("{}.{}", outer, name)
        };

        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        for member in named(body) {
            match member.kind() {
                "class_declaration" => {
                    let class = self.visit_class(member, &namespace);
                    unit.classes.push(class);
                }
                "namespace_declaration" => self.visit_namespace(member, &namespace, unit),
                "using_directive" => unit.usings.push(self.visit_using(member)),
                "ERROR" => {}
                kind => unit
                    .unsupported
                    .push((describe_kind(kind), self.location(member))),
            }
        }
    }

    fn visit_modifiers(&mut self, node: Node) -> Modifiers {
        let mut modifiers = Modifiers::default();
        let mut protected = false;
        let mut internal = false;
        for child in named(node).into_iter().filter(|c| c.kind() == "modifier") {
            match self.node_text(child) {
                "static" => modifiers.is_static = true,
                "const" => modifiers.is_const = true,
                "public" => modifiers.accessibility = Accessibility::Public,
                "internal" => internal = true,
                "protected" => protected = true,
                "private" | "readonly" | "sealed" | "partial" => {}
                other => modifiers
                    .unsupported
                    .push((format!("'{}' modifier", other), self.location(child))),
            }
        }
        if modifiers.accessibility != Accessibility::Public {
            if internal {
                modifiers.accessibility = Accessibility::Internal;
            } else if protected {
                modifiers.accessibility = Accessibility::Protected;
            }
        }
        modifiers
    }

    fn visit_class(&mut self, node: Node, namespace: &str) -> ClassDecl {
        let name_node = node.child_by_field_name("name");
        let mut class = ClassDecl {
            namespace: namespace.to_string(),
            name: name_node.map(|n| self.node_text(n).to_string()).unwrap_or_default(),
            modifiers: self.visit_modifiers(node),
            fields: Vec::new(),
            methods: Vec::new(),
            unsupported: Vec::new(),
            location: name_node
                .map(|n| self.location(n))
                .unwrap_or_else(|| self.location(node)),
        };

        for child in named(node) {
            let construct = match child.kind() {
                "type_parameter_list" => Some("generic class"),
                "base_list" => Some("base class or interface list"),
                "parameter_list" => Some("primary constructor"),
                "attribute_list" => Some("attribute"),
                _ => None,
            };
            if let Some(construct) = construct {
                class
                    .unsupported
                    .push((construct.to_string(), self.location(child)));
            }
        }

        let Some(body) = node.child_by_field_name("body") else {
            return class;
        };
        for member in named(body) {
            match member.kind() {
                "field_declaration" => self.visit_field(member, &mut class),
                "method_declaration" => {
                    let method = self.visit_method(member, &mut class.unsupported);
                    class.methods.push(method);
                }
                "ERROR" => {}
                "class_declaration" => class
                    .unsupported
                    .push(("nested type".to_string(), self.location(member))),
                kind => class
                    .unsupported
                    .push((describe_kind(kind), self.location(member))),
            }
        }
        class
    }

    fn visit_field(&mut self, node: Node, class: &mut ClassDecl) {
        let modifiers = self.visit_modifiers(node);
        let Some(declaration) = named(node)
            .into_iter()
            .find(|c| c.kind() == "variable_declaration")
        else {
            return;
        };
        let ty = self.visit_type(declaration.child_by_field_name("type"));
        for declarator in self.visit_declarators(declaration) {
            class.fields.push(FieldDecl {
                ty: ty.clone(),
                name: declarator.name,
                init: declarator.init,
                modifiers: modifiers.clone(),
                location: declarator.location,
            });
        }
    }

    fn visit_method(&mut self, node: Node, unsupported: &mut Vec<(String, Location)>) -> MethodDecl {
        let name_node = node.child_by_field_name("name");
        let location = name_node
            .map(|n| self.location(n))
            .unwrap_or_else(|| self.location(node));
        if node.child_by_field_name("type_parameters").is_some() {
            unsupported.push(("generic method".to_string(), location));
        }

        let body = match node.child_by_field_name("body") {
            Some(body) if body.kind() == "block" => MethodBody::Block(self.visit_block(body)),
            Some(body) if body.kind() == "arrow_expression_clause" => {
                self.require("expression-bodied method", LanguageVersion::CSharp6, body);
                MethodBody::Expression(
                    self.visit_expression(expression_children(body).into_iter().next()),
                )
            }
            _ => MethodBody::None,
        };

        MethodDecl {
            name: name_node.map(|n| self.node_text(n).to_string()).unwrap_or_default(),
            ret: self.visit_type(node.child_by_field_name("returns")),
            params: node
                .child_by_field_name("parameters")
                .map(|list| self.visit_parameters(list, unsupported))
                .unwrap_or_default(),
            body,
            modifiers: self.visit_modifiers(node),
            location,
        }
    }

    fn visit_parameters(
        &mut self,
        list: Node,
        unsupported: &mut Vec<(String, Location)>,
    ) -> Vec<Param> {
        if has_token(list, "params") {
            unsupported.push(("params array".to_string(), self.location(list)));
        }
        named(list)
            .into_iter()
            .filter(|p| p.kind() == "parameter")
            .map(|p| {
                let name = p.child_by_field_name("name");
                Param {
                    ty: self.visit_type(p.child_by_field_name("type")),
                    name: name.map(|n| self.node_text(n).to_string()).unwrap_or_default(),
                    has_default: has_token(p, "="),
                    has_modifier: named(p).iter().any(|c| c.kind() == "modifier"),
                    location: name
                        .map(|n| self.location(n))
                        .unwrap_or_else(|| self.location(p)),
                }
            })
            .collect()
    }

    fn visit_type(&mut self, node: Option<Node>) -> TypeRef {
        let Some(node) = node else {
            return TypeRef {
                kind: TypeRefKind::Error,
                location: Location::none(),
            };
        };
        let location = self.location(node);
        let kind = if node.is_missing() || node.is_error() {
            TypeRefKind::Error
        } else {
            match node.kind() {
                "predefined_type" => TypeRefKind::Predefined(self.node_text(node).to_string()),
                "implicit_type" => {
                    self.require("implicitly typed local variable", LanguageVersion::CSharp3, node);
                    TypeRefKind::Var
                }
                "identifier" | "qualified_name" => TypeRefKind::Named(self.compact_text(node)),
                _ => TypeRefKind::Unsupported(self.compact_text(node)),
            }
        };
        TypeRef { kind, location }
    }

    fn visit_declarators(&mut self, declaration: Node) -> Vec<Declarator> {
        named(declaration)
            .into_iter()
            .filter(|c| c.kind() == "variable_declarator")
            .map(|d| {
                let name = d.child_by_field_name("name");
                let init = if has_token(d, "=") {
                    named(d)
                        .into_iter()
                        .filter(|c| Some(*c) != name)
                        .last()
                        .map(|value| self.visit_expression(Some(value)))
                } else {
                    None
                };
                Declarator {
                    name: name.map(|n| self.node_text(n).to_string()).unwrap_or_default(),
                    init,
                    location: name
                        .map(|n| self.location(n))
                        .unwrap_or_else(|| self.location(d)),
                }
            })
            .collect()
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn visit_block(&mut self, node: Node) -> Block {
        Block {
            stmts: named(node)
                .into_iter()
                .map(|stmt| self.visit_statement(stmt))
                .collect(),
            location: self.location(node),
        }
    }

    fn visit_optional_statement(&mut self, node: Option<Node>, parent: Node) -> Box<Stmt> {
        match node {
            Some(node) => Box::new(self.visit_statement(node)),
            None => Box::new(Stmt {
                kind: StmtKind::Error,
                location: self.location(parent),
            }),
        }
    }

    fn visit_statement(&mut self, node: Node) -> Stmt {
        let location = self.location(node);
        if node.is_missing() || node.is_error() {
            return Stmt {
                kind: StmtKind::Error,
                location,
            };
        }
        let kind = match node.kind() {
            "block" => StmtKind::Block(self.visit_block(node)),
            "local_declaration_statement" => self.visit_local_declaration(node),
            "expression_statement" => {
                StmtKind::Expr(self.visit_expression(expression_children(node).into_iter().next()))
            }
            "if_statement" => StmtKind::If {
                cond: self.visit_expression(node.child_by_field_name("condition")),
                then: self.visit_optional_statement(node.child_by_field_name("consequence"), node),
                otherwise: node
                    .child_by_field_name("alternative")
                    .map(|alt| Box::new(self.visit_statement(alt))),
            },
            "while_statement" => StmtKind::While {
                cond: self.visit_expression(node.child_by_field_name("condition")),
                body: self.visit_optional_statement(node.child_by_field_name("body"), node),
            },
            "for_statement" => self.visit_for(node),
            "return_statement" => StmtKind::Return(
                expression_children(node)
                    .into_iter()
                    .next()
                    .map(|e| self.visit_expression(Some(e))),
            ),
            "break_statement" => StmtKind::Break,
            "continue_statement" => StmtKind::Continue,
            "empty_statement" => StmtKind::Empty,
            "local_function_statement" => StmtKind::Unsupported("local function".to_string()),
            kind => StmtKind::Unsupported(describe_kind(kind)),
        };
        Stmt { kind, location }
    }

    fn visit_local_declaration(&mut self, node: Node) -> StmtKind {
        if has_token(node, "using") || has_token(node, "await") {
            return StmtKind::Unsupported("using declaration".to_string());
        }
        let is_const = named(node)
            .iter()
            .any(|m| m.kind() == "modifier" && self.node_text(*m) == "const");
        let Some(declaration) = named(node)
            .into_iter()
            .find(|c| c.kind() == "variable_declaration")
        else {
            return StmtKind::Error;
        };
        StmtKind::Local {
            ty: self.visit_type(declaration.child_by_field_name("type")),
            is_const,
            declarators: self.visit_declarators(declaration),
        }
    }

    fn visit_for(&mut self, node: Node) -> StmtKind {
        let mut init = Vec::new();
        for initializer in field_children(node, "initializer") {
            if initializer.kind() == "variable_declaration" {
                init.push(Stmt {
                    kind: StmtKind::Local {
                        ty: self.visit_type(initializer.child_by_field_name("type")),
                        is_const: false,
                        declarators: self.visit_declarators(initializer),
                    },
                    location: self.location(initializer),
                });
            } else if initializer.is_named() || initializer.kind() == "this" {
                let expr = self.visit_expression(Some(initializer));
                init.push(Stmt {
                    location: expr.location,
                    kind: StmtKind::Expr(expr),
                });
            }
        }
        let update = field_children(node, "update")
            .into_iter()
            .filter(|u| u.is_named() || u.kind() == "this")
            .map(|u| self.visit_expression(Some(u)))
            .collect();

        StmtKind::For {
            init,
            cond: node
                .child_by_field_name("condition")
                .map(|c| self.visit_expression(Some(c))),
            update,
            body: self.visit_optional_statement(node.child_by_field_name("body"), node),
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn visit_expression(&mut self, node: Option<Node>) -> Expr {
        let Some(node) = node else {
            return Expr {
                kind: ExprKind::Error,
                location: Location::none(),
            };
        };
        let location = self.location(node);
        if node.is_missing() || node.is_error() {
            return Expr {
                kind: ExprKind::Error,
                location,
            };
        }

        let kind = match node.kind() {
            "identifier" => ExprKind::Name(self.node_text(node).to_string()),
            "this" => ExprKind::This,
            "predefined_type" => ExprKind::PredefinedType(self.node_text(node).to_string()),
            "integer_literal" => self.visit_integer(node),
            "real_literal" => self.visit_real(node),
            "boolean_literal" => ExprKind::Literal(Literal::Bool(self.node_text(node) == "true")),
            "null_literal" => ExprKind::Literal(Literal::Null),
            "string_literal" => self.visit_string(node),
            "verbatim_string_literal" => {
                let text = self.node_text(node);
                let inner = text
                    .strip_prefix("@\"")
                    .and_then(|t| t.strip_suffix('"'))
                    .unwrap_or("");
                ExprKind::Literal(Literal::Str(inner.replace("\"\"", "\"")))
            }
            "character_literal" => ExprKind::Unsupported("char literal".to_string()),
            "raw_string_literal" => ExprKind::Unsupported("raw string literal".to_string()),
            "interpolated_string_expression" => {
                ExprKind::Unsupported("interpolated string".to_string())
            }
            "parenthesized_expression" => {
                return self.visit_expression(expression_children(node).into_iter().next());
            }
            "member_access_expression" => self.visit_member_access(node),
            "qualified_name" => self.visit_qualified_name(node),
            "invocation_expression" => ExprKind::Call {
                callee: Box::new(self.visit_expression(node.child_by_field_name("function"))),
                args: self.visit_arguments(node.child_by_field_name("arguments")),
            },
            "object_creation_expression" => ExprKind::New {
                ty: self.visit_type(node.child_by_field_name("type")),
                args: self.visit_arguments(node.child_by_field_name("arguments")),
                has_initializer: node.child_by_field_name("initializer").is_some(),
            },
            "prefix_unary_expression" => self.visit_prefix(node),
            "postfix_unary_expression" => self.visit_postfix(node),
            "binary_expression" => self.visit_binary(node),
            "assignment_expression" => self.visit_assignment(node),
            "conditional_expression" => ExprKind::Conditional {
                cond: Box::new(self.visit_expression(node.child_by_field_name("condition"))),
                then: Box::new(self.visit_expression(node.child_by_field_name("consequence"))),
                otherwise: Box::new(self.visit_expression(node.child_by_field_name("alternative"))),
            },
            "cast_expression" => ExprKind::Cast {
                ty: self.visit_type(node.child_by_field_name("type")),
                operand: Box::new(self.visit_expression(node.child_by_field_name("value"))),
            },
            "generic_name" => ExprKind::Unsupported("generic name".to_string()),
            "base" => ExprKind::Unsupported("base access".to_string()),
            kind => ExprKind::Unsupported(describe_kind(kind)),
        };
        Expr { kind, location }
    }

    fn visit_member_access(&mut self, node: Node) -> ExprKind {
        if has_token(node, "->") {
            return ExprKind::Unsupported("pointer member access".to_string());
        }
        let Some(name) = node.child_by_field_name("name") else {
            return ExprKind::Error;
        };
        if name.kind() != "identifier" {
            return ExprKind::Unsupported(describe_kind(name.kind()));
        }
        ExprKind::Member {
            target: Box::new(self.visit_expression(node.child_by_field_name("expression"))),
            name: self.node_text(name).to_string(),
            name_location: self.location(name),
        }
    }

    fn visit_qualified_name(&mut self, node: Node) -> ExprKind {
        let Some(name) = node.child_by_field_name("name") else {
            return ExprKind::Error;
        };
        ExprKind::Member {
            target: Box::new(self.visit_expression(node.child_by_field_name("qualifier"))),
            name: self.node_text(name).to_string(),
            name_location: self.location(name),
        }
    }

    fn visit_arguments(&mut self, list: Option<Node>) -> Vec<Expr> {
        let Some(list) = list else {
            return Vec::new();
        };
        named(list)
            .into_iter()
            .filter(|a| a.kind() == "argument")
            .map(|argument| {
                let location = self.location(argument);
                if argument.child_by_field_name("name").is_some() {
                    return Expr {
                        kind: ExprKind::Unsupported("named argument".to_string()),
                        location,
                    };
                }
                if ["ref", "out", "in"].iter().any(|t| has_token(argument, t)) {
                    return Expr {
                        kind: ExprKind::Unsupported("ref argument".to_string()),
                        location,
                    };
                }
                let value = children(argument).into_iter().rev().find(|c| !c.is_extra());
                self.visit_expression(value)
            })
            .collect()
    }

    fn visit_prefix(&mut self, node: Node) -> ExprKind {
        let parts = children(node);
        let operator = parts.first().map(|op| self.node_text(*op)).unwrap_or("");
        let operand = Box::new(self.visit_expression(parts.last().copied()));
        match operator {
            "++" | "--" => ExprKind::IncDec {
                increment: operator == "++",
                prefix: true,
                target: operand,
            },
            "-" => ExprKind::Unary { op: UnaryOp::Neg, operand },
            "+" => ExprKind::Unary { op: UnaryOp::Plus, operand },
            "!" => ExprKind::Unary { op: UnaryOp::Not, operand },
            "~" => ExprKind::Unary { op: UnaryOp::BitNot, operand },
            other => ExprKind::Unsupported(format!("'{}' operator", other)),
        }
    }

    fn visit_postfix(&mut self, node: Node) -> ExprKind {
        let parts = children(node);
        let operator = parts.last().map(|op| self.node_text(*op)).unwrap_or("");
        let operand = self.visit_expression(parts.first().copied());
        match operator {
            "++" | "--" => ExprKind::IncDec {
                increment: operator == "++",
                prefix: false,
                target: Box::new(operand),
            },
            // Null-forgiving `!` has no runtime effect.
            _ => operand.kind,
        }
    }

    fn visit_binary(&mut self, node: Node) -> ExprKind {
        let operator = node
            .child_by_field_name("operator")
            .map(|op| self.node_text(op))
            .unwrap_or("");
        match BinaryOp::from_token(operator) {
            Some(op) => ExprKind::Binary {
                op,
                left: Box::new(self.visit_expression(node.child_by_field_name("left"))),
                right: Box::new(self.visit_expression(node.child_by_field_name("right"))),
            },
            None => ExprKind::Unsupported(format!("'{}' operator", operator)),
        }
    }

    fn visit_assignment(&mut self, node: Node) -> ExprKind {
        let operator = node
            .child_by_field_name("operator")
            .map(|op| self.node_text(op))
            .unwrap_or("=");
        let op = if operator == "=" {
            None
        } else {
            match operator.strip_suffix('=').and_then(BinaryOp::from_token) {
                Some(op) => Some(op),
                None => return ExprKind::Unsupported(format!("'{}' operator", operator)),
            }
        };
        ExprKind::Assign {
            op,
            target: Box::new(self.visit_expression(node.child_by_field_name("left"))),
            value: Box::new(self.visit_expression(node.child_by_field_name("right"))),
        }
    }

    // =========================================================================
    // Literals
    // =========================================================================

    fn visit_integer(&mut self, node: Node) -> ExprKind {
        let text = self.node_text(node).replace('_', "");
        let lower = text.to_ascii_lowercase();
        let digits = lower.trim_end_matches(['u', 'l']);
        let suffix = &lower[digits.len()..];
        if suffix.contains('u') {
            return ExprKind::Unsupported("unsigned integer literal".to_string());
        }
        let parsed = if let Some(hex) = digits.strip_prefix("0x") {
            u64::from_str_radix(hex, 16)
        } else if let Some(bin) = digits.strip_prefix("0b") {
            u64::from_str_radix(bin, 2)
        } else {
            digits.parse::<u64>()
        };
        match parsed {
            Ok(value) => ExprKind::Literal(Literal::Int {
                value,
                long_suffix: suffix.contains('l'),
            }),
            Err(_) => ExprKind::Literal(Literal::IntOverflow),
        }
    }

    fn visit_real(&mut self, node: Node) -> ExprKind {
        let text = self.node_text(node).replace('_', "");
        let (digits, suffix) = match text.chars().last() {
            Some(c) if c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E') => {
                (&text[..text.len() - 1], Some(c.to_ascii_lowercase()))
            }
            _ => (text.as_str(), None),
        };
        match suffix {
            Some('f') => return ExprKind::Unsupported("float literal".to_string()),
            Some('m') => return ExprKind::Unsupported("decimal literal".to_string()),
            _ => {}
        }
        match digits.parse::<f64>() {
            Ok(value) => ExprKind::Literal(Literal::Real(value)),
            Err(_) => ExprKind::Error,
        }
    }

    fn visit_string(&mut self, node: Node) -> ExprKind {
        let mut value = String::new();
        for part in named(node) {
            match part.kind() {
                "string_literal_content" => value.push_str(self.node_text(part)),
                "escape_sequence" => value.push_str(&unescape(self.node_text(part))),
                "string_literal_encoding" => {
                    return ExprKind::Unsupported("UTF-8 string literal".to_string())
                }
                _ => {}
            }
        }
        ExprKind::Literal(Literal::Str(value))
    }
}

fn first_leaf(node: Node) -> Option<Node> {
    let mut current = node;
    while current.child_count() > 0 {
        current = current.child(0)?;
    }
    if current.start_byte() == current.end_byte() {
        None
    } else {
        Some(current)
    }
}

/// Decodes a single C# escape sequence such as `\n` or `A`.
fn unescape(sequence: &str) -> String {
    let body = sequence.strip_prefix('\\').unwrap_or(sequence);
    let mut chars = body.chars();
    let Some(kind) = chars.next() else {
        return String::new();
    };
    let simple = match kind {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '0' => Some('\0'),
        'a' => Some('\u{7}'),
        'b' => Some('\u{8}'),
        'f' => Some('\u{c}'),
        'v' => Some('\u{b}'),
        'e' => Some('\u{1b}'),
        '\\' => Some('\\'),
        '"' => Some('"'),
        '\'' => Some('\''),
        _ => None,
    };
    if let Some(c) = simple {
        return c.to_string();
    }
    if matches!(kind, 'x' | 'u' | 'U') {
        let hex: String = chars.collect();
        if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
            return c.to_string();
        }
    }
    sequence.to_string()
}

fn version_text(version: LanguageVersion) -> String {
    match version {
        LanguageVersion::CSharp2
        | LanguageVersion::CSharp3
        | LanguageVersion::CSharp5
        | LanguageVersion::CSharp6 => version.as_str().to_string(),
        LanguageVersion::Preview => "preview".to_string(),
        _ => format!("{}.0", version.as_str()),
    }
}

fn feature_error_id(current: LanguageVersion) -> &'static str {
    match current {
        LanguageVersion::CSharp2 | LanguageVersion::CSharp3 | LanguageVersion::CSharp5 => "CS8026",
        LanguageVersion::CSharp6 => "CS8059",
        LanguageVersion::CSharp7 => "CS8107",
        LanguageVersion::CSharp8 => "CS8400",
        LanguageVersion::CSharp9 => "CS8773",
        LanguageVersion::CSharp10 => "CS8936",
        LanguageVersion::CSharp11 => "CS9058",
        LanguageVersion::CSharp12 | LanguageVersion::Preview => "CS8652",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str, version: LanguageVersion) -> (CompilationUnit, Vec<crate::diagnostic::Diagnostic>) {
        let mut parser = CSharpParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let (unit, diagnostics) = lower(source, &tree, version);
        (unit, diagnostics.into_sorted())
    }

    #[test]
    fn test_grammar_is_compatible_with_runtime() {
        let mut parser = CSharpParser::new().expect("grammar ABI accepted by tree-sitter");
        let tree = parser.parse("class C { }").unwrap();
        assert_eq!(tree.root_node().kind(), "compilation_unit");
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn test_lowers_class_with_members() {
        let source = r#"
namespace Demo
{
    public static class Calc
    {
        private static int count = 1;
        public static int Add(int a, int b) => a + b;
        public static void Main() { System.Console.WriteLine("hi"); }
    }
}"#;
        let (unit, diagnostics) = parse(source, LanguageVersion::Preview);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(unit.classes.len(), 1);
        let class = &unit.classes[0];
        assert_eq!(class.namespace, "Demo");
        assert_eq!(class.name, "Calc");
        assert!(class.modifiers.is_static);
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.fields[0].name, "count");
        assert_eq!(class.methods.len(), 2);
        assert_eq!(class.methods[0].params.len(), 2);
        assert!(matches!(class.methods[0].body, MethodBody::Expression(_)));
    }

    #[test]
    fn test_missing_semicolon_is_reported() {
        let (_, diagnostics) = parse("class C { void M() { int x = 1 } }", LanguageVersion::Preview);
        assert!(!diagnostics.is_empty());
        assert!(diagnostics.iter().all(|d| d.is_error() && d.location.line == 1));
    }

    #[test]
    fn test_top_level_statements() {
        let (unit, diagnostics) = parse(
            "using System;\nConsole.WriteLine(1);\nint x = 2;\n",
            LanguageVersion::Preview,
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(unit.usings.len(), 1);
        assert_eq!(unit.usings[0].name, "System");
        assert_eq!(unit.globals.len(), 2);
    }

    #[test]
    fn test_version_gating() {
        let (_, diagnostics) = parse(
            "class C { static int One() => 1; }",
            LanguageVersion::CSharp5,
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].id, "CS8026");
        assert!(diagnostics[0].message.contains("expression-bodied method"));

        let (_, diagnostics) = parse("namespace N;\nclass C { }", LanguageVersion::CSharp9);
        assert_eq!(diagnostics[0].id, "CS8773");
    }

    #[test]
    fn test_literals() {
        let (unit, _) = parse(
            r#"class C { void M() { var a = 0x10; var b = 5L; var c = 1.5e2; var d = "a\tb"; var e = @"q""q"; } }"#,
            LanguageVersion::Preview,
        );
        let MethodBody::Block(block) = &unit.classes[0].methods[0].body else {
            panic!("expected block body");
        };
        let inits: Vec<&Literal> = block
            .stmts
            .iter()
            .filter_map(|s| match &s.kind {
                StmtKind::Local { declarators, .. } => declarators[0].init.as_ref(),
                _ => None,
            })
            .filter_map(|e| match &e.kind {
                ExprKind::Literal(l) => Some(l),
                _ => None,
            })
            .collect();
        assert_eq!(
            inits,
            vec![
                &Literal::Int { value: 16, long_suffix: false },
                &Literal::Int { value: 5, long_suffix: true },
                &Literal::Real(150.0),
                &Literal::Str("a\tb".to_string()),
                &Literal::Str("q\"q".to_string()),
            ]
        );
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("\\n"), "\n");
        assert_eq!(unescape("\\u0041"), "A");
        assert_eq!(unescape("\\x41"), "A");
        assert_eq!(unescape("\\\\"), "\\");
    }
}
