//! Bind the C# AST against the symbol table, producing typed IR.
//!
//! Binding runs in two passes: declarations first (so members can be used
//! before they are declared), then method bodies and field initializers.
//! Semantic errors are reported as diagnostics; binding continues past them
//! with `Ty::Error` placeholders so one mistake does not cascade.

use std::collections::HashSet;

use super::ast::{self, *};
use crate::config::OutputKind;
use crate::diagnostic::{CompilerError, DiagnosticBag, Location};
use crate::frontend::CompilationOptions;
use crate::image::{INSTANCE_INIT, STATIC_INIT};
use crate::ir::symbols::{keyword_runtime_name, keyword_type};
use crate::ir::{
    self, ClassRef, ExprIR, ExprKind, FieldIR, FieldRef, FieldSymbol, LocalIR, LocalKind,
    MethodIR, MethodRef, MethodSymbol, Place, ProgramIR, StmtIR, SymbolTable, Ty, TypeIR,
    TypeSymbol, UsingIR,
};
use crate::reference::ReferenceCatalog;

/// Name of the class synthesized for top-level statements.
pub const TOP_LEVEL_CLASS: &str = "Program";

/// Name of the entry point synthesized for top-level statements.
pub const TOP_LEVEL_MAIN: &str = "<Main>$";

/// Binds a parsed compilation unit.
///
/// Fails only when cancelled; source errors go to `diagnostics`.
pub fn to_ir(
    unit: &CompilationUnit,
    catalog: &ReferenceCatalog,
    options: &CompilationOptions,
    diagnostics: &mut DiagnosticBag,
) -> Result<ProgramIR, CompilerError> {
    let mut binder = Binder {
        symbols: SymbolTable::from_catalog(catalog),
        diagnostics,
        options,
        usings: Vec::new(),
        static_usings: Vec::new(),
        classes: Vec::new(),
    };
    binder.bind_usings(&unit.usings);
    binder.declare_types(unit);
    let types = binder.bind_bodies(unit)?;
    let entry_point = binder.find_entry_point(unit);

    Ok(ProgramIR {
        assembly_name: options.assembly_name.clone(),
        references: catalog.names(),
        usings: binder.usings,
        types,
        entry_point,
    })
}

// =============================================================================
// Binder state
// =============================================================================

/// Declaration-pass facts about one local class.
struct ClassInfo<'u> {
    decl: Option<&'u ClassDecl>,
    class: ClassRef,
    namespace: String,
    name: String,
    is_static: bool,
    static_init: Option<u32>,
    instance_init: Option<u32>,
    location: Location,
}

struct Binder<'a> {
    symbols: SymbolTable,
    diagnostics: &'a mut DiagnosticBag,
    options: &'a CompilationOptions,
    usings: Vec<UsingIR>,
    /// Types imported by `using static`, with the index of their directive.
    static_usings: Vec<(ClassRef, usize)>,
    classes: Vec<ClassInfo<'a>>,
}

/// Per-method binding context.
struct MethodCtx {
    class: ClassRef,
    namespace: String,
    is_static: bool,
    ret: Ty,
    display: String,
    locals: Vec<LocalIR>,
    scopes: Vec<Vec<(String, u16)>>,
    consts: HashSet<u16>,
    loop_depth: usize,
    /// Binding a field initializer rather than a method body.
    field_init: bool,
}

impl MethodCtx {
    fn new(class: ClassRef, namespace: &str, is_static: bool, ret: Ty, display: String) -> Self {
        let mut ctx = Self {
            class,
            namespace: namespace.to_string(),
            is_static,
            ret,
            display,
            locals: Vec::new(),
            scopes: vec![Vec::new()],
            consts: HashSet::new(),
            loop_depth: 0,
            field_init: false,
        };
        if !is_static {
            ctx.locals.push(LocalIR {
                name: "this".to_string(),
                ty: Ty::Class(class),
                kind: LocalKind::This,
                location: Location::none(),
            });
        }
        ctx
    }

    fn lookup(&self, name: &str) -> Option<u16> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(n, _)| n == name)
            .map(|(_, slot)| *slot)
    }

    fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }
}

/// Result of binding something that may not be a value.
enum Bound {
    Value(ExprIR),
    Type(ClassRef),
    /// A keyword type with no runtime type in the catalog.
    Keyword(String),
    Namespace(String),
    Methods {
        target: Option<ExprIR>,
        class: ClassRef,
        name: String,
        type_qualified: bool,
    },
    /// `x.ToString` awaiting its call.
    ToString(ExprIR),
}

fn namespace_chain(namespace: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = namespace.to_string();
    while !current.is_empty() {
        chain.push(current.clone());
        match current.rfind('.') {
            Some(dot) => current.truncate(dot),
            None => current.clear(),
        }
    }
    chain.push(String::new());
    chain
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

/// Cost of an implicit conversion; `None` if there is none.
fn conversion_cost(from: Ty, to: Ty) -> Option<u8> {
    if from == to || from.is_error() || to.is_error() {
        return Some(0);
    }
    match (from, to) {
        (Ty::Int, Ty::Long) | (Ty::Long, Ty::Double) => Some(1),
        (Ty::Int, Ty::Double) => Some(2),
        (Ty::Null, Ty::String) | (Ty::Null, Ty::Class(_)) => Some(1),
        (Ty::Null, Ty::Object) => Some(2),
        (Ty::Void, _) => None,
        (_, Ty::Object) => Some(3),
        _ => None,
    }
}

fn is_statement_expression(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ast::ExprKind::Assign { .. }
            | ast::ExprKind::IncDec { .. }
            | ast::ExprKind::Call { .. }
            | ast::ExprKind::New { .. }
            | ast::ExprKind::Error
    )
}

impl<'a> Binder<'a> {
    fn unsupported(&mut self, what: &str, location: Location) {
        self.diagnostics
            .error("FDL0001", format!("'{}' is not supported", what), location);
    }

    fn display(&self, ty: Ty) -> String {
        self.symbols.display(ty)
    }

    fn type_name(&self, class: ClassRef) -> String {
        self.symbols
            .get(class)
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    fn method_display(&self, class: ClassRef, method: &MethodSymbol) -> String {
        let params: Vec<String> = method.params.iter().map(|p| self.display(*p)).collect();
        format!("{}.{}({})", self.type_name(class), method.name, params.join(", "))
    }

    // =========================================================================
    // Usings and type names
    // =========================================================================

    fn bind_usings(&mut self, usings: &[UsingDecl]) {
        let mut seen = HashSet::new();
        for using in usings {
            let index = self.usings.len();
            // Aliases and unresolved directives count as used so they are
            // not also reported as unnecessary.
            let mut used = false;
            if using.is_alias {
                self.unsupported("using alias", using.location);
                used = true;
            } else if !seen.insert((using.name.clone(), using.is_static)) {
                self.diagnostics.warning(
                    "CS0105",
                    format!(
                        "The using directive for '{}' appeared previously in this namespace",
                        using.name
                    ),
                    using.location,
                );
            } else if using.is_static {
                match self.symbols.lookup(&using.name).map(|s| s.class) {
                    Some(class) => self.static_usings.push((class, index)),
                    None => {
                        self.report_missing_type(&using.name, using.location);
                        used = true;
                    }
                }
            } else if !self.symbols.is_namespace(&using.name) {
                self.diagnostics.error(
                    "CS0246",
                    format!(
                        "The type or namespace name '{}' could not be found (are you missing a using directive or an assembly reference?)",
                        using.name
                    ),
                    using.location,
                );
                used = true;
            }
            self.usings.push(UsingIR {
                name: using.name.clone(),
                location: using.location,
                used,
            });
        }
    }

    fn report_missing_type(&mut self, name: &str, location: Location) {
        self.diagnostics.error(
            "CS0246",
            format!(
                "The type or namespace name '{}' could not be found (are you missing a using directive or an assembly reference?)",
                name
            ),
            location,
        );
    }

    /// Resolves a type name as written in `namespace`, marking the using
    /// directive that made it visible.
    fn lookup_type_name(&mut self, name: &str, namespace: &str) -> Option<ClassRef> {
        for prefix in namespace_chain(namespace) {
            if let Some(symbol) = self.symbols.lookup(&qualify(&prefix, name)) {
                return Some(symbol.class);
            }
        }
        if name.contains('.') {
            return None;
        }
        let mut found = None;
        for using in self.usings.iter_mut() {
            if let Some(symbol) = self.symbols.lookup(&qualify(&using.name, name)) {
                using.used = true;
                found.get_or_insert(symbol.class);
            }
        }
        found
    }

    fn resolve_type(&mut self, ty: &TypeRef, namespace: &str) -> Ty {
        match &ty.kind {
            TypeRefKind::Predefined(keyword) => match keyword.as_str() {
                "void" => Ty::Void,
                "bool" => Ty::Bool,
                "int" => Ty::Int,
                "long" => Ty::Long,
                "double" => Ty::Double,
                "string" => Ty::String,
                "object" => Ty::Object,
                other => {
                    self.unsupported(&format!("type {}", other), ty.location);
                    Ty::Error
                }
            },
            TypeRefKind::Named(name) => match self.lookup_type_name(name, namespace) {
                Some(class) => {
                    let full_name = self
                        .symbols
                        .get(class)
                        .map(TypeSymbol::full_name)
                        .unwrap_or_default();
                    keyword_type(&full_name).unwrap_or(Ty::Class(class))
                }
                None => {
                    self.report_missing_type(name, ty.location);
                    Ty::Error
                }
            },
            TypeRefKind::Var => {
                self.diagnostics.error(
                    "CS0825",
                    "The contextual keyword 'var' may only appear within a local variable declaration",
                    ty.location,
                );
                Ty::Error
            }
            TypeRefKind::Unsupported(text) => {
                self.unsupported(&format!("type {}", text), ty.location);
                Ty::Error
            }
            TypeRefKind::Error => Ty::Error,
        }
    }

    // =========================================================================
    // Declaration pass
    // =========================================================================

    fn declare_types(&mut self, unit: &'a CompilationUnit) {
        for (what, location) in &unit.unsupported {
            self.unsupported(what, *location);
        }

        let mut declared = HashSet::new();
        for decl in &unit.classes {
            let full_name = qualify(&decl.namespace, &decl.name);
            if !decl.name.is_empty() && !declared.insert(full_name) {
                let container = if decl.namespace.is_empty() {
                    "<global namespace>".to_string()
                } else {
                    decl.namespace.clone()
                };
                self.diagnostics.error(
                    "CS0101",
                    format!(
                        "The namespace '{}' already contains a definition for '{}'",
                        container, decl.name
                    ),
                    decl.location,
                );
            }
            let class = ClassRef::Local(self.classes.len() as u32);
            self.classes.push(ClassInfo {
                decl: Some(decl),
                class,
                namespace: decl.namespace.clone(),
                name: decl.name.clone(),
                is_static: decl.modifiers.is_static,
                static_init: None,
                instance_init: None,
                location: decl.location,
            });
            self.symbols
                .insert(TypeSymbol::new(class, decl.namespace.clone(), decl.name.clone()));
        }

        if !unit.globals.is_empty() {
            let location = unit.globals[0].location;
            if self.options.output_kind == OutputKind::Library {
                self.diagnostics.error(
                    "CS8805",
                    "Program using top-level statements must be an executable.",
                    location,
                );
            }
            if !declared.insert(TOP_LEVEL_CLASS.to_string()) {
                self.diagnostics.error(
                    "CS0101",
                    format!(
                        "The namespace '<global namespace>' already contains a definition for '{}'",
                        TOP_LEVEL_CLASS
                    ),
                    location,
                );
            }
            let class = ClassRef::Local(self.classes.len() as u32);
            self.classes.push(ClassInfo {
                decl: None,
                class,
                namespace: String::new(),
                name: TOP_LEVEL_CLASS.to_string(),
                is_static: false,
                static_init: None,
                instance_init: None,
                location,
            });
            let mut symbol = TypeSymbol::new(class, "", TOP_LEVEL_CLASS);
            symbol.is_public = false;
            symbol.methods.push(MethodSymbol {
                name: TOP_LEVEL_MAIN.to_string(),
                params: Vec::new(),
                ret: Ty::Void,
                is_static: true,
                is_public: false,
                is_special: false,
            });
            self.symbols.insert(symbol);
        }

        for index in 0..self.classes.len() {
            if let Some(decl) = self.classes[index].decl {
                self.declare_members(index, decl);
            }
        }
    }

    fn declare_members(&mut self, index: usize, decl: &ClassDecl) {
        let class = self.classes[index].class;
        let namespace = decl.namespace.clone();
        let is_static_class = decl.modifiers.is_static;

        for (what, location) in decl
            .unsupported
            .iter()
            .chain(decl.modifiers.unsupported.iter())
        {
            self.unsupported(what, *location);
        }

        let mut member_names: HashSet<String> = HashSet::new();
        let mut fields = Vec::new();
        let mut needs_static_init = false;
        let mut needs_instance_init = false;

        for field in &decl.fields {
            for (what, location) in &field.modifiers.unsupported {
                self.unsupported(what, *location);
            }
            let mut ty = self.resolve_type(&field.ty, &namespace);
            if ty == Ty::Void {
                self.diagnostics
                    .error("CS0670", "Field cannot have void type", field.ty.location);
                ty = Ty::Error;
            }
            let is_static = field.modifiers.is_static || field.modifiers.is_const;
            if field.modifiers.is_const && field.init.is_none() {
                self.diagnostics.error(
                    "CS0145",
                    "A const field requires a value to be provided",
                    field.location,
                );
            }
            if field.modifiers.is_const && field.modifiers.is_static {
                self.diagnostics.error(
                    "CS0504",
                    format!("The constant '{}.{}' cannot be marked static", decl.name, field.name),
                    field.location,
                );
            }
            if is_static_class && !is_static {
                self.diagnostics.error(
                    "CS0708",
                    format!("'{}.{}': cannot declare instance members in a static class", decl.name, field.name),
                    field.location,
                );
            }
            if !member_names.insert(field.name.clone()) {
                self.report_duplicate_member(&decl.name, &field.name, field.location);
            }
            if field.init.is_some() {
                if is_static {
                    needs_static_init = true;
                } else {
                    needs_instance_init = true;
                }
            }
            fields.push(FieldSymbol {
                name: field.name.clone(),
                ty,
                is_static,
                is_public: field.modifiers.accessibility.is_visible(),
                read_only: field.modifiers.is_const,
            });
        }

        let mut methods: Vec<MethodSymbol> = Vec::new();
        let mut signatures: Vec<(String, Vec<Ty>)> = Vec::new();
        for method in &decl.methods {
            for (what, location) in &method.modifiers.unsupported {
                self.unsupported(what, *location);
            }
            let ret = self.resolve_type(&method.ret, &namespace);
            let mut params = Vec::new();
            let mut param_names = HashSet::new();
            for param in &method.params {
                if param.has_modifier {
                    self.unsupported("ref, out or in parameter", param.location);
                }
                if param.has_default {
                    self.unsupported("optional parameter", param.location);
                }
                if !param_names.insert(param.name.clone()) {
                    self.diagnostics.error(
                        "CS0100",
                        format!("The parameter name '{}' is a duplicate", param.name),
                        param.location,
                    );
                }
                let mut ty = self.resolve_type(&param.ty, &namespace);
                if ty == Ty::Void {
                    self.diagnostics
                        .error("CS1536", "Invalid parameter type 'void'", param.ty.location);
                    ty = Ty::Error;
                }
                params.push(ty);
            }
            let is_static = method.modifiers.is_static;
            if is_static_class && !is_static {
                self.diagnostics.error(
                    "CS0708",
                    format!("'{}': cannot declare instance members in a static class", method.name),
                    method.location,
                );
            }
            if method.name == decl.name {
                self.diagnostics.error(
                    "CS0542",
                    format!("'{}': member names cannot be the same as their enclosing type", method.name),
                    method.location,
                );
            }
            if signatures
                .iter()
                .any(|(name, sig)| *name == method.name && *sig == params)
            {
                let shown: Vec<String> = params.iter().map(|p| self.display(*p)).collect();
                self.diagnostics.error(
                    "CS0111",
                    format!(
                        "Type '{}' already defines a member called '{}' with the same parameter types ({})",
                        decl.name,
                        method.name,
                        shown.join(", ")
                    ),
                    method.location,
                );
            } else if fields.iter().any(|f| f.name == method.name) {
                self.report_duplicate_member(&decl.name, &method.name, method.location);
            }
            signatures.push((method.name.clone(), params.clone()));
            methods.push(MethodSymbol {
                name: method.name.clone(),
                params,
                ret,
                is_static,
                is_public: method.modifiers.accessibility.is_visible(),
                is_special: false,
            });
        }

        let info = &mut self.classes[index];
        if needs_static_init {
            info.static_init = Some(methods.len() as u32);
            methods.push(initializer_symbol(STATIC_INIT, true));
        }
        if needs_instance_init {
            info.instance_init = Some(methods.len() as u32);
            methods.push(initializer_symbol(INSTANCE_INIT, false));
        }

        if let Some(symbol) = self.symbols.get_mut(class) {
            symbol.is_static = decl.modifiers.is_static;
            symbol.is_public = decl.modifiers.accessibility == Accessibility::Public;
            symbol.fields = fields;
            symbol.methods = methods;
        }
    }

    fn report_duplicate_member(&mut self, type_name: &str, member: &str, location: Location) {
        self.diagnostics.error(
            "CS0102",
            format!("The type '{}' already contains a definition for '{}'", type_name, member),
            location,
        );
    }

    // =========================================================================
    // Body pass
    // =========================================================================

    fn check_cancelled(&self) -> Result<(), CompilerError> {
        self.options.check_cancelled()
    }

    fn bind_bodies(&mut self, unit: &'a CompilationUnit) -> Result<Vec<TypeIR>, CompilerError> {
        let mut types = Vec::with_capacity(self.classes.len());
        for index in 0..self.classes.len() {
            self.check_cancelled()?;
            let (class, decl) = (self.classes[index].class, self.classes[index].decl);
            let symbol = self.symbols.get(class).cloned();
            let Some(symbol) = symbol else {
                continue;
            };

            let fields = symbol
                .fields
                .iter()
                .enumerate()
                .map(|(i, f)| FieldIR {
                    name: f.name.clone(),
                    ty: f.ty,
                    is_static: f.is_static,
                    is_public: f.is_public,
                    location: decl
                        .and_then(|d| d.fields.get(i))
                        .map(|d| d.location)
                        .unwrap_or_default(),
                })
                .collect();

            let mut methods = Vec::with_capacity(symbol.methods.len());
            match decl {
                Some(decl) => {
                    for (method, method_symbol) in decl.methods.iter().zip(&symbol.methods) {
                        self.check_cancelled()?;
                        methods.push(self.bind_method(class, &decl.namespace, method, method_symbol));
                    }
                    if self.classes[index].static_init.is_some() {
                        methods.push(self.bind_initializer(class, decl, true));
                    }
                    if self.classes[index].instance_init.is_some() {
                        methods.push(self.bind_initializer(class, decl, false));
                    }
                }
                None => methods.push(self.bind_top_level(class, &unit.globals)),
            }

            let info = &self.classes[index];
            types.push(TypeIR {
                namespace: info.namespace.clone(),
                name: info.name.clone(),
                is_static: info.is_static,
                is_public: symbol.is_public,
                fields,
                methods,
                static_init: info.static_init,
                instance_init: info.instance_init,
                location: info.location,
            });
        }
        Ok(types)
    }

    fn bind_method(
        &mut self,
        class: ClassRef,
        namespace: &str,
        method: &MethodDecl,
        symbol: &MethodSymbol,
    ) -> MethodIR {
        let display = self.method_display(class, symbol);
        let mut ctx = MethodCtx::new(class, namespace, symbol.is_static, symbol.ret, display);
        for (param, ty) in method.params.iter().zip(&symbol.params) {
            let slot = ctx.locals.len() as u16;
            ctx.locals.push(LocalIR {
                name: param.name.clone(),
                ty: *ty,
                kind: LocalKind::Param,
                location: param.location,
            });
            ctx.scopes[0].push((param.name.clone(), slot));
        }
        let param_count = ctx.locals.len();

        let body = match &method.body {
            MethodBody::Block(block) => {
                ctx.push_scope();
                self.bind_block_stmts(&mut ctx, &block.stmts)
            }
            MethodBody::Expression(expr) => {
                if symbol.ret == Ty::Void {
                    if !is_statement_expression(expr) {
                        self.report_not_a_statement(expr.location);
                    }
                    let bound = self.bind_value(&mut ctx, expr);
                    vec![StmtIR {
                        location: expr.location,
                        kind: ir::StmtKind::Expr(bound),
                    }]
                } else {
                    let bound = self.bind_value(&mut ctx, expr);
                    let value = self.convert_assign(bound, symbol.ret);
                    vec![StmtIR {
                        location: expr.location,
                        kind: ir::StmtKind::Return(Some(value)),
                    }]
                }
            }
            MethodBody::None => {
                self.diagnostics.error(
                    "CS0501",
                    format!(
                        "'{}' must declare a body because it is not marked abstract, extern, or partial",
                        ctx.display
                    ),
                    method.location,
                );
                Vec::new()
            }
        };

        MethodIR {
            name: symbol.name.clone(),
            ret: symbol.ret,
            is_static: symbol.is_static,
            is_public: symbol.is_public,
            param_count,
            locals: ctx.locals,
            body,
            synthesized: false,
            location: method.location,
        }
    }

    fn bind_initializer(&mut self, class: ClassRef, decl: &ClassDecl, is_static: bool) -> MethodIR {
        let name = if is_static { STATIC_INIT } else { INSTANCE_INIT };
        let display = format!("{}.{}()", decl.name, name);
        let mut ctx = MethodCtx::new(class, &decl.namespace, is_static, Ty::Void, display);
        ctx.field_init = true;
        let param_count = ctx.locals.len();

        let field_types: Vec<(Ty, bool)> = self
            .symbols
            .get(class)
            .map(|s| s.fields.iter().map(|f| (f.ty, f.is_static)).collect())
            .unwrap_or_default();

        let mut body = Vec::new();
        for (index, field) in decl.fields.iter().enumerate() {
            let Some(init) = &field.init else {
                continue;
            };
            let Some(&(ty, field_static)) = field_types.get(index) else {
                continue;
            };
            if field_static != is_static {
                continue;
            }
            let bound = self.bind_value(&mut ctx, init);
            if field.modifiers.is_const && !bound.is_constant() && !bound.ty.is_error() {
                self.diagnostics.error(
                    "CS0133",
                    format!("The expression being assigned to '{}.{}' must be constant", decl.name, field.name),
                    init.location,
                );
            }
            let value = self.convert_assign(bound, ty);
            let target = if is_static {
                None
            } else {
                Some(Box::new(ExprIR::new(ExprKind::This, Ty::Class(class), field.location)))
            };
            body.push(StmtIR {
                location: field.location,
                kind: ir::StmtKind::Expr(ExprIR::new(
                    ExprKind::Assign {
                        target: Place::Field {
                            target,
                            field: FieldRef {
                                class,
                                index: index as u32,
                            },
                        },
                        op: None,
                        value: Box::new(value),
                    },
                    ty,
                    field.location,
                )),
            });
        }

        MethodIR {
            name: name.to_string(),
            ret: Ty::Void,
            is_static,
            is_public: false,
            param_count,
            locals: ctx.locals,
            body,
            synthesized: true,
            location: decl.location,
        }
    }

    fn bind_top_level(&mut self, class: ClassRef, globals: &[Stmt]) -> MethodIR {
        let display = format!("{}.{}()", TOP_LEVEL_CLASS, TOP_LEVEL_MAIN);
        let mut ctx = MethodCtx::new(class, "", true, Ty::Void, display);
        let body = self.bind_block_stmts(&mut ctx, globals);
        MethodIR {
            name: TOP_LEVEL_MAIN.to_string(),
            ret: Ty::Void,
            is_static: true,
            is_public: false,
            param_count: 0,
            locals: ctx.locals,
            body,
            synthesized: true,
            location: globals.first().map(|s| s.location).unwrap_or_default(),
        }
    }

    fn find_entry_point(&mut self, unit: &CompilationUnit) -> Option<MethodRef> {
        let mut candidates = Vec::new();
        for info in &self.classes {
            let Some(symbol) = self.symbols.get(info.class) else {
                continue;
            };
            for (index, method) in symbol.methods_named("Main") {
                if method.is_static && method.params.is_empty() && matches!(method.ret, Ty::Void | Ty::Int) {
                    candidates.push((MethodRef { class: info.class, index }, info.location));
                }
            }
        }

        if !unit.globals.is_empty() {
            let top_level = self
                .classes
                .iter()
                .find(|c| c.decl.is_none())
                .map(|c| MethodRef { class: c.class, index: 0 });
            for (method, location) in &candidates {
                let name = self.type_name(method.class);
                self.diagnostics.warning(
                    "CS7022",
                    format!("The entry point of the program is global code; ignoring '{}.Main()' entry point.", name),
                    *location,
                );
            }
            return top_level;
        }

        let is_executable = self.options.output_kind == OutputKind::ConsoleApplication;
        match candidates.len() {
            1 => Some(candidates[0].0),
            0 => {
                if is_executable {
                    self.diagnostics.error(
                        "CS5001",
                        "Program does not contain a static 'Main' method suitable for an entry point",
                        Location::none(),
                    );
                }
                None
            }
            _ => {
                if is_executable {
                    self.diagnostics.error(
                        "CS0017",
                        "Program has more than one entry point defined.",
                        candidates[1].1,
                    );
                }
                None
            }
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn bind_block_stmts(&mut self, ctx: &mut MethodCtx, stmts: &[Stmt]) -> Vec<StmtIR> {
        stmts.iter().map(|stmt| self.bind_stmt(ctx, stmt)).collect()
    }

    /// Binds the body of an `if`, `while` or `for`, which gets its own scope.
    fn bind_embedded(&mut self, ctx: &mut MethodCtx, stmt: &Stmt) -> StmtIR {
        if matches!(stmt.kind, StmtKind::Local { .. }) {
            self.diagnostics.error(
                "CS1023",
                "Embedded statement cannot be a declaration or labeled statement",
                stmt.location,
            );
        }
        ctx.push_scope();
        let bound = self.bind_stmt(ctx, stmt);
        ctx.pop_scope();
        bound
    }

    fn bind_condition(&mut self, ctx: &mut MethodCtx, cond: &Expr) -> ExprIR {
        let bound = self.bind_value(ctx, cond);
        self.convert_assign(bound, Ty::Bool)
    }

    fn bind_stmt(&mut self, ctx: &mut MethodCtx, stmt: &Stmt) -> StmtIR {
        let location = stmt.location;
        let kind = match &stmt.kind {
            StmtKind::Local {
                ty,
                is_const,
                declarators,
            } => self.bind_local(ctx, ty, *is_const, declarators),
            StmtKind::Expr(expr) => {
                if !is_statement_expression(expr) {
                    self.report_not_a_statement(expr.location);
                }
                ir::StmtKind::Expr(self.bind_value(ctx, expr))
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => ir::StmtKind::If {
                cond: self.bind_condition(ctx, cond),
                then: Box::new(self.bind_embedded(ctx, then)),
                otherwise: otherwise
                    .as_ref()
                    .map(|s| Box::new(self.bind_embedded(ctx, s))),
            },
            StmtKind::While { cond, body } => {
                let cond = self.bind_condition(ctx, cond);
                ctx.loop_depth += 1;
                let body = self.bind_embedded(ctx, body);
                ctx.loop_depth -= 1;
                ir::StmtKind::While {
                    cond,
                    body: Box::new(body),
                }
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                ctx.push_scope();
                let init = init.iter().map(|s| self.bind_stmt(ctx, s)).collect();
                let cond = cond.as_ref().map(|c| self.bind_condition(ctx, c));
                let update = update
                    .iter()
                    .map(|u| {
                        if !is_statement_expression(u) {
                            self.report_not_a_statement(u.location);
                        }
                        self.bind_value(ctx, u)
                    })
                    .collect();
                ctx.loop_depth += 1;
                let body = self.bind_embedded(ctx, body);
                ctx.loop_depth -= 1;
                ctx.pop_scope();
                ir::StmtKind::For {
                    init,
                    cond,
                    update,
                    body: Box::new(body),
                }
            }
            StmtKind::Return(value) => self.bind_return(ctx, value.as_ref(), location),
            StmtKind::Break | StmtKind::Continue => {
                if ctx.loop_depth == 0 {
                    self.diagnostics.error(
                        "CS0139",
                        "No enclosing loop out of which to break or continue",
                        location,
                    );
                    ir::StmtKind::Error
                } else if matches!(stmt.kind, StmtKind::Break) {
                    ir::StmtKind::Break
                } else {
                    ir::StmtKind::Continue
                }
            }
            StmtKind::Block(block) => {
                ctx.push_scope();
                let stmts = self.bind_block_stmts(ctx, &block.stmts);
                ctx.pop_scope();
                ir::StmtKind::Block(stmts)
            }
            StmtKind::Empty => ir::StmtKind::Block(Vec::new()),
            StmtKind::Unsupported(what) => {
                self.unsupported(what, location);
                ir::StmtKind::Error
            }
            StmtKind::Error => ir::StmtKind::Error,
        };
        StmtIR { kind, location }
    }

    fn report_not_a_statement(&mut self, location: Location) {
        self.diagnostics.error(
            "CS0201",
            "Only assignment, call, increment, decrement, await, and new object expressions can be used as a statement",
            location,
        );
    }

    fn bind_return(&mut self, ctx: &mut MethodCtx, value: Option<&Expr>, location: Location) -> ir::StmtKind {
        match (value, ctx.ret) {
            (Some(expr), Ty::Void) => {
                self.diagnostics.error(
                    "CS0127",
                    format!(
                        "Since '{}' returns void, a return keyword must not be followed by an object expression",
                        ctx.display
                    ),
                    location,
                );
                self.bind_value(ctx, expr);
                ir::StmtKind::Error
            }
            (Some(expr), ret) => {
                let bound = self.bind_value(ctx, expr);
                ir::StmtKind::Return(Some(self.convert_assign(bound, ret)))
            }
            (None, Ty::Void) => ir::StmtKind::Return(None),
            (None, ret) => {
                if !ret.is_error() {
                    self.diagnostics.error(
                        "CS0126",
                        format!("An object of a type convertible to '{}' is required", self.display(ret)),
                        location,
                    );
                }
                ir::StmtKind::Error
            }
        }
    }

    fn bind_local(
        &mut self,
        ctx: &mut MethodCtx,
        ty: &TypeRef,
        is_const: bool,
        declarators: &[Declarator],
    ) -> ir::StmtKind {
        let is_var = ty.kind == TypeRefKind::Var;
        let declared = if is_var {
            None
        } else {
            let resolved = self.resolve_type(ty, &ctx.namespace);
            if resolved == Ty::Void {
                self.diagnostics.error(
                    "CS1547",
                    "Keyword 'void' cannot be used in this context",
                    ty.location,
                );
                Some(Ty::Error)
            } else {
                Some(resolved)
            }
        };
        if is_var && declarators.len() > 1 {
            self.diagnostics.error(
                "CS0819",
                "Implicitly-typed variables cannot have multiple declarators",
                ty.location,
            );
        }
        if is_var && is_const {
            self.diagnostics.error(
                "CS0822",
                "Implicitly-typed variables cannot be constant",
                ty.location,
            );
        }

        let mut stmts = Vec::with_capacity(declarators.len());
        for declarator in declarators {
            let mut init = declarator.init.as_ref().map(|e| self.bind_value(ctx, e));
            let local_ty = match declared {
                Some(ty) => ty,
                None => match &init {
                    None => {
                        self.diagnostics.error(
                            "CS0818",
                            "Implicitly-typed variables must be initialized",
                            declarator.location,
                        );
                        Ty::Error
                    }
                    Some(value) if matches!(value.ty, Ty::Null | Ty::Void) => {
                        let what = if value.ty == Ty::Null { "<null>" } else { "void" };
                        self.diagnostics.error(
                            "CS0815",
                            format!("Cannot assign {} to an implicitly-typed variable", what),
                            declarator.location,
                        );
                        Ty::Error
                    }
                    Some(value) => value.ty,
                },
            };
            if is_const {
                match &init {
                    None => self.diagnostics.error(
                        "CS0145",
                        "A const field requires a value to be provided",
                        declarator.location,
                    ),
                    Some(value) if !value.is_constant() && !value.ty.is_error() => {
                        self.diagnostics.error(
                            "CS0133",
                            format!("The expression being assigned to '{}' must be constant", declarator.name),
                            value.location,
                        )
                    }
                    _ => {}
                }
            }
            init = init.map(|value| self.convert_assign(value, local_ty));

            let slot = self.declare_local(ctx, &declarator.name, local_ty, declarator.location);
            if is_const {
                ctx.consts.insert(slot);
            }
            stmts.push(StmtIR {
                kind: ir::StmtKind::Local { slot, init },
                location: declarator.location,
            });
        }

        if stmts.len() == 1 {
            stmts.pop().map(|s| s.kind).unwrap_or(ir::StmtKind::Error)
        } else {
            ir::StmtKind::Block(stmts)
        }
    }

    fn declare_local(&mut self, ctx: &mut MethodCtx, name: &str, ty: Ty, location: Location) -> u16 {
        let in_current = ctx
            .scopes
            .last()
            .map(|scope| scope.iter().any(|(n, _)| n == name))
            .unwrap_or(false);
        if in_current {
            self.diagnostics.error(
                "CS0128",
                format!("A local variable or function named '{}' is already defined in this scope", name),
                location,
            );
        } else if ctx.lookup(name).is_some() {
            self.diagnostics.error(
                "CS0136",
                format!(
                    "A local or parameter named '{}' cannot be declared in this scope because that name is used in an enclosing local scope to define a local or parameter",
                    name
                ),
                location,
            );
        }
        let slot = ctx.locals.len() as u16;
        ctx.locals.push(LocalIR {
            name: name.to_string(),
            ty,
            kind: LocalKind::Local,
            location,
        });
        if let Some(scope) = ctx.scopes.last_mut() {
            scope.push((name.to_string(), slot));
        }
        slot
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    /// Inserts the conversion node for an implicit conversion known to exist.
    fn coerce(&self, expr: ExprIR, to: Ty) -> ExprIR {
        if expr.ty == to || expr.ty.is_error() || to.is_error() {
            return expr;
        }
        if expr.ty == Ty::Null {
            return ExprIR::new(expr.kind, to, expr.location);
        }
        let location = expr.location;
        // Fold widening of numeric literals so they stay constants.
        let folded = match (&expr.kind, to) {
            (ExprKind::Int(v), Ty::Long) => Some(ExprKind::Long(*v as i64)),
            (ExprKind::Int(v), Ty::Double) => Some(ExprKind::Double(*v as f64)),
            (ExprKind::Long(v), Ty::Double) => Some(ExprKind::Double(*v as f64)),
            _ => None,
        };
        match folded {
            Some(kind) => ExprIR::new(kind, to, location),
            None => ExprIR::new(ExprKind::Convert(Box::new(expr)), to, location),
        }
    }

    /// Converts `expr` for assignment to a `to` location, reporting a
    /// diagnostic when no implicit conversion exists.
    fn convert_assign(&mut self, expr: ExprIR, to: Ty) -> ExprIR {
        if conversion_cost(expr.ty, to).is_some() {
            return self.coerce(expr, to);
        }
        let (from, target) = (self.display(expr.ty), self.display(to));
        if expr.ty.is_numeric() && to.is_numeric() {
            self.diagnostics.error(
                "CS0266",
                format!(
                    "Cannot implicitly convert type '{}' to '{}'. An explicit conversion exists (are you missing a cast?)",
                    from, target
                ),
                expr.location,
            );
        } else {
            self.diagnostics.error(
                "CS0029",
                format!("Cannot implicitly convert type '{}' to '{}'", from, target),
                expr.location,
            );
        }
        ExprIR::error(expr.location)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Binds an expression that must produce a value.
    fn bind_value(&mut self, ctx: &mut MethodCtx, expr: &Expr) -> ExprIR {
        let bound = self.bind_expr(ctx, expr);
        self.expect_value(bound, expr.location)
    }

    fn expect_value(&mut self, bound: Bound, location: Location) -> ExprIR {
        match bound {
            Bound::Value(value) => value,
            Bound::Type(class) => {
                let name = self.type_name(class);
                self.diagnostics.error(
                    "CS0119",
                    format!("'{}' is a type, which is not valid in the given context", name),
                    location,
                );
                ExprIR::error(location)
            }
            Bound::Keyword(keyword) => {
                self.diagnostics.error(
                    "CS0119",
                    format!("'{}' is a type, which is not valid in the given context", keyword),
                    location,
                );
                ExprIR::error(location)
            }
            Bound::Namespace(name) => {
                self.diagnostics.error(
                    "CS0118",
                    format!("'{}' is a namespace but is used like a variable", name),
                    location,
                );
                ExprIR::error(location)
            }
            Bound::Methods { name, .. } => {
                self.diagnostics.error(
                    "CS0428",
                    format!("Cannot convert method group '{}' to non-delegate type", name),
                    location,
                );
                ExprIR::error(location)
            }
            Bound::ToString(_) => {
                self.diagnostics.error(
                    "CS0428",
                    "Cannot convert method group 'ToString' to non-delegate type",
                    location,
                );
                ExprIR::error(location)
            }
        }
    }

    fn bind_expr(&mut self, ctx: &mut MethodCtx, expr: &Expr) -> Bound {
        let location = expr.location;
        let value = match &expr.kind {
            ast::ExprKind::Literal(literal) => self.bind_literal(literal, location),
            ast::ExprKind::Name(name) => return self.bind_name(ctx, name, location),
            ast::ExprKind::PredefinedType(keyword) => {
                return match keyword_runtime_name(keyword).and_then(|n| self.symbols.lookup(n)) {
                    Some(symbol) => Bound::Type(symbol.class),
                    None => Bound::Keyword(keyword.clone()),
                };
            }
            ast::ExprKind::This => {
                if ctx.is_static || ctx.field_init {
                    let id = if ctx.field_init { "CS0027" } else { "CS0026" };
                    let message = if ctx.field_init {
                        "Keyword 'this' is not available in the current context"
                    } else {
                        "Keyword 'this' is not valid in a static property, static method, or static field initializer"
                    };
                    self.diagnostics.error(id, message, location);
                    ExprIR::error(location)
                } else {
                    ExprIR::new(ExprKind::This, Ty::Class(ctx.class), location)
                }
            }
            ast::ExprKind::Member {
                target,
                name,
                name_location,
            } => {
                let target_bound = self.bind_expr(ctx, target);
                return self.bind_member(ctx, target_bound, target, name, *name_location);
            }
            ast::ExprKind::Call { callee, args } => self.bind_call(ctx, callee, args, location),
            ast::ExprKind::New {
                ty,
                args,
                has_initializer,
            } => self.bind_new(ctx, ty, args, *has_initializer, location),
            ast::ExprKind::Unary { op, operand } => self.bind_unary(ctx, *op, operand, location),
            ast::ExprKind::IncDec {
                increment,
                prefix,
                target,
            } => self.bind_inc_dec(ctx, *increment, *prefix, target, location),
            ast::ExprKind::Binary { op, left, right } => {
                let left = self.bind_value(ctx, left);
                let right = self.bind_value(ctx, right);
                self.bind_binary(*op, left, right, location)
            }
            ast::ExprKind::Assign { op, target, value } => {
                self.bind_assign(ctx, *op, target, value, location)
            }
            ast::ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => self.bind_conditional(ctx, cond, then, otherwise, location),
            ast::ExprKind::Cast { ty, operand } => self.bind_cast(ctx, ty, operand, location),
            ast::ExprKind::Unsupported(what) => {
                self.unsupported(what, location);
                ExprIR::error(location)
            }
            ast::ExprKind::Error => ExprIR::error(location),
        };
        Bound::Value(value)
    }

    fn bind_literal(&mut self, literal: &Literal, location: Location) -> ExprIR {
        match literal {
            Literal::Int { value, long_suffix } => {
                if !long_suffix && *value <= i32::MAX as u64 {
                    ExprIR::new(ExprKind::Int(*value as i32), Ty::Int, location)
                } else if *value <= i64::MAX as u64 {
                    ExprIR::new(ExprKind::Long(*value as i64), Ty::Long, location)
                } else {
                    self.report_integral_too_large(location);
                    ExprIR::error(location)
                }
            }
            Literal::IntOverflow => {
                self.report_integral_too_large(location);
                ExprIR::error(location)
            }
            Literal::Real(value) => {
                if value.is_finite() {
                    ExprIR::new(ExprKind::Double(*value), Ty::Double, location)
                } else {
                    self.diagnostics.error(
                        "CS0594",
                        "Floating-point constant is outside the range of type 'double'",
                        location,
                    );
                    ExprIR::error(location)
                }
            }
            Literal::Bool(value) => ExprIR::new(ExprKind::Bool(*value), Ty::Bool, location),
            Literal::Str(value) => ExprIR::new(ExprKind::Str(value.clone()), Ty::String, location),
            Literal::Null => ExprIR::new(ExprKind::Null, Ty::Null, location),
        }
    }

    fn report_integral_too_large(&mut self, location: Location) {
        self.diagnostics
            .error("CS1021", "Integral constant is too large", location);
    }

    // =========================================================================
    // Names and member access
    // =========================================================================

    fn bind_name(&mut self, ctx: &mut MethodCtx, name: &str, location: Location) -> Bound {
        if let Some(slot) = ctx.lookup(name) {
            let ty = ctx.locals[slot as usize].ty;
            return Bound::Value(ExprIR::new(ExprKind::Local(slot), ty, location));
        }

        let current = self.symbols.get(ctx.class).cloned();
        if let Some(symbol) = &current {
            if let Some((index, field)) = symbol.field(name) {
                return Bound::Value(self.implicit_field_access(ctx, ctx.class, index, field, location));
            }
            if symbol.methods_named(name).next().is_some() {
                return Bound::Methods {
                    target: None,
                    class: ctx.class,
                    name: name.to_string(),
                    type_qualified: false,
                };
            }
        }

        for (class, using_index) in self.static_usings.clone() {
            let Some(symbol) = self.symbols.get(class) else {
                continue;
            };
            let has_field = symbol.field(name).is_some_and(|(_, f)| f.is_static);
            let has_method = symbol.methods_named(name).any(|(_, m)| m.is_static);
            if has_field || has_method {
                self.usings[using_index].used = true;
                return self.bind_static_member(class, name, location);
            }
        }

        if let Some(class) = self.lookup_type_name(name, &ctx.namespace) {
            return Bound::Type(class);
        }
        if self.symbols.is_namespace(name) {
            return Bound::Namespace(name.to_string());
        }

        self.diagnostics.error(
            "CS0103",
            format!("The name '{}' does not exist in the current context", name),
            location,
        );
        Bound::Value(ExprIR::error(location))
    }

    /// A field of the current class named without a qualifier.
    fn implicit_field_access(
        &mut self,
        ctx: &MethodCtx,
        class: ClassRef,
        index: u32,
        field: &FieldSymbol,
        location: Location,
    ) -> ExprIR {
        let field_ref = FieldRef { class, index };
        if field.is_static {
            return ExprIR::new(
                ExprKind::Field {
                    target: None,
                    field: field_ref,
                },
                field.ty,
                location,
            );
        }
        if ctx.is_static || ctx.field_init {
            self.report_instance_from_static(ctx, &format!("{}.{}", self.type_name(class), field.name), location);
            return ExprIR::error(location);
        }
        ExprIR::new(
            ExprKind::Field {
                target: Some(Box::new(ExprIR::new(ExprKind::This, Ty::Class(class), location))),
                field: field_ref,
            },
            field.ty,
            location,
        )
    }

    fn report_instance_from_static(&mut self, ctx: &MethodCtx, member: &str, location: Location) {
        if ctx.field_init {
            self.diagnostics.error(
                "CS0236",
                format!("A field initializer cannot reference the non-static field, method, or property '{}'", member),
                location,
            );
        } else {
            self.diagnostics.error(
                "CS0120",
                format!("An object reference is required for the non-static field, method, or property '{}'", member),
                location,
            );
        }
    }

    fn is_accessible(&self, ctx_class: ClassRef, owner: ClassRef, is_public: bool) -> bool {
        is_public || ctx_class == owner
    }

    /// `Type.name` where `Type` names a class.
    fn bind_static_member(&mut self, class: ClassRef, name: &str, location: Location) -> Bound {
        let Some(symbol) = self.symbols.get(class).cloned() else {
            return Bound::Value(ExprIR::error(location));
        };
        if let Some((index, field)) = symbol.field(name) {
            if !field.is_static {
                self.diagnostics.error(
                    "CS0120",
                    format!(
                        "An object reference is required for the non-static field, method, or property '{}.{}'",
                        symbol.name, field.name
                    ),
                    location,
                );
                return Bound::Value(ExprIR::error(location));
            }
            return Bound::Value(ExprIR::new(
                ExprKind::Field {
                    target: None,
                    field: FieldRef { class, index },
                },
                field.ty,
                location,
            ));
        }
        if symbol.methods_named(name).next().is_some() {
            return Bound::Methods {
                target: None,
                class,
                name: name.to_string(),
                type_qualified: true,
            };
        }
        self.diagnostics.error(
            "CS0117",
            format!("'{}' does not contain a definition for '{}'", symbol.name, name),
            location,
        );
        Bound::Value(ExprIR::error(location))
    }

    fn bind_member(
        &mut self,
        ctx: &mut MethodCtx,
        target: Bound,
        target_expr: &Expr,
        name: &str,
        location: Location,
    ) -> Bound {
        match target {
            Bound::Namespace(namespace) => {
                let full_name = qualify(&namespace, name);
                if let Some(symbol) = self.symbols.lookup(&full_name) {
                    return Bound::Type(symbol.class);
                }
                if self.symbols.is_namespace(&full_name) {
                    return Bound::Namespace(full_name);
                }
                self.diagnostics.error(
                    "CS0234",
                    format!(
                        "The type or namespace name '{}' does not exist in the namespace '{}' (are you missing an assembly reference?)",
                        name, namespace
                    ),
                    location,
                );
                Bound::Value(ExprIR::error(location))
            }
            Bound::Type(class) => {
                let bound = self.bind_static_member(class, name, location);
                if let Bound::Value(value) = &bound {
                    if let ExprKind::Field { field, .. } = &value.kind {
                        let accessible = self
                            .symbols
                            .get(class)
                            .and_then(|s| s.fields.get(field.index as usize))
                            .map(|f| self.is_accessible(ctx.class, class, f.is_public))
                            .unwrap_or(true);
                        if !accessible {
                            self.report_inaccessible(&format!("{}.{}", self.type_name(class), name), location);
                            return Bound::Value(ExprIR::error(location));
                        }
                    }
                }
                bound
            }
            Bound::Keyword(keyword) => {
                self.diagnostics.error(
                    "CS0117",
                    format!("'{}' does not contain a definition for '{}'", keyword, name),
                    location,
                );
                Bound::Value(ExprIR::error(location))
            }
            Bound::Methods { .. } | Bound::ToString(_) => {
                self.diagnostics.error(
                    "CS0119",
                    "A method is not valid in the given context",
                    target_expr.location,
                );
                Bound::Value(ExprIR::error(location))
            }
            Bound::Value(value) => self.bind_instance_member(ctx, value, name, location),
        }
    }

    fn report_inaccessible(&mut self, member: &str, location: Location) {
        self.diagnostics.error(
            "CS0122",
            format!("'{}' is inaccessible due to its protection level", member),
            location,
        );
    }

    fn bind_instance_member(&mut self, ctx: &MethodCtx, value: ExprIR, name: &str, location: Location) -> Bound {
        match value.ty {
            Ty::Error => return Bound::Value(ExprIR::error(location)),
            Ty::Null | Ty::Void => {
                let shown = self.display(value.ty);
                self.diagnostics.error(
                    "CS0023",
                    format!("Operator '.' cannot be applied to operand of type '{}'", shown),
                    location,
                );
                return Bound::Value(ExprIR::error(location));
            }
            _ => {}
        }
        if name == "ToString" {
            return Bound::ToString(value);
        }
        if value.ty == Ty::String && name == "Length" {
            return Bound::Value(ExprIR::new(ExprKind::StrLen(Box::new(value)), Ty::Int, location));
        }

        if let Ty::Class(class) = value.ty {
            if let Some(symbol) = self.symbols.get(class).cloned() {
                if let Some((index, field)) = symbol.field(name) {
                    if field.is_static {
                        self.report_static_via_instance(&format!("{}.{}", symbol.name, name), location);
                        return Bound::Value(ExprIR::error(location));
                    }
                    if !self.is_accessible(ctx.class, class, field.is_public) {
                        self.report_inaccessible(&format!("{}.{}", symbol.name, name), location);
                        return Bound::Value(ExprIR::error(location));
                    }
                    return Bound::Value(ExprIR::new(
                        ExprKind::Field {
                            target: Some(Box::new(value)),
                            field: FieldRef { class, index },
                        },
                        field.ty,
                        location,
                    ));
                }
                if symbol.methods_named(name).next().is_some() {
                    return Bound::Methods {
                        target: Some(value),
                        class,
                        name: name.to_string(),
                        type_qualified: false,
                    };
                }
            }
        }

        let shown = self.display(value.ty);
        self.diagnostics.error(
            "CS1061",
            format!(
                "'{}' does not contain a definition for '{}' and no accessible extension method '{}' accepting a first argument of type '{}' could be found (are you missing a using directive or an assembly reference?)",
                shown, name, name, shown
            ),
            location,
        );
        Bound::Value(ExprIR::error(location))
    }

    fn report_static_via_instance(&mut self, member: &str, location: Location) {
        self.diagnostics.error(
            "CS0176",
            format!(
                "Member '{}' cannot be accessed with an instance reference; qualify it with a type name instead",
                member
            ),
            location,
        );
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn bind_call(&mut self, ctx: &mut MethodCtx, callee: &Expr, args: &[Expr], location: Location) -> ExprIR {
        let callee_bound = self.bind_expr(ctx, callee);
        let args: Vec<ExprIR> = args.iter().map(|a| self.bind_value(ctx, a)).collect();

        match callee_bound {
            Bound::Methods {
                target,
                class,
                name,
                type_qualified,
            } => self.bind_method_call(ctx, target, class, &name, type_qualified, args, location),
            Bound::ToString(value) => {
                if !args.is_empty() {
                    self.report_no_overload("ToString", args.len(), location);
                    return ExprIR::error(location);
                }
                if value.ty == Ty::String {
                    return value;
                }
                ExprIR::new(ExprKind::ToStr(Box::new(value)), Ty::String, location)
            }
            Bound::Value(value) if value.ty.is_error() => ExprIR::error(location),
            other => {
                let value = self.expect_value(other, callee.location);
                if !value.ty.is_error() {
                    self.diagnostics
                        .error("CS0149", "Method name expected", callee.location);
                }
                ExprIR::error(location)
            }
        }
    }

    fn report_no_overload(&mut self, name: &str, count: usize, location: Location) {
        self.diagnostics.error(
            "CS1501",
            format!("No overload for method '{}' takes {} arguments", name, count),
            location,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_method_call(
        &mut self,
        ctx: &MethodCtx,
        target: Option<ExprIR>,
        class: ClassRef,
        name: &str,
        type_qualified: bool,
        args: Vec<ExprIR>,
        location: Location,
    ) -> ExprIR {
        let Some(symbol) = self.symbols.get(class).cloned() else {
            return ExprIR::error(location);
        };
        let candidates: Vec<(u32, MethodSymbol)> = symbol
            .methods_named(name)
            .filter(|(_, m)| self.is_accessible(ctx.class, class, m.is_public))
            .map(|(i, m)| (i, m.clone()))
            .collect();
        if candidates.is_empty() {
            self.report_inaccessible(&format!("{}.{}", symbol.name, name), location);
            return ExprIR::error(location);
        }

        let Some((index, method)) = self.resolve_overload(class, name, &candidates, &args, location) else {
            return ExprIR::error(location);
        };
        let display = self.method_display(class, &method);

        let target = match (target, method.is_static) {
            (None, true) => None,
            (Some(_), true) => {
                self.report_static_via_instance(&display, location);
                return ExprIR::error(location);
            }
            (Some(target), false) => Some(Box::new(target)),
            (None, false) => {
                if type_qualified || ctx.is_static || ctx.field_init || ctx.class != class {
                    self.report_instance_from_static(ctx, &display, location);
                    return ExprIR::error(location);
                }
                Some(Box::new(ExprIR::new(ExprKind::This, Ty::Class(class), location)))
            }
        };

        let args = args
            .into_iter()
            .zip(&method.params)
            .map(|(arg, param)| self.coerce(arg, *param))
            .collect();
        ExprIR::new(
            ExprKind::Call {
                target,
                method: MethodRef { class, index },
                args,
            },
            method.ret,
            location,
        )
    }

    /// Picks the best applicable overload for `args`.
    fn resolve_overload(
        &mut self,
        class: ClassRef,
        name: &str,
        candidates: &[(u32, MethodSymbol)],
        args: &[ExprIR],
        location: Location,
    ) -> Option<(u32, MethodSymbol)> {
        let by_arity: Vec<&(u32, MethodSymbol)> = candidates
            .iter()
            .filter(|(_, m)| m.params.len() == args.len())
            .collect();
        if by_arity.is_empty() {
            self.report_no_overload(name, args.len(), location);
            return None;
        }

        let costs = |method: &MethodSymbol| -> Option<Vec<u8>> {
            args.iter()
                .zip(&method.params)
                .map(|(arg, param)| conversion_cost(arg.ty, *param))
                .collect()
        };
        let applicable: Vec<(&(u32, MethodSymbol), Vec<u8>)> = by_arity
            .iter()
            .filter_map(|c| costs(&c.1).map(|cost| (*c, cost)))
            .collect();

        if applicable.is_empty() {
            let first = &by_arity[0].1;
            if let Some((position, (arg, param))) = args
                .iter()
                .zip(&first.params)
                .enumerate()
                .find(|(_, (arg, param))| conversion_cost(arg.ty, **param).is_none())
            {
                let (from, to) = (self.display(arg.ty), self.display(*param));
                self.diagnostics.error(
                    "CS1503",
                    format!("Argument {}: cannot convert from '{}' to '{}'", position + 1, from, to),
                    arg.location,
                );
            }
            return None;
        }

        // A candidate wins if no argument converts worse than for any other.
        let better = |a: &[u8], b: &[u8]| a.iter().zip(b).all(|(x, y)| x <= y) && a != b;
        let best: Vec<&(&(u32, MethodSymbol), Vec<u8>)> = applicable
            .iter()
            .filter(|(candidate, cost)| {
                applicable.iter().all(|(other, other_cost)| {
                    other.0 == candidate.0 || better(cost.as_slice(), other_cost.as_slice())
                })
            })
            .collect();

        match best.as_slice() {
            [(winner, _)] => Some((winner.0, winner.1.clone())),
            _ => {
                let (a, b) = (applicable[0].0, applicable[1].0);
                let first = self.method_display(class, &a.1);
                let second = self.method_display(class, &b.1);
                self.diagnostics.error(
                    "CS0121",
                    format!(
                        "The call is ambiguous between the following methods or properties: '{}' and '{}'",
                        first, second
                    ),
                    location,
                );
                None
            }
        }
    }

    fn bind_new(
        &mut self,
        ctx: &mut MethodCtx,
        ty: &TypeRef,
        args: &[Expr],
        has_initializer: bool,
        location: Location,
    ) -> ExprIR {
        for arg in args {
            self.bind_value(ctx, arg);
        }
        if has_initializer {
            self.unsupported("object initializer", location);
            return ExprIR::error(location);
        }
        let resolved = self.resolve_type(ty, &ctx.namespace);
        let class = match resolved {
            Ty::Class(class) => class,
            Ty::Error => return ExprIR::error(location),
            other => {
                let shown = self.display(other);
                self.unsupported(&format!("new {}", shown), location);
                return ExprIR::error(location);
            }
        };
        let Some(symbol) = self.symbols.get(class) else {
            return ExprIR::error(location);
        };
        if symbol.is_static {
            let name = symbol.name.clone();
            self.diagnostics.error(
                "CS0712",
                format!("Cannot create an instance of the static class '{}'", name),
                location,
            );
            return ExprIR::error(location);
        }
        if !args.is_empty() {
            let name = symbol.name.clone();
            self.diagnostics.error(
                "CS1729",
                format!("'{}' does not contain a constructor that takes {} arguments", name, args.len()),
                location,
            );
            return ExprIR::error(location);
        }
        ExprIR::new(ExprKind::New(class), Ty::Class(class), location)
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn report_unary(&mut self, op: &str, ty: Ty, location: Location) {
        let shown = self.display(ty);
        self.diagnostics.error(
            "CS0023",
            format!("Operator '{}' cannot be applied to operand of type '{}'", op, shown),
            location,
        );
    }

    fn bind_unary(&mut self, ctx: &mut MethodCtx, op: ast::UnaryOp, operand: &Expr, location: Location) -> ExprIR {
        // `-2147483648` and `-9223372036854775808` are in range only negated.
        if op == ast::UnaryOp::Neg {
            if let ast::ExprKind::Literal(Literal::Int { value, long_suffix }) = &operand.kind {
                if !*long_suffix && *value == 1u64 << 31 {
                    return ExprIR::new(ExprKind::Int(i32::MIN), Ty::Int, location);
                }
                if *value == 1u64 << 63 {
                    return ExprIR::new(ExprKind::Long(i64::MIN), Ty::Long, location);
                }
            }
        }

        let value = self.bind_value(ctx, operand);
        if value.ty.is_error() {
            return ExprIR::error(location);
        }
        match op {
            ast::UnaryOp::Plus if value.ty.is_numeric() => value,
            ast::UnaryOp::Neg if value.ty.is_numeric() => {
                let ty = value.ty;
                let folded = match value.kind {
                    ExprKind::Int(v) => Some(ExprKind::Int(v.wrapping_neg())),
                    ExprKind::Long(v) => Some(ExprKind::Long(v.wrapping_neg())),
                    ExprKind::Double(v) => Some(ExprKind::Double(-v)),
                    _ => None,
                };
                match folded {
                    Some(kind) => ExprIR::new(kind, ty, location),
                    None => ExprIR::new(
                        ExprKind::Unary {
                            op: ir::UnaryOp::Neg,
                            operand: Box::new(value),
                        },
                        ty,
                        location,
                    ),
                }
            }
            ast::UnaryOp::Not if value.ty == Ty::Bool => {
                if let ExprKind::Bool(v) = value.kind {
                    return ExprIR::new(ExprKind::Bool(!v), Ty::Bool, location);
                }
                ExprIR::new(
                    ExprKind::Unary {
                        op: ir::UnaryOp::Not,
                        operand: Box::new(value),
                    },
                    Ty::Bool,
                    location,
                )
            }
            ast::UnaryOp::BitNot if value.ty.is_integral() => {
                let ty = value.ty;
                ExprIR::new(
                    ExprKind::Unary {
                        op: ir::UnaryOp::BitNot,
                        operand: Box::new(value),
                    },
                    ty,
                    location,
                )
            }
            _ => {
                self.report_unary(op.symbol(), value.ty, location);
                ExprIR::error(location)
            }
        }
    }

    /// Binds an assignable expression.
    fn bind_place(&mut self, ctx: &mut MethodCtx, expr: &Expr) -> Option<(Place, Ty)> {
        let bound = self.bind_expr(ctx, expr);
        let value = self.expect_value(bound, expr.location);
        match value.kind {
            ExprKind::Local(slot) => {
                if ctx.consts.contains(&slot) {
                    self.report_not_assignable(expr.location);
                    return None;
                }
                Some((Place::Local(slot), value.ty))
            }
            ExprKind::Field { target, field } => {
                let read_only = self
                    .symbols
                    .get(field.class)
                    .and_then(|s| s.fields.get(field.index as usize))
                    .map(|f| f.read_only)
                    .unwrap_or(false);
                if read_only {
                    self.report_not_assignable(expr.location);
                    return None;
                }
                Some((Place::Field { target, field }, value.ty))
            }
            ExprKind::Error => None,
            _ => {
                self.report_not_assignable(expr.location);
                None
            }
        }
    }

    fn report_not_assignable(&mut self, location: Location) {
        self.diagnostics.error(
            "CS0131",
            "The left-hand side of an assignment must be a variable, property or indexer",
            location,
        );
    }

    fn bind_inc_dec(
        &mut self,
        ctx: &mut MethodCtx,
        increment: bool,
        prefix: bool,
        target: &Expr,
        location: Location,
    ) -> ExprIR {
        let Some((place, ty)) = self.bind_place(ctx, target) else {
            return ExprIR::error(location);
        };
        if !ty.is_numeric() {
            if !ty.is_error() {
                self.report_unary(if increment { "++" } else { "--" }, ty, location);
            }
            return ExprIR::error(location);
        }
        ExprIR::new(
            ExprKind::IncDec {
                target: place,
                increment,
                prefix,
            },
            ty,
            location,
        )
    }

    /// Result type of binary numeric promotion.
    fn promote(left: Ty, right: Ty) -> Option<Ty> {
        if !left.is_numeric() || !right.is_numeric() {
            return None;
        }
        if left == Ty::Double || right == Ty::Double {
            Some(Ty::Double)
        } else if left == Ty::Long || right == Ty::Long {
            Some(Ty::Long)
        } else {
            Some(Ty::Int)
        }
    }

    fn to_string_operand(&self, expr: ExprIR) -> ExprIR {
        if expr.ty == Ty::String {
            return expr;
        }
        let location = expr.location;
        ExprIR::new(ExprKind::ToStr(Box::new(expr)), Ty::String, location)
    }

    fn binary_node(&self, op: ir::BinaryOp, operand_ty: Ty, left: ExprIR, right: ExprIR, ty: Ty, location: Location) -> ExprIR {
        let left = self.coerce(left, operand_ty);
        let right = self.coerce(right, operand_ty);
        ExprIR::new(
            ExprKind::Binary {
                op,
                operand_ty,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            location,
        )
    }

    fn bind_binary(&mut self, op: ast::BinaryOp, left: ExprIR, right: ExprIR, location: Location) -> ExprIR {
        use ast::BinaryOp as B;

        if left.ty.is_error() || right.ty.is_error() {
            return ExprIR::error(location);
        }
        let (lt, rt) = (left.ty, right.ty);

        let result = match op {
            B::And | B::Or if lt == Ty::Bool && rt == Ty::Bool => Some(ExprIR::new(
                ExprKind::Logical {
                    is_and: op == B::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Ty::Bool,
                location,
            )),
            B::Add if (lt == Ty::String || rt == Ty::String) && lt != Ty::Void && rt != Ty::Void => {
                let left = self.to_string_operand(left);
                let right = self.to_string_operand(right);
                Some(ExprIR::new(
                    ExprKind::Concat(Box::new(left), Box::new(right)),
                    Ty::String,
                    location,
                ))
            }
            B::Add | B::Sub | B::Mul | B::Div | B::Rem => Self::promote(lt, rt).map(|ty| {
                let ir_op = match op {
                    B::Add => ir::BinaryOp::Add,
                    B::Sub => ir::BinaryOp::Sub,
                    B::Mul => ir::BinaryOp::Mul,
                    B::Div => ir::BinaryOp::Div,
                    _ => ir::BinaryOp::Rem,
                };
                self.binary_node(ir_op, ty, left, right, ty, location)
            }),
            B::BitAnd | B::BitOr | B::BitXor => {
                let ir_op = match op {
                    B::BitAnd => ir::BinaryOp::And,
                    B::BitOr => ir::BinaryOp::Or,
                    _ => ir::BinaryOp::Xor,
                };
                if lt == Ty::Bool && rt == Ty::Bool {
                    Some(self.binary_node(ir_op, Ty::Bool, left, right, Ty::Bool, location))
                } else {
                    Self::promote(lt, rt)
                        .filter(Ty::is_integral)
                        .map(|ty| self.binary_node(ir_op, ty, left, right, ty, location))
                }
            }
            B::Shl | B::Shr if lt.is_integral() && rt == Ty::Int => {
                let ir_op = if op == B::Shl { ir::BinaryOp::Shl } else { ir::BinaryOp::Shr };
                Some(ExprIR::new(
                    ExprKind::Binary {
                        op: ir_op,
                        operand_ty: lt,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    lt,
                    location,
                ))
            }
            B::Lt | B::Le | B::Gt | B::Ge => Self::promote(lt, rt).map(|ty| {
                let ir_op = match op {
                    B::Lt => ir::BinaryOp::Lt,
                    B::Le => ir::BinaryOp::Le,
                    B::Gt => ir::BinaryOp::Gt,
                    _ => ir::BinaryOp::Ge,
                };
                self.binary_node(ir_op, ty, left, right, Ty::Bool, location)
            }),
            B::Eq | B::Ne => {
                let ir_op = if op == B::Eq { ir::BinaryOp::Eq } else { ir::BinaryOp::Ne };
                let operand_ty = if let Some(ty) = Self::promote(lt, rt) {
                    Some(ty)
                } else if lt == Ty::Bool && rt == Ty::Bool {
                    Some(Ty::Bool)
                } else if matches!((lt, rt), (Ty::String, Ty::String) | (Ty::String, Ty::Null) | (Ty::Null, Ty::String)) {
                    Some(Ty::String)
                } else if lt.is_reference()
                    && rt.is_reference()
                    && (conversion_cost(lt, rt).is_some() || conversion_cost(rt, lt).is_some())
                {
                    Some(Ty::Object)
                } else {
                    None
                };
                operand_ty.map(|ty| self.binary_node(ir_op, ty, left, right, Ty::Bool, location))
            }
            _ => None,
        };

        result.unwrap_or_else(|| {
            let (ls, rs) = (self.display(lt), self.display(rt));
            self.diagnostics.error(
                "CS0019",
                format!(
                    "Operator '{}' cannot be applied to operands of type '{}' and '{}'",
                    op.symbol(),
                    ls,
                    rs
                ),
                location,
            );
            ExprIR::error(location)
        })
    }

    fn bind_assign(
        &mut self,
        ctx: &mut MethodCtx,
        op: Option<ast::BinaryOp>,
        target: &Expr,
        value: &Expr,
        location: Location,
    ) -> ExprIR {
        let place = self.bind_place(ctx, target);
        let value = self.bind_value(ctx, value);
        let Some((place, ty)) = place else {
            return ExprIR::error(location);
        };

        let Some(op) = op else {
            let value = self.convert_assign(value, ty);
            return ExprIR::new(
                ExprKind::Assign {
                    target: place,
                    op: None,
                    value: Box::new(value),
                },
                ty,
                location,
            );
        };

        if ty.is_error() || value.ty.is_error() {
            return ExprIR::error(location);
        }
        let value_ty = value.ty;

        use ast::BinaryOp as B;
        let compound = match op {
            B::Add if ty == Ty::String => Some((ir::BinaryOp::Add, Ty::String, self.to_string_operand(value))),
            B::Add | B::Sub | B::Mul | B::Div | B::Rem if ty.is_numeric() => {
                let ir_op = match op {
                    B::Add => ir::BinaryOp::Add,
                    B::Sub => ir::BinaryOp::Sub,
                    B::Mul => ir::BinaryOp::Mul,
                    B::Div => ir::BinaryOp::Div,
                    _ => ir::BinaryOp::Rem,
                };
                Some((ir_op, ty, value))
            }
            B::BitAnd | B::BitOr | B::BitXor if ty.is_integral() || ty == Ty::Bool => {
                let ir_op = match op {
                    B::BitAnd => ir::BinaryOp::And,
                    B::BitOr => ir::BinaryOp::Or,
                    _ => ir::BinaryOp::Xor,
                };
                Some((ir_op, ty, value))
            }
            B::Shl | B::Shr if ty.is_integral() && value_ty == Ty::Int => {
                let ir_op = if op == B::Shl { ir::BinaryOp::Shl } else { ir::BinaryOp::Shr };
                return ExprIR::new(
                    ExprKind::Assign {
                        target: place,
                        op: Some((ir_op, ty)),
                        value: Box::new(value),
                    },
                    ty,
                    location,
                );
            }
            _ => None,
        };

        let Some((ir_op, operand_ty, value)) = compound else {
            let (ls, rs) = (self.display(ty), self.display(value_ty));
            self.diagnostics.error(
                "CS0019",
                format!(
                    "Operator '{}=' cannot be applied to operands of type '{}' and '{}'",
                    op.symbol(),
                    ls,
                    rs
                ),
                location,
            );
            return ExprIR::error(location);
        };
        let value = self.convert_assign(value, operand_ty);
        ExprIR::new(
            ExprKind::Assign {
                target: place,
                op: Some((ir_op, operand_ty)),
                value: Box::new(value),
            },
            ty,
            location,
        )
    }

    fn bind_conditional(
        &mut self,
        ctx: &mut MethodCtx,
        cond: &Expr,
        then: &Expr,
        otherwise: &Expr,
        location: Location,
    ) -> ExprIR {
        let cond = self.bind_condition(ctx, cond);
        let then = self.bind_value(ctx, then);
        let otherwise = self.bind_value(ctx, otherwise);
        if then.ty.is_error() || otherwise.ty.is_error() {
            return ExprIR::error(location);
        }
        let ty = if then.ty == otherwise.ty {
            Some(then.ty)
        } else if conversion_cost(otherwise.ty, then.ty).is_some() {
            Some(then.ty)
        } else if conversion_cost(then.ty, otherwise.ty).is_some() {
            Some(otherwise.ty)
        } else {
            None
        };
        match ty {
            Some(ty) if ty != Ty::Void && ty != Ty::Null => {
                let then = self.coerce(then, ty);
                let otherwise = self.coerce(otherwise, ty);
                ExprIR::new(
                    ExprKind::Conditional {
                        cond: Box::new(cond),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    },
                    ty,
                    location,
                )
            }
            _ => {
                let (a, b) = (self.display(then.ty), self.display(otherwise.ty));
                self.diagnostics.error(
                    "CS0173",
                    format!(
                        "Type of conditional expression cannot be determined because there is no implicit conversion between '{}' and '{}'",
                        a, b
                    ),
                    location,
                );
                ExprIR::error(location)
            }
        }
    }

    fn bind_cast(&mut self, ctx: &mut MethodCtx, ty: &TypeRef, operand: &Expr, location: Location) -> ExprIR {
        let target = self.resolve_type(ty, &ctx.namespace);
        let value = self.bind_value(ctx, operand);
        if target.is_error() || value.ty.is_error() {
            return ExprIR::error(location);
        }
        if value.ty == target {
            return ExprIR::new(value.kind, target, location);
        }
        if conversion_cost(value.ty, target).is_some() {
            let coerced = self.coerce(value, target);
            return ExprIR::new(coerced.kind, target, location);
        }
        if value.ty.is_numeric() && target.is_numeric() {
            let folded = match (&value.kind, target) {
                (ExprKind::Long(v), Ty::Int) => Some((v.to_string(), i32::try_from(*v).ok().map(ExprKind::Int))),
                (ExprKind::Double(v), Ty::Int) => Some((
                    v.to_string(),
                    fits_truncated(*v, i32::MIN as f64, i32::MAX as f64).then(|| ExprKind::Int(*v as i32)),
                )),
                (ExprKind::Double(v), Ty::Long) => Some((
                    v.to_string(),
                    fits_truncated(*v, i64::MIN as f64, i64::MAX as f64).then(|| ExprKind::Long(*v as i64)),
                )),
                _ => None,
            };
            return match folded {
                Some((_, Some(kind))) => ExprIR::new(kind, target, location),
                Some((text, None)) => {
                    let to = self.display(target);
                    self.diagnostics.error(
                        "CS0221",
                        format!(
                            "Constant value '{}' cannot be converted to a '{}' (use 'unchecked' syntax to override)",
                            text, to
                        ),
                        location,
                    );
                    ExprIR::error(location)
                }
                None => ExprIR::new(ExprKind::Convert(Box::new(value)), target, location),
            };
        }
        if value.ty.is_reference() && target.is_reference() {
            self.unsupported("reference downcast", location);
            return ExprIR::error(location);
        }
        let (from, to) = (self.display(value.ty), self.display(target));
        self.diagnostics.error(
            "CS0030",
            format!("Cannot convert type '{}' to '{}'", from, to),
            location,
        );
        ExprIR::error(location)
    }
}

/// Whether a constant truncates to a value inside `[min, max]`.
fn fits_truncated(value: f64, min: f64, max: f64) -> bool {
    let truncated = value.trunc();
    truncated.is_finite() && truncated >= min && truncated < max + 1.0
}

fn initializer_symbol(name: &str, is_static: bool) -> MethodSymbol {
    MethodSymbol {
        name: name.to_string(),
        params: Vec::new(),
        ret: Ty::Void,
        is_static,
        is_public: false,
        is_special: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompilerConfig, LanguageVersion};
    use crate::diagnostic::Diagnostic;
    use crate::frontend::csharp::parser::{lower, CSharpParser};

    fn bind_with(source: &str, output_kind: OutputKind) -> (ProgramIR, Vec<Diagnostic>) {
        let mut parser = CSharpParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let (unit, mut diagnostics) = lower(source, &tree, LanguageVersion::Preview);
        let catalog = ReferenceCatalog::core_only();
        let config = CompilerConfig::default().with_output_kind(output_kind);
        let options = CompilationOptions::from_config(&config);
        let program = to_ir(&unit, &catalog, &options, &mut diagnostics).unwrap();
        (program, diagnostics.into_sorted())
    }

    fn bind(source: &str) -> (ProgramIR, Vec<Diagnostic>) {
        bind_with(source, OutputKind::Library)
    }

    fn ids(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_binds_simple_class() {
        let (program, diagnostics) = bind("class C { public static int Add(int a, int b) => a + b; }");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(program.types.len(), 1);
        let method = &program.types[0].methods[0];
        assert_eq!(method.name, "Add");
        assert_eq!(method.ret, Ty::Int);
        assert_eq!(method.params().count(), 2);
        assert_eq!(program.references, vec!["System.Runtime.dll"]);
    }

    #[test]
    fn test_unknown_name_and_type() {
        let (_, diagnostics) = bind("class C { static void M() { Foo x = y; } }");
        assert_eq!(ids(&diagnostics), vec!["CS0246", "CS0103"]);
    }

    #[test]
    fn test_conversion_errors() {
        let (_, diagnostics) = bind("class C { static void M() { int a = \"s\"; int b = 5L; long c = 5; } }");
        assert_eq!(ids(&diagnostics), vec!["CS0029", "CS0266"]);
    }

    #[test]
    fn test_overload_resolution_prefers_exact_match() {
        let (program, diagnostics) =
            bind("using System; class C { static void M() { Console.WriteLine(5); Console.WriteLine(\"x\"); } }");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert!(program.usings[0].used);
        let calls: Vec<ClassRef> = program.types[0].methods[0]
            .body
            .iter()
            .filter_map(|s| match &s.kind {
                ir::StmtKind::Expr(ExprIR {
                    kind: ExprKind::Call { method, .. },
                    ..
                }) => Some(method.class),
                _ => None,
            })
            .collect();
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn test_bad_arguments() {
        let (_, diagnostics) = bind(
            "class C { static int F(int x) => x; static void M() { F(); F(\"a\"); System.Math.Max(1); } }",
        );
        assert_eq!(ids(&diagnostics), vec!["CS1501", "CS1503", "CS1501"]);
    }

    #[test]
    fn test_static_context_errors() {
        let (_, diagnostics) = bind("class C { int f; static int M() { return f; } }");
        assert_eq!(ids(&diagnostics), vec!["CS0120"]);
    }

    #[test]
    fn test_return_mismatches() {
        let (_, diagnostics) = bind("class C { static void A() { return 1; } static int B() { return; } }");
        assert_eq!(ids(&diagnostics), vec!["CS0127", "CS0126"]);
    }

    #[test]
    fn test_duplicates() {
        let (_, diagnostics) = bind(
            "class C { int x; int x; void M(int a) {} void M(int b) {} void N() { int y = 1; int y = 2; } }",
        );
        assert_eq!(ids(&diagnostics), vec!["CS0102", "CS0111", "CS0128"]);
    }

    #[test]
    fn test_break_outside_loop() {
        let (_, diagnostics) = bind("class C { void M() { break; } }");
        assert_eq!(ids(&diagnostics), vec!["CS0139"]);
    }

    #[test]
    fn test_top_level_statements_require_executable() {
        let (_, diagnostics) = bind("System.Console.WriteLine(1);");
        assert_eq!(ids(&diagnostics), vec!["CS8805"]);

        let (program, diagnostics) = bind_with("System.Console.WriteLine(1);", OutputKind::ConsoleApplication);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(program.types[0].name, TOP_LEVEL_CLASS);
        assert!(program.entry_point.is_some());
    }

    #[test]
    fn test_missing_entry_point() {
        let (_, diagnostics) = bind_with("class C { }", OutputKind::ConsoleApplication);
        assert_eq!(ids(&diagnostics), vec!["CS5001"]);
    }

    #[test]
    fn test_field_initializers_synthesize_methods() {
        let (program, diagnostics) = bind("class C { static int s = 1; int i = 2; const int K = 3; }");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let ty = &program.types[0];
        let static_init = ty.static_init.unwrap() as usize;
        let instance_init = ty.instance_init.unwrap() as usize;
        assert_eq!(ty.methods[static_init].name, STATIC_INIT);
        assert_eq!(ty.methods[static_init].body.len(), 2);
        assert_eq!(ty.methods[instance_init].name, INSTANCE_INIT);
        assert!(!ty.methods[instance_init].is_static);
    }

    #[test]
    fn test_read_only_targets() {
        let (_, diagnostics) = bind("class C { const int K = 1; static void M() { K = 2; System.Math.PI = 3; } }");
        assert_eq!(ids(&diagnostics), vec!["CS0131", "CS0131"]);
    }

    #[test]
    fn test_unsupported_constructs() {
        let (_, diagnostics) = bind("struct S { } class C { void M() { foreach (var x in y) { } } }");
        assert!(ids(&diagnostics).iter().all(|id| *id == "FDL0001"));
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_operator_errors() {
        let (_, diagnostics) = bind("class C { static void M() { bool b = true + 1; int i = -\"x\"; } }");
        assert_eq!(ids(&diagnostics), vec!["CS0019", "CS0023"]);
    }

    #[test]
    fn test_var_inference() {
        let (program, diagnostics) = bind("class C { static void M() { var a = 1; var b = 2.5; var c = \"s\"; var d = null; } }");
        assert_eq!(ids(&diagnostics), vec!["CS0815"]);
        let locals: Vec<Ty> = program.types[0].methods[0].locals.iter().map(|l| l.ty).collect();
        assert_eq!(locals, vec![Ty::Int, Ty::Double, Ty::String, Ty::Error]);
    }

    #[test]
    fn test_constant_cast_out_of_range() {
        let (_, diagnostics) = bind("class C { static int F() => (int)3000000000L; }");
        assert_eq!(ids(&diagnostics), vec!["CS0221"]);
        assert!(diagnostics[0].message.contains("'3000000000'"));

        let (_, diagnostics) = bind("class C { static long F() => (long)1e30; }");
        assert_eq!(ids(&diagnostics), vec!["CS0221"]);

        let (_, diagnostics) = bind("class C { static int F() => (int)2147483647L; static int G() => (int)2.9; }");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_int_min_literal() {
        let (_, diagnostics) = bind("class C { static int M() => -2147483648; }");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }
}
