//! Language-agnostic intermediate representation.
//!
//! The binder produces a fully typed program: every name is resolved to a
//! slot, field or method, implicit conversions are explicit nodes, and
//! field initializers live in synthesized initializer methods. Flow
//! analysis and code generation both work on this form.

pub mod symbols;

use std::fmt;

use crate::diagnostic::Location;

pub use symbols::{FieldSymbol, MethodSymbol, SymbolTable, TypeSymbol};

// =============================================================================
// Types
// =============================================================================

/// Where a class lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassRef {
    /// Declared in the program being compiled.
    Local(u32),
    /// Declared in a reference unit; `unit` is its catalog position.
    External { unit: u16, index: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: ClassRef,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: ClassRef,
    pub index: u32,
}

/// Static type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ty {
    Void,
    Bool,
    Int,
    Long,
    Double,
    String,
    /// Type of the `null` literal.
    Null,
    Object,
    Class(ClassRef),
    /// Result of an expression that failed to bind.
    Error,
}

impl Ty {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Ty::Int | Ty::Long | Ty::Double)
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Ty::Int | Ty::Long)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Ty::String | Ty::Null | Ty::Object | Ty::Class(_))
    }

    pub fn is_error(&self) -> bool {
        *self == Ty::Error
    }
}

/// Keyword types print as C# keywords; classes need the symbol table.
impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Ty::Void => "void",
            Ty::Bool => "bool",
            Ty::Int => "int",
            Ty::Long => "long",
            Ty::Double => "double",
            Ty::String => "string",
            Ty::Null => "<null>",
            Ty::Object => "object",
            Ty::Class(_) => "class",
            Ty::Error => "?",
        };
        f.write_str(text)
    }
}

// =============================================================================
// Program
// =============================================================================

/// A bound program.
#[derive(Debug, Default)]
pub struct ProgramIR {
    pub assembly_name: String,
    /// Catalog unit names, in catalog order.
    pub references: Vec<String>,
    pub usings: Vec<UsingIR>,
    pub types: Vec<TypeIR>,
    pub entry_point: Option<MethodRef>,
}

#[derive(Debug, Clone)]
pub struct UsingIR {
    pub name: String,
    pub location: Location,
    /// Whether any name resolved through this directive.
    pub used: bool,
}

#[derive(Debug)]
pub struct TypeIR {
    pub namespace: String,
    pub name: String,
    pub is_static: bool,
    pub is_public: bool,
    pub fields: Vec<FieldIR>,
    pub methods: Vec<MethodIR>,
    pub static_init: Option<u32>,
    pub instance_init: Option<u32>,
    pub location: Location,
}

impl TypeIR {
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

#[derive(Debug)]
pub struct FieldIR {
    pub name: String,
    pub ty: Ty,
    pub is_static: bool,
    pub is_public: bool,
    pub location: Location,
}

#[derive(Debug)]
pub struct MethodIR {
    pub name: String,
    pub ret: Ty,
    pub is_static: bool,
    pub is_public: bool,
    /// Number of leading locals that are `this` and parameters.
    pub param_count: usize,
    /// Slots: `this` for instance methods, parameters, then locals.
    pub locals: Vec<LocalIR>,
    pub body: Vec<StmtIR>,
    /// Compiler-generated (initializers, top-level entry point).
    pub synthesized: bool,
    pub location: Location,
}

impl MethodIR {
    /// Parameters, excluding `this`.
    pub fn params(&self) -> impl Iterator<Item = &LocalIR> {
        self.locals
            .iter()
            .take(self.param_count)
            .filter(|l| l.kind == LocalKind::Param)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    This,
    Param,
    Local,
}

#[derive(Debug, Clone)]
pub struct LocalIR {
    pub name: String,
    pub ty: Ty,
    pub kind: LocalKind,
    pub location: Location,
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug)]
pub struct StmtIR {
    pub kind: StmtKind,
    pub location: Location,
}

#[derive(Debug)]
pub enum StmtKind {
    Expr(ExprIR),
    /// Declaration of a local, with optional initializer.
    Local { slot: u16, init: Option<ExprIR> },
    If {
        cond: ExprIR,
        then: Box<StmtIR>,
        otherwise: Option<Box<StmtIR>>,
    },
    While {
        cond: ExprIR,
        body: Box<StmtIR>,
    },
    For {
        init: Vec<StmtIR>,
        cond: Option<ExprIR>,
        update: Vec<ExprIR>,
        body: Box<StmtIR>,
    },
    Return(Option<ExprIR>),
    Break,
    Continue,
    Block(Vec<StmtIR>),
    /// A statement that failed to bind; never emitted.
    Error,
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone)]
pub struct ExprIR {
    pub kind: ExprKind,
    pub ty: Ty,
    pub location: Location,
}

impl ExprIR {
    pub fn new(kind: ExprKind, ty: Ty, location: Location) -> Self {
        Self { kind, ty, location }
    }

    pub fn error(location: Location) -> Self {
        Self::new(ExprKind::Error, Ty::Error, location)
    }

    /// True for literals, whose value is known at compile time.
    pub fn is_constant(&self) -> bool {
        match &self.kind {
            ExprKind::Int(_)
            | ExprKind::Long(_)
            | ExprKind::Double(_)
            | ExprKind::Bool(_)
            | ExprKind::Str(_)
            | ExprKind::Null => true,
            ExprKind::Convert(inner) => inner.is_constant(),
            _ => false,
        }
    }

    /// The value of a boolean literal condition.
    pub fn as_bool_constant(&self) -> Option<bool> {
        match self.kind {
            ExprKind::Bool(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Int(i32),
    Long(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    Null,
    Local(u16),
    This,
    /// Static field when `target` is `None`.
    Field {
        target: Option<Box<ExprIR>>,
        field: FieldRef,
    },
    /// Static method when `target` is `None`.
    Call {
        target: Option<Box<ExprIR>>,
        method: MethodRef,
        args: Vec<ExprIR>,
    },
    New(ClassRef),
    Unary {
        op: UnaryOp,
        operand: Box<ExprIR>,
    },
    /// Arithmetic, bitwise, shift or comparison on operands already
    /// converted to `operand_ty`.
    Binary {
        op: BinaryOp,
        operand_ty: Ty,
        left: Box<ExprIR>,
        right: Box<ExprIR>,
    },
    /// Short-circuit `&&` (`is_and`) or `||`.
    Logical {
        is_and: bool,
        left: Box<ExprIR>,
        right: Box<ExprIR>,
    },
    Assign {
        target: Place,
        /// Compound operator and the operand type it works on.
        op: Option<(BinaryOp, Ty)>,
        value: Box<ExprIR>,
    },
    IncDec {
        target: Place,
        increment: bool,
        prefix: bool,
    },
    Conditional {
        cond: Box<ExprIR>,
        then: Box<ExprIR>,
        otherwise: Box<ExprIR>,
    },
    /// Conversion of the operand to this expression's type.
    Convert(Box<ExprIR>),
    /// String concatenation of two string operands.
    Concat(Box<ExprIR>, Box<ExprIR>),
    /// `ToString()` of any value.
    ToStr(Box<ExprIR>),
    /// `string.Length`
    StrLen(Box<ExprIR>),
    Error,
}

/// An assignable location.
#[derive(Debug, Clone)]
pub enum Place {
    Local(u16),
    /// Static field when `target` is `None`.
    Field {
        target: Option<Box<ExprIR>>,
        field: FieldRef,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

// =============================================================================
// Traversal
// =============================================================================

/// Calls `f` on `expr` and every nested expression, parents first.
pub fn walk_expr<'a>(expr: &'a ExprIR, f: &mut dyn FnMut(&'a ExprIR)) {
    f(expr);
    match &expr.kind {
        ExprKind::Field { target, .. } => {
            if let Some(target) = target {
                walk_expr(target, f);
            }
        }
        ExprKind::Call { target, args, .. } => {
            if let Some(target) = target {
                walk_expr(target, f);
            }
            for arg in args {
                walk_expr(arg, f);
            }
        }
        ExprKind::Unary { operand, .. }
        | ExprKind::Convert(operand)
        | ExprKind::ToStr(operand)
        | ExprKind::StrLen(operand) => walk_expr(operand, f),
        ExprKind::Binary { left, right, .. }
        | ExprKind::Logical { left, right, .. }
        | ExprKind::Concat(left, right) => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
        ExprKind::Assign { target, value, .. } => {
            walk_place(target, f);
            walk_expr(value, f);
        }
        ExprKind::IncDec { target, .. } => walk_place(target, f),
        ExprKind::Conditional {
            cond,
            then,
            otherwise,
        } => {
            walk_expr(cond, f);
            walk_expr(then, f);
            walk_expr(otherwise, f);
        }
        ExprKind::Int(_)
        | ExprKind::Long(_)
        | ExprKind::Double(_)
        | ExprKind::Bool(_)
        | ExprKind::Str(_)
        | ExprKind::Null
        | ExprKind::Local(_)
        | ExprKind::This
        | ExprKind::New(_)
        | ExprKind::Error => {}
    }
}

fn walk_place<'a>(place: &'a Place, f: &mut dyn FnMut(&'a ExprIR)) {
    if let Place::Field {
        target: Some(target),
        ..
    } = place
    {
        walk_expr(target, f);
    }
}

/// Calls `f` on every statement in `stmts`, recursively, parents first.
pub fn walk_stmts<'a>(stmts: &'a [StmtIR], f: &mut dyn FnMut(&'a StmtIR)) {
    for stmt in stmts {
        walk_stmt(stmt, f);
    }
}

fn walk_stmt<'a>(stmt: &'a StmtIR, f: &mut dyn FnMut(&'a StmtIR)) {
    f(stmt);
    match &stmt.kind {
        StmtKind::If {
            then, otherwise, ..
        } => {
            walk_stmt(then, f);
            if let Some(otherwise) = otherwise {
                walk_stmt(otherwise, f);
            }
        }
        StmtKind::While { body, .. } => walk_stmt(body, f),
        StmtKind::For { init, body, .. } => {
            walk_stmts(init, f);
            walk_stmt(body, f);
        }
        StmtKind::Block(stmts) => walk_stmts(stmts, f),
        StmtKind::Expr(_)
        | StmtKind::Local { .. }
        | StmtKind::Return(_)
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Error => {}
    }
}

/// Expressions directly owned by a statement (not by nested statements).
pub fn stmt_exprs(stmt: &StmtIR) -> Vec<&ExprIR> {
    match &stmt.kind {
        StmtKind::Expr(expr) => vec![expr],
        StmtKind::Local { init, .. } => init.iter().collect(),
        StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => vec![cond],
        StmtKind::For { cond, update, .. } => cond.iter().chain(update.iter()).collect(),
        StmtKind::Return(value) => value.iter().collect(),
        StmtKind::Break | StmtKind::Continue | StmtKind::Block(_) | StmtKind::Error => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: i32) -> ExprIR {
        ExprIR::new(ExprKind::Int(value), Ty::Int, Location::none())
    }

    #[test]
    fn test_walk_expr_visits_nested() {
        let sum = ExprIR::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                operand_ty: Ty::Int,
                left: Box::new(int(1)),
                right: Box::new(ExprIR::new(ExprKind::Local(3), Ty::Int, Location::none())),
            },
            Ty::Int,
            Location::none(),
        );
        let mut seen = 0;
        walk_expr(&sum, &mut |_| seen += 1);
        assert_eq!(seen, 3);
    }

    #[test]
    fn test_constant_detection() {
        assert!(int(1).is_constant());
        let widened = ExprIR::new(ExprKind::Convert(Box::new(int(1))), Ty::Long, Location::none());
        assert!(widened.is_constant());
        assert!(!ExprIR::new(ExprKind::Local(0), Ty::Int, Location::none()).is_constant());
    }

    #[test]
    fn test_ty_predicates() {
        assert!(Ty::Long.is_numeric() && Ty::Long.is_integral());
        assert!(!Ty::Double.is_integral());
        assert!(Ty::Null.is_reference());
        assert_eq!(Ty::String.to_string(), "string");
    }
}
