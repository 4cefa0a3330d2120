//! C#-specific AST types.
//!
//! Only the subset the binder understands is modelled; anything else is
//! lowered to an `Unsupported` node carrying the construct's name so the
//! binder can report it.

use crate::diagnostic::Location;

/// A parsed source file.
#[derive(Debug, Default)]
pub struct CompilationUnit {
    pub usings: Vec<UsingDecl>,
    pub classes: Vec<ClassDecl>,
    /// Top-level statements, in source order.
    pub globals: Vec<Stmt>,
    /// Declarations the subset does not support (structs, enums, ...).
    pub unsupported: Vec<(String, Location)>,
}

/// A `using` directive.
#[derive(Debug, Clone)]
pub struct UsingDecl {
    pub name: String,
    pub is_static: bool,
    pub is_alias: bool,
    pub location: Location,
}

/// A class declaration.
#[derive(Debug)]
pub struct ClassDecl {
    pub namespace: String,
    pub name: String,
    pub modifiers: Modifiers,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    /// Nested members the subset does not support.
    pub unsupported: Vec<(String, Location)>,
    pub location: Location,
}

/// Declaration modifiers.
#[derive(Debug, Clone, Default)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_const: bool,
    pub accessibility: Accessibility,
    /// Recognised by the grammar but not by the binder.
    pub unsupported: Vec<(String, Location)>,
}

/// Member or type accessibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accessibility {
    Public,
    Internal,
    Protected,
    #[default]
    Private,
}

impl Accessibility {
    /// Visible outside the declaring type.
    pub fn is_visible(&self) -> bool {
        matches!(self, Accessibility::Public | Accessibility::Internal)
    }
}

/// A field declaration with a single declarator.
#[derive(Debug)]
pub struct FieldDecl {
    pub ty: TypeRef,
    pub name: String,
    pub init: Option<Expr>,
    pub modifiers: Modifiers,
    pub location: Location,
}

/// A method declaration.
#[derive(Debug)]
pub struct MethodDecl {
    pub name: String,
    pub ret: TypeRef,
    pub params: Vec<Param>,
    pub body: MethodBody,
    pub modifiers: Modifiers,
    pub location: Location,
}

#[derive(Debug)]
pub enum MethodBody {
    Block(Block),
    Expression(Expr),
    /// `;` only (abstract or extern).
    None,
}

#[derive(Debug)]
pub struct Param {
    pub ty: TypeRef,
    pub name: String,
    pub has_default: bool,
    pub has_modifier: bool,
    pub location: Location,
}

/// A type as written in source.
#[derive(Debug, Clone)]
pub struct TypeRef {
    pub kind: TypeRefKind,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRefKind {
    /// Keyword type such as `int` or `string`.
    Predefined(String),
    /// Possibly dotted name such as `Console` or `System.Text.StringBuilder`.
    Named(String),
    /// `var`
    Var,
    /// Array, nullable, generic, tuple, pointer types.
    Unsupported(String),
    /// Missing or malformed type; already reported as a syntax error.
    Error,
}

impl TypeRef {
    pub fn describe(&self) -> String {
        match &self.kind {
            TypeRefKind::Predefined(name) | TypeRefKind::Named(name) => name.clone(),
            TypeRefKind::Var => "var".to_string(),
            TypeRefKind::Unsupported(text) => text.clone(),
            TypeRefKind::Error => "?".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub location: Location,
}

#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: Location,
}

#[derive(Debug)]
pub enum StmtKind {
    Local {
        ty: TypeRef,
        is_const: bool,
        declarators: Vec<Declarator>,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Vec<Stmt>,
        cond: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Block(Block),
    Empty,
    Unsupported(String),
    /// Malformed statement; already reported as a syntax error.
    Error,
}

#[derive(Debug)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expr>,
    pub location: Location,
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
}

#[derive(Debug)]
pub enum ExprKind {
    Literal(Literal),
    Name(String),
    /// A keyword type used as an expression, e.g. `int` in `int.Parse`.
    PredefinedType(String),
    This,
    Member {
        target: Box<Expr>,
        name: String,
        name_location: Location,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        ty: TypeRef,
        args: Vec<Expr>,
        has_initializer: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    IncDec {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        /// `None` for `=`, otherwise the compound operator.
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Cast {
        ty: TypeRef,
        operand: Box<Expr>,
    },
    Unsupported(String),
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer literal value and whether it carried an `L` suffix.
    Int { value: u64, long_suffix: bool },
    /// Integer literal too large for `ulong`.
    IntOverflow,
    Real(f64),
    Bool(bool),
    Str(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "&" => BinaryOp::BitAnd,
            "|" => BinaryOp::BitOr,
            "^" => BinaryOp::BitXor,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}
