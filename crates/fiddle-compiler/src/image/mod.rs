//! Module images: the binary format shared by reference units and
//! compiled units.
//!
//! An image carries type metadata (fields, method signatures) for symbol
//! resolution and, for methods with a body, the stack-machine bytecode the
//! loader executes. Methods of the base runtime unit are `Intrinsic` and run
//! natively.
//!
//! ## Layout
//!
//! ```text
//! [magic "FDLM"][version u16 LE][xxh3-64 of payload u64 LE][payload]
//! ```
//!
//! The payload is the JSON encoding of [`ModuleImage`].

mod codec;

use serde::{Deserialize, Serialize};

pub use codec::{checksum, decode, encode, ImageError, FORMAT_VERSION, MAGIC};

/// Name of the method holding static field initializers.
pub const STATIC_INIT: &str = ".cctor";

/// Name of the method holding instance field initializers.
pub const INSTANCE_INIT: &str = ".ctor";

/// Where a handle points: the image itself or one of its references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Local,
    /// Index into [`ModuleImage::references`].
    External(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeHandle {
    pub scope: Scope,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldHandle {
    pub ty: TypeHandle,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodHandle {
    pub ty: TypeHandle,
    pub index: u32,
}

/// Type of a field, parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSig {
    Void,
    Bool,
    Int,
    Long,
    Double,
    String,
    Object,
    Class(TypeHandle),
}

/// A complete module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleImage {
    /// Assembly name, e.g. `DynamicCode`.
    pub name: String,
    /// Names of the reference units this image depends on.
    pub references: Vec<String>,
    pub types: Vec<TypeDef>,
    pub entry_point: Option<MethodHandle>,
}

impl ModuleImage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            references: Vec::new(),
            types: Vec::new(),
            entry_point: None,
        }
    }

    /// Finds a type by namespace-qualified name.
    pub fn find_type(&self, full_name: &str) -> Option<(u32, &TypeDef)> {
        self.types
            .iter()
            .enumerate()
            .find(|(_, t)| t.full_name() == full_name)
            .map(|(i, t)| (i as u32, t))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub namespace: String,
    pub name: String,
    pub is_static: bool,
    pub is_public: bool,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    /// Index of the [`STATIC_INIT`] method, if any.
    pub static_init: Option<u32>,
    /// Index of the [`INSTANCE_INIT`] method, if any.
    pub instance_init: Option<u32>,
}

impl TypeDef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            is_static: false,
            is_public: true,
            fields: Vec::new(),
            methods: Vec::new(),
            static_init: None,
            instance_init: None,
        }
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeSig,
    pub is_static: bool,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub ty: TypeSig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<ParamDef>,
    pub ret: TypeSig,
    pub is_static: bool,
    pub is_public: bool,
    pub body: MethodBody,
}

impl MethodDef {
    /// Compiler-generated initializers are not callable from source.
    pub fn is_special(&self) -> bool {
        self.name.starts_with('.')
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MethodBody {
    Intrinsic(Intrinsic),
    Code(Code),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    /// Slot count: `this` (instance methods), parameters, locals, temporaries.
    pub locals: u16,
    pub instrs: Vec<Instr>,
}

/// Natively implemented methods of the base runtime unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intrinsic {
    ConsoleWriteLine,
    ConsoleWriteLineValue,
    ConsoleWriteValue,
    MathAbs,
    MathMax,
    MathMin,
    MathSqrt,
    MathPow,
    MathFloor,
    MathCeiling,
    MathRound,
    StringConcat,
    StringIsNullOrEmpty,
    Int32Parse,
    Int64Parse,
    DoubleParse,
}

/// Operand kind of typed instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Bool,
    Int,
    Long,
    Double,
    String,
    Ref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Stack-machine instructions.
///
/// Jump targets are absolute instruction indices within the method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    PushInt(i32),
    PushLong(i64),
    PushDouble(f64),
    PushBool(bool),
    PushStr(String),
    PushNull,
    Load(u16),
    Store(u16),
    /// `[object] -> [value]`
    LoadField(FieldHandle),
    /// `[object, value] -> []`
    StoreField(FieldHandle),
    LoadStatic(FieldHandle),
    StoreStatic(FieldHandle),
    Arith(ArithOp, Kind),
    Neg(Kind),
    BitNot(Kind),
    Not,
    Compare(CmpOp, Kind),
    /// Numeric conversion `from -> to`.
    Convert(Kind, Kind),
    Concat,
    ToStr,
    StrLen,
    Jump(u32),
    JumpIfFalse(u32),
    JumpIfTrue(u32),
    /// Pops arguments (and the receiver for instance methods, pushed first).
    Call(MethodHandle),
    NewObject(TypeHandle),
    Dup,
    Pop,
    Return,
    ReturnVoid,
}
