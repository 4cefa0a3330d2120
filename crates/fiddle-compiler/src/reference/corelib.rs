//! The base runtime unit (`System.Runtime.dll`).
//!
//! Public methods here are [`Intrinsic`]s the loader implements natively;
//! the only bytecode is the static initializer of `System.Math`.

use crate::image::{
    self, Code, FieldDef, FieldHandle, Instr, Intrinsic, MethodBody, MethodDef, ModuleImage,
    ParamDef, Scope, TypeDef, TypeHandle, TypeSig, STATIC_INIT,
};

/// Unit name under which the base runtime is published in a catalog.
pub const CORE_LIBRARY_UNIT: &str = "System.Runtime.dll";

/// Assembly name recorded inside the image.
pub const CORE_LIBRARY_NAME: &str = "System.Runtime";

/// Builds the base runtime image.
pub fn core_library() -> ModuleImage {
    let mut module = ModuleImage::new(CORE_LIBRARY_NAME);
    module.types = vec![console(), math(), string(), int32(), int64(), double()];
    module
}

/// Encoded bytes of [`core_library`], as they would be fetched from disk.
pub fn core_library_bytes() -> Vec<u8> {
    // Encoding a static, finite image cannot fail.
    image::encode(&core_library()).unwrap_or_default()
}

/// Position of `System.Math` in [`core_library`]'s type list.
const MATH_INDEX: u32 = 1;

const PRINTABLE: [TypeSig; 6] = [
    TypeSig::String,
    TypeSig::Int,
    TypeSig::Long,
    TypeSig::Double,
    TypeSig::Bool,
    TypeSig::Object,
];

fn console() -> TypeDef {
    let mut ty = static_type("Console");
    ty.methods.push(intrinsic("WriteLine", &[], TypeSig::Void, Intrinsic::ConsoleWriteLine));
    for sig in PRINTABLE {
        ty.methods.push(intrinsic(
            "WriteLine",
            &[("value", sig)],
            TypeSig::Void,
            Intrinsic::ConsoleWriteLineValue,
        ));
    }
    for sig in PRINTABLE {
        ty.methods.push(intrinsic(
            "Write",
            &[("value", sig)],
            TypeSig::Void,
            Intrinsic::ConsoleWriteValue,
        ));
    }
    ty
}

fn math() -> TypeDef {
    let mut ty = static_type("Math");
    for sig in [TypeSig::Int, TypeSig::Long, TypeSig::Double] {
        ty.methods.push(intrinsic("Abs", &[("value", sig)], sig, Intrinsic::MathAbs));
        ty.methods.push(intrinsic("Max", &[("val1", sig), ("val2", sig)], sig, Intrinsic::MathMax));
        ty.methods.push(intrinsic("Min", &[("val1", sig), ("val2", sig)], sig, Intrinsic::MathMin));
    }
    let d = TypeSig::Double;
    ty.methods.push(intrinsic("Sqrt", &[("d", d)], d, Intrinsic::MathSqrt));
    ty.methods.push(intrinsic("Pow", &[("x", d), ("y", d)], d, Intrinsic::MathPow));
    ty.methods.push(intrinsic("Floor", &[("d", d)], d, Intrinsic::MathFloor));
    ty.methods.push(intrinsic("Ceiling", &[("a", d)], d, Intrinsic::MathCeiling));
    ty.methods.push(intrinsic("Round", &[("a", d)], d, Intrinsic::MathRound));
    ty.fields.push(FieldDef {
        name: "PI".to_string(),
        ty: TypeSig::Double,
        is_static: true,
        is_public: true,
    });
    let pi = FieldHandle {
        ty: TypeHandle {
            scope: Scope::Local,
            index: MATH_INDEX,
        },
        index: 0,
    };
    ty.static_init = Some(ty.methods.len() as u32);
    ty.methods.push(MethodDef {
        name: STATIC_INIT.to_string(),
        params: vec![],
        ret: TypeSig::Void,
        is_static: true,
        is_public: false,
        body: MethodBody::Code(Code {
            locals: 0,
            instrs: vec![
                Instr::PushDouble(std::f64::consts::PI),
                Instr::StoreStatic(pi),
                Instr::ReturnVoid,
            ],
        }),
    });
    ty
}

fn string() -> TypeDef {
    let mut ty = static_type("String");
    ty.is_static = false;
    let s = TypeSig::String;
    ty.methods.push(intrinsic("Concat", &[("str0", s), ("str1", s)], s, Intrinsic::StringConcat));
    ty.methods.push(intrinsic(
        "IsNullOrEmpty",
        &[("value", s)],
        TypeSig::Bool,
        Intrinsic::StringIsNullOrEmpty,
    ));
    ty
}

fn int32() -> TypeDef {
    parse_type("Int32", TypeSig::Int, Intrinsic::Int32Parse)
}

fn int64() -> TypeDef {
    parse_type("Int64", TypeSig::Long, Intrinsic::Int64Parse)
}

fn double() -> TypeDef {
    parse_type("Double", TypeSig::Double, Intrinsic::DoubleParse)
}

fn parse_type(name: &str, sig: TypeSig, parse: Intrinsic) -> TypeDef {
    let mut ty = static_type(name);
    ty.is_static = false;
    ty.methods.push(intrinsic("Parse", &[("s", TypeSig::String)], sig, parse));
    ty
}

fn static_type(name: &str) -> TypeDef {
    let mut ty = TypeDef::new("System", name);
    ty.is_static = true;
    ty
}

fn intrinsic(name: &str, params: &[(&str, TypeSig)], ret: TypeSig, which: Intrinsic) -> MethodDef {
    MethodDef {
        name: name.to_string(),
        params: params
            .iter()
            .map(|(name, ty)| ParamDef {
                name: name.to_string(),
                ty: *ty,
            })
            .collect(),
        ret,
        is_static: true,
        is_public: true,
        body: MethodBody::Intrinsic(which),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_library_decodes() {
        let bytes = core_library_bytes();
        let decoded = image::decode(&bytes).unwrap();
        assert_eq!(decoded.name, CORE_LIBRARY_NAME);
        assert!(decoded.references.is_empty());
    }

    #[test]
    fn test_console_overloads() {
        let lib = core_library();
        let (_, console) = lib.find_type("System.Console").unwrap();
        let write_lines = console.methods.iter().filter(|m| m.name == "WriteLine").count();
        assert_eq!(write_lines, 1 + PRINTABLE.len());
    }

    #[test]
    fn test_math_is_static_with_pi() {
        let lib = core_library();
        let (_, math) = lib.find_type("System.Math").unwrap();
        assert!(math.is_static);
        assert!(math.fields.iter().any(|f| f.name == "PI" && f.is_static));
        let (index, _) = lib.find_type("System.Math").unwrap();
        assert_eq!(index, MATH_INDEX);
        let init = math.static_init.unwrap() as usize;
        assert!(math.methods[init].is_special());
    }
}
