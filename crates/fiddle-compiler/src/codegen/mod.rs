//! Module image generation from the bound IR.
//!
//! Type metadata is copied across one to one (type, field and method
//! indices are preserved), so an IR reference is also an image handle.
//! Method bodies are compiled to stack-machine bytecode by [`emit`].

mod emit;

use crate::diagnostic::CompilerError;
use crate::image::{
    FieldDef, FieldHandle, Kind, MethodBody, MethodDef, MethodHandle, ModuleImage, ParamDef, Scope,
    TypeDef, TypeHandle, TypeSig,
};
use crate::ir::{ClassRef, FieldRef, MethodIR, MethodRef, ProgramIR, Ty, TypeIR};

/// Generates the module image of an error-free program.
pub fn generate(program: &ProgramIR) -> Result<ModuleImage, CompilerError> {
    let mut module = ModuleImage::new(program.assembly_name.clone());
    module.references = program.references.clone();

    for ty in &program.types {
        module.types.push(generate_type(ty)?);
    }
    module.entry_point = program.entry_point.map(method_handle);

    log::debug!(
        "generated {} types, {} methods",
        module.types.len(),
        module.types.iter().map(|t| t.methods.len()).sum::<usize>()
    );
    Ok(module)
}

fn generate_type(ty: &TypeIR) -> Result<TypeDef, CompilerError> {
    let mut def = TypeDef::new(ty.namespace.clone(), ty.name.clone());
    def.is_static = ty.is_static;
    def.is_public = ty.is_public;
    def.static_init = ty.static_init;
    def.instance_init = ty.instance_init;

    for field in &ty.fields {
        def.fields.push(FieldDef {
            name: field.name.clone(),
            ty: type_sig(field.ty)?,
            is_static: field.is_static,
            is_public: field.is_public,
        });
    }
    for method in &ty.methods {
        def.methods.push(generate_method(method)?);
    }
    Ok(def)
}

fn generate_method(method: &MethodIR) -> Result<MethodDef, CompilerError> {
    let params = method
        .params()
        .map(|p| {
            Ok(ParamDef {
                name: p.name.clone(),
                ty: type_sig(p.ty)?,
            })
        })
        .collect::<Result<Vec<_>, CompilerError>>()?;

    Ok(MethodDef {
        name: method.name.clone(),
        params,
        ret: type_sig(method.ret)?,
        is_static: method.is_static,
        is_public: method.is_public,
        body: MethodBody::Code(emit::emit_method(method)?),
    })
}

fn unbound(what: &str) -> CompilerError {
    CompilerError::EmitFailed {
        message: format!("unbound {} reached code generation", what),
    }
}

pub(crate) fn type_handle(class: ClassRef) -> TypeHandle {
    match class {
        ClassRef::Local(index) => TypeHandle {
            scope: Scope::Local,
            index,
        },
        ClassRef::External { unit, index } => TypeHandle {
            scope: Scope::External(unit),
            index,
        },
    }
}

pub(crate) fn field_handle(field: FieldRef) -> FieldHandle {
    FieldHandle {
        ty: type_handle(field.class),
        index: field.index,
    }
}

pub(crate) fn method_handle(method: MethodRef) -> MethodHandle {
    MethodHandle {
        ty: type_handle(method.class),
        index: method.index,
    }
}

pub(crate) fn type_sig(ty: Ty) -> Result<TypeSig, CompilerError> {
    let sig = match ty {
        Ty::Void => TypeSig::Void,
        Ty::Bool => TypeSig::Bool,
        Ty::Int => TypeSig::Int,
        Ty::Long => TypeSig::Long,
        Ty::Double => TypeSig::Double,
        Ty::String => TypeSig::String,
        Ty::Null | Ty::Object => TypeSig::Object,
        Ty::Class(class) => TypeSig::Class(type_handle(class)),
        Ty::Error => return Err(unbound("type")),
    };
    Ok(sig)
}

/// Operand kind of typed instructions for values of `ty`.
pub(crate) fn kind(ty: Ty) -> Kind {
    match ty {
        Ty::Bool => Kind::Bool,
        Ty::Int => Kind::Int,
        Ty::Long => Kind::Long,
        Ty::Double => Kind::Double,
        Ty::String => Kind::String,
        _ => Kind::Ref,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Instr, INSTANCE_INIT};
    use crate::frontend::{create_backend, CompilationOptions, ParseOptions};
    use crate::reference::ReferenceCatalog;

    fn generate_source(source: &str) -> ModuleImage {
        let backend = create_backend("csharp").unwrap();
        let tree = backend.parse(source, &ParseOptions::default()).unwrap();
        let compilation = backend
            .compile(&tree, &ReferenceCatalog::core_only(), &CompilationOptions::default())
            .unwrap();
        assert!(!compilation.has_errors(), "{:?}", compilation.diagnostics);
        generate(&compilation.program).unwrap()
    }

    fn code(module: &ModuleImage, ty: &str, method: &str) -> Vec<Instr> {
        let (_, def) = module.find_type(ty).unwrap();
        let method = def.methods.iter().find(|m| m.name == method).unwrap();
        match &method.body {
            MethodBody::Code(code) => code.instrs.clone(),
            MethodBody::Intrinsic(_) => panic!("expected bytecode"),
        }
    }

    #[test]
    fn test_metadata_is_preserved() {
        let module = generate_source(
            "namespace N { public class C { public int f = 1; static long g; public static int Add(int a, int b) => a + b; } }",
        );
        assert_eq!(module.references, vec!["System.Runtime.dll"]);
        let (_, def) = module.find_type("N.C").unwrap();
        assert!(def.is_public);
        assert_eq!(def.fields[1].ty, TypeSig::Long);
        assert!(def.fields[1].is_static);
        let add = &def.methods[0];
        assert_eq!(add.params.len(), 2);
        assert_eq!(add.ret, TypeSig::Int);
        assert_eq!(def.methods[def.instance_init.unwrap() as usize].name, INSTANCE_INIT);
    }

    #[test]
    fn test_expression_body_bytecode() {
        let module = generate_source("class C { static int Add(int a, int b) => a + b; }");
        assert_eq!(
            code(&module, "C", "Add"),
            vec![
                Instr::Load(0),
                Instr::Load(1),
                Instr::Arith(crate::image::ArithOp::Add, Kind::Int),
                Instr::Return,
                Instr::ReturnVoid,
            ]
        );
    }

    #[test]
    fn test_external_calls_use_reference_scope() {
        let module = generate_source("class C { static void M() { System.Console.WriteLine(1); } }");
        let instrs = code(&module, "C", "M");
        assert!(instrs.iter().any(|i| matches!(
            i,
            Instr::Call(MethodHandle {
                ty: TypeHandle {
                    scope: Scope::External(0),
                    ..
                },
                ..
            })
        )));
    }

    #[test]
    fn test_entry_point_handle() {
        let module = generate_source("class P { static void Main() { } }");
        let entry = module.entry_point.unwrap();
        assert_eq!(entry.ty.scope, Scope::Local);
        assert_eq!(entry.index, 0);
    }
}
