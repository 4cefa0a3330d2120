//! Flow analysis of the bound IR.
//!
//! Runs after binding and only produces diagnostics; the IR is not changed.

mod flow;
mod usage;

use crate::diagnostic::Diagnostic;
use crate::ir::{ClassRef, MethodIR, ProgramIR, Ty, TypeIR};

/// Validates every method of the program.
pub fn validate(program: &ProgramIR) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for ty in &program.types {
        for method in &ty.methods {
            flow::analyze_method(program, ty, method, &mut diagnostics);
            usage::check_locals(method, &mut diagnostics);
        }
    }
    usage::check_usings(program, &mut diagnostics);

    diagnostics
}

/// Signature of a method as shown in messages, e.g. `C.Add(int, int)`.
fn method_signature(program: &ProgramIR, ty: &TypeIR, method: &MethodIR) -> String {
    let params: Vec<String> = method.params().map(|p| type_name(program, p.ty)).collect();
    format!("{}.{}({})", ty.name, method.name, params.join(", "))
}

fn type_name(program: &ProgramIR, ty: Ty) -> String {
    match ty {
        Ty::Class(ClassRef::Local(index)) => program
            .types
            .get(index as usize)
            .map(TypeIR::full_name)
            .unwrap_or_else(|| ty.to_string()),
        other => other.to_string(),
    }
}
