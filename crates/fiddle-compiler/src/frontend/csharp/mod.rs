//! C# compile service.

pub mod ast;
pub mod parser;
pub mod to_ir;

use super::{Compilation, CompilationOptions, CompilerBackend, ParseOptions, SyntaxTree};
use crate::codegen;
use crate::diagnostic::CompilerError;
use crate::image;
use crate::reference::ReferenceCatalog;
use crate::validate;
use parser::CSharpParser;

/// C# backend implementation.
///
/// Holds no parser: tree-sitter parsers are not `Sync`, so each parse
/// creates its own.
#[derive(Debug, Default)]
pub struct CSharpBackend;

impl CSharpBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerBackend for CSharpBackend {
    fn language(&self) -> &str {
        "csharp"
    }

    fn extensions(&self) -> &[&str] {
        &["cs"]
    }

    fn parse(&self, source: &str, options: &ParseOptions) -> Result<SyntaxTree, CompilerError> {
        let mut parser = CSharpParser::new()?;
        let tree = parser.parse(source)?;
        Ok(SyntaxTree {
            source: source.to_string(),
            tree,
            options: *options,
        })
    }

    fn compile(
        &self,
        tree: &SyntaxTree,
        catalog: &ReferenceCatalog,
        options: &CompilationOptions,
    ) -> Result<Compilation, CompilerError> {
        options.check_cancelled()?;
        let (unit, mut diagnostics) =
            parser::lower(&tree.source, &tree.tree, tree.options.language_version);
        log::debug!(
            "lowered {} classes, {} top-level statements",
            unit.classes.len(),
            unit.globals.len()
        );

        options.check_cancelled()?;
        let program = to_ir::to_ir(&unit, catalog, options, &mut diagnostics)?;

        options.check_cancelled()?;
        diagnostics.extend(validate::validate(&program));

        Ok(Compilation {
            program,
            diagnostics: diagnostics.into_sorted(),
        })
    }

    fn emit(&self, compilation: &Compilation) -> Result<Vec<u8>, CompilerError> {
        if compilation.has_errors() {
            return Err(CompilerError::EmitFailed {
                message: "compilation has errors".to_string(),
            });
        }
        let module = codegen::generate(&compilation.program)?;
        let bytes = image::encode(&module).map_err(|e| CompilerError::EmitFailed {
            message: e.to_string(),
        })?;
        log::debug!("emitted {} ({} bytes)", module.name, bytes.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> Compilation {
        let backend = CSharpBackend::new();
        let tree = backend.parse(source, &ParseOptions::default()).unwrap();
        backend
            .compile(&tree, &ReferenceCatalog::core_only(), &CompilationOptions::default())
            .unwrap()
    }

    #[test]
    fn test_compile_and_emit() {
        let backend = CSharpBackend::new();
        let compilation = compile("public class C { public static int Add(int a, int b) => a + b; }");
        assert!(compilation.diagnostics.is_empty(), "{:?}", compilation.diagnostics);
        let bytes = backend.emit(&compilation).unwrap();
        let module = image::decode(&bytes).unwrap();
        assert_eq!(module.name, "DynamicCode");
        assert!(module.find_type("C").is_some());
    }

    #[test]
    fn test_emit_refuses_errors() {
        let backend = CSharpBackend::new();
        let compilation = compile("class C { void M() { int x = } }");
        assert!(compilation.has_errors());
        let err = backend.emit(&compilation).unwrap_err();
        assert!(matches!(err, CompilerError::EmitFailed { .. }));
    }

    #[test]
    fn test_cancelled_compile() {
        let backend = CSharpBackend::new();
        let tree = backend.parse("class C { }", &ParseOptions::default()).unwrap();
        let token = crate::session::CancellationToken::new();
        token.cancel();
        let options = CompilationOptions::default().with_cancellation(token);
        let err = backend
            .compile(&tree, &ReferenceCatalog::core_only(), &options)
            .unwrap_err();
        assert!(matches!(err, CompilerError::Cancelled));
    }
}
