//! Unused locals and unnecessary using directives.

use crate::diagnostic::Diagnostic;
use crate::ir::{self, ExprKind, LocalKind, MethodIR, Place, ProgramIR, StmtKind};

#[derive(Debug, Default, Clone, Copy)]
struct LocalUse {
    reads: usize,
    writes: usize,
    /// Every write stored a compile-time constant.
    constant_writes: bool,
    initialized: bool,
}

impl LocalUse {
    fn write(&mut self, constant: bool) {
        if self.writes == 0 {
            self.constant_writes = true;
        }
        self.writes += 1;
        self.constant_writes &= constant;
    }
}

/// Appends CS0168 and CS0219 for locals of `method`.
pub fn check_locals(method: &MethodIR, diagnostics: &mut Vec<Diagnostic>) {
    let mut uses = vec![LocalUse::default(); method.locals.len()];

    ir::walk_stmts(&method.body, &mut |stmt| {
        if let StmtKind::Local {
            slot,
            init: Some(init),
        } = &stmt.kind
        {
            if let Some(local) = uses.get_mut(*slot as usize) {
                local.initialized = true;
                local.write(init.is_constant());
            }
        }
        for expr in ir::stmt_exprs(stmt) {
            ir::walk_expr(expr, &mut |e| match &e.kind {
                ExprKind::Local(slot) => {
                    if let Some(local) = uses.get_mut(*slot as usize) {
                        local.reads += 1;
                    }
                }
                ExprKind::Assign {
                    target: Place::Local(slot),
                    op,
                    value,
                } => {
                    if let Some(local) = uses.get_mut(*slot as usize) {
                        if op.is_some() {
                            local.reads += 1;
                        }
                        local.write(op.is_none() && value.is_constant());
                    }
                }
                ExprKind::IncDec {
                    target: Place::Local(slot),
                    ..
                } => {
                    if let Some(local) = uses.get_mut(*slot as usize) {
                        local.reads += 1;
                        local.write(false);
                    }
                }
                _ => {}
            });
        }
    });

    for (local, used) in method.locals.iter().zip(&uses) {
        if local.kind != LocalKind::Local || local.ty.is_error() || used.reads > 0 {
            continue;
        }
        if used.writes == 0 && !used.initialized {
            diagnostics.push(Diagnostic::warning(
                "CS0168",
                format!("The variable '{}' is declared but never used", local.name),
                local.location,
            ));
        } else if used.constant_writes {
            diagnostics.push(Diagnostic::warning(
                "CS0219",
                format!("The variable '{}' is assigned but its value is never used", local.name),
                local.location,
            ));
        }
    }
}

/// Appends CS8019 for each using directive no name resolved through.
pub fn check_usings(program: &ProgramIR, diagnostics: &mut Vec<Diagnostic>) {
    for using in program.usings.iter().filter(|u| !u.used) {
        diagnostics.push(Diagnostic::info(
            "CS8019",
            "Unnecessary using directive.",
            using.location,
        ));
    }
}

#[cfg(test)]
mod tests {
    use crate::diagnostic::{Diagnostic, Severity};
    use crate::frontend::{create_backend, CompilationOptions, ParseOptions};
    use crate::reference::ReferenceCatalog;

    fn diagnostics(source: &str) -> Vec<Diagnostic> {
        let backend = create_backend("csharp").unwrap();
        let tree = backend.parse(source, &ParseOptions::default()).unwrap();
        backend
            .compile(&tree, &ReferenceCatalog::core_only(), &CompilationOptions::default())
            .unwrap()
            .diagnostics
    }

    #[test]
    fn test_declared_but_never_used() {
        let found = diagnostics("class C { static void M() { int x; } }");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "CS0168");
        assert_eq!(found[0].severity, Severity::Warning);
    }

    #[test]
    fn test_assigned_but_never_used() {
        let found = diagnostics("class C { static void M() { int x = 1; x = 2; } }");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "CS0219");
    }

    #[test]
    fn test_non_constant_write_is_not_reported() {
        assert!(diagnostics("class C { static int F() => 1; static void M() { int x = F(); } }").is_empty());
    }

    #[test]
    fn test_read_local_is_not_reported() {
        assert!(diagnostics("class C { static int M() { int x = 1; x++; return x; } }").is_empty());
    }

    #[test]
    fn test_unused_using_is_info() {
        let found = diagnostics("using System;\nclass C { }");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "CS8019");
        assert_eq!(found[0].severity, Severity::Info);
        assert!(diagnostics("using System;\nclass C { static void M() { Console.WriteLine(1); } }").is_empty());
    }
}
