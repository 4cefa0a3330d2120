//! Reachability and definite assignment.
//!
//! A single forward pass per method. The flow state is the set of local
//! slots definitely assigned at a point, or `None` where the point cannot
//! be reached.

use std::collections::HashSet;

use super::method_signature;
use crate::diagnostic::{Diagnostic, Location};
use crate::ir::{ExprIR, ExprKind, LocalKind, MethodIR, Place, ProgramIR, StmtIR, StmtKind, Ty, TypeIR};

type State = Option<HashSet<u16>>;

fn join(a: State, b: State) -> State {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) => Some(a.intersection(&b).copied().collect()),
    }
}

/// States flowing out of a loop through `break` and `continue`.
#[derive(Default)]
struct LoopFrame {
    breaks: State,
    continues: State,
}

struct Flow<'m> {
    method: &'m MethodIR,
    diagnostics: Vec<Diagnostic>,
    reported_unassigned: HashSet<u16>,
    loops: Vec<LoopFrame>,
    /// Set once a statement failed to bind; its effect on flow is unknown.
    saw_error: bool,
}

/// Analyzes one method, appending CS0161, CS0162 and CS0165.
pub fn analyze_method(
    program: &ProgramIR,
    ty: &TypeIR,
    method: &MethodIR,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut flow = Flow {
        method,
        diagnostics: Vec::new(),
        reported_unassigned: HashSet::new(),
        loops: Vec::new(),
        saw_error: false,
    };

    let entry: HashSet<u16> = method
        .locals
        .iter()
        .enumerate()
        .filter(|(_, l)| l.kind != LocalKind::Local)
        .map(|(slot, _)| slot as u16)
        .collect();
    let exit = flow.block(&method.body, Some(entry));

    if exit.is_some() && !matches!(method.ret, Ty::Void | Ty::Error) && !flow.saw_error {
        flow.diagnostics.push(Diagnostic::error(
            "CS0161",
            format!(
                "'{}': not all code paths return a value",
                method_signature(program, ty, method)
            ),
            method.location,
        ));
    }

    if flow.saw_error {
        flow.diagnostics.retain(|d| d.id != "CS0162");
    }
    diagnostics.append(&mut flow.diagnostics);
}

/// Location of the first statement in `stmt` that does any work.
fn first_reportable(stmt: &StmtIR) -> Option<Location> {
    match &stmt.kind {
        StmtKind::Block(stmts) => stmts.iter().find_map(first_reportable),
        StmtKind::Local { init: None, .. } => None,
        _ => Some(stmt.location),
    }
}

impl Flow<'_> {
    fn report_unreachable(&mut self, stmt: &StmtIR) {
        if let Some(location) = first_reportable(stmt) {
            self.diagnostics.push(Diagnostic::warning(
                "CS0162",
                "Unreachable code detected",
                location,
            ));
        }
    }

    fn block(&mut self, stmts: &[StmtIR], mut state: State) -> State {
        let mut reported = state.is_none();
        for stmt in stmts {
            if state.is_none() && !reported && first_reportable(stmt).is_some() {
                self.report_unreachable(stmt);
                reported = true;
            }
            state = self.stmt(stmt, state);
        }
        state
    }

    fn stmt(&mut self, stmt: &StmtIR, state: State) -> State {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.expr(expr, state),
            StmtKind::Local { slot, init } => {
                let mut state = match init {
                    Some(init) => self.expr(init, state),
                    None => state,
                };
                if let Some(assigned) = state.as_mut() {
                    if init.is_some() {
                        assigned.insert(*slot);
                    } else {
                        assigned.remove(slot);
                    }
                }
                state
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let state = self.expr(cond, state);
                let reachable = state.is_some();
                let constant = cond.as_bool_constant();
                let (then_in, else_in) = match constant {
                    Some(true) => (state, None),
                    Some(false) => (None, state),
                    None => (state.clone(), state),
                };
                if reachable && constant == Some(false) {
                    self.report_unreachable(then);
                }
                let then_out = self.stmt(then, then_in);
                match otherwise {
                    Some(otherwise) => {
                        if reachable && constant == Some(true) {
                            self.report_unreachable(otherwise);
                        }
                        let else_out = self.stmt(otherwise, else_in);
                        join(then_out, else_out)
                    }
                    None => join(then_out, else_in),
                }
            }
            StmtKind::While { cond, body } => {
                let state = self.expr(cond, state);
                self.run_loop(cond.as_bool_constant(), state, body, &[])
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let mut state = state;
                for stmt in init {
                    state = self.stmt(stmt, state);
                }
                let constant = match cond {
                    Some(cond) => {
                        state = self.expr(cond, state);
                        cond.as_bool_constant()
                    }
                    None => Some(true),
                };
                self.run_loop(constant, state, body, update)
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value, state);
                }
                None
            }
            StmtKind::Break => {
                if let Some(frame) = self.loops.last_mut() {
                    frame.breaks = join(frame.breaks.take(), state);
                }
                None
            }
            StmtKind::Continue => {
                if let Some(frame) = self.loops.last_mut() {
                    frame.continues = join(frame.continues.take(), state);
                }
                None
            }
            StmtKind::Block(stmts) => self.block(stmts, state),
            StmtKind::Error => {
                self.saw_error = true;
                state
            }
        }
    }

    fn run_loop(&mut self, constant: Option<bool>, state: State, body: &StmtIR, update: &[ExprIR]) -> State {
        let body_in = match constant {
            Some(false) => {
                if state.is_some() {
                    self.report_unreachable(body);
                }
                None
            }
            _ => state.clone(),
        };

        self.loops.push(LoopFrame::default());
        let body_out = self.stmt(body, body_in);
        let frame = self.loops.pop().unwrap_or_default();

        let back_edge = join(body_out, frame.continues);
        update
            .iter()
            .fold(back_edge, |state, expr| self.expr(expr, state));

        match constant {
            Some(true) => frame.breaks,
            _ => join(state, frame.breaks),
        }
    }

    fn read_local(&mut self, slot: u16, state: &State, location: Location) {
        let Some(assigned) = state else {
            return;
        };
        if assigned.contains(&slot) || self.reported_unassigned.contains(&slot) {
            return;
        }
        let Some(local) = self.method.locals.get(slot as usize) else {
            return;
        };
        if local.kind != LocalKind::Local || local.ty.is_error() {
            return;
        }
        self.reported_unassigned.insert(slot);
        self.diagnostics.push(Diagnostic::error(
            "CS0165",
            format!("Use of unassigned local variable '{}'", local.name),
            location,
        ));
    }

    fn expr(&mut self, expr: &ExprIR, state: State) -> State {
        match &expr.kind {
            ExprKind::Local(slot) => {
                self.read_local(*slot, &state, expr.location);
                state
            }
            ExprKind::Field { target, .. } => match target {
                Some(target) => self.expr(target, state),
                None => state,
            },
            ExprKind::Call { target, args, .. } => {
                let mut state = match target {
                    Some(target) => self.expr(target, state),
                    None => state,
                };
                for arg in args {
                    state = self.expr(arg, state);
                }
                state
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::Convert(operand)
            | ExprKind::ToStr(operand)
            | ExprKind::StrLen(operand) => self.expr(operand, state),
            ExprKind::Binary { left, right, .. } | ExprKind::Concat(left, right) => {
                let state = self.expr(left, state);
                self.expr(right, state)
            }
            ExprKind::Logical { left, right, .. } => {
                // Assignments in the right operand are conditional.
                let state = self.expr(left, state);
                let right_out = self.expr(right, state.clone());
                join(state, right_out)
            }
            ExprKind::Assign { target, op, value } => {
                let state = self.place(target, state, op.is_some(), expr.location);
                let mut state = self.expr(value, state);
                if let (Place::Local(slot), Some(assigned)) = (target, state.as_mut()) {
                    assigned.insert(*slot);
                }
                state
            }
            ExprKind::IncDec { target, .. } => self.place(target, state, true, expr.location),
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let state = self.expr(cond, state);
                let then_out = self.expr(then, state.clone());
                let else_out = self.expr(otherwise, state);
                join(then_out, else_out)
            }
            ExprKind::Int(_)
            | ExprKind::Long(_)
            | ExprKind::Double(_)
            | ExprKind::Bool(_)
            | ExprKind::Str(_)
            | ExprKind::Null
            | ExprKind::This
            | ExprKind::New(_)
            | ExprKind::Error => state,
        }
    }

    /// Evaluates an assignment target; `reads` for compound forms.
    fn place(&mut self, place: &Place, state: State, reads: bool, location: Location) -> State {
        match place {
            Place::Local(slot) => {
                if reads {
                    self.read_local(*slot, &state, location);
                }
                state
            }
            Place::Field { target, .. } => match target {
                Some(target) => self.expr(target, state),
                None => state,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{CompilerConfig, OutputKind};
    use crate::diagnostic::{Diagnostic, Severity};
    use crate::frontend::{create_backend, CompilationOptions, ParseOptions};
    use crate::reference::ReferenceCatalog;

    fn diagnostics(source: &str) -> Vec<Diagnostic> {
        let backend = create_backend("csharp").unwrap();
        let tree = backend.parse(source, &ParseOptions::default()).unwrap();
        let config = CompilerConfig::default().with_output_kind(OutputKind::Library);
        backend
            .compile(&tree, &ReferenceCatalog::core_only(), &CompilationOptions::from_config(&config))
            .unwrap()
            .diagnostics
    }

    fn ids(source: &str) -> Vec<String> {
        diagnostics(source).into_iter().map(|d| d.id).collect()
    }

    #[test]
    fn test_not_all_paths_return() {
        assert_eq!(ids("class C { static int M(bool b) { if (b) return 1; } }"), vec!["CS0161"]);
        assert!(ids("class C { static int M(bool b) { if (b) return 1; else return 2; } }").is_empty());
        assert!(ids("class C { static int M() { while (true) { } } }").is_empty());
        assert!(ids("class C { static int M() { for (;;) { } } }").is_empty());
    }

    #[test]
    fn test_break_makes_loop_exit_reachable() {
        assert_eq!(
            ids("class C { static int M() { while (true) { break; } } }"),
            vec!["CS0161"]
        );
    }

    #[test]
    fn test_unreachable_code_is_a_warning() {
        let found = diagnostics("class C { static int M() { return 1; System.Console.WriteLine(2); } }");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "CS0162");
        assert_eq!(found[0].severity, Severity::Warning);
    }

    #[test]
    fn test_unreachable_reported_once_per_region() {
        let found = ids(
            "class C { static void M() { return; System.Console.WriteLine(1); System.Console.WriteLine(2); } }",
        );
        assert_eq!(found, vec!["CS0162"]);
    }

    #[test]
    fn test_constant_false_branch_is_unreachable() {
        assert_eq!(
            ids("class C { static void M() { if (false) { System.Console.WriteLine(1); } } }"),
            vec!["CS0162"]
        );
    }

    #[test]
    fn test_use_of_unassigned_local() {
        assert_eq!(
            ids("class C { static int M(bool b) { int x; if (b) x = 1; return x; } }"),
            vec!["CS0165"]
        );
        assert!(ids("class C { static int M(bool b) { int x; if (b) x = 1; else x = 2; return x; } }").is_empty());
    }

    #[test]
    fn test_parameters_are_assigned() {
        assert!(ids("class C { int f; int M(int a) { return a + f; } }").is_empty());
    }
}
