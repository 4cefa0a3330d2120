//! Bytecode emission for method bodies.

use super::{field_handle, kind, method_handle, type_handle, unbound};
use crate::diagnostic::CompilerError;
use crate::image::{ArithOp, CmpOp, Code, Instr, Kind};
use crate::ir::{BinaryOp, ExprIR, ExprKind, FieldRef, MethodIR, Place, StmtIR, StmtKind, Ty, UnaryOp};

/// Jump sites awaiting the address of a loop's exit and continue point.
#[derive(Default)]
struct LoopLabels {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

struct Emitter {
    instrs: Vec<Instr>,
    slots: u16,
    loops: Vec<LoopLabels>,
}

/// Compiles a method body.
pub fn emit_method(method: &MethodIR) -> Result<Code, CompilerError> {
    let mut emitter = Emitter {
        instrs: Vec::new(),
        slots: method.locals.len() as u16,
        loops: Vec::new(),
    };
    for stmt in &method.body {
        emitter.stmt(stmt)?;
    }
    emitter.instrs.push(Instr::ReturnVoid);
    Ok(Code {
        locals: emitter.slots,
        instrs: emitter.instrs,
    })
}

fn arith_op(op: BinaryOp) -> Option<ArithOp> {
    let op = match op {
        BinaryOp::Add => ArithOp::Add,
        BinaryOp::Sub => ArithOp::Sub,
        BinaryOp::Mul => ArithOp::Mul,
        BinaryOp::Div => ArithOp::Div,
        BinaryOp::Rem => ArithOp::Rem,
        BinaryOp::And => ArithOp::And,
        BinaryOp::Or => ArithOp::Or,
        BinaryOp::Xor => ArithOp::Xor,
        BinaryOp::Shl => ArithOp::Shl,
        BinaryOp::Shr => ArithOp::Shr,
        _ => return None,
    };
    Some(op)
}

fn cmp_op(op: BinaryOp) -> Option<CmpOp> {
    let op = match op {
        BinaryOp::Eq => CmpOp::Eq,
        BinaryOp::Ne => CmpOp::Ne,
        BinaryOp::Lt => CmpOp::Lt,
        BinaryOp::Le => CmpOp::Le,
        BinaryOp::Gt => CmpOp::Gt,
        BinaryOp::Ge => CmpOp::Ge,
        _ => return None,
    };
    Some(op)
}

fn is_numeric_kind(kind: Kind) -> bool {
    matches!(kind, Kind::Int | Kind::Long | Kind::Double)
}

impl Emitter {
    fn here(&self) -> usize {
        self.instrs.len()
    }

    fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    /// Emits a jump with a placeholder target, returning its index.
    fn jump(&mut self, make: fn(u32) -> Instr) -> usize {
        let at = self.here();
        self.push(make(0));
        at
    }

    fn patch(&mut self, at: usize, target: usize) {
        let target = target as u32;
        if let Some(instr) = self.instrs.get_mut(at) {
            match instr {
                Instr::Jump(t) | Instr::JumpIfFalse(t) | Instr::JumpIfTrue(t) => *t = target,
                _ => {}
            }
        }
    }

    fn temp(&mut self) -> u16 {
        let slot = self.slots;
        self.slots += 1;
        slot
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn stmt(&mut self, stmt: &StmtIR) -> Result<(), CompilerError> {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.expr(expr, false)?,
            StmtKind::Local { slot, init } => {
                if let Some(init) = init {
                    self.expr(init, true)?;
                    self.push(Instr::Store(*slot));
                }
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond, true)?;
                let to_else = self.jump(Instr::JumpIfFalse);
                self.stmt(then)?;
                match otherwise {
                    Some(otherwise) => {
                        let to_end = self.jump(Instr::Jump);
                        self.patch(to_else, self.here());
                        self.stmt(otherwise)?;
                        self.patch(to_end, self.here());
                    }
                    None => self.patch(to_else, self.here()),
                }
            }
            StmtKind::While { cond, body } => {
                let start = self.here();
                self.expr(cond, true)?;
                let exit = self.jump(Instr::JumpIfFalse);
                self.loops.push(LoopLabels::default());
                self.stmt(body)?;
                self.push(Instr::Jump(start as u32));
                self.close_loop(start);
                self.patch(exit, self.here());
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                for stmt in init {
                    self.stmt(stmt)?;
                }
                let start = self.here();
                let exit = match cond {
                    Some(cond) => {
                        self.expr(cond, true)?;
                        Some(self.jump(Instr::JumpIfFalse))
                    }
                    None => None,
                };
                self.loops.push(LoopLabels::default());
                self.stmt(body)?;
                let continue_at = self.here();
                for expr in update {
                    self.expr(expr, false)?;
                }
                self.push(Instr::Jump(start as u32));
                self.close_loop(continue_at);
                if let Some(exit) = exit {
                    self.patch(exit, self.here());
                }
            }
            StmtKind::Return(value) => match value {
                Some(value) => {
                    self.expr(value, true)?;
                    self.push(Instr::Return);
                }
                None => self.push(Instr::ReturnVoid),
            },
            StmtKind::Break | StmtKind::Continue => {
                let at = self.jump(Instr::Jump);
                let labels = self
                    .loops
                    .last_mut()
                    .ok_or_else(|| unbound("loop exit"))?;
                if matches!(stmt.kind, StmtKind::Break) {
                    labels.breaks.push(at);
                } else {
                    labels.continues.push(at);
                }
            }
            StmtKind::Block(stmts) => {
                for stmt in stmts {
                    self.stmt(stmt)?;
                }
            }
            StmtKind::Error => return Err(unbound("statement")),
        }
        Ok(())
    }

    /// Pops the innermost loop, pointing `continue` at `continue_at` and
    /// `break` at the current address.
    fn close_loop(&mut self, continue_at: usize) {
        let labels = self.loops.pop().unwrap_or_default();
        let exit = self.here();
        for at in labels.continues {
            self.patch(at, continue_at);
        }
        for at in labels.breaks {
            self.patch(at, exit);
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Emits `expr`, leaving its value on the stack only if `want` is set.
    fn expr(&mut self, expr: &ExprIR, want: bool) -> Result<(), CompilerError> {
        match &expr.kind {
            ExprKind::Call { target, method, args } => {
                if let Some(target) = target {
                    self.expr(target, true)?;
                }
                for arg in args {
                    self.expr(arg, true)?;
                }
                self.push(Instr::Call(method_handle(*method)));
                if !want && expr.ty != Ty::Void {
                    self.push(Instr::Pop);
                }
                return Ok(());
            }
            ExprKind::Assign { target, op, value } => return self.assign(target, *op, value, want),
            ExprKind::IncDec {
                target,
                increment,
                prefix,
            } => return self.inc_dec(target, expr.ty, *increment, *prefix, want),
            _ => {}
        }

        self.value(expr)?;
        if !want {
            self.push(Instr::Pop);
        }
        Ok(())
    }

    /// Emits an expression that always produces a value.
    fn value(&mut self, expr: &ExprIR) -> Result<(), CompilerError> {
        match &expr.kind {
            ExprKind::Int(v) => self.push(Instr::PushInt(*v)),
            ExprKind::Long(v) => self.push(Instr::PushLong(*v)),
            ExprKind::Double(v) => self.push(Instr::PushDouble(*v)),
            ExprKind::Bool(v) => self.push(Instr::PushBool(*v)),
            ExprKind::Str(v) => self.push(Instr::PushStr(v.clone())),
            ExprKind::Null => self.push(Instr::PushNull),
            ExprKind::Local(slot) => self.push(Instr::Load(*slot)),
            ExprKind::This => self.push(Instr::Load(0)),
            ExprKind::Field { target, field } => match target {
                Some(target) => {
                    self.expr(target, true)?;
                    self.push(Instr::LoadField(field_handle(*field)));
                }
                None => self.push(Instr::LoadStatic(field_handle(*field))),
            },
            ExprKind::New(class) => self.push(Instr::NewObject(type_handle(*class))),
            ExprKind::Unary { op, operand } => {
                self.expr(operand, true)?;
                let k = kind(operand.ty);
                self.push(match op {
                    UnaryOp::Neg => Instr::Neg(k),
                    UnaryOp::Not => Instr::Not,
                    UnaryOp::BitNot => Instr::BitNot(k),
                });
            }
            ExprKind::Binary {
                op,
                operand_ty,
                left,
                right,
            } => {
                self.expr(left, true)?;
                self.expr(right, true)?;
                let k = kind(*operand_ty);
                let instr = match (arith_op(*op), cmp_op(*op)) {
                    (Some(arith), _) => Instr::Arith(arith, k),
                    (_, Some(cmp)) => Instr::Compare(cmp, k),
                    _ => return Err(unbound("operator")),
                };
                self.push(instr);
            }
            ExprKind::Logical { is_and, left, right } => {
                self.expr(left, true)?;
                self.push(Instr::Dup);
                let to_end = if *is_and {
                    self.jump(Instr::JumpIfFalse)
                } else {
                    self.jump(Instr::JumpIfTrue)
                };
                self.push(Instr::Pop);
                self.expr(right, true)?;
                self.patch(to_end, self.here());
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond, true)?;
                let to_else = self.jump(Instr::JumpIfFalse);
                self.expr(then, true)?;
                let to_end = self.jump(Instr::Jump);
                self.patch(to_else, self.here());
                self.expr(otherwise, true)?;
                self.patch(to_end, self.here());
            }
            ExprKind::Convert(inner) => {
                self.expr(inner, true)?;
                let (from, to) = (kind(inner.ty), kind(expr.ty));
                if from != to && is_numeric_kind(from) && is_numeric_kind(to) {
                    self.push(Instr::Convert(from, to));
                }
            }
            ExprKind::Concat(left, right) => {
                self.expr(left, true)?;
                self.expr(right, true)?;
                self.push(Instr::Concat);
            }
            ExprKind::ToStr(inner) => {
                self.expr(inner, true)?;
                self.push(Instr::ToStr);
            }
            ExprKind::StrLen(inner) => {
                self.expr(inner, true)?;
                self.push(Instr::StrLen);
            }
            ExprKind::Call { .. } | ExprKind::Assign { .. } | ExprKind::IncDec { .. } => {
                self.expr(expr, true)?
            }
            ExprKind::Error => return Err(unbound("expression")),
        }
        Ok(())
    }

    /// Combines the two values on top of the stack for a compound operator.
    fn compound(&mut self, op: BinaryOp, operand_ty: Ty) -> Result<(), CompilerError> {
        if operand_ty == Ty::String {
            self.push(Instr::Concat);
            return Ok(());
        }
        let arith = arith_op(op).ok_or_else(|| unbound("compound operator"))?;
        self.push(Instr::Arith(arith, kind(operand_ty)));
        Ok(())
    }

    fn assign(
        &mut self,
        target: &Place,
        op: Option<(BinaryOp, Ty)>,
        value: &ExprIR,
        want: bool,
    ) -> Result<(), CompilerError> {
        match target {
            Place::Local(slot) => {
                if op.is_some() {
                    self.push(Instr::Load(*slot));
                }
                self.expr(value, true)?;
                if let Some((op, ty)) = op {
                    self.compound(op, ty)?;
                }
                if want {
                    self.push(Instr::Dup);
                }
                self.push(Instr::Store(*slot));
            }
            Place::Field { target: None, field } => {
                let handle = field_handle(*field);
                if op.is_some() {
                    self.push(Instr::LoadStatic(handle));
                }
                self.expr(value, true)?;
                if let Some((op, ty)) = op {
                    self.compound(op, ty)?;
                }
                if want {
                    self.push(Instr::Dup);
                }
                self.push(Instr::StoreStatic(handle));
            }
            Place::Field {
                target: Some(object),
                field,
            } => {
                self.expr(object, true)?;
                if op.is_some() {
                    self.push(Instr::Dup);
                    self.push(Instr::LoadField(field_handle(*field)));
                }
                self.expr(value, true)?;
                if let Some((op, ty)) = op {
                    self.compound(op, ty)?;
                }
                self.store_field_keeping(*field, want);
            }
        }
        Ok(())
    }

    /// `[object, value]` -> `[]`, or `[value]` when `want` is set.
    fn store_field_keeping(&mut self, field: FieldRef, want: bool) {
        let handle = field_handle(field);
        if want {
            let temp = self.temp();
            self.push(Instr::Dup);
            self.push(Instr::Store(temp));
            self.push(Instr::StoreField(handle));
            self.push(Instr::Load(temp));
        } else {
            self.push(Instr::StoreField(handle));
        }
    }

    fn push_one(&mut self, ty: Ty) -> Result<(), CompilerError> {
        let instr = match ty {
            Ty::Int => Instr::PushInt(1),
            Ty::Long => Instr::PushLong(1),
            Ty::Double => Instr::PushDouble(1.0),
            _ => return Err(unbound("increment operand")),
        };
        self.push(instr);
        Ok(())
    }

    fn inc_dec(&mut self, target: &Place, ty: Ty, increment: bool, prefix: bool, want: bool) -> Result<(), CompilerError> {
        let op = if increment { ArithOp::Add } else { ArithOp::Sub };
        let k = kind(ty);
        match target {
            Place::Local(slot) => {
                self.push(Instr::Load(*slot));
                if want && !prefix {
                    self.push(Instr::Dup);
                }
                self.push_one(ty)?;
                self.push(Instr::Arith(op, k));
                if want && prefix {
                    self.push(Instr::Dup);
                }
                self.push(Instr::Store(*slot));
            }
            Place::Field { target: None, field } => {
                let handle = field_handle(*field);
                self.push(Instr::LoadStatic(handle));
                if want && !prefix {
                    self.push(Instr::Dup);
                }
                self.push_one(ty)?;
                self.push(Instr::Arith(op, k));
                if want && prefix {
                    self.push(Instr::Dup);
                }
                self.push(Instr::StoreStatic(handle));
            }
            Place::Field {
                target: Some(object),
                field,
            } => {
                let handle = field_handle(*field);
                self.expr(object, true)?;
                self.push(Instr::Dup);
                self.push(Instr::LoadField(handle));
                let saved = if want && !prefix {
                    let temp = self.temp();
                    self.push(Instr::Dup);
                    self.push(Instr::Store(temp));
                    Some(temp)
                } else {
                    None
                };
                self.push_one(ty)?;
                self.push(Instr::Arith(op, k));
                match saved {
                    Some(temp) => {
                        self.push(Instr::StoreField(handle));
                        self.push(Instr::Load(temp));
                    }
                    None => self.store_field_keeping(*field, want),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Location;
    use crate::ir::{LocalIR, LocalKind};

    fn int(value: i32) -> ExprIR {
        ExprIR::new(ExprKind::Int(value), Ty::Int, Location::none())
    }

    fn method(locals: usize, body: Vec<StmtIR>) -> MethodIR {
        MethodIR {
            name: "M".to_string(),
            ret: Ty::Void,
            is_static: true,
            is_public: true,
            param_count: 0,
            locals: (0..locals)
                .map(|i| LocalIR {
                    name: format!("l{}", i),
                    ty: Ty::Int,
                    kind: LocalKind::Local,
                    location: Location::none(),
                })
                .collect(),
            body,
            synthesized: false,
            location: Location::none(),
        }
    }

    fn stmt(kind: StmtKind) -> StmtIR {
        StmtIR {
            kind,
            location: Location::none(),
        }
    }

    #[test]
    fn test_postfix_increment_value() {
        let inc = ExprIR::new(
            ExprKind::IncDec {
                target: Place::Local(0),
                increment: true,
                prefix: false,
            },
            Ty::Int,
            Location::none(),
        );
        let code = emit_method(&method(2, vec![stmt(StmtKind::Local { slot: 1, init: Some(inc) })])).unwrap();
        assert_eq!(
            code.instrs,
            vec![
                Instr::Load(0),
                Instr::Dup,
                Instr::PushInt(1),
                Instr::Arith(ArithOp::Add, Kind::Int),
                Instr::Store(0),
                Instr::Store(1),
                Instr::ReturnVoid,
            ]
        );
    }

    #[test]
    fn test_while_break_targets_loop_exit() {
        let body = stmt(StmtKind::Block(vec![stmt(StmtKind::Break)]));
        let code = emit_method(&method(
            0,
            vec![stmt(StmtKind::While {
                cond: ExprIR::new(ExprKind::Bool(true), Ty::Bool, Location::none()),
                body: Box::new(body),
            })],
        ))
        .unwrap();
        assert_eq!(
            code.instrs,
            vec![
                Instr::PushBool(true),
                Instr::JumpIfFalse(4),
                Instr::Jump(4),
                Instr::Jump(0),
                Instr::ReturnVoid,
            ]
        );
    }

    #[test]
    fn test_discarded_value_is_popped() {
        let code = emit_method(&method(0, vec![stmt(StmtKind::Expr(int(7)))])).unwrap();
        assert_eq!(code.instrs, vec![Instr::PushInt(7), Instr::Pop, Instr::ReturnVoid]);
    }

    #[test]
    fn test_error_nodes_are_rejected() {
        let result = emit_method(&method(0, vec![stmt(StmtKind::Error)]));
        assert!(matches!(result, Err(CompilerError::EmitFailed { .. })));
    }
}
