//! Stack-machine interpreter.
//!
//! Calls do not recurse on the host stack: every interpreted call pushes a
//! [`Frame`] and the dispatch loop always runs the topmost one. Static
//! initializers run lazily on first static field access, before the access
//! is retried.

use std::cmp::Ordering;
use std::sync::Arc;

use super::intrinsics;
use super::value::{Object, Value};
use super::{Invocation, InvokeError, Limits, Module};
use crate::image::{ArithOp, CmpOp, Code, Instr, Kind, MethodBody, Scope, TypeHandle, TypeSig};

struct Frame {
    module: Arc<Module>,
    ty: u32,
    method: u32,
    pc: usize,
    locals: Vec<Value>,
    /// Operand stack height when the frame was entered.
    base: usize,
}

struct Machine {
    frames: Vec<Frame>,
    stack: Vec<Value>,
    steps: u64,
    limits: Limits,
    output: String,
}

/// Runs one method to completion.
pub(super) fn run(
    module: &Arc<Module>,
    ty: u32,
    method: u32,
    args: Vec<Value>,
    limits: Limits,
) -> Result<Invocation, InvokeError> {
    let mut machine = Machine {
        frames: Vec::new(),
        stack: Vec::new(),
        steps: 0,
        limits,
        output: String::new(),
    };

    let def = module
        .method_def(ty, method)
        .ok_or_else(|| invalid("entry method does not exist"))?;

    let value = match &def.body {
        MethodBody::Intrinsic(which) => intrinsics::call(*which, &args, &mut machine.output)?,
        MethodBody::Code(_) => {
            if def.is_static {
                machine.enter(Arc::clone(module), ty, method, args)?;
            } else {
                let object = machine.allocate(module, ty)?;
                let mut locals = Vec::with_capacity(args.len() + 1);
                locals.push(Value::Object(Arc::clone(&object)));
                locals.extend(args);
                machine.enter(Arc::clone(module), ty, method, locals)?;
                machine.construct(module, ty, object)?;
            }
            machine.execute()?
        }
    };

    Ok(Invocation {
        value,
        output: machine.output,
    })
}

fn invalid(message: impl Into<String>) -> InvokeError {
    InvokeError::InvalidProgram {
        message: message.into(),
    }
}

fn code_of(module: &Module, ty: u32, method: u32) -> Option<&Code> {
    match &module.method_def(ty, method)?.body {
        MethodBody::Code(code) => Some(code),
        MethodBody::Intrinsic(_) => None,
    }
}

fn resolve(module: &Arc<Module>, handle: TypeHandle) -> Result<Arc<Module>, InvokeError> {
    match handle.scope {
        Scope::Local => Ok(Arc::clone(module)),
        Scope::External(unit) => module
            .links
            .get(unit as usize)
            .cloned()
            .ok_or_else(|| invalid(format!("reference {} is not linked", unit))),
    }
}

impl Machine {
    // =========================================================================
    // Frames
    // =========================================================================

    fn enter(&mut self, module: Arc<Module>, ty: u32, method: u32, mut locals: Vec<Value>) -> Result<(), InvokeError> {
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(InvokeError::StackOverflow {
                limit: self.limits.max_call_depth,
            });
        }
        let slots = code_of(&module, ty, method)
            .ok_or_else(|| invalid("called method has no bytecode"))?
            .locals as usize;
        if locals.len() < slots {
            locals.resize(slots, Value::Null);
        }
        self.frames.push(Frame {
            module,
            ty,
            method,
            pc: 0,
            locals,
            base: self.stack.len(),
        });
        Ok(())
    }

    fn frame(&mut self) -> Result<&mut Frame, InvokeError> {
        self.frames.last_mut().ok_or_else(|| invalid("no active frame"))
    }

    /// Creates an instance with zeroed fields; initializers run separately.
    fn allocate(&self, module: &Arc<Module>, ty: u32) -> Result<Arc<Object>, InvokeError> {
        let def = module
            .type_def(ty)
            .ok_or_else(|| invalid(format!("type {} does not exist", ty)))?;
        let fields = def
            .fields
            .iter()
            .map(|f| if f.is_static { Value::Void } else { Value::default_for(f.ty) })
            .collect();
        Ok(Arc::new(Object::new(def.full_name(), fields)))
    }

    /// Schedules the instance field initializers of a new object.
    fn construct(&mut self, module: &Arc<Module>, ty: u32, object: Arc<Object>) -> Result<(), InvokeError> {
        if let Some(init) = module.type_def(ty).and_then(|t| t.instance_init) {
            self.enter(Arc::clone(module), ty, init, vec![Value::Object(object)])?;
        }
        Ok(())
    }

    /// Module owning the statics of `ty`, or `None` if its static
    /// initializer was scheduled first. In that case the current
    /// instruction is rewound so it runs again once the initializer returns.
    fn statics_of(&mut self, ty: TypeHandle) -> Result<Option<Arc<Module>>, InvokeError> {
        let module = resolve(&self.frame()?.module, ty)?;
        if self.ensure_initialized(&module, ty.index)? {
            Ok(Some(module))
        } else {
            Ok(None)
        }
    }

    fn ensure_initialized(&mut self, module: &Arc<Module>, ty: u32) -> Result<bool, InvokeError> {
        {
            let mut statics = module.statics();
            let entry = statics
                .get_mut(ty as usize)
                .ok_or_else(|| invalid(format!("type {} does not exist", ty)))?;
            if entry.initialized {
                return Ok(true);
            }
            entry.initialized = true;
        }
        match module.type_def(ty).and_then(|t| t.static_init) {
            Some(init) => {
                log::trace!("running static initializer of type {}", ty);
                self.frame()?.pc -= 1;
                self.enter(Arc::clone(module), ty, init, Vec::new())?;
                Ok(false)
            }
            None => Ok(true),
        }
    }

    // =========================================================================
    // Stack
    // =========================================================================

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, InvokeError> {
        let base = self.frames.last().map_or(0, |f| f.base);
        if self.stack.len() <= base {
            return Err(invalid("operand stack underflow"));
        }
        self.stack.pop().ok_or_else(|| invalid("operand stack underflow"))
    }

    fn pop_bool(&mut self) -> Result<bool, InvokeError> {
        self.pop()?.as_bool().ok_or_else(|| invalid("expected a bool"))
    }

    fn pop_object(&mut self) -> Result<Arc<Object>, InvokeError> {
        match self.pop()? {
            Value::Object(object) => Ok(object),
            Value::Null => Err(InvokeError::NullReference),
            _ => Err(invalid("expected an object")),
        }
    }

    /// Pops a frame, discarding whatever it left on the operand stack.
    fn leave(&mut self) -> Result<(), InvokeError> {
        let frame = self.frames.pop().ok_or_else(|| invalid("no active frame"))?;
        self.stack.truncate(frame.base);
        Ok(())
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn fetch(&mut self) -> Result<Instr, InvokeError> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(InvokeError::StepBudgetExhausted {
                limit: self.limits.max_steps,
            });
        }
        let frame = self.frame()?;
        let instr = code_of(&frame.module, frame.ty, frame.method)
            .and_then(|code| code.instrs.get(frame.pc))
            .cloned()
            .ok_or_else(|| invalid("execution ran past the end of a method"))?;
        frame.pc += 1;
        Ok(instr)
    }

    fn execute(&mut self) -> Result<Value, InvokeError> {
        loop {
            match self.fetch()? {
                Instr::PushInt(v) => self.push(Value::Int(v)),
                Instr::PushLong(v) => self.push(Value::Long(v)),
                Instr::PushDouble(v) => self.push(Value::Double(v)),
                Instr::PushBool(v) => self.push(Value::Bool(v)),
                Instr::PushStr(v) => self.push(Value::string(v)),
                Instr::PushNull => self.push(Value::Null),
                Instr::Load(slot) => {
                    let value = self
                        .frame()?
                        .locals
                        .get(slot as usize)
                        .cloned()
                        .ok_or_else(|| invalid(format!("local {} does not exist", slot)))?;
                    self.push(value);
                }
                Instr::Store(slot) => {
                    let value = self.pop()?;
                    let local = self
                        .frame()?
                        .locals
                        .get_mut(slot as usize)
                        .ok_or_else(|| invalid(format!("local {} does not exist", slot)))?;
                    *local = value;
                }
                Instr::LoadField(field) => {
                    let object = self.pop_object()?;
                    let value = object
                        .field(field.index as usize)
                        .ok_or_else(|| invalid(format!("field {} does not exist", field.index)))?;
                    self.push(value);
                }
                Instr::StoreField(field) => {
                    let value = self.pop()?;
                    let object = self.pop_object()?;
                    let mut fields = object.fields();
                    let slot = fields
                        .get_mut(field.index as usize)
                        .ok_or_else(|| invalid(format!("field {} does not exist", field.index)))?;
                    *slot = value;
                }
                Instr::LoadStatic(field) => {
                    let Some(module) = self.statics_of(field.ty)? else {
                        continue;
                    };
                    let value = module
                        .statics()
                        .get(field.ty.index as usize)
                        .and_then(|s| s.values.get(field.index as usize))
                        .cloned()
                        .ok_or_else(|| invalid("static field does not exist"))?;
                    self.push(value);
                }
                Instr::StoreStatic(field) => {
                    let Some(module) = self.statics_of(field.ty)? else {
                        continue;
                    };
                    let value = self.pop()?;
                    let mut statics = module.statics();
                    let slot = statics
                        .get_mut(field.ty.index as usize)
                        .and_then(|s| s.values.get_mut(field.index as usize))
                        .ok_or_else(|| invalid("static field does not exist"))?;
                    *slot = value;
                }
                Instr::Arith(op, _) => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.push(arith(op, left, right)?);
                }
                Instr::Neg(_) => {
                    let value = match self.pop()? {
                        Value::Int(v) => Value::Int(v.wrapping_neg()),
                        Value::Long(v) => Value::Long(v.wrapping_neg()),
                        Value::Double(v) => Value::Double(-v),
                        _ => return Err(invalid("negation of a non-number")),
                    };
                    self.push(value);
                }
                Instr::BitNot(_) => {
                    let value = match self.pop()? {
                        Value::Int(v) => Value::Int(!v),
                        Value::Long(v) => Value::Long(!v),
                        _ => return Err(invalid("complement of a non-integer")),
                    };
                    self.push(value);
                }
                Instr::Not => {
                    let value = self.pop_bool()?;
                    self.push(Value::Bool(!value));
                }
                Instr::Compare(op, kind) => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.push(Value::Bool(compare(op, kind, &left, &right)));
                }
                Instr::Convert(_, to) => {
                    let value = self.pop()?;
                    self.push(convert(value, to)?);
                }
                Instr::Concat => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let mut text = left.to_string();
                    text.push_str(&right.to_string());
                    self.push(Value::string(text));
                }
                Instr::ToStr => {
                    let value = self.pop()?;
                    self.push(Value::string(value.to_string()));
                }
                Instr::StrLen => {
                    let length = match self.pop()? {
                        Value::Str(s) => s.encode_utf16().count() as i32,
                        Value::Null => return Err(InvokeError::NullReference),
                        _ => return Err(invalid("length of a non-string")),
                    };
                    self.push(Value::Int(length));
                }
                Instr::Jump(target) => self.frame()?.pc = target as usize,
                Instr::JumpIfFalse(target) => {
                    if !self.pop_bool()? {
                        self.frame()?.pc = target as usize;
                    }
                }
                Instr::JumpIfTrue(target) => {
                    if self.pop_bool()? {
                        self.frame()?.pc = target as usize;
                    }
                }
                Instr::Call(handle) => self.call(handle.ty, handle.index)?,
                Instr::NewObject(handle) => {
                    let module = resolve(&self.frame()?.module, handle)?;
                    let object = self.allocate(&module, handle.index)?;
                    self.push(Value::Object(Arc::clone(&object)));
                    self.construct(&module, handle.index, object)?;
                }
                Instr::Dup => {
                    let value = self.pop()?;
                    self.push(value.clone());
                    self.push(value);
                }
                Instr::Pop => {
                    self.pop()?;
                }
                Instr::Return => {
                    let value = self.pop()?;
                    self.leave()?;
                    if self.frames.is_empty() {
                        return Ok(value);
                    }
                    self.push(value);
                }
                Instr::ReturnVoid => {
                    self.leave()?;
                    if self.frames.is_empty() {
                        return Ok(Value::Void);
                    }
                }
            }
        }
    }

    fn call(&mut self, ty: TypeHandle, index: u32) -> Result<(), InvokeError> {
        let module = resolve(&self.frame()?.module, ty)?;
        let def = module
            .method_def(ty.index, index)
            .ok_or_else(|| invalid(format!("method {} does not exist", index)))?;

        let count = def.params.len() + usize::from(!def.is_static);
        let base = self.frames.last().map_or(0, |f| f.base);
        if self.stack.len() < base + count {
            return Err(invalid("operand stack underflow"));
        }
        let args = self.stack.split_off(self.stack.len() - count);
        if !def.is_static && args.first().is_some_and(Value::is_null) {
            return Err(InvokeError::NullReference);
        }

        match &def.body {
            MethodBody::Intrinsic(which) => {
                let result = intrinsics::call(*which, &args, &mut self.output)?;
                if def.ret != TypeSig::Void {
                    self.push(result);
                }
                Ok(())
            }
            MethodBody::Code(_) => self.enter(Arc::clone(&module), ty.index, index, args),
        }
    }
}

// =============================================================================
// Operators
// =============================================================================

macro_rules! integer_arith {
    ($op:expr, $x:expr, $y:expr) => {
        match $op {
            ArithOp::Add => Ok($x.wrapping_add($y)),
            ArithOp::Sub => Ok($x.wrapping_sub($y)),
            ArithOp::Mul => Ok($x.wrapping_mul($y)),
            ArithOp::Div if $y == 0 => Err(InvokeError::DivideByZero),
            ArithOp::Div => $x.checked_div($y).ok_or(InvokeError::Overflow),
            ArithOp::Rem if $y == 0 => Err(InvokeError::DivideByZero),
            ArithOp::Rem => $x.checked_rem($y).ok_or(InvokeError::Overflow),
            ArithOp::And => Ok($x & $y),
            ArithOp::Or => Ok($x | $y),
            ArithOp::Xor => Ok($x ^ $y),
            ArithOp::Shl => Ok($x.wrapping_shl($y as u32)),
            ArithOp::Shr => Ok($x.wrapping_shr($y as u32)),
        }
    };
}

fn arith(op: ArithOp, left: Value, right: Value) -> Result<Value, InvokeError> {
    match (left, right) {
        (Value::Int(x), Value::Int(y)) => integer_arith!(op, x, y).map(Value::Int),
        (Value::Long(x), Value::Int(n)) if matches!(op, ArithOp::Shl | ArithOp::Shr) => {
            integer_arith!(op, x, i64::from(n)).map(Value::Long)
        }
        (Value::Long(x), Value::Long(y)) => integer_arith!(op, x, y).map(Value::Long),
        (Value::Double(x), Value::Double(y)) => {
            let value = match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                ArithOp::Rem => x % y,
                _ => return Err(invalid(format!("{:?} on double operands", op))),
            };
            Ok(Value::Double(value))
        }
        (Value::Bool(x), Value::Bool(y)) => match op {
            ArithOp::And => Ok(Value::Bool(x & y)),
            ArithOp::Or => Ok(Value::Bool(x | y)),
            ArithOp::Xor => Ok(Value::Bool(x ^ y)),
            _ => Err(invalid(format!("{:?} on bool operands", op))),
        },
        (left, right) => Err(invalid(format!(
            "{:?} on {:?} and {:?} operands",
            op,
            left.kind(),
            right.kind()
        ))),
    }
}

fn compare(op: CmpOp, kind: Kind, left: &Value, right: &Value) -> bool {
    let ordering = match (kind, left, right) {
        (_, Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (_, Value::Long(x), Value::Long(y)) => Some(x.cmp(y)),
        (_, Value::Double(x), Value::Double(y)) => x.partial_cmp(y),
        _ => None,
    };
    match op {
        CmpOp::Eq => left == right,
        CmpOp::Ne => left != right,
        CmpOp::Lt => ordering == Some(Ordering::Less),
        CmpOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => ordering == Some(Ordering::Greater),
        CmpOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    }
}

/// Numeric conversion; narrowing truncates like an unchecked cast.
fn convert(value: Value, to: Kind) -> Result<Value, InvokeError> {
    let converted = match (value, to) {
        (Value::Int(v), Kind::Int) => Value::Int(v),
        (Value::Int(v), Kind::Long) => Value::Long(i64::from(v)),
        (Value::Int(v), Kind::Double) => Value::Double(f64::from(v)),
        (Value::Long(v), Kind::Int) => Value::Int(v as i32),
        (Value::Long(v), Kind::Long) => Value::Long(v),
        (Value::Long(v), Kind::Double) => Value::Double(v as f64),
        (Value::Double(v), Kind::Int) => Value::Int(v as i32),
        (Value::Double(v), Kind::Long) => Value::Long(v as i64),
        (Value::Double(v), Kind::Double) => Value::Double(v),
        (value, to) => return Err(invalid(format!("cannot convert {:?} to {:?}", value.kind(), to))),
    };
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_wraps() {
        assert_eq!(arith(ArithOp::Add, Value::Int(i32::MAX), Value::Int(1)).unwrap(), Value::Int(i32::MIN));
        assert_eq!(arith(ArithOp::Mul, Value::Long(i64::MAX), Value::Long(2)).unwrap(), Value::Long(-2));
    }

    #[test]
    fn test_division_faults() {
        assert_eq!(arith(ArithOp::Div, Value::Int(1), Value::Int(0)), Err(InvokeError::DivideByZero));
        assert_eq!(arith(ArithOp::Rem, Value::Long(1), Value::Long(0)), Err(InvokeError::DivideByZero));
        assert_eq!(arith(ArithOp::Div, Value::Int(i32::MIN), Value::Int(-1)), Err(InvokeError::Overflow));
        let Value::Double(inf) = arith(ArithOp::Div, Value::Double(1.0), Value::Double(0.0)).unwrap() else {
            panic!("expected a double");
        };
        assert!(inf.is_infinite());
    }

    #[test]
    fn test_shifts_mask_their_count() {
        assert_eq!(arith(ArithOp::Shl, Value::Int(1), Value::Int(33)).unwrap(), Value::Int(2));
        assert_eq!(arith(ArithOp::Shr, Value::Int(-8), Value::Int(1)).unwrap(), Value::Int(-4));
        assert_eq!(arith(ArithOp::Shl, Value::Long(1), Value::Int(40)).unwrap(), Value::Long(1 << 40));
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(CmpOp::Lt, Kind::Int, &Value::Int(1), &Value::Int(2)));
        assert!(!compare(CmpOp::Ge, Kind::Double, &Value::Double(f64::NAN), &Value::Double(0.0)));
        assert!(compare(CmpOp::Eq, Kind::String, &Value::string("a"), &Value::string("a")));
        assert!(compare(CmpOp::Ne, Kind::Ref, &Value::Null, &Value::string("a")));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(convert(Value::Double(2.9), Kind::Int).unwrap(), Value::Int(2));
        assert_eq!(convert(Value::Long(1 << 32), Kind::Int).unwrap(), Value::Int(0));
        assert_eq!(convert(Value::Int(3), Kind::Double).unwrap(), Value::Double(3.0));
    }
}
