//! Natively implemented methods of the base runtime unit.

use std::num::IntErrorKind;

use super::value::Value;
use super::InvokeError;
use crate::image::Intrinsic;

/// Runs an intrinsic. Console output is appended to `output`.
pub(super) fn call(which: Intrinsic, args: &[Value], output: &mut String) -> Result<Value, InvokeError> {
    let arg = |i: usize| args.get(i).ok_or_else(|| invalid(which, "missing argument"));

    match which {
        Intrinsic::ConsoleWriteLine => {
            output.push('\n');
            Ok(Value::Void)
        }
        Intrinsic::ConsoleWriteLineValue => {
            output.push_str(&arg(0)?.to_string());
            output.push('\n');
            Ok(Value::Void)
        }
        Intrinsic::ConsoleWriteValue => {
            output.push_str(&arg(0)?.to_string());
            Ok(Value::Void)
        }
        Intrinsic::MathAbs => match arg(0)? {
            Value::Int(v) => v.checked_abs().map(Value::Int).ok_or(InvokeError::Overflow),
            Value::Long(v) => v.checked_abs().map(Value::Long).ok_or(InvokeError::Overflow),
            Value::Double(v) => Ok(Value::Double(v.abs())),
            _ => Err(invalid(which, "expected a number")),
        },
        Intrinsic::MathMax | Intrinsic::MathMin => {
            let max = which == Intrinsic::MathMax;
            match (arg(0)?, arg(1)?) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(if max { *a.max(b) } else { *a.min(b) })),
                (Value::Long(a), Value::Long(b)) => Ok(Value::Long(if max { *a.max(b) } else { *a.min(b) })),
                (Value::Double(a), Value::Double(b)) => {
                    let value = if a.is_nan() || b.is_nan() {
                        f64::NAN
                    } else if max {
                        a.max(*b)
                    } else {
                        a.min(*b)
                    };
                    Ok(Value::Double(value))
                }
                _ => Err(invalid(which, "expected two numbers of the same type")),
            }
        }
        Intrinsic::MathSqrt => unary_double(which, args, f64::sqrt),
        Intrinsic::MathFloor => unary_double(which, args, f64::floor),
        Intrinsic::MathCeiling => unary_double(which, args, f64::ceil),
        // Midpoints round to even.
        Intrinsic::MathRound => unary_double(which, args, f64::round_ties_even),
        Intrinsic::MathPow => {
            let x = double_arg(which, args, 0)?;
            let y = double_arg(which, args, 1)?;
            Ok(Value::Double(x.powf(y)))
        }
        Intrinsic::StringConcat => {
            let mut text = arg(0)?.to_string();
            text.push_str(&arg(1)?.to_string());
            Ok(Value::string(text))
        }
        Intrinsic::StringIsNullOrEmpty => match arg(0)? {
            Value::Null => Ok(Value::Bool(true)),
            Value::Str(s) => Ok(Value::Bool(s.is_empty())),
            _ => Err(invalid(which, "expected a string")),
        },
        Intrinsic::Int32Parse => {
            let text = string_arg(which, args)?;
            text.trim()
                .parse::<i32>()
                .map(Value::Int)
                .map_err(|e| parse_error(e.kind(), text))
        }
        Intrinsic::Int64Parse => {
            let text = string_arg(which, args)?;
            text.trim()
                .parse::<i64>()
                .map(Value::Long)
                .map_err(|e| parse_error(e.kind(), text))
        }
        Intrinsic::DoubleParse => {
            let text = string_arg(which, args)?;
            text.trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| InvokeError::Format {
                    input: text.to_string(),
                })
        }
    }
}

fn invalid(which: Intrinsic, message: &str) -> InvokeError {
    InvokeError::InvalidProgram {
        message: format!("{:?}: {}", which, message),
    }
}

fn double_arg(which: Intrinsic, args: &[Value], index: usize) -> Result<f64, InvokeError> {
    args.get(index)
        .and_then(Value::as_double)
        .ok_or_else(|| invalid(which, "expected a double"))
}

fn unary_double(which: Intrinsic, args: &[Value], f: fn(f64) -> f64) -> Result<Value, InvokeError> {
    Ok(Value::Double(f(double_arg(which, args, 0)?)))
}

fn string_arg(which: Intrinsic, args: &[Value]) -> Result<&str, InvokeError> {
    match args.first() {
        Some(Value::Str(s)) => Ok(s),
        Some(Value::Null) => Err(InvokeError::NullReference),
        _ => Err(invalid(which, "expected a string")),
    }
}

fn parse_error(kind: &IntErrorKind, input: &str) -> InvokeError {
    match kind {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => InvokeError::Overflow,
        _ => InvokeError::Format {
            input: input.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(which: Intrinsic, args: &[Value]) -> Result<Value, InvokeError> {
        call(which, args, &mut String::new())
    }

    #[test]
    fn test_console_output_is_captured() {
        let mut output = String::new();
        call(Intrinsic::ConsoleWriteValue, &[Value::Int(1)], &mut output).unwrap();
        call(Intrinsic::ConsoleWriteLineValue, &[Value::Bool(false)], &mut output).unwrap();
        call(Intrinsic::ConsoleWriteLine, &[], &mut output).unwrap();
        assert_eq!(output, "1False\n\n");
    }

    #[test]
    fn test_math() {
        assert_eq!(run(Intrinsic::MathMax, &[Value::Int(2), Value::Int(9)]).unwrap(), Value::Int(9));
        assert_eq!(run(Intrinsic::MathMin, &[Value::Long(2), Value::Long(-9)]).unwrap(), Value::Long(-9));
        assert_eq!(run(Intrinsic::MathRound, &[Value::Double(2.5)]).unwrap(), Value::Double(2.0));
        assert_eq!(run(Intrinsic::MathSqrt, &[Value::Double(16.0)]).unwrap(), Value::Double(4.0));
        assert_eq!(run(Intrinsic::MathAbs, &[Value::Int(i32::MIN)]), Err(InvokeError::Overflow));
    }

    #[test]
    fn test_parse() {
        assert_eq!(run(Intrinsic::Int32Parse, &[Value::string(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(run(Intrinsic::Int32Parse, &[Value::string("99999999999")]), Err(InvokeError::Overflow));
        assert!(matches!(
            run(Intrinsic::Int32Parse, &[Value::string("4x")]),
            Err(InvokeError::Format { .. })
        ));
        assert_eq!(run(Intrinsic::Int64Parse, &[Value::Null]), Err(InvokeError::NullReference));
        assert_eq!(run(Intrinsic::DoubleParse, &[Value::string("1.5")]).unwrap(), Value::Double(1.5));
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(
            run(Intrinsic::StringConcat, &[Value::string("a"), Value::Null]).unwrap(),
            Value::string("a")
        );
        assert_eq!(run(Intrinsic::StringIsNullOrEmpty, &[Value::Null]).unwrap(), Value::Bool(true));
        assert_eq!(
            run(Intrinsic::StringIsNullOrEmpty, &[Value::string("x")]).unwrap(),
            Value::Bool(false)
        );
    }
}
