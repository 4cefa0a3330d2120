//! Runtime values.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::image::{Kind, TypeSig};

/// A value on the interpreter stack, in a local slot or in a field.
#[derive(Debug, Clone)]
pub enum Value {
    /// Result of a `void` method.
    Void,
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(Arc<str>),
    Object(Arc<Object>),
}

/// An instance of a class declared in a compiled or reference unit.
#[derive(Debug)]
pub struct Object {
    type_name: String,
    fields: Mutex<Vec<Value>>,
}

impl Object {
    pub fn new(type_name: impl Into<String>, fields: Vec<Value>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Mutex::new(fields),
        }
    }

    /// Namespace-qualified name of the object's class.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub(crate) fn fields(&self) -> MutexGuard<'_, Vec<Value>> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn field(&self, index: usize) -> Option<Value> {
        self.fields().get(index).cloned()
    }
}

impl Value {
    pub fn string(text: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(text.as_ref()))
    }

    /// Zero value of a field or local of the given type.
    pub fn default_for(sig: TypeSig) -> Self {
        match sig {
            TypeSig::Void => Value::Void,
            TypeSig::Bool => Value::Bool(false),
            TypeSig::Int => Value::Int(0),
            TypeSig::Long => Value::Long(0),
            TypeSig::Double => Value::Double(0.0),
            TypeSig::String | TypeSig::Object | TypeSig::Class(_) => Value::Null,
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::Long(_) => Kind::Long,
            Value::Double(_) => Kind::Double,
            Value::Str(_) => Kind::String,
            Value::Void | Value::Null | Value::Object(_) => Kind::Ref,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Converts an argument to a parameter type, applying implicit
    /// widening. Returns `None` if no implicit conversion exists.
    pub fn coerce_to(&self, sig: TypeSig) -> Option<Value> {
        match (sig, self) {
            (TypeSig::Bool, Value::Bool(_))
            | (TypeSig::Int, Value::Int(_))
            | (TypeSig::Long, Value::Long(_))
            | (TypeSig::Double, Value::Double(_))
            | (TypeSig::String, Value::Str(_) | Value::Null)
            | (TypeSig::Class(_), Value::Object(_) | Value::Null) => Some(self.clone()),
            (TypeSig::Object, value) if !matches!(value, Value::Void) => Some(self.clone()),
            (TypeSig::Long, Value::Int(v)) => Some(Value::Long(i64::from(*v))),
            (TypeSig::Double, Value::Int(_) | Value::Long(_)) => self.as_double().map(Value::Double),
            _ => None,
        }
    }

    /// True if the value needs no conversion to fit `sig`.
    pub fn matches_exactly(&self, sig: TypeSig) -> bool {
        matches!(
            (sig, self),
            (TypeSig::Bool, Value::Bool(_))
                | (TypeSig::Int, Value::Int(_))
                | (TypeSig::Long, Value::Long(_))
                | (TypeSig::Double, Value::Double(_))
                | (TypeSig::String, Value::Str(_))
                | (TypeSig::Class(_), Value::Object(_))
        )
    }
}

/// Reference identity for objects, value equality otherwise.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Text as `Console.Write` and `ToString()` produce it.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void | Value::Null => Ok(()),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => f.write_str(&format_double(*v)),
            Value::Str(s) => f.write_str(s),
            Value::Object(o) => f.write_str(o.type_name()),
        }
    }
}

/// Shortest round-trip text, switching to exponent form for very large
/// and very small magnitudes (`1E+20`, `1E-05`).
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "∞" } else { "-∞" }.to_string();
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e15).contains(&magnitude) {
        let text = format!("{:E}", value);
        if let Some((mantissa, exponent)) = text.split_once('E') {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            return format!("{}E{}{:0>2}", mantissa, sign, digits);
        }
        return text;
    }
    if value == 0.0 {
        // Negative zero prints as "-0".
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    format!("{}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_console_output() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Double(2.5).to_string(), "2.5");
        assert_eq!(Value::Double(3.0).to_string(), "3");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::string("hi").to_string(), "hi");
    }

    #[test]
    fn test_double_formatting_edges() {
        assert_eq!(format_double(1e20), "1E+20");
        assert_eq!(format_double(0.00001234), "1.234E-05");
        assert_eq!(format_double(0.0001), "0.0001");
        assert_eq!(format_double(0.00009), "9E-05");
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::NEG_INFINITY), "-∞");
        assert_eq!(format_double(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn test_coercion_widens() {
        assert_eq!(Value::Int(3).coerce_to(TypeSig::Long), Some(Value::Long(3)));
        assert_eq!(Value::Long(3).coerce_to(TypeSig::Double), Some(Value::Double(3.0)));
        assert_eq!(Value::Double(3.0).coerce_to(TypeSig::Int), None);
        assert_eq!(Value::Null.coerce_to(TypeSig::String), Some(Value::Null));
        assert!(Value::Int(1).coerce_to(TypeSig::Object).is_some());
    }

    #[test]
    fn test_objects_compare_by_identity() {
        let a = Arc::new(Object::new("C", vec![Value::Int(1)]));
        let b = Arc::new(Object::new("C", vec![Value::Int(1)]));
        assert_eq!(Value::Object(Arc::clone(&a)), Value::Object(Arc::clone(&a)));
        assert_ne!(Value::Object(a), Value::Object(b));
    }
}
