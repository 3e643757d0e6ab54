//! JavaScript value representation

use super::object::{ObjectKind, ObjectRef, Property};
use super::string::JsString;
use num_bigint::BigInt;
use std::fmt;
use std::rc::Rc;

/// Sparse arrays longer than this render as `[object Array]`
const SPARSE_DISPLAY_LIMIT: u64 = 1 << 16;

/// A JavaScript value
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    BigInt(BigInt),
    String(JsString),
    Object(ObjectRef),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_object()
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&JsString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<&BigInt> {
        match self {
            Value::BigInt(n) => Some(n),
            _ => None,
        }
    }

    /// Number holding an int32 value. `-0` counts, since every integer
    /// conversion maps it to `0`.
    pub fn as_int32(&self) -> Option<i32> {
        match self {
            Value::Number(n) if is_int32(*n) => Some(*n as i32),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        match self {
            Value::Object(obj) => obj.try_borrow().map(|o| o.is_callable()).unwrap_or(false),
            _ => false,
        }
    }

    /// Convert to boolean (ToBoolean, never runs user code)
    pub fn to_boolean(&self) -> bool {
        use num_traits::Zero;
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::BigInt(n) => !n.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Object(obj) => {
                if obj.try_borrow().map(|o| o.is_callable()).unwrap_or(false) {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    /// Strict equality (`===`)
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// SameValue: like `===` but NaN equals NaN and `0` differs from `-0`
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                (a.is_nan() && b.is_nan()) || (a == b && a.is_sign_negative() == b.is_sign_negative())
            }
            _ => self.strict_equals(other),
        }
    }

    /// Display string used by `print`. Primitives follow ToString, objects
    /// render without invoking user code.
    pub fn display(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::BigInt(n) => n.to_string(),
            Value::String(s) => s.to_rust_string(),
            Value::Object(obj) => {
                let Ok(obj) = obj.try_borrow() else {
                    return "[object Object]".to_string();
                };
                match &obj.kind {
                    ObjectKind::Array(elements) => elements
                        .iter()
                        .map(|v| if v.is_nullish() { String::new() } else { v.display() })
                        .collect::<Vec<_>>()
                        .join(","),
                    ObjectKind::SparseArray { length } if *length <= SPARSE_DISPLAY_LIMIT => (0..*length)
                        .map(|i| match obj.own_property(&i.to_string()) {
                            Some(Property::Data { value, .. }) if !value.is_nullish() => value.display(),
                            _ => String::new(),
                        })
                        .collect::<Vec<_>>()
                        .join(","),
                    ObjectKind::SparseArray { .. } => "[object Array]".to_string(),
                    ObjectKind::Function(_) => format!(
                        "function {}() {{ [native code] }}",
                        obj.function_name().unwrap_or_default()
                    ),
                    ObjectKind::ArrayBuffer(_) => "[object ArrayBuffer]".to_string(),
                    ObjectKind::DataView { .. } => "[object DataView]".to_string(),
                    ObjectKind::Arguments => "[object Arguments]".to_string(),
                    _ => "[object Object]".to_string(),
                }
            }
        }
    }
}

/// Whether `n` is an integer in int32 range (including `-0`)
pub fn is_int32(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64
}

/// Number::toString(10)
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        format!("{}", n)
    } else {
        let s = format!("{:e}", n);
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::BigInt(n) => write!(f, "{}n", n),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Object(obj) => match obj.try_borrow() {
                Ok(o) => write!(f, "{:?}", o),
                Err(_) => write!(f, "Object(<borrowed>)"),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(JsString::new(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(JsString::new(&s))
    }
}

impl From<JsString> for Value {
    fn from(s: JsString) -> Self {
        Value::String(s)
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::BigInt(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(4.0), "4");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
    }

    #[test]
    fn test_same_value_distinguishes_zero() {
        assert!(Value::Number(0.0).strict_equals(&Value::Number(-0.0)));
        assert!(!Value::Number(0.0).same_value(&Value::Number(-0.0)));
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
    }

    #[test]
    fn test_as_int32() {
        assert_eq!(Value::Number(3.0).as_int32(), Some(3));
        assert_eq!(Value::Number(-0.0).as_int32(), Some(0));
        assert_eq!(Value::Number(1.5).as_int32(), None);
        assert_eq!(Value::Number(4_294_967_296.0).as_int32(), None);
        assert_eq!(Value::from("1").as_int32(), None);
    }

    #[test]
    fn test_to_boolean() {
        assert!(!Value::Number(f64::NAN).to_boolean());
        assert!(!Value::from("").to_boolean());
        assert!(Value::BigInt(BigInt::from(1)).to_boolean());
    }
}
