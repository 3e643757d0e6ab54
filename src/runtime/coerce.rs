//! Abstract conversion operations (ToPrimitive, ToNumber, ToIndex, ToBigInt, ...)
//!
//! Conversions of objects may call user `valueOf`/`toString` methods and are
//! therefore reentrancy points for compiled code.

use super::realm::Realm;
use super::string::JsString;
use super::value::{number_to_string, Value};
use crate::error::{messages, Error, Result};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Zero};

/// 2^53 - 1
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredType {
    Number,
    String,
}

/// ToPrimitive
pub fn to_primitive(realm: &mut Realm, value: &Value, hint: PreferredType) -> Result<Value> {
    if value.is_primitive() {
        return Ok(value.clone());
    }
    let order = match hint {
        PreferredType::Number => ["valueOf", "toString"],
        PreferredType::String => ["toString", "valueOf"],
    };
    let mut found_method = false;
    for name in order {
        let method = realm.get(value, name)?;
        if method.is_callable() {
            found_method = true;
            let result = realm.call_function(&method, value, &[])?;
            if result.is_primitive() {
                return Ok(result);
            }
        }
    }
    if found_method {
        Err(Error::type_error(messages::CANNOT_CONVERT_TO_PRIMITIVE))
    } else {
        // Object.prototype.toString / Array.prototype.toString
        Ok(Value::from(value.display()))
    }
}

/// ToNumber
pub fn to_number(realm: &mut Realm, value: &Value) -> Result<f64> {
    match value {
        Value::Undefined => Ok(f64::NAN),
        Value::Null => Ok(0.0),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Ok(*n),
        Value::String(s) => Ok(string_to_number(&s.to_rust_string())),
        Value::BigInt(_) => Err(Error::type_error(messages::BIGINT_TO_NUMBER)),
        Value::Object(_) => {
            let prim = to_primitive(realm, value, PreferredType::Number)?;
            to_number(realm, &prim)
        }
    }
}

/// ToNumber for primitives; `None` for objects and BigInts
pub fn primitive_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Undefined => Some(f64::NAN),
        Value::Null => Some(0.0),
        Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Some(*n),
        Value::String(s) => Some(string_to_number(&s.to_rust_string())),
        Value::BigInt(_) | Value::Object(_) => None,
    }
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

/// StringToNumber
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(is_js_whitespace);
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let radix = match trimmed.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &trimmed[2..];
        if digits.is_empty() {
            return f64::NAN;
        }
        let mut acc = 0.0f64;
        for c in digits.chars() {
            match c.to_digit(radix) {
                Some(d) => acc = acc * radix as f64 + d as f64,
                None => return f64::NAN,
            }
        }
        return acc;
    }
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// ToIntegerOrInfinity
pub fn to_integer_or_infinity(realm: &mut Realm, value: &Value) -> Result<f64> {
    let n = to_number(realm, value)?;
    Ok(integer_or_infinity(n))
}

pub fn integer_or_infinity(n: f64) -> f64 {
    if n.is_nan() || n == 0.0 {
        0.0
    } else if n.is_infinite() {
        n
    } else {
        n.trunc()
    }
}

/// ToIndex
pub fn to_index(realm: &mut Realm, value: &Value) -> Result<u64> {
    if value.is_undefined() {
        return Ok(0);
    }
    let integer = to_integer_or_infinity(realm, value)?;
    if !(0.0..=MAX_SAFE_INTEGER).contains(&integer) {
        return Err(Error::range_error(messages::INVALID_INDEX));
    }
    Ok(integer as u64)
}

/// ToString
pub fn to_js_string(realm: &mut Realm, value: &Value) -> Result<JsString> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(JsString::new(&number_to_string(*n))),
        Value::Object(_) => {
            let prim = to_primitive(realm, value, PreferredType::String)?;
            to_js_string(realm, &prim)
        }
        other => Ok(JsString::new(&other.display())),
    }
}

/// ToBigInt
pub fn to_bigint(realm: &mut Realm, value: &Value) -> Result<BigInt> {
    let prim = to_primitive(realm, value, PreferredType::Number)?;
    match &prim {
        Value::BigInt(n) => Ok(n.clone()),
        Value::Boolean(b) => Ok(BigInt::from(*b as u8)),
        Value::String(s) => {
            let text = s.to_rust_string();
            string_to_bigint(&text)
                .ok_or_else(|| Error::syntax_error(messages::cannot_convert_to_bigint(&text)))
        }
        Value::Undefined | Value::Null | Value::Number(_) => {
            Err(Error::type_error(messages::cannot_convert_to_bigint(&prim.display())))
        }
        Value::Object(_) => Err(Error::type_error(messages::CANNOT_CONVERT_TO_PRIMITIVE)),
    }
}

/// StringToBigInt; `None` when the text is not a BigInt literal
pub fn string_to_bigint(s: &str) -> Option<BigInt> {
    let trimmed = s.trim_matches(is_js_whitespace);
    if trimmed.is_empty() {
        return Some(BigInt::zero());
    }
    let radix = match trimmed.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return BigInt::parse_bytes(trimmed[2..].as_bytes(), radix);
    }
    let (negative, digits) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n = BigInt::parse_bytes(digits.as_bytes(), 10)?;
    Some(if negative { -n } else { n })
}

/// NumberToBigInt
pub fn number_to_bigint(n: f64) -> Result<BigInt> {
    if !n.is_finite() || n.fract() != 0.0 {
        return Err(Error::range_error(messages::not_an_integer(&number_to_string(n))));
    }
    BigInt::from_f64(n).ok_or_else(|| Error::range_error(messages::not_an_integer(&number_to_string(n))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1F"), 31.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert_eq!(string_to_number("1e3"), 1000.0);
    }

    #[test]
    fn test_to_index_rejects_negative() {
        let mut realm = Realm::new();
        assert_eq!(to_index(&mut realm, &Value::Undefined).unwrap(), 0);
        assert_eq!(to_index(&mut realm, &Value::from(3.7)).unwrap(), 3);
        assert_eq!(to_index(&mut realm, &Value::from(-0.5)).unwrap(), 0);
        let err = to_index(&mut realm, &Value::from(-1)).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::RangeError));
    }

    #[test]
    fn test_to_number_calls_value_of() {
        let mut realm = Realm::new();
        let obj = realm.new_object();
        let value_of = realm.new_function("valueOf", |realm, _, _| {
            realm.print("valueOf");
            Ok(Value::from(5))
        });
        realm.set(&obj, "valueOf", value_of).unwrap();
        assert_eq!(to_number(&mut realm, &obj).unwrap(), 5.0);
        assert_eq!(realm.output(), &["valueOf".to_string()]);
    }

    #[test]
    fn test_to_bigint_conversions() {
        let mut realm = Realm::new();
        assert_eq!(to_bigint(&mut realm, &Value::from("  -12 ")).unwrap(), BigInt::from(-12));
        assert_eq!(to_bigint(&mut realm, &Value::from(true)).unwrap(), BigInt::from(1));
        let err = to_bigint(&mut realm, &Value::from(1)).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Cannot convert 1 to a BigInt");
        let err = to_bigint(&mut realm, &Value::from("1x")).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::SyntaxError));
    }

    #[test]
    fn test_number_to_bigint() {
        assert_eq!(number_to_bigint(-7.0).unwrap(), BigInt::from(-7));
        assert_eq!(number_to_bigint(1.5).unwrap_err().kind(), Some(ErrorKind::RangeError));
        assert!(number_to_bigint(f64::NAN).is_err());
    }
}
