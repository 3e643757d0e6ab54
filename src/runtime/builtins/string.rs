//! String.prototype.charCodeAt / String.fromCharCode

use super::{arg, BuiltinId};
use crate::error::{messages, Error, Result};
use crate::runtime::buffer::to_uint32_bits;
use crate::runtime::coerce;
use crate::runtime::realm::Realm;
use crate::runtime::string::JsString;
use crate::runtime::value::Value;

/// `String.prototype.charCodeAt(pos)`
pub fn char_code_at(realm: &mut Realm, this: &Value, args: &[Value]) -> Result<Value> {
    if this.is_nullish() {
        return Err(Error::type_error(messages::called_on_nullish(
            &BuiltinId::StringCharCodeAt.method_name(),
        )));
    }
    let s = coerce::to_js_string(realm, this)?;
    let pos = coerce::to_integer_or_infinity(realm, &arg(args, 0))?;
    Ok(Value::Number(code_unit_or_nan(&s, pos)))
}

/// Code unit at integer position `pos`, NaN when out of range
pub fn code_unit_or_nan(s: &JsString, pos: f64) -> f64 {
    if pos < 0.0 || pos >= s.len() as f64 {
        return f64::NAN;
    }
    s.code_unit_at(pos as usize).map(f64::from).unwrap_or(f64::NAN)
}

/// `String.fromCharCode(...codes)`
pub fn from_char_code(realm: &mut Realm, args: &[Value]) -> Result<Value> {
    let mut units = Vec::with_capacity(args.len());
    for code in args {
        let n = coerce::to_number(realm, code)?;
        units.push(to_uint32_bits(n) as u16);
    }
    Ok(Value::String(JsString::from_code_units(units)))
}
