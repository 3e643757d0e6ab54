//! %TypedArray%.prototype.fill

use super::{arg, BuiltinId};
use crate::error::{messages, Error, Result};
use crate::runtime::buffer::{BufferRef, ElementType};
use crate::runtime::coerce;
use crate::runtime::object::ObjectKind;
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;

#[derive(Clone)]
pub struct TypedArrayParts {
    pub buffer: BufferRef,
    pub element: ElementType,
    pub byte_offset: usize,
    pub length: usize,
}

pub fn typed_array_parts(value: &Value) -> Option<TypedArrayParts> {
    let obj = value.as_object()?.try_borrow().ok()?;
    match &obj.kind {
        ObjectKind::TypedArray {
            buffer,
            element,
            byte_offset,
            length,
        } => Some(TypedArrayParts {
            buffer: buffer.clone(),
            element: *element,
            byte_offset: *byte_offset,
            length: *length,
        }),
        _ => None,
    }
}

/// ValidateTypedArray
fn validate(this: &Value) -> Result<TypedArrayParts> {
    let parts = typed_array_parts(this).ok_or_else(|| Error::type_error(messages::NOT_A_TYPED_ARRAY))?;
    if parts.buffer.borrow().is_detached() {
        return Err(Error::type_error(messages::detached_buffer(
            &BuiltinId::TypedArrayFill.method_name(),
        )));
    }
    Ok(parts)
}

/// Resolve a relative start/end index against `len`
pub fn clamp_relative(relative: f64, len: usize) -> usize {
    let len_f = len as f64;
    if relative < 0.0 {
        (len_f + relative).max(0.0) as usize
    } else {
        relative.min(len_f) as usize
    }
}

fn relative_index(realm: &mut Realm, value: &Value, len: usize, default: usize) -> Result<usize> {
    if value.is_undefined() {
        return Ok(default);
    }
    let relative = coerce::to_integer_or_infinity(realm, value)?;
    Ok(clamp_relative(relative, len))
}

/// Store `value` into elements `start..end`
pub fn fill_range(parts: &TypedArrayParts, value: f64, start: usize, end: usize) {
    let mut store = parts.buffer.borrow_mut();
    if store.is_detached() {
        return;
    }
    let size = parts.element.size();
    let bytes = store.bytes_mut();
    for k in start..end.min(parts.length) {
        let offset = parts.byte_offset + k * size;
        parts.element.write(&mut bytes[offset..], value, true);
    }
}

/// `%TypedArray%.prototype.fill(value, start, end)`
pub fn fill(realm: &mut Realm, this: &Value, args: &[Value]) -> Result<Value> {
    let parts = validate(this)?;
    let len = parts.length;
    let value = coerce::to_number(realm, &arg(args, 0))?;
    let start = relative_index(realm, &arg(args, 1), len, 0)?;
    let end = relative_index(realm, &arg(args, 2), len, len)?;
    // Coercion may have run user code that detached the buffer
    let parts = validate(this)?;
    fill_range(&parts, value, start, end);
    Ok(this.clone())
}
