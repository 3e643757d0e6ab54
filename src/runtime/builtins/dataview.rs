//! DataView.prototype.get* / set*

use super::{arg, BuiltinId};
use crate::error::{messages, Error, Result};
use crate::runtime::buffer::{BufferRef, ElementType};
use crate::runtime::coerce;
use crate::runtime::object::ObjectKind;
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;

/// Buffer window of a DataView
#[derive(Clone)]
pub struct ViewParts {
    pub buffer: BufferRef,
    pub byte_offset: usize,
    pub byte_length: usize,
}

pub fn view_parts(value: &Value) -> Option<ViewParts> {
    let obj = value.as_object()?.try_borrow().ok()?;
    match &obj.kind {
        ObjectKind::DataView {
            buffer,
            byte_offset,
            byte_length,
        } => Some(ViewParts {
            buffer: buffer.clone(),
            byte_offset: *byte_offset,
            byte_length: *byte_length,
        }),
        _ => None,
    }
}

/// GetViewValue
pub fn get(realm: &mut Realm, id: BuiltinId, element: ElementType, this: &Value, args: &[Value]) -> Result<Value> {
    let parts = view_parts(this).ok_or_else(|| Error::type_error(messages::incompatible_receiver(&id.method_name())))?;
    let index = coerce::to_index(realm, &arg(args, 0))?;
    let little_endian = arg(args, 1).to_boolean();
    read_element(&parts, index, element, little_endian, id).map(Value::Number)
}

/// SetViewValue
pub fn set(realm: &mut Realm, id: BuiltinId, element: ElementType, this: &Value, args: &[Value]) -> Result<Value> {
    let parts = view_parts(this).ok_or_else(|| Error::type_error(messages::incompatible_receiver(&id.method_name())))?;
    let index = coerce::to_index(realm, &arg(args, 0))?;
    let number = coerce::to_number(realm, &arg(args, 1))?;
    let little_endian = arg(args, 2).to_boolean();
    write_element(&parts, index, element, number, little_endian, id)?;
    Ok(Value::Undefined)
}

fn check_window(parts: &ViewParts, detached: bool, index: u64, element: ElementType, id: BuiltinId) -> Result<usize> {
    if detached {
        return Err(Error::type_error(messages::detached_buffer(&id.method_name())));
    }
    let end = index.saturating_add(element.size() as u64);
    if end > parts.byte_length as u64 {
        return Err(Error::range_error(messages::DATAVIEW_OUT_OF_BOUNDS));
    }
    Ok(parts.byte_offset + index as usize)
}

pub fn read_element(parts: &ViewParts, index: u64, element: ElementType, little_endian: bool, id: BuiltinId) -> Result<f64> {
    let store = parts.buffer.borrow();
    let start = check_window(parts, store.is_detached(), index, element, id)?;
    Ok(element.read(&store.bytes()[start..], little_endian))
}

pub fn write_element(
    parts: &ViewParts,
    index: u64,
    element: ElementType,
    value: f64,
    little_endian: bool,
    id: BuiltinId,
) -> Result<()> {
    let mut store = parts.buffer.borrow_mut();
    let start = check_window(parts, store.is_detached(), index, element, id)?;
    element.write(&mut store.bytes_mut()[start..], value, little_endian);
    Ok(())
}
