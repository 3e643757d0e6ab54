//! Builtin library functions
//!
//! Every builtin the inliner knows about has a `BuiltinId`, a holder object
//! it is installed on, and a generic implementation with full language
//! semantics. The generic implementations are the resumption targets of
//! deoptimized fast paths.

pub mod array;
pub mod bigint;
pub mod dataview;
pub mod math;
pub mod string;
pub mod typed_array;

use super::buffer::ElementType;
use super::coerce;
use super::object::Property;
use super::realm::Realm;
use super::value::Value;
use crate::error::{messages, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Object a builtin is installed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Holder {
    ArrayPrototype,
    StringPrototype,
    StringConstructor,
    Math,
    BigIntConstructor,
    DataViewPrototype,
    TypedArrayPrototype,
    Global,
}

impl Holder {
    pub fn path(self) -> &'static str {
        match self {
            Holder::ArrayPrototype => "Array.prototype",
            Holder::StringPrototype => "String.prototype",
            Holder::StringConstructor => "String",
            Holder::Math => "Math",
            Holder::BigIntConstructor => "BigInt",
            Holder::DataViewPrototype => "DataView.prototype",
            Holder::TypedArrayPrototype => "%TypedArray%.prototype",
            Holder::Global => "globalThis",
        }
    }
}

/// Direction of a DataView accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAccess {
    Get,
    Set,
}

macro_rules! builtin_ids {
    ($($id:ident => ($js:literal, $holder:ident, $cost:literal)),* $(,)?) => {
        /// Identity of an inlinable builtin
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum BuiltinId {
            $($id),*
        }

        impl BuiltinId {
            pub const ALL: &'static [BuiltinId] = &[$(BuiltinId::$id),*];

            /// Name used in traces (`aot inline builtin: <name>`)
            pub fn name(self) -> &'static str {
                match self {
                    $(BuiltinId::$id => stringify!($id)),*
                }
            }

            /// Property name on the holder
            pub fn js_name(self) -> &'static str {
                match self {
                    $(BuiltinId::$id => $js),*
                }
            }

            pub fn holder(self) -> Holder {
                match self {
                    $(BuiltinId::$id => Holder::$holder),*
                }
            }

            /// Estimated cost of a dynamically dispatched generic call
            pub fn generic_cost(self) -> u32 {
                match self {
                    $(BuiltinId::$id => $cost),*
                }
            }
        }
    };
}

builtin_ids! {
    ArrayPush => ("push", ArrayPrototype, 12),
    ArrayPop => ("pop", ArrayPrototype, 10),
    StringCharCodeAt => ("charCodeAt", StringPrototype, 8),
    StringFromCharCode => ("fromCharCode", StringConstructor, 6),
    MathFRound => ("fround", Math, 5),
    MathAbs => ("abs", Math, 5),
    MathFloor => ("floor", Math, 5),
    MathCeil => ("ceil", Math, 5),
    MathTrunc => ("trunc", Math, 5),
    MathSqrt => ("sqrt", Math, 5),
    MathSign => ("sign", Math, 5),
    BigIntAsUintN => ("asUintN", BigIntConstructor, 8),
    BigIntAsIntN => ("asIntN", BigIntConstructor, 8),
    BigIntConstructor => ("BigInt", Global, 6),
    DataViewGetInt8 => ("getInt8", DataViewPrototype, 12),
    DataViewGetUint8 => ("getUint8", DataViewPrototype, 12),
    DataViewGetInt16 => ("getInt16", DataViewPrototype, 12),
    DataViewGetUint16 => ("getUint16", DataViewPrototype, 12),
    DataViewGetInt32 => ("getInt32", DataViewPrototype, 12),
    DataViewGetUint32 => ("getUint32", DataViewPrototype, 12),
    DataViewGetFloat32 => ("getFloat32", DataViewPrototype, 12),
    DataViewGetFloat64 => ("getFloat64", DataViewPrototype, 12),
    DataViewSetInt8 => ("setInt8", DataViewPrototype, 14),
    DataViewSetUint8 => ("setUint8", DataViewPrototype, 14),
    DataViewSetInt16 => ("setInt16", DataViewPrototype, 14),
    DataViewSetUint16 => ("setUint16", DataViewPrototype, 14),
    DataViewSetInt32 => ("setInt32", DataViewPrototype, 14),
    DataViewSetUint32 => ("setUint32", DataViewPrototype, 14),
    DataViewSetFloat32 => ("setFloat32", DataViewPrototype, 14),
    DataViewSetFloat64 => ("setFloat64", DataViewPrototype, 14),
    TypedArrayFill => ("fill", TypedArrayPrototype, 12),
}

impl BuiltinId {
    /// Position in `ALL`, used as a compact profile encoding
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&id| id == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<BuiltinId> {
        Self::ALL.get(index).copied()
    }

    pub fn from_name(name: &str) -> Option<BuiltinId> {
        Self::ALL.iter().copied().find(|id| id.name() == name)
    }

    /// Qualified method name used in error messages
    pub fn method_name(self) -> String {
        match self.holder() {
            Holder::Global => self.js_name().to_string(),
            holder => format!("{}.{}", holder.path(), self.js_name()),
        }
    }

    pub fn view_access(self) -> Option<(ViewAccess, ElementType)> {
        use BuiltinId::*;
        let access = match self {
            DataViewGetInt8 => (ViewAccess::Get, ElementType::Int8),
            DataViewGetUint8 => (ViewAccess::Get, ElementType::Uint8),
            DataViewGetInt16 => (ViewAccess::Get, ElementType::Int16),
            DataViewGetUint16 => (ViewAccess::Get, ElementType::Uint16),
            DataViewGetInt32 => (ViewAccess::Get, ElementType::Int32),
            DataViewGetUint32 => (ViewAccess::Get, ElementType::Uint32),
            DataViewGetFloat32 => (ViewAccess::Get, ElementType::Float32),
            DataViewGetFloat64 => (ViewAccess::Get, ElementType::Float64),
            DataViewSetInt8 => (ViewAccess::Set, ElementType::Int8),
            DataViewSetUint8 => (ViewAccess::Set, ElementType::Uint8),
            DataViewSetInt16 => (ViewAccess::Set, ElementType::Int16),
            DataViewSetUint16 => (ViewAccess::Set, ElementType::Uint16),
            DataViewSetInt32 => (ViewAccess::Set, ElementType::Int32),
            DataViewSetUint32 => (ViewAccess::Set, ElementType::Uint32),
            DataViewSetFloat32 => (ViewAccess::Set, ElementType::Float32),
            DataViewSetFloat64 => (ViewAccess::Set, ElementType::Float64),
            _ => return None,
        };
        Some(access)
    }
}

impl fmt::Display for BuiltinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Install every builtin on its holder and publish the global bindings
pub fn install(realm: &mut Realm) {
    let bigint = realm.new_builtin_function(BuiltinId::BigIntConstructor);
    realm.set_global("BigInt", Value::Object(bigint));
    let string_ctor = realm.new_function("String", |realm, _this, args| {
        if args.is_empty() {
            return Ok(Value::from(""));
        }
        Ok(Value::String(coerce::to_js_string(realm, &args[0])?))
    });
    realm.set_global("String", string_ctor);
    let math = Value::Object(realm.intrinsics().math.clone());
    realm.set_global("Math", math);

    for &id in BuiltinId::ALL {
        if id == BuiltinId::BigIntConstructor {
            continue;
        }
        let holder = realm.holder(id.holder());
        let func = realm.new_builtin_function(id);
        holder
            .borrow_mut()
            .properties
            .insert(id.js_name().to_string(), Property::data(Value::Object(func)));
    }
}

/// Generic entry point: run builtin `id` with full semantics
pub fn call_builtin(realm: &mut Realm, id: BuiltinId, this: &Value, args: &[Value]) -> Result<Value> {
    use BuiltinId::*;
    match id {
        ArrayPush => array::push(realm, this, args),
        ArrayPop => array::pop(realm, this, args),
        StringCharCodeAt => string::char_code_at(realm, this, args),
        StringFromCharCode => string::from_char_code(realm, args),
        MathFRound | MathAbs | MathFloor | MathCeil | MathTrunc | MathSqrt | MathSign => {
            let op = math::MathOp::from_builtin(id)
                .ok_or_else(|| Error::internal(format!("{} is not a Math builtin", id)))?;
            math::call(realm, op, args)
        }
        BigIntAsUintN => bigint::as_uint_n(realm, args),
        BigIntAsIntN => bigint::as_int_n(realm, args),
        BigIntConstructor => bigint::call_constructor(realm, args),
        TypedArrayFill => typed_array::fill(realm, this, args),
        _ => match id.view_access() {
            Some((ViewAccess::Get, element)) => dataview::get(realm, id, element, this, args),
            Some((ViewAccess::Set, element)) => dataview::set(realm, id, element, this, args),
            None => Err(Error::internal(format!("no generic implementation for {}", id))),
        },
    }
}

/// Argument `index`, or `undefined` when absent
pub fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// ToObject for a method receiver
pub fn to_object(realm: &mut Realm, value: &Value, method: &str) -> Result<Value> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        Value::Undefined | Value::Null => Err(Error::type_error(messages::called_on_nullish(method))),
        Value::String(s) => {
            let wrapper = realm.new_object();
            if let Some(obj) = wrapper.as_object() {
                let mut o = obj.borrow_mut();
                for i in 0..s.len() {
                    let unit = s.code_unit_at(i).unwrap_or(0);
                    o.properties.insert(
                        i.to_string(),
                        Property::readonly(Value::String(super::string::JsString::from_code_units(vec![unit]))),
                    );
                }
                o.properties
                    .insert("length".to_string(), Property::readonly(Value::Number(s.len() as f64)));
            }
            Ok(wrapper)
        }
        _ => Ok(realm.new_object()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for &id in BuiltinId::ALL {
            assert_eq!(BuiltinId::from_name(id.name()), Some(id));
            assert_eq!(BuiltinId::from_index(id.index()), Some(id));
        }
    }

    #[test]
    fn test_method_names() {
        assert_eq!(BuiltinId::ArrayPush.method_name(), "Array.prototype.push");
        assert_eq!(BuiltinId::BigIntConstructor.method_name(), "BigInt");
        assert_eq!(BuiltinId::MathFRound.method_name(), "Math.fround");
    }

    #[test]
    fn test_installed_on_holders() {
        let mut realm = Realm::new();
        let math = realm.global("Math").unwrap();
        let fround = realm.get(&math, "fround").unwrap();
        let id = fround.as_object().unwrap().borrow().builtin_id();
        assert_eq!(id, Some(BuiltinId::MathFRound));

        let arr = realm.new_array(vec![]);
        let push = realm.get(&arr, "push").unwrap();
        assert_eq!(push.as_object().unwrap().borrow().builtin_id(), Some(BuiltinId::ArrayPush));

        let bigint = realm.global("BigInt").unwrap();
        let as_uint_n = realm.get(&bigint, "asUintN").unwrap();
        assert_eq!(as_uint_n.as_object().unwrap().borrow().builtin_id(), Some(BuiltinId::BigIntAsUintN));
    }

    #[test]
    fn test_view_access() {
        assert_eq!(
            BuiltinId::DataViewSetFloat64.view_access(),
            Some((ViewAccess::Set, ElementType::Float64))
        );
        assert_eq!(BuiltinId::ArrayPush.view_access(), None);
    }
}
