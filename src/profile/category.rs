//! Shape categories observed at call sites

use crate::runtime::object::ObjectKind;
use crate::runtime::shape::InstanceKind;
use crate::runtime::string::StringRepr;
use crate::runtime::value::{is_int32, Value};
use crate::runtime::{BuiltinId, Realm};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse operand shape recorded by the profiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeCategory {
    NullOrUndefined,
    Boolean,
    /// int32-representable number other than -0
    Int,
    Double,
    StringFlat,
    StringSliced,
    StringTree,
    BigInt,
    /// Builtin-shaped, extensible array with no indexed prototype elements
    StableArray,
    /// Array whose prototype chain may carry elements (or which is itself a prototype)
    NotStableArray1,
    /// Frozen, sealed, non-extensible or read-only-length array
    NotStableArray2,
    PlainObject,
    ArrayLike,
    TypedArray,
    DataView,
    Proxy,
    HeapObject,
}

impl ShapeCategory {
    pub const COUNT: usize = 17;

    pub const ALL: [ShapeCategory; ShapeCategory::COUNT] = [
        ShapeCategory::NullOrUndefined,
        ShapeCategory::Boolean,
        ShapeCategory::Int,
        ShapeCategory::Double,
        ShapeCategory::StringFlat,
        ShapeCategory::StringSliced,
        ShapeCategory::StringTree,
        ShapeCategory::BigInt,
        ShapeCategory::StableArray,
        ShapeCategory::NotStableArray1,
        ShapeCategory::NotStableArray2,
        ShapeCategory::PlainObject,
        ShapeCategory::ArrayLike,
        ShapeCategory::TypedArray,
        ShapeCategory::DataView,
        ShapeCategory::Proxy,
        ShapeCategory::HeapObject,
    ];

    pub const NUMBERS: &'static [ShapeCategory] = &[ShapeCategory::Int, ShapeCategory::Double];

    pub const FLAT_STRINGS: &'static [ShapeCategory] =
        &[ShapeCategory::StringFlat, ShapeCategory::StringSliced];

    /// Primitives whose ToNumber runs no user code and cannot throw
    pub const NUMBER_COERCIBLE: &'static [ShapeCategory] = &[
        ShapeCategory::NullOrUndefined,
        ShapeCategory::Boolean,
        ShapeCategory::Int,
        ShapeCategory::Double,
        ShapeCategory::StringFlat,
        ShapeCategory::StringSliced,
        ShapeCategory::StringTree,
    ];

    /// Objects whose ToNumber goes through valueOf/toString
    pub const OBJECTS: &'static [ShapeCategory] = &[
        ShapeCategory::PlainObject,
        ShapeCategory::HeapObject,
        ShapeCategory::ArrayLike,
        ShapeCategory::StableArray,
        ShapeCategory::NotStableArray1,
        ShapeCategory::NotStableArray2,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for ShapeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Classify an operand. Never runs user code.
pub fn classify(realm: &Realm, value: &Value) -> ShapeCategory {
    match value {
        Value::Undefined | Value::Null => ShapeCategory::NullOrUndefined,
        Value::Boolean(_) => ShapeCategory::Boolean,
        Value::Number(n) => {
            if is_int32(*n) && !(*n == 0.0 && n.is_sign_negative()) {
                ShapeCategory::Int
            } else {
                ShapeCategory::Double
            }
        }
        Value::BigInt(_) => ShapeCategory::BigInt,
        Value::String(s) => match s.repr() {
            StringRepr::Flat => ShapeCategory::StringFlat,
            StringRepr::Sliced => ShapeCategory::StringSliced,
            StringRepr::Tree => ShapeCategory::StringTree,
        },
        Value::Object(obj) => {
            let Ok(o) = obj.try_borrow() else {
                return ShapeCategory::HeapObject;
            };
            match &o.kind {
                ObjectKind::Array(_) => {
                    if !realm.shapes().is_builtin(o.shape, InstanceKind::Array) {
                        ShapeCategory::ArrayLike
                    } else if o.is_prototype() || !realm.array_elements_intact() {
                        ShapeCategory::NotStableArray1
                    } else if !o.is_extensible() || !o.has_writable_length() {
                        ShapeCategory::NotStableArray2
                    } else {
                        ShapeCategory::StableArray
                    }
                }
                ObjectKind::Arguments | ObjectKind::SparseArray { .. } => ShapeCategory::ArrayLike,
                ObjectKind::Ordinary => ShapeCategory::PlainObject,
                ObjectKind::TypedArray { .. } => ShapeCategory::TypedArray,
                ObjectKind::DataView { .. } => ShapeCategory::DataView,
                ObjectKind::Proxy { .. } => ShapeCategory::Proxy,
                ObjectKind::Function(_) | ObjectKind::ArrayBuffer(_) => ShapeCategory::HeapObject,
            }
        }
    }
}

/// Callee identity seen by one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservedTarget {
    Builtin(BuiltinId),
    Other,
}

pub fn classify_target(callee: &Value) -> ObservedTarget {
    callee
        .as_object()
        .and_then(|obj| obj.try_borrow().ok().and_then(|o| o.builtin_id()))
        .map(ObservedTarget::Builtin)
        .unwrap_or(ObservedTarget::Other)
}

/// Aggregated callee identity of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallTarget {
    Unseen,
    Monomorphic(BuiltinId),
    NonBuiltin,
    Polymorphic,
}

impl CallTarget {
    const UNSEEN: u32 = 0;
    const NON_BUILTIN: u32 = 1;
    const POLYMORPHIC: u32 = 2;
    const BUILTIN_BASE: u32 = 3;

    pub(crate) fn encode_observed(target: ObservedTarget) -> u32 {
        match target {
            ObservedTarget::Builtin(id) => Self::BUILTIN_BASE + id.index() as u32,
            ObservedTarget::Other => Self::NON_BUILTIN,
        }
    }

    pub(crate) fn encode(self) -> u32 {
        match self {
            CallTarget::Unseen => Self::UNSEEN,
            CallTarget::NonBuiltin => Self::NON_BUILTIN,
            CallTarget::Polymorphic => Self::POLYMORPHIC,
            CallTarget::Monomorphic(id) => Self::BUILTIN_BASE + id.index() as u32,
        }
    }

    pub(crate) fn decode(raw: u32) -> Self {
        match raw {
            Self::UNSEEN => CallTarget::Unseen,
            Self::NON_BUILTIN => CallTarget::NonBuiltin,
            Self::POLYMORPHIC => CallTarget::Polymorphic,
            n => BuiltinId::from_index((n - Self::BUILTIN_BASE) as usize)
                .map(CallTarget::Monomorphic)
                .unwrap_or(CallTarget::Polymorphic),
        }
    }

    /// Combine two aggregated targets
    pub fn merge(self, other: CallTarget) -> CallTarget {
        match (self, other) {
            (CallTarget::Unseen, t) | (t, CallTarget::Unseen) => t,
            (a, b) if a == b => a,
            _ => CallTarget::Polymorphic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_categories() {
        let realm = Realm::new();
        assert_eq!(classify(&realm, &Value::from(3)), ShapeCategory::Int);
        assert_eq!(classify(&realm, &Value::from(-0.0)), ShapeCategory::Double);
        assert_eq!(classify(&realm, &Value::from(0.5)), ShapeCategory::Double);
        assert_eq!(classify(&realm, &Value::from(3e10)), ShapeCategory::Double);
    }

    #[test]
    fn test_array_categories() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![]);
        assert_eq!(classify(&realm, &arr), ShapeCategory::StableArray);
        let frozen = realm.new_array(vec![]);
        realm.freeze(&frozen);
        assert_eq!(classify(&realm, &frozen), ShapeCategory::NotStableArray2);
        let proto = realm.new_array(vec![]);
        let obj = realm.new_object();
        realm.set_prototype_of(&obj, Some(&proto)).unwrap();
        assert_eq!(classify(&realm, &proto), ShapeCategory::NotStableArray1);
        realm.set_prototype_of(&arr, Some(&obj)).unwrap();
        assert_eq!(classify(&realm, &arr), ShapeCategory::ArrayLike);
    }

    #[test]
    fn test_string_categories() {
        let realm = Realm::new();
        let flat = crate::runtime::JsString::new("abcdefghijklmnopq");
        assert_eq!(classify(&realm, &Value::String(flat.clone())), ShapeCategory::StringFlat);
        assert_eq!(classify(&realm, &Value::String(flat.slice(1, 15))), ShapeCategory::StringSliced);
        assert_eq!(classify(&realm, &Value::String(flat.concat(&flat))), ShapeCategory::StringTree);
    }

    #[test]
    fn test_target_encoding() {
        for &id in BuiltinId::ALL {
            let t = CallTarget::Monomorphic(id);
            assert_eq!(CallTarget::decode(t.encode()), t);
        }
        assert_eq!(
            CallTarget::Monomorphic(BuiltinId::ArrayPush).merge(CallTarget::NonBuiltin),
            CallTarget::Polymorphic
        );
        assert_eq!(CallTarget::Unseen.merge(CallTarget::NonBuiltin), CallTarget::NonBuiltin);
    }
}
