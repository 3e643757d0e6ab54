//! Heap objects

use super::buffer::{BufferRef, ElementType};
use super::builtins::BuiltinId;
use super::realm::Realm;
use super::shape::{InstanceKind, ShapeId};
use super::value::Value;
use crate::error::Result;
use bitflags::bitflags;
use rustc_hash::FxHashMap as HashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type ObjectRef = Rc<RefCell<Object>>;

/// Host or user function body. Receives the realm, `this` and the arguments.
pub type NativeFn = Rc<dyn Fn(&mut Realm, &Value, &[Value]) -> Result<Value>>;

bitflags! {
    /// Integrity and layout flags of an object
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObjectFlags: u8 {
        const EXTENSIBLE = 1 << 0;
        const SEALED = 1 << 1;
        const FROZEN = 1 << 2;
        /// Arrays only: `length` is writable
        const LENGTH_WRITABLE = 1 << 3;
        /// The object is installed as some object's prototype
        const IS_PROTOTYPE = 1 << 4;
    }
}

/// An own property slot
#[derive(Clone)]
pub enum Property {
    Data { value: Value, writable: bool },
    Accessor {
        getter: Option<Value>,
        setter: Option<Value>,
    },
}

impl Property {
    pub fn data(value: Value) -> Self {
        Property::Data {
            value,
            writable: true,
        }
    }

    pub fn readonly(value: Value) -> Self {
        Property::Data {
            value,
            writable: false,
        }
    }
}

#[derive(Clone)]
pub enum FunctionKind {
    /// A realm builtin, dispatched through `builtins::call_builtin`
    Builtin(BuiltinId),
    Native { name: String, func: NativeFn },
}

/// Object variants
#[derive(Clone)]
pub enum ObjectKind {
    Ordinary,
    Array(Vec<Value>),
    /// Array whose elements live in `properties`. Entered once a write would
    /// leave more than `MAX_DENSE_GAP` holes in dense storage.
    SparseArray { length: u64 },
    /// Array-like object with indexed properties and an own `length`
    Arguments,
    Function(FunctionKind),
    ArrayBuffer(BufferRef),
    TypedArray {
        buffer: BufferRef,
        element: ElementType,
        byte_offset: usize,
        length: usize,
    },
    DataView {
        buffer: BufferRef,
        byte_offset: usize,
        byte_length: usize,
    },
    Proxy {
        target: ObjectRef,
        set_trap: Option<Value>,
    },
}

pub struct Object {
    pub kind: ObjectKind,
    pub properties: HashMap<String, Property>,
    pub prototype: Option<ObjectRef>,
    pub flags: ObjectFlags,
    pub shape: ShapeId,
}

impl Object {
    pub fn new(kind: ObjectKind, shape: ShapeId, prototype: Option<ObjectRef>) -> Self {
        Object {
            kind,
            properties: HashMap::default(),
            prototype,
            flags: ObjectFlags::EXTENSIBLE | ObjectFlags::LENGTH_WRITABLE,
            shape,
        }
    }

    pub fn into_ref(self) -> ObjectRef {
        Rc::new(RefCell::new(self))
    }

    pub fn instance_kind(&self) -> InstanceKind {
        match &self.kind {
            ObjectKind::Ordinary => InstanceKind::Ordinary,
            ObjectKind::Array(_) | ObjectKind::SparseArray { .. } => InstanceKind::Array,
            ObjectKind::Arguments => InstanceKind::Arguments,
            ObjectKind::Function(_) => InstanceKind::Function,
            ObjectKind::ArrayBuffer(_) => InstanceKind::ArrayBuffer,
            ObjectKind::TypedArray { .. } => InstanceKind::TypedArray,
            ObjectKind::DataView { .. } => InstanceKind::DataView,
            ObjectKind::Proxy { .. } => InstanceKind::Proxy,
        }
    }

    pub fn is_extensible(&self) -> bool {
        self.flags.contains(ObjectFlags::EXTENSIBLE)
    }

    pub fn is_sealed(&self) -> bool {
        self.flags.intersects(ObjectFlags::SEALED | ObjectFlags::FROZEN)
    }

    pub fn is_frozen(&self) -> bool {
        self.flags.contains(ObjectFlags::FROZEN)
    }

    pub fn has_writable_length(&self) -> bool {
        self.flags.contains(ObjectFlags::LENGTH_WRITABLE)
    }

    pub fn is_prototype(&self) -> bool {
        self.flags.contains(ObjectFlags::IS_PROTOTYPE)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    pub fn array_elements(&self) -> Option<&Vec<Value>> {
        match &self.kind {
            ObjectKind::Array(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn array_elements_mut(&mut self) -> Option<&mut Vec<Value>> {
        match &mut self.kind {
            ObjectKind::Array(elements) => Some(elements),
            _ => None,
        }
    }

    /// `length` of a dense or sparse array
    pub fn array_length(&self) -> Option<u64> {
        match &self.kind {
            ObjectKind::Array(elements) => Some(elements.len() as u64),
            ObjectKind::SparseArray { length } => Some(*length),
            _ => None,
        }
    }

    pub fn own_property(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }

    /// Builtin identity of a function object
    pub fn builtin_id(&self) -> Option<BuiltinId> {
        match &self.kind {
            ObjectKind::Function(FunctionKind::Builtin(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn function_name(&self) -> Option<String> {
        match &self.kind {
            ObjectKind::Function(FunctionKind::Builtin(id)) => Some(id.js_name().to_string()),
            ObjectKind::Function(FunctionKind::Native { name, .. }) => Some(name.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("kind", &self.instance_kind())
            .field("flags", &self.flags)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Maximum array length (2^32 - 1)
pub const MAX_ARRAY_LENGTH: u64 = u32::MAX as u64;
/// Largest run of holes a dense array may grow by before it turns sparse
pub const MAX_DENSE_GAP: usize = 1024;
/// Largest length an array-like may reach (2^53 - 1)
pub const MAX_SAFE_LENGTH: u64 = (1u64 << 53) - 1;

/// Parse a canonical array index (`"0"`, `"17"`, not `"01"` or `"-1"`)
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || key.len() > 10 || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u64 = key.parse().ok()?;
    if n < MAX_ARRAY_LENGTH {
        Some(n as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_index_canonical() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("length"), None);
        assert_eq!(array_index("4294967295"), None);
        assert_eq!(array_index("4294967294"), Some(4_294_967_294));
    }

    #[test]
    fn test_flags() {
        let mut obj = Object::new(
            ObjectKind::Array(Vec::new()),
            super::super::shape::ShapeTable::new().builtin_shape(InstanceKind::Array),
            None,
        );
        assert!(obj.is_extensible());
        assert!(obj.has_writable_length());
        obj.flags.insert(ObjectFlags::SEALED);
        obj.flags.remove(ObjectFlags::EXTENSIBLE);
        assert!(obj.is_sealed());
        assert!(!obj.is_frozen());
        assert_eq!(obj.instance_kind(), InstanceKind::Array);
    }
}
