//! Minimal JavaScript runtime model
//!
//! Values, objects, strings, the realm with its builtin binding table, and
//! the generic builtin implementations. Specialized fast paths must be
//! observationally equivalent to the generic code in this module.

pub mod buffer;
pub mod builtins;
pub mod coerce;
pub mod object;
pub mod realm;
pub mod shape;
pub mod string;
pub mod value;

pub use buffer::{ArrayBufferData, ElementType};
pub use builtins::{call_builtin, BuiltinId, Holder};
pub use object::{Object, ObjectFlags, ObjectKind, ObjectRef, Property};
pub use realm::Realm;
pub use shape::{InstanceKind, ShapeEpochs, ShapeId, ShapeTable};
pub use string::{JsString, StringRepr};
pub use value::Value;
