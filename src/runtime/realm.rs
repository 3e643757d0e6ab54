//! The realm: intrinsics, builtin binding table, shapes and property semantics
//!
//! Builtins are ordinary data properties on their holder objects
//! (`Array.prototype.push`, `Math.fround`, ...). Replacing one is a plain
//! property write, and compiled code notices through its call-target guard.
//! The realm also owns the shape table and the "no indexed elements on any
//! prototype" detector that stable-array guards consult.

use super::buffer::{ArrayBufferData, ElementType};
use super::builtins::{self, Holder};
use super::coerce;
use super::object::{
    array_index, FunctionKind, NativeFn, Object, ObjectFlags, ObjectKind, ObjectRef, Property,
    MAX_ARRAY_LENGTH, MAX_DENSE_GAP, MAX_SAFE_LENGTH,
};
use super::shape::{InstanceKind, ShapeEpochs, ShapeTable};
use super::string::JsString;
use super::value::Value;
use crate::error::{messages, Error, Result};
use std::rc::Rc;

/// Well-known objects of a realm
pub struct Intrinsics {
    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub string_prototype: ObjectRef,
    pub array_buffer_prototype: ObjectRef,
    pub data_view_prototype: ObjectRef,
    pub typed_array_prototype: ObjectRef,
    pub math: ObjectRef,
    pub global: ObjectRef,
}

enum GetStep {
    Found(Value),
    Getter(Value),
    Next(Option<ObjectRef>),
}

enum SetStep {
    Done(bool),
    CallSetter(Value),
    Trap { trap: Value, target: ObjectRef },
    Forward(ObjectRef),
    ArrayLength,
    TypedElement(usize),
    Inherited,
}

pub struct Realm {
    shapes: ShapeTable,
    intrinsics: Intrinsics,
    array_elements_intact: bool,
    output: Vec<String>,
    echo: bool,
}

impl Realm {
    pub fn new() -> Self {
        let shapes = ShapeTable::new();
        let ordinary = shapes.builtin_shape(InstanceKind::Ordinary);
        let prototype = |proto: Option<&ObjectRef>| {
            let mut obj = Object::new(ObjectKind::Ordinary, ordinary, proto.cloned());
            obj.flags.insert(ObjectFlags::IS_PROTOTYPE);
            obj.into_ref()
        };
        let object_prototype = prototype(None);
        let intrinsics = Intrinsics {
            function_prototype: prototype(Some(&object_prototype)),
            array_prototype: prototype(Some(&object_prototype)),
            string_prototype: prototype(Some(&object_prototype)),
            array_buffer_prototype: prototype(Some(&object_prototype)),
            data_view_prototype: prototype(Some(&object_prototype)),
            typed_array_prototype: prototype(Some(&object_prototype)),
            math: Object::new(ObjectKind::Ordinary, ordinary, Some(object_prototype.clone())).into_ref(),
            global: Object::new(ObjectKind::Ordinary, ordinary, Some(object_prototype.clone())).into_ref(),
            object_prototype,
        };
        let mut realm = Realm {
            shapes,
            intrinsics,
            array_elements_intact: true,
            output: Vec::new(),
            echo: false,
        };
        builtins::install(&mut realm);
        realm
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    // ==================== Introspection ====================

    pub fn shapes(&self) -> &ShapeTable {
        &self.shapes
    }

    pub fn shape_epochs(&self) -> ShapeEpochs {
        self.shapes.epochs()
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// No indexed property was ever defined on an object used as a prototype
    pub fn array_elements_intact(&self) -> bool {
        self.array_elements_intact
    }

    pub fn holder(&self, holder: Holder) -> ObjectRef {
        let i = &self.intrinsics;
        match holder {
            Holder::ArrayPrototype => i.array_prototype.clone(),
            Holder::StringPrototype => i.string_prototype.clone(),
            Holder::DataViewPrototype => i.data_view_prototype.clone(),
            Holder::TypedArrayPrototype => i.typed_array_prototype.clone(),
            Holder::Math => i.math.clone(),
            Holder::Global => i.global.clone(),
            Holder::BigIntConstructor | Holder::StringConstructor => {
                let name = if holder == Holder::BigIntConstructor { "BigInt" } else { "String" };
                match i.global.borrow().own_property(name) {
                    Some(Property::Data { value: Value::Object(obj), .. }) => obj.clone(),
                    _ => i.global.clone(),
                }
            }
        }
    }

    // ==================== Output ====================

    pub fn print(&mut self, line: impl Into<String>) {
        let line = line.into();
        if self.echo {
            println!("{}", line);
        }
        self.output.push(line);
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    // ==================== Allocation ====================

    fn alloc(&self, kind: ObjectKind, prototype: &ObjectRef) -> ObjectRef {
        let mut obj = Object::new(kind, self.shapes.builtin_shape(InstanceKind::Ordinary), Some(prototype.clone()));
        obj.shape = self.shapes.builtin_shape(obj.instance_kind());
        obj.into_ref()
    }

    pub fn new_object(&self) -> Value {
        Value::Object(self.alloc(ObjectKind::Ordinary, &self.intrinsics.object_prototype))
    }

    pub fn new_array(&self, elements: Vec<Value>) -> Value {
        Value::Object(self.alloc(ObjectKind::Array(elements), &self.intrinsics.array_prototype))
    }

    /// Array-like `arguments` object with indexed properties and a writable `length`
    pub fn new_arguments(&self, elements: Vec<Value>) -> Value {
        let obj = self.alloc(ObjectKind::Arguments, &self.intrinsics.object_prototype);
        {
            let mut o = obj.borrow_mut();
            let len = elements.len();
            for (i, value) in elements.into_iter().enumerate() {
                o.properties.insert(i.to_string(), Property::data(value));
            }
            o.properties.insert("length".to_string(), Property::data(Value::Number(len as f64)));
        }
        Value::Object(obj)
    }

    pub fn new_function(
        &self,
        name: &str,
        func: impl Fn(&mut Realm, &Value, &[Value]) -> Result<Value> + 'static,
    ) -> Value {
        let native: NativeFn = Rc::new(func);
        Value::Object(self.alloc(
            ObjectKind::Function(FunctionKind::Native {
                name: name.to_string(),
                func: native,
            }),
            &self.intrinsics.function_prototype,
        ))
    }

    pub(crate) fn new_builtin_function(&self, id: builtins::BuiltinId) -> ObjectRef {
        self.alloc(ObjectKind::Function(FunctionKind::Builtin(id)), &self.intrinsics.function_prototype)
    }

    pub fn new_array_buffer(&self, byte_length: usize) -> Value {
        Value::Object(self.alloc(
            ObjectKind::ArrayBuffer(ArrayBufferData::new_ref(byte_length)),
            &self.intrinsics.array_buffer_prototype,
        ))
    }

    /// `new DataView(buffer, byteOffset, byteLength)`
    pub fn new_data_view(&self, buffer: &Value, byte_offset: usize, byte_length: Option<usize>) -> Result<Value> {
        let store = match buffer.as_object().map(|o| o.borrow().kind.clone()) {
            Some(ObjectKind::ArrayBuffer(store)) => store,
            _ => return Err(Error::type_error("First argument to DataView constructor must be an ArrayBuffer")),
        };
        let available = store.borrow().byte_length();
        if store.borrow().is_detached() {
            return Err(Error::type_error(messages::detached_buffer("DataView")));
        }
        if byte_offset > available {
            return Err(Error::range_error(format!("Start offset {} is outside the bounds of the buffer", byte_offset)));
        }
        let byte_length = byte_length.unwrap_or(available - byte_offset);
        if byte_offset + byte_length > available {
            return Err(Error::range_error(format!("Invalid DataView length {}", byte_length)));
        }
        Ok(Value::Object(self.alloc(
            ObjectKind::DataView {
                buffer: store,
                byte_offset,
                byte_length,
            },
            &self.intrinsics.data_view_prototype,
        )))
    }

    /// A typed array over a fresh buffer
    pub fn new_typed_array(&self, element: ElementType, length: usize) -> Value {
        let buffer = ArrayBufferData::new_ref(length * element.size());
        Value::Object(self.alloc(
            ObjectKind::TypedArray {
                buffer,
                element,
                byte_offset: 0,
                length,
            },
            &self.intrinsics.typed_array_prototype,
        ))
    }

    /// `new Proxy(target, { set })`
    pub fn new_proxy(&self, target: &Value, set_trap: Option<Value>) -> Result<Value> {
        let target = target
            .as_object()
            .cloned()
            .ok_or_else(|| Error::type_error("Cannot create proxy with a non-object as target or handler"))?;
        let proto = target.borrow().prototype.clone();
        let obj = self.alloc(ObjectKind::Proxy { target, set_trap }, &self.intrinsics.object_prototype);
        obj.borrow_mut().prototype = proto;
        Ok(Value::Object(obj))
    }

    // ==================== Globals ====================

    pub fn global(&mut self, name: &str) -> Result<Value> {
        let has = self.intrinsics.global.borrow().properties.contains_key(name);
        if !has {
            return Err(Error::reference_error(messages::not_defined(name)));
        }
        let global = self.intrinsics.global.clone();
        self.get_property(&global, name, &Value::Object(global.clone()))
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.intrinsics
            .global
            .borrow_mut()
            .properties
            .insert(name.to_string(), Property::data(value));
    }

    // ==================== Property access ====================

    /// `value[key]`
    pub fn get(&mut self, value: &Value, key: &str) -> Result<Value> {
        match value {
            Value::Object(obj) => self.get_property(obj, key, value),
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.len() as f64));
                }
                if let Some(index) = array_index(key) {
                    if let Some(unit) = s.code_unit_at(index) {
                        return Ok(Value::String(JsString::from_code_units(vec![unit])));
                    }
                }
                let proto = self.intrinsics.string_prototype.clone();
                self.get_property(&proto, key, value)
            }
            Value::Undefined | Value::Null => Err(Error::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                value.display(),
                key
            ))),
            _ => {
                let proto = self.intrinsics.object_prototype.clone();
                self.get_property(&proto, key, value)
            }
        }
    }

    /// [[Get]] along the prototype chain; getters run with `receiver`
    pub fn get_property(&mut self, obj: &ObjectRef, key: &str, receiver: &Value) -> Result<Value> {
        let mut current = obj.clone();
        loop {
            let step = {
                let o = current.borrow();
                Self::own_get_step(&o, key)
            };
            match step {
                GetStep::Found(value) => return Ok(value),
                GetStep::Getter(getter) => return self.call_function(&getter, receiver, &[]),
                GetStep::Next(Some(next)) => current = next,
                GetStep::Next(None) => return Ok(Value::Undefined),
            }
        }
    }

    fn own_get_step(o: &Object, key: &str) -> GetStep {
        match &o.kind {
            ObjectKind::Array(elements) => {
                if key == "length" {
                    return GetStep::Found(Value::Number(elements.len() as f64));
                }
                if let Some(index) = array_index(key) {
                    if let Some(value) = elements.get(index) {
                        return GetStep::Found(value.clone());
                    }
                }
            }
            ObjectKind::SparseArray { length } => {
                if key == "length" {
                    return GetStep::Found(Value::Number(*length as f64));
                }
            }
            ObjectKind::TypedArray {
                buffer,
                element,
                byte_offset,
                length,
            } => {
                let store = buffer.borrow();
                let length = if store.is_detached() { 0 } else { *length };
                if key == "length" {
                    return GetStep::Found(Value::Number(length as f64));
                }
                if let Some(index) = array_index(key) {
                    if index >= length {
                        return GetStep::Found(Value::Undefined);
                    }
                    let start = byte_offset + index * element.size();
                    return GetStep::Found(Value::Number(element.read(&store.bytes()[start..], true)));
                }
            }
            ObjectKind::DataView {
                buffer, byte_length, ..
            } => {
                if key == "byteLength" {
                    let len = if buffer.borrow().is_detached() { 0 } else { *byte_length };
                    return GetStep::Found(Value::Number(len as f64));
                }
            }
            ObjectKind::ArrayBuffer(buffer) => {
                if key == "byteLength" {
                    return GetStep::Found(Value::Number(buffer.borrow().byte_length() as f64));
                }
            }
            ObjectKind::Proxy { target, .. } => return GetStep::Next(Some(target.clone())),
            _ => {}
        }
        match o.own_property(key) {
            Some(Property::Data { value, .. }) => GetStep::Found(value.clone()),
            Some(Property::Accessor { getter: Some(g), .. }) => GetStep::Getter(g.clone()),
            Some(Property::Accessor { getter: None, .. }) => GetStep::Found(Value::Undefined),
            None => GetStep::Next(o.prototype.clone()),
        }
    }

    pub fn has_own_property(&self, obj: &ObjectRef, key: &str) -> bool {
        let o = obj.borrow();
        match &o.kind {
            ObjectKind::Array(elements) => {
                if key == "length" {
                    return true;
                }
                if let Some(index) = array_index(key) {
                    return index < elements.len();
                }
            }
            ObjectKind::SparseArray { .. } if key == "length" => return true,
            ObjectKind::TypedArray { length, .. } => {
                if let Some(index) = array_index(key) {
                    return index < *length;
                }
            }
            _ => {}
        }
        o.properties.contains_key(key)
    }

    /// Strict-mode `value[key] = v`: a rejected write is a TypeError
    pub fn set(&mut self, target: &Value, key: &str, value: Value) -> Result<()> {
        let obj = match target {
            Value::Object(obj) => obj.clone(),
            Value::Undefined | Value::Null => {
                return Err(Error::type_error(format!(
                    "Cannot set properties of {} (setting '{}')",
                    target.display(),
                    key
                )))
            }
            // Writes to primitives land on a discarded wrapper
            _ => return Ok(()),
        };
        if self.set_property(&obj, key, value, target)? {
            Ok(())
        } else if key == "length" || self.has_own_property(&obj, key) {
            Err(Error::type_error(messages::read_only(key)))
        } else {
            Err(Error::type_error(messages::not_extensible(key)))
        }
    }

    /// [[Set]]; returns false when the write is rejected
    pub fn set_property(&mut self, obj: &ObjectRef, key: &str, value: Value, receiver: &Value) -> Result<bool> {
        let step = {
            let o = obj.borrow();
            Self::own_set_step(&o, key)
        };
        match step {
            SetStep::Done(ok) => {
                if ok {
                    self.write_own(obj, key, value)?;
                }
                Ok(ok)
            }
            SetStep::CallSetter(setter) => {
                self.call_function(&setter, receiver, &[value])?;
                Ok(true)
            }
            SetStep::Trap { trap, target } => {
                let args = [Value::Object(target), Value::from(key), value];
                Ok(self.call_function(&trap, &Value::Undefined, &args)?.to_boolean())
            }
            SetStep::Forward(target) => {
                let receiver = Value::Object(target.clone());
                self.set_property(&target, key, value, &receiver)
            }
            SetStep::ArrayLength => self.set_array_length(obj, value),
            SetStep::TypedElement(index) => {
                let number = coerce::to_number(self, &value)?;
                let o = obj.borrow();
                if let ObjectKind::TypedArray {
                    buffer,
                    element,
                    byte_offset,
                    length,
                } = &o.kind
                {
                    let mut store = buffer.borrow_mut();
                    if !store.is_detached() && index < *length {
                        let start = byte_offset + index * element.size();
                        element.write(&mut store.bytes_mut()[start..], number, true);
                    }
                }
                Ok(true)
            }
            SetStep::Inherited => {
                let proto = obj.borrow().prototype.clone();
                match self.find_inherited(proto, key) {
                    Some(Property::Accessor { setter: Some(s), .. }) => {
                        self.call_function(&s, receiver, &[value])?;
                        Ok(true)
                    }
                    Some(Property::Accessor { setter: None, .. }) => Ok(false),
                    Some(Property::Data { writable: false, .. }) => Ok(false),
                    _ => {
                        let accepts = {
                            let o = obj.borrow();
                            o.is_extensible()
                                && match (array_index(key), o.array_length()) {
                                    (Some(index), Some(length)) => {
                                        (index as u64) < length || o.has_writable_length()
                                    }
                                    _ => true,
                                }
                        };
                        if accepts {
                            self.write_own(obj, key, value)?;
                        }
                        Ok(accepts)
                    }
                }
            }
        }
    }

    fn own_set_step(o: &Object, key: &str) -> SetStep {
        match &o.kind {
            ObjectKind::Proxy { target, set_trap } => {
                return match set_trap {
                    Some(trap) => SetStep::Trap {
                        trap: trap.clone(),
                        target: target.clone(),
                    },
                    None => SetStep::Forward(target.clone()),
                }
            }
            ObjectKind::Array(elements) => {
                if key == "length" {
                    return SetStep::ArrayLength;
                }
                if let Some(index) = array_index(key) {
                    if index < elements.len() {
                        return SetStep::Done(!o.is_frozen());
                    }
                    return SetStep::Inherited;
                }
            }
            ObjectKind::SparseArray { .. } if key == "length" => return SetStep::ArrayLength,
            ObjectKind::TypedArray { .. } => {
                if key == "length" {
                    return SetStep::Done(false);
                }
                if let Some(index) = array_index(key) {
                    return SetStep::TypedElement(index);
                }
            }
            _ => {}
        }
        match o.own_property(key) {
            Some(Property::Data { writable, .. }) => SetStep::Done(*writable && !o.is_frozen()),
            Some(Property::Accessor { setter: Some(s), .. }) => SetStep::CallSetter(s.clone()),
            Some(Property::Accessor { setter: None, .. }) => SetStep::Done(false),
            None => SetStep::Inherited,
        }
    }

    fn find_inherited(&self, mut current: Option<ObjectRef>, key: &str) -> Option<Property> {
        while let Some(obj) = current {
            let o = obj.borrow();
            if let Some(prop) = o.own_property(key) {
                return Some(prop.clone());
            }
            if let ObjectKind::Array(elements) = &o.kind {
                if let Some(index) = array_index(key) {
                    if let Some(value) = elements.get(index) {
                        return Some(if o.is_frozen() {
                            Property::readonly(value.clone())
                        } else {
                            Property::data(value.clone())
                        });
                    }
                }
            }
            current = o.prototype.clone();
        }
        None
    }

    /// Store `value` as an own data property (accepted writes only)
    fn write_own(&mut self, obj: &ObjectRef, key: &str, value: Value) -> Result<()> {
        let index = array_index(key);
        if let Some(index) = index {
            self.note_indexed_write(obj);
            let too_sparse = obj
                .borrow()
                .array_elements()
                .map(|e| index > e.len() + MAX_DENSE_GAP)
                .unwrap_or(false);
            if too_sparse {
                self.make_sparse(obj);
            }
        }
        let mut o = obj.borrow_mut();
        if let (Some(index), Some(elements)) = (index, o.array_elements_mut()) {
            if index >= elements.len() {
                elements.resize(index, Value::Undefined);
                elements.push(value);
            } else {
                elements[index] = value;
            }
            return Ok(());
        }
        if let (Some(index), ObjectKind::SparseArray { length }) = (index, &mut o.kind) {
            *length = (*length).max(index as u64 + 1);
        }
        match o.properties.get_mut(key) {
            Some(Property::Data { value: slot, .. }) => *slot = value,
            _ => {
                o.properties.insert(key.to_string(), Property::data(value));
            }
        }
        Ok(())
    }

    fn set_array_length(&mut self, obj: &ObjectRef, value: Value) -> Result<bool> {
        let number = coerce::to_number(self, &value)?;
        if !(number >= 0.0 && number.fract() == 0.0 && number <= MAX_ARRAY_LENGTH as f64) {
            return Err(Error::range_error(messages::INVALID_ARRAY_LENGTH));
        }
        let new_len = number as u64;
        let too_sparse = {
            let o = obj.borrow();
            if !o.has_writable_length() {
                return Ok(false);
            }
            o.array_elements()
                .map(|e| new_len > (e.len() + MAX_DENSE_GAP) as u64)
                .unwrap_or(false)
        };
        if too_sparse {
            self.make_sparse(obj);
        }
        let mut guard = obj.borrow_mut();
        let o = &mut *guard;
        let sealed = o.is_sealed();
        match &mut o.kind {
            ObjectKind::Array(elements) => {
                if new_len < elements.len() as u64 && sealed {
                    return Ok(false);
                }
                elements.resize(new_len as usize, Value::Undefined);
            }
            ObjectKind::SparseArray { length } => {
                if new_len < *length && sealed {
                    return Ok(false);
                }
                *length = new_len;
                o.properties
                    .retain(|k, _| array_index(k).map_or(true, |i| (i as u64) < new_len));
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Move a dense array's elements into `properties`. The array leaves
    /// its builtin shape, so stable-array guards stop matching it.
    fn make_sparse(&mut self, obj: &ObjectRef) {
        let mut o = obj.borrow_mut();
        let elements = match &mut o.kind {
            ObjectKind::Array(elements) => std::mem::take(elements),
            _ => return,
        };
        tracing::debug!(length = elements.len(), "array storage turned sparse");
        let frozen = o.is_frozen();
        o.kind = ObjectKind::SparseArray {
            length: elements.len() as u64,
        };
        for (i, value) in elements.into_iter().enumerate() {
            let prop = if frozen { Property::readonly(value) } else { Property::data(value) };
            o.properties.insert(i.to_string(), prop);
        }
        o.shape = self.shapes.transition(o.shape);
    }

    /// Any prototype may sit on some array's chain, so an indexed property
    /// on one trips the detector for good
    fn note_indexed_write(&mut self, obj: &ObjectRef) {
        if self.array_elements_intact && obj.borrow().is_prototype() {
            tracing::debug!("indexed element stored on a prototype");
            self.array_elements_intact = false;
        }
    }

    /// [[Delete]]; returns false when the property is non-configurable
    pub fn delete_property(&mut self, obj: &ObjectRef, key: &str) -> bool {
        let mut o = obj.borrow_mut();
        let sealed = o.is_sealed();
        if let Some(elements) = o.array_elements_mut() {
            if key == "length" {
                return false;
            }
            if let Some(index) = array_index(key) {
                if index >= elements.len() {
                    return true;
                }
                if sealed {
                    return false;
                }
                if index + 1 == elements.len() {
                    elements.pop();
                } else {
                    elements[index] = Value::Undefined;
                }
                return true;
            }
        }
        if key == "length" && matches!(o.kind, ObjectKind::SparseArray { .. }) {
            return false;
        }
        if !o.properties.contains_key(key) {
            return true;
        }
        if sealed {
            return false;
        }
        o.properties.remove(key);
        true
    }

    /// `Object.defineProperty(target, key, { get, set })`
    pub fn define_accessor(
        &mut self,
        target: &Value,
        key: &str,
        getter: Option<Value>,
        setter: Option<Value>,
    ) -> Result<()> {
        let obj = target
            .as_object()
            .cloned()
            .ok_or_else(|| Error::type_error("Object.defineProperty called on non-object"))?;
        {
            let o = obj.borrow();
            if !o.is_extensible() && !o.properties.contains_key(key) {
                return Err(Error::type_error(messages::not_extensible(key)));
            }
        }
        if array_index(key).is_some() {
            self.note_indexed_write(&obj);
        }
        if Rc::ptr_eq(&obj, &self.intrinsics.array_prototype) {
            self.shapes.bump_generation(InstanceKind::Array);
        }
        obj.borrow_mut()
            .properties
            .insert(key.to_string(), Property::Accessor { getter, setter });
        Ok(())
    }

    /// `Object.defineProperty(arr, "length", { writable: false })`
    pub fn define_readonly_length(&mut self, target: &Value) -> Result<()> {
        let obj = target
            .as_object()
            .ok_or_else(|| Error::type_error("Object.defineProperty called on non-object"))?;
        let mut o = obj.borrow_mut();
        o.flags.remove(ObjectFlags::LENGTH_WRITABLE);
        if let Some(Property::Data { writable, .. }) = o.properties.get_mut("length") {
            *writable = false;
        }
        Ok(())
    }

    // ==================== Integrity ====================

    /// `Object.freeze`
    pub fn freeze(&mut self, target: &Value) {
        if let Some(obj) = target.as_object() {
            let mut o = obj.borrow_mut();
            o.flags.insert(ObjectFlags::FROZEN | ObjectFlags::SEALED);
            o.flags.remove(ObjectFlags::EXTENSIBLE | ObjectFlags::LENGTH_WRITABLE);
            for prop in o.properties.values_mut() {
                if let Property::Data { writable, .. } = prop {
                    *writable = false;
                }
            }
        }
    }

    /// `Object.seal`
    pub fn seal(&mut self, target: &Value) {
        if let Some(obj) = target.as_object() {
            let mut o = obj.borrow_mut();
            o.flags.insert(ObjectFlags::SEALED);
            o.flags.remove(ObjectFlags::EXTENSIBLE);
        }
    }

    /// `Object.preventExtensions`
    pub fn prevent_extensions(&mut self, target: &Value) {
        if let Some(obj) = target.as_object() {
            obj.borrow_mut().flags.remove(ObjectFlags::EXTENSIBLE);
        }
    }

    /// `Object.setPrototypeOf`. The object leaves its builtin shape.
    pub fn set_prototype_of(&mut self, target: &Value, proto: Option<&Value>) -> Result<()> {
        let obj = target
            .as_object()
            .cloned()
            .ok_or_else(|| Error::type_error("Object.setPrototypeOf called on non-object"))?;
        let proto = match proto {
            Some(Value::Object(p)) => Some(p.clone()),
            None | Some(Value::Null) => None,
            Some(_) => return Err(Error::type_error("Object prototype may only be an Object or null")),
        };
        if !obj.borrow().is_extensible() {
            return Err(Error::type_error("#<Object> is not extensible"));
        }
        if let Some(p) = &proto {
            let mut current = Some(p.clone());
            while let Some(link) = current {
                if Rc::ptr_eq(&link, &obj) {
                    return Err(Error::type_error("Cyclic __proto__ value"));
                }
                current = link.borrow().prototype.clone();
            }
            p.borrow_mut().flags.insert(ObjectFlags::IS_PROTOTYPE);
            if obj.borrow().is_prototype() && Self::chain_has_elements(p) {
                tracing::debug!("prototype with indexed elements linked into a prototype chain");
                self.array_elements_intact = false;
            }
        }
        if Rc::ptr_eq(&obj, &self.intrinsics.array_prototype) {
            self.shapes.bump_generation(InstanceKind::Array);
        }
        let mut o = obj.borrow_mut();
        o.shape = self.shapes.transition(o.shape);
        o.prototype = proto;
        Ok(())
    }

    fn chain_has_elements(start: &ObjectRef) -> bool {
        let mut current = Some(start.clone());
        while let Some(obj) = current {
            let o = obj.borrow();
            let dense = o.array_elements().map(|e| !e.is_empty()).unwrap_or(false);
            if dense || o.properties.keys().any(|k| array_index(k).is_some()) {
                return true;
            }
            current = o.prototype.clone();
        }
        false
    }

    /// Detach the ArrayBuffer behind a buffer, DataView or typed array
    pub fn detach_buffer(&mut self, target: &Value) -> Result<()> {
        let store = match target.as_object().map(|o| o.borrow().kind.clone()) {
            Some(ObjectKind::ArrayBuffer(b))
            | Some(ObjectKind::DataView { buffer: b, .. })
            | Some(ObjectKind::TypedArray { buffer: b, .. }) => b,
            _ => return Err(Error::type_error("not an ArrayBuffer")),
        };
        store.borrow_mut().detach();
        Ok(())
    }

    // ==================== Calls ====================

    /// Call `callee` with `this` and `args` through dynamic dispatch
    pub fn call_function(&mut self, callee: &Value, this: &Value, args: &[Value]) -> Result<Value> {
        let kind = match callee {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Function(kind) => Some(kind.clone()),
                _ => None,
            },
            _ => None,
        };
        match kind {
            Some(FunctionKind::Builtin(id)) => builtins::call_builtin(self, id, this, args),
            Some(FunctionKind::Native { func, .. }) => func(self, this, args),
            None => Err(Error::type_error(messages::not_a_function(&callee.display()))),
        }
    }

    /// LengthOfArrayLike: ToLength(Get(obj, "length"))
    pub fn length_of_array_like(&mut self, target: &Value) -> Result<u64> {
        let len = self.get(target, "length")?;
        let n = coerce::to_integer_or_infinity(self, &len)?;
        Ok(n.clamp(0.0, MAX_SAFE_LENGTH as f64) as u64)
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_array_get_set() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![Value::from(1), Value::from(2)]);
        assert_eq!(realm.get(&arr, "length").unwrap(), Value::from(2));
        realm.set(&arr, "4", Value::from("x")).unwrap();
        assert_eq!(realm.get(&arr, "length").unwrap(), Value::from(5));
        assert_eq!(realm.get(&arr, "3").unwrap(), Value::Undefined);
        assert_eq!(realm.get(&arr, "4").unwrap(), Value::from("x"));
    }

    #[test]
    fn test_frozen_array_rejects_writes() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![Value::from(1)]);
        realm.freeze(&arr);
        let err = realm.set(&arr, "0", Value::from(2)).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
        let err = realm.set(&arr, "1", Value::from(2)).unwrap_err();
        assert!(err.to_string().contains("not extensible"));
    }

    #[test]
    fn test_readonly_length_blocks_append() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![]);
        realm.define_readonly_length(&arr).unwrap();
        let err = realm.set(&arr, "length", Value::from(3)).unwrap_err();
        assert!(err.to_string().contains("read only property 'length'"));
    }

    #[test]
    fn test_indexed_prototype_write_trips_detector() {
        let mut realm = Realm::new();
        assert!(realm.array_elements_intact());
        let proto = Value::Object(realm.intrinsics().array_prototype.clone());
        realm.set(&proto, "0", Value::from(1)).unwrap();
        assert!(!realm.array_elements_intact());
    }

    #[test]
    fn test_indexed_accessor_on_inserted_prototype_trips_detector() {
        let mut realm = Realm::new();
        let holder = realm.new_object();
        let proto = Value::Object(realm.intrinsics().array_prototype.clone());
        realm.set_prototype_of(&proto, Some(&holder)).unwrap();
        assert!(realm.array_elements_intact());
        let setter = realm.new_function("set", |_, _, _| Ok(Value::Undefined));
        realm.define_accessor(&holder, "3", None, Some(setter)).unwrap();
        assert!(!realm.array_elements_intact());
    }

    #[test]
    fn test_linking_prototype_with_inherited_elements_trips_detector() {
        let mut realm = Realm::new();
        let outer = realm.new_object();
        let inner = realm.new_array(vec![Value::from(1)]);
        realm.set_prototype_of(&outer, Some(&inner)).unwrap();
        assert!(realm.array_elements_intact());
        let proto = Value::Object(realm.intrinsics().array_prototype.clone());
        realm.set_prototype_of(&proto, Some(&outer)).unwrap();
        assert!(!realm.array_elements_intact());
    }

    #[test]
    fn test_cyclic_prototype_rejected() {
        let mut realm = Realm::new();
        let a = realm.new_object();
        let b = realm.new_object();
        realm.set_prototype_of(&a, Some(&b)).unwrap();
        let err = realm.set_prototype_of(&b, Some(&a)).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
    }

    #[test]
    fn test_huge_length_turns_array_sparse() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![Value::from(1), Value::from(2)]);
        let shape = arr.as_object().unwrap().borrow().shape;
        realm.set(&arr, "length", Value::from(4294967295.0)).unwrap();
        assert_eq!(realm.get(&arr, "length").unwrap(), Value::from(4294967295.0));
        assert_eq!(realm.get(&arr, "1").unwrap(), Value::from(2));
        assert_eq!(realm.get(&arr, "7").unwrap(), Value::Undefined);
        assert_ne!(arr.as_object().unwrap().borrow().shape, shape);

        realm.set(&arr, "length", Value::from(1)).unwrap();
        assert_eq!(realm.get(&arr, "1").unwrap(), Value::Undefined);
        assert_eq!(realm.get(&arr, "0").unwrap(), Value::from(1));
        assert_eq!(arr.display(), "1");
    }

    #[test]
    fn test_far_index_write_turns_array_sparse() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![]);
        realm.set(&arr, "4000000000", Value::from("x")).unwrap();
        assert_eq!(realm.get(&arr, "length").unwrap(), Value::from(4000000001.0));
        assert_eq!(realm.get(&arr, "4000000000").unwrap(), Value::from("x"));
        assert!(arr.as_object().unwrap().borrow().array_elements().is_none());
    }

    #[test]
    fn test_prototype_swap_transitions_shape() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![]);
        let before = arr.as_object().unwrap().borrow().shape;
        let proto = realm.new_object();
        realm.set_prototype_of(&arr, Some(&proto)).unwrap();
        let after = arr.as_object().unwrap().borrow().shape;
        assert_ne!(before, after);
        assert!(proto.as_object().unwrap().borrow().is_prototype());
    }

    #[test]
    fn test_accessor_on_array_prototype_bumps_generation() {
        let mut realm = Realm::new();
        let gen = realm.shapes().generation(InstanceKind::Array);
        let proto = Value::Object(realm.intrinsics().array_prototype.clone());
        let getter = realm.new_function("get", |_, _, _| Ok(Value::from(7)));
        realm.define_accessor(&proto, "extra", Some(getter), None).unwrap();
        assert_eq!(realm.shapes().generation(InstanceKind::Array), gen + 1);
        let arr = realm.new_array(vec![]);
        assert_eq!(realm.get(&arr, "extra").unwrap(), Value::from(7));
    }

    #[test]
    fn test_proxy_set_trap() {
        let mut realm = Realm::new();
        let target = realm.new_object();
        let trap = realm.new_function("set", |realm, _, args| {
            realm.print(format!("trap {}", args[1].display()));
            Ok(Value::Boolean(true))
        });
        let proxy = realm.new_proxy(&target, Some(trap)).unwrap();
        realm.set(&proxy, "x", Value::from(1)).unwrap();
        assert_eq!(realm.output(), &["trap x".to_string()]);
    }

    #[test]
    fn test_call_non_function() {
        let mut realm = Realm::new();
        let err = realm
            .call_function(&Value::from(3), &Value::Undefined, &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "TypeError: 3 is not a function");
    }

    #[test]
    fn test_unknown_global() {
        let mut realm = Realm::new();
        let err = realm.global("Nope").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ReferenceError));
        assert!(realm.global("Math").is_ok());
    }
}
