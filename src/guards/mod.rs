//! Guard Condition Library
//!
//! Guards are the runtime predicates protecting a speculative fast path.
//! Each one inspects a single operand of the call (callee, receiver or an
//! argument), never runs user code, and names the `DeoptType` reported when
//! it fails. Guards are plain data so compiled plans can move between
//! compiler worker threads.

pub mod deopt_type;

pub use deopt_type::DeoptType;

use crate::runtime::object::{Object, ObjectKind, MAX_ARRAY_LENGTH};
use crate::runtime::shape::InstanceKind;
use crate::runtime::{BuiltinId, Realm, Value};
use std::fmt;

// ==================== Operands ====================

/// Operand a guard inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Callee,
    Receiver,
    Arg(u8),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Callee => write!(f, "callee"),
            Operand::Receiver => write!(f, "receiver"),
            Operand::Arg(i) => write!(f, "arg{}", i),
        }
    }
}

/// Values visible to guards at one call
#[derive(Clone, Copy)]
pub struct GuardContext<'a> {
    pub realm: &'a Realm,
    pub callee: &'a Value,
    pub receiver: &'a Value,
    pub args: &'a [Value],
}

impl<'a> GuardContext<'a> {
    pub fn new(realm: &'a Realm, callee: &'a Value, receiver: &'a Value, args: &'a [Value]) -> Self {
        GuardContext {
            realm,
            callee,
            receiver,
            args,
        }
    }

    /// The operand's value; `None` for a missing argument
    pub fn operand(&self, operand: Operand) -> Option<&'a Value> {
        match operand {
            Operand::Callee => Some(self.callee),
            Operand::Receiver => Some(self.receiver),
            Operand::Arg(i) => self.args.get(i as usize),
        }
    }
}

// ==================== Cost & Failure ====================

/// Relative cost of evaluating a guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CostClass {
    /// A tag or field comparison
    Cheap = 1,
    /// Touches a second heap object or does arithmetic
    Moderate = 2,
}

impl CostClass {
    pub fn units(self) -> u32 {
        self as u32
    }
}

/// What happens when a guard fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    DeoptimizeToGeneric,
}

// ==================== Guard Checks ====================

/// Predicate kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardCheck {
    /// Callee is the realm's builtin function object for this id
    CallTarget(BuiltinId),
    IsHeapObject,
    /// Object still has the builtin shape of its kind
    BuiltinInstance(InstanceKind),
    /// Builtin shape generation matches the one captured at compile time
    ShapeGeneration(InstanceKind, u32),
    /// Array is not a prototype and no prototype carries indexed elements
    NotPrototypeAliased,
    /// Object is extensible, so neither sealed nor frozen
    Extensible,
    WritableLength,
    /// Appending every argument keeps the array length representable
    LengthHeadroom,
    IsNumber,
    IsInt,
    IsIntOrUndefined,
    IsString,
    IsNotTreeString,
    IsBigInt,
    IndexIsInt,
    IndexNonNegative,
    /// Backing buffer of a view or typed array is attached
    BufferAttached,
    /// Access of `width` bytes at argument `index_arg` stays inside the view
    ViewHasRoom { width: u8, index_arg: u8 },
    /// Integer bit count no larger than `max`
    BitsInRange(u8),
    /// Primitive whose conversion runs no user code
    IsPrimitive,
    ArgCount(u8),
}

impl GuardCheck {
    pub fn name(&self) -> &'static str {
        match self {
            GuardCheck::CallTarget(_) => "CallTarget",
            GuardCheck::IsHeapObject => "IsHeapObject",
            GuardCheck::BuiltinInstance(_) => "BuiltinInstance",
            GuardCheck::ShapeGeneration(..) => "ShapeGeneration",
            GuardCheck::NotPrototypeAliased => "NotPrototypeAliased",
            GuardCheck::Extensible => "Extensible",
            GuardCheck::WritableLength => "WritableLength",
            GuardCheck::LengthHeadroom => "LengthHeadroom",
            GuardCheck::IsNumber => "IsNumber",
            GuardCheck::IsInt => "IsInt",
            GuardCheck::IsIntOrUndefined => "IsIntOrUndefined",
            GuardCheck::IsString => "IsString",
            GuardCheck::IsNotTreeString => "IsNotTreeString",
            GuardCheck::IsBigInt => "IsBigInt",
            GuardCheck::IndexIsInt => "IndexIsInt",
            GuardCheck::IndexNonNegative => "IndexNonNegative",
            GuardCheck::BufferAttached => "BufferAttached",
            GuardCheck::ViewHasRoom { .. } => "ViewHasRoom",
            GuardCheck::BitsInRange(_) => "BitsInRange",
            GuardCheck::IsPrimitive => "IsPrimitive",
            GuardCheck::ArgCount(_) => "ArgCount",
        }
    }

    pub fn deopt_type(&self) -> DeoptType {
        match self {
            GuardCheck::CallTarget(_) => DeoptType::NotCallTarget1,
            GuardCheck::IsHeapObject => DeoptType::NotHeapObject1,
            GuardCheck::BuiltinInstance(_) => DeoptType::BuiltinInstanceHClassMismatch,
            GuardCheck::ShapeGeneration(..) => DeoptType::BuiltinInstanceHClassMismatch2,
            GuardCheck::NotPrototypeAliased => DeoptType::NotStableArray1,
            GuardCheck::Extensible => DeoptType::NotStableArray2,
            GuardCheck::WritableLength => DeoptType::IsNotWritableLength,
            GuardCheck::LengthHeadroom => DeoptType::LengthOverflow,
            GuardCheck::IsNumber => DeoptType::NotNumber1,
            GuardCheck::IsInt | GuardCheck::IsIntOrUndefined => DeoptType::NotInt1,
            GuardCheck::IsString => DeoptType::NotString1,
            GuardCheck::IsNotTreeString => DeoptType::NotFlatString1,
            GuardCheck::IsBigInt => DeoptType::NotBigInt,
            GuardCheck::IndexIsInt => DeoptType::IndexNotInt,
            GuardCheck::IndexNonNegative => DeoptType::IndexLessZero,
            GuardCheck::BufferAttached => DeoptType::ArrayBufferIsDetached,
            GuardCheck::ViewHasRoom { .. } => DeoptType::TotalSizeOverflow,
            GuardCheck::BitsInRange(_) => DeoptType::RangeError,
            GuardCheck::IsPrimitive => DeoptType::NotPrimitive1,
            GuardCheck::ArgCount(_) => DeoptType::ArgCountMismatch,
        }
    }

    pub fn cost(&self) -> CostClass {
        match self {
            GuardCheck::NotPrototypeAliased | GuardCheck::BufferAttached | GuardCheck::ViewHasRoom { .. } => {
                CostClass::Moderate
            }
            _ => CostClass::Cheap,
        }
    }
}

/// A guard: one check applied to one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guard {
    pub check: GuardCheck,
    pub operand: Operand,
}

impl Guard {
    pub fn new(check: GuardCheck, operand: Operand) -> Self {
        Guard { check, operand }
    }

    pub fn call_target(id: BuiltinId) -> Self {
        Guard::new(GuardCheck::CallTarget(id), Operand::Callee)
    }

    pub fn receiver(check: GuardCheck) -> Self {
        Guard::new(check, Operand::Receiver)
    }

    pub fn arg(check: GuardCheck, index: u8) -> Self {
        Guard::new(check, Operand::Arg(index))
    }

    pub fn name(&self) -> &'static str {
        self.check.name()
    }

    pub fn deopt_type(&self) -> DeoptType {
        self.check.deopt_type()
    }

    pub fn cost(&self) -> CostClass {
        self.check.cost()
    }

    pub fn failure_action(&self) -> FailureAction {
        FailureAction::DeoptimizeToGeneric
    }

    /// Evaluate against the current operands
    pub fn evaluate(&self, ctx: &GuardContext<'_>) -> bool {
        let undefined = Value::Undefined;
        let value = ctx.operand(self.operand).unwrap_or(&undefined);
        match self.check {
            GuardCheck::CallTarget(id) => with_object(value, |o| o.builtin_id() == Some(id)),
            GuardCheck::IsHeapObject => value.is_object(),
            GuardCheck::BuiltinInstance(kind) => with_object(value, |o| {
                o.instance_kind() == kind && ctx.realm.shapes().is_builtin(o.shape, kind)
            }),
            GuardCheck::ShapeGeneration(kind, generation) => ctx.realm.shapes().generation(kind) == generation,
            GuardCheck::NotPrototypeAliased => {
                ctx.realm.array_elements_intact() && with_object(value, |o| !o.is_prototype())
            }
            GuardCheck::Extensible => with_object(value, |o| o.is_extensible() && !o.is_sealed()),
            GuardCheck::WritableLength => with_object(value, |o| o.has_writable_length()),
            GuardCheck::LengthHeadroom => with_object(value, |o| {
                o.array_elements()
                    .map(|e| e.len() as u64 + ctx.args.len() as u64 <= MAX_ARRAY_LENGTH)
                    .unwrap_or(false)
            }),
            GuardCheck::IsNumber => matches!(value, Value::Number(_)),
            GuardCheck::IsInt => value.as_int32().is_some(),
            GuardCheck::IsIntOrUndefined => value.is_undefined() || value.as_int32().is_some(),
            GuardCheck::IsString => matches!(value, Value::String(_)),
            GuardCheck::IsNotTreeString => value.as_string().map(|s| !s.is_tree()).unwrap_or(false),
            GuardCheck::IsBigInt => matches!(value, Value::BigInt(_)),
            GuardCheck::IndexIsInt => value.as_int32().is_some(),
            GuardCheck::IndexNonNegative => value.as_int32().map(|i| i >= 0).unwrap_or(false),
            GuardCheck::BufferAttached => with_object(value, |o| match &o.kind {
                ObjectKind::DataView { buffer, .. } | ObjectKind::TypedArray { buffer, .. } => buffer
                    .try_borrow()
                    .map(|b| !b.is_detached())
                    .unwrap_or(false),
                _ => false,
            }),
            GuardCheck::ViewHasRoom { width, index_arg } => {
                let Some(index) = ctx.args.get(index_arg as usize).and_then(Value::as_int32) else {
                    return false;
                };
                if index < 0 {
                    return false;
                }
                with_object(value, |o| match &o.kind {
                    ObjectKind::DataView { byte_length, .. } => {
                        index as u64 + width as u64 <= *byte_length as u64
                    }
                    _ => false,
                })
            }
            GuardCheck::BitsInRange(max) => value
                .as_int32()
                .map(|bits| (0..=max as i32).contains(&bits))
                .unwrap_or(false),
            GuardCheck::IsPrimitive => value.is_primitive(),
            GuardCheck::ArgCount(n) => ctx.args.len() == n as usize,
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.operand)
    }
}

/// Run `f` on the borrowed object; non-objects and busy objects fail
fn with_object(value: &Value, f: impl FnOnce(&Object) -> bool) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.try_borrow().ok().map(|o| f(&o)))
        .unwrap_or(false)
}

// ==================== Composition ====================

/// `IsStableArray`: builtin array shape, not prototype-aliased, extensible
pub fn stable_array(operand: Operand) -> [Guard; 3] {
    [
        Guard::new(GuardCheck::BuiltinInstance(InstanceKind::Array), operand),
        Guard::new(GuardCheck::NotPrototypeAliased, operand),
        Guard::new(GuardCheck::Extensible, operand),
    ]
}

/// Total cost units of a guard list
pub fn total_cost(guards: &[Guard]) -> u32 {
    guards.iter().map(|g| g.cost().units()).sum()
}

/// First guard that does not hold, in list order
pub fn first_failure<'g>(guards: &'g [Guard], ctx: &GuardContext<'_>) -> Option<&'g Guard> {
    let failed = guards.iter().find(|g| !g.evaluate(ctx));
    if let Some(guard) = failed {
        tracing::trace!(%guard, deopt = %guard.deopt_type(), "guard failed");
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ElementType;
    use crate::runtime::JsString;

    fn check(realm: &Realm, guard: Guard, receiver: &Value, args: &[Value]) -> bool {
        let callee = Value::Undefined;
        guard.evaluate(&GuardContext::new(realm, &callee, receiver, args))
    }

    #[test]
    fn test_call_target_identity() {
        let mut realm = Realm::new();
        let math = realm.global("Math").unwrap();
        let fround = realm.get(&math, "fround").unwrap();
        let ctx = GuardContext::new(&realm, &fround, &math, &[]);
        assert!(Guard::call_target(BuiltinId::MathFRound).evaluate(&ctx));
        assert!(!Guard::call_target(BuiltinId::MathAbs).evaluate(&ctx));

        let replacement = realm.new_function("fround", |_, _, _| Ok(Value::from(0)));
        let ctx = GuardContext::new(&realm, &replacement, &math, &[]);
        assert!(!Guard::call_target(BuiltinId::MathFRound).evaluate(&ctx));
    }

    #[test]
    fn test_stable_array_conjunction() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![]);
        let ok = |realm: &Realm, v: &Value| stable_array(Operand::Receiver).iter().all(|g| check(realm, *g, v, &[]));
        assert!(ok(&realm, &arr));

        let frozen = realm.new_array(vec![]);
        realm.freeze(&frozen);
        let failed: Vec<DeoptType> = stable_array(Operand::Receiver)
            .iter()
            .filter(|g| !check(&realm, **g, &frozen, &[]))
            .map(|g| g.deopt_type())
            .collect();
        assert_eq!(failed, vec![DeoptType::NotStableArray2]);

        let proxy = realm.new_proxy(&arr, None).unwrap();
        assert!(!ok(&realm, &proxy));
        assert!(!ok(&realm, &Value::from(1)));
    }

    #[test]
    fn test_prototype_alias_trips_every_array() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![]);
        let proto = realm.intrinsics().array_prototype.clone();
        realm.set(&Value::Object(proto), "0", Value::from(1)).unwrap();
        let guard = Guard::receiver(GuardCheck::NotPrototypeAliased);
        assert!(!check(&realm, guard, &arr, &[]));
        assert_eq!(guard.deopt_type(), DeoptType::NotStableArray1);
    }

    #[test]
    fn test_shape_generation() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![]);
        let generation = realm.shapes().generation(InstanceKind::Array);
        let guard = Guard::receiver(GuardCheck::ShapeGeneration(InstanceKind::Array, generation));
        assert!(check(&realm, guard, &arr, &[]));
        let other = realm.new_object();
        let array_proto = Value::Object(realm.intrinsics().array_prototype.clone());
        realm.set_prototype_of(&array_proto, Some(&other)).unwrap();
        assert!(!check(&realm, guard, &arr, &[]));
    }

    #[test]
    fn test_string_guards() {
        let realm = Realm::new();
        let flat = JsString::new("abcdefghijklmnopq");
        let tree = Value::String(flat.concat(&flat));
        let flat = Value::String(flat);
        let not_tree = Guard::receiver(GuardCheck::IsNotTreeString);
        assert!(check(&realm, not_tree, &flat, &[]));
        assert!(!check(&realm, not_tree, &tree, &[]));
        assert!(!check(&realm, not_tree, &Value::from(1), &[]));
    }

    #[test]
    fn test_missing_argument_is_undefined() {
        let realm = Realm::new();
        let recv = Value::Undefined;
        assert!(check(&realm, Guard::arg(GuardCheck::IsIntOrUndefined, 0), &recv, &[]));
        assert!(!check(&realm, Guard::arg(GuardCheck::IsNumber, 0), &recv, &[]));
        assert!(check(&realm, Guard::arg(GuardCheck::IsPrimitive, 2), &recv, &[]));
    }

    #[test]
    fn test_view_guards() {
        let mut realm = Realm::new();
        let buffer = realm.new_array_buffer(16);
        let view = realm.new_data_view(&buffer, 4, None).unwrap();
        let room = Guard::receiver(GuardCheck::ViewHasRoom { width: 8, index_arg: 0 });
        assert!(check(&realm, room, &view, &[Value::from(4)]));
        assert!(!check(&realm, room, &view, &[Value::from(5)]));
        assert!(!check(&realm, room, &view, &[Value::from(-1)]));

        let attached = Guard::receiver(GuardCheck::BufferAttached);
        assert!(check(&realm, attached, &view, &[]));
        realm.detach_buffer(&buffer).unwrap();
        assert!(!check(&realm, attached, &view, &[]));

        let ta = realm.new_typed_array(ElementType::Int8, 2);
        assert!(check(&realm, attached, &ta, &[]));
    }

    #[test]
    fn test_bits_in_range() {
        let realm = Realm::new();
        let recv = Value::Undefined;
        let guard = Guard::arg(GuardCheck::BitsInRange(64), 0);
        assert!(check(&realm, guard, &recv, &[Value::from(3)]));
        assert!(check(&realm, guard, &recv, &[Value::from(64)]));
        assert!(!check(&realm, guard, &recv, &[Value::from(65)]));
        assert!(!check(&realm, guard, &recv, &[Value::from(-1)]));
    }

    #[test]
    fn test_costs_and_first_failure() {
        let realm = Realm::new();
        let guards = [
            Guard::receiver(GuardCheck::IsHeapObject),
            Guard::receiver(GuardCheck::BufferAttached),
        ];
        assert_eq!(total_cost(&guards), 3);
        let callee = Value::Undefined;
        let recv = Value::from(1);
        let ctx = GuardContext::new(&realm, &callee, &recv, &[]);
        assert_eq!(first_failure(&guards, &ctx).map(|g| g.deopt_type()), Some(DeoptType::NotHeapObject1));
        assert_eq!(guards[0].failure_action(), FailureAction::DeoptimizeToGeneric);
    }
}
