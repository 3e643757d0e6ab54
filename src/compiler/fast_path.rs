//! Specialized operations and their inlined fast paths

use super::selector::{ArgMode, PlanMode};
use crate::deopt::{DeoptimizationRecord, GenericEntry, ResumePoint};
use crate::error::Result;
use crate::guards::{self, DeoptType, Guard, GuardContext};
use crate::profile::CallSiteId;
use crate::runtime::buffer::{to_uint32_bits, ElementType};
use crate::runtime::builtins::math::MathOp;
use crate::runtime::builtins::{self, arg, bigint, dataview, typed_array};
use crate::runtime::coerce;
use crate::runtime::{BuiltinId, JsString, Realm, Value};
use num_bigint::BigInt;

/// Body run once every entry guard holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPath {
    ArrayPush,
    ArrayPop,
    CharCodeAt,
    FromCharCode,
    MathUnary(MathOp),
    /// `BigInt.asUintN` / `asIntN` for widths up to 64 bits
    BigIntAsN { signed: bool },
    BigIntFromInt,
    DataViewGet(ElementType),
    DataViewSet(ElementType),
    TypedArrayFill,
    /// Direct call into the generic builtin (partial plans)
    GenericCore(BuiltinId),
}

impl FastPath {
    /// Fast path for a full plan of `builtin`
    pub fn for_builtin(builtin: BuiltinId) -> Option<FastPath> {
        use BuiltinId::*;
        let path = match builtin {
            ArrayPush => FastPath::ArrayPush,
            ArrayPop => FastPath::ArrayPop,
            StringCharCodeAt => FastPath::CharCodeAt,
            StringFromCharCode => FastPath::FromCharCode,
            BigIntAsUintN => FastPath::BigIntAsN { signed: false },
            BigIntAsIntN => FastPath::BigIntAsN { signed: true },
            BigIntConstructor => FastPath::BigIntFromInt,
            TypedArrayFill => FastPath::TypedArrayFill,
            id => {
                if let Some(op) = MathOp::from_builtin(id) {
                    FastPath::MathUnary(op)
                } else {
                    match id.view_access()? {
                        (builtins::ViewAccess::Get, element) => FastPath::DataViewGet(element),
                        (builtins::ViewAccess::Set, element) => FastPath::DataViewSet(element),
                    }
                }
            }
        };
        Some(path)
    }

    /// Whether the body reads receiver state that user code could change
    pub fn reads_receiver(self) -> bool {
        matches!(
            self,
            FastPath::ArrayPush
                | FastPath::ArrayPop
                | FastPath::CharCodeAt
                | FastPath::DataViewGet(_)
                | FastPath::DataViewSet(_)
                | FastPath::TypedArrayFill
        )
    }

    /// Argument positions the body treats as numbers
    pub fn number_args(self) -> &'static [usize] {
        match self {
            FastPath::FromCharCode | FastPath::MathUnary(_) | FastPath::TypedArrayFill => &[0],
            FastPath::DataViewSet(_) => &[1],
            _ => &[],
        }
    }
}

/// Result of running a specialized operation
#[derive(Debug)]
pub enum Outcome {
    /// The fast path ran to completion (a language error included)
    Done(Result<Value>),
    /// A guard failed; the record says how to finish the call generically
    Deopt(DeoptimizationRecord),
}

/// One compiled fast path for one builtin at one call site
#[derive(Debug, Clone)]
pub struct SpecializedOperation {
    pub site: CallSiteId,
    pub builtin: BuiltinId,
    pub mode: PlanMode,
    pub guards: Vec<Guard>,
    pub arg_modes: Vec<ArgMode>,
    pub reguards: Vec<Guard>,
    pub step_guards: Vec<Guard>,
    pub fast_path: FastPath,
    pub entry: GenericEntry,
}

impl SpecializedOperation {
    /// Run the operation: guards, conversions, then the direct effect
    pub fn execute(&self, realm: &mut Realm, callee: &Value, receiver: &Value, args: &[Value]) -> Outcome {
        let failed = {
            let ctx = GuardContext::new(realm, callee, receiver, args);
            guards::first_failure(&self.guards, &ctx).map(Guard::deopt_type)
        };
        if let Some(reason) = failed {
            return Outcome::Deopt(self.bail(reason, ResumePoint::Entry, callee, receiver, args.to_vec()));
        }

        let args = match self.convert_args(realm, args) {
            Ok(Converted::Unchanged) => args.to_vec(),
            Ok(Converted::Pure(converted)) => converted,
            Ok(Converted::AfterUserCode(converted)) => {
                // Coercion may have run user code; the receiver must still qualify
                let failed = {
                    let ctx = GuardContext::new(realm, callee, receiver, &converted);
                    guards::first_failure(&self.reguards, &ctx).map(Guard::deopt_type)
                };
                if let Some(reason) = failed {
                    return Outcome::Deopt(self.bail(reason, ResumePoint::AfterCoercion, callee, receiver, converted));
                }
                converted
            }
            Err(e) => return Outcome::Done(Err(e)),
        };

        match self.fast_path {
            FastPath::ArrayPush => self.push(realm, callee, receiver, args),
            path => Outcome::Done(run(path, realm, receiver, &args)),
        }
    }

    fn bail(
        &self,
        reason: DeoptType,
        resume: ResumePoint,
        callee: &Value,
        receiver: &Value,
        args: Vec<Value>,
    ) -> DeoptimizationRecord {
        DeoptimizationRecord::new(
            self.site,
            reason,
            self.entry.with_resume(resume),
            callee,
            receiver,
            args,
        )
    }

    fn convert_args(&self, realm: &mut Realm, args: &[Value]) -> Result<Converted> {
        if self.arg_modes.iter().all(|m| *m == ArgMode::Direct) {
            return Ok(Converted::Unchanged);
        }
        let mut converted = args.to_vec();
        let mut user_code = false;
        for (i, mode) in self.arg_modes.iter().enumerate() {
            if *mode == ArgMode::Direct {
                continue;
            }
            let number = coerce::to_number(realm, &arg(args, i))?;
            if i < converted.len() {
                converted[i] = Value::Number(number);
            } else {
                converted.resize(i, Value::Undefined);
                converted.push(Value::Number(number));
            }
            user_code |= mode.runs_user_code();
        }
        Ok(if user_code {
            Converted::AfterUserCode(converted)
        } else {
            Converted::Pure(converted)
        })
    }

    /// Append items one at a time, re-checking stability before each step
    fn push(&self, realm: &mut Realm, callee: &Value, receiver: &Value, args: Vec<Value>) -> Outcome {
        let Some(obj) = receiver.as_object() else {
            return Outcome::Done(builtins::call_builtin(realm, self.builtin, receiver, &args));
        };
        let base_length = obj.borrow().array_elements().map(|e| e.len()).unwrap_or(0) as u64;
        for committed in 0..args.len() {
            let failed = {
                let ctx = GuardContext::new(realm, callee, receiver, &args);
                guards::first_failure(&self.step_guards, &ctx).map(Guard::deopt_type)
            };
            if let Some(reason) = failed {
                let resume = ResumePoint::AfterStep {
                    base_length,
                    committed,
                };
                return Outcome::Deopt(self.bail(reason, resume, callee, receiver, args));
            }
            let item = args[committed].clone();
            if let Some(elements) = obj.borrow_mut().array_elements_mut() {
                elements.push(item);
            }
        }
        Outcome::Done(Ok(Value::Number((base_length + args.len() as u64) as f64)))
    }
}

enum Converted {
    Unchanged,
    /// Converted without running user code
    Pure(Vec<Value>),
    AfterUserCode(Vec<Value>),
}

/// Single-step bodies
fn run(path: FastPath, realm: &mut Realm, receiver: &Value, args: &[Value]) -> Result<Value> {
    let number = |i: usize| arg(args, i).as_number().unwrap_or(f64::NAN);
    match path {
        FastPath::ArrayPop => {
            let popped = receiver
                .as_object()
                .and_then(|obj| obj.borrow_mut().array_elements_mut().and_then(|e| e.pop()));
            Ok(popped.unwrap_or(Value::Undefined))
        }
        FastPath::CharCodeAt => {
            let Some(s) = receiver.as_string() else {
                return builtins::call_builtin(realm, BuiltinId::StringCharCodeAt, receiver, args);
            };
            let pos = arg(args, 0).as_int32().unwrap_or(0);
            let unit = usize::try_from(pos).ok().and_then(|p| s.direct_code_unit(p));
            Ok(Value::Number(unit.map(f64::from).unwrap_or(f64::NAN)))
        }
        FastPath::FromCharCode => {
            let unit = to_uint32_bits(number(0)) as u16;
            Ok(Value::String(JsString::from_code_units(vec![unit])))
        }
        FastPath::MathUnary(op) => Ok(Value::Number(op.apply(number(0)))),
        FastPath::BigIntAsN { signed } => {
            let bits = arg(args, 0).as_int32().unwrap_or(0).max(0) as u32;
            match arg(args, 1) {
                Value::BigInt(value) => Ok(Value::BigInt(bigint::wrap_small(bits, &value, signed))),
                _ => {
                    let id = if signed {
                        BuiltinId::BigIntAsIntN
                    } else {
                        BuiltinId::BigIntAsUintN
                    };
                    builtins::call_builtin(realm, id, receiver, args)
                }
            }
        }
        FastPath::BigIntFromInt => match arg(args, 0).as_int32() {
            Some(i) => Ok(Value::BigInt(BigInt::from(i))),
            None => builtins::call_builtin(realm, BuiltinId::BigIntConstructor, receiver, args),
        },
        FastPath::DataViewGet(element) => {
            let id = view_builtin(element, builtins::ViewAccess::Get);
            match dataview::view_parts(receiver) {
                Some(parts) => {
                    let index = arg(args, 0).as_int32().unwrap_or(0).max(0) as u64;
                    let little_endian = arg(args, 1).to_boolean();
                    dataview::read_element(&parts, index, element, little_endian, id).map(Value::Number)
                }
                None => builtins::call_builtin(realm, id, receiver, args),
            }
        }
        FastPath::DataViewSet(element) => {
            let id = view_builtin(element, builtins::ViewAccess::Set);
            match dataview::view_parts(receiver) {
                Some(parts) => {
                    let index = arg(args, 0).as_int32().unwrap_or(0).max(0) as u64;
                    let little_endian = arg(args, 2).to_boolean();
                    dataview::write_element(&parts, index, element, number(1), little_endian, id)?;
                    Ok(Value::Undefined)
                }
                None => builtins::call_builtin(realm, id, receiver, args),
            }
        }
        FastPath::TypedArrayFill => match typed_array::typed_array_parts(receiver) {
            Some(parts) => {
                let len = parts.length;
                let bound = |i: usize, default: usize| match arg(args, i).as_int32() {
                    Some(n) => typed_array::clamp_relative(n as f64, len),
                    None => default,
                };
                typed_array::fill_range(&parts, number(0), bound(1, 0), bound(2, len));
                Ok(receiver.clone())
            }
            None => builtins::call_builtin(realm, BuiltinId::TypedArrayFill, receiver, args),
        },
        FastPath::GenericCore(id) => builtins::call_builtin(realm, id, receiver, args),
        FastPath::ArrayPush => builtins::call_builtin(realm, BuiltinId::ArrayPush, receiver, args),
    }
}

fn view_builtin(element: ElementType, access: builtins::ViewAccess) -> BuiltinId {
    BuiltinId::ALL
        .iter()
        .copied()
        .find(|id| id.view_access() == Some((access, element)))
        .unwrap_or(match access {
            builtins::ViewAccess::Get => BuiltinId::DataViewGetFloat64,
            builtins::ViewAccess::Set => BuiltinId::DataViewSetFloat64,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_path_table() {
        assert_eq!(FastPath::for_builtin(BuiltinId::MathSign), Some(FastPath::MathUnary(MathOp::Sign)));
        assert_eq!(
            FastPath::for_builtin(BuiltinId::DataViewGetUint16),
            Some(FastPath::DataViewGet(ElementType::Uint16))
        );
        for &id in BuiltinId::ALL {
            assert!(FastPath::for_builtin(id).is_some(), "{} has no fast path", id);
        }
    }

    #[test]
    fn test_view_builtin_lookup() {
        assert_eq!(
            view_builtin(ElementType::Int32, builtins::ViewAccess::Set),
            BuiltinId::DataViewSetInt32
        );
    }

    #[test]
    fn test_char_code_at_body() {
        let mut realm = Realm::new();
        let s = Value::from("abcdefghijklmnopq");
        let r = run(FastPath::CharCodeAt, &mut realm, &s, &[Value::from(-1)]).unwrap();
        assert!(r.as_number().unwrap().is_nan());
        let r = run(FastPath::CharCodeAt, &mut realm, &s, &[]).unwrap();
        assert_eq!(r, Value::from(97));
    }

    #[test]
    fn test_fill_body_bounds() {
        let mut realm = Realm::new();
        let ta = realm.new_typed_array(ElementType::Int32, 4);
        run(
            FastPath::TypedArrayFill,
            &mut realm,
            &ta,
            &[Value::from(5), Value::from(-2)],
        )
        .unwrap();
        let values: Vec<Value> = (0..4).map(|i| realm.get(&ta, &i.to_string()).unwrap()).collect();
        assert_eq!(values, vec![Value::from(0), Value::from(0), Value::from(5), Value::from(5)]);
    }
}
