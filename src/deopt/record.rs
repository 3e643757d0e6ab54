//! Deoptimization records and generic resumption points

use crate::error::{Error, Result};
use crate::guards::DeoptType;
use crate::profile::CallSiteId;
use crate::runtime::builtins::{self, array};
use crate::runtime::{BuiltinId, Realm, Value};

/// Where generic execution picks up after a bailout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// Nothing ran; redo the whole call through dynamic dispatch
    Entry,
    /// Arguments were already converted; call the generic builtin on them
    AfterCoercion,
    /// A multi-step effect stopped early. `committed` items of the call are
    /// stored at `base_length..`.
    AfterStep { base_length: u64, committed: usize },
}

/// Generic continuation of a specialized operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericEntry {
    pub builtin: BuiltinId,
    pub resume: ResumePoint,
}

impl GenericEntry {
    pub fn entry(builtin: BuiltinId) -> Self {
        GenericEntry {
            builtin,
            resume: ResumePoint::Entry,
        }
    }

    pub fn with_resume(self, resume: ResumePoint) -> Self {
        GenericEntry { resume, ..self }
    }
}

/// Interpreter-consistent state captured when a guard fails
#[derive(Debug, Clone)]
pub struct DeoptimizationRecord {
    pub site: CallSiteId,
    pub reason: DeoptType,
    pub entry: GenericEntry,
    pub callee: Value,
    pub receiver: Value,
    /// Arguments, with coerced values substituted once conversion ran
    pub args: Vec<Value>,
}

impl DeoptimizationRecord {
    pub fn new(
        site: CallSiteId,
        reason: DeoptType,
        entry: GenericEntry,
        callee: &Value,
        receiver: &Value,
        args: Vec<Value>,
    ) -> Self {
        DeoptimizationRecord {
            site,
            reason,
            entry,
            callee: callee.clone(),
            receiver: receiver.clone(),
            args,
        }
    }

    /// Continue the call generically
    pub fn resume(self, realm: &mut Realm) -> Result<Value> {
        match self.entry.resume {
            ResumePoint::Entry => realm.call_function(&self.callee, &self.receiver, &self.args),
            ResumePoint::AfterCoercion => {
                builtins::call_builtin(realm, self.entry.builtin, &self.receiver, &self.args)
            }
            ResumePoint::AfterStep {
                base_length,
                committed,
            } => match self.entry.builtin {
                BuiltinId::ArrayPush => {
                    array::push_from(realm, &self.receiver, &self.args, base_length, committed)
                }
                other => Err(Error::internal(format!("{} has no step resumption", other))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::FunctionId;

    fn site() -> CallSiteId {
        CallSiteId::new(FunctionId(0), 1)
    }

    #[test]
    fn test_resume_at_entry_dispatches_dynamically() {
        let mut realm = Realm::new();
        let math = realm.global("Math").unwrap();
        let patched = realm.new_function("fround", |_, _, _| Ok(Value::from(42)));
        let record = DeoptimizationRecord::new(
            site(),
            DeoptType::NotCallTarget1,
            GenericEntry::entry(BuiltinId::MathFRound),
            &patched,
            &math,
            vec![Value::from(1.5)],
        );
        assert_eq!(record.resume(&mut realm).unwrap(), Value::from(42));
    }

    #[test]
    fn test_resume_after_step_does_not_repeat() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![Value::from(0), Value::from(1)]);
        let entry = GenericEntry::entry(BuiltinId::ArrayPush).with_resume(ResumePoint::AfterStep {
            base_length: 1,
            committed: 1,
        });
        let push = realm.get(&arr, "push").unwrap();
        let record = DeoptimizationRecord::new(
            site(),
            DeoptType::NotStableArray2,
            entry,
            &push,
            &arr,
            vec![Value::from(1), Value::from(2)],
        );
        assert_eq!(record.resume(&mut realm).unwrap(), Value::from(3));
        assert_eq!(realm.get(&arr, "2").unwrap(), Value::from(2));
        assert_eq!(realm.get(&arr, "length").unwrap(), Value::from(3));
    }

    #[test]
    fn test_resume_after_coercion_uses_converted_args() {
        let mut realm = Realm::new();
        let math = realm.global("Math").unwrap();
        let abs = realm.get(&math, "abs").unwrap();
        let entry = GenericEntry::entry(BuiltinId::MathAbs).with_resume(ResumePoint::AfterCoercion);
        let record = DeoptimizationRecord::new(site(), DeoptType::NotNumber1, entry, &abs, &math, vec![Value::from(-2)]);
        assert_eq!(record.resume(&mut realm).unwrap(), Value::from(2));
    }
}
