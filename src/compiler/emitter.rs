//! Inlined Fast-Path Emitter
//!
//! Turns a `SpecializationPlan` into a `SpecializedOperation`. An
//! inconsistent plan is an internal compiler error; the caller logs it and
//! leaves the site generic.

use super::fast_path::{FastPath, SpecializedOperation};
use super::selector::{ArgMode, PlanMode, SpecializationPlan};
use crate::deopt::GenericEntry;
use crate::error::{Error, Result};
use crate::guards::{GuardCheck, Operand};

pub fn emit(plan: SpecializationPlan) -> Result<SpecializedOperation> {
    match plan.guards.first() {
        Some(g) if g.check == GuardCheck::CallTarget(plan.builtin) && g.operand == Operand::Callee => {}
        _ => {
            return Err(Error::internal(format!(
                "plan for {} at {} does not start with its call-target guard",
                plan.builtin, plan.site
            )))
        }
    }

    let fast_path = match plan.mode {
        PlanMode::Partial => FastPath::GenericCore(plan.builtin),
        PlanMode::Full => {
            let path = FastPath::for_builtin(plan.builtin)
                .ok_or_else(|| Error::internal(format!("{} has no fast path", plan.builtin)))?;
            check_full_plan(&plan, path)?;
            path
        }
    };

    Ok(SpecializedOperation {
        site: plan.site,
        builtin: plan.builtin,
        mode: plan.mode,
        guards: plan.guards,
        arg_modes: plan.arg_modes,
        reguards: plan.reguards,
        step_guards: plan.step_guards,
        fast_path,
        entry: GenericEntry::entry(plan.builtin),
    })
}

fn check_full_plan(plan: &SpecializationPlan, fast_path: FastPath) -> Result<()> {
    for &index in fast_path.number_args() {
        let guarded = |check: GuardCheck| {
            plan.guards
                .iter()
                .any(|g| g.check == check && g.operand == Operand::Arg(index as u8))
        };
        let sound = match plan.arg_modes.get(index) {
            Some(ArgMode::Direct) => guarded(GuardCheck::IsNumber),
            Some(ArgMode::CoercePrimitive) => guarded(GuardCheck::IsPrimitive),
            Some(ArgMode::Coerce) => true,
            None => false,
        };
        if !sound {
            return Err(Error::internal(format!(
                "argument {} of {} reaches the fast path unguarded",
                index, plan.builtin
            )));
        }
    }
    if plan.coerces_with_user_code() && fast_path.reads_receiver() && plan.reguards.is_empty() {
        return Err(Error::internal(format!(
            "{} coerces with user code but never re-checks its receiver",
            plan.builtin
        )));
    }
    if fast_path == FastPath::ArrayPush && plan.step_guards.is_empty() {
        return Err(Error::internal("push plan without step guards"));
    }
    if let FastPath::BigIntAsN { .. } = fast_path {
        let bounded = plan.guards.iter().any(|g| {
            matches!(g.check, GuardCheck::BitsInRange(max) if max <= 64) && g.operand == Operand::Arg(0)
        });
        if !bounded {
            return Err(Error::internal(format!(
                "{} needs a bit width of at most 64",
                plan.builtin
            )));
        }
    }
    Ok(())
}
