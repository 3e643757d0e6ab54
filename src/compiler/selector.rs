//! Builtin Specialization Selector
//!
//! Reads a frozen site profile and decides whether the call site gets a
//! guarded fast path (`PlanMode::Full`), a guarded direct call into the
//! generic builtin (`PlanMode::Partial`), or nothing at all. The selector is
//! a pure function of the profile, the configuration and the builtin shape
//! generations captured for the compilation unit.

use crate::config::SpecializationConfig;
use crate::guards::{self, Guard, GuardCheck, Operand};
use crate::profile::{CallSiteId, CallTarget, OperandHistogram, ShapeCategory, SiteProfile};
use crate::runtime::builtins::ViewAccess;
use crate::runtime::shape::{InstanceKind, ShapeEpochs};
use crate::runtime::BuiltinId;
use std::fmt;

/// How much of the builtin the specialization covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Guards followed by an inlined fast path
    Full,
    /// Call-target guard followed by a direct call to the generic core
    Partial,
}

/// How a numeric argument reaches the fast path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgMode {
    /// Already a number (or an int/undefined index), guarded
    Direct,
    /// A primitive converted with ToNumber; runs no user code
    CoercePrimitive,
    /// Converted with ToNumber; may call user `valueOf`/`toString`
    Coerce,
}

impl ArgMode {
    pub fn runs_user_code(self) -> bool {
        self == ArgMode::Coerce
    }
}

/// Output of the selector, input of the emitter
#[derive(Debug, Clone, PartialEq)]
pub struct SpecializationPlan {
    pub site: CallSiteId,
    pub builtin: BuiltinId,
    pub mode: PlanMode,
    /// Entry guards, evaluated in order before any effect
    pub guards: Vec<Guard>,
    /// Conversion of argument `i`; missing entries mean "not converted"
    pub arg_modes: Vec<ArgMode>,
    /// Re-evaluated after user-code coercions
    pub reguards: Vec<Guard>,
    /// Re-evaluated before each step of a multi-step effect
    pub step_guards: Vec<Guard>,
}

impl SpecializationPlan {
    pub fn guard_cost(&self) -> u32 {
        guards::total_cost(&self.guards)
    }

    pub fn coerces_with_user_code(&self) -> bool {
        self.arg_modes.iter().any(|m| m.runs_user_code())
    }
}

/// Why a site stays generic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Blocked { generation: u32 },
    TooFewSamples { samples: u32, required: u32 },
    TargetNotMonomorphic(CallTarget),
    NoDominantCategory(Operand),
    PartialDisabled,
    SiteMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Blocked { generation } => write!(f, "blocked for generation {}", generation),
            RejectReason::TooFewSamples { samples, required } => {
                write!(f, "{} samples, {} required", samples, required)
            }
            RejectReason::TargetNotMonomorphic(target) => write!(f, "call target {:?}", target),
            RejectReason::NoDominantCategory(operand) => write!(f, "no dominant category for {}", operand),
            RejectReason::PartialDisabled => write!(f, "needs a partial plan"),
            RejectReason::SiteMismatch => write!(f, "profile belongs to another site"),
        }
    }
}

/// Inputs shared by every site of one compilation unit
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub config: &'a SpecializationConfig,
    /// Generation the unit is compiled for
    pub generation: u32,
    pub epochs: &'a ShapeEpochs,
}

/// Plan for `builtin` at `site`, or `None` when the site stays generic
pub fn select(
    site: CallSiteId,
    profile: &SiteProfile,
    builtin: BuiltinId,
    ctx: &SelectionContext<'_>,
) -> Option<SpecializationPlan> {
    match decide(site, profile, builtin, ctx) {
        Ok(plan) => {
            tracing::debug!(%site, %builtin, mode = ?plan.mode, cost = plan.guard_cost(), "specialize");
            Some(plan)
        }
        Err(RejectReason::SiteMismatch) => {
            tracing::warn!(%site, profile = %profile.site, "profile handed to the wrong site");
            None
        }
        Err(reason) => {
            tracing::debug!(%site, %builtin, %reason, "keep generic");
            None
        }
    }
}

/// Same as `select`, reporting why a site was declined
pub fn decide(
    site: CallSiteId,
    profile: &SiteProfile,
    builtin: BuiltinId,
    ctx: &SelectionContext<'_>,
) -> Result<SpecializationPlan, RejectReason> {
    if profile.site != site {
        return Err(RejectReason::SiteMismatch);
    }
    if profile.is_blocked(ctx.generation) {
        return Err(RejectReason::Blocked {
            generation: ctx.generation,
        });
    }
    if profile.samples < ctx.config.min_samples {
        return Err(RejectReason::TooFewSamples {
            samples: profile.samples,
            required: ctx.config.min_samples,
        });
    }
    if profile.target != CallTarget::Monomorphic(builtin) {
        return Err(RejectReason::TargetNotMonomorphic(profile.target));
    }

    let selector = Selector {
        site,
        profile,
        builtin,
        ctx,
    };
    let plan = match selector.full_plan()? {
        Some(plan) if profitable(&plan) => plan,
        Some(plan) => {
            tracing::debug!(%site, cost = plan.guard_cost(), generic = builtin.generic_cost(), "guards too costly");
            selector.partial_plan()
        }
        None => selector.partial_plan(),
    };
    if plan.mode == PlanMode::Partial && !ctx.config.enable_partial_inlining {
        return Err(RejectReason::PartialDisabled);
    }
    Ok(plan)
}

/// Guards must cost less than the dynamically dispatched call they replace
fn profitable(plan: &SpecializationPlan) -> bool {
    plan.guard_cost() < plan.builtin.generic_cost()
}

/// Dominance verdict for one operand
enum Dominance {
    /// Share of the listed categories reaches the ratio
    Within,
    /// Another single category dominates
    Elsewhere,
}

struct Selector<'p, 'c> {
    site: CallSiteId,
    profile: &'p SiteProfile,
    builtin: BuiltinId,
    ctx: &'p SelectionContext<'c>,
}

impl Selector<'_, '_> {
    fn ratio(&self) -> f64 {
        self.ctx.config.dominance_ratio
    }

    fn classify(&self, histogram: &OperandHistogram, categories: &[ShapeCategory], operand: Operand) -> Result<Dominance, RejectReason> {
        if histogram.dominated_by(categories, self.ratio()) {
            return Ok(Dominance::Within);
        }
        histogram
            .dominant(self.ratio())
            .map(|_| Dominance::Elsewhere)
            .ok_or(RejectReason::NoDominantCategory(operand))
    }

    fn receiver(&self, categories: &[ShapeCategory]) -> Result<Dominance, RejectReason> {
        self.classify(&self.profile.receiver(), categories, Operand::Receiver)
    }

    fn arg(&self, index: u8, categories: &[ShapeCategory]) -> Result<Dominance, RejectReason> {
        self.classify(
            &self.profile.arg_or_undefined(index as usize),
            categories,
            Operand::Arg(index),
        )
    }

    /// Conversion mode and guards for a number-typed argument, `None` when
    /// it should stay generic
    fn number_arg(&self, index: u8) -> Result<Option<(ArgMode, Vec<Guard>)>, RejectReason> {
        let histogram = self.profile.arg_or_undefined(index as usize);
        let ratio = self.ratio();
        if histogram.dominated_by(ShapeCategory::NUMBERS, ratio) {
            return Ok(Some((ArgMode::Direct, vec![Guard::arg(GuardCheck::IsNumber, index)])));
        }
        if histogram.dominated_by(ShapeCategory::NUMBER_COERCIBLE, ratio) {
            return Ok(Some((
                ArgMode::CoercePrimitive,
                vec![Guard::arg(GuardCheck::IsPrimitive, index)],
            )));
        }
        if histogram.dominated_by(ShapeCategory::OBJECTS, ratio) {
            return Ok(Some((ArgMode::Coerce, Vec::new())));
        }
        match histogram.dominant(ratio) {
            Some(_) => Ok(None),
            None => Err(RejectReason::NoDominantCategory(Operand::Arg(index))),
        }
    }

    fn plan(&self, guards: Vec<Guard>) -> SpecializationPlan {
        let mut all = vec![Guard::call_target(self.builtin)];
        all.extend(guards);
        SpecializationPlan {
            site: self.site,
            builtin: self.builtin,
            mode: PlanMode::Full,
            guards: all,
            arg_modes: Vec::new(),
            reguards: Vec::new(),
            step_guards: Vec::new(),
        }
    }

    fn partial_plan(&self) -> SpecializationPlan {
        let mut guards = vec![Guard::call_target(self.builtin)];
        if self.builtin == BuiltinId::StringCharCodeAt
            && self
                .profile
                .receiver()
                .dominated_by(&[ShapeCategory::StringFlat, ShapeCategory::StringSliced, ShapeCategory::StringTree], self.ratio())
        {
            guards.push(Guard::receiver(GuardCheck::IsString));
        }
        SpecializationPlan {
            site: self.site,
            builtin: self.builtin,
            mode: PlanMode::Partial,
            guards,
            arg_modes: Vec::new(),
            reguards: Vec::new(),
            step_guards: Vec::new(),
        }
    }

    /// Full plan when the dominant operands fit the fast path
    fn full_plan(&self) -> Result<Option<SpecializationPlan>, RejectReason> {
        use BuiltinId::*;
        match self.builtin {
            ArrayPush | ArrayPop => self.array_plan(),
            StringCharCodeAt => self.char_code_at_plan(),
            StringFromCharCode => self.from_char_code_plan(),
            MathFRound | MathAbs | MathFloor | MathCeil | MathTrunc | MathSqrt | MathSign => self.math_plan(),
            BigIntAsUintN | BigIntAsIntN => self.bigint_wrap_plan(),
            BigIntConstructor => self.bigint_constructor_plan(),
            TypedArrayFill => self.fill_plan(),
            id => match id.view_access() {
                Some((access, element)) => self.view_plan(access, element.size() as u8),
                None => Ok(None),
            },
        }
    }

    fn array_plan(&self) -> Result<Option<SpecializationPlan>, RejectReason> {
        if let Dominance::Elsewhere = self.receiver(&[ShapeCategory::StableArray])? {
            return Ok(None);
        }
        let stable = guards::stable_array(Operand::Receiver);
        let mut receiver = vec![Guard::receiver(GuardCheck::IsHeapObject), stable[0]];
        receiver.push(Guard::receiver(GuardCheck::ShapeGeneration(
            InstanceKind::Array,
            self.ctx.epochs.generation(InstanceKind::Array),
        )));
        // Cause 1 is checked before cause 2
        receiver.extend_from_slice(&stable[1..]);
        receiver.push(Guard::receiver(GuardCheck::WritableLength));

        if self.builtin == BuiltinId::ArrayPop {
            return Ok(Some(self.plan(receiver)));
        }
        receiver.push(Guard::receiver(GuardCheck::LengthHeadroom));
        let mut plan = self.plan(receiver);
        plan.step_guards = stable.to_vec();
        plan.step_guards.push(Guard::receiver(GuardCheck::WritableLength));
        Ok(Some(plan))
    }

    fn char_code_at_plan(&self) -> Result<Option<SpecializationPlan>, RejectReason> {
        if let Dominance::Elsewhere = self.receiver(ShapeCategory::FLAT_STRINGS)? {
            // Ropes and non-string receivers go through the generic core
            return Ok(None);
        }
        if let Dominance::Elsewhere = self.arg(0, &[ShapeCategory::Int, ShapeCategory::NullOrUndefined])? {
            return Ok(None);
        }
        let mut plan = self.plan(vec![
            Guard::receiver(GuardCheck::IsString),
            Guard::receiver(GuardCheck::IsNotTreeString),
            Guard::arg(GuardCheck::IsIntOrUndefined, 0),
        ]);
        plan.arg_modes = vec![ArgMode::Direct];
        Ok(Some(plan))
    }

    fn from_char_code_plan(&self) -> Result<Option<SpecializationPlan>, RejectReason> {
        if !self.profile.always_argc(1) {
            return Ok(None);
        }
        let Some((mode, arg_guards)) = self.number_arg(0)? else {
            return Ok(None);
        };
        let mut guards = vec![Guard::new(GuardCheck::ArgCount(1), Operand::Callee)];
        guards.extend(arg_guards);
        let mut plan = self.plan(guards);
        plan.arg_modes = vec![mode];
        Ok(Some(plan))
    }

    fn math_plan(&self) -> Result<Option<SpecializationPlan>, RejectReason> {
        let Some((mode, arg_guards)) = self.number_arg(0)? else {
            return Ok(None);
        };
        let mut plan = self.plan(arg_guards);
        plan.arg_modes = vec![mode];
        Ok(Some(plan))
    }

    fn bigint_wrap_plan(&self) -> Result<Option<SpecializationPlan>, RejectReason> {
        let bits = self.arg(0, &[ShapeCategory::Int])?;
        let value = self.arg(1, &[ShapeCategory::BigInt])?;
        if matches!(bits, Dominance::Elsewhere) || matches!(value, Dominance::Elsewhere) {
            return Ok(None);
        }
        let fast_bits = self.ctx.config.bigint_fast_bits.min(64) as u8;
        let mut plan = self.plan(vec![
            Guard::arg(GuardCheck::BitsInRange(fast_bits), 0),
            Guard::arg(GuardCheck::IsBigInt, 1),
        ]);
        plan.arg_modes = vec![ArgMode::Direct, ArgMode::Direct];
        Ok(Some(plan))
    }

    fn bigint_constructor_plan(&self) -> Result<Option<SpecializationPlan>, RejectReason> {
        if let Dominance::Elsewhere = self.arg(0, &[ShapeCategory::Int])? {
            return Ok(None);
        }
        let mut plan = self.plan(vec![Guard::arg(GuardCheck::IsInt, 0)]);
        plan.arg_modes = vec![ArgMode::Direct];
        Ok(Some(plan))
    }

    fn view_plan(&self, access: ViewAccess, width: u8) -> Result<Option<SpecializationPlan>, RejectReason> {
        if let Dominance::Elsewhere = self.receiver(&[ShapeCategory::DataView])? {
            return Ok(None);
        }
        if let Dominance::Elsewhere = self.arg(0, &[ShapeCategory::Int])? {
            return Ok(None);
        }
        let mut guards = vec![
            Guard::receiver(GuardCheck::IsHeapObject),
            Guard::receiver(GuardCheck::BuiltinInstance(InstanceKind::DataView)),
            Guard::receiver(GuardCheck::BufferAttached),
            Guard::arg(GuardCheck::IndexIsInt, 0),
            Guard::arg(GuardCheck::IndexNonNegative, 0),
        ];
        let mut arg_modes = vec![ArgMode::Direct];
        let mut reguards = Vec::new();
        if access == ViewAccess::Set {
            let Some((mode, value_guards)) = self.number_arg(1)? else {
                return Ok(None);
            };
            guards.extend(value_guards);
            arg_modes.push(mode);
            if mode.runs_user_code() {
                reguards.push(Guard::receiver(GuardCheck::BufferAttached));
            }
        }
        let room = Guard::receiver(GuardCheck::ViewHasRoom { width, index_arg: 0 });
        guards.push(room);
        if !reguards.is_empty() {
            reguards.push(room);
        }
        let mut plan = self.plan(guards);
        plan.arg_modes = arg_modes;
        plan.reguards = reguards;
        Ok(Some(plan))
    }

    fn fill_plan(&self) -> Result<Option<SpecializationPlan>, RejectReason> {
        if let Dominance::Elsewhere = self.receiver(&[ShapeCategory::TypedArray])? {
            return Ok(None);
        }
        let Some((mode, value_guards)) = self.number_arg(0)? else {
            return Ok(None);
        };
        for index in 1..=2 {
            if let Dominance::Elsewhere = self.arg(index, &[ShapeCategory::Int, ShapeCategory::NullOrUndefined])? {
                return Ok(None);
            }
        }
        let mut guards = vec![
            Guard::receiver(GuardCheck::IsHeapObject),
            Guard::receiver(GuardCheck::BuiltinInstance(InstanceKind::TypedArray)),
            Guard::receiver(GuardCheck::BufferAttached),
        ];
        guards.extend(value_guards);
        guards.push(Guard::arg(GuardCheck::IsIntOrUndefined, 1));
        guards.push(Guard::arg(GuardCheck::IsIntOrUndefined, 2));
        let mut plan = self.plan(guards);
        plan.arg_modes = vec![mode, ArgMode::Direct, ArgMode::Direct];
        if mode.runs_user_code() {
            plan.reguards = vec![Guard::receiver(GuardCheck::BufferAttached)];
        }
        Ok(Some(plan))
    }
}
