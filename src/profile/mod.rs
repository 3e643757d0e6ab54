//! Shape/type profiling of builtin call sites
//!
//! The executor records one `Observation` per generic execution of a call
//! site. The AOT compiler reads frozen snapshots to decide which sites to
//! specialize, and the deoptimization controller invalidates sites whose
//! speculation keeps failing.

pub mod category;
pub mod snapshot;
pub mod store;

pub use category::{classify, classify_target, CallTarget, ObservedTarget, ShapeCategory};
pub use snapshot::{OperandHistogram, ProfileSnapshot, SiteProfile};
pub use store::{ProfileStore, ProfileStoreStats};

use crate::runtime::{Realm, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arguments profiled per call site (beyond the receiver)
pub const MAX_PROFILED_ARGS: usize = 3;
/// Receiver plus profiled arguments
pub const OPERAND_SLOTS: usize = 1 + MAX_PROFILED_ARGS;

/// Index of a compiled function in the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// A call site: function plus instruction offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSiteId {
    pub function: FunctionId,
    pub offset: u32,
}

impl CallSiteId {
    pub fn new(function: FunctionId, offset: u32) -> Self {
        CallSiteId { function, offset }
    }
}

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.function, self.offset)
    }
}

/// One recorded execution of a call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub target: ObservedTarget,
    pub receiver: ShapeCategory,
    /// Categories of the first `MAX_PROFILED_ARGS` arguments
    pub args: Vec<ShapeCategory>,
    pub argc: usize,
}

impl Observation {
    pub fn capture(realm: &Realm, callee: &Value, receiver: &Value, args: &[Value]) -> Self {
        Observation {
            target: classify_target(callee),
            receiver: classify(realm, receiver),
            args: args
                .iter()
                .take(MAX_PROFILED_ARGS)
                .map(|a| classify(realm, a))
                .collect(),
            argc: args.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::BuiltinId;

    #[test]
    fn test_capture_observation() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![]);
        let push = realm.get(&arr, "push").unwrap();
        let args = vec![Value::from(1), Value::from("s"), Value::from(1.5), Value::Null];
        let obs = Observation::capture(&realm, &push, &arr, &args);
        assert_eq!(obs.target, ObservedTarget::Builtin(BuiltinId::ArrayPush));
        assert_eq!(obs.receiver, ShapeCategory::StableArray);
        assert_eq!(obs.args, vec![ShapeCategory::Int, ShapeCategory::StringFlat, ShapeCategory::Double]);
        assert_eq!(obs.argc, 4);
    }

    #[test]
    fn test_site_display() {
        assert_eq!(CallSiteId::new(FunctionId(2), 14).to_string(), "f2@14");
    }
}
