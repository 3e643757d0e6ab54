//! Deoptimization Controller
//!
//! When a guard of a specialized operation fails, the fast path hands a
//! `DeoptimizationRecord` to the controller. The controller reports the
//! failure on the trace channel, resumes the call in the generic builtin at
//! the recorded `ResumePoint`, and tracks per-site state. A site that keeps
//! failing has its profile invalidated so the next compilation leaves it
//! generic.
//!
//! ```text
//!   Speculating ──guard fails──▶ GuardFailed ──resumed──▶ GenericFallback
//!        ▲                                                   │      │
//!        └──────────────── next entry / recompile ───────────┘      │
//!                                         deopts ≥ max ──▶ ProfileInvalidated
//! ```

pub mod record;
pub mod stats;

pub use record::{DeoptimizationRecord, GenericEntry, ResumePoint};
pub use stats::DeoptStats;

use crate::error::Result;
use crate::profile::{CallSiteId, ProfileStore};
use crate::runtime::{Realm, Value};
use crate::trace::{TraceEvent, TraceSink};
use rustc_hash::FxHashMap as HashMap;

/// Lifecycle of a specialized call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteState {
    Speculating,
    GuardFailed,
    GenericFallback,
    ProfileInvalidated,
}

#[derive(Debug, Clone, Copy)]
struct SiteEntry {
    state: SiteState,
    deopts: u32,
}

/// Result of a generic resumption
#[derive(Debug)]
pub struct ResumedExecution {
    /// Outcome of the generic builtin, errors included
    pub result: Result<Value>,
    pub state: SiteState,
    /// The site's profile was invalidated by this deoptimization
    pub invalidated: bool,
}

#[derive(Debug)]
pub struct DeoptController {
    sites: HashMap<CallSiteId, SiteEntry>,
    stats: DeoptStats,
    max_deopts: u32,
}

impl DeoptController {
    pub fn new(max_deopts: u32) -> Self {
        DeoptController {
            sites: HashMap::default(),
            stats: DeoptStats::default(),
            max_deopts: max_deopts.max(1),
        }
    }

    /// Register a freshly compiled specialization
    pub fn arm(&mut self, site: CallSiteId) {
        self.sites.insert(
            site,
            SiteEntry {
                state: SiteState::Speculating,
                deopts: 0,
            },
        );
    }

    /// Re-enter a site's fast path after a previous fallback
    pub fn enter(&mut self, site: CallSiteId) {
        if let Some(entry) = self.sites.get_mut(&site) {
            if entry.state == SiteState::GenericFallback {
                entry.state = SiteState::Speculating;
            }
        }
    }

    pub fn state(&self, site: CallSiteId) -> Option<SiteState> {
        self.sites.get(&site).map(|e| e.state)
    }

    pub fn deopt_count(&self, site: CallSiteId) -> u32 {
        self.sites.get(&site).map(|e| e.deopts).unwrap_or(0)
    }

    pub fn stats(&self) -> &DeoptStats {
        &self.stats
    }

    /// Handle a guard failure. Never fails itself; language errors of the
    /// generic path come back in `result`.
    pub fn deoptimize(
        &mut self,
        record: DeoptimizationRecord,
        realm: &mut Realm,
        store: &ProfileStore,
        generation: u32,
        trace: &TraceSink,
    ) -> ResumedExecution {
        let site = record.site;
        trace.emit(TraceEvent::CheckType {
            deopt: record.reason,
            site,
        });
        self.stats.record(record.reason);

        let entry = self.sites.entry(site).or_insert(SiteEntry {
            state: SiteState::Speculating,
            deopts: 0,
        });
        entry.state = SiteState::GuardFailed;
        entry.deopts = entry.deopts.saturating_add(1);
        let deopts = entry.deopts;

        let result = record.resume(realm);
        if result.is_ok() {
            self.stats.resumed_ok += 1;
        } else {
            self.stats.resumed_err += 1;
        }

        let invalidated = deopts >= self.max_deopts;
        let state = if invalidated {
            store.invalidate(site, generation);
            self.stats.invalidations += 1;
            trace.emit(TraceEvent::Invalidated { site, generation });
            SiteState::ProfileInvalidated
        } else {
            SiteState::GenericFallback
        };
        if let Some(entry) = self.sites.get_mut(&site) {
            entry.state = state;
        }

        ResumedExecution {
            result,
            state,
            invalidated,
        }
    }
}

impl Default for DeoptController {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::guards::DeoptType;
    use crate::profile::{FunctionId, Observation};
    use crate::runtime::BuiltinId;

    fn push_record(realm: &mut Realm, arr: &Value, site: CallSiteId) -> DeoptimizationRecord {
        let push = realm.get(arr, "push").unwrap();
        DeoptimizationRecord::new(
            site,
            DeoptType::NotStableArray2,
            GenericEntry::entry(BuiltinId::ArrayPush),
            &push,
            arr,
            vec![Value::from(1)],
        )
    }

    #[test]
    fn test_deopt_propagates_language_error() {
        let mut realm = Realm::new();
        let store = ProfileStore::new();
        let trace = TraceSink::new(true);
        let site = CallSiteId::new(FunctionId(0), 3);
        let mut controller = DeoptController::new(3);
        controller.arm(site);

        let arr = realm.new_array(vec![]);
        realm.freeze(&arr);
        let record = push_record(&mut realm, &arr, site);
        let resumed = controller.deoptimize(record, &mut realm, &store, 1, &trace);
        assert_eq!(resumed.result.unwrap_err().kind(), Some(ErrorKind::TypeError));
        assert_eq!(resumed.state, SiteState::GenericFallback);
        assert!(!resumed.invalidated);
        assert!(trace.contains_line("Check Type: NotStableArray2"));
        assert_eq!(controller.stats().resumed_err, 1);
    }

    #[test]
    fn test_state_cycle_and_invalidation() {
        let mut realm = Realm::new();
        let store = ProfileStore::new();
        let trace = TraceSink::disabled();
        let site = CallSiteId::new(FunctionId(0), 9);
        let mut controller = DeoptController::new(2);
        controller.arm(site);

        let arr = realm.new_array(vec![]);
        let push = realm.get(&arr, "push").unwrap();
        store.record(site, &Observation::capture(&realm, &push, &arr, &[]));

        let record = push_record(&mut realm, &arr, site);
        let first = controller.deoptimize(record, &mut realm, &store, 4, &trace);
        assert_eq!(first.result.unwrap(), Value::from(1));
        assert_eq!(controller.state(site), Some(SiteState::GenericFallback));
        controller.enter(site);
        assert_eq!(controller.state(site), Some(SiteState::Speculating));

        let record = push_record(&mut realm, &arr, site);
        let second = controller.deoptimize(record, &mut realm, &store, 4, &trace);
        assert!(second.invalidated);
        assert_eq!(controller.state(site), Some(SiteState::ProfileInvalidated));
        let profile = store.query(site).unwrap();
        assert!(profile.is_blocked(4));
        assert_eq!(profile.samples, 0);

        // Invalidated sites stay put until re-armed by a compilation
        controller.enter(site);
        assert_eq!(controller.state(site), Some(SiteState::ProfileInvalidated));
        controller.arm(site);
        assert_eq!(controller.deopt_count(site), 0);
    }
}
