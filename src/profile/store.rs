//! Concurrent per-call-site profile store
//!
//! Sites are created lazily on first record. After creation, recording is a
//! read lock plus relaxed atomic increments. Counters saturate at `u32::MAX`.
//! Compiler workers read frozen `ProfileSnapshot`s and never touch the live
//! counters.

use super::category::{CallTarget, ObservedTarget, ShapeCategory};
use super::snapshot::{OperandHistogram, ProfileSnapshot, SiteProfile};
use super::{CallSiteId, FunctionId, Observation, OPERAND_SLOTS};
use rustc_hash::FxHashMap as HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Live counters of one call site
#[derive(Debug)]
pub struct SiteCounters {
    operands: [[AtomicU32; ShapeCategory::COUNT]; OPERAND_SLOTS],
    argc_mask: AtomicU32,
    target: AtomicU32,
    samples: AtomicU32,
    /// Generation the site is blocked for (0 = not blocked)
    blocked_generation: AtomicU32,
}

fn saturating_bump(counter: &AtomicU32, by: u32) -> bool {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| c.checked_add(by))
        .is_ok()
}

impl SiteCounters {
    fn new() -> Self {
        SiteCounters {
            operands: std::array::from_fn(|_| std::array::from_fn(|_| AtomicU32::new(0))),
            argc_mask: AtomicU32::new(0),
            target: AtomicU32::new(0),
            samples: AtomicU32::new(0),
            blocked_generation: AtomicU32::new(0),
        }
    }

    fn record(&self, observation: &Observation) -> bool {
        if !saturating_bump(&self.samples, 1) {
            return false;
        }
        let slots = std::iter::once(observation.receiver).chain(observation.args.iter().copied());
        for (slot, category) in slots.take(OPERAND_SLOTS).enumerate() {
            saturating_bump(&self.operands[slot][category.index()], 1);
        }
        self.argc_mask
            .fetch_or(1 << observation.argc.min(31), Ordering::Relaxed);
        self.merge_target(CallTarget::encode_observed(observation.target));
        true
    }

    fn merge_target(&self, observed: u32) {
        let _ = self
            .target
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                let merged = CallTarget::decode(current).merge(CallTarget::decode(observed));
                let encoded = merged.encode();
                if encoded == current {
                    None
                } else {
                    Some(encoded)
                }
            });
    }

    fn reset(&self) {
        for slot in &self.operands {
            for counter in slot {
                counter.store(0, Ordering::Relaxed);
            }
        }
        self.argc_mask.store(0, Ordering::Relaxed);
        self.target.store(CallTarget::Unseen.encode(), Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }

    fn to_profile(&self, site: CallSiteId) -> SiteProfile {
        let blocked = self.blocked_generation.load(Ordering::Relaxed);
        SiteProfile {
            site,
            samples: self.samples.load(Ordering::Relaxed),
            operands: self
                .operands
                .iter()
                .map(|slot| OperandHistogram {
                    counts: slot.iter().map(|c| c.load(Ordering::Relaxed)).collect(),
                })
                .collect(),
            argc_mask: self.argc_mask.load(Ordering::Relaxed),
            target: CallTarget::decode(self.target.load(Ordering::Relaxed)),
            blocked_generation: if blocked == 0 { None } else { Some(blocked) },
        }
    }

    fn absorb(&self, profile: &SiteProfile) {
        saturating_add(&self.samples, profile.samples);
        for (slot, histogram) in self.operands.iter().zip(&profile.operands) {
            for (counter, &count) in slot.iter().zip(&histogram.counts) {
                saturating_add(counter, count);
            }
        }
        self.argc_mask.fetch_or(profile.argc_mask, Ordering::Relaxed);
        if profile.target != CallTarget::Unseen {
            self.merge_target(profile.target.encode());
        }
    }
}

fn saturating_add(counter: &AtomicU32, by: u32) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| Some(c.saturating_add(by)));
}

/// Counters describing the store itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileStoreStats {
    pub sites: usize,
    pub records: u64,
    pub dropped: u64,
    pub invalidations: u64,
}

/// Shared profile store. Hand it around as `Arc<ProfileStore>`.
#[derive(Debug)]
pub struct ProfileStore {
    sites: RwLock<HashMap<CallSiteId, Arc<SiteCounters>>>,
    enabled: AtomicBool,
    records: AtomicU64,
    dropped: AtomicU64,
    invalidations: AtomicU64,
}

impl ProfileStore {
    pub fn new() -> Self {
        ProfileStore {
            sites: RwLock::new(HashMap::default()),
            enabled: AtomicBool::new(true),
            records: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn counters(&self, site: CallSiteId) -> Arc<SiteCounters> {
        if let Some(counters) = self
            .sites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&site)
        {
            return counters.clone();
        }
        self.sites
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(site)
            .or_insert_with(|| Arc::new(SiteCounters::new()))
            .clone()
    }

    fn existing(&self, site: CallSiteId) -> Option<Arc<SiteCounters>> {
        self.sites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&site)
            .cloned()
    }

    /// Append one observation. Never fails; disabled or saturated records are dropped.
    pub fn record(&self, site: CallSiteId, observation: &Observation) {
        if !self.is_enabled() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if self.counters(site).record(observation) {
            self.records.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current distribution of a site
    pub fn query(&self, site: CallSiteId) -> Option<SiteProfile> {
        self.existing(site).map(|c| c.to_profile(site))
    }

    /// Read-only view of `sites` for one compilation unit
    pub fn snapshot(&self, sites: &[CallSiteId]) -> ProfileSnapshot {
        let map = self.sites.read().unwrap_or_else(|e| e.into_inner());
        let mut profiles: Vec<SiteProfile> = sites
            .iter()
            .filter_map(|site| map.get(site).map(|c| c.to_profile(*site)))
            .collect();
        profiles.sort_by_key(|p| p.site);
        ProfileSnapshot::new(profiles)
    }

    pub fn snapshot_function(&self, function: FunctionId) -> ProfileSnapshot {
        let sites = self.sites_for(function);
        self.snapshot(&sites)
    }

    pub fn snapshot_all(&self) -> ProfileSnapshot {
        let sites: Vec<CallSiteId> = self
            .sites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect();
        self.snapshot(&sites)
    }

    /// Profiled sites of `function`, in offset order
    pub fn sites_for(&self, function: FunctionId) -> Vec<CallSiteId> {
        let mut sites: Vec<CallSiteId> = self
            .sites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .filter(|site| site.function == function)
            .copied()
            .collect();
        sites.sort();
        sites
    }

    /// Reset a site and block re-specialization for `generation`
    pub fn invalidate(&self, site: CallSiteId, generation: u32) {
        let counters = self.counters(site);
        counters.reset();
        counters
            .blocked_generation
            .store(generation.max(1), Ordering::Relaxed);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%site, generation, "profile invalidated");
    }

    /// Merge a recorded snapshot into the live counters
    pub fn import(&self, snapshot: &ProfileSnapshot) {
        for profile in snapshot.sites() {
            self.counters(profile.site).absorb(profile);
        }
    }

    pub fn stats(&self) -> ProfileStoreStats {
        ProfileStoreStats {
            sites: self.sites.read().unwrap_or_else(|e| e.into_inner()).len(),
            records: self.records.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Observed target of a site, if any
    pub fn target(&self, site: CallSiteId) -> CallTarget {
        self.existing(site)
            .map(|c| CallTarget::decode(c.target.load(Ordering::Relaxed)))
            .unwrap_or(CallTarget::Unseen)
    }
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ObservedTarget> for CallTarget {
    fn from(target: ObservedTarget) -> Self {
        match target {
            ObservedTarget::Builtin(id) => CallTarget::Monomorphic(id),
            ObservedTarget::Other => CallTarget::NonBuiltin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::BuiltinId;

    fn site(offset: u32) -> CallSiteId {
        CallSiteId::new(FunctionId(0), offset)
    }

    fn push_obs(argc: usize) -> Observation {
        Observation {
            target: ObservedTarget::Builtin(BuiltinId::ArrayPush),
            receiver: ShapeCategory::StableArray,
            args: vec![ShapeCategory::Int; argc],
            argc,
        }
    }

    #[test]
    fn test_record_and_query() {
        let store = ProfileStore::new();
        assert!(store.query(site(1)).is_none());
        store.record(site(1), &push_obs(1));
        store.record(site(1), &push_obs(0));
        let profile = store.query(site(1)).unwrap();
        assert_eq!(profile.samples, 2);
        assert_eq!(profile.receiver().count(ShapeCategory::StableArray), 2);
        assert_eq!(profile.arg(0).unwrap().count(ShapeCategory::Int), 1);
        assert_eq!(profile.argc_values(), vec![0, 1]);
        assert_eq!(profile.target, CallTarget::Monomorphic(BuiltinId::ArrayPush));
    }

    #[test]
    fn test_disabled_store_drops() {
        let store = ProfileStore::new();
        store.set_enabled(false);
        store.record(site(1), &push_obs(0));
        assert!(store.query(site(1)).is_none());
        assert_eq!(store.stats().dropped, 1);
    }

    #[test]
    fn test_counters_saturate() {
        let store = ProfileStore::new();
        store.record(site(1), &push_obs(0));
        let counters = store.counters(site(1));
        counters.samples.store(u32::MAX - 1, Ordering::Relaxed);
        counters.operands[0][ShapeCategory::StableArray.index()].store(u32::MAX - 1, Ordering::Relaxed);
        store.record(site(1), &push_obs(0));
        store.record(site(1), &push_obs(0));
        let profile = store.query(site(1)).unwrap();
        assert_eq!(profile.samples, u32::MAX);
        assert_eq!(profile.receiver().count(ShapeCategory::StableArray), u32::MAX);
        assert_eq!(store.stats().dropped, 1);
    }

    #[test]
    fn test_repeated_observation_keeps_decision() {
        use crate::compiler::selector::{decide, SelectionContext};
        use crate::config::SpecializationConfig;
        use crate::runtime::ShapeTable;

        let config = SpecializationConfig::default();
        let epochs = ShapeTable::new().epochs();
        let ctx = SelectionContext {
            config: &config,
            generation: 1,
            epochs: &epochs,
        };
        let store = ProfileStore::new();
        let observation = push_obs(1);
        let n = config.min_samples;
        let decide_now = |store: &ProfileStore| {
            let profile = store.query(site(1)).unwrap();
            decide(site(1), &profile, BuiltinId::ArrayPush, &ctx)
        };

        for _ in 0..n {
            store.record(site(1), &observation);
        }
        let stable = decide_now(&store);
        assert!(stable.is_ok());

        for _ in 0..99 * n {
            store.record(site(1), &observation);
        }
        assert_eq!(decide_now(&store), stable);

        let counters = store.counters(site(1));
        counters.samples.store(u32::MAX - 3, Ordering::Relaxed);
        counters.operands[0][ShapeCategory::StableArray.index()].store(u32::MAX - 3, Ordering::Relaxed);
        counters.operands[1][ShapeCategory::Int.index()].store(u32::MAX - 3, Ordering::Relaxed);
        for _ in 0..100 * n {
            store.record(site(1), &observation);
        }
        assert_eq!(store.query(site(1)).unwrap().samples, u32::MAX);
        assert_eq!(decide_now(&store), stable);
    }

    #[test]
    fn test_target_becomes_polymorphic() {
        let store = ProfileStore::new();
        store.record(site(1), &push_obs(0));
        let mut other = push_obs(0);
        other.target = ObservedTarget::Other;
        store.record(site(1), &other);
        assert_eq!(store.target(site(1)), CallTarget::Polymorphic);
    }

    #[test]
    fn test_invalidate_resets_and_blocks() {
        let store = ProfileStore::new();
        store.record(site(1), &push_obs(0));
        store.invalidate(site(1), 2);
        let profile = store.query(site(1)).unwrap();
        assert_eq!(profile.samples, 0);
        assert!(profile.is_blocked(2));
        assert!(!profile.is_blocked(3));
    }

    #[test]
    fn test_concurrent_recording() {
        let store = Arc::new(ProfileStore::new());
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let store = store.clone();
                scope.spawn(move || {
                    for i in 0..250u32 {
                        store.record(site(i % 3), &push_obs(1));
                    }
                });
            }
        });
        let total: u32 = (0..3).map(|i| store.query(site(i)).unwrap().samples).sum();
        assert_eq!(total, 1000);
        assert_eq!(store.stats().records, 1000);
    }

    #[test]
    fn test_sites_for_function() {
        let store = ProfileStore::new();
        store.record(CallSiteId::new(FunctionId(1), 9), &push_obs(0));
        store.record(CallSiteId::new(FunctionId(1), 2), &push_obs(0));
        store.record(CallSiteId::new(FunctionId(2), 1), &push_obs(0));
        let sites = store.sites_for(FunctionId(1));
        assert_eq!(sites, vec![CallSiteId::new(FunctionId(1), 2), CallSiteId::new(FunctionId(1), 9)]);
        assert_eq!(store.snapshot_function(FunctionId(1)).len(), 2);
    }
}
