//! Deoptimization statistics

use crate::guards::DeoptType;
use rustc_hash::FxHashMap as HashMap;

#[derive(Debug, Clone, Default)]
pub struct DeoptStats {
    /// Guard failures handled
    pub total: u64,
    pub by_type: HashMap<DeoptType, u64>,
    /// Generic resumptions that returned a value
    pub resumed_ok: u64,
    /// Generic resumptions that raised a language error
    pub resumed_err: u64,
    pub invalidations: u64,
}

impl DeoptStats {
    pub fn record(&mut self, reason: DeoptType) {
        self.total += 1;
        *self.by_type.entry(reason).or_insert(0) += 1;
    }

    pub fn count(&self, reason: DeoptType) -> u64 {
        self.by_type.get(&reason).copied().unwrap_or(0)
    }

    /// Most frequent cause
    pub fn top_reason(&self) -> Option<DeoptType> {
        self.by_type
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(reason, _)| *reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut stats = DeoptStats::default();
        stats.record(DeoptType::NotNumber1);
        stats.record(DeoptType::NotStableArray2);
        stats.record(DeoptType::NotStableArray2);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.count(DeoptType::NotStableArray2), 2);
        assert_eq!(stats.top_reason(), Some(DeoptType::NotStableArray2));
    }
}
