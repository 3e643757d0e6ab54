//! Frozen profile views and recorded profile files

use super::category::{CallTarget, ShapeCategory};
use super::{CallSiteId, FunctionId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const PROFILE_MAGIC: &[u8; 4] = b"QIPF";
pub const PROFILE_FORMAT_VERSION: u32 = 1;

/// Hit counts per shape category for one operand slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandHistogram {
    pub counts: Vec<u32>,
}

impl OperandHistogram {
    pub fn empty() -> Self {
        OperandHistogram {
            counts: vec![0; ShapeCategory::COUNT],
        }
    }

    pub fn count(&self, category: ShapeCategory) -> u32 {
        self.counts.get(category.index()).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Share of samples falling into any of `categories`
    pub fn share(&self, categories: &[ShapeCategory]) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let hits: u64 = categories.iter().map(|&c| self.count(c) as u64).sum();
        hits as f64 / total as f64
    }

    /// Whether `categories` together reach `ratio`
    pub fn dominated_by(&self, categories: &[ShapeCategory], ratio: f64) -> bool {
        !self.is_empty() && self.share(categories) >= ratio
    }

    /// Most frequent category, if it alone reaches `ratio`
    pub fn dominant(&self, ratio: f64) -> Option<ShapeCategory> {
        let (index, _) = self
            .counts
            .iter()
            .enumerate()
            .max_by_key(|(_, &c)| c)?;
        let category = ShapeCategory::from_index(index)?;
        if self.dominated_by(&[category], ratio) {
            Some(category)
        } else {
            None
        }
    }
}

/// Distribution of one call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub site: CallSiteId,
    pub samples: u32,
    /// Slot 0 is the receiver, slot `i + 1` is argument `i`
    pub operands: Vec<OperandHistogram>,
    pub argc_mask: u32,
    pub target: CallTarget,
    pub blocked_generation: Option<u32>,
}

impl SiteProfile {
    pub fn receiver(&self) -> OperandHistogram {
        self.operands.first().cloned().unwrap_or_else(OperandHistogram::empty)
    }

    /// Histogram of argument `index`; `None` past the profiled slots
    pub fn arg(&self, index: usize) -> Option<OperandHistogram> {
        self.operands.get(index + 1).cloned()
    }

    /// Histogram of argument `index` where calls that omitted the argument
    /// count as `undefined`
    pub fn arg_or_undefined(&self, index: usize) -> OperandHistogram {
        let mut histogram = self.arg(index).unwrap_or_else(OperandHistogram::empty);
        let missing = (self.samples as u64).saturating_sub(histogram.total());
        let slot = ShapeCategory::NullOrUndefined.index();
        if let Some(count) = histogram.counts.get_mut(slot) {
            *count = count.saturating_add(missing.min(u32::MAX as u64) as u32);
        }
        histogram
    }

    /// Argument counts seen at this site
    pub fn argc_values(&self) -> Vec<usize> {
        (0..32).filter(|n| self.argc_mask & (1 << n) != 0).collect()
    }

    pub fn always_argc(&self, argc: usize) -> bool {
        self.argc_mask == 1 << argc
    }

    pub fn is_blocked(&self, generation: u32) -> bool {
        self.blocked_generation == Some(generation)
    }
}

/// Read-only set of site profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    format_version: u32,
    sites: Vec<SiteProfile>,
}

#[derive(Serialize)]
struct JsonView<'a> {
    format_version: u32,
    sites: &'a [SiteProfile],
}

impl ProfileSnapshot {
    pub fn new(sites: Vec<SiteProfile>) -> Self {
        ProfileSnapshot {
            format_version: PROFILE_FORMAT_VERSION,
            sites,
        }
    }

    pub fn sites(&self) -> &[SiteProfile] {
        &self.sites
    }

    pub fn get(&self, site: CallSiteId) -> Option<&SiteProfile> {
        self.sites.iter().find(|p| p.site == site)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Profiles belonging to `function`
    pub fn for_function(&self, function: FunctionId) -> ProfileSnapshot {
        ProfileSnapshot::new(
            self.sites
                .iter()
                .filter(|p| p.site.function == function)
                .cloned()
                .collect(),
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self).map_err(|e| Error::ProfileError(e.to_string()))?;
        let mut bytes = Vec::with_capacity(body.len() + 8);
        bytes.extend_from_slice(PROFILE_MAGIC);
        bytes.extend_from_slice(&PROFILE_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 || &bytes[..4] != PROFILE_MAGIC {
            return Err(Error::ProfileError("not a recorded profile".to_string()));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != PROFILE_FORMAT_VERSION {
            return Err(Error::ProfileError(format!(
                "unsupported profile version {} (expected {})",
                version, PROFILE_FORMAT_VERSION
            )));
        }
        bincode::deserialize(&bytes[8..]).map_err(|e| Error::ProfileError(e.to_string()))
    }

    /// Write a recorded profile file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Read a recorded profile file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&JsonView {
            format_version: self.format_version,
            sites: &self.sites,
        })
        .map_err(|e| Error::ProfileError(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::ProfileError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::BuiltinId;

    fn profile(offset: u32) -> SiteProfile {
        let mut receiver = OperandHistogram::empty();
        receiver.counts[ShapeCategory::StableArray.index()] = 9;
        receiver.counts[ShapeCategory::NotStableArray2.index()] = 1;
        SiteProfile {
            site: CallSiteId::new(FunctionId(3), offset),
            samples: 10,
            operands: vec![receiver, OperandHistogram::empty()],
            argc_mask: 0b10,
            target: CallTarget::Monomorphic(BuiltinId::ArrayPush),
            blocked_generation: None,
        }
    }

    #[test]
    fn test_dominance() {
        let p = profile(0);
        assert_eq!(p.receiver().dominant(0.9), Some(ShapeCategory::StableArray));
        assert_eq!(p.receiver().dominant(0.95), None);
        assert!(p.arg(0).unwrap().dominant(0.5).is_none());
        assert!(p.always_argc(1));
        assert_eq!(p.argc_values(), vec![1]);
    }

    #[test]
    fn test_missing_args_count_as_undefined() {
        let p = profile(0);
        let arg = p.arg_or_undefined(0);
        assert_eq!(arg.count(ShapeCategory::NullOrUndefined), 10);
        assert_eq!(arg.dominant(0.9), Some(ShapeCategory::NullOrUndefined));
        assert_eq!(p.arg_or_undefined(2).total(), 10);
    }

    #[test]
    fn test_bytes_round_trip() {
        let snapshot = ProfileSnapshot::new(vec![profile(4), profile(8)]);
        let bytes = snapshot.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"QIPF");
        assert_eq!(ProfileSnapshot::from_bytes(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        let err = ProfileSnapshot::from_bytes(b"not a profile").unwrap_err();
        assert!(matches!(err, Error::ProfileError(_)));
    }

    #[test]
    fn test_json_export() {
        let snapshot = ProfileSnapshot::new(vec![profile(4)]);
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("ArrayPush"));
        assert_eq!(ProfileSnapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn test_for_function_filters() {
        let mut other = profile(1);
        other.site = CallSiteId::new(FunctionId(9), 1);
        let snapshot = ProfileSnapshot::new(vec![profile(2), other]);
        assert_eq!(snapshot.for_function(FunctionId(3)).len(), 1);
    }
}
