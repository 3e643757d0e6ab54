//! Engine configuration
//!
//! Plain structs with `Default` and builder helpers. A configuration can be
//! loaded from a JSON file; missing fields take their default values.

use crate::error::{Error, Result};
use crate::trace::DEFAULT_TRACE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Knobs for the builtin specialization selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecializationConfig {
    /// Minimum number of profiled samples before a site is considered
    pub min_samples: u32,
    /// Share of samples a category needs to be dominant (0.0..=1.0)
    pub dominance_ratio: f64,
    /// Widest `BigInt.asUintN`/`asIntN` width computed without bigint arithmetic
    pub bigint_fast_bits: u32,
    /// Deoptimizations a site may take before its profile is invalidated
    pub max_deopts_per_site: u32,
    /// Emit guarded direct calls to the generic core when a full plan is not possible
    pub enable_partial_inlining: bool,
}

impl Default for SpecializationConfig {
    fn default() -> Self {
        Self {
            min_samples: 8,
            dominance_ratio: 0.9,
            bigint_fast_bits: 64,
            max_deopts_per_site: 3,
            enable_partial_inlining: true,
        }
    }
}

/// Tier-up and recompilation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TieringConfig {
    /// Invocations before a function is AOT compiled
    pub hot_threshold: u64,
    /// Invocations after an invalidation before the function is recompiled
    pub recompile_threshold: u64,
    /// Recompilations allowed before a function is excluded from AOT
    pub max_recompiles: u32,
    /// Worker threads used by batch compilation
    pub compile_workers: usize,
}

impl Default for TieringConfig {
    fn default() -> Self {
        Self {
            hot_threshold: 10,
            recompile_threshold: 10,
            max_recompiles: 5,
            compile_workers: 4,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Compile hot functions and run specialized call sites
    pub aot_enabled: bool,
    /// Record operand observations at generic call sites
    pub profiling_enabled: bool,
    /// Record `aot inline builtin` / `Check Type` lines in the trace sink
    pub trace_builtins: bool,
    /// Events the trace sink keeps before dropping the oldest
    pub trace_capacity: usize,
    /// Echo `print` output to stdout as it happens
    pub echo_output: bool,
    pub specialization: SpecializationConfig,
    pub tiering: TieringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            aot_enabled: true,
            profiling_enabled: true,
            trace_builtins: false,
            trace_capacity: DEFAULT_TRACE_CAPACITY,
            echo_output: false,
            specialization: SpecializationConfig::default(),
            tiering: TieringConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that never leaves the generic tier
    pub fn interpreter_only() -> Self {
        Self {
            aot_enabled: false,
            ..Self::default()
        }
    }

    pub fn with_aot(mut self, enabled: bool) -> Self {
        self.aot_enabled = enabled;
        self
    }

    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace_builtins = enabled;
        self
    }

    pub fn with_echo(mut self, enabled: bool) -> Self {
        self.echo_output = enabled;
        self
    }

    pub fn with_hot_threshold(mut self, threshold: u64) -> Self {
        self.tiering.hot_threshold = threshold;
        self
    }

    pub fn with_max_deopts(mut self, max: u32) -> Self {
        self.specialization.max_deopts_per_site = max;
        self
    }

    /// Parse a configuration from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(text).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject settings the selector and tiering policy cannot honor
    pub fn validate(&self) -> Result<()> {
        let ratio = self.specialization.dominance_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(Error::ConfigError(format!(
                "dominance_ratio must be in (0, 1], got {}",
                ratio
            )));
        }
        if self.specialization.bigint_fast_bits > 64 {
            return Err(Error::ConfigError(format!(
                "bigint_fast_bits must be at most 64, got {}",
                self.specialization.bigint_fast_bits
            )));
        }
        if self.trace_builtins && self.trace_capacity == 0 {
            return Err(Error::ConfigError(
                "trace_capacity must be at least 1 when tracing".to_string(),
            ));
        }
        if self.tiering.compile_workers == 0 {
            return Err(Error::ConfigError(
                "compile_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.aot_enabled);
        assert_eq!(config.specialization.bigint_fast_bits, 64);
        assert_eq!(config.tiering.max_recompiles, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "trace_builtins": true, "specialization": { "min_samples": 2 } }"#,
        )
        .unwrap();
        assert!(config.trace_builtins);
        assert_eq!(config.specialization.min_samples, 2);
        assert_eq!(config.specialization.max_deopts_per_site, 3);
        assert_eq!(config.tiering.hot_threshold, 10);
        assert_eq!(config.trace_capacity, DEFAULT_TRACE_CAPACITY);
    }

    #[test]
    fn test_zero_trace_capacity_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "trace_builtins": true, "trace_capacity": 0 }"#)
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "specialization": { "dominance_ratio": 1.5 } }"#)
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::interpreter_only()
            .with_trace(true)
            .with_hot_threshold(3);
        assert!(!config.aot_enabled);
        assert!(config.trace_builtins);
        assert_eq!(config.tiering.hot_threshold, 3);
    }
}
