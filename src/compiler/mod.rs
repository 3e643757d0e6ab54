//! AOT Builtin Inlining Compiler
//!
//! Compiles one function at a time from a frozen `ProfileSnapshot`: every
//! profiled call site whose target was monomorphic on a builtin goes through
//! the selector and, if accepted, the emitter. The result is a
//! `CompiledFunction` mapping call-site offsets to specialized operations.
//!
//! Independent functions can be compiled in parallel with
//! [`AotCompiler::compile_batch`]; each worker only reads its own snapshot.

pub mod emitter;
pub mod fast_path;
pub mod selector;

pub use emitter::emit;
pub use fast_path::{FastPath, Outcome, SpecializedOperation};
pub use selector::{
    decide, select, ArgMode, PlanMode, RejectReason, SelectionContext, SpecializationPlan,
};

use crate::config::SpecializationConfig;
use crate::error::{Error, Result};
use crate::profile::{CallSiteId, CallTarget, FunctionId, ProfileSnapshot};
use crate::runtime::shape::ShapeEpochs;
use crate::trace::{TraceEvent, TraceSink};
use rustc_hash::FxHashMap as HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ==================== Compilation Units ====================

/// Everything the compiler needs to know about one function
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub function: FunctionId,
    pub name: String,
    /// Record name shown in `aot inline builtin` trace lines
    pub record: String,
    /// Generation this compilation produces (1 for the first compile)
    pub generation: u32,
    /// Builtin shape generations at the time the unit was queued
    pub epochs: ShapeEpochs,
}

/// Output of compiling one function
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub function: FunctionId,
    pub name: String,
    pub generation: u32,
    /// Specialized operations keyed by call-site offset
    pub ops: HashMap<u32, Arc<SpecializedOperation>>,
    /// Sites the selector declined, with the reason
    pub rejected: Vec<(CallSiteId, RejectReason)>,
    pub compile_time: Duration,
}

impl CompiledFunction {
    pub fn op(&self, site: CallSiteId) -> Option<&Arc<SpecializedOperation>> {
        if site.function != self.function {
            return None;
        }
        self.ops.get(&site.offset)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Specialized sites in offset order
    pub fn sites(&self) -> Vec<CallSiteId> {
        let mut offsets: Vec<u32> = self.ops.keys().copied().collect();
        offsets.sort_unstable();
        offsets
            .into_iter()
            .map(|offset| CallSiteId::new(self.function, offset))
            .collect()
    }
}

// ==================== Compiler Stats ====================

/// Snapshot of compiler counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerStats {
    pub functions_compiled: u64,
    pub functions_failed: u64,
    pub full_specializations: u64,
    pub partial_specializations: u64,
    pub sites_rejected: u64,
    pub emission_errors: u64,
    pub total_compilation_time: Duration,
}

#[derive(Debug, Default)]
struct StatCounters {
    functions_compiled: AtomicU64,
    functions_failed: AtomicU64,
    full: AtomicU64,
    partial: AtomicU64,
    rejected: AtomicU64,
    emission_errors: AtomicU64,
    compile_nanos: AtomicU64,
}

// ==================== AOT Compiler ====================

/// Profile-guided builtin inliner
#[derive(Debug)]
pub struct AotCompiler {
    config: SpecializationConfig,
    stats: StatCounters,
}

impl AotCompiler {
    pub fn new(config: SpecializationConfig) -> Self {
        Self {
            config,
            stats: StatCounters::default(),
        }
    }

    pub fn config(&self) -> &SpecializationConfig {
        &self.config
    }

    /// Compile one function. A snapshot holding sites of another function is
    /// an internal error and leaves the whole function uncompiled.
    pub fn compile(
        &self,
        unit: &CompilationUnit,
        snapshot: &ProfileSnapshot,
        trace: &TraceSink,
    ) -> Result<CompiledFunction> {
        let start = Instant::now();
        let result = self.compile_sites(unit, snapshot, trace);
        let elapsed = start.elapsed();
        self.stats
            .compile_nanos
            .fetch_add(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::Relaxed);

        match result {
            Ok((ops, rejected)) => {
                self.stats.functions_compiled.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    function = %unit.function,
                    name = %unit.name,
                    generation = unit.generation,
                    specialized = ops.len(),
                    rejected = rejected.len(),
                    "compiled"
                );
                Ok(CompiledFunction {
                    function: unit.function,
                    name: unit.name.clone(),
                    generation: unit.generation,
                    ops,
                    rejected,
                    compile_time: elapsed,
                })
            }
            Err(e) => {
                self.stats.functions_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(function = %unit.function, error = %e, "compilation failed");
                Err(e)
            }
        }
    }

    fn compile_sites(
        &self,
        unit: &CompilationUnit,
        snapshot: &ProfileSnapshot,
        trace: &TraceSink,
    ) -> Result<(HashMap<u32, Arc<SpecializedOperation>>, Vec<(CallSiteId, RejectReason)>)> {
        let ctx = SelectionContext {
            config: &self.config,
            generation: unit.generation,
            epochs: &unit.epochs,
        };
        let mut ops = HashMap::default();
        let mut rejected = Vec::new();

        for profile in snapshot.sites() {
            let site = profile.site;
            if site.function != unit.function {
                return Err(Error::internal(format!(
                    "profile for {} handed to {}",
                    site, unit.function
                )));
            }
            let CallTarget::Monomorphic(builtin) = profile.target else {
                continue;
            };

            match selector::decide(site, profile, builtin, &ctx) {
                Ok(plan) => {
                    let partial = plan.mode == PlanMode::Partial;
                    match emitter::emit(plan) {
                        Ok(op) => {
                            if partial {
                                self.stats.partial.fetch_add(1, Ordering::Relaxed);
                            } else {
                                self.stats.full.fetch_add(1, Ordering::Relaxed);
                            }
                            tracing::debug!(%site, %builtin, partial, "specialize");
                            trace.emit(TraceEvent::Specialized {
                                builtin,
                                site,
                                partial,
                            });
                            ops.insert(site.offset, Arc::new(op));
                        }
                        Err(e) => {
                            self.stats.emission_errors.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(%site, %builtin, error = %e, "emission failed, site stays generic");
                        }
                    }
                }
                Err(reason) => {
                    self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%site, %builtin, %reason, "keep generic");
                    trace.emit(TraceEvent::Rejected {
                        builtin,
                        site,
                        reason: reason.to_string(),
                    });
                    rejected.push((site, reason));
                }
            }
        }
        Ok((ops, rejected))
    }

    /// Compile independent functions on up to `workers` scoped threads.
    /// Results come back in input order.
    pub fn compile_batch(
        &self,
        jobs: &[(CompilationUnit, ProfileSnapshot)],
        workers: usize,
        trace: &TraceSink,
    ) -> Vec<Result<CompiledFunction>> {
        let workers = workers.clamp(1, jobs.len().max(1));
        if workers == 1 {
            return jobs
                .iter()
                .map(|(unit, snapshot)| self.compile(unit, snapshot, trace))
                .collect();
        }

        let chunk = jobs.len().div_ceil(workers);
        std::thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .chunks(chunk)
                .map(|batch| {
                    scope.spawn(move || {
                        batch
                            .iter()
                            .map(|(unit, snapshot)| self.compile(unit, snapshot, trace))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| vec![Err(Error::internal("compiler worker panicked"))])
                })
                .collect()
        })
    }

    pub fn stats(&self) -> CompilerStats {
        CompilerStats {
            functions_compiled: self.stats.functions_compiled.load(Ordering::Relaxed),
            functions_failed: self.stats.functions_failed.load(Ordering::Relaxed),
            full_specializations: self.stats.full.load(Ordering::Relaxed),
            partial_specializations: self.stats.partial.load(Ordering::Relaxed),
            sites_rejected: self.stats.rejected.load(Ordering::Relaxed),
            emission_errors: self.stats.emission_errors.load(Ordering::Relaxed),
            total_compilation_time: Duration::from_nanos(self.stats.compile_nanos.load(Ordering::Relaxed)),
        }
    }
}

impl Default for AotCompiler {
    fn default() -> Self {
        Self::new(SpecializationConfig::default())
    }
}
