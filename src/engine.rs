//! Call-site executor with tiered AOT compilation
//!
//! The engine stands in for the interpreter loop. A function body is a Rust
//! closure run through [`Engine::invoke`]; every builtin call inside it goes
//! through [`Engine::call`] with a per-function bytecode offset. Generic calls
//! feed the profile store. Once a function is hot it is compiled, and its
//! specialized sites run their fast paths until a guard fails.

use crate::compiler::{AotCompiler, CompilationUnit, CompiledFunction, CompilerStats, Outcome};
use crate::config::EngineConfig;
use crate::deopt::{DeoptController, DeoptStats, SiteState};
use crate::error::{Error, Result};
use crate::profile::{CallSiteId, FunctionId, Observation, ProfileSnapshot, ProfileStore};
use crate::runtime::{Realm, Value};
use crate::trace::{TraceEvent, TraceSink};
use std::sync::Arc;

/// Execution tier of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CompilationTier {
    /// Generic dispatch with profiling
    Interpreter,
    /// Compiled with specialized call sites
    Aot,
}

/// Tiering state of one function
#[derive(Debug, Clone)]
pub struct FunctionState {
    pub name: String,
    pub record: String,
    pub invocations: u64,
    pub tier: CompilationTier,
    /// Generation of the current compiled body, 0 before the first compile
    pub generation: u32,
    pub compiled: Option<CompiledFunction>,
    pub needs_recompile: bool,
    /// Invocations since a site of this function was invalidated
    pub since_invalidation: u64,
    pub recompiles: u32,
    /// Permanently generic after an internal error or too many recompiles
    pub excluded: bool,
}

impl FunctionState {
    fn new(name: &str, record: &str) -> Self {
        Self {
            name: name.to_string(),
            record: record.to_string(),
            invocations: 0,
            tier: CompilationTier::Interpreter,
            generation: 0,
            compiled: None,
            needs_recompile: false,
            since_invalidation: 0,
            recompiles: 0,
            excluded: false,
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    realm: Realm,
    store: Arc<ProfileStore>,
    compiler: AotCompiler,
    controller: DeoptController,
    trace: TraceSink,
    functions: Vec<FunctionState>,
    current: Option<FunctionId>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_store(config, Arc::new(ProfileStore::new()))
    }

    /// Engine recording into an existing (possibly shared) profile store
    pub fn with_store(config: EngineConfig, store: Arc<ProfileStore>) -> Self {
        store.set_enabled(config.profiling_enabled);
        Self {
            realm: Realm::new().with_echo(config.echo_output),
            compiler: AotCompiler::new(config.specialization.clone()),
            controller: DeoptController::new(config.specialization.max_deopts_per_site),
            trace: TraceSink::with_capacity(config.trace_builtins, config.trace_capacity),
            functions: Vec::new(),
            current: None,
            store,
            config,
        }
    }

    // ==================== Functions ====================

    pub fn define_function(&mut self, name: &str, record: &str) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(FunctionState::new(name, record));
        id
    }

    pub fn function(&self, function: FunctionId) -> Option<&FunctionState> {
        self.functions.get(function.0 as usize)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &FunctionState)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, state)| (FunctionId(i as u32), state))
    }

    /// Run one invocation of `function`, tiering it up first if it is due
    pub fn invoke<F>(&mut self, function: FunctionId, body: F) -> Result<Value>
    where
        F: FnOnce(&mut Engine) -> Result<Value>,
    {
        self.tier_up(function)?;
        let previous = self.current.replace(function);
        let result = body(self);
        self.current = previous;
        result
    }

    fn tier_up(&mut self, function: FunctionId) -> Result<()> {
        let hot = self.config.tiering.hot_threshold;
        let recompile = self.config.tiering.recompile_threshold;
        let aot = self.config.aot_enabled;
        let state = self
            .functions
            .get_mut(function.0 as usize)
            .ok_or_else(|| Error::internal(format!("unknown function {}", function)))?;
        state.invocations += 1;
        if !aot || state.excluded {
            return Ok(());
        }
        let due = match state.tier {
            CompilationTier::Interpreter => state.invocations >= hot,
            CompilationTier::Aot if state.needs_recompile => {
                state.since_invalidation += 1;
                state.since_invalidation >= recompile
            }
            CompilationTier::Aot => false,
        };
        if due {
            self.compile_now(function)?;
        }
        Ok(())
    }

    /// Compile `function` from the current profile and install the result
    pub fn compile_now(&mut self, function: FunctionId) -> Result<()> {
        let max_recompiles = self.config.tiering.max_recompiles;
        let epochs = self.realm.shape_epochs();
        let state = self
            .functions
            .get_mut(function.0 as usize)
            .ok_or_else(|| Error::internal(format!("unknown function {}", function)))?;
        if state.excluded {
            return Ok(());
        }
        if state.generation > 0 && state.recompiles >= max_recompiles {
            tracing::debug!(%function, recompiles = state.recompiles, "recompile limit reached, excluding");
            exclude(state);
            return Ok(());
        }

        let unit = CompilationUnit {
            function,
            name: state.name.clone(),
            record: state.record.clone(),
            generation: state.generation + 1,
            epochs,
        };
        let snapshot = self.store.snapshot_function(function);
        match self.compiler.compile(&unit, &snapshot, &self.trace) {
            Ok(compiled) => {
                for site in compiled.sites() {
                    self.controller.arm(site);
                }
                install(state, compiled);
            }
            Err(e) => {
                tracing::warn!(%function, error = %e, "excluding function from AOT");
                exclude(state);
            }
        }
        Ok(())
    }

    /// Compile every hot interpreted function on the configured worker pool
    pub fn compile_hot_functions(&mut self) -> usize {
        let hot = self.config.tiering.hot_threshold;
        let epochs = self.realm.shape_epochs();
        let jobs: Vec<_> = self
            .functions()
            .filter(|(_, s)| !s.excluded && s.tier == CompilationTier::Interpreter && s.invocations >= hot)
            .map(|(function, s)| {
                let unit = CompilationUnit {
                    function,
                    name: s.name.clone(),
                    record: s.record.clone(),
                    generation: s.generation + 1,
                    epochs: epochs.clone(),
                };
                (unit, self.store.snapshot_function(function))
            })
            .collect();

        let results = self
            .compiler
            .compile_batch(&jobs, self.config.tiering.compile_workers, &self.trace);
        let mut installed = 0;
        for ((unit, _), result) in jobs.iter().zip(results) {
            let Some(state) = self.functions.get_mut(unit.function.0 as usize) else {
                continue;
            };
            match result {
                Ok(compiled) => {
                    for site in compiled.sites() {
                        self.controller.arm(site);
                    }
                    install(state, compiled);
                    installed += 1;
                }
                Err(e) => {
                    tracing::warn!(function = %unit.function, error = %e, "excluding function from AOT");
                    exclude(state);
                }
            }
        }
        installed
    }

    /// Compile every defined function against `snapshot` without installing
    /// anything
    pub fn plan_with(&self, snapshot: &ProfileSnapshot) -> Vec<Result<CompiledFunction>> {
        let epochs = self.realm.shape_epochs();
        let jobs: Vec<_> = self
            .functions()
            .map(|(function, s)| {
                let unit = CompilationUnit {
                    function,
                    name: s.name.clone(),
                    record: s.record.clone(),
                    generation: 1,
                    epochs: epochs.clone(),
                };
                (unit, snapshot.for_function(function))
            })
            .collect();
        self.compiler
            .compile_batch(&jobs, self.config.tiering.compile_workers, &TraceSink::disabled())
    }

    // ==================== Calls ====================

    /// Site `offset` of the function currently executing
    pub fn site(&self, offset: u32) -> Result<CallSiteId> {
        self.current
            .map(|function| CallSiteId::new(function, offset))
            .ok_or_else(|| Error::internal("call site outside of any function"))
    }

    /// Execute the call at `offset`: specialized if compiled, generic otherwise
    pub fn call(&mut self, offset: u32, callee: &Value, this: &Value, args: &[Value]) -> Result<Value> {
        let site = self.site(offset)?;
        let index = site.function.0 as usize;

        let op = if self.config.aot_enabled {
            self.functions
                .get(index)
                .and_then(|s| s.compiled.as_ref())
                .and_then(|c| c.op(site))
                .cloned()
        } else {
            None
        };

        let Some(op) = op else {
            self.store
                .record(site, &Observation::capture(&self.realm, callee, this, args));
            return self.realm.call_function(callee, this, args);
        };

        self.controller.enter(site);
        let observation = Observation::capture(&self.realm, callee, this, args);
        match op.execute(&mut self.realm, callee, this, args) {
            Outcome::Done(result) => {
                if let Some(state) = self.functions.get(index) {
                    self.trace.emit(TraceEvent::InlineBuiltin {
                        builtin: op.builtin,
                        function: state.name.clone(),
                        record: state.record.clone(),
                        site,
                    });
                }
                result
            }
            Outcome::Deopt(record) => {
                let next_generation = self.functions.get(index).map(|s| s.generation + 1).unwrap_or(1);
                let resumed = self.controller.deoptimize(
                    record,
                    &mut self.realm,
                    &self.store,
                    next_generation,
                    &self.trace,
                );
                if resumed.invalidated {
                    if let Some(state) = self.functions.get_mut(index) {
                        if let Some(compiled) = state.compiled.as_mut() {
                            compiled.ops.remove(&site.offset);
                        }
                        state.needs_recompile = true;
                        state.since_invalidation = 0;
                    }
                } else {
                    self.store.record(site, &observation);
                }
                resumed.result
            }
        }
    }

    /// `receiver.name(...args)`
    pub fn call_method(&mut self, offset: u32, receiver: &Value, name: &str, args: &[Value]) -> Result<Value> {
        let callee = self.realm.get(receiver, name)?;
        self.call(offset, &callee, receiver, args)
    }

    /// `Global.name(...args)`, e.g. `Math.fround(x)`
    pub fn call_static(&mut self, offset: u32, global: &str, name: &str, args: &[Value]) -> Result<Value> {
        let holder = self.realm.global(global)?;
        let callee = self.realm.get(&holder, name)?;
        self.call(offset, &callee, &holder, args)
    }

    /// `name(...args)` for a global function such as `BigInt`
    pub fn call_global(&mut self, offset: u32, name: &str, args: &[Value]) -> Result<Value> {
        let callee = self.realm.global(name)?;
        self.call(offset, &callee, &Value::Undefined, args)
    }

    // ==================== Accessors ====================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn realm_mut(&mut self) -> &mut Realm {
        &mut self.realm
    }

    pub fn print(&mut self, line: impl Into<String>) {
        self.realm.print(line);
    }

    pub fn output(&self) -> &[String] {
        self.realm.output()
    }

    pub fn trace(&self) -> &TraceSink {
        &self.trace
    }

    pub fn profile_store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    pub fn site_state(&self, site: CallSiteId) -> Option<SiteState> {
        self.controller.state(site)
    }

    pub fn deopt_stats(&self) -> &DeoptStats {
        self.controller.stats()
    }

    pub fn compiler_stats(&self) -> CompilerStats {
        self.compiler.stats()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn install(state: &mut FunctionState, compiled: CompiledFunction) {
    if state.generation > 0 {
        state.recompiles += 1;
    }
    state.generation = compiled.generation;
    state.compiled = Some(compiled);
    state.tier = CompilationTier::Aot;
    state.needs_recompile = false;
    state.since_invalidation = 0;
}

fn exclude(state: &mut FunctionState) {
    state.excluded = true;
    state.compiled = None;
    state.tier = CompilationTier::Interpreter;
}
