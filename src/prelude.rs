//! Prelude module for convenient imports
//!
//! ```no_run
//! use quickinline::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut engine = Engine::default();
//!     let f = engine.define_function("main", "main");
//!     let x = engine.invoke(f, |e| e.call_static(0, "Math", "fround", &[Value::from(5.5)]))?;
//!     println!("{}", x.display());
//!     Ok(())
//! }
//! ```

// Execution
pub use crate::engine::{CompilationTier, Engine};
pub use crate::runtime::{BuiltinId, Realm, Value};

// Error handling
pub use crate::error::{Error, ErrorKind, Result};

// Configuration
pub use crate::config::{EngineConfig, SpecializationConfig, TieringConfig};

// Profiling and compilation
pub use crate::compiler::{AotCompiler, CompiledFunction, SpecializationPlan};
pub use crate::deopt::{DeoptController, SiteState};
pub use crate::guards::{DeoptType, Guard, GuardCheck};
pub use crate::profile::{CallSiteId, FunctionId, ProfileSnapshot, ProfileStore};
pub use crate::trace::{TraceEvent, TraceSink};
