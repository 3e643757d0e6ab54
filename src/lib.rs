//! quickinline: profile-guided speculative builtin inlining for a JavaScript AOT tier
//!
//! Generic call sites record the shapes of their operands. When a function
//! gets hot, the AOT compiler reads a frozen snapshot of those profiles and
//! replaces builtin calls with guarded fast paths. A failing guard hands the
//! call to the deoptimization controller, which resumes it in the generic
//! builtin and invalidates sites that keep failing.
//!
//! # Quick Start
//!
//! ```no_run
//! use quickinline::{Engine, EngineConfig, Value};
//!
//! fn main() -> quickinline::Result<()> {
//!     let mut engine = Engine::new(EngineConfig::new().with_trace(true));
//!     let f = engine.define_function("main", "main");
//!     let arr = engine.realm().new_array(vec![]);
//!     for i in 0..20 {
//!         let arr = arr.clone();
//!         engine.invoke(f, move |e| e.call_method(0, &arr, "push", &[Value::from(i)]))?;
//!     }
//!     for line in engine.trace().lines() {
//!         println!("{}", line);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Pipeline** | [`profile`], [`guards`], [`compiler`], [`deopt`] |
//! | **Execution** | [`engine`], [`runtime`] |
//! | **Support** | [`config`], [`trace`], [`scenarios`], [`error`](Error) |
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

pub mod compiler;
pub mod config;
pub mod deopt;
pub mod engine;
pub mod guards;
pub mod prelude;
pub mod profile;
pub mod runtime;
pub mod scenarios;
pub mod trace;

mod error;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{messages, Error, ErrorKind, Result};
pub use runtime::{Realm, Value};

/// quickinline version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
