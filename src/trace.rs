//! Diagnostic trace channel
//!
//! Inlining decisions and deoptimizations are reported as `TraceEvent`s.
//! Every event is mirrored to `tracing`; a sink with recording enabled also
//! keeps the most recent events so tools and tests can inspect them.

use crate::guards::DeoptType;
use crate::profile::CallSiteId;
use crate::runtime::BuiltinId;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Events a recording sink keeps before dropping the oldest
pub const DEFAULT_TRACE_CAPACITY: usize = 65_536;

/// One diagnostic event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A specialized fast path completed at `site`
    InlineBuiltin {
        builtin: BuiltinId,
        function: String,
        record: String,
        site: CallSiteId,
    },
    /// A guard failed and the call resumed generically
    CheckType { deopt: DeoptType, site: CallSiteId },
    /// The compiler emitted a specialization
    Specialized {
        builtin: BuiltinId,
        site: CallSiteId,
        partial: bool,
    },
    /// The selector declined a site
    Rejected {
        builtin: BuiltinId,
        site: CallSiteId,
        reason: String,
    },
    /// A site exceeded its deoptimization budget
    Invalidated { site: CallSiteId, generation: u32 },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::InlineBuiltin {
                builtin,
                function,
                record,
                ..
            } => write!(
                f,
                "aot inline builtin: {}, caller function name:{}@{}",
                builtin, function, record
            ),
            TraceEvent::CheckType { deopt, .. } => write!(f, "Check Type: {}", deopt),
            TraceEvent::Specialized { builtin, site, partial } => {
                let mode = if *partial { "partial" } else { "full" };
                write!(f, "specialize {} at {} ({})", builtin, site, mode)
            }
            TraceEvent::Rejected { builtin, site, reason } => {
                write!(f, "keep generic {} at {}: {}", builtin, site, reason)
            }
            TraceEvent::Invalidated { site, generation } => {
                write!(f, "invalidate {} for generation {}", site, generation)
            }
        }
    }
}

/// Shared, cloneable event sink. Recording is a ring buffer of `capacity`
/// events.
#[derive(Debug, Clone)]
pub struct TraceSink {
    events: Arc<Mutex<VecDeque<TraceEvent>>>,
    dropped: Arc<AtomicU64>,
    capacity: usize,
    enabled: bool,
}

impl TraceSink {
    pub fn new(enabled: bool) -> Self {
        Self::with_capacity(enabled, DEFAULT_TRACE_CAPACITY)
    }

    pub fn with_capacity(enabled: bool, capacity: usize) -> Self {
        TraceSink {
            events: Arc::new(Mutex::new(VecDeque::new())),
            dropped: Arc::new(AtomicU64::new(0)),
            capacity,
            enabled,
        }
    }

    /// A sink that only mirrors to `tracing`
    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn emit(&self, event: TraceEvent) {
        match &event {
            TraceEvent::CheckType { site, .. } | TraceEvent::Invalidated { site, .. } => {
                tracing::debug!(%site, "{}", event)
            }
            _ => tracing::trace!("{}", event),
        }
        if !self.enabled {
            return;
        }
        if let Ok(mut events) = self.events.lock() {
            if events.len() >= self.capacity {
                events.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            if self.capacity > 0 {
                events.push_back(event);
            }
        }
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Events evicted to stay within capacity
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Rendered lines in emission order
    pub fn lines(&self) -> Vec<String> {
        self.events().iter().map(|e| e.to_string()).collect()
    }

    pub fn contains_line(&self, line: &str) -> bool {
        self.lines().iter().any(|l| l == line)
    }

    pub fn deopts(&self) -> Vec<DeoptType> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                TraceEvent::CheckType { deopt, .. } => Some(*deopt),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
        self.dropped.store(0, Ordering::Relaxed);
    }
}

impl Default for TraceSink {
    fn default() -> Self {
        Self::disabled()
    }
}
