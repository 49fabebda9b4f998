#![forbid(unsafe_code)]

//! Error type and the shared error reporter.
//!
//! Failures inside framework-owned evaluation (render getters) are returned
//! as [`ReactiveError`]. Failures inside application-owned code (user
//! watchers, computed getters, next-tick callbacks, synchronous re-runs
//! triggered from a setter) go through [`handle_error`] instead, which
//! forwards to the installed handler or logs at `ERROR`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::config;

/// Total number of errors routed through [`handle_error`].
static ERRORS_REPORTED_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total reported-error count (for diagnostics/telemetry).
#[must_use]
pub fn errors_reported_total() -> u64 {
    ERRORS_REPORTED_TOTAL.load(Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// Failure returned by an evaluation function or callback.
    #[error("{0}")]
    Evaluation(String),

    #[error("watcher \"{expression}\" re-entered its own evaluation")]
    ReentrantEvaluation { expression: String },

    #[error("watcher \"{expression}\" re-entered its own callback")]
    ReentrantCallback { expression: String },

    #[error(
        "possible infinite update loop in watcher \"{expression}\" (id {id}): \
         re-queued more than {limit} times in one flush"
    )]
    CircularUpdate {
        id: u64,
        expression: String,
        limit: usize,
    },
}

impl ReactiveError {
    /// Convenience constructor for application failures.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }
}

/// Where a reported error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorContext {
    /// Getter of a user watcher.
    Getter(String),
    /// Getter of a computed value.
    Computed(String),
    /// Result callback of a user watcher.
    Callback(String),
    /// Immediate first invocation of a watch callback.
    ImmediateCallback(String),
    /// Synchronous re-run triggered from inside a write.
    SyncRun(String),
    /// Flush pass of the scheduler.
    Scheduler,
    /// Callback drained by the next-tick queue.
    NextTick,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Getter(expr) => write!(f, "getter for watcher \"{expr}\""),
            Self::Computed(expr) => write!(f, "getter for computed \"{expr}\""),
            Self::Callback(expr) => write!(f, "callback for watcher \"{expr}\""),
            Self::ImmediateCallback(expr) => {
                write!(f, "callback for immediate watcher \"{expr}\"")
            }
            Self::SyncRun(expr) => write!(f, "sync run of watcher \"{expr}\""),
            Self::Scheduler => f.write_str("scheduler flush"),
            Self::NextTick => f.write_str("nextTick"),
        }
    }
}

/// Report an error that has no caller to propagate to.
pub fn handle_error(err: &ReactiveError, context: &ErrorContext) {
    ERRORS_REPORTED_TOTAL.fetch_add(1, Ordering::Relaxed);
    match config::error_handler() {
        Some(handler) => handler(err, context),
        None => tracing::error!(context = %context, "{err}"),
    }
}
