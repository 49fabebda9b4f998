#![forbid(unsafe_code)]

//! Engine configuration and diagnostic handlers.
//!
//! The active [`Config`] and the installed handlers are thread-local, like the
//! rest of the engine state. Hosts typically call
//! `set_config(Config::from_env())` once at startup.
//!
//! # Environment
//!
//! | Variable               | Field              | Default |
//! |------------------------|--------------------|---------|
//! | `FRX_SILENT`           | `silent`           | `false` |
//! | `FRX_ASYNC`            | `async_mode`       | `true`  |
//! | `FRX_MAX_UPDATE_COUNT` | `max_update_count` | `100`   |

use std::cell::{Cell, RefCell};
use std::env;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ErrorContext, ReactiveError};

/// Runs allowed per watcher within one flush before it is treated as a
/// circular update.
pub const MAX_UPDATE_COUNT: usize = 100;

/// Total number of advisory warnings emitted (including silenced ones).
static WARNINGS_EMITTED_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total warning count (for diagnostics/telemetry).
#[must_use]
pub fn warnings_emitted_total() -> u64 {
    WARNINGS_EMITTED_TOTAL.load(Ordering::Relaxed)
}

pub type ErrorHandler = Rc<dyn Fn(&ReactiveError, &ErrorContext)>;
pub type WarnHandler = Rc<dyn Fn(&str)>;

/// Engine-wide behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Suppress advisory warnings.
    pub silent: bool,
    /// Defer flushes to the next tick. When `false` the scheduler flushes
    /// inside `queue_watcher` and deps notify in id order.
    pub async_mode: bool,
    /// Circular-update cap per watcher per flush.
    pub max_update_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            silent: false,
            async_mode: true,
            max_update_count: MAX_UPDATE_COUNT,
        }
    }
}

impl Config {
    /// Defaults overridden by `FRX_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = env::var("FRX_SILENT") {
            config.silent = parse_flag(&val);
        }
        if let Ok(val) = env::var("FRX_ASYNC") {
            config.async_mode = parse_flag(&val);
        }
        if let Ok(val) = env::var("FRX_MAX_UPDATE_COUNT")
            && let Ok(n) = val.parse()
        {
            config.max_update_count = n;
        }
        config
    }

    #[must_use]
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    #[must_use]
    pub fn with_async_mode(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    #[must_use]
    pub fn with_max_update_count(mut self, max_update_count: usize) -> Self {
        self.max_update_count = max_update_count;
        self
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

thread_local! {
    static CONFIG: Cell<Config> = Cell::new(Config::default());
    static ERROR_HANDLER: RefCell<Option<ErrorHandler>> = const { RefCell::new(None) };
    static WARN_HANDLER: RefCell<Option<WarnHandler>> = const { RefCell::new(None) };
}

/// The active configuration.
#[must_use]
pub fn config() -> Config {
    CONFIG.with(Cell::get)
}

pub fn set_config(config: Config) {
    CONFIG.with(|c| c.set(config));
}

/// Modify the active configuration in place.
pub fn update_config(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|c| {
        let mut config = c.get();
        f(&mut config);
        c.set(config);
    });
}

pub fn set_error_handler(handler: impl Fn(&ReactiveError, &ErrorContext) + 'static) {
    ERROR_HANDLER.with(|h| *h.borrow_mut() = Some(Rc::new(handler)));
}

pub fn set_warn_handler(handler: impl Fn(&str) + 'static) {
    WARN_HANDLER.with(|h| *h.borrow_mut() = Some(Rc::new(handler)));
}

/// Remove both installed handlers, restoring logging.
pub fn clear_handlers() {
    ERROR_HANDLER.with(|h| h.borrow_mut().take());
    WARN_HANDLER.with(|h| h.borrow_mut().take());
}

pub(crate) fn error_handler() -> Option<ErrorHandler> {
    ERROR_HANDLER.with(|h| h.borrow().clone())
}

/// Emit an advisory warning for recoverable misuse.
pub fn warn(msg: &str) {
    WARNINGS_EMITTED_TOTAL.fetch_add(1, Ordering::Relaxed);
    if config().silent {
        return;
    }
    match WARN_HANDLER.with(|h| h.borrow().clone()) {
        Some(handler) => handler(msg),
        None => tracing::warn!("{msg}"),
    }
}
