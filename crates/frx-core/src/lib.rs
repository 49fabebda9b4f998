#![forbid(unsafe_code)]

//! Reactive dependency tracking and update scheduling.
//!
//! This crate provides the change-propagation engine for FrankenReactive:
//!
//! - [`Dep`]: publisher for one observable slot, with its subscriber list.
//! - [`Object`] / [`Array`]: shared state containers; once
//!   [`observe`]d, their reads and writes are visible to tracking.
//! - [`Watcher`]: a tracked evaluation function that keeps its own
//!   dependency set current across re-evaluations.
//! - [`scheduler`]: batches invalidated watchers into one ordered flush per
//!   tick.
//! - [`Computed`], [`ReactiveCell`], [`watch`]: the higher-level surfaces
//!   built on the above.
//!
//! # Architecture
//!
//! All state is single-threaded: containers and deps are `Rc`-shared, the
//! evaluation stack, scheduler queue and next-tick queue are thread-locals.
//! Deps hold watchers weakly, so dropping every handle to a watcher is as
//! good as tearing it down.
//!
//! ```text
//!   Object::get ──depend──► Dep ◄──add_dep── Watcher (top of eval stack)
//!   Object::set ──notify──► Dep ──update──► Watcher ──► scheduler ──► next tick
//! ```
//!
//! # Invariants
//!
//! 1. After any evaluation, a watcher's dependency set equals exactly the
//!    deps read during that evaluation.
//! 2. A dep lists a given watcher at most once.
//! 3. Within one flush, watchers run in ascending creation order and each at
//!    most once per invalidation.
//! 4. After `teardown()`, a watcher is never run again.

pub mod array;
pub mod cell;
pub mod computed;
pub mod config;
pub mod dep;
pub mod error;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod next_tick;
pub mod object;
pub mod observer;
pub mod path;
pub mod scheduler;
pub mod traverse;
pub mod value;
pub mod watch;
pub mod watcher;

pub use array::Array;
pub use cell::ReactiveCell;
pub use computed::Computed;
pub use config::{Config, config, set_config, update_config, warnings_emitted_total};
pub use dep::{Dep, untracked};
pub use error::{ErrorContext, ReactiveError, errors_reported_total, handle_error};
pub use next_tick::{TickDriver, next_tick, next_tick_future, run_microtasks, set_tick_driver};
pub use object::{ContainerFlags, Object};
pub use observer::{Observer, define_reactive, del, observe, observe_shallow, set};
pub use traverse::traverse;
pub use value::{Key, Opaque, Value};
pub use watch::{WatchHandle, WatchOptions, WatchSource, watch};
pub use watcher::{Watcher, WatcherFlags, WatcherOptions};
