#![forbid(unsafe_code)]

//! FrankenReactive public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use frx_core as core;

pub mod prelude {
    pub use frx_core::{
        Array, Computed, Config, Object, ReactiveCell, ReactiveError, Value, WatchHandle,
        WatchOptions, WatchSource, Watcher, WatcherOptions, del, next_tick, next_tick_future,
        observe, run_microtasks, set, watch,
    };
}
