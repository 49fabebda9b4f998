#![forbid(unsafe_code)]

//! Application-facing watch facility.
//!
//! [`watch`] builds a `USER` watcher from a closure or a dot-delimited path,
//! so failures in the source or callback are reported instead of returned.
//! The returned [`WatchHandle`] owns the subscription and tears it down when
//! dropped.

use crate::dep::untracked;
use crate::error::{ErrorContext, ReactiveError, handle_error};
use crate::value::Value;
use crate::watcher::{Watcher, WatcherOptions, callback};

/// What a watch observes.
pub enum WatchSource {
    /// The result of a closure.
    Fn(Box<dyn FnMut() -> Result<Value, ReactiveError>>),
    /// A dot-delimited path read from a target value.
    Path { target: Value, path: String },
}

impl WatchSource {
    pub fn func(f: impl FnMut() -> Result<Value, ReactiveError> + 'static) -> Self {
        Self::Fn(Box::new(f))
    }

    pub fn path(target: &Value, path: impl Into<String>) -> Self {
        Self::Path {
            target: target.clone(),
            path: path.into(),
        }
    }
}

impl std::fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fn(_) => f.write_str("WatchSource::Fn"),
            Self::Path { path, .. } => f.debug_struct("WatchSource::Path").field("path", path).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Fire on nested changes of the watched value.
    pub deep: bool,
    /// Invoke the callback once right away with `(value, Undefined)`.
    pub immediate: bool,
    /// Re-run inside the write instead of on the next flush.
    pub sync: bool,
}

impl WatchOptions {
    #[must_use]
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    #[must_use]
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    #[must_use]
    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }
}

/// Owns a watch subscription. Dropping the handle tears it down.
#[must_use = "dropping the handle stops the watch immediately"]
#[derive(Debug)]
pub struct WatchHandle {
    watcher: Watcher,
}

impl WatchHandle {
    /// The last value the source produced.
    #[must_use]
    pub fn value(&self) -> Value {
        self.watcher.value()
    }

    #[must_use]
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Stop watching. Idempotent.
    pub fn teardown(&self) {
        self.watcher.teardown();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.watcher.teardown();
    }
}

/// Watch `source` and call `cb(new, old)` when it changes.
pub fn watch(
    source: WatchSource,
    cb: impl FnMut(&Value, &Value) -> Result<(), ReactiveError> + 'static,
    options: WatchOptions,
) -> Result<WatchHandle, ReactiveError> {
    let mut watcher_options = WatcherOptions::default().user();
    if options.deep {
        watcher_options = watcher_options.deep();
    }
    if options.sync {
        watcher_options = watcher_options.sync();
    }
    let watcher = match source {
        WatchSource::Fn(getter) => {
            Watcher::new(getter, Some(callback(cb)), watcher_options)?
        }
        WatchSource::Path { target, path } => {
            Watcher::with_path(&target, &path, Some(callback(cb)), watcher_options)?
        }
    };
    if options.immediate {
        let value = watcher.value();
        if let Err(err) = untracked(|| watcher.invoke_immediate(&value)) {
            handle_error(
                &err,
                &ErrorContext::ImmediateCallback(watcher.expression().to_owned()),
            );
        }
    }
    Ok(WatchHandle { watcher })
}
