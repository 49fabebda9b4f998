#![forbid(unsafe_code)]

//! Lazy computed values backed by a lazy [`Watcher`].
//!
//! # Design
//!
//! [`Computed`] wraps a getter in a lazy watcher. The watcher collects the
//! getter's dependencies like any other; when one of them notifies, the
//! watcher only marks itself dirty. The next call to
//! [`get()`](Computed::get) recomputes and caches the result.
//!
//! Reading a computed value while another watcher is evaluating forwards the
//! computed's own dependencies to that reader, so the reader is invalidated
//! by the computed's inputs directly.
//!
//! # Invariants
//!
//! 1. `get()` always returns a value consistent with the current state of all
//!    dependencies (no stale reads after a dependency write completes).
//! 2. The getter is called at most once per dependency change cycle
//!    (memoization), and never before something reads the value.
//! 3. If no dependency has changed, `get()` returns the cached value.
//! 4. Version increments by exactly 1 per successful recomputation.
//!
//! # Failure Modes
//!
//! - **Getter fails**: the error goes to [`handle_error`] with
//!   [`ErrorContext::Computed`] and `get()` returns the value cached by the
//!   last successful computation. The dirty flag stays set so the next
//!   `get()` retries. A failing getter never aborts the reader's evaluation
//!   or the flush it runs in.

use std::cell::Cell;
use std::rc::Rc;

use crate::dep;
use crate::error::{ErrorContext, ReactiveError, handle_error};
use crate::value::Value;
use crate::watcher::{Watcher, WatcherOptions};

struct ComputedInner {
    watcher: Watcher,
    /// Bumped on each successful recomputation.
    version: Cell<u64>,
}

/// A lazily evaluated, memoized value derived from reactive state.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
#[derive(Clone)]
pub struct Computed {
    inner: Rc<ComputedInner>,
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("cached", &self.inner.watcher.value())
            .field("dirty", &self.inner.watcher.is_dirty())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl Computed {
    /// Create a computed value. The getter does not run until the first
    /// [`get()`](Computed::get).
    pub fn new(getter: impl FnMut() -> Result<Value, ReactiveError> + 'static) -> Self {
        Self::named("<computed>", getter)
    }

    /// Like [`Computed::new`], with a label for diagnostics.
    pub fn named(
        expression: impl Into<String>,
        getter: impl FnMut() -> Result<Value, ReactiveError> + 'static,
    ) -> Self {
        let watcher = Watcher::construct(
            Box::new(getter),
            None,
            WatcherOptions::default()
                .lazy()
                .with_expression(expression),
        );
        Self {
            inner: Rc::new(ComputedInner {
                watcher,
                version: Cell::new(0),
            }),
        }
    }

    /// Get the current value, recomputing if any dependency has changed.
    ///
    /// When called during another watcher's evaluation, that watcher also
    /// subscribes to everything this value depends on.
    pub fn get(&self) -> Value {
        let watcher = &self.inner.watcher;
        if watcher.is_dirty() {
            match watcher.evaluate() {
                Ok(()) => self.inner.version.set(self.inner.version.get() + 1),
                Err(err) => handle_error(
                    &err,
                    &ErrorContext::Computed(watcher.expression().to_owned()),
                ),
            }
        }
        if dep::is_tracking() {
            watcher.depend();
        }
        watcher.value()
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.watcher.is_dirty()
    }

    /// Force invalidation of the cached value. The next `get()` will
    /// recompute.
    pub fn invalidate(&self) {
        self.inner.watcher.update();
    }

    /// Current version number. Increments by 1 on each recomputation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// The backing lazy watcher.
    #[must_use]
    pub fn watcher(&self) -> &Watcher {
        &self.inner.watcher
    }

    /// Stop tracking. The cached value is kept and never refreshed again.
    pub fn teardown(&self) {
        self.inner.watcher.teardown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ReactiveCell;
    use crate::config;
    use crate::next_tick::run_microtasks;
    use crate::scheduler;
    use crate::object::Object;
    use crate::observer::observe;
    use std::cell::RefCell;

    fn num(value: &Value) -> f64 {
        value.as_f64().unwrap_or(f64::NAN)
    }

    #[test]
    fn single_dep_computed() {
        let source = ReactiveCell::new(10);
        let s = source.clone();
        let computed = Computed::new(move || Ok(Value::from(s.get() * 2)));

        assert_eq!(computed.get(), Value::from(20));
        assert_eq!(computed.version(), 1);

        source.set(5);
        assert!(computed.is_dirty());
        assert_eq!(computed.get(), Value::from(10));
        assert_eq!(computed.version(), 2);
    }

    #[test]
    fn lazy_evaluation() {
        let compute_count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&compute_count);

        let source = ReactiveCell::new(42);
        let source_clone = source.clone();
        let computed = Computed::new(move || {
            count_clone.set(count_clone.get() + 1);
            Ok(Value::from(source_clone.get() * 2))
        });

        // Not computed yet.
        assert_eq!(compute_count.get(), 0);

        // Writes before the first read do not compute either.
        source.set(1);
        assert_eq!(compute_count.get(), 0);

        assert_eq!(computed.get(), Value::from(2));
        assert_eq!(compute_count.get(), 1);
    }

    #[test]
    fn memoization() {
        let compute_count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&compute_count);

        let state = Object::new().with("n", 10);
        observe(&Value::from(state.clone()), false);
        let s = state.clone();
        let computed = Computed::new(move || {
            count_clone.set(count_clone.get() + 1);
            Ok(Value::from(num(&s.get("n")) * 2.0))
        });

        assert_eq!(computed.get(), Value::from(20));
        assert_eq!(computed.get(), Value::from(20));
        assert_eq!(compute_count.get(), 1);

        // Three writes, one recompute.
        state.set("n", 11);
        state.set("n", 12);
        state.set("n", 20);
        assert_eq!(compute_count.get(), 1);
        assert_eq!(computed.get(), Value::from(40));
        assert_eq!(compute_count.get(), 2);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let compute_count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&compute_count);
        let computed = Computed::new(move || {
            count_clone.set(count_clone.get() + 1);
            Ok(Value::from(5))
        });

        assert_eq!(computed.get(), Value::from(5));
        computed.invalidate();
        assert!(computed.is_dirty());
        assert_eq!(computed.get(), Value::from(5));
        assert_eq!(compute_count.get(), 2);
    }

    #[test]
    fn clone_shares_state() {
        let source = ReactiveCell::new(10);
        let s = source.clone();
        let c1 = Computed::new(move || Ok(Value::from(s.get() + 1)));
        let c2 = c1.clone();

        assert_eq!(c1.get(), Value::from(11));
        source.set(20);
        assert!(c2.is_dirty());
        assert_eq!(c2.get(), Value::from(21));
        assert!(!c1.is_dirty());
    }

    #[test]
    fn diamond_dependency() {
        // A -> B, A -> C, (B, C) -> D
        let a = ReactiveCell::new(10);
        let (a1, a2) = (a.clone(), a.clone());
        let b = Computed::new(move || Ok(Value::from(a1.get() + 1)));
        let c = Computed::new(move || Ok(Value::from(a2.get() * 2)));
        let (b1, c1) = (b.clone(), c.clone());
        let d = Computed::new(move || Ok(Value::from(num(&b1.get()) + num(&c1.get()))));

        assert_eq!(d.get(), Value::from(31));
        a.set(5);
        assert!(d.is_dirty());
        assert_eq!(d.get(), Value::from(16));
    }

    #[test]
    fn reader_subscribes_to_computed_inputs() {
        let source = ReactiveCell::new(1);
        let s = source.clone();
        let doubled = Computed::new(move || Ok(Value::from(s.get() * 2)));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let (d, log) = (doubled.clone(), Rc::clone(&seen));
        let reader = Watcher::new(
            move || {
                let v = d.get();
                log.borrow_mut().push(v.clone());
                Ok(v)
            },
            None,
            WatcherOptions::default(),
        )
        .unwrap();
        assert!(reader.depends_on(source.dep()));

        source.set(4);
        run_microtasks();
        assert_eq!(*seen.borrow(), vec![Value::from(2), Value::from(8)]);
    }

    #[test]
    fn failed_getter_keeps_cache_and_stays_dirty() {
        let reports = Rc::new(RefCell::new(Vec::new()));
        let r = Rc::clone(&reports);
        config::set_error_handler(move |err, ctx| r.borrow_mut().push((err.clone(), ctx.clone())));

        let source = ReactiveCell::new(1);
        let s = source.clone();
        let computed = Computed::named("ratio", move || match s.get() {
            0 => Err(ReactiveError::evaluation("division by zero")),
            n => Ok(Value::from(100 / n)),
        });
        assert_eq!(computed.get(), Value::from(100));

        source.set(0);
        assert_eq!(computed.get(), Value::from(100));
        assert!(computed.is_dirty());
        assert_eq!(computed.version(), 1);
        assert_eq!(
            *reports.borrow(),
            vec![(
                ReactiveError::evaluation("division by zero"),
                ErrorContext::Computed("ratio".into())
            )]
        );

        source.set(4);
        assert_eq!(computed.get(), Value::from(25));
        assert_eq!(computed.version(), 2);
        config::clear_handlers();
    }

    #[test]
    fn failed_getter_does_not_abort_flush() {
        config::set_error_handler(|_, _| {});
        let source = ReactiveCell::new(1);
        let s = source.clone();
        let broken = Computed::new(move || match s.get() {
            0 => Err(ReactiveError::evaluation("no value")),
            n => Ok(Value::from(n)),
        });

        let seen = Rc::new(RefCell::new(Vec::new()));
        let (b, log) = (broken.clone(), Rc::clone(&seen));
        let _reader = Watcher::new(
            move || {
                let v = b.get();
                log.borrow_mut().push(v.clone());
                Ok(v)
            },
            None,
            WatcherOptions::default(),
        )
        .unwrap();
        let later_runs = Rc::new(Cell::new(0u32));
        let (s2, n) = (source.clone(), Rc::clone(&later_runs));
        let _later = Watcher::new(
            move || {
                n.set(n.get() + 1);
                Ok(Value::from(s2.get()))
            },
            None,
            WatcherOptions::default(),
        )
        .unwrap();
        let hook_ran = Rc::new(Cell::new(false));
        let h = Rc::clone(&hook_ran);

        source.set(0);
        scheduler::queue_post_flush(move || h.set(true));
        run_microtasks();
        assert_eq!(*seen.borrow(), vec![Value::from(1), Value::from(1)]);
        assert_eq!(later_runs.get(), 2);
        assert!(hook_ran.get());
        config::clear_handlers();
    }

    #[test]
    fn teardown_freezes_value() {
        let source = ReactiveCell::new(1);
        let s = source.clone();
        let computed = Computed::new(move || Ok(Value::from(s.get())));
        computed.get();
        computed.teardown();
        source.set(2);
        assert!(!computed.is_dirty());
        assert_eq!(computed.get(), Value::from(1));
    }
}
