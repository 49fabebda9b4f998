#![forbid(unsafe_code)]

//! Typed reactive cell: a single value with its own dep.
//!
//! # Design
//!
//! [`ReactiveCell<T>`] wraps a value of type `T` in shared, reference-counted
//! storage. Reads ([`get`](ReactiveCell::get), [`with`](ReactiveCell::with))
//! register the cell's [`Dep`] with the evaluating watcher. Writes compare by
//! `PartialEq` and notify only on change.
//!
//! # Invariants
//!
//! 1. `version` increments by exactly 1 on each value-changing write.
//! 2. `set(v)` where `v == current` is a no-op.
//! 3. No borrow of the value is held while subscribers are notified, so
//!    subscribers may read the cell while it notifies.
//! 4. `update` closures run without the value borrowed.

use std::cell::RefCell;
use std::rc::Rc;

use crate::dep::Dep;

struct CellInner<T> {
    value: RefCell<T>,
    version: std::cell::Cell<u64>,
    dep: Dep,
}

/// A shared, version-tracked value whose reads are tracked.
///
/// Cloning a `ReactiveCell` creates a new handle to the **same** value.
pub struct ReactiveCell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .field("dep", &self.inner.dep.id())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> ReactiveCell<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(CellInner {
                value: RefCell::new(value),
                version: std::cell::Cell::new(0),
                dep: Dep::new(),
            }),
        }
    }

    /// Tracked read returning a clone of the value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.dep.depend();
        self.inner.value.borrow().clone()
    }

    /// Tracked read by reference.
    ///
    /// The value stays borrowed while `f` runs, so `f` must not write this
    /// cell (a write panics with a `BorrowMutError`). Reads are fine.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.dep.depend();
        f(&self.inner.value.borrow())
    }

    /// Untracked read.
    #[must_use]
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Store `value` and notify subscribers if it differs from the current
    /// value.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        self.changed();
    }

    /// Modify a copy of the value and store it; notifies if the result
    /// differs from the value before `f` ran.
    ///
    /// `f` runs without the value borrowed, so it may read the cell.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.inner.value.borrow().clone();
        f(&mut next);
        self.set(next);
    }

    fn changed(&self) {
        self.inner.version.set(self.inner.version.get() + 1);
        self.inner.dep.notify();
    }

    /// Number of value-changing writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// The cell's dep.
    #[must_use]
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }
}
