#![forbid(unsafe_code)]

//! Publisher side of dependency tracking.
//!
//! A [`Dep`] identifies one observable slot (a reactive property, an observed
//! container, or a [`ReactiveCell`](crate::cell::ReactiveCell)) and keeps the
//! ordered list of watchers subscribed to it.
//!
//! # Evaluation context
//!
//! The watcher currently evaluating is kept on a thread-local stack. Reads
//! call [`Dep::depend`], which registers the dep with the top of that stack;
//! reads outside any evaluation are inert. The stack is only manipulated
//! through [`TargetGuard`], so a pop is guaranteed on every exit path.
//!
//! # Invariants
//!
//! 1. A watcher appears at most once in a dep's subscriber list.
//! 2. [`Dep::notify`] iterates a snapshot taken before the first `update()`,
//!    so subscribers added or removed during notification do not disturb the
//!    current pass.
//! 3. Subscribers are held weakly; entries for dropped watchers are pruned
//!    on the next notify.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config;
use crate::watcher::{Watcher, WatcherInner};

static NEXT_DEP_ID: AtomicU64 = AtomicU64::new(1);

fn next_dep_id() -> u64 {
    NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed)
}

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

struct DepInner {
    id: u64,
    subs: RefCell<Vec<Weak<WatcherInner>>>,
}

/// Subscriber list for one observable slot.
///
/// Cloning a `Dep` yields another handle to the same list.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

impl Dep {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: next_dep_id(),
                subs: RefCell::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Append a subscriber. Callers go through [`Watcher`] dependency
    /// reconciliation, which never adds the same watcher twice.
    pub(crate) fn add_sub(&self, watcher: &Watcher) {
        let mut subs = self.inner.subs.borrow_mut();
        debug_assert!(
            !subs.iter().any(|w| w.as_ptr() == Rc::as_ptr(&watcher.inner)),
            "watcher {} subscribed twice to dep {}",
            watcher.id(),
            self.inner.id
        );
        subs.push(Rc::downgrade(&watcher.inner));
    }

    /// Remove a subscriber; no-op if absent.
    pub(crate) fn remove_sub(&self, watcher: &WatcherInner) {
        let target: *const WatcherInner = watcher;
        self.inner
            .subs
            .borrow_mut()
            .retain(|w| w.as_ptr() != target);
    }

    /// Register this dep with the watcher currently evaluating, if any.
    pub fn depend(&self) {
        if let Some(target) = current_target() {
            target.add_dep(self);
        }
    }

    /// Invalidate every live subscriber.
    pub fn notify(&self) {
        let mut snapshot: Vec<Watcher> = {
            let mut subs = self.inner.subs.borrow_mut();
            subs.retain(|w| w.strong_count() > 0);
            subs.iter()
                .filter_map(Weak::upgrade)
                .map(Watcher::from_inner)
                .collect()
        };
        if !config::config().async_mode {
            // Without the scheduler's sort, fire parents before children here.
            snapshot.sort_by_key(Watcher::id);
        }
        for watcher in &snapshot {
            watcher.update();
        }
    }

    /// Number of registered subscribers, including dead entries that have
    /// not been pruned yet.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.borrow().len()
    }

    /// Whether `watcher` is currently subscribed.
    #[must_use]
    pub fn has_subscriber(&self, watcher: &Watcher) -> bool {
        let target = Rc::as_ptr(&watcher.inner);
        self.inner.subs.borrow().iter().any(|w| w.as_ptr() == target)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ─── Evaluation context ──────────────────────────────────────────────────────

/// Scope guard for one evaluation-stack entry. Dropping it pops the entry.
#[must_use = "dropping the guard immediately pops the evaluation target"]
pub struct TargetGuard {
    // The stack is thread-local; the guard must not leave its thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Push `target` as the current evaluation target. `None` suspends tracking
/// until the guard is dropped.
pub fn push_target(target: Option<Watcher>) -> TargetGuard {
    TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
    TargetGuard {
        _not_send: PhantomData,
    }
}

/// The watcher currently evaluating, if tracking is active.
#[must_use]
pub fn current_target() -> Option<Watcher> {
    TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
}

/// Whether a read right now would be recorded as a dependency.
#[must_use]
pub fn is_tracking() -> bool {
    TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
}

/// Run `f` with dependency collection suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = push_target(None);
    f()
}
