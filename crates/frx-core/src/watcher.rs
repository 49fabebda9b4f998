#![forbid(unsafe_code)]

//! Subscribers: evaluation functions bound to the deps they read.
//!
//! A [`Watcher`] wraps an evaluation function. Every evaluation runs with the
//! watcher on top of the evaluation stack, so each tracked read registers a
//! [`Dep`]. After the evaluation the dependency set is reconciled: deps read
//! this pass are kept, deps that were not read are unsubscribed.
//!
//! # Flavours
//!
//! | Flag     | `update()` behaviour                                  |
//! |----------|--------------------------------------------------------|
//! | `LAZY`   | mark dirty; recompute on the next [`Watcher::evaluate`] |
//! | `SYNC`   | [`Watcher::run`] immediately                            |
//! | neither  | enqueue into the [`scheduler`](crate::scheduler)        |
//!
//! `USER` routes getter and callback failures to
//! [`handle_error`](crate::error::handle_error) instead of returning them;
//! `DEEP` force-reads the whole result so nested writes invalidate it.
//!
//! # Invariants
//!
//! 1. After a completed evaluation the dependency set equals exactly the deps
//!    read during that evaluation.
//! 2. A dep gains this watcher as subscriber only when it was not already
//!    held from the previous pass, so no subscriber list sees it twice.
//! 3. Once torn down a watcher is inactive forever and holds no deps.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;
use bitflags::bitflags;
use smallvec::SmallVec;

use crate::config;
use crate::dep::{Dep, TargetGuard, push_target};
use crate::error::{ErrorContext, ReactiveError, handle_error};
use crate::path;
use crate::scheduler;
use crate::traverse::traverse;
use crate::value::Value;

/// Evaluation function of a watcher.
pub type Getter = Box<dyn FnMut() -> Result<Value, ReactiveError>>;

/// Result callback, invoked with `(new, old)`.
pub type Callback = Box<dyn FnMut(&Value, &Value) -> Result<(), ReactiveError>>;

/// Hook run by the scheduler right before a queued watcher re-runs.
pub type BeforeHook = Box<dyn FnMut()>;

/// Box a result callback, pinning the closure to the [`Callback`] signature.
pub fn callback(
    f: impl FnMut(&Value, &Value) -> Result<(), ReactiveError> + 'static,
) -> Callback {
    Box::new(f)
}

static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

fn next_watcher_id() -> u64 {
    NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed)
}

bitflags! {
    /// Behaviour flags fixed at construction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WatcherFlags: u8 {
        const LAZY = 1 << 0;
        const SYNC = 1 << 1;
        const DEEP = 1 << 2;
        const USER = 1 << 3;
        const RENDER = 1 << 4;
    }
}

/// Construction options for a [`Watcher`].
#[derive(Default)]
pub struct WatcherOptions {
    pub flags: WatcherFlags,
    /// Label used in diagnostics. Path watchers use the path itself.
    pub expression: Option<String>,
    pub before: Option<BeforeHook>,
}

impl WatcherOptions {
    /// Recompute on demand only.
    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.flags |= WatcherFlags::LAZY;
        self
    }

    /// Re-run inside the notifying write instead of batching.
    #[must_use]
    pub fn sync(mut self) -> Self {
        self.flags |= WatcherFlags::SYNC;
        self
    }

    /// Track every nested property of the result.
    #[must_use]
    pub fn deep(mut self) -> Self {
        self.flags |= WatcherFlags::DEEP;
        self
    }

    /// Application-supplied watcher: failures are reported, not returned.
    #[must_use]
    pub fn user(mut self) -> Self {
        self.flags |= WatcherFlags::USER;
        self
    }

    /// The render subscriber of a component.
    #[must_use]
    pub fn render(mut self) -> Self {
        self.flags |= WatcherFlags::RENDER;
        self
    }

    #[must_use]
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    #[must_use]
    pub fn with_before(mut self, before: impl FnMut() + 'static) -> Self {
        self.before = Some(Box::new(before));
        self
    }
}

impl std::fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("flags", &self.flags)
            .field("expression", &self.expression)
            .field("before", &self.before.is_some())
            .finish()
    }
}

/// Deps held by a watcher, with O(1) membership by dep id.
#[derive(Default)]
struct DepSet {
    ids: AHashSet<u64>,
    deps: SmallVec<[Dep; 4]>,
}

impl DepSet {
    /// Returns `false` if the dep was already present.
    fn insert(&mut self, dep: &Dep) -> bool {
        if self.ids.insert(dep.id()) {
            self.deps.push(dep.clone());
            true
        } else {
            false
        }
    }

    fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.deps.clear();
    }
}

pub(crate) struct WatcherInner {
    id: u64,
    expression: String,
    flags: WatcherFlags,
    getter: RefCell<Getter>,
    callback: RefCell<Option<Callback>>,
    before: RefCell<Option<BeforeHook>>,
    active: Cell<bool>,
    dirty: Cell<bool>,
    value: RefCell<Value>,
    deps: RefCell<DepSet>,
    new_deps: RefCell<DepSet>,
}

/// A tracked evaluation function with an optional result callback.
///
/// Cloning yields another handle to the same watcher. Deps hold watchers
/// weakly: once every handle is dropped the watcher stops receiving updates.
/// Call [`teardown`](Watcher::teardown) to unsubscribe deterministically.
#[derive(Clone)]
pub struct Watcher {
    pub(crate) inner: Rc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher around `getter`.
    ///
    /// Unless the watcher is lazy it evaluates immediately to establish its
    /// value and dependency set; a non-user evaluation failure is returned.
    pub fn new(
        getter: impl FnMut() -> Result<Value, ReactiveError> + 'static,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Self, ReactiveError> {
        Self::build(Box::new(getter), callback, options)
    }

    /// Create a watcher whose getter reads the dot-delimited `path` from
    /// `target`, e.g. `"user.profile.name"`.
    ///
    /// An unparsable path is reported as a warning and produces a watcher
    /// whose getter always yields [`Value::Undefined`].
    pub fn with_path(
        target: &Value,
        path: &str,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Self, ReactiveError> {
        let getter: Getter = match path::parse_path(path) {
            Some(segments) => {
                let target = target.clone();
                Box::new(move || Ok(path::read_path(&target, &segments)))
            }
            None => {
                config::warn(&format!(
                    "Failed watching path: \"{path}\" Watcher only accepts simple \
                     dot-delimited paths. For full control, use a function instead."
                ));
                Box::new(|| Ok(Value::Undefined))
            }
        };
        Self::build(getter, callback, options.with_expression(path))
    }

    fn build(
        getter: Getter,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Self, ReactiveError> {
        let watcher = Self::construct(getter, callback, options);
        if !watcher.is_lazy() {
            let value = watcher.get()?;
            *watcher.inner.value.borrow_mut() = value;
        }
        Ok(watcher)
    }

    /// Allocate without the initial evaluation.
    pub(crate) fn construct(
        getter: Getter,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Self {
        let lazy = options.flags.contains(WatcherFlags::LAZY);
        Self {
            inner: Rc::new(WatcherInner {
                id: next_watcher_id(),
                expression: options
                    .expression
                    .unwrap_or_else(|| String::from("<anonymous>")),
                flags: options.flags,
                getter: RefCell::new(getter),
                callback: RefCell::new(callback),
                before: RefCell::new(options.before),
                active: Cell::new(true),
                dirty: Cell::new(lazy),
                value: RefCell::new(Value::Undefined),
                deps: RefCell::new(DepSet::default()),
                new_deps: RefCell::new(DepSet::default()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<WatcherInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<WatcherInner> {
        Rc::downgrade(&self.inner)
    }

    /// Evaluate the getter with dependency collection, then reconcile the
    /// dependency set. Does not update the cached value.
    pub fn get(&self) -> Result<Value, ReactiveError> {
        // Checked before entering the scope: a nested scope would reconcile
        // the outer pass's partial dependency set on exit.
        let Ok(mut slot) = self.inner.getter.try_borrow_mut() else {
            let err = ReactiveError::ReentrantEvaluation {
                expression: self.inner.expression.clone(),
            };
            if self.is_user() {
                handle_error(&err, &ErrorContext::Getter(self.inner.expression.clone()));
                return Ok(Value::Undefined);
            }
            return Err(err);
        };
        let _scope = EvaluationScope::enter(self);
        let getter: &mut dyn FnMut() -> Result<Value, ReactiveError> = &mut **slot;
        let outcome = getter();
        drop(slot);
        let value = match outcome {
            Ok(value) => value,
            Err(err) if self.is_user() => {
                handle_error(&err, &ErrorContext::Getter(self.inner.expression.clone()));
                Value::Undefined
            }
            Err(err) => return Err(err),
        };
        if self.is_deep() {
            traverse(&value);
        }
        Ok(value)
    }

    /// Record `dep` as read during the current evaluation.
    pub(crate) fn add_dep(&self, dep: &Dep) {
        let fresh = self.inner.new_deps.borrow_mut().insert(dep);
        if fresh && !self.inner.deps.borrow().contains(dep.id()) {
            dep.add_sub(self);
        }
    }

    /// Drop subscriptions not renewed this pass and promote the new set.
    fn cleanup_deps(&self) {
        let mut deps = self.inner.deps.borrow_mut();
        let mut new_deps = self.inner.new_deps.borrow_mut();
        for dep in &deps.deps {
            if !new_deps.contains(dep.id()) {
                dep.remove_sub(&self.inner);
            }
        }
        std::mem::swap(&mut *deps, &mut *new_deps);
        new_deps.clear();
        if !self.inner.active.get() {
            // Torn down mid-evaluation: release whatever this pass picked up.
            for dep in &deps.deps {
                dep.remove_sub(&self.inner);
            }
            deps.clear();
        }
    }

    /// Invalidation entry point, called from [`Dep::notify`].
    pub fn update(&self) {
        let flags = self.inner.flags;
        if flags.contains(WatcherFlags::LAZY) {
            self.inner.dirty.set(true);
        } else if flags.contains(WatcherFlags::SYNC) {
            if let Err(err) = self.run() {
                handle_error(&err, &ErrorContext::SyncRun(self.inner.expression.clone()));
            }
        } else {
            scheduler::queue_watcher(self);
        }
    }

    /// Recompute and fire the callback if the value changed.
    ///
    /// Containers and deep watchers always fire, since in-place mutation
    /// keeps identity. The new value is stored either way.
    pub fn run(&self) -> Result<(), ReactiveError> {
        if !self.inner.active.get() {
            return Ok(());
        }
        let value = self.get()?;
        let old = self.inner.value.replace(value.clone());
        if !value.same_value(&old) || value.is_object() || self.is_deep() {
            self.invoke_callback(&value, &old)?;
        }
        Ok(())
    }

    fn call_callback(&self, new: &Value, old: &Value) -> Result<(), ReactiveError> {
        match self.inner.callback.try_borrow_mut() {
            Ok(mut slot) => match slot.as_mut() {
                Some(callback) => callback(new, old),
                None => Ok(()),
            },
            Err(_) => Err(ReactiveError::ReentrantCallback {
                expression: self.inner.expression.clone(),
            }),
        }
    }

    /// First callback invocation of an immediate watch: `(value, Undefined)`.
    /// Errors are returned for the caller to report.
    pub(crate) fn invoke_immediate(&self, value: &Value) -> Result<(), ReactiveError> {
        self.call_callback(value, &Value::Undefined)
    }

    fn invoke_callback(&self, new: &Value, old: &Value) -> Result<(), ReactiveError> {
        match self.call_callback(new, old) {
            Err(err) if self.is_user() => {
                handle_error(&err, &ErrorContext::Callback(self.inner.expression.clone()));
                Ok(())
            }
            other => other,
        }
    }

    /// Recompute a lazy watcher and clear its dirty flag.
    pub fn evaluate(&self) -> Result<(), ReactiveError> {
        let value = self.get()?;
        *self.inner.value.borrow_mut() = value;
        self.inner.dirty.set(false);
        Ok(())
    }

    /// Make the current evaluation target depend on everything this watcher
    /// depends on.
    pub fn depend(&self) {
        let deps = self.inner.deps.borrow().deps.clone();
        for dep in &deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dep and deactivate. Idempotent.
    pub fn teardown(&self) {
        if !self.inner.active.replace(false) {
            return;
        }
        let deps = std::mem::take(&mut *self.inner.deps.borrow_mut());
        for dep in &deps.deps {
            dep.remove_sub(&self.inner);
        }
        tracing::trace!(
            watcher_id = self.inner.id,
            released = deps.deps.len(),
            "watcher torn down"
        );
    }

    pub(crate) fn call_before(&self) {
        if let Ok(mut slot) = self.inner.before.try_borrow_mut()
            && let Some(before) = slot.as_mut()
        {
            before();
        }
    }

    /// Creation-order id; the scheduler runs lower ids first.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    /// The cached value from the last completed run or evaluation.
    #[must_use]
    pub fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    #[must_use]
    pub fn flags(&self) -> WatcherFlags {
        self.inner.flags
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.inner.flags.contains(WatcherFlags::LAZY)
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.inner.flags.contains(WatcherFlags::USER)
    }

    #[must_use]
    pub fn is_deep(&self) -> bool {
        self.inner.flags.contains(WatcherFlags::DEEP)
    }

    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.inner.flags.contains(WatcherFlags::SYNC)
    }

    #[must_use]
    pub fn is_render(&self) -> bool {
        self.inner.flags.contains(WatcherFlags::RENDER)
    }

    /// Ids of the deps held after the last evaluation, in first-read order.
    #[must_use]
    pub fn dep_ids(&self) -> Vec<u64> {
        self.inner.deps.borrow().deps.iter().map(Dep::id).collect()
    }

    #[must_use]
    pub fn dep_count(&self) -> usize {
        self.inner.deps.borrow().deps.len()
    }

    #[must_use]
    pub fn depends_on(&self, dep: &Dep) -> bool {
        self.inner.deps.borrow().contains(dep.id())
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Watcher) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("flags", &self.inner.flags)
            .field("active", &self.inner.active.get())
            .field("dirty", &self.inner.dirty.get())
            .field("dep_count", &self.dep_count())
            .finish()
    }
}

/// Pushes the watcher as evaluation target; on drop pops it, then
/// reconciles the dependency set.
struct EvaluationScope<'a> {
    watcher: &'a Watcher,
    target: Option<TargetGuard>,
}

impl<'a> EvaluationScope<'a> {
    fn enter(watcher: &'a Watcher) -> Self {
        Self {
            watcher,
            target: Some(push_target(Some(watcher.clone()))),
        }
    }
}

impl Drop for EvaluationScope<'_> {
    fn drop(&mut self) {
        drop(self.target.take());
        self.watcher.cleanup_deps();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ReactiveCell;
    use crate::object::Object;
    use crate::observer::observe;
    use std::cell::Cell;

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn ids_are_monotonic() {
        let a = Watcher::new(|| Ok(Value::Null), None, WatcherOptions::default()).unwrap();
        let b = Watcher::new(|| Ok(Value::Null), None, WatcherOptions::default()).unwrap();
        assert!(a.id() < b.id());
    }

    #[test]
    fn eager_watcher_evaluates_on_construction() {
        let calls = counter();
        let calls_clone = Rc::clone(&calls);
        let w = Watcher::new(
            move || {
                calls_clone.set(calls_clone.get() + 1);
                Ok(Value::from(5))
            },
            None,
            WatcherOptions::default(),
        )
        .unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(w.value(), Value::from(5));
    }

    #[test]
    fn lazy_watcher_defers_evaluation() {
        let calls = counter();
        let calls_clone = Rc::clone(&calls);
        let w = Watcher::new(
            move || {
                calls_clone.set(calls_clone.get() + 1);
                Ok(Value::from(1))
            },
            None,
            WatcherOptions::default().lazy(),
        )
        .unwrap();
        assert_eq!(calls.get(), 0);
        assert!(w.is_dirty());
        assert!(w.value().is_undefined());

        w.evaluate().unwrap();
        assert_eq!(calls.get(), 1);
        assert!(!w.is_dirty());
        assert_eq!(w.value(), Value::from(1));
    }

    #[test]
    fn lazy_update_only_marks_dirty() {
        let cell = ReactiveCell::new(1);
        let calls = counter();
        let (c, calls_clone) = (cell.clone(), Rc::clone(&calls));
        let w = Watcher::new(
            move || {
                calls_clone.set(calls_clone.get() + 1);
                Ok(Value::from(c.get()))
            },
            None,
            WatcherOptions::default().lazy(),
        )
        .unwrap();
        w.evaluate().unwrap();
        cell.set(2);
        assert!(w.is_dirty());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn repeated_reads_subscribe_once() {
        let cell = ReactiveCell::new(0);
        let c = cell.clone();
        let w = Watcher::new(
            move || {
                let sum = c.get() + c.get() + c.get();
                Ok(Value::from(sum))
            },
            None,
            WatcherOptions::default(),
        )
        .unwrap();
        assert_eq!(w.dep_count(), 1);
        assert_eq!(cell.dep().subscriber_count(), 1);
    }

    #[test]
    fn stale_branch_is_unsubscribed() {
        let toggle = ReactiveCell::new(true);
        let left = ReactiveCell::new(1);
        let right = ReactiveCell::new(2);
        let (t, l, r) = (toggle.clone(), left.clone(), right.clone());
        let w = Watcher::new(
            move || Ok(Value::from(if t.get() { l.get() } else { r.get() })),
            None,
            WatcherOptions::default().sync(),
        )
        .unwrap();
        assert!(w.depends_on(left.dep()));
        assert!(!w.depends_on(right.dep()));

        toggle.set(false);
        assert!(!w.depends_on(left.dep()));
        assert!(w.depends_on(right.dep()));
        assert_eq!(left.dep().subscriber_count(), 0);
        assert_eq!(right.dep().subscriber_count(), 1);
        assert_eq!(w.value(), Value::from(2));
    }

    #[test]
    fn sync_watcher_fires_callback_with_new_and_old() {
        let cell = ReactiveCell::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (c, log) = (cell.clone(), Rc::clone(&seen));
        let _w = Watcher::new(
            move || Ok(Value::from(c.get())),
            Some(callback(move |new: &Value, old: &Value| {
                log.borrow_mut().push((new.clone(), old.clone()));
                Ok(())
            })),
            WatcherOptions::default().sync(),
        )
        .unwrap();
        cell.set(2);
        assert_eq!(*seen.borrow(), vec![(Value::from(2), Value::from(1))]);
    }

    #[test]
    fn unchanged_primitive_skips_callback() {
        let cell = ReactiveCell::new(3);
        let fired = counter();
        let (c, f) = (cell.clone(), Rc::clone(&fired));
        let w = Watcher::new(
            move || Ok(Value::from(c.get() % 2)),
            Some(callback(move |_: &Value, _: &Value| {
                f.set(f.get() + 1);
                Ok(())
            })),
            WatcherOptions::default().sync(),
        )
        .unwrap();
        cell.set(5);
        assert_eq!(fired.get(), 0);
        assert_eq!(w.value(), Value::from(1));
    }

    #[test]
    fn object_result_always_fires() {
        let state = Object::new();
        state.insert("inner", Value::from(Object::new()));
        observe(&Value::from(state.clone()), false);
        let fired = counter();
        let (s, f) = (state.clone(), Rc::clone(&fired));
        let w = Watcher::new(
            move || Ok(s.get("inner")),
            Some(callback(move |_: &Value, _: &Value| {
                f.set(f.get() + 1);
                Ok(())
            })),
            WatcherOptions::default(),
        )
        .unwrap();
        w.run().unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn non_user_errors_propagate() {
        let err = Watcher::new(
            || Err(ReactiveError::evaluation("boom")),
            None,
            WatcherOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, ReactiveError::evaluation("boom"));
    }

    #[test]
    fn user_errors_are_reported_and_yield_undefined() {
        let reported = counter();
        let r = Rc::clone(&reported);
        config::set_error_handler(move |_, _| r.set(r.get() + 1));
        let w = Watcher::new(
            || Err(ReactiveError::evaluation("boom")),
            None,
            WatcherOptions::default().user(),
        )
        .unwrap();
        assert!(w.value().is_undefined());
        assert_eq!(reported.get(), 1);
        config::clear_handlers();
    }

    #[test]
    fn teardown_unsubscribes_and_is_idempotent() {
        let cell = ReactiveCell::new(0);
        let runs = counter();
        let (c, r) = (cell.clone(), Rc::clone(&runs));
        let w = Watcher::new(
            move || {
                r.set(r.get() + 1);
                Ok(Value::from(c.get()))
            },
            None,
            WatcherOptions::default().sync(),
        )
        .unwrap();
        w.teardown();
        w.teardown();
        assert!(!w.is_active());
        assert_eq!(w.dep_count(), 0);
        assert_eq!(cell.dep().subscriber_count(), 0);
        cell.set(1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn run_on_inactive_watcher_is_noop() {
        let runs = counter();
        let r = Rc::clone(&runs);
        let w = Watcher::new(
            move || {
                r.set(r.get() + 1);
                Ok(Value::Null)
            },
            None,
            WatcherOptions::default(),
        )
        .unwrap();
        w.teardown();
        w.run().unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn depend_forwards_deps_to_outer_target() {
        let cell = ReactiveCell::new(2);
        let c = cell.clone();
        let inner = Watcher::new(
            move || Ok(Value::from(c.get() * 10)),
            None,
            WatcherOptions::default().lazy(),
        )
        .unwrap();
        inner.evaluate().unwrap();

        let forwarded = inner.clone();
        let outer = Watcher::new(
            move || {
                forwarded.depend();
                Ok(forwarded.value())
            },
            None,
            WatcherOptions::default(),
        )
        .unwrap();
        assert!(outer.depends_on(cell.dep()));
    }

    #[test]
    fn path_watcher_reads_nested_keys() {
        let profile = Object::new();
        profile.insert("name", Value::from("ada"));
        let root = Object::new();
        root.insert("profile", Value::from(profile.clone()));
        let root = Value::from(root);
        observe(&root, false);

        let w = Watcher::with_path(&root, "profile.name", None, WatcherOptions::default().sync())
            .unwrap();
        assert_eq!(w.value(), Value::from("ada"));
        assert_eq!(w.expression(), "profile.name");

        profile.set("name", Value::from("grace"));
        assert_eq!(w.value(), Value::from("grace"));
    }

    #[test]
    fn invalid_path_yields_noop_getter() {
        let root = Value::from(Object::new());
        let w = Watcher::with_path(&root, "a[0]", None, WatcherOptions::default()).unwrap();
        assert!(w.value().is_undefined());
        assert_eq!(w.dep_count(), 0);
    }

    #[test]
    fn reentrant_evaluation_is_an_error() {
        let slot: Rc<RefCell<Option<Watcher>>> = Rc::new(RefCell::new(None));
        let s = Rc::clone(&slot);
        let w = Watcher::new(
            move || match s.borrow().as_ref() {
                Some(me) => me.get(),
                None => Ok(Value::Null),
            },
            None,
            WatcherOptions::default().lazy(),
        )
        .unwrap();
        *slot.borrow_mut() = Some(w.clone());
        let err = w.evaluate().unwrap_err();
        assert!(matches!(err, ReactiveError::ReentrantEvaluation { .. }));
        slot.borrow_mut().take();
    }

    #[test]
    fn reentrant_user_evaluation_keeps_outer_deps() {
        let (a, b) = (ReactiveCell::new(1), ReactiveCell::new(2));
        let slot: Rc<RefCell<Option<Watcher>>> = Rc::new(RefCell::new(None));
        let (s, ra, rb) = (Rc::clone(&slot), a.clone(), b.clone());
        let w = Watcher::new(
            move || {
                let first = ra.get();
                let me = s.borrow().clone();
                if let Some(me) = me {
                    let nested = me.get()?;
                    assert!(nested.is_undefined());
                }
                Ok(Value::from(first + rb.get()))
            },
            None,
            WatcherOptions::default().lazy().user(),
        )
        .unwrap();
        *slot.borrow_mut() = Some(w.clone());

        w.evaluate().unwrap();
        assert_eq!(w.value(), Value::from(3));
        assert!(w.depends_on(a.dep()));
        assert!(w.depends_on(b.dep()));
        assert_eq!(w.dep_count(), 2);
        assert_eq!(a.dep().subscriber_count(), 1);
        slot.borrow_mut().take();
    }
}
