#![forbid(unsafe_code)]

//! Observed collection with explicit structural mutators.
//!
//! Element reads are never intercepted: a watcher that reads an array
//! depends on it through the property that holds it (see
//! [`Object::get`](crate::object::Object::get)). Structural changes go
//! through the seven mutators below, each of which performs the operation,
//! observes newly inserted elements, and notifies the array's own dep.
//!
//! | Mutator      | Inserts observed | Notifies |
//! |-------------|------------------|----------|
//! | `push`      | yes              | yes      |
//! | `pop`       | -                | yes      |
//! | `shift`     | -                | yes      |
//! | `unshift`   | yes              | yes      |
//! | `splice`    | yes              | yes      |
//! | `sort_by`   | -                | yes      |
//! | `reverse`   | -                | yes      |
//!
//! Unobserved arrays behave like plain vectors.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::config;
use crate::object::ContainerFlags;
use crate::observer::{self, Observer};
use crate::value::Value;

struct ArrayInner {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Rc<Observer>>>,
    flags: Cell<ContainerFlags>,
}

/// Shared handle to an ordered collection.
#[derive(Clone)]
pub struct Array {
    inner: Rc<ArrayInner>,
}

impl Array {
    #[must_use]
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    /// Element at `index`, or [`Value::Undefined`]. Not tracked.
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.inner
            .items
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Snapshot of the elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Append elements; returns the new length.
    pub fn push(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let inserted: Vec<Value> = values.into_iter().collect();
        if self.reject_if_frozen("push") {
            return self.len();
        }
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.extend(inserted.iter().cloned());
            items.len()
        };
        self.after_mutation(&inserted);
        len
    }

    pub fn pop(&self) -> Option<Value> {
        if self.reject_if_frozen("pop") {
            return None;
        }
        let removed = self.inner.items.borrow_mut().pop();
        self.after_mutation(&[]);
        removed
    }

    pub fn shift(&self) -> Option<Value> {
        if self.reject_if_frozen("shift") {
            return None;
        }
        let removed = {
            let mut items = self.inner.items.borrow_mut();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        self.after_mutation(&[]);
        removed
    }

    /// Prepend elements (in order); returns the new length.
    pub fn unshift(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let inserted: Vec<Value> = values.into_iter().collect();
        if self.reject_if_frozen("unshift") {
            return self.len();
        }
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.splice(0..0, inserted.iter().cloned());
            items.len()
        };
        self.after_mutation(&inserted);
        len
    }

    /// Remove `delete_count` elements at `start` and insert `values` there.
    ///
    /// `start` and `delete_count` are clamped to the array bounds. Returns the
    /// removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        values: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let inserted: Vec<Value> = values.into_iter().collect();
        if self.reject_if_frozen("splice") {
            return Vec::new();
        }
        let removed = {
            let mut items = self.inner.items.borrow_mut();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, inserted.iter().cloned()).collect()
        };
        self.after_mutation(&inserted);
        removed
    }

    /// Stable in-place sort.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        if self.reject_if_frozen("sort") {
            return;
        }
        self.inner.items.borrow_mut().sort_by(|a, b| compare(a, b));
        self.after_mutation(&[]);
    }

    pub fn reverse(&self) {
        if self.reject_if_frozen("reverse") {
            return;
        }
        self.inner.items.borrow_mut().reverse();
        self.after_mutation(&[]);
    }

    /// Grow to at least `len` elements, padding with `Undefined`. Not
    /// intercepted.
    pub(crate) fn ensure_len(&self, len: usize) {
        let mut items = self.inner.items.borrow_mut();
        if items.len() < len {
            items.resize(len, Value::Undefined);
        }
    }

    fn after_mutation(&self, inserted: &[Value]) {
        let Some(observer) = self.observer() else {
            return;
        };
        if !observer.is_shallow() {
            for value in inserted {
                observer::observe(value, false);
            }
        }
        observer.dep().notify();
    }

    fn reject_if_frozen(&self, op: &str) -> bool {
        if self.is_frozen() {
            config::warn(&format!("Cannot {op}: array is frozen."));
            true
        } else {
            false
        }
    }

    pub fn freeze(&self) {
        self.add_flags(ContainerFlags::FROZEN | ContainerFlags::NON_EXTENSIBLE);
    }

    pub fn prevent_extensions(&self) {
        self.add_flags(ContainerFlags::NON_EXTENSIBLE);
    }

    pub fn mark_raw(&self) {
        self.add_flags(ContainerFlags::RAW);
    }

    #[must_use]
    pub fn flags(&self) -> ContainerFlags {
        self.inner.flags.get()
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.flags().contains(ContainerFlags::FROZEN)
    }

    #[must_use]
    pub fn is_extensible(&self) -> bool {
        !self
            .flags()
            .intersects(ContainerFlags::FROZEN | ContainerFlags::NON_EXTENSIBLE)
    }

    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.flags().contains(ContainerFlags::RAW)
    }

    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.observer.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    fn add_flags(&self, flags: ContainerFlags) {
        self.inner.flags.set(self.inner.flags.get() | flags);
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                observer: RefCell::new(None),
                flags: Cell::new(ContainerFlags::empty()),
            }),
        }
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("len", &self.len())
            .field("observed", &self.inner.observer.borrow().is_some())
            .finish()
    }
}
