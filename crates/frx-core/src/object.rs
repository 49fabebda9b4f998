#![forbid(unsafe_code)]

//! Keyed containers with per-property interception.
//!
//! An [`Object`] is an insertion-ordered property map behind an `Rc`. Once a
//! property has been made reactive (by [`observe`](crate::observer::observe)
//! or [`define_reactive`](crate::observer::define_reactive)) its reads and
//! writes go through the instrumented paths:
//!
//! - [`Object::get`] registers the property's dep with the evaluating
//!   watcher, plus the nested container's own dep (and, for arrays, every
//!   nested observed element).
//! - [`Object::set`] compares by identity, stores, observes the new value,
//!   and notifies the property's dep.
//!
//! Keys added after observation through [`Object::set`] are plain data and
//! invisible to tracking; use [`set`](crate::observer::set) to add a key
//! reactively.

use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;

use crate::config;
use crate::dep::{self, Dep};
use crate::observer::{self, Observer};
use crate::value::Value;

bitflags! {
    /// Container-level flags shared by [`Object`] and [`Array`](crate::array::Array).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ContainerFlags: u8 {
        /// No writes, no new keys.
        const FROZEN = 1 << 0;
        /// No new keys.
        const NON_EXTENSIBLE = 1 << 1;
        /// Foreign instance; never instrumented.
        const RAW = 1 << 2;
    }
}

/// Advisory hook run before a changing write to a reactive property.
pub type CustomSetter = Rc<dyn Fn()>;

/// Interception state of a reactive property.
#[derive(Clone)]
pub(crate) struct ReactiveSlot {
    pub(crate) dep: Dep,
    pub(crate) shallow: bool,
    pub(crate) custom_setter: Option<CustomSetter>,
}

pub(crate) struct Property {
    pub(crate) value: Value,
    pub(crate) reactive: Option<ReactiveSlot>,
    pub(crate) readonly: bool,
}

impl Property {
    pub(crate) fn plain(value: Value) -> Self {
        Self {
            value,
            reactive: None,
            readonly: false,
        }
    }
}

enum WriteOutcome {
    Done,
    Rejected(String),
    Intercepted(ReactiveSlot),
}

pub(crate) type PropertyMap = IndexMap<Rc<str>, Property, ahash::RandomState>;

struct ObjectInner {
    props: RefCell<PropertyMap>,
    observer: RefCell<Option<Rc<Observer>>>,
    flags: Cell<ContainerFlags>,
}

/// Shared handle to a keyed container.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                props: RefCell::new(PropertyMap::default()),
                observer: RefCell::new(None),
                flags: Cell::new(ContainerFlags::empty()),
            }),
        }
    }

    /// Read `key`. Tracked when the property is reactive and a watcher is
    /// evaluating. Missing keys read as [`Value::Undefined`].
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        let (value, slot) = {
            let props = self.inner.props.borrow();
            match props.get(key) {
                Some(prop) => (prop.value.clone(), prop.reactive.clone()),
                None => return Value::Undefined,
            }
        };
        if let Some(slot) = slot
            && dep::is_tracking()
        {
            slot.dep.depend();
            if !slot.shallow
                && let Some(child) = observer::observer_of(&value)
            {
                child.dep().depend();
                if let Value::Array(array) = &value {
                    observer::depend_array(array);
                }
            }
        }
        value
    }

    /// Assign `key`.
    ///
    /// Reactive properties notify their subscribers when the value changes
    /// by identity. Existing plain properties are overwritten silently; new
    /// keys are added as plain data. Frozen objects and read-only properties
    /// warn and leave the value unchanged.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let flags = self.flags();
        let outcome = {
            let mut props = self.inner.props.borrow_mut();
            match props.get_mut(key) {
                Some(prop) if flags.contains(ContainerFlags::FROZEN) || prop.readonly => {
                    WriteOutcome::Rejected(format!(
                        "Set operation on key \"{key}\" failed: target is readonly."
                    ))
                }
                Some(prop) if prop.value.same_value(&value) => WriteOutcome::Done,
                Some(prop) => match &prop.reactive {
                    Some(slot) => WriteOutcome::Intercepted(slot.clone()),
                    None => {
                        prop.value = value.clone();
                        WriteOutcome::Done
                    }
                },
                None if flags.intersects(ContainerFlags::FROZEN | ContainerFlags::NON_EXTENSIBLE) => {
                    WriteOutcome::Rejected(format!(
                        "Cannot add property \"{key}\": object is not extensible."
                    ))
                }
                None => {
                    props.insert(Rc::from(key), Property::plain(value.clone()));
                    WriteOutcome::Done
                }
            }
        };

        let slot = match outcome {
            WriteOutcome::Done => return,
            WriteOutcome::Rejected(msg) => {
                config::warn(&msg);
                return;
            }
            WriteOutcome::Intercepted(slot) => slot,
        };
        if let Some(custom_setter) = &slot.custom_setter {
            custom_setter();
        }
        if let Some(prop) = self.inner.props.borrow_mut().get_mut(key) {
            prop.value = value.clone();
        }
        if !slot.shallow {
            observer::observe(&value, false);
        }
        slot.dep.notify();
    }

    /// Define `key` as a plain data property, replacing any existing
    /// property (and its interception) without notifying anyone.
    ///
    /// Intended for building state before it is observed.
    pub fn insert(&self, key: &str, value: impl Into<Value>) {
        self.inner
            .props
            .borrow_mut()
            .insert(Rc::from(key), Property::plain(value.into()));
    }

    /// Builder form of [`Object::insert`].
    #[must_use]
    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Delete `key` without notifying anyone. See
    /// [`del`](crate::observer::del) for the reactive form.
    pub fn remove(&self, key: &str) -> Option<Value> {
        if self.is_frozen() {
            return None;
        }
        self.inner
            .props
            .borrow_mut()
            .shift_remove(key)
            .map(|prop| prop.value)
    }

    /// Own keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.inner.props.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.props.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.props.borrow().is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.props.borrow().contains_key(key)
    }

    /// Whether `key` currently has interception installed.
    #[must_use]
    pub fn is_reactive(&self, key: &str) -> bool {
        self.inner
            .props
            .borrow()
            .get(key)
            .is_some_and(|prop| prop.reactive.is_some())
    }

    /// The dep of a reactive property.
    #[must_use]
    pub fn property_dep(&self, key: &str) -> Option<Dep> {
        self.inner
            .props
            .borrow()
            .get(key)
            .and_then(|prop| prop.reactive.as_ref().map(|slot| slot.dep.clone()))
    }

    /// Mark `key` read-only: later writes warn and no-op.
    pub fn set_readonly(&self, key: &str) {
        if let Some(prop) = self.inner.props.borrow_mut().get_mut(key) {
            prop.readonly = true;
        }
    }

    /// Forbid writes and new keys.
    pub fn freeze(&self) {
        self.add_flags(ContainerFlags::FROZEN | ContainerFlags::NON_EXTENSIBLE);
    }

    /// Forbid new keys.
    pub fn prevent_extensions(&self) {
        self.add_flags(ContainerFlags::NON_EXTENSIBLE);
    }

    /// Flag as a foreign instance that must never be observed.
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

    /// The instrumentation handle, if this object is observed.
    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.observer.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    pub(crate) fn props_mut(&self) -> RefMut<'_, PropertyMap> {
        self.inner.props.borrow_mut()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable address of the shared container, for identity sets.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    fn add_flags(&self, flags: ContainerFlags) {
        self.inner.flags.set(self.inner.flags.get() | flags);
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Object::new();
        for (key, value) in iter {
            object.insert(key.as_ref(), value);
        }
        object
    }
}

// Keys only: observed graphs may be cyclic.
impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys())
            .field("observed", &self.inner.observer.borrow().is_some())
            .finish()
    }
}
