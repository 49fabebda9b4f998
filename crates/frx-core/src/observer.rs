#![forbid(unsafe_code)]

//! Instrumentation: turning plain containers into observed state.
//!
//! [`observe`] attaches an [`Observer`] handle to an [`Object`] or [`Array`]
//! and walks it, installing interception on every own key (objects) or
//! observing every element (arrays). The handle carries the container's own
//! dep, notified on structural change (keys added or deleted through
//! [`set`]/[`del`], array mutators), and the root owner-count.
//!
//! # Invariants
//!
//! 1. `observe` is idempotent: an already-observed container returns its
//!    existing handle, so cyclic graphs terminate.
//! 2. Only extensible, non-raw containers are instrumented, and only while
//!    [`toggle_observing`] has not suspended it.
//! 3. Root containers (owner-count > 0) reject ad hoc key addition and
//!    deletion with a warning.

use std::cell::Cell;
use std::rc::Rc;

use crate::array::Array;
use crate::config;
use crate::dep::Dep;
use crate::object::{CustomSetter, Object, Property, ReactiveSlot};
use crate::value::{Key, Value};

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Suspend (`false`) or resume (`true`) creation of new observers.
pub fn toggle_observing(value: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(value));
}

#[must_use]
pub fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Instrumentation handle attached to an observed container.
#[derive(Debug)]
pub struct Observer {
    dep: Dep,
    vm_count: Cell<usize>,
    shallow: bool,
}

impl Observer {
    fn new(shallow: bool) -> Rc<Self> {
        Rc::new(Self {
            dep: Dep::new(),
            vm_count: Cell::new(0),
            shallow,
        })
    }

    /// The container's own dep.
    #[must_use]
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// Number of root state containers owning this value.
    #[must_use]
    pub fn vm_count(&self) -> usize {
        self.vm_count.get()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.vm_count.get() > 0
    }

    #[must_use]
    pub fn is_shallow(&self) -> bool {
        self.shallow
    }

    /// Drop one root ownership, e.g. when the owning component is destroyed.
    pub fn release_root(&self) {
        self.vm_count.set(self.vm_count.get().saturating_sub(1));
    }
}

/// Instrument `value` if it is an observable container. Returns the
/// existing or new handle; `None` for primitives, opaque values, frozen or
/// raw containers, or while observation is suspended.
pub fn observe(value: &Value, as_root: bool) -> Option<Rc<Observer>> {
    observe_with(value, as_root, false)
}

/// Like [`observe`], but nested values are left uninstrumented.
pub fn observe_shallow(value: &Value, as_root: bool) -> Option<Rc<Observer>> {
    observe_with(value, as_root, true)
}

fn observe_with(value: &Value, as_root: bool, shallow: bool) -> Option<Rc<Observer>> {
    let observer = match value {
        Value::Object(object) => object.observer().or_else(|| {
            (should_observe() && object.is_extensible() && !object.is_raw())
                .then(|| attach_object(object, shallow))
        }),
        Value::Array(array) => array.observer().or_else(|| {
            (should_observe() && array.is_extensible() && !array.is_raw())
                .then(|| attach_array(array, shallow))
        }),
        _ => None,
    };
    if as_root && let Some(observer) = &observer {
        observer.vm_count.set(observer.vm_count.get() + 1);
    }
    observer
}

fn attach_object(object: &Object, shallow: bool) -> Rc<Observer> {
    let observer = Observer::new(shallow);
    // Attach before walking so cycles back to this object stop here.
    object.attach_observer(Rc::clone(&observer));
    for key in object.keys() {
        make_reactive(object, &key, None, None, shallow);
    }
    observer
}

fn attach_array(array: &Array, shallow: bool) -> Rc<Observer> {
    let observer = Observer::new(shallow);
    array.attach_observer(Rc::clone(&observer));
    if !shallow {
        for item in array.to_vec() {
            observe(&item, false);
        }
    }
    observer
}

/// Install interception on `key`, keeping an existing dep if the key is
/// already reactive. `initial` replaces the stored value when given.
fn make_reactive(
    object: &Object,
    key: &str,
    initial: Option<Value>,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
) {
    if object.is_frozen() {
        return;
    }
    let value = {
        let mut props = object.props_mut();
        let prop = props
            .entry(Rc::from(key))
            .or_insert_with(|| Property::plain(Value::Undefined));
        if let Some(initial) = initial {
            prop.value = initial;
        }
        let dep = prop
            .reactive
            .as_ref()
            .map_or_else(Dep::new, |slot| slot.dep.clone());
        prop.reactive = Some(ReactiveSlot {
            dep,
            shallow,
            custom_setter,
        });
        prop.value.clone()
    };
    if !shallow {
        observe(&value, false);
    }
}

/// Install one reactive property on `object`.
///
/// `custom_setter` is an advisory hook run before each changing write (the
/// write still happens). With `shallow`, nested values are not observed.
pub fn define_reactive(
    object: &Object,
    key: &str,
    value: impl Into<Value>,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
) {
    make_reactive(object, key, Some(value.into()), custom_setter, shallow);
}

/// Add or replace `key` on `target` so that the change is observable.
///
/// For arrays, `key` must be an index; the array grows as needed. For
/// objects, an existing key is assigned through its setter; a new key on an
/// observed object is made reactive and the object's own dep notified.
/// Returns `value`.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();
    match target {
        Value::Array(array) => match key {
            Key::Index(index) => {
                if array.is_frozen() {
                    config::warn(&format!(
                        "Set operation on key \"{index}\" failed: target is readonly."
                    ));
                    return value;
                }
                array.ensure_len(index);
                array.splice(index, 1, [value.clone()]);
            }
            Key::Name(name) => config::warn(&format!(
                "Cannot set non-index key \"{name}\" on an array."
            )),
        },
        Value::Object(object) => {
            let name = key.to_name();
            if object.contains_key(&name) {
                object.set(&name, value.clone());
                return value;
            }
            let observer = object.observer();
            if observer.as_ref().is_some_and(|ob| ob.is_root()) {
                config::warn(
                    "Avoid adding reactive properties to a root state container at runtime \
                     - declare it upfront.",
                );
                return value;
            }
            match observer {
                Some(observer) if object.is_extensible() => {
                    make_reactive(object, &name, Some(value.clone()), None, observer.is_shallow());
                    observer.dep().notify();
                }
                _ => object.set(&name, value.clone()),
            }
        }
        _ => config::warn("Cannot set reactive property on undefined, null, or primitive value."),
    }
    value
}

/// Delete `key` from `target` so that the change is observable.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();
    match target {
        Value::Array(array) => match key {
            Key::Index(index) => {
                array.splice(index, 1, std::iter::empty::<Value>());
            }
            Key::Name(name) => config::warn(&format!(
                "Cannot delete non-index key \"{name}\" from an array."
            )),
        },
        Value::Object(object) => {
            let name = key.to_name();
            let observer = object.observer();
            if observer.as_ref().is_some_and(|ob| ob.is_root()) {
                config::warn(
                    "Avoid deleting properties on a root state container - just set it to null.",
                );
                return;
            }
            if object.is_frozen() {
                config::warn(&format!(
                    "Delete operation on key \"{name}\" failed: target is readonly."
                ));
                return;
            }
            if object.remove(&name).is_none() {
                return;
            }
            if let Some(observer) = observer {
                observer.dep().notify();
            }
        }
        _ => config::warn("Cannot delete reactive property on undefined, null, or primitive value."),
    }
}

/// The instrumentation handle of a container value.
#[must_use]
pub fn observer_of(value: &Value) -> Option<Rc<Observer>> {
    match value {
        Value::Object(object) => object.observer(),
        Value::Array(array) => array.observer(),
        _ => None,
    }
}

/// Register every observed element of `array` (recursively through nested
/// arrays) with the evaluating watcher.
pub fn depend_array(array: &Array) {
    let mut visited = vec![array.addr()];
    depend_array_inner(array, &mut visited);
}

fn depend_array_inner(array: &Array, visited: &mut Vec<usize>) {
    for item in array.to_vec() {
        if let Some(observer) = observer_of(&item) {
            observer.dep().depend();
        }
        if let Value::Array(nested) = &item
            && !visited.contains(&nested.addr())
        {
            visited.push(nested.addr());
            depend_array_inner(nested, visited);
        }
    }
}
