#![forbid(unsafe_code)]

//! Deep traversal: force-read a value so every nested reactive property
//! registers with the evaluating watcher.

use std::cell::RefCell;

use ahash::AHashSet;

use crate::value::Value;

thread_local! {
    // Scratch set reused across calls; empty between top-level traversals.
    static SEEN: RefCell<AHashSet<usize>> = RefCell::new(AHashSet::default());
}

/// Recursively read every own entry of `value`.
///
/// Objects are read through their tracked getters; arrays element by
/// element. Primitives, opaque values, frozen and raw containers are
/// skipped. Each container is visited once, so cyclic graphs terminate.
pub fn traverse(value: &Value) {
    let mut seen = SEEN.with(|seen| std::mem::take(&mut *seen.borrow_mut()));
    visit(value, &mut seen);
    seen.clear();
    SEEN.with(|slot| *slot.borrow_mut() = seen);
}

fn visit(value: &Value, seen: &mut AHashSet<usize>) {
    match value {
        Value::Object(object) => {
            if object.is_frozen() || object.is_raw() || !seen.insert(object.addr()) {
                return;
            }
            for key in object.keys() {
                visit(&object.get(&key), seen);
            }
        }
        Value::Array(array) => {
            if array.is_frozen() || array.is_raw() || !seen.insert(array.addr()) {
                return;
            }
            for item in array.to_vec() {
                visit(&item, seen);
            }
        }
        _ => {}
    }
}
