#![forbid(unsafe_code)]

//! Dot-delimited path expressions (`"a.b.c"`) for path watchers.

use std::rc::Rc;

use crate::value::Value;

/// Split `path` into segments, or `None` if it contains anything other than
/// identifier characters (letters, digits, `_`, `$`) and dots.
#[must_use]
pub fn parse_path(path: &str) -> Option<Vec<Rc<str>>> {
    let valid = path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.');
    if !valid {
        return None;
    }
    Some(path.split('.').map(Rc::from).collect())
}

/// Read `segments` from `target` through tracked getters.
///
/// Stops with [`Value::Undefined`] at the first segment that does not land
/// on a container.
#[must_use]
pub fn read_path(target: &Value, segments: &[Rc<str>]) -> Value {
    let mut current = target.clone();
    for segment in segments {
        current = match &current {
            Value::Object(object) => object.get(segment),
            Value::Array(array) if &**segment == "length" => Value::from(array.len()),
            Value::Array(array) => segment
                .parse::<usize>()
                .ok()
                .map_or(Value::Undefined, |i| array.get(i)),
            _ => return Value::Undefined,
        };
    }
    current
}
