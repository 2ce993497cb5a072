//! JSON merge helpers used by the reducer
//!
//! Screens hand the store loosely shaped JSON (ticker responses, scratch
//! state). These helpers combine such values into a region without
//! mutating the region they were given.

use serde_json::{Map, Value};

/// Recursively merge `patch` into `base`, returning the combined value
///
/// Objects are combined key by key. Any other patch value, including
/// arrays and `null`, replaces what was there.
pub fn deep_merge(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            let mut merged = base.clone();
            for (key, value) in patch {
                let combined = match base.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), combined);
            }
            Value::Object(merged)
        }
        (_, patch) => patch.clone(),
    }
}

/// Overlay the top-level keys of `patch` onto `base`
pub fn shallow_merge(base: &Map<String, Value>, patch: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
