//! JSON merge patch (RFC 7386) helpers

use serde_json::{Map, Value};

/// Apply `patch` to `target` in place
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                apply_merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Compute the merge patch that turns `from` into `to`
///
/// Returns `None` when the two documents are equal. Removed keys are
/// expressed as `null`; arrays and scalars are replaced wholesale.
#[must_use]
pub fn diff_merge_patch(from: &Value, to: &Value) -> Option<Value> {
    if from == to {
        return None;
    }
    match (from, to) {
        (Value::Object(from_map), Value::Object(to_map)) => {
            let mut patch = Map::new();
            for (key, to_value) in to_map {
                match from_map.get(key) {
                    Some(from_value) => {
                        if let Some(child) = diff_merge_patch(from_value, to_value) {
                            patch.insert(key.clone(), child);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), to_value.clone());
                    }
                }
            }
            for key in from_map.keys() {
                if !to_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Some(Value::Object(patch))
        }
        _ => Some(to.clone()),
    }
}
