//!
//! # JSON merge patch
//!
//! Computing and applying RFC 7386 merge patches over `serde_json::Value`.
//! Arrays are replaced as a whole; removed keys are sent as `null`.
//!
use serde_json::{Map, Value};

/// patch that turns `old` into `new`, `None` if they are equal
pub fn diff(old: &Value, new: &Value) -> Option<Value> {
    if old == new {
        return None;
    }

    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();
            for (key, new_value) in new_map {
                match old_map.get(key) {
                    Some(old_value) => {
                        if let Some(child) = diff(old_value, new_value) {
                            patch.insert(key.clone(), child);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Some(Value::Object(patch))
        }
        _ => Some(new.clone()),
    }
}

/// apply `patch` onto `target` in place
pub fn apply(target: &mut Value, patch: &Value) {
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
                apply(
                    target_map.entry(key.clone()).or_insert(Value::Null),
                    value,
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_no_change() {
        let value = json!({"replicas": 3, "labels": {"a": "b"}});
        assert_eq!(diff(&value, &value.clone()), None);
    }

    #[test]
    fn test_nested_change_and_removal() {
        let old = json!({"spec": {"replicas": 2, "apple": 5, "halted": true}});
        let new = json!({"spec": {"replicas": 3, "apple": 5}});
        assert_eq!(
            diff(&old, &new),
            Some(json!({"spec": {"replicas": 3, "halted": null}}))
        );
    }

    #[test]
    fn test_arrays_are_replaced() {
        let old = json!({"conditions": [{"type": "a"}]});
        let new = json!({"conditions": [{"type": "a"}, {"type": "b"}]});
        assert_eq!(
            diff(&old, &new),
            Some(json!({"conditions": [{"type": "a"}, {"type": "b"}]}))
        );
    }

    #[test]
    fn test_apply_reproduces_target() {
        let old = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": [1, 2]});
        let new = json!({"a": 1, "b": {"c": 4}, "e": [3], "f": "x"});
        let patch = diff(&old, &new).expect("patch");

        let mut target = old.clone();
        apply(&mut target, &patch);
        assert_eq!(target, new);
    }
}
