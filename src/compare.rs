//! Structural, order-insensitive, type-coercing comparison of resource state.
//!
//! Decides whether a merged desired-state candidate and a live resource are
//! the same for the purpose of skipping an update call. The equivalence is
//! deliberately relaxed: key order and list order carry no weight, scalars
//! compare by normalised string form (`1`, `1.0` and `"1"` are equal), and
//! `null`, `""`, `[]`, `{}`, `false` and numeric zero are mutually
//! interchangeable "absent" values; a key missing from one side is the same
//! as that key holding any of them. OmniStack responses intermix
//! server-generated fields (IDs, timestamps) with the fields an operator
//! asserts, and this rule set absorbs that representation noise. Downstream
//! idempotence depends on it; do not tighten it.
//!
//! Both entry points are total: structurally mismatched values fall through
//! to string comparison instead of failing.

use serde_json::Value;

use crate::types::Resource;

/// Whether two resource mappings are semantically equal.
///
/// Every key of `a` must either match in `b` under the relaxed rules or be
/// falsy; then every key only in `b` must be falsy.
pub fn equal(a: &Resource, b: &Resource) -> bool {
    for (key, a_value) in a {
        match b.get(key) {
            None => {
                if truthy(a_value) {
                    log::debug!("difference at key '{key}': missing from the second resource");
                    return false;
                }
            }
            Some(b_value) => {
                if !values_equal(key, a_value, b_value) {
                    return false;
                }
            }
        }
    }

    // Keys only the second resource has must all be falsy.
    for (key, b_value) in b {
        if !a.contains_key(key) && truthy(b_value) {
            log::debug!("difference at key '{key}': missing from the first resource");
            return false;
        }
    }

    true
}

/// Whether two lists are equal as unordered multisets.
///
/// Note the asymmetry inherited from the update-decision domain: an empty
/// `b` is never equal, even to an empty `a`. Nested empty lists still
/// compare equal through [`equal`], whose falsy rule runs first.
pub fn equal_list(a: &[Value], b: &[Value]) -> bool {
    if b.is_empty() {
        log::debug!("second list is empty");
        return false;
    }
    if a.len() != b.len() {
        log::debug!("lists differ in length ({} vs {})", a.len(), b.len());
        return false;
    }

    // Sorting both sides by canonical string form pairs up matching
    // elements regardless of their original positions.
    let mut a_sorted: Vec<&Value> = a.iter().collect();
    let mut b_sorted: Vec<&Value> = b.iter().collect();
    a_sorted.sort_by_cached_key(|v| sort_key(v));
    b_sorted.sort_by_cached_key(|v| sort_key(v));

    a_sorted
        .iter()
        .zip(&b_sorted)
        .all(|(a_item, b_item)| element_equal(a_item, b_item))
}

/// Per-key comparison inside [`equal`]. The falsy rule runs before any type
/// dispatch so that e.g. a desired `count: 0` matches a live `count: null`.
fn values_equal(key: &str, a: &Value, b: &Value) -> bool {
    if !truthy(a) && !truthy(b) {
        return true;
    }
    let same = match (a, b) {
        (Value::Object(a_map), Value::Object(b_map)) => equal(a_map, b_map),
        (Value::Array(a_list), Value::Array(b_list)) => equal_list(a_list, b_list),
        _ => scalar_string(a) == scalar_string(b),
    };
    if !same {
        log::debug!("difference at key '{key}'");
    }
    same
}

/// Pairwise comparison inside [`equal_list`]. List elements get no falsy
/// shortcut; `null` and `0` are different elements.
fn element_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a_map), Value::Object(b_map)) => equal(a_map, b_map),
        (Value::Array(a_list), Value::Array(b_list)) => equal_list(a_list, b_list),
        _ => scalar_string(a) == scalar_string(b),
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Normalised string form of a value. Strings are taken verbatim (unquoted);
/// a float with an integral value prints as that integer, so `1.0` and `"1"`
/// cannot spuriously differ. Composites print as compact JSON with sorted
/// keys, which doubles as the deterministic sort key for mappings.
fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 {
                        // {:.0} prints every digit of an integral float.
                        return if f == 0.0 { "0".to_string() } else { format!("{f:.0}") };
                    }
                }
            }
            n.to_string()
        }
        _ => value.to_string(),
    }
}

fn sort_key(value: &Value) -> String {
    match value {
        Value::Object(_) => value.to_string(),
        _ => scalar_string(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Resource {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn reflexive() {
        let samples = [
            json!({}),
            json!({"x": null}),
            json!({"id": "1", "name": "vm1", "count": 0}),
            json!({"nested": {"a": [1, 2, {"b": null}]}, "flags": [true, false]}),
        ];
        for sample in samples {
            let resource = obj(sample);
            assert!(equal(&resource, &resource));
        }
    }

    #[test]
    fn absent_key_equals_null() {
        assert!(equal(&obj(json!({})), &obj(json!({"x": null}))));
        assert!(equal(&obj(json!({"x": null})), &obj(json!({}))));
    }

    #[test]
    fn absent_key_equals_any_falsy() {
        let empty = obj(json!({}));
        for falsy in [json!(0), json!(""), json!([]), json!({}), json!(false)] {
            let one_key = obj(json!({ "x": falsy }));
            assert!(equal(&one_key, &empty), "left {one_key:?}");
            assert!(equal(&empty, &one_key), "right {one_key:?}");
        }
    }

    #[test]
    fn absent_key_with_truthy_value_differs() {
        assert!(!equal(&obj(json!({"a": true})), &obj(json!({}))));
        assert!(!equal(&obj(json!({})), &obj(json!({"a": 1}))));
        assert!(!equal(&obj(json!({"x": "0"})), &obj(json!({}))));
    }

    #[test]
    fn scalar_type_coercion() {
        assert!(equal(&obj(json!({"x": 1})), &obj(json!({"x": "1"}))));
        assert!(equal(&obj(json!({"x": 1.0})), &obj(json!({"x": "1"}))));
        assert!(equal(&obj(json!({"x": 1.5})), &obj(json!({"x": "1.5"}))));
        assert!(equal(&obj(json!({"x": 2.0})), &obj(json!({"x": 2}))));
        assert!(equal(&obj(json!({"x": "0"})), &obj(json!({"x": 0}))));
        assert!(!equal(&obj(json!({"x": 1})), &obj(json!({"x": "2"}))));
    }

    #[test]
    fn large_integral_floats_keep_every_digit() {
        assert!(equal(
            &obj(json!({"x": 1.0e16})),
            &obj(json!({"x": "10000000000000000"})),
        ));
        assert!(!equal(
            &obj(json!({"x": 1.0e16})),
            &obj(json!({"x": "10000000000000001"})),
        ));
    }

    #[test]
    fn mutually_falsy_values_are_equal() {
        assert!(equal(&obj(json!({"count": 0})), &obj(json!({"count": null}))));
        assert!(equal(&obj(json!({"tags": []})), &obj(json!({"tags": ""}))));
        assert!(equal(&obj(json!({"opts": {}})), &obj(json!({"opts": false}))));
    }

    #[test]
    fn list_order_is_ignored() {
        assert!(equal(&obj(json!({"a": [1, 2]})), &obj(json!({"a": [2, 1]}))));
        assert!(!equal(&obj(json!({"a": [1, 2]})), &obj(json!({"a": [1, 2, 3]}))));
    }

    #[test]
    fn list_elements_coerce_like_scalars() {
        assert!(equal(&obj(json!({"a": [1, "b"]})), &obj(json!({"a": ["b", 1.0]}))));
        assert!(!equal(&obj(json!({"a": [1, "b"]})), &obj(json!({"a": ["b", 2]}))));
    }

    #[test]
    fn nested_lists_recurse() {
        assert!(equal(
            &obj(json!({"a": [[1, 2], [3]]})),
            &obj(json!({"a": [[3], [2, 1]]})),
        ));
    }

    #[test]
    fn nested_mapping_mismatch() {
        assert!(!equal(&obj(json!({"a": {"x": 1}})), &obj(json!({"a": {"x": 2}}))));
        assert!(equal(&obj(json!({"a": {"x": 1}})), &obj(json!({"a": {"x": 1}}))));
    }

    #[test]
    fn extra_falsy_keys_are_noise() {
        let asserted = obj(json!({"name": "vm1"}));
        let live = obj(json!({
            "name": "vm1",
            "deleted_at": null,
            "backup_count": 0,
            "notes": "",
            "tags": [],
            "extra": {},
            "locked": false
        }));
        assert!(equal(&asserted, &live));
        assert!(equal(&live, &asserted));
    }

    #[test]
    fn mismatched_structures_fall_through_to_strings() {
        assert!(!equal(&obj(json!({"x": [1]})), &obj(json!({"x": "1"}))));
        assert!(!equal(&obj(json!({"x": {"y": null}})), &obj(json!({"x": 7}))));
        // same JSON text on both sides does coerce
        assert!(equal(&obj(json!({"x": [1]})), &obj(json!({"x": "[1]"}))));
    }

    #[test]
    fn equal_list_of_mappings() {
        assert!(equal_list(&[json!({"k": 1})], &[json!({"k": 1})]));
        assert!(!equal_list(&[json!({"k": 1})], &[json!({"k": 2})]));
    }

    #[test]
    fn equal_list_mappings_in_any_order() {
        let a = [json!({"name": "r1", "days": "Mon"}), json!({"name": "r2", "days": "Tue"})];
        let b = [json!({"days": "Tue", "name": "r2"}), json!({"days": "Mon", "name": "r1"})];
        assert!(equal_list(&a, &b));
    }

    #[test]
    fn equal_list_rejects_empty_second_list() {
        assert!(!equal_list(&[json!(1)], &[]));
        assert!(!equal_list(&[], &[]));
        // through the mapping comparator the falsy rule wins instead
        assert!(equal(&obj(json!({"a": []})), &obj(json!({"a": []}))));
    }

    #[test]
    fn list_elements_get_no_falsy_shortcut() {
        assert!(!equal_list(&[json!(null)], &[json!(0)]));
    }

    #[test]
    fn merged_candidate_with_falsy_patch_matches_current() {
        // current {"id":"1","name":"vm1","count":0} + patch {"count":null}
        let current = obj(json!({"id": "1", "name": "vm1", "count": 0}));
        let merged = obj(json!({"id": "1", "name": "vm1", "count": null}));
        assert!(equal(&current, &merged));
    }
}
