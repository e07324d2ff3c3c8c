use serde_json::Value;

/// Deep merge two json values. Moves the values of `b` into `a`.
/// Source: https://stackoverflow.com/a/54118457
pub fn deep_merge(a: &mut Value, b: Value) {
    match (a, b) {
        // Both values are objects. Merge them and only unset
        // fields when null is explicitly specified.
        (&mut Value::Object(ref mut a), Value::Object(b)) => b.into_iter().for_each(|(k, v)| {
            if v.is_null() {
                a.remove(&k);
            } else {
                deep_merge(a.entry(k).or_insert(Value::Null), v);
            }
        }),
        // One or both or the values are not capable of deep merge.
        (a, b) => {
            *a = b;
        }
    }
}

/// One-way absorptive merge: fills fields in `a` that are absent or `null`
/// with the corresponding value from `b`, but never overwrites a field `a`
/// already has set (spec.md §4.3 "the spec is one-way absorptive", §9
/// "Spec-from-nodes absorption"). Used by the model aggregator to fold a
/// node-reported `config` into a model's spec without fighting user edits.
pub fn absorb(a: &mut Value, b: Value) {
    match (a, b) {
        (&mut Value::Object(ref mut a), Value::Object(b)) => b.into_iter().for_each(|(k, v)| {
            match a.get(&k) {
                Some(existing) if !existing.is_null() => {}
                _ => {
                    absorb(a.entry(k).or_insert(Value::Null), v);
                }
            }
        }),
        (a, b) if a.is_null() => {
            *a = b;
        }
        _ => {}
    }
}
