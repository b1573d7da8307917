//! Recursive mapping merge.

use serde_yaml::{Mapping, Value};

/// Merge `overlay` into `base`.
///
/// Keys only in the overlay are inserted. When both sides hold a mapping the
/// merge recurses; any other conflict is resolved in favour of the overlay.
/// Not commutative.
pub fn merge(base: &mut Mapping, overlay: Mapping) {
    for (key, incoming) in overlay {
        match base.get_mut(&key) {
            Some(existing) => merge_value(existing, incoming),
            None => {
                base.insert(key, incoming);
            }
        }
    }
}

fn merge_value(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Mapping(existing), Value::Mapping(incoming)) => merge(existing, incoming),
        (existing, incoming) => {
            if *existing != incoming {
                *existing = incoming;
            }
        }
    }
}
