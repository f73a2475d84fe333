//! Dotted-path access into the run data store.
//!
//! Skills declare `requires`/`produces` as dotted paths like `"customer.id"`
//! or `"items.0.sku"` rather than flat keys, so the engine needs a single
//! place that knows how to read, write, and probe those paths against the
//! `serde_json::Value` tree backing a run's data store. Every other crate
//! that touches run data goes through [`get`], [`set`], and [`has`] instead
//! of hand-rolling `Value` traversal.
//!
//! Writing auto-vivifies missing map segments (`set(Value::Null, "a.b", 1)`
//! produces `{"a": {"b": 1}}`), but list segments are never vivified out of
//! thin air: a numeric segment is only valid against an existing array, and
//! the only list mutation allowed is writing an existing index or appending
//! at exactly the current length. A hole-punching write like index `5` into
//! a 2-element list is rejected rather than silently padded with nulls.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    EmptyPath,

    #[error("segment '{0}' is not a valid list index")]
    InvalidIndex(String),

    #[error("index {index} would leave a gap in a list of length {len}")]
    SparseListWrite { index: usize, len: usize },

    #[error("cannot descend into a scalar value at segment '{0}'")]
    NotContainer(String),
}

/// Read the value at `path`, or `None` if any segment along the way is
/// missing. There is no distinct "missing" sentinel beyond `Option::None`;
/// callers that need to distinguish "absent" from "present but null" should
/// check [`has`] first.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments(path) {
        current = step(current, segment)?;
    }
    Some(current)
}

/// True iff every prefix of `path`, including the full path, resolves to a
/// present value (possibly `Value::Null`).
pub fn has(root: &Value, path: &str) -> bool {
    get(root, path).is_some()
}

/// Write `value` at `path`, auto-vivifying missing map segments along the
/// way. Returns an error rather than padding a list with nulls or
/// overwriting a scalar it can't descend through.
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    let segs: Vec<&str> = segments(path).collect();
    let Some((leaf, ancestors)) = segs.split_last() else {
        return Err(PathError::EmptyPath);
    };

    let mut current = root;
    for segment in ancestors {
        current = ensure_child(current, segment)?;
    }
    write_leaf(current, leaf, value)
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

fn step<'a>(current: &'a Value, segment: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(segment),
        Value::Array(list) => segment.parse::<usize>().ok().and_then(|i| list.get(i)),
        _ => None,
    }
}

/// Resolve (vivifying maps as needed) the mutable child at `segment`,
/// suitable for continuing descent. Never creates a list out of nothing;
/// only extends an existing one by exactly one slot.
fn ensure_child<'a>(current: &'a mut Value, segment: &str) -> Result<&'a mut Value, PathError> {
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => Ok(map.entry(segment.to_string()).or_insert(Value::Null)),
        Value::Array(list) => {
            let index = segment
                .parse::<usize>()
                .map_err(|_| PathError::InvalidIndex(segment.to_string()))?;
            if index < list.len() {
                Ok(&mut list[index])
            } else if index == list.len() {
                list.push(Value::Null);
                Ok(list.last_mut().expect("just pushed"))
            } else {
                Err(PathError::SparseListWrite {
                    index,
                    len: list.len(),
                })
            }
        }
        _ => Err(PathError::NotContainer(segment.to_string())),
    }
}

fn write_leaf(current: &mut Value, segment: &str, value: Value) -> Result<(), PathError> {
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => {
            map.insert(segment.to_string(), value);
            Ok(())
        }
        Value::Array(list) => {
            let index = segment
                .parse::<usize>()
                .map_err(|_| PathError::InvalidIndex(segment.to_string()))?;
            if index < list.len() {
                list[index] = value;
                Ok(())
            } else if index == list.len() {
                list.push(value);
                Ok(())
            } else {
                Err(PathError::SparseListWrite {
                    index,
                    len: list.len(),
                })
            }
        }
        _ => Err(PathError::NotContainer(segment.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_reads_nested_map_and_list_segments() {
        let root = json!({"customer": {"orders": [{"sku": "A1"}, {"sku": "B2"}]}});
        assert_eq!(get(&root, "customer.orders.1.sku"), Some(&json!("B2")));
        assert_eq!(get(&root, "customer.orders.9.sku"), None);
        assert_eq!(get(&root, "missing.path"), None);
    }

    #[test]
    fn has_checks_the_full_chain() {
        let root = json!({"a": {"b": null}});
        assert!(has(&root, "a.b"));
        assert!(!has(&root, "a.b.c"));
        assert!(!has(&root, "a.x"));
    }

    #[test]
    fn set_vivifies_missing_maps() {
        let mut root = Value::Null;
        set(&mut root, "a.b.c", json!(1)).unwrap();
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn set_overwrites_existing_map_key() {
        let mut root = json!({"a": {"b": 1}});
        set(&mut root, "a.b", json!(2)).unwrap();
        assert_eq!(root, json!({"a": {"b": 2}}));
    }

    #[test]
    fn set_appends_to_list_at_exact_length() {
        let mut root = json!({"items": [1, 2]});
        set(&mut root, "items.2", json!(3)).unwrap();
        assert_eq!(root, json!({"items": [1, 2, 3]}));
    }

    #[test]
    fn set_rejects_sparse_list_write() {
        let mut root = json!({"items": [1, 2]});
        let err = set(&mut root, "items.5", json!(3)).unwrap_err();
        assert_eq!(
            err,
            PathError::SparseListWrite { index: 5, len: 2 }
        );
        assert_eq!(root, json!({"items": [1, 2]}));
    }

    #[test]
    fn set_vivifies_list_element_as_map_for_deeper_path() {
        let mut root = json!({"items": []});
        set(&mut root, "items.0.sku", json!("A1")).unwrap();
        assert_eq!(root, json!({"items": [{"sku": "A1"}]}));
    }

    #[test]
    fn set_rejects_descending_through_a_scalar() {
        let mut root = json!({"a": 1});
        let err = set(&mut root, "a.b", json!(2)).unwrap_err();
        assert_eq!(err, PathError::NotContainer("b".to_string()));
    }

    #[test]
    fn empty_path_is_rejected() {
        let mut root = Value::Null;
        assert_eq!(set(&mut root, "", json!(1)).unwrap_err(), PathError::EmptyPath);
    }
}
