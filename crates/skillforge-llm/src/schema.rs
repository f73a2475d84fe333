//! Builds a JSON Schema describing a skill's possible output shape from its
//! dotted `produces`/`optional_produces` paths, so an LLM executor can ask
//! the model for exactly that shape instead of parsing free text.
//!
//! `"customer.id"` in `produces` and `"customer.note"` in
//! `optional_produces` becomes:
//!
//! ```json
//! {
//!   "type": "object",
//!   "properties": {
//!     "customer": {
//!       "type": "object",
//!       "properties": { "id": {}, "note": {} },
//!       "required": ["id"]
//!     }
//!   },
//!   "required": ["customer"]
//! }
//! ```
//!
//! A branch is marked `required` at every level that leads to at least one
//! required leaf; a branch reachable only through optional leaves is never
//! required, even if it contains nested structure.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Default)]
struct Node {
    children: BTreeMap<String, Node>,
    leaf_required: Option<bool>,
}

impl Node {
    fn insert(&mut self, segments: &[&str], required: bool) {
        let Some((head, rest)) = segments.split_first() else {
            return;
        };
        let child = self.children.entry((*head).to_string()).or_default();
        if rest.is_empty() {
            child.leaf_required = Some(child.leaf_required.unwrap_or(false) || required);
        } else {
            child.insert(rest, required);
        }
    }

    fn any_required(&self) -> bool {
        self.children.values().any(|c| c.is_required())
    }

    fn is_required(&self) -> bool {
        match self.leaf_required {
            Some(required) => required,
            None => self.any_required(),
        }
    }

    fn to_schema(&self) -> Value {
        if self.children.is_empty() {
            return json!({});
        }
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (key, child) in &self.children {
            properties.insert(key.clone(), child.to_schema());
            if child.is_required() {
                required.push(Value::String(key.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": required,
            "additionalProperties": true,
        })
    }
}

/// Build an output JSON Schema from a skill's `produces` and
/// `optional_produces` path sets.
pub fn build_output_schema<'a>(
    produces: impl IntoIterator<Item = &'a str>,
    optional_produces: impl IntoIterator<Item = &'a str>,
) -> Value {
    let mut root = Node::default();
    for path in produces {
        let segments: Vec<&str> = path.split('.').collect();
        root.insert(&segments, true);
    }
    for path in optional_produces {
        let segments: Vec<&str> = path.split('.').collect();
        root.insert(&segments, false);
    }
    if root.children.is_empty() {
        json!({"type": "object", "additionalProperties": true})
    } else {
        root.to_schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_paths_become_top_level_required_properties() {
        let schema = build_output_schema(["customer_id", "total"], []);
        assert_eq!(
            schema["required"],
            json!(["customer_id", "total"])
        );
    }

    #[test]
    fn nested_required_path_marks_every_ancestor_required() {
        let schema = build_output_schema(["customer.id"], []);
        assert_eq!(schema["required"], json!(["customer"]));
        assert_eq!(schema["properties"]["customer"]["required"], json!(["id"]));
    }

    #[test]
    fn optional_only_branch_is_never_required() {
        let schema = build_output_schema([], ["customer.note"]);
        assert_eq!(schema["required"], json!([] as [&str; 0]));
        assert_eq!(
            schema["properties"]["customer"]["required"],
            json!([] as [&str; 0])
        );
    }

    #[test]
    fn mixed_required_and_optional_siblings() {
        let schema = build_output_schema(["customer.id"], ["customer.note"]);
        let required = schema["properties"]["customer"]["required"].as_array().unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "id");
        assert!(schema["properties"]["customer"]["properties"]
            .get("note")
            .is_some());
    }

    #[test]
    fn empty_inputs_yield_a_permissive_object_schema() {
        let schema = build_output_schema([], []);
        assert_eq!(schema["type"], "object");
    }
}
