//! Recursive search over parameter trees and item payloads.
//!
//! Parameter trees and items are `serde_json::Value`, a closed tagged union
//! (null, bool, number, string, array, object). Paths are rendered dotted for
//! object keys and bracketed for array indices: `contact.phones[0].number`.

use serde_json::Value;

/// Visit every value in the tree depth-first, in document order.
///
/// The callback receives the rendered path (empty for the root) and the value.
pub fn walk<F>(value: &Value, visit: &mut F)
where
    F: FnMut(&str, &Value),
{
    walk_at(value, String::new(), visit);
}

fn walk_at<F>(value: &Value, path: String, visit: &mut F)
where
    F: FnMut(&str, &Value),
{
    visit(&path, value);
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                walk_at(child, join_key(&path, key), visit);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                walk_at(child, format!("{}[{}]", path, index), visit);
            }
        }
        _ => {}
    }
}

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// Paths of every leaf (non-container) value matching `predicate`.
pub fn find_leaf_paths<P>(value: &Value, predicate: P) -> Vec<String>
where
    P: Fn(&Value) -> bool,
{
    let mut found = Vec::new();
    walk(value, &mut |path, v| {
        if !v.is_object() && !v.is_array() && !path.is_empty() && predicate(v) {
            found.push(path.to_string());
        }
    });
    found
}

/// A leaf that carries no information: `null` or an empty string.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Paths of blank leaves across a list of items.
///
/// A single item is reported without prefix; several items are prefixed with
/// their index so paths stay unambiguous.
pub fn blank_paths_in_items(items: &[Value]) -> Vec<String> {
    if let [only] = items {
        return find_leaf_paths(only, is_blank);
    }
    items
        .iter()
        .enumerate()
        .flat_map(|(index, item)| {
            find_leaf_paths(item, is_blank)
                .into_iter()
                .map(move |path| format!("[{}].{}", index, path))
        })
        .collect()
}
