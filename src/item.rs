//! Item type: one ordered-key record flowing through a pipe.
//!
//! Items are JSON objects whose keys keep their insertion order. Nested
//! fields are addressed with dotted paths, where a numeric segment (or a
//! `[n]` suffix) indexes into a sequence:
//!
//! ```
//! use pipes_rs::Item;
//! use serde_json::json;
//!
//! let mut item = Item::from_value(json!({"a": {"b": [{"c": 1}]}}));
//! assert_eq!(item.get("a.b[0].c", json!("")), json!(1));
//! assert_eq!(item.get("a.b.0.c", json!("")), json!(1));
//! assert_eq!(item.get("a.missing", json!("none")), json!("none"));
//!
//! item.set("x.y", json!("new"));
//! assert_eq!(item.get("x.y", json!("")), json!("new"));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key used when a non-object value is wrapped into an item.
pub const CONTENT_KEY: &str = "content";

/// An ordered-key, arbitrarily nested record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item {
    fields: Map<String, Value>,
}

impl Item {
    /// Create an empty item.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an item from any JSON value.
    ///
    /// Objects become the item's fields; any other value is stored under
    /// [`CONTENT_KEY`].
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            other => {
                let mut fields = Map::new();
                fields.insert(CONTENT_KEY.to_string(), other);
                Self { fields }
            }
        }
    }

    /// Borrow the value at `path`, if every segment resolves.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segs = segments(path);
        let first = segs.next()?;
        let mut current = self.fields.get(first)?;
        for seg in segs {
            current = match current {
                Value::Object(map) => map.get(seg)?,
                Value::Array(list) => list.get(seg.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolve `path`, returning `default` when any segment is absent or
    /// traversal reaches a scalar.
    pub fn get(&self, path: &str, default: Value) -> Value {
        self.lookup(path).cloned().unwrap_or(default)
    }

    /// Whether `path` resolves to a value.
    pub fn contains(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    /// Write `value` at `path`, creating intermediate objects as needed.
    ///
    /// Existing values are overwritten, including scalars sitting where a
    /// container is needed. An index equal to (or past) a sequence's length
    /// appends. An empty path is ignored.
    pub fn set(&mut self, path: &str, value: Value) {
        let segs: Vec<&str> = segments(path).collect();
        let Some((last, parents)) = segs.split_last() else {
            return;
        };

        if parents.is_empty() {
            self.fields.insert((*last).to_string(), value);
            return;
        }

        let mut current = self
            .fields
            .entry(parents[0].to_string())
            .or_insert(Value::Null);
        if !is_container(current) {
            *current = Value::Object(Map::new());
        }
        for seg in &parents[1..] {
            current = child_mut(current, seg);
        }
        put(current, last, value);
    }

    /// Remove and return the top-level field `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// Iterate over top-level fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the item has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Borrow the underlying field map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert the item into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Clone the item into a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl From<Map<String, Value>> for Item {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl From<Item> for Value {
    fn from(item: Item) -> Self {
        item.into_value()
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.fields) {
            Ok(text) => f.write_str(&text),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Split a path into segments, treating `a[0]` the same as `a.0`.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['.', '[', ']']).filter(|s| !s.is_empty())
}

/// Step into `seg` of `current`, making room for it if needed.
fn child_mut<'a>(current: &'a mut Value, seg: &str) -> &'a mut Value {
    let child = match array_slot(current, seg) {
        Some(idx) => &mut current[idx],
        None => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            &mut current[seg]
        }
    };
    if !is_container(child) {
        *child = Value::Object(Map::new());
    }
    child
}

/// Store `value` under the final segment of a path.
fn put(current: &mut Value, seg: &str, value: Value) {
    match array_slot(current, seg) {
        Some(idx) => current[idx] = value,
        None => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            current[seg] = value;
        }
    }
}

/// Slot index for `seg` when `current` is a sequence, appending past the end.
fn array_slot(current: &mut Value, seg: &str) -> Option<usize> {
    let list = current.as_array_mut()?;
    let idx = seg.parse::<usize>().ok()?;
    if idx >= list.len() {
        list.push(Value::Null);
        return Some(list.len() - 1);
    }
    Some(idx)
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Item {
        Item::from_value(json!({
            "title": "Hello World",
            "author": {"name": "Ann", "tags": ["a", "b"]},
            "links": [{"href": "x"}, {"href": "y"}]
        }))
    }

    #[test]
    fn test_get_top_level() {
        assert_eq!(sample().get("title", json!("")), json!("Hello World"));
    }

    #[test]
    fn test_get_nested_and_indexed() {
        let item = sample();
        assert_eq!(item.get("author.name", json!("")), json!("Ann"));
        assert_eq!(item.get("author.tags.1", json!("")), json!("b"));
        assert_eq!(item.get("links[1].href", json!("")), json!("y"));
    }

    #[test]
    fn test_get_missing_yields_default() {
        let item = sample();
        assert_eq!(item.get("nope", json!("")), json!(""));
        assert_eq!(item.get("author.age", json!(0)), json!(0));
        assert_eq!(item.get("links.9.href", json!("d")), json!("d"));
        assert_eq!(item.get("links.x", json!("d")), json!("d"));
    }

    #[test]
    fn test_get_through_scalar_yields_default() {
        assert_eq!(sample().get("title.length", json!("d")), json!("d"));
    }

    #[test]
    fn test_set_overwrites() {
        let mut item = sample();
        item.set("title", json!("Hello Pipes"));
        assert_eq!(item.get("title", json!("")), json!("Hello Pipes"));
        assert_eq!(item.len(), 3);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut item = Item::new();
        item.set("a.b.c", json!(1));
        assert_eq!(item.to_value(), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_set_replaces_scalar_on_path() {
        let mut item = sample();
        item.set("title.text", json!("t"));
        assert_eq!(item.get("title", json!("")), json!({"text": "t"}));
    }

    #[test]
    fn test_set_into_sequence() {
        let mut item = sample();
        item.set("links.0.href", json!("z"));
        item.set("author.tags.2", json!("c"));
        assert_eq!(item.get("links.0.href", json!("")), json!("z"));
        assert_eq!(item.get("author.tags", json!([])), json!(["a", "b", "c"]));
    }

    #[test]
    fn test_set_keeps_key_order() {
        let mut item = Item::from_value(json!({"z": 1, "a": 2}));
        item.set("z", json!(3));
        item.set("m", json!(4));
        let keys: Vec<&str> = item.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_set_empty_path_is_ignored() {
        let mut item = sample();
        item.set("", json!(1));
        assert_eq!(item, sample());
    }

    #[test]
    fn test_from_scalar_wraps_content() {
        let item = Item::from_value(json!("text"));
        assert_eq!(item.get(CONTENT_KEY, json!("")), json!("text"));
    }

    #[test]
    fn test_display_is_json() {
        let item = Item::from_value(json!({"b": 1, "a": "x"}));
        assert_eq!(item.to_string(), r#"{"b":1,"a":"x"}"#);
    }
}
