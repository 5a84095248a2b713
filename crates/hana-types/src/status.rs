//! The run-time status store.
//!
//! `Status` is the one mutable namespace of a run. Operations publish their
//! results here, loops bind their variables here, and the executor records
//! its resume position under [`LAST_OP_KEY`]. It serializes as a flat JSON
//! object so the checkpoint file stays readable by hand.

use crate::path::OperationPath;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Path of the last completed operation.
pub const LAST_OP_KEY: &str = "last_op";
/// Per-loop iteration cursors, keyed by the loop's dotted path.
pub const LOOP_CURSORS_KEY: &str = "loop_cursors";
/// Save timestamp written alongside the checkpoint.
pub const SAVED_AT_KEY: &str = "saved_at";

/// Keys owned by the executor that operations and loops may not claim.
pub const RESERVED_KEYS: [&str; 3] = [LAST_OP_KEY, LOOP_CURSORS_KEY, SAVED_AT_KEY];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status {
    values: Map<String, Value>,
}

/// What the checkpoint says about the resume position.
#[derive(Debug, Clone, PartialEq)]
pub enum LastOp {
    /// No position stored: first run.
    Missing,
    /// Something is stored but it is not a usable path.
    Corrupted(Value),
    At(OperationPath),
}

/// Progress of one loop: the iteration in flight and the value its variable
/// shadowed when the loop started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopCursor {
    pub index: usize,
    #[serde(default)]
    pub shadowed: Option<Value>,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value under `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(|v| !v.is_null())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overlay every entry of `other` onto this store.
    pub fn merge(&mut self, other: &Status) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge a handler's published results.
    pub fn apply_updates(&mut self, updates: Map<String, Value>) {
        self.values.extend(updates);
    }

    // -- resume position ----------------------------------------------------

    pub fn last_op(&self) -> LastOp {
        match self.values.get(LAST_OP_KEY) {
            None => LastOp::Missing,
            Some(value) => match OperationPath::from_value(value) {
                Some(path) => LastOp::At(path),
                None => LastOp::Corrupted(value.clone()),
            },
        }
    }

    pub fn set_last_op(&mut self, path: &OperationPath) {
        self.values.insert(LAST_OP_KEY.to_string(), path.to_value());
    }

    // -- loop cursors -------------------------------------------------------

    pub fn loop_cursor(&self, loop_path: &OperationPath) -> Option<LoopCursor> {
        let cursors = self.values.get(LOOP_CURSORS_KEY)?.as_object()?;
        let raw = cursors.get(&loop_path.key())?;
        serde_json::from_value(raw.clone()).ok()
    }

    pub fn set_loop_cursor(&mut self, loop_path: &OperationPath, cursor: &LoopCursor) {
        let entry = self
            .values
            .entry(LOOP_CURSORS_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let (Some(cursors), Ok(raw)) = (entry.as_object_mut(), serde_json::to_value(cursor)) {
            cursors.insert(loop_path.key(), raw);
        }
    }

    pub fn clear_loop_cursor(&mut self, loop_path: &OperationPath) {
        let now_empty = match self
            .values
            .get_mut(LOOP_CURSORS_KEY)
            .and_then(Value::as_object_mut)
        {
            Some(cursors) => {
                cursors.remove(&loop_path.key());
                cursors.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.values.remove(LOOP_CURSORS_KEY);
        }
    }
}

impl From<Map<String, Value>> for Status {
    fn from(values: Map<String, Value>) -> Self {
        Self::from_map(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status_from(value: Value) -> Status {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn last_op_missing_when_absent() {
        assert_eq!(Status::new().last_op(), LastOp::Missing);
    }

    #[test]
    fn last_op_corrupted_for_wrong_shape() {
        let status = status_from(json!({"last_op": "not-a-list"}));
        assert_eq!(status.last_op(), LastOp::Corrupted(json!("not-a-list")));
    }

    #[test]
    fn last_op_round_trips() {
        let mut status = Status::new();
        status.set_last_op(&OperationPath::from(vec![2, 1]));
        assert_eq!(status.get(LAST_OP_KEY), Some(&json!([2, 1])));
        assert_eq!(
            status.last_op(),
            LastOp::At(OperationPath::from(vec![2, 1]))
        );
    }

    #[test]
    fn merge_overwrites_existing_keys() {
        let mut stored = status_from(json!({"bwa_path": "/old/bwa", "nodes": "p.hmr_nodes"}));
        let seeded = status_from(json!({"bwa_path": "/usr/bin/bwa"}));
        stored.merge(&seeded);
        assert_eq!(stored.get_str("bwa_path"), Some("/usr/bin/bwa"));
        assert_eq!(stored.get_str("nodes"), Some("p.hmr_nodes"));
    }

    #[test]
    fn contains_ignores_null() {
        let status = status_from(json!({"a": null, "b": 0}));
        assert!(!status.contains("a"));
        assert!(status.contains("b"));
        assert!(!status.contains("c"));
    }

    #[test]
    fn loop_cursor_set_get_clear() {
        let mut status = Status::new();
        let path = OperationPath::from(vec![3]);
        assert!(status.loop_cursor(&path).is_none());

        let cursor = LoopCursor {
            index: 1,
            shadowed: Some(json!("outer")),
        };
        status.set_loop_cursor(&path, &cursor);
        assert_eq!(status.loop_cursor(&path), Some(cursor));
        assert_eq!(
            status.get(LOOP_CURSORS_KEY),
            Some(&json!({"3": {"index": 1, "shadowed": "outer"}}))
        );

        status.clear_loop_cursor(&path);
        assert!(status.loop_cursor(&path).is_none());
        assert!(status.get(LOOP_CURSORS_KEY).is_none());
    }

    #[test]
    fn malformed_cursor_table_is_replaced() {
        let mut status = status_from(json!({"loop_cursors": 7}));
        let path = OperationPath::from(vec![0]);
        assert!(status.loop_cursor(&path).is_none());
        status.set_loop_cursor(
            &path,
            &LoopCursor {
                index: 0,
                shadowed: None,
            },
        );
        assert_eq!(status.loop_cursor(&path).map(|c| c.index), Some(0));
    }

    #[test]
    fn serializes_flat() {
        let mut status = Status::new();
        status.set("edges", json!("p.hmr_edges"));
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"edges": "p.hmr_edges"})
        );
    }
}
