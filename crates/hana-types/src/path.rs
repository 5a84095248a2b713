//! Operation paths: the resume coordinate of the pipeline.
//!
//! An [`OperationPath`] addresses an operation by descending through nested
//! loop bodies. `[2, 5]` is the sixth operation in the body of the loop at
//! top-level index 2. A trailing `-1` means "nothing at this depth has
//! completed yet", so `[-1]` is the fresh-start marker and `[]` marks a
//! finished pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker component for "before the first operation of this list".
pub const BEFORE_FIRST: i64 = -1;

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationPath(Vec<i64>);

impl OperationPath {
    /// The empty path. Stored as `last_op` it means the pipeline completed.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// `[-1]`: nothing has run yet.
    pub fn fresh() -> Self {
        Self(vec![BEFORE_FIRST])
    }

    pub fn from_indices(indices: Vec<i64>) -> Self {
        Self(indices)
    }

    /// Parse a path out of an untyped checkpoint value.
    ///
    /// Returns `None` unless the value is an array of integers where every
    /// component is a real index, except that the final one may be `-1`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let items = value.as_array()?;
        let mut indices = Vec::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            let index = item.as_i64()?;
            let last = pos + 1 == items.len();
            if index < BEFORE_FIRST || (index == BEFORE_FIRST && !last) {
                return None;
            }
            indices.push(index);
        }
        Some(Self(indices))
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::from(self.0.clone())
    }

    pub fn indices(&self) -> &[i64] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Component at `depth`, if the path reaches that deep.
    pub fn get(&self, depth: usize) -> Option<i64> {
        self.0.get(depth).copied()
    }

    pub fn last(&self) -> Option<i64> {
        self.0.last().copied()
    }

    /// This path extended by one index.
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index as i64);
        Self(indices)
    }

    /// This path extended by the "before first" marker.
    pub fn before_first_child(&self) -> Self {
        let mut indices = self.0.clone();
        indices.push(BEFORE_FIRST);
        Self(indices)
    }

    /// Drop the deepest component. The root stays the root.
    pub fn parent(&self) -> Self {
        let mut indices = self.0.clone();
        indices.pop();
        Self(indices)
    }

    /// True when `prefix` is a (non-strict) prefix of this path.
    pub fn starts_with(&self, prefix: &OperationPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// True when this path lies strictly below `ancestor`.
    pub fn is_below(&self, ancestor: &OperationPath) -> bool {
        self.depth() > ancestor.depth() && self.starts_with(ancestor)
    }

    /// Dotted form used as a map key in the status store, e.g. `2.5`.
    pub fn key(&self) -> String {
        self.0
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for OperationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (pos, index) in self.0.iter().enumerate() {
            if pos > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{index}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<i64>> for OperationPath {
    fn from(indices: Vec<i64>) -> Self {
        Self(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_matches_list_notation() {
        assert_eq!(OperationPath::from(vec![2, 5]).to_string(), "[2, 5]");
        assert_eq!(OperationPath::fresh().to_string(), "[-1]");
        assert_eq!(OperationPath::root().to_string(), "[]");
    }

    #[test]
    fn from_value_accepts_well_formed_paths() {
        assert_eq!(
            OperationPath::from_value(&json!([3, 0, -1])),
            Some(OperationPath::from(vec![3, 0, -1]))
        );
        assert_eq!(
            OperationPath::from_value(&json!([])),
            Some(OperationPath::root())
        );
    }

    #[test]
    fn from_value_rejects_bad_shapes() {
        assert!(OperationPath::from_value(&json!("not-a-list")).is_none());
        assert!(OperationPath::from_value(&json!([1, "x"])).is_none());
        assert!(OperationPath::from_value(&json!([1.5])).is_none());
        assert!(OperationPath::from_value(&json!([-1, 2])).is_none());
        assert!(OperationPath::from_value(&json!([-4])).is_none());
        assert!(OperationPath::from_value(&json!({"a": 1})).is_none());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = OperationPath::from(vec![1, 4]);
        let b = OperationPath::from(vec![2]);
        let c = OperationPath::from(vec![2, 0]);
        assert!(a < b);
        assert!(b < c);
        assert!(OperationPath::fresh() < OperationPath::from(vec![0]));
    }

    #[test]
    fn child_and_parent_are_inverse() {
        let p = OperationPath::from(vec![2]);
        let c = p.child(3);
        assert_eq!(c.indices(), &[2, 3]);
        assert_eq!(c.parent(), p);
        assert_eq!(p.before_first_child().indices(), &[2, -1]);
        assert_eq!(OperationPath::root().parent(), OperationPath::root());
    }

    #[test]
    fn prefix_checks() {
        let loop_path = OperationPath::from(vec![2]);
        let inner = OperationPath::from(vec![2, 1]);
        assert!(inner.starts_with(&loop_path));
        assert!(inner.is_below(&loop_path));
        assert!(!loop_path.is_below(&loop_path));
        assert!(loop_path.starts_with(&OperationPath::root()));
        assert!(!OperationPath::from(vec![3, 1]).starts_with(&loop_path));
    }

    #[test]
    fn key_is_dotted() {
        assert_eq!(OperationPath::from(vec![2, 5]).key(), "2.5");
        assert_eq!(OperationPath::from(vec![0]).key(), "0");
    }

    #[test]
    fn serializes_as_plain_array() {
        let p = OperationPath::from(vec![1, -1]);
        assert_eq!(serde_json::to_value(&p).unwrap(), json!([1, -1]));
        assert_eq!(p.to_value(), json!([1, -1]));
    }
}
