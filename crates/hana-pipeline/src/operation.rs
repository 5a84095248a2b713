//! Operation records and the closed set of commands.
//!
//! Operations stay as raw JSON inside the project configuration and are
//! viewed through [`Operation`] when the executor or validator reaches them,
//! so a malformed entry is reported with its own path.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use hana_types::{HanaError, OperationPath, Result};

/// Every command the runner knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Map,
    Extract,
    Draft,
    Partition,
    Ordering,
    Orientation,
    Build,
    Loop,
    Custom,
}

impl Command {
    pub const ALL: [Command; 9] = [
        Command::Map,
        Command::Extract,
        Command::Draft,
        Command::Partition,
        Command::Ordering,
        Command::Orientation,
        Command::Build,
        Command::Loop,
        Command::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Map => "map",
            Command::Extract => "extract",
            Command::Draft => "draft",
            Command::Partition => "partition",
            Command::Ordering => "ordering",
            Command::Orientation => "orientation",
            Command::Build => "build",
            Command::Loop => "loop",
            Command::Custom => "custom",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Name of the scaffolding binary for this command, e.g. `hana_extract`.
    pub fn binary_name(&self) -> String {
        format!("hana_{}", self.as_str())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys of an operation record that are not parameters.
pub const RESERVED_FIELDS: [&str; 3] = ["command", "enable", "body"];

/// A borrowed view of one operation record.
#[derive(Debug, Clone, Copy)]
pub struct Operation<'a> {
    pub command: &'a str,
    pub enabled: bool,
    /// The whole record; parameters are looked up by name.
    pub fields: &'a Map<String, Value>,
    /// Nested operations, only meaningful for `loop`.
    pub body: &'a [Value],
}

/// The three fields a `loop` needs.
#[derive(Debug, Clone, Copy)]
pub struct LoopSpec<'a> {
    pub list: &'a Value,
    pub var: &'a str,
    pub body: &'a [Value],
}

fn invalid(path: &OperationPath, message: impl Into<String>) -> HanaError {
    HanaError::InvalidOperation {
        path: path.clone(),
        message: message.into(),
    }
}

impl<'a> Operation<'a> {
    /// Check the shape of a raw record: an object with a string `command`,
    /// an optional boolean `enable`, and an optional list `body`.
    pub fn parse(path: &OperationPath, raw: &'a Value) -> Result<Self> {
        let fields = raw
            .as_object()
            .ok_or_else(|| invalid(path, "expected an operation record"))?;
        let command = match fields.get("command") {
            Some(Value::String(command)) => command.as_str(),
            Some(_) => return Err(invalid(path, "'command' must be a string")),
            None => return Err(invalid(path, "missing 'command'")),
        };
        let enabled = match fields.get("enable") {
            None => true,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(invalid(path, "'enable' must be true or false")),
        };
        let body = match fields.get("body") {
            None => &[][..],
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => return Err(invalid(path, "'body' must be a list of operations")),
        };
        Ok(Self {
            command,
            enabled,
            fields,
            body,
        })
    }

    pub fn command_kind(&self, path: &OperationPath) -> Result<Command> {
        Command::from_name(self.command).ok_or_else(|| HanaError::UnknownCommand {
            path: path.clone(),
            command: self.command.to_string(),
        })
    }

    pub fn is_loop(&self) -> bool {
        self.command == Command::Loop.as_str()
    }

    pub fn param(&self, name: &str) -> Option<&'a Value> {
        if RESERVED_FIELDS.contains(&name) {
            return None;
        }
        self.fields.get(name)
    }

    /// Parameter names set on this record.
    pub fn param_names(&self) -> impl Iterator<Item = &'a str> {
        self.fields
            .keys()
            .map(String::as_str)
            .filter(|k| !RESERVED_FIELDS.contains(k))
    }

    pub fn loop_spec(&self, path: &OperationPath) -> Result<LoopSpec<'a>> {
        if !self.fields.contains_key("body") {
            return Err(invalid(path, "loop is missing 'body'"));
        }
        let list = self
            .fields
            .get("list")
            .ok_or_else(|| invalid(path, "loop is missing 'list'"))?;
        let var = match self.fields.get("var") {
            Some(Value::String(var)) if !var.is_empty() => var.as_str(),
            Some(_) => return Err(invalid(path, "loop 'var' must be a non-empty string")),
            None => return Err(invalid(path, "loop is missing 'var'")),
        };
        Ok(LoopSpec {
            list,
            var,
            body: self.body,
        })
    }
}

/// True when `path` addresses a position in `ops`: every component but
/// the last indexes a loop, and the last is `-1` or a valid index.
pub fn path_resolves(ops: &[Value], path: &OperationPath) -> bool {
    let indices = path.indices();
    let mut list = ops;
    for (depth, &index) in indices.iter().enumerate() {
        if depth + 1 == indices.len() {
            return index == -1 || usize::try_from(index).is_ok_and(|i| i < list.len());
        }
        let Some(raw) = usize::try_from(index).ok().and_then(|i| list.get(i)) else {
            return false;
        };
        let prefix = OperationPath::from(indices[..=depth].to_vec());
        match Operation::parse(&prefix, raw) {
            Ok(op) if op.is_loop() => list = op.body,
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root(i: i64) -> OperationPath {
        OperationPath::from(vec![i])
    }

    #[test]
    fn command_names_round_trip() {
        for command in Command::ALL {
            assert_eq!(Command::from_name(command.as_str()), Some(command));
        }
        assert_eq!(Command::from_name("assemble"), None);
        assert_eq!(Command::Extract.binary_name(), "hana_extract");
        assert_eq!(
            serde_json::to_value(Command::Orientation).unwrap(),
            json!("orientation")
        );
    }

    #[test]
    fn parse_accepts_minimal_record() {
        let raw = json!({"command": "draft", "nodes": "-"});
        let op = Operation::parse(&root(0), &raw).unwrap();
        assert_eq!(op.command, "draft");
        assert!(op.enabled);
        assert!(op.body.is_empty());
        assert_eq!(op.param("nodes"), Some(&json!("-")));
        assert_eq!(op.param("command"), None);
        assert_eq!(op.param_names().collect::<Vec<_>>(), vec!["nodes"]);
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        for raw in [
            json!("extract"),
            json!({"nodes": "-"}),
            json!({"command": 3}),
            json!({"command": "draft", "enable": "yes"}),
            json!({"command": "loop", "body": {}}),
        ] {
            let err = Operation::parse(&root(4), &raw).unwrap_err();
            assert!(
                matches!(err, HanaError::InvalidOperation { ref path, .. } if *path == root(4)),
                "unexpected: {err}"
            );
        }
    }

    #[test]
    fn unknown_command_names_the_path() {
        let raw = json!({"command": "assemble"});
        let op = Operation::parse(&root(1), &raw).unwrap();
        let err = op.command_kind(&root(1)).unwrap_err();
        assert_eq!(err.to_string(), "Unknown command 'assemble' at operation [1]");
    }

    #[test]
    fn loop_spec_requires_all_fields() {
        let raw = json!({"command": "loop", "list": "-groups", "var": "group", "body": []});
        let op = Operation::parse(&root(0), &raw).unwrap();
        let spec = op.loop_spec(&root(0)).unwrap();
        assert_eq!(spec.var, "group");
        assert_eq!(spec.list, &json!("-groups"));

        let raw = json!({"command": "loop", "list": "-groups", "body": []});
        let op = Operation::parse(&root(0), &raw).unwrap();
        assert!(op.loop_spec(&root(0)).is_err());

        let raw = json!({"command": "loop", "var": "", "list": [], "body": []});
        let op = Operation::parse(&root(0), &raw).unwrap();
        assert!(op.loop_spec(&root(0)).is_err());
    }

    #[test]
    fn path_resolution_follows_loops() {
        let ops = vec![
            json!({"command": "extract"}),
            json!({"command": "loop", "list": [], "var": "g", "body": [
                {"command": "ordering"},
                {"command": "loop", "list": [], "var": "h", "body": [{"command": "custom"}]}
            ]}),
        ];
        let ok = |v: Vec<i64>| path_resolves(&ops, &OperationPath::from(v));
        assert!(ok(vec![]));
        assert!(ok(vec![-1]));
        assert!(ok(vec![1]));
        assert!(ok(vec![1, -1]));
        assert!(ok(vec![1, 1, 0]));
        assert!(!ok(vec![2]));
        assert!(!ok(vec![0, 0]));
        assert!(!ok(vec![1, 2]));
        assert!(!ok(vec![1, 0, 0]));
    }
}
