//! Table-driven parameter binding.
//!
//! A [`ToolSchema`] pairs a per-command default table with a parameter map
//! (name, external flag, expected kind, required, optional validator). Binding
//! resolves each declared parameter through the variable resolver, checks its
//! kind, runs the validator, and produces the flag/value list handed to the
//! external binary. No command needs code of its own to get here.

use std::fmt;

use serde_json::Value;

use hana_types::{HanaError, Result};
use hana_vars::{parse_reference, resolve, Environment, Namespace};

use crate::handler::Binding;
use crate::operation::Operation;

/// The JSON shape a bound parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    /// Integers are accepted and passed through unchanged.
    Float,
    Str,
    StrList,
}

impl ValueKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ValueKind::Bool => "a boolean",
            ValueKind::Int => "an integer",
            ValueKind::Float => "a number",
            ValueKind::Str => "a string",
            ValueKind::StrList => "a list of strings",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueKind::Bool => value.is_boolean(),
            ValueKind::Int => value.is_i64() || value.is_u64(),
            ValueKind::Float => value.is_number(),
            ValueKind::Str => value.is_string(),
            ValueKind::StrList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }
}

/// Short name of a JSON value's type, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a float",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Post-resolution check that may also rewrite the value.
pub type Validator = fn(&str, Value) -> Result<Value>;

/// One row of a parameter map.
#[derive(Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub flag: &'static str,
    pub kind: ValueKind,
    pub required: bool,
    pub validator: Option<Validator>,
}

impl ParamSpec {
    pub const fn new(name: &'static str, flag: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            flag,
            kind,
            required: false,
            validator: None,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn validated(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    fn check(&self, value: Value) -> Result<Value> {
        if !self.kind.matches(&value) {
            return Err(HanaError::ParameterType {
                param: self.name.to_string(),
                expected: self.kind.describe().to_string(),
                found: json_type_name(&value).to_string(),
            });
        }
        match self.validator {
            Some(validate) => validate(self.name, value),
            None => Ok(value),
        }
    }
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("flag", &self.flag)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("validated", &self.validator.is_some())
            .finish()
    }
}

/// Default table plus parameter map for one external binary.
#[derive(Debug, Clone, Copy)]
pub struct ToolSchema {
    pub defaults: &'static [(&'static str, &'static str)],
    pub params: &'static [ParamSpec],
}

impl ToolSchema {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    fn default_for(&self, name: &str) -> Option<Value> {
        self.defaults
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, reference)| Value::String((*reference).to_string()))
    }

    /// The operation's value for `spec`, falling back to the default table.
    fn raw_value(&self, spec: &ParamSpec, op: &Operation<'_>) -> Option<Value> {
        op.param(spec.name)
            .filter(|v| !v.is_null())
            .cloned()
            .or_else(|| self.default_for(spec.name))
    }

    /// Resolve, type-check and validate every declared parameter.
    pub fn bind(&self, op: &Operation<'_>, env: &Environment<'_>) -> Result<BoundParams> {
        let mut bound = BoundParams::default();
        for spec in self.params {
            let Some(raw) = self.raw_value(spec, op) else {
                if spec.required {
                    return Err(HanaError::InvalidValue {
                        param: spec.name.to_string(),
                        message: "a value is required".into(),
                    });
                }
                continue;
            };
            let Some(value) = resolve(spec.name, &raw, env, spec.required)? else {
                continue;
            };
            let value = spec.check(value)?;
            bound.entries.push(BoundParam {
                name: spec.name,
                flag: spec.flag,
                value,
            });
        }
        Ok(bound)
    }

    /// Check the parameters that can already be resolved, leaving out
    /// anything that reads the status store.
    pub fn precheck(&self, op: &Operation<'_>, env: &Environment<'_>) -> Result<()> {
        for spec in self.params {
            let Some(raw) = self.raw_value(spec, op) else {
                continue;
            };
            if let Value::String(text) = &raw {
                let reference = parse_reference(spec.name, text)?;
                let reads_status = reference
                    .required_lookups(true)
                    .iter()
                    .any(|(namespace, _)| *namespace == Namespace::Status);
                if reads_status {
                    continue;
                }
            }
            if let Some(value) = resolve(spec.name, &raw, env, false)? {
                spec.check(value)?;
            }
        }
        Ok(())
    }

    /// Every reference this schema would resolve for `op`.
    pub fn bindings(&self, op: &Operation<'_>) -> Vec<Binding> {
        self.params
            .iter()
            .filter_map(|spec| {
                self.raw_value(spec, op).map(|reference| Binding {
                    name: spec.name.to_string(),
                    reference,
                    required: spec.required,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub name: &'static str,
    pub flag: &'static str,
    pub value: Value,
}

/// Resolved parameters in parameter-map order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundParams {
    entries: Vec<BoundParam>,
}

impl BoundParams {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn entries(&self) -> &[BoundParam] {
        &self.entries
    }

    /// Flatten to command-line arguments. `true` is a bare flag, `false` is
    /// dropped, a list contributes the flag followed by each element.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for entry in &self.entries {
            match &entry.value {
                Value::Bool(true) => args.push(entry.flag.to_string()),
                Value::Bool(false) => {}
                Value::Array(items) => {
                    args.push(entry.flag.to_string());
                    args.extend(items.iter().map(value_to_arg));
                }
                other => {
                    args.push(entry.flag.to_string());
                    args.push(value_to_arg(other));
                }
            }
        }
        args
    }
}

/// Strings are passed verbatim, everything else in its JSON form.
pub fn value_to_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hana_types::OperationPath;
    use serde_json::{json, Map};

    fn upper(_param: &str, value: Value) -> Result<Value> {
        Ok(Value::String(
            value.as_str().unwrap_or_default().to_uppercase(),
        ))
    }

    const PARAMS: &[ParamSpec] = &[
        ParamSpec::new("contigs", "-f", ValueKind::Str).required(),
        ParamSpec::new("allele", "-a", ValueKind::Str),
        ParamSpec::new("threads", "-t", ValueKind::Int),
        ParamSpec::new("density", "--density", ValueKind::Float),
        ParamSpec::new("mappings", "-m", ValueKind::StrList),
        ParamSpec::new("quiet", "--quiet", ValueKind::Bool),
        ParamSpec::new("loud", "--loud", ValueKind::Bool),
        ParamSpec::new("site", "-e", ValueKind::Str).validated(upper),
    ];

    const SCHEMA: ToolSchema = ToolSchema {
        defaults: &[("contigs", "$"), ("threads", "!"), ("allele", "-")],
        params: PARAMS,
    };

    struct Fixture {
        files: Map<String, Value>,
        settings: Map<String, Value>,
        attributes: Map<String, Value>,
        status: Map<String, Value>,
    }

    impl Fixture {
        fn new() -> Self {
            let obj = |v: Value| v.as_object().cloned().unwrap();
            Self {
                files: obj(json!({"contigs": "c.fa", "mappings": ["a.bam", "b.bam"]})),
                settings: obj(json!({"threads": 4})),
                attributes: obj(json!({"project_dir": "proj"})),
                status: Map::new(),
            }
        }

        fn env(&self) -> Environment<'_> {
            Environment {
                files: &self.files,
                settings: &self.settings,
                attributes: &self.attributes,
                status: &self.status,
            }
        }
    }

    fn bind(raw: Value) -> Result<BoundParams> {
        let fixture = Fixture::new();
        let op = Operation::parse(&OperationPath::from(vec![0]), &raw)?;
        SCHEMA.bind(&op, &fixture.env())
    }

    #[test]
    fn defaults_fill_unset_parameters() {
        let bound = bind(json!({"command": "extract"})).unwrap();
        assert_eq!(bound.get_str("contigs"), Some("c.fa"));
        assert_eq!(bound.get("threads"), Some(&json!(4)));
        // optional status default with nothing in status
        assert!(!bound.contains("allele"));
        assert_eq!(bound.to_args(), vec!["-f", "c.fa", "-t", "4"]);
    }

    #[test]
    fn operation_values_override_defaults() {
        let bound = bind(json!({"command": "extract", "threads": 16, "contigs": "other.fa"}))
            .unwrap();
        assert_eq!(bound.get("threads"), Some(&json!(16)));
        assert_eq!(bound.get_str("contigs"), Some("other.fa"));
    }

    #[test]
    fn flags_follow_value_kind() {
        let bound = bind(json!({
            "command": "extract",
            "mappings": "$",
            "quiet": true,
            "loud": false,
            "density": 0.5
        }))
        .unwrap();
        assert_eq!(
            bound.to_args(),
            vec![
                "-f", "c.fa", "-t", "4", "--density", "0.5", "-m", "a.bam", "b.bam", "--quiet"
            ]
        );
    }

    #[test]
    fn float_accepts_integer() {
        let bound = bind(json!({"command": "extract", "density": 2})).unwrap();
        assert_eq!(bound.get("density"), Some(&json!(2)));
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let err = bind(json!({"command": "extract", "threads": "many"})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Parameter 'threads' expects an integer, got a string"
        );

        let err = bind(json!({"command": "extract", "mappings": ["a", 1]})).unwrap_err();
        assert!(matches!(err, HanaError::ParameterType { .. }));
    }

    #[test]
    fn validator_rewrites_value() {
        let bound = bind(json!({"command": "extract", "site": "gatc"})).unwrap();
        assert_eq!(bound.get_str("site"), Some("GATC"));
    }

    #[test]
    fn missing_required_reference_is_fatal() {
        let err = bind(json!({"command": "extract", "contigs": "$genome"})).unwrap_err();
        assert!(matches!(err, HanaError::FileNotFound { ref key } if key == "genome"));
    }

    #[test]
    fn precheck_skips_status_references() {
        let fixture = Fixture::new();
        let raw = json!({"command": "extract", "contigs": "[base]-nodes"});
        let op = Operation::parse(&OperationPath::from(vec![0]), &raw).unwrap();
        assert!(SCHEMA.precheck(&op, &fixture.env()).is_ok());

        let raw = json!({"command": "extract", "threads": "eight"});
        let op = Operation::parse(&OperationPath::from(vec![0]), &raw).unwrap();
        assert!(SCHEMA.precheck(&op, &fixture.env()).is_err());
    }

    #[test]
    fn bindings_list_declared_references() {
        let raw = json!({"command": "extract", "quiet": true, "unknown": 1});
        let op = Operation::parse(&OperationPath::from(vec![0]), &raw).unwrap();
        let names: Vec<_> = SCHEMA
            .bindings(&op)
            .into_iter()
            .map(|b| (b.name, b.required))
            .collect();
        assert_eq!(
            names,
            vec![
                ("contigs".to_string(), true),
                ("allele".to_string(), false),
                ("threads".to_string(), false),
                ("quiet".to_string(), false),
            ]
        );
    }
}
