use serde_json::{Map, Value};
use std::path::Path;

use crate::ast::{Namespace, Reference};
use crate::parser::parse_reference;
use hana_types::{HanaError, Result};

/// The four namespaces a reference can read from.
#[derive(Debug, Clone, Copy)]
pub struct Environment<'a> {
    pub files: &'a Map<String, Value>,
    pub settings: &'a Map<String, Value>,
    pub attributes: &'a Map<String, Value>,
    pub status: &'a Map<String, Value>,
}

impl<'a> Environment<'a> {
    pub fn namespace(&self, namespace: Namespace) -> &'a Map<String, Value> {
        match namespace {
            Namespace::Files => self.files,
            Namespace::Settings => self.settings,
            Namespace::Attributes => self.attributes,
            Namespace::Status => self.status,
        }
    }

    /// Present and non-null.
    pub fn lookup(&self, namespace: Namespace, key: &str) -> Option<&'a Value> {
        self.namespace(namespace).get(key).filter(|v| !v.is_null())
    }
}

fn not_found(namespace: Namespace, key: &str) -> HanaError {
    match namespace {
        Namespace::Files => HanaError::FileNotFound { key: key.into() },
        Namespace::Settings => HanaError::SettingNotFound { key: key.into() },
        Namespace::Attributes => HanaError::AttributeNotFound { name: key.into() },
        Namespace::Status => HanaError::StatusNotFound { key: key.into() },
    }
}

impl Reference {
    /// Evaluate against `env`.
    ///
    /// Returns `Ok(None)` only for an absent lookup when `must_exist` is
    /// false. Operands of `[base]` and `[+]` are always mandatory.
    pub fn evaluate(&self, env: &Environment<'_>, must_exist: bool) -> Result<Option<Value>> {
        match self {
            Reference::Literal(value) => Ok(Some(value.clone())),
            Reference::BaseOf(inner) => {
                let value = inner.evaluate_required(env)?;
                let text = value.as_str().ok_or_else(|| HanaError::ReferenceType {
                    reference: format!("{self:?}"),
                    expected: "a string path".into(),
                })?;
                Ok(Some(Value::String(strip_extension(text))))
            }
            Reference::Concat(parts) => {
                let mut joined = String::new();
                for part in parts {
                    match part.evaluate_required(env)? {
                        Value::String(s) => joined.push_str(&s),
                        Value::Number(n) => joined.push_str(&n.to_string()),
                        _ => {
                            return Err(HanaError::ReferenceType {
                                reference: format!("{part:?}"),
                                expected: "a string or number".into(),
                            })
                        }
                    }
                }
                Ok(Some(Value::String(joined)))
            }
            other => {
                let Some((namespace, key)) = other.lookup() else {
                    return Ok(None);
                };
                match env.lookup(namespace, key) {
                    Some(value) => Ok(Some(value.clone())),
                    None if must_exist => Err(not_found(namespace, key)),
                    None => Ok(None),
                }
            }
        }
    }

    fn evaluate_required(&self, env: &Environment<'_>) -> Result<Value> {
        // must_exist = true never yields None
        self.evaluate(env, true)?
            .ok_or_else(|| HanaError::Other(format!("reference {self:?} resolved to nothing")))
    }
}

/// Resolve a parameter value.
///
/// Non-string values are literals and come back unchanged. Strings are
/// parsed as references; a bare sigil reads `context_name`.
pub fn resolve(
    context_name: &str,
    reference: &Value,
    env: &Environment<'_>,
    must_exist: bool,
) -> Result<Option<Value>> {
    match reference {
        Value::String(text) => parse_reference(context_name, text)?.evaluate(env, must_exist),
        Value::Null => Ok(None),
        other => Ok(Some(other.clone())),
    }
}

/// Strip the final extension from the last path component.
///
/// `a/b/file.ext` becomes `a/b/file`. Dotfiles and names without an
/// extension are returned unchanged.
pub fn strip_extension(path: &str) -> String {
    let p = Path::new(path);
    match p.extension() {
        Some(_) => p.with_extension("").to_string_lossy().into_owned(),
        None => path.to_string(),
    }
}
