use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed variable reference.
///
/// `$`, `!`, `#` and `-` select a namespace; `[base]` and `[+]` derive a
/// value from nested references. Anything else is a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reference {
    Literal(Value),
    /// `$key`: the project file registry.
    File(String),
    /// `!key`: global settings.
    Setting(String),
    /// `#name`: derived project attributes, case-folded.
    Attribute(String),
    /// `-key`: the run-time status store.
    Status(String),
    /// `[base]ref`: the resolved path with its extension stripped.
    BaseOf(Box<Reference>),
    /// `[+]a,b,c`: the resolved parts joined end to end.
    Concat(Vec<Reference>),
}

/// The namespace a lookup reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Files,
    Settings,
    Attributes,
    Status,
}

impl Reference {
    /// Fill in `context_name` for a bare sigil such as `"$"`.
    ///
    /// Only the outermost reference takes the context; nested operands of
    /// `[base]` and `[+]` are resolved with an empty context.
    pub fn in_context(self, context_name: &str) -> Self {
        match self {
            Reference::File(key) if key.is_empty() => Reference::File(context_name.to_string()),
            Reference::Setting(key) if key.is_empty() => {
                Reference::Setting(context_name.to_string())
            }
            Reference::Attribute(name) if name.is_empty() => {
                Reference::Attribute(context_name.to_lowercase())
            }
            Reference::Status(key) if key.is_empty() => Reference::Status(context_name.to_string()),
            other => other,
        }
    }

    /// Namespace and key for a plain lookup, `None` for literals and derived values.
    pub fn lookup(&self) -> Option<(Namespace, &str)> {
        match self {
            Reference::File(key) => Some((Namespace::Files, key)),
            Reference::Setting(key) => Some((Namespace::Settings, key)),
            Reference::Attribute(name) => Some((Namespace::Attributes, name)),
            Reference::Status(key) => Some((Namespace::Status, key)),
            _ => None,
        }
    }

    /// Every lookup that must succeed for this reference to resolve when
    /// the outer binding is mandatory (`required`). Nested operands are
    /// always mandatory.
    pub fn required_lookups(&self, required: bool) -> Vec<(Namespace, &str)> {
        let mut out = Vec::new();
        self.collect_lookups(required, &mut out);
        out
    }

    fn collect_lookups<'a>(&'a self, required: bool, out: &mut Vec<(Namespace, &'a str)>) {
        match self {
            Reference::Literal(_) => {}
            Reference::BaseOf(inner) => inner.collect_lookups(true, out),
            Reference::Concat(parts) => {
                for part in parts {
                    part.collect_lookups(true, out);
                }
            }
            other => {
                if required {
                    if let Some(lookup) = other.lookup() {
                        out.push(lookup);
                    }
                }
            }
        }
    }
}
