//! Pre-flight validation: lint rules and diagnostics.
//!
//! Every rule walks the whole operation tree before anything runs, so an
//! invalid workflow fails before a single external process is spawned.
//! Call [`validate`] for advisory diagnostics or [`validate_or_raise`] to fail
//! on any `Error`-severity issue.

use std::collections::HashSet;

use serde_json::Value;

use hana_types::status::RESERVED_KEYS;
use hana_types::{HanaError, OperationPath, Status};
use hana_vars::{parse_reference, Environment, Namespace};

use crate::config::ProjectConfig;
use crate::handler::{Binding, HandlerRegistry};
use crate::operation::{Command, Operation};

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub path: Option<OperationPath>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Everything a rule may look at.
pub struct LintContext<'a> {
    pub config: &'a ProjectConfig,
    pub status: &'a Status,
    pub registry: &'a HandlerRegistry,
}

impl LintContext<'_> {
    fn environment(&self) -> Environment<'_> {
        self.config.environment(self.status)
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, ctx: &LintContext<'_>) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn error(rule: &str, path: &OperationPath, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        rule: rule.into(),
        severity: Severity::Error,
        message: format!("Operation {path}: {}", message.into()),
        path: Some(path.clone()),
        fix: None,
    }
}

/// Visit every operation in program order, descending into well-formed
/// loop bodies. Records that fail to parse are passed as errors.
fn walk<'a>(
    ops: &'a [Value],
    prefix: &OperationPath,
    visit: &mut dyn FnMut(&OperationPath, Result<Operation<'a>, HanaError>),
) {
    for (idx, raw) in ops.iter().enumerate() {
        let path = prefix.child(idx);
        let parsed = Operation::parse(&path, raw);
        let body = match &parsed {
            Ok(op) if op.is_loop() => Some(op.body),
            _ => None,
        };
        visit(&path, parsed);
        if let Some(body) = body {
            walk(body, &path, visit);
        }
    }
}

/// Like [`walk`] but only enabled, well-formed operations.
fn walk_enabled<'a>(
    ops: &'a [Value],
    prefix: &OperationPath,
    visit: &mut dyn FnMut(&OperationPath, &Operation<'a>),
) {
    for (idx, raw) in ops.iter().enumerate() {
        let path = prefix.child(idx);
        let Ok(op) = Operation::parse(&path, raw) else {
            continue;
        };
        if !op.enabled {
            continue;
        }
        visit(&path, &op);
        if op.is_loop() {
            walk_enabled(op.body, &path, visit);
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct OperationShapeRule;
impl LintRule for OperationShapeRule {
    fn name(&self) -> &str {
        "operation_shape"
    }
    fn apply(&self, ctx: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        walk(&ctx.config.ops, &OperationPath::root(), &mut |path, parsed| {
            if let Err(err) = parsed {
                diags.push(Diagnostic {
                    rule: self.name().into(),
                    severity: Severity::Error,
                    message: err.to_string(),
                    path: Some(path.clone()),
                    fix: Some("Each operation must be an object with a string 'command'".into()),
                });
            }
        });
        diags
    }
}

struct KnownCommandRule;
impl LintRule for KnownCommandRule {
    fn name(&self) -> &str {
        "known_command"
    }
    fn apply(&self, ctx: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        walk_enabled(&ctx.config.ops, &OperationPath::root(), &mut |path, op| {
            match op.command_kind(path) {
                Err(err) => diags.push(Diagnostic {
                    rule: self.name().into(),
                    severity: Severity::Error,
                    message: err.to_string(),
                    path: Some(path.clone()),
                    fix: Some(format!(
                        "Use one of: {}",
                        Command::ALL.map(|c| c.as_str()).join(", ")
                    )),
                }),
                Ok(command) if command != Command::Loop && !ctx.registry.has(command) => {
                    diags.push(error(
                        self.name(),
                        path,
                        HanaError::NoHandler {
                            command: command.to_string(),
                        }
                        .to_string(),
                    ));
                }
                Ok(_) => {}
            }
        });
        diags
    }
}

struct LoopFieldsRule;
impl LintRule for LoopFieldsRule {
    fn name(&self) -> &str {
        "loop_fields"
    }
    fn apply(&self, ctx: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        walk_enabled(&ctx.config.ops, &OperationPath::root(), &mut |path, op| {
            if !op.is_loop() {
                return;
            }
            match op.loop_spec(path) {
                Err(err) => diags.push(Diagnostic {
                    rule: self.name().into(),
                    severity: Severity::Error,
                    message: err.to_string(),
                    path: Some(path.clone()),
                    fix: Some("A loop needs 'list', 'var' and 'body'".into()),
                }),
                Ok(spec) if RESERVED_KEYS.contains(&spec.var) => {
                    diags.push(error(
                        self.name(),
                        path,
                        format!("loop variable '{}' is reserved", spec.var),
                    ));
                }
                Ok(_) => {}
            }
        });
        diags
    }
}

struct ReferenceSyntaxRule;
impl LintRule for ReferenceSyntaxRule {
    fn name(&self) -> &str {
        "reference_syntax"
    }
    fn apply(&self, ctx: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        walk_enabled(&ctx.config.ops, &OperationPath::root(), &mut |path, op| {
            for name in op.param_names() {
                let Some(Value::String(text)) = op.param(name) else {
                    continue;
                };
                if let Err(err) = parse_reference(name, text) {
                    diags.push(error(self.name(), path, err.to_string()));
                }
            }
        });
        diags
    }
}

struct UnknownParamRule;
impl LintRule for UnknownParamRule {
    fn name(&self) -> &str {
        "unknown_param"
    }
    fn apply(&self, ctx: &LintContext<'_>) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        walk_enabled(&ctx.config.ops, &OperationPath::root(), &mut |path, op| {
            let Ok(command) = op.command_kind(path) else {
                return;
            };
            let handler = ctx.registry.get(command);
            if command != Command::Loop && handler.is_none() {
                return;
            }
            for name in op.param_names() {
                let accepted = match handler {
                    Some(handler) => handler.accepts_param(name),
                    None => matches!(name, "list" | "var"),
                };
                if !accepted {
                    diags.push(Diagnostic {
                        rule: self.name().into(),
                        severity: Severity::Warning,
                        message: format!(
                            "Operation {path}: '{}' ignores parameter '{name}'",
                            op.command
                        ),
                        path: Some(path.clone()),
                        fix: Some(format!("Remove '{name}' or check its spelling")),
                    });
                }
            }
        });
        diags
    }
}

struct HandlerCheckRule;
impl LintRule for HandlerCheckRule {
    fn name(&self) -> &str {
        "handler_check"
    }
    fn apply(&self, ctx: &LintContext<'_>) -> Vec<Diagnostic> {
        let env = ctx.environment();
        let mut diags = Vec::new();
        walk_enabled(&ctx.config.ops, &OperationPath::root(), &mut |path, op| {
            let Ok(command) = op.command_kind(path) else {
                return;
            };
            let Some(handler) = ctx.registry.get(command) else {
                return;
            };
            if let Err(err) = handler.validate(path, op, &env) {
                diags.push(error(self.name(), path, err.to_string()));
            }
        });
        diags
    }
}

/// Simulates the run in program order, tracking which status keys exist, and
/// checks that every mandatory reference will be satisfiable when reached.
struct DataflowRule;

impl DataflowRule {
    /// Lookups in `reference` that would fail at this point of the walk.
    fn missing_lookups(
        env: &Environment<'_>,
        available: &HashSet<String>,
        name: &str,
        reference: &Value,
        required: bool,
    ) -> Vec<(Namespace, String)> {
        let Value::String(text) = reference else {
            return Vec::new();
        };
        // Syntax errors are reported by ReferenceSyntaxRule.
        let Ok(parsed) = parse_reference(name, text) else {
            return Vec::new();
        };
        parsed
            .required_lookups(required)
            .into_iter()
            .filter(|(namespace, key)| match namespace {
                Namespace::Status => !available.contains(*key),
                other => env.lookup(*other, key).is_none(),
            })
            .map(|(namespace, key)| (namespace, key.to_string()))
            .collect()
    }

    fn check_reference(
        &self,
        env: &Environment<'_>,
        available: &HashSet<String>,
        path: &OperationPath,
        binding: &Binding,
        diags: &mut Vec<Diagnostic>,
    ) {
        let name = binding.name.as_str();
        let missing =
            Self::missing_lookups(env, available, name, &binding.reference, binding.required);
        for (namespace, key) in missing {
            let message = match namespace {
                Namespace::Status => format!(
                    "'{name}' needs \"{key}\" from the pipeline status, but no earlier operation produces it"
                ),
                Namespace::Files => format!("'{name}' needs \"{key}\" in config files"),
                Namespace::Settings => format!("'{name}' needs \"{key}\" in global settings"),
                Namespace::Attributes => format!("'{name}' needs project attribute \"{key}\""),
            };
            let mut diag = error(self.name(), path, message);
            diag.fix = Some(match namespace {
                Namespace::Status => format!("Add an operation producing \"{key}\" before this one"),
                _ => format!("Define \"{key}\" in {}", section_name(namespace)),
            });
            diags.push(diag);
        }
    }

    fn simulate(
        &self,
        ctx: &LintContext<'_>,
        env: &Environment<'_>,
        ops: &[Value],
        prefix: &OperationPath,
        available: &mut HashSet<String>,
        diags: &mut Vec<Diagnostic>,
    ) {
        for (idx, raw) in ops.iter().enumerate() {
            let path = prefix.child(idx);
            let Ok(op) = Operation::parse(&path, raw) else {
                continue;
            };
            if !op.enabled {
                continue;
            }
            let Ok(command) = op.command_kind(&path) else {
                continue;
            };
            if command == Command::Loop {
                let Ok(spec) = op.loop_spec(&path) else {
                    continue;
                };
                let list = Binding {
                    name: "list".to_string(),
                    reference: spec.list.clone(),
                    required: true,
                };
                self.check_reference(env, available, &path, &list, diags);
                let shadows = available.contains(spec.var);
                available.insert(spec.var.to_string());
                self.simulate(ctx, env, spec.body, &path, available, diags);
                if !shadows {
                    available.remove(spec.var);
                }
                continue;
            }
            let Some(handler) = ctx.registry.get(command) else {
                continue;
            };
            let bindings = handler.bindings(&op);
            for binding in &bindings {
                self.check_reference(env, available, &path, binding, diags);
            }
            // A product named after an optional parameter is only published
            // when that parameter is bound.
            let produced: Vec<String> = handler
                .produces()
                .iter()
                .filter(|key| {
                    bindings.iter().find(|b| b.name == **key).map_or(true, |b| {
                        Self::missing_lookups(env, available, &b.name, &b.reference, true)
                            .is_empty()
                    })
                })
                .map(|key| (*key).to_string())
                .collect();
            available.extend(produced);
        }
    }
}

fn section_name(namespace: Namespace) -> &'static str {
    match namespace {
        Namespace::Files => "'files'",
        Namespace::Settings => "'global'",
        Namespace::Attributes => "the project attributes",
        Namespace::Status => "the pipeline status",
    }
}

impl LintRule for DataflowRule {
    fn name(&self) -> &str {
        "dataflow"
    }
    fn apply(&self, ctx: &LintContext<'_>) -> Vec<Diagnostic> {
        let env = ctx.environment();
        let mut available: HashSet<String> = ctx
            .status
            .keys()
            .filter(|k| ctx.status.contains(k))
            .cloned()
            .collect();
        let mut diags = Vec::new();
        self.simulate(
            ctx,
            &env,
            &ctx.config.ops,
            &OperationPath::root(),
            &mut available,
            &mut diags,
        );
        diags
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules.
pub fn validate(ctx: &LintContext<'_>) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(OperationShapeRule),
        Box::new(KnownCommandRule),
        Box::new(LoopFieldsRule),
        Box::new(ReferenceSyntaxRule),
        Box::new(UnknownParamRule),
        Box::new(HandlerCheckRule),
        Box::new(DataflowRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(ctx));
    }
    diagnostics
}

/// Run all lint rules and fail if any error-severity diagnostic is found.
pub fn validate_or_raise(ctx: &LintContext<'_>) -> hana_types::Result<Vec<Diagnostic>> {
    let diagnostics = validate(ctx);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !errors.is_empty() {
        let messages: Vec<_> = errors.iter().map(|d| d.message.clone()).collect();
        return Err(HanaError::Validation(messages.join("; ")));
    }
    for warning in diagnostics.iter().filter(|d| d.severity == Severity::Warning) {
        tracing::warn!(rule = %warning.rule, "{}", warning.message);
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
