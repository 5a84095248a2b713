use async_trait::async_trait;
use serde_json::Value;

use hana_tools::{CommandLine, ProcessChain};
use hana_types::{HanaError, OperationPath, Outcome, Result};
use hana_vars::Environment;

use crate::context::RunContext;
use crate::handler::{Binding, OperationHandler};
use crate::operation::{Command, Operation};
use crate::params::json_type_name;

// ---------------------------------------------------------------------------
// CustomHandler: runs a user-declared command
// ---------------------------------------------------------------------------

/// `run` holds literal words (program and fixed flags), `args` holds
/// references appended after them, `outputs` lists references to files the
/// command must leave behind.
pub struct CustomHandler;

const FIELDS: [&str; 3] = ["run", "args", "outputs"];

fn field_list<'a>(op: &Operation<'a>, field: &str) -> Result<&'a [Value]> {
    match op.param(field) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(HanaError::ParameterType {
            param: field.to_string(),
            expected: "a list".into(),
            found: json_type_name(other).into(),
        }),
    }
}

fn as_word(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(HanaError::ParameterType {
            param: field.to_string(),
            expected: "a string or number".into(),
            found: json_type_name(other).into(),
        }),
    }
}

fn literal_words(op: &Operation<'_>) -> Result<Vec<String>> {
    field_list(op, "run")?
        .iter()
        .map(|word| as_word("run", word))
        .collect()
}

#[async_trait]
impl OperationHandler for CustomHandler {
    fn command(&self) -> Command {
        Command::Custom
    }

    fn accepts_param(&self, name: &str) -> bool {
        FIELDS.contains(&name)
    }

    fn bindings(&self, op: &Operation<'_>) -> Vec<Binding> {
        let mut bindings = Vec::new();
        for field in ["args", "outputs"] {
            if let Ok(items) = field_list(op, field) {
                bindings.extend(items.iter().map(|item| Binding {
                    name: field.to_string(),
                    reference: item.clone(),
                    required: true,
                }));
            }
        }
        bindings
    }

    fn validate(
        &self,
        _path: &OperationPath,
        op: &Operation<'_>,
        _env: &Environment<'_>,
    ) -> Result<()> {
        literal_words(op)?;
        field_list(op, "args")?;
        field_list(op, "outputs")?;
        Ok(())
    }

    async fn execute(
        &self,
        path: &OperationPath,
        op: &Operation<'_>,
        ctx: &mut RunContext<'_>,
    ) -> Result<Outcome> {
        let mut argv = literal_words(op)?;
        let Some(program) = argv.first().cloned() else {
            tracing::info!(path = %path, "Custom operation has nothing to run");
            return Ok(Outcome::success("nothing to run"));
        };

        for item in field_list(op, "args")? {
            argv.push(as_word("args", &ctx.require("args", item)?)?);
        }
        let mut outputs = Vec::new();
        for item in field_list(op, "outputs")? {
            outputs.push(as_word("outputs", &ctx.require("outputs", item)?)?);
        }

        let program = if program.contains('/') {
            ctx.config().resolve_path(&program)
        } else {
            ctx.locate(&program)?
        };
        let command = CommandLine::new(program).args(argv[1..].iter().cloned());
        ctx.invoke(ProcessChain::single(command)).await?;

        for output in &outputs {
            ctx.check_output(output)?;
        }
        Ok(Outcome::success(format!("ran {}", argv.join(" "))))
    }
}
