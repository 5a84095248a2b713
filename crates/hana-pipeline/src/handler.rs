//! Operation handler trait, dynamic dispatch wrapper, and handler registry.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use hana_types::{OperationPath, Outcome, Result};
use hana_vars::Environment;

use crate::context::RunContext;
use crate::operation::{Command, Operation};
use crate::params::ToolSchema;

/// A parameter reference an operation will resolve, as seen by validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Parameter name; also the key a bare sigil reads.
    pub name: String,
    pub reference: Value,
    pub required: bool,
}

// ---------------------------------------------------------------------------
// OperationHandler trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// The command this handler executes.
    fn command(&self) -> Command;

    /// Parameter table, for table-driven handlers.
    fn schema(&self) -> Option<&ToolSchema> {
        None
    }

    /// Status keys published on success.
    fn produces(&self) -> &[&'static str] {
        &[]
    }

    fn accepts_param(&self, name: &str) -> bool {
        self.schema().is_some_and(|s| s.param(name).is_some())
    }

    /// References `op` will resolve when it runs.
    fn bindings(&self, op: &Operation<'_>) -> Vec<Binding> {
        self.schema().map(|s| s.bindings(op)).unwrap_or_default()
    }

    /// Checks that need no side effects, run before the pipeline starts.
    fn validate(
        &self,
        _path: &OperationPath,
        op: &Operation<'_>,
        env: &Environment<'_>,
    ) -> Result<()> {
        match self.schema() {
            Some(schema) => schema.precheck(op, env),
            None => Ok(()),
        }
    }

    async fn execute(
        &self,
        path: &OperationPath,
        op: &Operation<'_>,
        ctx: &mut RunContext<'_>,
    ) -> Result<Outcome>;
}

// ---------------------------------------------------------------------------
// DynHandler: object-safe wrapper
// ---------------------------------------------------------------------------

pub struct DynHandler(Box<dyn OperationHandler>);

impl DynHandler {
    pub fn new(handler: impl OperationHandler + 'static) -> Self {
        Self(Box::new(handler))
    }

    pub fn command(&self) -> Command {
        self.0.command()
    }

    pub fn produces(&self) -> &[&'static str] {
        self.0.produces()
    }

    pub fn accepts_param(&self, name: &str) -> bool {
        self.0.accepts_param(name)
    }

    pub fn bindings(&self, op: &Operation<'_>) -> Vec<Binding> {
        self.0.bindings(op)
    }

    pub fn validate(
        &self,
        path: &OperationPath,
        op: &Operation<'_>,
        env: &Environment<'_>,
    ) -> Result<()> {
        self.0.validate(path, op, env)
    }

    pub async fn execute(
        &self,
        path: &OperationPath,
        op: &Operation<'_>,
        ctx: &mut RunContext<'_>,
    ) -> Result<Outcome> {
        self.0.execute(path, op, ctx).await
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Command to handler table. `loop` is driven by the executor itself and
/// never appears here.
pub struct HandlerRegistry {
    handlers: HashMap<Command, DynHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: impl OperationHandler + 'static) {
        let command = handler.command();
        self.handlers.insert(command, DynHandler::new(handler));
    }

    pub fn get(&self, command: Command) -> Option<&DynHandler> {
        self.handlers.get(&command)
    }

    pub fn has(&self, command: Command) -> bool {
        self.handlers.contains_key(&command)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with every built-in command.
pub fn default_registry() -> HandlerRegistry {
    use crate::handlers::{CustomHandler, MapHandler, ScaffoldHandler};

    let mut reg = HandlerRegistry::new();
    reg.register(MapHandler);
    reg.register(ScaffoldHandler::extract());
    reg.register(ScaffoldHandler::draft());
    reg.register(ScaffoldHandler::partition());
    reg.register(ScaffoldHandler::ordering());
    reg.register(ScaffoldHandler::orientation());
    reg.register(ScaffoldHandler::build());
    reg.register(CustomHandler);
    reg
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
