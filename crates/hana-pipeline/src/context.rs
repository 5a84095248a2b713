//! The run context threaded through the executor and every handler.
//!
//! `RunContext` owns the status store for the duration of a run and borrows
//! everything else. [`RunContext::commit`] is the single place the checkpoint
//! is written.

use std::path::{Path, PathBuf};

use serde_json::Value;

use hana_tools::{ProcessChain, ToolRunner, ToolLocator};
use hana_types::{HanaError, LastOp, OperationPath, Result, Status};
use hana_vars::{resolve, Environment};

use crate::checkpoint::save_checkpoint;
use crate::config::ProjectConfig;
use crate::events::{EventEmitter, PipelineEvent};
use crate::operation::Command;

pub struct RunContext<'a> {
    config: &'a ProjectConfig,
    status: Status,
    tools: &'a ToolLocator,
    runner: &'a dyn ToolRunner,
    events: &'a EventEmitter,
    dry_run: bool,
    executed: Vec<OperationPath>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        config: &'a ProjectConfig,
        status: Status,
        tools: &'a ToolLocator,
        runner: &'a dyn ToolRunner,
        events: &'a EventEmitter,
        dry_run: bool,
    ) -> Self {
        Self {
            config,
            status,
            tools,
            runner,
            events,
            dry_run,
            executed: Vec::new(),
        }
    }

    pub fn config(&self) -> &'a ProjectConfig {
        self.config
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }

    pub fn tools(&self) -> &'a ToolLocator {
        self.tools
    }

    pub fn events(&self) -> &'a EventEmitter {
        self.events
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn project_path(&self) -> &'a Path {
        &self.config.project_path
    }

    /// Leaf operations run so far, in order.
    pub fn executed(&self) -> &[OperationPath] {
        &self.executed
    }

    pub(crate) fn record_executed(&mut self, path: OperationPath) {
        self.executed.push(path);
    }

    pub fn into_parts(self) -> (Status, Vec<OperationPath>) {
        (self.status, self.executed)
    }

    /// The four namespaces as they stand right now.
    pub fn environment(&self) -> Environment<'_> {
        self.config.environment(&self.status)
    }

    pub fn resolve(&self, name: &str, reference: &Value, must_exist: bool) -> Result<Option<Value>> {
        resolve(name, reference, &self.environment(), must_exist)
    }

    /// Resolve a mandatory reference.
    pub fn require(&self, name: &str, reference: &Value) -> Result<Value> {
        self.resolve(name, reference, true)?
            .ok_or_else(|| HanaError::InvalidValue {
                param: name.to_string(),
                message: format!("{reference} resolved to nothing"),
            })
    }

    /// Flush the status store to the checkpoint. Dry runs never write.
    pub async fn commit(&mut self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        save_checkpoint(&self.config.project_path, &self.status).await?;
        let last_op = match self.status.last_op() {
            LastOp::At(path) => Some(path),
            _ => None,
        };
        self.events.emit(PipelineEvent::CheckpointSaved { last_op });
        Ok(())
    }

    /// Locate an executable. A dry run falls back to the bare name so the
    /// plan can still be printed.
    pub fn locate(&self, tool: &str) -> Result<PathBuf> {
        match self.tools.require(tool) {
            Ok(path) => Ok(path),
            Err(_) if self.dry_run => {
                tracing::warn!(tool, "Executable not found, planning with bare name");
                Ok(PathBuf::from(tool))
            }
            Err(e) => Err(e),
        }
    }

    /// Path of the scaffolding binary for `command`.
    pub fn hana_binary(&self, command: Command) -> Result<PathBuf> {
        self.locate(&command.binary_name())
    }

    /// Run `chain` in the project directory.
    pub async fn invoke(&self, chain: ProcessChain) -> Result<()> {
        let chain = chain.in_dir(&self.config.project_path);
        self.runner.run(&chain).await
    }

    /// Fail unless `path` (relative to the project) exists as a file.
    /// Skipped in a dry run, where nothing is produced.
    pub fn check_output(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        let resolved = self.config.resolve_path(path.as_ref());
        if resolved.is_file() {
            Ok(())
        } else {
            Err(HanaError::MissingOutput { path: resolved })
        }
    }
}
