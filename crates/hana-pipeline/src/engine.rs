//! Pipeline execution engine: the resumable, recursive operation walk.
//!
//! A run has four phases: restore the checkpoint, pick the resume position,
//! validate the whole operation tree, then execute in program order. Each
//! completed operation moves `last_op` forward and flushes the checkpoint,
//! so an interrupted run picks up right after the last finished operation,
//! including in the middle of a (nested) loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use hana_tools::{DryRunRunner, LocalToolRunner, ToolLocator, ToolRunner};
use hana_types::{HanaError, LastOp, LoopCursor, OperationPath, Result, Status};

use crate::checkpoint::load_checkpoint;
use crate::config::ProjectConfig;
use crate::context::RunContext;
use crate::events::{EventEmitter, PipelineEvent, PipelineState};
use crate::handler::{default_registry, HandlerRegistry};
use crate::interviewer::{AutoApproveInterviewer, Interviewer, Question};
use crate::operation::{Command, LoopSpec, Operation};
use crate::validation::{validate_or_raise, LintContext};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The core pipeline executor. Owns a handler registry and drives the walk.
pub struct PipelineExecutor {
    registry: HandlerRegistry,
    interviewer: Arc<dyn Interviewer>,
    runner: Arc<dyn ToolRunner>,
    events: EventEmitter,
    dry_run: bool,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every operation ran to the end.
    Finished,
    /// The checkpoint said the pipeline was done and the restart was declined.
    AlreadyComplete,
}

/// The result of a pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    pub completion: Completion,
    /// Leaf operations executed in this run, in order.
    pub executed: Vec<OperationPath>,
    pub final_status: Status,
}

type BodyFuture<'s> = Pin<Box<dyn Future<Output = Result<()>> + Send + 's>>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// First index of `ops` (at `depth`) still to run, given the resume position.
fn resume_index(
    ops: &[Value],
    depth: usize,
    resume: Option<&OperationPath>,
    status: &Status,
    prefix: &OperationPath,
) -> usize {
    let Some(resume) = resume else {
        return 0;
    };
    let Some(index) = resume.get(depth).and_then(|i| usize::try_from(i).ok()) else {
        return 0;
    };
    if resume.depth() > depth + 1 {
        // Stopped inside the loop at `index`.
        return index;
    }
    let path = prefix.child(index);
    let unfinished_loop = ops
        .get(index)
        .and_then(|raw| Operation::parse(&path, raw).ok())
        .is_some_and(|op| op.is_loop())
        && status.loop_cursor(&path).is_some();
    if unfinished_loop {
        index
    } else {
        index + 1
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

impl PipelineExecutor {
    /// Create an executor with the given handler registry.
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            interviewer: Arc::new(AutoApproveInterviewer),
            runner: Arc::new(LocalToolRunner::new()),
            events: EventEmitter::default(),
            dry_run: false,
        }
    }

    /// Create an executor pre-loaded with the built-in handlers.
    pub fn with_default_registry() -> Self {
        Self::new(default_registry())
    }

    /// Who answers the restart question for an already-complete pipeline.
    pub fn with_interviewer(mut self, interviewer: Arc<dyn Interviewer>) -> Self {
        self.interviewer = interviewer;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Plan only: commands go to `runner` and no checkpoint is written.
    pub fn with_dry_run(mut self, runner: Arc<DryRunRunner>) -> Self {
        self.runner = runner;
        self.dry_run = true;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Restore the project's checkpoint and run the pipeline from there.
    pub async fn run(&self, config: &ProjectConfig, tools: &ToolLocator) -> Result<PipelineResult> {
        let initial = config.initial_status(tools);
        let mut status = load_checkpoint(&config.project_path).await;
        status.merge(&initial);
        self.run_with_status(config, tools, &initial, status).await
    }

    /// Run from an already-restored status. `initial` is what a fresh run
    /// starts from.
    pub async fn run_with_status(
        &self,
        config: &ProjectConfig,
        tools: &ToolLocator,
        initial: &Status,
        mut status: Status,
    ) -> Result<PipelineResult> {
        let resume = match status.last_op() {
            LastOp::Missing => {
                tracing::info!("No checkpoint found, starting from the first operation");
                OperationPath::fresh()
            }
            LastOp::Corrupted(value) => {
                tracing::warn!(last_op = %value, "Checkpoint position is unreadable, restarting");
                status = initial.clone();
                OperationPath::fresh()
            }
            LastOp::At(path) if path.is_empty() => {
                let question = Question::yes_no("Pipeline already complete. Restart?", Some(false));
                let answer = self.interviewer.ask(&question).await?;
                if !answer.is_yes() {
                    tracing::info!("Pipeline already complete, nothing to do");
                    return Ok(PipelineResult {
                        completion: Completion::AlreadyComplete,
                        executed: Vec::new(),
                        final_status: status,
                    });
                }
                tracing::info!("Restarting completed pipeline");
                status = initial.clone();
                OperationPath::fresh()
            }
            LastOp::At(path) if !config.is_resumable(&path) => {
                tracing::warn!(
                    last_op = %path,
                    "Checkpoint position does not match the configured operations, restarting"
                );
                status = initial.clone();
                OperationPath::fresh()
            }
            LastOp::At(path) => {
                tracing::info!(from = %path, "Resuming from checkpoint");
                self.events
                    .emit(PipelineEvent::Resumed { from: path.clone() });
                path
            }
        };
        status.set_last_op(&resume);

        let started = Instant::now();
        let (final_status, executed) = match self.execute(config, tools, status, resume).await {
            Ok(parts) => parts,
            Err(err) => {
                tracing::error!(error = %err, "Pipeline aborted");
                self.events
                    .emit(PipelineEvent::StateChanged(PipelineState::Aborted(err.to_string())));
                return Err(err);
            }
        };

        tracing::info!(executed = executed.len(), "Pipeline complete");
        self.events
            .emit(PipelineEvent::StateChanged(PipelineState::Completed));
        self.events.emit(PipelineEvent::PipelineCompleted {
            executed: executed.len(),
            duration_ms: elapsed_ms(started),
        });
        Ok(PipelineResult {
            completion: Completion::Finished,
            executed,
            final_status,
        })
    }

    /// Validate, flush the entry checkpoint, then walk the tree from `resume`.
    async fn execute(
        &self,
        config: &ProjectConfig,
        tools: &ToolLocator,
        status: Status,
        resume: OperationPath,
    ) -> Result<(Status, Vec<OperationPath>)> {
        validate_or_raise(&LintContext {
            config,
            status: &status,
            registry: &self.registry,
        })?;

        let mut ctx = RunContext::new(
            config,
            status,
            tools,
            self.runner.as_ref(),
            &self.events,
            self.dry_run,
        );
        ctx.commit().await?;

        self.events.emit(PipelineEvent::PipelineStarted {
            operations: config.ops.len(),
            dry_run: self.dry_run,
        });
        self.run_body(&mut ctx, OperationPath::root(), &config.ops, Some(resume))
            .await?;
        Ok(ctx.into_parts())
    }

    /// Execute `ops` (the list addressed by `prefix`), skipping everything up
    /// to the resume position.
    fn run_body<'s, 'c>(
        &'s self,
        ctx: &'s mut RunContext<'c>,
        prefix: OperationPath,
        ops: &'s [Value],
        resume: Option<OperationPath>,
    ) -> BodyFuture<'s> {
        Box::pin(async move {
            let start = resume_index(ops, prefix.depth(), resume.as_ref(), ctx.status(), &prefix);

            for (idx, raw) in ops.iter().enumerate().skip(start) {
                let path = prefix.child(idx);
                let op = Operation::parse(&path, raw)?;
                if !op.enabled {
                    tracing::info!(path = %path, command = op.command, "Operation disabled, skipping");
                    self.events
                        .emit(PipelineEvent::OperationSkipped { path: path.clone() });
                    continue;
                }
                let command = op.command_kind(&path)?;
                let inner = resume.clone().filter(|r| r.starts_with(&path));

                tracing::info!(path = %path, command = %command, "Running operation");
                self.events.emit(PipelineEvent::OperationStarted {
                    path: path.clone(),
                    command: command.to_string(),
                });
                self.events
                    .emit(PipelineEvent::StateChanged(PipelineState::Running(path.clone())));
                let started = Instant::now();

                if command == Command::Loop {
                    let spec = op.loop_spec(&path)?;
                    self.run_loop(ctx, &path, spec, inner)
                        .await
                        .map_err(|e| e.at(&path))?;
                } else {
                    let handler = self.registry.get(command).ok_or_else(|| {
                        HanaError::NoHandler {
                            command: command.to_string(),
                        }
                        .at(&path)
                    })?;
                    let outcome = handler
                        .execute(&path, &op, ctx)
                        .await
                        .map_err(|e| e.at(&path))?;
                    tracing::debug!(path = %path, notes = %outcome.notes, "Operation finished");
                    ctx.status_mut().apply_updates(outcome.status_updates);
                    ctx.record_executed(path.clone());
                }

                ctx.status_mut().set_last_op(&path);
                ctx.commit().await?;
                self.events.emit(PipelineEvent::OperationCompleted {
                    path: path.clone(),
                    command: command.to_string(),
                    duration_ms: elapsed_ms(started),
                });
            }

            ctx.status_mut().set_last_op(&prefix);
            ctx.commit().await?;
            Ok(())
        })
    }

    /// Run a loop's body once per element of its list, binding the loop
    /// variable for the duration of each iteration.
    async fn run_loop(
        &self,
        ctx: &mut RunContext<'_>,
        path: &OperationPath,
        spec: LoopSpec<'_>,
        resume: Option<OperationPath>,
    ) -> Result<()> {
        let list = ctx.require("list", spec.list)?;
        let Value::Array(items) = list else {
            return Err(HanaError::ReferenceType {
                reference: spec.list.to_string(),
                expected: "a list".into(),
            });
        };

        let cursor = ctx.status().loop_cursor(path);
        let (first, shadowed, mut body_resume) = match (resume, cursor) {
            (Some(r), Some(cursor)) if &r == path => (cursor.index + 1, cursor.shadowed, None),
            (Some(r), Some(cursor)) => (cursor.index, cursor.shadowed, Some(r)),
            (Some(r), None) => {
                tracing::warn!(path = %path, last_op = %r, "Loop progress missing, restarting loop");
                (0, ctx.status().get(spec.var).cloned(), None)
            }
            (None, _) => (0, ctx.status().get(spec.var).cloned(), None),
        };

        let total = items.len();
        for (index, item) in items.into_iter().enumerate().skip(first) {
            let cursor = LoopCursor {
                index,
                shadowed: shadowed.clone(),
            };
            ctx.status_mut().set_loop_cursor(path, &cursor);
            ctx.status_mut().set(spec.var, item);
            if body_resume.is_none() {
                ctx.status_mut().set_last_op(&path.before_first_child());
            }
            ctx.commit().await?;

            tracing::info!(path = %path, var = spec.var, index, total, "Loop iteration");
            self.events.emit(PipelineEvent::LoopIteration {
                path: path.clone(),
                index,
                total,
            });
            self.run_body(ctx, path.clone(), spec.body, body_resume.take())
                .await?;
        }

        let status = ctx.status_mut();
        match shadowed {
            Some(value) => status.set(spec.var, value),
            None => {
                status.remove(spec.var);
            }
        }
        status.clear_loop_cursor(path);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(indices: &[i64]) -> OperationPath {
        OperationPath::from(indices.to_vec())
    }

    fn ops() -> Vec<Value> {
        vec![
            json!({"command": "custom"}),
            json!({"command": "loop", "list": [1, 2], "var": "x", "body": [
                {"command": "custom"}
            ]}),
            json!({"command": "custom"}),
        ]
    }

    #[test]
    fn fresh_start_runs_everything() {
        let status = Status::new();
        let root = OperationPath::root();
        assert_eq!(resume_index(&ops(), 0, None, &status, &root), 0);
        assert_eq!(
            resume_index(&ops(), 0, Some(&OperationPath::fresh()), &status, &root),
            0
        );
    }

    #[test]
    fn resume_continues_after_completed_operation() {
        let status = Status::new();
        let root = OperationPath::root();
        assert_eq!(resume_index(&ops(), 0, Some(&path(&[0])), &status, &root), 1);
        // A finished loop (no cursor) is not entered again.
        assert_eq!(resume_index(&ops(), 0, Some(&path(&[1])), &status, &root), 2);
    }

    #[test]
    fn resume_reenters_unfinished_loop() {
        let mut status = Status::new();
        let root = OperationPath::root();
        assert_eq!(
            resume_index(&ops(), 0, Some(&path(&[1, 0])), &status, &root),
            1
        );
        status.set_loop_cursor(
            &path(&[1]),
            &LoopCursor {
                index: 0,
                shadowed: None,
            },
        );
        assert_eq!(resume_index(&ops(), 0, Some(&path(&[1])), &status, &root), 1);
    }

    #[test]
    fn nested_depth_reads_its_own_component() {
        let status = Status::new();
        let body = vec![json!({"command": "custom"}), json!({"command": "custom"})];
        let loop_path = path(&[1]);
        assert_eq!(
            resume_index(&body, 1, Some(&path(&[1, -1])), &status, &loop_path),
            0
        );
        assert_eq!(
            resume_index(&body, 1, Some(&path(&[1, 0])), &status, &loop_path),
            1
        );
    }
}
