//! Resumable execution of HANA scaffolding pipelines.
//!
//! This crate implements the pipeline runner: project configuration loading,
//! the operation tree and its nested loops, parameter binding against the
//! per-command tables, handler dispatch, checkpoint/resume, and the pre-flight
//! lint rules.

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod engine;
pub mod enzyme;
pub mod events;
pub mod handler;
pub mod handlers;
pub mod interviewer;
pub mod operation;
pub mod params;
pub mod validation;

pub use checkpoint::{
    checkpoint_saved_at, clear_checkpoint, load_checkpoint, save_checkpoint, status_path,
    STATUS_FILE,
};
pub use config::{ProjectConfig, ToolPaths, CONFIG_FILE};
pub use context::RunContext;
pub use engine::{Completion, PipelineExecutor, PipelineResult};
pub use enzyme::canonical_site;
pub use events::{EventEmitter, PipelineEvent, PipelineState};
pub use handler::{default_registry, Binding, DynHandler, HandlerRegistry, OperationHandler};
pub use handlers::{CustomHandler, MapHandler, ScaffoldHandler};
pub use interviewer::{
    Answer, AutoApproveInterviewer, ConsoleInterviewer, Interviewer, Question,
    RecordingInterviewer,
};
pub use operation::{Command, LoopSpec, Operation};
pub use params::{BoundParams, ParamSpec, ToolSchema, ValueKind};
pub use validation::{validate, validate_or_raise, Diagnostic, LintContext, LintRule, Severity};
