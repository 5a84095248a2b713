//! Shared types for the HANA pipeline runner.
//!
//! This crate provides the foundational types used across the other crates:
//! - `HanaError`: unified error taxonomy
//! - `OperationPath`: the resume coordinate of an operation
//! - `Status`: the checkpointed key-value store
//! - `Outcome`: what a handler publishes on success

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod path;
pub mod status;

pub use path::OperationPath;
pub use status::{LastOp, LoopCursor, Status};

/// Unified error type for all HANA subsystems.
#[derive(Debug, thiserror::Error)]
pub enum HanaError {
    // === Configuration Errors ===
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Pipeline validation failed: {0}")]
    Validation(String),

    #[error("Operation {path} is not a valid operation: {message}")]
    InvalidOperation { path: OperationPath, message: String },

    #[error("Unknown command '{command}' at operation {path}")]
    UnknownCommand { path: OperationPath, command: String },

    #[error("No handler registered for command '{command}'")]
    NoHandler { command: String },

    // === Resolution Errors ===
    #[error("Failed to find \"{key}\" in config files")]
    FileNotFound { key: String },

    #[error("Failed to find \"{key}\" in global settings")]
    SettingNotFound { key: String },

    #[error("Failed to find project attribute \"{name}\"")]
    AttributeNotFound { name: String },

    #[error("Failed to find \"{key}\" in pipeline status")]
    StatusNotFound { key: String },

    #[error("Malformed reference '{reference}': {message}")]
    ReferenceSyntax { reference: String, message: String },

    #[error("Reference '{reference}' must resolve to {expected}")]
    ReferenceType { reference: String, expected: String },

    #[error("Parameter '{param}' expects {expected}, got {found}")]
    ParameterType {
        param: String,
        expected: String,
        found: String,
    },

    #[error("Invalid value for '{param}': {message}")]
    InvalidValue { param: String, message: String },

    // === Tool Errors ===
    #[error("Failed to find executable '{tool}'")]
    ToolNotFound { tool: String },

    #[error("Tool '{tool}' failed with {}", exit_description(.code))]
    ToolFailed { tool: String, code: Option<i32> },

    #[error("Expected output '{}' was not produced", .path.display())]
    MissingOutput { path: PathBuf },

    // === Pipeline Errors ===
    #[error("Operation {path} failed: {source}")]
    Aborted {
        path: OperationPath,
        #[source]
        source: Box<HanaError>,
    },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "termination by signal".to_string(),
    }
}

/// Broad classes of failure, used for reporting and exit handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad workflow declaration or unresolvable reference.
    Configuration,
    /// An external tool exited non-zero or left out an expected output.
    ExternalTool,
    Io,
    Internal,
}

impl HanaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HanaError::Config(_)
            | HanaError::Validation(_)
            | HanaError::InvalidOperation { .. }
            | HanaError::UnknownCommand { .. }
            | HanaError::FileNotFound { .. }
            | HanaError::SettingNotFound { .. }
            | HanaError::AttributeNotFound { .. }
            | HanaError::StatusNotFound { .. }
            | HanaError::ReferenceSyntax { .. }
            | HanaError::ReferenceType { .. }
            | HanaError::ParameterType { .. }
            | HanaError::InvalidValue { .. } => ErrorKind::Configuration,
            HanaError::ToolNotFound { .. }
            | HanaError::ToolFailed { .. }
            | HanaError::MissingOutput { .. } => ErrorKind::ExternalTool,
            HanaError::Io(_) => ErrorKind::Io,
            HanaError::Aborted { source, .. } => source.kind(),
            HanaError::NoHandler { .. } | HanaError::Json(_) | HanaError::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Attach the operation path where this error surfaced. Errors that
    /// already carry a path are returned unchanged.
    pub fn at(self, path: &OperationPath) -> Self {
        match self {
            HanaError::Aborted { .. }
            | HanaError::InvalidOperation { .. }
            | HanaError::UnknownCommand { .. } => self,
            other => HanaError::Aborted {
                path: path.clone(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping any operation-path wrappers.
    pub fn root_cause(&self) -> &HanaError {
        match self {
            HanaError::Aborted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// A convenience alias for `Result<T, HanaError>`.
pub type Result<T> = std::result::Result<T, HanaError>;

// ---------------------------------------------------------------------------
// Outcome: what a handler publishes on success
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Values merged into the status store before the checkpoint is written.
    pub status_updates: serde_json::Map<String, serde_json::Value>,
    pub notes: String,
}

impl Outcome {
    /// A successful outcome with the given notes and nothing to publish.
    pub fn success(notes: impl Into<String>) -> Self {
        Self {
            status_updates: serde_json::Map::new(),
            notes: notes.into(),
        }
    }

    /// Add a status value to publish.
    pub fn with_update(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.status_updates.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_display_file_not_found() {
        let err = HanaError::FileNotFound {
            key: "contigs".into(),
        };
        assert_eq!(err.to_string(), "Failed to find \"contigs\" in config files");
    }

    #[test]
    fn error_display_status_not_found() {
        let err = HanaError::StatusNotFound {
            key: "edges".into(),
        };
        assert_eq!(err.to_string(), "Failed to find \"edges\" in pipeline status");
    }

    #[test]
    fn error_display_tool_failed() {
        let err = HanaError::ToolFailed {
            tool: "hana_draft".into(),
            code: Some(2),
        };
        assert_eq!(err.to_string(), "Tool 'hana_draft' failed with exit code 2");

        let err = HanaError::ToolFailed {
            tool: "bwa".into(),
            code: None,
        };
        assert_eq!(err.to_string(), "Tool 'bwa' failed with termination by signal");
    }

    #[test]
    fn error_display_missing_output() {
        let err = HanaError::MissingOutput {
            path: PathBuf::from("proj.hmr_edges"),
        };
        assert_eq!(
            err.to_string(),
            "Expected output 'proj.hmr_edges' was not produced"
        );
    }

    #[test]
    fn error_display_unknown_command() {
        let err = HanaError::UnknownCommand {
            path: OperationPath::from(vec![1, 0]),
            command: "assemble".into(),
        };
        assert_eq!(err.to_string(), "Unknown command 'assemble' at operation [1, 0]");
    }

    #[test]
    fn at_wraps_once_with_path() {
        let err = HanaError::SettingNotFound {
            key: "groups".into(),
        }
        .at(&OperationPath::from(vec![2]))
        .at(&OperationPath::from(vec![5]));
        assert_eq!(
            err.to_string(),
            "Operation [2] failed: Failed to find \"groups\" in global settings"
        );
        assert!(matches!(err.root_cause(), HanaError::SettingNotFound { .. }));
    }

    #[test]
    fn at_keeps_errors_that_carry_a_path() {
        let err = HanaError::UnknownCommand {
            path: OperationPath::from(vec![0]),
            command: "x".into(),
        }
        .at(&OperationPath::from(vec![4]));
        assert!(matches!(err, HanaError::UnknownCommand { .. }));
    }

    #[test]
    fn kind_classification() {
        assert_eq!(
            HanaError::StatusNotFound { key: "x".into() }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            HanaError::ToolFailed {
                tool: "x".into(),
                code: Some(1)
            }
            .kind(),
            ErrorKind::ExternalTool
        );
        let wrapped = HanaError::MissingOutput {
            path: PathBuf::from("a"),
        }
        .at(&OperationPath::from(vec![0]));
        assert_eq!(wrapped.kind(), ErrorKind::ExternalTool);
        assert_eq!(HanaError::Other("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HanaError = io_err.into();
        assert!(matches!(err, HanaError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: HanaError = json_err.into();
        assert!(matches!(err, HanaError::Json(_)));
    }

    #[test]
    fn outcome_collects_updates() {
        let o = Outcome::success("extracted")
            .with_update("nodes", json!("p.hmr_nodes"))
            .with_update("reads", json!("p.hmr_reads"));
        assert_eq!(o.notes, "extracted");
        assert_eq!(o.status_updates.len(), 2);
        assert_eq!(o.status_updates.get("nodes"), Some(&json!("p.hmr_nodes")));
    }
}
