use std::fmt;
use std::path::{Path, PathBuf};

use crate::command::CommandLine;

/// An ordered list of processes where each stage's stdout feeds the next
/// stage's stdin. A chain of one stage is a plain invocation.
///
/// The chain succeeds only if every stage exits with status zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessChain {
    stages: Vec<CommandLine>,
    cwd: Option<PathBuf>,
}

impl ProcessChain {
    pub fn single(command: CommandLine) -> Self {
        Self {
            stages: vec![command],
            cwd: None,
        }
    }

    /// Append a stage that reads the previous stage's output.
    pub fn pipe(mut self, command: CommandLine) -> Self {
        self.stages.push(command);
        self
    }

    /// Run every stage in `dir`.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stages(&self) -> &[CommandLine] {
        &self.stages
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl From<CommandLine> for ProcessChain {
    fn from(command: CommandLine) -> Self {
        Self::single(command)
    }
}

impl fmt::Display for ProcessChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pos, stage) in self.stages.iter().enumerate() {
            if pos > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}
