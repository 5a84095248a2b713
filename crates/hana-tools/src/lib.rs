//! External tool plumbing for the HANA pipeline runner.
//!
//! Provides `ToolLocator` (executable discovery), `CommandLine` (one argv),
//! `ProcessChain` (stages piped stdout-to-stdin), and the `ToolRunner` trait
//! with a spawning `LocalToolRunner` and a recording `DryRunRunner`.

pub mod chain;
pub mod command;
pub mod locator;
pub mod runner;

pub use chain::ProcessChain;
pub use command::CommandLine;
pub use locator::{is_executable, ToolLocator};
pub use runner::{DryRunRunner, LocalToolRunner, ToolRunner};
