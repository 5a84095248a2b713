use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use hana_types::{HanaError, Result};
use tokio::process::Child;

use crate::chain::ProcessChain;

/// Executes process chains on behalf of operation handlers.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `chain` to completion. Any stage exiting non-zero is an error.
    async fn run(&self, chain: &ProcessChain) -> Result<()>;
}

/// Spawns real processes with inherited stderr and, for the last stage,
/// inherited stdout.
#[derive(Debug, Default)]
pub struct LocalToolRunner;

impl LocalToolRunner {
    pub fn new() -> Self {
        Self
    }
}

fn spawn_error(tool: String, err: std::io::Error) -> HanaError {
    if err.kind() == std::io::ErrorKind::NotFound {
        HanaError::ToolNotFound { tool }
    } else {
        HanaError::Io(err)
    }
}

/// Stop every stage still running after a failure.
async fn abort_stages(children: &mut [(String, Child)]) {
    for (_, child) in children.iter_mut() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[async_trait]
impl ToolRunner for LocalToolRunner {
    async fn run(&self, chain: &ProcessChain) -> Result<()> {
        if chain.is_empty() {
            return Ok(());
        }
        tracing::info!(command = %chain, "> {chain}");

        let stage_count = chain.len();
        let mut children: Vec<(String, Child)> = Vec::with_capacity(stage_count);
        let mut upstream: Option<Stdio> = None;

        for (pos, stage) in chain.stages().iter().enumerate() {
            let last = pos + 1 == stage_count;
            let mut cmd = tokio::process::Command::new(stage.program());
            cmd.args(stage.get_args())
                .stdin(upstream.take().unwrap_or_else(Stdio::null))
                .stdout(if last { Stdio::inherit() } else { Stdio::piped() })
                .stderr(Stdio::inherit());
            if let Some(dir) = chain.cwd() {
                cmd.current_dir(dir);
            }

            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(err) => {
                    abort_stages(&mut children).await;
                    return Err(spawn_error(stage.tool_name(), err));
                }
            };
            // `cmd` drops at the end of this iteration, releasing the parent's
            // copy of the pipe so a dead reader surfaces as SIGPIPE upstream.
            if !last {
                let Some(stdout) = child.stdout.take() else {
                    abort_stages(&mut children).await;
                    return Err(HanaError::Other(format!(
                        "stdout of '{}' was not captured",
                        stage.tool_name()
                    )));
                };
                upstream = Some(stdout.try_into()?);
            }
            children.push((stage.tool_name(), child));
        }

        for pos in 0..children.len() {
            let (tool, child) = &mut children[pos];
            let status = child.wait().await?;
            tracing::debug!(tool = %tool, exit_code = ?status.code(), "Stage finished");
            if !status.success() {
                let err = HanaError::ToolFailed {
                    tool: tool.clone(),
                    code: status.code(),
                };
                abort_stages(&mut children[pos + 1..]).await;
                return Err(err);
            }
        }
        Ok(())
    }
}

/// Records chains instead of running them.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    planned: Mutex<Vec<ProcessChain>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every chain seen so far, in order.
    pub fn planned(&self) -> Vec<ProcessChain> {
        self.planned
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ToolRunner for DryRunRunner {
    async fn run(&self, chain: &ProcessChain) -> Result<()> {
        tracing::info!(command = %chain, "Dry run, not executing");
        if let Ok(mut planned) = self.planned.lock() {
            planned.push(chain.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandLine;

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("/bin/sh").args(["-c", script])
    }

    #[tokio::test]
    async fn single_stage_success() {
        let dir = tempfile::tempdir().unwrap();
        let chain = ProcessChain::single(sh("echo ok > out.txt")).in_dir(dir.path());
        LocalToolRunner::new().run(&chain).await.unwrap();
        let out = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(out.trim(), "ok");
    }

    #[tokio::test]
    async fn single_stage_failure_reports_exit_code() {
        let chain = ProcessChain::single(sh("exit 3"));
        let err = LocalToolRunner::new().run(&chain).await.unwrap_err();
        match err {
            HanaError::ToolFailed { tool, code } => {
                assert_eq!(tool, "sh");
                assert_eq!(code, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn pipe_feeds_each_stage() {
        let dir = tempfile::tempdir().unwrap();
        let chain = ProcessChain::single(sh("printf 'b\\na\\nc\\n'"))
            .pipe(sh("sort"))
            .pipe(sh("tr -d '\\n' > sorted.txt"))
            .in_dir(dir.path());
        LocalToolRunner::new().run(&chain).await.unwrap();
        let out = std::fs::read_to_string(dir.path().join("sorted.txt")).unwrap();
        assert_eq!(out, "abc");
    }

    #[tokio::test]
    async fn failing_upstream_fails_whole_chain() {
        let dir = tempfile::tempdir().unwrap();
        let chain = ProcessChain::single(sh("echo partial; exit 4"))
            .pipe(sh("cat > out.txt"))
            .in_dir(dir.path());
        let err = LocalToolRunner::new().run(&chain).await.unwrap_err();
        assert!(matches!(err, HanaError::ToolFailed { code: Some(4), .. }));
    }

    #[tokio::test]
    async fn failing_downstream_fails_whole_chain() {
        let chain = ProcessChain::single(sh("echo data")).pipe(sh("cat > /dev/null; exit 7"));
        let err = LocalToolRunner::new().run(&chain).await.unwrap_err();
        assert!(matches!(err, HanaError::ToolFailed { code: Some(7), .. }));
    }

    #[tokio::test]
    async fn missing_program_is_tool_not_found() {
        let chain = ProcessChain::single(CommandLine::new("/nonexistent/hana_extract"));
        let err = LocalToolRunner::new().run(&chain).await.unwrap_err();
        assert!(matches!(err, HanaError::ToolNotFound { tool } if tool == "hana_extract"));
    }

    #[tokio::test]
    async fn dry_run_records_without_spawning() {
        let runner = DryRunRunner::new();
        let chain = ProcessChain::single(CommandLine::new("/nonexistent/hana_build").arg("-o"));
        runner.run(&chain).await.unwrap();
        assert_eq!(runner.planned(), vec![chain]);
    }
}
