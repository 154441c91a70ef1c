//! Process spawning for tool invocations.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::config::ToolsConfig;
use crate::observability::metrics;
use crate::security::sanitizer::SanitizedCommandArgs;
use crate::tools::adapters::adapter_for;
use crate::tools::{ToolError, ToolKind, ToolOutput};

/// Bytes of stderr kept for the server log.
const STDERR_LOG_BYTES: usize = 2048;

/// Runs sanitized argument vectors as child processes.
pub struct ToolRunner {
    tools: ToolsConfig,
    permits: Arc<Semaphore>,
}

impl ToolRunner {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            tools: tools.clone(),
            permits: Arc::new(Semaphore::new(tools.max_concurrent)),
        }
    }

    /// Free process slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawn the tool with `args.argv`. The binary comes from configuration
    /// and the argv is passed verbatim, never through a shell.
    pub async fn run(&self, kind: ToolKind, args: SanitizedCommandArgs) -> Result<ToolOutput, ToolError> {
        let result = self.spawn_and_wait(kind, args).await;
        let outcome = match &result {
            Ok(output) if output.exit_code == Some(0) => "success",
            Ok(_) => "nonzero_exit",
            Err(ToolError::Disabled(_)) => "disabled",
            Err(ToolError::Busy) => "busy",
            Err(ToolError::Timeout(_)) => "timeout",
            Err(ToolError::Spawn { .. }) | Err(ToolError::Io(_)) => "spawn_error",
        };
        metrics::record_tool_invocation(kind.as_str(), outcome);
        result
    }

    async fn spawn_and_wait(&self, kind: ToolKind, args: SanitizedCommandArgs) -> Result<ToolOutput, ToolError> {
        let config = adapter_for(kind).config(&self.tools);
        if !config.enabled {
            return Err(ToolError::Disabled(kind));
        }

        let _permit = self.permits.clone().try_acquire_owned().map_err(|_| ToolError::Busy)?;
        let deadline = Duration::from_secs(config.timeout_secs);

        tracing::info!(
            tool = %kind,
            binary = %config.binary,
            argc = args.argv.len(),
            "Spawning tool"
        );

        let start = Instant::now();
        let child = Command::new(&config.binary)
            .args(&args.argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                binary: config.binary.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(tool = %kind, timeout = ?deadline, "Tool timed out, process killed");
                return Err(ToolError::Timeout(deadline));
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(
                tool = %kind,
                stderr = %truncate_at_char_boundary(&stderr, STDERR_LOG_BYTES).0,
                "Tool stderr"
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (kept, truncated) = truncate_at_char_boundary(&stdout, self.tools.max_output_bytes);

        tracing::info!(
            tool = %kind,
            exit_code = ?output.status.code(),
            duration_ms,
            output_bytes = output.stdout.len(),
            truncated,
            "Tool finished"
        );

        Ok(ToolOutput {
            tool: kind.as_str().to_string(),
            exit_code: output.status.code(),
            output: kept.to_string(),
            truncated,
            duration_ms,
        })
    }
}

fn truncate_at_char_boundary(s: &str, max: usize) -> (&str, bool) {
    if s.len() <= max {
        return (s, false);
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    (&s[..end], true)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ToolConfig;

    fn runner(binary: &str, timeout_secs: u64, max_output_bytes: usize, max_concurrent: usize) -> ToolRunner {
        ToolRunner::new(&ToolsConfig {
            nmap: ToolConfig {
                enabled: true,
                binary: binary.to_string(),
                timeout_secs,
            },
            max_output_bytes,
            max_concurrent,
            ..ToolsConfig::default()
        })
    }

    fn argv(args: &[&str]) -> SanitizedCommandArgs {
        SanitizedCommandArgs::new("nmap").args(args.iter().copied())
    }

    #[test]
    fn test_truncate_at_char_boundary() {
        assert_eq!(truncate_at_char_boundary("hello", 10), ("hello", false));
        assert_eq!(truncate_at_char_boundary("hello", 3), ("hel", true));
        // 'é' is two bytes starting at index 1
        assert_eq!(truncate_at_char_boundary("héllo", 2), ("h", true));
    }

    #[tokio::test]
    async fn test_argv_is_not_shell_interpreted() {
        let runner = runner("echo", 5, 1024, 2);
        let output = runner
            .run(ToolKind::Nmap, argv(&["8.8.8.8;", "cat", "/etc/passwd", "$(id)"]))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.output, "8.8.8.8; cat /etc/passwd $(id)\n");
        assert!(!output.truncated);
        assert_eq!(output.tool, "nmap");
    }

    #[tokio::test]
    async fn test_output_truncated() {
        let runner = runner("echo", 5, 4, 2);
        let output = runner.run(ToolKind::Nmap, argv(&["abcdefgh"])).await.unwrap();
        assert_eq!(output.output, "abcd");
        assert!(output.truncated);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_relayed() {
        let runner = runner("false", 5, 1024, 2);
        let output = runner.run(ToolKind::Nmap, argv(&[])).await.unwrap();
        assert_eq!(output.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_timeout_kills() {
        let runner = runner("sleep", 1, 1024, 2);
        let start = Instant::now();
        let err = runner.run(ToolKind::Nmap, argv(&["10"])).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(runner.available(), 2);
    }

    #[tokio::test]
    async fn test_busy_when_slots_exhausted() {
        let runner = Arc::new(runner("sleep", 5, 1024, 1));
        let held = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(ToolKind::Nmap, argv(&["1"])).await })
        };
        while runner.available() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = runner.run(ToolKind::Nmap, argv(&["1"])).await.unwrap_err();
        assert!(matches!(err, ToolError::Busy));
        assert!(held.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_spawn_failure_and_disabled() {
        let runner = runner("/nonexistent/sgw-tool", 5, 1024, 2);
        let err = runner.run(ToolKind::Nmap, argv(&[])).await.unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));

        let mut tools = ToolsConfig::default();
        tools.gobuster.enabled = false;
        let err = ToolRunner::new(&tools)
            .run(ToolKind::Gobuster, argv(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Disabled(ToolKind::Gobuster)));
    }
}
