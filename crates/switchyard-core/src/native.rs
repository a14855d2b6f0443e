//! Native provider: the built-in Claude reached without any proxying.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;

use crate::{CoreError, CoreResult};

/// Name reported for completions served natively.
pub const NATIVE_PROVIDER: &str = "claude";

const DEFAULT_NATIVE_TIMEOUT: Duration = Duration::from_secs(600);

/// Given prompt text, returns completion text.
#[async_trait]
pub trait NativeProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> CoreResult<String>;
}

/// Runs `claude -p <prompt>` and returns its stdout.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    program: String,
    timeout: Duration,
}

impl Default for ClaudeCli {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            timeout: DEFAULT_NATIVE_TIMEOUT,
        }
    }
}

impl ClaudeCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl NativeProvider for ClaudeCli {
    async fn complete(&self, prompt: &str) -> CoreResult<String> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg("-p")
            .arg(prompt)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| CoreError::Native(format!("failed to start {}: {}", self.program, e)))?;

        match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                Err(CoreError::Native(format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status.code().unwrap_or(-1),
                    stderr
                )))
            }
            Ok(Err(e)) => Err(CoreError::Native(format!("failed to run {}: {}", self.program, e))),
            Err(_) => Err(CoreError::Native(format!(
                "{} timed out after {}s",
                self.program,
                self.timeout.as_secs()
            ))),
        }
    }
}
