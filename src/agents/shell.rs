//! Shell agent: runs the delegated task text as a shell command.
//!
//! - Working directory isolation
//! - Timeout enforcement (the child process is killed on expiry)
//! - Output capture and truncation
//! - Blocked command patterns

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::ChildAgent;
use crate::error::AgentError;

/// Maximum captured output before truncation (64KB).
const MAX_OUTPUT_SIZE: usize = 64 * 1024;

/// Default command timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Commands that are always refused.
static BLOCKED_COMMANDS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec![
        "rm -rf /",
        "rm -rf /*",
        ":(){ :|:& };:",
        "dd if=/dev/zero",
        "mkfs",
        "chmod -r 777 /",
        "> /dev/sda",
        "curl | sh",
        "wget | sh",
        "curl | bash",
        "wget | bash",
    ]
});

/// Refused unless the agent was built with `allow_dangerous`.
static DANGEROUS_PATTERNS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec![
        "sudo ",
        "doas ",
        " | sh",
        " | bash",
        " | zsh",
        "eval ",
        "$(curl",
        "$(wget",
        "/etc/shadow",
        "~/.ssh",
        "id_rsa",
    ]
});

/// Child agent backed by `sh -c`.
#[derive(Debug)]
pub struct ShellAgent {
    name: String,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    allow_dangerous: bool,
}

impl ShellAgent {
    pub fn new() -> Self {
        Self {
            name: "Shell Agent".to_string(),
            working_dir: None,
            timeout: DEFAULT_TIMEOUT,
            allow_dangerous: false,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn allow_dangerous(mut self, allow: bool) -> Self {
        self.allow_dangerous = allow;
        self
    }

    fn is_blocked(&self, cmd: &str) -> Option<&'static str> {
        let normalized = cmd.to_lowercase();

        if BLOCKED_COMMANDS.iter().any(|b| normalized.contains(b)) {
            return Some("Command contains blocked pattern");
        }
        if !self.allow_dangerous && DANGEROUS_PATTERNS.iter().any(|p| normalized.contains(p)) {
            return Some("Command contains potentially dangerous pattern");
        }
        None
    }

    async fn execute(&self, cmd: &str) -> Result<(String, i32), AgentError> {
        let mut command = Command::new("sh");
        command
            .args(["-c", cmd])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| AgentError::ExecutionFailed {
            name: self.name.clone(),
            reason: format!("Failed to spawn command: {e}"),
        })?;

        // Dropping the timed-out future drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AgentError::Timeout {
                name: self.name.clone(),
                timeout: self.timeout,
            })?
            .map_err(|e| AgentError::ExecutionFailed {
                name: self.name.clone(),
                reason: format!("Command execution failed: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = if stderr.is_empty() {
            stdout.into_owned()
        } else if stdout.is_empty() {
            stderr.into_owned()
        } else {
            format!("{stdout}\n\n--- stderr ---\n{stderr}")
        };

        Ok((truncate_output(&combined), output.status.code().unwrap_or(-1)))
    }
}

impl Default for ShellAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChildAgent for ShellAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Runs the task as a shell command and returns its captured output."
    }

    async fn run(&self, task: &str) -> Result<String, AgentError> {
        if let Some(reason) = self.is_blocked(task) {
            tracing::warn!(agent = %self.name, "Refused shell task");
            return Err(AgentError::Refused {
                name: self.name.clone(),
                reason: format!("{}: {}", reason, truncate_for_error(task)),
            });
        }

        let (output, code) = self.execute(task).await?;
        tracing::debug!(agent = %self.name, exit_code = code, "Shell task finished");
        if code == 0 {
            Ok(output)
        } else {
            Err(AgentError::ExecutionFailed {
                name: self.name.clone(),
                reason: format!("exit code {code}: {}", output.trim_end()),
            })
        }
    }
}

/// Keep head and tail of oversized output (UTF-8 safe).
fn truncate_output(s: &str) -> String {
    if s.len() <= MAX_OUTPUT_SIZE {
        return s.to_string();
    }
    let half = MAX_OUTPUT_SIZE / 2;
    let head_end = floor_char_boundary(s, half);
    let tail_start = floor_char_boundary(s, s.len() - half);
    format!(
        "{}\n\n... [truncated {} bytes] ...\n\n{}",
        &s[..head_end],
        tail_start - head_end,
        &s[tail_start..]
    )
}

fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn truncate_for_error(s: &str) -> String {
    if s.chars().count() <= 100 {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(100).collect::<String>())
    }
}
