//! Task records, statuses, and the text helpers applied to results.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Status of a delegated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Child work is still executing.
    Running,
    /// Child work finished and produced a result.
    Completed,
    /// Child work failed.
    Error,
    /// Child work was cancelled before it finished.
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Error,
        TaskStatus::Cancelled,
    ];

    /// Only `running` may move, and only into a terminal state.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        *self == TaskStatus::Running && target.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                TaskError::Validation(format!(
                    "Invalid status_filter '{s}'. Valid values: running, completed, error, cancelled"
                ))
            })
    }
}

/// How a delegated unit of work ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(String),
    Failed(String),
    Cancelled,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Completed(_) => TaskStatus::Completed,
            Self::Failed(_) => TaskStatus::Error,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }
}

/// A delegated task as tracked by the store.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub agent_name: String,
    pub source_node_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Insertion sequence; breaks `created_at` ties in listings.
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl TaskRecord {
    pub(crate) fn new(
        task_id: String,
        source_node_id: impl Into<String>,
        agent_name: impl Into<String>,
        seq: u64,
    ) -> Self {
        Self {
            task_id,
            agent_name: agent_name.into(),
            source_node_id: source_node_id.into(),
            status: TaskStatus::Running,
            result: None,
            error: None,
            active: true,
            created_at: Utc::now(),
            completed_at: None,
            seq,
        }
    }

    /// Apply the terminal outcome. Result and error text are truncated to
    /// `max_result_chars`.
    pub(crate) fn finish(
        &mut self,
        outcome: TaskOutcome,
        max_result_chars: usize,
    ) -> Result<(), TaskError> {
        let target = outcome.status();
        if !self.status.can_transition_to(target) {
            return Err(TaskError::InvalidTransition {
                id: self.task_id.clone(),
                state: self.status,
                target,
            });
        }

        match outcome {
            TaskOutcome::Completed(result) => {
                self.result = Some(truncate_result(&result, max_result_chars));
            }
            TaskOutcome::Failed(error) => {
                self.error = Some(truncate_result(&error, max_result_chars));
            }
            TaskOutcome::Cancelled => {}
        }
        self.status = target;
        self.active = false;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Listing view of this record.
    pub fn summary(&self, summary_chars: usize) -> TaskSummary {
        TaskSummary {
            task_id: self.task_id.clone(),
            status: self.status,
            agent_name: self.agent_name.clone(),
            result_summary: self
                .result
                .as_deref()
                .map(|r| summarize(r, summary_chars)),
            active: self.active,
        }
    }
}

/// Per-task entry of a `list_tasks` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub status: TaskStatus,
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
    pub active: bool,
}

/// Task counts by status over the whole registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub errors: usize,
    pub cancelled: usize,
}

impl TaskCounts {
    pub(crate) fn add(&mut self, status: TaskStatus) {
        self.total += 1;
        match status {
            TaskStatus::Running => self.running += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Error => self.errors += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// Registry change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Created { task_id: String, agent_name: String },
    Finished { task_id: String, status: TaskStatus },
    Removed { task_id: String },
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_result(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => text[..byte_offset].to_string(),
        None => text.to_string(),
    }
}

/// Collapse a result into a single-line preview for listings.
pub fn summarize(text: &str, max_chars: usize) -> String {
    let collapsed: String = text
        .chars()
        .take(max_chars + 50)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.chars().count() > max_chars {
        format!("{}...", truncate_result(&collapsed, max_chars))
    } else {
        collapsed
    }
}
