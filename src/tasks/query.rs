//! Query service: the parent agent's read and cleanup surface.
//!
//! Requests arrive as loosely-typed JSON from tools and HTTP handlers. They are
//! parsed into [`TaskOperation`] at the boundary; everything past that point is
//! typed. Failures are returned as `{"success": false, "error": ...}` bodies and
//! never propagate as panics or process errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::model::{TaskRecord, TaskStatus, TaskSummary};
use super::store::TaskStore;
use crate::error::TaskError;

/// A validated request against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOperation {
    ListTasks { status_filter: Option<TaskStatus> },
    GetTask { task_id: String },
    MarkDone { task_id: String, force: bool },
}

/// Wire shape before validation.
#[derive(Debug, Deserialize)]
struct RawOperation {
    operation: Option<String>,
    status_filter: Option<String>,
    task_id: Option<String>,
    #[serde(default)]
    force: bool,
}

impl TaskOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListTasks { .. } => "list_tasks",
            Self::GetTask { .. } => "get_task",
            Self::MarkDone { .. } => "mark_done",
        }
    }

    /// Validate a tool-style JSON request.
    pub fn from_params(params: &Value) -> Result<Self, TaskError> {
        let raw: RawOperation = serde_json::from_value(params.clone())
            .map_err(|e| TaskError::Validation(format!("Invalid request: {e}")))?;

        let operation = raw
            .operation
            .ok_or_else(|| TaskError::Validation("operation is required".to_string()))?;

        let require_id = |op: &str| {
            raw.task_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .ok_or_else(|| TaskError::missing_task_id(op))
        };

        match operation.as_str() {
            "list_tasks" => {
                let status_filter = raw
                    .status_filter
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map(str::parse)
                    .transpose()?;
                Ok(Self::ListTasks { status_filter })
            }
            "get_task" => Ok(Self::GetTask {
                task_id: require_id("get_task")?,
            }),
            "mark_done" => Ok(Self::MarkDone {
                task_id: require_id("mark_done")?,
                force: raw.force,
            }),
            other => Err(TaskError::Validation(format!(
                "Unknown operation '{other}'. Valid operations: list_tasks, get_task, mark_done"
            ))),
        }
    }
}

/// Result of `list_tasks`.
///
/// `count` is the number of entries in `tasks`. The per-status counts are
/// taken over the whole registry and ignore the filter.
#[derive(Debug, Clone, Serialize)]
pub struct TaskListing {
    pub tasks: Vec<TaskSummary>,
    pub count: usize,
    pub running: usize,
    pub completed: usize,
    pub errors: usize,
    pub cancelled: usize,
}

/// Result of `mark_done`.
#[derive(Debug, Clone, Serialize)]
pub struct Removal {
    pub task_id: String,
    pub removed: bool,
    pub message: String,
}

/// Read/cleanup operations over the task store.
pub struct QueryService {
    store: Arc<TaskStore>,
    summary_chars: usize,
}

impl QueryService {
    pub fn new(store: Arc<TaskStore>, summary_chars: usize) -> Self {
        Self {
            store,
            summary_chars,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub async fn list_tasks(&self, status_filter: Option<TaskStatus>) -> TaskListing {
        let (records, counts) = self.store.list_with_counts(status_filter).await;
        let tasks: Vec<TaskSummary> = records
            .iter()
            .map(|r| r.summary(self.summary_chars))
            .collect();

        TaskListing {
            count: tasks.len(),
            tasks,
            running: counts.running,
            completed: counts.completed,
            errors: counts.errors,
            cancelled: counts.cancelled,
        }
    }

    pub async fn get_task(&self, task_id: &str) -> Result<TaskRecord, TaskError> {
        self.store.get(task_id).await
    }

    /// Remove a finished task. Unknown ids are a `NotFound` error; running
    /// tasks need `force`.
    pub async fn mark_done(&self, task_id: &str, force: bool) -> Result<Removal, TaskError> {
        let record = self.store.remove(task_id, force).await?;
        Ok(Removal {
            task_id: record.task_id,
            removed: true,
            message: format!(
                "Task {task_id} ({}, {}) removed from registry",
                record.agent_name, record.status
            ),
        })
    }

    /// Execute a validated operation and build its success body.
    pub async fn execute(&self, operation: TaskOperation) -> Result<Value, TaskError> {
        let name = operation.name();
        let mut body = match operation {
            TaskOperation::ListTasks { status_filter } => {
                to_body(&self.list_tasks(status_filter).await)
            }
            TaskOperation::GetTask { task_id } => to_body(&self.get_task(&task_id).await?),
            TaskOperation::MarkDone { task_id, force } => {
                to_body(&self.mark_done(&task_id, force).await?)
            }
        };

        if let Some(map) = body.as_object_mut() {
            map.insert("success".to_string(), Value::Bool(true));
            map.insert("operation".to_string(), Value::String(name.to_string()));
        }
        Ok(body)
    }

    /// Full request/response cycle for a JSON request. Never fails.
    pub async fn handle(&self, params: &Value) -> Value {
        let result = match TaskOperation::from_params(params) {
            Ok(op) => {
                debug!(operation = op.name(), "Task query");
                self.execute(op).await
            }
            Err(e) => Err(e),
        };

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Task query rejected");
            failure_body(&e)
        })
    }
}

/// `{"success": false, "error": ..., "task_id"?: ...}`
pub fn failure_body(err: &TaskError) -> Value {
    let mut body = json!({
        "success": false,
        "error": err.to_string(),
    });
    if let Some(id) = err.task_id() {
        body["task_id"] = Value::String(id.to_string());
    }
    body
}

fn to_body<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "serialization_error": e.to_string() }))
}
