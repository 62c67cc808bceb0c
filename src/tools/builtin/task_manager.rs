//! `task_manager` tool: lets a parent agent poll and clean up its delegated tasks.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::tasks::QueryService;
use crate::tools::tool::{Tool, ToolError, ToolOutput};

/// Exposes `list_tasks`, `get_task` and `mark_done` over the task registry.
///
/// Failures (unknown id, missing field, running task) come back as a
/// `{"success": false, ...}` result rather than a tool error, so the calling
/// agent can read them like any other answer.
pub struct TaskManagerTool {
    service: Arc<QueryService>,
}

impl TaskManagerTool {
    pub fn new(service: Arc<QueryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for TaskManagerTool {
    fn name(&self) -> &str {
        "task_manager"
    }

    fn description(&self) -> &str {
        "Check on tasks you delegated to other agents. Use list_tasks to see all tasks \
         and their status, get_task to read a task's full result or error, and mark_done \
         to remove a finished task once you have used its result."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["list_tasks", "get_task", "mark_done"],
                    "description": "What to do"
                },
                "status_filter": {
                    "type": "string",
                    "enum": ["running", "completed", "error", "cancelled"],
                    "description": "Only list tasks in this state (list_tasks only)"
                },
                "task_id": {
                    "type": "string",
                    "description": "Task to inspect or remove (get_task and mark_done)"
                },
                "force": {
                    "type": "boolean",
                    "description": "Remove the task even if it is still running (mark_done only, default false)"
                }
            },
            "required": ["operation"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &CallContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let result = self.service.handle(&params).await;
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}
