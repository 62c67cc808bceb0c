//! `delegate_to_agent` tool: hands a task to a child agent and returns at once.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::agents::AgentDirectory;
use crate::context::CallContext;
use crate::error::WorkError;
use crate::tasks::Dispatcher;
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

/// Starts a child agent in the background and returns its task id.
///
/// The parent polls the outcome with `task_manager`.
pub struct DelegateTool {
    dispatcher: Arc<Dispatcher>,
    agents: Arc<AgentDirectory>,
}

impl DelegateTool {
    pub fn new(dispatcher: Arc<Dispatcher>, agents: Arc<AgentDirectory>) -> Self {
        Self { dispatcher, agents }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate_to_agent"
    }

    fn description(&self) -> &str {
        "Delegate a task to another agent. Returns immediately with a task_id while the \
         agent works in the background. Use task_manager to check on the task later."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agent_name": {
                    "type": "string",
                    "description": "Name of the agent to delegate to"
                },
                "task": {
                    "type": "string",
                    "description": "Instructions for the agent"
                }
            },
            "required": ["agent_name", "task"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &CallContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let agent_name = require_str(&params, "agent_name")?;
        let task = require_str(&params, "task")?.to_string();

        let agent = match self.agents.get(agent_name).await {
            Ok(agent) => agent,
            Err(e) => {
                let result = serde_json::json!({
                    "success": false,
                    "error": e.to_string(),
                    "available": self.agents.names().await,
                });
                return Ok(ToolOutput::success(result, start.elapsed()));
            }
        };

        let work = {
            let agent = Arc::clone(&agent);
            async move { agent.run(&task).await.map_err(WorkError::from) }
        };

        let result = match self
            .dispatcher
            .delegate(&ctx.node_id, agent.name(), work)
            .await
        {
            Ok(task_id) => serde_json::json!({
                "success": true,
                "task_id": task_id,
                "agent_name": agent.name(),
                "status": "running",
                "message": format!(
                    "Task delegated to {}. Use task_manager with get_task to check on it.",
                    agent.name()
                ),
            }),
            Err(e) => {
                tracing::warn!(
                    call_id = %ctx.call_id,
                    agent = %agent_name,
                    error = %e,
                    "Delegation refused"
                );
                serde_json::json!({
                    "success": false,
                    "error": e.to_string(),
                })
            }
        };

        Ok(ToolOutput::success(result, start.elapsed()))
    }
}
