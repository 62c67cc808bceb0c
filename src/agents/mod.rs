//! Child agents that delegated tasks are handed to.
//!
//! A child agent takes a free-text task and eventually yields result text.
//! The [`AgentDirectory`] is the set of agents a parent may delegate to by name.

pub mod shell;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AgentError;

pub use shell::ShellAgent;

/// An agent that can run a delegated task to completion.
#[async_trait]
pub trait ChildAgent: Send + Sync {
    /// Display name, also the key parents delegate by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Run `task` and return its result text.
    async fn run(&self, task: &str) -> Result<String, AgentError>;
}

/// Named child agents available for delegation.
pub struct AgentDirectory {
    agents: RwLock<HashMap<String, Arc<dyn ChildAgent>>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Register an agent under its own name, replacing any previous one.
    pub async fn register(&self, agent: Arc<dyn ChildAgent>) {
        let name = agent.name().to_string();
        if self
            .agents
            .write()
            .await
            .insert(name.clone(), agent)
            .is_some()
        {
            tracing::warn!(agent = %name, "Replaced existing child agent");
        } else {
            tracing::debug!("Registered child agent: {}", name);
        }
    }

    pub async fn get(&self, name: &str) -> Result<Arc<dyn ChildAgent>, AgentError> {
        self.agents
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::NotFound {
                name: name.to_string(),
            })
    }

    /// Sorted agent names.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}

impl Default for AgentDirectory {
    fn default() -> Self {
        Self::new()
    }
}
