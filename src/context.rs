//! Call context: who is invoking a tool.

use uuid::Uuid;

/// Context for a single tool invocation.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Unique id of this call.
    pub call_id: Uuid,
    /// Workflow node issuing the call; prefixes ids of tasks it delegates.
    pub node_id: String,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new("main")
    }
}

impl CallContext {
    /// Create a context for a call issued by `node_id`.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            node_id: node_id.into(),
        }
    }
}
