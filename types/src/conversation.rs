use serde::{Deserialize, Serialize};

use crate::{ConversationId, ToolName};

/// The slice of a saved conversation that the orchestrator reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    /// Tools the operator chose to always allow in this conversation.
    #[serde(default)]
    pub allowed_tools: Vec<ToolName>,
}

impl ConversationRecord {
    #[must_use]
    pub fn new(id: ConversationId) -> Self {
        Self {
            id,
            allowed_tools: Vec::new(),
        }
    }
}
