use crate::traits::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shape of a tool as advertised to the model. The schema is opaque to the
/// core: it is passed through to the prompt and to the executor, never
/// validated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl AgentToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Execution context handed to a tool: the conversation so far and the id
/// of the tool_call step this invocation answers.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub messages: Vec<ChatMessage>,
    pub tool_call_id: String,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(&self, arguments: Value, context: ToolContext) -> anyhow::Result<Value>;
}

/// Backend for tools registered under the `mcp_` prefix. Wired into the
/// registry after construction; absent by default.
#[async_trait]
pub trait McpDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        tool_name: &str,
        arguments: Value,
        context: ToolContext,
    ) -> anyhow::Result<Value>;
}
