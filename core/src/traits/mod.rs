pub mod provider;
pub mod tool;

pub use provider::{ChatMessage, ModelCaller, ModelRequest, ModelResponse, UsageCounters};
pub use tool::{AgentToolDescriptor, McpDispatcher, ToolContext, ToolHandler};
