pub mod errors;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod registry;
pub mod step;

pub use errors::{AgentError, ToolError};
pub use orchestrator::{AgentOrchestrator, StepResult};
pub use parser::parse_model_response;
pub use prompt::build_agent_system_prompt;
pub use registry::{MCP_TOOL_PREFIX, ToolRegistry};
pub use step::{
    AgentConfig, AgentMode, AgentRunState, AgentStep, AgentToolCall, RunStatus, StepPayload,
};
