pub mod agent;
pub mod config;
pub mod plan;
pub mod providers;
pub mod traits;

pub use agent::{
    AgentConfig, AgentError, AgentMode, AgentOrchestrator, AgentRunState, AgentStep, AgentToolCall,
    RunStatus, StepPayload, StepResult, ToolError, ToolRegistry, build_agent_system_prompt,
    parse_model_response,
};
pub use config::*;
pub use plan::*;
pub use providers::*;
pub use traits::*;
