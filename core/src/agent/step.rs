use crate::traits::{AgentToolDescriptor, UsageCounters};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const DEFAULT_MAX_STEPS: usize = 20;

/// Reasoning strategy label embedded in the system prompt. The loop itself
/// does not interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    PlanAct,
    React,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::PlanAct => "plan_act",
            AgentMode::React => "react",
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable per-run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub mode: AgentMode,
    pub max_steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Tools advertised to the model this run, in order.
    pub tools: Vec<AgentToolDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub stream_steps: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: AgentMode::PlanAct,
            max_steps: DEFAULT_MAX_STEPS,
            max_tokens_per_step: None,
            temperature: None,
            tools: vec![],
            timeout_ms: None,
            stream_steps: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentToolCall {
    pub tool_name: String,
    pub arguments: Value,
}

/// Exactly one payload variant is active per step, decided once at parse
/// time and never inferred from field presence downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPayload {
    Thought {
        #[serde(skip_serializing_if = "Option::is_none")]
        thought: Option<String>,
    },
    ToolCall {
        #[serde(skip_serializing_if = "Option::is_none")]
        thought: Option<String>,
        tool_call: AgentToolCall,
    },
    Observation {
        tool_name: String,
        tool_call_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
    Final {
        #[serde(skip_serializing_if = "Option::is_none")]
        thought: Option<String>,
        final_answer: String,
    },
}

impl StepPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            StepPayload::Thought { .. } => "thought",
            StepPayload::ToolCall { .. } => "tool_call",
            StepPayload::Observation { .. } => "observation",
            StepPayload::Final { .. } => "final",
        }
    }
}

/// One atomic unit of agent output. `step_index` is 0-based and strictly
/// increasing within a run; a run contains at most one `final` step and it
/// is always the last one emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    pub step_index: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: StepPayload,
    /// Non-fatal annotation (parse failure, tool failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Diagnostic copy of the model text this step was parsed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_model_output: Option<String>,
}

impl AgentStep {
    pub fn new(step_index: usize, payload: StepPayload) -> Self {
        Self {
            step_index,
            timestamp: Utc::now(),
            payload,
            error: None,
            raw_model_output: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        self.raw_model_output = Some(raw.into());
        self
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    pub fn is_final(&self) -> bool {
        matches!(self.payload, StepPayload::Final { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// State of one run, owned by exactly one orchestrator instance and
/// mutated only by that instance's loop. Superseded when a new run starts.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRunState {
    pub id: String,
    pub config: AgentConfig,
    pub steps: Vec<AgentStep>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub usage: UsageCounters,
}

impl AgentRunState {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            steps: Vec::new(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            usage: UsageCounters::default(),
        }
    }
}
