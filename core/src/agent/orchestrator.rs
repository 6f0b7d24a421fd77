use crate::agent::errors::AgentError;
use crate::agent::parser::parse_model_response;
use crate::agent::prompt::build_agent_system_prompt;
use crate::agent::registry::ToolRegistry;
use crate::agent::step::{AgentConfig, AgentRunState, AgentStep, RunStatus, StepPayload};
use crate::traits::{ChatMessage, ModelCaller, ModelRequest, ToolContext, UsageCounters};
use chrono::Utc;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STEP_CHANNEL_CAPACITY: usize = 16;

pub type StepResult = Result<AgentStep, AgentError>;

/// Drives one bounded, cancellable agent session at a time and streams its
/// steps over a bounded channel, strictly in `step_index` order. Starting a
/// new run supersedes (and cancels) any run still in flight.
pub struct AgentOrchestrator {
    model: Arc<dyn ModelCaller>,
    registry: Arc<ToolRegistry>,
    run_state: Arc<Mutex<Option<AgentRunState>>>,
    cancel: Mutex<CancellationToken>,
}

impl AgentOrchestrator {
    pub fn new(model: Arc<dyn ModelCaller>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            registry,
            run_state: Arc::new(Mutex::new(None)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Starts a run and returns its step stream. The final message history
    /// entry is expected to be the user request; observations are appended
    /// to the history fed back into each subsequent model call.
    pub fn run(
        &self,
        config: AgentConfig,
        history: Vec<ChatMessage>,
    ) -> ReceiverStream<StepResult> {
        let token = CancellationToken::new();
        {
            let mut current = self.cancel.lock().unwrap();
            // Supersede any run still in flight.
            current.cancel();
            *current = token.clone();
        }

        let state = AgentRunState::new(config.clone());
        let run_id = state.id.clone();
        info!(run_id = %run_id, mode = %config.mode, max_steps = config.max_steps, "Agent run started");
        *self.run_state.lock().unwrap() = Some(state);

        let (tx, rx) = mpsc::channel(STEP_CHANNEL_CAPACITY);
        let driver = RunDriver {
            model: self.model.clone(),
            registry: self.registry.clone(),
            run_state: self.run_state.clone(),
            run_id,
            token,
        };
        tokio::spawn(async move {
            driver.drive(config, history, tx).await;
        });

        ReceiverStream::new(rx)
    }

    /// Idempotent and synchronous; a no-op when no run is active. The loop
    /// observes the token at the top of each iteration and at both
    /// suspension points; an in-flight call is not preempted, its result
    /// is discarded once observed.
    pub fn cancel(&self) {
        self.cancel.lock().unwrap().cancel();

        let mut guard = self.run_state.lock().unwrap();
        if let Some(state) = guard.as_mut() {
            if state.status == RunStatus::Running {
                state.status = RunStatus::Cancelled;
                state.finished_at = Some(Utc::now());
                info!(run_id = %state.id, "Run cancelled");
            }
        }
    }

    /// Snapshot of the current run; `None` until the first run ever starts.
    pub fn run_state(&self) -> Option<AgentRunState> {
        self.run_state.lock().unwrap().clone()
    }
}

/// Everything the spawned loop task needs. Writes to the shared run state
/// are guarded by run id so a superseded loop cannot touch its successor's
/// state.
struct RunDriver {
    model: Arc<dyn ModelCaller>,
    registry: Arc<ToolRegistry>,
    run_state: Arc<Mutex<Option<AgentRunState>>>,
    run_id: String,
    token: CancellationToken,
}

impl RunDriver {
    async fn drive(self, config: AgentConfig, history: Vec<ChatMessage>, tx: mpsc::Sender<StepResult>) {
        match self.run_loop(&config, history, &tx).await {
            Ok(()) => {}
            Err(AgentError::Cancelled) => self.finish(RunStatus::Cancelled),
            Err(err) => {
                warn!(run_id = %self.run_id, error = %err, "Run failed");
                self.finish(RunStatus::Failed);
                let _ = tx.send(Err(err)).await;
            }
        }
    }

    async fn run_loop(
        &self,
        config: &AgentConfig,
        history: Vec<ChatMessage>,
        tx: &mpsc::Sender<StepResult>,
    ) -> Result<(), AgentError> {
        let timeout_ms = config.timeout_ms;
        let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(build_agent_system_prompt(
            config.mode,
            &config.tools,
        )));
        messages.extend(history);

        let mut step_index = 0usize;

        loop {
            if self.token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if deadline.is_some_and(|dl| Instant::now() >= dl) {
                return Err(AgentError::TimeoutExceeded {
                    timeout_ms: timeout_ms.unwrap_or_default(),
                });
            }
            if step_index >= config.max_steps {
                warn!(run_id = %self.run_id, max_steps = config.max_steps, "Run hit step limit");
                let step = AgentStep::new(
                    step_index,
                    StepPayload::Final {
                        thought: None,
                        final_answer: String::new(),
                    },
                )
                .with_error(format!(
                    "Step limit exceeded: run reached the configured maximum of {} steps",
                    config.max_steps
                ));
                self.record_step(&step);
                if tx.send(Ok(step)).await.is_err() {
                    return Err(AgentError::Cancelled);
                }
                self.finish(RunStatus::Failed);
                return Ok(());
            }

            let request = ModelRequest {
                messages: &messages,
                temperature: config.temperature,
                max_tokens: config.max_tokens_per_step,
            };
            let response = tokio::select! {
                _ = self.token.cancelled() => return Err(AgentError::Cancelled),
                _ = wait_deadline(deadline) => {
                    return Err(AgentError::TimeoutExceeded {
                        timeout_ms: timeout_ms.unwrap_or_default(),
                    });
                }
                result = self.model.complete(request) => result.map_err(AgentError::ModelCall)?,
            };

            if let Some(usage) = response.usage {
                self.add_usage(usage);
            }

            let step = parse_model_response(&response.text, step_index);
            step_index += 1;
            debug!(run_id = %self.run_id, step_index = step.step_index, kind = step.kind(), "Step parsed");

            messages.push(ChatMessage::assistant(response.text));

            let payload = step.payload.clone();
            let parsed_index = step.step_index;
            self.record_step(&step);
            if tx.send(Ok(step)).await.is_err() {
                return Err(AgentError::Cancelled);
            }

            match payload {
                StepPayload::Final { .. } => {
                    info!(run_id = %self.run_id, steps = step_index, "Run completed with final answer");
                    self.finish(RunStatus::Completed);
                    return Ok(());
                }
                StepPayload::ToolCall { tool_call, .. } => {
                    let tool_call_id = format!("call_{parsed_index}");
                    let context = ToolContext {
                        messages: messages.clone(),
                        tool_call_id: tool_call_id.clone(),
                    };
                    info!(run_id = %self.run_id, tool = %tool_call.tool_name, "Executing requested tool");

                    let result = tokio::select! {
                        _ = self.token.cancelled() => return Err(AgentError::Cancelled),
                        _ = wait_deadline(deadline) => {
                            return Err(AgentError::TimeoutExceeded {
                                timeout_ms: timeout_ms.unwrap_or_default(),
                            });
                        }
                        result = self.registry.execute_tool(
                            &tool_call.tool_name,
                            tool_call.arguments.clone(),
                            context,
                        ) => result,
                    };

                    let (output, error) = match result {
                        Ok(output) => (Some(output), None),
                        Err(err) => {
                            warn!(run_id = %self.run_id, tool = %tool_call.tool_name, error = %err, "Tool execution failed");
                            (None, Some(err.to_string()))
                        }
                    };

                    messages.push(ChatMessage::user(
                        json!({
                            "tool_result": {
                                "toolCallId": &tool_call_id,
                                "tool": &tool_call.tool_name,
                                "output": &output,
                                "error": &error,
                            }
                        })
                        .to_string(),
                    ));

                    let mut observation = AgentStep::new(
                        step_index,
                        StepPayload::Observation {
                            tool_name: tool_call.tool_name.clone(),
                            tool_call_id,
                            output,
                        },
                    );
                    if let Some(error) = error {
                        observation = observation.with_error(error);
                    }
                    step_index += 1;

                    self.record_step(&observation);
                    if tx.send(Ok(observation)).await.is_err() {
                        return Err(AgentError::Cancelled);
                    }
                }
                StepPayload::Thought { .. } | StepPayload::Observation { .. } => {}
            }
        }
    }

    fn with_state(&self, f: impl FnOnce(&mut AgentRunState)) {
        let mut guard = self.run_state.lock().unwrap();
        if let Some(state) = guard.as_mut() {
            if state.id == self.run_id {
                f(state);
            }
        }
    }

    fn record_step(&self, step: &AgentStep) {
        let step = step.clone();
        self.with_state(|state| state.steps.push(step));
    }

    fn add_usage(&self, usage: UsageCounters) {
        self.with_state(|state| state.usage.accumulate(usage));
    }

    fn finish(&self, status: RunStatus) {
        self.with_state(|state| {
            if state.status == RunStatus::Running {
                state.status = status;
                state.finished_at = Some(Utc::now());
            }
        });
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{AgentToolDescriptor, ModelResponse, ToolHandler};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use tokio_stream::StreamExt;

    struct ScriptedCaller {
        responses: Mutex<VecDeque<ModelResponse>>,
    }

    impl ScriptedCaller {
        fn new(texts: &[&str]) -> Self {
            Self {
                responses: Mutex::new(
                    texts
                        .iter()
                        .map(|text| ModelResponse {
                            text: text.to_string(),
                            usage: None,
                        })
                        .collect(),
                ),
            }
        }

        fn from_responses(responses: Vec<ModelResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl ModelCaller for ScriptedCaller {
        async fn complete(&self, _request: ModelRequest<'_>) -> anyhow::Result<ModelResponse> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    struct FailingCaller;

    #[async_trait]
    impl ModelCaller for FailingCaller {
        async fn complete(&self, _request: ModelRequest<'_>) -> anyhow::Result<ModelResponse> {
            anyhow::bail!("missing API credentials")
        }
    }

    struct StalledCaller;

    #[async_trait]
    impl ModelCaller for StalledCaller {
        async fn complete(&self, _request: ModelRequest<'_>) -> anyhow::Result<ModelResponse> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn execute(&self, arguments: Value, _context: ToolContext) -> anyhow::Result<Value> {
            Ok(json!({"echo": arguments}))
        }
    }

    fn orchestrator(model: Arc<dyn ModelCaller>) -> AgentOrchestrator {
        AgentOrchestrator::new(model, Arc::new(ToolRegistry::new()))
    }

    fn config(max_steps: usize) -> AgentConfig {
        AgentConfig {
            max_steps,
            ..AgentConfig::default()
        }
    }

    fn user(prompt: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::user(prompt)]
    }

    async fn collect(
        mut stream: ReceiverStream<StepResult>,
    ) -> Vec<StepResult> {
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        items
    }

    #[test]
    fn run_state_is_none_before_first_run() {
        let orchestrator = orchestrator(Arc::new(FailingCaller));
        assert!(orchestrator.run_state().is_none());
    }

    #[test]
    fn cancel_without_active_run_does_not_panic() {
        let orchestrator = orchestrator(Arc::new(FailingCaller));
        orchestrator.cancel();
        orchestrator.cancel();
    }

    #[tokio::test]
    async fn step_limit_zero_yields_single_terminal_step() {
        let orchestrator = orchestrator(Arc::new(ScriptedCaller::new(&[])));
        let stream = orchestrator.run(config(0), user("do something"));

        let items = collect(stream).await;

        assert_eq!(items.len(), 1);
        let step = items[0].as_ref().unwrap();
        assert!(step.is_final());
        assert!(step.error.as_deref().unwrap().contains("Step limit exceeded"));

        let state = orchestrator.run_state().unwrap();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.finished_at.is_some());
    }

    #[tokio::test]
    async fn final_answer_completes_run() {
        let script = json!({"thought": "done", "final_answer": "forty-two"}).to_string();
        let orchestrator = orchestrator(Arc::new(ScriptedCaller::new(&[&script])));

        let items = collect(orchestrator.run(config(5), user("answer"))).await;

        assert_eq!(items.len(), 1);
        match &items[0].as_ref().unwrap().payload {
            StepPayload::Final { final_answer, .. } => assert_eq!(final_answer, "forty-two"),
            other => panic!("expected final payload, got {:?}", other),
        }
        assert_eq!(orchestrator.run_state().unwrap().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn tool_call_yields_observation_then_continues() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register_tool_with_handler(
            AgentToolDescriptor::new("echo", "Echo input", json!({})),
            Arc::new(EchoHandler),
        );
        let call = json!({
            "thought": "try the tool",
            "tool_call": {"toolName": "echo", "arguments": {"x": 1}}
        })
        .to_string();
        let done = json!({"final_answer": "ok"}).to_string();
        let orchestrator = AgentOrchestrator::new(
            Arc::new(ScriptedCaller::new(&[&call, &done])),
            registry,
        );

        let items = collect(orchestrator.run(config(10), user("go"))).await;
        let steps: Vec<&AgentStep> = items.iter().map(|i| i.as_ref().unwrap()).collect();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].kind(), "tool_call");
        assert_eq!(steps[1].kind(), "observation");
        assert_eq!(steps[2].kind(), "final");
        let indices: Vec<usize> = steps.iter().map(|s| s.step_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        match &steps[1].payload {
            StepPayload::Observation {
                tool_name,
                tool_call_id,
                output,
            } => {
                assert_eq!(tool_name, "echo");
                assert_eq!(tool_call_id, "call_0");
                assert_eq!(output.as_ref().unwrap(), &json!({"echo": {"x": 1}}));
            }
            other => panic!("expected observation payload, got {:?}", other),
        }
        assert_eq!(orchestrator.run_state().unwrap().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn tool_failure_is_recorded_and_loop_continues() {
        let call = json!({
            "tool_call": {"toolName": "read_file", "arguments": {"path": "x"}}
        })
        .to_string();
        let done = json!({"final_answer": "gave up on the file"}).to_string();
        let orchestrator = orchestrator(Arc::new(ScriptedCaller::new(&[&call, &done])));

        let items = collect(orchestrator.run(config(10), user("read x"))).await;
        let steps: Vec<&AgentStep> = items.iter().map(|i| i.as_ref().unwrap()).collect();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].kind(), "observation");
        assert!(
            steps[1]
                .error
                .as_deref()
                .unwrap()
                .contains("execution not implemented")
        );
        assert_eq!(orchestrator.run_state().unwrap().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn parse_failure_is_recoverable() {
        let done = json!({"final_answer": "recovered"}).to_string();
        let orchestrator = orchestrator(Arc::new(ScriptedCaller::new(&["not json", &done])));

        let items = collect(orchestrator.run(config(10), user("hi"))).await;
        let steps: Vec<&AgentStep> = items.iter().map(|i| i.as_ref().unwrap()).collect();

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].kind(), "thought");
        assert!(steps[0].error.is_some());
        assert!(steps[1].is_final());
        assert_eq!(orchestrator.run_state().unwrap().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn model_failure_fails_run_without_synthetic_step() {
        let orchestrator = orchestrator(Arc::new(FailingCaller));

        let items = collect(orchestrator.run(config(5), user("hi"))).await;

        assert_eq!(items.len(), 1);
        match items[0].as_ref().unwrap_err() {
            AgentError::ModelCall(source) => {
                assert!(source.to_string().contains("missing API credentials"));
            }
            other => panic!("expected model call failure, got {:?}", other),
        }
        let state = orchestrator.run_state().unwrap();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.steps.is_empty());
    }

    #[tokio::test]
    async fn timeout_fails_run_with_distinct_error() {
        let orchestrator = orchestrator(Arc::new(StalledCaller));
        let config = AgentConfig {
            timeout_ms: Some(25),
            ..config(5)
        };

        let items = collect(orchestrator.run(config, user("hi"))).await;

        assert_eq!(items.len(), 1);
        match items[0].as_ref().unwrap_err() {
            AgentError::TimeoutExceeded { timeout_ms } => assert_eq!(*timeout_ms, 25),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(orchestrator.run_state().unwrap().status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_marks_active_run_cancelled() {
        let orchestrator = orchestrator(Arc::new(StalledCaller));
        let stream = orchestrator.run(config(5), user("hi"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        orchestrator.cancel();

        let items = collect(stream).await;
        assert!(items.is_empty());

        let state = orchestrator.run_state().unwrap();
        assert_eq!(state.status, RunStatus::Cancelled);
        assert!(state.finished_at.is_some());
    }

    #[tokio::test]
    async fn usage_accumulates_across_steps() {
        let usage = |p, c| UsageCounters {
            prompt_tokens: p,
            completion_tokens: c,
            total_tokens: p + c,
        };
        let caller = ScriptedCaller::from_responses(vec![
            ModelResponse {
                text: json!({"thought": "step one"}).to_string(),
                usage: Some(usage(10, 5)),
            },
            ModelResponse {
                text: json!({"final_answer": "done"}).to_string(),
                usage: Some(usage(20, 7)),
            },
        ]);
        let orchestrator = orchestrator(Arc::new(caller));

        collect(orchestrator.run(config(5), user("hi"))).await;

        let state = orchestrator.run_state().unwrap();
        assert_eq!(state.usage.prompt_tokens, 30);
        assert_eq!(state.usage.completion_tokens, 12);
        assert_eq!(state.usage.total_tokens, 42);
    }

    #[tokio::test]
    async fn new_run_supersedes_previous_state() {
        let done = json!({"final_answer": "first"}).to_string();
        let orchestrator = orchestrator(Arc::new(ScriptedCaller::new(&[&done])));

        collect(orchestrator.run(config(5), user("one"))).await;
        let first_id = orchestrator.run_state().unwrap().id;

        let items = collect(orchestrator.run(config(5), user("two"))).await;
        let state = orchestrator.run_state().unwrap();

        assert_ne!(state.id, first_id);
        // Second script is exhausted, so the new run fails, but on its own
        // state rather than the superseded one.
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
