use crate::agent::step::{AgentStep, AgentToolCall, StepPayload};
use serde_json::Value;

/// Turns raw model text into a step. Total: every input produces a step,
/// parse problems degrade to an annotated thought rather than an error.
pub fn parse_model_response(text: &str, step_index: usize) -> AgentStep {
    let map = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            return AgentStep::new(
                step_index,
                StepPayload::Thought {
                    thought: Some(text.to_string()),
                },
            )
            .with_error("Failed to parse response as a JSON object")
            .with_raw_output(text);
        }
    };

    let thought = map
        .get("thought")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(final_answer) = map.get("final_answer").and_then(Value::as_str) {
        return AgentStep::new(
            step_index,
            StepPayload::Final {
                thought,
                final_answer: final_answer.to_string(),
            },
        );
    }

    if let Some(call) = map.get("tool_call").and_then(Value::as_object) {
        if let Some(tool_name) = call.get("toolName").and_then(Value::as_str) {
            let arguments = call
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            return AgentStep::new(
                step_index,
                StepPayload::ToolCall {
                    thought,
                    tool_call: AgentToolCall {
                        tool_name: tool_name.to_string(),
                        arguments,
                    },
                },
            );
        }

        // A tool_call without a toolName is unusable; keep the turn as a
        // thought so the loop can recover.
        return AgentStep::new(step_index, StepPayload::Thought { thought })
            .with_error("tool_call object is missing toolName")
            .with_raw_output(text);
    }

    AgentStep::new(step_index, StepPayload::Thought { thought }).with_raw_output(text)
}
