use crate::agent::step::AgentMode;
use crate::traits::AgentToolDescriptor;
use std::fmt::Write;

/// Builds the instruction block sent as the system message. Pure function
/// of the mode and tool list; compiles to usable instructions even with no
/// tools (the agent can still reason and answer).
pub fn build_agent_system_prompt(mode: AgentMode, tools: &[AgentToolDescriptor]) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are an autonomous agent operating in `{}` mode.",
        mode
    );
    match mode {
        AgentMode::PlanAct => {
            prompt.push_str(
                "Work out a short plan first, then execute it one action at a time, \
                 revising the plan as observations come in.\n",
            );
        }
        AgentMode::React => {
            prompt.push_str(
                "Interleave reasoning with actions: think about what you learned so \
                 far, act, observe, and repeat.\n",
            );
        }
    }

    prompt.push_str("\n## Response Protocol\n\n");
    prompt.push_str(
        "Every response MUST be a single JSON object and nothing else. \
         Recognized fields:\n\n",
    );
    prompt.push_str("- `thought` (optional string): your reasoning for this step.\n");
    prompt.push_str(
        "- `tool_call` (optional object): `{\"toolName\": \"...\", \"arguments\": {...}}` \
         to invoke one tool.\n",
    );
    prompt.push_str(
        "- `final_answer` (optional string): your complete answer, ending the session.\n\n",
    );
    prompt.push_str(
        "Use exactly one of `tool_call` or `final_answer` per response. A response \
         with only `thought` continues the session without acting.\n\n",
    );
    prompt.push_str("Example:\n");
    prompt.push_str(
        "{\"thought\": \"I should inspect the entry point\", \
         \"tool_call\": {\"toolName\": \"read_file\", \"arguments\": {\"path\": \"src/main.rs\"}}}\n",
    );

    if !tools.is_empty() {
        prompt.push_str("\n## Available Tools\n\n");
        for tool in tools {
            let _ = writeln!(
                prompt,
                "**{}**: {}\nInput schema: `{}`\n",
                tool.name, tool.description, tool.input_schema
            );
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_lists_tools_mode_and_protocol() {
        let tools = vec![
            AgentToolDescriptor::new("read_file", "Read file contents", json!({})),
            AgentToolDescriptor::new("list_files", "List directory files", json!({})),
        ];

        let prompt = build_agent_system_prompt(AgentMode::PlanAct, &tools);

        assert!(prompt.contains("read_file"));
        assert!(prompt.contains("list_files"));
        assert!(prompt.contains("plan_act"));
        assert!(prompt.contains("JSON"));
    }

    #[test]
    fn prompt_compiles_with_no_tools() {
        let prompt = build_agent_system_prompt(AgentMode::React, &[]);

        assert!(!prompt.is_empty());
        assert!(prompt.contains("react"));
        assert!(!prompt.contains("## Available Tools"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let tools = vec![AgentToolDescriptor::new("echo", "Echo input", json!({}))];
        let a = build_agent_system_prompt(AgentMode::PlanAct, &tools);
        let b = build_agent_system_prompt(AgentMode::PlanAct, &tools);
        assert_eq!(a, b);
    }
}
