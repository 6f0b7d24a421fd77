//! Consumer-owned planning artifact. The orchestrator only emits steps;
//! creating a plan and updating todos as results land is the caller's
//! bookkeeping, never the loop's.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTodo {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TodoStatus,
    pub priority: TodoPriority,
    /// Parent todo id; must reference an existing todo in the same plan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentTodo {
    pub fn new(id: impl Into<String>, title: impl Into<String>, priority: TodoPriority) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: TodoStatus::Pending,
            priority,
            parent_id: None,
            results: None,
            retry_count: None,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPlan {
    pub todos: Vec<AgentTodo>,
    pub estimated_steps: usize,
    pub strategy: String,
    pub created_at: DateTime<Utc>,
}

impl AgentPlan {
    pub fn new(strategy: impl Into<String>, estimated_steps: usize) -> Self {
        Self {
            todos: Vec::new(),
            estimated_steps,
            strategy: strategy.into(),
            created_at: Utc::now(),
        }
    }

    pub fn todo(&self, id: &str) -> Option<&AgentTodo> {
        self.todos.iter().find(|t| t.id == id)
    }

    pub fn count_with_status(&self, status: TodoStatus) -> usize {
        self.todos.iter().filter(|t| t.status == status).count()
    }

    /// Completed share of the plan, rounded to whole percent. Empty plans
    /// report 0.
    pub fn progress_percent(&self) -> u8 {
        let total = self.todos.len();
        if total == 0 {
            return 0;
        }
        let completed = self.count_with_status(TodoStatus::Completed);
        ((completed as f64 / total as f64) * 100.0).round() as u8
    }

    /// Checks the parent-forest invariant: every `parent_id` references a
    /// todo that exists in this plan.
    pub fn validate(&self) -> Result<()> {
        for todo in &self.todos {
            if let Some(parent_id) = &todo.parent_id {
                if self.todo(parent_id).is_none() {
                    bail!(
                        "todo \"{}\" references missing parent \"{}\"",
                        todo.id,
                        parent_id
                    );
                }
            }
        }
        Ok(())
    }
}
