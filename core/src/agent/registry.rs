use crate::agent::errors::ToolError;
use crate::traits::{AgentToolDescriptor, McpDispatcher, ToolContext, ToolHandler};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Tools whose execution is delegated to an external MCP backend carry
/// this name prefix.
pub const MCP_TOOL_PREFIX: &str = "mcp_";

struct ToolEntry {
    descriptor: AgentToolDescriptor,
    handler: Option<Arc<dyn ToolHandler>>,
}

/// Process-wide catalogue of invocable tools, keyed by name in insertion
/// order. Constructed once at startup and shared across orchestrators as
/// an `Arc`; registration is synchronized and lookups observe a fully
/// registered snapshot.
pub struct ToolRegistry {
    entries: Mutex<Vec<ToolEntry>>,
    mcp: Mutex<Option<Arc<dyn McpDispatcher>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// A registry pre-seeded with the built-in workspace descriptors. The
    /// built-ins are placeholders: the registry knows their shape but not
    /// how to run them.
    pub fn new() -> Self {
        let registry = Self {
            entries: Mutex::new(Vec::new()),
            mcp: Mutex::new(None),
        };
        for descriptor in builtin_descriptors() {
            registry.insert(descriptor, None);
        }
        registry
    }

    /// Registers a descriptor without an executor. Re-registering a name is
    /// a silent no-op; the catalogue never grows from duplicates.
    pub fn register_tool(&self, descriptor: AgentToolDescriptor) {
        self.insert(descriptor, None);
    }

    pub fn register_tool_with_handler(
        &self,
        descriptor: AgentToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) {
        self.insert(descriptor, Some(handler));
    }

    pub fn set_mcp_dispatcher(&self, dispatcher: Arc<dyn McpDispatcher>) {
        *self.mcp.lock().unwrap() = Some(dispatcher);
    }

    /// Snapshot of all registered descriptors, insertion order.
    pub fn descriptors(&self) -> Vec<AgentToolDescriptor> {
        let entries = self.entries.lock().unwrap();
        entries.iter().map(|e| e.descriptor.clone()).collect()
    }

    pub async fn execute_tool(
        &self,
        name: &str,
        arguments: Value,
        context: ToolContext,
    ) -> Result<Value, ToolError> {
        let handler = {
            let entries = self.entries.lock().unwrap();
            let Some(entry) = entries.iter().find(|e| e.descriptor.name == name) else {
                warn!(tool = %name, "Unknown tool requested");
                return Err(ToolError::NotFound(name.to_string()));
            };
            entry.handler.clone()
        };

        if let Some(handler) = handler {
            debug!(tool = %name, "Dispatching to registered handler");
            return handler.execute(arguments, context).await.map_err(Into::into);
        }

        if name.starts_with(MCP_TOOL_PREFIX) {
            let dispatcher = self.mcp.lock().unwrap().clone();
            return match dispatcher {
                Some(dispatcher) => {
                    debug!(tool = %name, "Dispatching via MCP backend");
                    dispatcher
                        .dispatch(name, arguments, context)
                        .await
                        .map_err(Into::into)
                }
                // Externally backed by convention; resolve with an empty
                // result until a backend is wired.
                None => Ok(json!({})),
            };
        }

        Err(ToolError::NotImplemented(name.to_string()))
    }

    fn insert(&self, descriptor: AgentToolDescriptor, handler: Option<Arc<dyn ToolHandler>>) {
        let mut entries = self.entries.lock().unwrap();
        if entries.iter().any(|e| e.descriptor.name == descriptor.name) {
            debug!(tool = %descriptor.name, "Tool already registered, ignoring");
            return;
        }
        entries.push(ToolEntry {
            descriptor,
            handler,
        });
    }
}

fn builtin_descriptors() -> Vec<AgentToolDescriptor> {
    vec![
        AgentToolDescriptor::new(
            "read_file",
            "Read file contents",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path to the file to read"},
                    "maxLines": {"type": "number", "description": "Optional line cap"}
                },
                "required": ["path"]
            }),
        ),
        AgentToolDescriptor::new(
            "list_files",
            "List directory files",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory to list"}
                },
                "required": ["path"]
            }),
        ),
    ]
}
