//! Tool registry for managing available tools

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use assist_core::{AgentError, AgentResult, ToolDescriptor};
use tracing::{debug, instrument, warn};

use super::ToolSpec;

/// Registry of available tools, in registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, spec: ToolSpec) -> AgentResult<()> {
        if self.index.contains_key(spec.name()) {
            return Err(AgentError::DuplicateName(spec.name().to_string()));
        }

        self.index.insert(spec.name().to_string(), self.tools.len());
        self.tools.push(spec);
        Ok(())
    }

    /// Look up a tool by name
    pub fn resolve(&self, name: &str) -> AgentResult<&ToolSpec> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| AgentError::NotFound(name.to_string()))
    }

    /// Run a tool, wrapping any fault (including a panic) as a tool error
    #[instrument(skip(self, input), fields(input_len = input.len()))]
    pub fn invoke(&self, name: &str, input: &str) -> AgentResult<String> {
        let spec = self.resolve(name)?;

        match catch_unwind(AssertUnwindSafe(|| spec.call(input))) {
            Ok(Ok(output)) => {
                debug!(output_len = output.len(), "Tool executed successfully");
                Ok(output)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Tool execution failed");
                Err(AgentError::ToolExecution {
                    tool: name.to_string(),
                    message: format!("{:#}", e),
                })
            }
            Err(_) => {
                warn!("Tool panicked");
                Err(AgentError::ToolExecution {
                    tool: name.to_string(),
                    message: "tool panicked".to_string(),
                })
            }
        }
    }

    /// List all registered tool names
    pub fn list_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Get tool descriptors for the completion request
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    /// Render `- name: description` lines for the system prompt
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_names())
            .finish()
    }
}
