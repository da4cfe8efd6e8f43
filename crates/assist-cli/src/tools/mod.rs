//! Tool framework for the turn loop
//!
//! Tools are named functions from one string argument to a string result.
//! The completion service may ask for one by name; the loop runs it through
//! the [`registry::ToolRegistry`] and feeds the output back.

pub mod builtin;
pub mod registry;

use std::sync::Arc;

use anyhow::Result;
use assist_core::ToolDescriptor;

/// Function backing a tool
pub type ToolFn = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// A registered tool: unique name, description for the model, and handler
#[derive(Clone)]
pub struct ToolSpec {
    name: String,
    description: String,
    handler: ToolFn,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl Fn(&str) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Convert to the descriptor advertised to providers
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }

    pub(crate) fn call(&self, input: &str) -> Result<String> {
        (self.handler)(input)
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}
