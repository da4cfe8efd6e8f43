//! Built-in tools

use assist_core::AgentResult;
use chrono::Local;

use super::registry::ToolRegistry;
use super::ToolSpec;

/// The closed set of tools shipped with the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTool {
    GetCurrentTime,
    SayHello,
}

impl BuiltinTool {
    pub const ALL: [BuiltinTool; 2] = [BuiltinTool::GetCurrentTime, BuiltinTool::SayHello];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinTool::GetCurrentTime => "get_current_time",
            BuiltinTool::SayHello => "say_hello",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            BuiltinTool::GetCurrentTime => "Returns the current date and time. No input required.",
            BuiltinTool::SayHello => "Greets the user by name. Input should be the user's name.",
        }
    }

    /// Run the tool. Built-ins are pure and never fail.
    pub fn run(self, input: &str) -> String {
        match self {
            BuiltinTool::GetCurrentTime => current_time(),
            BuiltinTool::SayHello => say_hello(input),
        }
    }

    pub fn spec(self) -> ToolSpec {
        ToolSpec::new(self.name(), self.description(), move |input| Ok(self.run(input)))
    }
}

/// Local wall-clock time as `YYYY-MM-DD HH:MM:SS`
pub fn current_time() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// An empty name still yields a greeting, just with an empty slot
pub fn say_hello(name: &str) -> String {
    format!("Hello, {}! How can I help you today?", name)
}

/// Create a registry with all built-in tools
pub fn default_registry() -> AgentResult<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    for tool in BuiltinTool::ALL {
        registry.register(tool.spec())?;
    }

    Ok(registry)
}
