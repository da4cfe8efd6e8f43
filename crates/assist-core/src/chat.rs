//! Chat data model shared by the store, the turn loop and the providers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "agent" => Ok(Role::Agent),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// One role-tagged utterance. Immutable once appended to a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text, Utc::now())
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, text, Utc::now())
    }
}

/// A named, persisted conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub transcript: Vec<Turn>,
}

impl Session {
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transcript: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.transcript.last().map(|t| t.timestamp)
    }
}

/// A tool invocation requested by the completion service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Registered tool name
    pub name: String,
    /// Single string argument
    pub input: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
        }
    }

    /// Build a call from a JSON argument object.
    ///
    /// Accepts `{"input": "..."}`, a bare string, or any object whose first
    /// string value is taken as the argument (models sometimes rename it).
    pub fn from_json_args(name: impl Into<String>, args: &serde_json::Value) -> Self {
        let input = match args {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(map) => map
                .get("input")
                .and_then(|v| v.as_str())
                .or_else(|| map.values().find_map(|v| v.as_str()))
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };
        Self::new(name, input)
    }
}

/// A tool call paired with the text it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExchange {
    pub call: ToolCall,
    pub output: String,
}

/// Tool metadata advertised to the completion service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
}

impl ToolDescriptor {
    /// JSON schema for the single `input` parameter every tool takes
    pub fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "Tool input text"
                }
            }
        })
    }
}

/// Everything a provider needs to produce the next reply
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub system: String,
    pub tools: Vec<ToolDescriptor>,
    pub transcript: Vec<Turn>,
    /// Tool results gathered during the current user turn
    pub exchanges: Vec<ToolExchange>,
}

/// Provider reply: text, and optionally a request to run a tool first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionResponse {
    pub text: String,
    pub tool_call: Option<ToolCall>,
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_call: None,
        }
    }

    pub fn tool(call: ToolCall) -> Self {
        Self {
            text: String::new(),
            tool_call: Some(call),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_round_trip_str() {
        for role in [Role::User, Role::Agent] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_tool_call_from_json_args() {
        let call = ToolCall::from_json_args("say_hello", &json!({"input": "Aya"}));
        assert_eq!(call.input, "Aya");

        let call = ToolCall::from_json_args("say_hello", &json!({"name": "Aya"}));
        assert_eq!(call.input, "Aya");

        let call = ToolCall::from_json_args("get_current_time", &json!({}));
        assert_eq!(call.input, "");

        let call = ToolCall::from_json_args("say_hello", &json!("Aya"));
        assert_eq!(call.input, "Aya");
    }

    #[test]
    fn test_session_last_timestamp() {
        let mut session = Session::empty("default");
        assert!(session.last_timestamp().is_none());

        let turn = Turn::user("hi");
        let ts = turn.timestamp;
        session.transcript.push(turn);
        assert_eq!(session.last_timestamp(), Some(ts));
        assert_eq!(session.len(), 1);
    }
}
