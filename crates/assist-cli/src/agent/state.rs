//! Turn loop configuration and state

use assist_core::{AgentResult, Config, Role, Session, ToolCall, ToolExchange, Turn};
use chrono::Utc;

use crate::session::SessionStore;

/// Configuration for the turn loop
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model to use
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// System instructions (tool list is appended by the loop)
    pub system_prompt: String,
    /// Tool directives honoured per user turn
    pub max_tool_rounds: usize,
    /// Whether to print tool executions
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl AgentConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            system_prompt: config.system_prompt().to_string(),
            max_tool_rounds: config.agent.max_tool_rounds,
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Where the loop is between two console reads
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Blocked on the next console line
    AwaitingInput,
    /// A tool may need to run before the next completion call
    Dispatching {
        exchanges: Vec<ToolExchange>,
        pending: Option<ToolCall>,
    },
    /// Waiting on the completion service
    AwaitingCompletion { exchanges: Vec<ToolExchange> },
    /// A reply is ready to be recorded and shown
    Printing { reply: String },
    Stopped,
}

/// What a console line asks the loop to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Exit,
    Blank,
    Message(String),
}

impl Input {
    pub fn classify(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Input::Blank;
        }

        match trimmed.to_lowercase().as_str() {
            "exit" | "quit" => Input::Exit,
            _ => Input::Message(trimmed.to_string()),
        }
    }
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// User turns answered by the agent
    pub completed: usize,
    /// User turns that ended in an error
    pub failed: usize,
    /// Tools run across all turns
    pub tool_calls: usize,
}

/// The active session and the store it is persisted to
#[derive(Debug)]
pub struct AgentContext {
    store: SessionStore,
    session: Session,
}

impl AgentContext {
    /// Load (or start) the session from the store
    pub fn open(store: SessionStore, session_id: &str) -> Self {
        let session = store.load(session_id);
        Self { store, session }
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.session.transcript
    }

    /// Persist a new turn, then add it to the in-memory transcript.
    ///
    /// Timestamps never go backwards: a clock that regressed since the last
    /// turn is clamped to that turn's timestamp.
    pub fn record(&mut self, role: Role, text: impl Into<String>) -> AgentResult<Turn> {
        let now = Utc::now();
        let timestamp = match self.session.last_timestamp() {
            Some(last) if last > now => last,
            _ => now,
        };

        let turn = Turn::new(role, text, timestamp);
        self.store.append(&self.session.id, &turn)?;
        self.session.transcript.push(turn.clone());

        Ok(turn)
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &SessionStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_classify_exit_keywords() {
        for line in ["exit", "Exit", "  quit ", "QUIT", "\texit\n"] {
            assert_eq!(Input::classify(line), Input::Exit, "{line:?}");
        }
    }

    #[test]
    fn test_classify_other_input() {
        assert_eq!(Input::classify("   "), Input::Blank);
        assert_eq!(Input::classify(""), Input::Blank);
        assert_eq!(Input::classify(" hello aya "), Input::Message("hello aya".into()));
        assert_eq!(Input::classify("exit now"), Input::Message("exit now".into()));
        assert_eq!(Input::classify("/quit"), Input::Message("/quit".into()));
    }

    #[test]
    fn test_agent_config_from_config() {
        let mut config = Config::default();
        config.agent.max_tool_rounds = 3;
        let agent = AgentConfig::from_config(&config).with_verbose(true);

        assert_eq!(agent.model, "gemini-1.5-flash");
        assert_eq!(agent.max_tool_rounds, 3);
        assert!(agent.verbose);
    }

    #[test]
    fn test_context_records_and_persists() {
        let store = SessionStore::open_in_memory().unwrap();
        let mut ctx = AgentContext::open(store, "default");

        ctx.record(Role::User, "hello").unwrap();
        ctx.record(Role::Agent, "hi").unwrap();

        assert_eq!(ctx.transcript().len(), 2);
        assert_eq!(ctx.store().load("default").transcript, ctx.transcript());
    }

    #[test]
    fn test_context_timestamps_are_monotonic() {
        let store = SessionStore::open_in_memory().unwrap();
        let future = Utc::now() + Duration::hours(1);
        store
            .append("default", &Turn::new(Role::User, "from the future", future))
            .unwrap();

        let mut ctx = AgentContext::open(store, "default");
        let turn = ctx.record(Role::Agent, "reply").unwrap();

        assert_eq!(turn.timestamp, future);
        assert!(ctx.transcript().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
