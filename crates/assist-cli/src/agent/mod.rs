//! Turn loop for the chat agent
//!
//! Implements the input → completion → (tool) → reply cycle as an explicit
//! state machine over a persisted session.

mod agent_loop;
mod state;

pub use agent_loop::TurnLoop;
pub use state::{AgentConfig, AgentContext};
