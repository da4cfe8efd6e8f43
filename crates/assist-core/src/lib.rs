//! assist-core: Shared library for the assist chat agent
//!
//! Provides:
//! - Configuration loading (assist.toml)
//! - Chat data model (turns, sessions, tool calls)
//! - The completion service interface with Gemini and Ollama providers
//! - The error taxonomy used across the agent

pub mod chat;
pub mod completion;
pub mod config;
pub mod error;
pub mod gemini;
pub mod ollama;

pub use chat::{
    CompletionRequest, CompletionResponse, Role, Session, ToolCall, ToolDescriptor, ToolExchange,
    Turn,
};
pub use completion::{build_service, CompletionService};
pub use config::{Config, ProviderKind};
pub use error::{AgentError, AgentResult, RemoteErrorKind};
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
