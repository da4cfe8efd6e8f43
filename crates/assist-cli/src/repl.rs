//! Interactive console for the chat agent
//!
//! Provides:
//! - Readline-like input with in-memory history
//! - Startup checks (credential, session store) and the welcome banner
//! - Wiring of the turn loop to stdin/stdout

use std::io::stdout;

use anyhow::{Context, Result};
use assist_core::{build_service, Config, OllamaClient, ProviderKind};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::{info, warn};

use crate::agent::{AgentConfig, AgentContext, TurnLoop};
use crate::session::SessionStore;
use crate::tools::builtin::default_registry;

// ANSI colors
pub const GREEN: &str = "\x1b[92m";
pub const BLUE: &str = "\x1b[94m";
pub const YELLOW: &str = "\x1b[93m";
pub const CYAN: &str = "\x1b[96m";
pub const DIM: &str = "\x1b[2m";
pub const BOLD: &str = "\x1b[1m";
pub const RESET: &str = "\x1b[0m";

/// Result of asking the console for a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// Ctrl-C: drop the current line and prompt again
    Interrupted,
    /// Ctrl-D or closed stdin
    Eof,
}

/// Source of user input lines
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome>;
}

/// Terminal input backed by rustyline
pub struct ReadlineSource {
    editor: Editor<(), DefaultHistory>,
}

impl ReadlineSource {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().context("Failed to initialize line editor")?;
        Ok(Self { editor })
    }
}

impl LineSource for ReadlineSource {
    fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(ReadOutcome::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(e) => Err(e.into()),
        }
    }
}

/// Options for an interactive chat
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub api_key: Option<String>,
    pub verbose: bool,
}

/// Startup failures that end the process before the first prompt
#[derive(Debug)]
pub enum StartupError {
    /// Credential missing; instructions were printed
    MissingCredential,
    Other(anyhow::Error),
}

impl From<anyhow::Error> for StartupError {
    fn from(e: anyhow::Error) -> Self {
        StartupError::Other(e)
    }
}

/// Run the interactive chat
pub async fn run(config: Config, options: ChatOptions) -> Result<(), StartupError> {
    let api_key = match config.resolve_api_key(options.api_key) {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "Missing credential");
            println!("{}", config.api_key_instructions());
            return Err(StartupError::MissingCredential);
        }
    };

    if api_key.is_some() {
        println!("{}API key loaded{}", GREEN, RESET);
    }

    if config.provider.kind == ProviderKind::Ollama {
        let ollama = OllamaClient::new(&config.provider.ollama_url, config.provider.request_timeout_secs)
            .context("Failed to create Ollama client")?;
        if !ollama.health_check().await {
            eprintln!(
                "{}Warning:{} Ollama is not reachable at {}",
                YELLOW, RESET, config.provider.ollama_url
            );
        }
    }

    let service = build_service(&config, api_key).context("Failed to create completion service")?;
    let registry = default_registry().context("Failed to register built-in tools")?;

    let store = SessionStore::open(&config.agent.database).with_context(|| {
        format!("Failed to open session store {}", config.agent.database.display())
    })?;
    let context = AgentContext::open(store, &config.agent.session_id);

    let agent_config = AgentConfig::from_config(&config).with_verbose(options.verbose);

    print_welcome(&config, context.transcript().len());

    let mut turn_loop = TurnLoop::new(service, registry, agent_config, context);
    let mut input = ReadlineSource::new()?;
    let mut out = stdout();

    let stats = turn_loop.run(&mut input, &mut out).await?;
    info!(
        completed = stats.completed,
        failed = stats.failed,
        turns = turn_loop.context().transcript().len(),
        "Chat finished"
    );

    Ok(())
}

fn print_welcome(config: &Config, history_len: usize) {
    println!();
    println!(
        "{}Personal Assistant Agent{} (type '{}exit{}' to quit)",
        BOLD, RESET, CYAN, RESET
    );
    println!(
        "{}Model:{} {}{}{} via {}",
        DIM, RESET, BLUE, config.provider.model, RESET, config.provider.kind
    );
    if history_len > 0 {
        println!(
            "{}Session:{} {} ({} earlier turns)",
            DIM, RESET, config.agent.session_id, history_len
        );
    } else {
        println!("{}Session:{} {}", DIM, RESET, config.agent.session_id);
    }
    println!("Try: 'hello aya', 'what time is it', or any other question!");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_credential_stops_before_startup() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("memory.db");

        let mut config = Config::default();
        config.provider.api_key_env = "ASSIST_TEST_REPL_KEY_NEVER_SET".to_string();
        config.agent.database = db.clone();

        let result = run(config, ChatOptions::default()).await;

        assert!(matches!(result, Err(StartupError::MissingCredential)));
        assert!(!db.exists());
    }

    #[tokio::test]
    async fn test_blank_flag_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("memory.db");

        let mut config = Config::default();
        config.provider.api_key_env = "ASSIST_TEST_REPL_KEY_NEVER_SET".to_string();
        config.agent.database = db.clone();
        let options = ChatOptions {
            api_key: Some("  ".to_string()),
            verbose: false,
        };

        assert!(matches!(
            run(config, options).await,
            Err(StartupError::MissingCredential)
        ));
        assert!(!db.exists());
    }
}
