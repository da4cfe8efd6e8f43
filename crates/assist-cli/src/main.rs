//! assist: terminal chat agent
//!
//! Chats with a hosted model, keeps the conversation in a local SQLite
//! file, and lets the model call a couple of built-in tools.

mod agent;
mod commands;
mod repl;
mod session;
mod tools;

use std::path::PathBuf;

use anyhow::{Context, Result};
use assist_core::{Config, ProviderKind};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::repl::{ChatOptions, StartupError};
use crate::session::SessionStore;

#[derive(Debug, Parser)]
#[command(name = "assist")]
#[command(about = "Personal assistant chat agent", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to assist.toml (default: search current directory and parents)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start interactive chat
    Chat {
        #[command(flatten)]
        store: StoreArgs,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Completion provider: gemini or ollama
        #[arg(short, long)]
        provider: Option<ProviderKind>,

        /// API key (defaults to the variable named by `api_key_env`)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Print the stored transcript of a session
    History {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// List stored sessions
    Sessions {
        /// SQLite file holding transcripts
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Write a default assist.toml in the current directory
    InitConfig,
}

#[derive(Debug, clap::Args)]
struct StoreArgs {
    /// Session id (default: "default")
    #[arg(short, long)]
    session: Option<String>,

    /// SQLite file holding transcripts
    #[arg(long)]
    db: Option<PathBuf>,
}

impl StoreArgs {
    fn apply(self, config: &mut Config) {
        if let Some(session) = self.session {
            config.agent.session_id = session;
        }
        if let Some(db) = self.db {
            config.agent.database = db;
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Variables already exported take precedence over .env
    let dotenv = assist_core::config::load_dotenv();

    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match dotenv {
        Ok(Some(path)) => debug!(path = %path.display(), "Loaded .env"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to load .env"),
    }

    let mut config = load_config(cli.config)?;

    match cli.command {
        Some(Commands::History { store }) => {
            store.apply(&mut config);
            let db = SessionStore::open(&config.agent.database).context("Failed to open session store")?;
            commands::history(&db, &config.agent.session_id, &mut std::io::stdout())
        }
        Some(Commands::Sessions { db }) => {
            let path = db.unwrap_or(config.agent.database);
            let db = SessionStore::open(&path).context("Failed to open session store")?;
            commands::sessions(&db, &mut std::io::stdout())
        }
        Some(Commands::InitConfig) => commands::init_config(&std::env::current_dir()?),
        Some(Commands::Chat {
            store,
            model,
            provider,
            api_key,
        }) => {
            store.apply(&mut config);
            if let Some(model) = model {
                config.provider.model = model;
            }
            if let Some(provider) = provider {
                config.provider.kind = provider;
            }
            chat(config, api_key, cli.verbose).await
        }
        None => {
            // Default to chat when no command specified
            chat(config, None, cli.verbose).await
        }
    }
}

async fn chat(config: Config, api_key: Option<String>, verbose: bool) -> Result<()> {
    let options = ChatOptions { api_key, verbose };

    match repl::run(config, options).await {
        Ok(()) => Ok(()),
        Err(StartupError::MissingCredential) => std::process::exit(1),
        Err(StartupError::Other(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_chat_overrides() {
        let cli = Cli::try_parse_from([
            "assist", "-v", "chat", "--session", "work", "--provider", "ollama", "--model", "llama3.2",
        ])
        .unwrap();
        assert!(cli.verbose);

        match cli.command {
            Some(Commands::Chat { store, model, provider, .. }) => {
                let mut config = Config::default();
                store.apply(&mut config);
                assert_eq!(config.agent.session_id, "work");
                assert_eq!(model.as_deref(), Some("llama3.2"));
                assert_eq!(provider, Some(ProviderKind::Ollama));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_api_key_only_from_flag() {
        let cli = Cli::try_parse_from(["assist", "chat"]).unwrap();
        match cli.command {
            Some(Commands::Chat { api_key, .. }) => assert_eq!(api_key, None),
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["assist", "chat", "--api-key", "abc"]).unwrap();
        match cli.command {
            Some(Commands::Chat { api_key, .. }) => assert_eq!(api_key.as_deref(), Some("abc")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_no_subcommand_means_chat() {
        let cli = Cli::try_parse_from(["assist"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(Cli::try_parse_from(["assist", "chat", "--provider", "openai"]).is_err());
    }
}
