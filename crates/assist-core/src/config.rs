//! Configuration management for assist.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::AgentError;

pub const CONFIG_FILE_NAME: &str = "assist.toml";

pub const DOTENV_FILE_NAME: &str = ".env";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly personal assistant. \
Answer conversationally and keep replies short. \
When a tool can answer the question, call it instead of guessing, \
then use its result in your reply.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Session the transcript is stored under
    #[serde(default = "default_session_id")]
    pub session_id: String,
    /// SQLite file holding transcripts
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Tool directives honoured per user turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Overrides the built-in system instructions
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Ollama,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(format!("unknown provider '{}' (expected gemini or ollama)", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
}

fn default_session_id() -> String {
    "default".to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("memory.db")
}

fn default_max_tool_rounds() -> usize {
    5
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_request_timeout() -> u64 {
    60
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_ollama_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            database: default_database(),
            max_tool_rounds: default_max_tool_rounds(),
            system_prompt: None,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: default_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
            api_key_env: default_api_key_env(),
            gemini_base_url: default_gemini_base_url(),
            ollama_url: default_ollama_url(),
        }
    }
}

impl Config {
    /// Load assist.toml from the current directory or a parent, falling
    /// back to defaults when none exists
    pub fn load() -> Result<Self> {
        match Self::find_config_path() {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find assist.toml by searching current directory and parents
    pub fn find_config_path() -> Option<PathBuf> {
        find_upwards(CONFIG_FILE_NAME)
    }

    /// System instructions sent with every completion call
    pub fn system_prompt(&self) -> &str {
        self.agent
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Whether the selected provider needs an API key
    pub fn requires_api_key(&self) -> bool {
        self.provider.kind == ProviderKind::Gemini
    }

    /// Resolve the API key from an explicit value or the configured
    /// environment variable. Missing keys are a fatal config error.
    pub fn resolve_api_key(&self, explicit: Option<String>) -> Result<Option<String>, AgentError> {
        if !self.requires_api_key() {
            return Ok(None);
        }

        let key = explicit
            .or_else(|| std::env::var(&self.provider.api_key_env).ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        match key {
            Some(k) => Ok(Some(k)),
            None => Err(AgentError::Config(format!(
                "{} not found",
                self.provider.api_key_env
            ))),
        }
    }

    /// Setup instructions printed when the API key is missing
    pub fn api_key_instructions(&self) -> String {
        let var = &self.provider.api_key_env;
        format!(
            "Error: {var} not found!\n\
             Please export your Gemini API key before starting:\n\
             \x20   export {var}=your_actual_api_key_here\n\
             or add this line to a .env file in the project directory:\n\
             \x20   {var}=your_actual_api_key_here\n\
             You can get an API key from: https://makersuite.google.com/app/apikey"
        )
    }

    /// Write a commented default configuration file
    pub fn create_default(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();

        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }

        let default_config = r#"# assist configuration

[agent]
# Session the transcript is stored under
session_id = "default"

# SQLite file holding transcripts
database = "memory.db"

# Tool calls honoured per user message
max_tool_rounds = 5

# Override the built-in system instructions
# system_prompt = "You are a helpful assistant."

[provider]
# "gemini" (needs an API key) or "ollama" (local)
kind = "gemini"
model = "gemini-1.5-flash"
temperature = 0.2
request_timeout_secs = 60

# Environment variable holding the Gemini API key
api_key_env = "GOOGLE_API_KEY"

# gemini_base_url = "https://generativelanguage.googleapis.com"
# ollama_url = "http://127.0.0.1:11434"
"#;

        std::fs::write(path, default_config)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path.to_path_buf())
    }
}

fn find_upwards(name: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    for _ in 0..10 {
        let candidate = current.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
        if !current.pop() {
            break;
        }
    }

    None
}

/// Parse `KEY=VALUE` lines, skipping blanks, comments and an `export ` prefix
pub fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Export variables from a .env file. Variables already set in the
/// process environment are left alone. Returns how many were set.
pub fn load_dotenv_from(path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut loaded = 0;
    for (key, value) in parse_dotenv(&contents) {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(&key, value);
            loaded += 1;
        }
    }

    Ok(loaded)
}

/// Load the nearest .env (current directory or a parent), if any
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    match find_upwards(DOTENV_FILE_NAME) {
        Some(path) => {
            load_dotenv_from(&path)?;
            Ok(Some(path))
        }
        None => Ok(None),
    }
}
