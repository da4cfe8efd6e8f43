//! Non-interactive subcommands

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use assist_core::config::CONFIG_FILE_NAME;
use assist_core::{Config, Role};

use crate::repl::{BOLD, CYAN, DIM, GREEN, RESET};
use crate::session::SessionStore;

/// Print a stored transcript
pub fn history<W: Write>(store: &SessionStore, session_id: &str, out: &mut W) -> Result<()> {
    let session = store.load(session_id);

    if session.is_empty() {
        writeln!(out, "No turns in session '{}'", session_id)?;
        return Ok(());
    }

    writeln!(out, "{}Session {}:{} {} turns", BOLD, session_id, RESET, session.len())?;
    for turn in &session.transcript {
        let (color, label) = match turn.role {
            Role::User => (CYAN, "You"),
            Role::Agent => (GREEN, "Agent"),
        };
        writeln!(
            out,
            "  {}{}{} {}{}:{} {}",
            DIM,
            turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            RESET,
            color,
            label,
            RESET,
            turn.text.replace('\n', " ")
        )?;
    }

    Ok(())
}

/// List stored sessions
pub fn sessions<W: Write>(store: &SessionStore, out: &mut W) -> Result<()> {
    let sessions = store.list_sessions().context("Failed to list sessions")?;

    if sessions.is_empty() {
        writeln!(out, "No saved sessions")?;
        return Ok(());
    }

    writeln!(out, "{}Sessions:{}", BOLD, RESET)?;
    for s in sessions {
        let last = s
            .last_activity
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(out, "  {:<20} {:>5} turns  {}{}{}", s.id, s.turn_count, DIM, last, RESET)?;
    }

    Ok(())
}

/// Write a default assist.toml into the given directory
pub fn init_config(dir: &Path) -> Result<()> {
    let path = Config::create_default(dir.join(CONFIG_FILE_NAME))?;
    println!("{}Created:{} {}", GREEN, RESET, path.display());
    Ok(())
}
