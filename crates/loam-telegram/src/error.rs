//! Error types for the Telegram bot.

use loam_core::{ConfigError, LoamError};
use loam_persistence::PersistenceError;
use thiserror::Error;

/// Errors that can stop the bot from starting or running.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Configuration missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persisted state could not be opened.
    #[error("state error: {0}")]
    State(#[from] PersistenceError),

    /// Vault could not be opened.
    #[error("vault error: {0}")]
    Vault(#[from] LoamError),

    /// Failed to start the bot.
    #[error("Failed to start bot: {0}")]
    BotStartFailed(String),

    /// Telegram API error.
    #[error("Telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for Telegram operations.
pub type Result<T> = std::result::Result<T, TelegramError>;

/// Message shown to the user for a failed operation.
pub fn user_message(err: &LoamError) -> String {
    match err {
        LoamError::NoContext => "No folder selected yet.\n\n\
            Use /create &lt;folder&gt; to pick or create a folder, \
            or /new &lt;folder&gt; to start a fresh session in one."
            .to_string(),
        LoamError::InvalidPath { path, reason } => format!(
            "❌ Invalid folder <code>{}</code>: {}",
            crate::format::html_escape(path),
            crate::format::html_escape(reason)
        ),
        LoamError::NotFound { kind, .. } if kind == "note proposal" => {
            "This note was already saved or discarded.".to_string()
        }
        LoamError::NotFound { kind, id } => format!(
            "❌ That {} no longer exists: <code>{}</code>\n\nPick again with /switch or /list.",
            kind,
            crate::format::html_escape(id)
        ),
        LoamError::Agent(e) => format!(
            "⚠️ The assistant could not answer ({}).\n\nYour message was saved; send another message to continue.",
            crate::format::html_escape(&e.to_string())
        ),
        LoamError::Storage(_) | LoamError::Io { .. } => {
            "❌ Something went wrong while saving. Please try again.".to_string()
        }
    }
}
