//! Telegram front end for Loam.
//!
//! Every update from an allowed user is queued on that user's worker, then
//! routed to the context manager: commands move the user between folders and
//! sessions, plain text and documents become turns in the current session.
//!
//! # Environment Variables
//!
//! Required:
//! - `TELEGRAM_BOT_TOKEN`: Bot token from @BotFather
//! - `LOAM_ALLOWED_USERS`: Comma-separated Telegram user ids
//! - `OPENROUTER_API_KEY`: Key for the note-writing model
//!
//! Optional:
//! - `LOAM_VAULT_PATH`: Vault root (default: ~/loam/notes)
//! - `LOAM_STATE_DIR`: Session state (default: ~/.loam)
//! - `OPENROUTER_MODEL`: Model to use (default: anthropic/claude-sonnet-4)
//!
//! See [`loam_core::config`] for the full list.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use loam_agent::{NoteAgent, OpenRouterClient};
//! use loam_core::{ContextManager, LoamConfig, VaultIndex};
//! use loam_persistence::SessionStore;
//! use loam_telegram::{create_shared_state, LoamBot};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = LoamConfig::from_env()?;
//!     let vault = Arc::new(VaultIndex::open(&cfg.vault_path)?);
//!     let client = OpenRouterClient::new(cfg.openrouter_api_key.clone(), cfg.model.clone(), cfg.agent_timeout);
//!     let agent = NoteAgent::new(client);
//!     let manager = ContextManager::new(vault, Arc::new(SessionStore::in_memory()), Arc::new(agent));
//!
//!     let state = create_shared_state(manager, cfg.allowed_users.clone(), cfg.retention.clone());
//!     LoamBot::new(cfg.telegram_token.clone(), state).start_polling().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod error;
pub mod format;
pub mod handlers;
pub mod queue;
pub mod state;

pub use bot::LoamBot;
pub use error::{Result, TelegramError};
pub use handlers::Command;
pub use queue::UserQueues;
pub use state::{create_shared_state, LoamState};
