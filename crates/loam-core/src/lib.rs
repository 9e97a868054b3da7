//! Loam Core - the session and context manager behind the capture bot.
//!
//! - **agent**: The agent interface and the context bundle it receives
//! - **config**: Environment configuration and state paths
//! - **context**: Routes messages and commands to (folder, session) pairs
//! - **error**: Error taxonomy surfaced to the command router
//! - **note**: Note rendering and wikilink extraction
//! - **proposals**: Agent-proposed notes waiting for approval
//! - **vault**: Read-through index over the notes vault

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod note;
pub mod proposals;
pub mod vault;

pub use agent::{Agent, AgentError, AgentReply, ContextBundle, NoteProposal, ReferencedNote};
pub use config::{ConfigError, LoamConfig};
pub use context::{ContextManager, Exchange, Listing, Opened};
pub use error::{LoamError, Result};
pub use note::{NoteMetadata, NoteWrite};
pub use proposals::{PendingNote, PendingNotes};
pub use vault::{Folder, NoteMeta, VaultIndex};
