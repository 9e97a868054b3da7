//! The agent seam: what the context manager hands to the LLM side and what
//! it gets back.

use std::time::Duration;

use async_trait::async_trait;
use loam_models::{FolderPath, NoteId, SessionId, Turn, UserId};
use thiserror::Error;

use crate::vault::NoteMeta;

/// Errors an agent call can fail with.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No answer within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The provider rejected the request.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Rate limit or credit exhaustion.
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Transport failure before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The response could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl AgentError {
    /// Returns true for failures worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Quota(_) | Self::Malformed(_) => false,
        }
    }
}

/// A note pulled into the prompt because the message links to it.
#[derive(Debug, Clone)]
pub struct ReferencedNote {
    pub id: NoteId,
    pub content: String,
}

/// Everything the agent sees for one turn.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub user: UserId,
    pub folder: FolderPath,
    pub session: SessionId,
    pub session_title: Option<String>,
    /// Prior turns, oldest first, bounded by the context window.
    pub history: Vec<Turn>,
    /// The new user message.
    pub message: String,
    /// Notes in the folder, present only when the agent asks for them.
    pub notes: Option<Vec<NoteMeta>>,
    /// Fresh content of notes linked from the message.
    pub referenced: Vec<ReferencedNote>,
}

/// A note the agent wants written. Nothing touches the vault until the
/// user approves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteProposal {
    /// File name as given by the model, possibly with a subfolder.
    pub file: String,
    pub body: String,
}

/// The agent's answer.
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    /// Text shown to the user and stored as the agent turn.
    pub text: String,
    /// Notes proposed while answering.
    pub proposals: Vec<NoteProposal>,
}

impl AgentReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            proposals: Vec::new(),
        }
    }

    pub fn with_proposal(mut self, file: impl Into<String>, body: impl Into<String>) -> Self {
        self.proposals.push(NoteProposal {
            file: file.into(),
            body: body.into(),
        });
        self
    }
}

/// Produces a reply for a context bundle.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn respond(&self, bundle: &ContextBundle) -> Result<AgentReply, AgentError>;

    /// Whether bundles should carry the folder's note listing.
    fn wants_folder_listing(&self) -> bool {
        false
    }
}
