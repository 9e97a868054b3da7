//! Note-writing agent.
//!
//! Sends the bundle to the model and turns every `<note file="...">` block
//! in the reply into a note proposal. The blocks are removed from the text
//! the user sees.

use std::sync::OnceLock;

use async_trait::async_trait;
use loam_core::{Agent, AgentError, AgentReply, ContextBundle, NoteProposal};
use regex::Regex;
use tracing::debug;

use crate::client::OpenRouterClient;
use crate::prompts::build_messages;

fn note_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<note\s+file\s*=\s*"([^"]+)"\s*>(.*?)</note>"#).unwrap())
}

/// Splits a reply into its visible text and its note blocks.
pub fn extract_note_blocks(reply: &str) -> (String, Vec<NoteProposal>) {
    let re = note_block_regex();
    let blocks = re
        .captures_iter(reply)
        .map(|cap| NoteProposal {
            file: cap[1].trim().to_string(),
            body: cap[2].trim().to_string(),
        })
        .filter(|block| !block.body.is_empty())
        .collect();

    let visible = re.replace_all(reply, "");
    // Collapse the blank lines left behind by removed blocks
    let mut text = String::new();
    let mut blank_run = 0;
    for line in visible.trim().lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        text.push_str(line);
        text.push('\n');
    }
    (text.trim_end().to_string(), blocks)
}

/// Agent that answers through OpenRouter and proposes notes for the vault.
pub struct NoteAgent {
    client: OpenRouterClient,
    folder_awareness: bool,
}

impl NoteAgent {
    pub fn new(client: OpenRouterClient) -> Self {
        Self {
            client,
            folder_awareness: false,
        }
    }

    /// Asks for the folder's note listing in every bundle.
    pub fn with_folder_awareness(mut self, enabled: bool) -> Self {
        self.folder_awareness = enabled;
        self
    }
}

#[async_trait]
impl Agent for NoteAgent {
    async fn respond(&self, bundle: &ContextBundle) -> Result<AgentReply, AgentError> {
        let raw = self.client.chat(build_messages(bundle)).await?;
        let (mut text, proposals) = extract_note_blocks(&raw);
        debug!(user = %bundle.user, proposals = proposals.len(), "Parsed agent reply");

        if text.is_empty() {
            if proposals.is_empty() {
                return Err(AgentError::Malformed("reply was empty".to_string()));
            }
            text = "Here is a note for your vault.".to_string();
        }

        Ok(AgentReply { text, proposals })
    }

    fn wants_folder_listing(&self) -> bool {
        self.folder_awareness
    }
}
