//! Prompt assembly for the note-writing agent.

use loam_core::ContextBundle;
use loam_models::Role;

use crate::client::ChatMessage;

/// Maximum characters of a linked note copied into the prompt.
const MAX_NOTE_CHARS: usize = 8_000;

const BASE_PROMPT: &str = r#"You are Loam, a capture assistant. The user sends you fragments of thought from Telegram: ideas, questions, links and documents. You help them explore these ideas and keep an Obsidian vault of markdown notes organized by folder.

Rules:
- Keep replies short and conversational; this is a chat on a phone
- Relate new fragments to what was said earlier in the session
- When the user asks you to save something, or a fragment clearly deserves a note, propose one
- Never invent sources; when a link or attachment is the source, name it

To write a note, include a block like this anywhere in your reply:

<note file="descriptive_name.md">
# Title

Markdown content...
</note>

Use snake_case file names. If the note already exists the content is appended as a new dated section, so write only the new material. Note blocks are removed from the reply the user sees and shown as a preview the user approves or discards, so also say in one sentence what you are proposing."#;

/// Builds the system prompt for a bundle.
pub fn system_prompt(bundle: &ContextBundle) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    prompt.push_str(&format!("\n\nCurrent folder: {}", bundle.folder));
    match &bundle.session_title {
        Some(title) => prompt.push_str(&format!("\nSession: {} ({})", title, bundle.session)),
        None => prompt.push_str(&format!("\nSession: {}", bundle.session)),
    }

    if let Some(notes) = &bundle.notes {
        if notes.is_empty() {
            prompt.push_str("\n\nThe folder has no notes yet.");
        } else {
            prompt.push_str("\n\nNotes in this folder (most recent first):");
            for note in notes {
                prompt.push_str(&format!("\n- {}", note.name));
            }
        }
    }

    for note in &bundle.referenced {
        prompt.push_str(&format!(
            "\n\nContent of linked note {}:\n<linked_note>\n{}\n</linked_note>",
            note.id,
            truncate(&note.content, MAX_NOTE_CHARS)
        ));
    }

    prompt
}

/// Builds the full message list: system prompt, history, new message.
pub fn build_messages(bundle: &ContextBundle) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(bundle.history.len() + 2);
    messages.push(ChatMessage::system(system_prompt(bundle)));
    for turn in &bundle.history {
        messages.push(match turn.role {
            Role::User => ChatMessage::user(&turn.text),
            Role::Agent => ChatMessage::assistant(&turn.text),
        });
    }
    messages.push(ChatMessage::user(&bundle.message));
    messages
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n[... truncated]", &text[..idx]),
        None => text.to_string(),
    }
}
