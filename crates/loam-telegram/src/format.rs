//! Text formatting helpers for Telegram replies.

use chrono::{DateTime, Utc};
use loam_core::vault::NoteMeta;
use loam_core::PendingNote;
use loam_models::{FolderPath, SessionSummary};

/// Telegram rejects messages longer than 4096 characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Characters of a proposed note shown before approval.
pub const PREVIEW_CHARS: usize = 2000;

/// Escape HTML special characters for Telegram HTML mode.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Splits text into chunks Telegram accepts, preferring line breaks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            // A single overlong line is cut at character boundaries
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

/// Human-friendly age such as `5m ago` or `3d ago`.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

/// One line describing a session in a listing.
pub fn session_line(summary: &SessionSummary, current: bool, now: DateTime<Utc>) -> String {
    let marker = if current { "✅" } else if summary.starred { "⭐" } else { "💬" };
    format!(
        "{} <b>{}</b> · {} · {} turns · {}\n   <code>/switch {}</code>",
        marker,
        html_escape(summary.display_name()),
        html_escape(summary.folder.as_str()),
        summary.turn_count,
        relative_time(summary.last_active_at, now),
        html_escape(&summary.handle())
    )
}

/// Report for `/session`.
pub fn session_report(summary: &SessionSummary, now: DateTime<Utc>) -> String {
    format!(
        "📊 <b>Session</b>\n\n\
        📁 Folder: <code>{}</code>\n\
        💬 Title: {}\n\
        🆔 Id: <code>{}</code>\n\
        {} Starred: {}\n\
        📝 Turns: {}\n\
        🕒 Last active: {}",
        html_escape(summary.folder.as_str()),
        html_escape(summary.display_name()),
        summary.id,
        if summary.starred { "⭐" } else { "☆" },
        if summary.starred { "yes" } else { "no" },
        summary.turn_count,
        relative_time(summary.last_active_at, now)
    )
}

/// One line of the `/list` folder tree: nested folders are indented under
/// their parent and shown by their last segment.
pub fn folder_line(folder: &FolderPath, current: bool) -> String {
    let marker = if current { "✅" } else { "📁" };
    let indent = "    ".repeat(folder.depth().saturating_sub(1));
    format!("{}{} <code>{}</code>", indent, marker, html_escape(folder.name()))
}

/// One line describing a note.
pub fn note_line(note: &NoteMeta, now: DateTime<Utc>) -> String {
    format!(
        "📄 {} · {}",
        html_escape(note.title()),
        relative_time(note.modified, now)
    )
}

/// Preview of a proposed note, shown above its save and discard buttons.
pub fn proposal_preview(note: &PendingNote) -> String {
    let (body, truncated) = match note.body.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => (&note.body[..idx], true),
        None => (note.body.as_str(), false),
    };
    let mut text = format!(
        "📄 <code>{}</code> in <code>{}</code>\n\n<pre>{}</pre>",
        html_escape(&note.file),
        html_escape(note.folder.as_str()),
        html_escape(body)
    );
    if truncated {
        text.push_str("\n… (preview truncated)");
    }
    text
}
