//! Markdown note rendering and wikilink extraction.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use loam_models::SessionId;
use regex::Regex;

/// Metadata recorded in a note's front-matter.
#[derive(Debug, Clone, Default)]
pub struct NoteMetadata {
    /// Session that produced the note.
    pub session: Option<SessionId>,
    /// Original URL or attachment path.
    pub source: Option<String>,
    pub tags: Vec<String>,
}

/// Outcome of a note write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteWrite {
    Created,
    Appended,
}

/// Returns true if `content` already opens with a front-matter block.
pub fn has_front_matter(content: &str) -> bool {
    content.starts_with("---\n") || content.starts_with("---\r\n")
}

/// Renders a new note: front-matter followed by the body.
///
/// Bodies that already carry front-matter are written as-is.
pub fn render_new(body: &str, meta: &NoteMetadata, now: DateTime<Utc>) -> String {
    let body = body.trim();
    if has_front_matter(body) {
        return format!("{}\n", body);
    }

    let mut out = String::from("---\n");
    out.push_str(&format!("created: {}\n", now.format("%Y-%m-%d %H:%M")));
    if let Some(session) = &meta.session {
        out.push_str(&format!("session: {}\n", session));
    }
    if let Some(source) = &meta.source {
        out.push_str(&format!("source: {}\n", source));
    }
    if !meta.tags.is_empty() {
        out.push_str(&format!("tags: [{}]\n", meta.tags.join(", ")));
    }
    out.push_str("---\n\n");
    out.push_str(body);
    out.push('\n');
    out
}

/// Appends a dated section to an existing note.
pub fn render_append(existing: &str, body: &str, meta: &NoteMetadata, now: DateTime<Utc>) -> String {
    let mut out = existing.trim_end().to_string();
    out.push_str("\n\n---\n\n");
    out.push_str(&format!("## {}\n\n", now.format("%Y-%m-%d %H:%M")));
    if let Some(source) = &meta.source {
        out.push_str(&format!("source: {}\n\n", source));
    }
    out.push_str(strip_front_matter(body).trim());
    out.push('\n');
    out
}

/// Removes a leading front-matter block.
pub fn strip_front_matter(content: &str) -> &str {
    if !has_front_matter(content) {
        return content;
    }
    let rest = &content[3..];
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            after.strip_prefix('\n').or_else(|| after.strip_prefix("\r\n")).unwrap_or(after)
        }
        None => content,
    }
}

/// Normalizes a note file name, adding `.md` when missing.
///
/// Returns `None` for names that could leave the folder or be hidden.
pub fn normalize_note_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(char::is_control)
    {
        return None;
    }
    if name.to_ascii_lowercase().ends_with(".md") {
        Some(name.to_string())
    } else {
        Some(format!("{}.md", name))
    }
}

fn wikilink_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // [[target]], [[target|alias]], [[target#heading]]
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]|#]+)(?:[#|][^\[\]]*)?\]\]").unwrap())
}

/// Extracts distinct wikilink targets in order of appearance.
pub fn extract_wikilinks(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for cap in wikilink_regex().captures_iter(text) {
        let target = cap[1].trim().to_string();
        if !target.is_empty() && !out.contains(&target) {
            out.push(target);
        }
    }
    out
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"]+"#).unwrap())
}

/// First http(s) URL in a message, recorded as a note's source.
pub fn first_url(text: &str) -> Option<String> {
    url_regex().find(text).map(|m| m.as_str().to_string())
}
