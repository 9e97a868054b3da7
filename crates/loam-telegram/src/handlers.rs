//! Command and message handlers for the Telegram bot.
//!
//! Handlers run inside the user's queue, so they see the effects of every
//! earlier update from the same user.

use std::sync::Arc;

use chrono::Utc;
use loam_core::{LoamError, NoteWrite, Opened};
use loam_models::{SessionSummary, UserId};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, Document, InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

use crate::error::user_message;
use crate::format::{
    folder_line, html_escape, note_line, proposal_preview, session_line, session_report,
    split_message, MAX_MESSAGE_CHARS,
};
use crate::state::LoamState;

/// Largest document the Bot API lets us download.
pub const MAX_DOCUMENT_BYTES: u32 = 20 * 1024 * 1024;

/// Sessions shown in a `/switch` listing.
const MAX_LISTED_SESSIONS: usize = 15;

/// Notes shown by `/list`.
const MAX_LISTED_NOTES: usize = 20;

/// Prefix of inline-button callback data that selects a session.
pub const SWITCH_CALLBACK_PREFIX: &str = "switch:";

/// Callback data prefixes for the buttons under a proposed note.
pub const NOTE_APPROVE_PREFIX: &str = "note:approve:";
pub const NOTE_CANCEL_PREFIX: &str = "note:cancel:";

/// Telegram's limit on callback data.
const MAX_CALLBACK_BYTES: usize = 64;

/// Bot commands that can be invoked with /.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot and get help")]
    Start,

    #[command(description = "Show help message")]
    Help,

    #[command(description = "Start a fresh session: /new [folder]")]
    New(String),

    #[command(description = "Create or reopen a folder: /create <folder>")]
    Create(String),

    #[command(description = "Switch session: /switch [all | starred | folder#id | search]")]
    Switch(String),

    #[command(description = "Show the current session")]
    Session,

    #[command(description = "Rename the current session: /rename <title>")]
    Rename(String),

    #[command(description = "Star the current session (never archived)")]
    Star,

    #[command(description = "Remove the star from the current session")]
    Unstar,

    #[command(description = "List folders and notes")]
    List,
}

/// How an incoming text message is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    /// A known command given arguments it does not take.
    Usage { command: String, description: String },
    /// Anything else, unknown `/words` included, goes to the session.
    Text,
}

/// Routes a text message addressed to `bot_name`.
pub fn route_text(text: &str, bot_name: &str) -> Route {
    if let Ok(cmd) = Command::parse(text, bot_name) {
        return Route::Command(cmd);
    }

    let Some(word) = text
        .strip_prefix('/')
        .and_then(|rest| rest.split_whitespace().next())
    else {
        return Route::Text;
    };
    let name = match word.split_once('@') {
        Some((name, mention)) if mention.eq_ignore_ascii_case(bot_name) => name,
        Some(_) => return Route::Text,
        None => word,
    };

    Command::bot_commands()
        .into_iter()
        .find(|c| c.command.trim_start_matches('/') == name)
        .map_or(Route::Text, |c| Route::Usage {
            command: name.to_string(),
            description: c.description,
        })
}

/// Inline-button actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Switch(String),
    ApproveNote(u64),
    CancelNote(u64),
}

/// Parses inline-button callback data.
pub fn parse_callback(data: &str) -> Option<CallbackAction> {
    if let Some(handle) = data.strip_prefix(SWITCH_CALLBACK_PREFIX) {
        return Some(CallbackAction::Switch(handle.to_string()));
    }
    if let Some(id) = data.strip_prefix(NOTE_APPROVE_PREFIX) {
        return id.parse().ok().map(CallbackAction::ApproveNote);
    }
    if let Some(id) = data.strip_prefix(NOTE_CANCEL_PREFIX) {
        return id.parse().ok().map(CallbackAction::CancelNote);
    }
    None
}

/// Maps a Telegram user to a Loam user.
pub fn loam_user(user: &teloxide::types::User) -> UserId {
    UserId(user.id.0 as i64)
}

async fn send_html(bot: &Bot, chat: ChatId, text: impl Into<String>) -> ResponseResult<()> {
    bot.send_message(chat, text).parse_mode(ParseMode::Html).await?;
    Ok(())
}

/// Handle the /start command.
pub async fn handle_start(bot: Bot, chat: ChatId) -> ResponseResult<()> {
    let welcome = "Welcome to Loam! 🌱\n\n\
        Send me thoughts, links and documents; I keep them in your notes vault, \
        organized by folder and session.\n\n\
        <b>Getting Started:</b>\n\
        1. Use /create &lt;folder&gt; to pick a folder, e.g. <code>/create philosophy</code>\n\
        2. Send messages to think out loud and capture notes\n\
        3. Use /new to start a fresh session, /switch to go back to an older one\n\
        4. Use /star to keep a session forever\n\n\
        Type /help for all commands.";
    send_html(&bot, chat, welcome).await
}

/// Handle the /help command.
pub async fn handle_help(bot: Bot, chat: ChatId) -> ResponseResult<()> {
    bot.send_message(chat, Command::descriptions().to_string()).await?;
    Ok(())
}

fn opened_message(opened: &Opened) -> String {
    let folder = html_escape(opened.folder.as_str());
    let mut text = if opened.folder_created {
        format!("📁 Created folder <code>{}</code>\n", folder)
    } else {
        String::new()
    };
    if opened.resumed {
        text.push_str(&format!(
            "↩️ Resumed session <code>{}</code> in <b>{}</b>",
            opened.session, folder
        ));
    } else {
        text.push_str(&format!(
            "✨ New session <code>{}</code> in <b>{}</b>",
            opened.session, folder
        ));
    }
    text.push_str("\n\nSend a message to begin.");
    text
}

/// Handle the /new command.
pub async fn handle_new(bot: Bot, chat: ChatId, user: UserId, state: Arc<LoamState>, folder: String) -> ResponseResult<()> {
    let folder = folder.trim();
    let result = state
        .manager()
        .new_session(user, (!folder.is_empty()).then_some(folder));
    match result {
        Ok(opened) => send_html(&bot, chat, opened_message(&opened)).await,
        Err(e) => send_error(&bot, chat, user, &e).await,
    }
}

/// Handle the /create command.
pub async fn handle_create(bot: Bot, chat: ChatId, user: UserId, state: Arc<LoamState>, folder: String) -> ResponseResult<()> {
    let folder = folder.trim();
    if folder.is_empty() {
        return send_html(
            &bot,
            chat,
            "Please specify a folder.\n\n<b>Usage:</b> <code>/create &lt;folder&gt;</code>\n\
            Nested folders work too: <code>/create art/color_spaces</code>",
        )
        .await;
    }
    match state.manager().create_folder(user, folder) {
        Ok(opened) => send_html(&bot, chat, opened_message(&opened)).await,
        Err(e) => send_error(&bot, chat, user, &e).await,
    }
}

/// Inline keyboard with one button per session.
pub fn switch_keyboard(sessions: &[SessionSummary]) -> Option<InlineKeyboardMarkup> {
    let rows: Vec<Vec<InlineKeyboardButton>> = sessions
        .iter()
        .filter_map(|s| {
            let data = format!("{}{}", SWITCH_CALLBACK_PREFIX, s.handle());
            if data.len() > MAX_CALLBACK_BYTES {
                return None;
            }
            let star = if s.starred { "⭐ " } else { "" };
            let label = format!("{}{} · {}", star, s.display_name(), s.folder);
            Some(vec![InlineKeyboardButton::callback(label, data)])
        })
        .collect();
    (!rows.is_empty()).then(|| InlineKeyboardMarkup::new(rows))
}

async fn send_session_list(
    bot: &Bot,
    chat: ChatId,
    title: &str,
    sessions: &[SessionSummary],
    state: &LoamState,
    user: UserId,
) -> ResponseResult<()> {
    if sessions.is_empty() {
        return send_html(bot, chat, "No sessions found.\n\nUse /new to start one.").await;
    }

    let current = state.manager().store().get_current(user).ok().flatten();
    let now = Utc::now();
    let shown = &sessions[..sessions.len().min(MAX_LISTED_SESSIONS)];

    let mut text = format!("<b>{}</b>\n\n", html_escape(title));
    for s in shown {
        let is_current = current
            .as_ref()
            .is_some_and(|p| p.folder == s.folder && p.session == s.id);
        text.push_str(&session_line(s, is_current, now));
        text.push('\n');
    }
    if sessions.len() > shown.len() {
        text.push_str(&format!("\n… and {} more", sessions.len() - shown.len()));
    }

    let mut req = bot.send_message(chat, text).parse_mode(ParseMode::Html);
    if let Some(keyboard) = switch_keyboard(shown) {
        req = req.reply_markup(keyboard);
    }
    req.await?;
    Ok(())
}

async fn send_switched(bot: &Bot, chat: ChatId, summary: &SessionSummary) -> ResponseResult<()> {
    send_html(
        bot,
        chat,
        format!(
            "✅ Switched to <b>{}</b> in <code>{}</code> ({} turns)",
            html_escape(summary.display_name()),
            html_escape(summary.folder.as_str()),
            summary.turn_count
        ),
    )
    .await
}

/// Handle the /switch command.
pub async fn handle_switch(bot: Bot, chat: ChatId, user: UserId, state: Arc<LoamState>, arg: String) -> ResponseResult<()> {
    let arg = arg.trim();
    let manager = state.manager();

    let result = match arg {
        "" => manager
            .switch_candidates(user, false)
            .map(|sessions| ("Sessions in this folder", sessions)),
        "all" => manager
            .switch_candidates(user, true)
            .map(|sessions| ("Recent sessions", sessions)),
        "starred" => manager
            .starred(user)
            .map(|sessions| ("⭐ Starred sessions", sessions)),
        handle if handle.contains('#') => {
            return match manager.switch(user, handle) {
                Ok(summary) => send_switched(&bot, chat, &summary).await,
                Err(e) => send_error(&bot, chat, user, &e).await,
            };
        }
        query => match manager.search(user, query) {
            Ok(hits) if hits.len() == 1 => {
                return match manager.switch(user, &hits[0].handle()) {
                    Ok(summary) => send_switched(&bot, chat, &summary).await,
                    Err(e) => send_error(&bot, chat, user, &e).await,
                };
            }
            other => other.map(|hits| ("Matching sessions", hits)),
        },
    };

    match result {
        Ok((title, sessions)) => send_session_list(&bot, chat, title, &sessions, &state, user).await,
        Err(e) => send_error(&bot, chat, user, &e).await,
    }
}

/// Handle the /session command.
pub async fn handle_session(bot: Bot, chat: ChatId, user: UserId, state: Arc<LoamState>) -> ResponseResult<()> {
    match state.manager().status(user) {
        Ok(Some(summary)) => send_html(&bot, chat, session_report(&summary, Utc::now())).await,
        Ok(None) => send_error(&bot, chat, user, &LoamError::NoContext).await,
        Err(e) => send_error(&bot, chat, user, &e).await,
    }
}

/// Handle the /rename command.
pub async fn handle_rename(bot: Bot, chat: ChatId, user: UserId, state: Arc<LoamState>, title: String) -> ResponseResult<()> {
    let title = title.trim();
    if title.is_empty() {
        return send_html(&bot, chat, "<b>Usage:</b> <code>/rename &lt;title&gt;</code>").await;
    }
    match state.manager().rename(user, title) {
        Ok(_) => send_html(&bot, chat, format!("✏️ Session renamed to <b>{}</b>", html_escape(title))).await,
        Err(e) => send_error(&bot, chat, user, &e).await,
    }
}

/// Handle the /star and /unstar commands.
pub async fn handle_star(bot: Bot, chat: ChatId, user: UserId, state: Arc<LoamState>, starred: bool) -> ResponseResult<()> {
    let result = if starred {
        state.manager().star(user)
    } else {
        state.manager().unstar(user)
    };
    match result {
        Ok(_) if starred => send_html(&bot, chat, "⭐ Session starred. It will never be archived.").await,
        Ok(_) => send_html(&bot, chat, "☆ Star removed.").await,
        Err(e) => send_error(&bot, chat, user, &e).await,
    }
}

/// Handle the /list command.
pub async fn handle_list(bot: Bot, chat: ChatId, user: UserId, state: Arc<LoamState>) -> ResponseResult<()> {
    let listing = match state.manager().list(user) {
        Ok(listing) => listing,
        Err(e) => return send_error(&bot, chat, user, &e).await,
    };

    if listing.folders.is_empty() {
        return send_html(&bot, chat, "The vault has no folders yet.\n\nUse /create &lt;folder&gt; to make one.").await;
    }

    let current_folder = listing.current.as_ref().map(|p| &p.folder);
    let mut text = String::from("<b>📁 Folders:</b>\n\n");
    for folder in &listing.folders {
        text.push_str(&folder_line(folder, current_folder == Some(folder)));
        text.push('\n');
    }

    if let Some(folder) = current_folder {
        text.push_str(&format!("\n<b>📄 Notes in {}:</b>\n\n", html_escape(folder.as_str())));
        if listing.notes.is_empty() {
            text.push_str("No notes yet.\n");
        }
        let now = Utc::now();
        for note in listing.notes.iter().take(MAX_LISTED_NOTES) {
            text.push_str(&note_line(note, now));
            text.push('\n');
        }
        if listing.notes.len() > MAX_LISTED_NOTES {
            text.push_str(&format!("… and {} more\n", listing.notes.len() - MAX_LISTED_NOTES));
        }
    }

    for chunk in split_message(&text, MAX_MESSAGE_CHARS) {
        send_html(&bot, chat, chunk).await?;
    }
    Ok(())
}

/// Handle plain text: record it in the current session and answer it.
pub async fn handle_text(bot: Bot, chat: ChatId, user: UserId, state: Arc<LoamState>, text: String) -> ResponseResult<()> {
    // Typing indicator is best effort
    let _ = bot.send_chat_action(chat, ChatAction::Typing).await;

    match state.manager().handle_message(user, &text).await {
        Ok(exchange) => {
            for chunk in split_message(&exchange.reply.text, MAX_MESSAGE_CHARS) {
                bot.send_message(chat, chunk).await?;
            }
            for note in &exchange.proposals {
                bot.send_message(chat, proposal_preview(note))
                    .parse_mode(ParseMode::Html)
                    .reply_markup(note_keyboard(note.id))
                    .await?;
            }
            info!(
                user = %user,
                folder = %exchange.pointer.folder,
                session = %exchange.pointer.session,
                proposals = exchange.proposals.len(),
                "Message handled"
            );
            Ok(())
        }
        Err(e) => send_error(&bot, chat, user, &e).await,
    }
}

/// Handle an uploaded document: save it to the folder's attachments and
/// pass a description of it through the message path.
pub async fn handle_document(
    bot: Bot,
    chat: ChatId,
    user: UserId,
    state: Arc<LoamState>,
    document: Document,
    caption: Option<String>,
) -> ResponseResult<()> {
    if document.file.size > MAX_DOCUMENT_BYTES {
        return send_html(&bot, chat, "❌ File is too large. Telegram bots can only download files up to 20 MB.").await;
    }
    // Refuse early so nothing is downloaded without a folder
    match state.manager().store().get_current(user) {
        Ok(Some(_)) => {}
        Ok(None) => return send_error(&bot, chat, user, &LoamError::NoContext).await,
        Err(e) => return send_error(&bot, chat, user, &LoamError::from(e)).await,
    }

    let file = bot.get_file(document.file.id.clone()).await?;
    let mut data: Vec<u8> = Vec::with_capacity(file.size as usize);
    if let Err(e) = bot.download_file(&file.path, &mut data).await {
        warn!(user = %user, error = %e, "Document download failed");
        return send_html(&bot, chat, "❌ Could not download the file. Please try again.").await;
    }

    let name = document
        .file_name
        .clone()
        .unwrap_or_else(|| format!("document_{}", Utc::now().format("%Y%m%d_%H%M%S")));
    let (pointer, path) = match state.manager().save_attachment(user, &name, &data) {
        Ok(saved) => saved,
        Err(e) => return send_error(&bot, chat, user, &e).await,
    };

    send_html(
        &bot,
        chat,
        format!("📎 Saved <code>{}/{}</code>", html_escape(pointer.folder.as_str()), html_escape(&path)),
    )
    .await?;

    let mut prompt = format!("I've uploaded a document, saved at {}/{}.", pointer.folder, path);
    if let Some(caption) = caption.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("\n\n{}", caption.trim()));
    }
    handle_text(bot, chat, user, state, prompt).await
}

/// Save and discard buttons under a proposed note.
pub fn note_keyboard(id: u64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Save", format!("{}{}", NOTE_APPROVE_PREFIX, id)),
        InlineKeyboardButton::callback("🗑 Discard", format!("{}{}", NOTE_CANCEL_PREFIX, id)),
    ]])
}

/// Handle an inline-button press.
pub async fn handle_callback(bot: Bot, chat: ChatId, user: UserId, state: Arc<LoamState>, action: CallbackAction) -> ResponseResult<()> {
    let manager = state.manager();
    match action {
        CallbackAction::Switch(handle) => match manager.switch(user, &handle) {
            Ok(summary) => send_switched(&bot, chat, &summary).await,
            Err(e) => send_error(&bot, chat, user, &e).await,
        },
        CallbackAction::ApproveNote(id) => match manager.approve_note(user, id) {
            Ok((note, outcome)) => {
                let verb = match outcome {
                    NoteWrite::Created => "Saved",
                    NoteWrite::Appended => "Appended to",
                };
                send_html(&bot, chat, format!("📝 {} <code>{}</code>", verb, html_escape(note.as_str()))).await
            }
            Err(e) => send_error(&bot, chat, user, &e).await,
        },
        CallbackAction::CancelNote(id) => match manager.cancel_note(user, id) {
            Ok(note) => {
                send_html(&bot, chat, format!("🗑 Discarded <code>{}</code>", html_escape(&note.file))).await
            }
            Err(e) => send_error(&bot, chat, user, &e).await,
        },
    }
}

/// Reply to a known command used with arguments it does not take.
pub async fn handle_usage(bot: Bot, chat: ChatId, command: String, description: String) -> ResponseResult<()> {
    send_html(
        &bot,
        chat,
        format!(
            "<code>/{}</code> takes no arguments.\n\n{}",
            html_escape(&command),
            html_escape(&description)
        ),
    )
    .await
}

async fn send_error(bot: &Bot, chat: ChatId, user: UserId, err: &LoamError) -> ResponseResult<()> {
    match err {
        LoamError::Storage(_) | LoamError::Io { .. } => {
            error!(user = %user, error = %err, "Operation failed")
        }
        _ => info!(user = %user, error = %err, "Request refused"),
    }
    send_html(bot, chat, user_message(err)).await
}

/// Dispatch commands to appropriate handlers.
pub async fn handle_command(
    bot: Bot,
    chat: ChatId,
    user: UserId,
    cmd: Command,
    state: Arc<LoamState>,
) -> ResponseResult<()> {
    match cmd {
        Command::Start => handle_start(bot, chat).await,
        Command::Help => handle_help(bot, chat).await,
        Command::New(folder) => handle_new(bot, chat, user, state, folder).await,
        Command::Create(folder) => handle_create(bot, chat, user, state, folder).await,
        Command::Switch(arg) => handle_switch(bot, chat, user, state, arg).await,
        Command::Session => handle_session(bot, chat, user, state).await,
        Command::Rename(title) => handle_rename(bot, chat, user, state, title).await,
        Command::Star => handle_star(bot, chat, user, state, true).await,
        Command::Unstar => handle_star(bot, chat, user, state, false).await,
        Command::List => handle_list(bot, chat, user, state).await,
    }
}
