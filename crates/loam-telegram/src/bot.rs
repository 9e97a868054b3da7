//! Main Telegram bot implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use loam_models::UserId;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, Me, User};
use teloxide::utils::command::BotCommands;
use tokio::time::interval;
use tracing::{info, warn};

use crate::error::{Result, TelegramError};
use crate::handlers::{
    handle_callback, handle_command, handle_document, handle_text, handle_usage, loam_user,
    parse_callback, route_text, Command, Route,
};
use crate::state::LoamState;

/// How often the retention sweep runs.
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// The Telegram bot for Loam.
pub struct LoamBot {
    /// The teloxide bot instance.
    bot: Bot,
    /// Shared state across handlers.
    state: Arc<LoamState>,
}

impl LoamBot {
    pub fn new(token: impl Into<String>, state: Arc<LoamState>) -> Self {
        Self {
            bot: Bot::new(token),
            state,
        }
    }

    /// Get the bot's username.
    pub async fn get_me(&self) -> Result<String> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| TelegramError::BotStartFailed(e.to_string()))?;
        Ok(me.username().to_string())
    }

    /// Register the command list with Telegram for autocomplete.
    pub async fn register_commands(&self) -> Result<()> {
        self.bot.set_my_commands(Command::bot_commands()).await?;
        Ok(())
    }

    /// Start the bot in polling mode. Returns on Ctrl-C.
    pub async fn start_polling(&self) -> Result<()> {
        info!("Starting Telegram bot in polling mode...");

        if let Err(e) = self.register_commands().await {
            warn!(error = %e, "Could not register bot commands");
        }

        spawn_retention_sweep(Arc::clone(&self.state));

        let state_for_callbacks = Arc::clone(&self.state);
        let state_for_messages = Arc::clone(&self.state);
        let state_for_documents = Arc::clone(&self.state);

        let handler = dptree::entry()
            .branch(
                Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
                    let state = Arc::clone(&state_for_callbacks);
                    async move { on_callback(bot, q, state).await }
                }),
            )
            .branch(
                // Commands and plain text share one branch so a misused
                // command gets a usage reply instead of reaching the session
                Update::filter_message()
                    .filter(|msg: Message| msg.text().is_some())
                    .endpoint(move |bot: Bot, msg: Message, me: Me| {
                        let state = Arc::clone(&state_for_messages);
                        async move {
                            let Some(user) = admit(&bot, &msg, &state).await? else {
                                return Ok(());
                            };
                            let text = msg.text().unwrap_or_default().to_string();
                            let chat = msg.chat.id;
                            let job_state = Arc::clone(&state);
                            match route_text(&text, me.username()) {
                                Route::Command(cmd) => {
                                    info!(user = %user, command = ?cmd, "Command received");
                                    enqueue(&state, user, "command", async move {
                                        handle_command(bot, chat, user, cmd, job_state).await
                                    });
                                }
                                Route::Usage { command, description } => {
                                    info!(user = %user, command = %command, "Command misused");
                                    enqueue(&state, user, "usage", async move {
                                        handle_usage(bot, chat, command, description).await
                                    });
                                }
                                Route::Text => {
                                    info!(user = %user, chars = text.chars().count(), "Message received");
                                    enqueue(&state, user, "message", async move {
                                        handle_text(bot, chat, user, job_state, text).await
                                    });
                                }
                            }
                            Ok(())
                        }
                    }),
            )
            .branch(
                Update::filter_message()
                    .filter(|msg: Message| msg.document().is_some())
                    .endpoint(move |bot: Bot, msg: Message| {
                        let state = Arc::clone(&state_for_documents);
                        async move {
                            let Some(user) = admit(&bot, &msg, &state).await? else {
                                return Ok(());
                            };
                            let Some(document) = msg.document().cloned() else {
                                return Ok(());
                            };
                            info!(
                                user = %user,
                                file_name = ?document.file_name,
                                size = document.file.size,
                                "Document received"
                            );
                            let chat = msg.chat.id;
                            let caption = msg.caption().map(str::to_string);
                            let job_state = Arc::clone(&state);
                            enqueue(&state, user, "document", async move {
                                handle_document(bot, chat, user, job_state, document, caption).await
                            });
                            Ok(())
                        }
                    }),
            );

        info!("Bot is running! Send /start to begin.");

        Dispatcher::builder(self.bot.clone(), handler)
            .default_handler(|upd| async move {
                tracing::debug!(update = ?upd.id, "Unhandled update");
            })
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        info!("Bot stopped");
        Ok(())
    }
}

/// Checks the sender against the allow-list and registers first-time users.
async fn admit(bot: &Bot, msg: &Message, state: &LoamState) -> ResponseResult<Option<UserId>> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(None);
    };
    let Some(user) = authorize(from, state) else {
        bot.send_message(msg.chat.id, "⛔ You are not allowed to use this bot.")
            .await?;
        return Ok(None);
    };
    Ok(Some(user))
}

fn authorize(from: &User, state: &LoamState) -> Option<UserId> {
    let user = loam_user(from);
    if !state.is_authorized(user) {
        warn!(user = %user, username = ?from.username, "Refused unauthorized user");
        return None;
    }
    state.register(user);
    Some(user)
}

async fn on_callback(bot: Bot, q: CallbackQuery, state: Arc<LoamState>) -> ResponseResult<()> {
    let Some(user) = authorize(&q.from, &state) else {
        bot.answer_callback_query(q.id.clone())
            .text("Not allowed")
            .await?;
        return Ok(());
    };

    bot.answer_callback_query(q.id.clone()).await?;

    let Some(action) = q.data.as_deref().and_then(parse_callback) else {
        return Ok(());
    };

    let chat = reply_chat(q.message.as_ref().map(|m| m.chat().id), q.from.id);
    let job_state = Arc::clone(&state);
    enqueue(&state, user, "callback", async move {
        handle_callback(bot, chat, user, job_state, action).await
    });
    Ok(())
}

/// Where to answer a button press: the chat holding the button, or the
/// presser's private chat when Telegram no longer reports it.
fn reply_chat(origin: Option<ChatId>, presser: teloxide::types::UserId) -> ChatId {
    origin.unwrap_or_else(|| ChatId::from(presser))
}

/// Queues a handler behind the user's earlier updates. Handler errors are
/// logged; the worker moves on to the next job.
fn enqueue<F>(state: &LoamState, user: UserId, kind: &'static str, fut: F)
where
    F: Future<Output = ResponseResult<()>> + Send + 'static,
{
    state.enqueue(
        user,
        async move {
            if let Err(e) = fut.await {
                warn!(user = %user, kind, error = %e, "Handler failed");
            }
        }
        .boxed(),
    );
}

/// Applies the retention policy to every user on a fixed interval.
fn spawn_retention_sweep(state: Arc<LoamState>) {
    if state.retention().is_noop() {
        info!("Retention disabled; keeping every session");
        return;
    }
    tokio::spawn(async move {
        let mut ticker = interval(RETENTION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match state.manager().apply_retention(state.retention(), Utc::now()) {
                Ok(0) => {}
                Ok(evicted) => info!(evicted, "Retention sweep archived sessions"),
                Err(e) => warn!(error = %e, "Retention sweep failed"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_reply_goes_to_button_chat() {
        let group = ChatId(-1001234567890);
        let presser = teloxide::types::UserId(42);
        assert_eq!(reply_chat(Some(group), presser), group);
        assert_eq!(reply_chat(None, presser), ChatId(42));
    }
}
