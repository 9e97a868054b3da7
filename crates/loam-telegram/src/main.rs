//! Loam Telegram Bot binary.
//!
//! Start the bot with:
//! ```bash
//! TELEGRAM_BOT_TOKEN=xxx LOAM_ALLOWED_USERS=123 OPENROUTER_API_KEY=xxx cargo run -p loam-telegram
//! ```

use std::sync::Arc;

use clap::Parser;
use loam_agent::{NoteAgent, OpenRouterClient};
use loam_core::config::{self, LoamConfig};
use loam_core::{ContextManager, VaultIndex};
use loam_persistence::{JsonRecordStore, PersistenceError, SessionStore};
use loam_telegram::{create_shared_state, LoamBot};
use tracing_subscriber::EnvFilter;

/// Loam - capture thoughts into your notes vault from Telegram
#[derive(Parser, Debug)]
#[command(name = "loam-telegram")]
#[command(about = "Telegram capture bot that keeps notes in an Obsidian-style vault")]
struct Args {
    /// Notes vault root (overrides LOAM_VAULT_PATH)
    #[arg(long)]
    vault: Option<String>,

    /// Persisted state directory (overrides LOAM_STATE_DIR)
    #[arg(long)]
    state_dir: Option<String>,

    /// Verbose logging (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load environment variables from the state directory first
    let env_path = config::env_file();
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }
    let _ = dotenvy::dotenv();

    let filter = match args.verbose {
        0 => "loam_telegram=info,loam_core=info,loam_persistence=info,loam_agent=info,teloxide=warn",
        1 => "loam_telegram=debug,loam_core=debug,loam_persistence=debug,loam_agent=debug,teloxide=info",
        2 => "loam_telegram=trace,loam_core=trace,loam_persistence=trace,loam_agent=trace,teloxide=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut cfg = LoamConfig::from_env()?;
    if let Some(vault) = args.vault.as_deref() {
        cfg.vault_path = config::expand_path(vault);
    }
    if let Some(state_dir) = args.state_dir.as_deref() {
        cfg.state_dir = config::expand_path(state_dir);
    }

    let records = match JsonRecordStore::open(&cfg.state_dir) {
        Ok(records) => records,
        Err(PersistenceError::Corrupt { path, reason }) => {
            tracing::error!(path = %path.display(), reason = %reason, "Persisted state is corrupt");
            eprintln!(
                "Refusing to start: session state at {} is corrupt ({}).\n\
                 Restore it from a backup or move it aside; Loam never resets state on its own.",
                path.display(),
                reason
            );
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    let store = SessionStore::new(Arc::new(records));
    let vault = Arc::new(VaultIndex::open(&cfg.vault_path)?);

    let client = OpenRouterClient::new(cfg.openrouter_api_key.clone(), cfg.model.clone(), cfg.agent_timeout);
    let agent = NoteAgent::new(client).with_folder_awareness(cfg.folder_awareness);
    let manager = ContextManager::new(vault, Arc::new(store), Arc::new(agent))
        .with_context_window(cfg.context_window);

    let state = create_shared_state(manager, cfg.allowed_users.clone(), cfg.retention.clone());
    let bot = LoamBot::new(cfg.telegram_token.clone(), state);

    match bot.get_me().await {
        Ok(username) => {
            tracing::info!(
                username = %username,
                vault = %cfg.vault_path.display(),
                state_dir = %cfg.state_dir.display(),
                model = %cfg.model,
                "Bot initialized successfully"
            );
            println!("\n🌱 Loam");
            println!("   Bot: @{}", username);
            println!("   Vault: {}", cfg.vault_path.display());
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get bot info");
            return Err(e.into());
        }
    }

    println!("\n   Open Telegram and send /start to begin");
    println!("   Press Ctrl+C to stop\n");

    bot.start_polling().await?;

    Ok(())
}
