use anyhow::Result;
use clap::Parser;
use relaybot::channels::ConsoleChannel;
use relaybot::cli::{Cli, Commands};
use relaybot::storage::{JsonFileStorage, PersistentStore};
use relaybot::{utils, Relay, Settings};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::new()?;
    init_tracing(&settings);

    match cli.command {
        Commands::Run { user } => handle_run(&settings, user).await,
        Commands::Chat { user, text } => handle_chat(&settings, user, text).await,
        Commands::History { user } => handle_history(&settings, user).await,
        Commands::Users => handle_users(&settings).await,
    }
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn handle_run(settings: &Settings, user: String) -> Result<()> {
    utils::print_header("Relay (console channel)");
    utils::print_info("Type messages, prefix with @user to switch sender (Ctrl+D to exit)\n");

    let console = Arc::new(ConsoleChannel::new(user));
    let relay = Arc::new(Relay::from_settings(settings, console.clone()).await?);

    let (sender, receiver) = mpsc::channel(settings.system.channel_buffer_size);
    let reader = tokio::spawn(async move { console.read_stdin(sender).await });

    tokio::select! {
        result = relay.clone().run(receiver) => result?,
        _ = tokio::signal::ctrl_c() => {
            utils::print_info("\nShutting down...");
            relay.conversations().shutdown().await?;
            // The stdin reader cannot be cancelled; exit once history is flushed.
            std::process::exit(0);
        }
    }

    match reader.await {
        Ok(Err(e)) => utils::print_error(&format!("Console input failed: {}", e)),
        Err(e) => utils::print_error(&format!("Console reader panicked: {}", e)),
        Ok(Ok(())) => {}
    }
    Ok(())
}

async fn handle_chat(settings: &Settings, user: String, text: String) -> Result<()> {
    let console = Arc::new(ConsoleChannel::new(user.clone()));
    let relay = Relay::from_settings(settings, console).await?;

    let outcome = relay.handle_inbound(&user, &text).await;
    if !outcome.is_success() {
        utils::print_error("Completion failed, apology sent (see log for details)");
    }

    relay.conversations().shutdown().await
}

async fn handle_history(settings: &Settings, user: String) -> Result<()> {
    let store = load_snapshot(settings).await?;

    match store.get(&user) {
        Some(history) => {
            utils::print_header(&format!("History for {} ({} turns)", user, history.len()));
            for turn in history {
                utils::print_turn(turn);
            }
        }
        None => utils::print_info(&format!("No history for {}", user)),
    }
    Ok(())
}

async fn handle_users(settings: &Settings) -> Result<()> {
    let store = load_snapshot(settings).await?;

    if store.is_empty() {
        utils::print_info("No stored conversations");
    }
    for (user, history) in &store {
        println!("{} ({} turns)", user, history.len());
    }
    Ok(())
}

async fn load_snapshot(settings: &Settings) -> Result<relaybot::ConversationStore> {
    let storage = Arc::new(JsonFileStorage::new(settings.storage.history_file.clone()));
    Ok(PersistentStore::new(storage).try_load().await?)
}
