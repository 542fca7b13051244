//! Interactive console client for the assistant core.
//!
//! Streams replies token by token to stdout and can read the latest
//! reply aloud. Commands: `:say` plays the latest reply, `:stop` halts
//! playback, `:think` toggles thinking mode, `:quit` exits.

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use kinesia::audio::{CpalSink, SpeechPlayer};
use kinesia::chat::message::Role;
use kinesia::chat::session::ChatSession;
use kinesia::storage::fs::FsHistoryStore;
use kinesia::{AssistConfig, ChatProfile, GeminiClient};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kinesia=info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("kinesia-console failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> kinesia::Result<()> {
    // Optional first argument: config file path.
    let config = match std::env::args().nth(1) {
        Some(path) => AssistConfig::from_file(std::path::Path::new(&path))?,
        None => {
            let default_path = AssistConfig::default_config_path();
            if default_path.exists() {
                AssistConfig::from_file(&default_path)?
            } else {
                AssistConfig::default()
            }
        }
    };

    let client = Arc::new(GeminiClient::new(config.gemini.clone())?);
    let store = Arc::new(FsHistoryStore::new(config.storage.resolve_data_dir())?);
    let player = Arc::new(SpeechPlayer::new(
        Arc::clone(&client) as _,
        Arc::new(CpalSink::new(config.audio.clone())) as _,
    ));

    let session = ChatSession::restore(
        ChatProfile::Patient,
        &config.chat,
        Arc::clone(&client) as _,
        store,
    )
    .await
    .with_delta_listener(Box::new(|chunk| {
        print!("{chunk}");
        let _ = std::io::stdout().flush();
    }));

    println!("kinesia v{}", env!("CARGO_PKG_VERSION"));
    if let Some(greeting) = session.messages().last() {
        println!("\n{}\n", greeting.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };

        match line.trim() {
            ":quit" | ":q" => break,
            ":stop" => player.stop(),
            ":think" => {
                session.set_thinking_mode(!session.thinking_mode());
                println!(
                    "thinking mode {}",
                    if session.thinking_mode() { "on" } else { "off" }
                );
            }
            ":say" => say_latest_reply(&session, &player).await,
            "" => {}
            text => {
                session.send_message(text).await;
                println!();
            }
        }
    }

    player.stop();
    Ok(())
}

/// Play the most recent model reply, if any.
async fn say_latest_reply(session: &ChatSession, player: &SpeechPlayer) {
    let messages = session.messages();
    let Some(reply) = messages.iter().rev().find(|m| m.role == Role::Model) else {
        println!("nothing to read yet");
        return;
    };
    player.play(&reply.id, &reply.content).await;
}
