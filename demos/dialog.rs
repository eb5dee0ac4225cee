//! Dialog demo - stream a PCM file and print what the service hears and says.
//!
//! This example demonstrates:
//! - Building a client from environment credentials
//! - Registering handlers for recognition and chat events
//! - Streaming microphone-style audio in fixed-size chunks
//!
//! # Running
//!
//! ```sh
//! export DIALOG_APP_ID=...
//! export DIALOG_ACCESS_KEY=...
//! RUST_LOG=dialog_client=debug cargo run --example dialog -- question.pcm
//! ```
//!
//! The input is 16 kHz mono 16-bit little-endian PCM. Without a file the
//! demo sends two seconds of silence.

use std::time::Duration;

use dialog_client::{ClientBuilder, ClientConfig, ServerEvent, ServerEventId, SessionConfig};
use tracing_subscriber::EnvFilter;

/// 20 ms of 16 kHz mono 16-bit audio.
const CHUNK_BYTES: usize = 640;
const CHUNK_INTERVAL: Duration = Duration::from_millis(20);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let audio = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read(&path).await?,
        None => vec![0u8; CHUNK_BYTES * 100],
    };

    let client = ClientBuilder::from_config(ClientConfig::from_env()?)
        .on(ServerEventId::AsrResponse, |event| {
            if let ServerEvent::AsrResponse(asr) = &event.event {
                for result in asr.results.iter().filter(|r| !r.is_interim) {
                    println!("you: {}", result.text);
                }
            }
            Ok(())
        })
        .on(ServerEventId::ChatResponse, |event| {
            if let Some(chat) = event.chat() {
                print!("{}", chat.content);
            }
            Ok(())
        })
        .on(ServerEventId::ChatEnded, |_| {
            println!();
            Ok(())
        })
        .on(ServerEventId::TtsResponse, |event| {
            if let Some(audio) = event.audio() {
                tracing::debug!(bytes = audio.len(), "Synthesized audio");
            }
            Ok(())
        })
        .on_error(|e| eprintln!("error: {e}"))
        .build()?;

    client.connect().await?;
    let session_id = client.start_session(SessionConfig::default()).await?;
    println!("session {session_id} started");

    client.send_hello("你好").await?;

    let mut ticker = tokio::time::interval(CHUNK_INTERVAL);
    for chunk in audio.chunks(CHUNK_BYTES) {
        ticker.tick().await;
        client.send_audio(chunk.to_vec()).await?;
    }

    // trailing silence so the service detects the end of the utterance
    for _ in 0..50 {
        ticker.tick().await;
        client.send_audio(vec![0u8; CHUNK_BYTES]).await?;
    }
    tokio::time::sleep(Duration::from_secs(5)).await;

    client.finish_session().await?;
    client.disconnect().await?;
    Ok(())
}
