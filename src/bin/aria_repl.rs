//! Interactive harness for the speech pipeline.
//!
//! Reads stdin as a fake model transport: each line is a `content` delta,
//! an empty line completes the turn, and `/stop` interrupts. Useful for
//! exercising a synthesis backend end to end without a model connection.

use anyhow::Context;
use aria::{CpalSink, TransportEvent, VoiceConfig, VoiceEvent, VoicePipeline};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => VoiceConfig::from_file(std::path::Path::new(&path))
            .with_context(|| format!("loading config from {path}"))?,
        None => VoiceConfig::default(),
    };

    let sink = Arc::new(CpalSink::new(&config).context("opening audio output")?);
    let pipeline = VoicePipeline::start(config, sink)?;
    let transport = pipeline.transport();

    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                VoiceEvent::Speaking { active } => info!("speaking: {active}"),
                VoiceEvent::Sentence(chunk) => info!("queued: {:?}", chunk.text.trim()),
                _ => {}
            }
        }
    });

    info!("type text; empty line = turn complete, /stop = interrupt, ctrl-d = quit");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let event = if line.is_empty() {
            TransportEvent::TurnComplete
        } else if line.trim() == "/stop" {
            TransportEvent::Interrupted
        } else {
            TransportEvent::Content { text: line }
        };
        transport
            .send(event)
            .await
            .context("pipeline stopped accepting events")?;
    }

    pipeline.shutdown().await?;
    Ok(())
}
