//! Wires the pipeline stages together.
//!
//! Two tasks joined by the speech queue:
//! - the **transport stage** consumes decoded transport events, feeds the
//!   sentence segmenter, pushes chunks, and handles interruption;
//! - the **speech stage** drains the queue one chunk at a time through the
//!   streaming player, so playback is serialized in arrival order.

use crate::audio::AudioSink;
use crate::config::VoiceConfig;
use crate::error::{Result, VoiceError};
use crate::pipeline::messages::TransportEvent;
use crate::playback::StreamingPlayer;
use crate::queue::SpeechQueue;
use crate::segment::SentenceSegmenter;
use crate::state::{StatePublisher, VoiceEvent};
use crate::synthesis::SynthesisClient;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Capacity of the transport ingestion channel.
const TRANSPORT_CHANNEL_CAPACITY: usize = 64;
/// Capacity of the broadcast event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Shared handle to the cancellation token of the active playback session.
///
/// Interruption cancels the current token and installs a fresh one for the
/// next session.
type SessionStop = Arc<Mutex<CancellationToken>>;

/// The running speech pipeline.
pub struct VoicePipeline {
    transport_tx: mpsc::Sender<TransportEvent>,
    events: broadcast::Sender<VoiceEvent>,
    cancel: CancellationToken,
    transport_task: JoinHandle<()>,
    speech_task: JoinHandle<()>,
}

impl VoicePipeline {
    /// Validate the configuration and spawn the pipeline stages.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid configuration or if the synthesis
    /// client cannot be built.
    pub fn start<S: AudioSink>(config: VoiceConfig, sink: Arc<S>) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        let publisher = StatePublisher::new(events.clone());
        let queue = Arc::new(SpeechQueue::new());
        let synth = SynthesisClient::new(&config.synthesis)?;
        let player = StreamingPlayer::new(
            synth,
            Arc::clone(&sink),
            publisher.clone(),
            config.playback.clone(),
            config.amplitude.clone(),
        );
        let cancel = CancellationToken::new();
        let session_stop: SessionStop = Arc::new(Mutex::new(CancellationToken::new()));

        let transport_task = tokio::spawn(run_transport_stage(
            transport_rx,
            SentenceSegmenter::new(config.segmenter.min_clause_chars),
            Arc::clone(&queue),
            publisher.clone(),
            Arc::clone(&session_stop),
            Arc::clone(&sink),
            cancel.clone(),
        ));
        let speech_task = tokio::spawn(run_speech_stage(
            queue,
            player,
            publisher,
            session_stop,
            cancel.clone(),
        ));

        Ok(Self {
            transport_tx,
            events,
            cancel,
            transport_task,
            speech_task,
        })
    }

    /// Sender for transport events (content deltas, turn completion,
    /// interruption).
    #[must_use]
    pub fn transport(&self) -> mpsc::Sender<TransportEvent> {
        self.transport_tx.clone()
    }

    /// Subscribe to pipeline events (speaking edges, amplitude, sentences).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.events.subscribe()
    }

    /// Stop both stages and wait for them to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage task panicked.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        for task in [self.transport_task, self.speech_task] {
            task.await
                .map_err(|e| VoiceError::Pipeline(format!("stage task failed: {e}")))?;
        }
        Ok(())
    }
}

async fn run_transport_stage<S: AudioSink>(
    mut rx: mpsc::Receiver<TransportEvent>,
    mut segmenter: SentenceSegmenter,
    queue: Arc<SpeechQueue>,
    publisher: StatePublisher,
    session_stop: SessionStop,
    sink: Arc<S>,
    cancel: CancellationToken,
) {
    // Accumulated turn text, for turn-boundary diagnostics only.
    let mut turn_text = String::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(TransportEvent::Content { text }) => {
                    turn_text.push_str(&text);
                    if let Some(chunk) = segmenter.feed(&text) {
                        publisher.sentence(&chunk);
                        queue.push(chunk);
                    }
                }
                Some(TransportEvent::TurnComplete) => {
                    debug!("turn complete ({} chars)", turn_text.chars().count());
                    turn_text.clear();
                    if let Some(chunk) = segmenter.flush() {
                        publisher.sentence(&chunk);
                        queue.push(chunk);
                    }
                }
                Some(TransportEvent::Interrupted) => {
                    let dropped = queue.len();
                    queue.clear();
                    {
                        let mut stop = session_stop
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner);
                        stop.cancel();
                        *stop = CancellationToken::new();
                    }
                    // Silence any tail still draining after an early
                    // session resolution.
                    sink.clear();
                    publisher.set_talking(false);
                    turn_text.clear();
                    let _ = segmenter.flush();
                    info!("interrupted: dropped {dropped} queued chunks");
                }
                None => break,
            }
        }
    }
}

async fn run_speech_stage<S: AudioSink>(
    queue: Arc<SpeechQueue>,
    player: StreamingPlayer<S>,
    publisher: StatePublisher,
    session_stop: SessionStop,
    cancel: CancellationToken,
) {
    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => break,
            chunk = queue.pop() => chunk,
        };

        let stop = session_stop
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        tokio::select! {
            () = cancel.cancelled() => {
                publisher.set_talking(false);
                break;
            }
            result = player.play(&chunk, &stop) => {
                // A failed chunk counts as spoken; the queue must not stall.
                if let Err(e) = result {
                    error!("speech chunk failed: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::Result;

    struct NullSink;

    #[async_trait::async_trait]
    impl AudioSink for NullSink {
        async fn append(&self, _samples: &[f32]) -> Result<()> {
            Ok(())
        }
        fn clear(&self) {}
        fn sample_rate(&self) -> u32 {
            24_000
        }
        fn appended(&self) -> u64 {
            0
        }
        fn played(&self) -> u64 {
            0
        }
        fn recent_samples(&self, _out: &mut [f32]) -> usize {
            0
        }
    }

    #[tokio::test]
    async fn starts_and_shuts_down_cleanly() {
        let pipeline = VoicePipeline::start(VoiceConfig::default(), Arc::new(NullSink)).unwrap();
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let mut config = VoiceConfig::default();
        config.synthesis.endpoint = String::new();
        assert!(VoicePipeline::start(config, Arc::new(NullSink)).is_err());
    }

    #[tokio::test]
    async fn interrupt_with_idle_pipeline_is_harmless() {
        let pipeline = VoicePipeline::start(VoiceConfig::default(), Arc::new(NullSink)).unwrap();
        let transport = pipeline.transport();
        transport.send(TransportEvent::Interrupted).await.unwrap();
        transport.send(TransportEvent::TurnComplete).await.unwrap();
        pipeline.shutdown().await.unwrap();
    }
}
