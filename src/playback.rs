//! Streaming playback of one speakable chunk.
//!
//! A playback session pipelines download and playback: decoded bytes are
//! appended to the gapless sink as they arrive, audio becomes audible after
//! the first append, and the session resolves a lookahead window *before*
//! the clip's true end so the next chunk's synthesis request overlaps the
//! current tail. Exactly one trigger resolves a session — lookahead, loss
//! of playback progress after end of stream, stop, or error.

use crate::amplitude::AmplitudeSampler;
use crate::audio::{AudioSink, PcmStreamDecoder};
use crate::config::{AmplitudeConfig, PlaybackConfig};
use crate::error::{Result, VoiceError};
use crate::pipeline::messages::SpeakableChunk;
use crate::state::StatePublisher;
use crate::synthesis::SynthesisClient;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Resolve anyway after this long without playback progress once the full
/// stream is buffered (output device dead or cleared under us).
const STALL_LIMIT: Duration = Duration::from_secs(1);

/// Plays chunks one at a time through a shared gapless sink.
pub struct StreamingPlayer<S: AudioSink> {
    synth: SynthesisClient,
    sink: Arc<S>,
    publisher: StatePublisher,
    playback: PlaybackConfig,
    amplitude: AmplitudeConfig,
}

/// Per-chunk transient state.
struct PlaybackSession {
    /// True once the first samples were appended (audio is audible).
    started: bool,
    resolved: ResolveGuard,
    sampler: Option<AmplitudeSampler>,
}

impl PlaybackSession {
    fn new() -> Self {
        Self {
            started: false,
            resolved: ResolveGuard::default(),
            sampler: None,
        }
    }
}

/// Ensures a session's completion fires at most once.
#[derive(Debug, Default)]
struct ResolveGuard {
    resolved: bool,
}

impl ResolveGuard {
    /// Mark the session resolved; returns false if it already was.
    fn resolve(&mut self, reason: &str) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        debug!("playback session resolved: {reason}");
        true
    }

    fn is_resolved(&self) -> bool {
        self.resolved
    }
}

impl<S: AudioSink> StreamingPlayer<S> {
    /// Create a player over a synthesis client and an audio sink.
    pub fn new(
        synth: SynthesisClient,
        sink: Arc<S>,
        publisher: StatePublisher,
        playback: PlaybackConfig,
        amplitude: AmplitudeConfig,
    ) -> Self {
        Self {
            synth,
            sink,
            publisher,
            playback,
            amplitude,
        }
    }

    /// Synthesize and play one chunk, resolving when it is done enough for
    /// the next chunk to start.
    ///
    /// The speaking flag is forced false on every exit path; on error the
    /// sink's pending audio is released so a bad chunk leaves no residue.
    ///
    /// # Errors
    ///
    /// Returns an error on synthesis or decode failure. Callers treat a
    /// failed chunk as spoken and continue the queue.
    pub async fn play(&self, chunk: &SpeakableChunk, stop: &CancellationToken) -> Result<()> {
        let mut session = PlaybackSession::new();
        let result = self.run(chunk, stop, &mut session).await;

        // Sampling is scoped to this session.
        session.sampler.take();

        if result.is_err() {
            self.sink.clear();
        }
        self.publisher.set_talking(false);
        result
    }

    async fn run(
        &self,
        chunk: &SpeakableChunk,
        stop: &CancellationToken,
        session: &mut PlaybackSession,
    ) -> Result<()> {
        let mut stream = tokio::select! {
            () = stop.cancelled() => {
                session.resolved.resolve("stopped");
                return Ok(());
            }
            stream = self.synth.stream(chunk.text.trim()) => stream?,
        };
        let mut decoder = PcmStreamDecoder::new();
        // Serializes appends within the session: a new append must await
        // the previous one's completion.
        let append_gate = tokio::sync::Mutex::new(());
        let mut got_bytes = false;

        loop {
            tokio::select! {
                () = stop.cancelled() => {
                    session.resolved.resolve("stopped");
                    self.sink.clear();
                    return Ok(());
                }
                item = stream.next() => match item {
                    Some(Ok(bytes)) => {
                        got_bytes = true;
                        let samples = decoder.feed(&bytes)?;
                        self.append(session, &append_gate, &samples, stop).await?;
                        if session.resolved.is_resolved() {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => {
                        return Err(VoiceError::Synthesis(format!("stream read failed: {e}")));
                    }
                    None => break,
                }
            }
        }

        if !got_bytes {
            return Err(VoiceError::Synthesis("response body was empty".to_owned()));
        }

        let tail = decoder.finish()?;
        self.append(session, &append_gate, &tail, stop).await?;
        if session.resolved.is_resolved() {
            return Ok(());
        }

        // End of stream: the clip's total length is now fixed.
        let target = self.sink.appended();
        self.await_completion(session, target, chunk.is_final, stop)
            .await;
        Ok(())
    }

    /// Append decoded samples, flipping the speaking flag and starting the
    /// amplitude sampler on the first audible append.
    async fn append(
        &self,
        session: &mut PlaybackSession,
        gate: &tokio::sync::Mutex<()>,
        samples: &[f32],
        stop: &CancellationToken,
    ) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let _serialized = gate.lock().await;
        tokio::select! {
            () = stop.cancelled() => {
                session.resolved.resolve("stopped");
                self.sink.clear();
                return Ok(());
            }
            result = self.sink.append(samples) => result?,
        }
        if !session.started {
            session.started = true;
            self.publisher.set_talking(true);
            session.sampler = Some(AmplitudeSampler::spawn(
                Arc::clone(&self.sink),
                self.publisher.clone(),
                self.amplitude.clone(),
                stop,
            ));
        }
        Ok(())
    }

    /// Wait until the clip's unplayed remainder fits in the lookahead
    /// window, then resolve.
    async fn await_completion(
        &self,
        session: &mut PlaybackSession,
        target: u64,
        is_final: bool,
        stop: &CancellationToken,
    ) {
        let lookahead = self.playback.lookahead(is_final);
        let poll = Duration::from_millis(self.playback.poll_interval_ms.max(1));
        let rate = f64::from(self.sink.sample_rate().max(1));
        let mut last_played = self.sink.played();
        let mut stalled = Duration::ZERO;

        loop {
            let played = self.sink.played();
            let remaining =
                Duration::from_secs_f64(target.saturating_sub(played) as f64 / rate);
            if remaining <= lookahead {
                session.resolved.resolve("lookahead window reached");
                return;
            }
            if played == last_played {
                stalled += poll;
                if stalled >= STALL_LIMIT {
                    session
                        .resolved
                        .resolve("no playback progress after end of stream");
                    return;
                }
            } else {
                stalled = Duration::ZERO;
                last_played = played;
            }
            tokio::select! {
                () = stop.cancelled() => {
                    session.resolved.resolve("stopped");
                    self.sink.clear();
                    return;
                }
                () = tokio::time::sleep(poll) => {}
            }
        }
    }
}
