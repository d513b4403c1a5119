//! Visual state vocabulary and the talking-state publisher.
//!
//! The external renderer consumes a state name and an amplitude scalar.
//! This pipeline only ever *sets* [`VisualState::Speaking`]; the remaining
//! states belong to the surrounding application, but the vocabulary lives
//! here so every consumer shares one type.

use crate::pipeline::messages::SpeakableChunk;
use tokio::sync::broadcast;

/// Visual states understood by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualState {
    /// Nothing happening.
    Idle,
    /// Capturing user speech.
    Listening,
    /// Waiting for the model.
    Thinking,
    /// Producing audible speech.
    Speaking,
    /// Running an external lookup.
    Searching,
    /// Showing rich content (charts, video).
    Displaying,
}

impl VisualState {
    /// Renderer-facing state name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Searching => "searching",
            Self::Displaying => "displaying",
        }
    }
}

impl std::fmt::Display for VisualState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events published by the pipeline for the renderer and UI.
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    /// A visual state transition requested by the pipeline.
    State(VisualState),
    /// Whether the assistant is currently producing audible speech.
    Speaking {
        /// True from the first audible append to session resolution.
        active: bool,
    },
    /// Smoothed speech amplitude in [0, 1], at animation-frame cadence.
    Amplitude {
        /// Current smoothed level.
        level: f32,
    },
    /// A sentence entering the speech queue (for captions/UI).
    Sentence(SpeakableChunk),
}

/// Publishes talking state and amplitude to subscribers.
///
/// Pure notification: holds no state beyond the channel it forwards to.
/// Send failures (no subscribers) are ignored.
#[derive(Debug, Clone)]
pub struct StatePublisher {
    events: broadcast::Sender<VoiceEvent>,
}

impl StatePublisher {
    /// Wrap a broadcast sender.
    #[must_use]
    pub fn new(events: broadcast::Sender<VoiceEvent>) -> Self {
        Self { events }
    }

    /// Flip the speaking flag. On the rising edge the `speaking` visual
    /// state is published alongside.
    pub fn set_talking(&self, active: bool) {
        if active {
            let _ = self.events.send(VoiceEvent::State(VisualState::Speaking));
        }
        let _ = self.events.send(VoiceEvent::Speaking { active });
    }

    /// Publish an amplitude sample, clamped to [0, 1].
    pub fn set_amplitude(&self, level: f32) {
        let _ = self.events.send(VoiceEvent::Amplitude {
            level: level.clamp(0.0, 1.0),
        });
    }

    /// Tee a queued sentence to subscribers.
    pub fn sentence(&self, chunk: &SpeakableChunk) {
        let _ = self.events.send(VoiceEvent::Sentence(chunk.clone()));
    }
}
