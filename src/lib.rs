//! Aria: streaming speech front end for real-time AI conversation.
//!
//! Turns a streamed language-model response into continuously playing
//! synthesized speech, and publishes a talking flag plus a live amplitude
//! scalar so an external renderer can animate in sync with the voice.
//!
//! # Architecture
//!
//! The pipeline is built from stages joined by an explicit queue:
//! - **Transport ingestion**: decoded model events (`content` deltas, turn
//!   completion, interruption) arrive on a channel
//! - **Sentence segmentation**: deltas accumulate and split into speakable
//!   chunks at sentence/clause boundaries
//! - **Speech queue**: chunks are spoken strictly in arrival order, one at
//!   a time
//! - **Streaming playback**: each chunk's synthesized audio streams into a
//!   gapless sink and becomes audible before the download finishes; a
//!   session resolves a lookahead window early to hide the next chunk's
//!   synthesis latency
//! - **Amplitude extraction**: the playing waveform is reduced to a
//!   smoothed loudness scalar at animation-frame cadence

mod amplitude;
pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod queue;
pub mod segment;
pub mod state;
pub mod synthesis;

pub use audio::{AudioSink, CpalSink, PcmStreamDecoder};
pub use config::VoiceConfig;
pub use error::{Result, VoiceError};
pub use pipeline::coordinator::VoicePipeline;
pub use pipeline::messages::{SpeakableChunk, TransportEvent};
pub use segment::SentenceSegmenter;
pub use state::{StatePublisher, VisualState, VoiceEvent};
pub use synthesis::SynthesisClient;
