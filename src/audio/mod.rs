//! Audio output: the gapless sink abstraction and its cpal implementation.

pub mod decode;
pub mod sink;

pub use decode::PcmStreamDecoder;
pub use sink::CpalSink;

use crate::error::Result;

/// A gapless playback buffer.
///
/// Decoded samples are appended while earlier samples are still playing;
/// consecutive chunks of a turn share the sink, so one chunk's tail drains
/// while the next chunk appends behind it with no audible seam.
///
/// Counters are monotonic across the sink's lifetime; a playback session
/// snapshots them at its start and end to measure its own clip.
///
/// `append` must not be called concurrently: each append awaits buffer
/// space, and callers serialize appends (the player holds a per-session
/// lock around them).
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync + 'static {
    /// Append samples, awaiting free buffer space as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the output stream is gone.
    async fn append(&self, samples: &[f32]) -> Result<()>;

    /// Drop all buffered-but-unplayed samples immediately (interruption).
    ///
    /// Dropped samples are accounted as played so the counters stay
    /// monotonic and consistent.
    fn clear(&self);

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Total samples accepted by `append` so far.
    fn appended(&self) -> u64;

    /// Total samples delivered to the output (or dropped by `clear`).
    fn played(&self) -> u64;

    /// Copy the most recently played samples (chronological order) into
    /// `out`; returns how many were written. Used by the amplitude
    /// extractor as its time-domain analysis window.
    fn recent_samples(&self, out: &mut [f32]) -> usize;
}
