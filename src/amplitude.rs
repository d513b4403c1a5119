//! Speech amplitude extraction.
//!
//! While a chunk is audibly playing, a sampler task reads the sink's
//! recent time-domain window at animation-frame cadence, reduces it to
//! mean-square energy, and publishes a smoothed loudness scalar in [0, 1]
//! for the external renderer. The task is scoped to one playback session
//! and cannot outlive it.

use crate::audio::AudioSink;
use crate::config::AmplitudeConfig;
use crate::state::StatePublisher;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Mean-square energy of a sample window (samples already in [-1, 1]).
pub(crate) fn mean_square(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32
}

/// One exponential-smoothing step toward `target`.
pub(crate) fn smooth(level: f32, target: f32, factor: f32) -> f32 {
    level + (target - level) * factor
}

/// Handle to a running per-session sampler; dropping it stops sampling.
pub(crate) struct AmplitudeSampler {
    token: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl AmplitudeSampler {
    /// Start sampling `sink` until cancelled or the parent token fires.
    pub(crate) fn spawn<S>(
        sink: Arc<S>,
        publisher: StatePublisher,
        config: AmplitudeConfig,
        parent: &CancellationToken,
    ) -> Self
    where
        S: AudioSink + ?Sized,
    {
        let token = parent.child_token();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut window = vec![0.0f32; config.window.max(1)];
            let mut level = 0.0f32;
            let mut ticks =
                tokio::time::interval(Duration::from_millis(config.frame_interval_ms.max(1)));
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    _ = ticks.tick() => {
                        let n = sink.recent_samples(&mut window);
                        if n == 0 {
                            continue;
                        }
                        let target = (mean_square(&window[..n]) * config.gain).clamp(0.0, 1.0);
                        level = smooth(level, target, config.smoothing);
                        publisher.set_amplitude(level);
                    }
                }
            }
        });
        Self { token, handle }
    }
}

impl Drop for AmplitudeSampler {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::Result;
    use crate::state::VoiceEvent;
    use tokio::sync::broadcast;

    #[test]
    fn mean_square_of_constant_signal() {
        let window = [0.5f32; 64];
        assert!((mean_square(&window) - 0.25).abs() < 1e-6);
        assert_eq!(mean_square(&[]), 0.0);
    }

    #[test]
    fn smoothing_converges_to_target() {
        let mut level = 0.0;
        for _ in 0..64 {
            level = smooth(level, 1.0, 0.2);
        }
        assert!(level > 0.99);
    }

    struct ToneSink;

    #[async_trait::async_trait]
    impl crate::audio::AudioSink for ToneSink {
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
        fn recent_samples(&self, out: &mut [f32]) -> usize {
            for slot in out.iter_mut() {
                *slot = 0.3;
            }
            out.len()
        }
    }

    #[tokio::test]
    async fn sampler_publishes_levels_until_dropped() {
        let (tx, mut rx) = broadcast::channel(64);
        let publisher = StatePublisher::new(tx);
        let parent = CancellationToken::new();
        let config = AmplitudeConfig {
            frame_interval_ms: 1,
            ..AmplitudeConfig::default()
        };

        let sampler =
            AmplitudeSampler::spawn(Arc::new(ToneSink), publisher, config, &parent);

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            VoiceEvent::Amplitude { level } => assert!(level > 0.0 && level <= 1.0),
            other => panic!("expected amplitude event, got {other:?}"),
        }

        drop(sampler);
    }
}
