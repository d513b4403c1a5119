//! Configuration types for the speech front end.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the speech pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Synthesis backend settings.
    pub synthesis: SynthesisConfig,
    /// Playback and completion-timing settings.
    pub playback: PlaybackConfig,
    /// Sentence segmentation settings.
    pub segmenter: SegmenterConfig,
    /// Amplitude extraction settings.
    pub amplitude: AmplitudeConfig,
}

/// Synthesis backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Full URL of the synthesis endpoint (one POST per chunk).
    pub endpoint: String,
    /// Connection timeout in milliseconds.
    ///
    /// No total-request timeout is applied: the response body is an
    /// open-ended audio stream consumed while it plays.
    pub connect_timeout_ms: u64,
    /// Sample rate of the PCM audio the backend streams, in Hz.
    pub sample_rate: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8940/synthesize".to_owned(),
            connect_timeout_ms: 5_000,
            sample_rate: 24_000,
        }
    }
}

/// Playback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Completion lookahead for non-final chunks, in milliseconds.
    ///
    /// A playback session resolves this long before the clip's true end so
    /// the next chunk's synthesis request overlaps the current tail.
    pub lookahead_ms: u64,
    /// Completion lookahead for the final chunk of a turn, in milliseconds.
    ///
    /// Short: there is no next chunk to prefetch, and cutting the last
    /// clip early sounds unnatural.
    pub final_lookahead_ms: u64,
    /// Capacity of the gapless playback buffer, in milliseconds of audio.
    ///
    /// Appends beyond this await playback progress (backpressure).
    pub buffer_ms: u64,
    /// Poll interval for the completion wait, in milliseconds.
    pub poll_interval_ms: u64,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 2_400,
            final_lookahead_ms: 200,
            buffer_ms: 4_000,
            poll_interval_ms: 20,
            output_device: None,
        }
    }
}

impl PlaybackConfig {
    /// Lookahead window for a chunk, depending on its position in the turn.
    #[must_use]
    pub fn lookahead(&self, is_final: bool) -> Duration {
        if is_final {
            Duration::from_millis(self.final_lookahead_ms)
        } else {
            Duration::from_millis(self.lookahead_ms)
        }
    }
}

/// Sentence segmentation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Minimum pending-buffer length (chars) before clause separators
    /// (space, `,`, `;`, `:`, tab) may split.
    ///
    /// Terminal punctuation (`.`, `!`, `?`, newline) always splits. Raise
    /// this toward whole-turn chunking; 0 splits on any separator.
    pub min_clause_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_clause_chars: 20,
        }
    }
}

/// Amplitude extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmplitudeConfig {
    /// Number of recent samples in the analysis window.
    pub window: usize,
    /// Sampling cadence in milliseconds (animation-frame rate).
    pub frame_interval_ms: u64,
    /// Gain applied to mean-square energy before clamping to [0, 1].
    pub gain: f32,
    /// Exponential smoothing factor in (0, 1]; 1 = no smoothing.
    pub smoothing: f32,
}

impl Default for AmplitudeConfig {
    fn default() -> Self {
        Self {
            window: 1_024,
            frame_interval_ms: 16,
            gain: 8.0,
            smoothing: 0.2,
        }
    }
}

impl VoiceConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::error::VoiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot
    /// be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::VoiceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/aria/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("aria").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("aria")
                .join("config.toml")
        } else {
            PathBuf::from("aria-config.toml")
        }
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error on out-of-range values.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::VoiceError;

        if self.synthesis.endpoint.trim().is_empty() {
            return Err(VoiceError::Config("synthesis.endpoint is empty".to_owned()));
        }
        if self.synthesis.sample_rate == 0 {
            return Err(VoiceError::Config(
                "synthesis.sample_rate must be non-zero".to_owned(),
            ));
        }
        if self.playback.buffer_ms == 0 {
            return Err(VoiceError::Config(
                "playback.buffer_ms must be non-zero".to_owned(),
            ));
        }
        if self.playback.poll_interval_ms == 0 {
            return Err(VoiceError::Config(
                "playback.poll_interval_ms must be non-zero".to_owned(),
            ));
        }
        if self.amplitude.window == 0 {
            return Err(VoiceError::Config(
                "amplitude.window must be non-zero".to_owned(),
            ));
        }
        if !(self.amplitude.smoothing > 0.0 && self.amplitude.smoothing <= 1.0) {
            return Err(VoiceError::Config(
                "amplitude.smoothing must be in (0, 1]".to_owned(),
            ));
        }
        if self.amplitude.gain <= 0.0 {
            return Err(VoiceError::Config(
                "amplitude.gain must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn defaults_are_valid() {
        VoiceConfig::default().validate().unwrap();
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = VoiceConfig::default();
        config.synthesis.endpoint = "http://localhost:9000/tts".to_owned();
        config.playback.lookahead_ms = 1_200;
        config.segmenter.min_clause_chars = 0;

        config.save_to_file(&path).unwrap();
        let loaded = VoiceConfig::from_file(&path).unwrap();

        assert_eq!(loaded.synthesis.endpoint, "http://localhost:9000/tts");
        assert_eq!(loaded.playback.lookahead_ms, 1_200);
        assert_eq!(loaded.segmenter.min_clause_chars, 0);
        // Untouched sections keep defaults.
        assert_eq!(loaded.amplitude.window, 1_024);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[playback]
lookahead_ms = 800
"#;
        let config: VoiceConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.playback.lookahead_ms, 800);
        assert_eq!(config.playback.final_lookahead_ms, 200);
        assert_eq!(config.synthesis.sample_rate, 24_000);
    }

    #[test]
    fn lookahead_picks_window_by_finality() {
        let config = PlaybackConfig::default();
        assert_eq!(config.lookahead(false), Duration::from_millis(2_400));
        assert_eq!(config.lookahead(true), Duration::from_millis(200));
    }

    #[test]
    fn validate_rejects_bad_smoothing() {
        let mut config = VoiceConfig::default();
        config.amplitude.smoothing = 0.0;
        assert!(config.validate().is_err());
        config.amplitude.smoothing = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_endpoint() {
        let mut config = VoiceConfig::default();
        config.synthesis.endpoint = "  ".to_owned();
        assert!(config.validate().is_err());
    }
}
