//! Incremental decoding of the synthesis byte stream.
//!
//! The backend streams 16-bit little-endian PCM, either headerless or
//! wrapped in a RIFF/WAVE header. Byte segments arrive at arbitrary
//! boundaries: a segment may end mid-sample or mid-header, so the decoder
//! carries partial state between feeds.

use crate::error::{Result, VoiceError};
use tracing::warn;

/// Upper bound on header bytes buffered while looking for the `data` chunk.
const MAX_HEADER_BYTES: usize = 64 * 1024;

#[derive(Debug)]
enum HeaderState {
    /// Accumulating bytes until the stream identifies itself.
    Probe(Vec<u8>),
    /// Header (if any) consumed; bytes are raw PCM.
    Pcm,
}

/// Streaming PCM16 decoder with cross-segment carry.
#[derive(Debug)]
pub struct PcmStreamDecoder {
    header: HeaderState,
    /// Leftover byte of a sample split across segments.
    carry: Option<u8>,
}

impl Default for PcmStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PcmStreamDecoder {
    /// Create a decoder at the start of a stream.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: HeaderState::Probe(Vec::new()),
            carry: None,
        }
    }

    /// Feed one received byte segment; returns the samples it completes.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed or oversized RIFF header.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<f32>> {
        match &mut self.header {
            HeaderState::Pcm => Ok(self.decode(bytes)),
            HeaderState::Probe(buf) => {
                buf.extend_from_slice(bytes);
                if buf.len() < 4 {
                    return Ok(Vec::new());
                }
                if &buf[..4] != b"RIFF" {
                    let pcm = std::mem::take(buf);
                    self.header = HeaderState::Pcm;
                    return Ok(self.decode(&pcm));
                }
                if buf.len() > MAX_HEADER_BYTES {
                    return Err(VoiceError::Audio(
                        "RIFF header exceeds size limit without a data chunk".to_owned(),
                    ));
                }
                if buf.len() < 12 {
                    return Ok(Vec::new());
                }
                if &buf[8..12] != b"WAVE" {
                    return Err(VoiceError::Audio("RIFF stream is not WAVE".to_owned()));
                }
                // Walk sub-chunks until `data`; everything after its header
                // is PCM.
                let mut offset = 12;
                while buf.len() >= offset + 8 {
                    let id = &buf[offset..offset + 4];
                    let size = u32::from_le_bytes([
                        buf[offset + 4],
                        buf[offset + 5],
                        buf[offset + 6],
                        buf[offset + 7],
                    ]) as usize;
                    if id == b"data" {
                        let pcm = buf[offset + 8..].to_vec();
                        self.header = HeaderState::Pcm;
                        return Ok(self.decode(&pcm));
                    }
                    // Sub-chunks are word-aligned.
                    offset += 8 + size + (size & 1);
                }
                Ok(Vec::new())
            }
        }
    }

    /// Finish the stream, resolving any undecided probe bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ended inside a RIFF header.
    pub fn finish(&mut self) -> Result<Vec<f32>> {
        match std::mem::replace(&mut self.header, HeaderState::Pcm) {
            HeaderState::Pcm => {
                if self.carry.take().is_some() {
                    warn!("PCM stream ended mid-sample; dropping trailing byte");
                }
                Ok(Vec::new())
            }
            HeaderState::Probe(buf) => {
                if buf.len() >= 4 && &buf[..4] == b"RIFF" {
                    return Err(VoiceError::Audio(
                        "stream ended inside RIFF header".to_owned(),
                    ));
                }
                // A stream shorter than the probe threshold is raw PCM.
                let samples = self.decode(&buf);
                if self.carry.take().is_some() {
                    warn!("PCM stream ended mid-sample; dropping trailing byte");
                }
                Ok(samples)
            }
        }
    }

    fn decode(&mut self, bytes: &[u8]) -> Vec<f32> {
        if bytes.is_empty() {
            return Vec::new();
        }
        let mut samples = Vec::with_capacity(bytes.len() / 2 + 1);
        let mut iter = bytes.iter().copied();

        // `bytes` is non-empty here, so the high byte is always available.
        if let Some(lo) = self.carry.take()
            && let Some(hi) = iter.next()
        {
            samples.push(pcm16_to_f32(lo, hi));
        }

        loop {
            let Some(lo) = iter.next() else { break };
            let Some(hi) = iter.next() else {
                self.carry = Some(lo);
                break;
            };
            samples.push(pcm16_to_f32(lo, hi));
        }
        samples
    }
}

fn pcm16_to_f32(lo: u8, hi: u8) -> f32 {
    f32::from(i16::from_le_bytes([lo, hi])) / 32_768.0
}
