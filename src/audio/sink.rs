//! Gapless audio output via cpal.
//!
//! A dedicated thread owns the cpal output stream (the stream handle is not
//! `Send` on every platform); the stream callback and the async side share
//! a ring of pending samples. Appends await free space, which is the
//! pipeline's backpressure point against the audio hardware.

use crate::audio::AudioSink;
use crate::config::VoiceConfig;
use crate::error::{Result, VoiceError};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{error, info};

/// Audio sink playing through the system output device.
pub struct CpalSink {
    shared: Arc<Shared>,
    /// Dropping this wakes and stops the stream thread.
    _shutdown: std::sync::mpsc::Sender<()>,
}

struct Shared {
    /// Samples awaiting the output callback.
    queue: Mutex<VecDeque<f32>>,
    /// Signalled whenever the callback frees queue space.
    space: Notify,
    /// Ring of the most recently played samples, for amplitude analysis.
    recent: Mutex<RecentWindow>,
    appended: AtomicU64,
    played: AtomicU64,
    /// Set if the output stream died.
    dead: AtomicBool,
    capacity: usize,
    sample_rate: u32,
}

struct RecentWindow {
    buf: Vec<f32>,
    pos: usize,
    filled: usize,
}

impl RecentWindow {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0.0; len.max(1)],
            pos: 0,
            filled: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.buf[self.pos] = sample;
        self.pos = (self.pos + 1) % self.buf.len();
        self.filled = (self.filled + 1).min(self.buf.len());
    }

    /// Copy up to `out.len()` samples in chronological order.
    fn copy_to(&self, out: &mut [f32]) -> usize {
        let n = self.filled.min(out.len());
        for (i, slot) in out.iter_mut().take(n).enumerate() {
            // Oldest of the n requested samples first.
            let idx = (self.pos + self.buf.len() - n + i) % self.buf.len();
            *slot = self.buf[idx];
        }
        n
    }
}

impl CpalSink {
    /// Open the output device and start the (initially silent) stream.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable output device is available or the
    /// stream cannot be built.
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        let sample_rate = config.synthesis.sample_rate;
        let capacity =
            (u64::from(sample_rate) * config.playback.buffer_ms / 1_000).max(1) as usize;

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            space: Notify::new(),
            recent: Mutex::new(RecentWindow::new(config.amplitude.window)),
            appended: AtomicU64::new(0),
            played: AtomicU64::new(0),
            dead: AtomicBool::new(false),
            capacity,
            sample_rate,
        });

        let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        let thread_shared = Arc::clone(&shared);
        let device_name = config.playback.output_device.clone();
        std::thread::Builder::new()
            .name("aria-audio-out".to_owned())
            .spawn(move || {
                run_stream_thread(thread_shared, device_name, ready_tx, &shutdown_rx);
            })
            .map_err(|e| VoiceError::Audio(format!("cannot spawn audio thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| VoiceError::Audio("audio thread exited during startup".to_owned()))??;

        Ok(Self {
            shared,
            _shutdown: shutdown_tx,
        })
    }
}

fn run_stream_thread(
    shared: Arc<Shared>,
    device_name: Option<String>,
    ready_tx: std::sync::mpsc::Sender<Result<()>>,
    shutdown_rx: &std::sync::mpsc::Receiver<()>,
) {
    let stream = match build_stream(&shared, device_name.as_deref()) {
        Ok(stream) => stream,
        Err(e) => {
            shared.dead.store(true, Ordering::Relaxed);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    // Hold the stream alive until the sink is dropped.
    let _ = shutdown_rx.recv();
    drop(stream);
}

fn build_stream(shared: &Arc<Shared>, device_name: Option<&str>) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.output_devices()
            .map_err(|e| VoiceError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| VoiceError::Audio(format!("output device '{name}' not found")))?
    } else {
        host.default_output_device()
            .ok_or_else(|| VoiceError::Audio("no default output device".into()))?
    };

    let device_desc = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using output device: {device_desc}");

    let stream_config = StreamConfig {
        channels: 1,
        sample_rate: shared.sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let cb_shared = Arc::clone(shared);
    let err_shared = Arc::clone(shared);
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                fill_output(&cb_shared, data);
            },
            move |err| {
                error!("audio output stream error: {err}");
                err_shared.dead.store(true, Ordering::Relaxed);
                // Unblock any appender waiting on space.
                err_shared.space.notify_one();
            },
            None,
        )
        .map_err(|e| VoiceError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| VoiceError::Audio(format!("failed to start output stream: {e}")))?;

    Ok(stream)
}

fn fill_output(shared: &Shared, data: &mut [f32]) {
    let mut consumed: u64 = 0;
    {
        let mut queue = match shared.queue.lock() {
            Ok(queue) => queue,
            Err(_) => return,
        };
        let mut recent = match shared.recent.lock() {
            Ok(recent) => recent,
            Err(_) => return,
        };
        for sample in data.iter_mut() {
            match queue.pop_front() {
                Some(s) => {
                    *sample = s;
                    recent.push(s);
                    consumed += 1;
                }
                None => *sample = 0.0,
            }
        }
    }
    if consumed > 0 {
        shared.played.fetch_add(consumed, Ordering::Relaxed);
        shared.space.notify_one();
    }
}

#[async_trait::async_trait]
impl AudioSink for CpalSink {
    async fn append(&self, samples: &[f32]) -> Result<()> {
        let mut offset = 0;
        while offset < samples.len() {
            if self.shared.dead.load(Ordering::Relaxed) {
                return Err(VoiceError::Audio("output stream is dead".to_owned()));
            }
            let pushed = {
                let mut queue = self
                    .shared
                    .queue
                    .lock()
                    .map_err(|_| VoiceError::Audio("playback queue lock poisoned".to_owned()))?;
                let free = self.shared.capacity.saturating_sub(queue.len());
                let take = free.min(samples.len() - offset);
                queue.extend(samples[offset..offset + take].iter().copied());
                take
            };
            if pushed > 0 {
                self.shared
                    .appended
                    .fetch_add(pushed as u64, Ordering::Relaxed);
                offset += pushed;
            } else {
                self.shared.space.notified().await;
            }
        }
        Ok(())
    }

    fn clear(&self) {
        let dropped = {
            let Ok(mut queue) = self.shared.queue.lock() else {
                return;
            };
            let dropped = queue.len() as u64;
            queue.clear();
            dropped
        };
        if dropped > 0 {
            self.shared.played.fetch_add(dropped, Ordering::Relaxed);
        }
        self.shared.space.notify_one();
    }

    fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    fn appended(&self) -> u64 {
        self.shared.appended.load(Ordering::Relaxed)
    }

    fn played(&self) -> u64 {
        self.shared.played.load(Ordering::Relaxed)
    }

    fn recent_samples(&self, out: &mut [f32]) -> usize {
        match self.shared.recent.lock() {
            Ok(recent) => recent.copy_to(out),
            Err(_) => 0,
        }
    }
}
