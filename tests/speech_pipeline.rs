//! End-to-end pipeline tests against a mock synthesis backend.
//!
//! The audio hardware seam is replaced by in-memory sinks (one playing
//! instantly, one pacing playback in real time); the synthesis backend is
//! a wiremock server streaming PCM16 bodies. This exercises the full path:
//! transport events → segmentation → queue → streaming playback →
//! talking-state events.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use aria::{AudioSink, TransportEvent, VoiceConfig, VoiceEvent, VoicePipeline};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Sink that "plays" appended samples instantly and records them.
struct MemorySink {
    appended: AtomicU64,
    samples: Mutex<Vec<f32>>,
}

impl MemorySink {
    fn new() -> Self {
        Self {
            appended: AtomicU64::new(0),
            samples: Mutex::new(Vec::new()),
        }
    }

    fn recorded(&self) -> usize {
        self.samples.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl AudioSink for MemorySink {
    async fn append(&self, samples: &[f32]) -> aria::Result<()> {
        self.samples.lock().unwrap().extend_from_slice(samples);
        self.appended.fetch_add(samples.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn clear(&self) {}

    fn sample_rate(&self) -> u32 {
        24_000
    }

    fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    fn played(&self) -> u64 {
        // Instant playback: everything appended has been "heard".
        self.appended.load(Ordering::Relaxed)
    }

    fn recent_samples(&self, out: &mut [f32]) -> usize {
        let samples = self.samples.lock().unwrap();
        let n = samples.len().min(out.len());
        out[..n].copy_from_slice(&samples[samples.len() - n..]);
        n
    }
}

/// Sink that plays appended samples in real time at its sample rate, so a
/// clip occupies wall-clock time and the lookahead window matters.
struct PacedSink {
    appended: AtomicU64,
    started: Mutex<Option<Instant>>,
    samples: Mutex<Vec<f32>>,
    sample_rate: u32,
}

impl PacedSink {
    fn new(sample_rate: u32) -> Self {
        Self {
            appended: AtomicU64::new(0),
            started: Mutex::new(None),
            samples: Mutex::new(Vec::new()),
            sample_rate,
        }
    }
}

#[async_trait::async_trait]
impl AudioSink for PacedSink {
    async fn append(&self, samples: &[f32]) -> aria::Result<()> {
        self.started.lock().unwrap().get_or_insert_with(Instant::now);
        self.samples.lock().unwrap().extend_from_slice(samples);
        self.appended.fetch_add(samples.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn clear(&self) {}

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    fn played(&self) -> u64 {
        let started = self.started.lock().unwrap();
        match *started {
            Some(t0) => {
                let elapsed = t0.elapsed().as_secs_f64();
                let by_time = (elapsed * f64::from(self.sample_rate)) as u64;
                by_time.min(self.appended())
            }
            None => 0,
        }
    }

    fn recent_samples(&self, out: &mut [f32]) -> usize {
        let samples = self.samples.lock().unwrap();
        let n = samples.len().min(out.len());
        out[..n].copy_from_slice(&samples[samples.len() - n..]);
        n
    }
}

/// A short PCM16 body (`n` samples of a quiet ramp).
fn pcm_body(n: usize) -> Vec<u8> {
    (0..n)
        .map(|i| ((i % 64) as i16 - 32) * 200)
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

fn test_config(server: &MockServer) -> VoiceConfig {
    let mut config = VoiceConfig::default();
    config.synthesis.endpoint = format!("{}/synthesize", server.uri());
    config
}

async fn wait_for_requests(server: &MockServer, n: usize) {
    for _ in 0..300 {
        if server.received_requests().await.unwrap_or_default().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("backend never saw {n} requests");
}

async fn requested_texts(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|req| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            body["text"].as_str().unwrap().to_owned()
        })
        .collect()
}

/// Collect speaking edges until `count` were seen or the deadline passes.
async fn collect_speaking(
    events: &mut broadcast::Receiver<VoiceEvent>,
    count: usize,
) -> Vec<bool> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut speaking = Vec::new();
    while speaking.len() < count {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(VoiceEvent::Speaking { active })) => speaking.push(active),
            Ok(Ok(_)) => {}
            _ => break,
        }
    }
    speaking
}

#[tokio::test]
async fn speaks_chunks_in_enqueue_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synthesize"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pcm_body(2_400)))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let pipeline = VoicePipeline::start(test_config(&server), Arc::clone(&sink)).unwrap();
    let mut events = pipeline.subscribe();
    let transport = pipeline.transport();

    transport
        .send(TransportEvent::Content {
            text: "Hello there. How are".to_owned(),
        })
        .await
        .unwrap();
    transport
        .send(TransportEvent::Content {
            text: " you?".to_owned(),
        })
        .await
        .unwrap();
    transport.send(TransportEvent::TurnComplete).await.unwrap();

    let speaking = collect_speaking(&mut events, 4).await;
    assert_eq!(speaking, vec![true, false, true, false]);

    assert_eq!(
        requested_texts(&server).await,
        vec!["Hello there.".to_owned(), "How are you?".to_owned()]
    );
    assert_eq!(sink.recorded(), 4_800);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_chunk_does_not_stall_the_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synthesize"))
        .and(body_partial_json(serde_json::json!({ "text": "Boom." })))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesize"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pcm_body(1_200)))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let pipeline = VoicePipeline::start(test_config(&server), Arc::clone(&sink)).unwrap();
    let mut events = pipeline.subscribe();
    let transport = pipeline.transport();

    transport
        .send(TransportEvent::Content {
            text: "Boom. Then fine.".to_owned(),
        })
        .await
        .unwrap();
    transport.send(TransportEvent::TurnComplete).await.unwrap();

    // The failed chunk forces talking false without ever going true; the
    // second chunk still speaks.
    let speaking = collect_speaking(&mut events, 3).await;
    assert_eq!(speaking, vec![false, true, false]);

    assert_eq!(
        requested_texts(&server).await,
        vec!["Boom.".to_owned(), "Then fine.".to_owned()]
    );
    assert_eq!(sink.recorded(), 1_200);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn interrupt_clears_queued_chunks_and_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synthesize"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(pcm_body(24_000))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let pipeline = VoicePipeline::start(test_config(&server), Arc::clone(&sink)).unwrap();
    let transport = pipeline.transport();

    transport
        .send(TransportEvent::Content {
            text: "First part. Second part.".to_owned(),
        })
        .await
        .unwrap();
    transport.send(TransportEvent::TurnComplete).await.unwrap();

    // Let the first request go out, then barge in while it is in flight.
    wait_for_requests(&server, 1).await;
    transport.send(TransportEvent::Interrupted).await.unwrap();

    // The queued second chunk must never be requested.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(
        requested_texts(&server).await,
        vec!["First part.".to_owned()]
    );

    // The pipeline stays usable for the next turn.
    transport
        .send(TransportEvent::Content {
            text: "Again now.".to_owned(),
        })
        .await
        .unwrap();
    transport.send(TransportEvent::TurnComplete).await.unwrap();

    wait_for_requests(&server, 2).await;
    let texts = requested_texts(&server).await;
    assert_eq!(texts.last().unwrap(), "Again now.");

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn whitespace_turn_requests_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synthesize"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pcm_body(64)))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let pipeline = VoicePipeline::start(test_config(&server), sink).unwrap();
    let transport = pipeline.transport();

    transport
        .send(TransportEvent::Content {
            text: "   ".to_owned(),
        })
        .await
        .unwrap();
    transport.send(TransportEvent::TurnComplete).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(requested_texts(&server).await.is_empty());

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn amplitude_flows_and_session_resolves_inside_lookahead() {
    let server = MockServer::start().await;
    // One second of audio at 24 kHz, played in real time by PacedSink.
    Mock::given(method("POST"))
        .and(path("/synthesize"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pcm_body(24_000)))
        .mount(&server)
        .await;

    let sink = Arc::new(PacedSink::new(24_000));
    let mut config = test_config(&server);
    // Final chunk lookahead of 300 ms on a 1 s clip: the session should
    // resolve roughly 300 ms before the clip's true end.
    config.playback.final_lookahead_ms = 300;
    // Keep the sentence as one chunk so a single session spans the clip.
    config.segmenter.min_clause_chars = 1_000;
    let pipeline = VoicePipeline::start(config, Arc::clone(&sink)).unwrap();
    let mut events = pipeline.subscribe();
    let transport = pipeline.transport();

    let start = Instant::now();
    transport
        .send(TransportEvent::Content {
            text: "A fairly long sentence to speak aloud.".to_owned(),
        })
        .await
        .unwrap();
    transport.send(TransportEvent::TurnComplete).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut amplitude_events = 0usize;
    let mut resolved_at = None;
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(VoiceEvent::Amplitude { level })) => {
                assert!((0.0..=1.0).contains(&level));
                amplitude_events += 1;
            }
            Ok(Ok(VoiceEvent::Speaking { active: false })) => {
                resolved_at = Some(start.elapsed());
                break;
            }
            Ok(Ok(_)) => {}
            _ => break,
        }
    }

    assert!(amplitude_events > 5, "expected a steady amplitude stream");
    let resolved_at = resolved_at.expect("session never resolved");
    // Resolved before the clip's true end (1 s), thanks to the lookahead.
    assert!(
        resolved_at < Duration::from_millis(950),
        "session resolved too late: {resolved_at:?}"
    );

    pipeline.shutdown().await.unwrap();
}
