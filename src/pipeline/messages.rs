//! Message types passed between pipeline stages.

/// A sentence-or-clause-bounded unit of text, synthesized as one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakableChunk {
    /// Chunk text, exactly as accumulated from the model stream.
    pub text: String,
    /// Whether the chunk ends with terminal punctuation or closes a turn.
    ///
    /// Final chunks use the short completion lookahead: there is no next
    /// chunk whose synthesis latency needs hiding.
    pub is_final: bool,
}

/// Events the model transport layer feeds into the pipeline.
///
/// The transport itself (socket handling, wire format) lives outside this
/// crate; the pipeline only consumes its decoded event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text delta of the model's current turn.
    Content {
        /// The delta text, arrival-ordered.
        text: String,
    },
    /// The model finished its turn; buffered text must be flushed to speech.
    TurnComplete,
    /// The user barged in: stop speaking and drop everything queued.
    Interrupted,
}
