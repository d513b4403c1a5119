//! Sentence segmentation for streaming synthesis.
//!
//! Model text arrives as arbitrary deltas. The segmenter accumulates them
//! in a pending buffer and cuts speakable chunks at sentence or clause
//! boundaries, preferring the right-most boundary so chunks stay as large
//! as possible (fewer synthesis round-trips) while still bounding latency.
//! Trailing incomplete words stay pending until more text arrives or the
//! turn completes.

use crate::pipeline::messages::SpeakableChunk;

/// Separators that end a sentence.
const TERMINALS: [char; 4] = ['.', '!', '?', '\n'];

/// Separators that end a clause or word.
const CLAUSES: [char; 5] = [' ', ',', ';', ':', '\t'];

/// Accumulates model text deltas and emits speakable chunks.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    pending: String,
    min_clause_chars: usize,
}

impl SentenceSegmenter {
    /// Create a segmenter with the given clause-split threshold.
    ///
    /// Clause separators only split once the pending buffer holds at least
    /// `min_clause_chars` characters; terminal punctuation always splits.
    #[must_use]
    pub fn new(min_clause_chars: usize) -> Self {
        Self {
            pending: String::new(),
            min_clause_chars,
        }
    }

    /// Append a text delta and cut at most one chunk at the right-most
    /// boundary.
    ///
    /// Returns `None` when no boundary is found yet, or when the candidate
    /// chunk is whitespace-only (consumed but never spoken).
    pub fn feed(&mut self, delta: &str) -> Option<SpeakableChunk> {
        if delta.is_empty() {
            return None;
        }
        self.pending.push_str(delta);

        let pos = find_split_boundary(&self.pending, self.min_clause_chars)?;
        // Boundary characters are ASCII, so pos + 1 is a char boundary.
        let head = self.pending[..=pos].to_owned();
        self.pending = self.pending[pos + 1..].to_owned();

        if head.trim().is_empty() {
            return None;
        }
        let is_final = chunk_is_final(&head);
        Some(SpeakableChunk {
            text: head,
            is_final,
        })
    }

    /// Flush the pending buffer at turn completion.
    ///
    /// Returns `None` if the buffer is empty or whitespace-only; either way
    /// the buffer is cleared for the next turn.
    pub fn flush(&mut self) -> Option<SpeakableChunk> {
        let text = std::mem::take(&mut self.pending);
        if text.trim().is_empty() {
            return None;
        }
        Some(SpeakableChunk {
            text,
            is_final: true,
        })
    }

    /// Text currently held back waiting for a boundary.
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }
}

/// Find the right-most split boundary in `text`.
///
/// Terminal punctuation takes priority; clause separators are consulted
/// only once the buffer reaches `min_clause_chars` characters. Returns the
/// byte index of the boundary character, or `None`.
pub(crate) fn find_split_boundary(text: &str, min_clause_chars: usize) -> Option<usize> {
    if let Some(pos) = find_terminal_boundary(text) {
        return Some(pos);
    }
    if text.chars().count() < min_clause_chars {
        return None;
    }
    find_clause_boundary(text)
}

/// Right-most sentence-ending character (`.`, `!`, `?`, newline) that is
/// followed by whitespace.
///
/// Requiring a following character keeps a terminal at the very end of the
/// buffer pending (the stream may continue with `?!`, an ellipsis, or a
/// closing quote; turn completion flushes it). Requiring *whitespace*
/// specifically keeps decimal points and mid-ellipsis dots intact.
pub(crate) fn find_terminal_boundary(text: &str) -> Option<usize> {
    let mut last = None;
    for (i, c) in text.char_indices() {
        if TERMINALS.contains(&c) {
            let rest = &text[i + c.len_utf8()..];
            if rest.starts_with([' ', '\n', '\t']) {
                last = Some(i);
            }
        }
    }
    last
}

/// Right-most clause separator with a non-empty continuation.
pub(crate) fn find_clause_boundary(text: &str) -> Option<usize> {
    let mut last = None;
    for (i, c) in text.char_indices() {
        if CLAUSES.contains(&c) {
            let rest = &text[i + c.len_utf8()..];
            if !rest.is_empty() {
                last = Some(i);
            }
        }
    }
    last
}

/// Whether a chunk ends a sentence: its last character, ignoring trailing
/// clause separators, is terminal punctuation.
pub(crate) fn chunk_is_final(text: &str) -> bool {
    for c in text.chars().rev() {
        if CLAUSES.contains(&c) {
            continue;
        }
        return TERMINALS.contains(&c);
    }
    false
}
