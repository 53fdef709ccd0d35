use std::sync::LazyLock;

use memchr::memmem;

// Reasoning-segment filter.
//
// The model interleaves a `<think>…</think>` narrative with its answer in one
// token stream. The filter removes the delimited span while every other byte
// of text is forwarded as soon as it can be proven not to start a marker.
//
// Invariants:
// - `start_carry` is non-empty only in `Passthrough` and `end_carry` only in
//   `Suppressing`; each holds a strict prefix of its marker.
// - Suppressed text is never stored beyond `end_carry` and never emitted,
//   including at stream end.
// - A delta is scanned once, front to back, whatever number of segments it
//   holds.

pub const START_MARKER: &str = "<think>";
pub const END_MARKER: &str = "</think>";

static START_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(START_MARKER.as_bytes()));
static END_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(END_MARKER.as_bytes()));

/// State of the filter state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Forwarding content, watching for the start marker.
    Passthrough,
    /// Inside a reasoning segment, waiting for the end marker.
    Suppressing,
}

/// Per-request reasoning filter.
#[derive(Debug)]
pub struct ReasoningFilter {
    mode: FilterMode,
    start_carry: String,
    end_carry: String,
    open_segment_bytes: usize,
    suppressed_bytes: usize,
    trim_tail: bool,
    trim_pending: bool,
}

/// Length of the longest strict prefix of `marker` that `text` ends with.
#[inline]
fn partial_marker_suffix_len(text: &str, marker: &str) -> usize {
    let bytes = text.as_bytes();
    let max = bytes.len().min(marker.len() - 1);
    (1..=max)
        .rev()
        .find(|&len| marker.as_bytes().starts_with(&bytes[bytes.len() - len..]))
        .unwrap_or(0)
}

impl ReasoningFilter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: FilterMode::Passthrough,
            start_carry: String::new(),
            end_carry: String::new(),
            open_segment_bytes: 0,
            suppressed_bytes: 0,
            trim_tail: true,
            trim_pending: false,
        }
    }

    /// Keep the whitespace that follows an end marker instead of trimming it.
    #[must_use]
    pub fn keep_tail_whitespace(mut self) -> Self {
        self.trim_tail = false;
        self
    }

    #[must_use]
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Total bytes withheld from the client so far, markers included.
    #[must_use]
    pub fn suppressed_bytes(&self) -> usize {
        self.suppressed_bytes
    }

    /// Feed one content delta and collect the deltas to forward.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.push_into(delta, &mut out);
        out
    }

    /// Feed one content delta, appending the deltas to forward into `out`.
    pub fn push_into(&mut self, delta: &str, out: &mut Vec<String>) {
        if delta.is_empty() {
            return;
        }

        // A marker prefix held back from the previous delta is rejoined with
        // this one; otherwise the delta is scanned in place.
        let carry = match self.mode {
            FilterMode::Passthrough => std::mem::take(&mut self.start_carry),
            FilterMode::Suppressing => std::mem::take(&mut self.end_carry),
        };
        let joined;
        let text = if carry.is_empty() {
            delta
        } else {
            joined = carry + delta;
            joined.as_str()
        };

        let mut pos = 0;
        while pos < text.len() {
            let rest = &text[pos..];
            match self.mode {
                FilterMode::Passthrough => {
                    // Whitespace right after an end marker is dropped, even
                    // when it arrives in later deltas.
                    let rest = if self.trim_pending {
                        let trimmed = rest.trim_start();
                        if trimmed.is_empty() {
                            break;
                        }
                        self.trim_pending = false;
                        pos += rest.len() - trimmed.len();
                        trimmed
                    } else {
                        rest
                    };

                    if let Some(start) = START_FINDER.find(rest.as_bytes()) {
                        if start > 0 {
                            out.push(rest[..start].to_string());
                        }
                        self.mode = FilterMode::Suppressing;
                        self.open_segment_bytes = START_MARKER.len();
                        pos += start + START_MARKER.len();
                    } else {
                        let keep = partial_marker_suffix_len(rest, START_MARKER);
                        let emit_end = rest.len() - keep;
                        if emit_end > 0 {
                            out.push(rest[..emit_end].to_string());
                        }
                        self.start_carry.push_str(&rest[emit_end..]);
                        pos = text.len();
                    }
                }
                FilterMode::Suppressing => {
                    if let Some(end) = END_FINDER.find(rest.as_bytes()) {
                        self.suppressed_bytes +=
                            self.open_segment_bytes + end + END_MARKER.len();
                        self.open_segment_bytes = 0;
                        self.mode = FilterMode::Passthrough;
                        self.trim_pending = self.trim_tail;
                        pos += end + END_MARKER.len();
                    } else {
                        let keep = partial_marker_suffix_len(rest, END_MARKER);
                        self.open_segment_bytes += rest.len() - keep;
                        self.end_carry.push_str(&rest[rest.len() - keep..]);
                        pos = text.len();
                    }
                }
            }
        }
    }

    /// Clean end of stream. A held-back marker prefix turned out to be plain
    /// text and is released; an unterminated reasoning segment is dropped.
    /// Returns the number of bytes of the dropped segment.
    pub fn finish_into(&mut self, out: &mut Vec<String>) -> usize {
        match self.mode {
            FilterMode::Passthrough => {
                if !self.start_carry.is_empty() {
                    out.push(std::mem::take(&mut self.start_carry));
                }
                0
            }
            FilterMode::Suppressing => self.abandon(),
        }
    }

    /// Error or cancellation. Everything still held is dropped; returns the
    /// number of bytes discarded.
    pub fn abandon(&mut self) -> usize {
        let dropped = self.open_segment_bytes + self.end_carry.len() + self.start_carry.len();
        self.suppressed_bytes += self.open_segment_bytes + self.end_carry.len();
        self.open_segment_bytes = 0;
        self.end_carry.clear();
        self.start_carry.clear();
        self.trim_pending = false;
        self.mode = FilterMode::Passthrough;
        dropped
    }
}

impl Default for ReasoningFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove every reasoning segment from a complete response and trim it.
///
/// Uses the same state machine as the streaming path, so an unterminated
/// segment is dropped rather than shown.
#[must_use]
pub fn strip_reasoning(text: &str) -> String {
    let mut filter = ReasoningFilter::new().keep_tail_whitespace();
    let mut out = Vec::new();
    filter.push_into(text, &mut out);
    filter.finish_into(&mut out);
    out.concat().trim().to_string()
}
