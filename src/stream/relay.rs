use std::collections::VecDeque;
use std::fmt::Display;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::reasoning::ReasoningFilter;
use super::sse::{content_record, data_frame_stream, error_record, DONE_RECORD};
use crate::observability::{StreamOutcome, StreamStats};
use crate::protocol::{decode_stream_payload, UpstreamEvent};
use crate::util::log_preview;

/// Client-facing text of an in-band provider error; the detail is only logged.
pub const UPSTREAM_STREAM_ERROR: &str = "upstream stream error";

/// Wire framing of the client-facing body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    /// `data: {"content": ..}\n\n` records closed by `data: [DONE]\n\n`.
    EventStream,
    /// Raw answer text; failure aborts the body.
    PlainText,
}

impl OutputEncoding {
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            OutputEncoding::EventStream => "text/event-stream",
            OutputEncoding::PlainText => "text/plain; charset=utf-8",
        }
    }
}

type RelayItem = Result<Bytes, std::io::Error>;

struct RelayState<F> {
    frames: std::pin::Pin<Box<F>>,
    filter: ReasoningFilter,
    encoding: OutputEncoding,
    stats: StreamStats,
    deltas: Vec<String>,
    pending: VecDeque<RelayItem>,
    closed: bool,
}

impl<F> RelayState<F> {
    fn emit_deltas(&mut self) {
        for delta in self.deltas.drain(..) {
            self.stats.record_delta(delta.len());
            let chunk = match self.encoding {
                OutputEncoding::EventStream => Bytes::from(content_record(&delta)),
                OutputEncoding::PlainText => Bytes::from(delta),
            };
            self.pending.push_back(Ok(chunk));
        }
    }

    fn complete(&mut self) {
        let dropped = self.filter.finish_into(&mut self.deltas);
        if dropped > 0 {
            tracing::debug!(
                request_id = %self.stats.request_id(),
                dropped_bytes = dropped,
                "dropping unterminated reasoning segment"
            );
        }
        self.emit_deltas();
        if self.encoding == OutputEncoding::EventStream {
            self.pending.push_back(Ok(Bytes::from_static(DONE_RECORD.as_bytes())));
        }
        self.stats
            .set_suppressed_bytes(self.filter.suppressed_bytes());
        self.stats.finish(StreamOutcome::Completed);
        self.closed = true;
    }

    fn fail(&mut self, message: String) {
        let dropped = self.filter.abandon();
        if dropped > 0 {
            tracing::debug!(
                request_id = %self.stats.request_id(),
                dropped_bytes = dropped,
                "discarding held reasoning state"
            );
        }
        self.stats
            .set_suppressed_bytes(self.filter.suppressed_bytes());
        match self.encoding {
            OutputEncoding::EventStream => self
                .pending
                .push_back(Ok(Bytes::from(error_record(&message)))),
            OutputEncoding::PlainText => self
                .pending
                .push_back(Err(std::io::Error::other(message.clone()))),
        }
        self.stats.finish(StreamOutcome::Failed(message));
        self.closed = true;
    }
}

/// Relay a provider event stream to the client with reasoning removed.
///
/// Malformed frames are logged and skipped. The upstream sentinel ends the
/// relay with exactly one terminal record; an in-band provider error, a
/// transport error or an end of body without the sentinel ends it with one
/// error record (event stream) or an aborted body (plain text). Dropping the
/// returned stream drops the upstream body and releases its connection.
pub fn relay_stream<S, E>(
    byte_stream: S,
    encoding: OutputEncoding,
    stats: StreamStats,
) -> impl Stream<Item = RelayItem> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = RelayState {
        frames: Box::pin(data_frame_stream(byte_stream)),
        filter: ReasoningFilter::new(),
        encoding,
        stats,
        deltas: Vec::with_capacity(4),
        pending: VecDeque::with_capacity(4),
        closed: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.closed {
                return None;
            }

            match state.frames.as_mut().next().await {
                Some(Ok(payload)) => {
                    state.stats.record_frame();
                    match decode_stream_payload(&payload) {
                        Ok(UpstreamEvent::Delta(text)) => {
                            state.filter.push_into(&text, &mut state.deltas);
                            state.emit_deltas();
                        }
                        Ok(UpstreamEvent::NoContent) => {}
                        Ok(UpstreamEvent::Done) => state.complete(),
                        Ok(UpstreamEvent::Error(message)) => {
                            tracing::warn!(
                                request_id = %state.stats.request_id(),
                                error = log_preview(&message),
                                "upstream reported an in-band error"
                            );
                            state.fail(UPSTREAM_STREAM_ERROR.to_string());
                        }
                        Err(err) => {
                            state.stats.record_malformed_frame();
                            tracing::warn!(
                                request_id = %state.stats.request_id(),
                                error = %err,
                                payload = log_preview(&payload),
                                "skipping malformed upstream frame"
                            );
                        }
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(
                        request_id = %state.stats.request_id(),
                        error = %err,
                        "upstream body read failed"
                    );
                    state.fail("upstream stream interrupted".to_string());
                }
                None => state.fail("upstream stream ended before completion".to_string()),
            }
        }
    })
}
