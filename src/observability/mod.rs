use std::time::Instant;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::protocol::Usage;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(tracing_level))
        .unwrap_or_else(|_| EnvFilter::new("INFO"));

    // A second initialisation (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Log a completed non-streaming request.
pub fn log_request_complete(
    request_id: &str,
    model: &str,
    usage: Option<&Usage>,
    start_time: Instant,
) {
    let usage = usage.copied().unwrap_or_default();
    info!(
        request_id = request_id,
        model = model,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        duration_seconds = start_time.elapsed().as_secs_f64(),
        "request completed"
    );
}

/// How a relayed stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Failed(String),
}

/// Per-stream counters, logged once when the stream ends.
///
/// A stream dropped before it reached an outcome was cancelled by the client;
/// that is logged from `Drop`.
#[derive(Debug)]
pub struct StreamStats {
    request_id: String,
    model: String,
    started: Instant,
    frames: u64,
    deltas: u64,
    emitted_bytes: u64,
    malformed_frames: u64,
    suppressed_bytes: u64,
    outcome: Option<StreamOutcome>,
}

impl StreamStats {
    #[must_use]
    pub fn new(request_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            model: model.into(),
            started: Instant::now(),
            frames: 0,
            deltas: 0,
            emitted_bytes: 0,
            malformed_frames: 0,
            suppressed_bytes: 0,
            outcome: None,
        }
    }

    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    pub fn record_delta(&mut self, bytes: usize) {
        self.deltas += 1;
        self.emitted_bytes += bytes as u64;
    }

    pub fn record_malformed_frame(&mut self) {
        self.malformed_frames += 1;
    }

    pub fn set_suppressed_bytes(&mut self, bytes: usize) {
        self.suppressed_bytes = bytes as u64;
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[must_use]
    pub fn deltas(&self) -> u64 {
        self.deltas
    }

    #[must_use]
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&StreamOutcome> {
        self.outcome.as_ref()
    }

    /// Record the terminal outcome and log it. Later calls are ignored.
    pub fn finish(&mut self, outcome: StreamOutcome) {
        if self.outcome.is_some() {
            return;
        }
        let duration_seconds = self.started.elapsed().as_secs_f64();
        match &outcome {
            StreamOutcome::Completed => info!(
                request_id = %self.request_id,
                model = %self.model,
                frames = self.frames,
                deltas = self.deltas,
                emitted_bytes = self.emitted_bytes,
                suppressed_bytes = self.suppressed_bytes,
                malformed_frames = self.malformed_frames,
                duration_seconds,
                "stream completed"
            ),
            StreamOutcome::Failed(reason) => warn!(
                request_id = %self.request_id,
                model = %self.model,
                frames = self.frames,
                deltas = self.deltas,
                emitted_bytes = self.emitted_bytes,
                reason = %reason,
                duration_seconds,
                "stream failed"
            ),
        }
        self.outcome = Some(outcome);
    }
}

impl Drop for StreamStats {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            info!(
                request_id = %self.request_id,
                model = %self.model,
                deltas = self.deltas,
                emitted_bytes = self.emitted_bytes,
                duration_seconds = self.started.elapsed().as_secs_f64(),
                "stream cancelled by client"
            );
        }
    }
}
