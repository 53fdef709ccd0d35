//! Caller-side client for the reasoning proxy route.
//!
//! Streaming is attempted first. A stream that fails before any content
//! arrived is retried once as a non-streaming call; a stream that fails
//! midway keeps the text received so far and is flagged as interrupted.

use std::time::Duration;

use futures_util::StreamExt;

use crate::protocol::{decode_relay_payload, Message, RelayEvent, ReplyBody};
use crate::stream::SseLineDecoder;
use crate::util::log_preview;

const REASONING_ROUTE: &str = "api/deepseek";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid gateway URL: {0}")]
    InvalidUrl(String),
    #[error("request to gateway failed: {0}")]
    Transport(String),
    #[error("gateway answered {status}: {message}")]
    Status { status: u16, message: String },
    #[error("stream terminated with error: {0}")]
    Stream(String),
    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

/// How the final text of an [`Answer`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    Streamed,
    /// Streaming failed before any content; a non-streaming call answered.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
    /// The stream broke after partial content; `text` is incomplete.
    pub interrupted: bool,
}

/// A failed streaming attempt and whatever content arrived before it.
#[derive(Debug)]
pub struct StreamFailure {
    pub partial: String,
    pub error: ClientError,
}

pub struct AssistantClient {
    http: reqwest::Client,
    endpoint: url::Url,
    system_prompt: Option<String>,
}

impl AssistantClient {
    /// Client for a gateway at `base_url` (including any configured base path).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when `base_url` does not parse, or
    /// [`ClientError::Transport`] when the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        Self::with_http_client(base_url, http)
    }

    /// Like [`AssistantClient::new`] with a caller-supplied `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when `base_url` does not parse.
    pub fn with_http_client(base_url: &str, http: reqwest::Client) -> Result<Self, ClientError> {
        let base = format!("{}/", base_url.trim_end_matches('/'));
        let endpoint = url::Url::parse(&base)
            .and_then(|base| base.join(REASONING_ROUTE))
            .map_err(|err| ClientError::InvalidUrl(format!("{base_url}: {err}")))?;
        Ok(Self {
            http,
            endpoint,
            system_prompt: None,
        })
    }

    /// Prepend `prompt` as the system message of every conversation.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    fn request_body(&self, messages: &[Message], stream: bool) -> serde_json::Value {
        let mut all = Vec::with_capacity(messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            all.push(Message::system(prompt.clone()));
        }
        all.extend_from_slice(messages);
        serde_json::json!({ "messages": all, "stream": stream })
    }

    async fn post(
        &self,
        messages: &[Message],
        stream: bool,
    ) -> Result<reqwest::Response, ClientError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&self.request_body(messages, stream))
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().await.unwrap_or_default();
        let message = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("error")?.as_str().map(str::to_string))
            .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Ask with streaming, falling back once to a non-streaming call when the
    /// stream produced nothing.
    ///
    /// # Errors
    ///
    /// Returns the fallback call's error when both attempts fail.
    pub async fn ask(&self, messages: &[Message]) -> Result<Answer, ClientError> {
        match self.ask_streaming_with(messages, |_| {}).await {
            Ok(text) => Ok(Answer {
                text,
                source: AnswerSource::Streamed,
                interrupted: false,
            }),
            Err(StreamFailure { partial, error }) if partial.is_empty() => {
                tracing::warn!(error = %error, "streaming failed, retrying without streaming");
                let text = self.ask_non_streaming(messages).await?;
                Ok(Answer {
                    text,
                    source: AnswerSource::Fallback,
                    interrupted: false,
                })
            }
            Err(StreamFailure { partial, error }) => {
                tracing::warn!(
                    error = %error,
                    received_bytes = partial.len(),
                    "stream interrupted after partial content"
                );
                Ok(Answer {
                    text: partial,
                    source: AnswerSource::Streamed,
                    interrupted: true,
                })
            }
        }
    }

    /// One non-streaming call.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for transport failures, error statuses and
    /// bodies that are not `{"response": string}`.
    pub async fn ask_non_streaming(&self, messages: &[Message]) -> Result<String, ClientError> {
        let response = self.post(messages, false).await?;
        let body = response
            .bytes()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        serde_json::from_slice::<ReplyBody>(&body)
            .map(|reply| reply.response)
            .map_err(|err| ClientError::Decode(err.to_string()))
    }

    /// Stream the answer, calling `on_delta` for every content record.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamFailure`] carrying the text received before an
    /// error record, a transport failure or an end of body without the
    /// completion sentinel.
    pub async fn ask_streaming_with<F>(
        &self,
        messages: &[Message],
        mut on_delta: F,
    ) -> Result<String, StreamFailure>
    where
        F: FnMut(&str),
    {
        let mut text = String::new();
        let response = match self.post(messages, true).await {
            Ok(response) => response,
            Err(error) => {
                return Err(StreamFailure {
                    partial: text,
                    error,
                })
            }
        };

        let mut body = response.bytes_stream();
        let mut decoder = SseLineDecoder::new();
        let mut payloads = Vec::new();
        let mut finished = false;
        loop {
            match body.next().await {
                Some(Ok(chunk)) => decoder.feed_bytes_into(&chunk, &mut payloads),
                Some(Err(err)) => {
                    return Err(StreamFailure {
                        partial: text,
                        error: ClientError::Transport(err.to_string()),
                    })
                }
                None => {
                    decoder.finish_into(&mut payloads);
                    finished = true;
                }
            }

            for payload in payloads.drain(..) {
                match decode_relay_payload(&payload) {
                    Ok(RelayEvent::Content(delta)) => {
                        on_delta(&delta);
                        text.push_str(&delta);
                    }
                    Ok(RelayEvent::Done) => return Ok(text),
                    Ok(RelayEvent::Error(message)) => {
                        return Err(StreamFailure {
                            partial: text,
                            error: ClientError::Stream(message),
                        })
                    }
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            payload = log_preview(&payload),
                            "skipping unreadable gateway record"
                        );
                    }
                }
            }

            if finished {
                return Err(StreamFailure {
                    partial: text,
                    error: ClientError::Stream("stream ended before completion".to_string()),
                });
            }
        }
    }
}
