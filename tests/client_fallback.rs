mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assistant_gateway::client::{AnswerSource, AssistantClient, ClientError};
use assistant_gateway::protocol::Message;
use common::{
    build_state, completion, config_for, delta_frame, serve_gateway, spawn_upstream, MockReply,
    DONE_FRAME,
};
use serde_json::json;

#[tokio::test]
async fn test_streamed_answer() {
    let upstream = spawn_upstream(|_| {
        MockReply::Stream(vec![
            delta_frame("<think>hidden</think>"),
            delta_frame("Photosynthesis "),
            delta_frame("turns light into sugar."),
            DONE_FRAME.to_string(),
        ])
    })
    .await;
    let (base_url, server) = serve_gateway(build_state(config_for(&upstream))).await;
    let client = AssistantClient::new(&base_url).expect("client");

    let mut deltas = Vec::new();
    let text = client
        .ask_streaming_with(&[Message::user("explain photosynthesis")], |delta| {
            deltas.push(delta.to_string());
        })
        .await
        .expect("stream completes");
    assert_eq!(text, "Photosynthesis turns light into sugar.");
    assert!(deltas.len() >= 2);

    let answer = client
        .ask(&[Message::user("explain photosynthesis")])
        .await
        .expect("answer");
    assert_eq!(answer.source, AnswerSource::Streamed);
    assert!(!answer.interrupted);
    assert_eq!(answer.text, "Photosynthesis turns light into sugar.");
    server.abort();
}

#[tokio::test]
async fn test_falls_back_when_stream_fails_before_content() {
    let upstream = spawn_upstream(|body| {
        if body["stream"] == true {
            MockReply::Status(503, json!({ "error": { "message": "busy" } }))
        } else {
            MockReply::Json(completion("<think>x</think>Fallback answer"))
        }
    })
    .await;
    let (base_url, server) = serve_gateway(build_state(config_for(&upstream))).await;
    let client = AssistantClient::new(&base_url).expect("client");

    let answer = client.ask(&[Message::user("hi")]).await.expect("answer");
    assert_eq!(answer.source, AnswerSource::Fallback);
    assert!(!answer.interrupted);
    assert_eq!(answer.text, "Fallback answer");
    assert_eq!(upstream.hits(), 2);
    server.abort();
}

#[tokio::test]
async fn test_partial_stream_is_flagged_interrupted_without_fallback() {
    let upstream = spawn_upstream(|_| MockReply::Stream(vec![delta_frame("The first half")])).await;
    let (base_url, server) = serve_gateway(build_state(config_for(&upstream))).await;
    let client = AssistantClient::new(&base_url).expect("client");

    let answer = client.ask(&[Message::user("hi")]).await.expect("answer");
    assert_eq!(answer.source, AnswerSource::Streamed);
    assert!(answer.interrupted);
    assert_eq!(answer.text, "The first half");
    assert_eq!(upstream.hits(), 1);
    server.abort();
}

#[tokio::test]
async fn test_fallback_error_is_returned_when_both_attempts_fail() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let upstream = spawn_upstream(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        MockReply::Status(500, json!({ "error": { "message": "down" } }))
    })
    .await;
    let (base_url, server) = serve_gateway(build_state(config_for(&upstream))).await;
    let client = AssistantClient::new(&base_url).expect("client");

    let err = client.ask(&[Message::user("hi")]).await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 500, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    server.abort();
}

#[tokio::test]
async fn test_missing_credential_surfaces_as_status() {
    let upstream = spawn_upstream(|_| MockReply::Json(completion("unused"))).await;
    let mut config = config_for(&upstream);
    config.upstream.api_key = None;
    let (base_url, server) = serve_gateway(build_state(config)).await;
    let client = AssistantClient::new(&base_url).expect("client");

    let err = client
        .ask_non_streaming(&[Message::user("hi")])
        .await
        .unwrap_err();
    match err {
        ClientError::Status { status, message } => {
            assert_eq!(status, 500);
            assert!(message.contains("configuration"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(upstream.hits(), 0);
    server.abort();
}
