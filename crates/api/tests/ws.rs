//! Progress stream over a real socket.

mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use sculpt_core::job::JobState;
use sculpt_events::{EventScope, ProgressEvent};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use common::TestApp;

async fn serve(app: &TestApp) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn next_json<S>(stream: &mut S) -> Value
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

// ---- Test: inbound frames are acknowledged, events are forwarded ----

#[tokio::test]
async fn client_receives_acks_and_events() {
    let app = TestApp::new();
    let url = serve(&app).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    socket.send(Message::Text("ping".into())).await.unwrap();
    let ack = next_json(&mut socket).await;
    assert_eq!(ack["type"], "heartbeat");
    assert!(ack["timestamp"].is_string());

    // The ack proves the subscription is registered.
    assert_eq!(app.state.broadcaster.subscriber_count().await, 1);
    app.state
        .broadcaster
        .publish(ProgressEvent::status(EventScope::Training, "statue", JobState::Running))
        .await;

    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "status");
    assert_eq!(event["scope"], "training");
    assert_eq!(event["project"], "statue");
    assert_eq!(event["state"], "running");
}

// ---- Test: closing the socket unsubscribes ----

#[tokio::test]
async fn closing_unsubscribes() {
    let app = TestApp::new();
    let url = serve(&app).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    socket.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
    next_json(&mut socket).await;

    socket.close(None).await.unwrap();

    for _ in 0..100 {
        if app.state.broadcaster.subscriber_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("subscriber was not removed");
}

// ---- Test: shutdown closes open streams ----

#[tokio::test]
async fn shutdown_closes_the_stream() {
    let app = TestApp::new();
    let url = serve(&app).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    socket.send(Message::Text("hello".into())).await.unwrap();
    next_json(&mut socket).await;

    app.state.broadcaster.shutdown_all().await;

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(message)) = socket.next().await {
            if matches!(message, Message::Close(_)) {
                return true;
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);
}
