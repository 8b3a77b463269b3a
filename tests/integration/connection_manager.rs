//! Connection lifecycle and tool-call correlation over an in-memory channel.

use std::collections::HashMap;
use std::sync::Arc;

use aios_client::channel::ChannelError;
use aios_client::connection::{ConnectionManager, ConnectionStatus, ErrorKind};
use aios_client::tools::{LocalTool, LocalToolRegistry, ToolExecutionError, ToolRouter};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::helpers::{
    Harness, MemoryConnector, MockRemote, Peer, RecordingObserver, channel_config, harness,
    wait_until,
};

struct Upper;

#[async_trait]
impl LocalTool for Upper {
    fn name(&self) -> &str {
        "upper"
    }
    fn description(&self) -> &str {
        "Uppercase a string"
    }
    fn schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, args: Value) -> Result<Value, ToolExecutionError> {
        let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
        Ok(json!(text.to_uppercase()))
    }
}

struct Panics;

#[async_trait]
impl LocalTool for Panics {
    fn name(&self) -> &str {
        "boom"
    }
    fn description(&self) -> &str {
        "Always panics"
    }
    fn schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _args: Value) -> Result<Value, ToolExecutionError> {
        panic!("tool exploded");
    }
}

struct Fixture {
    manager: ConnectionManager,
    observer: Arc<RecordingObserver>,
    connector: Arc<MemoryConnector>,
    peers: mpsc::UnboundedReceiver<Peer>,
    _integrations: Harness,
}

async fn fixture(failures: &[&str], max_retries: u32) -> Fixture {
    let integrations = harness(&["crm"], MockRemote::with_tools(&["send_email"])).await;
    let registry = LocalToolRegistry::new();
    registry.register("text", Arc::new(Upper));
    registry.register("text", Arc::new(Panics));
    let router = Arc::new(ToolRouter::new(
        Arc::new(registry),
        integrations.manager.clone(),
    ));

    let (connector, peers) = MemoryConnector::new(failures);
    let observer = Arc::new(RecordingObserver::default());
    let manager = ConnectionManager::new(
        &channel_config(max_retries),
        connector.clone(),
        router,
        Some(observer.clone()),
    );
    Fixture {
        manager,
        observer,
        connector,
        peers,
        _integrations: integrations,
    }
}

async fn registered(fx: &mut Fixture) -> Peer {
    fx.manager.initialize().await.unwrap();
    let peer = fx.peers.recv().await.unwrap();
    peer.push_json(json!({"type": "connection_established", "connection_id": "c-42"}));
    let manager = fx.manager.clone();
    wait_until(move || manager.is_registered()).await;
    peer
}

fn tool_call(id: &str, name: &str, arguments: Value) -> Value {
    json!({"type": "tool_call", "tool_call_id": id, "data": {"name": name, "arguments": arguments}})
}

#[tokio::test]
async fn initialize_then_register() {
    let mut fx = fixture(&[], 3).await;

    let _peer = registered(&mut fx).await;

    let state = fx.manager.get_state();
    assert_eq!(state.status, ConnectionStatus::Registered);
    assert_eq!(state.connection_id.as_deref(), Some("c-42"));
    assert!(state.error.is_none());

    let statuses: Vec<ConnectionStatus> = fx.observer.all().iter().map(|s| s.status).collect();
    assert_eq!(statuses.first(), Some(&ConnectionStatus::Initializing));
    assert!(statuses.contains(&ConnectionStatus::Connected));
}

#[tokio::test]
async fn initialize_while_active_is_ignored() {
    let mut fx = fixture(&[], 3).await;
    let _peer = registered(&mut fx).await;

    fx.manager.initialize().await.unwrap();

    assert!(fx.manager.is_registered());
    assert_eq!(fx.connector.opens.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_tool_call_gets_exactly_one_correlated_response() {
    let mut fx = fixture(&[], 3).await;
    let mut peer = registered(&mut fx).await;

    peer.push_json(tool_call("t1", "local__text__upper", json!({"text": "hi"})));
    peer.push_json(tool_call("t2", "local__files__read", json!({})));
    peer.push_json(tool_call("t3", "remote__crm__send_email", json!({"to": "a@b.c"})));
    peer.push_json(tool_call("t4", "local__text__boom", json!({})));
    peer.push_json(tool_call("t5", "upper", json!({})));

    let mut responses = HashMap::new();
    for _ in 0..5 {
        let response = peer.next_json().await;
        let id = response["tool_call_id"].as_str().unwrap().to_owned();
        assert!(
            responses.insert(id.clone(), response["response"].clone()).is_none(),
            "duplicate response for {id}"
        );
    }

    assert_eq!(responses["t1"], json!({"status": "success", "result": "HI"}));
    for id in ["t2", "t3", "t4", "t5"] {
        assert_eq!(responses[id]["status"], "error", "{id}");
    }
    assert!(responses["t2"]["error"].as_str().unwrap().contains("files"));
    assert!(responses["t3"]["error"].as_str().unwrap().contains("not connected"));
    assert!(responses["t4"]["error"].as_str().unwrap().contains("boom"));
    assert!(responses["t5"]["error"].as_str().unwrap().contains("Malformed"));

    // Tool failures do not touch the connection state.
    assert!(fx.manager.is_registered());
}

#[tokio::test]
async fn connection_id_only_appears_while_registered() {
    let mut fx = fixture(&["refused"], 3).await;
    let peer = registered(&mut fx).await;
    peer.push_json(json!({"type": "heartbeat"}));
    fx.manager.shutdown();

    for snapshot in fx.observer.all() {
        if snapshot.connection_id.is_some() {
            assert_eq!(snapshot.status, ConnectionStatus::Registered);
        }
        if snapshot.attempt.is_some() {
            assert!(matches!(
                snapshot.status,
                ConnectionStatus::Connecting | ConnectionStatus::Error
            ));
        }
    }
}

#[tokio::test]
async fn retrying_is_visible_in_state() {
    let mut fx = fixture(&["refused"], 3).await;
    let _peer = registered(&mut fx).await;

    let retrying = fx
        .observer
        .all()
        .into_iter()
        .find(|s| s.retry_delay_ms.is_some())
        .expect("a retrying snapshot");
    assert_eq!(retrying.status, ConnectionStatus::Connecting);
    assert_eq!(retrying.retry_delay_ms, Some(10));
    let error = retrying.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Transport);
    assert!(error.message.contains("refused"));

    // The next attempt starts clean.
    let snapshots = fx.observer.all();
    let next_attempt = snapshots
        .iter()
        .skip_while(|s| s.retry_delay_ms.is_none())
        .find(|s| s.attempt == Some(2))
        .expect("a second attempt snapshot");
    assert_eq!(next_attempt.status, ConnectionStatus::Connecting);
    assert!(next_attempt.error.is_none());
    assert!(next_attempt.retry_delay_ms.is_none());
}

#[tokio::test]
async fn malformed_registration_is_a_processing_error() {
    let mut fx = fixture(&[], 3).await;
    fx.manager.initialize().await.unwrap();
    let peer = fx.peers.recv().await.unwrap();

    peer.push_json(json!({"type": "connection_established"}));
    let manager = fx.manager.clone();
    wait_until(move || manager.get_state().status == ConnectionStatus::Error).await;

    let error = fx.manager.get_state().error.unwrap();
    assert_eq!(error.kind, ErrorKind::MessageProcessing);
    assert!(error.message.contains("connection_id"));
    assert!(fx.manager.get_state().connection_id.is_none());
}

#[tokio::test]
async fn malformed_tool_call_with_id_is_still_answered() {
    let mut fx = fixture(&[], 3).await;
    let mut peer = registered(&mut fx).await;

    peer.push_json(json!({"type": "tool_call", "tool_call_id": "t-9", "data": {"name": "x"}}));

    let response = peer.next_json().await;
    assert_eq!(response["tool_call_id"], "t-9");
    assert_eq!(response["response"]["status"], "error");
    assert!(
        response["response"]["error"]
            .as_str()
            .unwrap()
            .contains("Invalid tool_call structure")
    );
    let state = fx.manager.get_state();
    assert_eq!(state.status, ConnectionStatus::Error);
    assert_eq!(state.error.unwrap().kind, ErrorKind::MessageProcessing);
}

#[tokio::test]
async fn untyped_and_unknown_frames_leave_registration_alone() {
    let mut fx = fixture(&[], 3).await;
    let mut peer = registered(&mut fx).await;

    peer.push_json(json!("ping"));
    peer.push_json(json!([1, 2]));
    peer.push_json(json!({"type": "heartbeat"}));
    peer.push_json(json!({"no_type": true}));
    // Frames are handled in order; the answer to this call comes after all of the above.
    peer.push_json(tool_call("t-after", "local__text__upper", json!({"text": "ok"})));

    let response = peer.next_json().await;
    assert_eq!(response["tool_call_id"], "t-after");

    let state = fx.manager.get_state();
    assert_eq!(state.status, ConnectionStatus::Registered);
    assert_eq!(state.connection_id.as_deref(), Some("c-42"));
    assert!(state.error.is_none());
    assert!(
        fx.observer
            .all()
            .iter()
            .all(|s| s.status != ConnectionStatus::Error)
    );
}

#[tokio::test]
async fn shutdown_disconnects_and_allows_reinitialize() {
    let mut fx = fixture(&[], 3).await;
    let _peer = registered(&mut fx).await;

    fx.manager.shutdown();

    let state = fx.manager.get_state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert!(state.connection_id.is_none());
    assert!(state.error.is_none());

    let _peer = registered(&mut fx).await;
    assert_eq!(fx.connector.opens.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_retries_end_in_error() {
    let fx = fixture(&["refused", "refused", "refused"], 2).await;

    let err = fx.manager.initialize().await.unwrap_err();

    assert!(matches!(err, ChannelError::RetriesExhausted { attempts: 3, .. }));
    let manager = fx.manager.clone();
    wait_until(move || manager.get_state().status == ConnectionStatus::Error).await;
    let state = fx.manager.get_state();
    assert!(state.error.is_some());
    assert!(state.connection_id.is_none());
    assert_eq!(fx.connector.opens.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unexpected_close_is_reported_then_recovered() {
    let mut fx = fixture(&[], 3).await;
    let peer = registered(&mut fx).await;

    peer.drop_connection(1011, "server restart");
    let replacement = fx.peers.recv().await.unwrap();

    let observer = fx.observer.clone();
    wait_until(move || {
        observer.all().iter().any(|s| {
            s.status == ConnectionStatus::Disconnected
                && s.error
                    .as_ref()
                    .is_some_and(|e| e.message.contains("closed unexpectedly (code 1011)"))
        })
    })
    .await;

    replacement.push_json(json!({"type": "connection_established", "connection_id": "c-43"}));
    let manager = fx.manager.clone();
    wait_until(move || manager.get_state().connection_id.as_deref() == Some("c-43")).await;
    assert!(fx.observer.last().unwrap().is_registered());
}
