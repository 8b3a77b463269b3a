//! MCP streamable-HTTP transport against a wiremock server.

use std::sync::Arc;

use aios_client::config::IntegrationsConfig;
use aios_client::integrations::{
    HttpMcpTransport, HttpMcpTransportFactory, IntegrationError, IntegrationStatus,
    RemoteIntegrationManager, RemoteTransport,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{MemoryStore, MockCatalog, app};

const SESSION: &str = "sess-1";

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

/// Mount `initialize` (handing out a session) and the initialized notification.
async fn mount_handshake(server: &MockServer, route: &str) {
    Mock::given(method("POST"))
        .and(path(route))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(
            rpc_result(json!({"protocolVersion": "2025-03-26", "serverInfo": {"name": "mock"}}))
                .insert_header("mcp-session-id", SESSION),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(route))
        .and(header("mcp-session-id", SESSION))
        .and(body_partial_json(json!({"method": "notifications/initialized"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(server)
        .await;
}

fn transport(server: &MockServer) -> HttpMcpTransport {
    HttpMcpTransport::new(reqwest::Client::new(), format!("{}/mcp", server.uri()), "aios-test")
}

#[tokio::test]
async fn initialize_captures_session_and_lists_all_pages() {
    let server = MockServer::start().await;
    mount_handshake(&server, "/mcp").await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", SESSION))
        .and(body_partial_json(json!({"method": "tools/list", "params": {"cursor": "p2"}})))
        .respond_with(rpc_result(json!({"tools": [{"name": "archive"}]})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", SESSION))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(rpc_result(json!({
            "tools": [{
                "name": "send_email",
                "description": "Send an email",
                "inputSchema": {"type": "object", "properties": {"to": {"type": "string"}}}
            }],
            "nextCursor": "p2"
        })))
        .mount(&server)
        .await;

    let transport = transport(&server);
    transport.connect().await.unwrap();
    assert_eq!(transport.session_id().as_deref(), Some(SESSION));

    let tools = transport.list_tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["send_email", "archive"]);
    assert_eq!(tools[0].description, "Send an email");
    assert_eq!(tools[0].input_schema["properties"]["to"]["type"], "string");
    assert_eq!(tools[1].input_schema, json!({"type": "object", "properties": {}}));
}

#[tokio::test]
async fn event_stream_replies_are_parsed() {
    let server = MockServer::start().await;
    mount_handshake(&server, "/mcp").await;
    let body = concat!(
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n",
        "\n",
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"sent\"}]}}\n",
        "\n",
    );
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({"method": "tools/call", "params": {"name": "send_email"}})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let transport = transport(&server);
    transport.connect().await.unwrap();
    let result = transport.call_tool("send_email", json!(null)).await.unwrap();

    assert_eq!(result["content"][0]["text"], "sent");
}

#[tokio::test]
async fn tool_reported_errors_become_tool_call_errors() {
    let server = MockServer::start().await;
    mount_handshake(&server, "/mcp").await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .respond_with(rpc_result(json!({
            "isError": true,
            "content": [{"type": "text", "text": "mailbox full"}]
        })))
        .mount(&server)
        .await;

    let transport = transport(&server);
    transport.connect().await.unwrap();
    let err = transport.call_tool("send_email", json!({})).await.unwrap_err();

    assert_eq!(err, IntegrationError::ToolCall("mailbox full".into()));
}

#[tokio::test]
async fn failed_initialize_is_a_connect_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(401).set_body_string("missing token"))
        .mount(&server)
        .await;

    let err = transport(&server).connect().await.unwrap_err();

    assert!(matches!(err, IntegrationError::Connect(ref m) if m.contains("401")), "{err}");
}

#[tokio::test]
async fn close_releases_the_session_once() {
    let server = MockServer::start().await;
    mount_handshake(&server, "/mcp").await;
    Mock::given(method("DELETE"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", SESSION))
        .respond_with(ResponseTemplate::new(405))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(&server);
    transport.connect().await.unwrap();
    transport.close().await.unwrap();
    transport.close().await.unwrap();

    assert!(transport.session_id().is_none());
}

#[tokio::test]
async fn manager_connects_and_calls_through_http() {
    let server = MockServer::start().await;
    let route = "/v1/user%201/crm";
    mount_handshake(&server, route).await;
    Mock::given(method("POST"))
        .and(path(route))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(rpc_result(json!({"tools": [{"name": "send_email"}]})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(route))
        .and(body_partial_json(json!({"method": "tools/call", "params": {"arguments": {"to": "a@b.c"}}})))
        .respond_with(rpc_result(json!({"content": [{"type": "text", "text": "ok"}]})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let settings = IntegrationsConfig {
        endpoint_template: format!("{}/v1/{{user_id}}/{{slug}}", server.uri()),
        ..Default::default()
    };
    let factory = HttpMcpTransportFactory::new(&settings).unwrap();
    let manager = RemoteIntegrationManager::load(
        settings,
        Arc::new(MemoryStore::default()),
        MockCatalog::new(vec![app("crm")]),
        Arc::new(factory),
    )
    .await
    .unwrap();
    manager.add_integration(app("crm")).await.unwrap();
    manager.set_enabled("crm", true, Some("user 1")).await.unwrap();

    assert_eq!(manager.connection_status("crm"), IntegrationStatus::Connected);
    let result = manager
        .call_tool("crm", "send_email", json!({"to": "a@b.c"}))
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "ok");

    manager.disconnect("crm").await;
    assert_eq!(manager.connection_status("crm"), IntegrationStatus::Disconnected);
}
