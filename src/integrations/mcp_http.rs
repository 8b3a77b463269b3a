//! MCP streamable-HTTP transport.
//!
//! Each JSON-RPC request is one POST to the integration endpoint. The
//! server may answer with plain JSON or with a short SSE stream whose
//! `data:` lines carry the reply. The session id handed out by
//! `initialize` is echoed on every later request and released with a
//! DELETE on close.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{Value, json};

use super::error::IntegrationError;
use super::transport::{RemoteTransport, RemoteTransportFactory};
use super::types::RuntimeDetails;
use crate::config::IntegrationsConfig;
use crate::tools::ToolDescriptor;

/// Protocol revision announced during `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

const SESSION_HEADER: &str = "mcp-session-id";

/// Upper bound on `tools/list` pages followed for one listing.
const MAX_TOOL_PAGES: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct McpTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolsPage {
    #[serde(default)]
    tools: Vec<McpTool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// [`RemoteTransport`] speaking MCP over streamable HTTP.
pub struct HttpMcpTransport {
    client: reqwest::Client,
    endpoint: String,
    client_name: String,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl HttpMcpTransport {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_name: client_name.into(),
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Session id assigned by the server, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_session_id(&self, id: Option<String>) {
        *self.session_id.lock().unwrap_or_else(|e| e.into_inner()) = id;
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, IntegrationError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = self.session_id() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IntegrationError::Transport(format!("POST {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Transport(format!(
                "HTTP {status} from {}: {}",
                self.endpoint,
                truncate(&text, 200)
            )));
        }
        Ok(response)
    }

    /// Send a request and return its `result`.
    async fn request(&self, method: &str, params: Value) -> Result<Value, IntegrationError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let response = self.post(&body).await?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.set_session_id(Some(session.to_owned()));
        }
        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let text = response
            .text()
            .await
            .map_err(|e| IntegrationError::Transport(format!("{method}: failed to read body: {e}")))?;

        let reply = if is_stream {
            sse_reply(&text, id).ok_or_else(|| {
                IntegrationError::Transport(format!("{method}: event stream carried no reply"))
            })?
        } else {
            serde_json::from_str(&text)
                .map_err(|e| IntegrationError::Transport(format!("{method}: invalid JSON-RPC reply: {e}")))?
        };
        into_result(method, reply)
    }

    async fn notify(&self, method: &str) -> Result<(), IntegrationError> {
        let body = json!({"jsonrpc": "2.0", "method": method});
        self.post(&body).await.map(drop)
    }
}

/// First reply in an SSE body matching `id` (or, failing that, any reply).
fn sse_reply(body: &str, id: u64) -> Option<Value> {
    let mut events: Vec<Value> = Vec::new();
    let mut data = String::new();

    let flush = |data: &mut String, events: &mut Vec<Value>| {
        if !data.is_empty() {
            if let Ok(value) = serde_json::from_str::<Value>(data) {
                events.push(value);
            }
            data.clear();
        }
    };

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            flush(&mut data, &mut events);
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    flush(&mut data, &mut events);

    let is_reply = |v: &Value| v.get("result").is_some() || v.get("error").is_some();
    let position = events
        .iter()
        .position(|v| is_reply(v) && v.get("id").and_then(Value::as_u64) == Some(id))
        .or_else(|| events.iter().position(is_reply))?;
    Some(events.swap_remove(position))
}

fn into_result(method: &str, mut reply: Value) -> Result<Value, IntegrationError> {
    if let Some(error) = reply.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        return Err(IntegrationError::Transport(format!(
            "{method} failed: {message} (code {code})"
        )));
    }
    reply
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| IntegrationError::Transport(format!("{method}: reply has no result")))
}

/// Text blocks of a `tools/call` result, joined.
fn content_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl RemoteTransport for HttpMcpTransport {
    async fn connect(&self) -> Result<(), IntegrationError> {
        self.closed.store(false, Ordering::SeqCst);
        self.set_session_id(None);

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": self.client_name, "version": env!("CARGO_PKG_VERSION")},
        });
        let result = self
            .request("initialize", params)
            .await
            .map_err(|e| IntegrationError::Connect(format!("initialize failed: {e}")))?;
        tracing::debug!(
            endpoint = %self.endpoint,
            server = ?result.get("serverInfo"),
            session = ?self.session_id(),
            "MCP session initialized"
        );

        self.notify("notifications/initialized")
            .await
            .map_err(|e| IntegrationError::Connect(format!("initialized notification failed: {e}")))
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, IntegrationError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = match cursor {
                Some(ref c) => json!({"cursor": c}),
                None => json!({}),
            };
            let result = self.request("tools/list", params).await?;
            let page: ToolsPage = serde_json::from_value(result)
                .map_err(|e| IntegrationError::Transport(format!("tools/list: invalid result: {e}")))?;

            tools.extend(page.tools.into_iter().map(|t| {
                let descriptor = ToolDescriptor::new(t.name, t.description.unwrap_or_default());
                match t.input_schema {
                    Some(schema) => descriptor.with_schema(schema),
                    None => descriptor,
                }
            }));

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(endpoint = %self.endpoint, "tools/list pagination did not terminate; truncating");
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, IntegrationError> {
        let arguments = if args.is_null() { json!({}) } else { args };
        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;

        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            let text = content_text(&result);
            return Err(IntegrationError::ToolCall(if text.is_empty() {
                format!("tool '{name}' reported an error")
            } else {
                text
            }));
        }
        Ok(result)
    }

    async fn close(&self) -> Result<(), IntegrationError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(session) = self.session_id() else {
            return Ok(());
        };
        self.set_session_id(None);

        let response = self
            .client
            .delete(&self.endpoint)
            .header(SESSION_HEADER, session)
            .send()
            .await
            .map_err(|e| IntegrationError::Transport(format!("DELETE {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        // Servers without explicit session teardown answer 405.
        if status.is_success()
            || status == reqwest::StatusCode::METHOD_NOT_ALLOWED
            || status == reqwest::StatusCode::NOT_FOUND
        {
            Ok(())
        } else {
            Err(IntegrationError::Transport(format!(
                "HTTP {status} closing session at {}",
                self.endpoint
            )))
        }
    }
}

/// Builds [`HttpMcpTransport`]s sharing one HTTP client.
pub struct HttpMcpTransportFactory {
    client: reqwest::Client,
    client_name: String,
}

impl HttpMcpTransportFactory {
    /// # Errors
    ///
    /// [`IntegrationError::Transport`] if the HTTP client cannot be built.
    pub fn new(settings: &IntegrationsConfig) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(format!("{}/{}", settings.client_name, env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IntegrationError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            client_name: settings.client_name.clone(),
        })
    }
}

impl RemoteTransportFactory for HttpMcpTransportFactory {
    fn create(
        &self,
        endpoint: &str,
        details: &RuntimeDetails,
    ) -> Result<Arc<dyn RemoteTransport>, IntegrationError> {
        let url = url::Url::parse(endpoint)
            .map_err(|e| IntegrationError::Connect(format!("invalid endpoint '{endpoint}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IntegrationError::Connect(format!(
                "endpoint '{endpoint}' must be http or https"
            )));
        }
        let name = format!(
            "{}-{}-{}",
            self.client_name, details.service_type, details.name_slug
        );
        Ok(Arc::new(HttpMcpTransport::new(
            self.client.clone(),
            url.as_str(),
            name,
        )))
    }
}
