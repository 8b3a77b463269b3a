//! Wire envelopes exchanged with the agent server.
//!
//! Inbound messages are decoded in two steps: the `type` tag decides whether
//! the message is one this client understands at all, and only known types
//! are then held to their schema. Unknown types are reported as
//! [`InboundEnvelope::Ignored`]; known types with missing fields are a
//! [`ProtocolError`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Stable error codes for protocol failures.
pub mod error_codes {
    pub const MISSING_CONNECTION_ID: &str = "PROTOCOL_MISSING_CONNECTION_ID";
    pub const MALFORMED_TOOL_CALL: &str = "PROTOCOL_MALFORMED_TOOL_CALL";
}

const TYPE_CONNECTION_ESTABLISHED: &str = "connection_established";
const TYPE_TOOL_CALL: &str = "tool_call";

/// A known envelope type arrived without its required fields.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid connection_established payload: missing connection_id")]
    MissingConnectionId,

    /// `tool_call_id` is kept when present so the call can still be answered.
    #[error("Invalid tool_call structure: {reason}")]
    MalformedToolCall {
        tool_call_id: Option<String>,
        reason: String,
    },
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingConnectionId => error_codes::MISSING_CONNECTION_ID,
            Self::MalformedToolCall { .. } => error_codes::MALFORMED_TOOL_CALL,
        }
    }
}

/// A validated tool invocation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallEnvelope {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Result of decoding one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEnvelope {
    ConnectionEstablished { connection_id: String },
    ToolCall(ToolCallEnvelope),
    /// A message type this client does not handle.
    Ignored { kind: Option<String> },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownEnvelope {
    ConnectionEstablished {
        #[serde(default)]
        connection_id: Option<String>,
    },
    ToolCall {
        #[serde(default)]
        tool_call_id: Option<String>,
        #[serde(default)]
        data: Option<ToolCallData>,
    },
}

#[derive(Deserialize)]
struct ToolCallData {
    #[serde(default)]
    name: Option<String>,
    /// `None` only when the key is absent; an explicit `null` is kept.
    #[serde(default, deserialize_with = "present")]
    arguments: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Decode an inbound JSON message.
///
/// # Errors
///
/// [`ProtocolError`] when a known envelope type is malformed.
pub fn decode(value: &Value) -> Result<InboundEnvelope, ProtocolError> {
    // Bare strings, arrays and numbers carry no `type`.
    let Some(obj) = value.as_object() else {
        return Ok(InboundEnvelope::Ignored { kind: None });
    };
    let kind = obj.get("type").and_then(Value::as_str);

    if !matches!(kind, Some(TYPE_CONNECTION_ESTABLISHED | TYPE_TOOL_CALL)) {
        return Ok(InboundEnvelope::Ignored {
            kind: kind.map(str::to_owned),
        });
    }

    let raw_call_id = || {
        obj.get("tool_call_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
    };

    let known: KnownEnvelope = serde_json::from_value(value.clone()).map_err(|e| match kind {
        Some(TYPE_TOOL_CALL) => ProtocolError::MalformedToolCall {
            tool_call_id: raw_call_id(),
            reason: e.to_string(),
        },
        _ => ProtocolError::MissingConnectionId,
    })?;

    match known {
        KnownEnvelope::ConnectionEstablished { connection_id } => connection_id
            .filter(|id| !id.is_empty())
            .map(|connection_id| InboundEnvelope::ConnectionEstablished { connection_id })
            .ok_or(ProtocolError::MissingConnectionId),
        KnownEnvelope::ToolCall { tool_call_id, data } => {
            let tool_call_id = tool_call_id.filter(|id| !id.is_empty());
            let malformed = |reason: &str| ProtocolError::MalformedToolCall {
                tool_call_id: tool_call_id.clone(),
                reason: reason.to_owned(),
            };
            let data = data.ok_or_else(|| malformed("missing data"))?;
            let tool_name = data
                .name
                .filter(|n| !n.is_empty())
                .ok_or_else(|| malformed("missing data.name"))?;
            let arguments = data
                .arguments
                .ok_or_else(|| malformed("missing data.arguments"))?;
            let tool_call_id = tool_call_id
                .clone()
                .ok_or_else(|| malformed("missing tool_call_id"))?;
            Ok(InboundEnvelope::ToolCall(ToolCallEnvelope {
                tool_call_id,
                tool_name,
                arguments,
            }))
        }
    }
}

/// Outcome of one tool call as sent back upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResponse {
    Success { result: Value },
    Error { error: String },
}

/// `{"tool_call_id": .., "response": {..}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponseEnvelope {
    pub tool_call_id: String,
    pub response: ToolResponse,
}

impl ToolResponseEnvelope {
    pub fn success(tool_call_id: impl Into<String>, result: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            response: ToolResponse::Success { result },
        }
    }

    pub fn error(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            response: ToolResponse::Error {
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.response, ToolResponse::Success { .. })
    }
}
