//! Wire message types for the executor channel and the command API.
//!
//! The WebSocket carries JSON messages tagged by `type` in both directions.
//! Remote executors (browser clients holding the inventory database) receive
//! broadcast [`ServerEvent`]s and send [`ClientMessage`]s back; the REST
//! command endpoint speaks [`CommandRequest`]/[`CommandResponse`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Message broadcast (or replied) to connected executors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Greeting sent to a newly attached executor.
    Connected { message: String },
    /// Ask the executors to run a function and reply with the correlation id.
    FunctionRequest {
        request_id: String,
        function_name: String,
        args: Value,
    },
    /// Navigate the client UI.
    Navigation { route: String },
    /// Processing cue emitted before a model call.
    Thinking { message: String },
    /// Final spoken answer for the turn.
    LlmResponse { response: String },
    /// Terminal error for the turn.
    Error {
        error_type: String,
        error_message: String,
    },
    /// Continuity mode entered: follow-ups skip the activation phrase.
    ConversationActive,
    /// Continuity mode ended.
    ConversationInactive,
    /// A finalized transcription, echoed to all clients.
    Transcript { text: String },
    /// Reply to a ping.
    Pong,
}

/// Message received from an executor.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe; answered with [`ServerEvent::Pong`].
    Ping,
    /// Shallow-merge new UI context into the session.
    UpdateContext {
        #[serde(default)]
        context: HashMap<String, Value>,
    },
    /// Result of a previously requested function call.
    FunctionResponse {
        request_id: String,
        #[serde(default)]
        result: Value,
    },
    /// A transcribed utterance pushed by a client for processing.
    Command { text: String },
}

/// Result payload of a remote function call, as reported by the executor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FunctionReply {
    /// Whether the function succeeded.
    pub success: bool,
    /// Function-specific result data.
    pub data: Option<Value>,
    /// Failure description when `success` is false.
    pub error: Option<String>,
}

impl FunctionReply {
    /// Decode a raw reply value. Anything unrecognizable is a failure.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_else(|e| Self {
            success: false,
            data: None,
            error: Some(format!("malformed function result: {e}")),
        })
    }
}

/// Inbound text command.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    /// The transcribed utterance.
    pub text: String,
    /// Optional UI context merged into the session before processing.
    #[serde(default)]
    pub context: Option<HashMap<String, Value>>,
}

/// Outcome of processing a text command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    /// `navigation`, `cooking_command`, or `question`.
    pub intent: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
}

/// Context update request.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextUpdate {
    pub context: HashMap<String, Value>,
}

/// Server status report.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub running: bool,
    /// Activation phrase the transcription client should listen for.
    pub activation_phrase: String,
    /// Number of attached remote executors.
    pub connected_executors: usize,
    /// Whether continuity mode is currently active.
    pub conversation_active: bool,
    /// When the server started.
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn server_events_tag_by_type() {
        let event = ServerEvent::Navigation {
            route: "/recipes".to_owned(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "navigation", "route": "/recipes" })
        );

        let event = ServerEvent::ConversationActive;
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "conversation_active" })
        );
    }

    #[test]
    fn function_request_shape() {
        let event = ServerEvent::FunctionRequest {
            request_id: "r1".to_owned(),
            function_name: "getInventory".to_owned(),
            args: json!({}),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "function_request",
                "request_id": "r1",
                "function_name": "getInventory",
                "args": {},
            })
        );
    }

    #[test]
    fn client_messages_decode() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"function_response","request_id":"r1","result":{"success":true}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::FunctionResponse { request_id, result } => {
                assert_eq!(request_id, "r1");
                assert_eq!(result, json!({"success": true}));
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn function_reply_tolerates_shapes() {
        let ok = FunctionReply::from_value(json!({"success": true, "data": [1, 2]}));
        assert!(ok.success);
        assert_eq!(ok.data, Some(json!([1, 2])));

        let failed = FunctionReply::from_value(json!({"success": false, "error": "nope"}));
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("nope"));

        let junk = FunctionReply::from_value(json!("garbage"));
        assert!(!junk.success);
        assert!(junk.error.is_some());
    }

    #[test]
    fn command_response_omits_empty_fields() {
        let response = CommandResponse {
            success: true,
            intent: "question",
            data: None,
            response_text: Some("hi".to_owned()),
            error: None,
            error_type: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({ "success": true, "intent": "question", "response_text": "hi" })
        );
    }
}
