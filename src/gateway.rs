//! HTTP + WebSocket gateway.
//!
//! One listener carries both surfaces: a small REST API for text commands
//! and context updates, and the WebSocket executor channel over which
//! clients receive broadcast events and answer `function_request`s.
//!
//! A command received over the WebSocket is processed on its own task so
//! the socket's read loop keeps pumping `function_response` messages — the
//! executor answering a function call is often the same connection that
//! submitted the command.

use crate::broker::FunctionBroker;
use crate::config::AssistConfig;
use crate::model::ModelClient;
use crate::orchestrator::{Orchestrator, Outcome};
use crate::protocol::{
    ClientMessage, CommandRequest, CommandResponse, ContextUpdate, ServerEvent, ServerStatus,
};
use crate::session::SessionState;
use axum::Json;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Shared server state.
pub struct ServerState {
    /// The single conversation session, processed one utterance at a time.
    orchestrator: tokio::sync::Mutex<Orchestrator>,
    broker: Arc<FunctionBroker>,
    activation_phrase: String,
    started_at: DateTime<Utc>,
}

/// Build the shared state from config and a model client.
#[must_use]
pub fn build_state(config: &AssistConfig, model: Arc<dyn ModelClient>) -> Arc<ServerState> {
    let broker = Arc::new(FunctionBroker::new(config.broker.call_timeout()));
    let orchestrator = Orchestrator::new(
        SessionState::new(config.conversation.inactivity_window()),
        config.model.history_window,
        model,
        Arc::clone(&broker),
    );
    Arc::new(ServerState {
        orchestrator: tokio::sync::Mutex::new(orchestrator),
        broker,
        activation_phrase: config.conversation.activation_phrase.clone(),
        started_at: Utc::now(),
    })
}

/// Build the router over the shared state.
pub fn router(state: Arc<ServerState>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/api/command", post(command))
        .route("/api/context", post(context))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// Serve the gateway until the listener fails. Also runs the continuity
/// sweeper that expires idle conversations.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or serving fails.
pub async fn run_gateway(
    config: AssistConfig,
    model: Arc<dyn ModelClient>,
) -> anyhow::Result<()> {
    let state = build_state(&config, model);

    let sweeper_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tick.tick().await;
            let mut orchestrator = sweeper_state.orchestrator.lock().await;
            if orchestrator.check_timeout(Instant::now()) {
                info!("continuity expired by inactivity");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    let local_addr = listener.local_addr()?;
    info!("gateway listening on http://{local_addr}");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn status(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let conversation_active = state.orchestrator.lock().await.conversation_active();
    Json(ServerStatus {
        running: true,
        activation_phrase: state.activation_phrase.clone(),
        connected_executors: state.broker.executor_count(),
        conversation_active,
        started_at: state.started_at,
    })
}

async fn command(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CommandRequest>,
) -> impl IntoResponse {
    let mut orchestrator = state.orchestrator.lock().await;
    if let Some(context) = request.context {
        orchestrator.update_context(context);
    }
    let outcome = orchestrator.handle(&request.text).await;
    Json(outcome_response(outcome))
}

async fn context(
    State(state): State<Arc<ServerState>>,
    Json(update): Json<ContextUpdate>,
) -> impl IntoResponse {
    state
        .orchestrator
        .lock()
        .await
        .update_context(update.context.clone());
    Json(json!({
        "success": true,
        "message": "context updated",
        "context": update.context,
    }))
}

/// Convert an orchestration outcome into the REST response shape.
fn outcome_response(outcome: Outcome) -> CommandResponse {
    let intent = outcome.intent();
    match outcome {
        Outcome::Navigation { route } => CommandResponse {
            success: true,
            intent,
            data: Some(json!({ "route": route })),
            response_text: Some(format!("Navigating to {route}")),
            error: None,
            error_type: None,
        },
        Outcome::CookingCommand(command) => CommandResponse {
            success: true,
            intent,
            data: Some(json!({ "command": command.as_str() })),
            response_text: Some(format!("Running command: {}", command.as_str())),
            error: None,
            error_type: None,
        },
        Outcome::Answer { text } => CommandResponse {
            success: true,
            intent,
            data: None,
            response_text: Some(text),
            error: None,
            error_type: None,
        },
        Outcome::Error(error) => CommandResponse {
            success: false,
            intent,
            data: None,
            response_text: Some(error.to_string()),
            error: Some(error.to_string()),
            error_type: Some(error.error_type()),
        },
    }
}

async fn ws_upgrade(
    State(state): State<Arc<ServerState>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| executor_connection(socket, state))
}

/// One attached executor: forward broadcast events out, route inbound
/// messages to the broker and the orchestrator.
async fn executor_connection(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sink, mut stream) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let _ = event_tx.send(ServerEvent::Connected {
        message: "Connected to the sous voice server".to_owned(),
    });
    let executor_id = state.broker.attach(event_tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("cannot serialize event: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let parsed: ClientMessage = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("ignoring malformed client message: {e}");
                continue;
            }
        };
        match parsed {
            ClientMessage::Ping => {
                let _ = event_tx.send(ServerEvent::Pong);
            }
            ClientMessage::UpdateContext { context } => {
                state.orchestrator.lock().await.update_context(context);
            }
            ClientMessage::FunctionResponse { request_id, result } => {
                state.broker.resolve(&request_id, result);
            }
            ClientMessage::Command { text } => {
                // Processed off the read loop; see module docs.
                state.broker.broadcast(&ServerEvent::Transcript {
                    text: text.clone(),
                });
                let task_state = Arc::clone(&state);
                tokio::spawn(async move {
                    let outcome = task_state.orchestrator.lock().await.handle(&text).await;
                    debug!("ws command outcome: {}", outcome.intent());
                });
            }
        }
    }

    state.broker.detach(executor_id);
    writer.abort();
}
