//! HTTP boundary
//!
//! The front end sends one user message per turn and consumes the chunk
//! sequence over SSE, appending every chunk to a single growing assistant
//! transcript entry. History lives server-side, per conversation.

use crate::graph::{ConversationState, DialogueGraph};
use crate::message::RawMessage;
use crate::stream::{stream_turn, StreamContext, StreamOutcome};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// User input is truncated to this many characters before processing
const INPUT_CHAR_LIMIT: usize = 500;

/// One conversation's server-side state. The mutex also serializes turns:
/// a new turn waits until the prior one's sequence is fully drained.
#[derive(Default)]
struct Session {
    history: Vec<RawMessage>,
    ctx: StreamContext,
}

/// Shared application state
pub struct AppState {
    graph: Arc<DialogueGraph>,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl AppState {
    pub fn new(graph: Arc<DialogueGraph>) -> Arc<Self> {
        Arc::new(Self {
            graph,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    async fn session(&self, id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(id.to_string()).or_default())
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/conversations/:id/messages", post(post_message))
        .route("/api/conversations/:id/reset", post(reset_conversation))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    text: String,
}

/// Events sent to SSE clients during one turn
#[derive(Debug, Clone)]
enum TurnEvent {
    Chunk { text: String },
    Done { outcome: StreamOutcome },
    Error { message: String },
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<TurnRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let text = sanitize(&request.text);
    let session = state.session(&id).await;
    let graph = Arc::clone(&state.graph);
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        run_turn(graph, session, id, text, tx).await;
    });

    sse_response(rx)
}

/// Drive one turn to completion, forwarding chunks to the client and
/// appending the result to the server-side history.
async fn run_turn(
    graph: Arc<DialogueGraph>,
    session: Arc<Mutex<Session>>,
    conversation_id: String,
    text: String,
    tx: mpsc::Sender<TurnEvent>,
) {
    // Serializes turns on this conversation.
    let mut guard = session.lock().await;

    if text.is_empty() {
        let _ = tx
            .send(TurnEvent::Error {
                message: "Message must not be empty".to_string(),
            })
            .await;
        return;
    }

    // An empty history is the new-conversation boundary.
    if guard.history.is_empty() {
        guard.ctx.reset();
    }

    tracing::info!(conversation_id = %conversation_id, chars = text.chars().count(), "Turn received");

    let initial = ConversationState::new_turn(guard.history.clone(), text.clone());
    let Session { history, ctx } = &mut *guard;

    let mut stream = stream_turn(&graph, initial, ctx);
    let mut parts: Vec<String> = Vec::new();
    while let Some(chunk) = stream.next().await {
        parts.push(chunk.clone());
        if tx.send(TurnEvent::Chunk { text: chunk }).await.is_err() {
            // Client went away; stopping iteration is the cancellation.
            tracing::debug!(conversation_id = %conversation_id, "Client disconnected mid-turn");
            break;
        }
    }
    let outcome = stream.outcome().unwrap_or(StreamOutcome::Completed);
    drop(stream);

    if outcome != StreamOutcome::DuplicateRequest {
        history.push(RawMessage::user(text));
        if !parts.is_empty() {
            history.push(RawMessage::assistant(parts.join(" ")));
        }
    }

    tracing::info!(
        conversation_id = %conversation_id,
        chunks = parts.len(),
        outcome = outcome_label(outcome),
        "Turn finished"
    );
    let _ = tx.send(TurnEvent::Done { outcome }).await;
}

async fn reset_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    let session = state.session(&id).await;
    let mut guard = session.lock().await;
    guard.history.clear();
    guard.ctx.reset();
    tracing::info!(conversation_id = %id, "Conversation reset");
    StatusCode::NO_CONTENT
}

fn sanitize(text: &str) -> String {
    text.trim().chars().take(INPUT_CHAR_LIMIT).collect()
}

fn outcome_label(outcome: StreamOutcome) -> &'static str {
    match outcome {
        StreamOutcome::Completed => "completed",
        StreamOutcome::DuplicateRequest => "duplicate_request",
        StreamOutcome::ToolTimeout => "tool_timeout",
        StreamOutcome::TimedOut => "timed_out",
        StreamOutcome::Failed => "failed",
    }
}

fn sse_response(
    rx: mpsc::Receiver<TurnEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(|event| Ok(turn_event_to_sse(event)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn turn_event_to_sse(event: TurnEvent) -> Event {
    let (event_type, data) = match event {
        TurnEvent::Chunk { text } => ("chunk", json!({"text": text})),
        TurnEvent::Done { outcome } => ("done", json!({"outcome": outcome_label(outcome)})),
        TurnEvent::Error { message } => ("error", json!({"message": message})),
    };
    Event::default().event(event_type).data(data.to_string())
}
