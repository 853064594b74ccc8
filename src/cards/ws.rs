//! WebSocket server + REST endpoints for the review queue.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::model::{CardAction, CardStatus, ReviewCard, WsMessage};
use super::queue::ReviewQueue;
use crate::error::ServiceError;
use crate::pipeline::feedback::FeedbackRecorder;
use crate::pipeline::types::{FeedbackRecord, Transport};

/// State shared across review handlers.
#[derive(Clone)]
pub struct ReviewState {
    pub queue: Arc<ReviewQueue>,
    pub transport: Arc<dyn Transport>,
    pub feedback: FeedbackRecorder,
    pub send_timeout: Duration,
}

/// Build the router with the review WebSocket, REST routes and health check.
pub fn review_routes(state: ReviewState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/review", get(list_cards))
        .route("/api/review/{id}/approve", post(approve_card))
        .route("/api/review/{id}/dismiss", post(dismiss_card))
        .route("/api/review/{id}/edit", post(edit_card))
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "reply-autopilot"
    }))
}

// ── Actions ─────────────────────────────────────────────────────────────

/// Apply a reviewer action, deliver the reply if there is one, and record
/// feedback. Returns `None` if the card is unknown or no longer actionable.
async fn apply_action(state: &ReviewState, action: CardAction) -> Option<ReviewCard> {
    let card = match action {
        CardAction::Approve { card_id } => state.queue.approve(card_id).await?,
        CardAction::Edit { card_id, new_text } => state.queue.edit(card_id, new_text).await?,
        CardAction::Dismiss { card_id } => {
            let card = state.queue.dismiss(card_id).await?;
            let record = FeedbackRecord::new(&card.contact, &card.incoming, &card.draft, "", false, false)
                .with_tag("source", "review")
                .with_tag("reason", card.reason.label());
            state.feedback.submit(record);
            return Some(card);
        }
    };

    Some(deliver(state, card).await)
}

/// Send an approved card's reply and record the outcome.
async fn deliver(state: &ReviewState, mut card: ReviewCard) -> ReviewCard {
    let text = card.reply_text().to_string();

    let delivered = if card.channel.supports_direct_send() {
        match send_with_timeout(state, &card.contact, &text).await {
            Ok(()) => {
                state.queue.mark_sent(card.id).await;
                card.status = CardStatus::Sent;
                info!(card_id = %card.id, transport = state.transport.name(), "Reviewed reply sent");
                true
            }
            Err(e) => {
                error!(card_id = %card.id, error = %e, "Failed to send reviewed reply");
                false
            }
        }
    } else {
        info!(
            card_id = %card.id,
            channel = %card.channel,
            "Approved on a channel without direct send, reply must be sent from the source app"
        );
        false
    };

    let record = FeedbackRecord::new(
        &card.contact,
        &card.incoming,
        &card.draft,
        &text,
        true,
        card.is_edited(),
    )
    .with_tag("source", "review")
    .with_tag("reason", card.reason.label())
    .with_tag("delivered", delivered.to_string());
    state.feedback.submit(record);

    card
}

async fn send_with_timeout(state: &ReviewState, contact: &str, text: &str) -> Result<(), ServiceError> {
    match tokio::time::timeout(state.send_timeout, state.transport.send(contact, text)).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout {
            service: state.transport.name().to_string(),
            timeout: state.send_timeout,
        }),
    }
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ReviewState>) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn send_sync(socket: &mut WebSocket, queue: &ReviewQueue) -> bool {
    let sync = WsMessage::CardsSync {
        cards: queue.pending().await,
    };
    match serde_json::to_string(&sync) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => true,
    }
}

async fn handle_socket(mut socket: WebSocket, state: ReviewState) {
    info!("WebSocket client connected");

    // Subscribe before the sync so no card falls between the two.
    let mut rx = state.queue.subscribe();

    if !send_sync(&mut socket, &state.queue).await {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg)
                            && socket.send(Message::Text(json.into())).await.is_err()
                        {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind broadcast");
                        if !send_sync(&mut socket, &state.queue).await {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &state);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

/// Parse a client frame and run its action on its own task, off the socket
/// loop. Returns `None` for frames that carry no action.
fn handle_client_message(text: &str, state: &ReviewState) -> Option<JoinHandle<()>> {
    let action = match serde_json::from_str::<CardAction>(text) {
        Ok(action) => action,
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
            return None;
        }
    };
    if let CardAction::Edit { ref new_text, card_id } = action
        && new_text.trim().is_empty()
    {
        warn!(card_id = %card_id, "Edit with empty text ignored");
        return None;
    }

    let state = state.clone();
    Some(tokio::spawn(async move {
        if apply_action(&state, action).await.is_none() {
            warn!("WS action failed, card not found or not awaiting review");
        }
    }))
}

// ── REST Endpoints ──────────────────────────────────────────────────────

async fn list_cards(State(state): State<ReviewState>) -> impl IntoResponse {
    Json(state.queue.pending().await)
}

fn bad_request(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
}

fn action_response(card: Option<ReviewCard>) -> (StatusCode, Json<serde_json::Value>) {
    match card {
        Some(card) => (StatusCode::OK, Json(serde_json::json!(card))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Card not found or not awaiting review"})),
        ),
    }
}

async fn approve_card(State(state): State<ReviewState>, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(card_id) = Uuid::parse_str(&id) else {
        return bad_request("Invalid card ID");
    };
    action_response(apply_action(&state, CardAction::Approve { card_id }).await)
}

async fn dismiss_card(State(state): State<ReviewState>, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(card_id) = Uuid::parse_str(&id) else {
        return bad_request("Invalid card ID");
    };
    action_response(apply_action(&state, CardAction::Dismiss { card_id }).await)
}

#[derive(Deserialize)]
struct EditRequest {
    text: String,
}

async fn edit_card(
    State(state): State<ReviewState>,
    Path(id): Path<String>,
    Json(body): Json<EditRequest>,
) -> impl IntoResponse {
    let Ok(card_id) = Uuid::parse_str(&id) else {
        return bad_request("Invalid card ID");
    };
    if body.text.trim().is_empty() {
        return bad_request("Reply text must not be empty");
    }
    let action = CardAction::Edit {
        card_id,
        new_text: body.text,
    };
    action_response(apply_action(&state, action).await)
}
