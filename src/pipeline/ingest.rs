//! Bounded ingestion: HTTP endpoints (JSON and the SMS webhook) → mpsc
//! channel → one pipeline task per message.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::processor::MessageProcessor;
use super::types::{IncomingMessage, MessageChannel};
use crate::error::PipelineError;

/// Sending half of the ingest channel. Cheap to clone.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<IncomingMessage>,
}

/// Create the ingest channel with room for `capacity` queued messages.
pub fn ingest_channel(capacity: usize) -> (IngestQueue, mpsc::Receiver<IncomingMessage>) {
    let (tx, rx) = mpsc::channel(capacity);
    (IngestQueue { tx }, rx)
}

impl IngestQueue {
    /// Validate and enqueue without waiting. A full queue rejects the message.
    pub fn enqueue(&self, message: IncomingMessage) -> Result<Uuid, PipelineError> {
        if message.contact.trim().is_empty() {
            return Err(PipelineError::InvalidMessage("contact is empty".into()));
        }
        if message.body.trim().is_empty() {
            return Err(PipelineError::InvalidMessage("body is empty".into()));
        }

        let id = message.id;
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PipelineError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PipelineError::QueueClosed,
        })?;
        debug!(id = %id, "Message queued");
        Ok(id)
    }
}

/// Drain the channel, spawning one pipeline task per message. Ends when
/// every `IngestQueue` has been dropped.
pub fn spawn_dispatcher(
    mut rx: mpsc::Receiver<IncomingMessage>,
    processor: Arc<MessageProcessor>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            processor.spawn(message);
        }
        info!("Ingest channel closed, dispatcher stopping");
    })
}

// ── HTTP ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct IncomingRequest {
    contact: String,
    body: String,
    #[serde(default)]
    channel: MessageChannel,
}

pub fn ingest_routes(queue: IngestQueue) -> Router {
    Router::new()
        .route("/api/incoming", post(receive_message))
        .route("/sms", post(receive_sms))
        .with_state(queue)
}

async fn receive_message(
    State(queue): State<IngestQueue>,
    Json(req): Json<IncomingRequest>,
) -> impl IntoResponse {
    let message = IncomingMessage::new(req.contact.trim(), req.body, req.channel);
    match queue.enqueue(message) {
        Ok(id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "id": id })),
        ),
        Err(PipelineError::InvalidMessage(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": reason })),
        ),
        Err(e) => {
            warn!(error = %e, "Incoming message rejected");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}

/// Inbound SMS webhook fields. Twilio posts many more; they are ignored.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TwilioSms {
    #[serde(default)]
    from: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    profile_name: Option<String>,
}

impl TwilioSms {
    /// `"ProfileName +number"` when both are known, so the draft service
    /// sees the name and the reply still routes to the sender's number.
    fn contact(&self) -> String {
        let from = self.from.trim();
        match self.profile_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() && !from.is_empty() => format!("{name} {from}"),
            Some(name) if !name.is_empty() => name.to_string(),
            _ => from.to_string(),
        }
    }
}

const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

/// Twilio messaging webhook. Replies go out later through the transport, so
/// the TwiML answer is always empty.
async fn receive_sms(
    State(queue): State<IngestQueue>,
    Form(sms): Form<TwilioSms>,
) -> impl IntoResponse {
    let contact = sms.contact();
    info!(from = %sms.from, contact = %contact, "SMS webhook received");
    let message = IncomingMessage::new(contact, sms.body, MessageChannel::Sms);
    let status = match queue.enqueue(message) {
        Ok(_) => StatusCode::OK,
        Err(PipelineError::InvalidMessage(reason)) => {
            warn!(reason = %reason, "SMS webhook payload rejected");
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            warn!(error = %e, "Incoming SMS rejected");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (status, [(header::CONTENT_TYPE, "application/xml")], EMPTY_TWIML)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn message(body: &str) -> IncomingMessage {
        IncomingMessage::new("Alex", body, MessageChannel::Sms)
    }

    #[tokio::test]
    async fn full_queue_rejects() {
        let (queue, mut rx) = ingest_channel(1);
        queue.enqueue(message("one")).unwrap();
        assert!(matches!(queue.enqueue(message("two")), Err(PipelineError::QueueFull)));

        assert_eq!(rx.recv().await.unwrap().body, "one");
        queue.enqueue(message("three")).unwrap();
    }

    #[test]
    fn closed_queue_rejects() {
        let (queue, rx) = ingest_channel(4);
        drop(rx);
        assert!(matches!(queue.enqueue(message("hi")), Err(PipelineError::QueueClosed)));
    }

    #[test]
    fn blank_messages_rejected() {
        let (queue, _rx) = ingest_channel(4);
        assert!(matches!(
            queue.enqueue(IncomingMessage::new("  ", "hi", MessageChannel::Sms)),
            Err(PipelineError::InvalidMessage(_))
        ));
        assert!(matches!(queue.enqueue(message("\n")), Err(PipelineError::InvalidMessage(_))));
    }

    fn post(json: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/incoming")
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn endpoint_accepts_and_queues() {
        let (queue, mut rx) = ingest_channel(4);
        let app = ingest_routes(queue);

        let resp = app
            .oneshot(post(r#"{"contact": " Alex ", "body": "hi", "channel": "other_notification"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(resp.into_body(), usize::MAX).await.unwrap()).unwrap();

        let queued = rx.recv().await.unwrap();
        assert_eq!(body["id"], queued.id.to_string());
        assert_eq!(queued.contact, "Alex");
        assert_eq!(queued.channel, MessageChannel::OtherNotification);
    }

    fn sms_form(form: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/sms")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn sms_webhook_accepts_and_queues() {
        let (queue, mut rx) = ingest_channel(4);
        let app = ingest_routes(queue);

        let resp = app
            .clone()
            .oneshot(sms_form(
                "From=%2B61412345678&Body=free+tonight%3F&ProfileName=Sam&MessageSid=SM123",
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/xml");
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("<Response></Response>"));

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.contact, "Sam +61412345678");
        assert_eq!(queued.body, "free tonight?");
        assert_eq!(queued.channel, MessageChannel::Sms);

        let resp = app
            .clone()
            .oneshot(sms_form("From=%2B61412345678&Body=hi"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(rx.recv().await.unwrap().contact, "+61412345678");

        let resp = app.oneshot(sms_form("From=%2B61412345678&Body=")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn endpoint_maps_errors() {
        let (queue, _rx) = ingest_channel(1);
        let app = ingest_routes(queue);

        let resp = app.clone().oneshot(post(r#"{"contact": "Alex", "body": " "}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app.clone().oneshot(post(r#"{"contact": "Alex", "body": "a"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let resp = app.oneshot(post(r#"{"contact": "Alex", "body": "b"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
