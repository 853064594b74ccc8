//! Integration tests for the ingest → decide → review flow over HTTP and WS.
//!
//! Each test spins up the full router on a random port with stub
//! collaborators, connects via tokio-tungstenite, and drives the REST API
//! with reqwest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use reply_autopilot::cards::{ReviewQueue, ReviewState};
use reply_autopilot::error::ServiceError;
use reply_autopilot::pipeline::feedback::FeedbackRecorder;
use reply_autopilot::pipeline::ingest::{ingest_channel, spawn_dispatcher};
use reply_autopilot::pipeline::processor::{MessageProcessor, PipelineTimeouts, ProcessorDeps};
use reply_autopilot::pipeline::types::{
    DraftRequest, DraftResult, DraftService, FeedbackRecord, FeedbackSink, MemoryService, Transport,
};
use reply_autopilot::policy::PolicyStore;
use reply_autopilot::server;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

type Ws = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ── Stubs ────────────────────────────────────────────────────────────

struct StubDrafts;

#[async_trait]
impl DraftService for StubDrafts {
    async fn draft(&self, request: &DraftRequest) -> Result<DraftResult, ServiceError> {
        if request.incoming.contains("liar") {
            return Ok(DraftResult::new("I won't argue over text.").with_goal("de-escalate+boundary"));
        }
        Ok(DraftResult::new("stub reply").with_sentiment("neutral"))
    }
}

struct StubMemory;

#[async_trait]
impl MemoryService for StubMemory {
    async fn summary(&self, _contact: &str, _limit: usize) -> Result<String, ServiceError> {
        Ok("Mostly weekend plans".into())
    }
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, contact: &str, text: &str) -> Result<(), ServiceError> {
        self.sent
            .lock()
            .unwrap()
            .push((contact.to_string(), text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<FeedbackRecord>>,
}

#[async_trait]
impl FeedbackSink for CollectingSink {
    async fn submit(&self, record: &FeedbackRecord) -> Result<(), ServiceError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct TestServer {
    base: String,
    ws_url: String,
    transport: Arc<RecordingTransport>,
    feedback: Arc<CollectingSink>,
    http: reqwest::Client,
}

/// Start the full router on a random port.
async fn start_server() -> TestServer {
    let policy = Arc::new(PolicyStore::in_memory());
    let transport = Arc::new(RecordingTransport::default());
    let sink = Arc::new(CollectingSink::default());
    let feedback = FeedbackRecorder::new(sink.clone(), Duration::from_secs(1));
    let queue = ReviewQueue::new(15);

    let processor = Arc::new(MessageProcessor::new(
        ProcessorDeps {
            drafts: Arc::new(StubDrafts),
            memory: Arc::new(StubMemory),
            transport: transport.clone(),
            presenter: queue.clone(),
            feedback: feedback.clone(),
            policy: Arc::clone(&policy),
        },
        PipelineTimeouts::default(),
        10,
    ));

    let (ingest, rx) = ingest_channel(16);
    spawn_dispatcher(rx, processor);

    let app = server::router(
        ingest,
        policy,
        ReviewState {
            queue,
            transport: transport.clone(),
            feedback,
            send_timeout: Duration::from_secs(1),
        },
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        ws_url: format!("ws://127.0.0.1:{port}/ws"),
        transport,
        feedback: sink,
        http: reqwest::Client::new(),
    }
}

/// Next text frame from the server, parsed as JSON.
async fn next_json(ws: &mut Ws) -> Value {
    loop {
        match ws.next().await.expect("WS closed").expect("WS error") {
            Message::Text(txt) => return serde_json::from_str(&txt).expect("invalid JSON from server"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected Text frame, got {other:?}"),
        }
    }
}

async fn connect(server: &TestServer) -> Ws {
    let (mut ws, _resp) = connect_async(server.ws_url.as_str()).await.expect("WS connect failed");
    let sync = next_json(&mut ws).await;
    assert_eq!(sync["type"], "cards_sync");
    ws
}

async fn post_incoming(server: &TestServer, body: Value) -> reqwest::Response {
    server
        .http
        .post(format!("{}/api/incoming", server.base))
        .json(&body)
        .send()
        .await
        .unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_check() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let resp = server.http.get(format!("{}/health", server.base)).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn incoming_message_waits_for_review_then_sends_on_approve() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let mut ws = connect(&server).await;

        let resp = post_incoming(&server, json!({"contact": "+61412345678", "body": "are you free saturday?"})).await;
        assert_eq!(resp.status(), 202);

        let new_card = next_json(&mut ws).await;
        assert_eq!(new_card["type"], "new_card");
        let card = &new_card["card"];
        assert_eq!(card["status"], "pending");
        assert_eq!(card["auto_send"], false);
        assert_eq!(card["reason"], "auto_send_disabled");
        assert_eq!(card["draft"], "stub reply");
        assert_eq!(card["summary"], "Mostly weekend plans");
        let id = card["id"].as_str().unwrap().to_string();

        let pending: Vec<Value> = server
            .http
            .get(format!("{}/api/review", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        let resp = server
            .http
            .post(format!("{}/api/review/{id}/approve", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let approved: Value = resp.json().await.unwrap();
        assert_eq!(approved["status"], "sent");

        let update = next_json(&mut ws).await;
        assert_eq!(update["type"], "card_update");
        assert_eq!(update["status"], "approved");
        let update = next_json(&mut ws).await;
        assert_eq!(update["status"], "sent");

        assert_eq!(
            *server.transport.sent.lock().unwrap(),
            vec![("+61412345678".to_string(), "stub reply".to_string())]
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        let records = server.feedback.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].accepted);
        assert_eq!(records[0].tags["source"], "review");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn allowlisted_message_is_auto_sent() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;

        let resp = server
            .http
            .put(format!("{}/api/policy/settings", server.base))
            .json(&json!({"auto_send_enabled": true, "allowlist": ["saturday"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let mut ws = connect(&server).await;
        let resp = post_incoming(&server, json!({"contact": "+61412345678", "body": "are you free saturday?"})).await;
        assert_eq!(resp.status(), 202);

        let new_card = next_json(&mut ws).await;
        assert_eq!(new_card["card"]["auto_send"], true);
        assert_eq!(new_card["card"]["status"], "auto_sending");
        let update = next_json(&mut ws).await;
        assert_eq!(update["type"], "card_update");
        assert_eq!(update["status"], "sent");

        assert_eq!(server.transport.sent.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let records = server.feedback.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tags["source"], "auto_send");
        assert_eq!(records[0].final_text, "stub reply");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn always_auto_contact_still_held_for_de_escalation() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;

        let resp = server
            .http
            .post(format!("{}/api/policy/lists/always_auto", server.base))
            .json(&json!({"contact": "Courtney"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let mut ws = connect(&server).await;
        post_incoming(&server, json!({"contact": "Courtney", "body": "you are a liar"})).await;

        let new_card = next_json(&mut ws).await;
        assert_eq!(new_card["card"]["auto_send"], false);
        assert_eq!(new_card["card"]["reason"], "de_escalation");
        assert_eq!(new_card["card"]["status"], "pending");
        assert!(server.transport.sent.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn other_notification_channel_is_never_sent_directly() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        server
            .http
            .post(format!("{}/api/policy/lists/always_auto", server.base))
            .json(&json!({"contact": "Mum"}))
            .send()
            .await
            .unwrap();

        let mut ws = connect(&server).await;
        post_incoming(
            &server,
            json!({"contact": "Mum", "body": "dinner on sunday?", "channel": "other_notification"}),
        )
        .await;

        let new_card = next_json(&mut ws).await;
        assert_eq!(new_card["card"]["auto_send"], true);
        let update = next_json(&mut ws).await;
        assert_eq!(update["status"], "pending");
        assert!(server.transport.sent.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rejects_bad_requests() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;

        let resp = post_incoming(&server, json!({"contact": "Alex", "body": "   "})).await;
        assert_eq!(resp.status(), 400);

        let resp = server
            .http
            .post(format!("{}/api/review/not-a-uuid/approve", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = server
            .http
            .post(format!("{}/api/review/{}/dismiss", server.base, uuid::Uuid::new_v4()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = server
            .http
            .put(format!("{}/api/policy/settings", server.base))
            .json(&json!({"confidence_threshold": 2.0}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    })
    .await
    .expect("test timed out");
}
