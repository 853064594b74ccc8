use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use reply_autopilot::cards::{ReviewQueue, ReviewState, spawn_expiry_task};
use reply_autopilot::config::AutopilotConfig;
use reply_autopilot::pipeline::feedback::FeedbackRecorder;
use reply_autopilot::pipeline::ingest::{ingest_channel, spawn_dispatcher};
use reply_autopilot::pipeline::processor::{MessageProcessor, ProcessorDeps};
use reply_autopilot::pipeline::types::Transport;
use reply_autopilot::policy::PolicyStore;
use reply_autopilot::server;
use reply_autopilot::services::{
    Backend, DryRunTransport, HttpDraftService, HttpFeedbackSink, HttpMemoryService,
    TwilioTransport,
};

/// Stderr logging, plus a daily rolling file when `AUTOPILOT_LOG_DIR` is set.
/// The returned guard flushes the file writer on drop.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var_os("AUTOPILOT_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "reply-autopilot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = init_tracing();

    let config = AutopilotConfig::from_env()?;

    let transport_name = if config.twilio.is_some() { "twilio" } else { "dry-run" };
    eprintln!("📨 Reply Autopilot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Policy: {}", config.policy_path.display());
    eprintln!("   Draft service: {}", config.draft_url);
    eprintln!("   Transport: {}", transport_name);
    eprintln!("   Review WS: ws://0.0.0.0:{}/ws", config.port);
    eprintln!("   Incoming: http://0.0.0.0:{}/api/incoming\n", config.port);

    // ── Policy ───────────────────────────────────────────────────────────
    let policy = Arc::new(PolicyStore::open(&config.policy_path));

    // ── Collaborators ────────────────────────────────────────────────────
    let client = reqwest::Client::new();
    let backend = |url: &str| Backend::new(client.clone(), url, config.api_token.clone());

    let transport: Arc<dyn Transport> = match config.twilio.clone() {
        Some(twilio) => Arc::new(TwilioTransport::new(twilio, client.clone())),
        None => {
            tracing::warn!("Twilio credentials not set, auto-sent replies will only be logged");
            Arc::new(DryRunTransport)
        }
    };

    let feedback = FeedbackRecorder::new(
        Arc::new(HttpFeedbackSink::new(backend(&config.feedback_url))),
        config.feedback_timeout,
    );

    // ── Review queue ─────────────────────────────────────────────────────
    let review_queue = ReviewQueue::new(config.card_expire_minutes);
    let _expiry_handle = spawn_expiry_task(Arc::clone(&review_queue));

    // ── Pipeline ─────────────────────────────────────────────────────────
    let processor = Arc::new(MessageProcessor::new(
        ProcessorDeps {
            drafts: Arc::new(HttpDraftService::new(backend(&config.draft_url))),
            memory: Arc::new(HttpMemoryService::new(backend(&config.memory_url))),
            transport: Arc::clone(&transport),
            presenter: review_queue.clone(),
            feedback: feedback.clone(),
            policy: Arc::clone(&policy),
        },
        config.timeouts,
        config.memory_limit,
    ));

    let (ingest, rx) = ingest_channel(config.queue_capacity);
    let _dispatcher = spawn_dispatcher(rx, processor);

    // ── HTTP / WS server ─────────────────────────────────────────────────
    let app = server::router(
        ingest,
        policy,
        ReviewState {
            queue: review_queue,
            transport,
            feedback,
            send_timeout: config.timeouts.send,
        },
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "Reply Autopilot listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
