//! Message processor: runs one incoming message through the reply pipeline.
//!
//! Flow:
//! 1. Draft service (critical path: failure or timeout aborts the message)
//! 2. Confidence estimate
//! 3. Memory summary (best-effort, empty on failure)
//! 4. Auto-send decision against a policy snapshot
//! 5. Presentation for human review (always)
//! 6. Auto-send via transport + detached feedback, when allowed

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, ServiceError};
use crate::pipeline::confidence::estimate_confidence;
use crate::pipeline::decision::decide;
use crate::pipeline::feedback::FeedbackRecorder;
use crate::pipeline::types::{
    DecisionVerdict, DraftRequest, DraftResult, DraftService, FeedbackRecord, IncomingMessage,
    MemoryService, Presentation, Presenter, Transport,
};
use crate::policy::PolicyStore;

/// Per-call bounds for the collaborators on the pipeline path.
#[derive(Debug, Clone, Copy)]
pub struct PipelineTimeouts {
    pub draft: Duration,
    pub memory: Duration,
    pub send: Duration,
}

impl Default for PipelineTimeouts {
    fn default() -> Self {
        Self {
            draft: Duration::from_secs(30),
            memory: Duration::from_secs(5),
            send: Duration::from_secs(15),
        }
    }
}

/// Collaborators injected into the processor.
pub struct ProcessorDeps {
    pub drafts: Arc<dyn DraftService>,
    pub memory: Arc<dyn MemoryService>,
    pub transport: Arc<dyn Transport>,
    pub presenter: Arc<dyn Presenter>,
    pub feedback: FeedbackRecorder,
    pub policy: Arc<PolicyStore>,
}

/// What happened to one message.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub message_id: Uuid,
    pub presentation_id: Uuid,
    pub verdict: DecisionVerdict,
    /// The draft went out without review.
    pub sent: bool,
}

/// Runs incoming messages through draft → decide → present → dispatch.
pub struct MessageProcessor {
    deps: ProcessorDeps,
    timeouts: PipelineTimeouts,
    memory_limit: usize,
}

impl MessageProcessor {
    pub fn new(deps: ProcessorDeps, timeouts: PipelineTimeouts, memory_limit: usize) -> Self {
        Self {
            deps,
            timeouts,
            memory_limit,
        }
    }

    /// Process `message` on its own task. The result is logged, never returned.
    pub fn spawn(self: &Arc<Self>, message: IncomingMessage) -> JoinHandle<()> {
        let processor = Arc::clone(self);
        tokio::spawn(async move {
            let id = message.id;
            let contact = message.contact.clone();
            if let Err(e) = processor.handle_incoming(message).await {
                error!(id = %id, contact = %contact, error = %e, "Message dropped");
            }
        })
    }

    /// Process a single incoming message through the full pipeline.
    pub async fn handle_incoming(
        &self,
        message: IncomingMessage,
    ) -> Result<PipelineOutcome, PipelineError> {
        info!(
            id = %message.id,
            channel = %message.channel,
            contact = %message.contact,
            "Processing incoming message"
        );

        // Step 1: draft (aborts on failure)
        let draft = self.fetch_draft(&message).await?;

        // Step 2: confidence
        let confidence =
            estimate_confidence(&message.body, &draft.text, draft.sentiment.as_deref());

        // Step 3: memory summary (degrades to empty)
        let summary = self.fetch_summary(&message).await;

        // Step 4: decision
        let policy = self.deps.policy.snapshot();
        let verdict = decide(&policy, &message.contact, &message.body, &draft, confidence);
        info!(
            id = %message.id,
            confidence = verdict.confidence,
            auto_send = verdict.auto_send,
            reason = verdict.reason.label(),
            "Auto-send decision"
        );

        // Step 5: presentation, regardless of verdict
        let presentation_id = self
            .deps
            .presenter
            .present(Presentation {
                message_id: message.id,
                contact: message.contact.clone(),
                incoming: message.body.clone(),
                draft: draft.text.clone(),
                confidence: verdict.confidence,
                auto_send: verdict.auto_send,
                reason: verdict.reason,
                sentiment: draft.sentiment.clone(),
                goal: draft.goal.clone(),
                summary,
                channel: message.channel,
            })
            .await;

        // Step 6: dispatch
        let sent = if verdict.auto_send && message.channel.supports_direct_send() {
            self.dispatch(&message, &draft, &verdict, presentation_id).await
        } else {
            if verdict.auto_send {
                debug!(
                    id = %message.id,
                    channel = %message.channel,
                    "Channel cannot send directly, leaving for review"
                );
                self.deps
                    .presenter
                    .resolve_auto_send(presentation_id, false)
                    .await;
            }
            false
        };

        Ok(PipelineOutcome {
            message_id: message.id,
            presentation_id,
            verdict,
            sent,
        })
    }

    async fn fetch_draft(&self, message: &IncomingMessage) -> Result<DraftResult, PipelineError> {
        let request = DraftRequest {
            incoming: message.body.clone(),
            contact: message.contact.clone(),
        };
        let timeout = self.timeouts.draft;

        let result = match tokio::time::timeout(timeout, self.deps.drafts.draft(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout {
                service: "draft".into(),
                timeout,
            }),
        };

        result.map_err(|e| {
            error!(
                id = %message.id,
                contact = %message.contact,
                error = %e,
                "Draft service failed, aborting message"
            );
            PipelineError::Draft(e)
        })
    }

    async fn fetch_summary(&self, message: &IncomingMessage) -> String {
        let call = self.deps.memory.summary(&message.contact, self.memory_limit);
        match tokio::time::timeout(self.timeouts.memory, call).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                warn!(id = %message.id, error = %e, "Memory summary unavailable, continuing without it");
                String::new()
            }
            Err(_) => {
                warn!(id = %message.id, timeout = ?self.timeouts.memory, "Memory summary timed out, continuing without it");
                String::new()
            }
        }
    }

    /// Send the draft and record the outcome. Returns whether it was delivered.
    async fn dispatch(
        &self,
        message: &IncomingMessage,
        draft: &DraftResult,
        verdict: &DecisionVerdict,
        presentation_id: Uuid,
    ) -> bool {
        let transport = &self.deps.transport;
        let send = transport.send(&message.contact, &draft.text);
        let result = match tokio::time::timeout(self.timeouts.send, send).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout {
                service: transport.name().to_string(),
                timeout: self.timeouts.send,
            }),
        };

        match result {
            Ok(()) => {
                info!(id = %message.id, transport = transport.name(), "Draft auto-sent");
                self.deps
                    .presenter
                    .resolve_auto_send(presentation_id, true)
                    .await;
                self.deps
                    .feedback
                    .submit(FeedbackRecord::auto_sent(message, draft, verdict));
                true
            }
            Err(e) => {
                error!(
                    id = %message.id,
                    transport = transport.name(),
                    error = %e,
                    "Auto-send failed, handing back to review"
                );
                self.deps
                    .presenter
                    .resolve_auto_send(presentation_id, false)
                    .await;
                false
            }
        }
    }
}
