//! Shared types for the reply pipeline.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;

/// Goal prefix that marks a draft as a de-escalation reply.
pub const DE_ESCALATE_PREFIX: &str = "de-escalate";

// ── Inbound message ─────────────────────────────────────────────────

/// Where an incoming message arrived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    /// SMS: replies can be sent directly through the transport.
    #[default]
    Sms,
    /// Any other platform notification (Messenger, WhatsApp, ...).
    OtherNotification,
}

impl MessageChannel {
    /// Whether a draft can be dispatched on this channel without a human.
    pub fn supports_direct_send(self) -> bool {
        matches!(self, Self::Sms)
    }
}

impl std::fmt::Display for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sms => write!(f, "sms"),
            Self::OtherNotification => write!(f, "other_notification"),
        }
    }
}

/// A message received from a contact. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Generated ID used to correlate logs and review cards.
    pub id: Uuid,
    /// Contact identifier: phone number, display name, or both.
    pub contact: String,
    /// Message body.
    pub body: String,
    /// Source channel.
    pub channel: MessageChannel,
    /// When the message entered the pipeline.
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        contact: impl Into<String>,
        body: impl Into<String>,
        channel: MessageChannel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact: contact.into(),
            body: body.into(),
            channel,
            received_at: Utc::now(),
        }
    }
}

// ── Draft ───────────────────────────────────────────────────────────

/// Request sent to the draft service.
#[derive(Debug, Clone, Serialize)]
pub struct DraftRequest {
    pub incoming: String,
    pub contact: String,
}

/// Draft reply plus the metadata the draft service attached to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftResult {
    /// Candidate reply text.
    pub text: String,
    /// Sentiment of the incoming message ("positive", "neutral", "negative").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    /// Detected intent, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Conversational strategy chosen by the draft service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

impl DraftResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_sentiment(mut self, sentiment: impl Into<String>) -> Self {
        self.sentiment = Some(sentiment.into());
        self
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    /// True when the goal starts with the de-escalation prefix.
    pub fn is_de_escalation(&self) -> bool {
        self.goal
            .as_deref()
            .is_some_and(|g| g.starts_with(DE_ESCALATE_PREFIX))
    }

    /// Case-insensitive sentiment comparison.
    pub fn sentiment_is(&self, expected: &str) -> bool {
        self.sentiment
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(expected))
    }
}

// ── Verdict ─────────────────────────────────────────────────────────

/// The rule that last settled a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictReason {
    AutoSendDisabled,
    BelowThreshold,
    NotAllowlisted,
    Eligible,
    DeEscalation,
    NegativeSentiment,
    NeverAutoList,
    AlwaysAutoList,
}

impl VerdictReason {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AutoSendDisabled => "auto_send_disabled",
            Self::BelowThreshold => "below_threshold",
            Self::NotAllowlisted => "not_allowlisted",
            Self::Eligible => "eligible",
            Self::DeEscalation => "de_escalation",
            Self::NegativeSentiment => "negative_sentiment",
            Self::NeverAutoList => "never_auto_list",
            Self::AlwaysAutoList => "always_auto_list",
        }
    }
}

/// Auto-send decision for one message. Recomputed per message, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionVerdict {
    pub auto_send: bool,
    pub confidence: f64,
    pub reason: VerdictReason,
}

// ── Presentation ────────────────────────────────────────────────────

/// Everything a human needs to inspect or override a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presentation {
    pub message_id: Uuid,
    pub contact: String,
    pub incoming: String,
    pub draft: String,
    pub confidence: f64,
    pub auto_send: bool,
    pub reason: VerdictReason,
    pub sentiment: Option<String>,
    pub goal: Option<String>,
    /// Conversation memory summary; empty when the memory service was unavailable.
    pub summary: String,
    pub channel: MessageChannel,
}

// ── Feedback ────────────────────────────────────────────────────────

/// Outcome record for the learning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub incoming: String,
    pub contact: String,
    pub draft: String,
    /// Text that was actually sent (empty when rejected).
    #[serde(rename = "final")]
    pub final_text: String,
    pub accepted: bool,
    pub edited: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl FeedbackRecord {
    pub fn new(
        contact: impl Into<String>,
        incoming: impl Into<String>,
        draft: impl Into<String>,
        final_text: impl Into<String>,
        accepted: bool,
        edited: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            incoming: incoming.into(),
            contact: contact.into(),
            draft: draft.into(),
            final_text: final_text.into(),
            accepted,
            edited,
            tags: BTreeMap::new(),
        }
    }

    /// Record for a draft that was dispatched without review.
    pub fn auto_sent(msg: &IncomingMessage, draft: &DraftResult, verdict: &DecisionVerdict) -> Self {
        let mut record = Self::new(&msg.contact, &msg.body, &draft.text, &draft.text, true, false)
            .with_tag("source", "auto_send")
            .with_tag("confidence", format!("{:.2}", verdict.confidence))
            .with_tag("reason", verdict.reason.label());
        if let Some(ref goal) = draft.goal {
            record = record.with_tag("goal", goal);
        }
        if let Some(ref sentiment) = draft.sentiment {
            record = record.with_tag("sentiment", sentiment);
        }
        record
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

// ── Collaborator traits ─────────────────────────────────────────────

/// AI draft generation. The only collaborator on the critical path.
#[async_trait]
pub trait DraftService: Send + Sync {
    async fn draft(&self, request: &DraftRequest) -> Result<DraftResult, ServiceError>;
}

/// Conversation memory summaries. Best-effort.
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn summary(&self, contact: &str, limit: usize) -> Result<String, ServiceError>;
}

/// Outbound message delivery.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging (e.g. "twilio").
    fn name(&self) -> &str;

    async fn send(&self, contact: &str, text: &str) -> Result<(), ServiceError>;
}

/// Learning backend for outcome records.
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn submit(&self, record: &FeedbackRecord) -> Result<(), ServiceError>;
}

/// Human-facing surface that shows every decided message.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Show a decided message. Returns an ID for later resolution.
    async fn present(&self, presentation: Presentation) -> Uuid;

    /// Report the result of an automatic dispatch. Undelivered
    /// presentations go back to human review.
    async fn resolve_auto_send(&self, presentation_id: Uuid, delivered: bool);
}
