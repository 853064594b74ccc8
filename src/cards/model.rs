//! Review card data model: decided messages, statuses, and WebSocket message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::types::{MessageChannel, Presentation, VerdictReason};

/// Status of a review card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    /// Waiting for a human.
    Pending,
    /// Picked for auto-send; delivery not confirmed yet.
    AutoSending,
    /// Approved by a human, reply not (yet) delivered.
    Approved,
    /// Reply was delivered, automatically or after approval.
    Sent,
    /// Human rejected the draft.
    Dismissed,
    /// Expired without action.
    Expired,
}

impl CardStatus {
    /// Whether a human can still act on the card.
    pub fn is_actionable(self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// One decided message as shown to the reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCard {
    pub id: Uuid,
    /// ID of the incoming message this card was built from.
    pub message_id: Uuid,
    pub contact: String,
    pub incoming: String,
    /// Draft as produced by the draft service.
    pub draft: String,
    pub confidence: f64,
    /// Verdict at decision time.
    pub auto_send: bool,
    pub reason: VerdictReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    /// Conversation memory summary, possibly empty.
    #[serde(default)]
    pub summary: String,
    pub channel: MessageChannel,
    pub status: CardStatus,
    /// Text that was (or will be) sent after a human action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReviewCard {
    /// Build a card from a presentation. Auto-send verdicts start in
    /// `AutoSending`; everything else waits for a human.
    pub fn from_presentation(p: Presentation, expire_minutes: u32) -> Self {
        let now = Utc::now();
        let status = if p.auto_send {
            CardStatus::AutoSending
        } else {
            CardStatus::Pending
        };
        Self {
            id: Uuid::new_v4(),
            message_id: p.message_id,
            contact: p.contact,
            incoming: p.incoming,
            draft: p.draft,
            confidence: p.confidence.clamp(0.0, 1.0),
            auto_send: p.auto_send,
            reason: p.reason,
            sentiment: p.sentiment,
            goal: p.goal,
            summary: p.summary,
            channel: p.channel,
            status,
            final_text: None,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::minutes(i64::from(expire_minutes)),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Text a human action would send: the edit if any, else the draft.
    pub fn reply_text(&self) -> &str {
        self.final_text.as_deref().unwrap_or(&self.draft)
    }

    /// Whether the reply differs from the original draft.
    pub fn is_edited(&self) -> bool {
        self.final_text.as_deref().is_some_and(|t| t != self.draft)
    }
}

/// Actions a reviewer can take on a card.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CardAction {
    /// Send the draft as is.
    Approve { card_id: Uuid },
    /// Reject the draft; nothing is sent.
    Dismiss { card_id: Uuid },
    /// Send `new_text` instead of the draft.
    Edit { card_id: Uuid, new_text: String },
}

/// Messages pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// A new card was presented.
    NewCard { card: ReviewCard },
    /// A card's status changed.
    CardUpdate { id: Uuid, status: CardStatus },
    /// A card expired.
    CardExpired { id: Uuid },
    /// Actionable cards, sent on connect and after a lag.
    CardsSync { cards: Vec<ReviewCard> },
}
