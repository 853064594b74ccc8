//! Review queue: in-memory cards with broadcast to WebSocket clients.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{CardStatus, ReviewCard, WsMessage};
use crate::pipeline::types::{Presentation, Presenter};

const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Resolved cards kept for history once the queue grows past `PRUNE_ABOVE`.
const KEEP_RESOLVED: usize = 100;
const PRUNE_ABOVE: usize = 200;

const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// In-memory review queue backed by a broadcast channel for fan-out to WS clients.
pub struct ReviewQueue {
    cards: RwLock<VecDeque<ReviewCard>>,
    tx: broadcast::Sender<WsMessage>,
    expire_minutes: u32,
}

impl ReviewQueue {
    pub fn new(expire_minutes: u32) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            cards: RwLock::new(VecDeque::new()),
            tx,
            expire_minutes,
        })
    }

    /// Subscribe to real-time card events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.tx.subscribe()
    }

    /// Add a card and broadcast it.
    pub async fn push(&self, card: ReviewCard) {
        info!(
            card_id = %card.id,
            contact = %card.contact,
            channel = %card.channel,
            confidence = card.confidence,
            auto_send = card.auto_send,
            "Review card pushed"
        );

        let msg = WsMessage::NewCard { card: card.clone() };
        self.cards.write().await.push_back(card);

        // ok if nobody is listening
        let _ = self.tx.send(msg);
    }

    pub async fn get(&self, card_id: Uuid) -> Option<ReviewCard> {
        self.cards
            .read()
            .await
            .iter()
            .find(|c| c.id == card_id)
            .cloned()
    }

    /// Move an actionable card to `status`, optionally recording the final
    /// text. Returns the updated card.
    async fn act(
        &self,
        card_id: Uuid,
        status: CardStatus,
        final_text: Option<String>,
    ) -> Option<ReviewCard> {
        let mut cards = self.cards.write().await;
        let card = cards.iter_mut().find(|c| c.id == card_id)?;

        if !card.status.is_actionable() || card.is_expired() {
            warn!(card_id = %card_id, status = ?card.status, "Card is not awaiting review");
            return None;
        }

        card.status = status;
        if final_text.is_some() {
            card.final_text = final_text;
        }
        card.updated_at = Utc::now();
        let updated = card.clone();

        let _ = self.tx.send(WsMessage::CardUpdate {
            id: card_id,
            status,
        });
        Some(updated)
    }

    /// Approve the draft as is.
    pub async fn approve(&self, card_id: Uuid) -> Option<ReviewCard> {
        let card = self.act(card_id, CardStatus::Approved, None).await?;
        info!(card_id = %card_id, "Card approved");
        Some(card)
    }

    /// Replace the reply text and approve.
    pub async fn edit(&self, card_id: Uuid, new_text: String) -> Option<ReviewCard> {
        let card = self.act(card_id, CardStatus::Approved, Some(new_text)).await?;
        info!(card_id = %card_id, "Card edited and approved");
        Some(card)
    }

    /// Reject the draft.
    pub async fn dismiss(&self, card_id: Uuid) -> Option<ReviewCard> {
        let card = self.act(card_id, CardStatus::Dismissed, None).await?;
        info!(card_id = %card_id, "Card dismissed");
        Some(card)
    }

    /// Set a card's status unconditionally and broadcast the change.
    async fn set_status(&self, card_id: Uuid, status: CardStatus) -> bool {
        let mut cards = self.cards.write().await;
        let Some(card) = cards.iter_mut().find(|c| c.id == card_id) else {
            return false;
        };

        card.status = status;
        card.updated_at = Utc::now();
        let _ = self.tx.send(WsMessage::CardUpdate { id: card_id, status });
        true
    }

    /// Mark a card as delivered.
    pub async fn mark_sent(&self, card_id: Uuid) -> bool {
        self.set_status(card_id, CardStatus::Sent).await
    }

    /// Cards awaiting a human, oldest first.
    pub async fn pending(&self) -> Vec<ReviewCard> {
        self.cards
            .read()
            .await
            .iter()
            .filter(|c| c.status.is_actionable() && !c.is_expired())
            .cloned()
            .collect()
    }

    /// Expire stale pending cards and prune old resolved ones.
    /// Returns the number of cards expired.
    pub async fn expire_old(&self) -> usize {
        let mut cards = self.cards.write().await;
        let mut expired = 0;

        for card in cards.iter_mut() {
            if card.status == CardStatus::Pending && card.is_expired() {
                card.status = CardStatus::Expired;
                card.updated_at = Utc::now();
                expired += 1;
                debug!(card_id = %card.id, "Card expired");
                let _ = self.tx.send(WsMessage::CardExpired { id: card.id });
            }
        }

        if cards.len() > PRUNE_ABOVE {
            let resolved = cards
                .iter()
                .filter(|c| !c.status.is_actionable() && c.status != CardStatus::AutoSending)
                .count();
            let mut to_remove = resolved.saturating_sub(KEEP_RESOLVED);
            cards.retain(|c| {
                let resolved = !c.status.is_actionable() && c.status != CardStatus::AutoSending;
                if resolved && to_remove > 0 {
                    to_remove -= 1;
                    false
                } else {
                    true
                }
            });
        }

        if expired > 0 {
            info!(count = expired, "Expired review cards");
        }
        expired
    }

    /// Total cards held, any status.
    pub async fn len(&self) -> usize {
        self.cards.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cards.read().await.is_empty()
    }
}

#[async_trait]
impl Presenter for ReviewQueue {
    async fn present(&self, presentation: Presentation) -> Uuid {
        let card = ReviewCard::from_presentation(presentation, self.expire_minutes);
        let id = card.id;
        self.push(card).await;
        id
    }

    async fn resolve_auto_send(&self, presentation_id: Uuid, delivered: bool) {
        let status = if delivered {
            CardStatus::Sent
        } else {
            CardStatus::Pending
        };
        if !self.set_status(presentation_id, status).await {
            warn!(card_id = %presentation_id, "Auto-send resolved for unknown card");
        } else if !delivered {
            info!(card_id = %presentation_id, "Auto-send not delivered, card back in review");
        }
    }
}

/// Spawn a background task that periodically expires old cards.
pub fn spawn_expiry_task(queue: Arc<ReviewQueue>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EXPIRY_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            queue.expire_old().await;
        }
    })
}
