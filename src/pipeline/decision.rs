//! Auto-send decision rules.
//!
//! Evaluated in a fixed order; later rules can only veto, except the
//! always-auto list, which can re-enable auto-send. Nothing overrides a
//! de-escalation draft:
//! 1. enabled + confidence threshold + allowlist → eligible
//! 2. de-escalation goal → never auto-send
//! 3. negative sentiment (if blocking is on) → no
//! 4. never-auto list → no
//! 5. always-auto list → yes, unless rule 2 fired

use tracing::debug;

use crate::pipeline::types::{DecisionVerdict, DraftResult, VerdictReason};
use crate::policy::{ListKind, PolicySnapshot};

/// Decide whether `draft` may be sent to `contact` without review.
pub fn decide(
    policy: &PolicySnapshot,
    contact: &str,
    incoming: &str,
    draft: &DraftResult,
    confidence: f64,
) -> DecisionVerdict {
    let config = &policy.config;

    let (mut auto_send, mut reason) = if !config.auto_send_enabled {
        (false, VerdictReason::AutoSendDisabled)
    } else if confidence < config.confidence_threshold {
        (false, VerdictReason::BelowThreshold)
    } else if !config.allowlist_matches(contact, incoming) {
        (false, VerdictReason::NotAllowlisted)
    } else {
        (true, VerdictReason::Eligible)
    };

    let de_escalation = draft.is_de_escalation();
    if de_escalation {
        debug!(contact = %contact, goal = ?draft.goal, "De-escalation draft, auto-send blocked");
        auto_send = false;
        reason = VerdictReason::DeEscalation;
    }

    if config.block_negative_auto_send && draft.sentiment_is("negative") {
        debug!(contact = %contact, "Negative sentiment, auto-send blocked");
        auto_send = false;
        reason = VerdictReason::NegativeSentiment;
    }

    if policy.matches(contact, ListKind::NeverAuto) {
        debug!(contact = %contact, "Contact on never-auto list");
        auto_send = false;
        reason = VerdictReason::NeverAutoList;
    }

    if !de_escalation && policy.matches(contact, ListKind::AlwaysAuto) {
        debug!(contact = %contact, "Contact on always-auto list");
        auto_send = true;
        reason = VerdictReason::AlwaysAutoList;
    }

    DecisionVerdict {
        auto_send,
        confidence,
        reason,
    }
}
