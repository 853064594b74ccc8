//! Confidence estimation for draft replies.
//!
//! Cheap text-feature scoring, no I/O. The adjustments are independent of
//! each other; only the trigger-word check replaces the base score.

use std::ops::RangeInclusive;

const BASE_CONFIDENCE: f64 = 0.85;

/// Score used instead of the base when the incoming message touches a
/// relationship-conflict topic.
const TRIGGERED_CONFIDENCE: f64 = 0.65;

const TRIGGER_WORDS: &[&str] = &["cheat", "seeing", "narcissist", "liar"];

/// Incoming messages shorter than this (in chars) carry little context.
const SHORT_INCOMING_CHARS: usize = 12;

/// Draft lengths (in chars) that look like a normal SMS reply.
const REASONABLE_DRAFT_CHARS: RangeInclusive<usize> = 2..=200;

const SHORT_INCOMING_PENALTY: f64 = 0.05;
const REASONABLE_DRAFT_BONUS: f64 = 0.05;
const NEGATIVE_SENTIMENT_PENALTY: f64 = 0.05;
const POSITIVE_SENTIMENT_BONUS: f64 = 0.02;

/// Scores are rounded to millionths, so `0.85 - 0.05` is exactly `0.80`.
const SCORE_RESOLUTION: f64 = 1e6;

/// Estimate how safe it is to send `draft` in reply to `incoming`.
///
/// Always returns a value in `[0.0, 1.0]`.
pub fn estimate_confidence(incoming: &str, draft: &str, sentiment: Option<&str>) -> f64 {
    let lowered = incoming.to_lowercase();
    let mut confidence = if TRIGGER_WORDS.iter().any(|w| lowered.contains(w)) {
        TRIGGERED_CONFIDENCE
    } else {
        BASE_CONFIDENCE
    };

    if incoming.chars().count() < SHORT_INCOMING_CHARS {
        confidence -= SHORT_INCOMING_PENALTY;
    }

    if REASONABLE_DRAFT_CHARS.contains(&draft.chars().count()) {
        confidence += REASONABLE_DRAFT_BONUS;
    }

    match sentiment {
        Some(s) if s.eq_ignore_ascii_case("negative") => confidence -= NEGATIVE_SENTIMENT_PENALTY,
        Some(s) if s.eq_ignore_ascii_case("positive") => confidence += POSITIVE_SENTIMENT_BONUS,
        _ => {}
    }

    ((confidence * SCORE_RESOLUTION).round() / SCORE_RESOLUTION).clamp(0.0, 1.0)
}
