//! Review cards: every decided message, shown to a human over WebSocket and REST.

pub mod model;
pub mod queue;
pub mod ws;

pub use model::{CardAction, CardStatus, ReviewCard, WsMessage};
pub use queue::{ReviewQueue, spawn_expiry_task};
pub use ws::{ReviewState, review_routes};
