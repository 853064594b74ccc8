//! Reply Autopilot: decides which AI-drafted replies go out without review.

pub mod cards;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod services;
pub mod server;
