//! Contact policy: auto-send settings and per-contact override lists.

pub mod contacts;
pub mod routes;
pub mod store;

pub use contacts::{ContactList, ContactPolicyEntry, ListKind, extract_digits};
pub use store::{PolicyConfig, PolicySnapshot, PolicyStore};
