//! REST endpoints for the contact policy.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::contacts::ListKind;
use super::store::{PolicyConfig, PolicyStore};
use crate::error::PolicyError;

type ApiResponse = (StatusCode, Json<serde_json::Value>);

pub fn policy_routes(store: Arc<PolicyStore>) -> Router {
    Router::new()
        .route("/api/policy", get(get_policy))
        .route("/api/policy/settings", put(update_settings))
        .route("/api/policy/lists/{kind}", get(get_list).post(add_contact))
        .route("/api/policy/lists/{kind}/remove", post(remove_contact))
        .with_state(store)
}

fn bad_request(message: impl Into<String>) -> ApiResponse {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message.into() })))
}

fn policy_error(e: PolicyError) -> ApiResponse {
    match e {
        PolicyError::InvalidValue { .. } => bad_request(e.to_string()),
        e => {
            error!(error = %e, "Policy update failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to save policy" })),
            )
        }
    }
}

fn policy_body(store: &PolicyStore) -> serde_json::Value {
    let snapshot = store.snapshot();
    json!({
        "config": snapshot.config,
        "never_auto": snapshot.never_auto.display(),
        "always_auto": snapshot.always_auto.display(),
    })
}

async fn get_policy(State(store): State<Arc<PolicyStore>>) -> impl IntoResponse {
    Json(policy_body(&store))
}

#[derive(Debug, Default, Deserialize)]
struct SettingsUpdate {
    auto_send_enabled: Option<bool>,
    confidence_threshold: Option<f64>,
    block_negative_auto_send: Option<bool>,
    allowlist: Option<Vec<String>>,
}

impl SettingsUpdate {
    /// Apply every present field as one policy change.
    fn apply(self, store: &PolicyStore) -> Result<PolicyConfig, PolicyError> {
        let config = store.update_config(|c| {
            if let Some(enabled) = self.auto_send_enabled {
                c.auto_send_enabled = enabled;
            }
            if let Some(threshold) = self.confidence_threshold {
                c.confidence_threshold = threshold;
            }
            if let Some(block) = self.block_negative_auto_send {
                c.block_negative_auto_send = block;
            }
            if let Some(allowlist) = self.allowlist {
                c.allowlist = allowlist;
            }
        })?;
        info!(
            auto_send_enabled = config.auto_send_enabled,
            threshold = config.confidence_threshold,
            block_negative = config.block_negative_auto_send,
            allowlist = config.allowlist.len(),
            "Policy settings updated"
        );
        Ok(config)
    }
}

async fn update_settings(
    State(store): State<Arc<PolicyStore>>,
    Json(update): Json<SettingsUpdate>,
) -> impl IntoResponse {
    match update.apply(&store) {
        Ok(_) => (StatusCode::OK, Json(policy_body(&store))),
        Err(e) => policy_error(e),
    }
}

fn parse_kind(kind: &str) -> Result<ListKind, ApiResponse> {
    kind.parse().map_err(bad_request)
}

async fn get_list(State(store): State<Arc<PolicyStore>>, Path(kind): Path<String>) -> impl IntoResponse {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let snapshot = store.snapshot();
    let list = snapshot.list(kind);
    (
        StatusCode::OK,
        Json(json!({
            "kind": kind,
            "display": list.display(),
            "entries": list.entries(),
        })),
    )
}

#[derive(Deserialize)]
struct ContactRequest {
    contact: String,
}

async fn add_contact(
    State(store): State<Arc<PolicyStore>>,
    Path(kind): Path<String>,
    Json(req): Json<ContactRequest>,
) -> impl IntoResponse {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    if req.contact.trim().is_empty() {
        return bad_request("contact is empty");
    }
    match store.add_to_list(&req.contact, kind) {
        Ok(added) => (
            StatusCode::OK,
            Json(json!({ "added": added, "display": store.display(kind) })),
        ),
        Err(e) => policy_error(e),
    }
}

async fn remove_contact(
    State(store): State<Arc<PolicyStore>>,
    Path(kind): Path<String>,
    Json(req): Json<ContactRequest>,
) -> impl IntoResponse {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    match store.remove_from_list(&req.contact, kind) {
        Ok(removed) => (
            StatusCode::OK,
            Json(json!({ "removed": removed, "display": store.display(kind) })),
        ),
        Err(e) => policy_error(e),
    }
}
