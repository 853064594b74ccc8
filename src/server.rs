//! HTTP surface: ingest, policy and review routes behind one router.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cards::{ReviewState, review_routes};
use crate::pipeline::ingest::{IngestQueue, ingest_routes};
use crate::policy::PolicyStore;
use crate::policy::routes::policy_routes;

pub fn router(ingest: IngestQueue, policy: Arc<PolicyStore>, review: ReviewState) -> Router {
    review_routes(review)
        .merge(ingest_routes(ingest))
        .merge(policy_routes(policy))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
