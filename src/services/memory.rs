//! Memory summary client for `GET /memory/summary`.

use async_trait::async_trait;
use serde::Deserialize;

use super::{Backend, check_status};
use crate::error::ServiceError;
use crate::pipeline::types::MemoryService;

const SERVICE: &str = "memory";

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    summary: Option<String>,
}

pub struct HttpMemoryService {
    backend: Backend,
}

impl HttpMemoryService {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl MemoryService for HttpMemoryService {
    async fn summary(&self, contact: &str, limit: usize) -> Result<String, ServiceError> {
        let limit = limit.to_string();
        let response = self
            .backend
            .get("/memory/summary")
            .query(&[("contact", contact), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| ServiceError::request(SERVICE, e))?;
        check_status(SERVICE, &response)?;

        let body: SummaryResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse {
                service: SERVICE.into(),
                reason: e.to_string(),
            })?;
        Ok(body.summary.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_optional() {
        let body: SummaryResponse = serde_json::from_str(
            r#"{"contact": "Alex", "summary": "Plans trend", "goal_counts": {"ack": 2}}"#,
        )
        .unwrap();
        assert_eq!(body.summary.as_deref(), Some("Plans trend"));

        let body: SummaryResponse = serde_json::from_str(r#"{"contact": "Alex"}"#).unwrap();
        assert!(body.summary.is_none());
    }
}
