//! Draft client for the reply backend's `POST /reply`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{Backend, check_status};
use crate::error::ServiceError;
use crate::pipeline::types::{DraftRequest, DraftResult, DraftService};

const SERVICE: &str = "draft";

#[derive(Debug, Default, Deserialize)]
struct Analysis {
    sentiment: Option<String>,
    intent: Option<String>,
}

/// Wire shape of a `/reply` response. Older backends answer with `reply`
/// instead of `draft`.
#[derive(Debug, Deserialize)]
struct ReplyResponse {
    draft: Option<String>,
    reply: Option<String>,
    analysis: Option<Analysis>,
    goal: Option<String>,
}

impl From<ReplyResponse> for DraftResult {
    fn from(resp: ReplyResponse) -> Self {
        let analysis = resp.analysis.unwrap_or_default();
        Self {
            text: resp.draft.or(resp.reply).unwrap_or_default().trim().to_string(),
            sentiment: analysis.sentiment,
            intent: analysis.intent,
            goal: resp.goal,
        }
    }
}

pub struct HttpDraftService {
    backend: Backend,
}

impl HttpDraftService {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DraftService for HttpDraftService {
    async fn draft(&self, request: &DraftRequest) -> Result<DraftResult, ServiceError> {
        let response = self
            .backend
            .post("/reply")
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::request(SERVICE, e))?;
        check_status(SERVICE, &response)?;

        let body: ReplyResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse {
                service: SERVICE.into(),
                reason: e.to_string(),
            })?;
        let draft = DraftResult::from(body);
        debug!(contact = %request.contact, goal = ?draft.goal, "Draft received");
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> DraftResult {
        serde_json::from_str::<ReplyResponse>(json).unwrap().into()
    }

    #[test]
    fn full_response() {
        let draft = parse(
            r#"{"draft": "I hear you. Let's talk later.",
                "analysis": {"sentiment": "negative", "intent": "vent", "toxicity": 0.7, "urgent": false},
                "goal": "de-escalate+boundary",
                "variant": "A"}"#,
        );
        assert_eq!(draft.text, "I hear you. Let's talk later.");
        assert_eq!(draft.sentiment.as_deref(), Some("negative"));
        assert_eq!(draft.intent.as_deref(), Some("vent"));
        assert!(draft.is_de_escalation());
    }

    #[test]
    fn reply_field_is_a_fallback() {
        assert_eq!(parse(r#"{"reply": " ok "}"#).text, "ok");
        assert_eq!(parse(r#"{"draft": "a", "reply": "b"}"#).text, "a");
    }

    #[test]
    fn missing_fields_default() {
        let draft = parse(r#"{"analysis": null}"#);
        assert_eq!(draft, DraftResult::default());
    }
}
