//! Feedback client for `POST /feedback`.

use async_trait::async_trait;

use super::{Backend, check_status};
use crate::error::ServiceError;
use crate::pipeline::types::{FeedbackRecord, FeedbackSink};

const SERVICE: &str = "feedback";

pub struct HttpFeedbackSink {
    backend: Backend,
}

impl HttpFeedbackSink {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl FeedbackSink for HttpFeedbackSink {
    async fn submit(&self, record: &FeedbackRecord) -> Result<(), ServiceError> {
        let response = self
            .backend
            .post("/feedback")
            .json(record)
            .send()
            .await
            .map_err(|e| ServiceError::request(SERVICE, e))?;
        check_status(SERVICE, &response)
    }
}
