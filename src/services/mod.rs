//! HTTP clients and transports behind the pipeline's collaborator traits.

pub mod draft;
pub mod feedback;
pub mod memory;
pub mod transport;

pub use draft::HttpDraftService;
pub use feedback::HttpFeedbackSink;
pub use memory::HttpMemoryService;
pub use transport::{DryRunTransport, TwilioConfig, TwilioTransport};

use secrecy::{ExposeSecret, SecretString};

use crate::error::ServiceError;

/// Shared connection details for the reply backend.
#[derive(Clone)]
pub struct Backend {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl Backend {
    pub fn new(client: reqwest::Client, base_url: &str, token: Option<SecretString>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(self.url(path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(self.url(path)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

/// Map a non-2xx response to `ServiceError::Rejected`.
fn check_status(service: &str, response: &reqwest::Response) -> Result<(), ServiceError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ServiceError::Rejected {
            service: service.to_string(),
            status: status.as_u16(),
        })
    }
}
