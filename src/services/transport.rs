//! Outbound SMS transports.
//!
//! `TwilioTransport` posts to the Twilio Messages API. `DryRunTransport`
//! only logs, and is used when no SMS credentials are configured.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::pipeline::types::Transport;

const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Twilio rejects bodies longer than this.
const MAX_SMS_CHARS: usize = 2000;

/// Twilio credentials and sender number.
#[derive(Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from_number: String,
    pub api_base: String,
}

impl TwilioConfig {
    /// Build config from `TWILIO_*` variables via `lookup`.
    /// Returns `None` unless the SID, token and sender number are all set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Some(Self {
            account_sid: non_empty("TWILIO_ACCOUNT_SID")?,
            auth_token: SecretString::from(non_empty("TWILIO_AUTH_TOKEN")?),
            from_number: non_empty("TWILIO_FROM_NUMBER")?,
            api_base: non_empty("TWILIO_API_BASE").unwrap_or_else(|| TWILIO_API_BASE.to_string()),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        )
    }
}

/// Pull an E.164 number (`+` then at least 7 digits) out of a contact such
/// as `"+61 412 345 678"` or `"Sam +61412345678"`, or `None`.
pub fn e164(contact: &str) -> Option<String> {
    let start = contact.find('+')?;
    let compact: String = contact[start..]
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    let digits = compact.strip_prefix('+')?;
    if digits.len() >= 7 && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(compact)
    } else {
        None
    }
}

fn validate_text(text: &str) -> Result<(), ServiceError> {
    let invalid = |reason: &str| ServiceError::InvalidRequest {
        service: "twilio".into(),
        reason: reason.into(),
    };
    if text.trim().is_empty() {
        return Err(invalid("message text is empty"));
    }
    if text.chars().count() > MAX_SMS_CHARS {
        return Err(invalid("message text exceeds 2000 characters"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: Option<String>,
    status: Option<String>,
}

pub struct TwilioTransport {
    config: TwilioConfig,
    client: reqwest::Client,
}

impl TwilioTransport {
    pub fn new(config: TwilioConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl Transport for TwilioTransport {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send(&self, contact: &str, text: &str) -> Result<(), ServiceError> {
        let to = e164(contact).ok_or_else(|| ServiceError::InvalidRequest {
            service: "twilio".into(),
            reason: format!("'{contact}' is not an E.164 phone number"),
        })?;
        validate_text(text)?;

        let response = self
            .client
            .post(self.config.messages_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&[
                ("From", self.config.from_number.as_str()),
                ("To", to.as_str()),
                ("Body", text),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::request("twilio", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Rejected {
                service: "twilio".into(),
                status: status.as_u16(),
            });
        }

        match response.json::<MessageResponse>().await {
            Ok(msg) => info!(to = %to, sid = ?msg.sid, status = ?msg.status, "SMS queued"),
            Err(e) => debug!(to = %to, error = %e, "SMS accepted, response body unreadable"),
        }
        Ok(())
    }
}

/// Logs instead of sending.
pub struct DryRunTransport;

#[async_trait]
impl Transport for DryRunTransport {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn send(&self, contact: &str, text: &str) -> Result<(), ServiceError> {
        info!(contact = %contact, chars = text.chars().count(), "Dry run, SMS not sent");
        Ok(())
    }
}
