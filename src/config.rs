//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use crate::error::ConfigError;
use crate::pipeline::processor::PipelineTimeouts;
use crate::services::TwilioConfig;

/// Runtime configuration, read once at startup.
#[derive(Clone)]
pub struct AutopilotConfig {
    /// HTTP / WebSocket listen port.
    pub port: u16,
    /// Policy store file.
    pub policy_path: PathBuf,
    /// Base URL of the draft service.
    pub draft_url: String,
    /// Base URL of the memory service (defaults to `draft_url`).
    pub memory_url: String,
    /// Base URL of the feedback backend (defaults to `draft_url`).
    pub feedback_url: String,
    /// Bearer token for the backend.
    pub api_token: Option<SecretString>,
    pub timeouts: PipelineTimeouts,
    pub feedback_timeout: Duration,
    /// Memory items requested per summary.
    pub memory_limit: usize,
    /// Capacity of the ingest channel.
    pub queue_capacity: usize,
    /// Minutes before an unreviewed card expires.
    pub card_expire_minutes: u32,
    /// SMS credentials; `None` selects the dry-run transport.
    pub twilio: Option<TwilioConfig>,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        let draft_url = "http://127.0.0.1:5000".to_string();
        Self {
            port: 8080,
            policy_path: PathBuf::from("./data/policy.json"),
            memory_url: draft_url.clone(),
            feedback_url: draft_url.clone(),
            draft_url,
            api_token: None,
            timeouts: PipelineTimeouts::default(),
            feedback_timeout: Duration::from_secs(10),
            memory_limit: 10,
            queue_capacity: 256,
            card_expire_minutes: 60,
            twilio: None,
        }
    }
}

/// Parse `key` if set; warn and use `default` if the value is malformed.
fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }),
        None => default,
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    Duration::from_secs(parsed(lookup, key, default.as_secs()))
}

impl AutopilotConfig {
    /// Build config from `AUTOPILOT_*` and `TWILIO_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let draft_url = text("AUTOPILOT_DRAFT_URL").unwrap_or(defaults.draft_url);
        let config = Self {
            port: parsed(&lookup, "AUTOPILOT_PORT", defaults.port),
            policy_path: text("AUTOPILOT_POLICY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.policy_path),
            memory_url: text("AUTOPILOT_MEMORY_URL").unwrap_or_else(|| draft_url.clone()),
            feedback_url: text("AUTOPILOT_FEEDBACK_URL").unwrap_or_else(|| draft_url.clone()),
            draft_url,
            api_token: text("AUTOPILOT_API_TOKEN").map(SecretString::from),
            timeouts: PipelineTimeouts {
                draft: secs(&lookup, "AUTOPILOT_DRAFT_TIMEOUT_SECS", defaults.timeouts.draft),
                memory: secs(&lookup, "AUTOPILOT_MEMORY_TIMEOUT_SECS", defaults.timeouts.memory),
                send: secs(&lookup, "AUTOPILOT_SEND_TIMEOUT_SECS", defaults.timeouts.send),
            },
            feedback_timeout: secs(&lookup, "AUTOPILOT_FEEDBACK_TIMEOUT_SECS", defaults.feedback_timeout),
            memory_limit: parsed(&lookup, "AUTOPILOT_MEMORY_LIMIT", defaults.memory_limit),
            queue_capacity: parsed(&lookup, "AUTOPILOT_QUEUE_CAPACITY", defaults.queue_capacity),
            card_expire_minutes: parsed(&lookup, "AUTOPILOT_CARD_EXPIRE_MIN", defaults.card_expire_minutes),
            twilio: TwilioConfig::from_lookup(&lookup),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.queue_capacity == 0 {
            return Err(invalid("AUTOPILOT_QUEUE_CAPACITY", "must be at least 1"));
        }
        for (key, url) in [
            ("AUTOPILOT_DRAFT_URL", &self.draft_url),
            ("AUTOPILOT_MEMORY_URL", &self.memory_url),
            ("AUTOPILOT_FEEDBACK_URL", &self.feedback_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(key, "must be an http(s) URL"));
            }
        }
        for (key, timeout) in [
            ("AUTOPILOT_DRAFT_TIMEOUT_SECS", self.timeouts.draft),
            ("AUTOPILOT_MEMORY_TIMEOUT_SECS", self.timeouts.memory),
            ("AUTOPILOT_SEND_TIMEOUT_SECS", self.timeouts.send),
            ("AUTOPILOT_FEEDBACK_TIMEOUT_SECS", self.feedback_timeout),
        ] {
            if timeout.is_zero() {
                return Err(invalid(key, "must be greater than zero"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    fn config(vars: &[(&str, &str)]) -> Result<AutopilotConfig, ConfigError> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        AutopilotConfig::from_lookup(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_when_unset() {
        let c = config(&[]).unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.policy_path, PathBuf::from("./data/policy.json"));
        assert_eq!(c.memory_url, "http://127.0.0.1:5000");
        assert_eq!(c.timeouts.draft, Duration::from_secs(30));
        assert_eq!(c.timeouts.memory, Duration::from_secs(5));
        assert_eq!(c.feedback_timeout, Duration::from_secs(10));
        assert_eq!(c.queue_capacity, 256);
        assert_eq!(c.card_expire_minutes, 60);
        assert!(c.api_token.is_none());
        assert!(c.twilio.is_none());
    }

    #[test]
    fn service_urls_follow_draft_url() {
        let c = config(&[
            ("AUTOPILOT_DRAFT_URL", "http://backend:5000"),
            ("AUTOPILOT_FEEDBACK_URL", "http://learner:9000"),
        ])
        .unwrap();
        assert_eq!(c.memory_url, "http://backend:5000");
        assert_eq!(c.feedback_url, "http://learner:9000");
    }

    #[test]
    fn malformed_numbers_fall_back() {
        let c = config(&[
            ("AUTOPILOT_PORT", "eighty"),
            ("AUTOPILOT_MEMORY_LIMIT", "25"),
            ("AUTOPILOT_SEND_TIMEOUT_SECS", "-3"),
        ])
        .unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.memory_limit, 25);
        assert_eq!(c.timeouts.send, Duration::from_secs(15));
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            config(&[("AUTOPILOT_QUEUE_CAPACITY", "0")]),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "AUTOPILOT_QUEUE_CAPACITY"
        ));
        assert!(config(&[("AUTOPILOT_DRAFT_TIMEOUT_SECS", "0")]).is_err());
        assert!(config(&[("AUTOPILOT_DRAFT_URL", "backend:5000")]).is_err());
    }

    #[test]
    fn secrets_and_twilio() {
        let c = config(&[
            ("AUTOPILOT_API_TOKEN", "tok"),
            ("TWILIO_ACCOUNT_SID", "AC1"),
            ("TWILIO_AUTH_TOKEN", "auth"),
            ("TWILIO_FROM_NUMBER", "+15550001111"),
        ])
        .unwrap();
        assert_eq!(c.api_token.unwrap().expose_secret(), "tok");
        assert_eq!(c.twilio.unwrap().from_number, "+15550001111");
    }
}
