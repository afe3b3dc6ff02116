//! Client configuration.

use std::time::Duration;

use pubsub_common::constants::DEFAULT_ORIGIN;
use serde::Deserialize;

/// Default budget for a one-shot request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default budget for one long-poll subscribe exchange. Longer than the service's hold time.
pub const DEFAULT_SUBSCRIBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(310);
/// Default budget for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable client configuration.
///
/// Built through [`crate::PubSubClientBuilder`], or deserialized from any serde format and handed
/// to [`crate::PubSubClientBuilder::config`]. Durations are given in whole seconds.
///
/// Empty key strings mean "not configured"; operations that need a key fail validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Key used by publishing operations.
    pub publish_key: String,
    /// Key every operation needs.
    pub subscribe_key: String,
    /// Secret key. When set, every request is signed.
    pub secret_key: String,
    /// Identity of this client (`uuid` on the wire). Required.
    pub user_id: String,
    /// Legacy access-manager auth key, used when no token applies.
    pub auth_key: String,
    /// Service host name, without scheme.
    pub origin: String,
    /// Use `https`.
    pub secure: bool,
    /// Default budget for one-shot requests.
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    /// Budget for one long-poll subscribe exchange.
    #[serde(with = "secs")]
    pub subscribe_request_timeout: Duration,
    /// Budget for establishing a connection.
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    /// Report per-operation latencies back to the service.
    pub telemetry: bool,
    /// Appended to the default user agent.
    pub user_agent_extra: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            publish_key: String::new(),
            subscribe_key: String::new(),
            secret_key: String::new(),
            user_id: String::new(),
            auth_key: String::new(),
            origin: DEFAULT_ORIGIN.to_string(),
            secure: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            subscribe_request_timeout: DEFAULT_SUBSCRIBE_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            telemetry: true,
            user_agent_extra: None,
        }
    }
}

impl Config {
    /// True when a secret key is configured.
    pub fn has_secret_key(&self) -> bool {
        !self.secret_key.is_empty()
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
