//! Operations available on a [`crate::PubSubClient`].
//!
//! Each operation is an [`crate::Endpoint`] built through fluent setters and run with
//! `execute()`. Validation always checks keys first, then operation fields, in the order listed
//! on each operation.

use serde_json::Value;

use crate::client::config::Config;
use crate::errors::ValidationError;

pub mod delete_messages;
pub mod grant;
pub mod grant_token;
pub mod here_now;
pub mod publish;
pub mod revoke_token;
pub mod set_uuid_metadata;
pub mod signal;
pub mod subscribe;
pub mod time;

pub use delete_messages::{DeleteMessages, DeleteMessagesResult};
pub use grant::{Grant, GrantResult};
pub use grant_token::{GrantToken, GrantTokenResult};
pub use here_now::{ChannelOccupancy, HereNow, HereNowResult, Occupant};
pub use publish::{Publish, PublishResult};
pub use revoke_token::{RevokeToken, RevokeTokenResult};
pub use set_uuid_metadata::{SetUuidMetadata, UuidMetadata};
pub use signal::{Signal, SignalResult};
pub use subscribe::{Cursor, Envelope, MessageKind, Subscribe, SubscribeResult};
pub use time::{Time, TimeResult};

pub(crate) fn require_subscribe_key(config: &Config) -> Result<(), ValidationError> {
    require(&config.subscribe_key, "subscribe_key", "Subscribe Key")
}

pub(crate) fn require_publish_key(config: &Config) -> Result<(), ValidationError> {
    require(&config.publish_key, "publish_key", "Publish Key")
}

pub(crate) fn require_secret_key(config: &Config) -> Result<(), ValidationError> {
    require(&config.secret_key, "secret_key", "Secret Key")
}

pub(crate) fn require(
    value: &str,
    field: &'static str,
    label: &str,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::missing(field, label));
    }
    Ok(())
}

pub(crate) fn require_message(message: Option<&Value>) -> Result<(), ValidationError> {
    match message {
        None | Some(Value::Null) => Err(ValidationError::missing("message", "Message")),
        Some(_) => Ok(()),
    }
}

/// Timetokens are sent as decimal strings, sometimes as bare numbers.
pub(crate) fn timetoken(value: &Value) -> Option<u64> {
    match value {
        Value::String(text) => text.parse().ok(),
        Value::Number(number) => number.as_u64(),
        _ => None,
    }
}

/// Decode the publish-style `[1, "Sent", "<timetoken>"]` acknowledgement.
pub(crate) fn sent_timetoken(items: &[Value]) -> Option<u64> {
    match items {
        [flag, _, tt, ..] if flag.as_u64() == Some(1) => timetoken(tt),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn keys_are_checked_for_blankness() {
        let config = Config {
            subscribe_key: "  ".into(),
            ..Config::default()
        };
        let err = require_subscribe_key(&config).unwrap_err();
        assert_eq!(err.field, "subscribe_key");
        assert_eq!(err.message, "Missing Subscribe Key");
    }

    #[test]
    fn null_message_is_missing() {
        assert!(require_message(Some(&Value::Null)).is_err());
        assert!(require_message(None).is_err());
        assert!(require_message(Some(&json!("hi"))).is_ok());
    }

    #[test]
    fn timetokens_parse_from_strings_and_numbers() {
        assert_eq!(timetoken(&json!("17000000000000000")), Some(17_000_000_000_000_000));
        assert_eq!(timetoken(&json!(15)), Some(15));
        assert_eq!(timetoken(&json!("x")), None);

        let ack = [json!(1), json!("Sent"), json!("42")];
        assert_eq!(sent_timetoken(&ack), Some(42));
        let nack = [json!(0), json!("Invalid"), json!("42")];
        assert_eq!(sent_timetoken(&nack), None);
    }
}
