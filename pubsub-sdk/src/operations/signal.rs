//! Signals.

use pubsub_common::encoding::encode_component;
use pubsub_common::token::ResourceType;
use serde_json::Value;

use super::{require, require_message, require_publish_key, require_subscribe_key, sent_timetoken};
use crate::endpoint::response::parse_json;
use crate::endpoint::{Endpoint, EndpointBase, OperationType, impl_common_options};
use crate::errors::{Error, Result, ValidationError};
use crate::{PubSubClient, StatusMetadata};

/// Send a small, unstored signal to a channel.
///
/// Validation order: subscribe key, publish key, channel, message.
#[derive(Debug, Clone)]
pub struct Signal {
    base: EndpointBase,
    channel: String,
    message: Option<Value>,
}

/// Response of [`Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalResult {
    /// Timetoken of the signal.
    pub timetoken: u64,
}

impl Signal {
    pub(crate) fn new(client: PubSubClient) -> Self {
        Self {
            base: EndpointBase::new(client),
            channel: String::new(),
            message: None,
        }
    }

    /// Target channel.
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Signal payload.
    pub fn message(mut self, message: impl Into<Value>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl_common_options!(Signal);

impl Endpoint for Signal {
    type Response = SignalResult;

    fn base(&self) -> &EndpointBase {
        &self.base
    }

    fn operation(&self) -> OperationType {
        OperationType::Signal
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let config = self.base.client.config();
        require_subscribe_key(config)?;
        require_publish_key(config)?;
        require(&self.channel, "channel", "Channel")?;
        require_message(self.message.as_ref())
    }

    fn build_path(&self) -> std::result::Result<String, ValidationError> {
        let config = self.base.client.config();
        let message = serde_json::to_string(self.message.as_ref().unwrap_or(&Value::Null))
            .map_err(|err| ValidationError::new("message", format!("Invalid Message: {err}")))?;
        Ok(format!(
            "/signal/{}/{}/0/{}/0/{}",
            encode_component(&config.publish_key),
            encode_component(&config.subscribe_key),
            encode_component(&self.channel),
            encode_component(&message),
        ))
    }

    fn auth_resources(&self) -> Vec<(ResourceType, &str)> {
        vec![(ResourceType::Channel, self.channel.as_str())]
    }

    fn parse_response(&self, body: &[u8], status: &StatusMetadata) -> Result<SignalResult> {
        let items: Vec<Value> = parse_json(self.operation(), body, status)?;
        sent_timetoken(&items)
            .map(|timetoken| SignalResult { timetoken })
            .ok_or_else(|| Error::parsing(self.operation(), body, "expected [1, \"Sent\", timetoken]"))
    }
}

impl PubSubClient {
    /// Send a signal.
    pub fn signal(&self) -> Signal {
        Signal::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pubsub_common::token::ResourceType;

    use crate::testing::{MockTransport, client_with};

    #[tokio::test]
    async fn sends_signal_with_resource_token() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(200, r#"[1,"Sent","15"]"#);
        let client = client_with(&transport);
        client.set_token("client-token");
        client
            .token_manager()
            .store_token_for(ResourceType::Channel, "typing", "typing-token");

        let sent = client
            .signal()
            .channel("typing")
            .message("on")
            .execute()
            .await
            .unwrap();
        assert_eq!(sent.response.timetoken, 15);

        let request = transport.last_request();
        assert_eq!(
            request.url.path(),
            "/signal/pub-key/sub-key/0/typing/0/%22on%22"
        );
        assert_eq!(request.query_param("auth").as_deref(), Some("typing-token"));
    }

    #[tokio::test]
    async fn explicit_auth_wins() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(200, r#"[1,"Sent","15"]"#);
        let client = client_with(&transport);
        client.set_token("client-token");

        client
            .signal()
            .channel("typing")
            .message("on")
            .auth("explicit")
            .execute()
            .await
            .unwrap();
        assert_eq!(
            transport.last_request().query_param("auth").as_deref(),
            Some("explicit")
        );
    }
}
