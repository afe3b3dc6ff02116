//! Stored message deletion.

use pubsub_common::encoding::encode_component;
use pubsub_common::token::ResourceType;
use serde_json::Value;

use super::{require, require_subscribe_key};
use crate::endpoint::response::parse_json;
use crate::endpoint::{Endpoint, EndpointBase, HttpMethod, OperationType, impl_common_options};
use crate::errors::{Result, ValidationError};
use crate::query::QueryParams;
use crate::{PubSubClient, StatusMetadata};

/// Delete stored messages of one channel, optionally within a timetoken range.
///
/// Validation order: subscribe key, channel.
#[derive(Debug, Clone)]
pub struct DeleteMessages {
    base: EndpointBase,
    channel: String,
    start: Option<u64>,
    end: Option<u64>,
}

/// Response of [`DeleteMessages`]. The service only acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteMessagesResult;

impl DeleteMessages {
    pub(crate) fn new(client: PubSubClient) -> Self {
        Self {
            base: EndpointBase::new(client),
            channel: String::new(),
            start: None,
            end: None,
        }
    }

    /// Channel whose history is deleted.
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Exclusive lower timetoken bound.
    pub fn start(mut self, timetoken: u64) -> Self {
        self.start = Some(timetoken);
        self
    }

    /// Inclusive upper timetoken bound.
    pub fn end(mut self, timetoken: u64) -> Self {
        self.end = Some(timetoken);
        self
    }
}

impl_common_options!(DeleteMessages);

impl Endpoint for DeleteMessages {
    type Response = DeleteMessagesResult;

    fn base(&self) -> &EndpointBase {
        &self.base
    }

    fn operation(&self) -> OperationType {
        OperationType::DeleteMessages
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        require_subscribe_key(self.base.client.config())?;
        require(&self.channel, "channel", "Channel")
    }

    fn build_path(&self) -> std::result::Result<String, ValidationError> {
        let config = self.base.client.config();
        Ok(format!(
            "/v3/history/sub-key/{}/channel/{}",
            encode_component(&config.subscribe_key),
            encode_component(&self.channel)
        ))
    }

    fn build_query(&self) -> std::result::Result<QueryParams, ValidationError> {
        let mut query = QueryParams::new();
        if let Some(start) = self.start {
            query.set("start", start.to_string());
        }
        if let Some(end) = self.end {
            query.set("end", end.to_string());
        }
        Ok(query)
    }

    fn http_method(&self) -> HttpMethod {
        HttpMethod::Delete
    }

    fn auth_resources(&self) -> Vec<(ResourceType, &str)> {
        vec![(ResourceType::Channel, self.channel.as_str())]
    }

    fn parse_response(&self, body: &[u8], status: &StatusMetadata) -> Result<DeleteMessagesResult> {
        let _: Value = parse_json(self.operation(), body, status)?;
        Ok(DeleteMessagesResult)
    }
}

impl PubSubClient {
    /// Delete stored messages.
    pub fn delete_messages(&self) -> DeleteMessages {
        DeleteMessages::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::HttpMethod;
    use crate::testing::{MockTransport, client_with};

    #[tokio::test]
    async fn missing_channel_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        let client = client_with(&transport);
        let err = client.delete_messages().execute().await.unwrap_err().error;
        assert_eq!(
            err.to_string(),
            "pubsub/validation: pubsub/delete-messages: Missing Channel"
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn deletes_range() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(200, r#"{"status":200,"error":false,"error_message":""}"#);
        let client = client_with(&transport);

        client
            .delete_messages()
            .channel("lobby")
            .start(10)
            .end(20)
            .execute()
            .await
            .unwrap();

        let request = transport.last_request();
        assert_eq!(request.method, HttpMethod::Delete);
        assert_eq!(request.url.path(), "/v3/history/sub-key/sub-key/channel/lobby");
        assert_eq!(request.query_param("start").as_deref(), Some("10"));
        assert_eq!(request.query_param("end").as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn error_flag_in_success_body_is_api_status() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            200,
            r#"{"status":403,"error":true,"error_message":"Use of the history Delete API requires both a secret key and a signature."}"#,
        );
        let client = client_with(&transport);

        let failed = client.delete_messages().channel("c").execute().await.unwrap_err();
        assert_eq!(
            failed.error.service_message(),
            Some("Use of the history Delete API requires both a secret key and a signature.")
        );
    }
}
