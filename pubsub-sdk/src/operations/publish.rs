//! Publish and fire.

use pubsub_common::encoding::encode_component;
use pubsub_common::token::ResourceType;
use serde_json::Value;

use super::{require, require_message, require_publish_key, require_subscribe_key, sent_timetoken};
use crate::endpoint::response::parse_json;
use crate::endpoint::{Endpoint, EndpointBase, HttpMethod, OperationType, impl_common_options};
use crate::errors::{Error, Result, ValidationError};
use crate::query::QueryParams;
use crate::{PubSubClient, StatusMetadata};

/// Publish a JSON message to a channel.
///
/// Validation order: subscribe key, publish key, channel, message.
///
/// By default the message travels in the URL path (`GET`); [`Publish::use_post`] moves it to
/// the body for large payloads.
#[derive(Debug, Clone)]
pub struct Publish {
    base: EndpointBase,
    operation: OperationType,
    channel: String,
    message: Option<Value>,
    meta: Option<Value>,
    store: Option<bool>,
    ttl: Option<u32>,
    replicate: bool,
    use_post: bool,
}

/// Response of [`Publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishResult {
    /// Timetoken the service assigned to the message.
    pub timetoken: u64,
}

impl Publish {
    pub(crate) fn new(client: PubSubClient) -> Self {
        Self {
            base: EndpointBase::new(client),
            operation: OperationType::Publish,
            channel: String::new(),
            message: None,
            meta: None,
            store: None,
            ttl: None,
            replicate: true,
            use_post: false,
        }
    }

    /// A publish that is neither stored nor replicated to other regions.
    pub(crate) fn fire(client: PubSubClient) -> Self {
        let mut publish = Self::new(client);
        publish.operation = OperationType::Fire;
        publish.store = Some(false);
        publish.replicate = false;
        publish
    }

    /// Target channel.
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// The message; any JSON value except `null`.
    pub fn message(mut self, message: impl Into<Value>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Metadata used by subscribe filter expressions.
    pub fn meta(mut self, meta: impl Into<Value>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    /// Store the message in history. Unset leaves the decision to the key's configuration.
    pub fn store(mut self, store: bool) -> Self {
        self.store = Some(store);
        self
    }

    /// Per-message history retention in hours.
    pub fn ttl(mut self, hours: u32) -> Self {
        self.ttl = Some(hours);
        self
    }

    /// Replicate the message to every region (default).
    pub fn replicate(mut self, replicate: bool) -> Self {
        self.replicate = replicate;
        self
    }

    /// Send the message in a `POST` body instead of the path.
    pub fn use_post(mut self, use_post: bool) -> Self {
        self.use_post = use_post;
        self
    }

    fn serialized_message(&self) -> std::result::Result<String, ValidationError> {
        let message = self.message.as_ref().unwrap_or(&Value::Null);
        serde_json::to_string(message)
            .map_err(|err| ValidationError::new("message", format!("Invalid Message: {err}")))
    }
}

impl_common_options!(Publish);

impl Endpoint for Publish {
    type Response = PublishResult;

    fn base(&self) -> &EndpointBase {
        &self.base
    }

    fn operation(&self) -> OperationType {
        self.operation
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
        let mut path = format!(
            "/publish/{}/{}/0/{}/0",
            encode_component(&config.publish_key),
            encode_component(&config.subscribe_key),
            encode_component(&self.channel),
        );
        if !self.use_post {
            path.push('/');
            path.push_str(&encode_component(&self.serialized_message()?));
        }
        Ok(path)
    }

    fn build_query(&self) -> std::result::Result<QueryParams, ValidationError> {
        let mut query = QueryParams::new();
        if let Some(store) = self.store {
            query.set("store", if store { "1" } else { "0" });
        }
        if let Some(ttl) = self.ttl {
            query.set("ttl", ttl.to_string());
        }
        if let Some(meta) = &self.meta {
            let meta = serde_json::to_string(meta)
                .map_err(|err| ValidationError::new("meta", format!("Invalid Meta: {err}")))?;
            query.set("meta", meta);
        }
        if !self.replicate {
            query.set("norep", "true");
        }
        Ok(query)
    }

    fn build_body(&self) -> std::result::Result<Vec<u8>, ValidationError> {
        if self.use_post {
            Ok(self.serialized_message()?.into_bytes())
        } else {
            Ok(Vec::new())
        }
    }

    fn http_method(&self) -> HttpMethod {
        if self.use_post {
            HttpMethod::Post
        } else {
            HttpMethod::Get
        }
    }

    fn auth_resources(&self) -> Vec<(ResourceType, &str)> {
        vec![(ResourceType::Channel, self.channel.as_str())]
    }

    fn parse_response(&self, body: &[u8], status: &StatusMetadata) -> Result<PublishResult> {
        let items: Vec<Value> = parse_json(self.operation, body, status)?;
        sent_timetoken(&items)
            .map(|timetoken| PublishResult { timetoken })
            .ok_or_else(|| Error::parsing(self.operation, body, "expected [1, \"Sent\", timetoken]"))
    }
}

impl PubSubClient {
    /// Publish a message.
    pub fn publish(&self) -> Publish {
        Publish::new(self.clone())
    }

    /// Publish a message that is neither stored in history nor replicated.
    pub fn fire(&self) -> Publish {
        Publish::fire(self.clone())
    }
}
