//! One long-poll subscribe exchange.
//!
//! The service holds the request open until messages arrive or its hold time passes, then
//! answers with the messages and a new [`Cursor`]. Looping over this is the job of
//! [`crate::subscribe::Subscriber`].

use std::time::Duration;

use pubsub_common::encoding::{encode_component, encode_list};
use pubsub_common::token::ResourceType;
use serde::Deserialize;
use serde_json::Value;

use super::{require_subscribe_key, timetoken};
use crate::endpoint::response::parse_json;
use crate::endpoint::{Endpoint, EndpointBase, OperationType, impl_common_options};
use crate::errors::{Error, Result, ValidationError};
use crate::query::QueryParams;
use crate::{PubSubClient, StatusMetadata};

const PRESENCE_SUFFIX: &str = "-pnpres";

/// Position in the message stream. The zero cursor asks the service for "now".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cursor {
    /// Timetoken of the last delivered position.
    pub timetoken: u64,
    /// Region the timetoken belongs to.
    pub region: u32,
}

/// What kind of event an [`Envelope`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A published message.
    Message,
    /// A signal.
    Signal,
    /// An objects (metadata) event.
    Object,
    /// A message action.
    MessageAction,
    /// A shared file.
    File,
    /// A presence event (join, leave, timeout, state change).
    Presence,
}

impl MessageKind {
    fn from_wire(kind: Option<u64>, channel: &str) -> Self {
        if channel.ends_with(PRESENCE_SUFFIX) {
            return MessageKind::Presence;
        }
        match kind {
            Some(1) => MessageKind::Signal,
            Some(2) => MessageKind::Object,
            Some(3) => MessageKind::MessageAction,
            Some(4) => MessageKind::File,
            _ => MessageKind::Message,
        }
    }
}

/// One delivered event.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Event kind.
    pub kind: MessageKind,
    /// Channel the event was published to.
    pub channel: String,
    /// Subscription (channel group or wildcard) that matched, when it differs from `channel`.
    pub subscription: Option<String>,
    /// Payload.
    pub payload: Value,
    /// User id of the publisher, when known.
    pub publisher: Option<String>,
    /// Publish timetoken.
    pub timetoken: u64,
    /// Publisher metadata.
    pub meta: Option<Value>,
}

/// Response of [`Subscribe`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeResult {
    /// Cursor to resume from.
    pub cursor: Cursor,
    /// Events in delivery order.
    pub messages: Vec<Envelope>,
}

#[derive(Deserialize)]
struct WireCursor {
    t: Value,
    #[serde(default)]
    r: u32,
}

#[derive(Deserialize)]
struct WireEnvelope {
    c: String,
    #[serde(default)]
    b: Option<String>,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    i: Option<String>,
    #[serde(default)]
    p: Option<WireCursor>,
    #[serde(default)]
    e: Option<u64>,
    #[serde(default)]
    u: Option<Value>,
}

#[derive(Deserialize)]
struct Wire {
    t: WireCursor,
    #[serde(default)]
    m: Vec<WireEnvelope>,
}

/// A single long-poll subscribe request.
///
/// Validation order: subscribe key, channels or channel groups.
#[derive(Debug, Clone)]
pub struct Subscribe {
    base: EndpointBase,
    channels: Vec<String>,
    channel_groups: Vec<String>,
    cursor: Cursor,
    filter_expression: Option<String>,
    heartbeat: Option<u32>,
}

impl Subscribe {
    pub(crate) fn new(client: PubSubClient) -> Self {
        Self {
            base: EndpointBase::new(client),
            channels: Vec::new(),
            channel_groups: Vec::new(),
            cursor: Cursor::default(),
            filter_expression: None,
            heartbeat: None,
        }
    }

    /// Channels to listen on.
    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Channel groups to listen on.
    pub fn channel_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channel_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Resume from `cursor`.
    pub fn cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Server-side filter on message metadata.
    pub fn filter_expression(mut self, expression: impl Into<String>) -> Self {
        self.filter_expression = Some(expression.into());
        self
    }

    /// Presence timeout in seconds.
    pub fn heartbeat(mut self, seconds: u32) -> Self {
        self.heartbeat = Some(seconds);
        self
    }
}

impl_common_options!(Subscribe);

impl Endpoint for Subscribe {
    type Response = SubscribeResult;

    fn base(&self) -> &EndpointBase {
        &self.base
    }

    fn operation(&self) -> OperationType {
        OperationType::Subscribe
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        require_subscribe_key(self.base.client.config())?;
        if self.channels.is_empty() && self.channel_groups.is_empty() {
            return Err(ValidationError::missing("channels", "Channel"));
        }
        Ok(())
    }

    fn build_path(&self) -> std::result::Result<String, ValidationError> {
        let config = self.base.client.config();
        let channels = if self.channels.is_empty() {
            ",".to_string()
        } else {
            encode_list(&self.channels)
        };
        Ok(format!(
            "/v2/subscribe/{}/{}/0",
            encode_component(&config.subscribe_key),
            channels
        ))
    }

    fn build_query(&self) -> std::result::Result<QueryParams, ValidationError> {
        let mut query = QueryParams::new();
        query.set("tt", self.cursor.timetoken.to_string());
        if self.cursor.region != 0 {
            query.set("tr", self.cursor.region.to_string());
        }
        if !self.channel_groups.is_empty() {
            query.set("channel-group", self.channel_groups.join(","));
        }
        if let Some(expression) = &self.filter_expression {
            query.set("filter-expr", expression.as_str());
        }
        if let Some(heartbeat) = self.heartbeat {
            query.set("heartbeat", heartbeat.to_string());
        }
        Ok(query)
    }

    fn request_timeout(&self) -> Duration {
        self.base.client.config().subscribe_request_timeout
    }

    fn auth_resources(&self) -> Vec<(ResourceType, &str)> {
        self.channels
            .iter()
            .map(|c| (ResourceType::Channel, c.as_str()))
            .chain(
                self.channel_groups
                    .iter()
                    .map(|g| (ResourceType::Group, g.as_str())),
            )
            .collect()
    }

    fn parse_response(&self, body: &[u8], status: &StatusMetadata) -> Result<SubscribeResult> {
        let operation = self.operation();
        let wire: Wire = parse_json(operation, body, status)?;

        let cursor = Cursor {
            timetoken: timetoken(&wire.t.t)
                .ok_or_else(|| Error::parsing(operation, body, "invalid cursor timetoken"))?,
            region: wire.t.r,
        };

        let messages = wire
            .m
            .into_iter()
            .map(|envelope| {
                let timetoken = envelope
                    .p
                    .as_ref()
                    .and_then(|p| timetoken(&p.t))
                    .unwrap_or(cursor.timetoken);
                Envelope {
                    kind: MessageKind::from_wire(envelope.e, &envelope.c),
                    subscription: envelope.b.filter(|b| *b != envelope.c),
                    channel: envelope.c,
                    payload: envelope.d,
                    publisher: envelope.i,
                    timetoken,
                    meta: envelope.u,
                }
            })
            .collect();

        Ok(SubscribeResult { cursor, messages })
    }
}

impl PubSubClient {
    /// A single long-poll subscribe request. Most applications want
    /// [`crate::subscribe::Subscriber`] instead.
    pub fn subscribe(&self) -> Subscribe {
        Subscribe::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testing::{MockTransport, client_with};

    #[tokio::test]
    async fn decodes_cursor_and_envelopes() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            200,
            r#"{"t":{"t":"17000000000000010","r":12},"m":[
                {"a":"1","f":0,"i":"bob","p":{"t":"17000000000000005","r":12},"k":"sub-key",
                 "c":"lobby","d":{"text":"hi"},"b":"lobby"},
                {"a":"1","f":0,"e":1,"p":{"t":"17000000000000006","r":12},"k":"sub-key",
                 "c":"room.a","d":"typing","b":"room.*","u":{"lang":"en"}},
                {"a":"1","f":0,"p":{"t":"17000000000000007","r":12},"k":"sub-key",
                 "c":"lobby-pnpres","d":{"action":"join","uuid":"carol"}}
            ]}"#,
        );
        let client = client_with(&transport);

        let polled = client
            .subscribe()
            .channels(["lobby", "room.*"])
            .cursor(Cursor {
                timetoken: 17_000_000_000_000_000,
                region: 12,
            })
            .filter_expression("lang == 'en'")
            .execute()
            .await
            .unwrap();

        let result = polled.response;
        assert_eq!(
            result.cursor,
            Cursor {
                timetoken: 17_000_000_000_000_010,
                region: 12
            }
        );
        assert_eq!(result.messages.len(), 3);

        let first = &result.messages[0];
        assert_eq!(first.kind, MessageKind::Message);
        assert_eq!(first.publisher.as_deref(), Some("bob"));
        assert_eq!(first.subscription, None);
        assert_eq!(first.payload, json!({"text": "hi"}));

        let second = &result.messages[1];
        assert_eq!(second.kind, MessageKind::Signal);
        assert_eq!(second.subscription.as_deref(), Some("room.*"));
        assert_eq!(second.meta, Some(json!({"lang": "en"})));
        assert_eq!(second.timetoken, 17_000_000_000_000_006);

        assert_eq!(result.messages[2].kind, MessageKind::Presence);

        let request = transport.last_request();
        assert_eq!(request.url.path(), "/v2/subscribe/sub-key/lobby,room.%2A/0");
        assert_eq!(request.query_param("tt").as_deref(), Some("17000000000000000"));
        assert_eq!(request.query_param("tr").as_deref(), Some("12"));
        assert_eq!(request.query_param("filter-expr").as_deref(), Some("lang == 'en'"));
        assert_eq!(request.request_timeout, Duration::from_secs(310));
    }

    #[tokio::test]
    async fn groups_only_use_comma_placeholder() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(200, r#"{"t":{"t":"1","r":1},"m":[]}"#);
        let client = client_with(&transport);

        client
            .subscribe()
            .channel_groups(["friends"])
            .execute()
            .await
            .unwrap();

        let request = transport.last_request();
        assert_eq!(request.url.path(), "/v2/subscribe/sub-key/,/0");
        assert_eq!(request.query_param("tt").as_deref(), Some("0"));
        assert_eq!(request.query_param("channel-group").as_deref(), Some("friends"));
    }
}
