//! Presence occupancy.

use std::collections::BTreeMap;

use pubsub_common::encoding::{encode_component, encode_list};
use pubsub_common::token::ResourceType;
use serde::Deserialize;
use serde_json::Value;

use super::require_subscribe_key;
use crate::endpoint::response::parse_json;
use crate::endpoint::{Endpoint, EndpointBase, OperationType, impl_common_options};
use crate::errors::{Result, ValidationError};
use crate::query::QueryParams;
use crate::{PubSubClient, StatusMetadata};

/// Who is present on one or more channels or channel groups.
///
/// Validation order: subscribe key, channels or channel groups.
#[derive(Debug, Clone)]
pub struct HereNow {
    base: EndpointBase,
    channels: Vec<String>,
    channel_groups: Vec<String>,
    include_user_ids: bool,
    include_state: bool,
}

/// One present user.
#[derive(Debug, Clone, PartialEq)]
pub struct Occupant {
    /// User id.
    pub user_id: String,
    /// Presence state, when requested and set.
    pub state: Option<Value>,
}

/// Occupancy of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOccupancy {
    /// Number of present users.
    pub occupancy: u64,
    /// Present users, when requested.
    pub occupants: Vec<Occupant>,
}

/// Response of [`HereNow`].
#[derive(Debug, Clone, PartialEq)]
pub struct HereNowResult {
    /// Sum of all channel occupancies.
    pub total_occupancy: u64,
    /// Per-channel occupancy.
    pub channels: BTreeMap<String, ChannelOccupancy>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireOccupant {
    Id(String),
    WithState {
        uuid: String,
        #[serde(default)]
        state: Option<Value>,
    },
}

#[derive(Deserialize)]
struct WireChannel {
    #[serde(default)]
    occupancy: u64,
    #[serde(default)]
    uuids: Vec<WireOccupant>,
}

#[derive(Deserialize)]
struct WireMulti {
    #[serde(default)]
    total_occupancy: u64,
    #[serde(default)]
    channels: BTreeMap<String, WireChannel>,
}

#[derive(Deserialize)]
struct Wire {
    #[serde(default)]
    payload: Option<WireMulti>,
    #[serde(flatten)]
    single: WireChannel,
}

impl From<WireChannel> for ChannelOccupancy {
    fn from(wire: WireChannel) -> Self {
        Self {
            occupancy: wire.occupancy,
            occupants: wire
                .uuids
                .into_iter()
                .map(|occupant| match occupant {
                    WireOccupant::Id(user_id) => Occupant {
                        user_id,
                        state: None,
                    },
                    WireOccupant::WithState { uuid, state } => Occupant {
                        user_id: uuid,
                        state,
                    },
                })
                .collect(),
        }
    }
}

impl HereNow {
    pub(crate) fn new(client: PubSubClient) -> Self {
        Self {
            base: EndpointBase::new(client),
            channels: Vec::new(),
            channel_groups: Vec::new(),
            include_user_ids: true,
            include_state: false,
        }
    }

    /// Channels to inspect.
    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Channel groups to inspect.
    pub fn channel_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channel_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// List present user ids (default) or only count them.
    pub fn include_user_ids(mut self, include: bool) -> Self {
        self.include_user_ids = include;
        self
    }

    /// Include each user's presence state.
    pub fn include_state(mut self, include: bool) -> Self {
        self.include_state = include;
        self
    }

    /// The service answers a single-channel query in a flat shape.
    fn is_single_channel(&self) -> bool {
        self.channels.len() == 1 && self.channel_groups.is_empty()
    }
}

impl_common_options!(HereNow);

impl Endpoint for HereNow {
    type Response = HereNowResult;

    fn base(&self) -> &EndpointBase {
        &self.base
    }

    fn operation(&self) -> OperationType {
        OperationType::HereNow
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
            "/v2/presence/sub-key/{}/channel/{}",
            encode_component(&config.subscribe_key),
            channels
        ))
    }

    fn build_query(&self) -> std::result::Result<QueryParams, ValidationError> {
        let mut query = QueryParams::new();
        if !self.channel_groups.is_empty() {
            query.set("channel-group", self.channel_groups.join(","));
        }
        query.set("disable_uuids", if self.include_user_ids { "0" } else { "1" });
        query.set("state", if self.include_state { "1" } else { "0" });
        Ok(query)
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

    fn parse_response(&self, body: &[u8], status: &StatusMetadata) -> Result<HereNowResult> {
        let wire: Wire = parse_json(self.operation(), body, status)?;

        match wire.payload {
            Some(multi) => Ok(HereNowResult {
                total_occupancy: multi.total_occupancy,
                channels: multi
                    .channels
                    .into_iter()
                    .map(|(name, channel)| (name, channel.into()))
                    .collect(),
            }),
            None => {
                let channel: ChannelOccupancy = wire.single.into();
                let name = if self.is_single_channel() {
                    self.channels[0].clone()
                } else {
                    String::new()
                };
                Ok(HereNowResult {
                    total_occupancy: channel.occupancy,
                    channels: BTreeMap::from([(name, channel)]),
                })
            }
        }
    }
}

impl PubSubClient {
    /// Presence occupancy.
    pub fn here_now(&self) -> HereNow {
        HereNow::new(self.clone())
    }
}
