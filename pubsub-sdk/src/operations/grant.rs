//! Legacy (v2) access-manager grant.

use std::collections::BTreeMap;

use pubsub_common::encoding::encode_component;
use pubsub_common::permissions::{Permission, PermissionSet, Ttl};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{require_publish_key, require_secret_key, require_subscribe_key};
use crate::endpoint::response::parse_json;
use crate::endpoint::{Endpoint, EndpointBase, OperationType, impl_common_options};
use crate::errors::{Result, ValidationError};
use crate::query::QueryParams;
use crate::{PubSubClient, StatusMetadata};

/// Grant permissions to auth keys on channels and channel groups. Requires the secret key;
/// the request is signed.
///
/// Validation order: subscribe key, publish key, secret key, TTL range.
///
/// Every permission flag is sent, `0` for absent ones. `ttl` is always sent, `-1` when unset
/// (the service default).
#[derive(Debug, Clone)]
pub struct Grant {
    base: EndpointBase,
    channels: Vec<String>,
    channel_groups: Vec<String>,
    auth_keys: Vec<String>,
    target_uuids: Vec<String>,
    permissions: PermissionSet,
    ttl: Ttl,
}

/// Response of [`Grant`].
#[derive(Debug, Clone, PartialEq)]
pub struct GrantResult {
    /// Scope of the grant as reported by the service (`subkey`, `channel`, `user`, ...).
    pub level: String,
    /// Effective TTL.
    pub ttl: Ttl,
    /// Per-channel permissions, when reported.
    pub channels: BTreeMap<String, PermissionSet>,
    /// Per-channel-group permissions, when reported.
    pub channel_groups: BTreeMap<String, PermissionSet>,
    /// Per-auth-key permissions, when reported.
    pub auth_keys: BTreeMap<String, PermissionSet>,
    /// The complete payload, for fields not mapped above.
    pub payload: Value,
}

#[derive(Deserialize)]
struct Wire {
    payload: Value,
}

impl Grant {
    pub(crate) fn new(client: PubSubClient) -> Self {
        Self {
            base: EndpointBase::new(client),
            channels: Vec::new(),
            channel_groups: Vec::new(),
            auth_keys: Vec::new(),
            target_uuids: Vec::new(),
            permissions: PermissionSet::default(),
            ttl: Ttl::ServiceDefault,
        }
    }

    /// Channels the grant applies to.
    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Channel groups the grant applies to.
    pub fn channel_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channel_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Auth keys receiving the permissions. Empty grants at key level.
    pub fn auth_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// User ids whose metadata the grant applies to.
    pub fn target_uuids<I, S>(mut self, uuids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_uuids = uuids.into_iter().map(Into::into).collect();
        self
    }

    /// Permissions to grant. Anything absent is revoked.
    pub fn permissions(mut self, permissions: impl Into<PermissionSet>) -> Self {
        self.permissions = permissions.into();
        self
    }

    /// Lifetime in minutes; `0` never expires.
    pub fn ttl(mut self, minutes: u32) -> Self {
        self.ttl = Ttl::minutes(minutes);
        self
    }
}

impl_common_options!(Grant);

impl Endpoint for Grant {
    type Response = GrantResult;

    fn base(&self) -> &EndpointBase {
        &self.base
    }

    fn operation(&self) -> OperationType {
        OperationType::Grant
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let config = self.base.client.config();
        require_subscribe_key(config)?;
        require_publish_key(config)?;
        require_secret_key(config)?;
        self.ttl
            .validate()
            .map_err(|err| ValidationError::new("ttl", err.to_string()))
    }

    fn build_path(&self) -> std::result::Result<String, ValidationError> {
        let config = self.base.client.config();
        Ok(format!(
            "/v2/auth/grant/sub-key/{}",
            encode_component(&config.subscribe_key)
        ))
    }

    fn build_query(&self) -> std::result::Result<QueryParams, ValidationError> {
        let mut query = QueryParams::new();
        if !self.channels.is_empty() {
            query.set("channel", self.channels.join(","));
        }
        if !self.channel_groups.is_empty() {
            query.set("channel-group", self.channel_groups.join(","));
        }
        if !self.auth_keys.is_empty() {
            query.set("auth", self.auth_keys.join(","));
        }
        if !self.target_uuids.is_empty() {
            query.set("target-uuid", self.target_uuids.join(","));
        }
        for permission in Permission::ALL {
            let granted = self.permissions.contains(permission);
            query.set(permission.flag(), if granted { "1" } else { "0" });
        }
        query.set("ttl", self.ttl.to_wire().to_string());
        Ok(query)
    }

    fn is_auth_required(&self) -> bool {
        false
    }

    fn parse_response(&self, body: &[u8], status: &StatusMetadata) -> Result<GrantResult> {
        let wire: Wire = parse_json(self.operation(), body, status)?;
        let payload = wire.payload;

        Ok(GrantResult {
            level: payload
                .get("level")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            ttl: payload
                .get("ttl")
                .and_then(Value::as_i64)
                .map_or(Ttl::ServiceDefault, Ttl::from_wire),
            channels: flag_map(payload.get("channels")),
            channel_groups: flag_map(payload.get("channel-groups")),
            auth_keys: flag_map(payload.get("auths")),
            payload,
        })
    }
}

/// `{name: {"r": 1, "w": 0, ...}}` to permission sets. Non-object entries are skipped.
fn flag_map(value: Option<&Value>) -> BTreeMap<String, PermissionSet> {
    let Some(Value::Object(entries)) = value else {
        return BTreeMap::new();
    };
    entries
        .iter()
        .filter_map(|(name, flags)| flags.as_object().map(|f| (name.clone(), flag_set(f))))
        .collect()
}

fn flag_set(flags: &Map<String, Value>) -> PermissionSet {
    Permission::ALL
        .into_iter()
        .filter(|permission| {
            flags
                .get(permission.flag())
                .and_then(Value::as_u64)
                .is_some_and(|bit| bit == 1)
        })
        .collect()
}

impl PubSubClient {
    /// Legacy access-manager grant.
    pub fn grant(&self) -> Grant {
        Grant::new(self.clone())
    }
}
