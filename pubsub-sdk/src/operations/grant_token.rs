//! Access-manager v3 token grant.

use pubsub_common::encoding::encode_component;
use pubsub_common::permissions::{PermissionSet, Ttl, encode_resources};
use pubsub_common::token::{self, ResourceType, Token, TokenResources};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{require_secret_key, require_subscribe_key};
use crate::endpoint::response::parse_json;
use crate::endpoint::{Endpoint, EndpointBase, HttpMethod, OperationType, impl_common_options};
use crate::errors::{Result, ValidationError};
use crate::{PubSubClient, StatusMetadata};

/// Issue an access token for a set of resources and patterns. Requires the secret key; the
/// request is signed, body included.
///
/// Validation order: subscribe key, secret key, TTL, resources.
#[derive(Debug, Clone)]
pub struct GrantToken {
    base: EndpointBase,
    ttl: Ttl,
    authorized_uuid: Option<String>,
    resources: TokenResources,
    patterns: TokenResources,
    meta: Option<Map<String, Value>>,
}

/// Response of [`GrantToken`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantTokenResult {
    /// The issued token, as the service returned it.
    pub token: String,
}

impl GrantTokenResult {
    /// Decode the issued token.
    pub fn parse(&self) -> std::result::Result<Token, token::Error> {
        Token::parse(&self.token)
    }
}

#[derive(Deserialize)]
struct Wire {
    data: WireData,
}

#[derive(Deserialize)]
struct WireData {
    token: String,
}

impl GrantToken {
    pub(crate) fn new(client: PubSubClient) -> Self {
        Self {
            base: EndpointBase::new(client),
            ttl: Ttl::ServiceDefault,
            authorized_uuid: None,
            resources: TokenResources::default(),
            patterns: TokenResources::default(),
            meta: None,
        }
    }

    /// Token lifetime in minutes. Required.
    pub fn ttl(mut self, minutes: u32) -> Self {
        self.ttl = Ttl::minutes(minutes);
        self
    }

    /// Restrict the token to one user id.
    pub fn authorized_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.authorized_uuid = Some(uuid.into());
        self
    }

    /// Grant `permissions` on the exact resource `name`.
    pub fn resource(
        mut self,
        kind: ResourceType,
        name: impl Into<String>,
        permissions: impl Into<PermissionSet>,
    ) -> Self {
        self.resources
            .get_mut(kind)
            .insert(name.into(), permissions.into());
        self
    }

    /// Grant `permissions` on every resource matching the regular expression `pattern`.
    pub fn pattern(
        mut self,
        kind: ResourceType,
        pattern: impl Into<String>,
        permissions: impl Into<PermissionSet>,
    ) -> Self {
        self.patterns
            .get_mut(kind)
            .insert(pattern.into(), permissions.into());
        self
    }

    /// Free-form metadata embedded in the token.
    pub fn meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }
}

fn resources_json(resources: &TokenResources) -> Value {
    let mut out = Map::new();
    for kind in [ResourceType::Channel, ResourceType::Group, ResourceType::Uuid] {
        out.insert(
            kind.body_key().to_string(),
            json!(encode_resources(resources.get(kind))),
        );
    }
    Value::Object(out)
}

impl_common_options!(GrantToken);

impl Endpoint for GrantToken {
    type Response = GrantTokenResult;

    fn base(&self) -> &EndpointBase {
        &self.base
    }

    fn operation(&self) -> OperationType {
        OperationType::GrantToken
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let config = self.base.client.config();
        require_subscribe_key(config)?;
        require_secret_key(config)?;
        if self.ttl == Ttl::ServiceDefault {
            return Err(ValidationError::missing("ttl", "TTL"));
        }
        self.ttl
            .validate()
            .map_err(|err| ValidationError::new("ttl", err.to_string()))?;
        if self.resources.is_empty() && self.patterns.is_empty() {
            return Err(ValidationError::missing("resources", "Resources"));
        }
        Ok(())
    }

    fn build_path(&self) -> std::result::Result<String, ValidationError> {
        let config = self.base.client.config();
        Ok(format!(
            "/v3/pam/{}/grant",
            encode_component(&config.subscribe_key)
        ))
    }

    fn build_body(&self) -> std::result::Result<Vec<u8>, ValidationError> {
        let mut permissions = Map::new();
        permissions.insert("resources".into(), resources_json(&self.resources));
        permissions.insert("patterns".into(), resources_json(&self.patterns));
        permissions.insert(
            "meta".into(),
            Value::Object(self.meta.clone().unwrap_or_default()),
        );
        if let Some(uuid) = &self.authorized_uuid {
            permissions.insert("uuid".into(), Value::String(uuid.clone()));
        }

        let body = json!({
            "ttl": self.ttl.to_wire(),
            "permissions": permissions,
        });
        serde_json::to_vec(&body)
            .map_err(|err| ValidationError::new("permissions", format!("Invalid Permissions: {err}")))
    }

    fn http_method(&self) -> HttpMethod {
        HttpMethod::Post
    }

    fn is_auth_required(&self) -> bool {
        false
    }

    fn parse_response(&self, body: &[u8], status: &StatusMetadata) -> Result<GrantTokenResult> {
        let wire: Wire = parse_json(self.operation(), body, status)?;
        Ok(GrantTokenResult {
            token: wire.data.token,
        })
    }
}

impl PubSubClient {
    /// Issue an access token.
    pub fn grant_token(&self) -> GrantToken {
        GrantToken::new(self.clone())
    }
}
