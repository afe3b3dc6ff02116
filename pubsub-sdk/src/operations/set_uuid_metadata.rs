//! User id metadata.

use pubsub_common::encoding::encode_component;
use pubsub_common::token::ResourceType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{require, require_subscribe_key};
use crate::endpoint::response::parse_json;
use crate::endpoint::{Endpoint, EndpointBase, HttpMethod, OperationType, impl_common_options};
use crate::errors::{Result, ValidationError};
use crate::query::QueryParams;
use crate::{PubSubClient, StatusMetadata};

/// Create or update the metadata of a user id. Only the fields that are set are sent.
///
/// Validation order: subscribe key, user id.
#[derive(Debug, Clone)]
pub struct SetUuidMetadata {
    base: EndpointBase,
    uuid: Option<String>,
    fields: MetadataFields,
    include_custom: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom: Option<Map<String, Value>>,
}

/// Metadata of a user id as stored by the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UuidMetadata {
    /// The user id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Identifier in an external system.
    #[serde(default)]
    pub external_id: Option<String>,
    /// Profile picture URL.
    #[serde(default)]
    pub profile_url: Option<String>,
    /// Custom fields, when requested.
    #[serde(default)]
    pub custom: Option<Map<String, Value>>,
    /// Last update, ISO 8601.
    #[serde(default)]
    pub updated: String,
    /// Entity tag of this revision.
    #[serde(default)]
    pub e_tag: String,
}

#[derive(Deserialize)]
struct Wire {
    data: UuidMetadata,
}

impl SetUuidMetadata {
    pub(crate) fn new(client: PubSubClient) -> Self {
        Self {
            base: EndpointBase::new(client),
            uuid: None,
            fields: MetadataFields::default(),
            include_custom: true,
        }
    }

    /// User id to update. Defaults to the client's own.
    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.fields.name = Some(name.into());
        self
    }

    /// Email address.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.fields.email = Some(email.into());
        self
    }

    /// Identifier in an external system.
    pub fn external_id(mut self, external_id: impl Into<String>) -> Self {
        self.fields.external_id = Some(external_id.into());
        self
    }

    /// Profile picture URL.
    pub fn profile_url(mut self, profile_url: impl Into<String>) -> Self {
        self.fields.profile_url = Some(profile_url.into());
        self
    }

    /// Custom scalar fields.
    pub fn custom(mut self, custom: Map<String, Value>) -> Self {
        self.fields.custom = Some(custom);
        self
    }

    /// Return custom fields in the response (default).
    pub fn include_custom(mut self, include: bool) -> Self {
        self.include_custom = include;
        self
    }

    fn target(&self) -> &str {
        self.uuid
            .as_deref()
            .unwrap_or(&self.base.client.config().user_id)
    }
}

impl_common_options!(SetUuidMetadata);

impl Endpoint for SetUuidMetadata {
    type Response = UuidMetadata;

    fn base(&self) -> &EndpointBase {
        &self.base
    }

    fn operation(&self) -> OperationType {
        OperationType::SetUuidMetadata
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        require_subscribe_key(self.base.client.config())?;
        require(self.target(), "uuid", "UUID")
    }

    fn build_path(&self) -> std::result::Result<String, ValidationError> {
        let config = self.base.client.config();
        Ok(format!(
            "/v2/objects/{}/uuids/{}",
            encode_component(&config.subscribe_key),
            encode_component(self.target())
        ))
    }

    fn build_query(&self) -> std::result::Result<QueryParams, ValidationError> {
        let mut query = QueryParams::new();
        if self.include_custom {
            query.set("include", "custom");
        }
        Ok(query)
    }

    fn build_body(&self) -> std::result::Result<Vec<u8>, ValidationError> {
        serde_json::to_vec(&self.fields)
            .map_err(|err| ValidationError::new("metadata", format!("Invalid Metadata: {err}")))
    }

    fn http_method(&self) -> HttpMethod {
        HttpMethod::Patch
    }

    fn auth_resources(&self) -> Vec<(ResourceType, &str)> {
        vec![(ResourceType::Uuid, self.target())]
    }

    fn parse_response(&self, body: &[u8], status: &StatusMetadata) -> Result<UuidMetadata> {
        let wire: Wire = parse_json(self.operation(), body, status)?;
        Ok(wire.data)
    }
}

impl PubSubClient {
    /// Create or update user-id metadata.
    pub fn set_uuid_metadata(&self) -> SetUuidMetadata {
        SetUuidMetadata::new(self.clone())
    }
}
