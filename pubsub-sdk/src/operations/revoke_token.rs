//! Access-manager v3 token revocation.

use pubsub_common::encoding::encode_component;
use serde::Deserialize;

use super::{require, require_secret_key, require_subscribe_key};
use crate::endpoint::response::parse_json;
use crate::endpoint::{Endpoint, EndpointBase, HttpMethod, OperationType, impl_common_options};
use crate::errors::{Result, ValidationError};
use crate::{PubSubClient, StatusMetadata};

/// Revoke a previously granted token. Requires the secret key; the request is signed.
///
/// Validation order: subscribe key, secret key, token.
#[derive(Debug, Clone)]
pub struct RevokeToken {
    base: EndpointBase,
    token: String,
}

/// Response of [`RevokeToken`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeTokenResult {
    /// Service acknowledgement text.
    pub message: String,
}

#[derive(Deserialize)]
struct Wire {
    #[serde(default)]
    data: Option<WireData>,
}

#[derive(Deserialize)]
struct WireData {
    #[serde(default)]
    message: String,
}

impl RevokeToken {
    pub(crate) fn new(client: PubSubClient) -> Self {
        Self {
            base: EndpointBase::new(client),
            token: String::new(),
        }
    }

    /// The token to revoke.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }
}

impl_common_options!(RevokeToken);

impl Endpoint for RevokeToken {
    type Response = RevokeTokenResult;

    fn base(&self) -> &EndpointBase {
        &self.base
    }

    fn operation(&self) -> OperationType {
        OperationType::RevokeToken
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let config = self.base.client.config();
        require_subscribe_key(config)?;
        require_secret_key(config)?;
        require(&self.token, "token", "Token")
    }

    fn build_path(&self) -> std::result::Result<String, ValidationError> {
        let config = self.base.client.config();
        Ok(format!(
            "/v3/pam/{}/grant/{}",
            encode_component(&config.subscribe_key),
            encode_component(&self.token)
        ))
    }

    fn http_method(&self) -> HttpMethod {
        HttpMethod::Delete
    }

    fn is_auth_required(&self) -> bool {
        false
    }

    fn parse_response(&self, body: &[u8], status: &StatusMetadata) -> Result<RevokeTokenResult> {
        let wire: Wire = parse_json(self.operation(), body, status)?;
        Ok(RevokeTokenResult {
            message: wire.data.map(|data| data.message).unwrap_or_default(),
        })
    }
}

impl PubSubClient {
    /// Revoke an access token.
    pub fn revoke_token(&self) -> RevokeToken {
        RevokeToken::new(self.clone())
    }
}
