//! The contract every operation implements, and the single executor that runs it.
//!
//! An operation ("endpoint") is a plain value built through fluent setters. It knows how to
//! validate itself and how to render its path, query and body; it never performs I/O. The
//! generic [`execute`] function does everything else: credential injection, signing, the timed
//! and cancellable HTTP exchange, handing the raw response to the endpoint's parser, and
//! telemetry.

use std::fmt::Display;
use std::time::Duration;

use pubsub_common::token::ResourceType;

use crate::{
    Context, PubSubClient, QueryParams, Result, ValidationError, endpoint::status::StatusMetadata,
};

mod execute;
pub(crate) mod response;
pub mod status;

pub use execute::execute;
pub(crate) use execute::prepare;

/// Stable discriminator of an operation, used for telemetry bucketing, error messages and
/// status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationType {
    /// Server time.
    Time,
    /// Publish a message.
    Publish,
    /// Publish without storage or replication.
    Fire,
    /// Send a signal.
    Signal,
    /// Legacy (v2) permission grant.
    Grant,
    /// Access-manager v3 token grant.
    GrantToken,
    /// Access-manager v3 token revocation.
    RevokeToken,
    /// Delete stored messages.
    DeleteMessages,
    /// Create or update user-id metadata.
    SetUuidMetadata,
    /// Presence occupancy.
    HereNow,
    /// Long-poll subscribe.
    Subscribe,
}

impl OperationType {
    /// Human-readable name used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            OperationType::Time => "time",
            OperationType::Publish => "publish",
            OperationType::Fire => "fire",
            OperationType::Signal => "signal",
            OperationType::Grant => "grant",
            OperationType::GrantToken => "grant-token",
            OperationType::RevokeToken => "revoke-token",
            OperationType::DeleteMessages => "delete-messages",
            OperationType::SetUuidMetadata => "set-uuid-metadata",
            OperationType::HereNow => "here-now",
            OperationType::Subscribe => "subscribe",
        }
    }

    /// Telemetry bucket (`l_<key>`), if the operation is reported.
    pub const fn telemetry_key(self) -> Option<&'static str> {
        match self {
            OperationType::Time => Some("time"),
            OperationType::Publish | OperationType::Fire => Some("pub"),
            OperationType::Signal => Some("sig"),
            OperationType::Grant | OperationType::GrantToken | OperationType::RevokeToken => {
                Some("pam")
            }
            OperationType::DeleteMessages => Some("hist"),
            OperationType::SetUuidMetadata => Some("obj"),
            OperationType::HereNow => Some("pres"),
            OperationType::Subscribe => None,
        }
    }
}

impl Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The HTTP methods the service uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// Upper-case method name, as used on the wire and in signatures.
    pub const fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(value: HttpMethod) -> Self {
        match value {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Fields shared by every endpoint: the owning client, the cancellation context, caller-supplied
/// extra query parameters and an explicit per-request credential.
#[derive(Debug, Clone)]
pub struct EndpointBase {
    pub(crate) client: PubSubClient,
    pub(crate) context: Option<Context>,
    pub(crate) query_params: Option<QueryParams>,
    pub(crate) auth: Option<String>,
}

impl EndpointBase {
    /// A base bound to `client`, with no context, extras or explicit credential.
    pub fn new(client: PubSubClient) -> Self {
        Self {
            client,
            context: None,
            query_params: None,
            auth: None,
        }
    }

    /// The owning client.
    pub fn client(&self) -> &PubSubClient {
        &self.client
    }

    /// The cancellation context, if any.
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Caller-supplied query parameters, if any.
    pub fn query_params(&self) -> Option<&QueryParams> {
        self.query_params.as_ref()
    }

    /// Explicit per-request credential, if any.
    pub fn auth(&self) -> Option<&str> {
        self.auth.as_deref()
    }
}

/// The contract every operation implements.
///
/// Apart from [`Endpoint::parse_response`], every method is a pure function of the endpoint's
/// fields and its client's configuration. The executor calls them in a fixed order:
/// `validate`, `build_path`, `build_query`, `build_body`, `http_method`.
pub trait Endpoint: Send + Sync {
    /// Typed response produced by [`Endpoint::parse_response`].
    type Response: Send;

    /// Cross-cutting fields.
    fn base(&self) -> &EndpointBase;

    /// Stable discriminator.
    fn operation(&self) -> OperationType;

    /// Return the *first* violated precondition. Keys are checked before operation fields;
    /// each operation documents its order.
    fn validate(&self) -> std::result::Result<(), ValidationError>;

    /// URL path with every caller-supplied segment percent-encoded.
    fn build_path(&self) -> std::result::Result<String, ValidationError>;

    /// Operation-specific query parameters.
    fn build_query(&self) -> std::result::Result<QueryParams, ValidationError> {
        Ok(QueryParams::new())
    }

    /// Request body; an empty vector for bodyless operations.
    fn build_body(&self) -> std::result::Result<Vec<u8>, ValidationError> {
        Ok(Vec::new())
    }

    /// HTTP method.
    fn http_method(&self) -> HttpMethod {
        HttpMethod::Get
    }

    /// Whether a credential (`auth`) must be attached.
    fn is_auth_required(&self) -> bool {
        true
    }

    /// Resources this request touches, used to look up resource-scoped tokens.
    fn auth_resources(&self) -> Vec<(ResourceType, &str)> {
        Vec::new()
    }

    /// Budget for the whole exchange. Defaults to the client's request timeout.
    fn request_timeout(&self) -> Duration {
        self.base().client.config().request_timeout
    }

    /// Budget for establishing the connection. Defaults to the client's connect timeout.
    fn connect_timeout(&self) -> Duration {
        self.base().client.config().connect_timeout
    }

    /// Decode the raw response. Must never panic on malformed input.
    fn parse_response(&self, body: &[u8], status: &StatusMetadata) -> Result<Self::Response>;
}

/// Generates the setters for [`EndpointBase`] fields on an endpoint type with a `base` field.
macro_rules! impl_common_options {
    ($endpoint:ty) => {
        impl $endpoint {
            /// Attach a cancellation context. Cancelling it aborts the in-flight exchange.
            pub fn context(mut self, context: $crate::Context) -> Self {
                self.base.context = Some(context);
                self
            }

            /// Add one caller-supplied query parameter. Extras are applied after every default
            /// and operation parameter and win any collision.
            pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
                self.base
                    .query_params
                    .get_or_insert_with($crate::QueryParams::new)
                    .set(key, value);
                self
            }

            /// Add several caller-supplied query parameters. See [`Self::query_param`].
            pub fn query_params<I, K, V>(mut self, params: I) -> Self
            where
                I: IntoIterator<Item = (K, V)>,
                K: Into<String>,
                V: Into<String>,
            {
                self.base
                    .query_params
                    .get_or_insert_with($crate::QueryParams::new)
                    .extend(params);
                self
            }

            /// Use this credential for the request, ahead of any stored token.
            pub fn auth(mut self, auth: impl Into<String>) -> Self {
                self.base.auth = Some(auth.into());
                self
            }

            /// Run the request through the executor.
            pub async fn execute(
                self,
            ) -> $crate::ExecutionResult<<Self as $crate::Endpoint>::Response> {
                $crate::execute(&self).await
            }
        }
    };
}

pub(crate) use impl_common_options;
