use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::client::config::Config;
use crate::errors::BuildError;
use crate::query::QueryParams;
use crate::Token;
use crate::{TelemetryManager, TokenManager, Transport, transport::ReqwestTransport};

#[derive(Debug, Clone, Default)]
#[must_use]
/// Configures a [`PubSubClient`] before construction.
///
/// Most code obtains this via [`PubSubClient::builder()`].
///
/// # Defaults
/// - Origin: [`pubsub_common::constants::DEFAULT_ORIGIN`] over `https`
/// - Request timeout 10 s, subscribe request timeout 310 s, connect timeout 10 s
/// - Telemetry enabled
/// - Transport: [`ReqwestTransport`]
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// # use pubsub::PubSubClient;
/// let client = PubSubClient::builder()
///     .publish_key("pub-c-...")
///     .subscribe_key("sub-c-...")
///     .user_id("alice")
///     .request_timeout(Duration::from_secs(5))
///     .user_agent_extra("myapp/1.2.3")
///     .build()?;
/// # Ok::<_, pubsub::BuildError>(())
/// ```
pub struct PubSubClientBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
}

impl PubSubClientBuilder {
    /// Replace the whole configuration, e.g. one deserialized from a file.
    pub fn config(&mut self, config: Config) -> &mut Self {
        self.config = config;
        self
    }

    /// Key used by publishing operations.
    pub fn publish_key<S: Into<String>>(&mut self, key: S) -> &mut Self {
        self.config.publish_key = key.into();
        self
    }

    /// Key every operation needs.
    pub fn subscribe_key<S: Into<String>>(&mut self, key: S) -> &mut Self {
        self.config.subscribe_key = key.into();
        self
    }

    /// Secret key. Enables request signing and the access-manager operations.
    pub fn secret_key<S: Into<String>>(&mut self, key: S) -> &mut Self {
        self.config.secret_key = key.into();
        self
    }

    /// Identity of this client. Required.
    pub fn user_id<S: Into<String>>(&mut self, user_id: S) -> &mut Self {
        self.config.user_id = user_id.into();
        self
    }

    /// Legacy access-manager auth key.
    pub fn auth_key<S: Into<String>>(&mut self, auth_key: S) -> &mut Self {
        self.config.auth_key = auth_key.into();
        self
    }

    /// Service host, e.g. `ps.pndsn.com` or `localhost:8080`.
    pub fn origin<S: Into<String>>(&mut self, origin: S) -> &mut Self {
        self.config.origin = origin.into();
        self
    }

    /// Use `https` (default) or plain `http`.
    pub fn secure(&mut self, secure: bool) -> &mut Self {
        self.config.secure = secure;
        self
    }

    /// Default budget for one-shot requests.
    pub fn request_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Budget for one long-poll subscribe exchange.
    pub fn subscribe_request_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.subscribe_request_timeout = timeout;
        self
    }

    /// Budget for establishing a connection.
    pub fn connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Report per-operation latencies to the service.
    pub fn telemetry(&mut self, enabled: bool) -> &mut Self {
        self.config.telemetry = enabled;
        self
    }

    /// Append an extra user-agent segment after the default `pubsub-rust@<version>`.
    pub fn user_agent_extra<S: Into<String>>(&mut self, extra: S) -> &mut Self {
        self.config.user_agent_extra = Some(extra.into());
        self
    }

    /// Use a custom [`Transport`] instead of [`ReqwestTransport`].
    pub fn transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transport = Some(transport);
        self
    }

    /// Build [`PubSubClient`].
    pub fn build(&self) -> Result<PubSubClient, BuildError> {
        if self.config.user_id.trim().is_empty() {
            return Err(BuildError::Config("user_id is required".into()));
        }
        if self.config.origin.trim().is_empty() {
            return Err(BuildError::Config("origin must not be empty".into()));
        }

        let transport = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => {
                let transport = ReqwestTransport::new(self.config.user_agent_extra.as_deref());
                transport.warm_up(self.config.connect_timeout)?;
                Arc::new(transport)
            }
        };

        let client = PubSubClient {
            config: Arc::new(self.config.clone()),
            tokens: Arc::new(TokenManager::new()),
            telemetry: Arc::new(TelemetryManager::new(self.config.telemetry)),
            transport,
        };
        // Surface an unusable origin now rather than on the first request.
        client.base_url()?;
        Ok(client)
    }
}

/// Handle to the service, shared by every operation.
///
/// Cheap to clone: clones share the configuration, the token cache, telemetry and the
/// transport. The configuration never changes after [`PubSubClientBuilder::build`]; the token
/// cache is the only mutable state.
///
/// Operations are created from the client and consumed by `execute()`:
/// ```no_run
/// # use pubsub::PubSubClient;
/// # async fn run(client: PubSubClient) -> pubsub::Result<()> {
/// let now = client.time().execute().await?;
/// println!("server time: {}", now.response.timetoken);
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct PubSubClient {
    config: Arc<Config>,
    tokens: Arc<TokenManager>,
    telemetry: Arc<TelemetryManager>,
    transport: Arc<dyn Transport>,
}

impl Debug for PubSubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubClient")
            .field("origin", &self.config.origin)
            .field("user_id", &self.config.user_id)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl PubSubClient {
    /// Returns a builder to edit settings before creating [`PubSubClient`].
    pub fn builder() -> PubSubClientBuilder {
        PubSubClientBuilder::default()
    }

    // === Getters ===

    /// The immutable configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared token cache.
    pub fn token_manager(&self) -> &TokenManager {
        &self.tokens
    }

    /// Set the client-wide access token. An empty string clears it.
    pub fn set_token(&self, token: impl Into<String>) {
        self.tokens.set_token(token);
    }

    /// Decode an access token without storing it.
    pub fn parse_token(&self, token: &str) -> Result<Token, pubsub_common::token::Error> {
        Token::parse(token)
    }

    /// The shared telemetry aggregator.
    pub fn telemetry(&self) -> &TelemetryManager {
        &self.telemetry
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn base_url(&self) -> Result<Url, BuildError> {
        let scheme = if self.config.secure { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{}", self.config.origin.trim_end_matches('/')))
            .map_err(|err| BuildError::Config(format!("invalid origin: {err}")))
    }

    /// Absolute URL for an already-encoded `path` and `query`.
    pub(crate) fn request_url(&self, path: &str, query: &QueryParams) -> Result<Url, url::ParseError> {
        let scheme = if self.config.secure { "https" } else { "http" };
        let mut url = format!("{scheme}://{}{path}", self.config.origin.trim_end_matches('/'));
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.to_query_string());
        }
        Url::parse(&url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    #[test]
    fn user_id_is_required() {
        let err = PubSubClient::builder()
            .subscribe_key("sub")
            .transport(Arc::new(MockTransport::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[test]
    fn bad_origin_fails_at_build() {
        let err = PubSubClient::builder()
            .user_id("alice")
            .origin("exa mple.com")
            .transport(Arc::new(MockTransport::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[test]
    fn builds_urls_from_origin_and_scheme() {
        let client = PubSubClient::builder()
            .user_id("alice")
            .origin("localhost:8080")
            .secure(false)
            .transport(Arc::new(MockTransport::new()))
            .build()
            .unwrap();

        let query: QueryParams = [("uuid", "a b")].into_iter().collect();
        let url = client.request_url("/time/0", &query).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/time/0?uuid=a%20b");
    }

    #[test]
    fn clones_share_tokens() {
        let client = PubSubClient::builder()
            .user_id("alice")
            .transport(Arc::new(MockTransport::new()))
            .build()
            .unwrap();
        let clone = client.clone();
        client.set_token("shared");
        assert_eq!(clone.token_manager().token().as_deref(), Some("shared"));
    }
}
