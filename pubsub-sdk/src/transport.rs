//! The HTTP seam between the executor and the network.
//!
//! The executor only ever talks to a [`Transport`]. [`ReqwestTransport`] is the production
//! implementation; tests and unusual runtimes can supply their own through
//! [`crate::PubSubClientBuilder::transport`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::endpoint::HttpMethod;
use crate::errors::{BuildError, TransportError};

const DEFAULT_USER_AGENT: &str = concat!("pubsub-rust", "@", env!("CARGO_PKG_VERSION"));

/// A fully assembled request: URL with final (signed) query, body and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL including the query string.
    pub url: Url,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// Body bytes; empty for bodyless operations.
    pub body: Vec<u8>,
    /// Budget for establishing the connection.
    pub connect_timeout: Duration,
    /// Budget for the whole exchange.
    pub request_timeout: Duration,
}

impl TransportRequest {
    /// Value of query parameter `key` in the final URL.
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// Raw HTTP response handed to the operation's parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Body exactly as received.
    pub body: Vec<u8>,
}

/// Performs one HTTP exchange.
///
/// Implementations must be cancel-safe: the executor drops the returned future when the
/// caller's context is cancelled, and that must release the underlying connection.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send `request` and read the whole response body.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by reqwest (rustls).
///
/// reqwest only exposes the connect timeout on the client itself, so one pooled client is
/// kept per distinct connect timeout. In practice there are one or two.
#[derive(Debug)]
pub struct ReqwestTransport {
    user_agent: String,
    clients: Mutex<HashMap<Duration, reqwest::Client>>,
}

impl ReqwestTransport {
    /// Create a transport, optionally appending `user_agent_extra` to the default user agent.
    pub fn new(user_agent_extra: Option<&str>) -> Self {
        let user_agent = match user_agent_extra {
            Some(extra) if !extra.trim().is_empty() => {
                format!("{DEFAULT_USER_AGENT} {}", extra.trim())
            }
            _ => DEFAULT_USER_AGENT.to_string(),
        };
        Self {
            user_agent,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Build (and cache) the client for `connect_timeout` eagerly, surfacing configuration
    /// problems at client construction rather than on the first request.
    pub fn warm_up(&self, connect_timeout: Duration) -> Result<(), BuildError> {
        self.client_for(connect_timeout)?;
        Ok(())
    }

    fn client_for(&self, connect_timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&connect_timeout) {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(connect_timeout)
            .build()?;
        clients.insert(connect_timeout, client.clone());
        Ok(client)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let client = self
            .client_for(request.connect_timeout)
            .map_err(TransportError::Http)?;

        let mut builder = client
            .request(request.method.into(), request.url)
            .timeout(request.request_timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    fn request(url: &str, method: HttpMethod, body: &[u8]) -> TransportRequest {
        TransportRequest {
            method,
            url: Url::parse(url).unwrap(),
            headers: vec![("content-type".into(), "application/json".into())],
            body: body.to_vec(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn sends_method_body_and_user_agent() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/echo")
                    .header("content-type", "application/json")
                    .header_exists("user-agent")
                    .body(r#"{"a":1}"#);
                then.status(201).body("created");
            })
            .await;

        let transport = ReqwestTransport::new(Some("tests/1.0"));
        let response = transport
            .send(request(&server.url("/echo"), HttpMethod::Post, br#"{"a":1}"#))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 201);
        assert_eq!(response.body, b"created");
    }

    #[tokio::test]
    async fn request_timeout_maps_to_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow");
                then.status(200).delay(Duration::from_secs(5));
            })
            .await;

        let transport = ReqwestTransport::default();
        let mut req = request(&server.url("/slow"), HttpMethod::Get, b"");
        req.request_timeout = Duration::from_millis(100);

        let err = transport.send(req).await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connect() {
        // Port 9 (discard) is essentially never listening on CI machines.
        let transport = ReqwestTransport::default();
        let err = transport
            .send(request("http://127.0.0.1:9/", HttpMethod::Get, b""))
            .await
            .unwrap_err();
        match err {
            TransportError::Connect(source) => {
                assert!(source.downcast_ref::<reqwest::Error>().is_some());
            }
            other => panic!("expected connect failure, got {other:?}"),
        }
    }

    #[test]
    fn clients_are_cached_per_connect_timeout() {
        let transport = ReqwestTransport::default();
        transport.warm_up(Duration::from_secs(1)).unwrap();
        transport.warm_up(Duration::from_secs(1)).unwrap();
        transport.warm_up(Duration::from_secs(2)).unwrap();
        assert_eq!(transport.clients.lock().unwrap().len(), 2);
    }
}
