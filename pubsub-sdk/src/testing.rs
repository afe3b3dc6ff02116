//! In-memory transport for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::core::PubSubClient;
use crate::errors::TransportError;
use crate::transport::{Transport, TransportRequest, TransportResponse};

type Scripted = Result<TransportResponse, TransportError>;

/// Records every request and answers from a script. With an empty script, `send` never
/// completes, which makes it easy to test cancellation and in-flight limits.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<TransportRequest>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub(crate) fn respond(&self, status: u16, body: impl Into<Vec<u8>>) -> &Self {
        self.script.lock().unwrap().push_back(Ok(TransportResponse {
            status,
            body: body.into(),
        }));
        self
    }

    /// Queue a transport failure.
    pub(crate) fn fail(&self, error: TransportError) -> &Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn last_request(&self) -> TransportRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(scripted) => {
                tokio::task::yield_now().await;
                scripted
            }
            None => std::future::pending().await,
        }
    }
}

/// A client with every key set, talking to `transport`.
pub(crate) fn client_with(transport: &Arc<MockTransport>) -> PubSubClient {
    PubSubClient::builder()
        .publish_key("pub-key")
        .subscribe_key("sub-key")
        .user_id("alice")
        .telemetry(false)
        .transport(Arc::clone(transport) as Arc<dyn Transport>)
        .build()
        .unwrap()
}

/// A client with every key plus a secret key.
pub(crate) fn signing_client_with(transport: &Arc<MockTransport>) -> PubSubClient {
    PubSubClient::builder()
        .publish_key("pub-key")
        .subscribe_key("sub-key")
        .secret_key("secret-key")
        .user_id("alice")
        .telemetry(false)
        .transport(Arc::clone(transport) as Arc<dyn Transport>)
        .build()
        .unwrap()
}
