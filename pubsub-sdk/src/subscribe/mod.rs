//! Perpetual subscribe loop.
//!
//! A [`Subscriber`] owns one background task that long-polls the service for the current set
//! of channels and channel groups and forwards every delivered event to [`Subscriber::events`].
//!
//! - Commands ([`Subscriber::subscribe`], [`Subscriber::unsubscribe`], ...) go through a bounded
//!   queue. A command that arrives while an exchange is in flight cancels it; the next exchange
//!   covers the updated set and resumes from the same cursor. At most one exchange is ever in
//!   flight.
//! - A long-poll that times out is re-issued immediately. Other network and service failures
//!   are retried with exponential back-off ([`RetryPolicy`]). Validation and access-denied
//!   failures, and successful answers whose body reports an error, end the subscription with
//!   [`SubscribeEvent::Disconnected`].
//! - Dropping the [`Subscriber`] stops the task and the in-flight exchange.
//!
//! ```no_run
//! # use pubsub::{PubSubClient, subscribe::SubscribeEvent};
//! # async fn run(client: PubSubClient) -> Result<(), Box<dyn std::error::Error>> {
//! let subscriber = client.subscriber().start();
//! subscriber.subscribe(["lobby"], [] as [&str; 0]).await?;
//!
//! while let Ok(event) = subscriber.events().recv_async().await {
//!     if let SubscribeEvent::Message(envelope) = event {
//!         println!("{}: {}", envelope.channel, envelope.payload);
//!     }
//! }
//! # Ok(()) }
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable};
use tokio_util::sync::CancellationToken;

use crate::operations::subscribe::{Cursor, Envelope};
use crate::{Error, PubSubClient};

mod retry;
mod worker;

pub use retry::RetryPolicy;

const COMMAND_CAPACITY: usize = 16;
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Something the subscribe loop reports.
#[derive(Debug)]
pub enum SubscribeEvent {
    /// The first exchange after a subscription change succeeded.
    Connected {
        /// Channels now subscribed.
        channels: Vec<String>,
        /// Channel groups now subscribed.
        channel_groups: Vec<String>,
    },
    /// A delivered message, signal or presence event.
    Message(Envelope),
    /// An exchange failed and will be retried after `delay`.
    Reconnecting {
        /// Consecutive failures so far, starting at 1.
        attempt: u32,
        /// Wait before the next attempt.
        delay: Duration,
        /// The failure.
        error: Error,
    },
    /// Nothing is subscribed anymore. `error` is set when a failure ended the subscription.
    Disconnected {
        /// The failure that stopped the loop, if any.
        error: Option<Error>,
    },
}

#[derive(Debug)]
pub(crate) enum Command {
    Subscribe {
        channels: Vec<String>,
        channel_groups: Vec<String>,
    },
    Unsubscribe {
        channels: Vec<String>,
        channel_groups: Vec<String>,
    },
    UnsubscribeAll,
}

/// The background task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("pubsub/subscribe: the subscribe worker has stopped")]
pub struct WorkerStopped;

/// Configures a [`Subscriber`].
#[derive(Debug, Clone)]
#[must_use]
pub struct SubscriberBuilder {
    client: PubSubClient,
    retry: RetryPolicy,
    filter_expression: Option<String>,
    heartbeat: Option<u32>,
    cursor: Cursor,
    event_capacity: usize,
}

impl SubscriberBuilder {
    /// Back-off policy for failed exchanges.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
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

    /// Resume from a known position instead of "now".
    pub fn cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Capacity of the event queue. When it is full the loop waits for the consumer.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Spawn the background task. Must be called within a tokio runtime.
    pub fn start(self) -> Subscriber {
        let (command_tx, command_rx) = flume::bounded(COMMAND_CAPACITY);
        let (event_tx, event_rx) = flume::bounded(self.event_capacity);
        let (abort, registration) = AbortHandle::new_pair();
        let shutdown = CancellationToken::new();

        let worker = worker::Worker {
            client: self.client,
            commands: command_rx,
            events: event_tx,
            shutdown: shutdown.clone(),
            retry: self.retry,
            filter_expression: self.filter_expression,
            heartbeat: self.heartbeat,
            channels: BTreeSet::new(),
            channel_groups: BTreeSet::new(),
            cursor: self.cursor,
            connected: false,
            failures: 0,
        };
        tokio::spawn(Abortable::new(worker.run(), registration));

        Subscriber {
            commands: command_tx,
            events: event_rx,
            shutdown,
            abort,
        }
    }
}

/// Handle to a running subscribe loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct Subscriber {
    commands: flume::Sender<Command>,
    events: flume::Receiver<SubscribeEvent>,
    shutdown: CancellationToken,
    abort: AbortHandle,
}

impl Subscriber {
    /// Add channels and channel groups to the subscription.
    pub async fn subscribe<C, G>(&self, channels: C, channel_groups: G) -> Result<(), WorkerStopped>
    where
        C: IntoIterator,
        C::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        self.send(Command::Subscribe {
            channels: channels.into_iter().map(Into::into).collect(),
            channel_groups: channel_groups.into_iter().map(Into::into).collect(),
        })
        .await
    }

    /// Remove channels and channel groups from the subscription.
    pub async fn unsubscribe<C, G>(&self, channels: C, channel_groups: G) -> Result<(), WorkerStopped>
    where
        C: IntoIterator,
        C::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        self.send(Command::Unsubscribe {
            channels: channels.into_iter().map(Into::into).collect(),
            channel_groups: channel_groups.into_iter().map(Into::into).collect(),
        })
        .await
    }

    /// Drop every subscription. The loop stays alive, idle, waiting for new commands.
    pub async fn unsubscribe_all(&self) -> Result<(), WorkerStopped> {
        self.send(Command::UnsubscribeAll).await
    }

    /// Receiver of loop events. Clones share one queue.
    pub fn events(&self) -> &flume::Receiver<SubscribeEvent> {
        &self.events
    }

    /// Stop the loop and cancel the in-flight exchange. Same as dropping the handle.
    pub fn stop(&self) {
        self.shutdown.cancel();
        self.abort.abort();
    }

    async fn send(&self, command: Command) -> Result<(), WorkerStopped> {
        if self.shutdown.is_cancelled() {
            return Err(WorkerStopped);
        }
        self.commands
            .send_async(command)
            .await
            .map_err(|_disconnected| WorkerStopped)
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        // Stop background polling immediately.
        self.stop();
    }
}

impl PubSubClient {
    /// Configure a perpetual subscribe loop.
    pub fn subscriber(&self) -> SubscriberBuilder {
        SubscriberBuilder {
            client: self.clone(),
            retry: RetryPolicy::default(),
            filter_expression: None,
            heartbeat: None,
            cursor: Cursor::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::TransportError;
    use crate::testing::{MockTransport, client_with};

    const NONE: [&str; 0] = [];

    async fn next_event(subscriber: &Subscriber) -> SubscribeEvent {
        tokio::time::timeout(Duration::from_secs(5), subscriber.events().recv_async())
            .await
            .expect("no event within 5s")
            .expect("event channel closed")
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn within<F: Future>(future: F) -> tokio::time::Timeout<F> {
        tokio::time::timeout(Duration::from_secs(5), future)
    }

    #[tokio::test]
    async fn delivers_messages_and_advances_cursor() {
        let transport = Arc::new(MockTransport::new());
        transport
            .respond(200, r#"{"t":{"t":"100","r":4},"m":[]}"#)
            .respond(
                200,
                r#"{"t":{"t":"200","r":4},"m":[{"c":"lobby","d":"hi","p":{"t":"150","r":4}}]}"#,
            );
        let client = client_with(&transport);

        let subscriber = client.subscriber().start();
        subscriber.subscribe(["lobby"], NONE).await.unwrap();

        match next_event(&subscriber).await {
            SubscribeEvent::Connected { channels, .. } => assert_eq!(channels, vec!["lobby"]),
            other => panic!("unexpected {other:?}"),
        }
        match next_event(&subscriber).await {
            SubscribeEvent::Message(envelope) => {
                assert_eq!(envelope.payload, "hi");
                assert_eq!(envelope.timetoken, 150);
            }
            other => panic!("unexpected {other:?}"),
        }

        eventually(|| transport.calls() == 3).await;
        let requests = transport.requests();
        assert_eq!(requests[0].query_param("tt").as_deref(), Some("0"));
        assert_eq!(requests[1].query_param("tt").as_deref(), Some("100"));
        assert_eq!(requests[1].query_param("tr").as_deref(), Some("4"));
        assert_eq!(requests[2].query_param("tt").as_deref(), Some("200"));
    }

    #[tokio::test]
    async fn new_subscription_replaces_in_flight_exchange() {
        let transport = Arc::new(MockTransport::new());
        let client = client_with(&transport);

        let subscriber = client.subscriber().start();
        subscriber.subscribe(["a"], NONE).await.unwrap();
        eventually(|| transport.calls() == 1).await;

        subscriber.subscribe(["b"], ["group"]).await.unwrap();
        eventually(|| transport.calls() == 2).await;

        assert_eq!(transport.max_in_flight(), 1);
        assert_eq!(transport.in_flight(), 1);
        let last = transport.last_request();
        assert_eq!(last.url.path(), "/v2/subscribe/sub-key/a,b/0");
        assert_eq!(last.query_param("channel-group").as_deref(), Some("group"));
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_are_retried_with_back_off() {
        let transport = Arc::new(MockTransport::new());
        transport
            .fail(TransportError::Connect("refused".into()))
            .fail(TransportError::Connect("refused".into()))
            .respond(200, r#"{"t":{"t":"1","r":1},"m":[]}"#);
        let client = client_with(&transport);

        let subscriber = client
            .subscriber()
            .retry_policy(RetryPolicy::new(
                Duration::from_millis(100),
                Duration::from_secs(1),
            ))
            .start();
        subscriber.subscribe(["lobby"], NONE).await.unwrap();

        match next_event(&subscriber).await {
            SubscribeEvent::Reconnecting { attempt, delay, .. } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_millis(100));
            }
            other => panic!("unexpected {other:?}"),
        }
        match next_event(&subscriber).await {
            SubscribeEvent::Reconnecting { attempt, delay, .. } => {
                assert_eq!(attempt, 2);
                assert_eq!(delay, Duration::from_millis(200));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            next_event(&subscriber).await,
            SubscribeEvent::Connected { .. }
        ));
    }

    #[tokio::test]
    async fn access_denied_ends_the_subscription() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            403,
            r#"{"message":"Forbidden","error":true,"service":"Access Manager","status":403}"#,
        );
        let client = client_with(&transport);

        let subscriber = client.subscriber().start();
        subscriber.subscribe(["secret"], NONE).await.unwrap();

        match next_event(&subscriber).await {
            SubscribeEvent::Disconnected { error: Some(error) } => {
                assert_eq!(error.service_message(), Some("Forbidden"));
            }
            other => panic!("unexpected {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn error_flag_in_success_body_ends_the_subscription() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(200, r#"{"error":true,"message":"Quota exceeded"}"#);
        let client = client_with(&transport);

        let subscriber = client.subscriber().start();
        subscriber.subscribe(["lobby"], NONE).await.unwrap();

        match next_event(&subscriber).await {
            SubscribeEvent::Disconnected { error: Some(error) } => {
                assert_eq!(error.service_message(), Some("Quota exceeded"));
            }
            other => panic!("unexpected {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_all_goes_idle() {
        let transport = Arc::new(MockTransport::new());
        let client = client_with(&transport);

        let subscriber = client.subscriber().start();
        subscriber.subscribe(["a"], NONE).await.unwrap();
        eventually(|| transport.calls() == 1).await;

        subscriber.unsubscribe_all().await.unwrap();
        assert!(matches!(
            next_event(&subscriber).await,
            SubscribeEvent::Disconnected { error: None }
        ));
        eventually(|| transport.in_flight() == 0).await;
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels_the_exchange() {
        let transport = Arc::new(MockTransport::new());
        let client = client_with(&transport);

        let subscriber = client.subscriber().start();
        subscriber.subscribe(["a"], NONE).await.unwrap();
        eventually(|| transport.in_flight() == 1).await;

        drop(subscriber);
        within(eventually(|| transport.in_flight() == 0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn commands_fail_after_stop() {
        let transport = Arc::new(MockTransport::new());
        let client = client_with(&transport);

        let subscriber = client.subscriber().start();
        subscriber.stop();
        assert_eq!(
            subscriber.subscribe(["a"], NONE).await,
            Err(WorkerStopped)
        );
    }
}
