//! The single task that owns the subscribe loop.

use std::collections::BTreeSet;

use tokio_util::sync::CancellationToken;

use super::{Command, RetryPolicy, SubscribeEvent};
use crate::endpoint::status::{ExecutionResult, StatusCategory};
use crate::macros::sdk_log;
use crate::operations::subscribe::{Cursor, SubscribeResult};
use crate::{Context, Error, PubSubClient};

/// What interrupted a wait.
enum Wake {
    Command(Command),
    Polled(Box<ExecutionResult<SubscribeResult>>),
    Elapsed,
    Stop,
}

pub(super) struct Worker {
    pub(super) client: PubSubClient,
    pub(super) commands: flume::Receiver<Command>,
    pub(super) events: flume::Sender<SubscribeEvent>,
    pub(super) shutdown: CancellationToken,
    pub(super) retry: RetryPolicy,
    pub(super) filter_expression: Option<String>,
    pub(super) heartbeat: Option<u32>,
    pub(super) channels: BTreeSet<String>,
    pub(super) channel_groups: BTreeSet<String>,
    pub(super) cursor: Cursor,
    pub(super) connected: bool,
    pub(super) failures: u32,
}

impl Worker {
    /// Runs until shutdown or until every [`super::Subscriber`] handle is gone.
    pub(super) async fn run(mut self) {
        loop {
            let wake = if self.is_idle() {
                self.next_command().await
            } else {
                self.poll_once().await
            };

            match wake {
                Wake::Stop => return,
                Wake::Command(command) => self.apply(command).await,
                Wake::Polled(result) => {
                    if !self.handle(*result).await {
                        return;
                    }
                }
                Wake::Elapsed => {}
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.channels.is_empty() && self.channel_groups.is_empty()
    }

    async fn next_command(&self) -> Wake {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Wake::Stop,
            command = self.commands.recv_async() => match command {
                Ok(command) => Wake::Command(command),
                Err(_) => Wake::Stop,
            },
        }
    }

    /// One exchange, abandoned as soon as a command arrives. At most one is ever in flight:
    /// the losing branch is dropped before the next iteration builds a new request.
    async fn poll_once(&self) -> Wake {
        let mut request = self
            .client
            .subscribe()
            .channels(self.channels.iter().cloned())
            .channel_groups(self.channel_groups.iter().cloned())
            .cursor(self.cursor)
            .context(Context::from_token(self.shutdown.child_token()));
        if let Some(expression) = &self.filter_expression {
            request = request.filter_expression(expression.as_str());
        }
        if let Some(heartbeat) = self.heartbeat {
            request = request.heartbeat(heartbeat);
        }

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Wake::Stop,
            command = self.commands.recv_async() => match command {
                Ok(command) => Wake::Command(command),
                Err(_) => Wake::Stop,
            },
            result = request.execute() => Wake::Polled(Box::new(result)),
        }
    }

    async fn apply(&mut self, command: Command) {
        let was_idle = self.is_idle();
        match command {
            Command::Subscribe {
                channels,
                channel_groups,
            } => {
                self.channels.extend(channels);
                self.channel_groups.extend(channel_groups);
            }
            Command::Unsubscribe {
                channels,
                channel_groups,
            } => {
                for channel in &channels {
                    self.channels.remove(channel);
                }
                for group in &channel_groups {
                    self.channel_groups.remove(group);
                }
            }
            Command::UnsubscribeAll => {
                self.channels.clear();
                self.channel_groups.clear();
            }
        }

        self.connected = false;
        self.failures = 0;
        if self.is_idle() {
            self.cursor = Cursor::default();
            if !was_idle {
                self.emit(SubscribeEvent::Disconnected { error: None }).await;
            }
        }
    }

    /// Returns `false` when the worker must stop.
    async fn handle(&mut self, result: ExecutionResult<SubscribeResult>) -> bool {
        let failed = match result {
            Ok(executed) => {
                self.failures = 0;
                self.cursor = executed.response.cursor;
                if !self.connected {
                    self.connected = true;
                    let event = SubscribeEvent::Connected {
                        channels: self.channels.iter().cloned().collect(),
                        channel_groups: self.channel_groups.iter().cloned().collect(),
                    };
                    if !self.emit(event).await {
                        return false;
                    }
                }
                for envelope in executed.response.messages {
                    if !self.emit(SubscribeEvent::Message(envelope)).await {
                        return false;
                    }
                }
                return true;
            }
            Err(failed) => failed,
        };

        match failed.status.category {
            // The service held the request longer than our budget; just ask again.
            StatusCategory::Timeout => true,
            StatusCategory::Cancelled => false,
            StatusCategory::BadRequest | StatusCategory::AccessDenied => {
                sdk_log!(warn, "subscribe stopped: {}", failed.error);
                self.stop_subscriptions(failed.error).await
            }
            // The service answered and refused; asking again will not change that.
            _ if is_rejection(&failed.error) => {
                sdk_log!(warn, "subscribe rejected: {}", failed.error);
                self.stop_subscriptions(failed.error).await
            }
            _ => {
                self.connected = false;
                if !self.retry.allows(self.failures) {
                    sdk_log!(warn, "subscribe giving up after {} attempts", self.failures);
                    return self.stop_subscriptions(failed.error).await;
                }

                let delay = self.retry.delay_for_attempt(self.failures, None);
                self.failures += 1;
                sdk_log!(
                    warn,
                    "subscribe attempt {} failed, retrying in {delay:?}: {}",
                    self.failures,
                    failed.error
                );
                let event = SubscribeEvent::Reconnecting {
                    attempt: self.failures,
                    delay,
                    error: failed.error,
                };
                if !self.emit(event).await {
                    return false;
                }

                match self.back_off(delay).await {
                    Wake::Stop => false,
                    Wake::Command(command) => {
                        self.apply(command).await;
                        true
                    }
                    Wake::Polled(_) | Wake::Elapsed => true,
                }
            }
        }
    }

    async fn back_off(&self, delay: std::time::Duration) -> Wake {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Wake::Stop,
            command = self.commands.recv_async() => match command {
                Ok(command) => Wake::Command(command),
                Err(_) => Wake::Stop,
            },
            () = tokio::time::sleep(delay) => Wake::Elapsed,
        }
    }

    async fn stop_subscriptions(&mut self, error: Error) -> bool {
        self.channels.clear();
        self.channel_groups.clear();
        self.cursor = Cursor::default();
        self.connected = false;
        self.failures = 0;
        self.emit(SubscribeEvent::Disconnected { error: Some(error) })
            .await
    }

    /// Deliver an event. Returns `false` on shutdown. A dropped receiver is not an error:
    /// the caller may only care about issuing commands.
    async fn emit(&self, event: SubscribeEvent) -> bool {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => false,
            _ = self.events.send_async(event) => true,
        }
    }
}

/// A successful exchange whose body reports an error.
fn is_rejection(error: &Error) -> bool {
    matches!(
        error,
        Error::ApiStatus {
            status: 200..=299,
            ..
        }
    )
}
