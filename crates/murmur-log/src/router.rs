//! The projection engine: one consumer group, per-name handler dispatch.

use crate::config::KafkaConfig;
use crate::trace;
use async_trait::async_trait;
use murmur_events::{headers, Event};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// A projection handler for exactly one event name.
///
/// Contract: at-least-once delivery, so `handle` must be idempotent; it
/// should open one SQL transaction per event. Returning an error triggers
/// in-place redelivery after `nackResendSleep` and blocks the partition
/// until the handler succeeds.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// The event name this handler is registered for.
    fn event_name(&self) -> &'static str;

    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Registry mapping event names to their single handler.
#[derive(Default)]
pub struct HandlerGroup {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl HandlerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Double registration for a name is a wiring bug
    /// in the composition root and panics at startup, not at dispatch time.
    pub fn register(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let name = handler.event_name();
        let previous = self.handlers.insert(name, handler);
        assert!(previous.is_none(), "duplicate handler for event {name}");
        self
    }

    fn get(&self, name: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Subscribes to the topic in the configured consumer group and routes
/// each record to the handler registered for its `name` header.
///
/// Offsets are stored only after the handler succeeds and are flushed by
/// auto-commit, bounding post-crash replay to one commit interval. Records
/// within a partition are processed strictly in order; partitions are
/// independent.
pub struct ProjectionRouter {
    consumer: StreamConsumer,
    handlers: HandlerGroup,
    topic: String,
    nack_resend_sleep: Duration,
    reconnect_retry_sleep: Duration,
    sleep_before_event: Duration,
}

impl ProjectionRouter {
    pub fn new(
        config: &KafkaConfig,
        handlers: HandlerGroup,
        sleep_before_event: Duration,
    ) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = config.consumer_client().create()?;
        Ok(Self {
            consumer,
            handlers,
            topic: config.topic.clone(),
            nack_resend_sleep: config.nack_resend_sleep(),
            reconnect_retry_sleep: config.reconnect_retry_sleep(),
            sleep_before_event,
        })
    }

    /// Consume until cancelled, then commit the stored offsets and return.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        self.consumer.subscribe(&[&self.topic])?;
        tracing::info!(topic = %self.topic, handlers = self.handlers.len(), "projection router started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.consumer.recv() => match received {
                    Ok(message) => self.process(&message, &cancel).await,
                    Err(err) => {
                        tracing::warn!(error = %err, "consumer receive failed");
                        tokio::time::sleep(self.reconnect_retry_sleep).await;
                    }
                },
            }
        }

        tracing::info!("projection router stopping, committing offsets");
        if let Err(err) = self.consumer.commit_consumer_state(CommitMode::Sync) {
            // NoOffset just means nothing new was stored since the last tick.
            tracing::debug!(error = %err, "final offset commit");
        }
        Ok(())
    }

    /// Handle one record. Never returns an error: a failing handler is
    /// retried here forever (with sleeps) because skipping would corrupt
    /// the read models, and there is no poison-message path by design.
    async fn process(&self, message: &BorrowedMessage<'_>, cancel: &CancellationToken) {
        if !self.sleep_before_event.is_zero() {
            tokio::time::sleep(self.sleep_before_event).await;
        }

        let header_map = header_map(message);
        let Some(name) = header_map.get(headers::NAME).cloned() else {
            tracing::warn!(
                partition = message.partition(),
                offset = message.offset(),
                "record without a name header, skipping"
            );
            self.ack(message);
            return;
        };

        let parent = trace::extract_context(&header_map);
        let span = tracing::info_span!(
            "event.process",
            name = %name,
            partition = message.partition(),
            offset = message.offset()
        );
        tracing_opentelemetry::OpenTelemetrySpanExt::set_parent(&span, parent);

        async {
            let payload = message.payload().unwrap_or_default();
            loop {
                match self.dispatch(&name, payload).await {
                    Ok(handled) => {
                        if handled {
                            metrics::counter!("murmur_events_handled_total", "name" => name.clone())
                                .increment(1);
                        }
                        self.ack(message);
                        return;
                    }
                    Err(err) => {
                        tracing::warn!(error = %format!("{err:#}"), "handler failed, redelivering");
                        metrics::counter!("murmur_handler_retries_total", "name" => name.clone())
                            .increment(1);
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(self.nack_resend_sleep) => {}
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    }

    /// Decode and run the registered handler. `Ok(false)` means the record
    /// was valid but nothing is registered for it (acked and skipped).
    async fn dispatch(&self, name: &str, payload: &[u8]) -> anyhow::Result<bool> {
        let Some(event) = Event::decode(name, payload)? else {
            tracing::debug!(name, "event not in catalogue, skipping");
            return Ok(false);
        };
        let Some(handler) = self.handlers.get(name) else {
            tracing::debug!(name, "no handler registered, skipping");
            return Ok(false);
        };
        handler.handle(&event).await?;
        Ok(true)
    }

    fn ack(&self, message: &BorrowedMessage<'_>) {
        if let Err(err) = self.consumer.store_offset_from_message(message) {
            tracing::warn!(error = %err, "storing offset failed");
        }
    }
}

fn header_map(message: &BorrowedMessage<'_>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(record_headers) = message.headers() {
        for header in record_headers.iter() {
            if let Some(value) = header.value {
                map.insert(
                    header.key.to_string(),
                    String::from_utf8_lossy(value).into_owned(),
                );
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullHandler(&'static str);

    #[async_trait]
    impl EventHandler for NullHandler {
        fn event_name(&self) -> &'static str {
            self.0
        }

        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn register_and_lookup_by_name() {
        let group = HandlerGroup::new()
            .register(Arc::new(NullHandler("ChatCreated")))
            .register(Arc::new(NullHandler("MessageCreated")));
        assert_eq!(group.len(), 2);
        assert!(group.get("ChatCreated").is_some());
        assert!(group.get("ChatDeleted").is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate handler")]
    fn duplicate_registration_panics() {
        let _ = HandlerGroup::new()
            .register(Arc::new(NullHandler("ChatCreated")))
            .register(Arc::new(NullHandler("ChatCreated")));
    }
}
