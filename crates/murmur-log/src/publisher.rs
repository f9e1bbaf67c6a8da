//! The event bus: serialize, stamp metadata, publish on the derived partition.

use crate::config::KafkaConfig;
use crate::trace;
use async_trait::async_trait;
use murmur_events::{headers, Event};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::collections::BTreeMap;
use thiserror::Error;

/// Publish failure taxonomy. `Transient` is worth retrying at a higher
/// level (the producer itself already retried per its config); `Fatal`
/// means the record can never be delivered as-is.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("transient log error: {0}")]
    Transient(#[source] KafkaError),
    #[error("fatal log error: {0}")]
    Fatal(#[source] KafkaError),
    #[error("event could not be serialized: {0}")]
    Encode(#[from] serde_json::Error),
}

fn classify(err: KafkaError) -> PublishError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::QueueFull
            | RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::NotEnoughReplicas
            | RDKafkaErrorCode::OperationTimedOut,
        ) => PublishError::Transient(err),
        _ => PublishError::Fatal(err),
    }
}

/// Seam between the command layer and the log. Commands publish through
/// this trait so that decomposition can be unit tested against a recording
/// implementation.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Returns only after the log has acknowledged durability.
    async fn publish(&self, event: &Event) -> Result<(), PublishError>;
}

/// Kafka-backed [`EventPublisher`].
pub struct KafkaEventBus {
    producer: FutureProducer,
    topic: String,
}

impl KafkaEventBus {
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        let producer: FutureProducer = config.producer_client().create()?;
        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }

    /// Flush pending deliveries; part of ordered shutdown.
    pub fn close(&self) {
        use rdkafka::producer::Producer;
        let _ = self.producer.flush(Timeout::After(std::time::Duration::from_secs(10)));
    }
}

#[async_trait]
impl EventPublisher for KafkaEventBus {
    async fn publish(&self, event: &Event) -> Result<(), PublishError> {
        let payload = event.encode()?;
        let key = event.partition_key();

        let mut header_map = BTreeMap::new();
        header_map.insert(headers::NAME.to_string(), event.name().to_string());
        header_map.insert(
            headers::CREATED_AT.to_string(),
            event.created_at().to_rfc3339(),
        );
        trace::inject_current_context(&mut header_map);

        let mut record_headers = OwnedHeaders::new();
        for (name, value) in &header_map {
            record_headers = record_headers.insert(Header {
                key: name,
                value: Some(value.as_bytes()),
            });
        }

        let record = FutureRecord::to(&self.topic)
            .key(&key)
            .payload(&payload)
            .headers(record_headers);

        match self.producer.send(record, Timeout::Never).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    name = event.name(),
                    key = %key,
                    partition,
                    offset,
                    "event published"
                );
                metrics::counter!("murmur_events_published_total", "name" => event.name())
                    .increment(1);
                Ok(())
            }
            Err((err, _unsent)) => Err(classify(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_transport_failures_are_transient() {
        let err = KafkaError::MessageProduction(RDKafkaErrorCode::BrokerTransportFailure);
        assert!(matches!(classify(err), PublishError::Transient(_)));
    }

    #[test]
    fn unknown_topic_is_fatal() {
        let err = KafkaError::MessageProduction(RDKafkaErrorCode::UnknownTopicOrPartition);
        assert!(matches!(classify(err), PublishError::Fatal(_)));
    }
}
