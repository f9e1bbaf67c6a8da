use rdkafka::config::ClientConfig;
use serde::Deserialize;
use std::time::Duration;

// Duration-valued keys are integer milliseconds in the config file; the
// struct fields carry the unit in their name, the serde renames keep the
// documented key spelling.

/// The `kafka.*` configuration tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KafkaConfig {
    pub bootstrap_servers: Vec<String>,
    pub topic: String,
    pub num_partitions: i32,
    pub replication_factor: i32,
    /// Value for the topic's `retention.ms`, kept as a string so `-1`
    /// (unlimited) and plain millis both pass through untouched.
    pub retention: String,
    pub consumer_group: String,
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProducerConfig {
    pub retry_max: u32,
    pub return_success: bool,
    #[serde(rename = "retryBackoff")]
    pub retry_backoff_ms: u64,
    pub client_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsumerConfig {
    pub return_errors: bool,
    pub client_id: String,
    #[serde(rename = "nackResendSleep")]
    pub nack_resend_sleep_ms: u64,
    #[serde(rename = "reconnectRetrySleep")]
    pub reconnect_retry_sleep_ms: u64,
    #[serde(rename = "offsetCommitInterval")]
    pub offset_commit_interval_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: vec!["localhost:9092".to_string()],
            topic: "chat-events".to_string(),
            num_partitions: 4,
            replication_factor: 1,
            retention: "-1".to_string(),
            consumer_group: "chat-projections".to_string(),
            producer: ProducerConfig::default(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            retry_max: 10,
            return_success: true,
            retry_backoff_ms: 100,
            client_id: "murmur-producer".to_string(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            return_errors: true,
            client_id: "murmur-consumer".to_string(),
            nack_resend_sleep_ms: 1_000,
            reconnect_retry_sleep_ms: 1_000,
            offset_commit_interval_ms: 1_000,
        }
    }
}

impl KafkaConfig {
    pub fn nack_resend_sleep(&self) -> Duration {
        Duration::from_millis(self.consumer.nack_resend_sleep_ms)
    }

    pub fn reconnect_retry_sleep(&self) -> Duration {
        Duration::from_millis(self.consumer.reconnect_retry_sleep_ms)
    }

    /// Base client settings shared by producer, consumer, and admin.
    pub(crate) fn base_client(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", self.bootstrap_servers.join(","));
        config
    }

    pub(crate) fn producer_client(&self) -> ClientConfig {
        let mut config = self.base_client();
        config
            .set("client.id", &self.producer.client_id)
            .set("retries", self.producer.retry_max.to_string())
            .set("retry.backoff.ms", self.producer.retry_backoff_ms.to_string())
            // The publish contract is "returns after the log acknowledged
            // durability"; all in-sync replicas must confirm.
            .set("acks", "all")
            .set("enable.idempotence", "true");
        config
    }

    pub(crate) fn consumer_client(&self) -> ClientConfig {
        let mut config = self.base_client();
        config
            .set("client.id", &self.consumer.client_id)
            .set("group.id", &self.consumer_group)
            // Start from the oldest record: required for replay after import.
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                self.consumer.offset_commit_interval_ms.to_string(),
            )
            // Offsets are stored by the router only after a handler
            // succeeds; auto-commit then flushes the stored positions.
            .set("enable.auto.offset.store", "false");
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = KafkaConfig::default();
        assert_eq!(config.bootstrap_servers, vec!["localhost:9092"]);
        assert_eq!(config.num_partitions, 4);
        assert_eq!(config.consumer.offset_commit_interval_ms, 1_000);
        assert_eq!(config.nack_resend_sleep(), Duration::from_millis(1_000));
    }

    #[test]
    fn deserializes_the_documented_key_spelling() {
        let yaml = r#"
bootstrapServers: ["kafka-1:9092", "kafka-2:9092"]
topic: events
numPartitions: 8
replicationFactor: 3
retention: "604800000"
consumerGroup: projections
producer:
  retryMax: 5
  returnSuccess: true
  retryBackoff: 250
  clientId: pub-1
consumer:
  returnErrors: true
  clientId: sub-1
  nackResendSleep: 500
  reconnectRetrySleep: 2000
  offsetCommitInterval: 3000
"#;
        let config: KafkaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.bootstrap_servers.len(), 2);
        assert_eq!(config.num_partitions, 8);
        assert_eq!(config.replication_factor, 3);
        assert_eq!(config.producer.retry_backoff_ms, 250);
        assert_eq!(config.consumer.nack_resend_sleep_ms, 500);
        assert_eq!(config.consumer.offset_commit_interval_ms, 3000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: KafkaConfig = serde_yaml::from_str("topic: only-topic").unwrap();
        assert_eq!(config.topic, "only-topic");
        assert_eq!(config.consumer_group, "chat-projections");
        assert_eq!(config.producer.retry_max, 10);
    }
}
