//! Topic and consumer-group administration.

use crate::config::KafkaConfig;
use anyhow::{anyhow, Context, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::RDKafkaErrorCode;

pub struct LogAdmin {
    admin: AdminClient<DefaultClientContext>,
    config: KafkaConfig,
}

impl LogAdmin {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let admin = config
            .base_client()
            .create()
            .context("create kafka admin client")?;
        Ok(Self {
            admin,
            config: config.clone(),
        })
    }

    /// Create the topic with the configured partition count, replication
    /// factor, and retention. Already-exists is not an error: startup runs
    /// this unconditionally.
    pub async fn create_topic(&self) -> Result<()> {
        let topic = NewTopic::new(
            &self.config.topic,
            self.config.num_partitions,
            TopicReplication::Fixed(self.config.replication_factor),
        )
        .set("retention.ms", &self.config.retention);

        tracing::info!(topic = %self.config.topic, "creating topic");
        let results = self
            .admin
            .create_topics([&topic], &AdminOptions::new())
            .await
            .context("create topic request")?;
        for result in results {
            match result {
                Ok(name) => tracing::info!(topic = %name, "topic created"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    tracing::info!(topic = %name, "topic already exists");
                }
                Err((name, code)) => {
                    return Err(anyhow!("creating topic {name} failed: {code}"));
                }
            }
        }
        Ok(())
    }

    /// Delete the topic; absence is not an error (reset is re-runnable).
    pub async fn delete_topic(&self) -> Result<()> {
        tracing::warn!(topic = %self.config.topic, "removing topic");
        let results = self
            .admin
            .delete_topics(&[&self.config.topic], &AdminOptions::new())
            .await
            .context("delete topic request")?;
        for result in results {
            match result {
                Ok(name) => tracing::warn!(topic = %name, "topic removed"),
                Err((name, RDKafkaErrorCode::UnknownTopicOrPartition)) => {
                    tracing::warn!(topic = %name, "topic does not exist");
                }
                Err((name, code)) => {
                    return Err(anyhow!("deleting topic {name} failed: {code}"));
                }
            }
        }
        Ok(())
    }

    /// Delete the consumer group so a subsequent serve starts from the
    /// oldest record; absence is not an error.
    pub async fn delete_consumer_group(&self) -> Result<()> {
        let group = self.config.consumer_group.as_str();
        tracing::info!(consumer_group = group, "deleting consumer group");
        let results = self
            .admin
            .delete_groups(&[group], &AdminOptions::new())
            .await
            .context("delete consumer group request")?;
        for result in results {
            match result {
                Ok(name) => tracing::info!(consumer_group = %name, "consumer group deleted"),
                Err((name, RDKafkaErrorCode::GroupIdNotFound)) => {
                    tracing::info!(consumer_group = %name, "no such consumer group");
                }
                Err((name, code)) => {
                    return Err(anyhow!("deleting consumer group {name} failed: {code}"));
                }
            }
        }
        Ok(())
    }
}
