//! The caught-up barrier: committed group offsets vs partition high water
//! marks.
//!
//! Used by the serve path to delay opening HTTP traffic until projections
//! have folded the whole log, and by tests after each mutation to get
//! read-after-write semantics across the asynchronous log.

use crate::config::KafkaConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::util::Timeout;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// The barrier predicate, separated from the polling loop so it can be
/// tested exhaustively.
///
/// `committed[p]` is `None` while the group has never committed partition p.
/// Caught up iff:
/// - every high water mark is zero (empty topic), or
/// - at least one partition has a committed offset, and every partition
///   that has one is exactly at its high water mark.
///
/// Partitions without a committed offset are skipped rather than failed:
/// a key-skewed topic may legitimately never assign records to them.
pub fn is_caught_up(high: &[i64], committed: &[Option<i64>]) -> bool {
    debug_assert_eq!(high.len(), committed.len());
    if high.iter().all(|&mark| mark == 0) {
        return true;
    }
    let mut any_initialized = false;
    for (mark, current) in high.iter().zip(committed) {
        if let Some(current) = current {
            any_initialized = true;
            if current != mark {
                return false;
            }
        }
    }
    any_initialized
}

/// Poll every `check_interval` until the consumer group has processed every
/// record in the topic, or until cancelled.
pub async fn wait_for_caught_up(
    config: &KafkaConfig,
    check_interval: Duration,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    // A bare consumer in the same group: never subscribes, only asks the
    // brokers about watermarks and the group's committed positions.
    let consumer: StreamConsumer = config.consumer_client().create()?;

    loop {
        tracing::info!("checking whether committed offsets reached the high water marks");
        match snapshot_offsets(&consumer, config) {
            Ok((high, committed)) => {
                if is_caught_up(&high, &committed) {
                    tracing::info!("all events processed");
                    return Ok(());
                }
                tracing::info!(?high, ?committed, "not caught up yet");
            }
            Err(err) => {
                tracing::warn!(error = %err, "offset check failed, will retry");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("barrier cancelled");
                return Ok(());
            }
            _ = tokio::time::sleep(check_interval) => {}
        }
    }
}

fn snapshot_offsets(
    consumer: &StreamConsumer,
    config: &KafkaConfig,
) -> anyhow::Result<(Vec<i64>, Vec<Option<i64>>)> {
    let mut high = Vec::with_capacity(config.num_partitions as usize);
    let mut list = TopicPartitionList::new();
    for partition in 0..config.num_partitions {
        let (_low, mark) =
            consumer.fetch_watermarks(&config.topic, partition, Timeout::After(METADATA_TIMEOUT))?;
        high.push(mark);
        list.add_partition(&config.topic, partition);
    }

    let committed = consumer.committed_offsets(list, Timeout::After(METADATA_TIMEOUT))?;
    let mut current = vec![None; config.num_partitions as usize];
    for element in committed.elements() {
        if let Offset::Offset(offset) = element.offset() {
            if let Some(slot) = current.get_mut(element.partition() as usize) {
                *slot = Some(offset);
            }
        }
    }
    Ok((high, current))
}
