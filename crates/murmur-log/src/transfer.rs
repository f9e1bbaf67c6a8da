//! Export and import of the raw topic.
//!
//! Export writes one JSON line per record (see
//! [`murmur_events::ExportedRecord`]), scanning each partition from the
//! oldest record to the high water mark cached at start of scan. Import
//! republishes lines preserving key, value, headers, and partition; the
//! partition is what reproduces per-chat ordering on the target cluster.

use crate::config::KafkaConfig;
use anyhow::{anyhow, Context, Result};
use murmur_events::{ExportedRecord, RecordMetadata};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::util::Timeout;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::time::Duration;

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Magic file names routing export/import through the standard streams.
const STDOUT: &str = "stdout";
const STDIN: &str = "stdin";

pub async fn export(config: &KafkaConfig, file: &str) -> Result<()> {
    // A scratch group id: the scan must not move the projection group's
    // committed offsets.
    let mut client = config.base_client();
    client
        .set("group.id", format!("{}-export", config.consumer_group))
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest");
    let consumer: StreamConsumer = client.create().context("create export consumer")?;

    let mut writer: Box<dyn Write> = if file == STDOUT {
        Box::new(std::io::stdout())
    } else {
        Box::new(BufWriter::new(
            File::create(file).with_context(|| format!("create export file {file}"))?,
        ))
    };

    for partition in 0..config.num_partitions {
        let (_low, high) = consumer
            .fetch_watermarks(&config.topic, partition, Timeout::After(METADATA_TIMEOUT))
            .with_context(|| format!("fetch watermarks for partition {partition}"))?;
        if high == 0 {
            tracing::info!(partition, "skipping empty partition");
            continue;
        }

        tracing::info!(partition, high, "reading partition");
        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(&config.topic, partition, Offset::Beginning)
            .context("build partition assignment")?;
        consumer
            .assign(&assignment)
            .context("assign export partition")?;

        loop {
            let message = consumer.recv().await.context("read record")?;
            let record = ExportedRecord {
                metadata: RecordMetadata {
                    offset: message.offset(),
                    partition: message.partition(),
                },
                headers: header_map(message.headers()),
                key: String::from_utf8_lossy(message.key().unwrap_or_default()).into_owned(),
                value: serde_json::from_slice(message.payload().unwrap_or_default())
                    .context("record value is not JSON")?,
            };
            writeln!(writer, "{}", record.to_line()?)?;

            if message.offset() >= high - 1 {
                tracing::info!(partition, "reached high water mark");
                break;
            }
        }
    }
    writer.flush()?;
    tracing::info!("export finished");
    Ok(())
}

pub async fn import(config: &KafkaConfig, file: &str) -> Result<()> {
    let producer: FutureProducer = config
        .producer_client()
        .create()
        .context("create import producer")?;

    let reader: Box<dyn Read> = if file == STDIN {
        Box::new(std::io::stdin())
    } else {
        Box::new(File::open(file).with_context(|| format!("open import file {file}"))?)
    };

    let mut imported = 0u64;
    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.with_context(|| format!("read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = ExportedRecord::from_line(&line)
            .with_context(|| format!("parse line {}", index + 1))?;

        let mut record_headers = OwnedHeaders::new();
        for (name, value) in &record.headers {
            record_headers = record_headers.insert(Header {
                key: name,
                value: Some(value.as_bytes()),
            });
        }

        let payload = serde_json::to_vec(&record.value)?;
        let future_record = FutureRecord::to(&config.topic)
            .partition(record.metadata.partition)
            .key(&record.key)
            .payload(&payload)
            .headers(record_headers);

        producer
            .send(future_record, Timeout::Never)
            .await
            .map_err(|(err, _)| anyhow!("send record from line {}: {err}", index + 1))?;
        imported += 1;
    }

    tracing::info!(records = imported, "import finished");
    Ok(())
}

fn header_map(record_headers: Option<&rdkafka::message::BorrowedHeaders>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(record_headers) = record_headers {
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
