//! Kafka plumbing for murmur.
//!
//! # What this crate is
//! The log half of the system: everything that talks to Kafka. It owns
//!
//! - topic/consumer-group administration ([`admin::LogAdmin`]),
//! - the synchronous-from-the-caller publisher ([`publisher::KafkaEventBus`]),
//! - the single-consumer-group projection router that dispatches each record
//!   to the handler registered for its event name ([`router::ProjectionRouter`]),
//! - the caught-up barrier comparing committed offsets with partition high
//!   water marks ([`barrier`]),
//! - export/import of the raw topic ([`transfer`]).
//!
//! # What this crate is NOT
//! It knows nothing about SQL, read models, or HTTP. Handlers are injected
//! behind [`router::EventHandler`]; the service crate registers one handler
//! per event name.
//!
//! # Delivery model
//! At-least-once. Offsets are stored only after a handler returns `Ok` and
//! are committed on the auto-commit cadence, so a crash replays at most one
//! commit interval of records. Handlers must therefore be idempotent. A
//! failing handler is retried in place after `nackResendSleep`, blocking its
//! partition: there is deliberately no poison-message path, because skipping
//! an event would corrupt the read models forever while a retry merely
//! stalls them.

pub mod admin;
pub mod barrier;
pub mod config;
pub mod publisher;
pub mod router;
pub mod transfer;

mod trace;

pub use config::{ConsumerConfig, KafkaConfig, ProducerConfig};
pub use publisher::{EventPublisher, KafkaEventBus, PublishError};
pub use router::{EventHandler, HandlerGroup, ProjectionRouter};
