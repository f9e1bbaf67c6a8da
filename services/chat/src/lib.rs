//! Murmur chat service
//! -------------------
//! A chat and micro-blog backend built on CQRS with an append-only Kafka
//! log as the source of truth. HTTP writes become typed commands; the
//! command layer decomposes each command into one or more events published
//! to a partitioned topic; a consumer group of idempotent projection
//! handlers folds the topic into PostgreSQL read models; queries only ever
//! touch the read models.
//!
//! Module map:
//! - [`config`]        configuration tree (YAML + env overrides)
//! - [`observability`] tracing, OTLP export, Prometheus recorder
//! - [`store`]         PgPool construction, migrations, schema reset
//! - [`ids`]           chat id sequence + per-chat message id counter
//! - [`commands`]      command -> event decomposition and fan-out
//! - [`projection`]    read-model event handlers and their SQL
//! - [`queries`]       keyset-paginated read-side queries
//! - [`api`]           axum HTTP transport
//! - [`bootstrap`]     sequence fast-forward under the cluster lock
//! - [`app`]           composition roots, one per subcommand

pub mod api;
pub mod app;
pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod ids;
pub mod observability;
pub mod pagination;
pub mod projection;
pub mod queries;
pub mod store;
