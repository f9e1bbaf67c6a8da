//! Composition roots, one per subcommand, plus the lifecycle manager that
//! tears components down in a fixed order: HTTP listener (drained by axum's
//! graceful shutdown) -> projection router (cancel, final offset commit) ->
//! producer -> clients.

use crate::api::{self, AppState};
use crate::bootstrap;
use crate::config::AppConfig;
use crate::ids;
use crate::observability;
use crate::projection::{handler_group, Projection};
use crate::queries::QueryService;
use crate::store;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use murmur_log::admin::LogAdmin;
use murmur_log::{barrier, transfer, EventPublisher, KafkaEventBus, ProjectionRouter};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SERVICE_NAME: &str = "murmur-chat";

/// Ordered stop hooks. Registration order is shutdown order.
#[derive(Default)]
pub struct Lifecycle {
    hooks: Vec<(&'static str, StopHook)>,
}

type StopHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_stop<F, Fut>(&mut self, name: &'static str, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.push((name, Box::new(move || Box::pin(hook()))));
    }

    pub async fn shutdown(self) {
        for (name, hook) in self.hooks {
            tracing::info!(component = name, "stopping");
            hook().await;
        }
    }
}

/// `serve`: migrations, topic creation, the projection router, the
/// caught-up barrier, sequence fast-forward, then HTTP.
pub async fn serve(config: AppConfig) -> Result<()> {
    let metrics = observability::init_observability(SERVICE_NAME, &config.logger, &config.otlp);
    tracing::info!("start serve command");

    let pool = store::connect(&config.postgresql).await?;
    store::run_migrations(&pool).await?;

    let admin = LogAdmin::new(&config.kafka)?;
    admin.create_topic().await?;

    ids::arm_fast_forward_latch(&pool)
        .await
        .context("arm fast-forward latch")?;

    let projection = Arc::new(Projection::new(
        pool.clone(),
        &config.projections.chat_user_view,
    ));
    let queries = Arc::new(QueryService::new(pool.clone()));
    let bus = Arc::new(KafkaEventBus::new(&config.kafka).context("create event bus")?);

    let cancel = CancellationToken::new();
    let router = Arc::new(
        ProjectionRouter::new(
            &config.kafka,
            handler_group(projection.clone()),
            config.sleep_before_event(),
        )
        .context("create projection router")?,
    );
    let router_task = tokio::spawn({
        let router = router.clone();
        let cancel = cancel.clone();
        async move { router.run(cancel).await }
    });

    // Serving reads before the projections have folded the whole log would
    // hand out stale or partial state; block here until caught up.
    barrier::wait_for_caught_up(
        &config.kafka,
        config.check_events_processed_interval(),
        &cancel,
    )
    .await?;

    bootstrap::run_sequence_fast_forward(&pool).await?;

    let state = AppState {
        bus: bus.clone() as Arc<dyn EventPublisher>,
        pool: pool.clone(),
        projection,
        queries,
        metrics,
    };
    let app = api::build_router(state);

    let mut lifecycle = Lifecycle::new();
    lifecycle.on_stop("projection-router", {
        let cancel = cancel.clone();
        move || async move {
            cancel.cancel();
            match router_task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(error = %format!("{err:#}"), "router exited with error"),
                Err(err) => tracing::error!(error = %err, "router task join failed"),
            }
        }
    });
    lifecycle.on_stop("event-bus", {
        let bus = bus.clone();
        move || async move {
            tokio::task::spawn_blocking(move || bus.close())
                .await
                .ok();
        }
    });
    lifecycle.on_stop("sql-pool", {
        let pool = pool.clone();
        move || async move { pool.close().await }
    });

    let listener = tokio::net::TcpListener::bind(&config.server.address)
        .await
        .with_context(|| format!("bind {}", config.server.address))?;
    tracing::info!(address = %config.server.address, "http server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    tracing::info!("http server drained");
    lifecycle.shutdown().await;
    tracing::info!("exit serve command");
    Ok(())
}

/// `export`: dump the raw topic to `cqrs.export.file`.
pub async fn export(config: AppConfig) -> Result<()> {
    observability::init_observability(SERVICE_NAME, &config.logger, &config.otlp);
    tracing::info!(file = %config.cqrs.export.file, "start export command");
    transfer::export(&config.kafka, &config.cqrs.export.file).await
}

/// `import`: republish a dump from `cqrs.import.file`, preserving
/// partitions. Bootstrap's fast-forward realigns the id sequences on the
/// next serve.
pub async fn import(config: AppConfig) -> Result<()> {
    observability::init_observability(SERVICE_NAME, &config.logger, &config.otlp);
    tracing::info!(file = %config.cqrs.import.file, "start import command");
    transfer::import(&config.kafka, &config.cqrs.import.file).await
}

/// `reset`: wipe the consumer group, the topic, and the schema, then
/// recreate the empty world and arm the fast-forward latch.
pub async fn reset(config: AppConfig) -> Result<()> {
    observability::init_observability(SERVICE_NAME, &config.logger, &config.otlp);
    tracing::info!("start reset command");

    let admin = LogAdmin::new(&config.kafka)?;
    admin.delete_consumer_group().await?;
    admin.delete_topic().await?;

    let pool = store::connect(&config.postgresql).await?;
    store::reset_schema(&pool).await?;
    store::run_migrations(&pool).await?;

    admin.create_topic().await?;

    ids::arm_fast_forward_latch(&pool)
        .await
        .context("arm fast-forward latch")?;

    pool.close().await;
    tracing::info!("exit reset command");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc as StdArc, Mutex};

    #[tokio::test]
    async fn lifecycle_runs_hooks_in_registration_order() {
        let order = StdArc::new(Mutex::new(Vec::new()));
        let mut lifecycle = Lifecycle::new();

        for name in ["http", "router", "producer"] {
            let order = order.clone();
            lifecycle.on_stop(name, move || async move {
                order.lock().unwrap().push(name);
            });
        }

        lifecycle.shutdown().await;
        assert_eq!(*order.lock().unwrap(), vec!["http", "router", "producer"]);
    }
}
