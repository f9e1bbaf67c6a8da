use crate::config::{LoggerConfig, OtlpConfig};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace as sdktrace;
use opentelemetry_sdk::Resource;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static OBS_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing (fmt or JSON per `logger.json`), the OTLP exporter
/// when `otlp.endpoint` is set, W3C propagation, and the Prometheus
/// recorder. Safe to call more than once; only the first call wins, which
/// keeps test binaries that build several composition roots happy.
pub fn init_observability(
    service_name: &str,
    logger: &LoggerConfig,
    otlp: &OtlpConfig,
) -> PrometheusHandle {
    let logger = logger.clone();
    let otlp = otlp.clone();
    let service_name = service_name.to_string();
    OBS_INIT.get_or_init(move || {
        opentelemetry::global::set_text_map_propagator(
            opentelemetry_sdk::propagation::TraceContextPropagator::new(),
        );

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(logger.level.clone()));
        let registry = tracing_subscriber::registry().with(filter);

        let provider = build_tracer_provider(&service_name, &otlp);

        // The fmt layer flavor is decided once at startup; EnvFilter still
        // honors RUST_LOG at runtime restarts.
        if logger.json {
            let otel_layer = provider.map(|provider| {
                let tracer = provider.tracer(service_name.clone());
                tracing_opentelemetry::layer().with_tracer(tracer)
            });
            let fmt_layer = tracing_subscriber::fmt::layer().json();
            let _ = registry.with(fmt_layer).with(otel_layer).try_init();
        } else {
            let otel_layer = provider.map(|provider| {
                let tracer = provider.tracer(service_name.clone());
                tracing_opentelemetry::layer().with_tracer(tracer)
            });
            let fmt_layer = tracing_subscriber::fmt::layer();
            let _ = registry.with(fmt_layer).with(otel_layer).try_init();
        }
    });

    install_metrics_recorder()
}

fn build_tracer_provider(
    service_name: &str,
    otlp: &OtlpConfig,
) -> Option<sdktrace::TracerProvider> {
    if otlp.endpoint.is_empty() {
        return None;
    }
    let resource = Resource::new(resource_attributes(service_name));
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(otlp.endpoint.clone()),
        )
        .with_trace_config(sdktrace::Config::default().with_resource(resource))
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .ok()
}

fn resource_attributes(service_name: &str) -> Vec<KeyValue> {
    let mut attrs = vec![KeyValue::new("service.name", service_name.to_string())];
    if let Ok(value) =
        std::env::var("MURMUR_SERVICE_INSTANCE_ID").or_else(|_| std::env::var("HOSTNAME"))
    {
        attrs.push(KeyValue::new("service.instance.id", value));
    }
    if let Ok(value) = std::env::var("DEPLOYMENT_ENVIRONMENT") {
        attrs.push(KeyValue::new("deployment.environment", value));
    }
    attrs
}

/// Extract the caller's trace context from HTTP request headers.
pub fn trace_context_from_headers(headers: &axum::http::HeaderMap) -> opentelemetry::Context {
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderMapExtractor(headers))
    })
}

struct HeaderMapExtractor<'a>(&'a axum::http::HeaderMap);

impl Extractor for HeaderMapExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

fn install_metrics_recorder() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("install metrics recorder")
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn resource_attributes_carry_service_name() {
        let attrs = resource_attributes("murmur-chat");
        assert!(attrs
            .iter()
            .any(|kv| kv.key.as_str() == "service.name" && kv.value.to_string() == "murmur-chat"));
    }

    #[test]
    fn empty_endpoint_disables_the_exporter() {
        let otlp = OtlpConfig {
            endpoint: String::new(),
        };
        assert!(build_tracer_provider("murmur-chat", &otlp).is_none());
    }

    #[test]
    fn header_extractor_reads_traceparent() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
                .parse()
                .unwrap(),
        );
        let extractor = HeaderMapExtractor(&headers);
        assert!(extractor.get("traceparent").is_some());
        assert!(extractor.keys().contains(&"traceparent"));
    }
}
