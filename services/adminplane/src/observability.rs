//! Logging, trace propagation, and the Prometheus scrape endpoint.
//!
//! # Notes
//! [`init_observability`] runs once per process; later calls return the same
//! metrics handle. Spans go to OTLP when an exporter can be built and stay
//! local otherwise.
use axum::Router;
use axum::http::HeaderMap;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::net::SocketAddr;
use std::sync::{Once, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static SUBSCRIBER: Once = Once::new();
static PROPAGATOR: Once = Once::new();
static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the tracing subscriber, the W3C propagator, and the metrics recorder.
pub fn init_observability(service_name: &str) -> PrometheusHandle {
    SUBSCRIBER.call_once(|| {
        ensure_propagator();
        let instance = std::env::var("WARDEN_SERVICE_INSTANCE_ID")
            .or_else(|_| std::env::var("HOSTNAME"))
            .ok();
        let otel = otlp_provider(service_name, instance).map(|provider| {
            tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name.to_string()))
        });
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .with(otel)
            .try_init();
    });
    prometheus_handle()
}

fn ensure_propagator() {
    PROPAGATOR.call_once(|| global::set_text_map_propagator(TraceContextPropagator::new()));
}

fn otlp_provider(service_name: &str, instance: Option<String>) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .ok()?;
    let resource = Resource::builder_empty()
        .with_attributes(resource_attributes(service_name, instance))
        .build();
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_batch_exporter(exporter)
            .build(),
    )
}

fn resource_attributes(service_name: &str, instance: Option<String>) -> Vec<KeyValue> {
    std::iter::once(KeyValue::new("service.name", service_name.to_string()))
        .chain(instance.map(|id| KeyValue::new("service.instance.id", id)))
        .collect()
}

/// Parent context from the `traceparent`/`tracestate` request headers.
pub fn trace_context_from_headers(headers: &HeaderMap) -> opentelemetry::Context {
    ensure_propagator();
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderCarrier(headers)))
}

struct HeaderCarrier<'a>(&'a HeaderMap);

impl Extractor for HeaderCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}

/// Serve [`metrics_router`] on `addr` until `shutdown` fires.
pub async fn serve_metrics(
    handle: PrometheusHandle,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "metrics listener started");
    axum::serve(listener, metrics_router(handle).into_make_service())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

fn prometheus_handle() -> PrometheusHandle {
    PROMETHEUS
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(err) = metrics::set_global_recorder(recorder) {
                // Another recorder owns the process; this handle renders empty.
                tracing::warn!(error = %err, "metrics recorder already installed");
            }
            handle
        })
        .clone()
}
