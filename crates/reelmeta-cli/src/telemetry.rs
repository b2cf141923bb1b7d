//! Tracing subscriber and OpenTelemetry exporter setup.
//!
//! With the `otel` feature and `OTEL_EXPORTER_OTLP_ENDPOINT` set, spans, logs and
//! the client's request metrics are exported over OTLP/HTTP. Otherwise only the
//! fmt layer is installed.

use std::sync::Arc;

use reelmeta_api::MetricsSink;
use tracing_subscriber::filter::EnvFilter;
#[cfg(feature = "otel")]
use tracing_subscriber::Layer;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;

/// Exporter pipelines that are flushed when dropped.
#[derive(Debug, Default)]
pub struct Telemetry {
    #[cfg(feature = "otel")]
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
    #[cfg(feature = "otel")]
    meter_provider: Option<opentelemetry_sdk::metrics::SdkMeterProvider>,
    #[cfg(feature = "otel")]
    logger_provider: Option<opentelemetry_sdk::logs::SdkLoggerProvider>,
}

/// `RUST_LOG`, or `info` with per-request client logs at `warn` when unset.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,reelmeta_api=warn"))
}

/// Installs the global subscriber.
#[cfg(not(feature = "otel"))]
pub fn init() -> Telemetry {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .init();
    Telemetry::default()
}

/// Installs the global subscriber and, when an OTLP endpoint is configured,
/// the global tracer and meter providers.
#[cfg(feature = "otel")]
pub fn init() -> Telemetry {
    let telemetry = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        otlp::pipelines()
    } else {
        Telemetry::default()
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

    let otel_layer = telemetry.tracer_provider.as_ref().map(|provider| {
        let tracer =
            opentelemetry::trace::TracerProvider::tracer(provider, env!("CARGO_PKG_NAME"));
        tracing_opentelemetry::layer().with_tracer(tracer)
    });

    // The exporter's own HTTP stack must not feed back into the log bridge.
    let log_layer = telemetry.logger_provider.as_ref().map(|provider| {
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(provider)
            .with_filter(EnvFilter::new(
                "info,hyper=off,hyper_util=off,reqwest=off,h2=off,opentelemetry=off",
            ))
    });

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .with(otel_layer)
        .with(log_layer)
        .init();

    telemetry
}

/// Metrics sink for the API clients.
#[must_use]
pub fn metrics_sink() -> Arc<dyn MetricsSink> {
    #[cfg(feature = "otel")]
    {
        Arc::new(reelmeta_api::OtelMetrics::global())
    }
    #[cfg(not(feature = "otel"))]
    {
        Arc::new(reelmeta_api::NoopMetrics)
    }
}

#[cfg(feature = "otel")]
mod otlp {
    use opentelemetry_sdk::Resource;
    use opentelemetry_sdk::logs::SdkLoggerProvider;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use opentelemetry_sdk::trace::SdkTracerProvider;

    use super::Telemetry;

    fn resource() -> Resource {
        Resource::builder()
            .with_service_name(env!("CARGO_PKG_NAME"))
            .build()
    }

    /// Builds every exporter that can be built; a failing one is skipped.
    pub(super) fn pipelines() -> Telemetry {
        let tracer_provider = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .build()
            .ok()
            .map(|exporter| {
                SdkTracerProvider::builder()
                    .with_resource(resource())
                    .with_simple_exporter(exporter)
                    .build()
            });

        let meter_provider = opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .build()
            .ok()
            .map(|exporter| {
                SdkMeterProvider::builder()
                    .with_resource(resource())
                    .with_periodic_exporter(exporter)
                    .build()
            });

        let logger_provider = opentelemetry_otlp::LogExporter::builder()
            .with_http()
            .build()
            .ok()
            .map(|exporter| {
                SdkLoggerProvider::builder()
                    .with_resource(resource())
                    .with_batch_exporter(exporter)
                    .build()
            });

        if let Some(provider) = &tracer_provider {
            opentelemetry::global::set_tracer_provider(provider.clone());
        }
        if let Some(provider) = &meter_provider {
            opentelemetry::global::set_meter_provider(provider.clone());
        }

        Telemetry {
            tracer_provider,
            meter_provider,
            logger_provider,
        }
    }
}

#[cfg(feature = "otel")]
impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(provider) = self.meter_provider.take()
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "failed to flush metrics");
        }
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "failed to flush spans");
        }
        if let Some(provider) = self.logger_provider.take()
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "failed to flush logs");
        }
    }
}
