use opentelemetry_sdk::{logs::LoggerProvider, trace::TracerProvider as SdkTracerProvider};

/// Logging and trace export settings for one robolab process
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Reported as `service.name` on exported spans and logs
    pub service_name: String,
    /// OTLP/gRPC collector, only dialed when `otel_enabled`
    pub otel_endpoint: String,
    pub otel_enabled: bool,
    /// Fallback filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl TelemetryConfig {
    /// JSON logs on stdout, nothing exported
    pub fn stdout_only(service_name: impl Into<String>, log_level: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            otel_endpoint: String::new(),
            otel_enabled: false,
            log_level: log_level.into(),
        }
    }
}

/// Exporters flushed by `shutdown_telemetry` once the runner has stopped
pub struct TelemetryProviders {
    pub tracer_provider: SdkTracerProvider,
    pub logger_provider: LoggerProvider,
}
