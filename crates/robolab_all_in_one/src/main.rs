mod config;

use common::domain::{
    InMemoryReadingRepository, ReadingIngestionService, ReadingRepository, ReadingWriter,
};
use common::postgres::{PostgresClient, PostgresReadingRepository};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use crate::config::{ServiceConfig, StorageBackend};
use mqtt_ingester::MqttIngester;
use readings_api::ReadingsApi;
use robolab_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        storage_backend = ?config.storage_backend,
        mqtt_enabled = config.mqtt_enabled,
        "Starting robolab-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    // One store handle, shared by the writer and both ingress adapters
    let repository =
        match tokio::time::timeout(config.startup_timeout(), initialize_repository(&config)).await
        {
            Ok(Ok(repository)) => repository,
            Ok(Err(e)) => {
                error!(error = %format!("{:#}", e), "Failed to initialize reading store");
                shutdown_telemetry(telemetry_providers);
                std::process::exit(1);
            }
            Err(_) => {
                error!(
                    timeout_secs = config.startup_timeout_secs,
                    "Timed out initializing reading store"
                );
                shutdown_telemetry(telemetry_providers);
                std::process::exit(1);
            }
        };

    let writer = Arc::new(ReadingWriter::new(Arc::clone(&repository)));
    let ingestion_service = Arc::new(ReadingIngestionService::new(writer));

    let readings_api = ReadingsApi::new(
        Arc::clone(&ingestion_service),
        Arc::clone(&repository),
        config.http_config(),
    );

    let mut runner = Runner::new().with_shutdown_timeout(config.shutdown_timeout());

    runner = runner.with_named_process("readings_api", readings_api.into_runner_process());

    if config.mqtt_enabled {
        let mqtt_ingester = MqttIngester::new(ingestion_service, config.mqtt_config());
        runner = runner.with_named_process("mqtt_ingester", mqtt_ingester.into_runner_process());
    } else {
        info!("MQTT ingress disabled");
    }

    runner = runner
        .with_closer(move || async move {
            info!("Flushing telemetry...");
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    if let Err(e) = runner.run().await {
        eprintln!("robolab-all-in-one stopped with error: {:#}", e);
        std::process::exit(1);
    }
}

async fn initialize_repository(
    config: &ServiceConfig,
) -> anyhow::Result<Arc<dyn ReadingRepository>> {
    match config.storage_backend {
        StorageBackend::Postgres => {
            info!(
                host = %config.postgres_host,
                database = %config.postgres_database,
                "Initializing PostgreSQL..."
            );
            let client = PostgresClient::new(&config.postgres_config())?;
            client.ping().await?;

            let repository = PostgresReadingRepository::new(client);
            repository.bootstrap_schema().await?;
            Ok(Arc::new(repository))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory reading store, readings are lost on restart");
            Ok(Arc::new(InMemoryReadingRepository::new()))
        }
    }
}
