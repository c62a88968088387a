use crate::mqtt::{run_mqtt_subscriber, MqttIngesterConfig};
use common::domain::ReadingIngestionService;
use robolab_runner::AppProcess;
use std::sync::Arc;
use tracing::debug;

/// Background worker owning the broker subscription
pub struct MqttIngester {
    ingestion_service: Arc<ReadingIngestionService>,
    config: MqttIngesterConfig,
}

impl MqttIngester {
    pub fn new(ingestion_service: Arc<ReadingIngestionService>, config: MqttIngesterConfig) -> Self {
        debug!(
            broker = %config.broker,
            port = config.port,
            topic = %config.topic,
            "initializing MQTT ingester"
        );
        Self {
            ingestion_service,
            config,
        }
    }

    pub fn into_runner_process(self) -> AppProcess {
        Box::new(move |ctx| {
            Box::pin(async move {
                run_mqtt_subscriber(self.config, &self.ingestion_service, ctx).await
            })
        })
    }
}
