use crate::http::{run_http_server, ApiState, HttpServerConfig};
use common::domain::{ReadingIngestionService, ReadingRepository};
use robolab_runner::AppProcess;
use std::sync::Arc;
use tracing::debug;

pub struct ReadingsApi {
    state: ApiState,
    config: HttpServerConfig,
}

impl ReadingsApi {
    pub fn new(
        ingestion_service: Arc<ReadingIngestionService>,
        repository: Arc<dyn ReadingRepository>,
        config: HttpServerConfig,
    ) -> Self {
        debug!(host = %config.host, port = config.port, "initializing readings API");
        Self {
            state: ApiState {
                ingestion_service,
                repository,
            },
            config,
        }
    }

    pub fn into_runner_process(self) -> AppProcess {
        Box::new(move |ctx| {
            Box::pin(async move { run_http_server(self.config, self.state, ctx).await })
        })
    }
}
