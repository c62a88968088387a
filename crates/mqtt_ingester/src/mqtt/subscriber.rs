use crate::mqtt::{device_id_from_topic, MqttIngesterConfig};
use common::domain::{DomainError, ReadingIngestionService};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Run the MQTT subscription until cancelled.
///
/// Connection errors are retried after `retry_delay_secs`; the process fails
/// once `max_retry_attempts` consecutive attempts have failed.
#[instrument(
    name = "mqtt_subscriber",
    skip_all,
    fields(broker = %config.broker, port = config.port, topic = %config.topic)
)]
pub async fn run_mqtt_subscriber(
    config: MqttIngesterConfig,
    ingestion_service: &ReadingIngestionService,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    info!("starting MQTT subscriber");

    let mut failures: u32 = 0;

    loop {
        if ctx.is_cancelled() {
            debug!("MQTT subscriber cancelled before connection");
            break;
        }

        match run_mqtt_connection(&config, ingestion_service, &ctx, &mut failures).await {
            Ok(()) => {
                debug!("MQTT subscriber stopped cleanly");
                break;
            }
            Err(e) => {
                failures += 1;
                error!(error = %format!("{:#}", e), attempt = failures, "MQTT connection error");

                if !config.should_retry(failures) {
                    error!(
                        max_retries = config.max_retry_attempts,
                        "max retry attempts reached, stopping MQTT subscriber"
                    );
                    return Err(e.context(format!(
                        "MQTT broker {}:{} unreachable after {} attempts",
                        config.broker, config.port, failures
                    )));
                }

                warn!(
                    attempt = failures,
                    retry_delay_secs = config.retry_delay_secs,
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = tokio::time::sleep(config.retry_delay()) => {}
                }
            }
        }
    }

    info!("MQTT subscriber stopped");
    Ok(())
}

/// One broker session: connect, subscribe, then handle messages one at a time.
///
/// Cancellation is only observed between events, so a message that is
/// being written always finishes first.
async fn run_mqtt_connection(
    config: &MqttIngesterConfig,
    ingestion_service: &ReadingIngestionService,
    ctx: &CancellationToken,
    failures: &mut u32,
) -> anyhow::Result<()> {
    let qos = config.subscription_qos()?;

    let mut mqtt_options = MqttOptions::new(&config.client_id, &config.broker, config.port);
    mqtt_options.set_keep_alive(config.keep_alive());
    mqtt_options.set_clean_session(true);
    if let Some((username, password)) = config.credentials() {
        mqtt_options.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    client
        .subscribe(&config.topic, qos)
        .await
        .map_err(|e| anyhow::anyhow!("failed to subscribe: {}", e))?;

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!("shutdown signal received, disconnecting");
                disconnect(&client, &mut eventloop, ingestion_service).await;
                return Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_mqtt_message(&publish.topic, &publish.payload, ingestion_service)
                            .await;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        *failures = 0;
                        info!("connected to MQTT broker");
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!(topic = %config.topic, qos = config.qos, "subscribed to MQTT topic");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(anyhow::anyhow!("MQTT event loop error: {}", e));
                    }
                }
            }
        }
    }
}

/// Queue a DISCONNECT and keep polling until it has been written to the broker.
///
/// Messages that arrive meanwhile are still stored.
async fn disconnect(
    client: &AsyncClient,
    eventloop: &mut EventLoop,
    ingestion_service: &ReadingIngestionService,
) {
    if let Err(e) = client.disconnect().await {
        debug!(error = %e, "disconnect request failed");
        return;
    }

    let drained = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("disconnected from MQTT broker");
                    break;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    handle_mqtt_message(&publish.topic, &publish.payload, ingestion_service)
                        .await;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "event loop closed while disconnecting");
                    break;
                }
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            timeout_secs = DISCONNECT_TIMEOUT.as_secs(),
            "timed out sending MQTT disconnect"
        );
    }
}

/// Decode, normalize and store one broker message.
///
/// Every failure is logged and the message dropped; nothing is returned to
/// the event loop. Each message starts its own trace.
pub async fn handle_mqtt_message(
    topic: &str,
    payload: &[u8],
    ingestion_service: &ReadingIngestionService,
) {
    let span = info_span!(
        parent: Span::none(),
        "mqtt_message",
        topic = %topic,
        payload_size = payload.len(),
        device_id = tracing::field::Empty,
    );

    async {
        let device_id = match device_id_from_topic(topic) {
            Ok(device_id) => device_id,
            Err(e) => {
                warn!(error = %e, "dropping message with unusable topic");
                return;
            }
        };
        Span::current().record("device_id", device_id);

        let raw = match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(raw)) => raw,
            Ok(_) => {
                warn!("dropping message: payload is not a JSON object");
                return;
            }
            Err(e) => {
                warn!(error = %e, "dropping message: payload is not valid UTF-8 JSON");
                return;
            }
        };

        match ingestion_service.ingest(device_id, &raw).await {
            Ok(outcome) if outcome.idempotent => {
                info!(reading_id = outcome.reading.id, "duplicate message, reading already stored");
            }
            Ok(outcome) => {
                info!(reading_id = outcome.reading.id, "reading stored");
            }
            Err(DomainError::RepositoryError(e)) => {
                error!(error = %format!("{:#}", e), "failed to store reading, dropping message");
            }
            Err(e) => {
                warn!(error = %e, "dropping rejected message");
            }
        }
    }
    .instrument(span)
    .await
}
