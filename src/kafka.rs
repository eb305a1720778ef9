use crate::config::AppConfig;
use crate::models::notification::Notification;
use crate::notify::NotificationSink;
use crate::presence::PresencePools;
use crate::processor::{command_processor, presence_processor};
use crate::trips::TripService;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

fn client_config(config: &AppConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_bootstrap_servers)
        // SASL Configuration
        .set("security.protocol", &config.kafka_security_protocol)
        .set("sasl.mechanism", &config.kafka_sasl_mechanism)
        .set("sasl.username", &config.kafka_username)
        .set("sasl.password", &config.kafka_password);
    client_config
}

/// Consumes trip commands and presence pushes with a circuit breaker.
/// Each message is handled on its own task.
pub async fn start_kafka_consumer(
    config: &AppConfig,
    service: Arc<TripService>,
    presence: PresencePools,
) -> anyhow::Result<()> {
    info!(
        "Initializing Kafka consumer for topics: {}, {}",
        config.kafka_commands_topic, config.kafka_presence_topic
    );

    let consumer: StreamConsumer = client_config(config)
        .set("group.id", &config.kafka_group_id)
        .set("auto.offset.reset", &config.kafka_auto_offset_reset)
        .create()?;

    consumer.subscribe(&[&config.kafka_commands_topic, &config.kafka_presence_topic])?;
    info!("Subscribed to command and presence topics");

    let mut consecutive_failures = 0;
    let max_retries = config.kafka_max_retries;
    let cooldown_duration = Duration::from_secs(config.kafka_circuit_breaker_cooldown);
    let presence_timeout = Duration::from_millis(config.presence_timeout_ms);

    loop {
        // Circuit Breaker Check
        if consecutive_failures >= max_retries {
            warn!(
                "Circuit breaker tripped ({} consecutive failures)! Sleeping for {} seconds...",
                consecutive_failures, config.kafka_circuit_breaker_cooldown
            );
            tokio::time::sleep(cooldown_duration).await;
            consecutive_failures = 0;
            info!("Circuit breaker reset. Resuming consumption.");
        }

        match consumer.recv().await {
            Ok(m) => {
                consecutive_failures = 0;

                let payload = match m.payload() {
                    None => {
                        warn!(topic = m.topic(), "Received empty payload from Kafka");
                        continue;
                    }
                    Some(p) => p.to_vec(),
                };

                if m.topic() == config.kafka_presence_topic {
                    let presence = presence.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            presence_processor::process_presence(&presence, &payload, presence_timeout)
                                .await
                        {
                            error!("Error processing presence message: {}", e);
                        }
                    });
                } else {
                    let service = service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = command_processor::process_command(&service, &payload).await {
                            error!("Error processing trip command: {}", e);
                        }
                    });
                }
            }
            Err(e) => {
                error!(
                    "Kafka error: {}. Incrementing failure count ({} / {})",
                    e,
                    consecutive_failures + 1,
                    max_retries
                );
                consecutive_failures += 1;

                // Small delay to prevent tight loop in case of minor network glitches
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

/// Publishes notifications as JSON, keyed by recipient so one user's events
/// stay ordered within a partition.
pub struct KafkaNotificationSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaNotificationSink {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer = client_config(config)
            .set("message.timeout.ms", config.notify_timeout_ms.to_string())
            .create()?;
        info!("Kafka producer ready for topic: {}", config.kafka_notifications_topic);
        Ok(Self {
            producer,
            topic: config.kafka_notifications_topic.clone(),
        })
    }
}

#[async_trait]
impl NotificationSink for KafkaNotificationSink {
    async fn publish(&self, notification: &Notification) -> anyhow::Result<()> {
        let body = serde_json::to_string(notification)?;
        let record = FutureRecord::to(&self.topic)
            .key(notification.recipient_id.as_str())
            .payload(body.as_str());
        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("kafka delivery failed: {}", e))?;
        Ok(())
    }
}
