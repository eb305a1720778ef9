mod clock;
mod config;
mod db;
mod error;
mod fare;
mod geo;
mod kafka;
mod models;
mod notify;
mod otp;
mod presence;
mod processor;
mod router;
mod store;
mod trips;

use std::sync::Arc;
use std::time::Duration;

use clock::{Clock, SystemClock};
use config::{AppConfig, PresenceBackend};
use models::trip::Role;
use presence::memory::MemoryPresenceIndex;
use presence::redis::RedisPresenceIndex;
use presence::{PresenceIndex, PresencePools};
use tracing::info;
use trips::{ServiceSettings, TripService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Pillion Trips Service...");

    // Init DB
    let pool = db::init_pool(
        &config.database_url,
        Duration::from_millis(config.store_timeout_ms),
    )
    .await?;
    info!("Connected to database");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Presence
    let presence = match config.presence_backend {
        PresenceBackend::Redis => {
            let client = redis::Client::open(config.redis_url.as_str())?;
            let drivers: Arc<dyn PresenceIndex> = Arc::new(RedisPresenceIndex::new(
                client.clone(),
                Role::Driver,
                config.presence_ttl_secs,
            ));
            let passengers: Arc<dyn PresenceIndex> = Arc::new(RedisPresenceIndex::new(
                client,
                Role::Passenger,
                config.presence_ttl_secs,
            ));
            PresencePools::new(drivers, passengers)
        }
        PresenceBackend::Memory => {
            let ttl = chrono::Duration::seconds(config.presence_ttl_secs as i64);
            let drivers: Arc<dyn PresenceIndex> =
                Arc::new(MemoryPresenceIndex::new(ttl, clock.clone()));
            let passengers: Arc<dyn PresenceIndex> =
                Arc::new(MemoryPresenceIndex::new(ttl, clock.clone()));
            PresencePools::new(drivers, passengers)
        }
    };
    info!("Presence backend: {:?}", config.presence_backend);

    // Notifications
    let sink = Arc::new(kafka::KafkaNotificationSink::new(&config)?);
    let (notifier, rx) = notify::Notifier::new(config.notify_queue_capacity);
    tokio::spawn(notify::run_dispatcher(
        rx,
        sink,
        Duration::from_millis(config.notify_timeout_ms),
    ));

    let router = Arc::new(router::OsrmRouter::new(
        &config.osrm_base_url,
        Duration::from_millis(config.router_timeout_ms),
    )?);

    let service = Arc::new(TripService::new(
        Arc::new(db::pg_store::PgTripStore::new(pool)),
        router,
        notifier,
        clock,
        presence.clone(),
        ServiceSettings {
            surge_pricing: config.surge_pricing,
            router_timeout: Duration::from_millis(config.router_timeout_ms),
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            presence_timeout: Duration::from_millis(config.presence_timeout_ms),
        },
    ));

    // Start Kafka
    kafka::start_kafka_consumer(&config, service, presence).await?;

    Ok(())
}
