use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PresenceBackend {
    Redis,
    Memory,
}

impl FromStr for PresenceBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(PresenceBackend::Redis),
            "memory" => Ok(PresenceBackend::Memory),
            other => Err(anyhow::anyhow!("unknown PRESENCE_BACKEND: {}", other)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub kafka_bootstrap_servers: String,
    pub kafka_commands_topic: String,
    pub kafka_presence_topic: String,
    pub kafka_notifications_topic: String,
    pub kafka_group_id: String,
    pub kafka_auto_offset_reset: String,
    pub kafka_sasl_mechanism: String,
    pub kafka_username: String,
    pub kafka_password: String,
    pub kafka_security_protocol: String,
    pub kafka_max_retries: u32,
    pub kafka_circuit_breaker_cooldown: u64,
    pub database_url: String,
    pub redis_url: String,
    pub presence_backend: PresenceBackend,
    pub presence_ttl_secs: u64,
    pub osrm_base_url: String,
    pub router_timeout_ms: u64,
    pub store_timeout_ms: u64,
    pub presence_timeout_ms: u64,
    pub notify_timeout_ms: u64,
    pub notify_queue_capacity: usize,
    pub surge_pricing: bool,
    pub log_level: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let kafka_bootstrap_servers = env_or("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092");
        let kafka_commands_topic = env_or("KAFKA_COMMANDS_TOPIC", "trip.commands");
        let kafka_presence_topic = env_or("KAFKA_PRESENCE_TOPIC", "presence.events");
        let kafka_notifications_topic =
            env_or("KAFKA_NOTIFICATIONS_TOPIC", "notification.events");
        let kafka_group_id = env_or("KAFKA_GROUP_ID", "pillion-trips");
        let kafka_auto_offset_reset = env_or("KAFKA_AUTO_OFFSET_RESET", "latest");
        let kafka_sasl_mechanism = env_or("KAFKA_SASL_MECHANISM", "SCRAM-SHA-256");
        let kafka_username = env::var("KAFKA_USERNAME").unwrap_or_default();
        let kafka_password = env::var("KAFKA_PASSWORD").unwrap_or_default();
        let kafka_security_protocol = env_or("KAFKA_SECURITY_PROTOCOL", "SASL_PLAINTEXT");
        let kafka_max_retries = env_parse("KAFKA_MAX_RETRIES", 5);
        let kafka_circuit_breaker_cooldown = env_parse("KAFKA_CIRCUIT_BREAKER_COOLDOWN", 300);

        let db_host = env_or("DB_HOST", "localhost");
        let db_port = env_or("DB_PORT", "5432");
        let db_name = env_or("DB_DATABASE", "pillion");
        let db_user = env_or("DB_USER", "pillion");
        let db_pwd = env_or("DB_PWD", "pillion");

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        let redis_url = env_or("REDIS_URL", "redis://127.0.0.1:6379");
        let presence_backend = env_or("PRESENCE_BACKEND", "redis").parse()?;
        let presence_ttl_secs = env_parse("PRESENCE_TTL_SECS", 60);

        let osrm_base_url = env_or("OSRM_BASE_URL", "http://localhost:5000");
        let router_timeout_ms = env_parse("ROUTER_TIMEOUT_MS", 5000);
        let store_timeout_ms = env_parse("STORE_TIMEOUT_MS", 3000);
        let presence_timeout_ms = env_parse("PRESENCE_TIMEOUT_MS", 2000);
        let notify_timeout_ms = env_parse("NOTIFY_TIMEOUT_MS", 5000);
        let notify_queue_capacity = env_parse("NOTIFY_QUEUE_CAPACITY", 1024);
        let surge_pricing = env_parse("SURGE_PRICING", false);

        let log_level = env_or("LOG_LEVEL", "info");

        Ok(Self {
            kafka_bootstrap_servers,
            kafka_commands_topic,
            kafka_presence_topic,
            kafka_notifications_topic,
            kafka_group_id,
            kafka_auto_offset_reset,
            kafka_sasl_mechanism,
            kafka_username,
            kafka_password,
            kafka_security_protocol,
            kafka_max_retries,
            kafka_circuit_breaker_cooldown,
            database_url,
            redis_url,
            presence_backend,
            presence_ttl_secs,
            osrm_base_url,
            router_timeout_ms,
            store_timeout_ms,
            presence_timeout_ms,
            notify_timeout_ms,
            notify_queue_capacity,
            surge_pricing,
            log_level,
        })
    }
}
