use chrono::{DateTime, Utc};
use serde::Serialize;

/// A TTL-bounded fact: actor is reachable at (lng, lat) until `expires_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    pub actor_id: String,
    pub lng: f64,
    pub lat: f64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyActor {
    pub actor_id: String,
    pub distance_km: f64,
    pub lng: f64,
    pub lat: f64,
}

/// Answer to a single-actor presence lookup. Coordinates are only known while
/// the actor is live.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorPresence {
    pub actor_id: String,
    pub online: bool,
    pub lng: Option<f64>,
    pub lat: Option<f64>,
}
