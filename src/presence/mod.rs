//! Who is reachable, where, and until when.
//!
//! One index per role. The TTL is the only liveness signal: an actor that
//! stops heart-beating ages out, and a lapsed actor must `mark_online` again.

use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;

use crate::geo::GeoPoint;
use crate::models::presence::NearbyActor;
use crate::models::trip::Role;

pub mod memory;
pub mod redis;

pub const PRESENCE_TTL_SECS: i64 = 60;

pub fn default_ttl() -> Duration {
    Duration::seconds(PRESENCE_TTL_SECS)
}

#[async_trait]
pub trait PresenceIndex: Send + Sync {
    /// Upsert the actor's location and start a fresh TTL.
    async fn mark_online(&self, actor_id: &str, lng: f64, lat: f64) -> anyhow::Result<()>;

    /// Refresh the TTL. Returns `false` if the actor had already lapsed.
    async fn heartbeat(&self, actor_id: &str) -> anyhow::Result<bool>;

    /// Move a live actor and refresh its TTL. Returns `false` if it had lapsed.
    async fn update_location(&self, actor_id: &str, lng: f64, lat: f64) -> anyhow::Result<bool>;

    async fn mark_offline(&self, actor_id: &str) -> anyhow::Result<()>;

    /// Live actors within `radius_km` of `center`, closest first.
    async fn query_nearby(&self, center: GeoPoint, radius_km: f64)
        -> anyhow::Result<Vec<NearbyActor>>;

    async fn is_online(&self, actor_id: &str) -> anyhow::Result<bool>;

    /// `(lng, lat)` of a live actor.
    async fn location(&self, actor_id: &str) -> anyhow::Result<Option<(f64, f64)>>;
}

/// Driver and passenger pools side by side.
#[derive(Clone)]
pub struct PresencePools {
    drivers: Arc<dyn PresenceIndex>,
    passengers: Arc<dyn PresenceIndex>,
}

impl PresencePools {
    pub fn new(drivers: Arc<dyn PresenceIndex>, passengers: Arc<dyn PresenceIndex>) -> Self {
        Self {
            drivers,
            passengers,
        }
    }

    pub fn for_role(&self, role: Role) -> &dyn PresenceIndex {
        match role {
            Role::Driver => self.drivers.as_ref(),
            Role::Passenger => self.passengers.as_ref(),
        }
    }
}
