use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::PresenceIndex;
use crate::clock::Clock;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::presence::{NearbyActor, PresenceRecord};

/// Single-process presence index. Expired records are pruned lazily on access.
pub struct MemoryPresenceIndex {
    records: Mutex<HashMap<String, PresenceRecord>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryPresenceIndex {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn records(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, PresenceRecord>>> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("presence index lock poisoned"))
    }

    /// Runs `f` on the actor's record if it is still live; drops it otherwise.
    fn with_live<T>(
        &self,
        actor_id: &str,
        f: impl FnOnce(&mut PresenceRecord, DateTime<Utc>) -> T,
    ) -> anyhow::Result<Option<T>> {
        let now = self.clock.now();
        let mut records = self.records()?;
        match records.get_mut(actor_id) {
            Some(record) if record.expires_at > now => Ok(Some(f(record, now))),
            Some(_) => {
                records.remove(actor_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PresenceIndex for MemoryPresenceIndex {
    async fn mark_online(&self, actor_id: &str, lng: f64, lat: f64) -> anyhow::Result<()> {
        let expires_at = self.clock.now() + self.ttl;
        self.records()?.insert(
            actor_id.to_string(),
            PresenceRecord {
                actor_id: actor_id.to_string(),
                lng,
                lat,
                expires_at,
            },
        );
        Ok(())
    }

    async fn heartbeat(&self, actor_id: &str) -> anyhow::Result<bool> {
        let ttl = self.ttl;
        let refreshed = self.with_live(actor_id, |record, now| record.expires_at = now + ttl)?;
        Ok(refreshed.is_some())
    }

    async fn update_location(&self, actor_id: &str, lng: f64, lat: f64) -> anyhow::Result<bool> {
        let ttl = self.ttl;
        let moved = self.with_live(actor_id, |record, now| {
            record.lng = lng;
            record.lat = lat;
            record.expires_at = now + ttl;
        })?;
        Ok(moved.is_some())
    }

    async fn mark_offline(&self, actor_id: &str) -> anyhow::Result<()> {
        self.records()?.remove(actor_id);
        Ok(())
    }

    async fn query_nearby(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> anyhow::Result<Vec<NearbyActor>> {
        let now = self.clock.now();
        let mut records = self.records()?;
        records.retain(|_, r| r.expires_at > now);

        let mut nearby: Vec<NearbyActor> = records
            .values()
            .filter_map(|r| {
                let distance_km = haversine_km(center, GeoPoint::new(r.lat, r.lng));
                (distance_km <= radius_km).then(|| NearbyActor {
                    actor_id: r.actor_id.clone(),
                    distance_km,
                    lng: r.lng,
                    lat: r.lat,
                })
            })
            .collect();
        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        Ok(nearby)
    }

    async fn is_online(&self, actor_id: &str) -> anyhow::Result<bool> {
        Ok(self.with_live(actor_id, |_, _| ())?.is_some())
    }

    async fn location(&self, actor_id: &str) -> anyhow::Result<Option<(f64, f64)>> {
        self.with_live(actor_id, |record, _| (record.lng, record.lat))
    }
}
