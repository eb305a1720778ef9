use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::PresenceIndex;
use crate::geo::GeoPoint;
use crate::models::presence::NearbyActor;
use crate::models::trip::Role;

/// Presence backed by a Redis GEO set per role plus a TTL'd liveness key per
/// actor. The GEO set itself never expires, so every read checks liveness.
pub struct RedisPresenceIndex {
    client: redis::Client,
    geo_key: String,
    prefix: &'static str,
    ttl_secs: u64,
}

impl RedisPresenceIndex {
    pub fn new(client: redis::Client, role: Role, ttl_secs: u64) -> Self {
        let prefix = match role {
            Role::Driver => "driver",
            Role::Passenger => "passenger",
        };
        Self {
            client,
            geo_key: format!("geo:{}s", prefix),
            prefix,
            ttl_secs,
        }
    }

    fn live_key(&self, actor_id: &str) -> String {
        format!("{}:{}:last_seen", self.prefix, actor_id)
    }

    async fn conn(&self) -> anyhow::Result<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// EXPIRE replies 0 for a key that is already gone, which is how a lapsed
    /// actor is told apart from a live one.
    async fn refresh(&self, conn: &mut MultiplexedConnection, actor_id: &str) -> anyhow::Result<bool> {
        let alive: bool = conn.expire(self.live_key(actor_id), self.ttl_secs as i64).await?;
        if !alive {
            // tidy up the stale GEO member left behind by the expired key
            let _: () = conn.zrem(&self.geo_key, actor_id).await?;
        }
        Ok(alive)
    }
}

/// GEORADIUS hit: member, distance in km, (lng, lat).
type GeoHit = (String, f64, (f64, f64));

/// Drops GEO members whose liveness key has expired. `live` holds the EXISTS
/// replies in the same order as `members`; GEORADIUS order is kept.
fn live_members(members: Vec<GeoHit>, live: Vec<bool>) -> Vec<NearbyActor> {
    members
        .into_iter()
        .zip(live)
        .filter(|(_, alive)| *alive)
        .map(|((actor_id, distance_km, (lng, lat)), _)| NearbyActor {
            actor_id,
            distance_km,
            lng,
            lat,
        })
        .collect()
}

#[async_trait]
impl PresenceIndex for RedisPresenceIndex {
    async fn mark_online(&self, actor_id: &str, lng: f64, lat: f64) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::pipe()
            .atomic()
            .cmd("GEOADD")
            .arg(&self.geo_key)
            .arg(lng)
            .arg(lat)
            .arg(actor_id)
            .ignore()
            .set_ex(self.live_key(actor_id), chrono::Utc::now().timestamp_millis(), self.ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn heartbeat(&self, actor_id: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn().await?;
        self.refresh(&mut conn, actor_id).await
    }

    async fn update_location(&self, actor_id: &str, lng: f64, lat: f64) -> anyhow::Result<bool> {
        let mut conn = self.conn().await?;
        if !self.refresh(&mut conn, actor_id).await? {
            return Ok(false);
        }
        let _: () = redis::cmd("GEOADD")
            .arg(&self.geo_key)
            .arg(lng)
            .arg(lat)
            .arg(actor_id)
            .query_async(&mut conn)
            .await?;
        Ok(true)
    }

    async fn mark_offline(&self, actor_id: &str) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::pipe()
            .atomic()
            .zrem(&self.geo_key, actor_id)
            .ignore()
            .del(self.live_key(actor_id))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn query_nearby(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> anyhow::Result<Vec<NearbyActor>> {
        let mut conn = self.conn().await?;
        let members: Vec<GeoHit> = redis::cmd("GEORADIUS")
            .arg(&self.geo_key)
            .arg(center.lng)
            .arg(center.lat)
            .arg(radius_km)
            .arg("km")
            .arg("WITHDIST")
            .arg("WITHCOORD")
            .arg("ASC")
            .query_async(&mut conn)
            .await?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for (actor_id, _, _) in &members {
            pipe.exists(self.live_key(actor_id));
        }
        let live: Vec<bool> = pipe.query_async(&mut conn).await?;

        Ok(live_members(members, live))
    }

    async fn is_online(&self, actor_id: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(self.live_key(actor_id)).await?)
    }

    async fn location(&self, actor_id: &str) -> anyhow::Result<Option<(f64, f64)>> {
        let mut conn = self.conn().await?;
        if !conn.exists::<_, bool>(self.live_key(actor_id)).await? {
            return Ok(None);
        }
        let positions: Vec<Option<(f64, f64)>> = redis::cmd("GEOPOS")
            .arg(&self.geo_key)
            .arg(actor_id)
            .query_async(&mut conn)
            .await?;
        Ok(positions.into_iter().next().flatten())
    }
}
