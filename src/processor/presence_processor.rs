use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::geo::GeoPoint;
use crate::models::message::PresenceMessage;
use crate::presence::PresencePools;

async fn bounded<T>(
    timeout: Duration,
    op: &'static str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| anyhow::anyhow!("presence {} timed out after {:?}", op, timeout))?
}

pub async fn process_presence(
    pools: &PresencePools,
    payload: &[u8],
    timeout: Duration,
) -> anyhow::Result<()> {
    let message: PresenceMessage = match serde_json::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse presence message: {}", e);
            return Ok(());
        }
    };

    match message {
        PresenceMessage::Online {
            role,
            actor_id,
            lng,
            lat,
        } => {
            if !GeoPoint::new(lat, lng).is_valid() {
                warn!(role = %role, actor = %actor_id, lat, lng, "Ignoring out-of-range location");
                return Ok(());
            }
            bounded(
                timeout,
                "mark_online",
                pools.for_role(role).mark_online(&actor_id, lng, lat),
            )
            .await?;
            debug!(role = %role, actor = %actor_id, "Actor online");
        }
        PresenceMessage::Heartbeat { role, actor_id } => {
            if !bounded(timeout, "heartbeat", pools.for_role(role).heartbeat(&actor_id)).await? {
                debug!(role = %role, actor = %actor_id, "Heartbeat after TTL lapse, actor must go online again");
            }
        }
        PresenceMessage::Location {
            role,
            actor_id,
            lng,
            lat,
        } => {
            if !GeoPoint::new(lat, lng).is_valid() {
                warn!(role = %role, actor = %actor_id, lat, lng, "Ignoring out-of-range location");
                return Ok(());
            }
            let index = pools.for_role(role);
            if !bounded(timeout, "update_location", index.update_location(&actor_id, lng, lat)).await? {
                debug!(role = %role, actor = %actor_id, "Location after TTL lapse, actor must go online again");
            }
        }
        PresenceMessage::Offline { role, actor_id } => {
            bounded(timeout, "mark_offline", pools.for_role(role).mark_offline(&actor_id)).await?;
            debug!(role = %role, actor = %actor_id, "Actor offline");
        }
    }

    Ok(())
}
