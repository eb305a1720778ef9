use uuid::Uuid;

use super::TripService;
use crate::error::TripError;
use crate::geo::GeoPoint;
use crate::models::presence::{ActorPresence, NearbyActor};
use crate::models::trip::{Role, Trip, TripMode, TripStatus};
use crate::store::{Near, TripFilter, TripMatch};

pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 5.0;

fn search_area(center: GeoPoint, radius_km: Option<f64>) -> Result<Near, TripError> {
    if !center.is_valid() {
        return Err(TripError::Validation(format!(
            "search center out of range: ({}, {})",
            center.lat, center.lng
        )));
    }
    let radius_km = radius_km.unwrap_or(DEFAULT_SEARCH_RADIUS_KM);
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(TripError::Validation("radius must be a positive number".into()));
    }
    Ok(Near { center, radius_km })
}

impl TripService {
    /// OPEN trips are public. Once matched, only the two parties may look.
    pub async fn get_trip(&self, trip_id: Uuid, caller: Uuid) -> Result<Trip, TripError> {
        let trip = self.load(trip_id).await?;
        if trip.status != TripStatus::Open && trip.role_of(caller).is_none() {
            return Err(TripError::Forbidden("trip is only visible to its parties"));
        }
        Ok(trip)
    }

    /// Open trips posted by the other role near `center`, closest first.
    /// Trips whose start window has lapsed are left out.
    pub async fn find_open_trips(
        &self,
        viewer: Role,
        center: GeoPoint,
        radius_km: Option<f64>,
    ) -> Result<Vec<TripMatch>, TripError> {
        let filter = TripFilter {
            status: Some(TripStatus::Open),
            mode: Some(TripMode::requestable_by(viewer)),
            near: Some(search_area(center, radius_km)?),
            window_open_at: Some(self.clock.now()),
            ..TripFilter::default()
        };
        self.store_call("find_by_filter", self.store.find_by_filter(&filter))
            .await
    }

    /// Every trip where the actor holds the role's slot, newest first.
    pub async fn my_trips(&self, actor: Uuid, role: Role) -> Result<Vec<Trip>, TripError> {
        let filter = TripFilter {
            party: Some((role, actor)),
            ..TripFilter::default()
        };
        let matches = self
            .store_call("find_by_filter", self.store.find_by_filter(&filter))
            .await?;
        Ok(matches.into_iter().map(|m| m.trip).collect())
    }

    pub async fn pending_requests(&self, actor: Uuid, role: Role) -> Result<Vec<Trip>, TripError> {
        let filter = TripFilter {
            status: Some(TripStatus::Requested),
            party: Some((role, actor)),
            ..TripFilter::default()
        };
        let matches = self
            .store_call("find_by_filter", self.store.find_by_filter(&filter))
            .await?;
        Ok(matches.into_iter().map(|m| m.trip).collect())
    }

    /// Bounds a presence index call and maps its failure to `StoreUnavailable`.
    async fn presence_call<T>(
        &self,
        fut: impl std::future::Future<Output = anyhow::Result<T>>,
    ) -> Result<T, TripError> {
        match tokio::time::timeout(self.settings.presence_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(TripError::StoreUnavailable(format!("presence index: {}", e))),
            Err(_) => Err(TripError::StoreUnavailable("presence index timed out".into())),
        }
    }

    /// Live actors of the other role near `center`.
    pub async fn find_nearby_counterparts(
        &self,
        viewer: Role,
        center: GeoPoint,
        radius_km: Option<f64>,
    ) -> Result<Vec<NearbyActor>, TripError> {
        let area = search_area(center, radius_km)?;
        let index = self.presence.for_role(viewer.counterpart());
        self.presence_call(index.query_nearby(area.center, area.radius_km))
            .await
    }

    pub async fn presence_of(&self, role: Role, actor_id: &str) -> Result<ActorPresence, TripError> {
        let index = self.presence.for_role(role);
        let online = self.presence_call(index.is_online(actor_id)).await?;
        let position = if online {
            self.presence_call(index.location(actor_id)).await?
        } else {
            None
        };
        Ok(ActorPresence {
            actor_id: actor_id.to_string(),
            online,
            lng: position.map(|(lng, _)| lng),
            lat: position.map(|(_, lat)| lat),
        })
    }
}
