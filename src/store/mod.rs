//! Durable trip records.
//!
//! Every status change goes through [`TripStore::conditional_update`], which
//! applies only if the stored status still equals the caller's expectation.
//! The affected-row count is the compare-and-swap result: zero means another
//! actor moved the trip first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::trip::{Role, Trip, TripMode, TripStatus, TripUpdate};

#[cfg(test)]
pub mod memory;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Near {
    pub center: GeoPoint,
    pub radius_km: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripFilter {
    pub status: Option<TripStatus>,
    pub mode: Option<TripMode>,
    /// Trips where the given actor holds the given slot.
    pub party: Option<(Role, Uuid)>,
    /// Pickup within radius; results are then ordered by pickup distance.
    pub near: Option<Near>,
    /// Only trips whose start window is still open at this instant.
    pub window_open_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripMatch {
    pub trip: Trip,
    /// Pickup distance from the filter center, when the filter had one.
    pub distance_km: Option<f64>,
}

#[async_trait]
pub trait TripStore: Send + Sync {
    async fn create(&self, trip: &Trip) -> anyhow::Result<()>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Trip>>;

    /// Matching trips, closest first when `near` is set, newest first otherwise.
    async fn find_by_filter(&self, filter: &TripFilter) -> anyhow::Result<Vec<TripMatch>>;

    /// Applies `update` only if the trip is still in `expected`. Returns the
    /// number of rows changed (0 or 1).
    async fn conditional_update(
        &self,
        id: Uuid,
        expected: TripStatus,
        update: &TripUpdate,
    ) -> anyhow::Result<u64>;

    /// Hard delete guarded the same way as [`TripStore::conditional_update`].
    async fn delete_if_status(&self, id: Uuid, expected: TripStatus) -> anyhow::Result<u64>;
}
