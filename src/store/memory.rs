use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{TripFilter, TripMatch, TripStore};
use crate::geo::haversine_km;
use crate::models::trip::{OtpChange, Trip, TripStatus, TripUpdate};
use crate::otp;

/// Map-backed store for tests. The compare-and-swap happens under one lock.
#[derive(Default)]
pub struct MemoryTripStore {
    trips: Mutex<HashMap<Uuid, Trip>>,
}

impl MemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook to put a trip into an arbitrary state.
    pub fn put(&self, trip: Trip) {
        self.trips.lock().unwrap().insert(trip.id, trip);
    }
}

fn guard_holds(trip: &Trip, update: &TripUpdate) -> bool {
    match &update.otp_guard {
        Some(hash) => {
            trip.otp_hash.as_deref() == Some(hash.as_str())
                && trip.otp_attempts < otp::MAX_OTP_ATTEMPTS
        }
        None => true,
    }
}

fn apply_update(trip: &mut Trip, update: &TripUpdate) {
    if let Some(status) = update.status {
        trip.status = status;
    }
    if let Some(driver_id) = update.driver_id {
        trip.driver_id = Some(driver_id);
    }
    if let Some(passenger_id) = update.passenger_id {
        trip.passenger_id = Some(passenger_id);
    }
    match &update.otp {
        Some(OtpChange::Issue { hash, expires_at }) => {
            trip.otp_hash = Some(hash.clone());
            trip.otp_expires_at = Some(*expires_at);
            trip.otp_verified = false;
            trip.otp_attempts = 0;
        }
        Some(OtpChange::Verified) => {
            trip.otp_hash = None;
            trip.otp_expires_at = None;
            trip.otp_verified = true;
            trip.otp_attempts = 0;
        }
        Some(OtpChange::FailedAttempt) => trip.otp_attempts += 1,
        None => {}
    }
    trip.updated_at = Utc::now();
}

#[async_trait]
impl TripStore for MemoryTripStore {
    async fn create(&self, trip: &Trip) -> anyhow::Result<()> {
        let mut trips = self.trips.lock().unwrap();
        anyhow::ensure!(!trips.contains_key(&trip.id), "duplicate trip id {}", trip.id);
        trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Trip>> {
        Ok(self.trips.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_filter(&self, filter: &TripFilter) -> anyhow::Result<Vec<TripMatch>> {
        let trips = self.trips.lock().unwrap();
        let mut matches: Vec<TripMatch> = trips
            .values()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.mode.map_or(true, |m| t.trip_mode == m))
            .filter(|t| filter.party.map_or(true, |(role, id)| t.party(role) == Some(id)))
            .filter(|t| filter.window_open_at.map_or(true, |at| t.latest_start_time > at))
            .filter_map(|t| match filter.near {
                Some(near) => {
                    let d = haversine_km(near.center, t.src);
                    (d <= near.radius_km).then(|| TripMatch {
                        trip: t.clone(),
                        distance_km: Some(d),
                    })
                }
                None => Some(TripMatch {
                    trip: t.clone(),
                    distance_km: None,
                }),
            })
            .collect();

        if filter.near.is_some() {
            matches.sort_by(|a, b| {
                a.distance_km
                    .unwrap_or(f64::MAX)
                    .total_cmp(&b.distance_km.unwrap_or(f64::MAX))
            });
        } else {
            matches.sort_by(|a, b| b.trip.created_at.cmp(&a.trip.created_at));
        }
        Ok(matches)
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        expected: TripStatus,
        update: &TripUpdate,
    ) -> anyhow::Result<u64> {
        let mut trips = self.trips.lock().unwrap();
        match trips.get_mut(&id) {
            Some(trip) if trip.status == expected && guard_holds(trip, update) => {
                apply_update(trip, update);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete_if_status(&self, id: Uuid, expected: TripStatus) -> anyhow::Result<u64> {
        let mut trips = self.trips.lock().unwrap();
        if trips.get(&id).map(|t| t.status) == Some(expected) {
            trips.remove(&id);
            Ok(1)
        } else {
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::Role;
    use crate::trips::testing::{draft, Harness};

    async fn confirmed_trip(store: &MemoryTripStore) -> Trip {
        let h = Harness::new();
        let mut trip = h
            .service
            .create_trip(draft(Uuid::new_v4(), Role::Driver))
            .await
            .unwrap();
        trip.passenger_id = Some(Uuid::new_v4());
        trip.status = TripStatus::Confirmed;
        trip.otp_hash = Some("salt$current".into());
        store.put(trip.clone());
        trip
    }

    fn verified(guard: &str) -> TripUpdate {
        TripUpdate {
            status: Some(TripStatus::Ongoing),
            otp: Some(OtpChange::Verified),
            otp_guard: Some(guard.to_string()),
            ..TripUpdate::default()
        }
    }

    #[tokio::test]
    async fn guarded_write_needs_the_hash_it_observed() {
        let store = MemoryTripStore::new();
        let trip = confirmed_trip(&store).await;

        let changed = store
            .conditional_update(trip.id, TripStatus::Confirmed, &verified("salt$reissued"))
            .await
            .unwrap();
        assert_eq!(changed, 0);
        assert_eq!(store.find_by_id(trip.id).await.unwrap(), Some(trip.clone()));

        let changed = store
            .conditional_update(trip.id, TripStatus::Confirmed, &verified("salt$current"))
            .await
            .unwrap();
        assert_eq!(changed, 1);
    }

    #[tokio::test]
    async fn guarded_write_stops_at_the_attempt_budget() {
        let store = MemoryTripStore::new();
        let trip = confirmed_trip(&store).await;
        let failed = TripUpdate {
            otp: Some(OtpChange::FailedAttempt),
            otp_guard: Some("salt$current".into()),
            ..TripUpdate::default()
        };

        for _ in 0..otp::MAX_OTP_ATTEMPTS {
            let changed = store
                .conditional_update(trip.id, TripStatus::Confirmed, &failed)
                .await
                .unwrap();
            assert_eq!(changed, 1);
        }
        let changed = store
            .conditional_update(trip.id, TripStatus::Confirmed, &failed)
            .await
            .unwrap();
        assert_eq!(changed, 0);
        let changed = store
            .conditional_update(trip.id, TripStatus::Confirmed, &verified("salt$current"))
            .await
            .unwrap();
        assert_eq!(changed, 0);

        let stored = store.find_by_id(trip.id).await.unwrap().unwrap();
        assert_eq!(stored.otp_attempts, otp::MAX_OTP_ATTEMPTS);
        assert_eq!(stored.status, TripStatus::Confirmed);
    }
}
