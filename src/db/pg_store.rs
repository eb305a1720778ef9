use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{queries, DbPool};
use crate::models::trip::{OtpChange, Role, Trip, TripRow, TripStatus, TripUpdate};
use crate::otp;
use crate::store::{TripFilter, TripMatch, TripStore};

#[derive(Debug, Clone)]
pub struct PgTripStore {
    pool: DbPool,
}

impl PgTripStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct TripMatchRow {
    #[sqlx(flatten)]
    trip: TripRow,
    pickup_distance_km: Option<f64>,
}

/// Column values for the OTP part of [`queries::CONDITIONAL_UPDATE_TRIP`].
struct OtpColumns {
    replace: bool,
    hash: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    verified: Option<bool>,
    attempts_inc: i32,
}

impl From<Option<&OtpChange>> for OtpColumns {
    fn from(change: Option<&OtpChange>) -> Self {
        match change {
            Some(OtpChange::Issue { hash, expires_at }) => OtpColumns {
                replace: true,
                hash: Some(hash.clone()),
                expires_at: Some(*expires_at),
                verified: Some(false),
                attempts_inc: 0,
            },
            Some(OtpChange::Verified) => OtpColumns {
                replace: true,
                hash: None,
                expires_at: None,
                verified: Some(true),
                attempts_inc: 0,
            },
            Some(OtpChange::FailedAttempt) => OtpColumns {
                replace: false,
                hash: None,
                expires_at: None,
                verified: None,
                attempts_inc: 1,
            },
            None => OtpColumns {
                replace: false,
                hash: None,
                expires_at: None,
                verified: None,
                attempts_inc: 0,
            },
        }
    }
}

#[async_trait]
impl TripStore for PgTripStore {
    async fn create(&self, trip: &Trip) -> anyhow::Result<()> {
        sqlx::query(queries::INSERT_TRIP)
            .bind(trip.id)
            .bind(trip.driver_id)
            .bind(trip.passenger_id)
            .bind(trip.src.lat)
            .bind(trip.src.lng)
            .bind(&trip.src_name)
            .bind(trip.dest.lat)
            .bind(trip.dest.lng)
            .bind(&trip.dest_name)
            .bind(trip.distance_km)
            .bind(trip.duration_min)
            .bind(&trip.route_geometry)
            .bind(trip.price)
            .bind(trip.vehicle_type.as_str())
            .bind(trip.trip_type.as_str())
            .bind(trip.trip_mode.as_str())
            .bind(trip.earliest_start_time)
            .bind(trip.latest_start_time)
            .bind(&trip.otp_hash)
            .bind(trip.otp_expires_at)
            .bind(trip.otp_verified)
            .bind(trip.otp_attempts)
            .bind(trip.status.as_str())
            .bind(trip.created_at)
            .bind(trip.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Trip>> {
        let row: Option<TripRow> = sqlx::query_as(queries::SELECT_TRIP_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Trip::try_from).transpose()
    }

    async fn find_by_filter(&self, filter: &TripFilter) -> anyhow::Result<Vec<TripMatch>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM (SELECT trips.*, ");
        match filter.near {
            Some(near) => {
                let [a, b, c, d] = queries::PICKUP_DISTANCE_KM;
                qb.push(a)
                    .push_bind(near.center.lat)
                    .push(b)
                    .push_bind(near.center.lng)
                    .push(c)
                    .push_bind(near.center.lat)
                    .push(d);
            }
            None => {
                qb.push("NULL::float8");
            }
        }
        qb.push(" AS pickup_distance_km FROM trips) AS t WHERE TRUE");

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(mode) = filter.mode {
            qb.push(" AND trip_mode = ").push_bind(mode.as_str());
        }
        if let Some((role, actor)) = filter.party {
            let column = match role {
                Role::Driver => " AND driver_id = ",
                Role::Passenger => " AND passenger_id = ",
            };
            qb.push(column).push_bind(actor);
        }
        if let Some(at) = filter.window_open_at {
            qb.push(" AND latest_start_time > ").push_bind(at);
        }
        if let Some(near) = filter.near {
            qb.push(" AND pickup_distance_km <= ")
                .push_bind(near.radius_km)
                .push(" ORDER BY pickup_distance_km ASC");
        } else {
            qb.push(" ORDER BY created_at DESC");
        }

        let rows = qb
            .build_query_as::<TripMatchRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                Ok(TripMatch {
                    trip: Trip::try_from(row.trip)?,
                    distance_km: row.pickup_distance_km,
                })
            })
            .collect()
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        expected: TripStatus,
        update: &TripUpdate,
    ) -> anyhow::Result<u64> {
        let otp = OtpColumns::from(update.otp.as_ref());
        let result = sqlx::query(queries::CONDITIONAL_UPDATE_TRIP)
            .bind(id)
            .bind(expected.as_str())
            .bind(update.status.map(|s| s.as_str()))
            .bind(update.driver_id)
            .bind(update.passenger_id)
            .bind(otp.replace)
            .bind(otp.hash)
            .bind(otp.expires_at)
            .bind(otp.verified)
            .bind(otp.attempts_inc)
            .bind(update.otp_guard.as_deref())
            .bind(otp::MAX_OTP_ATTEMPTS)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_if_status(&self, id: Uuid, expected: TripStatus) -> anyhow::Result<u64> {
        let result = sqlx::query(queries::DELETE_TRIP_IF_STATUS)
            .bind(id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
