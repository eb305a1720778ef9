use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::{immediate_window, TripService};
use crate::error::TripError;
use crate::fare::FareCalculator;
use crate::geo::GeoPoint;
use crate::models::message::TripDraft;
use crate::models::notification::EventType;
use crate::models::trip::{OtpChange, Role, Trip, TripMode, TripStatus, TripType, TripUpdate};
use crate::otp;

/// A draft that passed validation.
#[derive(Debug, Clone, PartialEq)]
struct NewTrip {
    creator: Uuid,
    mode: TripMode,
    src: GeoPoint,
    src_name: String,
    dest: GeoPoint,
    dest_name: String,
    trip_type: TripType,
    earliest_start_time: DateTime<Utc>,
    latest_start_time: DateTime<Utc>,
    vehicle_class: String,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, TripError> {
    value.ok_or_else(|| TripError::Validation(format!("{} is required", field)))
}

fn point(lat: Option<f64>, lng: Option<f64>, prefix: &str) -> Result<GeoPoint, TripError> {
    let lat = required(lat, &format!("{}Lat", prefix))?;
    let lng = required(lng, &format!("{}Lng", prefix))?;
    let p = GeoPoint::new(lat, lng);
    if !p.is_valid() {
        return Err(TripError::Validation(format!(
            "{} coordinates out of range: ({}, {})",
            prefix, lat, lng
        )));
    }
    Ok(p)
}

fn place_name(name: Option<&String>, field: &str) -> Result<String, TripError> {
    match name.map(|n| n.trim()) {
        Some(n) if !n.is_empty() => Ok(n.to_string()),
        _ => Err(TripError::Validation(format!("{} is required", field))),
    }
}

fn validate(draft: &TripDraft) -> Result<NewTrip, TripError> {
    let role = required(draft.role, "role")?;
    let src = point(draft.src_lat, draft.src_lng, "src")?;
    let dest = point(draft.dest_lat, draft.dest_lng, "dest")?;
    let src_name = place_name(draft.src_name.as_ref(), "srcName")?;
    let dest_name = place_name(draft.dest_name.as_ref(), "destName")?;

    let trip_type: TripType = required(draft.trip_type.as_deref(), "tripType")?
        .parse()
        .map_err(|_| TripError::Validation("tripType must be IMMEDIATE or SCHEDULED".into()))?;
    let earliest = required(draft.earliest_start_time, "earliestStartTime")?;
    let latest = match trip_type {
        TripType::Immediate => earliest + immediate_window(),
        TripType::Scheduled => {
            let latest = draft.latest_start_time.ok_or_else(|| {
                TripError::Validation("latestStartTime is required for SCHEDULED trips".into())
            })?;
            if latest <= earliest {
                return Err(TripError::Validation(
                    "latestStartTime must be after earliestStartTime".into(),
                ));
            }
            latest
        }
    };

    Ok(NewTrip {
        creator: draft.actor_id,
        mode: match role {
            Role::Driver => TripMode::DriverPosted,
            Role::Passenger => TripMode::PassengerPosted,
        },
        src,
        src_name,
        dest,
        dest_name,
        trip_type,
        earliest_start_time: earliest,
        latest_start_time: latest,
        vehicle_class: draft
            .vehicle_type
            .clone()
            .unwrap_or_else(|| FareCalculator::DEFAULT_CLASS.to_string()),
    })
}

fn cancel_reason(role: Role) -> &'static str {
    match role {
        Role::Driver => "Driver cancelled the trip",
        Role::Passenger => "Passenger cancelled the trip",
    }
}

impl TripService {
    pub async fn create_trip(&self, draft: TripDraft) -> Result<Trip, TripError> {
        let new = validate(&draft)?;

        let route = match tokio::time::timeout(
            self.settings.router_timeout,
            self.router.route(new.src, new.dest),
        )
        .await
        {
            Ok(Ok(route)) => route,
            Ok(Err(e)) => {
                warn!(creator = %new.creator, "Route lookup failed: {}", e);
                return Err(TripError::RouteUnavailable(e.to_string()));
            }
            Err(_) => {
                warn!(creator = %new.creator, "Route lookup timed out");
                return Err(TripError::RouteUnavailable("router timed out".into()));
            }
        };

        let fare = self.fares.price(
            route.distance_km,
            route.duration_min,
            &new.vehicle_class,
            self.settings.surge_pricing,
        );

        let now = self.clock.now();
        let (driver_id, passenger_id) = match new.mode.owner_role() {
            Role::Driver => (Some(new.creator), None),
            Role::Passenger => (None, Some(new.creator)),
        };
        let trip = Trip {
            id: Uuid::new_v4(),
            driver_id,
            passenger_id,
            src: new.src,
            src_name: new.src_name,
            dest: new.dest,
            dest_name: new.dest_name,
            distance_km: route.distance_km,
            duration_min: route.duration_min,
            route_geometry: route.geometry,
            price: fare.price,
            vehicle_type: fare.vehicle_type,
            trip_type: new.trip_type,
            trip_mode: new.mode,
            earliest_start_time: new.earliest_start_time,
            latest_start_time: new.latest_start_time,
            otp_hash: None,
            otp_expires_at: None,
            otp_verified: false,
            otp_attempts: 0,
            status: TripStatus::Open,
            created_at: now,
            updated_at: now,
        };

        self.store_call("create", self.store.create(&trip)).await?;
        info!(
            trip_id = %trip.id,
            mode = %trip.trip_mode,
            price = trip.price,
            "Trip created"
        );

        self.emit(
            EventType::RideCreated,
            new.creator,
            json!({
                "tripId": trip.id,
                "senderId": new.creator,
                "srcName": trip.src_name,
                "destName": trip.dest_name,
                "price": trip.price,
                "vehicleType": trip.vehicle_type,
                "fare": fare.breakdown,
            }),
        );
        Ok(trip)
    }

    pub async fn request_trip(
        &self,
        trip_id: Uuid,
        requester: Uuid,
        role: Role,
    ) -> Result<Trip, TripError> {
        let mut trip = self.load(trip_id).await?;
        if trip.trip_mode != TripMode::requestable_by(role) {
            return Err(TripError::InvalidMode(match role {
                Role::Driver => "drivers can only request passenger-posted trips",
                Role::Passenger => "passengers can only request driver-posted trips",
            }));
        }
        if trip.is_owner(requester) {
            return Err(TripError::Forbidden("cannot request your own trip"));
        }
        if trip.status != TripStatus::Open {
            return Err(TripError::NotOpen);
        }

        let mut update = TripUpdate {
            status: Some(TripStatus::Requested),
            ..TripUpdate::default()
        };
        match role {
            Role::Driver => update.driver_id = Some(requester),
            Role::Passenger => update.passenger_id = Some(requester),
        }
        self.swap(trip_id, TripStatus::Open, &update).await?;

        trip.status = TripStatus::Requested;
        match role {
            Role::Driver => trip.driver_id = Some(requester),
            Role::Passenger => trip.passenger_id = Some(requester),
        }
        trip.updated_at = self.clock.now();
        info!(trip_id = %trip_id, requester = %requester, "Trip requested");

        if let Some(owner) = trip.owner_id() {
            self.emit(
                EventType::RideRequested,
                owner,
                json!({
                    "tripId": trip.id,
                    "senderId": requester,
                    "srcName": trip.src_name,
                    "destName": trip.dest_name,
                    "price": trip.price,
                }),
            );
        }
        Ok(trip)
    }

    /// Accepts a request and issues the pickup code. On a CONFIRMED trip whose
    /// code has expired or been locked out, issues a replacement instead.
    pub async fn confirm_trip(&self, trip_id: Uuid, owner: Uuid) -> Result<Trip, TripError> {
        let mut trip = self.load(trip_id).await?;
        if !trip.is_owner(owner) {
            return Err(TripError::Forbidden("only the trip owner can confirm a request"));
        }

        let now = self.clock.now();
        let reissue = match trip.status {
            TripStatus::Requested => false,
            TripStatus::Confirmed if !trip.otp_verified && otp_unusable(&trip, now) => true,
            _ => return Err(TripError::NotRequested),
        };
        let passenger = trip.passenger_id.ok_or_else(|| {
            TripError::Internal(anyhow::anyhow!("trip {} has no passenger", trip_id))
        })?;

        let code = otp::generate_code();
        let hash = otp::hash_code(trip_id, &code);
        let expires_at = now + otp::validity();
        let update = TripUpdate {
            status: (!reissue).then_some(TripStatus::Confirmed),
            otp: Some(OtpChange::Issue {
                hash: hash.clone(),
                expires_at,
            }),
            ..TripUpdate::default()
        };
        self.swap(trip_id, trip.status, &update).await?;

        trip.status = TripStatus::Confirmed;
        trip.otp_hash = Some(hash);
        trip.otp_expires_at = Some(expires_at);
        trip.otp_verified = false;
        trip.otp_attempts = 0;
        trip.updated_at = now;

        if reissue {
            info!(trip_id = %trip_id, "Pickup code re-issued");
        } else {
            info!(trip_id = %trip_id, "Trip confirmed");
            if let Some(counterpart) = trip.party(trip.trip_mode.owner_role().counterpart()) {
                self.emit(
                    EventType::RideAccepted,
                    counterpart,
                    json!({
                        "tripId": trip.id,
                        "driverId": trip.driver_id,
                        "passengerId": trip.passenger_id,
                        "status": trip.status,
                    }),
                );
            }
        }
        self.emit(
            EventType::Otp,
            passenger,
            json!({ "tripId": trip.id, "otp": code }),
        );
        Ok(trip)
    }

    /// The driver enters the code the passenger shows at pickup.
    pub async fn verify_otp(
        &self,
        trip_id: Uuid,
        caller: Uuid,
        code: &str,
    ) -> Result<Trip, TripError> {
        let mut trip = self.load(trip_id).await?;
        if trip.driver_id != Some(caller) {
            return Err(TripError::Forbidden("only the trip's driver can verify the pickup code"));
        }
        if trip.status != TripStatus::Confirmed {
            return Err(TripError::WrongState);
        }
        if trip.otp_attempts >= otp::MAX_OTP_ATTEMPTS {
            return Err(TripError::OtpLocked);
        }
        let now = self.clock.now();
        let (Some(hash), Some(expires_at)) = (trip.otp_hash.as_deref(), trip.otp_expires_at) else {
            return Err(TripError::Internal(anyhow::anyhow!(
                "confirmed trip {} has no pickup code",
                trip_id
            )));
        };
        if now >= expires_at {
            return Err(TripError::OtpExpired);
        }

        let observed = hash.to_string();

        if !otp::verify_code(trip_id, code, hash) {
            let update = TripUpdate {
                otp: Some(OtpChange::FailedAttempt),
                otp_guard: Some(observed),
                ..TripUpdate::default()
            };
            return match self.swap(trip_id, TripStatus::Confirmed, &update).await {
                Ok(()) => {
                    warn!(
                        trip_id = %trip_id,
                        attempts = trip.otp_attempts + 1,
                        "Wrong pickup code"
                    );
                    Err(TripError::InvalidOtp)
                }
                Err(TripError::Conflict) => Err(self.otp_refusal(trip_id, TripError::InvalidOtp).await),
                Err(e) => Err(e),
            };
        }

        let update = TripUpdate {
            status: Some(TripStatus::Ongoing),
            otp: Some(OtpChange::Verified),
            otp_guard: Some(observed),
            ..TripUpdate::default()
        };
        match self.swap(trip_id, TripStatus::Confirmed, &update).await {
            Ok(()) => {}
            Err(TripError::Conflict) => {
                return Err(self.otp_refusal(trip_id, TripError::Conflict).await)
            }
            Err(e) => return Err(e),
        }

        trip.status = TripStatus::Ongoing;
        trip.otp_hash = None;
        trip.otp_expires_at = None;
        trip.otp_verified = true;
        trip.otp_attempts = 0;
        trip.updated_at = now;
        info!(trip_id = %trip_id, "Trip started");

        if let Some(passenger) = trip.passenger_id {
            self.emit(
                EventType::RideStarted,
                passenger,
                json!({
                    "tripId": trip.id,
                    "startTime": now,
                    "message": "Your ride has started",
                }),
            );
        }
        Ok(trip)
    }

    /// Why a guarded OTP write changed nothing: the budget ran out under us,
    /// or `otherwise`.
    async fn otp_refusal(&self, trip_id: Uuid, otherwise: TripError) -> TripError {
        match self.load(trip_id).await {
            Ok(trip)
                if trip.status == TripStatus::Confirmed
                    && trip.otp_attempts >= otp::MAX_OTP_ATTEMPTS =>
            {
                warn!(trip_id = %trip_id, "Pickup code locked");
                TripError::OtpLocked
            }
            Ok(_) => otherwise,
            Err(e) => e,
        }
    }

    pub async fn cancel_trip(&self, trip_id: Uuid, caller: Uuid) -> Result<Trip, TripError> {
        let mut trip = self.load(trip_id).await?;
        let role = trip
            .role_of(caller)
            .ok_or(TripError::Forbidden("only a party of the trip can cancel it"))?;
        if !trip.status.is_cancellable() {
            return Err(TripError::TerminalState);
        }

        let update = TripUpdate {
            status: Some(TripStatus::Cancelled),
            ..TripUpdate::default()
        };
        self.swap(trip_id, trip.status, &update).await?;

        trip.status = TripStatus::Cancelled;
        trip.updated_at = self.clock.now();
        info!(trip_id = %trip_id, cancelled_by = %role, "Trip cancelled");

        if let Some(other) = trip.party(role.counterpart()) {
            self.emit(
                EventType::RideCancelled,
                other,
                json!({ "tripId": trip.id, "reason": cancel_reason(role) }),
            );
        }
        Ok(trip)
    }

    pub async fn complete_trip(&self, trip_id: Uuid, caller: Uuid) -> Result<Trip, TripError> {
        let mut trip = self.load(trip_id).await?;
        if trip.driver_id != Some(caller) {
            return Err(TripError::Forbidden("only the trip's driver can complete it"));
        }
        if trip.status != TripStatus::Ongoing {
            return Err(TripError::NotOngoing);
        }

        let update = TripUpdate {
            status: Some(TripStatus::Completed),
            ..TripUpdate::default()
        };
        self.swap(trip_id, TripStatus::Ongoing, &update).await?;

        trip.status = TripStatus::Completed;
        trip.updated_at = self.clock.now();
        info!(trip_id = %trip_id, price = trip.price, "Trip completed");

        if let Some(passenger) = trip.passenger_id {
            self.emit(
                EventType::RideCompleted,
                passenger,
                json!({ "tripId": trip.id, "price": trip.price }),
            );
        }
        Ok(trip)
    }

    /// Hard delete, only by the creator and only while nobody has requested it.
    pub async fn delete_trip(&self, trip_id: Uuid, caller: Uuid) -> Result<(), TripError> {
        let trip = self.load(trip_id).await?;
        if !trip.is_owner(caller) {
            return Err(TripError::Forbidden("only the trip owner can delete it"));
        }
        if trip.status != TripStatus::Open {
            return Err(TripError::NotOpen);
        }
        let deleted = self
            .store_call(
                "delete_if_status",
                self.store.delete_if_status(trip_id, TripStatus::Open),
            )
            .await?;
        if deleted == 0 {
            return Err(TripError::Conflict);
        }
        info!(trip_id = %trip_id, "Trip deleted");
        Ok(())
    }
}

fn otp_unusable(trip: &Trip, now: DateTime<Utc>) -> bool {
    trip.otp_attempts >= otp::MAX_OTP_ATTEMPTS
        || trip.otp_expires_at.map_or(true, |expires_at| now >= expires_at)
}
