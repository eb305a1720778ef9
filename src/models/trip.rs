use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::geo::GeoPoint;

/// Declares a string-backed enum stored as TEXT and sent over the wire in
/// SCREAMING_SNAKE_CASE.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(anyhow::anyhow!(concat!("invalid ", stringify!($name), ": {}"), other)),
                }
            }
        }
    };
}

text_enum!(TripStatus {
    Open => "OPEN",
    Requested => "REQUESTED",
    Confirmed => "CONFIRMED",
    Ongoing => "ONGOING",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Expired => "EXPIRED",
});

text_enum!(TripMode {
    DriverPosted => "DRIVER_POSTED",
    PassengerPosted => "PASSENGER_POSTED",
});

text_enum!(TripType {
    Immediate => "IMMEDIATE",
    Scheduled => "SCHEDULED",
});

text_enum!(VehicleType {
    Bike => "BIKE",
    Scooty => "SCOOTY",
});

text_enum!(Role {
    Driver => "DRIVER",
    Passenger => "PASSENGER",
});

impl TripStatus {
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            TripStatus::Open | TripStatus::Requested | TripStatus::Confirmed
        )
    }
}

impl TripMode {
    /// The role of the party that posted (and owns) a trip in this mode.
    pub fn owner_role(&self) -> Role {
        match self {
            TripMode::DriverPosted => Role::Driver,
            TripMode::PassengerPosted => Role::Passenger,
        }
    }

    /// The mode of trips this role is allowed to request.
    pub fn requestable_by(role: Role) -> TripMode {
        match role {
            Role::Driver => TripMode::PassengerPosted,
            Role::Passenger => TripMode::DriverPosted,
        }
    }
}

impl Role {
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Driver => Role::Passenger,
            Role::Passenger => Role::Driver,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: Uuid,
    pub driver_id: Option<Uuid>,
    pub passenger_id: Option<Uuid>,

    pub src: GeoPoint,
    pub src_name: String,
    pub dest: GeoPoint,
    pub dest_name: String,

    pub distance_km: f64,
    pub duration_min: i32,
    pub route_geometry: String,

    pub price: i32,
    pub vehicle_type: VehicleType,

    pub trip_type: TripType,
    pub trip_mode: TripMode,
    pub earliest_start_time: DateTime<Utc>,
    pub latest_start_time: DateTime<Utc>,

    #[serde(skip_serializing)]
    pub otp_hash: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub otp_verified: bool,
    #[serde(skip_serializing)]
    pub otp_attempts: i32,

    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn party(&self, role: Role) -> Option<Uuid> {
        match role {
            Role::Driver => self.driver_id,
            Role::Passenger => self.passenger_id,
        }
    }

    pub fn owner_id(&self) -> Option<Uuid> {
        self.party(self.trip_mode.owner_role())
    }

    pub fn is_owner(&self, actor: Uuid) -> bool {
        self.owner_id() == Some(actor)
    }

    /// The role `actor` holds on this trip, if any.
    pub fn role_of(&self, actor: Uuid) -> Option<Role> {
        if self.driver_id == Some(actor) {
            Some(Role::Driver)
        } else if self.passenger_id == Some(actor) {
            Some(Role::Passenger)
        } else {
            None
        }
    }
}

/// Flat row shape of the `trips` table.
#[derive(Debug, FromRow)]
pub struct TripRow {
    pub id: Uuid,
    pub driver_id: Option<Uuid>,
    pub passenger_id: Option<Uuid>,
    pub src_lat: f64,
    pub src_lng: f64,
    pub src_name: String,
    pub dest_lat: f64,
    pub dest_lng: f64,
    pub dest_name: String,
    pub distance_km: f64,
    pub duration_min: i32,
    pub route_geometry: String,
    pub price: i32,
    pub vehicle_type: String,
    pub trip_type: String,
    pub trip_mode: String,
    pub earliest_start_time: DateTime<Utc>,
    pub latest_start_time: DateTime<Utc>,
    pub otp_hash: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub otp_verified: bool,
    pub otp_attempts: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = anyhow::Error;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        Ok(Trip {
            id: row.id,
            driver_id: row.driver_id,
            passenger_id: row.passenger_id,
            src: GeoPoint::new(row.src_lat, row.src_lng),
            src_name: row.src_name,
            dest: GeoPoint::new(row.dest_lat, row.dest_lng),
            dest_name: row.dest_name,
            distance_km: row.distance_km,
            duration_min: row.duration_min,
            route_geometry: row.route_geometry,
            price: row.price,
            vehicle_type: row.vehicle_type.parse()?,
            trip_type: row.trip_type.parse()?,
            trip_mode: row.trip_mode.parse()?,
            earliest_start_time: row.earliest_start_time,
            latest_start_time: row.latest_start_time,
            otp_hash: row.otp_hash,
            otp_expires_at: row.otp_expires_at,
            otp_verified: row.otp_verified,
            otp_attempts: row.otp_attempts,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Change set applied by a conditional update. `None` leaves a column as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripUpdate {
    pub status: Option<TripStatus>,
    pub driver_id: Option<Uuid>,
    pub passenger_id: Option<Uuid>,
    pub otp: Option<OtpChange>,
    /// Also require the stored code hash to equal this and the attempt
    /// counter to be below [`crate::otp::MAX_OTP_ATTEMPTS`].
    pub otp_guard: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OtpChange {
    /// Store a fresh code hash and reset the attempt counter.
    Issue {
        hash: String,
        expires_at: DateTime<Utc>,
    },
    /// Mark the handoff proven and drop the hash.
    Verified,
    /// Count one wrong code against the current hash.
    FailedAttempt,
}
