use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::models::trip::Role;

/// Commands consumed from the trip command topic. The gateway has already
/// authenticated `actorId`; `role` is a claim and is re-checked against the
/// trip's own party fields. Read commands are answered with a `query_result`
/// notification to the caller.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TripCommand {
    CreateTrip(TripDraft),
    RequestTrip {
        trip_id: Uuid,
        actor_id: Uuid,
        role: Role,
    },
    ConfirmTrip {
        trip_id: Uuid,
        actor_id: Uuid,
    },
    VerifyOtp {
        trip_id: Uuid,
        actor_id: Uuid,
        otp: String,
    },
    CancelTrip {
        trip_id: Uuid,
        actor_id: Uuid,
    },
    CompleteTrip {
        trip_id: Uuid,
        actor_id: Uuid,
    },
    DeleteTrip {
        trip_id: Uuid,
        actor_id: Uuid,
    },
    GetTrip {
        trip_id: Uuid,
        actor_id: Uuid,
    },
    FindOpenTrips {
        actor_id: Uuid,
        role: Role,
        #[serde(deserialize_with = "parse_f64")]
        lat: f64,
        #[serde(deserialize_with = "parse_f64")]
        lng: f64,
        #[serde(default, deserialize_with = "parse_f64_option")]
        radius_km: Option<f64>,
    },
    MyTrips {
        actor_id: Uuid,
        role: Role,
    },
    PendingRequests {
        actor_id: Uuid,
        role: Role,
    },
    FindNearby {
        actor_id: Uuid,
        role: Role,
        #[serde(deserialize_with = "parse_f64")]
        lat: f64,
        #[serde(deserialize_with = "parse_f64")]
        lng: f64,
        #[serde(default, deserialize_with = "parse_f64_option")]
        radius_km: Option<f64>,
    },
    /// Whether a counterpart of the caller's role is live, and where.
    PresenceStatus {
        actor_id: Uuid,
        role: Role,
        target_id: String,
    },
}

impl TripCommand {
    pub fn name(&self) -> &'static str {
        match self {
            TripCommand::CreateTrip(_) => "create_trip",
            TripCommand::RequestTrip { .. } => "request_trip",
            TripCommand::ConfirmTrip { .. } => "confirm_trip",
            TripCommand::VerifyOtp { .. } => "verify_otp",
            TripCommand::CancelTrip { .. } => "cancel_trip",
            TripCommand::CompleteTrip { .. } => "complete_trip",
            TripCommand::DeleteTrip { .. } => "delete_trip",
            TripCommand::GetTrip { .. } => "get_trip",
            TripCommand::FindOpenTrips { .. } => "find_open_trips",
            TripCommand::MyTrips { .. } => "my_trips",
            TripCommand::PendingRequests { .. } => "pending_requests",
            TripCommand::FindNearby { .. } => "find_nearby",
            TripCommand::PresenceStatus { .. } => "presence_status",
        }
    }

    pub fn actor_id(&self) -> Uuid {
        match self {
            TripCommand::CreateTrip(draft) => draft.actor_id,
            TripCommand::RequestTrip { actor_id, .. }
            | TripCommand::ConfirmTrip { actor_id, .. }
            | TripCommand::VerifyOtp { actor_id, .. }
            | TripCommand::CancelTrip { actor_id, .. }
            | TripCommand::CompleteTrip { actor_id, .. }
            | TripCommand::DeleteTrip { actor_id, .. }
            | TripCommand::GetTrip { actor_id, .. }
            | TripCommand::FindOpenTrips { actor_id, .. }
            | TripCommand::MyTrips { actor_id, .. }
            | TripCommand::PendingRequests { actor_id, .. }
            | TripCommand::FindNearby { actor_id, .. }
            | TripCommand::PresenceStatus { actor_id, .. } => *actor_id,
        }
    }

    pub fn trip_id(&self) -> Option<Uuid> {
        match self {
            TripCommand::CreateTrip(_)
            | TripCommand::FindOpenTrips { .. }
            | TripCommand::MyTrips { .. }
            | TripCommand::PendingRequests { .. }
            | TripCommand::FindNearby { .. }
            | TripCommand::PresenceStatus { .. } => None,
            TripCommand::GetTrip { trip_id, .. }
            | TripCommand::RequestTrip { trip_id, .. }
            | TripCommand::ConfirmTrip { trip_id, .. }
            | TripCommand::VerifyOtp { trip_id, .. }
            | TripCommand::CancelTrip { trip_id, .. }
            | TripCommand::CompleteTrip { trip_id, .. }
            | TripCommand::DeleteTrip { trip_id, .. } => Some(*trip_id),
        }
    }
}

/// Unvalidated trip offer as posted by a driver or passenger. Every field the
/// client may omit is optional here so validation can name what is missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDraft {
    pub actor_id: Uuid,
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub src_lat: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub src_lng: Option<f64>,
    pub src_name: Option<String>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub dest_lat: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub dest_lng: Option<f64>,
    pub dest_name: Option<String>,
    pub trip_type: Option<String>,
    pub earliest_start_time: Option<DateTime<Utc>>,
    pub latest_start_time: Option<DateTime<Utc>>,
    pub vehicle_type: Option<String>,
}

/// Presence pushes consumed from the presence topic.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PresenceMessage {
    Online {
        role: Role,
        actor_id: String,
        #[serde(deserialize_with = "parse_f64")]
        lng: f64,
        #[serde(deserialize_with = "parse_f64")]
        lat: f64,
    },
    Heartbeat {
        role: Role,
        actor_id: String,
    },
    Location {
        role: Role,
        actor_id: String,
        #[serde(deserialize_with = "parse_f64")]
        lng: f64,
        #[serde(deserialize_with = "parse_f64")]
        lat: f64,
    },
    Offline {
        role: Role,
        actor_id: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrFloat {
    String(String),
    Float(f64),
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}

fn parse_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    parse_f64_option(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing coordinate"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsing_signed_string_coordinates() {
        let payload = r#"
        {
            "event": "online",
            "role": "DRIVER",
            "actorId": "0848086072",
            "lng": "-100.391404",
            "lat": "+20.652494"
        }
        "#;

        let msg: PresenceMessage = serde_json::from_str(payload).unwrap();
        match msg {
            PresenceMessage::Online {
                role,
                actor_id,
                lng,
                lat,
            } => {
                assert_eq!(role, Role::Driver);
                assert_eq!(actor_id, "0848086072");
                assert_eq!(lng, -100.391404);
                assert_eq!(lat, 20.652494);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_parsing_create_trip_with_blank_coordinate() {
        let payload = r#"
        {
            "command": "create_trip",
            "actorId": "8f8e1d1e-8a43-4a8b-9a7e-0b9d4b7f1c11",
            "role": "PASSENGER",
            "srcLat": 12.97,
            "srcLng": "",
            "srcName": "MG Road",
            "destLat": "12.93",
            "destLng": 77.62,
            "destName": "Koramangala",
            "tripType": "IMMEDIATE",
            "earliestStartTime": "2026-03-01T10:00:00Z"
        }
        "#;

        let cmd: TripCommand = serde_json::from_str(payload).unwrap();
        assert_eq!(cmd.name(), "create_trip");
        match cmd {
            TripCommand::CreateTrip(draft) => {
                assert_eq!(draft.role, Some(Role::Passenger));
                assert_eq!(draft.src_lat, Some(12.97));
                assert_eq!(draft.src_lng, None);
                assert_eq!(draft.dest_lat, Some(12.93));
                assert_eq!(draft.latest_start_time, None);
                assert_eq!(draft.vehicle_type, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parsing_verify_otp_command() {
        let payload = r#"{
            "command": "verify_otp",
            "tripId": "0f6f3c53-5a43-4a3a-8f7e-2a0c1f9d8b22",
            "actorId": "8f8e1d1e-8a43-4a8b-9a7e-0b9d4b7f1c11",
            "otp": "0420"
        }"#;

        let cmd: TripCommand = serde_json::from_str(payload).unwrap();
        assert_eq!(
            cmd.trip_id(),
            Some(Uuid::parse_str("0f6f3c53-5a43-4a3a-8f7e-2a0c1f9d8b22").unwrap())
        );
        assert!(matches!(cmd, TripCommand::VerifyOtp { ref otp, .. } if otp == "0420"));
    }

    #[test]
    fn test_parsing_find_open_trips_with_string_coordinates() {
        let payload = r#"{
            "command": "find_open_trips",
            "actorId": "8f8e1d1e-8a43-4a8b-9a7e-0b9d4b7f1c11",
            "role": "PASSENGER",
            "lat": "12.9756",
            "lng": 77.605
        }"#;

        let cmd: TripCommand = serde_json::from_str(payload).unwrap();
        assert_eq!(cmd.name(), "find_open_trips");
        assert_eq!(cmd.trip_id(), None);
        match cmd {
            TripCommand::FindOpenTrips {
                role,
                lat,
                lng,
                radius_km,
                ..
            } => {
                assert_eq!(role, Role::Passenger);
                assert_eq!((lat, lng), (12.9756, 77.605));
                assert_eq!(radius_km, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_presence_message_rejects_missing_coordinate() {
        let payload = r#"{ "event": "location", "role": "PASSENGER", "actorId": "p1", "lng": "", "lat": 1.0 }"#;
        assert!(serde_json::from_str::<PresenceMessage>(payload).is_err());
    }
}
