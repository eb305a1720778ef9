use serde_json::json;
use tracing::{error, info, warn};

use crate::error::TripError;
use crate::geo::GeoPoint;
use crate::models::message::TripCommand;
use crate::trips::TripService;

pub async fn process_command(service: &TripService, payload: &[u8]) -> anyhow::Result<()> {
    // 1. Parse JSON
    let command: TripCommand = match serde_json::from_slice(payload) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse trip command: {}", e);
            return Ok(());
        }
    };

    let name = command.name();
    let actor = command.actor_id();
    let trip_id = command.trip_id();
    info!(command = name, actor = %actor, trip_id = ?trip_id, "Processing command");

    // 2. Dispatch
    if let Err(e) = execute(service, name, command).await {
        if e.is_retryable() || matches!(e, TripError::Internal(_)) {
            error!(command = name, actor = %actor, trip_id = ?trip_id, code = e.code(), "Command failed: {}", e);
        } else {
            warn!(command = name, actor = %actor, trip_id = ?trip_id, code = e.code(), "Command rejected: {}", e);
        }
        // 3. Tell the caller
        service.reject(actor, name, trip_id, &e);
    }

    Ok(())
}

async fn execute(service: &TripService, name: &str, command: TripCommand) -> Result<(), TripError> {
    match command {
        TripCommand::CreateTrip(draft) => service.create_trip(draft).await.map(drop),
        TripCommand::RequestTrip {
            trip_id,
            actor_id,
            role,
        } => service.request_trip(trip_id, actor_id, role).await.map(drop),
        TripCommand::ConfirmTrip { trip_id, actor_id } => {
            service.confirm_trip(trip_id, actor_id).await.map(drop)
        }
        TripCommand::VerifyOtp {
            trip_id,
            actor_id,
            otp,
        } => service.verify_otp(trip_id, actor_id, &otp).await.map(drop),
        TripCommand::CancelTrip { trip_id, actor_id } => {
            service.cancel_trip(trip_id, actor_id).await.map(drop)
        }
        TripCommand::CompleteTrip { trip_id, actor_id } => {
            service.complete_trip(trip_id, actor_id).await.map(drop)
        }
        TripCommand::DeleteTrip { trip_id, actor_id } => {
            service.delete_trip(trip_id, actor_id).await
        }
        TripCommand::GetTrip { trip_id, actor_id } => {
            let trip = service.get_trip(trip_id, actor_id).await?;
            service.reply(actor_id, name, json!(trip));
            Ok(())
        }
        TripCommand::FindOpenTrips {
            actor_id,
            role,
            lat,
            lng,
            radius_km,
        } => {
            let matches = service
                .find_open_trips(role, GeoPoint::new(lat, lng), radius_km)
                .await?;
            service.reply(actor_id, name, json!(matches));
            Ok(())
        }
        TripCommand::MyTrips { actor_id, role } => {
            let trips = service.my_trips(actor_id, role).await?;
            service.reply(actor_id, name, json!(trips));
            Ok(())
        }
        TripCommand::PendingRequests { actor_id, role } => {
            let trips = service.pending_requests(actor_id, role).await?;
            service.reply(actor_id, name, json!(trips));
            Ok(())
        }
        TripCommand::FindNearby {
            actor_id,
            role,
            lat,
            lng,
            radius_km,
        } => {
            let actors = service
                .find_nearby_counterparts(role, GeoPoint::new(lat, lng), radius_km)
                .await?;
            service.reply(actor_id, name, json!(actors));
            Ok(())
        }
        TripCommand::PresenceStatus {
            actor_id,
            role,
            target_id,
        } => {
            let presence = service.presence_of(role.counterpart(), &target_id).await?;
            service.reply(actor_id, name, json!(presence));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::EventType;
    use crate::models::trip::{Role, TripStatus};
    use crate::presence::PresenceIndex;
    use crate::trips::testing::{draft, Harness};
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_create_and_request_through_commands() {
        let mut h = Harness::new();
        let driver = Uuid::new_v4();
        let passenger = Uuid::new_v4();

        let payload = json!({
            "command": "create_trip",
            "actorId": driver,
            "role": "DRIVER",
            "srcLat": "12.9756",
            "srcLng": 77.6050,
            "srcName": "MG Road",
            "destLat": 12.9352,
            "destLng": 77.6245,
            "destName": "Koramangala",
            "tripType": "IMMEDIATE",
            "earliestStartTime": "2026-03-01T10:00:00Z",
            "vehicleType": "SCOOTY"
        });
        process_command(&h.service, payload.to_string().as_bytes())
            .await
            .unwrap();

        let created = h.events();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].event_type, EventType::RideCreated);
        let trip_id: Uuid = serde_json::from_value(created[0].payload["tripId"].clone()).unwrap();

        let payload = json!({
            "command": "request_trip",
            "tripId": trip_id,
            "actorId": passenger,
            "role": "PASSENGER"
        });
        process_command(&h.service, payload.to_string().as_bytes())
            .await
            .unwrap();

        let stored = h.stored(trip_id).await.unwrap();
        assert_eq!(stored.status, TripStatus::Requested);
        assert_eq!(stored.passenger_id, Some(passenger));
        assert_eq!(h.events()[0].event_type, EventType::RideRequested);
    }

    #[tokio::test]
    async fn test_rejected_command_is_reported_to_the_caller() {
        let mut h = Harness::new();
        let driver = Uuid::new_v4();
        let trip = h.service.create_trip(draft(driver, Role::Driver)).await.unwrap();
        h.events();

        let other_driver = Uuid::new_v4();
        let payload = json!({
            "command": "request_trip",
            "tripId": trip.id,
            "actorId": other_driver,
            "role": "DRIVER"
        });
        process_command(&h.service, payload.to_string().as_bytes())
            .await
            .unwrap();

        let events = h.events();
        assert_eq!(events.len(), 1);
        let rejected = &events[0];
        assert_eq!(rejected.event_type, EventType::CommandRejected);
        assert_eq!(rejected.recipient_id, other_driver.to_string());
        assert_eq!(rejected.payload["command"], "request_trip");
        assert_eq!(rejected.payload["code"], "INVALID_MODE");
        assert_eq!(rejected.payload["tripId"], trip.id.to_string());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let mut h = Harness::new();
        process_command(&h.service, b"{\"command\":\"teleport\"}")
            .await
            .unwrap();
        process_command(&h.service, b"not json").await.unwrap();
        assert!(h.events().is_empty());
    }

    #[tokio::test]
    async fn test_open_trip_search_replies_to_the_caller() {
        let mut h = Harness::new();
        let driver = Uuid::new_v4();
        let trip = h.service.create_trip(draft(driver, Role::Driver)).await.unwrap();
        h.events();

        let passenger = Uuid::new_v4();
        let payload = json!({
            "command": "find_open_trips",
            "actorId": passenger,
            "role": "PASSENGER",
            "lat": "12.9756",
            "lng": "77.6050",
            "radiusKm": 2
        });
        process_command(&h.service, payload.to_string().as_bytes())
            .await
            .unwrap();

        let events = h.events();
        assert_eq!(events.len(), 1);
        let reply = &events[0];
        assert_eq!(reply.event_type, EventType::QueryResult);
        assert_eq!(reply.recipient_id, passenger.to_string());
        assert_eq!(reply.payload["query"], "find_open_trips");
        let results = reply.payload["result"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["trip"]["id"], trip.id.to_string());
        assert_eq!(results[0]["distanceKm"], 0.0);
        assert!(results[0]["trip"].get("otpHash").is_none());
    }

    #[tokio::test]
    async fn test_private_trip_read_is_rejected() {
        let mut h = Harness::new();
        let driver = Uuid::new_v4();
        let trip = h.service.create_trip(draft(driver, Role::Driver)).await.unwrap();
        h.service
            .request_trip(trip.id, Uuid::new_v4(), Role::Passenger)
            .await
            .unwrap();
        h.events();

        let stranger = Uuid::new_v4();
        let payload = json!({ "command": "get_trip", "tripId": trip.id, "actorId": stranger });
        process_command(&h.service, payload.to_string().as_bytes())
            .await
            .unwrap();
        let events = h.events();
        assert_eq!(events[0].event_type, EventType::CommandRejected);
        assert_eq!(events[0].payload["code"], "FORBIDDEN");

        let payload = json!({ "command": "get_trip", "tripId": trip.id, "actorId": driver });
        process_command(&h.service, payload.to_string().as_bytes())
            .await
            .unwrap();
        let events = h.events();
        assert_eq!(events[0].event_type, EventType::QueryResult);
        assert_eq!(events[0].payload["result"]["status"], "REQUESTED");
    }

    #[tokio::test]
    async fn test_party_and_presence_queries() {
        let mut h = Harness::new();
        let driver = Uuid::new_v4();
        let passenger = Uuid::new_v4();
        let trip = h.service.create_trip(draft(driver, Role::Driver)).await.unwrap();
        h.service
            .request_trip(trip.id, passenger, Role::Passenger)
            .await
            .unwrap();
        h.drivers.mark_online("d1", 77.6051, 12.9757).await.unwrap();
        h.events();

        for (command, extra) in [
            ("my_trips", json!({})),
            ("pending_requests", json!({})),
            ("find_nearby", json!({ "lat": 12.9756, "lng": 77.6050 })),
            ("presence_status", json!({ "targetId": "d1" })),
        ] {
            let mut payload = json!({
                "command": command,
                "actorId": passenger,
                "role": "PASSENGER"
            });
            payload
                .as_object_mut()
                .unwrap()
                .extend(extra.as_object().unwrap().clone());
            process_command(&h.service, payload.to_string().as_bytes())
                .await
                .unwrap();
        }

        let events = h.events();
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.event_type == EventType::QueryResult));
        assert_eq!(events[0].payload["result"][0]["id"], trip.id.to_string());
        assert_eq!(events[1].payload["result"][0]["id"], trip.id.to_string());
        assert_eq!(events[2].payload["result"][0]["actorId"], "d1");
        assert_eq!(events[3].payload["result"]["online"], true);
        assert_eq!(events[3].payload["result"]["lat"], 12.9757);
    }
}
