//! Trip negotiation.
//!
//! `OPEN -> REQUESTED -> CONFIRMED -> ONGOING -> COMPLETED`, with `CANCELLED`
//! reachable from the first three. Every transition is a compare-and-swap on
//! the status the caller observed, and authorization is derived from the
//! trip's own party fields rather than from the caller's role claim.

use chrono::Duration as ChronoDuration;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::TripError;
use crate::fare::FareCalculator;
use crate::models::notification::{EventType, Notification};
use crate::models::trip::{Trip, TripStatus, TripUpdate};
use crate::notify::Notifier;
use crate::presence::PresencePools;
use crate::router::Router;
use crate::store::TripStore;

mod lifecycle;
mod search;

/// Length of the start window of an IMMEDIATE trip.
pub const IMMEDIATE_WINDOW_MINUTES: i64 = 15;

pub fn immediate_window() -> ChronoDuration {
    ChronoDuration::minutes(IMMEDIATE_WINDOW_MINUTES)
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub surge_pricing: bool,
    pub router_timeout: Duration,
    pub store_timeout: Duration,
    pub presence_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            surge_pricing: false,
            router_timeout: Duration::from_secs(5),
            store_timeout: Duration::from_secs(3),
            presence_timeout: Duration::from_secs(2),
        }
    }
}

pub struct TripService {
    store: Arc<dyn TripStore>,
    router: Arc<dyn Router>,
    fares: FareCalculator,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    presence: PresencePools,
    settings: ServiceSettings,
}

impl TripService {
    pub fn new(
        store: Arc<dyn TripStore>,
        router: Arc<dyn Router>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        presence: PresencePools,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            router,
            fares: FareCalculator,
            notifier,
            clock,
            presence,
            settings,
        }
    }

    /// Bounds a trip store call and maps its failure to `StoreUnavailable`.
    async fn store_call<T, F>(&self, op: &'static str, fut: F) -> Result<T, TripError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.settings.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(op, "Trip store call failed: {:#}", e);
                Err(TripError::StoreUnavailable(e.to_string()))
            }
            Err(_) => {
                error!(op, timeout = ?self.settings.store_timeout, "Trip store call timed out");
                Err(TripError::StoreUnavailable(format!("{} timed out", op)))
            }
        }
    }

    async fn load(&self, trip_id: Uuid) -> Result<Trip, TripError> {
        self.store_call("find_by_id", self.store.find_by_id(trip_id))
            .await?
            .ok_or(TripError::NotFound)
    }

    /// Applies `update` if the trip is still in `expected`; a lost race is `Conflict`.
    async fn swap(
        &self,
        trip_id: Uuid,
        expected: TripStatus,
        update: &TripUpdate,
    ) -> Result<(), TripError> {
        let changed = self
            .store_call(
                "conditional_update",
                self.store.conditional_update(trip_id, expected, update),
            )
            .await?;
        if changed == 0 {
            return Err(TripError::Conflict);
        }
        Ok(())
    }

    /// Tells the caller why their command was refused.
    pub fn reject(&self, actor: Uuid, command: &str, trip_id: Option<Uuid>, err: &TripError) {
        self.emit(
            EventType::CommandRejected,
            actor,
            json!({
                "command": command,
                "tripId": trip_id,
                "code": err.code(),
                "message": err.to_string(),
            }),
        );
    }

    /// Answers a read command.
    pub fn reply(&self, actor: Uuid, query: &str, result: Value) {
        self.emit(
            EventType::QueryResult,
            actor,
            json!({ "query": query, "result": result }),
        );
    }

    fn emit(&self, event_type: EventType, recipient: Uuid, payload: Value) {
        self.notifier.notify(Notification::new(
            event_type,
            recipient,
            payload,
            self.clock.now(),
        ));
    }
}
