//! Fare calculation from route distance and duration.
//!
//! `price = ceil(max(base + km * per_km + min * per_min [* surge], minimum))`

use serde::Serialize;
use tracing::warn;

use crate::models::trip::VehicleType;

pub const SURGE_MULTIPLIER: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FareRule {
    pub base_fare: f64,
    pub per_km_rate: f64,
    pub per_minute_rate: f64,
    pub minimum_fare: f64,
}

const BIKE_RULE: FareRule = FareRule {
    base_fare: 15.0,
    per_km_rate: 6.0,
    per_minute_rate: 0.5,
    minimum_fare: 20.0,
};

const SCOOTY_RULE: FareRule = FareRule {
    base_fare: 15.0,
    per_km_rate: 6.0,
    per_minute_rate: 0.5,
    minimum_fare: 20.0,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FareBreakdown {
    pub base_fare: f64,
    pub distance_cost: f64,
    pub time_cost: f64,
    pub surge_applied: bool,
    /// Set when the requested vehicle class was unknown and the default was priced instead.
    pub fallback_class: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fare {
    pub price: i32,
    pub vehicle_type: VehicleType,
    pub breakdown: FareBreakdown,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FareCalculator;

impl FareCalculator {
    pub const DEFAULT_CLASS: VehicleType = VehicleType::Bike;

    pub fn rule(vehicle_type: VehicleType) -> FareRule {
        match vehicle_type {
            VehicleType::Bike => BIKE_RULE,
            VehicleType::Scooty => SCOOTY_RULE,
        }
    }

    /// Prices a route. Unknown vehicle classes are priced as the default class.
    pub fn price(&self, distance_km: f64, duration_min: i32, vehicle_class: &str, surge: bool) -> Fare {
        let (vehicle_type, fallback_class) = match vehicle_class.parse::<VehicleType>() {
            Ok(v) => (v, false),
            Err(_) => {
                warn!(
                    vehicle_class,
                    fallback = %Self::DEFAULT_CLASS,
                    "Unknown vehicle class, pricing with default"
                );
                (Self::DEFAULT_CLASS, true)
            }
        };
        let rule = Self::rule(vehicle_type);

        let distance_cost = distance_km * rule.per_km_rate;
        let time_cost = f64::from(duration_min) * rule.per_minute_rate;

        let mut total = rule.base_fare + distance_cost + time_cost;
        if surge {
            total *= SURGE_MULTIPLIER;
        }

        Fare {
            price: total.max(rule.minimum_fare).ceil() as i32,
            vehicle_type,
            breakdown: FareBreakdown {
                base_fare: rule.base_fare,
                distance_cost: round2(distance_cost),
                time_cost: round2(time_cost),
                surge_applied: surge,
                fallback_class,
            },
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
