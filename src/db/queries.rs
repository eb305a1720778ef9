pub const INSERT_TRIP: &str = r#"
INSERT INTO trips (
    id, driver_id, passenger_id,
    src_lat, src_lng, src_name, dest_lat, dest_lng, dest_name,
    distance_km, duration_min, route_geometry,
    price, vehicle_type, trip_type, trip_mode,
    earliest_start_time, latest_start_time,
    otp_hash, otp_expires_at, otp_verified, otp_attempts,
    status, created_at, updated_at
) VALUES (
    $1, $2, $3,
    $4, $5, $6, $7, $8, $9,
    $10, $11, $12,
    $13, $14, $15, $16,
    $17, $18,
    $19, $20, $21, $22,
    $23, $24, $25
);
"#;

pub const SELECT_TRIP_BY_ID: &str = r#"
SELECT * FROM trips WHERE id = $1;
"#;

// Compare-and-swap on status. NULL parameters leave the column untouched;
// $6 = true replaces the OTP columns wholesale (issue or clear).
// A non-NULL $11 also pins the code hash and requires attempts below $12.
pub const CONDITIONAL_UPDATE_TRIP: &str = r#"
UPDATE trips
SET status = COALESCE($3, status),
    driver_id = COALESCE($4, driver_id),
    passenger_id = COALESCE($5, passenger_id),
    otp_hash = CASE WHEN $6 THEN $7 ELSE otp_hash END,
    otp_expires_at = CASE WHEN $6 THEN $8 ELSE otp_expires_at END,
    otp_verified = COALESCE($9, otp_verified),
    otp_attempts = CASE WHEN $6 THEN 0 ELSE otp_attempts + $10 END,
    updated_at = NOW()
WHERE id = $1 AND status = $2
  AND ($11::text IS NULL OR (otp_hash = $11 AND otp_attempts < $12));
"#;

pub const DELETE_TRIP_IF_STATUS: &str = r#"
DELETE FROM trips WHERE id = $1 AND status = $2;
"#;

// Pickup distance in km by the spherical law of cosines.
// Bind order: lat, lng, lat.
pub const PICKUP_DISTANCE_KM: [&str; 4] = [
    "6371 * acos(GREATEST(-1.0, LEAST(1.0, cos(radians(",
    ")) * cos(radians(src_lat)) * cos(radians(src_lng) - radians(",
    ")) + sin(radians(",
    ")) * sin(radians(src_lat)))))",
];
