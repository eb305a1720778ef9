//! One-time pickup codes.
//!
//! The plaintext code only ever leaves the process inside the OTP
//! notification; the trip row stores `salt$sha256(salt:trip_id:code)`.

use chrono::Duration;
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const OTP_DIGITS: usize = 4;
pub const OTP_VALIDITY_MINUTES: i64 = 5;
/// Wrong codes accepted against a single issued OTP before it is locked.
pub const MAX_OTP_ATTEMPTS: i32 = 5;

pub fn validity() -> Duration {
    Duration::minutes(OTP_VALIDITY_MINUTES)
}

pub fn generate_code() -> String {
    let upper = 10u32.pow(OTP_DIGITS as u32);
    let code = rand::thread_rng().gen_range(0..upper);
    format!("{:0width$}", code, width = OTP_DIGITS)
}

pub fn hash_code(trip_id: Uuid, code: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{}${}", salt, digest(&salt, trip_id, code))
}

pub fn verify_code(trip_id: Uuid, code: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    let actual = digest(salt, trip_id, code.trim());
    // compare the full length regardless of where the first mismatch is
    actual.len() == expected.len()
        && actual
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn digest(salt: &str, trip_id: Uuid, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(trip_id.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    format!("{:x}", hasher.finalize())
}
