// src/models/preservation.rs - Blood inventory batches

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Batches within this many days of expiry are surfaced as near-expiry.
pub const NEAR_EXPIRY_DAYS: i64 = 7;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// ==================== STATUS ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreservationStatus {
    Available,
    Reserved,
    Dispatched,
    Expired,
}

impl PreservationStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Available" => Some(PreservationStatus::Available),
            "Reserved" => Some(PreservationStatus::Reserved),
            "Dispatched" => Some(PreservationStatus::Dispatched),
            "Expired" => Some(PreservationStatus::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PreservationStatus::Available => "Available",
            PreservationStatus::Reserved => "Reserved",
            PreservationStatus::Dispatched => "Dispatched",
            PreservationStatus::Expired => "Expired",
        }
    }

    /// Status a batch moves to after a dispatch leaves `remaining` units.
    pub fn after_dispatch(remaining: i64) -> Self {
        if remaining == 0 {
            PreservationStatus::Dispatched
        } else {
            PreservationStatus::Reserved
        }
    }
}

// ==================== RECORD ====================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Preservation {
    pub id: String,
    pub blood_bank_id: String,
    pub batch_id: String,
    pub blood_type: String,
    pub units: i64,
    pub collection_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub status: String,
    pub storage_location: Option<String>,
    pub donor_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Expiry flags are derived at read time, never stored.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExpiryInfo {
    pub days_until_expiry: i64,
    pub is_near_expiry: bool,
    pub is_expired: bool,
}

pub fn expiry_info(expiry_date: DateTime<Utc>, now: DateTime<Utc>) -> ExpiryInfo {
    let days_until_expiry = (expiry_date - now).num_days();
    let is_expired = expiry_date < now;
    ExpiryInfo {
        days_until_expiry,
        is_near_expiry: !is_expired
            && days_until_expiry > 0
            && days_until_expiry <= NEAR_EXPIRY_DAYS,
        is_expired,
    }
}

/// Batch with its derived expiry flags, the shape every listing returns.
#[derive(Debug, Serialize)]
pub struct PreservationResponse {
    #[serde(flatten)]
    pub preservation: Preservation,
    pub days_until_expiry: i64,
    pub is_near_expiry: bool,
    pub is_expired: bool,
}

impl PreservationResponse {
    pub fn from_record(preservation: Preservation, now: DateTime<Utc>) -> Self {
        let info = expiry_info(preservation.expiry_date, now);
        Self {
            preservation,
            days_until_expiry: info.days_until_expiry,
            is_near_expiry: info.is_near_expiry,
            is_expired: info.is_expired,
        }
    }
}

// ==================== BATCH ID ====================

fn random_base36(len: usize) -> String {
    let mut rng = thread_rng();
    (0..len)
        .map(|_| *BASE36.choose(&mut rng).expect("charset is non-empty") as char)
        .collect()
}

/// `BATCH-<epoch-ms>-<6-char base36>`
pub fn generate_batch_id() -> String {
    format!("BATCH-{}-{}", Utc::now().timestamp_millis(), random_base36(6))
}

pub(crate) fn random_base36_suffix(len: usize) -> String {
    random_base36(len)
}

// ==================== REQUEST STRUCTS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePreservationRequest {
    #[serde(alias = "bloodType")]
    #[validate(length(min = 1, message = "Blood type is required"))]
    pub blood_type: String,
    #[validate(range(min = 1, max = 10000, message = "Units must be at least 1"))]
    pub units: i64,
    #[serde(alias = "collectionDate")]
    pub collection_date: Option<DateTime<Utc>>,
    #[serde(alias = "expiryDate")]
    pub expiry_date: DateTime<Utc>,
    #[serde(alias = "storageLocation")]
    #[validate(length(max = 255, message = "Storage location too long"))]
    pub storage_location: Option<String>,
    #[serde(alias = "donorInfo")]
    #[validate(length(max = 500, message = "Donor info too long"))]
    pub donor_info: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreservationQuery {
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::is_valid_batch_id;
    use chrono::Duration;

    #[test]
    fn test_status_after_dispatch() {
        assert_eq!(
            PreservationStatus::after_dispatch(0),
            PreservationStatus::Dispatched
        );
        assert_eq!(
            PreservationStatus::after_dispatch(3),
            PreservationStatus::Reserved
        );
    }

    #[test]
    fn test_expiry_info_near_window() {
        let now = Utc::now();
        let info = expiry_info(now + Duration::days(3), now);
        assert!(info.is_near_expiry);
        assert!(!info.is_expired);

        let info = expiry_info(now + Duration::days(30), now);
        assert!(!info.is_near_expiry);
        assert!(!info.is_expired);
    }

    #[test]
    fn test_expiry_info_expired() {
        let now = Utc::now();
        let info = expiry_info(now - Duration::days(1), now);
        assert!(info.is_expired);
        assert!(!info.is_near_expiry);
        assert!(info.days_until_expiry < 0);
    }

    #[test]
    fn test_generate_batch_id_format() {
        let id = generate_batch_id();
        assert!(is_valid_batch_id(&id), "unexpected batch id: {}", id);
    }

    #[test]
    fn test_batch_ids_are_unique_enough() {
        let a = generate_batch_id();
        let b = generate_batch_id();
        assert_ne!(a, b);
    }
}
