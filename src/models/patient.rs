// src/models/patient.rs - Hospital-managed patient records
//
// Distinct from `PatientUser`: these are the hospital's internal patients,
// owned and mutated only through hospital endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatientStatus {
    Requesting,
    Partial,
    Received,
}

impl PatientStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Requesting" => Some(PatientStatus::Requesting),
            "Partial" => Some(PatientStatus::Partial),
            "Received" => Some(PatientStatus::Received),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatientStatus::Requesting => "Requesting",
            PatientStatus::Partial => "Partial",
            PatientStatus::Received => "Received",
        }
    }
}

/// Status is a pure function of the unit counters, recomputed on every
/// mutation rather than stored behind a save hook.
pub fn derive_status(units_received: i64, units_needed: i64) -> PatientStatus {
    if units_received <= 0 {
        PatientStatus::Requesting
    } else if units_received < units_needed {
        PatientStatus::Partial
    } else {
        PatientStatus::Received
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Patient {
    pub id: String,
    pub hospital_id: String,
    pub name: String,
    pub age: i64,
    pub blood_type: String,
    pub units_needed: i64,
    pub units_received: i64,
    pub status: String,
    pub contact_phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==================== REQUEST STRUCTS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePatientRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(range(min = 0, max = 150, message = "Age out of range"))]
    pub age: i64,
    #[serde(alias = "bloodType")]
    #[validate(length(min = 1, message = "Blood type is required"))]
    pub blood_type: String,
    #[serde(alias = "unitsNeeded")]
    #[validate(range(min = 1, max = 10000, message = "Units needed must be at least 1"))]
    pub units_needed: i64,
    #[serde(alias = "contactPhone")]
    pub contact_phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordReceivedRequest {
    #[validate(range(min = 1, max = 10000, message = "Units must be at least 1"))]
    pub units: i64,
}
