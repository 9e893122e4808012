// src/models/emergency.rs - Emergencies and donor pledges

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::account::AccountKind;

/// Emergencies stay open for this long unless fulfilled or cancelled.
pub const EMERGENCY_TTL_HOURS: i64 = 24;

/// Reputation granted to a donor for every recorded pledge.
pub const PLEDGE_REPUTATION_REWARD: i64 = 5;

// ==================== STATUS & PRIORITY ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmergencyStatus {
    Active,
    Fulfilled,
    Cancelled,
}

impl EmergencyStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(EmergencyStatus::Active),
            "Fulfilled" => Some(EmergencyStatus::Fulfilled),
            "Cancelled" => Some(EmergencyStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyStatus::Active => "Active",
            EmergencyStatus::Fulfilled => "Fulfilled",
            EmergencyStatus::Cancelled => "Cancelled",
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Sort weight, highest first in listings.
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Critical => 4,
        }
    }
}

/// SQL fragment ordering rows by priority weight; keep in sync with
/// `Priority::rank`.
pub const PRIORITY_ORDER_SQL: &str = "CASE priority \
     WHEN 'Critical' THEN 4 WHEN 'High' THEN 3 \
     WHEN 'Medium' THEN 2 ELSE 1 END DESC";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum PledgeStatus {
    Pledged,
    Confirmed,
    Completed,
    Cancelled,
}

// ==================== RECORDS ====================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Emergency {
    pub id: String,
    pub creator_kind: String,
    pub creator_id: String,
    pub creator_name: String,
    pub blood_type: String,
    pub units_needed: i64,
    pub units_pledged: i64,
    pub units_received: i64,
    pub city: String,
    pub location: String,
    pub contact_phone: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub expires_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Emergency {
    pub fn creator_kind(&self) -> Option<AccountKind> {
        AccountKind::from_str(&self.creator_kind)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmergencyResponse {
    pub id: String,
    pub emergency_id: String,
    pub donor_id: String,
    pub donor_name: String,
    pub units_pledged: i64,
    pub status: String,
    pub responded_at: DateTime<Utc>,
}

// ==================== DERIVED TRANSITIONS ====================

/// The fulfillment invariant: an Active emergency becomes Fulfilled as soon
/// as received units cover the need. Applied explicitly by every path that
/// changes `units_received`; terminal states are never resurrected.
pub fn resolve_fulfillment(
    status: EmergencyStatus,
    units_received: i64,
    units_needed: i64,
) -> EmergencyStatus {
    if status == EmergencyStatus::Active && units_received >= units_needed {
        EmergencyStatus::Fulfilled
    } else {
        status
    }
}

pub fn default_expiry(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::hours(EMERGENCY_TTL_HOURS)
}

// ==================== REQUEST STRUCTS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEmergencyRequest {
    #[serde(alias = "bloodType")]
    #[validate(length(min = 1, message = "Blood type is required"))]
    pub blood_type: String,
    #[serde(alias = "unitsNeeded")]
    #[validate(range(min = 1, max = 10000, message = "Units needed must be at least 1"))]
    pub units_needed: i64,
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RespondToEmergencyRequest {
    #[serde(alias = "emergencyId")]
    #[validate(length(min = 1, message = "Emergency id is required"))]
    pub emergency_id: String,
    #[serde(alias = "unitsPledged")]
    #[validate(range(min = 1, max = 10000, message = "Pledged units must be at least 1"))]
    pub units_pledged: i64,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub city: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub city: Option<String>,
    pub limit: Option<i64>,
}
