// src/models/blood_request.rs - Patient-initiated blood requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_CANCELLATION_REASON: &str = "Cancelled by requester";

// ==================== STATUS ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloodRequestStatus {
    Pending,
    Accepted,
    Fulfilled,
    Cancelled,
}

impl BloodRequestStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(BloodRequestStatus::Pending),
            "Accepted" => Some(BloodRequestStatus::Accepted),
            "Fulfilled" => Some(BloodRequestStatus::Fulfilled),
            "Cancelled" => Some(BloodRequestStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodRequestStatus::Pending => "Pending",
            BloodRequestStatus::Accepted => "Accepted",
            BloodRequestStatus::Fulfilled => "Fulfilled",
            BloodRequestStatus::Cancelled => "Cancelled",
        }
    }

    /// Only one bank may accept, and only while the request is open.
    pub fn can_accept(&self) -> bool {
        matches!(self, BloodRequestStatus::Pending)
    }

    /// Fulfilled and Cancelled are terminal for cancellation; an Accepted
    /// request may still be withdrawn.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            BloodRequestStatus::Pending | BloodRequestStatus::Accepted
        )
    }

    pub fn can_fulfill(&self) -> bool {
        matches!(self, BloodRequestStatus::Accepted)
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
pub enum BankResponseStatus {
    Interested,
    Accepted,
    Declined,
}

// ==================== RECORDS ====================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BloodRequest {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub age: i64,
    pub blood_group: String,
    pub units_needed: i64,
    pub phone: String,
    pub city: String,
    pub location: String,
    pub urgency_level: String,
    pub status: String,
    pub description: Option<String>,
    pub accepted_by_id: Option<String>,
    pub accepted_by_name: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BloodRequestResponse {
    pub id: String,
    pub request_id: String,
    pub blood_bank_id: String,
    pub blood_bank_name: String,
    pub status: String,
    pub message: Option<String>,
    pub responded_at: DateTime<Utc>,
}

// ==================== REQUEST STRUCTS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBloodRequestRequest {
    #[serde(alias = "unitsNeeded")]
    #[validate(range(min = 1, max = 10000, message = "Units needed must be at least 1"))]
    pub units_needed: i64,
    #[serde(alias = "urgencyLevel")]
    pub urgency_level: Option<String>,
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelBloodRequestRequest {
    #[serde(alias = "cancellationReason")]
    #[validate(length(max = 500, message = "Reason cannot exceed 500 characters"))]
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BankResponseRequest {
    #[validate(length(min = 1, message = "Status is required"))]
    pub status: String,
    #[validate(length(max = 500, message = "Message cannot exceed 500 characters"))]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenRequestsQuery {
    pub city: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_accept_only_from_pending() {
        assert!(BloodRequestStatus::Pending.can_accept());
        assert!(!BloodRequestStatus::Accepted.can_accept());
        assert!(!BloodRequestStatus::Fulfilled.can_accept());
        assert!(!BloodRequestStatus::Cancelled.can_accept());
    }

    #[test]
    fn test_cancel_guards() {
        assert!(BloodRequestStatus::Pending.can_cancel());
        assert!(BloodRequestStatus::Accepted.can_cancel());
        assert!(!BloodRequestStatus::Fulfilled.can_cancel());
        assert!(!BloodRequestStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_fulfill_only_from_accepted() {
        assert!(BloodRequestStatus::Accepted.can_fulfill());
        assert!(!BloodRequestStatus::Pending.can_fulfill());
        assert!(!BloodRequestStatus::Fulfilled.can_fulfill());
    }

    #[test]
    fn test_bank_response_status_parse() {
        assert_eq!(
            BankResponseStatus::from_str("interested").unwrap(),
            BankResponseStatus::Interested
        );
        assert_eq!(
            BankResponseStatus::from_str("Declined").unwrap(),
            BankResponseStatus::Declined
        );
        assert!(BankResponseStatus::from_str("maybe").is_err());
    }
}
