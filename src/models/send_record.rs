// src/models/send_record.rs - Dispatch audit records with delivery tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::account::AccountKind;
use super::preservation::random_base36_suffix;

// ==================== STATUS ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendStatus {
    Pending,
    #[serde(rename = "In Transit")]
    InTransit,
    Delivered,
    Failed,
}

impl SendStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(SendStatus::Pending),
            "In Transit" => Some(SendStatus::InTransit),
            "Delivered" => Some(SendStatus::Delivered),
            "Failed" => Some(SendStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Pending => "Pending",
            SendStatus::InTransit => "In Transit",
            SendStatus::Delivered => "Delivered",
            SendStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SendStatus::Delivered | SendStatus::Failed)
    }
}

// ==================== RECORD ====================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SendRecord {
    pub id: String,
    pub blood_bank_id: String,
    pub preservation_id: String,
    pub recipient_kind: String,
    pub recipient_id: String,
    pub recipient_name: String,
    pub blood_type: String,
    pub units: i64,
    pub dispatch_date: DateTime<Utc>,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub status: String,
    pub tracking_number: String,
    pub emergency_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SendRecord {
    pub fn recipient_kind(&self) -> Option<AccountKind> {
        AccountKind::from_str(&self.recipient_kind)
    }
}

/// `TRK<epoch-ms><9-char base36>`
pub fn generate_tracking_number() -> String {
    format!(
        "TRK{}{}",
        Utc::now().timestamp_millis(),
        random_base36_suffix(9)
    )
}

// ==================== REQUEST STRUCTS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct DispatchRequest {
    #[serde(alias = "preservationId")]
    #[validate(length(min = 1, message = "Preservation id is required"))]
    pub preservation_id: String,
    #[serde(alias = "recipientId")]
    #[validate(length(min = 1, message = "Recipient id is required"))]
    pub recipient_id: String,
    #[serde(alias = "recipientModel")]
    #[validate(length(min = 1, message = "Recipient model is required"))]
    pub recipient_model: String,
    #[validate(range(min = 1, max = 10000, message = "Units must be at least 1"))]
    pub units: i64,
    #[serde(alias = "expectedDelivery")]
    pub expected_delivery: Option<DateTime<Utc>>,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
    #[serde(alias = "emergencyId")]
    pub emergency_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSendRecordRequest {
    #[validate(length(min = 1, message = "Status is required"))]
    pub status: String,
    #[serde(alias = "actualDelivery")]
    pub actual_delivery: Option<DateTime<Utc>>,
}
