// src/models/mod.rs

pub mod account;
pub mod blood;
pub mod blood_request;
pub mod emergency;
pub mod patient;
pub mod preservation;
pub mod send_record;

pub use account::*;
pub use blood::*;
pub use blood_request::*;
pub use emergency::*;
pub use patient::*;
pub use preservation::*;
pub use send_record::*;

use serde::Serialize;

// ==================== COMMON / SHARED ====================

/// Per-role dashboard counters.
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_patients: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergencies_created: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_emergencies: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_stock: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_dispatched: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful_sends: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_batches: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub near_expiry_batches: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_city_requests: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pledges: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reputation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_requests: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_requests: Option<i64>,
}

impl DashboardStats {
    pub fn empty() -> Self {
        Self {
            total_patients: None,
            emergencies_created: None,
            active_emergencies: None,
            total_stock: None,
            total_dispatched: None,
            successful_sends: None,
            available_batches: None,
            near_expiry_batches: None,
            open_city_requests: None,
            total_pledges: None,
            reputation: None,
            total_requests: None,
            pending_requests: None,
        }
    }
}
