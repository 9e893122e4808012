// src/handlers.rs - Shared response envelopes and the dashboard endpoint
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{get_current_user, UserRole};
use crate::error::ApiResult;
use crate::models::DashboardStats;
use crate::AppState;

// ==================== COMMON STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

// ==================== DASHBOARD ====================

async fn count(pool: &sqlx::SqlitePool, query: &str, bind: &str) -> ApiResult<i64> {
    let row: (i64,) = sqlx::query_as(query).bind(bind).fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn get_dashboard_stats(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let pool = &app_state.db_pool;
    let mut stats = DashboardStats::empty();

    match claims.role {
        UserRole::Hospital => {
            let hospital = crate::models::Hospital::find_by_id(pool, &claims.sub).await?;
            stats.total_patients = Some(hospital.total_patients);
            stats.emergencies_created = Some(hospital.emergencies_created);
            stats.active_emergencies = Some(
                count(
                    pool,
                    "SELECT COUNT(*) FROM emergencies \
                     WHERE creator_kind = 'hospital' AND creator_id = ? AND status = 'Active'",
                    &claims.sub,
                )
                .await?,
            );
        }
        UserRole::BloodBank => {
            let bank = crate::models::BloodBank::find_by_id(pool, &claims.sub).await?;
            stats.total_stock = Some(bank.total_stock);
            stats.total_dispatched = Some(bank.total_dispatched);
            stats.successful_sends = Some(bank.successful_sends);
            stats.available_batches = Some(
                count(
                    pool,
                    "SELECT COUNT(*) FROM preservations \
                     WHERE blood_bank_id = ? AND status = 'Available'",
                    &claims.sub,
                )
                .await?,
            );
            stats.near_expiry_batches = Some(
                count(
                    pool,
                    "SELECT COUNT(*) FROM preservations \
                     WHERE blood_bank_id = ? AND status = 'Available' \
                     AND expiry_date > datetime('now') \
                     AND expiry_date <= datetime('now', '+7 days')",
                    &claims.sub,
                )
                .await?,
            );
            stats.open_city_requests = Some(
                count(
                    pool,
                    "SELECT COUNT(*) FROM blood_requests \
                     WHERE status = 'Pending' AND city = \
                     (SELECT city FROM blood_banks WHERE id = ?)",
                    &claims.sub,
                )
                .await?,
            );
        }
        UserRole::Donor => {
            let donor = crate::models::Donor::find_by_id(pool, &claims.sub).await?;
            stats.total_pledges = Some(donor.total_pledges);
            stats.reputation = Some(donor.reputation);
        }
        UserRole::Patient => {
            let patient = crate::models::PatientUser::find_by_id(pool, &claims.sub).await?;
            stats.total_requests = Some(patient.total_requests);
            stats.pending_requests = Some(
                count(
                    pool,
                    "SELECT COUNT(*) FROM blood_requests \
                     WHERE patient_id = ? AND status = 'Pending'",
                    &claims.sub,
                )
                .await?,
            );
        }
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}
