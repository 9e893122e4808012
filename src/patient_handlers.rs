// src/patient_handlers.rs - Hospital-internal patient records

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_role, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::*;
use crate::AppState;

pub async fn create_patient(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreatePatientRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::Hospital)?;
    request.validate()?;

    let blood_type = BloodType::from_str(&request.blood_type)
        .ok_or_else(|| ApiError::invalid_blood_type(&request.blood_type))?;
    if let Some(phone) = &request.contact_phone {
        crate::validator::validate_phone(phone)?;
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let status = derive_status(0, request.units_needed);

    let mut tx = app_state.db_pool.begin().await?;
    sqlx::query(
        "INSERT INTO patients \
         (id, hospital_id, name, age, blood_type, units_needed, units_received, status, \
          contact_phone, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&claims.sub)
    .bind(&request.name)
    .bind(request.age)
    .bind(blood_type.as_str())
    .bind(request.units_needed)
    .bind(status.as_str())
    .bind(&request.contact_phone)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE hospitals SET total_patients = total_patients + 1, updated_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(&claims.sub)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let patient: Patient = sqlx::query_as("SELECT * FROM patients WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(patient)))
}

pub async fn get_patients(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::Hospital)?;
    let patients: Vec<Patient> = sqlx::query_as(
        "SELECT * FROM patients WHERE hospital_id = ? ORDER BY created_at DESC",
    )
    .bind(&claims.sub)
    .fetch_all(&app_state.db_pool)
    .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(patients)))
}

/// Record received units; the Requesting/Partial/Received status is
/// recomputed from the counters on every update.
pub async fn record_received_units(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<RecordReceivedRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::Hospital)?;
    request.validate()?;
    let patient_id = path.into_inner();

    let mut tx = app_state.db_pool.begin().await?;
    let patient: Patient =
        sqlx::query_as("SELECT * FROM patients WHERE id = ? AND hospital_id = ?")
            .bind(&patient_id)
            .bind(&claims.sub)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::patient_not_found(&patient_id))?;

    let units_received = patient.units_received + request.units;
    let status = derive_status(units_received, patient.units_needed);

    sqlx::query(
        "UPDATE patients SET units_received = ?, status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(units_received)
    .bind(status.as_str())
    .bind(Utc::now())
    .bind(&patient_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let updated: Patient = sqlx::query_as("SELECT * FROM patients WHERE id = ?")
        .bind(&patient_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

// ==================== TESTS ====================
