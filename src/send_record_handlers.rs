// src/send_record_handlers.rs - Dispatching units and tracking deliveries
//
// Dispatch touches the batch, the send record, the bank's stat counters and
// optionally a linked emergency. All of it commits or none of it does.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_role, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::*;
use crate::notify::send_sms_background;
use crate::AppState;

// ==================== SUCCESS RATE ====================

/// Percentage of delivered records over the whole set, one decimal. An empty
/// set reports 0 rather than dividing by zero.
pub fn success_rate(delivered: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = delivered as f64 / total as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}

#[derive(Debug, Serialize)]
pub struct BankStats {
    pub total_sends: i64,
    pub delivered: i64,
    pub success_rate: f64,
    pub total_stock: i64,
    pub total_dispatched: i64,
    pub successful_sends: i64,
}

// ==================== DISPATCH ====================

pub async fn dispatch(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<DispatchRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;
    request.validate()?;

    let recipient_kind = AccountKind::from_str(&request.recipient_model).ok_or_else(|| {
        ApiError::ValidationError(format!(
            "Invalid recipient model '{}'",
            request.recipient_model
        ))
    })?;
    let recipient = AccountRef::new(recipient_kind, &request.recipient_id)
        .resolve_contact(&app_state.db_pool)
        .await?;

    let now = Utc::now();
    let record_id = Uuid::new_v4().to_string();
    let tracking_number = generate_tracking_number();

    let mut tx = app_state.db_pool.begin().await?;

    let batch: Preservation = sqlx::query_as(
        "SELECT * FROM preservations WHERE id = ? AND blood_bank_id = ?",
    )
    .bind(&request.preservation_id)
    .bind(&claims.sub)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::preservation_not_found(&request.preservation_id))?;

    if batch.status != PreservationStatus::Available.as_str() {
        return Err(ApiError::invalid_transition(
            "preservation batch",
            &batch.status,
            "dispatch from",
        ));
    }
    if batch.units < request.units {
        return Err(ApiError::insufficient_units(batch.units, request.units));
    }

    let remaining = batch.units - request.units;
    let new_status = PreservationStatus::after_dispatch(remaining);

    sqlx::query("UPDATE preservations SET units = ?, status = ?, updated_at = ? WHERE id = ?")
        .bind(remaining)
        .bind(new_status.as_str())
        .bind(now)
        .bind(&batch.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO send_records \
         (id, blood_bank_id, preservation_id, recipient_kind, recipient_id, recipient_name, \
          blood_type, units, dispatch_date, expected_delivery, status, tracking_number, \
          emergency_id, notes, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'Pending', ?, ?, ?, ?, ?)",
    )
    .bind(&record_id)
    .bind(&claims.sub)
    .bind(&batch.id)
    .bind(recipient_kind.as_str())
    .bind(&recipient.id)
    .bind(&recipient.name)
    .bind(&batch.blood_type)
    .bind(request.units)
    .bind(now)
    .bind(request.expected_delivery)
    .bind(&tracking_number)
    .bind(&request.emergency_id)
    .bind(&request.notes)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE blood_banks SET total_stock = total_stock - ?, \
         total_dispatched = total_dispatched + ?, updated_at = ? WHERE id = ?",
    )
    .bind(request.units)
    .bind(request.units)
    .bind(now)
    .bind(&claims.sub)
    .execute(&mut *tx)
    .await?;

    // Dispatches against an emergency count toward its need; the fulfillment
    // transition is applied explicitly here
    if let Some(emergency_id) = &request.emergency_id {
        let emergency: Emergency = sqlx::query_as("SELECT * FROM emergencies WHERE id = ?")
            .bind(emergency_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::emergency_not_found(emergency_id))?;

        let status = EmergencyStatus::from_str(&emergency.status).ok_or_else(|| {
            ApiError::InternalServerError(format!(
                "Unknown emergency status '{}'",
                emergency.status
            ))
        })?;
        let units_received = emergency.units_received + request.units;
        let new_status = resolve_fulfillment(status, units_received, emergency.units_needed);

        sqlx::query(
            "UPDATE emergencies SET units_received = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(units_received)
        .bind(new_status.as_str())
        .bind(now)
        .bind(emergency_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let record: SendRecord = sqlx::query_as("SELECT * FROM send_records WHERE id = ?")
        .bind(&record_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    send_sms_background(
        app_state.notifier.clone(),
        recipient.phone.clone(),
        format!(
            "{} units of {} dispatched to you, tracking {}",
            record.units, record.blood_type, record.tracking_number
        ),
    );

    log::info!(
        "Dispatch {}: {} units of {} from batch {} to {} {}",
        record.tracking_number,
        record.units,
        record.blood_type,
        batch.batch_id,
        recipient_kind,
        recipient.name
    );

    Ok(HttpResponse::Created().json(ApiResponse::success(record)))
}

// ==================== STATUS UPDATES ====================

pub async fn update_send_record_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateSendRecordRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;
    request.validate()?;
    let record_id = path.into_inner();

    let new_status = SendStatus::from_str(&request.status)
        .ok_or_else(|| ApiError::ValidationError(format!("Invalid status '{}'", request.status)))?;

    let mut tx = app_state.db_pool.begin().await?;

    let record: SendRecord = sqlx::query_as(
        "SELECT * FROM send_records WHERE id = ? AND blood_bank_id = ?",
    )
    .bind(&record_id)
    .bind(&claims.sub)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::send_record_not_found(&record_id))?;

    let current = SendStatus::from_str(&record.status).ok_or_else(|| {
        ApiError::InternalServerError(format!("Unknown send record status '{}'", record.status))
    })?;
    if current.is_terminal() {
        return Err(ApiError::invalid_transition(
            "send record",
            &record.status,
            "update",
        ));
    }

    let now = Utc::now();
    let actual_delivery = if new_status == SendStatus::Delivered {
        Some(request.actual_delivery.unwrap_or(now))
    } else {
        record.actual_delivery
    };

    sqlx::query(
        "UPDATE send_records SET status = ?, actual_delivery = ?, updated_at = ? WHERE id = ?",
    )
    .bind(new_status.as_str())
    .bind(actual_delivery)
    .bind(now)
    .bind(&record_id)
    .execute(&mut *tx)
    .await?;

    if new_status == SendStatus::Delivered {
        sqlx::query(
            "UPDATE blood_banks SET successful_sends = successful_sends + 1, updated_at = ? \
             WHERE id = ?",
        )
        .bind(now)
        .bind(&claims.sub)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let updated: SendRecord = sqlx::query_as("SELECT * FROM send_records WHERE id = ?")
        .bind(&record_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

// ==================== LISTINGS & STATS ====================

pub async fn get_send_records(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;
    let records: Vec<SendRecord> = sqlx::query_as(
        "SELECT * FROM send_records WHERE blood_bank_id = ? ORDER BY dispatch_date DESC",
    )
    .bind(&claims.sub)
    .fetch_all(&app_state.db_pool)
    .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(records)))
}

pub async fn get_bank_stats(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;
    let bank = BloodBank::find_by_id(&app_state.db_pool, &claims.sub).await?;

    let total: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM send_records WHERE blood_bank_id = ?")
            .bind(&claims.sub)
            .fetch_one(&app_state.db_pool)
            .await?;
    let delivered: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM send_records WHERE blood_bank_id = ? AND status = 'Delivered'",
    )
    .bind(&claims.sub)
    .fetch_one(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(BankStats {
        total_sends: total.0,
        delivered: delivered.0,
        success_rate: success_rate(delivered.0, total.0),
        total_stock: bank.total_stock,
        total_dispatched: bank.total_dispatched,
        successful_sends: bank.successful_sends,
    })))
}

// ==================== TESTS ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use crate::db::test_support::*;
    use actix_web::{body::to_bytes, HttpMessage};
    use chrono::Duration;

    fn claims_for(id: &str, role: UserRole) -> Claims {
        let now = Utc::now();
        Claims {
            sub: id.to_string(),
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
            role,
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        }
    }

    fn authed(claims: Claims) -> HttpRequest {
        let req = actix_web::test::TestRequest::default().to_http_request();
        req.extensions_mut().insert(claims);
        req
    }

    async fn body_json(resp: HttpResponse) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body()).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn seed_batch(
        state: &web::Data<Arc<AppState>>,
        bank_id: &str,
        blood_type: &str,
        units: i64,
    ) -> String {
        let resp = crate::preservation_handlers::create_preservation(
            state.clone(),
            web::Json(CreatePreservationRequest {
                blood_type: blood_type.to_string(),
                units,
                collection_date: None,
                expiry_date: Utc::now() + Duration::days(35),
                storage_location: None,
                donor_info: None,
            }),
            authed(claims_for(bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("seed batch");
        body_json(resp).await["data"]["id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn dispatch_body(
        preservation_id: &str,
        recipient_id: &str,
        units: i64,
        emergency_id: Option<String>,
    ) -> DispatchRequest {
        DispatchRequest {
            preservation_id: preservation_id.to_string(),
            recipient_id: recipient_id.to_string(),
            recipient_model: "hospital".to_string(),
            units,
            expected_delivery: Some(Utc::now() + Duration::days(1)),
            notes: None,
            emergency_id,
        }
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(success_rate(1, 2), 50.0);
        assert_eq!(success_rate(1, 3), 33.3);
        assert_eq!(success_rate(2, 3), 66.7);
        assert_eq!(success_rate(3, 3), 100.0);
    }

    #[actix_rt::test]
    async fn test_full_dispatch_consumes_batch() {
        let state = test_state().await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;
        let hospital_id = insert_hospital(&state.db_pool, "Metro General", "Metro").await;
        let batch_id = seed_batch(&state, &bank_id, "A+", 10).await;

        let resp = dispatch(
            state.clone(),
            web::Json(dispatch_body(&batch_id, &hospital_id, 10, None)),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("dispatch");
        let body = body_json(resp).await;
        assert_eq!(body["data"]["status"], "Pending");
        let tracking = body["data"]["tracking_number"].as_str().unwrap();
        assert!(crate::validator::is_valid_tracking_number(tracking));

        let batch: Preservation = sqlx::query_as("SELECT * FROM preservations WHERE id = ?")
            .bind(&batch_id)
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(batch.units, 0);
        assert_eq!(batch.status, "Dispatched");

        let bank = BloodBank::find_by_id(&state.db_pool, &bank_id).await.unwrap();
        assert_eq!(bank.total_stock, 0);
        assert_eq!(bank.total_dispatched, 10);
    }

    #[actix_rt::test]
    async fn test_partial_dispatch_reserves_batch() {
        let state = test_state().await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;
        let hospital_id = insert_hospital(&state.db_pool, "Metro General", "Metro").await;
        let batch_id = seed_batch(&state, &bank_id, "B-", 10).await;

        dispatch(
            state.clone(),
            web::Json(dispatch_body(&batch_id, &hospital_id, 4, None)),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("dispatch");

        let batch: Preservation = sqlx::query_as("SELECT * FROM preservations WHERE id = ?")
            .bind(&batch_id)
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(batch.units, 6);
        assert_eq!(batch.status, "Reserved");
    }

    #[actix_rt::test]
    async fn test_insufficient_units_leaves_batch_unmodified() {
        let state = test_state().await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;
        let hospital_id = insert_hospital(&state.db_pool, "Metro General", "Metro").await;
        let batch_id = seed_batch(&state, &bank_id, "O+", 3).await;

        let err = dispatch(
            state.clone(),
            web::Json(dispatch_body(&batch_id, &hospital_id, 5, None)),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientUnits(_)));

        let batch: Preservation = sqlx::query_as("SELECT * FROM preservations WHERE id = ?")
            .bind(&batch_id)
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(batch.units, 3);
        assert_eq!(batch.status, "Available");

        let bank = BloodBank::find_by_id(&state.db_pool, &bank_id).await.unwrap();
        assert_eq!(bank.total_stock, 3);
        assert_eq!(bank.total_dispatched, 0);
        let records: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM send_records WHERE blood_bank_id = ?")
                .bind(&bank_id)
                .fetch_one(&state.db_pool)
                .await
                .unwrap();
        assert_eq!(records.0, 0);
    }

    #[actix_rt::test]
    async fn test_dispatch_not_owned_or_not_available() {
        let state = test_state().await;
        let bank_a = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;
        let bank_b = insert_blood_bank(&state.db_pool, "Bank B", "Metro").await;
        let hospital_id = insert_hospital(&state.db_pool, "Metro General", "Metro").await;
        let batch_id = seed_batch(&state, &bank_a, "O+", 5).await;

        // Another bank cannot dispatch from this batch
        let err = dispatch(
            state.clone(),
            web::Json(dispatch_body(&batch_id, &hospital_id, 1, None)),
            authed(claims_for(&bank_b, UserRole::BloodBank)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        // A fully consumed batch is no longer dispatchable
        dispatch(
            state.clone(),
            web::Json(dispatch_body(&batch_id, &hospital_id, 5, None)),
            authed(claims_for(&bank_a, UserRole::BloodBank)),
        )
        .await
        .expect("dispatch");
        let err = dispatch(
            state.clone(),
            web::Json(dispatch_body(&batch_id, &hospital_id, 1, None)),
            authed(claims_for(&bank_a, UserRole::BloodBank)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[actix_rt::test]
    async fn test_dispatch_against_emergency_fulfills_it() {
        let state = test_state().await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;
        let hospital_id = insert_hospital(&state.db_pool, "Metro General", "Metro").await;
        let batch_id = seed_batch(&state, &bank_id, "O+", 10).await;

        let resp = crate::emergency_handlers::create_emergency(
            state.clone(),
            web::Json(CreateEmergencyRequest {
                blood_type: "O+".to_string(),
                units_needed: 5,
                description: None,
                priority: None,
            }),
            authed(claims_for(&hospital_id, UserRole::Hospital)),
        )
        .await
        .expect("create emergency");
        let emergency_id = body_json(resp).await["data"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        dispatch(
            state.clone(),
            web::Json(dispatch_body(&batch_id, &hospital_id, 3, Some(emergency_id.clone()))),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("first dispatch");

        let emergency: Emergency = sqlx::query_as("SELECT * FROM emergencies WHERE id = ?")
            .bind(&emergency_id)
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(emergency.units_received, 3);
        assert_eq!(emergency.status, "Active");

        // Second dispatch crosses the threshold and flips status
        let second_batch = seed_batch(&state, &bank_id, "O+", 4).await;
        dispatch(
            state.clone(),
            web::Json(dispatch_body(&second_batch, &hospital_id, 2, Some(emergency_id.clone()))),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("second dispatch");

        let emergency: Emergency = sqlx::query_as("SELECT * FROM emergencies WHERE id = ?")
            .bind(&emergency_id)
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(emergency.units_received, 5);
        assert_eq!(emergency.status, "Fulfilled");
    }

    #[actix_rt::test]
    async fn test_delivery_updates_and_terminal_guard() {
        let state = test_state().await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;
        let hospital_id = insert_hospital(&state.db_pool, "Metro General", "Metro").await;
        let batch_id = seed_batch(&state, &bank_id, "AB+", 6).await;

        let resp = dispatch(
            state.clone(),
            web::Json(dispatch_body(&batch_id, &hospital_id, 6, None)),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .unwrap();
        let record_id = body_json(resp).await["data"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let resp = update_send_record_status(
            state.clone(),
            web::Path::from(record_id.clone()),
            web::Json(UpdateSendRecordRequest {
                status: "In Transit".to_string(),
                actual_delivery: None,
            }),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("to transit");
        assert_eq!(body_json(resp).await["data"]["status"], "In Transit");

        let resp = update_send_record_status(
            state.clone(),
            web::Path::from(record_id.clone()),
            web::Json(UpdateSendRecordRequest {
                status: "Delivered".to_string(),
                actual_delivery: None,
            }),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("to delivered");
        let body = body_json(resp).await;
        assert_eq!(body["data"]["status"], "Delivered");
        assert!(!body["data"]["actual_delivery"].is_null());

        let bank = BloodBank::find_by_id(&state.db_pool, &bank_id).await.unwrap();
        assert_eq!(bank.successful_sends, 1);

        // Delivered is terminal
        let err = update_send_record_status(
            state.clone(),
            web::Path::from(record_id),
            web::Json(UpdateSendRecordRequest {
                status: "Failed".to_string(),
                actual_delivery: None,
            }),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[actix_rt::test]
    async fn test_bank_stats_reports_zero_for_empty_set() {
        let state = test_state().await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;

        let resp = get_bank_stats(
            state.clone(),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["data"]["total_sends"], 0);
        assert_eq!(body["data"]["success_rate"], 0.0);
    }
}
