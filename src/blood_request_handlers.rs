// src/blood_request_handlers.rs - Patient blood requests and blood bank responses

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_role, UserRole};
use crate::error::{validate_city, ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::hub::{events, RoomKey};
use crate::models::*;
use crate::notify::send_sms_background;
use crate::AppState;

// ==================== RESPONSE STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct PatientContact {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct AcceptResult {
    pub message: String,
    pub blood_request: BloodRequest,
    pub patient_contact: PatientContact,
}

fn created_payload(request: &BloodRequest) -> serde_json::Value {
    json!({
        "bloodRequest": {
            "id": request.id,
            "patientName": request.patient_name,
            "bloodGroup": request.blood_group,
            "unitsNeeded": request.units_needed,
            "urgencyLevel": request.urgency_level,
            "city": request.city,
            "location": request.location,
            "status": request.status,
            "createdAt": request.created_at,
        }
    })
}

async fn find_request(
    pool: &sqlx::SqlitePool,
    id: &str,
) -> ApiResult<BloodRequest> {
    sqlx::query_as::<_, BloodRequest>("SELECT * FROM blood_requests WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::blood_request_not_found(id))
}

fn request_status(request: &BloodRequest) -> ApiResult<BloodRequestStatus> {
    BloodRequestStatus::from_str(&request.status).ok_or_else(|| {
        ApiError::InternalServerError(format!("Unknown blood request status '{}'", request.status))
    })
}

// ==================== CREATE ====================

pub async fn create_blood_request(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateBloodRequestRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::Patient)?;
    request.validate()?;

    let urgency = match request.urgency_level.as_deref() {
        Some(raw) => Priority::from_str(raw)
            .map_err(|_| ApiError::ValidationError(format!("Invalid urgency level '{}'", raw)))?,
        None => Priority::Medium,
    };

    // Name, age, blood group and contact details default from the patient's
    // own account record
    let patient = PatientUser::find_by_id(&app_state.db_pool, &claims.sub).await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let mut tx = app_state.db_pool.begin().await?;
    sqlx::query(
        "INSERT INTO blood_requests \
         (id, patient_id, patient_name, age, blood_group, units_needed, phone, \
          city, location, urgency_level, status, description, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'Pending', ?, ?, ?)",
    )
    .bind(&id)
    .bind(&patient.id)
    .bind(&patient.name)
    .bind(patient.age)
    .bind(&patient.blood_group)
    .bind(request.units_needed)
    .bind(&patient.phone)
    .bind(&patient.city)
    .bind(&patient.location)
    .bind(urgency.to_string())
    .bind(&request.description)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE patient_users SET total_requests = total_requests + 1, updated_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(&patient.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let blood_request = find_request(&app_state.db_pool, &id).await?;

    let payload = created_payload(&blood_request);
    app_state.hub.publish(
        &RoomKey::City(blood_request.city.clone()),
        events::BLOOD_REQUEST_CREATED,
        payload.clone(),
    );
    app_state.hub.publish(
        &RoomKey::Role(UserRole::BloodBank),
        events::BLOOD_REQUEST_CREATED,
        payload,
    );

    log::info!(
        "Blood request {} created by patient {} ({} units of {})",
        id,
        patient.name,
        blood_request.units_needed,
        blood_request.blood_group
    );

    Ok(HttpResponse::Created().json(ApiResponse::success(blood_request)))
}

// ==================== ACCEPT ====================

pub async fn accept_blood_request(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;
    let request_id = path.into_inner();

    let bank = BloodBank::find_by_id(&app_state.db_pool, &claims.sub).await?;

    let mut tx = app_state.db_pool.begin().await?;
    let blood_request: BloodRequest =
        sqlx::query_as("SELECT * FROM blood_requests WHERE id = ?")
            .bind(&request_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::blood_request_not_found(&request_id))?;

    let status = request_status(&blood_request)?;
    if !status.can_accept() {
        return Err(ApiError::invalid_transition(
            "blood request",
            &blood_request.status,
            "accept",
        ));
    }

    let now = Utc::now();
    sqlx::query(
        "UPDATE blood_requests SET status = 'Accepted', accepted_by_id = ?, \
         accepted_by_name = ?, accepted_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&bank.id)
    .bind(&bank.name)
    .bind(now)
    .bind(now)
    .bind(&request_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO blood_request_responses \
         (id, request_id, blood_bank_id, blood_bank_name, status, message, responded_at) \
         VALUES (?, ?, ?, ?, 'Accepted', NULL, ?) \
         ON CONFLICT(request_id, blood_bank_id) DO UPDATE SET status = 'Accepted', responded_at = ?",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&request_id)
    .bind(&bank.id)
    .bind(&bank.name)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let updated = find_request(&app_state.db_pool, &request_id).await?;
    let message = format!("{} accepted your blood request", bank.name);

    app_state.hub.publish(
        &RoomKey::User(updated.patient_id.clone()),
        events::BLOOD_REQUEST_ACCEPTED,
        json!({
            "requestId": updated.id,
            "bloodBank": {
                "id": bank.id,
                "name": bank.name,
                "phone": bank.phone,
                "location": bank.location,
            },
            "message": message,
        }),
    );

    // SMS is fire-and-forget; its failure never reaches this request
    send_sms_background(
        app_state.notifier.clone(),
        updated.phone.clone(),
        format!(
            "{}. Contact: {} ({})",
            message, bank.phone, bank.location
        ),
    );

    let patient_contact = PatientContact {
        name: updated.patient_name.clone(),
        phone: updated.phone.clone(),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(AcceptResult {
        message,
        blood_request: updated,
        patient_contact,
    })))
}

// ==================== NON-BINDING RESPONSES ====================

pub async fn respond_to_blood_request(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<BankResponseRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;
    request.validate()?;
    let request_id = path.into_inner();

    let response_status = BankResponseStatus::from_str(&request.status)
        .map_err(|_| ApiError::ValidationError(format!("Invalid response status '{}'", request.status)))?;
    if response_status == BankResponseStatus::Accepted {
        return Err(ApiError::BadRequest(
            "Use the accept endpoint to accept a request".to_string(),
        ));
    }

    let bank = BloodBank::find_by_id(&app_state.db_pool, &claims.sub).await?;
    let blood_request = find_request(&app_state.db_pool, &request_id).await?;
    let status = request_status(&blood_request)?;
    if !status.can_accept() {
        return Err(ApiError::invalid_transition(
            "blood request",
            &blood_request.status,
            "respond to",
        ));
    }

    let existing: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM blood_request_responses \
         WHERE request_id = ? AND blood_bank_id = ?",
    )
    .bind(&request_id)
    .bind(&bank.id)
    .fetch_one(&app_state.db_pool)
    .await?;
    if existing.0 > 0 {
        return Err(ApiError::Duplicate(format!(
            "Blood bank '{}' has already responded to this request",
            bank.name
        )));
    }

    sqlx::query(
        "INSERT INTO blood_request_responses \
         (id, request_id, blood_bank_id, blood_bank_name, status, message, responded_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&request_id)
    .bind(&bank.id)
    .bind(&bank.name)
    .bind(response_status.to_string())
    .bind(&request.message)
    .bind(Utc::now())
    .execute(&app_state.db_pool)
    .await?;

    let responses: Vec<BloodRequestResponse> = sqlx::query_as(
        "SELECT * FROM blood_request_responses WHERE request_id = ? ORDER BY responded_at ASC",
    )
    .bind(&request_id)
    .fetch_all(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(responses)))
}

// ==================== CANCEL / FULFILL ====================

pub async fn cancel_blood_request(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<CancelBloodRequestRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::Patient)?;
    request.validate()?;
    let request_id = path.into_inner();

    let blood_request: BloodRequest =
        sqlx::query_as("SELECT * FROM blood_requests WHERE id = ? AND patient_id = ?")
            .bind(&request_id)
            .bind(&claims.sub)
            .fetch_optional(&app_state.db_pool)
            .await?
            .ok_or_else(|| ApiError::blood_request_not_found(&request_id))?;

    let status = request_status(&blood_request)?;
    if !status.can_cancel() {
        return Err(ApiError::invalid_transition(
            "blood request",
            &blood_request.status,
            "cancel",
        ));
    }

    let reason = request
        .cancellation_reason
        .clone()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CANCELLATION_REASON.to_string());

    let now = Utc::now();
    sqlx::query(
        "UPDATE blood_requests SET status = 'Cancelled', cancelled_at = ?, \
         cancellation_reason = ?, updated_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(&reason)
    .bind(now)
    .bind(&request_id)
    .execute(&app_state.db_pool)
    .await?;

    let updated = find_request(&app_state.db_pool, &request_id).await?;

    app_state.hub.publish(
        &RoomKey::City(updated.city.clone()),
        events::BLOOD_REQUEST_CANCELLED,
        json!({ "requestId": updated.id, "reason": reason }),
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn fulfill_blood_request(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;
    let request_id = path.into_inner();

    let blood_request = find_request(&app_state.db_pool, &request_id).await?;
    let status = request_status(&blood_request)?;
    if !status.can_fulfill() {
        return Err(ApiError::invalid_transition(
            "blood request",
            &blood_request.status,
            "fulfill",
        ));
    }
    if blood_request.accepted_by_id.as_deref() != Some(claims.sub.as_str()) {
        return Err(ApiError::Forbidden(
            "Only the accepting blood bank can fulfill this request".to_string(),
        ));
    }

    let now = Utc::now();
    sqlx::query(
        "UPDATE blood_requests SET status = 'Fulfilled', fulfilled_at = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(now)
    .bind(now)
    .bind(&request_id)
    .execute(&app_state.db_pool)
    .await?;

    let updated = find_request(&app_state.db_pool, &request_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

// ==================== LISTINGS ====================

pub async fn get_my_blood_requests(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::Patient)?;
    let requests: Vec<BloodRequest> = sqlx::query_as(
        "SELECT * FROM blood_requests WHERE patient_id = ? ORDER BY created_at DESC",
    )
    .bind(&claims.sub)
    .fetch_all(&app_state.db_pool)
    .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(requests)))
}

pub async fn get_open_blood_requests(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<OpenRequestsQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;
    let city = match &query.city {
        Some(city) => city.clone(),
        None => {
            BloodBank::find_by_id(&app_state.db_pool, &claims.sub)
                .await?
                .city
        }
    };
    validate_city(&city)?;

    let requests: Vec<BloodRequest> = sqlx::query_as(
        "SELECT * FROM blood_requests WHERE city = ? AND status = 'Pending' \
         ORDER BY CASE urgency_level \
         WHEN 'Critical' THEN 4 WHEN 'High' THEN 3 WHEN 'Medium' THEN 2 ELSE 1 END DESC, \
         created_at DESC",
    )
        .bind(&city)
        .fetch_all(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(requests)))
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

    async fn create_request_for(
        state: &web::Data<Arc<AppState>>,
        patient_id: &str,
    ) -> String {
        let resp = create_blood_request(
            state.clone(),
            web::Json(CreateBloodRequestRequest {
                units_needed: 2,
                urgency_level: None,
                description: None,
            }),
            authed(claims_for(patient_id, UserRole::Patient)),
        )
        .await
        .expect("create blood request");
        let body = body_json(resp).await;
        body["data"]["id"].as_str().expect("id").to_string()
    }

    #[actix_rt::test]
    async fn test_create_copies_patient_fields() {
        let state = test_state().await;
        let patient_id = insert_patient_user(&state.db_pool, "Pat", "Metro", "B+").await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = state.hub.connect(tx);
        state.hub.join(&listener, &[RoomKey::Role(UserRole::BloodBank)]);

        let request_id = create_request_for(&state, &patient_id).await;

        let request: BloodRequest = sqlx::query_as("SELECT * FROM blood_requests WHERE id = ?")
            .bind(&request_id)
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(request.status, "Pending");
        assert_eq!(request.patient_name, "Pat");
        assert_eq!(request.blood_group, "B+");
        assert_eq!(request.city, "Metro");
        assert_eq!(request.urgency_level, "Medium");

        let patient = PatientUser::find_by_id(&state.db_pool, &patient_id).await.unwrap();
        assert_eq!(patient.total_requests, 1);

        let frame: serde_json::Value =
            serde_json::from_str(&rx.try_recv().expect("bank room delivery")).unwrap();
        assert_eq!(frame["event"], events::BLOOD_REQUEST_CREATED);
        assert_eq!(frame["data"]["bloodRequest"]["patientName"], "Pat");
    }

    #[actix_rt::test]
    async fn test_accept_only_from_pending() {
        let state = test_state().await;
        let patient_id = insert_patient_user(&state.db_pool, "Pat", "Metro", "B+").await;
        let bank_a = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;
        let bank_b = insert_blood_bank(&state.db_pool, "Bank B", "Metro").await;
        let request_id = create_request_for(&state, &patient_id).await;

        let resp = accept_blood_request(
            state.clone(),
            web::Path::from(request_id.clone()),
            authed(claims_for(&bank_a, UserRole::BloodBank)),
        )
        .await
        .expect("accept");
        let body = body_json(resp).await;
        assert_eq!(body["data"]["blood_request"]["status"], "Accepted");
        assert_eq!(body["data"]["patient_contact"]["name"], "Pat");

        // Second bank cannot accept, and acceptedBy stays with the first
        let err = accept_blood_request(
            state.clone(),
            web::Path::from(request_id.clone()),
            authed(claims_for(&bank_b, UserRole::BloodBank)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));

        let request: BloodRequest = sqlx::query_as("SELECT * FROM blood_requests WHERE id = ?")
            .bind(&request_id)
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(request.accepted_by_id.as_deref(), Some(bank_a.as_str()));
        assert_eq!(request.accepted_by_name.as_deref(), Some("Bank A"));
    }

    #[actix_rt::test]
    async fn test_cancel_pending_and_terminal_guard() {
        let state = test_state().await;
        let patient_id = insert_patient_user(&state.db_pool, "Pat", "Metro", "B+").await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;

        // Pending cancel succeeds, records reason and timestamp
        let pending_id = create_request_for(&state, &patient_id).await;
        let resp = cancel_blood_request(
            state.clone(),
            web::Path::from(pending_id.clone()),
            web::Json(CancelBloodRequestRequest {
                cancellation_reason: None,
            }),
            authed(claims_for(&patient_id, UserRole::Patient)),
        )
        .await
        .expect("cancel pending");
        let body = body_json(resp).await;
        assert_eq!(body["data"]["status"], "Cancelled");
        assert_eq!(body["data"]["cancellation_reason"], DEFAULT_CANCELLATION_REASON);
        assert!(!body["data"]["cancelled_at"].is_null());

        // Fulfilled requests cannot be cancelled
        let fulfilled_id = create_request_for(&state, &patient_id).await;
        accept_blood_request(
            state.clone(),
            web::Path::from(fulfilled_id.clone()),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("accept");
        fulfill_blood_request(
            state.clone(),
            web::Path::from(fulfilled_id.clone()),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("fulfill");

        let err = cancel_blood_request(
            state.clone(),
            web::Path::from(fulfilled_id),
            web::Json(CancelBloodRequestRequest {
                cancellation_reason: Some("changed my mind".to_string()),
            }),
            authed(claims_for(&patient_id, UserRole::Patient)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[actix_rt::test]
    async fn test_interested_response_recorded_once() {
        let state = test_state().await;
        let patient_id = insert_patient_user(&state.db_pool, "Pat", "Metro", "B+").await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;
        let request_id = create_request_for(&state, &patient_id).await;

        let resp = respond_to_blood_request(
            state.clone(),
            web::Path::from(request_id.clone()),
            web::Json(BankResponseRequest {
                status: "Interested".to_string(),
                message: Some("We can cover this".to_string()),
            }),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("respond");
        let body = body_json(resp).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["status"], "Interested");

        let err = respond_to_blood_request(
            state.clone(),
            web::Path::from(request_id),
            web::Json(BankResponseRequest {
                status: "Declined".to_string(),
                message: None,
            }),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Duplicate(_)));
    }

    #[actix_rt::test]
    async fn test_accept_publishes_to_patient_room() {
        let state = test_state().await;
        let patient_id = insert_patient_user(&state.db_pool, "Pat", "Metro", "B+").await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;
        let request_id = create_request_for(&state, &patient_id).await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = state.hub.connect(tx);
        state.hub.join(&listener, &[RoomKey::User(patient_id.clone())]);

        accept_blood_request(
            state.clone(),
            web::Path::from(request_id.clone()),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("accept");

        let frame: serde_json::Value =
            serde_json::from_str(&rx.try_recv().expect("patient delivery")).unwrap();
        assert_eq!(frame["event"], events::BLOOD_REQUEST_ACCEPTED);
        assert_eq!(frame["data"]["requestId"], request_id.as_str());
        assert_eq!(frame["data"]["bloodBank"]["name"], "Bank A");
    }

    #[actix_rt::test]
    async fn test_open_requests_default_to_bank_city() {
        let state = test_state().await;
        let metro_patient = insert_patient_user(&state.db_pool, "Pat", "Metro", "B+").await;
        let coastal_patient = insert_patient_user(&state.db_pool, "Cory", "Coastal", "A+").await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;

        create_request_for(&state, &metro_patient).await;
        create_request_for(&state, &coastal_patient).await;

        let resp = get_open_blood_requests(
            state.clone(),
            web::Query::from_query("").unwrap(),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .unwrap();
        let body = body_json(resp).await;
        let listed = body["data"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["city"], "Metro");
    }
}
