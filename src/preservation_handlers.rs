// src/preservation_handlers.rs - Blood inventory batches

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

// ==================== CREATE ====================

pub async fn create_preservation(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreatePreservationRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;
    request.validate()?;

    let blood_type = BloodType::from_str(&request.blood_type)
        .ok_or_else(|| ApiError::invalid_blood_type(&request.blood_type))?;

    let now = Utc::now();
    let collection_date = request.collection_date.unwrap_or(now);
    if request.expiry_date <= collection_date {
        return Err(ApiError::ValidationError(
            "Expiry date must be after the collection date".to_string(),
        ));
    }

    let id = Uuid::new_v4().to_string();
    let batch_id = generate_batch_id();

    // Batch insert and stock counter move together
    let mut tx = app_state.db_pool.begin().await?;
    sqlx::query(
        "INSERT INTO preservations \
         (id, blood_bank_id, batch_id, blood_type, units, collection_date, expiry_date, \
          status, storage_location, donor_info, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 'Available', ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&claims.sub)
    .bind(&batch_id)
    .bind(blood_type.as_str())
    .bind(request.units)
    .bind(collection_date)
    .bind(request.expiry_date)
    .bind(&request.storage_location)
    .bind(&request.donor_info)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE blood_banks SET total_stock = total_stock + ?, updated_at = ? WHERE id = ?",
    )
    .bind(request.units)
    .bind(now)
    .bind(&claims.sub)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let preservation: Preservation = sqlx::query_as("SELECT * FROM preservations WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    log::info!(
        "Batch {} added by blood bank {} ({} units of {})",
        batch_id,
        claims.sub,
        preservation.units,
        preservation.blood_type
    );

    Ok(HttpResponse::Created().json(ApiResponse::success(PreservationResponse::from_record(
        preservation,
        now,
    ))))
}

// ==================== LISTINGS ====================

pub async fn get_preservations(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PreservationQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;

    let rows: Vec<Preservation> = match &query.status {
        Some(raw) => {
            let status = PreservationStatus::from_str(raw)
                .ok_or_else(|| ApiError::ValidationError(format!("Invalid status '{}'", raw)))?;
            sqlx::query_as(
                "SELECT * FROM preservations WHERE blood_bank_id = ? AND status = ? \
                 ORDER BY expiry_date ASC",
            )
            .bind(&claims.sub)
            .bind(status.as_str())
            .fetch_all(&app_state.db_pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT * FROM preservations WHERE blood_bank_id = ? ORDER BY expiry_date ASC",
            )
            .bind(&claims.sub)
            .fetch_all(&app_state.db_pool)
            .await?
        }
    };

    let now = Utc::now();
    let batches: Vec<PreservationResponse> = rows
        .into_iter()
        .map(|p| PreservationResponse::from_record(p, now))
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(batches)))
}

pub async fn get_near_expiry_preservations(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;

    let rows: Vec<Preservation> = sqlx::query_as(
        "SELECT * FROM preservations WHERE blood_bank_id = ? AND status = 'Available' \
         ORDER BY expiry_date ASC",
    )
    .bind(&claims.sub)
    .fetch_all(&app_state.db_pool)
    .await?;

    let now = Utc::now();
    let near_expiry: Vec<PreservationResponse> = rows
        .into_iter()
        .map(|p| PreservationResponse::from_record(p, now))
        .filter(|p| p.is_near_expiry)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(near_expiry)))
}

pub async fn get_preservation(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::BloodBank)?;
    let preservation_id = path.into_inner();

    let preservation: Preservation = sqlx::query_as(
        "SELECT * FROM preservations WHERE id = ? AND blood_bank_id = ?",
    )
    .bind(&preservation_id)
    .bind(&claims.sub)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| ApiError::preservation_not_found(&preservation_id))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(PreservationResponse::from_record(
        preservation,
        Utc::now(),
    ))))
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

    #[actix_rt::test]
    async fn test_create_batch_updates_stock() {
        let state = test_state().await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;

        let resp = create_preservation(
            state.clone(),
            web::Json(CreatePreservationRequest {
                blood_type: "A+".to_string(),
                units: 10,
                collection_date: None,
                expiry_date: Utc::now() + Duration::days(35),
                storage_location: Some("Fridge 3".to_string()),
                donor_info: None,
            }),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .expect("create batch");
        let body = body_json(resp).await;
        assert_eq!(body["data"]["status"], "Available");
        assert_eq!(body["data"]["units"], 10);
        let batch_id = body["data"]["batch_id"].as_str().unwrap();
        assert!(crate::validator::is_valid_batch_id(batch_id));

        let bank = BloodBank::find_by_id(&state.db_pool, &bank_id).await.unwrap();
        assert_eq!(bank.total_stock, 10);
    }

    #[actix_rt::test]
    async fn test_expiry_must_follow_collection() {
        let state = test_state().await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;

        let err = create_preservation(
            state.clone(),
            web::Json(CreatePreservationRequest {
                blood_type: "A+".to_string(),
                units: 5,
                collection_date: Some(Utc::now()),
                expiry_date: Utc::now() - Duration::days(1),
                storage_location: None,
                donor_info: None,
            }),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    #[actix_rt::test]
    async fn test_near_expiry_listing() {
        let state = test_state().await;
        let bank_id = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;

        for (blood_type, days) in [("A+", 3), ("B+", 40)] {
            create_preservation(
                state.clone(),
                web::Json(CreatePreservationRequest {
                    blood_type: blood_type.to_string(),
                    units: 5,
                    collection_date: None,
                    expiry_date: Utc::now() + Duration::days(days),
                    storage_location: None,
                    donor_info: None,
                }),
                authed(claims_for(&bank_id, UserRole::BloodBank)),
            )
            .await
            .expect("create batch");
        }

        let resp = get_near_expiry_preservations(
            state.clone(),
            authed(claims_for(&bank_id, UserRole::BloodBank)),
        )
        .await
        .unwrap();
        let body = body_json(resp).await;
        let listed = body["data"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["blood_type"], "A+");
        assert_eq!(listed[0]["is_near_expiry"], true);
    }

    #[actix_rt::test]
    async fn test_get_preservation_enforces_ownership() {
        let state = test_state().await;
        let bank_a = insert_blood_bank(&state.db_pool, "Bank A", "Metro").await;
        let bank_b = insert_blood_bank(&state.db_pool, "Bank B", "Metro").await;

        let resp = create_preservation(
            state.clone(),
            web::Json(CreatePreservationRequest {
                blood_type: "O-".to_string(),
                units: 4,
                collection_date: None,
                expiry_date: Utc::now() + Duration::days(20),
                storage_location: None,
                donor_info: None,
            }),
            authed(claims_for(&bank_a, UserRole::BloodBank)),
        )
        .await
        .unwrap();
        let id = body_json(resp).await["data"]["id"].as_str().unwrap().to_string();

        let err = get_preservation(
            state.clone(),
            web::Path::from(id),
            authed(claims_for(&bank_b, UserRole::BloodBank)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
