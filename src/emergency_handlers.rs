// src/emergency_handlers.rs - Emergency creation, donor pledges and listings

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{require_creator_role, require_role, UserRole};
use crate::error::{validate_city, ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::hub::{events, RoomKey};
use crate::models::*;
use crate::notify::send_email_background;
use crate::AppState;

// ==================== RESPONSE STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct EmergencyWithResponses {
    #[serde(flatten)]
    pub emergency: Emergency,
    pub responses: Vec<EmergencyResponse>,
}

#[derive(Debug, Serialize)]
pub struct RespondResult {
    pub emergency: Emergency,
    pub reputation: i64,
}

fn created_payload(emergency: &Emergency) -> serde_json::Value {
    json!({
        "emergency": {
            "id": emergency.id,
            "bloodType": emergency.blood_type,
            "unitsNeeded": emergency.units_needed,
            "city": emergency.city,
            "location": emergency.location,
            "creatorName": emergency.creator_name,
            "priority": emergency.priority,
            "status": emergency.status,
            "createdAt": emergency.created_at,
        }
    })
}

// ==================== CREATE ====================

pub async fn create_emergency(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateEmergencyRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_creator_role(&http_request)?;
    request.validate()?;

    let blood_type = BloodType::from_str(&request.blood_type)
        .ok_or_else(|| ApiError::invalid_blood_type(&request.blood_type))?;
    let priority = match request.priority.as_deref() {
        Some(raw) => Priority::from_str(raw)
            .map_err(|_| ApiError::ValidationError(format!("Invalid priority '{}'", raw)))?,
        None => Priority::High,
    };

    let kind = match claims.role {
        UserRole::Hospital => AccountKind::Hospital,
        _ => AccountKind::BloodBank,
    };
    // City, location and contact phone come from the creator's own record
    let creator = AccountRef::new(kind, &claims.sub)
        .resolve_contact(&app_state.db_pool)
        .await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let mut tx = app_state.db_pool.begin().await?;
    sqlx::query(
        "INSERT INTO emergencies \
         (id, creator_kind, creator_id, creator_name, blood_type, units_needed, \
          city, location, contact_phone, description, status, priority, \
          expires_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'Active', ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(kind.as_str())
    .bind(&creator.id)
    .bind(&creator.name)
    .bind(blood_type.as_str())
    .bind(request.units_needed)
    .bind(&creator.city)
    .bind(&creator.location)
    .bind(&creator.phone)
    .bind(&request.description)
    .bind(priority.to_string())
    .bind(default_expiry(now))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    if kind == AccountKind::Hospital {
        sqlx::query(
            "UPDATE hospitals SET emergencies_created = emergencies_created + 1, updated_at = ? \
             WHERE id = ?",
        )
        .bind(now)
        .bind(&creator.id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let emergency: Emergency = sqlx::query_as("SELECT * FROM emergencies WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    // Fan out to the creator's city and to both responder roles; delivery is
    // best-effort and never fails this request
    let payload = created_payload(&emergency);
    let hub = &app_state.hub;
    hub.publish(
        &RoomKey::City(emergency.city.clone()),
        events::EMERGENCY_CREATED,
        payload.clone(),
    );
    hub.publish(&RoomKey::Role(UserRole::Donor), events::EMERGENCY_CREATED, payload.clone());
    hub.publish(&RoomKey::Role(UserRole::BloodBank), events::EMERGENCY_CREATED, payload);

    // Confirmation email is fire-and-forget
    send_email_background(
        app_state.notifier.clone(),
        claims.email.clone(),
        "Emergency broadcast created".to_string(),
        format!(
            "Your emergency for {} units of {} is live in {} until {}",
            emergency.units_needed, emergency.blood_type, emergency.city, emergency.expires_at
        ),
    );

    log::info!(
        "Emergency {} created by {} {} ({} units of {})",
        id,
        kind,
        creator.name,
        emergency.units_needed,
        emergency.blood_type
    );

    Ok(HttpResponse::Created().json(ApiResponse::success(emergency)))
}

// ==================== RESPOND ====================

pub async fn respond_to_emergency(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<RespondToEmergencyRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::Donor)?;
    request.validate()?;

    let donor = Donor::find_by_id(&app_state.db_pool, &claims.sub).await?;

    // Guard, insert and counter updates share one transaction; the unique
    // index on (emergency_id, donor_id) backs the duplicate check
    let mut tx = app_state.db_pool.begin().await?;

    let emergency: Emergency = sqlx::query_as("SELECT * FROM emergencies WHERE id = ?")
        .bind(&request.emergency_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::emergency_not_found(&request.emergency_id))?;

    if emergency.status != EmergencyStatus::Active.as_str() {
        return Err(ApiError::invalid_transition(
            "emergency",
            &emergency.status,
            "respond to",
        ));
    }

    let existing: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM emergency_responses WHERE emergency_id = ? AND donor_id = ?",
    )
    .bind(&emergency.id)
    .bind(&donor.id)
    .fetch_one(&mut *tx)
    .await?;
    if existing.0 > 0 {
        return Err(ApiError::duplicate_response(&donor.id));
    }

    let now = Utc::now();
    sqlx::query(
        "INSERT INTO emergency_responses \
         (id, emergency_id, donor_id, donor_name, units_pledged, status, responded_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&emergency.id)
    .bind(&donor.id)
    .bind(&donor.name)
    .bind(request.units_pledged)
    .bind(PledgeStatus::Pledged.to_string())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE emergencies SET units_pledged = units_pledged + ?, updated_at = ? WHERE id = ?")
        .bind(request.units_pledged)
        .bind(now)
        .bind(&emergency.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE donors SET total_pledges = total_pledges + 1, reputation = reputation + ?, \
         updated_at = ? WHERE id = ?",
    )
    .bind(PLEDGE_REPUTATION_REWARD)
    .bind(now)
    .bind(&donor.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let updated: Emergency = sqlx::query_as("SELECT * FROM emergencies WHERE id = ?")
        .bind(&emergency.id)
        .fetch_one(&app_state.db_pool)
        .await?;

    app_state.hub.publish(
        &RoomKey::User(updated.creator_id.clone()),
        events::EMERGENCY_RESPONSE,
        json!({
            "emergencyId": updated.id,
            "donor": { "name": donor.name, "bloodGroup": donor.blood_group },
            "unitsPledged": request.units_pledged,
        }),
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success(RespondResult {
        emergency: updated,
        reputation: donor.reputation + PLEDGE_REPUTATION_REWARD,
    })))
}

// ==================== LISTINGS ====================

pub async fn get_nearby_emergencies(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<NearbyQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::Donor)?;
    let donor = Donor::find_by_id(&app_state.db_pool, &claims.sub).await?;

    let city = query
        .city
        .clone()
        .unwrap_or_else(|| donor.city.clone());
    validate_city(&city)?;

    let donor_type = BloodType::from_str(&donor.blood_group).ok_or_else(|| {
        ApiError::InternalServerError(format!("Unknown donor blood group '{}'", donor.blood_group))
    })?;

    let sql = format!(
        "SELECT * FROM emergencies \
         WHERE city = ? AND status = 'Active' AND expires_at > ? \
         ORDER BY {}, created_at DESC",
        PRIORITY_ORDER_SQL
    );
    let rows: Vec<Emergency> = sqlx::query_as(&sql)
        .bind(&city)
        .bind(Utc::now())
        .fetch_all(&app_state.db_pool)
        .await?;

    let compatible: Vec<Emergency> = rows
        .into_iter()
        .filter(|e| match BloodType::from_str(&e.blood_type) {
            Some(need) => donor_matches(donor_type, need),
            None => false,
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(compatible)))
}

pub async fn get_latest_emergencies(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<LatestQuery>,
) -> ApiResult<HttpResponse> {
    let limit = query.limit.unwrap_or(10).clamp(1, 50);
    let now = Utc::now();

    let emergencies: Vec<Emergency> = match &query.city {
        Some(city) => {
            let sql = format!(
                "SELECT * FROM emergencies \
                 WHERE city = ? AND status = 'Active' AND expires_at > ? \
                 ORDER BY {}, created_at DESC LIMIT ?",
                PRIORITY_ORDER_SQL
            );
            sqlx::query_as(&sql)
                .bind(city)
                .bind(now)
                .bind(limit)
                .fetch_all(&app_state.db_pool)
                .await?
        }
        None => {
            let sql = format!(
                "SELECT * FROM emergencies \
                 WHERE status = 'Active' AND expires_at > ? \
                 ORDER BY {}, created_at DESC LIMIT ?",
                PRIORITY_ORDER_SQL
            );
            sqlx::query_as(&sql)
                .bind(now)
                .bind(limit)
                .fetch_all(&app_state.db_pool)
                .await?
        }
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(emergencies)))
}

pub async fn get_my_emergencies(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_creator_role(&http_request)?;
    let kind = match claims.role {
        UserRole::Hospital => AccountKind::Hospital,
        _ => AccountKind::BloodBank,
    };

    let emergencies: Vec<Emergency> = sqlx::query_as(
        "SELECT * FROM emergencies WHERE creator_kind = ? AND creator_id = ? \
         ORDER BY created_at DESC",
    )
    .bind(kind.as_str())
    .bind(&claims.sub)
    .fetch_all(&app_state.db_pool)
    .await?;

    let mut result = Vec::with_capacity(emergencies.len());
    for emergency in emergencies {
        let responses: Vec<EmergencyResponse> = sqlx::query_as(
            "SELECT * FROM emergency_responses WHERE emergency_id = ? ORDER BY responded_at ASC",
        )
        .bind(&emergency.id)
        .fetch_all(&app_state.db_pool)
        .await?;
        result.push(EmergencyWithResponses {
            emergency,
            responses,
        });
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(result)))
}

pub async fn get_my_pledges(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_role(&http_request, UserRole::Donor)?;
    let pledges: Vec<EmergencyResponse> = sqlx::query_as(
        "SELECT * FROM emergency_responses WHERE donor_id = ? ORDER BY responded_at DESC",
    )
    .bind(&claims.sub)
    .fetch_all(&app_state.db_pool)
    .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(pledges)))
}

// ==================== CANCEL ====================

pub async fn cancel_emergency(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_creator_role(&http_request)?;
    let emergency_id = path.into_inner();
    let kind = match claims.role {
        UserRole::Hospital => AccountKind::Hospital,
        _ => AccountKind::BloodBank,
    };

    let emergency: Emergency = sqlx::query_as(
        "SELECT * FROM emergencies WHERE id = ? AND creator_kind = ? AND creator_id = ?",
    )
    .bind(&emergency_id)
    .bind(kind.as_str())
    .bind(&claims.sub)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| ApiError::emergency_not_found(&emergency_id))?;

    if emergency.status != EmergencyStatus::Active.as_str() {
        return Err(ApiError::invalid_transition(
            "emergency",
            &emergency.status,
            "cancel",
        ));
    }

    let now = Utc::now();
    sqlx::query(
        "UPDATE emergencies SET status = 'Cancelled', cancelled_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(now)
    .bind(&emergency_id)
    .execute(&app_state.db_pool)
    .await?;

    let updated: Emergency = sqlx::query_as("SELECT * FROM emergencies WHERE id = ?")
        .bind(&emergency_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

// ==================== TESTS ====================
