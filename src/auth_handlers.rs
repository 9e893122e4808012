// src/auth_handlers.rs - Registration, login and profile for the four roles

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{get_current_user, AuthService, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{AccountAuthRow, BloodType};
use crate::validator::validate_phone;
use crate::AppState;

// ======== REQUEST/RESPONSE STRUCTS ========

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Role is required"))]
    pub role: String,
    #[validate(length(min = 2, max = 255, message = "Name must be 2-255 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    pub location: Option<String>,
    #[serde(alias = "bloodGroup")]
    pub blood_group: Option<String>,
    pub age: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Role is required"))]
    pub role: String,
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub phone: String,
    pub city: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
}

impl AccountInfo {
    fn from_row(row: AccountAuthRow, role: UserRole) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            role,
            phone: row.phone,
            city: row.city,
            location: row.location,
            blood_group: row.blood_group,
            age: row.age,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub account: AccountInfo,
}

// ======== HANDLERS ========

pub async fn register(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    validate_phone(&request.phone)?;

    let role = UserRole::from_str(&request.role).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Invalid role '{}'. Valid roles: {}",
            request.role,
            UserRole::all_role_strings().join(", ")
        ))
    })?;

    // Donors and patients carry a blood group; patients also an age
    let blood_group = match role {
        UserRole::Donor | UserRole::Patient => {
            let raw = request.blood_group.as_deref().ok_or_else(|| {
                ApiError::ValidationError("Blood group is required for this role".to_string())
            })?;
            let parsed = BloodType::from_str(raw)
                .ok_or_else(|| ApiError::invalid_blood_type(raw))?;
            Some(parsed.as_str().to_string())
        }
        _ => None,
    };
    let age = if role == UserRole::Patient {
        let age = request
            .age
            .ok_or_else(|| ApiError::ValidationError("Age is required for patients".to_string()))?;
        if !(0..=150).contains(&age) {
            return Err(ApiError::ValidationError("Age out of range".to_string()));
        }
        Some(age)
    } else {
        None
    };

    if AccountAuthRow::find_by_email(&app_state.db_pool, role, &request.email)
        .await?
        .is_some()
    {
        return Err(ApiError::Duplicate(format!(
            "An account with email '{}' already exists",
            request.email
        )));
    }

    let password_hash = auth_service.hash_password(&request.password)?;
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let location = request.location.clone().unwrap_or_default();

    match role {
        UserRole::Hospital => {
            sqlx::query(
                "INSERT INTO hospitals (id, name, email, password_hash, phone, city, location, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&request.name)
            .bind(&request.email)
            .bind(&password_hash)
            .bind(&request.phone)
            .bind(&request.city)
            .bind(&location)
            .bind(now)
            .bind(now)
            .execute(&app_state.db_pool)
            .await?;
        }
        UserRole::BloodBank => {
            sqlx::query(
                "INSERT INTO blood_banks (id, name, email, password_hash, phone, city, location, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&request.name)
            .bind(&request.email)
            .bind(&password_hash)
            .bind(&request.phone)
            .bind(&request.city)
            .bind(&location)
            .bind(now)
            .bind(now)
            .execute(&app_state.db_pool)
            .await?;
        }
        UserRole::Donor => {
            sqlx::query(
                "INSERT INTO donors (id, name, email, password_hash, phone, city, location, blood_group, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&request.name)
            .bind(&request.email)
            .bind(&password_hash)
            .bind(&request.phone)
            .bind(&request.city)
            .bind(&location)
            .bind(blood_group.as_deref().unwrap_or_default())
            .bind(now)
            .bind(now)
            .execute(&app_state.db_pool)
            .await?;
        }
        UserRole::Patient => {
            sqlx::query(
                "INSERT INTO patient_users (id, name, email, password_hash, phone, city, location, blood_group, age, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&request.name)
            .bind(&request.email)
            .bind(&password_hash)
            .bind(&request.phone)
            .bind(&request.city)
            .bind(&location)
            .bind(blood_group.as_deref().unwrap_or_default())
            .bind(age.unwrap_or_default())
            .bind(now)
            .bind(now)
            .execute(&app_state.db_pool)
            .await?;
        }
    }

    let token = auth_service.generate_token(&id, &request.name, &request.email, role)?;
    let row = AccountAuthRow::find_by_id(&app_state.db_pool, role, &id).await?;

    log::info!("New {} registered: {}", role, request.email);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        LoginResponse {
            token,
            expires_in: auth_service.token_expiration_secs(),
            account: AccountInfo::from_row(row, role),
        },
        "Account registered successfully".to_string(),
    )))
}

pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let role = UserRole::from_str(&request.role)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid role '{}'", request.role)))?;

    let row = AccountAuthRow::find_by_email(&app_state.db_pool, role, &request.email)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid email or password".to_string()))?;

    if !auth_service.verify_password(&request.password, &row.password_hash)? {
        return Err(ApiError::BadRequest("Invalid email or password".to_string()));
    }

    let token = auth_service.generate_token(&row.id, &row.name, &row.email, role)?;

    log::info!("{} {} logged in", role.display_name(), row.email);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        LoginResponse {
            token,
            expires_in: auth_service.token_expiration_secs(),
            account: AccountInfo::from_row(row, role),
        },
        "Login successful".to_string(),
    )))
}

pub async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let row = AccountAuthRow::find_by_id(&app_state.db_pool, claims.role, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(AccountInfo::from_row(
        row,
        claims.role,
    ))))
}
