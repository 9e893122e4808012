use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    InternalServerError(String),
    ValidationError(String),
    InvalidState(String),
    InsufficientUnits(String),
    Duplicate(String),
    DatabaseError(sqlx::Error),
    AuthError(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::InvalidState(msg) => write!(f, "Invalid State: {}", msg),
            ApiError::InsufficientUnits(msg) => write!(f, "Insufficient Units: {}", msg),
            ApiError::Duplicate(msg) => write!(f, "Duplicate: {}", msg),
            ApiError::DatabaseError(err) => write!(f, "Database Error: {}", err),
            ApiError::AuthError(msg) => write!(f, "Auth Error: {}", msg),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        match self {
            ApiError::BadRequest(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::NotFound(_) => HttpResponse::NotFound().json(error_response),
            ApiError::Unauthorized(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::Forbidden(_) => HttpResponse::Forbidden().json(error_response),
            ApiError::ValidationError(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::InvalidState(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::InsufficientUnits(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::Duplicate(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::DatabaseError(_) => HttpResponse::InternalServerError().json(error_response),
            ApiError::AuthError(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::InternalServerError(_) => HttpResponse::InternalServerError().json(error_response),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

// Domain-specific constructors
impl ApiError {
    pub fn emergency_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Emergency with ID '{}' not found", id))
    }

    pub fn blood_request_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Blood request with ID '{}' not found", id))
    }

    pub fn preservation_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Preservation batch with ID '{}' not found", id))
    }

    pub fn send_record_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Send record with ID '{}' not found", id))
    }

    pub fn patient_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Patient with ID '{}' not found", id))
    }

    pub fn account_not_found(kind: &str) -> Self {
        ApiError::NotFound(format!("{} account not found", kind))
    }

    pub fn insufficient_units(available: i64, requested: i64) -> Self {
        ApiError::InsufficientUnits(format!(
            "Insufficient units. Available: {}, Requested: {}",
            available, requested
        ))
    }

    pub fn duplicate_response(donor_id: &str) -> Self {
        ApiError::Duplicate(format!(
            "Donor '{}' has already responded to this emergency",
            donor_id
        ))
    }

    pub fn invalid_transition(entity: &str, status: &str, action: &str) -> Self {
        ApiError::InvalidState(format!(
            "Cannot {} a {} in status '{}'",
            action, entity, status
        ))
    }

    pub fn invalid_blood_type(value: &str) -> Self {
        ApiError::ValidationError(format!("Invalid blood type '{}'", value))
    }
}

// Input validation helpers shared by handlers
pub fn validate_units(units: i64) -> Result<(), ApiError> {
    if units < 1 {
        return Err(ApiError::ValidationError(
            "Units must be at least 1".to_string(),
        ));
    }
    if units > 10_000 {
        return Err(ApiError::ValidationError("Units too large".to_string()));
    }
    Ok(())
}

pub fn validate_city(city: &str) -> Result<(), ApiError> {
    if city.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "City cannot be empty".to_string(),
        ));
    }
    if city.len() > 100 {
        return Err(ApiError::ValidationError("City name too long".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_units() {
        assert!(validate_units(1).is_ok());
        assert!(validate_units(500).is_ok());
        assert!(validate_units(0).is_err());
        assert!(validate_units(-3).is_err());
        assert!(validate_units(10_001).is_err());
    }

    #[test]
    fn test_validate_city() {
        assert!(validate_city("Metro").is_ok());
        assert!(validate_city("").is_err());
        assert!(validate_city("   ").is_err());
    }

    #[test]
    fn test_insufficient_units_message() {
        let err = ApiError::insufficient_units(3, 5);
        assert!(err.to_string().contains("Available: 3"));
        assert!(err.to_string().contains("Requested: 5"));
    }
}
