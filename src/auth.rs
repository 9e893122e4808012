// src/auth.rs - Roles, claims, JWT issuing/verification and the bearer middleware

use actix_web::{dev::ServiceRequest, web, HttpMessage, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

// ======== ROLES ========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Hospital,
    Donor,
    #[serde(rename = "bloodbank")]
    BloodBank,
    Patient,
}

impl UserRole {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hospital" => Some(UserRole::Hospital),
            "donor" => Some(UserRole::Donor),
            "bloodbank" | "blood_bank" => Some(UserRole::BloodBank),
            "patient" => Some(UserRole::Patient),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Hospital => "hospital",
            UserRole::Donor => "donor",
            UserRole::BloodBank => "bloodbank",
            UserRole::Patient => "patient",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            UserRole::Hospital => "Hospital",
            UserRole::Donor => "Donor",
            UserRole::BloodBank => "Blood Bank",
            UserRole::Patient => "Patient",
        }
    }

    pub fn all_role_strings() -> Vec<&'static str> {
        vec!["hospital", "donor", "bloodbank", "patient"]
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ======== CLAIMS ========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // account id
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

// ======== AUTH SERVICE ========

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiration_hours: i64,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_expiration_hours: i64, bcrypt_cost: u32) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_expiration_hours,
            bcrypt_cost,
        }
    }

    pub fn token_expiration_secs(&self) -> i64 {
        self.token_expiration_hours * 3600
    }

    pub fn hash_password(&self, password: &str) -> ApiResult<String> {
        validate_password_strength(password)?;
        hash(password, self.bcrypt_cost)
            .map_err(|_| ApiError::InternalServerError("Password hashing failed".to_string()))
    }

    pub fn verify_password(&self, password: &str, password_hash: &str) -> ApiResult<bool> {
        verify(password, password_hash)
            .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))
    }

    pub fn generate_token(
        &self,
        subject_id: &str,
        name: &str,
        email: &str,
        role: UserRole,
    ) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.token_expiration_hours);

        let claims = Claims {
            sub: subject_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| ApiError::AuthError("Failed to generate token".to_string()))
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::AuthError("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    ApiError::AuthError("Invalid token".to_string())
                }
                _ => ApiError::AuthError("Token verification failed".to_string()),
            })
    }
}

// ======== PASSWORD VALIDATION ========

fn validate_password_strength(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::ValidationError(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one digit".to_string(),
        ));
    }
    Ok(())
}

// ======== HELPER FUNCTIONS ========

pub fn get_current_user(req: &HttpRequest) -> ApiResult<Claims> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("No user information found".to_string()))
}

/// Extract the caller's claims and fail with Forbidden unless they hold the
/// given role.
pub fn require_role(req: &HttpRequest, role: UserRole) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    if claims.role != role {
        return Err(ApiError::Forbidden(format!(
            "{} access required",
            role.display_name()
        )));
    }
    Ok(claims)
}

/// Like `require_role`, but for endpoints shared by hospitals and blood
/// banks (emergency creation).
pub fn require_creator_role(req: &HttpRequest) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    match claims.role {
        UserRole::Hospital | UserRole::BloodBank => Ok(claims),
        _ => Err(ApiError::Forbidden(
            "Hospital or Blood Bank access required".to_string(),
        )),
    }
}

// ======== JWT MIDDLEWARE ========

pub async fn jwt_middleware(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let token = credentials.token();

    let auth_service = match req.app_data::<web::Data<std::sync::Arc<AuthService>>>() {
        Some(svc) => svc,
        None => {
            log::error!("AuthService not found in app data");
            return Err((
                ApiError::InternalServerError("Auth service not available".to_string()).into(),
                req,
            ));
        }
    };

    match auth_service.verify_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(req)
        }
        Err(err) => {
            log::warn!("JWT verification failed: {}", err);
            Err((err.into(), req))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new("test_secret_with_enough_length!!", 24, 4)
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(UserRole::from_str("hospital"), Some(UserRole::Hospital));
        assert_eq!(UserRole::from_str("BloodBank"), Some(UserRole::BloodBank));
        assert_eq!(UserRole::from_str("blood_bank"), Some(UserRole::BloodBank));
        assert_eq!(UserRole::from_str("PATIENT"), Some(UserRole::Patient));
        assert_eq!(UserRole::from_str("admin"), None);
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Passw0rd").is_ok());
        assert!(validate_password_strength("short1A").is_err());
        assert!(validate_password_strength("alllowercase1").is_err());
        assert!(validate_password_strength("ALLUPPERCASE1").is_err());
        assert!(validate_password_strength("NoDigitsHere").is_err());
    }

    #[test]
    fn test_token_round_trip() {
        let svc = service();
        let token = svc
            .generate_token("acct-1", "Metro General", "metro@example.com", UserRole::Hospital)
            .unwrap();
        let claims = svc.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "acct-1");
        assert_eq!(claims.role, UserRole::Hospital);
        assert_eq!(claims.email, "metro@example.com");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let svc = service();
        assert!(svc.verify_token("not-a-jwt").is_err());

        let other = AuthService::new("a_completely_different_secret!!!", 24, 4);
        let token = other
            .generate_token("acct-2", "Donor", "d@example.com", UserRole::Donor)
            .unwrap();
        assert!(svc.verify_token(&token).is_err());
    }
}
