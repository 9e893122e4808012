// src/models/account.rs - Account records for the four platform roles
//
// Hospitals and blood banks can both create emergencies and receive
// dispatches; the polymorphic reference is a tagged (kind, id) pair resolved
// against the table for that kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::UserRole;
use crate::error::{ApiError, ApiResult};

// ==================== ACCOUNT KIND (tagged reference) ====================

/// Discriminator for accounts that can own emergencies and receive
/// dispatched units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Hospital,
    #[serde(rename = "bloodbank")]
    BloodBank,
}

impl AccountKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hospital" => Some(AccountKind::Hospital),
            "bloodbank" | "blood_bank" => Some(AccountKind::BloodBank),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Hospital => "hospital",
            AccountKind::BloodBank => "bloodbank",
        }
    }

    pub fn role(&self) -> UserRole {
        match self {
            AccountKind::Hospital => UserRole::Hospital,
            AccountKind::BloodBank => UserRole::BloodBank,
        }
    }

    fn table(&self) -> &'static str {
        match self {
            AccountKind::Hospital => "hospitals",
            AccountKind::BloodBank => "blood_banks",
        }
    }
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed reference to a hospital or blood bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub kind: AccountKind,
    pub id: String,
}

/// Contact projection shared by every account table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AccountContact {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub city: String,
    pub location: String,
}

impl AccountRef {
    pub fn new(kind: AccountKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Resolve the referenced account's contact fields from the table for
    /// its kind. Fails with NotFound when the id does not exist.
    pub async fn resolve_contact(&self, pool: &SqlitePool) -> ApiResult<AccountContact> {
        let query = format!(
            "SELECT id, name, phone, city, location FROM {} WHERE id = ?",
            self.kind.table()
        );
        sqlx::query_as::<_, AccountContact>(&query)
            .bind(&self.id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::account_not_found(self.kind.as_str()))
    }
}

// ==================== ACCOUNT RECORDS ====================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Hospital {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: String,
    pub city: String,
    pub location: String,
    pub total_patients: i64,
    pub emergencies_created: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BloodBank {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: String,
    pub city: String,
    pub location: String,
    pub total_stock: i64,
    pub total_dispatched: i64,
    pub successful_sends: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Donor {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: String,
    pub city: String,
    pub location: String,
    pub blood_group: String,
    pub total_pledges: i64,
    pub reputation: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PatientUser {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: String,
    pub city: String,
    pub location: String,
    pub blood_group: String,
    pub age: i64,
    pub total_requests: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Hospital {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<Hospital> {
        sqlx::query_as::<_, Hospital>("SELECT * FROM hospitals WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::account_not_found("hospital"))
    }
}

impl BloodBank {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<BloodBank> {
        sqlx::query_as::<_, BloodBank>("SELECT * FROM blood_banks WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::account_not_found("bloodbank"))
    }
}

impl Donor {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<Donor> {
        sqlx::query_as::<_, Donor>("SELECT * FROM donors WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::account_not_found("donor"))
    }
}

impl PatientUser {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<PatientUser> {
        sqlx::query_as::<_, PatientUser>("SELECT * FROM patient_users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::account_not_found("patient"))
    }
}

// ==================== AUTH PROJECTION ====================

/// Common projection used by login and profile lookups; role-specific
/// columns are selected as NULL where a table does not have them.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountAuthRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub city: String,
    pub location: String,
    pub blood_group: Option<String>,
    pub age: Option<i64>,
}

impl AccountAuthRow {
    pub async fn find_by_email(
        pool: &SqlitePool,
        role: UserRole,
        email: &str,
    ) -> ApiResult<Option<AccountAuthRow>> {
        let query = match role {
            UserRole::Hospital => {
                "SELECT id, name, email, password_hash, phone, city, location, \
                 NULL AS blood_group, NULL AS age FROM hospitals WHERE email = ?"
            }
            UserRole::BloodBank => {
                "SELECT id, name, email, password_hash, phone, city, location, \
                 NULL AS blood_group, NULL AS age FROM blood_banks WHERE email = ?"
            }
            UserRole::Donor => {
                "SELECT id, name, email, password_hash, phone, city, location, \
                 blood_group, NULL AS age FROM donors WHERE email = ?"
            }
            UserRole::Patient => {
                "SELECT id, name, email, password_hash, phone, city, location, \
                 blood_group, age FROM patient_users WHERE email = ?"
            }
        };
        Ok(sqlx::query_as::<_, AccountAuthRow>(query)
            .bind(email)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        role: UserRole,
        id: &str,
    ) -> ApiResult<AccountAuthRow> {
        let query = match role {
            UserRole::Hospital => {
                "SELECT id, name, email, password_hash, phone, city, location, \
                 NULL AS blood_group, NULL AS age FROM hospitals WHERE id = ?"
            }
            UserRole::BloodBank => {
                "SELECT id, name, email, password_hash, phone, city, location, \
                 NULL AS blood_group, NULL AS age FROM blood_banks WHERE id = ?"
            }
            UserRole::Donor => {
                "SELECT id, name, email, password_hash, phone, city, location, \
                 blood_group, NULL AS age FROM donors WHERE id = ?"
            }
            UserRole::Patient => {
                "SELECT id, name, email, password_hash, phone, city, location, \
                 blood_group, age FROM patient_users WHERE id = ?"
            }
        };
        sqlx::query_as::<_, AccountAuthRow>(query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::account_not_found(role.as_str()))
    }
}
