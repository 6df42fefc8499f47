//! User and authentication data structures

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Gender as stored in the user profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "M" | "MALE" => Ok(Self::Male),
            "F" | "FEMALE" => Ok(Self::Female),
            "O" | "OTHER" => Ok(Self::Other),
            other => Err(format!("unknown gender: {}", other)),
        }
    }
}

/// The signed-in user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    #[serde(default)]
    pub username: String,

    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_joined: Option<DateTime<Utc>>,

    /// When the server last finished a sync for this user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Access and refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access: String,
    pub refresh: String,
}

/// Body of `POST /users/auth/signup`
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Body of `POST /users/auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response data of a successful login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub tokens: Tokens,
}

/// Response data of `POST /users/auth/check-email`
#[derive(Debug, Clone, Deserialize)]
pub struct EmailAvailability {
    pub available: bool,
}

/// Response data of `POST /users/auth/token/refresh`
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedToken {
    pub access: String,

    /// Some deployments rotate refresh tokens
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Body of `PATCH /users/me`
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl UpdateProfileRequest {
    pub fn is_empty(&self) -> bool {
        self.gender.is_none() && self.birth_date.is_none() && self.phone_number.is_none()
    }
}

/// Body of `POST /users/change-password`
#[derive(Debug, Clone, Serialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}
