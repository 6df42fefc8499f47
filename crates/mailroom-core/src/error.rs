//! Error types for Mailroom

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Result type alias using Mailroom's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Mailroom
#[derive(Error, Debug)]
pub enum Error {
    // API errors
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: ApiErrorCode,
        message: String,
    },

    #[error("Unexpected API response: {0}")]
    UnexpectedResponse(String),

    // Authentication errors
    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Access token expired")]
    TokenExpired,

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Token storage error: {0}")]
    TokenStore(String),

    // Input errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Returns true if this error indicates the user needs to log in again
    pub fn requires_reauth(&self) -> bool {
        match self {
            Error::NotAuthenticated | Error::TokenExpired | Error::TokenRefreshFailed(_) => true,
            Error::Api { code, .. } => matches!(
                code,
                ApiErrorCode::TokenExpired | ApiErrorCode::InvalidToken
            ),
            _ => false,
        }
    }

    /// Returns true if the server reported that there is nothing left to classify
    pub fn is_no_backlog(&self) -> bool {
        matches!(
            self,
            Error::Api {
                code: ApiErrorCode::NoUnclassifiedMails,
                ..
            }
        )
    }

    /// The structured API error code, if this error came from the server
    pub fn api_code(&self) -> Option<&ApiErrorCode> {
        match self {
            Error::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns a user-friendly action message for recoverable errors
    pub fn action_hint(&self) -> Option<&'static str> {
        match self {
            e if e.requires_reauth() => Some("Run `mailroom auth login` to sign in again"),
            Error::Http(e) if e.is_connect() || e.is_timeout() => {
                Some("Check that the mail server is reachable")
            }
            Error::Api {
                code: ApiErrorCode::PermissionDenied,
                ..
            } => Some("Your account does not have access to this resource"),
            _ => None,
        }
    }
}

/// Error codes reported by the mail service
///
/// The server sends either a numeric `error_code` or a string `code` in the
/// error envelope. Both are folded into this enum so callers never have to
/// look at message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorCode {
    Unknown,
    BadRequest,
    NotFound,
    Conflict,
    AuthFailed,
    InvalidCredentials,
    InactiveAccount,
    TokenExpired,
    InvalidToken,
    PermissionDenied,
    EmailNotFound,
    EmailDuplicate,
    UsernameDuplicate,
    ValidationFailed,
    PasswordMismatch,
    CurrentPasswordWrong,
    NoUnclassifiedMails,
    /// A code this client does not know about
    Unrecognized(String),
    /// The server did not send a code
    Unspecified,
}

impl ApiErrorCode {
    /// Map a numeric `error_code` field
    pub fn from_numeric(code: i64) -> Self {
        match code {
            10000 => Self::Unknown,
            10001 => Self::BadRequest,
            10002 => Self::NotFound,
            10003 => Self::Conflict,
            20000 => Self::AuthFailed,
            20001 => Self::InvalidCredentials,
            20002 => Self::InactiveAccount,
            20003 => Self::TokenExpired,
            20004 => Self::InvalidToken,
            20005 => Self::PermissionDenied,
            30001 => Self::EmailNotFound,
            30002 => Self::EmailDuplicate,
            30003 => Self::UsernameDuplicate,
            40000 => Self::ValidationFailed,
            40001 => Self::PasswordMismatch,
            40002 => Self::CurrentPasswordWrong,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Map a string `code` field
    pub fn from_name(code: &str) -> Self {
        match code {
            "UNKNOWN" => Self::Unknown,
            "BAD_REQUEST" => Self::BadRequest,
            "NOT_FOUND" => Self::NotFound,
            "CONFLICT" => Self::Conflict,
            "AUTH_FAILED" => Self::AuthFailed,
            "INVALID_CREDENTIALS" => Self::InvalidCredentials,
            "INACTIVE_ACCOUNT" => Self::InactiveAccount,
            "TOKEN_EXPIRED" => Self::TokenExpired,
            "INVALID_TOKEN" => Self::InvalidToken,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "EMAIL_NOT_FOUND" => Self::EmailNotFound,
            "EMAIL_DUPLICATE" => Self::EmailDuplicate,
            "USERNAME_DUPLICATE" => Self::UsernameDuplicate,
            "VALIDATION_FAILED" => Self::ValidationFailed,
            "PASSWORD_MISMATCH" => Self::PasswordMismatch,
            "CURRENT_PASSWORD_WRONG" => Self::CurrentPasswordWrong,
            "NO_UNCLASSIFIED_MAILS" => Self::NoUnclassifiedMails,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrecognized(raw) => write!(f, "{}", raw),
            other => write!(f, "{:?}", other),
        }
    }
}

/// The `code` / `error_code` part of an error envelope, as it appears on the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawErrorCode {
    Numeric(i64),
    Name(String),
}

impl From<RawErrorCode> for ApiErrorCode {
    fn from(raw: RawErrorCode) -> Self {
        match raw {
            RawErrorCode::Numeric(n) => ApiErrorCode::from_numeric(n),
            RawErrorCode::Name(s) => match s.parse::<i64>() {
                Ok(n) => ApiErrorCode::from_numeric(n),
                Err(_) => ApiErrorCode::from_name(&s),
            },
        }
    }
}
