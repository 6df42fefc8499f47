//! Client-side validation of account forms

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::error::{ApiErrorCode, Error};
use crate::models::{ChangePasswordRequest, Gender, LoginRequest, SignupRequest};

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^01[0-9]-[0-9]{3,4}-[0-9]{4}$").expect("phone pattern"));

pub const MIN_PASSWORD_LEN: usize = 8;

/// A form field that can carry an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Email,
    Password,
    PasswordConfirm,
    CurrentPassword,
    BirthDate,
    PhoneNumber,
    /// Not tied to one field
    General,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Email => "email",
            Field::Password => "password",
            Field::PasswordConfirm => "password confirmation",
            Field::CurrentPassword => "current password",
            Field::BirthDate => "birth date",
            Field::PhoneNumber => "phone number",
            Field::General => "form",
        };
        f.write_str(name)
    }
}

/// Per-field validation messages; at most one per field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error unless the field already has one
    pub fn add(&mut self, field: Field, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(f, m)| (*f, m.as_str()))
    }

    fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    /// Field errors for a rejected signup, keyed by the server error code
    pub fn from_signup_error(err: &Error) -> Self {
        let mut errors = Self::new();
        match err.api_code() {
            Some(ApiErrorCode::EmailDuplicate) => {
                errors.add(Field::Email, "This email is already in use")
            }
            Some(ApiErrorCode::UsernameDuplicate) => {
                errors.add(Field::Email, "This username is already in use")
            }
            Some(ApiErrorCode::PasswordMismatch) => {
                errors.add(Field::PasswordConfirm, "Passwords do not match")
            }
            _ => errors.add(Field::General, format!("Sign-up failed: {}", err)),
        }
        errors
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl From<FieldErrors> for Error {
    fn from(errors: FieldErrors) -> Self {
        Error::Validation(errors.to_string())
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_PATTERN.is_match(phone)
}

/// Format raw phone input as the user types: digits only, dashed after the
/// third and seventh digit, at most eleven digits
pub fn format_phone(input: &str) -> String {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        0..=3 => digits,
        4..=7 => format!("{}-{}", &digits[..3], &digits[3..]),
        len => format!(
            "{}-{}-{}",
            &digits[..3],
            &digits[3..7],
            &digits[7..len.min(11)]
        ),
    }
}

/// Registration form as entered
#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    /// `YYYY-MM-DD`
    pub birth_date: String,
    pub phone: String,
    pub gender: Option<Gender>,
    /// Result of the availability check, if one was made for this email
    pub email_available: Option<bool>,
}

impl SignupForm {
    /// Validate every field; the username is the local part of the email
    pub fn validate(&self) -> Result<SignupRequest, FieldErrors> {
        let mut errors = FieldErrors::new();
        let email = self.email.trim();

        if email.is_empty() {
            errors.add(Field::Email, "Email is required");
        } else if !is_valid_email(email) {
            errors.add(Field::Email, "Enter a valid email address");
        } else {
            match self.email_available {
                None => errors.add(Field::Email, "Check that the email is available first"),
                Some(false) => errors.add(Field::Email, "This email is already in use"),
                Some(true) => {}
            }
        }

        check_new_password(
            &mut errors,
            Field::Password,
            &self.password,
            &self.password_confirm,
        );

        let birth_date = if self.birth_date.trim().is_empty() {
            errors.add(Field::BirthDate, "Birth date is required");
            None
        } else {
            match NaiveDate::parse_from_str(self.birth_date.trim(), "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.add(Field::BirthDate, "Use the YYYY-MM-DD format");
                    None
                }
            }
        };

        let phone = format_phone(&self.phone);
        if phone.is_empty() {
            errors.add(Field::PhoneNumber, "Phone number is required");
        } else if !is_valid_phone(&phone) {
            errors.add(Field::PhoneNumber, "Enter a phone number like 010-1234-5678");
        }

        let username = email.split('@').next().unwrap_or_default().to_string();
        errors.finish(SignupRequest {
            username,
            email: email.to_string(),
            password: self.password.clone(),
            password_confirm: self.password_confirm.clone(),
            gender: self.gender,
            birth_date,
            phone_number: Some(phone),
        })
    }
}

/// Login form as entered
#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<LoginRequest, FieldErrors> {
        let mut errors = FieldErrors::new();
        let email = self.email.trim();
        if email.is_empty() {
            errors.add(Field::Email, "Email is required");
        } else if !is_valid_email(email) {
            errors.add(Field::Email, "Enter a valid email address");
        }
        if self.password.is_empty() {
            errors.add(Field::Password, "Password is required");
        }
        errors.finish(LoginRequest {
            email: email.to_string(),
            password: self.password.clone(),
        })
    }
}

/// Password change form
#[derive(Debug, Clone, Default)]
pub struct ChangePasswordForm {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

impl ChangePasswordForm {
    pub fn validate(&self) -> Result<ChangePasswordRequest, FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.current_password.is_empty() {
            errors.add(Field::CurrentPassword, "Current password is required");
        }
        check_new_password(
            &mut errors,
            Field::Password,
            &self.new_password,
            &self.new_password_confirm,
        );
        errors.finish(ChangePasswordRequest {
            current_password: self.current_password.clone(),
            new_password: self.new_password.clone(),
            new_password_confirm: self.new_password_confirm.clone(),
        })
    }
}

fn check_new_password(errors: &mut FieldErrors, field: Field, password: &str, confirm: &str) {
    if password.is_empty() {
        errors.add(field, "Password is required");
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            field,
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }
    if confirm.is_empty() {
        errors.add(Field::PasswordConfirm, "Confirm the password");
    } else if password != confirm {
        errors.add(Field::PasswordConfirm, "Passwords do not match");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> SignupForm {
        SignupForm {
            email: "jane@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
            password_confirm: "hunter2hunter2".to_string(),
            birth_date: "1990-04-12".to_string(),
            phone: "01012345678".to_string(),
            gender: None,
            email_available: Some(true),
        }
    }

    #[test]
    fn test_format_phone_progressively() {
        assert_eq!(format_phone(""), "");
        assert_eq!(format_phone("010"), "010");
        assert_eq!(format_phone("0101"), "010-1");
        assert_eq!(format_phone("0101234"), "010-1234");
        assert_eq!(format_phone("01012345"), "010-1234-5");
        assert_eq!(format_phone("01012345678"), "010-1234-5678");
        assert_eq!(format_phone("010-1234-5678999"), "010-1234-5678");
        assert_eq!(format_phone("(010) 1234 5678"), "010-1234-5678");
    }

    #[test]
    fn test_email_and_phone_patterns() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.d"));
        assert!(is_valid_phone("010-123-4567"));
        assert!(is_valid_phone("011-1234-5678"));
        assert!(!is_valid_phone("02-1234-5678"));
    }

    #[test]
    fn test_valid_signup() {
        let request = valid_form().validate().unwrap();
        assert_eq!(request.username, "jane");
        assert_eq!(request.phone_number.as_deref(), Some("010-1234-5678"));
        assert_eq!(request.birth_date, NaiveDate::from_ymd_opt(1990, 4, 12));
    }

    #[test]
    fn test_signup_reports_every_field() {
        let form = SignupForm {
            email: "nope".to_string(),
            password: "short".to_string(),
            password_confirm: "other".to_string(),
            birth_date: String::new(),
            phone: "12".to_string(),
            ..Default::default()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get(Field::Email), Some("Enter a valid email address"));
        assert_eq!(
            errors.get(Field::Password),
            Some("Password must be at least 8 characters")
        );
        assert_eq!(errors.get(Field::PasswordConfirm), Some("Passwords do not match"));
        assert_eq!(errors.get(Field::BirthDate), Some("Birth date is required"));
        assert!(errors.get(Field::PhoneNumber).is_some());
    }

    #[test]
    fn test_signup_requires_availability_check() {
        let mut form = valid_form();
        form.email_available = None;
        assert!(form.validate().unwrap_err().get(Field::Email).is_some());
        form.email_available = Some(false);
        assert_eq!(
            form.validate().unwrap_err().get(Field::Email),
            Some("This email is already in use")
        );
    }

    #[test]
    fn test_login_form() {
        let errors = LoginForm::default().validate().unwrap_err();
        assert_eq!(errors.iter().count(), 2);

        let ok = LoginForm {
            email: " jane@example.com ".to_string(),
            password: "x".to_string(),
        }
        .validate()
        .unwrap();
        assert_eq!(ok.email, "jane@example.com");
    }

    #[test]
    fn test_signup_error_mapping() {
        let err = Error::Api {
            status: 409,
            code: ApiErrorCode::EmailDuplicate,
            message: "duplicate".to_string(),
        };
        let errors = FieldErrors::from_signup_error(&err);
        assert_eq!(errors.get(Field::Email), Some("This email is already in use"));

        let err: Error = errors.into();
        assert!(err.to_string().contains("email: This email is already in use"));
    }
}
