//! Account and session endpoints

use reqwest::Method;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{
    ChangePasswordRequest, EmailAvailability, LoginRequest, LoginResponse, RefreshedToken,
    SignupRequest, Tokens, UpdateProfileRequest, User,
};

use super::{ApiClient, REFRESH_PATH};

impl ApiClient {
    /// Create a new account
    pub async fn signup(&self, request: &SignupRequest) -> Result<User> {
        let user: User = self.send_anonymous("users/auth/signup", request).await?;
        info!("Registered account {}", user.email);
        Ok(user)
    }

    /// Log in and persist the returned tokens
    pub async fn login(&self, request: &LoginRequest) -> Result<User> {
        let response: LoginResponse = self.send_anonymous("users/auth/login", request).await?;
        self.token_store().store(&response.tokens).await?;
        info!("Logged in as {}", response.user.email);
        Ok(response.user)
    }

    /// Ask whether an address is free to register
    pub async fn check_email(&self, email: &str) -> Result<bool> {
        #[derive(Serialize)]
        struct Body<'a> {
            email: &'a str,
        }

        let availability: EmailAvailability = self
            .send_anonymous("users/auth/check-email", &Body { email })
            .await?;
        Ok(availability.available)
    }

    /// Explicitly exchange the stored refresh token for a new access token
    pub async fn refresh_token(&self) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            refresh: &'a str,
        }

        let tokens = self
            .token_store()
            .load()
            .await?
            .ok_or(Error::NotAuthenticated)?;
        let refreshed: RefreshedToken = self
            .send_anonymous(
                REFRESH_PATH,
                &Body {
                    refresh: &tokens.refresh,
                },
            )
            .await?;
        self.token_store()
            .store(&Tokens {
                access: refreshed.access,
                refresh: refreshed.refresh.unwrap_or(tokens.refresh),
            })
            .await
    }

    /// Profile of the signed-in user
    pub async fn me(&self) -> Result<User> {
        self.get("users/me", &[]).await
    }

    /// Update optional profile fields
    pub async fn update_me(&self, request: &UpdateProfileRequest) -> Result<User> {
        self.send_json(Method::PATCH, "users/me", Some(request)).await
    }

    /// Change the account password
    pub async fn change_password(&self, request: &ChangePasswordRequest) -> Result<()> {
        self.send_unit(Method::POST, "users/change-password", Some(request))
            .await
    }

    /// Forget the local session; the server keeps no logout state
    pub async fn logout(&self) -> Result<()> {
        self.token_store().clear().await?;
        info!("Logged out");
        Ok(())
    }
}
