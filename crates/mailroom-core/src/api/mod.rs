//! REST client for the mail service
//!
//! Every endpoint wraps its payload in an envelope:
//!
//! ```json
//! { "status": "success", "data": { ... }, "message": "..." }
//! { "status": "error", "data": null, "message": "...", "code": "NO_UNCLASSIFIED_MAILS" }
//! ```
//!
//! Older endpoints send `"success": true|false` instead of `status`, and a
//! numeric `error_code`. Both shapes are accepted. Failures are turned into
//! [`Error::Api`] with a typed [`ApiErrorCode`].

mod auth;
mod folders;
mod jobs;
mod mails;
mod rate_limiter;

pub use rate_limiter::RequestRateLimiter;

use std::sync::Arc;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{ApiErrorCode, Error, RawErrorCode, Result};
use crate::models::{RefreshedToken, Tokens};
use crate::token_store::TokenStore;

const REFRESH_PATH: &str = "users/auth/token/refresh";

/// Response envelope shared by all endpoints
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    status: Option<String>,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<RawErrorCode>,
    #[serde(default)]
    error_code: Option<RawErrorCode>,
}

impl<T> Envelope<T> {
    fn is_failure(&self) -> bool {
        self.success == Some(false)
            || matches!(self.status.as_deref(), Some("error") | Some("fail") | Some("failure"))
    }

    fn error_code(&self) -> ApiErrorCode {
        self.error_code
            .clone()
            .or_else(|| self.code.clone())
            .map(ApiErrorCode::from)
            .unwrap_or(ApiErrorCode::Unspecified)
    }
}

/// One outgoing request, kept around so it can be replayed after a token refresh
struct RequestSpec<'a> {
    method: Method,
    path: &'a str,
    query: &'a [(&'static str, String)],
    body: Option<serde_json::Value>,
    authenticated: bool,
}

/// HTTP client for the mail service API
pub struct ApiClient {
    http: Client,
    base_url: Url,
    tokens: Arc<dyn TokenStore>,
    rate_limiter: RequestRateLimiter,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ApiClient {
    /// Create a client from the API configuration
    pub fn new(config: &ApiConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Self::with_http_client(http, &config.base_url, config.rate_limit_per_second, tokens)
    }

    /// Create a client around an existing reqwest client
    pub fn with_http_client(
        http: Client,
        base_url: &str,
        rate_limit_per_second: u32,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            tokens,
            rate_limiter: RequestRateLimiter::new(rate_limit_per_second),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Base URL every path is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Token store backing this client
    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Whether a session is stored locally
    pub async fn has_session(&self) -> Result<bool> {
        Ok(self.tokens.load().await?.is_some())
    }

    // ------------------------------------------------------------------
    // Request plumbing
    // ------------------------------------------------------------------

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T> {
        let spec = RequestSpec {
            method: Method::GET,
            path,
            query,
            body: None,
            authenticated: true,
        };
        let response = self.send(&spec).await?;
        decode_data(response).await
    }

    pub(crate) async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let spec = RequestSpec {
            method,
            path,
            query: &[],
            body: body.map(serde_json::to_value).transpose()?,
            authenticated: true,
        };
        let response = self.send(&spec).await?;
        decode_data(response).await
    }

    /// Send a request whose response carries no data worth decoding
    pub(crate) async fn send_unit<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<()> {
        let spec = RequestSpec {
            method,
            path,
            query: &[],
            body: body.map(serde_json::to_value).transpose()?,
            authenticated: true,
        };
        let response = self.send(&spec).await?;
        decode_unit(response).await
    }

    /// Request without an Authorization header (signup, login, ...)
    pub(crate) async fn send_anonymous<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let spec = RequestSpec {
            method: Method::POST,
            path,
            query: &[],
            body: Some(serde_json::to_value(body)?),
            authenticated: false,
        };
        let response = self.send(&spec).await?;
        decode_data(response).await
    }

    /// Fetch raw bytes (attachments)
    pub(crate) async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let spec = RequestSpec {
            method: Method::GET,
            path,
            query: &[],
            body: None,
            authenticated: true,
        };
        let response = self.send(&spec).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Send a request, refreshing the access token once if the server says it expired.
    /// Returns only successful responses; everything else becomes an `Error`.
    async fn send(&self, spec: &RequestSpec<'_>) -> Result<Response> {
        let access = if spec.authenticated {
            Some(
                self.tokens
                    .access_token()
                    .await?
                    .ok_or(Error::NotAuthenticated)?,
            )
        } else {
            None
        };

        let response = self.send_once(spec, access.as_deref()).await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let error = error_from_response(response).await;
        let stale = match access {
            Some(token) if is_token_expired(&error) => token,
            _ => return Err(error),
        };

        debug!("Access token expired during {} {}, refreshing", spec.method, spec.path);
        self.refresh_after_expiry(&stale).await?;

        let access = self
            .tokens
            .access_token()
            .await?
            .ok_or(Error::NotAuthenticated)?;
        let response = self.send_once(spec, Some(&access)).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn send_once(&self, spec: &RequestSpec<'_>, access: Option<&str>) -> Result<Response> {
        self.rate_limiter.wait().await;

        let url = self.base_url.join(spec.path)?;
        let mut request = self.http.request(spec.method.clone(), url);
        if !spec.query.is_empty() {
            request = request.query(spec.query);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        if let Some(token) = access {
            request = request.bearer_auth(token);
        }

        debug!("{} {}", spec.method, spec.path);
        Ok(request.send().await?)
    }

    /// Refresh the access token unless another request already did.
    ///
    /// Concurrent requests that all saw `stale` expire queue on the refresh
    /// lock; only the first performs the refresh, the rest observe a new token
    /// and return immediately.
    async fn refresh_after_expiry(&self, stale: &str) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let tokens = self.tokens.load().await?.ok_or(Error::NotAuthenticated)?;
        if tokens.access != stale {
            debug!("Access token already refreshed by a concurrent request");
            return Ok(());
        }

        match self.request_refresh(&tokens.refresh).await {
            Ok(refreshed) => {
                let updated = Tokens {
                    access: refreshed.access,
                    refresh: refreshed.refresh.unwrap_or(tokens.refresh),
                };
                self.tokens.store(&updated).await?;
                info!("Refreshed access token");
                Ok(())
            }
            Err(e) => {
                warn!("Token refresh failed, clearing session: {}", e);
                self.tokens.clear().await?;
                Err(Error::TokenRefreshFailed(e.to_string()))
            }
        }
    }

    async fn request_refresh(&self, refresh: &str) -> Result<RefreshedToken> {
        #[derive(Serialize)]
        struct RefreshBody<'a> {
            refresh: &'a str,
        }

        let spec = RequestSpec {
            method: Method::POST,
            path: REFRESH_PATH,
            query: &[],
            body: Some(serde_json::to_value(RefreshBody { refresh })?),
            authenticated: false,
        };
        let response = self.send_once(&spec, None).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        decode_data(response).await
    }
}

/// Ensure the base URL ends in `/` so relative joins keep the version prefix
fn normalize_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn is_token_expired(error: &Error) -> bool {
    matches!(
        error,
        Error::Api {
            status: 401,
            code: ApiErrorCode::TokenExpired,
            ..
        }
    )
}

/// Turn a non-2xx response into a structured error
async fn error_from_response(response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
        Ok(envelope) => Error::Api {
            status: status.as_u16(),
            code: envelope.error_code(),
            message: envelope
                .message
                .unwrap_or_else(|| default_message(status)),
        },
        Err(_) => Error::Api {
            status: status.as_u16(),
            code: ApiErrorCode::Unspecified,
            message: if body.trim().is_empty() {
                default_message(status)
            } else {
                body.chars().take(200).collect()
            },
        },
    }
}

fn default_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

async fn decode_envelope<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>> {
    let status = response.status();
    let body = response.text().await?;
    let envelope: Envelope<T> = serde_json::from_str(&body)?;
    if envelope.is_failure() {
        return Err(Error::Api {
            status: status.as_u16(),
            code: envelope.error_code(),
            message: envelope
                .message
                .unwrap_or_else(|| default_message(status)),
        });
    }
    Ok(envelope)
}

async fn decode_data<T: DeserializeOwned>(response: Response) -> Result<T> {
    decode_envelope::<T>(response)
        .await?
        .data
        .ok_or_else(|| Error::UnexpectedResponse("missing `data` in response".to_string()))
}

async fn decode_unit(response: Response) -> Result<()> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok(());
    }
    let envelope: Envelope<serde_json::Value> = serde_json::from_str(&body)?;
    if envelope.is_failure() {
        return Err(Error::Api {
            status: status.as_u16(),
            code: envelope.error_code(),
            message: envelope
                .message
                .unwrap_or_else(|| default_message(status)),
        });
    }
    Ok(())
}
