//! Pluggable login token storage
//!
//! The API client reads the access token before every request and writes
//! the refreshed token back after a refresh. Storage is behind a trait so the
//! CLI and daemon can share the on-disk session while tests use memory.

mod file;
mod memory;

pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::Tokens;

/// Trait for login token storage backends
///
/// Implementations must be thread-safe (`Send + Sync`) since the API client
/// is shared between the orchestration tasks.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Get the stored token pair
    async fn load(&self) -> Result<Option<Tokens>>;

    /// Replace the stored token pair
    async fn store(&self, tokens: &Tokens) -> Result<()>;

    /// Remove stored tokens (logout)
    async fn clear(&self) -> Result<()>;

    /// Update just the access token (after refresh)
    async fn update_access(&self, access: &str) -> Result<()> {
        let mut tokens = self
            .load()
            .await?
            .ok_or_else(|| Error::TokenStore("No existing tokens to update".to_string()))?;

        tokens.access = access.to_string();
        self.store(&tokens).await
    }

    /// Current access token, if logged in
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.load().await?.map(|t| t.access))
    }
}

/// Create the default token store for a configuration
pub fn create_token_store(config: &Config) -> Arc<dyn TokenStore> {
    Arc::new(FileTokenStore::new(config.token_file()))
}
