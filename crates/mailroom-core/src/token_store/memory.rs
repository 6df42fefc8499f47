//! In-memory token store

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::models::Tokens;

use super::TokenStore;

/// Token store that keeps the session for the life of the process
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<Tokens>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing session
    pub fn with_tokens(tokens: Tokens) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<Tokens>> {
        Ok(self.tokens.read().clone())
    }

    async fn store(&self, tokens: &Tokens) -> Result<()> {
        *self.tokens.write() = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.tokens.write() = None;
        Ok(())
    }
}
