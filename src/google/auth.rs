//! Credential collaborator.
//!
//! Token acquisition itself lives behind [`AuthProvider`]. [`AuthHandle`]
//! makes sure the provider runs once at a time even when many calls ask
//! for credentials concurrently, and again only when the held credentials
//! have expired.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

use crate::types::{Error, Result};

/// Bearer credentials for Google APIs.
#[derive(Clone)]
pub struct Credentials {
    access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Supplies credentials (OAuth, service account, ...).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self) -> Result<Credentials>;
}

/// Provider returning a pre-issued access token.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticTokenProvider(<redacted>)")
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn authenticate(&self) -> Result<Credentials> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err(Error::auth("access token is empty"));
        }
        Ok(Credentials::new(token))
    }
}

/// Lazily authenticated, shareable credential slot.
///
/// Concurrent callers that find the slot empty or expired share one
/// in-flight `authenticate()`. A failed attempt leaves the slot untouched so
/// the next caller tries again.
#[derive(Clone)]
pub struct AuthHandle {
    provider: Arc<dyn AuthProvider>,
    slot: Arc<RwLock<Option<Arc<Credentials>>>>,
    refresh: Arc<Mutex<()>>,
}

impl fmt::Debug for AuthHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHandle")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl AuthHandle {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider,
            slot: Arc::new(RwLock::new(None)),
            refresh: Arc::new(Mutex::new(())),
        }
    }

    pub async fn credentials(&self) -> Result<Arc<Credentials>> {
        if let Some(creds) = self.fresh() {
            return Ok(creds);
        }

        let _refresh = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(creds) = self.fresh() {
            return Ok(creds);
        }

        let previous = self.current();
        match self.provider.authenticate().await {
            Ok(creds) => {
                let creds = Arc::new(creds);
                match previous {
                    Some(old) => tracing::info!(
                        expired_at = ?old.expires_at,
                        expires_at = ?creds.expires_at,
                        "auth_refreshed"
                    ),
                    None => tracing::info!(expires_at = ?creds.expires_at, "auth_initialized"),
                }
                *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&creds));
                Ok(creds)
            }
            Err(e) => {
                tracing::error!(refresh = previous.is_some(), "auth_initialization_failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<Arc<Credentials>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fresh(&self) -> Option<Arc<Credentials>> {
        self.current().filter(|creds| !creds.is_expired(Utc::now()))
    }
}
