//! Remote learning platform access: transport, payload accessors, fetchers and actions.

pub mod actions;
pub mod client;
pub mod fetchers;
pub mod record;

use crate::error::{Result, SatchelError};

/// Endpoint credentials for one authenticated session.
///
/// Immutable once built; on re-authentication the whole value is replaced.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    base_url: String,
    token: String,
}

impl RemoteConfig {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(SatchelError::Config("remote base URL is empty".into()));
        }
        if token.trim().is_empty() {
            return Err(SatchelError::NotAuthenticated);
        }
        Ok(Self {
            base_url: base_url.to_string(),
            token: token.trim().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

// Keep the token out of logs and panic messages.
impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}
