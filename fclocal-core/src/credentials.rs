//! Access credentials injected into the function container

use crate::error::InvokeError;
use async_trait::async_trait;

/// Environment variables read by [`EnvCredentialProvider`]
pub const ACCESS_KEY_ID_ENV: &str = "ACCESS_KEY_ID";
pub const ACCESS_KEY_SECRET_ENV: &str = "ACCESS_KEY_SECRET";

/// Resolved access key pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }
}

// Keep the secret out of debug logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"***")
            .finish()
    }
}

/// Source of the credentials handed to each invocation
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, InvokeError>;
}

/// Provider returning a fixed key pair
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self(Credentials::new(access_key_id, access_key_secret))
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self) -> Result<Credentials, InvokeError> {
        Ok(self.0.clone())
    }
}

/// Provider reading `ACCESS_KEY_ID` / `ACCESS_KEY_SECRET` from the process environment
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialProvider;

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn credentials(&self) -> Result<Credentials, InvokeError> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| InvokeError::Credentials(format!("{name} is not set")))
        };

        Ok(Credentials::new(
            read(ACCESS_KEY_ID_ENV)?,
            read(ACCESS_KEY_SECRET_ENV)?,
        ))
    }
}
