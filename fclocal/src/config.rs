//! Configuration management

use async_trait::async_trait;
use fclocal_core::{CredentialProvider, Credentials, EnvCredentialProvider, InvokeError};
use fclocal_invoke::debug::DEFAULT_PHP_REMOTE_HOST;
use fclocal_invoke::PullPolicy;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub docker: DockerConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub pull_policy: PullPolicy,

    #[serde(default = "default_pull_timeout_secs")]
    pub pull_timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            pull_policy: PullPolicy::default(),
            pull_timeout_secs: default_pull_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CredentialsConfig {
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DebugConfig {
    #[serde(default = "default_php_remote_host")]
    pub php_remote_host: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            php_remote_host: default_php_remote_host(),
        }
    }
}

fn default_pull_timeout_secs() -> u64 {
    600
}

fn default_php_remote_host() -> String {
    DEFAULT_PHP_REMOTE_HOST.to_string()
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Without an explicit path, `fclocal.toml` in the working directory is
    /// used when present. `FCLOCAL_<SECTION>__<KEY>` variables override it.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("fclocal").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("FCLOCAL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }
}

/// Credentials from the config file, falling back to the process environment
pub struct ConfigCredentialProvider {
    configured: Option<Credentials>,
}

impl ConfigCredentialProvider {
    pub fn new(config: &CredentialsConfig) -> Self {
        let configured = match (&config.access_key_id, &config.access_key_secret) {
            (Some(id), Some(secret)) => Some(Credentials::new(id, secret)),
            _ => None,
        };
        Self { configured }
    }
}

#[async_trait]
impl CredentialProvider for ConfigCredentialProvider {
    async fn credentials(&self) -> Result<Credentials, InvokeError> {
        match &self.configured {
            Some(credentials) => Ok(credentials.clone()),
            None => EnvCredentialProvider.credentials().await,
        }
    }
}
