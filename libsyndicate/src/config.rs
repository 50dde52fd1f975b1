//! Configuration management for the publishing engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::types::SocialPlatform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub vault: VaultConfig,
    #[serde(default)]
    pub generator: Option<GeneratorConfig>,
    #[serde(default)]
    pub oauth: OauthConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Key material for the credential vault.
///
/// The passphrase can come from the environment, inline config, or a file;
/// checked in that order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    pub passphrase: Option<String>,
    pub passphrase_file: Option<String>,
}

impl VaultConfig {
    pub fn resolve_passphrase(&self) -> Result<String> {
        if let Ok(pass) = std::env::var("SYNDICATE_VAULT_PASSPHRASE") {
            if !pass.is_empty() {
                return Ok(pass);
            }
        }
        if let Some(pass) = &self.passphrase {
            if !pass.is_empty() {
                return Ok(pass.clone());
            }
        }
        if let Some(file) = &self.passphrase_file {
            let expanded = shellexpand::tilde(file).to_string();
            let contents = std::fs::read_to_string(expanded).map_err(ConfigError::ReadError)?;
            let pass = contents.trim().to_string();
            if !pass.is_empty() {
                return Ok(pass);
            }
        }
        Err(ConfigError::MissingField("vault.passphrase".to_string()).into())
    }
}

/// Endpoint of the external content generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub endpoint: String,
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

fn default_generator_timeout() -> u64 {
    60
}

/// OAuth client credentials used by the refresh flows, one table per
/// platform that supports refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OauthConfig {
    pub x: Option<OAuthClient>,
    pub linkedin: Option<OAuthClient>,
    pub facebook: Option<OAuthClient>,
    pub instagram: Option<OAuthClient>,
    pub threads: Option<OAuthClient>,
    pub reddit: Option<OAuthClient>,
    pub tiktok: Option<OAuthClient>,
}

impl OauthConfig {
    pub fn client(&self, platform: SocialPlatform) -> Option<&OAuthClient> {
        match platform {
            SocialPlatform::X => self.x.as_ref(),
            SocialPlatform::LinkedIn => self.linkedin.as_ref(),
            SocialPlatform::Facebook => self.facebook.as_ref(),
            SocialPlatform::Instagram => self.instagram.as_ref(),
            SocialPlatform::Threads => self.threads.as_ref(),
            SocialPlatform::Reddit => self.reddit.as_ref(),
            SocialPlatform::TikTok => self.tiktok.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Seconds between ticks when running as a daemon.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Maximum due posts handled per tick.
    #[serde(default = "default_batch_size")]
    pub publish_batch_size: usize,
    /// Minutes after which a post stuck in `publishing` is reclaimed.
    #[serde(default = "default_stuck_minutes")]
    pub stuck_publishing_minutes: i64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            publish_batch_size: default_batch_size(),
            stuck_publishing_minutes: default_stuck_minutes(),
        }
    }
}

fn default_poll_interval() -> u64 {
    60
}

fn default_batch_size() -> usize {
    10
}

fn default_stuck_minutes() -> i64 {
    15
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SYNDICATE_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("syndicate").join("config.toml"))
}
