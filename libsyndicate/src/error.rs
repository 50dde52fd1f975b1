//! Error types for the publishing engine

use thiserror::Error;

use crate::types::SocialPlatform;

pub type Result<T> = std::result::Result<T, SyndicateError>;

#[derive(Error, Debug)]
pub enum SyndicateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Content generation failed: {0}")]
    Generator(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SyndicateError {
    /// Whether a later attempt could plausibly succeed without user action.
    ///
    /// Auth, capability, and target errors stay broken until the user
    /// reconnects or reconfigures; only network-level failures are worth
    /// offering a retry for.
    pub fn is_transient(&self) -> bool {
        match self {
            SyndicateError::Platform(e) => e.is_transient(),
            SyndicateError::Generator(_) => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("No vault passphrase configured")]
    PassphraseNotSet,

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: stored token is unreadable")]
    DecryptionFailed,
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("{platform} session expired ({detail}); reconnect the account to keep publishing")]
    SessionExpired {
        platform: SocialPlatform,
        detail: String,
    },

    #[error("No active {platform} connection for this user")]
    NoActiveConnection { platform: SocialPlatform },

    #[error("{platform} cannot publish this post: {detail}")]
    Capability {
        platform: SocialPlatform,
        detail: String,
    },

    #[error("{platform} publish target missing: {detail}")]
    MissingTarget {
        platform: SocialPlatform,
        detail: String,
    },

    #[error("{platform} rejected the post: {detail}")]
    Api {
        platform: SocialPlatform,
        detail: String,
    },

    #[error("{platform} returned a malformed response: {detail}")]
    MalformedResponse {
        platform: SocialPlatform,
        detail: String,
    },

    #[error("Network error reaching {platform}: {detail}")]
    Network {
        platform: SocialPlatform,
        detail: String,
    },
}

impl PlatformError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Network { .. })
    }

    pub fn platform(&self) -> SocialPlatform {
        match self {
            PlatformError::SessionExpired { platform, .. }
            | PlatformError::NoActiveConnection { platform }
            | PlatformError::Capability { platform, .. }
            | PlatformError::MissingTarget { platform, .. }
            | PlatformError::Api { platform, .. }
            | PlatformError::MalformedResponse { platform, .. }
            | PlatformError::Network { platform, .. } => *platform,
        }
    }

    /// Wrap a reqwest transport failure.
    pub fn network(platform: SocialPlatform, err: reqwest::Error) -> Self {
        PlatformError::Network {
            platform,
            detail: err.to_string(),
        }
    }
}
