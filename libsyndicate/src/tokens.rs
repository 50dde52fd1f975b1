//! Token lifecycle management
//!
//! Decides when a stored access token is still usable, runs the
//! platform-specific refresh flow when it is not, and persists rotated
//! tokens. Refresh failures are never retried here: a second attempt
//! against a dead refresh token wastes a request, and platform lockout
//! policies are unknown.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::OauthConfig;
use crate::db::Database;
use crate::error::{PlatformError, Result, SyndicateError};
use crate::types::{Connection, SocialPlatform};
use crate::vault::CredentialVault;

/// Refresh this far before actual expiry. Trades a little extra refresh
/// volume for never handing an adapter a token that dies mid-flight.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// What a platform's token endpoint hands back. Not every platform
/// reissues the refresh token or reports a lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Platform-specific OAuth refresh flow.
#[async_trait]
pub trait OAuthRefresher: Send + Sync {
    async fn refresh(
        &self,
        platform: SocialPlatform,
        refresh_token: &str,
    ) -> Result<RefreshedToken>;
}

/// Supplies valid access tokens for connections, refreshing and
/// persisting as needed.
pub struct TokenBroker {
    db: Database,
    vault: Arc<dyn CredentialVault>,
    refresher: Arc<dyn OAuthRefresher>,
}

impl TokenBroker {
    pub fn new(
        db: Database,
        vault: Arc<dyn CredentialVault>,
        refresher: Arc<dyn OAuthRefresher>,
    ) -> Self {
        Self {
            db,
            vault,
            refresher,
        }
    }

    /// Return a plaintext access token guaranteed to outlive the margin,
    /// refreshing (and persisting the rotation) when necessary.
    ///
    /// # Errors
    ///
    /// `PlatformError::SessionExpired` when no refresh path exists or the
    /// refresh call fails; the user must reconnect the account.
    pub async fn get_valid_access_token(&self, conn: &Connection) -> Result<String> {
        let now = chrono::Utc::now().timestamp();

        if !needs_refresh(conn.expires_at, now) {
            return self.vault.decrypt(&conn.access_token_enc);
        }

        let refresh_enc =
            conn.refresh_token_enc
                .as_deref()
                .ok_or_else(|| PlatformError::SessionExpired {
                    platform: conn.platform,
                    detail: "access token expired and no refresh token is stored".to_string(),
                })?;
        let refresh_token = self.vault.decrypt(refresh_enc)?;

        debug!(
            platform = %conn.platform,
            connection_id = %conn.id,
            "access token inside refresh margin, refreshing"
        );

        let refreshed = match self.refresher.refresh(conn.platform, &refresh_token).await {
            Ok(t) => t,
            Err(e) => {
                warn!(platform = %conn.platform, connection_id = %conn.id,
                      "token refresh failed: {}", e);
                return Err(PlatformError::SessionExpired {
                    platform: conn.platform,
                    detail: format!("token refresh failed: {}", e),
                }
                .into());
            }
        };

        let access_enc = self.vault.encrypt(&refreshed.access_token)?;
        let refresh_enc = match &refreshed.refresh_token {
            Some(token) => Some(self.vault.encrypt(token)?),
            None => None,
        };
        let expires_at = refreshed.expires_in.map(|secs| now + secs);

        self.db
            .update_connection_tokens(&conn.id, &access_enc, refresh_enc.as_deref(), expires_at)
            .await?;

        info!(
            platform = %conn.platform,
            connection_id = %conn.id,
            rotated_refresh = refreshed.refresh_token.is_some(),
            "access token refreshed"
        );

        Ok(refreshed.access_token)
    }
}

/// A token with no recorded expiry is trusted until the platform says
/// otherwise; one with an expiry is refreshed once it enters the margin.
fn needs_refresh(expires_at: Option<i64>, now: i64) -> bool {
    match expires_at {
        Some(expiry) => expiry < now + REFRESH_MARGIN_SECS,
        None => false,
    }
}

/// Production refresher: per-platform token endpoints and request shapes.
pub struct HttpRefresher {
    http: reqwest::Client,
    oauth: OauthConfig,
}

impl HttpRefresher {
    pub fn new(http: reqwest::Client, oauth: OauthConfig) -> Self {
        Self { http, oauth }
    }

    fn client_for(&self, platform: SocialPlatform) -> Result<&crate::config::OAuthClient> {
        self.oauth.client(platform).ok_or_else(|| {
            SyndicateError::Config(crate::error::ConfigError::MissingField(format!(
                "oauth.{}",
                platform
            )))
        })
    }

    async fn read_token_response(
        &self,
        platform: SocialPlatform,
        resp: reqwest::Response,
    ) -> Result<RefreshedToken> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PlatformError::Api {
                platform,
                detail: format!("token endpoint returned {}: {}", status, text),
            }
            .into());
        }

        resp.json().await.map_err(|e| {
            PlatformError::MalformedResponse {
                platform,
                detail: format!("token endpoint: {}", e),
            }
            .into()
        })
    }
}

#[async_trait]
impl OAuthRefresher for HttpRefresher {
    async fn refresh(
        &self,
        platform: SocialPlatform,
        refresh_token: &str,
    ) -> Result<RefreshedToken> {
        let net = |e: reqwest::Error| PlatformError::network(platform, e);

        let resp = match platform {
            SocialPlatform::X => {
                let client = self.client_for(platform)?;
                self.http
                    .post("https://api.x.com/2/oauth2/token")
                    .basic_auth(&client.client_id, Some(&client.client_secret))
                    .form(&[
                        ("refresh_token", refresh_token),
                        ("grant_type", "refresh_token"),
                    ])
                    .send()
                    .await
                    .map_err(net)?
            }
            SocialPlatform::LinkedIn => {
                let client = self.client_for(platform)?;
                self.http
                    .post("https://www.linkedin.com/oauth/v2/accessToken")
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", refresh_token),
                        ("client_id", client.client_id.as_str()),
                        ("client_secret", client.client_secret.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(net)?
            }
            SocialPlatform::Facebook => {
                // Long-lived token exchange; Facebook reuses the stored
                // token as the exchange credential.
                let client = self.client_for(platform)?;
                self.http
                    .get("https://graph.facebook.com/v19.0/oauth/access_token")
                    .query(&[
                        ("grant_type", "fb_exchange_token"),
                        ("client_id", client.client_id.as_str()),
                        ("client_secret", client.client_secret.as_str()),
                        ("fb_exchange_token", refresh_token),
                    ])
                    .send()
                    .await
                    .map_err(net)?
            }
            SocialPlatform::Instagram => self
                .http
                .get("https://graph.instagram.com/refresh_access_token")
                .query(&[
                    ("grant_type", "ig_refresh_token"),
                    ("access_token", refresh_token),
                ])
                .send()
                .await
                .map_err(net)?,
            SocialPlatform::Threads => self
                .http
                .get("https://graph.threads.net/refresh_access_token")
                .query(&[
                    ("grant_type", "th_refresh_token"),
                    ("access_token", refresh_token),
                ])
                .send()
                .await
                .map_err(net)?,
            SocialPlatform::Reddit => {
                let client = self.client_for(platform)?;
                self.http
                    .post("https://www.reddit.com/api/v1/access_token")
                    .basic_auth(&client.client_id, Some(&client.client_secret))
                    .header("User-Agent", "syndicate-engine/0.2")
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", refresh_token),
                    ])
                    .send()
                    .await
                    .map_err(net)?
            }
            SocialPlatform::TikTok => {
                let client = self.client_for(platform)?;
                self.http
                    .post("https://open.tiktokapis.com/v2/oauth/token/")
                    .form(&[
                        ("client_key", client.client_id.as_str()),
                        ("client_secret", client.client_secret.as_str()),
                        ("grant_type", "refresh_token"),
                        ("refresh_token", refresh_token),
                    ])
                    .send()
                    .await
                    .map_err(net)?
            }
        };

        self.read_token_response(platform, resp).await
    }
}

/// Scripted refresher for tests, with a call log.
///
/// Available in all builds so integration tests can drive the broker
/// without touching real token endpoints.
pub struct MockRefresher {
    response: Option<RefreshedToken>,
    pub calls: Arc<Mutex<Vec<SocialPlatform>>>,
}

impl MockRefresher {
    pub fn succeeding(response: RefreshedToken) -> Self {
        Self {
            response: Some(response),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl OAuthRefresher for MockRefresher {
    async fn refresh(
        &self,
        platform: SocialPlatform,
        _refresh_token: &str,
    ) -> Result<RefreshedToken> {
        self.calls.lock().unwrap().push(platform);
        match &self.response {
            Some(token) => Ok(token.clone()),
            None => Err(PlatformError::Api {
                platform,
                detail: "token endpoint returned 400: invalid_grant".to_string(),
            }
            .into()),
        }
    }
}
