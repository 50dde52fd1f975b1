//! Platform adapters
//!
//! One adapter per social network, all speaking the same `publish`
//! contract: platform-neutral content in, `PublishOutcome` out. Request
//! shapes, auth placement, and failure payloads differ wildly per network;
//! each adapter owns those quirks and nothing else leaks out.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{PlatformError, Result};
use crate::types::{PublishOutcome, SocialPlatform};

pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod reddit;
pub mod threads;
pub mod tiktok;
pub mod x;

// Mock adapter is available for all builds so integration tests can wire
// a full engine without network access
pub mod mock;

/// Content handed to an adapter, already resolved from the Post.
#[derive(Debug, Clone)]
pub struct DraftContent {
    pub text: String,
    pub media_url: Option<String>,
}

impl DraftContent {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media_url: None,
        }
    }

    pub fn with_media(text: impl Into<String>, media_url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media_url: Some(media_url.into()),
        }
    }
}

/// A decrypted access token plus the opaque publish target (page id, URN,
/// subreddit, ...). Absent when the platform posts to the authenticated
/// identity itself.
#[derive(Debug, Clone)]
pub struct PublishCredentials {
    pub access_token: String,
    pub target_id: Option<String>,
}

/// The one capability every platform must provide.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> SocialPlatform;

    /// Publish the draft and return the platform-assigned id and, where the
    /// platform exposes one, the canonical public URL.
    ///
    /// # Errors
    ///
    /// Classified per the engine's taxonomy: `Network` for transport
    /// failures and 5xx, `SessionExpired` for rejected tokens,
    /// `Capability`/`MissingTarget` for posts the platform cannot take,
    /// `Api` for everything else the platform refuses, and
    /// `MalformedResponse` when a 2xx body is missing expected fields.
    async fn publish(
        &self,
        draft: &DraftContent,
        creds: &PublishCredentials,
    ) -> Result<PublishOutcome>;
}

/// Static platform → adapter mapping, built once at startup.
pub struct AdapterRegistry {
    adapters: HashMap<SocialPlatform, Box<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new(adapters: Vec<Box<dyn PlatformAdapter>>) -> Self {
        let mut map: HashMap<SocialPlatform, Box<dyn PlatformAdapter>> = HashMap::new();
        for adapter in adapters {
            map.insert(adapter.platform(), adapter);
        }
        Self { adapters: map }
    }

    /// All seven production adapters over a shared HTTP client.
    pub fn standard(http: &reqwest::Client) -> Self {
        Self::new(vec![
            Box::new(x::XAdapter::new(http.clone())),
            Box::new(linkedin::LinkedInAdapter::new(http.clone())),
            Box::new(facebook::FacebookAdapter::new(http.clone())),
            Box::new(instagram::InstagramAdapter::new(http.clone())),
            Box::new(threads::ThreadsAdapter::new(http.clone())),
            Box::new(reddit::RedditAdapter::new(http.clone())),
            Box::new(tiktok::TikTokAdapter::new()),
        ])
    }

    pub fn get(&self, platform: SocialPlatform) -> Option<&dyn PlatformAdapter> {
        self.adapters.get(&platform).map(|a| a.as_ref())
    }

    pub fn platforms(&self) -> Vec<SocialPlatform> {
        self.adapters.keys().copied().collect()
    }
}

/// Shared HTTP status classification: 5xx is worth retrying later, a
/// rejected token needs a reconnect, anything else is the platform
/// refusing this particular post.
pub(crate) fn classify_http_failure(
    platform: SocialPlatform,
    status: StatusCode,
    detail: String,
) -> PlatformError {
    if status.is_server_error() {
        PlatformError::Network {
            platform,
            detail: format!("{} ({})", detail, status),
        }
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        PlatformError::SessionExpired {
            platform,
            detail: format!("access token rejected: {}", detail),
        }
    } else {
        PlatformError::Api {
            platform,
            detail: format!("{} ({})", detail, status),
        }
    }
}
