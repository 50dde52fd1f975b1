//! TikTok adapter
//!
//! TikTok only accepts video posts, and the engine carries text with an
//! optional image. Every publish attempt is therefore a capability error,
//! raised before any network activity so callers can classify it as
//! permanent rather than retriable.

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::platforms::{DraftContent, PlatformAdapter, PublishCredentials};
use crate::types::{PublishOutcome, SocialPlatform};

pub struct TikTokAdapter;

impl TikTokAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TikTokAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformAdapter for TikTokAdapter {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::TikTok
    }

    async fn publish(
        &self,
        draft: &DraftContent,
        _creds: &PublishCredentials,
    ) -> Result<PublishOutcome> {
        let detail = if draft.media_url.is_some() {
            "TikTok posts require video media; image attachments cannot be published"
        } else {
            "TikTok does not support text-only posts; attach a video"
        };

        Err(PlatformError::Capability {
            platform: SocialPlatform::TikTok,
            detail: detail.to_string(),
        }
        .into())
    }
}
