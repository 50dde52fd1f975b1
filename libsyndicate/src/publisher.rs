//! Publish orchestration
//!
//! Owns every Post status transition. The claim-to-`publishing` update is
//! the concurrency gate: whoever wins it runs the publish, everyone else
//! sees `Skipped`. Failures are persisted, never retried within the same
//! invocation; a later tick or an explicit user retry picks them up.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{PlatformError, Result, SyndicateError};
use crate::platforms::{AdapterRegistry, DraftContent, PublishCredentials};
use crate::tokens::TokenBroker;
use crate::types::{Post, PublishOutcome};

/// How a single publish invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishReport {
    /// The post went out; status is now `published`.
    Published(PublishOutcome),
    /// The post was not claimable (already publishing, published, failed,
    /// or a draft). Nothing was attempted and nothing changed.
    Skipped,
    /// The attempt failed; status is now `failed` with this message.
    Failed { error: String },
}

pub struct Publisher {
    db: Database,
    broker: TokenBroker,
    adapters: Arc<AdapterRegistry>,
}

impl Publisher {
    pub fn new(db: Database, broker: TokenBroker, adapters: Arc<AdapterRegistry>) -> Self {
        Self {
            db,
            broker,
            adapters,
        }
    }

    /// Publish one post by id. Platform-level failures are recorded and
    /// reported, not returned as errors; `Err` means the store itself
    /// misbehaved.
    pub async fn publish(&self, post_id: &str) -> Result<PublishReport> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| SyndicateError::InvalidInput(format!("no such post: {}", post_id)))?;

        if !self.db.claim_for_publishing(post_id).await? {
            debug!(post_id, status = post.status.as_str(), "post not claimable, skipping");
            return Ok(PublishReport::Skipped);
        }

        match self.attempt(&post).await {
            Ok(outcome) => {
                self.db
                    .mark_published(
                        post_id,
                        &outcome.platform_post_id,
                        outcome.post_url.as_deref(),
                    )
                    .await?;
                info!(
                    post_id,
                    platform = %post.platform,
                    platform_post_id = %outcome.platform_post_id,
                    "post published"
                );
                Ok(PublishReport::Published(outcome))
            }
            Err(e) => {
                let error = e.to_string();
                self.db.mark_failed(post_id, &error).await?;
                warn!(post_id, platform = %post.platform, "publish failed: {}", error);
                Ok(PublishReport::Failed { error })
            }
        }
    }

    /// Resolve connection, token, and adapter, then run the platform call.
    async fn attempt(&self, post: &Post) -> Result<PublishOutcome> {
        let connection = match self.db.get_connection(&post.connection_id).await? {
            Some(c) if c.active => c,
            // The original connection was disconnected; fall back to
            // whatever active grant the user now has for this platform.
            Some(c) => self
                .db
                .find_active_connection(&c.user_id, post.platform)
                .await?
                .ok_or(PlatformError::NoActiveConnection {
                    platform: post.platform,
                })?,
            None => {
                return Err(PlatformError::NoActiveConnection {
                    platform: post.platform,
                }
                .into())
            }
        };

        let access_token = self.broker.get_valid_access_token(&connection).await?;

        let adapter = self.adapters.get(post.platform).ok_or_else(|| {
            SyndicateError::InvalidInput(format!("no adapter registered for {}", post.platform))
        })?;

        let draft = DraftContent {
            text: post.content.clone(),
            media_url: post.media_url.clone(),
        };
        let creds = PublishCredentials {
            access_token,
            target_id: Some(connection.platform_account_id.clone()),
        };

        adapter.publish(&draft, &creds).await
    }
}
