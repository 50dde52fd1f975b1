//! Mock adapter for testing
//!
//! Configurable per-platform behavior with call counting, so orchestration
//! tests can assert exactly how many publish attempts reached the adapter
//! layer and with what content.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::platforms::{DraftContent, PlatformAdapter, PublishCredentials};
use crate::types::{PublishOutcome, SocialPlatform};

/// Behavior configuration for a mock adapter
#[derive(Clone)]
pub struct MockAdapterConfig {
    pub platform: SocialPlatform,
    /// Error to return instead of publishing; None means success
    pub failure: Option<PlatformError>,
    /// Outcome returned on success
    pub outcome: PublishOutcome,
    /// Number of times publish has been called
    pub publish_call_count: Arc<Mutex<usize>>,
    /// Content of every publish attempt, for verification
    pub published: Arc<Mutex<Vec<String>>>,
}

impl MockAdapterConfig {
    fn new(platform: SocialPlatform) -> Self {
        Self {
            platform,
            failure: None,
            outcome: PublishOutcome {
                platform_post_id: format!("{}-post-1", platform),
                post_url: Some(format!("https://{}.example.com/post/1", platform)),
            },
            publish_call_count: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockAdapter {
    config: MockAdapterConfig,
}

impl MockAdapter {
    /// A mock that publishes successfully.
    pub fn success(platform: SocialPlatform) -> Self {
        Self {
            config: MockAdapterConfig::new(platform),
        }
    }

    /// A mock that fails every publish with the given error.
    pub fn failure(platform: SocialPlatform, error: PlatformError) -> Self {
        let mut config = MockAdapterConfig::new(platform);
        config.failure = Some(error);
        Self { config }
    }

    /// A mock that succeeds with a specific outcome.
    pub fn with_outcome(platform: SocialPlatform, outcome: PublishOutcome) -> Self {
        let mut config = MockAdapterConfig::new(platform);
        config.outcome = outcome;
        Self { config }
    }

    /// Handle for asserting call counts after the adapter is boxed.
    pub fn call_count_handle(&self) -> Arc<Mutex<usize>> {
        self.config.publish_call_count.clone()
    }

    /// Handle for asserting published content after the adapter is boxed.
    pub fn published_handle(&self) -> Arc<Mutex<Vec<String>>> {
        self.config.published.clone()
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> SocialPlatform {
        self.config.platform
    }

    async fn publish(
        &self,
        draft: &DraftContent,
        _creds: &PublishCredentials,
    ) -> Result<PublishOutcome> {
        *self.config.publish_call_count.lock().unwrap() += 1;
        self.config
            .published
            .lock()
            .unwrap()
            .push(draft.text.clone());

        match &self.config.failure {
            Some(error) => Err(error.clone().into()),
            None => Ok(self.config.outcome.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_mock_counts_calls() {
        let adapter = MockAdapter::success(SocialPlatform::X);
        let calls = adapter.call_count_handle();
        let published = adapter.published_handle();

        let creds = PublishCredentials {
            access_token: "t".to_string(),
            target_id: None,
        };
        adapter
            .publish(&DraftContent::text_only("one"), &creds)
            .await
            .unwrap();
        adapter
            .publish(&DraftContent::text_only("two"), &creds)
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), 2);
        assert_eq!(*published.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_failure_mock_returns_configured_error() {
        let adapter = MockAdapter::failure(
            SocialPlatform::Reddit,
            PlatformError::Network {
                platform: SocialPlatform::Reddit,
                detail: "timeout".to_string(),
            },
        );

        let err = adapter
            .publish(
                &DraftContent::text_only("post"),
                &PublishCredentials {
                    access_token: "t".to_string(),
                    target_id: None,
                },
            )
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(*adapter.call_count_handle().lock().unwrap(), 1);
    }
}
