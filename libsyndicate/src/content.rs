//! Content generation collaborator
//!
//! The engine never writes copy itself; campaigns ask an external
//! generator for batches of platform-tagged posts. The generator is
//! fallible and possibly slow, and nothing here assumes it returns the
//! requested count.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyndicateError};
use crate::types::SocialPlatform;

/// One request for a batch of campaign content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub analysis_summary: String,
    pub platforms: Vec<SocialPlatform>,
    pub posts_per_platform: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positioning_focus: Option<String>,
}

/// A generated post, tagged with the platform it was written for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPost {
    pub platform: SocialPlatform,
    pub content: String,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Returns zero or more generated posts; count is not guaranteed.
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<GeneratedPost>>;
}

/// Generator speaking JSON over HTTP to a configured endpoint.
pub struct HttpContentGenerator {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpContentGenerator {
    pub fn new(http: reqwest::Client, endpoint: String, timeout_secs: u64) -> Self {
        Self {
            http,
            endpoint,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<GeneratedPost>> {
        let resp = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| SyndicateError::Generator(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SyndicateError::Generator(format!(
                "generator returned {}: {}",
                status, text
            )));
        }

        resp.json()
            .await
            .map_err(|e| SyndicateError::Generator(format!("unparseable generator response: {}", e)))
    }
}

/// Scripted generator for tests, with request capture.
///
/// Available in all builds so integration tests can drive campaign
/// replenishment without a generator service.
pub struct StaticGenerator {
    batches: Mutex<Vec<Vec<GeneratedPost>>>,
    fail: bool,
    pub requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl StaticGenerator {
    /// Yields the given batches in order, then empty batches.
    pub fn with_batches(batches: Vec<Vec<GeneratedPost>>) -> Self {
        Self {
            batches: Mutex::new(batches),
            fail: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always returns an empty batch.
    pub fn empty() -> Self {
        Self::with_batches(vec![])
    }

    /// Always fails.
    pub fn failing() -> Self {
        Self {
            batches: Mutex::new(vec![]),
            fail: true,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentGenerator for StaticGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<GeneratedPost>> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(SyndicateError::Generator(
                "generator unavailable".to_string(),
            ));
        }
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            Ok(vec![])
        } else {
            Ok(batches.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_request_wire_shape() {
        let request = GenerationRequest {
            analysis_summary: "Plumbing company in Austin".to_string(),
            platforms: vec![SocialPlatform::X, SocialPlatform::Facebook],
            posts_per_platform: 2,
            website_url: None,
            positioning_focus: Some("emergency service".to_string()),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["platforms"][0], "x");
        assert_eq!(json["platforms"][1], "facebook");
        assert_eq!(json["posts_per_platform"], 2);
        assert!(json.get("website_url").is_none());
        assert_eq!(json["positioning_focus"], "emergency service");
    }

    #[test]
    fn test_generated_post_parses_from_wire() {
        let posts: Vec<GeneratedPost> = serde_json::from_str(
            r#"[{"platform":"reddit","content":"Ask us anything"},
                {"platform":"x","content":"We fixed 500 leaks this year"}]"#,
        )
        .unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].platform, SocialPlatform::Reddit);
        assert_eq!(posts[1].content, "We fixed 500 leaks this year");
    }

    #[tokio::test]
    async fn test_static_generator_yields_batches_in_order() {
        let generator = StaticGenerator::with_batches(vec![
            vec![GeneratedPost {
                platform: SocialPlatform::X,
                content: "first".to_string(),
            }],
            vec![],
        ]);

        let request = GenerationRequest {
            analysis_summary: "s".to_string(),
            platforms: vec![SocialPlatform::X],
            posts_per_platform: 1,
            website_url: None,
            positioning_focus: None,
        };

        let batch = generator.generate(&request).await.unwrap();
        assert_eq!(batch.len(), 1);
        let batch = generator.generate(&request).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(generator.request_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_generator_errors() {
        let generator = StaticGenerator::failing();
        let request = GenerationRequest {
            analysis_summary: "s".to_string(),
            platforms: vec![SocialPlatform::X],
            posts_per_platform: 1,
            website_url: None,
            positioning_focus: None,
        };
        assert!(generator.generate(&request).await.is_err());
    }
}
