//! Instagram adapter
//!
//! Two-phase publish: create a media container, then publish it. Instagram
//! has no text-only post type, so a draft without media fails fast before
//! any network call is attempted.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PlatformError, Result};
use crate::platforms::{classify_http_failure, DraftContent, PlatformAdapter, PublishCredentials};
use crate::types::{PublishOutcome, SocialPlatform};

const GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct InstagramAdapter {
    http: reqwest::Client,
}

impl InstagramAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn graph_post(&self, url: String, form: &[(&str, String)]) -> Result<Value> {
        let resp = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| PlatformError::network(SocialPlatform::Instagram, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_http_failure(
                SocialPlatform::Instagram,
                status,
                error_detail(&text),
            )
            .into());
        }

        resp.json().await.map_err(|e| {
            PlatformError::MalformedResponse {
                platform: SocialPlatform::Instagram,
                detail: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Instagram
    }

    async fn publish(
        &self,
        draft: &DraftContent,
        creds: &PublishCredentials,
    ) -> Result<PublishOutcome> {
        let media_url = draft
            .media_url
            .as_deref()
            .ok_or_else(|| PlatformError::Capability {
                platform: SocialPlatform::Instagram,
                detail: "Instagram has no text-only post type; attach an image".to_string(),
            })?;

        let ig_user = creds
            .target_id
            .as_deref()
            .ok_or_else(|| PlatformError::MissingTarget {
                platform: SocialPlatform::Instagram,
                detail: "no Instagram business account on the connection".to_string(),
            })?;

        // Phase 1: media container
        let container = self
            .graph_post(
                format!("{}/{}/media", GRAPH_BASE, ig_user),
                &[
                    ("image_url", media_url.to_string()),
                    ("caption", draft.text.clone()),
                    ("access_token", creds.access_token.clone()),
                ],
            )
            .await?;

        let container_id = require_id(&container, "media container")?;

        // Phase 2: publish the container
        let published = self
            .graph_post(
                format!("{}/{}/media_publish", GRAPH_BASE, ig_user),
                &[
                    ("creation_id", container_id),
                    ("access_token", creds.access_token.clone()),
                ],
            )
            .await?;

        let media_id = require_id(&published, "published media")?;

        // Permalink lookup is best-effort; the publish already succeeded
        let post_url = self.fetch_permalink(&media_id, &creds.access_token).await;

        Ok(PublishOutcome {
            platform_post_id: media_id,
            post_url,
        })
    }
}

impl InstagramAdapter {
    async fn fetch_permalink(&self, media_id: &str, access_token: &str) -> Option<String> {
        let resp = self
            .http
            .get(format!("{}/{}", GRAPH_BASE, media_id))
            .query(&[("fields", "permalink"), ("access_token", access_token)])
            .send()
            .await
            .ok()?;

        if !resp.status().is_success() {
            return None;
        }

        let body: Value = resp.json().await.ok()?;
        body["permalink"].as_str().map(|s| s.to_string())
    }
}

fn require_id(body: &Value, what: &str) -> Result<String> {
    body["id"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| {
            PlatformError::MalformedResponse {
                platform: SocialPlatform::Instagram,
                detail: format!("{} response had no id", what),
            }
            .into()
        })
}

fn error_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json["error"]["message"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_only_fails_fast_without_network() {
        // No HTTP server exists for this client; reaching the network
        // would surface as a Network error, not a Capability error.
        let adapter = InstagramAdapter::new(reqwest::Client::new());
        let err = adapter
            .publish(
                &DraftContent::text_only("caption with no image"),
                &PublishCredentials {
                    access_token: "token".to_string(),
                    target_id: Some("17841400000000000".to_string()),
                },
            )
            .await
            .unwrap_err();

        let message = format!("{}", err);
        assert!(message.contains("cannot publish"));
        assert!(message.contains("text-only"));
        assert!(!message.contains("Network error"));
    }

    #[tokio::test]
    async fn test_missing_account_fails_before_any_request() {
        let adapter = InstagramAdapter::new(reqwest::Client::new());
        let err = adapter
            .publish(
                &DraftContent::with_media("caption", "https://cdn.example.com/a.jpg"),
                &PublishCredentials {
                    access_token: "token".to_string(),
                    target_id: None,
                },
            )
            .await
            .unwrap_err();

        assert!(format!("{}", err).contains("target missing"));
    }

    #[test]
    fn test_require_id() {
        let ok = serde_json::json!({ "id": "17900000000000000" });
        assert_eq!(require_id(&ok, "media container").unwrap(), "17900000000000000");

        let missing = serde_json::json!({ "status": "IN_PROGRESS" });
        let err = require_id(&missing, "media container").unwrap_err();
        assert!(format!("{}", err).contains("media container"));
    }
}
