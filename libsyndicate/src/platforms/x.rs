//! X (Twitter) adapter
//!
//! Single bearer-token POST of `{text}` against the v2 tweets endpoint.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PlatformError, Result};
use crate::platforms::{classify_http_failure, DraftContent, PlatformAdapter, PublishCredentials};
use crate::types::{PublishOutcome, SocialPlatform};

const TWEETS_URL: &str = "https://api.x.com/2/tweets";

pub struct XAdapter {
    http: reqwest::Client,
}

impl XAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PlatformAdapter for XAdapter {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::X
    }

    async fn publish(
        &self,
        draft: &DraftContent,
        creds: &PublishCredentials,
    ) -> Result<PublishOutcome> {
        let resp = self
            .http
            .post(TWEETS_URL)
            .bearer_auth(&creds.access_token)
            .json(&serde_json::json!({ "text": draft.text }))
            .send()
            .await
            .map_err(|e| PlatformError::network(SocialPlatform::X, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_http_failure(SocialPlatform::X, status, error_detail(&text)).into());
        }

        let body: Value = resp.json().await.map_err(|e| PlatformError::MalformedResponse {
            platform: SocialPlatform::X,
            detail: e.to_string(),
        })?;

        outcome_from_body(&body)
    }
}

/// X error payloads carry `detail` and `title`; surface both when present.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => {
            let title = json["title"].as_str();
            let detail = json["detail"].as_str();
            match (title, detail) {
                (Some(t), Some(d)) => format!("{}: {}", t, d),
                (_, Some(d)) => d.to_string(),
                (Some(t), _) => t.to_string(),
                _ => body.to_string(),
            }
        }
        Err(_) => body.to_string(),
    }
}

fn outcome_from_body(body: &Value) -> Result<PublishOutcome> {
    let id = body["data"]["id"]
        .as_str()
        .ok_or_else(|| PlatformError::MalformedResponse {
            platform: SocialPlatform::X,
            detail: "tweet created but response had no data.id".to_string(),
        })?;

    Ok(PublishOutcome {
        platform_post_id: id.to_string(),
        post_url: Some(format!("https://x.com/i/web/status/{}", id)),
    })
}
