//! Reddit adapter
//!
//! Submits a self-post. Reddit wants a title and a body; the title is the
//! content truncated to the 300-character submission limit.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PlatformError, Result};
use crate::platforms::{classify_http_failure, DraftContent, PlatformAdapter, PublishCredentials};
use crate::types::{PublishOutcome, SocialPlatform};

const SUBMIT_URL: &str = "https://oauth.reddit.com/api/submit";
const USER_AGENT: &str = "syndicate-engine/0.2";
const TITLE_LIMIT: usize = 300;

/// Fallback when the connection has no subreddit selected.
const DEFAULT_SUBREDDIT: &str = "test";

pub struct RedditAdapter {
    http: reqwest::Client,
}

impl RedditAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PlatformAdapter for RedditAdapter {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Reddit
    }

    async fn publish(
        &self,
        draft: &DraftContent,
        creds: &PublishCredentials,
    ) -> Result<PublishOutcome> {
        let subreddit = creds
            .target_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SUBREDDIT);

        let form = [
            ("api_type", "json".to_string()),
            ("kind", "self".to_string()),
            ("sr", subreddit.to_string()),
            ("title", submission_title(&draft.text)),
            ("text", draft.text.clone()),
        ];

        let resp = self
            .http
            .post(SUBMIT_URL)
            .bearer_auth(&creds.access_token)
            .header("User-Agent", USER_AGENT)
            .form(&form)
            .send()
            .await
            .map_err(|e| PlatformError::network(SocialPlatform::Reddit, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_http_failure(SocialPlatform::Reddit, status, text).into());
        }

        let body: Value = resp.json().await.map_err(|e| PlatformError::MalformedResponse {
            platform: SocialPlatform::Reddit,
            detail: e.to_string(),
        })?;

        outcome_from_body(&body)
    }
}

/// Reddit answers 200 even for rejected submissions; the real verdict is
/// the `json.errors` array.
fn outcome_from_body(body: &Value) -> Result<PublishOutcome> {
    if let Some(errors) = body["json"]["errors"].as_array() {
        if !errors.is_empty() {
            let detail = errors
                .iter()
                .map(|e| {
                    e.as_array()
                        .map(|parts| {
                            parts
                                .iter()
                                .filter_map(|p| p.as_str())
                                .collect::<Vec<_>>()
                                .join(": ")
                        })
                        .unwrap_or_else(|| e.to_string())
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PlatformError::Api {
                platform: SocialPlatform::Reddit,
                detail,
            }
            .into());
        }
    }

    let data = &body["json"]["data"];
    let name = data["name"]
        .as_str()
        .ok_or_else(|| PlatformError::MalformedResponse {
            platform: SocialPlatform::Reddit,
            detail: "submission accepted but response had no fullname".to_string(),
        })?;

    Ok(PublishOutcome {
        platform_post_id: name.to_string(),
        post_url: data["url"].as_str().map(|s| s.to_string()),
    })
}

/// Truncate to Reddit's title limit on a char boundary.
fn submission_title(content: &str) -> String {
    content.chars().take(TITLE_LIMIT).collect()
}
