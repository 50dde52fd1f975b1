//! LinkedIn adapter
//!
//! Posts a "user generated content" share. The stored target id decides
//! whether the share is authored by the member or by an organization page,
//! distinguished by URN prefix.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PlatformError, Result};
use crate::platforms::{classify_http_failure, DraftContent, PlatformAdapter, PublishCredentials};
use crate::types::{PublishOutcome, SocialPlatform};

const UGC_POSTS_URL: &str = "https://api.linkedin.com/v2/ugcPosts";
const ORG_URN_PREFIX: &str = "urn:li:organization:";
const PERSON_URN_PREFIX: &str = "urn:li:person:";

pub struct LinkedInAdapter {
    http: reqwest::Client,
}

impl LinkedInAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PlatformAdapter for LinkedInAdapter {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::LinkedIn
    }

    async fn publish(
        &self,
        draft: &DraftContent,
        creds: &PublishCredentials,
    ) -> Result<PublishOutcome> {
        let target = creds
            .target_id
            .as_deref()
            .ok_or_else(|| PlatformError::MissingTarget {
                platform: SocialPlatform::LinkedIn,
                detail: "no member or organization URN on the connection".to_string(),
            })?;

        let author = resolve_author_urn(target);

        let body = serde_json::json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": draft.text },
                    "shareMediaCategory": "NONE"
                }
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
            }
        });

        let resp = self
            .http
            .post(UGC_POSTS_URL)
            .bearer_auth(&creds.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::network(SocialPlatform::LinkedIn, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(
                classify_http_failure(SocialPlatform::LinkedIn, status, error_detail(&text)).into(),
            );
        }

        let body: Value = resp.json().await.map_err(|e| PlatformError::MalformedResponse {
            platform: SocialPlatform::LinkedIn,
            detail: e.to_string(),
        })?;

        outcome_from_body(&body)
    }
}

/// A full URN passes through; a bare id is treated as a member id. Page
/// selection stores the organization URN verbatim, so the prefix test is
/// what routes the share.
fn resolve_author_urn(target: &str) -> String {
    if target.starts_with(ORG_URN_PREFIX) || target.starts_with(PERSON_URN_PREFIX) {
        target.to_string()
    } else {
        format!("{}{}", PERSON_URN_PREFIX, target)
    }
}

fn error_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json["message"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}

fn outcome_from_body(body: &Value) -> Result<PublishOutcome> {
    let id = body["id"]
        .as_str()
        .ok_or_else(|| PlatformError::MalformedResponse {
            platform: SocialPlatform::LinkedIn,
            detail: "share accepted but response had no id".to_string(),
        })?;

    Ok(PublishOutcome {
        platform_post_id: id.to_string(),
        post_url: Some(format!("https://www.linkedin.com/feed/update/{}/", id)),
    })
}
