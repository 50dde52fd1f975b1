//! Facebook adapter
//!
//! Publishes to a Page feed. The Graph API takes the token as a body
//! parameter rather than an Authorization header.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PlatformError, Result};
use crate::platforms::{classify_http_failure, DraftContent, PlatformAdapter, PublishCredentials};
use crate::types::{PublishOutcome, SocialPlatform};

const GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct FacebookAdapter {
    http: reqwest::Client,
}

impl FacebookAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Facebook
    }

    async fn publish(
        &self,
        draft: &DraftContent,
        creds: &PublishCredentials,
    ) -> Result<PublishOutcome> {
        let page_id = creds
            .target_id
            .as_deref()
            .ok_or_else(|| PlatformError::MissingTarget {
                platform: SocialPlatform::Facebook,
                detail: "no Page selected; reselect a Page on the connection".to_string(),
            })?;

        let mut form = vec![
            ("message", draft.text.clone()),
            ("access_token", creds.access_token.clone()),
        ];
        if let Some(media) = &draft.media_url {
            form.push(("link", media.clone()));
        }

        let resp = self
            .http
            .post(format!("{}/{}/feed", GRAPH_BASE, page_id))
            .form(&form)
            .send()
            .await
            .map_err(|e| PlatformError::network(SocialPlatform::Facebook, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(
                classify_http_failure(SocialPlatform::Facebook, status, error_detail(&text)).into(),
            );
        }

        let body: Value = resp.json().await.map_err(|e| PlatformError::MalformedResponse {
            platform: SocialPlatform::Facebook,
            detail: e.to_string(),
        })?;

        outcome_from_body(&body)
    }
}

/// Graph API errors nest under `error.message`.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json["error"]["message"]
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
            platform: SocialPlatform::Facebook,
            detail: "feed post accepted but response had no id".to_string(),
        })?;

    Ok(PublishOutcome {
        platform_post_id: id.to_string(),
        post_url: Some(format!("https://www.facebook.com/{}", id)),
    })
}
