//! Threads adapter
//!
//! Same container-then-publish handshake as Instagram, but Threads accepts
//! a `TEXT` container, so a draft without media still publishes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PlatformError, Result};
use crate::platforms::{classify_http_failure, DraftContent, PlatformAdapter, PublishCredentials};
use crate::types::{PublishOutcome, SocialPlatform};

const THREADS_BASE: &str = "https://graph.threads.net/v1.0";

pub struct ThreadsAdapter {
    http: reqwest::Client,
}

impl ThreadsAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn threads_post(&self, url: String, form: &[(&str, String)]) -> Result<Value> {
        let resp = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| PlatformError::network(SocialPlatform::Threads, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_http_failure(
                SocialPlatform::Threads,
                status,
                error_detail(&text),
            )
            .into());
        }

        resp.json().await.map_err(|e| {
            PlatformError::MalformedResponse {
                platform: SocialPlatform::Threads,
                detail: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl PlatformAdapter for ThreadsAdapter {
    fn platform(&self) -> SocialPlatform {
        SocialPlatform::Threads
    }

    async fn publish(
        &self,
        draft: &DraftContent,
        creds: &PublishCredentials,
    ) -> Result<PublishOutcome> {
        // Threads posts to the authenticated identity when no explicit
        // user id is stored.
        let uid = creds.target_id.as_deref().unwrap_or("me").to_string();

        let mut form = vec![
            ("text", draft.text.clone()),
            ("media_type", container_media_type(draft).to_string()),
            ("access_token", creds.access_token.clone()),
        ];
        if let Some(media) = &draft.media_url {
            form.push(("image_url", media.clone()));
        }

        let container = self
            .threads_post(format!("{}/{}/threads", THREADS_BASE, uid), &form)
            .await?;
        let container_id = require_id(&container, "thread container")?;

        let published = self
            .threads_post(
                format!("{}/{}/threads_publish", THREADS_BASE, uid),
                &[
                    ("creation_id", container_id),
                    ("access_token", creds.access_token.clone()),
                ],
            )
            .await?;
        let thread_id = require_id(&published, "published thread")?;

        let post_url = self.fetch_permalink(&thread_id, &creds.access_token).await;

        Ok(PublishOutcome {
            platform_post_id: thread_id,
            post_url,
        })
    }
}

impl ThreadsAdapter {
    async fn fetch_permalink(&self, thread_id: &str, access_token: &str) -> Option<String> {
        let resp = self
            .http
            .get(format!("{}/{}", THREADS_BASE, thread_id))
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
                platform: SocialPlatform::Threads,
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

fn container_media_type(draft: &DraftContent) -> &'static str {
    if draft.media_url.is_some() {
        "IMAGE"
    } else {
        "TEXT"
    }
}
