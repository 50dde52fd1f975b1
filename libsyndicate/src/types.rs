//! Core types for the publishing engine

use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The social networks the engine can publish to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    X,
    LinkedIn,
    Facebook,
    Instagram,
    Threads,
    Reddit,
    TikTok,
}

impl SocialPlatform {
    pub const ALL: [SocialPlatform; 7] = [
        SocialPlatform::X,
        SocialPlatform::LinkedIn,
        SocialPlatform::Facebook,
        SocialPlatform::Instagram,
        SocialPlatform::Threads,
        SocialPlatform::Reddit,
        SocialPlatform::TikTok,
    ];

    /// Lowercase tag used in storage and wire formats.
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialPlatform::X => "x",
            SocialPlatform::LinkedIn => "linkedin",
            SocialPlatform::Facebook => "facebook",
            SocialPlatform::Instagram => "instagram",
            SocialPlatform::Threads => "threads",
            SocialPlatform::Reddit => "reddit",
            SocialPlatform::TikTok => "tiktok",
        }
    }
}

impl FromStr for SocialPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x" | "twitter" => Ok(SocialPlatform::X),
            "linkedin" => Ok(SocialPlatform::LinkedIn),
            "facebook" => Ok(SocialPlatform::Facebook),
            "instagram" => Ok(SocialPlatform::Instagram),
            "threads" => Ok(SocialPlatform::Threads),
            "reddit" => Ok(SocialPlatform::Reddit),
            "tiktok" => Ok(SocialPlatform::TikTok),
            other => Err(format!("Unknown platform: {}", other)),
        }
    }
}

impl std::fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored OAuth grant linking one user to one account on one platform.
///
/// Token fields hold vault ciphertext, never plaintext. Rotation happens
/// through the token broker; user disconnect flips `active` off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub user_id: String,
    pub platform: SocialPlatform,
    /// Platform-assigned account id (page id, person URN, IG user id, ...)
    pub platform_account_id: String,
    pub access_token_enc: String,
    pub refresh_token_enc: Option<String>,
    /// Absolute expiry of the access token (Unix seconds), if the platform
    /// reports one.
    pub expires_at: Option<i64>,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Connection {
    pub fn new(
        user_id: String,
        platform: SocialPlatform,
        platform_account_id: String,
        access_token_enc: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            platform,
            platform_account_id,
            access_token_enc,
            refresh_token_enc: None,
            expires_at: None,
            display_name: None,
            handle: None,
            avatar_url: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Post lifecycle. `Published` is terminal; `Failed` re-enters the pipeline
/// only through an explicit user retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Pending,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Pending => "pending",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "pending" => Ok(PostStatus::Pending),
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("Unknown post status: {}", other)),
        }
    }
}

/// A single piece of content bound to one connection, either composed
/// directly by a user or produced by a campaign batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub connection_id: String,
    pub campaign_id: Option<String>,
    /// Denormalized from the connection so the audit trail survives
    /// reconnects.
    pub platform: SocialPlatform,
    pub content: String,
    pub media_url: Option<String>,
    pub status: PostStatus,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
    pub platform_post_id: Option<String>,
    pub post_url: Option<String>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    /// Create a pending post for immediate publication.
    pub fn new(connection: &Connection, content: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            connection_id: connection.id.clone(),
            campaign_id: None,
            platform: connection.platform,
            content,
            media_url: None,
            status: PostStatus::Pending,
            scheduled_at: None,
            published_at: None,
            platform_post_id: None,
            post_url: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a post scheduled for a future time.
    pub fn scheduled(connection: &Connection, content: String, scheduled_at: i64) -> Self {
        let mut post = Self::new(connection, content);
        post.status = PostStatus::Scheduled;
        post.scheduled_at = Some(scheduled_at);
        post
    }

    pub fn with_campaign(mut self, campaign_id: &str) -> Self {
        self.campaign_id = Some(campaign_id.to_string());
        self
    }

    pub fn with_media(mut self, media_url: String) -> Self {
        self.media_url = Some(media_url);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            other => Err(format!("Unknown campaign status: {}", other)),
        }
    }
}

/// When and how often a campaign wants to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Recurrence {
    pub weekdays: Vec<Weekday>,
    pub post_time: NaiveTime,
    pub timezone: Tz,
    pub posts_per_week: u32,
}

impl Recurrence {
    /// Serialize the weekday set as stored in the database ("mon,wed,fri").
    pub fn weekdays_tag(&self) -> String {
        self.weekdays
            .iter()
            .map(|d| weekday_tag(*d))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn parse_weekdays(tag: &str) -> Result<Vec<Weekday>, String> {
        tag.split(',')
            .filter(|s| !s.is_empty())
            .map(parse_weekday)
            .collect()
    }
}

fn weekday_tag(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

fn parse_weekday(tag: &str) -> Result<Weekday, String> {
    match tag.trim().to_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        other => Err(format!("Unknown weekday: {}", other)),
    }
}

/// A recurring content program feeding one or more connections.
#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub recurrence: Recurrence,
    /// Summary of the prior analysis the generator conditions on.
    pub analysis_summary: Option<String>,
    pub website_url: Option<String>,
    pub positioning_focus: Option<String>,
    /// Advisory cache of the earliest upcoming post time.
    pub next_post_at: Option<i64>,
    pub created_at: i64,
}

impl Campaign {
    pub fn new(user_id: String, name: String, recurrence: Recurrence) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            name,
            status: CampaignStatus::Draft,
            recurrence,
            analysis_summary: None,
            website_url: None,
            positioning_focus: None,
            next_post_at: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// What an adapter hands back after a successful publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub platform_post_id: String,
    /// Public URL of the published post, when the platform exposes one.
    pub post_url: Option<String>,
}

/// Aggregate tally of one driver tick, advisory only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub due: usize,
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
    pub campaigns_examined: usize,
    pub campaigns_replenished: usize,
    pub reclaimed: u64,
}
