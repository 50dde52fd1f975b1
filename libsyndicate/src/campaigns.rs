//! Campaign scheduling
//!
//! Two jobs: compute publish timestamps for generated batches, and keep
//! active campaigns from running dry. Initial batches follow the user's
//! weekly cadence; refill batches spread one-per-day starting tomorrow,
//! trading cadence fidelity for immediate replenishment.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::content::{ContentGenerator, GeneratedPost, GenerationRequest};
use crate::db::Database;
use crate::error::{Result, SyndicateError};
use crate::types::{Campaign, CampaignStatus, Connection, Post, SocialPlatform};

/// Regeneration triggers when a campaign's open inventory drops below this.
pub const LOW_WATER_MARK: i64 = 2;

/// How many posts each platform gets per generation batch.
pub fn posts_per_platform(posts_per_week: u32, platform_count: usize) -> u32 {
    if platform_count == 0 {
        return 0;
    }
    let count = platform_count as u32;
    posts_per_week.div_ceil(count)
}

/// Timestamps for a freshly activated campaign's batch: with `P` platforms
/// the k-th post lands on `anchor + 7 * floor(k / P)` days, at the
/// campaign's clock time in its own timezone.
pub fn initial_batch_times(
    count: usize,
    platform_count: usize,
    anchor: NaiveDate,
    post_time: NaiveTime,
    tz: Tz,
) -> Result<Vec<DateTime<Utc>>> {
    if platform_count == 0 {
        return Ok(vec![]);
    }
    (0..count)
        .map(|k| {
            let weeks = (k / platform_count) as u64;
            let date = anchor
                .checked_add_days(Days::new(7 * weeks))
                .ok_or_else(|| SyndicateError::InvalidInput("schedule date overflow".into()))?;
            local_to_utc(date, post_time, tz)
        })
        .collect()
}

/// Timestamps for a refill batch: the k-th post lands `k + 1` days after
/// the anchor, ignoring the weekly cadence.
pub fn refill_batch_times(
    count: usize,
    anchor: NaiveDate,
    post_time: NaiveTime,
    tz: Tz,
) -> Result<Vec<DateTime<Utc>>> {
    (0..count)
        .map(|k| {
            let date = anchor
                .checked_add_days(Days::new(k as u64 + 1))
                .ok_or_else(|| SyndicateError::InvalidInput("schedule date overflow".into()))?;
            local_to_utc(date, post_time, tz)
        })
        .collect()
}

fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> Result<DateTime<Utc>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            SyndicateError::InvalidInput(format!("nonexistent local time {} in {}", naive, tz))
        })
}

/// Round-robin the batch by platform so consecutive indices cycle through
/// the participating platforms; the k-th-post math above assumes this
/// ordering.
pub fn interleave_by_platform(
    posts: Vec<GeneratedPost>,
    platform_order: &[SocialPlatform],
) -> Vec<GeneratedPost> {
    let mut buckets: Vec<(SocialPlatform, Vec<GeneratedPost>)> = platform_order
        .iter()
        .map(|p| (*p, Vec::new()))
        .collect();
    let mut leftover = Vec::new();

    for post in posts {
        match buckets.iter_mut().find(|(p, _)| *p == post.platform) {
            Some((_, bucket)) => bucket.push(post),
            None => leftover.push(post),
        }
    }

    let longest = buckets.iter().map(|(_, b)| b.len()).max().unwrap_or(0);
    let mut ordered = Vec::new();
    for i in 0..longest {
        for (_, bucket) in &buckets {
            if let Some(post) = bucket.get(i) {
                ordered.push(post.clone());
            }
        }
    }
    ordered.extend(leftover);
    ordered
}

pub struct CampaignScheduler {
    db: Database,
    generator: Option<Arc<dyn ContentGenerator>>,
}

impl CampaignScheduler {
    pub fn new(db: Database, generator: Option<Arc<dyn ContentGenerator>>) -> Self {
        Self { db, generator }
    }

    /// Generate the initial batch for a draft campaign and flip it to
    /// `active`. Returns the number of posts scheduled; zero means the
    /// generator produced nothing and the campaign stayed in draft.
    pub async fn activate(&self, campaign_id: &str) -> Result<usize> {
        let campaign = self
            .db
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| {
                SyndicateError::InvalidInput(format!("no such campaign: {}", campaign_id))
            })?;

        if campaign.status != CampaignStatus::Draft {
            return Err(SyndicateError::InvalidInput(format!(
                "campaign {} is {}, only draft campaigns can be activated",
                campaign_id,
                campaign.status.as_str()
            )));
        }

        let connections = self.db.campaign_connections(&campaign.id).await?;
        if connections.is_empty() {
            return Err(SyndicateError::InvalidInput(
                "campaign has no participating connections".to_string(),
            ));
        }

        let generated = self.generate_batch(&campaign, &connections).await?;
        if generated.is_empty() {
            debug!(campaign_id, "generator produced no posts, campaign stays in draft");
            return Ok(0);
        }

        let tz = campaign.recurrence.timezone;
        let anchor = Utc::now().with_timezone(&tz).date_naive();
        let times = initial_batch_times(
            generated.len(),
            connections.len(),
            anchor,
            campaign.recurrence.post_time,
            tz,
        )?;

        let created = self
            .persist_batch(&campaign, &connections, &generated, &times)
            .await?;

        self.db
            .set_campaign_status(&campaign.id, CampaignStatus::Active)
            .await?;

        info!(campaign_id, posts = created, "campaign activated");
        Ok(created)
    }

    /// Shortfall detection and refill for one active campaign. Generator
    /// errors propagate so the driver can isolate them per campaign; the
    /// campaign itself is left untouched and retried next tick.
    pub async fn replenish(&self, campaign: &Campaign) -> Result<usize> {
        if campaign.status != CampaignStatus::Active {
            return Ok(0);
        }

        let open = self.db.count_open_campaign_posts(&campaign.id).await?;
        if open >= LOW_WATER_MARK {
            return Ok(0);
        }

        let connections = self.db.campaign_connections(&campaign.id).await?;
        if connections.is_empty() {
            debug!(campaign_id = %campaign.id, "low inventory but no active connections");
            return Ok(0);
        }

        if campaign
            .analysis_summary
            .as_deref()
            .map(str::is_empty)
            .unwrap_or(true)
        {
            debug!(campaign_id = %campaign.id, "low inventory but no analysis to generate from");
            return Ok(0);
        }

        if self.generator.is_none() {
            debug!(campaign_id = %campaign.id, "low inventory but no generator configured");
            return Ok(0);
        }

        debug!(
            campaign_id = %campaign.id,
            open,
            "campaign below low-water mark, generating refill batch"
        );

        let generated = self.generate_batch(campaign, &connections).await?;
        if generated.is_empty() {
            warn!(campaign_id = %campaign.id, "generator returned an empty refill batch");
            return Ok(0);
        }

        let tz = campaign.recurrence.timezone;
        let anchor = Utc::now().with_timezone(&tz).date_naive();
        let times = refill_batch_times(
            generated.len(),
            anchor,
            campaign.recurrence.post_time,
            tz,
        )?;

        let created = self
            .persist_batch(campaign, &connections, &generated, &times)
            .await?;

        info!(campaign_id = %campaign.id, posts = created, "campaign replenished");
        Ok(created)
    }

    async fn generate_batch(
        &self,
        campaign: &Campaign,
        connections: &[Connection],
    ) -> Result<Vec<GeneratedPost>> {
        let generator = self.generator.as_ref().ok_or_else(|| {
            SyndicateError::InvalidInput("no content generator configured".to_string())
        })?;

        let summary = campaign.analysis_summary.clone().ok_or_else(|| {
            SyndicateError::InvalidInput("campaign has no analysis to generate from".to_string())
        })?;

        let platforms: Vec<SocialPlatform> = connections.iter().map(|c| c.platform).collect();
        let request = GenerationRequest {
            analysis_summary: summary,
            posts_per_platform: posts_per_platform(
                campaign.recurrence.posts_per_week,
                platforms.len(),
            ),
            platforms: platforms.clone(),
            website_url: campaign.website_url.clone(),
            positioning_focus: campaign.positioning_focus.clone(),
        };

        let generated = generator.generate(&request).await?;
        Ok(interleave_by_platform(generated, &platforms))
    }

    async fn persist_batch(
        &self,
        campaign: &Campaign,
        connections: &[Connection],
        generated: &[GeneratedPost],
        times: &[DateTime<Utc>],
    ) -> Result<usize> {
        let mut created = 0;
        let mut earliest: Option<i64> = None;

        for (item, at) in generated.iter().zip(times) {
            let Some(connection) = connections.iter().find(|c| c.platform == item.platform) else {
                warn!(
                    campaign_id = %campaign.id,
                    platform = %item.platform,
                    "generator produced content for a platform the campaign does not target"
                );
                continue;
            };

            let ts = at.timestamp();
            let post = Post::scheduled(connection, item.content.clone(), ts)
                .with_campaign(&campaign.id);
            self.db.create_post(&post).await?;

            earliest = Some(earliest.map_or(ts, |e| e.min(ts)));
            created += 1;
        }

        if let Some(next) = earliest {
            self.db.set_campaign_next_post(&campaign.id, Some(next)).await?;
        }

        Ok(created)
    }
}
