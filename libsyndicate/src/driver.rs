//! Scheduler tick
//!
//! The single periodic entry point: fire due posts, then keep active
//! campaigns stocked. Each post and each campaign is processed in
//! isolation; one failure never blocks the rest of the batch. Only a
//! failure of the store-level queries aborts a tick, and the next cadence
//! retries it.

use tracing::{error, info};

use crate::campaigns::CampaignScheduler;
use crate::db::Database;
use crate::error::Result;
use crate::publisher::{PublishReport, Publisher};
use crate::types::TickSummary;

pub struct TickRunner {
    db: Database,
    publisher: Publisher,
    campaigns: CampaignScheduler,
    publish_batch_size: usize,
    stuck_publishing_secs: i64,
}

impl TickRunner {
    pub fn new(
        db: Database,
        publisher: Publisher,
        campaigns: CampaignScheduler,
        publish_batch_size: usize,
        stuck_publishing_secs: i64,
    ) -> Self {
        Self {
            db,
            publisher,
            campaigns,
            publish_batch_size,
            stuck_publishing_secs,
        }
    }

    /// Run one tick: reclaim stuck posts, publish what is due, replenish
    /// active campaigns. Returns the advisory tally.
    pub async fn run_tick(&self) -> Result<TickSummary> {
        let mut tally = TickSummary::default();
        let now = chrono::Utc::now().timestamp();

        // Posts abandoned mid-publish by a killed process re-enter the
        // queue after the TTL; their platform-side outcome is unknown.
        tally.reclaimed = self
            .db
            .reclaim_stuck_publishing(now - self.stuck_publishing_secs)
            .await?;

        let due = self.db.due_posts(now, self.publish_batch_size).await?;
        tally.due = due.len();

        for post in &due {
            match self.publisher.publish(&post.id).await {
                Ok(PublishReport::Published(_)) => tally.published += 1,
                Ok(PublishReport::Skipped) => tally.skipped += 1,
                Ok(PublishReport::Failed { .. }) => tally.failed += 1,
                Err(e) => {
                    tally.failed += 1;
                    error!(post_id = %post.id, "publish aborted: {}", e);
                }
            }
        }

        let campaigns = self.db.active_campaigns().await?;
        tally.campaigns_examined = campaigns.len();

        for campaign in &campaigns {
            match self.campaigns.replenish(campaign).await {
                Ok(created) if created > 0 => tally.campaigns_replenished += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(campaign_id = %campaign.id, "replenishment failed: {}", e);
                }
            }
        }

        info!(
            due = tally.due,
            published = tally.published,
            failed = tally.failed,
            replenished = tally.campaigns_replenished,
            reclaimed = tally.reclaimed,
            "tick complete"
        );

        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::campaigns::CampaignScheduler;
    use crate::content::{GeneratedPost, StaticGenerator};
    use crate::error::PlatformError;
    use crate::platforms::mock::MockAdapter;
    use crate::platforms::AdapterRegistry;
    use crate::tokens::{MockRefresher, RefreshedToken, TokenBroker};
    use crate::types::{
        Campaign, CampaignStatus, Connection, Post, PostStatus, Recurrence, SocialPlatform,
    };
    use crate::vault::PassthroughVault;

    fn recurrence() -> Recurrence {
        Recurrence {
            weekdays: vec![chrono::Weekday::Mon],
            post_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            timezone: chrono_tz::UTC,
            posts_per_week: 2,
        }
    }

    async fn runner_with(
        db: &Database,
        adapters: Vec<Box<dyn crate::platforms::PlatformAdapter>>,
        generator: Option<Arc<StaticGenerator>>,
    ) -> TickRunner {
        let registry = Arc::new(AdapterRegistry::new(adapters));
        let refresher = Arc::new(MockRefresher::succeeding(RefreshedToken {
            access_token: "fresh".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
        }));
        let broker = TokenBroker::new(db.clone(), Arc::new(PassthroughVault), refresher);
        let publisher = Publisher::new(db.clone(), broker, registry);
        let campaigns = CampaignScheduler::new(
            db.clone(),
            generator.map(|g| g as Arc<dyn crate::content::ContentGenerator>),
        );
        TickRunner::new(db.clone(), publisher, campaigns, 10, 15 * 60)
    }

    async fn seed_due_post(db: &Database, conn: &Connection, content: &str) -> Post {
        let post = Post::scheduled(conn, content.to_string(), chrono::Utc::now().timestamp() - 60);
        db.create_post(&post).await.unwrap();
        post
    }

    #[tokio::test]
    async fn test_tick_publishes_due_posts() {
        let db = Database::in_memory().await.unwrap();
        let conn = Connection::new(
            "user-1".to_string(),
            SocialPlatform::X,
            "acct".to_string(),
            "token".to_string(),
        );
        db.create_connection(&conn).await.unwrap();

        seed_due_post(&db, &conn, "one").await;
        seed_due_post(&db, &conn, "two").await;

        let runner = runner_with(
            &db,
            vec![Box::new(MockAdapter::success(SocialPlatform::X))],
            None,
        )
        .await;

        let tally = runner.run_tick().await.unwrap();
        assert_eq!(tally.due, 2);
        assert_eq!(tally.published, 2);
        assert_eq!(tally.failed, 0);
    }

    #[tokio::test]
    async fn test_failure_isolation_across_batch() {
        // Three due posts across two platforms; the middle platform's
        // adapter always fails. The other two must still publish.
        let db = Database::in_memory().await.unwrap();
        let good = Connection::new(
            "user-1".to_string(),
            SocialPlatform::X,
            "acct-x".to_string(),
            "token".to_string(),
        );
        let bad = Connection::new(
            "user-1".to_string(),
            SocialPlatform::Facebook,
            "acct-fb".to_string(),
            "token".to_string(),
        );
        db.create_connection(&good).await.unwrap();
        db.create_connection(&bad).await.unwrap();

        let p1 = seed_due_post(&db, &good, "first").await;
        let p2 = seed_due_post(&db, &bad, "second").await;
        let p3 = seed_due_post(&db, &good, "third").await;

        let runner = runner_with(
            &db,
            vec![
                Box::new(MockAdapter::success(SocialPlatform::X)),
                Box::new(MockAdapter::failure(
                    SocialPlatform::Facebook,
                    PlatformError::Network {
                        platform: SocialPlatform::Facebook,
                        detail: "connection reset".to_string(),
                    },
                )),
            ],
            None,
        )
        .await;

        let tally = runner.run_tick().await.unwrap();
        assert_eq!(tally.published, 2);
        assert_eq!(tally.failed, 1);

        let s1 = db.get_post(&p1.id).await.unwrap().unwrap();
        let s2 = db.get_post(&p2.id).await.unwrap().unwrap();
        let s3 = db.get_post(&p3.id).await.unwrap().unwrap();
        assert_eq!(s1.status, PostStatus::Published);
        assert_eq!(s2.status, PostStatus::Failed);
        assert_eq!(s3.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_tick_replenishes_low_campaigns_in_isolation() {
        let db = Database::in_memory().await.unwrap();
        let conn = Connection::new(
            "user-1".to_string(),
            SocialPlatform::X,
            "acct".to_string(),
            "token".to_string(),
        );
        db.create_connection(&conn).await.unwrap();

        // Low campaign triggers generation; stocked campaign does not
        let mut low = Campaign::new("user-1".to_string(), "low".to_string(), recurrence());
        low.analysis_summary = Some("summary".to_string());
        db.create_campaign(&low).await.unwrap();
        db.add_campaign_connection(&low.id, &conn.id).await.unwrap();
        db.set_campaign_status(&low.id, CampaignStatus::Active)
            .await
            .unwrap();

        let mut stocked = Campaign::new("user-1".to_string(), "stocked".to_string(), recurrence());
        stocked.analysis_summary = Some("summary".to_string());
        db.create_campaign(&stocked).await.unwrap();
        db.add_campaign_connection(&stocked.id, &conn.id).await.unwrap();
        db.set_campaign_status(&stocked.id, CampaignStatus::Active)
            .await
            .unwrap();
        for i in 0..3 {
            let post = Post::scheduled(&conn, format!("stocked {}", i), 2_000_000_000)
                .with_campaign(&stocked.id);
            db.create_post(&post).await.unwrap();
        }

        let generator = Arc::new(StaticGenerator::with_batches(vec![vec![GeneratedPost {
            platform: SocialPlatform::X,
            content: "fresh".to_string(),
        }]]));

        let runner = runner_with(
            &db,
            vec![Box::new(MockAdapter::success(SocialPlatform::X))],
            Some(generator.clone()),
        )
        .await;

        let tally = runner.run_tick().await.unwrap();
        assert_eq!(tally.campaigns_examined, 2);
        assert_eq!(tally.campaigns_replenished, 1);
        assert_eq!(generator.request_count(), 1);
        assert_eq!(db.count_open_campaign_posts(&low.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tick_survives_generator_failure() {
        let db = Database::in_memory().await.unwrap();
        let conn = Connection::new(
            "user-1".to_string(),
            SocialPlatform::X,
            "acct".to_string(),
            "token".to_string(),
        );
        db.create_connection(&conn).await.unwrap();

        let mut campaign = Campaign::new("user-1".to_string(), "c".to_string(), recurrence());
        campaign.analysis_summary = Some("summary".to_string());
        db.create_campaign(&campaign).await.unwrap();
        db.add_campaign_connection(&campaign.id, &conn.id).await.unwrap();
        db.set_campaign_status(&campaign.id, CampaignStatus::Active)
            .await
            .unwrap();

        let failing = Arc::new(StaticGenerator::failing());
        let runner = runner_with(
            &db,
            vec![Box::new(MockAdapter::success(SocialPlatform::X))],
            Some(failing),
        )
        .await;

        // The tick completes despite the generator error
        let tally = runner.run_tick().await.unwrap();
        assert_eq!(tally.campaigns_examined, 1);
        assert_eq!(tally.campaigns_replenished, 0);
    }

    #[tokio::test]
    async fn test_tick_reclaims_stuck_publishing_posts() {
        let db = Database::in_memory().await.unwrap();
        let conn = Connection::new(
            "user-1".to_string(),
            SocialPlatform::X,
            "acct".to_string(),
            "token".to_string(),
        );
        db.create_connection(&conn).await.unwrap();

        let post = seed_due_post(&db, &conn, "stuck").await;
        db.claim_for_publishing(&post.id).await.unwrap();

        // Zero TTL: anything in `publishing` is immediately reclaimable,
        // so the same tick republishes it.
        let registry = Arc::new(AdapterRegistry::new(vec![Box::new(MockAdapter::success(
            SocialPlatform::X,
        ))]));
        let refresher = Arc::new(MockRefresher::succeeding(RefreshedToken {
            access_token: "fresh".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
        }));
        let broker = TokenBroker::new(db.clone(), Arc::new(PassthroughVault), refresher);
        let publisher = Publisher::new(db.clone(), broker, registry);
        let campaigns = CampaignScheduler::new(db.clone(), None);
        let runner = TickRunner::new(db.clone(), publisher, campaigns, 10, -1);

        let tally = runner.run_tick().await.unwrap();
        assert_eq!(tally.reclaimed, 1);
        assert_eq!(tally.published, 1);

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_tick_respects_batch_size() {
        let db = Database::in_memory().await.unwrap();
        let conn = Connection::new(
            "user-1".to_string(),
            SocialPlatform::X,
            "acct".to_string(),
            "token".to_string(),
        );
        db.create_connection(&conn).await.unwrap();

        for i in 0..5 {
            seed_due_post(&db, &conn, &format!("post {}", i)).await;
        }

        let registry = Arc::new(AdapterRegistry::new(vec![Box::new(MockAdapter::success(
            SocialPlatform::X,
        ))]));
        let refresher = Arc::new(MockRefresher::succeeding(RefreshedToken {
            access_token: "fresh".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
        }));
        let broker = TokenBroker::new(db.clone(), Arc::new(PassthroughVault), refresher);
        let publisher = Publisher::new(db.clone(), broker, registry);
        let campaigns = CampaignScheduler::new(db.clone(), None);
        let runner = TickRunner::new(db.clone(), publisher, campaigns, 3, 15 * 60);

        let tally = runner.run_tick().await.unwrap();
        assert_eq!(tally.due, 3);
        assert_eq!(tally.published, 3);

        // Remaining posts wait for the next tick
        let remaining = db
            .due_posts(chrono::Utc::now().timestamp(), 10)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
