//! End-to-end publish flow tests
//!
//! Drives the full engine (store, vault, token broker, adapter registry,
//! orchestrator, tick runner) with mock collaborators standing in for the
//! platform APIs and the content generator.

use std::sync::Arc;

use libsyndicate::campaigns::CampaignScheduler;
use libsyndicate::content::{GeneratedPost, StaticGenerator};
use libsyndicate::db::Database;
use libsyndicate::platforms::mock::MockAdapter;
use libsyndicate::platforms::AdapterRegistry;
use libsyndicate::publisher::{PublishReport, Publisher};
use libsyndicate::tokens::{MockRefresher, RefreshedToken, TokenBroker};
use libsyndicate::types::{
    Campaign, CampaignStatus, Connection, Post, PostStatus, PublishOutcome, Recurrence,
    SocialPlatform,
};
use libsyndicate::vault::{CredentialVault, PassthroughVault};
use libsyndicate::TickRunner;

fn recurrence() -> Recurrence {
    Recurrence {
        weekdays: vec![chrono::Weekday::Mon, chrono::Weekday::Thu],
        post_time: chrono::NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        timezone: chrono_tz::Europe::Berlin,
        posts_per_week: 2,
    }
}

/// The token-expiry race scenario: a connection whose token dies in two
/// minutes, inside the five-minute refresh margin, with a valid refresh
/// token. One refresh call, one adapter call, post ends `published` with
/// a canonical URL.
#[tokio::test]
async fn test_refresh_then_publish_end_to_end() {
    let db = Database::in_memory().await.unwrap();

    let mut conn = Connection::new(
        "user-1".to_string(),
        SocialPlatform::X,
        "acct-1".to_string(),
        "nearly-dead-token".to_string(),
    );
    conn.refresh_token_enc = Some("valid-refresh-token".to_string());
    conn.expires_at = Some(chrono::Utc::now().timestamp() + 120);
    db.create_connection(&conn).await.unwrap();

    let post = Post::new(&conn, "Shipping v2 today".to_string());
    db.create_post(&post).await.unwrap();

    let adapter = MockAdapter::with_outcome(
        SocialPlatform::X,
        PublishOutcome {
            platform_post_id: "1850000000000000000".to_string(),
            post_url: Some("https://x.com/i/web/status/1850000000000000000".to_string()),
        },
    );
    let adapter_calls = adapter.call_count_handle();

    let refresher = Arc::new(MockRefresher::succeeding(RefreshedToken {
        access_token: "brand-new-token".to_string(),
        refresh_token: Some("rotated-refresh-token".to_string()),
        expires_in: Some(7200),
    }));

    let broker = TokenBroker::new(db.clone(), Arc::new(PassthroughVault), refresher.clone());
    let registry = Arc::new(AdapterRegistry::new(vec![Box::new(adapter)]));
    let publisher = Publisher::new(db.clone(), broker, registry);

    let report = publisher.publish(&post.id).await.unwrap();

    // Exactly one refresh, exactly one adapter publish
    assert_eq!(refresher.call_count(), 1);
    assert_eq!(*adapter_calls.lock().unwrap(), 1);

    match report {
        PublishReport::Published(outcome) => {
            assert_eq!(
                outcome.post_url.as_deref(),
                Some("https://x.com/i/web/status/1850000000000000000")
            );
        }
        other => panic!("expected published, got {:?}", other),
    }

    let stored_post = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored_post.status, PostStatus::Published);
    assert!(stored_post.post_url.is_some());

    // The rotation was persisted
    let stored_conn = db.get_connection(&conn.id).await.unwrap().unwrap();
    assert_eq!(stored_conn.access_token_enc, "brand-new-token");
    assert_eq!(
        stored_conn.refresh_token_enc,
        Some("rotated-refresh-token".to_string())
    );
}

/// Tokens are encrypted on the way in and decrypted on the way out; what
/// the adapter receives is the plaintext, what the store holds is not.
#[tokio::test]
async fn test_tokens_stay_encrypted_at_rest() {
    use libsyndicate::vault::AgeVault;

    let db = Database::in_memory().await.unwrap();
    let vault = Arc::new(AgeVault::new("integration-test-passphrase".to_string()).unwrap());

    let plaintext_token = "super-secret-access-token";
    let mut conn = Connection::new(
        "user-1".to_string(),
        SocialPlatform::Reddit,
        "r/testaccount".to_string(),
        vault.encrypt(plaintext_token).unwrap(),
    );
    conn.expires_at = None; // no expiry recorded, token trusted as-is
    db.create_connection(&conn).await.unwrap();

    let stored = db.get_connection(&conn.id).await.unwrap().unwrap();
    assert!(!stored.access_token_enc.contains(plaintext_token));

    let refresher = Arc::new(MockRefresher::failing());
    let broker = TokenBroker::new(db.clone(), vault.clone(), refresher);
    let token = broker.get_valid_access_token(&stored).await.unwrap();
    assert_eq!(token, plaintext_token);
}

/// A campaign that has run dry is replenished by the tick, and the new
/// posts publish on a later tick once their day arrives.
#[tokio::test]
async fn test_campaign_refills_then_publishes() {
    let db = Database::in_memory().await.unwrap();

    let conn = Connection::new(
        "user-1".to_string(),
        SocialPlatform::Threads,
        "threads-user-9".to_string(),
        "token".to_string(),
    );
    db.create_connection(&conn).await.unwrap();

    let mut campaign = Campaign::new(
        "user-1".to_string(),
        "Product updates".to_string(),
        recurrence(),
    );
    campaign.analysis_summary = Some("Indie note-taking app".to_string());
    db.create_campaign(&campaign).await.unwrap();
    db.add_campaign_connection(&campaign.id, &conn.id)
        .await
        .unwrap();
    db.set_campaign_status(&campaign.id, CampaignStatus::Active)
        .await
        .unwrap();

    let generator = Arc::new(StaticGenerator::with_batches(vec![vec![
        GeneratedPost {
            platform: SocialPlatform::Threads,
            content: "New sync engine".to_string(),
        },
        GeneratedPost {
            platform: SocialPlatform::Threads,
            content: "Dark mode is here".to_string(),
        },
    ]]));

    let adapter = MockAdapter::success(SocialPlatform::Threads);
    let adapter_calls = adapter.call_count_handle();
    let registry = Arc::new(AdapterRegistry::new(vec![Box::new(adapter)]));
    let refresher = Arc::new(MockRefresher::failing());
    let broker = TokenBroker::new(db.clone(), Arc::new(PassthroughVault), refresher);
    let publisher = Publisher::new(db.clone(), broker, registry);
    let campaigns = CampaignScheduler::new(db.clone(), Some(generator.clone()));
    let runner = TickRunner::new(db.clone(), publisher, campaigns, 10, 15 * 60);

    // First tick: nothing due yet, campaign gets refilled
    let tally = runner.run_tick().await.unwrap();
    assert_eq!(tally.published, 0);
    assert_eq!(tally.campaigns_replenished, 1);
    assert_eq!(db.count_open_campaign_posts(&campaign.id).await.unwrap(), 2);

    // Refill posts are scheduled tomorrow and later, so still nothing due
    let tally = runner.run_tick().await.unwrap();
    assert_eq!(tally.due, 0);
    assert_eq!(*adapter_calls.lock().unwrap(), 0);
    // Generator only consulted once; inventory is back above the mark
    assert_eq!(generator.request_count(), 1);

    // The campaign's advisory next-post cache points at the refill batch
    let stored = db.get_campaign(&campaign.id).await.unwrap().unwrap();
    let next = stored.next_post_at.unwrap();
    assert!(next > chrono::Utc::now().timestamp());
}

/// Manual retry after a failed publish: the user flips the post back to
/// pending and the next publish succeeds.
#[tokio::test]
async fn test_failed_post_manual_retry_cycle() {
    let db = Database::in_memory().await.unwrap();

    let conn = Connection::new(
        "user-1".to_string(),
        SocialPlatform::Facebook,
        "page-77".to_string(),
        "token".to_string(),
    );
    db.create_connection(&conn).await.unwrap();
    let post = Post::new(&conn, "Open house Saturday".to_string());
    db.create_post(&post).await.unwrap();

    // First attempt: transient network failure
    let failing = MockAdapter::failure(
        SocialPlatform::Facebook,
        libsyndicate::error::PlatformError::Network {
            platform: SocialPlatform::Facebook,
            detail: "connection reset by peer".to_string(),
        },
    );
    let refresher = Arc::new(MockRefresher::failing());
    let broker = TokenBroker::new(db.clone(), Arc::new(PassthroughVault), refresher);
    let publisher = Publisher::new(
        db.clone(),
        broker,
        Arc::new(AdapterRegistry::new(vec![Box::new(failing)])),
    );

    let report = publisher.publish(&post.id).await.unwrap();
    assert!(matches!(report, PublishReport::Failed { .. }));
    let stored = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);

    // Publishing a failed post without a retry is declined
    let report = publisher.publish(&post.id).await.unwrap();
    assert_eq!(report, PublishReport::Skipped);

    // User retries; a healthy adapter now succeeds
    assert!(db.retry_failed(&post.id).await.unwrap());

    let refresher = Arc::new(MockRefresher::failing());
    let broker = TokenBroker::new(db.clone(), Arc::new(PassthroughVault), refresher);
    let publisher = Publisher::new(
        db.clone(),
        broker,
        Arc::new(AdapterRegistry::new(vec![Box::new(MockAdapter::success(
            SocialPlatform::Facebook,
        ))])),
    );

    let report = publisher.publish(&post.id).await.unwrap();
    assert!(matches!(report, PublishReport::Published(_)));
}
