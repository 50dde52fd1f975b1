//! Database operations for the publishing engine
//!
//! Post status transitions double as the concurrency control: claiming a
//! post for publishing is a guarded update, so the first writer wins and
//! everyone else observes the new status and declines.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{Campaign, CampaignStatus, Connection, Post, Recurrence, SocialPlatform};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if necessary) the database at the given path and run
    /// migrations.
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes keep the SQLite URL portable; mode=rwc creates
        // the file on first run.
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        Self::from_pool(pool).await
    }

    /// In-memory database, used by tests. A single pooled connection keeps
    /// every query on the same `:memory:` database.
    pub async fn in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    pub async fn create_connection(&self, conn: &Connection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO connections
                (id, user_id, platform, platform_account_id, access_token_enc,
                 refresh_token_enc, expires_at, display_name, handle, avatar_url,
                 active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&conn.id)
        .bind(&conn.user_id)
        .bind(conn.platform.as_str())
        .bind(&conn.platform_account_id)
        .bind(&conn.access_token_enc)
        .bind(&conn.refresh_token_enc)
        .bind(conn.expires_at)
        .bind(&conn.display_name)
        .bind(&conn.handle)
        .bind(&conn.avatar_url)
        .bind(conn.active as i32)
        .bind(conn.created_at)
        .bind(conn.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_connection(&self, id: &str) -> Result<Option<Connection>> {
        let row = sqlx::query("SELECT * FROM connections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| row_to_connection(&r)).transpose()
    }

    /// The single active grant for (user, platform), if any.
    pub async fn find_active_connection(
        &self,
        user_id: &str,
        platform: SocialPlatform,
    ) -> Result<Option<Connection>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM connections
            WHERE user_id = ? AND platform = ? AND active = 1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| row_to_connection(&r)).transpose()
    }

    /// Persist rotated tokens. A `None` refresh token keeps the stored one,
    /// since not every platform reissues it on refresh.
    pub async fn update_connection_tokens(
        &self,
        id: &str,
        access_token_enc: &str,
        refresh_token_enc: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE connections
            SET access_token_enc = ?,
                refresh_token_enc = COALESCE(?, refresh_token_enc),
                expires_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(access_token_enc)
        .bind(refresh_token_enc)
        .bind(expires_at)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Disconnect: the grant stays for auditability but stops resolving.
    pub async fn deactivate_connection(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE connections SET active = 0, updated_at = ? WHERE id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts
                (id, connection_id, campaign_id, platform, content, media_url,
                 status, scheduled_at, published_at, platform_post_id, post_url,
                 last_error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.connection_id)
        .bind(&post.campaign_id)
        .bind(post.platform.as_str())
        .bind(&post.content)
        .bind(&post.media_url)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(&post.platform_post_id)
        .bind(&post.post_url)
        .bind(&post.last_error)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, id: &str) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| row_to_post(&r)).transpose()
    }

    /// Guarded transition to `publishing`. Returns false when the post is
    /// no longer claimable (already publishing, published, failed, or a
    /// draft), which makes concurrent double-publish a no-op for the loser.
    pub async fn claim_for_publishing(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'publishing', updated_at = ?
            WHERE id = ? AND status IN ('pending', 'scheduled')
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// User-initiated retry of a failed post: back to `pending` so the next
    /// tick (or an immediate publish call) picks it up.
    pub async fn retry_failed(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'pending', last_error = NULL, updated_at = ?
            WHERE id = ? AND status = 'failed'
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_published(
        &self,
        post_id: &str,
        platform_post_id: &str,
        post_url: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE posts
            SET status = 'published', published_at = ?, platform_post_id = ?,
                post_url = ?, last_error = NULL, updated_at = ?
            WHERE id = ? AND status = 'publishing'
            "#,
        )
        .bind(now)
        .bind(platform_post_id)
        .bind(post_url)
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn mark_failed(&self, post_id: &str, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts
            SET status = 'failed', last_error = ?, updated_at = ?
            WHERE id = ? AND status != 'published'
            "#,
        )
        .bind(error)
        .bind(chrono::Utc::now().timestamp())
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Posts whose scheduled time has arrived, oldest first.
    pub async fn due_posts(&self, now: i64, limit: usize) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM posts
            WHERE status IN ('pending', 'scheduled')
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= ?
            ORDER BY scheduled_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    /// Crash recovery: a post left in `publishing` past the TTL is put back
    /// in the queue. The platform-side outcome is unknown at this point, so
    /// the TTL should comfortably exceed any publish call timeout.
    pub async fn reclaim_stuck_publishing(&self, stuck_before: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'pending', updated_at = ?
            WHERE status = 'publishing' AND updated_at < ?
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(stuck_before)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    /// Count a campaign's not-yet-published inventory.
    pub async fn count_open_campaign_posts(&self, campaign_id: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM posts
            WHERE campaign_id = ? AND status IN ('pending', 'scheduled')
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.get("n"))
    }

    // ------------------------------------------------------------------
    // Campaigns
    // ------------------------------------------------------------------

    pub async fn create_campaign(&self, campaign: &Campaign) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO campaigns
                (id, user_id, name, status, weekdays, post_time, timezone,
                 posts_per_week, analysis_summary, website_url,
                 positioning_focus, next_post_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&campaign.id)
        .bind(&campaign.user_id)
        .bind(&campaign.name)
        .bind(campaign.status.as_str())
        .bind(campaign.recurrence.weekdays_tag())
        .bind(campaign.recurrence.post_time.format("%H:%M").to_string())
        .bind(campaign.recurrence.timezone.name())
        .bind(campaign.recurrence.posts_per_week as i64)
        .bind(&campaign.analysis_summary)
        .bind(&campaign.website_url)
        .bind(&campaign.positioning_focus)
        .bind(campaign.next_post_at)
        .bind(campaign.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn add_campaign_connection(
        &self,
        campaign_id: &str,
        connection_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO campaign_connections (campaign_id, connection_id) VALUES (?, ?)",
        )
        .bind(campaign_id)
        .bind(connection_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let row = sqlx::query("SELECT * FROM campaigns WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| row_to_campaign(&r)).transpose()
    }

    pub async fn active_campaigns(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query("SELECT * FROM campaigns WHERE status = 'active'")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_campaign).collect()
    }

    /// Active connections participating in a campaign.
    pub async fn campaign_connections(&self, campaign_id: &str) -> Result<Vec<Connection>> {
        let rows = sqlx::query(
            r#"
            SELECT c.* FROM connections c
            JOIN campaign_connections cc ON cc.connection_id = c.id
            WHERE cc.campaign_id = ? AND c.active = 1
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_connection).collect()
    }

    pub async fn set_campaign_status(&self, id: &str, status: CampaignStatus) -> Result<()> {
        sqlx::query("UPDATE campaigns SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn set_campaign_next_post(&self, id: &str, next_post_at: Option<i64>) -> Result<()> {
        sqlx::query("UPDATE campaigns SET next_post_at = ? WHERE id = ?")
            .bind(next_post_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

fn row_to_connection(r: &sqlx::sqlite::SqliteRow) -> Result<Connection> {
    let platform: String = r.get("platform");
    Ok(Connection {
        id: r.get("id"),
        user_id: r.get("user_id"),
        platform: platform
            .parse()
            .map_err(|e: String| DbError::CorruptRow(e))?,
        platform_account_id: r.get("platform_account_id"),
        access_token_enc: r.get("access_token_enc"),
        refresh_token_enc: r.get("refresh_token_enc"),
        expires_at: r.get("expires_at"),
        display_name: r.get("display_name"),
        handle: r.get("handle"),
        avatar_url: r.get("avatar_url"),
        active: r.get::<i32, _>("active") != 0,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn row_to_post(r: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    let platform: String = r.get("platform");
    let status: String = r.get("status");
    Ok(Post {
        id: r.get("id"),
        connection_id: r.get("connection_id"),
        campaign_id: r.get("campaign_id"),
        platform: platform
            .parse()
            .map_err(|e: String| DbError::CorruptRow(e))?,
        content: r.get("content"),
        media_url: r.get("media_url"),
        status: status.parse().map_err(|e: String| DbError::CorruptRow(e))?,
        scheduled_at: r.get("scheduled_at"),
        published_at: r.get("published_at"),
        platform_post_id: r.get("platform_post_id"),
        post_url: r.get("post_url"),
        last_error: r.get("last_error"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn row_to_campaign(r: &sqlx::sqlite::SqliteRow) -> Result<Campaign> {
    let status: String = r.get("status");
    let weekdays: String = r.get("weekdays");
    let post_time: String = r.get("post_time");
    let timezone: String = r.get("timezone");

    Ok(Campaign {
        id: r.get("id"),
        user_id: r.get("user_id"),
        name: r.get("name"),
        status: status.parse().map_err(|e: String| DbError::CorruptRow(e))?,
        recurrence: Recurrence {
            weekdays: Recurrence::parse_weekdays(&weekdays).map_err(DbError::CorruptRow)?,
            post_time: chrono::NaiveTime::parse_from_str(&post_time, "%H:%M")
                .map_err(|e| DbError::CorruptRow(format!("post_time: {}", e)))?,
            timezone: timezone
                .parse()
                .map_err(|e: String| DbError::CorruptRow(format!("timezone: {}", e)))?,
            posts_per_week: r.get::<i64, _>("posts_per_week") as u32,
        },
        analysis_summary: r.get("analysis_summary"),
        website_url: r.get("website_url"),
        positioning_focus: r.get("positioning_focus"),
        next_post_at: r.get("next_post_at"),
        created_at: r.get("created_at"),
    })
}
