use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use super::{Consensus, VoteError, VoteRecord, VoteStore};

const CREATE_VOTES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS votes (
        created_at TIMESTAMPTZ DEFAULT NOW(),
        updated_at TIMESTAMPTZ DEFAULT NOW(),
        key TEXT NOT NULL,
        namu_is_tuxedo BOOLEAN DEFAULT FALSE,
        vote_count INTEGER DEFAULT 0,

        PRIMARY KEY (key)
    );
"#;

const UPSERT_VOTE: &str = r#"
    INSERT INTO votes (key, namu_is_tuxedo, vote_count) VALUES ($1, $2, 1)
    ON CONFLICT (key) DO UPDATE
    SET namu_is_tuxedo = $2, updated_at = NOW(), vote_count = votes.vote_count + 1
"#;

const TALLY_VOTES: &str = r#"
    SELECT COALESCE(namu_is_tuxedo, FALSE) AS namu_is_tuxedo, COUNT(*) AS cnt
    FROM votes
    GROUP BY COALESCE(namu_is_tuxedo, FALSE)
"#;

const SELECT_VOTE: &str = r#"
    SELECT key,
           COALESCE(namu_is_tuxedo, FALSE) AS namu_is_tuxedo,
           COALESCE(vote_count, 0) AS vote_count,
           COALESCE(created_at, NOW()) AS created_at,
           COALESCE(updated_at, NOW()) AS updated_at
    FROM votes
    WHERE key = $1
"#;

/// 基于 PostgreSQL 的投票存储
#[derive(Clone)]
pub struct PgVoteStore {
    pool: PgPool,
}

impl PgVoteStore {
    /// 建立连接池、做一次健康检查并确保表存在
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, VoteError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .max_lifetime(Some(Duration::from_secs(1800)))
            .idle_timeout(Some(Duration::from_secs(300)))
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;

        let store = Self { pool };
        store.check_health().await?;
        store.ensure_schema().await?;
        info!("postgres 已连接，votes 表就绪");
        Ok(store)
    }

    /// 执行 `SELECT 1` 验证连接可用
    pub async fn check_health(&self) -> Result<(), VoteError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(VoteError::from)
    }

    /// 创建 votes 表（已存在则跳过）
    pub async fn ensure_schema(&self) -> Result<(), VoteError> {
        sqlx::query(CREATE_VOTES_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl VoteStore for PgVoteStore {
    async fn cast(&self, key: &str, namu_is_tuxedo: bool) -> Result<(), VoteError> {
        sqlx::query(UPSERT_VOTE)
            .bind(key)
            .bind(namu_is_tuxedo)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn tally(&self) -> Result<Consensus, VoteError> {
        let rows: Vec<(bool, i64)> = sqlx::query_as(TALLY_VOTES).fetch_all(&self.pool).await?;
        Ok(Consensus::from_groups(rows))
    }

    async fn record(&self, key: &str) -> Result<Option<VoteRecord>, VoteError> {
        let row = sqlx::query_as::<_, VoteRecord>(SELECT_VOTE)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
