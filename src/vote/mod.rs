/// 投票账本
/// Vote ledger
///
/// 每个客户端一行：首次投票插入，之后覆盖布尔值并累加计数。
pub mod memory;
pub mod postgres;

pub use memory::MemoryVoteStore;
pub use postgres::PgVoteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// 投票存储错误
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("SQLx 错误: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// 一条投票记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct VoteRecord {
    pub key: String,
    pub namu_is_tuxedo: bool,
    pub vote_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 投票汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Consensus {
    pub namu_is_tuxedo: i64,
    pub namu_is_not_tuxedo: i64,
}

impl Consensus {
    /// 按布尔值累加一组 (值, 数量)
    pub fn from_groups<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (bool, i64)>,
    {
        groups
            .into_iter()
            .fold(Consensus::default(), |mut acc, (is_tuxedo, count)| {
                if is_tuxedo {
                    acc.namu_is_tuxedo += count;
                } else {
                    acc.namu_is_not_tuxedo += count;
                }
                acc
            })
    }

    /// 参与投票的不同客户端总数
    pub fn total(&self) -> i64 {
        self.namu_is_tuxedo + self.namu_is_not_tuxedo
    }
}

/// 投票存储抽象
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// 插入或更新一次投票
    async fn cast(&self, key: &str, namu_is_tuxedo: bool) -> Result<(), VoteError>;

    /// 按布尔值汇总
    async fn tally(&self) -> Result<Consensus, VoteError>;

    /// 查询单个客户端的记录
    async fn record(&self, key: &str) -> Result<Option<VoteRecord>, VoteError>;
}
