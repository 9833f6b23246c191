use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{Consensus, VoteError, VoteRecord, VoteStore};

/// 内存投票存储，语义与 Postgres 实现一致
#[derive(Debug, Default)]
pub struct MemoryVoteStore {
    rows: Mutex<HashMap<String, VoteRecord>>,
}

impl MemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VoteStore for MemoryVoteStore {
    async fn cast(&self, key: &str, namu_is_tuxedo: bool) -> Result<(), VoteError> {
        let now = Utc::now();
        let mut rows = self.rows.lock();
        rows.entry(key.to_string())
            .and_modify(|row| {
                row.namu_is_tuxedo = namu_is_tuxedo;
                row.vote_count += 1;
                row.updated_at = now;
            })
            .or_insert_with(|| VoteRecord {
                key: key.to_string(),
                namu_is_tuxedo,
                vote_count: 1,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn tally(&self) -> Result<Consensus, VoteError> {
        let rows = self.rows.lock();
        Ok(Consensus::from_groups(
            rows.values().map(|row| (row.namu_is_tuxedo, 1)),
        ))
    }

    async fn record(&self, key: &str) -> Result<Option<VoteRecord>, VoteError> {
        Ok(self.rows.lock().get(key).cloned())
    }
}
