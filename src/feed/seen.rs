use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::info;

use super::sampler::sample_distinct;

/// 每个客户端已下发过的 URL 记录
///
/// 一把互斥锁覆盖整个映射，并且在“计算可用集合 -> 抽样 -> 标记已下发”
/// 全过程中持有，保证同一客户端的并发请求在一个周期内不会拿到重复 URL。
/// 锁内只有内存计算。
#[derive(Debug, Default)]
pub struct ClientSeenRegistry {
    clients: Mutex<HashMap<String, HashSet<String>>>,
}

impl ClientSeenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为客户端选出最多 `limit` 个本周期内未下发过的 URL
    ///
    /// `all` 是调用方在缓存读锁下拍下的快照。客户端已看过全部 URL 时，
    /// 先清空其记录再从完整集合中抽样（开始新周期）。
    /// 可用 URL 少于 `limit` 时只返回可用的部分。
    pub fn select(&self, client: &str, all: &[String], limit: usize) -> Vec<String> {
        if all.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut clients = self.clients.lock();
        let seen = clients.entry(client.to_string()).or_default();

        let mut available: Vec<&String> = all.iter().filter(|u| !seen.contains(*u)).collect();
        if available.is_empty() {
            seen.clear();
            available = all.iter().collect();
        }

        info!(
            key = %client,
            limit,
            available = available.len(),
            seen = seen.len(),
            "新的 feed 请求"
        );

        let mut rng = rand::thread_rng();
        let picked = sample_distinct(&mut rng, available.len(), limit);

        let mut out = Vec::with_capacity(picked.len());
        for i in picked {
            let url = available[i].clone();
            seen.insert(url.clone());
            out.push(url);
        }
        out
    }

    /// 客户端本周期已下发的 URL 数
    pub fn seen_count(&self, client: &str) -> usize {
        self.clients.lock().get(client).map_or(0, HashSet::len)
    }

    /// 已登记的客户端数量
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}
