/// Feed 模块
/// 缓存、按客户端去重记录、抽样以及下发策略
pub mod cache;
pub mod policy;
pub mod sampler;
pub mod seen;

pub use cache::FeedCache;
pub use policy::{DeliveryStrategy, FeedLimits, FeedPage, FeedQuery, FeedService};
pub use seen::ClientSeenRegistry;
