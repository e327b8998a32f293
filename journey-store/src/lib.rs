pub mod app_config;
pub mod journey_repo;
pub mod locking;
pub mod memory;
pub mod redis_repo;

pub use journey_repo::AggregateStore;
pub use locking::AdvisoryLockCache;
pub use memory::MemoryCache;
pub use redis_repo::RedisCache;
