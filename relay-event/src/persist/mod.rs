//! 持久化（persist）
//!
//! 定义事件记录存储协议（`EventStore`）与序列化能力（`EventSerializer`），
//! 并提供内存实现用于测试与示例。具体存储后端（如 Postgres）由上层实现并注入。
//!
mod serializer;
mod store;
mod store_inmemory;

pub use serializer::{EventSerializer, JsonSerializer};
#[cfg(feature = "infra-sqlx")]
pub use store::PG_LOCK_NOT_AVAILABLE;
pub use store::{EventStore, StoreError, StoreResult};
pub use store_inmemory::InMemoryEventStore;
