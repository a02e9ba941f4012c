//! 事件记录存储协议
//!
//! 存储引擎被视为提供行级锁与版本比较更新的 CRUD 存储。错误以显式的、
//! 与具体数据库无关的错误码（`StoreError`）返回，调用方据此区分锁竞争、
//! 版本冲突与一般故障，而不是匹配厂商特定的错误文本。
//!
use crate::record::{EventRecord, EventRecordPatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// 存储协议错误码
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// 行锁已被其他调度者持有
    #[error("lock not obtainable")]
    LockContention,
    /// 乐观更新版本不匹配
    #[error("version conflict: expected={expected}")]
    VersionConflict { expected: i64 },
    #[error("not found: {reason}")]
    NotFound { reason: String },
    #[error("store backend error: {reason}")]
    Backend { reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// 写入新记录，返回带存储分配标识的记录
    async fn create(&self, record: EventRecord) -> StoreResult<EventRecord>;

    /// 行级锁读取；锁不可得时返回 `StoreError::LockContention`
    async fn lock_by_id(&self, id: i64) -> StoreResult<EventRecord>;

    /// 无条件更新（调用方已持有行锁）
    async fn update(&self, patch: &EventRecordPatch) -> StoreResult<()>;

    /// 版本比较更新；版本不匹配时返回 `StoreError::VersionConflict`
    async fn optimistic_update(
        &self,
        patch: &EventRecordPatch,
        expected_version: i64,
    ) -> StoreResult<()>;

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<EventRecord>>;

    /// 拉取到期（`next_retry_time <= now`）且非终态的记录，按到期时间排序
    async fn fetch_due(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<EventRecord>>;

    /// 放弃行锁且不做修改（相当于事务回滚）
    async fn release(&self, _id: i64) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<T> EventStore for Arc<T>
where
    T: EventStore + ?Sized,
{
    async fn create(&self, record: EventRecord) -> StoreResult<EventRecord> {
        (**self).create(record).await
    }

    async fn lock_by_id(&self, id: i64) -> StoreResult<EventRecord> {
        (**self).lock_by_id(id).await
    }

    async fn update(&self, patch: &EventRecordPatch) -> StoreResult<()> {
        (**self).update(patch).await
    }

    async fn optimistic_update(
        &self,
        patch: &EventRecordPatch,
        expected_version: i64,
    ) -> StoreResult<()> {
        (**self).optimistic_update(patch, expected_version).await
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<EventRecord>> {
        (**self).find_by_id(id).await
    }

    async fn fetch_due(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<EventRecord>> {
        (**self).fetch_due(now, limit).await
    }

    async fn release(&self, id: i64) -> StoreResult<()> {
        (**self).release(id).await
    }
}

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许基础设施层直接使用 `?` 将 sqlx 错误转换为 StoreError，按 SQLSTATE 分类

/// PostgreSQL `lock_not_available`（`SELECT ... FOR UPDATE NOWAIT` 取锁失败）
#[cfg(feature = "infra-sqlx")]
pub const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                reason: "row not found".to_string(),
            },
            sqlx::Error::Database(db) if db.code().as_deref() == Some(PG_LOCK_NOT_AVAILABLE) => {
                StoreError::LockContention
            }
            _ => StoreError::Backend {
                reason: err.to_string(),
            },
        }
    }
}
