//! 内存版事件存储（InMemoryEventStore）
//!
//! 满足 `EventStore` 协议的轻量实现，典型用途：测试环境、示例与本地开发。
//! - 行锁：记录被 `lock_by_id` 锁定后，其他调用将得到 `LockContention`，
//!   直到持锁方执行下一次 `update`（相当于事务提交）；
//! - 乐观更新：版本号不匹配时返回 `VersionConflict`，成功后版本号加一；
//! - 所有部分更新按顺序记录，便于断言。

use super::{EventStore, StoreError, StoreResult};
use crate::record::{EventRecord, EventRecordPatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: BTreeMap<i64, EventRecord>,
    locked: HashSet<i64>,
    patches: Vec<EventRecordPatch>,
}

#[derive(Default)]
pub struct InMemoryEventStore {
    inner: Mutex<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 当前全部记录（按标识排序）
    pub fn records(&self) -> Vec<EventRecord> {
        self.inner().rows.values().cloned().collect()
    }

    /// 已应用的部分更新，按先后顺序
    pub fn patches(&self) -> Vec<EventRecordPatch> {
        self.inner().patches.clone()
    }

    pub fn is_locked(&self, id: i64) -> bool {
        self.inner().locked.contains(&id)
    }

    fn not_found(id: i64) -> StoreError {
        StoreError::NotFound {
            reason: format!("event record {id}"),
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create(&self, mut record: EventRecord) -> StoreResult<EventRecord> {
        let mut inner = self.inner();
        inner.next_id += 1;
        let id = inner.next_id;

        record.id = Some(id);
        record.version = 0;
        inner.rows.insert(id, record.clone());

        Ok(record)
    }

    async fn lock_by_id(&self, id: i64) -> StoreResult<EventRecord> {
        let mut inner = self.inner();
        let record = inner.rows.get(&id).cloned().ok_or_else(|| Self::not_found(id))?;

        if !inner.locked.insert(id) {
            return Err(StoreError::LockContention);
        }

        Ok(record)
    }

    async fn update(&self, patch: &EventRecordPatch) -> StoreResult<()> {
        let mut inner = self.inner();
        let row = inner
            .rows
            .get_mut(&patch.id)
            .ok_or_else(|| Self::not_found(patch.id))?;

        patch.apply_to(row);
        row.version += 1;

        inner.locked.remove(&patch.id);
        inner.patches.push(patch.clone());
        Ok(())
    }

    async fn optimistic_update(
        &self,
        patch: &EventRecordPatch,
        expected_version: i64,
    ) -> StoreResult<()> {
        let mut inner = self.inner();
        let row = inner
            .rows
            .get_mut(&patch.id)
            .ok_or_else(|| Self::not_found(patch.id))?;

        if row.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
            });
        }

        patch.apply_to(row);
        row.version += 1;

        inner.patches.push(patch.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<EventRecord>> {
        Ok(self.inner().rows.get(&id).cloned())
    }

    async fn fetch_due(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<EventRecord>> {
        let inner = self.inner();
        let mut due: Vec<EventRecord> = inner
            .rows
            .values()
            .filter(|r| r.is_due(now))
            .cloned()
            .collect();

        due.sort_by_key(|r| (r.next_retry_time, r.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn release(&self, id: i64) -> StoreResult<()> {
        self.inner().locked.remove(&id);
        Ok(())
    }
}
