//! 重试状态机（RetryStateMachine）
//!
//! 管理持久化事件的生命周期：持久化 → 加锁 → 退避重试 → 转人工 → 完成。
//!
//! ```text
//! WAITING ─(fail)→ PROCESSING ─(fail, 预算未耗尽)→ PROCESSING（count+1，新的到期时间）
//!                       │
//!                       ├─(fail, 预算耗尽)→ MANUAL_WAIT
//!                       └─(finish)→ SUCCESS
//! ```
//!
//! 加锁模式由进程级配置决定：悲观模式依赖行锁并无条件更新，乐观模式不加锁，
//! 以版本比较更新，版本冲突直接返回给调用方（视为“他人正在处理”）。
//!
use super::{EscalationPublisher, backoff};
use crate::config::{LockMode, RelayConfig};
use crate::error::{EventError, EventResult};
use crate::persist::{EventSerializer, EventStore, StoreError};
use crate::record::{EventRecord, EventRecordPatch, EventStatus, RuntimeEvent};
use bon::Builder;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Builder)]
pub struct RetryStateMachine {
    store: Arc<dyn EventStore>,
    escalation: Arc<dyn EscalationPublisher>,
    #[builder(default)]
    config: RelayConfig,
}

impl RetryStateMachine {
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// 持久化运行时事件，成功后在事件上回填记录标识
    pub async fn persist(
        &self,
        event: &mut RuntimeEvent,
        serializer: &dyn EventSerializer,
        event_type: &str,
    ) -> EventResult<EventRecord> {
        if is_blank(event.business_id()) || is_blank(event.business_type()) {
            return Err(EventError::validation(
                "'business_id' and 'business_type' can't be blank",
            ));
        }
        if is_blank(event_type) {
            return Err(EventError::validation("'event_type' can't be blank"));
        }

        let record = self.to_record(event, serializer, event_type)?;
        let created = self
            .store
            .create(record)
            .await
            .map_err(|e| EventError::persistence("persist event failed", e))?;

        let id = created.require_id()?;
        event.attach_record(id);

        info!(
            record_id = id,
            tag = created.tag,
            business_id = %created.business_id,
            business_type = %created.business_type,
            event_type = %created.event_type,
            "event persisted"
        );
        Ok(created)
    }

    /// 对记录加锁
    ///
    /// 乐观模式直接返回 `None`，调用方应走版本比较更新；悲观模式返回锁定的
    /// 最新记录，锁不可得时返回 `EventError::LockContention`。
    pub async fn lock(&self, record: &EventRecord) -> EventResult<Option<EventRecord>> {
        if self.config.lock_mode == LockMode::Optimistic {
            return Ok(None);
        }

        let id = record.require_id()?;
        match self.store.lock_by_id(id).await {
            Ok(locked) => Ok(Some(locked)),
            Err(StoreError::LockContention) => Err(EventError::LockContention { id }),
            Err(e) => Err(EventError::persistence("lock persistent event failed", e)),
        }
    }

    /// 处理失败：按预算继续重试，或转人工处理
    pub async fn fail(&self, record: &EventRecord) -> EventResult<()> {
        let id = record.require_id()?;

        if record.is_unlimited_retry() {
            return self.retry(id, record).await;
        }

        // 本次失败计入重试次数后达到预算即转人工
        let retried = record.current_retried_count.saturating_add(1);
        if retried >= record.default_retried_count {
            self.escalate(id, record).await
        } else {
            self.retry(id, record).await
        }
    }

    /// 处理成功，仅更新 `{id, status=SUCCESS}`
    pub async fn finish(&self, record: &EventRecord) -> EventResult<()> {
        let id = record.require_id()?;
        let patch = EventRecordPatch::new(id).status(EventStatus::Success);
        self.update(&patch, record.version).await?;

        debug!(record_id = id, "event record finished");
        Ok(())
    }

    /// 认领到期记录：到期时间推后一个租约，租约内不会再被调度拉取
    ///
    /// 返回写入后的记录，后续的 `fail`/`finish` 以它的版本为准。
    pub async fn claim(&self, record: &EventRecord, lease: Duration) -> EventResult<EventRecord> {
        let id = record.require_id()?;
        let lease = TimeDelta::from_std(lease)
            .map_err(|e| EventError::validation(format!("invalid claim lease: {e}")))?;
        let patch = EventRecordPatch::new(id).next_retry_time(due_after(Utc::now(), lease)?);
        self.update(&patch, record.version).await?;

        let mut claimed = record.clone();
        patch.apply_to(&mut claimed);
        claimed.version += 1;

        debug!(record_id = id, lease_until = %claimed.next_retry_time, "event record claimed");
        Ok(claimed)
    }

    /// 按标识回写成功结果，供异步消费方使用；已是终态的记录保持不变
    pub async fn finish_by_id(&self, id: i64) -> EventResult<()> {
        let Some(record) = self.load_unsettled(id).await? else {
            return Ok(());
        };
        let result = self.finish(&record).await;
        if result.is_err() {
            self.release(id).await;
        }
        result
    }

    /// 按标识回写失败结果，同 `fail` 一样计入重试预算
    pub async fn fail_by_id(&self, id: i64) -> EventResult<()> {
        let Some(record) = self.load_unsettled(id).await? else {
            return Ok(());
        };
        let result = self.fail(&record).await;
        if result.is_err() {
            self.release(id).await;
        }
        result
    }

    /// 放弃行锁；失败只记录日志
    pub(crate) async fn release(&self, id: i64) {
        if let Err(err) = self.store.release(id).await {
            warn!(record_id = id, error = %err, "release event record lock failed");
        }
    }

    /// 读取待回写的记录，悲观模式下加锁读取
    async fn load_unsettled(&self, id: i64) -> EventResult<Option<EventRecord>> {
        let record = match self.config.lock_mode {
            LockMode::Pessimistic => match self.store.lock_by_id(id).await {
                Ok(record) => record,
                Err(StoreError::LockContention) => return Err(EventError::LockContention { id }),
                Err(StoreError::NotFound { .. }) => return Err(EventError::RecordNotFound { id }),
                Err(e) => return Err(EventError::persistence("lock persistent event failed", e)),
            },
            LockMode::Optimistic => self
                .store
                .find_by_id(id)
                .await
                .map_err(|e| EventError::persistence("load persistent event failed", e))?
                .ok_or(EventError::RecordNotFound { id })?,
        };

        if record.status.is_terminal() {
            if self.config.lock_mode == LockMode::Pessimistic {
                self.release(id).await;
            }
            debug!(record_id = id, status = %record.status, "event record already settled");
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// 按加锁模式路由的部分更新
    ///
    /// `expected_version` 仅在乐观模式下使用。
    pub async fn update(&self, patch: &EventRecordPatch, expected_version: i64) -> EventResult<()> {
        let result = match self.config.lock_mode {
            LockMode::Optimistic => self.store.optimistic_update(patch, expected_version).await,
            LockMode::Pessimistic => self.store.update(patch).await,
        };

        result.map_err(|e| match e {
            StoreError::VersionConflict { expected } => EventError::VersionConflict {
                id: patch.id,
                expected,
            },
            StoreError::LockContention => EventError::LockContention { id: patch.id },
            other => EventError::persistence("update persistent event failed", other),
        })
    }

    async fn retry(&self, id: i64, record: &EventRecord) -> EventResult<()> {
        let retried = record.current_retried_count.saturating_add(1);
        let delay = if record.is_unlimited_retry() {
            self.infinite_retry_interval()?
        } else {
            backoff(retried)
        };
        let next_retry_time = due_after(Utc::now(), delay)?;

        let mut patch = EventRecordPatch::new(id)
            .current_retried_count(retried)
            .next_retry_time(next_retry_time);
        if record.status != EventStatus::Processing {
            patch = patch.status(EventStatus::Processing);
        }

        self.update(&patch, record.version).await?;

        debug!(
            record_id = id,
            retried,
            next_retry_time = %next_retry_time,
            "event record scheduled for retry"
        );
        Ok(())
    }

    async fn escalate(&self, id: i64, record: &EventRecord) -> EventResult<()> {
        let retried = record
            .default_retried_count
            .max(record.current_retried_count);

        let mut patch = EventRecordPatch::new(id).status(EventStatus::ManualWait);
        if retried != record.current_retried_count {
            patch = patch.current_retried_count(retried);
        }

        let mut escalated = record.clone();
        patch.apply_to(&mut escalated);

        match self.escalation.publish(&escalated).await {
            Ok(()) => {
                info!(
                    record_id = id,
                    retried,
                    business_id = %record.business_id,
                    "event record escalated to manual handling"
                );
            }
            Err(err) => {
                // 通知失败不影响调用方，推迟到期时间避免被调度立即抓取
                let deferred = due_after(Utc::now(), self.infinite_retry_interval()?)?;
                warn!(
                    record_id = id,
                    error = %err,
                    next_retry_time = %deferred,
                    "escalation publish failed"
                );
                patch = patch.next_retry_time(deferred);
            }
        }

        self.update(&patch, record.version).await
    }

    fn to_record(
        &self,
        event: &RuntimeEvent,
        serializer: &dyn EventSerializer,
        event_type: &str,
    ) -> EventResult<EventRecord> {
        let tag = rand::thread_rng().gen_range(0..self.config.shard_count.max(1));

        let default_retried_count = if event.is_persistent() && event.retry() != 0 {
            event.retry()
        } else {
            self.config.default_retry_times
        };

        let payload = serializer
            .serialize(event)
            .map_err(|e| EventError::persistence("serialize event failed", e))?;

        let now = Utc::now();
        Ok(EventRecord::builder()
            .tag(tag)
            .system_id(self.config.system_id.clone())
            .business_id(event.business_id())
            .business_type(event.business_type())
            .event_type(event_type)
            .status(EventStatus::Waiting)
            .payload(payload)
            .default_retried_count(default_retried_count)
            .current_retried_count(0)
            .next_retry_time(now)
            .created_at(now)
            .build())
    }

    fn infinite_retry_interval(&self) -> EventResult<TimeDelta> {
        TimeDelta::from_std(self.config.infinite_retry_interval).map_err(|e| EventError::Config {
            key: crate::config::KEY_INFINITE_RETRY_INTERVAL.to_string(),
            reason: e.to_string(),
        })
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn due_after(now: DateTime<Utc>, delay: TimeDelta) -> EventResult<DateTime<Utc>> {
    now.checked_add_signed(delay)
        .ok_or_else(|| EventError::validation(format!("retry delay out of range: {delay}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockMode;
    use crate::persist::{InMemoryEventStore, JsonSerializer, StoreResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct SpyEscalation {
        published: Mutex<Vec<EventRecord>>,
        broken: bool,
    }

    impl SpyEscalation {
        fn broken() -> Self {
            Self {
                broken: true,
                ..Default::default()
            }
        }

        fn published(&self) -> Vec<EventRecord> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EscalationPublisher for SpyEscalation {
        async fn publish(&self, record: &EventRecord) -> EventResult<()> {
            self.published.lock().unwrap().push(record.clone());
            if self.broken {
                return Err(EventError::publish("channel unavailable"));
            }
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl EventStore for BrokenStore {
        async fn create(&self, _record: EventRecord) -> StoreResult<EventRecord> {
            Err(backend())
        }
        async fn lock_by_id(&self, _id: i64) -> StoreResult<EventRecord> {
            Err(backend())
        }
        async fn update(&self, _patch: &EventRecordPatch) -> StoreResult<()> {
            Err(backend())
        }
        async fn optimistic_update(&self, _patch: &EventRecordPatch, _v: i64) -> StoreResult<()> {
            Err(backend())
        }
        async fn find_by_id(&self, _id: i64) -> StoreResult<Option<EventRecord>> {
            Err(backend())
        }
        async fn fetch_due(&self, _now: DateTime<Utc>, _limit: usize) -> StoreResult<Vec<EventRecord>> {
            Err(backend())
        }
    }

    fn backend() -> StoreError {
        StoreError::Backend {
            reason: "connection reset".to_string(),
        }
    }

    fn machine_with(
        store: Arc<InMemoryEventStore>,
        escalation: Arc<SpyEscalation>,
        config: RelayConfig,
    ) -> RetryStateMachine {
        RetryStateMachine::builder()
            .store(store)
            .escalation(escalation)
            .config(config)
            .build()
    }

    fn order_event(retry: i32) -> RuntimeEvent {
        RuntimeEvent::builder()
            .business_id("order-1001")
            .business_type("order")
            .group("payment")
            .payload(json!({ "amount": 42 }))
            .retry(retry)
            .build()
    }

    async fn reload(store: &InMemoryEventStore, id: i64) -> EventRecord {
        store.find_by_id(id).await.unwrap().unwrap()
    }

    fn assert_due_in(record: &EventRecord, before: DateTime<Utc>, after: DateTime<Utc>, delay: TimeDelta) {
        assert!(
            record.next_retry_time >= before + delay && record.next_retry_time <= after + delay,
            "next_retry_time {} not within {delay} of [{before}, {after}]",
            record.next_retry_time
        );
    }

    #[tokio::test]
    async fn persist_rejects_blank_identity_without_writing() {
        let store = Arc::new(InMemoryEventStore::new());
        let machine = machine_with(store.clone(), Arc::default(), RelayConfig::default());

        let mut event = RuntimeEvent::builder()
            .business_id("  ")
            .business_type("order")
            .group("payment")
            .payload(json!({}))
            .build();
        let err = machine
            .persist(&mut event, &JsonSerializer, "order.paid")
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Validation { .. }));

        let mut event = order_event(0);
        let err = machine.persist(&mut event, &JsonSerializer, "").await.unwrap_err();
        assert!(matches!(err, EventError::Validation { .. }));

        assert!(store.records().is_empty());
        assert!(event.record_id().is_none());
    }

    #[tokio::test]
    async fn persist_writes_waiting_record_with_budget() {
        let store = Arc::new(InMemoryEventStore::new());
        let config = RelayConfig {
            shard_count: 4,
            ..Default::default()
        };
        let machine = machine_with(store.clone(), Arc::default(), config);

        let mut defaulted = order_event(0);
        let record = machine
            .persist(&mut defaulted, &JsonSerializer, "order.paid")
            .await
            .unwrap();
        assert_eq!(record.status, EventStatus::Waiting);
        assert_eq!(record.current_retried_count, 0);
        assert_eq!(record.default_retried_count, 5);
        assert_eq!(record.system_id, "webapp");
        assert!(record.tag < 4);
        assert_eq!(record.next_retry_time, record.created_at);
        assert_eq!(defaulted.record_id(), record.id);

        let mut overridden = order_event(-1);
        let record = machine
            .persist(&mut overridden, &JsonSerializer, "order.paid")
            .await
            .unwrap();
        assert!(record.is_unlimited_retry());

        let decoded: RuntimeEvent = serde_json::from_slice(&record.payload).unwrap();
        assert_eq!(decoded.business_id(), "order-1001");
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn failures_follow_backoff_then_escalate() {
        let store = Arc::new(InMemoryEventStore::new());
        let escalation = Arc::new(SpyEscalation::default());
        let machine = machine_with(store.clone(), escalation.clone(), RelayConfig::default());

        let mut event = order_event(0);
        let id = machine
            .persist(&mut event, &JsonSerializer, "order.paid")
            .await
            .unwrap()
            .id
            .unwrap();

        let expected = [
            TimeDelta::minutes(10),
            TimeDelta::minutes(30),
            TimeDelta::hours(1),
            TimeDelta::hours(6),
        ];
        for (i, delay) in expected.into_iter().enumerate() {
            let record = reload(&store, id).await;
            let before = Utc::now();
            machine.fail(&record).await.unwrap();
            let after = Utc::now();

            let record = reload(&store, id).await;
            assert_eq!(record.status, EventStatus::Processing);
            assert_eq!(record.current_retried_count, i as i32 + 1);
            assert_due_in(&record, before, after, delay);
        }
        assert!(escalation.published().is_empty());

        let record = reload(&store, id).await;
        machine.fail(&record).await.unwrap();

        let record = reload(&store, id).await;
        assert_eq!(record.status, EventStatus::ManualWait);
        assert_eq!(record.current_retried_count, 5);
        assert!(record.is_retry_exhausted());

        let published = escalation.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].status, EventStatus::ManualWait);
        assert_eq!(published[0].id, Some(id));
    }

    #[tokio::test]
    async fn unlimited_records_never_escalate() {
        let store = Arc::new(InMemoryEventStore::new());
        let escalation = Arc::new(SpyEscalation::default());
        let machine = machine_with(store.clone(), escalation.clone(), RelayConfig::default());

        let mut event = order_event(-1);
        let id = machine
            .persist(&mut event, &JsonSerializer, "order.paid")
            .await
            .unwrap()
            .id
            .unwrap();

        for n in 1..=12 {
            let record = reload(&store, id).await;
            let before = Utc::now();
            machine.fail(&record).await.unwrap();
            let after = Utc::now();

            let record = reload(&store, id).await;
            assert_eq!(record.status, EventStatus::Processing);
            assert_eq!(record.current_retried_count, n);
            assert_due_in(&record, before, after, TimeDelta::seconds(600));
        }
        assert!(escalation.published().is_empty());
    }

    #[tokio::test]
    async fn finish_writes_only_status() {
        let store = Arc::new(InMemoryEventStore::new());
        let machine = machine_with(store.clone(), Arc::default(), RelayConfig::default());

        let mut event = order_event(0);
        let record = machine
            .persist(&mut event, &JsonSerializer, "order.paid")
            .await
            .unwrap();
        let id = record.id.unwrap();

        machine.finish(&record).await.unwrap();

        assert_eq!(
            store.patches(),
            vec![EventRecordPatch::new(id).status(EventStatus::Success)]
        );
        let record = reload(&store, id).await;
        assert_eq!(record.status, EventStatus::Success);
        assert_eq!(record.current_retried_count, 0);
    }

    #[tokio::test]
    async fn publish_failure_defers_instead_of_surfacing() {
        let store = Arc::new(InMemoryEventStore::new());
        let escalation = Arc::new(SpyEscalation::broken());
        let config = RelayConfig {
            infinite_retry_interval: Duration::from_secs(120),
            ..Default::default()
        };
        let machine = machine_with(store.clone(), escalation.clone(), config);

        let mut event = order_event(1);
        let record = machine
            .persist(&mut event, &JsonSerializer, "order.paid")
            .await
            .unwrap();
        let id = record.id.unwrap();

        let before = Utc::now();
        machine.fail(&record).await.unwrap();
        let after = Utc::now();

        let record = reload(&store, id).await;
        assert_eq!(record.status, EventStatus::ManualWait);
        assert_eq!(record.current_retried_count, 1);
        assert_due_in(&record, before, after, TimeDelta::seconds(120));
        assert_eq!(escalation.published().len(), 1);
    }

    #[tokio::test]
    async fn optimistic_mode_skips_lock_and_detects_conflicts() {
        let store = Arc::new(InMemoryEventStore::new());
        let config = RelayConfig {
            lock_mode: LockMode::Optimistic,
            ..Default::default()
        };
        let machine = machine_with(store.clone(), Arc::default(), config);

        let mut event = order_event(0);
        let stale = machine
            .persist(&mut event, &JsonSerializer, "order.paid")
            .await
            .unwrap();
        let id = stale.id.unwrap();

        assert!(machine.lock(&stale).await.unwrap().is_none());
        assert!(!store.is_locked(id));

        machine.fail(&stale).await.unwrap();
        let err = machine.finish(&stale).await.unwrap_err();
        assert!(matches!(err, EventError::VersionConflict { id: got, expected: 0 } if got == id));
        assert!(err.is_contended());

        let fresh = reload(&store, id).await;
        machine.finish(&fresh).await.unwrap();
        assert_eq!(reload(&store, id).await.status, EventStatus::Success);
    }

    #[tokio::test]
    async fn claim_pushes_due_time_by_lease() {
        let store = Arc::new(InMemoryEventStore::new());
        let machine = machine_with(store.clone(), Arc::default(), RelayConfig::default());

        let mut event = order_event(0);
        let record = machine
            .persist(&mut event, &JsonSerializer, "order.paid")
            .await
            .unwrap();
        let id = record.id.unwrap();

        let before = Utc::now();
        let claimed = machine
            .claim(&record, Duration::from_secs(300))
            .await
            .unwrap();
        let after = Utc::now();

        let stored = reload(&store, id).await;
        assert_eq!(claimed.version, stored.version);
        assert_eq!(claimed.next_retry_time, stored.next_retry_time);
        assert_eq!(stored.status, EventStatus::Waiting);
        assert_due_in(&stored, before, after, TimeDelta::seconds(300));
        assert!(store.fetch_due(Utc::now(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settle_by_id_counts_against_budget() {
        let store = Arc::new(InMemoryEventStore::new());
        let escalation = Arc::new(SpyEscalation::default());
        let machine = machine_with(store.clone(), escalation.clone(), RelayConfig::default());

        let mut event = order_event(2);
        let id = machine
            .persist(&mut event, &JsonSerializer, "order.paid")
            .await
            .unwrap()
            .id
            .unwrap();

        machine.fail_by_id(id).await.unwrap();
        let record = reload(&store, id).await;
        assert_eq!(record.status, EventStatus::Processing);
        assert_eq!(record.current_retried_count, 1);
        assert!(!store.is_locked(id));

        machine.fail_by_id(id).await.unwrap();
        assert_eq!(reload(&store, id).await.status, EventStatus::ManualWait);
        assert_eq!(escalation.published().len(), 1);

        // 终态记录不再变化
        let patches = store.patches().len();
        machine.fail_by_id(id).await.unwrap();
        machine.finish_by_id(id).await.unwrap();
        assert_eq!(store.patches().len(), patches);
        assert!(!store.is_locked(id));

        assert!(matches!(
            machine.finish_by_id(99).await,
            Err(EventError::RecordNotFound { id: 99 })
        ));
    }

    #[tokio::test]
    async fn pessimistic_lock_reports_contention() {
        let store = Arc::new(InMemoryEventStore::new());
        let machine = machine_with(store.clone(), Arc::default(), RelayConfig::default());

        let mut event = order_event(0);
        let record = machine
            .persist(&mut event, &JsonSerializer, "order.paid")
            .await
            .unwrap();
        let id = record.id.unwrap();

        let locked = machine.lock(&record).await.unwrap().unwrap();
        assert_eq!(locked.id, Some(id));

        let err = machine.lock(&record).await.unwrap_err();
        assert!(matches!(err, EventError::LockContention { id: got } if got == id));
    }

    #[tokio::test]
    async fn store_failures_become_persistence_errors() {
        let machine = RetryStateMachine::builder()
            .store(Arc::new(BrokenStore))
            .escalation(Arc::new(SpyEscalation::default()))
            .build();

        let mut event = order_event(0);
        let err = machine
            .persist(&mut event, &JsonSerializer, "order.paid")
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Persistence { .. }));
        assert!(std::error::Error::source(&err).is_some());

        let record = EventRecord::builder()
            .id(7)
            .tag(0)
            .system_id("webapp")
            .business_id("order-1001")
            .business_type("order")
            .event_type("order.paid")
            .payload(Vec::new())
            .default_retried_count(5)
            .next_retry_time(Utc::now())
            .created_at(Utc::now())
            .build();
        assert!(matches!(
            machine.lock(&record).await,
            Err(EventError::Persistence { .. })
        ));
        assert!(matches!(
            machine.fail(&record).await,
            Err(EventError::Persistence { .. })
        ));
    }

    #[tokio::test]
    async fn unpersisted_records_are_rejected() {
        let machine = machine_with(
            Arc::new(InMemoryEventStore::new()),
            Arc::default(),
            RelayConfig::default(),
        );
        let record = EventRecord::builder()
            .tag(0)
            .system_id("webapp")
            .business_id("order-1001")
            .business_type("order")
            .event_type("order.paid")
            .payload(Vec::new())
            .default_retried_count(5)
            .next_retry_time(Utc::now())
            .created_at(Utc::now())
            .build();

        assert!(matches!(
            machine.fail(&record).await,
            Err(EventError::Validation { .. })
        ));
    }
}
