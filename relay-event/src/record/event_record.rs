use super::EventStatus;
use crate::error::{EventError, EventResult};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 持久化事件记录
///
/// 由 `persist` 创建，此后只由重试状态机的 fail/retry/finish 修改；
/// 本层从不物理删除记录（归档属于外部职责）。
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct EventRecord {
    /// 存储层分配，赋值后不可变
    pub id: Option<i64>,
    /// 分片标识，`[0, shard_count)`
    pub tag: u32,
    /// 所属系统名
    #[builder(into)]
    pub system_id: String,
    /// 业务流水号
    #[builder(into)]
    pub business_id: String,
    /// 业务类型
    #[builder(into)]
    pub business_type: String,
    /// 事件类型
    #[builder(into)]
    pub event_type: String,
    #[builder(default)]
    pub status: EventStatus,
    /// 原始事件的序列化内容
    pub payload: Vec<u8>,
    /// 重试预算，`-1` 表示无限重试
    pub default_retried_count: i32,
    #[builder(default)]
    pub current_retried_count: i32,
    /// 早于该时间的记录不会被再次投递
    pub next_retry_time: DateTime<Utc>,
    /// 乐观锁版本号，由存储层维护
    #[builder(default)]
    pub version: i64,
    /// 运维备注
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    /// 获取已分配的记录标识；未持久化的记录无法参与状态流转
    pub fn require_id(&self) -> EventResult<i64> {
        self.id
            .ok_or_else(|| EventError::validation("event record has not been persisted"))
    }

    pub fn is_unlimited_retry(&self) -> bool {
        self.default_retried_count == -1
    }

    pub fn is_retry_exhausted(&self) -> bool {
        !self.is_unlimited_retry() && self.current_retried_count == self.default_retried_count
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.next_retry_time <= now
    }
}

/// 部分更新：只携带标识与需要修改的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecordPatch {
    pub id: i64,
    pub status: Option<EventStatus>,
    pub current_retried_count: Option<i32>,
    pub next_retry_time: Option<DateTime<Utc>>,
}

impl EventRecordPatch {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            status: None,
            current_retried_count: None,
            next_retry_time: None,
        }
    }

    pub fn status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn current_retried_count(mut self, count: i32) -> Self {
        self.current_retried_count = Some(count);
        self
    }

    pub fn next_retry_time(mut self, at: DateTime<Utc>) -> Self {
        self.next_retry_time = Some(at);
        self
    }

    /// 将变更合并到完整记录上（存储实现使用）
    pub fn apply_to(&self, record: &mut EventRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(count) = self.current_retried_count {
            record.current_retried_count = count;
        }
        if let Some(at) = self.next_retry_time {
            record.next_retry_time = at;
        }
    }
}
