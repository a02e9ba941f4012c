//! 人工处理通知（EscalationPublisher）
//!
//! 重试耗尽时尽力发布“需要人工处理”的通知。发布失败不会传递给 `fail()`
//! 的调用方，状态机改为推迟下一次重试时间。
//!
use crate::{error::EventResult, record::EventRecord};
use async_trait::async_trait;

#[async_trait]
pub trait EscalationPublisher: Send + Sync {
    /// 发布需人工处理的记录
    async fn publish(&self, record: &EventRecord) -> EventResult<()>;
}

/// 仅写日志的通知实现，适用于尚未接入运维通道的部署
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEscalation;

#[async_trait]
impl EscalationPublisher for LogEscalation {
    async fn publish(&self, record: &EventRecord) -> EventResult<()> {
        tracing::error!(
            record_id = ?record.id,
            business_id = %record.business_id,
            business_type = %record.business_type,
            event_type = %record.event_type,
            retried = record.current_retried_count,
            "event record requires manual handling"
        );
        Ok(())
    }
}
