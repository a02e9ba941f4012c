//! 事件侧协作方的传输实现
//!
//! - `ProducerEscalation`：把“需要人工处理”的记录发往运维目的地；
//! - `ProducerRedeliverer`：还原持久化的运行时事件，重新发往其分组对应的目的地，
//!   处理结果由可靠消费策略按 `PROP_REDELIVERY` 标记回写到原记录。
//!
use crate::backend::Producer;
use crate::envelope::MessageEnvelope;
use async_trait::async_trait;
use relay_event::error::{EventError, EventResult};
use relay_event::persist::EventSerializer;
use relay_event::record::EventRecord;
use relay_event::retry::{EscalationPublisher, Redelivered, Redeliverer};
use std::sync::Arc;

/// 信封属性：来源事件记录标识
pub const PROP_RECORD_ID: &str = "event.record_id";
/// 信封属性：事件类型
pub const PROP_EVENT_TYPE: &str = "event.type";
/// 信封属性：已重试次数
pub const PROP_RETRIED: &str = "event.retried";
/// 信封属性：重新投递标记，携带该标记的消息其结果回写到 `PROP_RECORD_ID` 指向的记录
pub const PROP_REDELIVERY: &str = "event.redelivery";

pub struct ProducerEscalation {
    producer: Arc<dyn Producer>,
    destination: String,
}

impl ProducerEscalation {
    pub fn new(producer: Arc<dyn Producer>, destination: impl Into<String>) -> Self {
        Self {
            producer,
            destination: destination.into(),
        }
    }
}

#[async_trait]
impl EscalationPublisher for ProducerEscalation {
    async fn publish(&self, record: &EventRecord) -> EventResult<()> {
        let mut envelope = MessageEnvelope::new(
            record.business_id.as_str(),
            record.business_type.as_str(),
            serde_json::to_value(record)?,
        )
        .with_string(PROP_EVENT_TYPE, record.event_type.as_str())
        .with_int(PROP_RETRIED, record.current_retried_count);
        if let Some(id) = record.id {
            envelope = envelope.with_long(PROP_RECORD_ID, id);
        }

        self.producer
            .send(&self.destination, envelope)
            .await
            .map_err(|e| EventError::publish(e.to_string()))
    }
}

pub struct ProducerRedeliverer {
    producer: Arc<dyn Producer>,
    serializer: Arc<dyn EventSerializer>,
}

impl ProducerRedeliverer {
    pub fn new(producer: Arc<dyn Producer>, serializer: Arc<dyn EventSerializer>) -> Self {
        Self {
            producer,
            serializer,
        }
    }
}

#[async_trait]
impl Redeliverer for ProducerRedeliverer {
    async fn redeliver(&self, record: &EventRecord) -> anyhow::Result<Redelivered> {
        let id = record.require_id()?;
        let event = self.serializer.deserialize(&record.payload)?;

        let envelope = MessageEnvelope::new(
            event.business_id(),
            event.business_type(),
            event.payload().clone(),
        )
        .with_long(PROP_RECORD_ID, id)
        .with_string(PROP_EVENT_TYPE, record.event_type.as_str())
        .with_int(PROP_RETRIED, record.current_retried_count)
        .with_bool(PROP_REDELIVERY, true);

        self.producer.send(event.group(), envelope).await?;
        Ok(Redelivered::HandedOff)
    }
}
