//! 按投递优先级选择的消费策略
//!
//! - `BestEffort`：分发失败仅记录日志，记录照常提交；
//! - `Reliable`：监听器失败时将消息落为事件记录，交由重试调度器稍后重新投递，
//!   落库失败则返回错误，批次在提交该记录之前中止；重新投递的消息不再新建记录，
//!   而是把本次结果回写到原记录（成功置为 SUCCESS，失败计入重试预算）。
//!
use crate::adapters::{PROP_RECORD_ID, PROP_REDELIVERY};
use crate::backend::ConsumerConfig;
use crate::dispatch::Dispatcher;
use crate::envelope::MessageEnvelope;
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use relay_event::persist::EventSerializer;
use relay_event::record::RuntimeEvent;
use relay_event::retry::RetryStateMachine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPriority {
    #[default]
    BestEffort,
    Reliable,
}

#[async_trait]
pub trait ConsumeStrategy: Send + Sync {
    async fn consume(
        &self,
        config: &ConsumerConfig,
        message_id: Option<String>,
        raw: &[u8],
    ) -> TransportResult<()>;
}

pub struct BestEffortStrategy {
    dispatcher: Arc<Dispatcher>,
}

impl BestEffortStrategy {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl ConsumeStrategy for BestEffortStrategy {
    async fn consume(
        &self,
        config: &ConsumerConfig,
        message_id: Option<String>,
        raw: &[u8],
    ) -> TransportResult<()> {
        let id = message_id.clone();
        if let Err(err) = self
            .dispatcher
            .dispatch(&config.message_type, message_id, raw)
            .await
        {
            warn!(
                destination = %config.destination,
                message_id = ?id,
                error = %err,
                "message dropped after dispatch failure"
            );
        }
        Ok(())
    }
}

pub struct ReliableStrategy {
    dispatcher: Arc<Dispatcher>,
    machine: Arc<RetryStateMachine>,
    serializer: Arc<dyn EventSerializer>,
}

impl ReliableStrategy {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        machine: Arc<RetryStateMachine>,
        serializer: Arc<dyn EventSerializer>,
    ) -> Self {
        Self {
            dispatcher,
            machine,
            serializer,
        }
    }

    async fn persist_for_retry(&self, config: &ConsumerConfig, raw: &[u8]) -> TransportResult<i64> {
        let envelope: MessageEnvelope<Value> = serde_json::from_slice(raw)?;

        let mut event = RuntimeEvent::builder()
            .business_id(envelope.business_id())
            .business_type(envelope.business_type())
            .group(config.destination.as_str())
            .payload(envelope.into_payload())
            .build();

        let record = self
            .machine
            .persist(&mut event, self.serializer.as_ref(), &config.message_type)
            .await?;
        Ok(record.require_id()?)
    }

    /// 重新投递消息的结果回写到原记录
    async fn settle(
        &self,
        config: &ConsumerConfig,
        record_id: i64,
        message_id: Option<String>,
        result: TransportResult<()>,
    ) -> TransportResult<()> {
        match result {
            Ok(()) => self.machine.finish_by_id(record_id).await?,
            Err(err @ (TransportError::Listener { .. } | TransportError::Codec(_))) => {
                warn!(
                    destination = %config.destination,
                    message_id = ?message_id,
                    record_id,
                    error = %err,
                    "redelivered message failed again"
                );
                self.machine.fail_by_id(record_id).await?
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }
}

/// 重新投递的消息返回其来源记录标识
fn redelivered_record(raw: &[u8]) -> Option<i64> {
    let envelope: MessageEnvelope<Value> = serde_json::from_slice(raw).ok()?;
    if envelope.get_bool(PROP_REDELIVERY) != Some(true) {
        return None;
    }
    envelope.get_long(PROP_RECORD_ID)
}

#[async_trait]
impl ConsumeStrategy for ReliableStrategy {
    async fn consume(
        &self,
        config: &ConsumerConfig,
        message_id: Option<String>,
        raw: &[u8],
    ) -> TransportResult<()> {
        let id = message_id.clone();
        let result = self
            .dispatcher
            .dispatch(&config.message_type, message_id, raw)
            .await;

        if let Some(record_id) = redelivered_record(raw) {
            return self.settle(config, record_id, id, result).await;
        }

        match result {
            Ok(()) => Ok(()),
            Err(TransportError::Listener { reason, .. }) => {
                let record_id = self.persist_for_retry(config, raw).await?;
                info!(
                    destination = %config.destination,
                    message_id = ?id,
                    record_id,
                    reason = %reason,
                    "listener failed, message persisted for retry"
                );
                Ok(())
            }
            // 无法解码的消息重试也无济于事
            Err(err @ TransportError::Codec(_)) => {
                warn!(
                    destination = %config.destination,
                    message_id = ?id,
                    error = %err,
                    "undecodable message skipped"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// 优先级 → 策略
#[derive(Clone)]
pub struct StrategyTable {
    best_effort: Arc<dyn ConsumeStrategy>,
    reliable: Arc<dyn ConsumeStrategy>,
}

impl StrategyTable {
    /// 注册两种内置策略
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        machine: Arc<RetryStateMachine>,
        serializer: Arc<dyn EventSerializer>,
    ) -> Self {
        Self {
            best_effort: Arc::new(BestEffortStrategy::new(dispatcher.clone())),
            reliable: Arc::new(ReliableStrategy::new(dispatcher, machine, serializer)),
        }
    }

    /// 覆盖某个优先级的策略
    pub fn with(mut self, priority: DeliveryPriority, strategy: Arc<dyn ConsumeStrategy>) -> Self {
        match priority {
            DeliveryPriority::BestEffort => self.best_effort = strategy,
            DeliveryPriority::Reliable => self.reliable = strategy,
        }
        self
    }

    pub fn select(&self, priority: DeliveryPriority) -> Arc<dyn ConsumeStrategy> {
        match priority {
            DeliveryPriority::BestEffort => self.best_effort.clone(),
            DeliveryPriority::Reliable => self.reliable.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MessageListener;
    use relay_event::persist::{EventStore, InMemoryEventStore, JsonSerializer};
    use relay_event::record::EventStatus;
    use relay_event::retry::LogEscalation;

    struct Rejecting;

    #[async_trait]
    impl MessageListener<Value> for Rejecting {
        async fn on_message(&self, _envelope: MessageEnvelope<Value>) -> anyhow::Result<()> {
            anyhow::bail!("downstream unavailable")
        }
    }

    struct Accepting;

    #[async_trait]
    impl MessageListener<Value> for Accepting {
        async fn on_message(&self, _envelope: MessageEnvelope<Value>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn fixture() -> (Arc<InMemoryEventStore>, StrategyTable) {
        let store = Arc::new(InMemoryEventStore::new());
        let machine = Arc::new(
            RetryStateMachine::builder()
                .store(store.clone())
                .escalation(Arc::new(LogEscalation))
                .build(),
        );
        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher
            .register::<Value, _>("order.paid", Arc::new(Rejecting))
            .unwrap();
        dispatcher
            .register::<Value, _>("order.shipped", Arc::new(Accepting))
            .unwrap();

        let table = StrategyTable::new(dispatcher, machine, Arc::new(JsonSerializer));
        (store, table)
    }

    fn config(priority: DeliveryPriority) -> ConsumerConfig {
        ConsumerConfig::builder()
            .kind("memory")
            .destination("orders")
            .message_type("order.paid")
            .priority(priority)
            .build()
    }

    fn raw() -> Vec<u8> {
        let envelope = MessageEnvelope::new("order-1", "order", serde_json::json!({"amount": 5}));
        serde_json::to_vec(&envelope).unwrap()
    }

    fn redelivered(record_id: i64) -> Vec<u8> {
        let envelope = MessageEnvelope::new("order-1", "order", serde_json::json!({"amount": 5}))
            .with_long(PROP_RECORD_ID, record_id)
            .with_bool(PROP_REDELIVERY, true);
        serde_json::to_vec(&envelope).unwrap()
    }

    #[tokio::test]
    async fn reliable_persists_failed_messages() {
        let (store, table) = fixture();
        let strategy = table.select(DeliveryPriority::Reliable);

        strategy
            .consume(&config(DeliveryPriority::Reliable), Some("m-1".into()), &raw())
            .await
            .unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].business_id, "order-1");
        assert_eq!(records[0].event_type, "order.paid");
        assert_eq!(records[0].status, EventStatus::Waiting);

        let event = JsonSerializer.deserialize(&records[0].payload).unwrap();
        assert_eq!(event.group(), "orders");
        assert_eq!(event.payload()["amount"], 5);
        assert!(store.find_by_id(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let (store, table) = fixture();
        let strategy = table.select(DeliveryPriority::BestEffort);

        strategy
            .consume(&config(DeliveryPriority::BestEffort), None, &raw())
            .await
            .unwrap();
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn reliable_surfaces_unknown_message_types() {
        let (_store, table) = fixture();
        let mut config = config(DeliveryPriority::Reliable);
        config.message_type = "order.refunded".into();

        let err = table
            .select(DeliveryPriority::Reliable)
            .consume(&config, None, &raw())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::HandlerNotFound { .. }));
    }

    #[tokio::test]
    async fn redelivery_failure_counts_against_original_record() {
        let (store, table) = fixture();
        let strategy = table.select(DeliveryPriority::Reliable);
        let config = config(DeliveryPriority::Reliable);

        strategy.consume(&config, None, &raw()).await.unwrap();
        strategy.consume(&config, None, &redelivered(1)).await.unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, EventStatus::Processing);
        assert_eq!(records[0].current_retried_count, 1);
    }

    #[tokio::test]
    async fn redelivery_success_finishes_original_record() {
        let (store, table) = fixture();
        let strategy = table.select(DeliveryPriority::Reliable);

        strategy
            .consume(&config(DeliveryPriority::Reliable), None, &raw())
            .await
            .unwrap();

        let mut shipped = config(DeliveryPriority::Reliable);
        shipped.message_type = "order.shipped".into();
        strategy.consume(&shipped, None, &redelivered(1)).await.unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, EventStatus::Success);
        assert_eq!(records[0].current_retried_count, 0);
    }
}
