use anyhow::Result as AnyResult;
use async_trait::async_trait;
use relay_event::config::{EnvConfig, RelayConfig};
use relay_event::persist::{InMemoryEventStore, JsonSerializer};
use relay_event::retry::{LogEscalation, RetryScheduler, RetryStateMachine, SchedulerConfig};
use relay_transport::adapters::{ProducerEscalation, ProducerRedeliverer};
use relay_transport::backend::{Backend, ConsumerConfig, ProducerConfig};
use relay_transport::dispatch::{Dispatcher, MessageListener};
use relay_transport::envelope::MessageEnvelope;
use relay_transport::memory::{MEMORY, MemoryBackend};
use relay_transport::registry::TransportRegistry;
use relay_transport::strategy::{DeliveryPriority, StrategyTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ORDERS: &str = "orders";
const MANUAL: &str = "ops.manual";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderPaid {
    order_no: String,
    amount: i64,
}

/// 每笔订单首次处理失败，模拟下游短暂不可用
#[derive(Default)]
struct SettleListener {
    seen: Mutex<HashSet<String>>,
}

#[async_trait]
impl MessageListener<OrderPaid> for SettleListener {
    async fn on_message(&self, envelope: MessageEnvelope<OrderPaid>) -> anyhow::Result<()> {
        let order = envelope.payload();
        if self.seen.lock().unwrap_or_else(|e| e.into_inner()).insert(order.order_no.clone()) {
            anyhow::bail!("settlement service unavailable for {}", order.order_no);
        }
        info!(order_no = %order.order_no, amount = order.amount, "order settled");
        Ok(())
    }
}

struct ManualListener;

#[async_trait]
impl MessageListener<Value> for ManualListener {
    async fn on_message(&self, envelope: MessageEnvelope<Value>) -> anyhow::Result<()> {
        warn!(business_id = %envelope.business_id(), "manual handling requested");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RelayConfig::from_source(&EnvConfig)?;
    let store = Arc::new(InMemoryEventStore::new());

    // 消费侧只需持久化能力，转人工通知由调度侧的状态机负责
    let consume_machine = Arc::new(
        RetryStateMachine::builder()
            .store(store.clone())
            .escalation(Arc::new(LogEscalation))
            .config(config.clone())
            .build(),
    );

    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.register::<OrderPaid, _>("order.paid", Arc::new(SettleListener::default()))?;
    dispatcher.register::<Value, _>("event.manual", Arc::new(ManualListener))?;

    let strategies = Arc::new(StrategyTable::new(
        dispatcher,
        consume_machine,
        Arc::new(JsonSerializer),
    ));
    let memory: Arc<dyn Backend> = Arc::new(MemoryBackend::new(strategies));
    let registry = TransportRegistry::init(config.pipeline_capacity, [memory]).await?;

    for (destination, message_type, priority) in [
        (ORDERS, "order.paid", DeliveryPriority::Reliable),
        (MANUAL, "event.manual", DeliveryPriority::BestEffort),
    ] {
        let consumer = ConsumerConfig::builder()
            .kind(MEMORY)
            .destination(destination)
            .message_type(message_type)
            .priority(priority)
            .build();
        registry.build_consumer(&consumer).await?.start().await?;
    }

    let producer = registry
        .build_producer(&ProducerConfig::builder().kind(MEMORY).client_id("demo").build())
        .await?;

    let machine = Arc::new(
        RetryStateMachine::builder()
            .store(store.clone())
            .escalation(Arc::new(ProducerEscalation::new(producer.clone(), MANUAL)))
            .config(config)
            .build(),
    );
    let scheduler = Arc::new(
        RetryScheduler::builder()
            .machine(machine)
            .redeliverer(Arc::new(ProducerRedeliverer::new(
                producer.clone(),
                Arc::new(JsonSerializer),
            )))
            .config(SchedulerConfig {
                poll_interval: Duration::from_millis(200),
                ..Default::default()
            })
            .build(),
    );
    let handle = scheduler.start();

    for (i, amount) in [120, 80, 45].into_iter().enumerate() {
        let order = OrderPaid {
            order_no: format!("SO-{:04}", i + 1),
            amount,
        };
        let envelope = MessageEnvelope::new(order.order_no.as_str(), "order", serde_json::to_value(&order)?);
        producer.send(ORDERS, envelope).await?;
    }

    tokio::time::sleep(Duration::from_secs(1)).await;

    handle.shutdown();
    handle.join().await;

    for record in store.records() {
        info!(
            record_id = ?record.id,
            business_id = %record.business_id,
            status = %record.status,
            retried = record.current_retried_count,
            "event record"
        );
    }

    registry.destroy().await;
    Ok(())
}
