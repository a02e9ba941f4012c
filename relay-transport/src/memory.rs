//! 内存传输后端（"memory"）
//!
//! 生产者把投递写入本后端的 `Pipeline`（队列满时挂起）；首个消费者启动时
//! 开启一个分发循环，从队列取出投递并按目的地路由到对应消费者的策略。
//! `destroy` 取消所有由本后端启动的循环。
//!
use crate::backend::{Backend, Consumer, ConsumerConfig, Delivery, Producer, ProducerConfig};
use crate::envelope::MessageEnvelope;
use crate::error::{TransportError, TransportResult};
use crate::pipeline::Pipeline;
use crate::strategy::{ConsumeStrategy, StrategyTable};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const MEMORY: &str = "memory";

struct Route {
    config: Arc<ConsumerConfig>,
    strategy: Arc<dyn ConsumeStrategy>,
}

#[derive(Default)]
struct Shared {
    routes: DashMap<String, Route>,
    token: CancellationToken,
    dispatch_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn ensure_loop(self: &Arc<Self>, pipeline: Arc<Pipeline<Delivery>>) {
        let mut slot = self.dispatch_loop.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() || self.token.is_cancelled() {
            return;
        }

        let shared = self.clone();
        *slot = Some(tokio::spawn(async move { shared.run(pipeline).await }));
    }

    async fn run(&self, pipeline: Arc<Pipeline<Delivery>>) {
        loop {
            let delivery = tokio::select! {
                _ = self.token.cancelled() => break,
                item = pipeline.take() => match item {
                    Some(d) => d,
                    None => break,
                },
            };
            self.route(delivery).await;
        }
        debug!("memory dispatch loop stopped");
    }

    async fn route(&self, delivery: Delivery) {
        let Some((config, strategy)) = self
            .routes
            .get(&delivery.destination)
            .map(|r| (r.config.clone(), r.strategy.clone()))
        else {
            warn!(destination = %delivery.destination, "no consumer for destination, delivery dropped");
            return;
        };

        let message_id = delivery.envelope.message_id().map(str::to_owned);
        let raw = match serde_json::to_vec(&delivery.envelope) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(destination = %delivery.destination, error = %err, "encode delivery failed");
                return;
            }
        };

        if let Err(err) = strategy.consume(&config, message_id.clone(), &raw).await {
            warn!(
                destination = %delivery.destination,
                message_id = ?message_id,
                error = %err,
                "memory delivery failed"
            );
        }
    }
}

pub struct MemoryBackend {
    strategies: Arc<StrategyTable>,
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new(strategies: Arc<StrategyTable>) -> Self {
        Self {
            strategies,
            shared: Arc::default(),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn type_name(&self) -> &str {
        MEMORY
    }

    async fn build_producer(
        &self,
        _config: &ProducerConfig,
        pipeline: Arc<Pipeline<Delivery>>,
    ) -> TransportResult<Arc<dyn Producer>> {
        Ok(Arc::new(MemoryProducer { pipeline }))
    }

    async fn build_consumer(
        &self,
        config: &ConsumerConfig,
        pipeline: Arc<Pipeline<Delivery>>,
    ) -> TransportResult<Arc<dyn Consumer>> {
        Ok(Arc::new(MemoryConsumer {
            config: Arc::new(config.clone()),
            strategy: self.strategies.select(config.priority),
            pipeline,
            shared: self.shared.clone(),
        }))
    }

    async fn destroy(&self) -> TransportResult<()> {
        self.shared.token.cancel();
        self.shared.routes.clear();

        let task = self
            .shared
            .dispatch_loop
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.await
                .map_err(|e| TransportError::Client(e.to_string()))?;
        }

        info!(kind = MEMORY, "transport backend destroyed");
        Ok(())
    }
}

struct MemoryProducer {
    pipeline: Arc<Pipeline<Delivery>>,
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn send(&self, destination: &str, mut envelope: MessageEnvelope<Value>) -> TransportResult<()> {
        if envelope.message_id().is_none() {
            envelope.set_message_id(Uuid::new_v4().to_string());
        }

        self.pipeline
            .push(Delivery {
                destination: destination.to_string(),
                envelope,
            })
            .await
    }
}

struct MemoryConsumer {
    config: Arc<ConsumerConfig>,
    strategy: Arc<dyn ConsumeStrategy>,
    pipeline: Arc<Pipeline<Delivery>>,
    shared: Arc<Shared>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn start(&self) -> TransportResult<()> {
        match self.shared.routes.entry(self.config.destination.clone()) {
            Entry::Occupied(e) => {
                return Err(TransportError::AlreadyRegistered {
                    descriptor: e.key().clone(),
                });
            }
            Entry::Vacant(e) => {
                e.insert(Route {
                    config: self.config.clone(),
                    strategy: self.strategy.clone(),
                });
            }
        }

        self.shared.ensure_loop(self.pipeline.clone());
        info!(destination = %self.config.destination, "memory consumer started");
        Ok(())
    }

    async fn stop(&self) -> TransportResult<()> {
        self.shared.routes.remove(&self.config.destination);
        info!(destination = %self.config.destination, "memory consumer stopped");
        Ok(())
    }
}
