//! 传输后端协议（Backend / Producer / Consumer）
//!
//! 每个后端以唯一的类型名登记到 `TransportRegistry`，负责构造生产者与消费者，
//! 并在进程关闭时释放自身资源（断开连接、刷新缓冲等）。
//! 具体的线上协议（字节如何到达某个中间件）由后端自行实现。
//!
use crate::envelope::MessageEnvelope;
use crate::error::TransportResult;
use crate::pipeline::Pipeline;
use crate::strategy::DeliveryPriority;
use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// 管道中的投递单元：目的地 + 信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub destination: String,
    pub envelope: MessageEnvelope<Value>,
}

#[derive(Debug, Clone, Builder)]
pub struct ProducerConfig {
    /// 后端类型名
    #[builder(into)]
    pub kind: String,
    #[builder(into)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Builder)]
pub struct ConsumerConfig {
    /// 后端类型名
    #[builder(into)]
    pub kind: String,
    /// 订阅的目的地（topic / queue）
    #[builder(into)]
    pub destination: String,
    /// 分发表中的消息类型描述符
    #[builder(into)]
    pub message_type: String,
    #[builder(default)]
    pub priority: DeliveryPriority,
    /// 同时处理的分区批次上限
    #[builder(default = 1)]
    pub concurrency: usize,
}

#[async_trait]
pub trait Producer: Send + Sync {
    /// 发送到指定目的地
    async fn send(&self, destination: &str, envelope: MessageEnvelope<Value>) -> TransportResult<()>;
}

#[async_trait]
pub trait Consumer: Send + Sync {
    async fn start(&self) -> TransportResult<()>;

    async fn stop(&self) -> TransportResult<()>;
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// 唯一类型名，例如 "memory"
    fn type_name(&self) -> &str;

    async fn build_producer(
        &self,
        config: &ProducerConfig,
        pipeline: Arc<Pipeline<Delivery>>,
    ) -> TransportResult<Arc<dyn Producer>>;

    async fn build_consumer(
        &self,
        config: &ConsumerConfig,
        pipeline: Arc<Pipeline<Delivery>>,
    ) -> TransportResult<Arc<dyn Consumer>>;

    /// 释放后端资源；由注册表在关闭时恰好调用一次
    async fn destroy(&self) -> TransportResult<()>;
}

#[async_trait]
impl<T> Producer for Arc<T>
where
    T: Producer + ?Sized,
{
    async fn send(&self, destination: &str, envelope: MessageEnvelope<Value>) -> TransportResult<()> {
        (**self).send(destination, envelope).await
    }
}
