//! 传输注册表（TransportRegistry）
//!
//! 进程内唯一的后端目录：启动时按显式的后端列表一次性登记，
//! 每种后端分配一条有界 `Pipeline`；之后只读共享，直到 `destroy` 统一释放。
//!
use crate::backend::{Backend, ConsumerConfig, Consumer, Delivery, Producer, ProducerConfig};
use crate::error::{TransportError, TransportResult};
use crate::pipeline::Pipeline;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

pub struct TransportRegistry {
    backends: DashMap<String, Arc<dyn Backend>>,
    pipelines: DashMap<String, Arc<Pipeline<Delivery>>>,
    destroyed: AtomicBool,
}

impl TransportRegistry {
    /// 登记全部后端；类型名重复时释放已登记的后端并返回 `DuplicateTransport`
    pub async fn init<I>(pipeline_capacity: usize, backends: I) -> TransportResult<Self>
    where
        I: IntoIterator<Item = Arc<dyn Backend>>,
    {
        let registry = Self {
            backends: DashMap::new(),
            pipelines: DashMap::new(),
            destroyed: AtomicBool::new(false),
        };

        for backend in backends {
            if let Err(err) = registry.register(backend, pipeline_capacity) {
                registry.destroy().await;
                return Err(err);
            }
        }

        info!(
            backends = registry.backends.len(),
            pipeline_capacity, "transport registry initialized"
        );
        Ok(registry)
    }

    fn register(&self, backend: Arc<dyn Backend>, capacity: usize) -> TransportResult<()> {
        let kind = backend.type_name().to_string();
        match self.backends.entry(kind.clone()) {
            Entry::Occupied(_) => return Err(TransportError::DuplicateTransport { kind }),
            Entry::Vacant(e) => {
                e.insert(backend);
            }
        }

        self.pipelines
            .insert(kind.clone(), Arc::new(Pipeline::new(kind.clone(), capacity)));
        info!(kind = %kind, "transport backend registered");
        Ok(())
    }

    pub fn kinds(&self) -> Vec<String> {
        self.backends.iter().map(|e| e.key().clone()).collect()
    }

    /// 构造生产者；调用方负责其生命周期
    pub async fn build_producer(&self, config: &ProducerConfig) -> TransportResult<Arc<dyn Producer>> {
        let backend = self.backend(&config.kind)?;
        let pipeline = self.get_pipeline(&config.kind)?;
        backend.build_producer(config, pipeline).await
    }

    /// 构造消费者；调用方负责其生命周期
    pub async fn build_consumer(&self, config: &ConsumerConfig) -> TransportResult<Arc<dyn Consumer>> {
        let backend = self.backend(&config.kind)?;
        let pipeline = self.get_pipeline(&config.kind)?;
        backend.build_consumer(config, pipeline).await
    }

    /// 获取某类后端的缓冲队列，重复调用返回同一实例
    pub fn get_pipeline(&self, kind: &str) -> TransportResult<Arc<Pipeline<Delivery>>> {
        self.pipelines
            .get(kind)
            .map(|p| p.clone())
            .ok_or_else(|| unsupported(kind))
    }

    /// 释放全部后端并清空注册表；重复调用为空操作
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let backends: Vec<(String, Arc<dyn Backend>)> = self
            .backends
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for (kind, backend) in backends {
            if let Err(err) = backend.destroy().await {
                warn!(kind = %kind, error = %err, "transport backend teardown failed");
            }
        }

        let pipelines: Vec<_> = self.pipelines.iter().map(|e| e.value().clone()).collect();
        for pipeline in pipelines {
            pipeline.close().await;
        }
        self.pipelines.clear();
        self.backends.clear();

        info!("transport registry destroyed");
    }

    fn backend(&self, kind: &str) -> TransportResult<Arc<dyn Backend>> {
        self.backends
            .get(kind)
            .map(|b| b.clone())
            .ok_or_else(|| unsupported(kind))
    }
}

fn unsupported(kind: &str) -> TransportError {
    TransportError::UnsupportedTransport {
        kind: kind.to_string(),
    }
}
