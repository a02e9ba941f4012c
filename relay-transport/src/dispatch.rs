use crate::envelope::MessageEnvelope;
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_core::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// 消息监听器
///
/// 以信封的强类型载荷为输入，业务失败以 `anyhow::Error` 返回，
/// 由调用方的消费策略决定后续处理。
#[async_trait]
pub trait MessageListener<T>: Send + Sync
where
    T: Send + 'static,
{
    async fn on_message(&self, envelope: MessageEnvelope<T>) -> anyhow::Result<()>;
}

type ListenerFn = Arc<
    dyn Fn(Option<String>, &[u8]) -> TransportResult<BoxFuture<'static, anyhow::Result<()>>>
        + Send
        + Sync,
>;

/// 基于类型描述符的分发表
/// - 启动时通过 `register` 为每种消息类型登记监听器
/// - 运行时按描述符解码原始载荷并调用对应监听器
pub struct Dispatcher {
    listeners: DashMap<String, ListenerFn>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            listeners: DashMap::new(),
        }
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记监听器；同一描述符重复登记返回 `AlreadyRegistered`
    pub fn register<T, L>(&self, descriptor: impl Into<String>, listener: Arc<L>) -> TransportResult<()>
    where
        T: DeserializeOwned + Send + 'static,
        L: MessageListener<T> + 'static,
    {
        let descriptor = descriptor.into();
        let entry = match self.listeners.entry(descriptor) {
            Entry::Occupied(e) => {
                return Err(TransportError::AlreadyRegistered {
                    descriptor: e.key().clone(),
                });
            }
            Entry::Vacant(e) => e,
        };

        let f: ListenerFn = Arc::new(move |message_id: Option<String>, raw: &[u8]| {
            let mut envelope: MessageEnvelope<T> = serde_json::from_slice(raw)?;
            if let Some(id) = message_id {
                envelope.set_message_id(id);
            }

            let listener = listener.clone();
            let fut: BoxFuture<'static, anyhow::Result<()>> =
                Box::pin(async move { listener.on_message(envelope).await });
            Ok(fut)
        });

        entry.insert(f);
        Ok(())
    }

    pub fn contains(&self, descriptor: &str) -> bool {
        self.listeners.contains_key(descriptor)
    }

    /// 解码并调用监听器
    ///
    /// 监听器返回的错误以 `TransportError::Listener` 交还调用方。
    pub async fn dispatch(
        &self,
        descriptor: &str,
        message_id: Option<String>,
        raw: &[u8],
    ) -> TransportResult<()> {
        let Some(f) = self.listeners.get(descriptor).map(|h| h.clone()) else {
            return Err(TransportError::HandlerNotFound {
                descriptor: descriptor.to_string(),
            });
        };

        (f)(message_id, raw)?
            .await
            .map_err(|err| TransportError::Listener {
                descriptor: descriptor.to_string(),
                reason: format!("{err:#}"),
            })
    }
}
