//! 有界缓冲队列（Pipeline）
//!
//! 每种传输后端一条，生产侧与消费侧共享。队列满时 `push` 会挂起等待，
//! 把压力传导给上游调用方，既不丢弃消息也不无限增长内存。
//! `close` 之后入队返回 `PipelineClosed`，挂起中的出队方立即得到 `None`。
//!
use crate::error::{TransportError, TransportResult};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Pipeline<T> {
    kind: String,
    capacity: usize,
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    shut: CancellationToken,
}

impl<T: Send> Pipeline<T> {
    pub fn new(kind: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            kind: kind.into(),
            capacity,
            tx,
            rx: Mutex::new(rx),
            shut: CancellationToken::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 入队；队列已满时挂起直到有空位
    pub async fn push(&self, item: T) -> TransportResult<()> {
        if self.is_closed() {
            return Err(self.closed());
        }
        tokio::select! {
            biased;
            _ = self.shut.cancelled() => Err(self.closed()),
            sent = self.tx.send(item) => sent.map_err(|_| self.closed()),
        }
    }

    /// 非阻塞入队；队列已满时返回 `PipelineFull`
    pub fn try_push(&self, item: T) -> TransportResult<()> {
        if self.is_closed() {
            return Err(self.closed());
        }
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::PipelineFull {
                kind: self.kind.clone(),
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => self.closed(),
        })
    }

    /// 出队；队列为空时挂起，关闭后返回 `None`
    pub async fn take(&self) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.shut.cancelled() => None,
            item = async { self.rx.lock().await.recv().await } => item,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shut.is_cancelled()
    }

    /// 关闭队列并丢弃全部积压，返回丢弃数量
    ///
    /// 先唤醒挂起的出队方使其释放接收端，再等待接收端并排空，
    /// 因此返回时队列一定为空。
    pub async fn close(&self) -> usize {
        self.shut.cancel();

        let mut rx = self.rx.lock().await;
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(kind = %self.kind, dropped, "pipeline cleared");
        }
        dropped
    }

    fn closed(&self) -> TransportError {
        TransportError::PipelineClosed {
            kind: self.kind.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn push_blocks_at_capacity_until_take() {
        let pipeline = Arc::new(Pipeline::new("memory", 2));
        pipeline.push(1).await.unwrap();
        pipeline.push(2).await.unwrap();
        assert_eq!(pipeline.len(), 2);

        let p = pipeline.clone();
        let blocked = tokio::spawn(async move { p.push(3).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        assert_eq!(pipeline.take().await, Some(1));
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("push should resume once space frees")
            .unwrap()
            .unwrap();

        assert_eq!(pipeline.take().await, Some(2));
        assert_eq!(pipeline.take().await, Some(3));
        assert!(pipeline.is_empty());
    }

    #[tokio::test]
    async fn try_push_reports_full() {
        let pipeline = Pipeline::new("memory", 1);
        pipeline.try_push("a").unwrap();

        let err = pipeline.try_push("b").unwrap_err();
        assert!(matches!(
            err,
            TransportError::PipelineFull { capacity: 1, .. }
        ));
    }

    #[tokio::test]
    async fn close_drops_backlog_and_rejects_pushes() {
        let pipeline = Pipeline::new("memory", 8);
        for i in 0..5 {
            pipeline.push(i).await.unwrap();
        }

        assert_eq!(pipeline.close().await, 5);
        assert!(pipeline.is_empty());
        assert!(pipeline.is_closed());
        assert_eq!(pipeline.capacity(), 8);

        assert!(matches!(
            pipeline.push(6).await,
            Err(TransportError::PipelineClosed { .. })
        ));
        assert!(matches!(
            pipeline.try_push(7),
            Err(TransportError::PipelineClosed { .. })
        ));
        assert_eq!(pipeline.take().await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_wakes_parked_taker_and_drains() {
        let pipeline = Arc::new(Pipeline::<u32>::new("memory", 4));

        let p = pipeline.clone();
        let taker = tokio::spawn(async move { p.take().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!taker.is_finished());

        let dropped = tokio::time::timeout(Duration::from_secs(1), pipeline.close())
            .await
            .expect("close should not wait on a parked taker");
        assert_eq!(dropped, 0);

        let taken = tokio::time::timeout(Duration::from_secs(1), taker)
            .await
            .expect("parked taker should be released")
            .unwrap();
        assert_eq!(taken, None);
    }
}
