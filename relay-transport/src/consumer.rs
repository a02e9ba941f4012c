//! 分区有序消费（PartitionUnit / BatchDispatcher）
//!
//! 一个工作单元 = 同一 topic-partition 的一批已拉取记录，交给唯一的任务处理：
//! 批内严格顺序执行，每条记录在策略返回后同步提交 `offset + 1`，再处理下一条。
//! 分区在派发前必须已被暂停，以免下一次拉取把同一批记录交给其他任务；
//! 最后一条提交完成后恢复分区。
//!
//! 中途失败（策略或提交）时：回退到首个未提交的位置、恢复分区并返回错误，
//! 剩余记录由下一次拉取重新投递。
//!
use crate::backend::ConsumerConfig;
use crate::envelope::partitioned_message_id;
use crate::error::{TransportError, TransportResult};
use crate::strategy::{ConsumeStrategy, StrategyTable};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// 已拉取的单条记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRecord {
    pub partition: TopicPartition,
    pub offset: i64,
    pub payload: Vec<u8>,
}

impl ConsumerRecord {
    pub fn message_id(&self) -> String {
        partitioned_message_id(&self.partition.topic, self.partition.partition, self.offset)
    }
}

/// 分区型消费客户端
///
/// 拉取/提交不可并发调用：分区在派发前暂停，由持有它的任务独占提交。
#[async_trait]
pub trait PartitionClient: Send + Sync {
    async fn pause(&self, partitions: &[TopicPartition]) -> TransportResult<()>;

    async fn resume(&self, partitions: &[TopicPartition]) -> TransportResult<()>;

    /// 同步提交；`offset` 为下一条待消费的位置
    async fn commit_sync(&self, partition: &TopicPartition, offset: i64) -> TransportResult<()>;

    async fn seek(&self, partition: &TopicPartition, offset: i64) -> TransportResult<()>;
}

#[derive(Clone)]
pub struct PartitionUnit {
    client: Arc<dyn PartitionClient>,
    strategy: Arc<dyn ConsumeStrategy>,
    config: Arc<ConsumerConfig>,
}

impl PartitionUnit {
    pub fn new(
        client: Arc<dyn PartitionClient>,
        strategy: Arc<dyn ConsumeStrategy>,
        config: Arc<ConsumerConfig>,
    ) -> Self {
        Self {
            client,
            strategy,
            config,
        }
    }

    /// 顺序处理一批记录，返回已提交的条数
    pub async fn run(
        &self,
        partition: TopicPartition,
        records: Vec<ConsumerRecord>,
    ) -> TransportResult<usize> {
        if let Err(err) = check_batch(&partition, &records) {
            self.resume(&partition).await;
            return Err(err);
        }

        for (committed, record) in records.iter().enumerate() {
            if let Err(err) = self.handle(&partition, record).await {
                error!(
                    partition = %partition,
                    offset = record.offset,
                    committed,
                    error = %err,
                    "partition batch aborted"
                );
                // 回退到首个未提交的位置
                if let Err(seek_err) = self.client.seek(&partition, record.offset).await {
                    warn!(partition = %partition, offset = record.offset, error = %seek_err, "seek failed");
                }
                self.resume(&partition).await;
                return Err(err);
            }
        }

        self.client.resume(std::slice::from_ref(&partition)).await?;
        debug!(partition = %partition, committed = records.len(), "partition batch completed");
        Ok(records.len())
    }

    async fn handle(&self, partition: &TopicPartition, record: &ConsumerRecord) -> TransportResult<()> {
        self.strategy
            .consume(&self.config, Some(record.message_id()), &record.payload)
            .await?;

        let next = record.offset + 1;
        self.client.commit_sync(partition, next).await?;
        debug!(partition = %partition, offset = next, "offset committed");
        Ok(())
    }

    async fn resume(&self, partition: &TopicPartition) {
        if let Err(err) = self.client.resume(std::slice::from_ref(partition)).await {
            warn!(partition = %partition, error = %err, "resume failed");
        }
    }
}

fn check_batch(partition: &TopicPartition, records: &[ConsumerRecord]) -> TransportResult<()> {
    if let Some(stray) = records.iter().find(|r| &r.partition != partition) {
        return Err(TransportError::InvalidBatch {
            reason: format!("record of {} in batch for {partition}", stray.partition),
        });
    }
    if records.windows(2).any(|w| w[0].offset >= w[1].offset) {
        return Err(TransportError::InvalidBatch {
            reason: format!("offsets of {partition} are not strictly ascending"),
        });
    }
    Ok(())
}

/// 批次派发：按分区分组（保持分区内顺序），暂停相关分区，
/// 每个分区交给一个 `PartitionUnit`，并发数受 `concurrency` 限制。
pub struct BatchDispatcher {
    client: Arc<dyn PartitionClient>,
    unit: PartitionUnit,
    permits: Arc<Semaphore>,
}

impl BatchDispatcher {
    pub fn new(
        client: Arc<dyn PartitionClient>,
        strategies: &StrategyTable,
        config: ConsumerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let strategy = strategies.select(config.priority);
        let unit = PartitionUnit::new(client.clone(), strategy, Arc::new(config));
        Self {
            client,
            unit,
            permits,
        }
    }

    /// 处理一次拉取的批次，返回已提交总条数；任一分区失败时返回首个错误
    pub async fn dispatch(&self, records: Vec<ConsumerRecord>) -> TransportResult<usize> {
        let groups = group_by_partition(records);
        if groups.is_empty() {
            return Ok(0);
        }

        let partitions: Vec<TopicPartition> = groups.iter().map(|(p, _)| p.clone()).collect();
        self.client.pause(&partitions).await?;

        let mut heads = Vec::with_capacity(groups.len());
        let mut tasks = Vec::with_capacity(groups.len());
        for (partition, batch) in groups {
            heads.push((partition.clone(), batch.first().map(|r| r.offset)));

            let unit = self.unit.clone();
            let permits = self.permits.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| TransportError::Client(e.to_string()))?;
                unit.run(partition, batch).await
            }));
        }

        let mut committed = 0;
        let mut first_err = None;
        for ((partition, head), joined) in heads.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(Ok(n)) => committed += n,
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                }
                // 任务异常退出时分区仍处于暂停状态，由这里回退并恢复
                Err(join_err) => {
                    error!(partition = %partition, error = %join_err, "partition task aborted");
                    self.recover(&partition, head).await;
                    first_err.get_or_insert(TransportError::Client(format!(
                        "partition {partition} task aborted: {join_err}"
                    )));
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(committed),
        }
    }

    /// 回退到本批首条记录并恢复分区，已提交的记录会被再次投递
    async fn recover(&self, partition: &TopicPartition, head: Option<i64>) {
        if let Some(offset) = head {
            if let Err(err) = self.client.seek(partition, offset).await {
                warn!(partition = %partition, offset, error = %err, "seek failed");
            }
        }
        if let Err(err) = self.client.resume(std::slice::from_ref(partition)).await {
            warn!(partition = %partition, error = %err, "resume failed");
        }
    }
}

fn group_by_partition(records: Vec<ConsumerRecord>) -> Vec<(TopicPartition, Vec<ConsumerRecord>)> {
    let mut groups: Vec<(TopicPartition, Vec<ConsumerRecord>)> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|(p, _)| *p == record.partition) {
            Some((_, batch)) => batch.push(record),
            None => groups.push((record.partition.clone(), vec![record])),
        }
    }
    groups
}
