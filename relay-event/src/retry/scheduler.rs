//! 重试调度器（RetryScheduler）
//!
//! 周期性拉取到期记录并重新投递：
//! - 加锁（悲观模式），锁竞争时跳过本轮；
//! - 以租约认领记录，租约期内不会被再次拉取；
//! - 调用 `Redeliverer` 重新投递：同步完成则 `finish`，已移交则等待消费方回写结果，
//!   投递失败则 `fail`；
//! - 乐观模式下的版本冲突视为“他人正在处理”，直接丢弃；
//! - 提供关闭与等待的 `SchedulerHandle`。
//!
use super::RetryStateMachine;
use crate::error::{EventError, EventResult};
use crate::record::EventRecord;
use async_trait::async_trait;
use bon::Builder;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// 重新投递的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Redelivered {
    /// 已同步处理完成，记录直接置为成功
    Completed,
    /// 已交给传输层，处理结果由消费方通过 `finish_by_id`/`fail_by_id` 回写
    HandedOff,
}

/// 重新投递能力：将到期记录再次交给传输层
#[async_trait]
pub trait Redeliverer: Send + Sync {
    async fn redeliver(&self, record: &EventRecord) -> anyhow::Result<Redelivered>;
}

/// 调度器配置
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// 拉取到期记录的间隔
    pub poll_interval: Duration,
    /// 单轮最多处理的记录数
    pub batch_size: usize,
    /// 认领租约；移交后消费方未回写结果时，租约到期后再次投递
    pub claim_lease: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            batch_size: 100,
            claim_lease: Duration::from_secs(600),
        }
    }
}

/// 单轮调度结果
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub fetched: usize,
    pub finished: usize,
    pub handed_off: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

enum Outcome {
    Finished,
    HandedOff,
    Failed,
    Skipped,
}

#[derive(Builder)]
pub struct RetryScheduler {
    machine: Arc<RetryStateMachine>,
    redeliverer: Arc<dyn Redeliverer>,
    #[builder(default)]
    config: SchedulerConfig,
}

impl RetryScheduler {
    /// 启动周期调度，返回可用于关闭/等待的句柄
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let token = CancellationToken::new();
        let interval = self.config.poll_interval;
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.run_once().await {
                            error!(error = %err, "retry pass failed");
                        }
                    }
                }
            }
        });

        SchedulerHandle {
            token,
            task: Some(task),
        }
    }

    /// 执行一轮调度
    pub async fn run_once(&self) -> EventResult<PassReport> {
        let due = self
            .machine
            .store()
            .fetch_due(Utc::now(), self.config.batch_size)
            .await
            .map_err(|e| EventError::persistence("fetch due event records failed", e))?;

        let mut report = PassReport {
            fetched: due.len(),
            ..Default::default()
        };

        for record in due {
            let id = record.id;
            match self.process(record).await {
                Ok(Outcome::Finished) => report.finished += 1,
                Ok(Outcome::HandedOff) => report.handed_off += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(err) if err.is_contended() => {
                    debug!(record_id = ?id, error = %err, "event record handled elsewhere");
                    report.skipped += 1;
                }
                Err(err) => {
                    error!(record_id = ?id, error = %err, "event record retry failed");
                    report.errors += 1;
                }
            }
        }

        if report.fetched > 0 {
            debug!(?report, "retry pass completed");
        }
        Ok(report)
    }

    async fn process(&self, record: EventRecord) -> EventResult<Outcome> {
        let id = record.require_id()?;

        let current = match self.machine.lock(&record).await {
            Ok(Some(locked)) => locked,
            Ok(None) => record,
            Err(EventError::LockContention { .. }) => {
                warn!(record_id = id, "event record locked by another scheduler, skipped");
                return Ok(Outcome::Skipped);
            }
            Err(err) => return Err(err),
        };

        // 拉取与加锁之间可能已被他人处理
        if !current.is_due(Utc::now()) {
            self.machine.release(id).await;
            return Ok(Outcome::Skipped);
        }

        let claimed = match self.machine.claim(&current, self.config.claim_lease).await {
            Ok(claimed) => claimed,
            Err(err) => {
                self.machine.release(id).await;
                return Err(err);
            }
        };

        match self.redeliverer.redeliver(&claimed).await {
            Ok(Redelivered::Completed) => self.machine.finish(&claimed).await.map(|_| Outcome::Finished),
            Ok(Redelivered::HandedOff) => {
                debug!(
                    record_id = id,
                    lease_until = %claimed.next_retry_time,
                    "event record handed off"
                );
                Ok(Outcome::HandedOff)
            }
            Err(err) => {
                warn!(
                    record_id = id,
                    retried = claimed.current_retried_count,
                    error = %err,
                    "redeliver failed"
                );
                self.machine.fail(&claimed).await.map(|_| Outcome::Failed)
            }
        }
    }
}

/// 调度器运行句柄：用于优雅关闭与等待任务结束
pub struct SchedulerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
