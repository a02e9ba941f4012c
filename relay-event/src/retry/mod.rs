//! 重试子系统（retry）
//!
//! - `RetryStateMachine`：持久化、加锁、退避重试、转人工与完成；
//! - `backoff`：有限重试的固定阶梯退避表；
//! - `EscalationPublisher`：重试耗尽时的人工处理通知（尽力而为）；
//! - `RetryScheduler`：周期拉取到期记录并通过 `Redeliverer` 重新投递。
//!
pub mod backoff;
pub mod escalation;
pub mod machine;
pub mod scheduler;

pub use backoff::{backoff, base_retry_delay};
pub use escalation::{EscalationPublisher, LogEscalation};
pub use machine::RetryStateMachine;
pub use scheduler::{
    PassReport, Redelivered, Redeliverer, RetryScheduler, SchedulerConfig, SchedulerHandle,
};
