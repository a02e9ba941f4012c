//! 可靠投递事件层（relay-event）
//!
//! 为“至少一次”投递提供持久化事件与重试状态机：
//! - 事件记录（`record`）：持久化行、部分更新与运行时事件；
//! - 存储协议（`persist`）：行级锁、版本比较更新与到期拉取，附内存实现；
//! - 重试（`retry`）：状态机、固定阶梯退避、人工处理通知与周期调度器；
//! - 配置（`config`）：以键值源加载进程级配置。
//!
//! 本 crate 不关心具体的消息中间件，传输与消费侧由 `relay-transport` 提供，
//! 并通过 `Redeliverer` 与 `EscalationPublisher` 两个协作方接入。
//!
//! 典型用法：
//! 1. 实现 `EventStore`（或使用 `InMemoryEventStore`）；
//! 2. 用 `RetryStateMachine::builder()` 组装状态机；
//! 3. 处理失败时调用 `persist`，之后由 `RetryScheduler` 按退避表重新投递。
//!
pub mod config;
pub mod error;
pub mod persist;
pub mod record;
pub mod retry;
