//! 传输层（relay-transport）
//!
//! 在 `relay-event` 之上提供与具体中间件无关的生产/消费能力：
//! - 消息信封（`envelope`）与每种后端一条的有界缓冲队列（`pipeline`）；
//! - 后端协议（`backend`）与进程级传输注册表（`registry`）；
//! - 按类型描述符解码并调用监听器的分发表（`dispatch`）；
//! - 按投递优先级选择的消费策略（`strategy`）；
//! - 分区有序消费单元与批次派发（`consumer`）；
//! - 内存后端（`memory`），以及接入重试状态机的协作方实现（`adapters`）。
//!
pub mod adapters;
pub mod backend;
pub mod consumer;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod registry;
pub mod strategy;
