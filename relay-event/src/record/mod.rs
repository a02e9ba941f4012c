//! 事件记录（record）
//!
//! - `EventRecord`：持久化的事件行，承载状态、重试预算与下一次重试时间；
//! - `EventRecordPatch`：按标识的部分更新；
//! - `RuntimeEvent`：调用方持有的运行时事件，持久化后回填记录标识；
//! - `EventStatus`：WAITING → PROCESSING → SUCCESS / MANUAL_WAIT。

mod event_record;
mod runtime_event;
mod status;

pub use event_record::{EventRecord, EventRecordPatch};
pub use runtime_event::RuntimeEvent;
pub use status::EventStatus;
