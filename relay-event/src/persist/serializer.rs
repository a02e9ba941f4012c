use crate::{error::EventResult, record::RuntimeEvent};

/// 事件序列化能力：将运行时事件转为持久化的字节内容
pub trait EventSerializer: Send + Sync {
    fn serialize(&self, event: &RuntimeEvent) -> EventResult<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> EventResult<RuntimeEvent>;
}

/// 基于 serde_json 的默认实现
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl EventSerializer for JsonSerializer {
    fn serialize(&self, event: &RuntimeEvent) -> EventResult<Vec<u8>> {
        Ok(serde_json::to_vec(event)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> EventResult<RuntimeEvent> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
