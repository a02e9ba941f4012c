use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 运行时事件：持久化之前/之中的内存形态
///
/// 由调用方独占持有，状态机不会保留它。持久化成功后仅回填记录标识，
/// 用于向状态机回报处理结果，不代表对记录的所有权。
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct RuntimeEvent {
    #[builder(into)]
    business_id: String,
    #[builder(into)]
    business_type: String,
    /// 事件分组/类型分类
    #[builder(into)]
    group: String,
    /// 序列化前的事件内容
    payload: Value,
    /// 是否要求持久化
    #[builder(default = true)]
    persistent: bool,
    /// 重试次数覆盖，0 表示使用配置的默认值
    #[builder(default)]
    retry: i32,
    #[serde(skip)]
    #[builder(skip)]
    record_id: Option<i64>,
}

impl RuntimeEvent {
    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    pub fn business_type(&self) -> &str {
        &self.business_type
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn retry(&self) -> i32 {
        self.retry
    }

    /// 已持久化记录的标识（若有）
    pub fn record_id(&self) -> Option<i64> {
        self.record_id
    }

    pub(crate) fn attach_record(&mut self, id: i64) {
        self.record_id = Some(id);
    }
}
