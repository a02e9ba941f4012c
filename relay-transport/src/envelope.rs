use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 路由键（字符串）
pub const ROUTING_KEY: &str = "routing.key";
/// 指定分区（整数）
pub const ROUTING_PARTITION: &str = "routing.partition";

/// 消息信封（MessageEnvelope）
///
/// 传输层的基本单元：业务标识、传输层分配的消息标识、强类型载荷，
/// 以及一个开放的属性表，供具体后端携带路由提示等元数据。
/// 信封本身不做持久化，持久形态是 `EventRecord`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    business_id: String,
    business_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    payload: T,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    properties: HashMap<String, Value>,
}

impl<T> MessageEnvelope<T> {
    pub fn new(business_id: impl Into<String>, business_type: impl Into<String>, payload: T) -> Self {
        Self {
            business_id: business_id.into(),
            business_type: business_type.into(),
            message_id: None,
            payload,
            properties: HashMap::new(),
        }
    }

    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    pub fn business_type(&self) -> &str {
        &self.business_type
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub(crate) fn set_message_id(&mut self, message_id: impl Into<String>) {
        self.message_id = Some(message_id.into());
    }

    pub fn with_bool(self, key: impl Into<String>, value: bool) -> Self {
        self.with_property(key, Value::Bool(value))
    }

    pub fn with_int(self, key: impl Into<String>, value: i32) -> Self {
        self.with_property(key, Value::from(value))
    }

    pub fn with_long(self, key: impl Into<String>, value: i64) -> Self {
        self.with_property(key, Value::from(value))
    }

    pub fn with_string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_property(key, Value::String(value.into()))
    }

    fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    // 缺失或类型不符时返回 None

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.properties.get(key)?.as_bool()
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.properties
            .get(key)?
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        self.properties.get(key)?.as_i64()
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.properties.get(key)?.as_str()
    }

    pub fn routing_key(&self) -> Option<&str> {
        self.get_string(ROUTING_KEY)
    }

    pub fn routing_partition(&self) -> Option<i32> {
        self.get_int(ROUTING_PARTITION)
    }
}

/// 分区型传输的消息标识：`{topic}-{partition}@{offset}`
pub fn partitioned_message_id(topic: &str, partition: i32, offset: i64) -> String {
    format!("{topic}-{partition}@{offset}")
}
