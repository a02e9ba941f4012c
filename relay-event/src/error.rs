//! 事件侧统一错误定义
//!
//! 区分校验、持久化、锁竞争、版本冲突等错误类别，调用方可据此决定是跳过、
//! 重试还是上报。存储协议自身的错误码由 `StoreError` 表达，在状态机中被
//! 归一化为 `EventError`。
//!
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 事件侧统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventError {
    // --- 入参校验 ---
    #[error("validation error: {reason}")]
    Validation { reason: String },

    // --- 存储 ---
    #[error("persistence error: {reason}")]
    Persistence {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("event record not found: {id}")]
    RecordNotFound { id: i64 },
    #[error("lock contention: record={id}")]
    LockContention { id: i64 },
    #[error("version conflict: record={id}, expected={expected}")]
    VersionConflict { id: i64, expected: i64 },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 协作方 ---
    #[error("escalation publish error: {reason}")]
    Publish { reason: String },

    // --- 配置 ---
    #[error("invalid config: key={key}, reason={reason}")]
    Config { key: String, reason: String },
}

impl EventError {
    pub fn validation(reason: impl Into<String>) -> Self {
        EventError::Validation {
            reason: reason.into(),
        }
    }

    /// 包装底层错误，保留原始原因便于诊断
    pub fn persistence<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EventError::Persistence {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn publish(reason: impl Into<String>) -> Self {
        EventError::Publish {
            reason: reason.into(),
        }
    }

    /// 是否为“其他调度者正在处理”一类的可跳过错误
    pub fn is_contended(&self) -> bool {
        matches!(
            self,
            EventError::LockContention { .. } | EventError::VersionConflict { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type EventResult<T> = Result<T, EventError>;
