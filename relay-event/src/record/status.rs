use crate::error::EventError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 事件记录状态
///
/// 状态只会单调推进，唯一例外是 WAITING/PROCESSING 之间的重试循环；
/// SUCCESS 与 MANUAL_WAIT 对状态机而言是终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// 等待处理
    #[default]
    Waiting,
    /// 处理中（重试循环）
    Processing,
    /// 处理成功
    Success,
    /// 重试耗尽，等待人工处理
    ManualWait,
}

impl EventStatus {
    /// 存储层使用的状态码
    pub const fn code(&self) -> i16 {
        match self {
            EventStatus::Waiting => 0,
            EventStatus::Processing => 1,
            EventStatus::Success => 2,
            EventStatus::ManualWait => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Success | EventStatus::ManualWait)
    }
}

impl TryFrom<i16> for EventStatus {
    type Error = EventError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(EventStatus::Waiting),
            1 => Ok(EventStatus::Processing),
            2 => Ok(EventStatus::Success),
            3 => Ok(EventStatus::ManualWait),
            other => Err(EventError::validation(format!(
                "unknown event status code: {other}"
            ))),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventStatus::Waiting => "WAITING",
            EventStatus::Processing => "PROCESSING",
            EventStatus::Success => "SUCCESS",
            EventStatus::ManualWait => "MANUAL_WAIT",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip() {
        for status in [
            EventStatus::Waiting,
            EventStatus::Processing,
            EventStatus::Success,
            EventStatus::ManualWait,
        ] {
            assert_eq!(EventStatus::try_from(status.code()).unwrap(), status);
        }
        assert!(EventStatus::try_from(9).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!EventStatus::Waiting.is_terminal());
        assert!(!EventStatus::Processing.is_terminal());
        assert!(EventStatus::Success.is_terminal());
        assert!(EventStatus::ManualWait.is_terminal());
    }

    #[test]
    fn serde_uses_upper_case_names() {
        let json = serde_json::to_string(&EventStatus::ManualWait).unwrap();
        assert_eq!(json, "\"MANUAL_WAIT\"");
    }
}
