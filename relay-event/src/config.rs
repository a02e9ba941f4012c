//! 配置（config）
//!
//! 配置读取被抽象为简单的 key → value 查找并带默认值（`ConfigSource`），
//! 具体来源可以是内存映射、环境变量或上层应用自己的配置中心。
//! `RelayConfig` 在进程启动时一次性解析，之后以值的形式传递给各组件。
//!
use crate::error::{EventError, EventResult};
use std::collections::HashMap;
use std::time::Duration;

pub const KEY_SYSTEM_ID: &str = "app.system_id";
pub const KEY_SHARD_COUNT: &str = "event.storage.shards";
pub const KEY_RETRY_TIMES: &str = "event.retry.times";
pub const KEY_INFINITE_RETRY_INTERVAL: &str = "event.retry.infinite_interval_secs";
pub const KEY_LOCK_OPTIMISTIC: &str = "event.lock.optimistic";
pub const KEY_PIPELINE_CAPACITY: &str = "transport.pipeline.capacity";

/// 配置来源：按 key 读取字符串/整数/布尔值，缺省时返回默认值
pub trait ConfigSource: Send + Sync {
    /// 原始取值
    fn get(&self, key: &str) -> Option<String>;

    fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn get_int(&self, key: &str, default: i64) -> EventResult<i64> {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                EventError::Config {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            }),
            None => Ok(default),
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> EventResult<bool> {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|e: std::str::ParseBoolError| {
                EventError::Config {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            }),
            None => Ok(default),
        }
    }
}

/// 内存配置，适用于测试与嵌入式装配
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(key.into(), value.to_string());
        self
    }
}

impl ConfigSource for MapConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl FromIterator<(String, String)> for MapConfig {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// 环境变量配置：`event.retry.times` 对应 `EVENT_RETRY_TIMES`
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfig;

impl EnvConfig {
    pub fn env_key(key: &str) -> String {
        key.chars()
            .map(|c| match c {
                '.' | '-' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect()
    }
}

impl ConfigSource for EnvConfig {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(Self::env_key(key)).ok()
    }
}

/// 事件记录加锁模式（进程级）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// 基于版本号的比较交换更新，不预先加锁
    Optimistic,
    /// 行级锁读取后无条件更新
    #[default]
    Pessimistic,
}

/// 可靠投递层配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// 事件所属系统名
    pub system_id: String,
    /// 分片数量，tag 在 `[0, shard_count)` 内均匀随机
    pub shard_count: u32,
    /// 默认重试次数，`-1` 表示无限重试
    pub default_retry_times: i32,
    /// 无限重试记录的重试间隔
    pub infinite_retry_interval: Duration,
    pub lock_mode: LockMode,
    /// 每种传输后端的缓冲队列容量
    pub pipeline_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            system_id: "webapp".to_string(),
            shard_count: 10,
            default_retry_times: 5,
            infinite_retry_interval: Duration::from_secs(600),
            lock_mode: LockMode::Pessimistic,
            pipeline_capacity: 50_000,
        }
    }
}

impl RelayConfig {
    /// 从配置来源解析，缺省项使用默认值
    pub fn from_source(source: &dyn ConfigSource) -> EventResult<Self> {
        let defaults = Self::default();

        let shard_count = source.get_int(KEY_SHARD_COUNT, i64::from(defaults.shard_count))?;
        let shard_count = u32::try_from(shard_count)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| EventError::Config {
                key: KEY_SHARD_COUNT.to_string(),
                reason: format!("must be a positive integer, got {shard_count}"),
            })?;

        let retry_times = source.get_int(KEY_RETRY_TIMES, i64::from(defaults.default_retry_times))?;
        let default_retry_times = i32::try_from(retry_times)
            .ok()
            .filter(|n| *n >= -1)
            .ok_or_else(|| EventError::Config {
                key: KEY_RETRY_TIMES.to_string(),
                reason: format!("must be -1 or a non-negative integer, got {retry_times}"),
            })?;

        let interval = source.get_int(
            KEY_INFINITE_RETRY_INTERVAL,
            defaults.infinite_retry_interval.as_secs() as i64,
        )?;
        let interval = u64::try_from(interval).map_err(|_| EventError::Config {
            key: KEY_INFINITE_RETRY_INTERVAL.to_string(),
            reason: format!("must not be negative, got {interval}"),
        })?;

        let lock_mode = if source.get_bool(KEY_LOCK_OPTIMISTIC, false)? {
            LockMode::Optimistic
        } else {
            LockMode::Pessimistic
        };

        let capacity =
            source.get_int(KEY_PIPELINE_CAPACITY, defaults.pipeline_capacity as i64)?;
        let pipeline_capacity = usize::try_from(capacity)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| EventError::Config {
                key: KEY_PIPELINE_CAPACITY.to_string(),
                reason: format!("must be a positive integer, got {capacity}"),
            })?;

        Ok(Self {
            system_id: source.get_string(KEY_SYSTEM_ID, &defaults.system_id),
            shard_count,
            default_retry_times,
            infinite_retry_interval: Duration::from_secs(interval),
            lock_mode,
            pipeline_capacity,
        })
    }
}
