use chrono::TimeDelta;

/// 表外重试次数使用的基础间隔（10 分钟）
pub fn base_retry_delay() -> TimeDelta {
    TimeDelta::minutes(10)
}

/// 有限重试的退避表，按新的重试次数取值
///
/// 固定的阶梯表而非计算出的指数：1→10min、2→30min、3→1h、4→6h、
/// 5→12h、6→24h、7→36h，其余次数回落到 10 分钟。
pub fn backoff(retried_count: i32) -> TimeDelta {
    match retried_count {
        1 => base_retry_delay(),
        2 => TimeDelta::minutes(30),
        3 => TimeDelta::hours(1),
        4 => TimeDelta::hours(6),
        5 => TimeDelta::hours(12),
        6 => TimeDelta::hours(24),
        7 => TimeDelta::hours(36),
        _ => base_retry_delay(),
    }
}
