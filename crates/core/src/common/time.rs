use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use chrono_tz::US::Eastern;
use std::sync::RwLock;

/// # Summary
/// 时间供给器接口，用于隔离物理系统时钟。
/// 到期日天数、扫描日期等一切“今天”的判定都必须通过此接口获取。
pub trait TimeProvider: Send + Sync {
    /// 获取当前挂载的时间
    fn now(&self) -> DateTime<Utc>;

    /// # Summary
    /// 获取美东时区下的当前时间。
    ///
    /// # Logic
    /// 1. 将 `now()` 转换到 US/Eastern（自动处理夏令时）。
    fn market_now(&self) -> DateTime<Tz> {
        self.now().with_timezone(&Eastern)
    }

    /// 获取美东时区下的当前日历日，作为期权到期天数的基准日。
    fn market_today(&self) -> NaiveDate {
        self.market_now().date_naive()
    }
}

/// # Summary
/// 生产环境使用的真实时钟，直接返回操作系统当前时间。
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// # Summary
/// 测试专用虚拟时钟，允许固定或拨动当前时间。
///
/// # Invariants
/// - 并发安全：内部利用 `RwLock` 提供多线程安全的读写。
pub struct FakeClockProvider {
    current_time: RwLock<DateTime<Utc>>,
}

impl FakeClockProvider {
    /// 使用指定的初始时间创建虚拟时钟
    pub fn new(initial_time: DateTime<Utc>) -> Self {
        Self {
            current_time: RwLock::new(initial_time),
        }
    }

    /// 强制修改时钟的当前时间
    pub fn set_time(&self, new_time: DateTime<Utc>) {
        let mut time = self
            .current_time
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *time = new_time;
    }
}

impl TimeProvider for FakeClockProvider {
    fn now(&self) -> DateTime<Utc> {
        *self
            .current_time
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_market_today_uses_eastern_calendar() {
        // 2025-03-21 02:00 UTC 在美东仍是 3 月 20 日晚间
        let clock = FakeClockProvider::new(Utc.with_ymd_and_hms(2025, 3, 21, 2, 0, 0).unwrap());
        assert_eq!(
            clock.market_today(),
            NaiveDate::from_ymd_opt(2025, 3, 20).unwrap()
        );

        clock.set_time(Utc.with_ymd_and_hms(2025, 3, 21, 15, 0, 0).unwrap());
        assert_eq!(
            clock.market_today(),
            NaiveDate::from_ymd_opt(2025, 3, 21).unwrap()
        );
    }
}
