//! 单调时钟模块 (Monotonic Clock Module)
//!
//! All deadlines in the wheel are expressed as durations measured against a
//! single process-wide reference captured when the clock is created. The
//! source is `std::time::Instant`, which never regresses; wall-clock time is
//! never consulted.
//!
//! 时间轮中的所有截止时间都以时钟创建时捕获的进程级参考点为基准的时长表示。
//! 时间源是 `std::time::Instant`，永不回退；绝不使用墙上时钟。

use std::time::{Duration, Instant};

/// 单调时钟 (Monotonic Clock)
///
/// Cheap to copy around; the only state is the origin instant.
///
/// 复制成本低，唯一的状态是起始时间点。
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose reference point is "now"
    ///
    /// 创建一个以当前时刻为参考点的时钟
    #[inline]
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Elapsed duration since the clock reference
    ///
    /// 自时钟参考点以来经过的时长
    #[inline]
    pub fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Deadline obtained by adding `delay` to the current elapsed duration
    ///
    /// 在当前经过时长上加 `delay` 得到的截止时间
    #[inline]
    pub fn deadline_from(&self, delay: Duration) -> Duration {
        self.now() + delay
    }
}

impl Default for MonotonicClock {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Round a duration up to the next whole millisecond
///
/// Deadlines and sleep intervals are millisecond-aligned; rounding is always
/// upwards so a timeout can never fire before its requested delay.
///
/// 将时长向上取整到下一个整毫秒。截止时间和睡眠间隔都按毫秒对齐；
/// 取整方向始终向上，因此超时绝不会早于请求的延迟触发。
#[inline]
pub fn ceil_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(ceil_millis(duration))
}

/// Same rounding, returned as a raw millisecond count
///
/// 相同的取整逻辑，返回原始毫秒数
#[inline]
pub fn ceil_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    if duration.subsec_nanos() % 1_000_000 == 0 {
        millis
    } else {
        millis + 1
    }
}
