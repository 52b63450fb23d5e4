//! 定时器配置模块 (Timer Configuration Module)
//!
//! Provides the immutable wheel configuration and its Builder. All validation
//! happens in `build()`; a constructed [`TimerConfig`] is always usable and no
//! configuration error can surface at runtime.
//!
//! 提供不可变的时间轮配置及其 Builder 模式。所有验证在 `build()` 中完成；
//! 构建成功的 [`TimerConfig`] 总是可用的，运行时不会再出现配置错误。

use crate::error::TimerError;
use std::time::Duration;

/// 桶数量上限 (Upper bound on the bucket count)
pub const MAX_BUCKET_COUNT: usize = 1 << 30;

/// 挂起超时数量的实现上限 (Implementation cap on pending timeouts)
pub const MAX_PENDING_TIMEOUTS: u64 = 1_000_000;

/// 单桶并行到期执行数上限 (Cap on parallel expirations per bucket)
pub const MAX_PARALLEL_EXPIRATIONS: usize = 128;

/// 整个时间轮跨度的上限（毫秒）(Upper bound on the total wheel span in ms)
pub const MAX_WHEEL_SPAN_MS: u64 = 60_000;

/// 时间轮配置 (Timing Wheel Configuration)
///
/// Immutable after build. Created through [`TimerConfig::builder`].
///
/// 构建后不可变。通过 [`TimerConfig::builder`] 创建。
///
/// # 示例 (Examples)
/// ```
/// use hashed_wheel_timer::TimerConfig;
/// use std::time::Duration;
///
/// // Use default configuration (使用默认配置)
/// let config = TimerConfig::default();
/// assert_eq!(config.tick_interval, Duration::from_millis(100));
///
/// // Use Builder to customize configuration (使用 Builder 自定义配置)
/// let config = TimerConfig::builder()
///     .tick_interval(Duration::from_millis(50))
///     .bucket_count(256)
///     .max_pending_timeouts(10_000)
///     .max_parallel_expirations(32)
///     .build()
///     .unwrap();
/// assert_eq!(config.bucket_count, 256);
/// ```
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// 每个 tick 的时间长度（必须是整毫秒，且不小于 1 毫秒）
    /// (Duration of each tick, whole milliseconds, at least 1 ms)
    pub tick_interval: Duration,

    /// 桶数量（总是 2 的幂次方，构建时向上取整）
    /// (Bucket count, always a power of two, rounded up at build time)
    pub bucket_count: usize,

    /// 挂起超时数量上限，0 表示不限制
    /// (Pending timeout ceiling, 0 means unlimited)
    pub max_pending_timeouts: u64,

    /// 单个桶在一个 tick 内并行执行到期任务的最大数量
    /// (Maximum number of expirations dispatched in parallel per bucket per tick)
    pub max_parallel_expirations: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            bucket_count: 512,
            max_pending_timeouts: 0,
            max_parallel_expirations: 16,
        }
    }
}

impl TimerConfig {
    /// 创建配置构建器 (Create configuration builder)
    pub fn builder() -> TimerConfigBuilder {
        TimerConfigBuilder::default()
    }

    /// tick 时长的毫秒数 (Tick duration in milliseconds)
    #[inline]
    pub(crate) fn tick_millis(&self) -> u64 {
        self.tick_interval.as_millis() as u64
    }
}

/// 时间轮配置构建器 (Timing Wheel Configuration Builder)
#[derive(Debug, Clone)]
pub struct TimerConfigBuilder {
    tick_interval: Duration,
    bucket_count: usize,
    max_pending_timeouts: u64,
    max_parallel_expirations: usize,
}

impl Default for TimerConfigBuilder {
    fn default() -> Self {
        let config = TimerConfig::default();
        Self {
            tick_interval: config.tick_interval,
            bucket_count: config.bucket_count,
            max_pending_timeouts: config.max_pending_timeouts,
            max_parallel_expirations: config.max_parallel_expirations,
        }
    }
}

impl TimerConfigBuilder {
    /// 设置 tick 时长 (Set tick duration)
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// 设置桶数量 (Set bucket count)
    ///
    /// The value is silently rounded up to the next power of two and capped
    /// at [`MAX_BUCKET_COUNT`].
    ///
    /// 该值会被静默地向上取整到下一个 2 的幂次方，并以 [`MAX_BUCKET_COUNT`] 封顶。
    pub fn bucket_count(mut self, count: usize) -> Self {
        self.bucket_count = count;
        self
    }

    /// 设置挂起超时数量上限，0 表示不限制
    /// (Set pending timeout ceiling, 0 means unlimited)
    pub fn max_pending_timeouts(mut self, limit: u64) -> Self {
        self.max_pending_timeouts = limit;
        self
    }

    /// 设置单桶并行到期执行数 (Set parallel expirations per bucket)
    pub fn max_parallel_expirations(mut self, parallel: usize) -> Self {
        self.max_parallel_expirations = parallel;
        self
    }

    /// 构建配置并进行验证
    ///      (Build and validate configuration)
    ///
    /// # 返回 (Returns)
    /// - `Ok(TimerConfig)`: 配置有效 (Configuration is valid)
    /// - `Err(TimerError::InvalidConfiguration)`: 配置验证失败
    ///      (Configuration validation failed)
    ///
    /// # 验证规则 (Validation Rules)
    /// - tick 时长必须不小于 1 毫秒且是整毫秒
    ///      (Tick duration must be at least 1 ms and a whole number of ms)
    /// - 桶数量必须大于 0，向上取整到 2 的幂次方后以 2^30 封顶
    ///      (Bucket count must be positive; rounded up to a power of two, capped at 2^30)
    /// - 挂起超时上限不得超过 1,000,000
    ///      (Pending timeout ceiling must not exceed 1,000,000)
    /// - 并行到期执行数必须在 1..=128 范围内
    ///      (Parallel expirations must be within 1..=128)
    /// - tick 时长与桶数量的乘积（轮跨度）不得超过 60 秒
    ///      (The tick-by-buckets product, the wheel span, must not exceed 60 s)
    pub fn build(self) -> Result<TimerConfig, TimerError> {
        if self.tick_interval < Duration::from_millis(1) {
            return Err(TimerError::InvalidConfiguration {
                field: "tick_interval",
                reason: "tick interval must be at least 1 ms".to_string(),
            });
        }

        if self.tick_interval.subsec_nanos() % 1_000_000 != 0 {
            return Err(TimerError::InvalidConfiguration {
                field: "tick_interval",
                reason: "tick interval must be a whole number of milliseconds".to_string(),
            });
        }

        if self.bucket_count == 0 {
            return Err(TimerError::InvalidConfiguration {
                field: "bucket_count",
                reason: "bucket count must be greater than 0".to_string(),
            });
        }

        let bucket_count = self
            .bucket_count
            .checked_next_power_of_two()
            .unwrap_or(MAX_BUCKET_COUNT)
            .min(MAX_BUCKET_COUNT);

        if self.max_pending_timeouts > MAX_PENDING_TIMEOUTS {
            return Err(TimerError::InvalidConfiguration {
                field: "max_pending_timeouts",
                reason: format!(
                    "pending timeout ceiling must not exceed {}",
                    MAX_PENDING_TIMEOUTS
                ),
            });
        }

        if self.max_parallel_expirations == 0 {
            return Err(TimerError::InvalidConfiguration {
                field: "max_parallel_expirations",
                reason: "parallel expirations must be greater than 0".to_string(),
            });
        }

        if self.max_parallel_expirations > MAX_PARALLEL_EXPIRATIONS {
            return Err(TimerError::InvalidConfiguration {
                field: "max_parallel_expirations",
                reason: format!(
                    "parallel expirations must not exceed {}",
                    MAX_PARALLEL_EXPIRATIONS
                ),
            });
        }

        let tick_ms = self.tick_interval.as_millis() as u64;
        let span_ms = tick_ms.saturating_mul(bucket_count as u64);
        if span_ms > MAX_WHEEL_SPAN_MS {
            return Err(TimerError::InvalidConfiguration {
                field: "bucket_count",
                reason: format!(
                    "wheel span of {} ms exceeds the {} ms limit; lower the tick interval or the bucket count",
                    span_ms, MAX_WHEEL_SPAN_MS
                ),
            });
        }

        Ok(TimerConfig {
            tick_interval: self.tick_interval,
            bucket_count,
            max_pending_timeouts: self.max_pending_timeouts,
            max_parallel_expirations: self.max_parallel_expirations,
        })
    }
}
