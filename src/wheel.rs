//! 时间轮模块 (Timing Wheel Module)
//!
//! The ring of buckets and the single driver that advances it. Insertion and
//! cancellation are O(1) amortized; the cost is bounded scheduling jitter of
//! one tick interval. Deadlines beyond one revolution are handled by round
//! counting, never by growing the wheel.
//!
//! 桶环以及推进它的单一驱动器。插入和取消的摊还复杂度为 O(1)；
//! 代价是最多一个 tick 间隔的调度抖动。超过一整圈的截止时间通过轮次计数处理，
//! 而不是扩大时间轮。

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bucket::Bucket;
use crate::clock::{ceil_millis, MonotonicClock};
use crate::config::TimerConfig;
use crate::handle::TimeoutHandle;
use crate::task::FailureHook;

/// 驱动器尚未启动 (Driver not started yet)
pub(crate) const WORKER_INIT: u8 = 0;
/// 驱动器运行中 (Driver running)
pub(crate) const WORKER_STARTED: u8 = 1;
/// 驱动器已关闭，终态 (Driver shut down, terminal)
pub(crate) const WORKER_SHUTDOWN: u8 = 2;

/// 启动尝试的结果 (Outcome of a start attempt)
pub(crate) enum StartOutcome {
    Started,
    AlreadyRunning,
    ShutDown,
}

/// 时间轮 (Timing Wheel)
///
/// Shared between the facade, submitters and the driver task. All mutable
/// state lives in the buckets and a handful of atomics, so submission and
/// cancellation proceed concurrently with the driver.
///
/// 在门面、提交方和驱动器任务之间共享。所有可变状态都在桶和少量原子变量中，
/// 因此提交与取消可以和驱动器并发进行。
pub(crate) struct Wheel {
    buckets: Box<[Bucket]>,
    /// 桶索引掩码，桶数量减一 (Bucket index mask, bucket count minus one)
    mask: u64,
    tick_ms: u64,
    max_parallel: usize,
    clock: MonotonicClock,
    /// 时间轮起点（毫秒），最小为 1 以便 0 保持未初始化含义
    /// (Wheel start in ms, at least 1 so 0 keeps its uninitialized meaning)
    start_ms: u64,
    /// 当前正在推进的 tick (The tick currently in progress)
    current_tick: AtomicU64,
    state: AtomicU8,
    /// 内部关闭令牌，使 stop() 能立即打断驱动器的睡眠
    /// (Internal shutdown token so stop() interrupts the driver sleep promptly)
    shutdown: CancellationToken,
    pub(crate) hook: Arc<FailureHook>,
}

impl Wheel {
    pub(crate) fn new(config: &TimerConfig, clock: MonotonicClock) -> Self {
        let bucket_count = config.bucket_count;
        let mut buckets = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            buckets.push(Bucket::new());
        }

        let start_ms = ceil_millis(clock.now()).max(1);

        Self {
            buckets: buckets.into_boxed_slice(),
            mask: (bucket_count - 1) as u64,
            tick_ms: config.tick_millis(),
            max_parallel: config.max_parallel_expirations,
            clock,
            start_ms,
            current_tick: AtomicU64::new(0),
            state: AtomicU8::new(WORKER_INIT),
            shutdown: CancellationToken::new(),
            hook: Arc::new(FailureHook::new()),
        }
    }

    #[inline]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn tick_millis(&self) -> u64 {
        self.tick_ms
    }

    /// Elapsed milliseconds since the wheel start reference
    ///
    /// 自时间轮起点以来经过的毫秒数
    #[inline]
    pub(crate) fn elapsed_millis(&self) -> u64 {
        (self.clock.now().as_millis() as u64).saturating_sub(self.start_ms)
    }

    /// Millisecond-aligned deadline for a submission made now, rounded up
    ///
    /// 此刻提交对应的毫秒对齐截止时间，向上取整
    #[inline]
    pub(crate) fn deadline_millis_from(&self, delay: Duration) -> u64 {
        ceil_millis(self.clock.deadline_from(delay)).saturating_sub(self.start_ms)
    }

    /// Compute the residual round count and bucket index for a deadline,
    /// as seen from tick `tick`. The `max` keeps a deadline that already
    /// passed in the current bucket instead of a past one.
    ///
    /// 计算某截止时间从 tick `tick` 看过去的剩余轮数和桶索引。
    /// `max` 保证已经过去的截止时间落在当前桶而不是过去的桶。
    #[inline]
    pub(crate) fn position(&self, deadline_ms: u64, tick: u64) -> (u64, usize) {
        let calc = deadline_ms / self.tick_ms;
        let rounds = calc.saturating_sub(tick) / self.buckets.len() as u64;
        let index = (calc.max(tick) & self.mask) as usize;
        (rounds, index)
    }

    /// Place a newly submitted handle into its bucket
    ///
    /// 将新提交的句柄放入其所属的桶
    pub(crate) fn add_timeout(&self, handle: Arc<TimeoutHandle>) {
        let tick = self.current_tick.load(Ordering::Acquire);
        let (rounds, index) = self.position(handle.deadline_millis(), tick);
        handle.set_remaining_rounds(rounds);
        self.buckets[index].add(handle);
    }

    /// Reschedule a handle that finished a run and still owes recurrences.
    /// Ownership moves to the newly selected bucket.
    ///
    /// 重新调度已完成一次运行且仍有周期次数的句柄。所有权转移到新选中的桶。
    pub(crate) fn reschedule(&self, handle: Arc<TimeoutHandle>, tick: u64) {
        handle.advance_deadline();
        let (rounds, index) = self.position(handle.deadline_millis(), tick);
        handle.set_remaining_rounds(rounds);
        handle.consume_recurrence();
        self.buckets[index].add(handle);
    }

    #[inline]
    pub(crate) fn worker_state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn is_shut_down(&self) -> bool {
        self.worker_state() == WORKER_SHUTDOWN
    }

    /// Attempt the one-way transition into the started state
    ///
    /// 尝试进行一次性的启动状态转换
    pub(crate) fn try_start(&self) -> StartOutcome {
        match self.state.compare_exchange(
            WORKER_INIT,
            WORKER_STARTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => StartOutcome::Started,
            Err(WORKER_STARTED) => StartOutcome::AlreadyRunning,
            Err(_) => StartOutcome::ShutDown,
        }
    }

    /// Enter the terminal shutdown state and wake the driver. Returns the
    /// state observed before the transition.
    ///
    /// 进入终态关闭状态并唤醒驱动器。返回转换前观察到的状态。
    pub(crate) fn shut_down(&self) -> u8 {
        let previous = self.state.swap(WORKER_SHUTDOWN, Ordering::AcqRel);
        self.shutdown.cancel();
        previous
    }

    /// Collect every entry still owned by a bucket, pending entries before
    /// due entries within each bucket, buckets in index order.
    ///
    /// 收集仍归桶所有的全部条目，每个桶内等待队列在到期队列之前，桶按索引顺序。
    pub(crate) fn drain_unprocessed(&self) -> Vec<Arc<TimeoutHandle>> {
        let mut remaining = Vec::new();
        for bucket in self.buckets.iter() {
            remaining.extend(bucket.unprocessed());
        }
        remaining
    }

    /// The driver loop. One logical driver owns the advancement: per tick it
    /// sleeps up to the tick deadline, drains the selected bucket's due
    /// entries with bounded parallelism, hands finished recurrences back to
    /// the ring, then ages the bucket. Tick k+1 never begins before tick k's
    /// expire and age passes have returned.
    ///
    /// 驱动器循环。推进由单一逻辑驱动器独占：每个 tick 先睡到 tick 截止点，
    /// 再以有界并发排空选中桶的到期条目，把完成的周期句柄交还给环，最后老化该桶。
    /// tick k 的到期与老化全部返回之前，tick k+1 不会开始。
    pub(crate) async fn drive(self: Arc<Self>, token: CancellationToken) {
        debug!(
            tick_ms = self.tick_ms,
            buckets = self.buckets.len(),
            "wheel driver started"
        );

        let mut tick: u64 = 0;
        loop {
            self.current_tick.store(tick, Ordering::Release);
            let target_ms = (tick + 1).saturating_mul(self.tick_ms);

            loop {
                if self.is_shut_down() || token.is_cancelled() {
                    debug!(tick, "wheel driver stopped");
                    return;
                }
                let elapsed = self.elapsed_millis();
                if elapsed >= target_ms {
                    break;
                }
                let wait = Duration::from_millis(target_ms - elapsed);
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(tick, "wheel driver canceled");
                        return;
                    }
                    _ = self.shutdown.cancelled() => {
                        debug!(tick, "wheel driver stopped");
                        return;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }

            if self.is_shut_down() || token.is_cancelled() {
                debug!(tick, "wheel driver stopped");
                return;
            }

            let index = (tick & self.mask) as usize;
            let now_ms = self.elapsed_millis();
            let recurrences = self.buckets[index]
                .expire_due(now_ms, self.max_parallel, &token, &self.hook)
                .await;
            for handle in recurrences {
                self.reschedule(handle, tick);
            }
            self.buckets[index].age(&token);

            tick += 1;
        }
    }

    #[cfg(test)]
    pub(crate) fn bucket(&self, index: usize) -> &Bucket {
        &self.buckets[index]
    }

    #[cfg(test)]
    pub(crate) fn set_current_tick(&self, tick: u64) {
        self.current_tick.store(tick, Ordering::Release);
    }
}
