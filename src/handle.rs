//! 超时句柄模块 (Timeout Handle Module)
//!
//! One [`TimeoutHandle`] exists per scheduled task. All mutable fields are
//! plain atomics with one-way transition rules, so submitters, cancelers and
//! the driver can touch a handle concurrently without locks.
//!
//! 每个已调度的任务对应一个 [`TimeoutHandle`]。所有可变字段都是普通原子变量，
//! 并遵循单向转换规则，因此提交方、取消方和驱动器可以在无锁情况下并发访问句柄。

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::TimerError;
use crate::task::{FailureHook, TaskError, TimerTask};

/// 句柄存活状态 (Handle is live)
const STATE_LIVE: u8 = 0;
/// 句柄已取消 (Handle was canceled)
const STATE_CANCELED: u8 = 1;
/// 句柄已到期 (Handle expired)
const STATE_EXPIRED: u8 = 2;

/// 准入计数器 (Admission counter)
///
/// Timer-wide pending-timeout accounting. A limit of 0 means unlimited.
///
/// 定时器级挂起超时计数。上限为 0 表示不限制。
pub(crate) struct Admission {
    limit: u64,
    count: AtomicU64,
}

impl Admission {
    pub(crate) fn new(limit: u64) -> Self {
        Self {
            limit,
            count: AtomicU64::new(0),
        }
    }

    /// Claim one pending slot, rejecting at the ceiling
    ///
    /// 占用一个挂起名额，达到上限时拒绝
    pub(crate) fn acquire(&self) -> Result<(), TimerError> {
        if self.limit == 0 {
            self.count.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }

        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current >= self.limit {
                return Err(TimerError::Rejected {
                    pending: current,
                    limit: self.limit,
                });
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    pub(crate) fn release(&self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

/// 准入名额 (Admission slot)
///
/// Every handle owns exactly one slot and gives it back exactly once, no
/// matter how many times a recurring handle executes.
///
/// 每个句柄恰好持有一个名额，并且无论周期性句柄执行多少次，名额只归还一次。
pub(crate) struct AdmissionSlot {
    admission: Arc<Admission>,
    released: AtomicBool,
}

impl AdmissionSlot {
    pub(crate) fn new(admission: Arc<Admission>) -> Self {
        Self {
            admission,
            released: AtomicBool::new(false),
        }
    }

    pub(crate) fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.admission.release();
        }
    }
}

/// 超时句柄 (Timeout Handle)
///
/// Carries the identity, deadline, residual round state and user task of one
/// scheduled timeout. Handles are shared via `Arc`: the wheel keeps one
/// reference while the entry is live and the submitter keeps another.
///
/// State transitions are one-way, live to canceled or live to expired. Once a
/// terminal state is reached only idempotent observation is possible.
///
/// 承载一个已调度超时的标识、截止时间、剩余轮次状态和用户任务。
/// 句柄通过 `Arc` 共享：条目存活期间时间轮持有一个引用，提交方持有另一个。
///
/// 状态转换是单向的，存活到已取消或存活到已到期。进入终态后只能进行幂等观察。
///
/// # Examples (示例)
/// ```no_run
/// # use hashed_wheel_timer::{HashedWheelTimer, CallbackWrapper, CancellationToken};
/// # use std::time::Duration;
/// #
/// # #[tokio::main]
/// # async fn main() {
/// let timer = HashedWheelTimer::with_defaults();
/// timer.run(CancellationToken::new()).unwrap();
///
/// let callback = CallbackWrapper::new(|| async {});
/// let handle = timer.submit(callback, Duration::from_secs(10)).unwrap();
///
/// // Cancel the timeout before it fires (在触发前取消超时)
/// assert!(handle.cancel());
/// assert!(handle.canceled());
/// assert!(!handle.expired());
/// # }
/// ```
pub struct TimeoutHandle {
    id: u64,
    task: Arc<dyn TimerTask>,
    /// 原始请求的延迟（毫秒），周期性重调度时使用
    /// (Originally requested delay in ms, used when rescheduling recurrences)
    interval_ms: u64,
    /// 距时间轮起点的截止时间（毫秒对齐）
    /// (Deadline as ms since the wheel start reference)
    deadline_ms: AtomicU64,
    /// 还需等待的完整轮数，每次所在桶被访问时减一
    /// (Full revolutions still owed, decremented per bucket visit)
    remaining_rounds: AtomicU64,
    /// 首次执行之后的剩余追加执行次数
    /// (Additional executions remaining after the first)
    recurring_rounds: AtomicU32,
    state: AtomicU8,
    slot: AdmissionSlot,
}

impl TimeoutHandle {
    pub(crate) fn new(
        id: u64,
        task: Arc<dyn TimerTask>,
        interval_ms: u64,
        deadline_ms: u64,
        recurring_rounds: u32,
        slot: AdmissionSlot,
    ) -> Self {
        Self {
            id,
            task,
            interval_ms,
            deadline_ms: AtomicU64::new(deadline_ms),
            remaining_rounds: AtomicU64::new(0),
            recurring_rounds: AtomicU32::new(recurring_rounds),
            state: AtomicU8::new(STATE_LIVE),
            slot,
        }
    }

    /// Unique id, strictly increasing in submission order
    ///
    /// 唯一标识，按提交顺序严格递增
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The user task this timeout dispatches
    ///
    /// 此超时调度的用户任务
    #[inline]
    pub fn task(&self) -> &Arc<dyn TimerTask> {
        &self.task
    }

    /// Deadline as a duration since the wheel start reference
    ///
    /// 以时间轮起点为基准的截止时间
    #[inline]
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms.load(Ordering::Acquire))
    }

    /// Cancel the timeout
    ///
    /// Returns true on the first successful transition, false if the handle
    /// already reached a terminal state. Has no effect on a task that is
    /// already running; the entry is physically dropped the next time its
    /// bucket is visited.
    ///
    /// 取消超时。首次成功转换返回 true，句柄已处于终态则返回 false。
    /// 对已经在运行的任务没有影响；条目将在其所在桶下次被访问时被物理移除。
    #[inline]
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_LIVE,
                STATE_CANCELED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Whether the timeout expired (fired, or finished its last recurrence)
    ///
    /// 超时是否已到期（已触发，或已完成最后一次周期执行）
    #[inline]
    pub fn expired(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_EXPIRED
    }

    /// Whether the timeout was canceled
    ///
    /// 超时是否已被取消
    #[inline]
    pub fn canceled(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_CANCELED
    }

    #[inline]
    pub(crate) fn deadline_millis(&self) -> u64 {
        self.deadline_ms.load(Ordering::Acquire)
    }

    /// Push the deadline forward by one interval for the next recurrence.
    /// A zero interval still advances by one millisecond so the entry keeps
    /// making progress through the wheel.
    ///
    /// 为下一次周期执行将截止时间前移一个间隔。
    /// 间隔为零时仍前移一毫秒，保证条目在时间轮中持续前进。
    #[inline]
    pub(crate) fn advance_deadline(&self) {
        let step = self.interval_ms.max(1);
        self.deadline_ms.fetch_add(step, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn remaining_rounds(&self) -> u64 {
        self.remaining_rounds.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_remaining_rounds(&self, rounds: u64) {
        self.remaining_rounds.store(rounds, Ordering::Release);
    }

    /// Decrement the residual round count, returning the new value
    ///
    /// 递减剩余轮数，返回新值
    #[inline]
    pub(crate) fn decrement_remaining_rounds(&self) -> u64 {
        let previous = self
            .remaining_rounds
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |rounds| {
                Some(rounds.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    /// Additional executions remaining after the first
    ///
    /// 首次执行之后剩余的追加执行次数
    #[inline]
    pub fn recurring_rounds(&self) -> u32 {
        self.recurring_rounds.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn consume_recurrence(&self) {
        let _ = self
            .recurring_rounds
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |rounds| {
                Some(rounds.saturating_sub(1))
            });
    }

    /// Give the admission slot back, at most once
    ///
    /// 归还准入名额，至多一次
    #[inline]
    pub(crate) fn release_slot(&self) {
        self.slot.release();
    }

    /// Dispatch this entry, invoked by the driver when the bucket drains it
    ///
    /// Marking happens before the user task runs: a non-recurring handle that
    /// is about to execute becomes `Expired` first, so a `cancel()` issued
    /// during execution returns false and the pending counter is decremented
    /// exactly once per handle.
    ///
    /// 调度此条目，由驱动器在桶排空时调用。
    /// 标记发生在用户任务运行之前：即将执行的非周期句柄先变为 `Expired`，
    /// 因此执行期间发出的 `cancel()` 返回 false，挂起计数对每个句柄只递减一次。
    pub(crate) async fn expire(self: Arc<Self>, token: &CancellationToken, hook: &FailureHook) {
        if self.state.load(Ordering::Acquire) != STATE_LIVE {
            return;
        }

        if self.recurring_rounds.load(Ordering::Acquire) == 0 {
            if self
                .state
                .compare_exchange(
                    STATE_LIVE,
                    STATE_EXPIRED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
            {
                // Lost the race against cancel(), the bucket drops the entry.
                // 与 cancel() 竞争失败，由桶丢弃该条目。
                return;
            }
            self.release_slot();
        }

        match self.task.run(Arc::clone(&self), token.clone()).await {
            Ok(()) => {}
            Err(TaskError::Canceled) => {
                // A recurring handle that bails out cooperatively stops here;
                // an already expired one-shot keeps its terminal state.
                // 协作退出的周期句柄在此终止；已到期的一次性句柄保持其终态。
                let _ = self.state.compare_exchange(
                    STATE_LIVE,
                    STATE_CANCELED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
            Err(error) => hook.report(self.id, error),
        }
    }
}
