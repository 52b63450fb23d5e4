//! 定时器门面模块 (Timer Facade Module)
//!
//! Public entry points for submission, running and stopping the wheel.
//! Admission control is counted at submission time and released exactly once
//! per handle, no matter how many times a recurring handle executes.
//!
//! 提交、运行与停止时间轮的公共入口。准入控制在提交时计数，
//! 无论周期性句柄执行多少次，每个句柄恰好释放一次名额。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::clock::{ceil_millis, MonotonicClock};
use crate::config::TimerConfig;
use crate::error::TimerError;
use crate::handle::{Admission, AdmissionSlot, TimeoutHandle};
use crate::task::{TaskError, TimerTask};
use crate::wheel::{StartOutcome, Wheel, WORKER_SHUTDOWN};

/// 哈希时间轮定时器 (Hashed Wheel Timer)
///
/// Schedules many thousands of delayed and optionally recurring tasks with
/// O(1) amortized insertion, cancellation and per-tick dispatch. The wheel is
/// approximate: a task never fires before its delay, and under quiescent load
/// it fires within about one tick interval after it.
///
/// The timer is a dispatcher, not an executor. A task that blocks for longer
/// than `tick_interval * max_parallel_expirations` starves its bucket's
/// parallel slots.
///
/// 以摊还 O(1) 的插入、取消和每 tick 调度成本，调度成千上万个延迟任务和可选的周期任务。
/// 时间轮是近似的：任务绝不会早于延迟触发，静载下会在延迟之后约一个 tick 间隔内触发。
///
/// 定时器是调度器而非执行器。阻塞超过 `tick_interval * max_parallel_expirations`
/// 的任务会饿死其所在桶的并行名额。
///
/// # Examples (示例)
/// ```no_run
/// use hashed_wheel_timer::{CallbackWrapper, CancellationToken, HashedWheelTimer};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let timer = HashedWheelTimer::with_defaults();
///     let token = CancellationToken::new();
///     timer.run(token.clone()).unwrap();
///
///     let callback = CallbackWrapper::new(|| async {
///         println!("Timer fired after 2 seconds!");
///     });
///     let handle = timer.submit(callback, Duration::from_secs(2)).unwrap();
///
///     tokio::time::sleep(Duration::from_millis(2_300)).await;
///     assert!(handle.expired());
///
///     let unprocessed = timer.stop().await;
///     assert!(unprocessed.is_empty());
/// }
/// ```
pub struct HashedWheelTimer {
    wheel: Arc<Wheel>,
    admission: Arc<Admission>,
    /// 下一个句柄标识，从 1 开始按提交顺序递增
    /// (Next handle id, increasing from 1 in submission order)
    next_id: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HashedWheelTimer {
    /// Create a timer from a validated configuration
    ///
    /// The wheel start reference is captured here; all deadlines are measured
    /// against it.
    ///
    /// 从已验证的配置创建定时器。时间轮起点在此处捕获；所有截止时间都以它为基准。
    ///
    /// # Parameters
    /// - `config`: 时间轮配置，已通过 builder 验证
    ///      (Wheel configuration, validated by the builder)
    ///
    /// # Examples (示例)
    /// ```
    /// use hashed_wheel_timer::{HashedWheelTimer, TimerConfig};
    /// use std::time::Duration;
    ///
    /// let config = TimerConfig::builder()
    ///     .tick_interval(Duration::from_millis(100))
    ///     .bucket_count(512)
    ///     .build()
    ///     .unwrap();
    /// let timer = HashedWheelTimer::new(config);
    /// assert_eq!(timer.pending_timeouts(), 0);
    /// ```
    pub fn new(config: TimerConfig) -> Self {
        let clock = MonotonicClock::new();
        let admission = Arc::new(Admission::new(config.max_pending_timeouts));
        let wheel = Arc::new(Wheel::new(&config, clock));

        Self {
            wheel,
            admission,
            next_id: AtomicU64::new(1),
            worker: Mutex::new(None),
        }
    }

    /// Create a timer with the default configuration: 100 ms ticks, 512
    /// buckets, unlimited pending timeouts, 16 parallel expirations
    ///
    /// 使用默认配置创建定时器：100 毫秒 tick，512 个桶，
    /// 不限制挂起超时数，16 路并行到期执行
    pub fn with_defaults() -> Self {
        Self::new(TimerConfig::default())
    }

    /// Submit a one-shot task
    ///
    /// # Parameters
    /// - `task`: 要调度的任务 (Task to dispatch)
    /// - `delay`: 距现在的延迟；零延迟在下一个 tick 边界触发
    ///      (Delay from now; a zero delay fires on the next tick boundary)
    ///
    /// # Returns
    /// - `Ok(handle)`: 已入轮的超时句柄 (Handle of the scheduled timeout)
    /// - `Err(TimerError::InvalidState)`: 定时器已关闭 (Timer already shut down)
    /// - `Err(TimerError::Rejected)`: 挂起超时数已达上限 (Pending ceiling reached)
    ///
    /// # Examples (示例)
    /// ```no_run
    /// # use hashed_wheel_timer::{CallbackWrapper, CancellationToken, HashedWheelTimer};
    /// # use std::time::Duration;
    /// #
    /// # #[tokio::main]
    /// # async fn main() {
    /// let timer = HashedWheelTimer::with_defaults();
    /// timer.run(CancellationToken::new()).unwrap();
    ///
    /// let callback = CallbackWrapper::new(|| async { println!("fired"); });
    /// let handle = timer.submit(callback, Duration::from_millis(500)).unwrap();
    /// println!("scheduled timeout {}", handle.id());
    /// # }
    /// ```
    #[inline]
    pub fn submit<T: TimerTask>(
        &self,
        task: T,
        delay: Duration,
    ) -> Result<Arc<TimeoutHandle>, TimerError> {
        self.submit_task(Arc::new(task), delay, 0)
    }

    /// Submit a recurring task
    ///
    /// `recurring` is the number of additional executions after the first, so
    /// the task runs `recurring + 1` times in total. Each execution is
    /// rescheduled one interval after the previous one finishes dispatching.
    ///
    /// `recurring` 是首次执行之后的追加执行次数，因此任务总共运行 `recurring + 1` 次。
    /// 每次执行都在前一次调度完成后按一个间隔重新排入。
    ///
    /// # Parameters
    /// - `task`: 要调度的任务 (Task to dispatch)
    /// - `delay`: 首次执行的延迟，也是后续执行的间隔
    ///      (Delay of the first execution, also the interval of the rest)
    /// - `recurring`: 首次之后的追加执行次数 (Additional executions after the first)
    ///
    /// # Examples (示例)
    /// ```no_run
    /// # use hashed_wheel_timer::{CallbackWrapper, CancellationToken, HashedWheelTimer};
    /// # use std::time::Duration;
    /// #
    /// # #[tokio::main]
    /// # async fn main() {
    /// let timer = HashedWheelTimer::with_defaults();
    /// timer.run(CancellationToken::new()).unwrap();
    ///
    /// // Fires at roughly 1s, 2s and 3s (大约在 1 秒、2 秒和 3 秒触发)
    /// let callback = CallbackWrapper::new(|| async { println!("beat"); });
    /// let handle = timer
    ///     .submit_recurring(callback, Duration::from_secs(1), 2)
    ///     .unwrap();
    /// # let _ = handle;
    /// # }
    /// ```
    #[inline]
    pub fn submit_recurring<T: TimerTask>(
        &self,
        task: T,
        delay: Duration,
        recurring: u32,
    ) -> Result<Arc<TimeoutHandle>, TimerError> {
        self.submit_task(Arc::new(task), delay, recurring)
    }

    fn submit_task(
        &self,
        task: Arc<dyn TimerTask>,
        delay: Duration,
        recurring: u32,
    ) -> Result<Arc<TimeoutHandle>, TimerError> {
        if self.wheel.is_shut_down() {
            return Err(TimerError::InvalidState {
                reason: "timer is shut down",
            });
        }

        self.admission.acquire()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline_ms = self.wheel.deadline_millis_from(delay);
        let interval_ms = ceil_millis(delay);
        let handle = Arc::new(TimeoutHandle::new(
            id,
            task,
            interval_ms,
            deadline_ms,
            recurring,
            AdmissionSlot::new(Arc::clone(&self.admission)),
        ));

        self.wheel.add_timeout(Arc::clone(&handle));
        trace!(id, deadline_ms, recurring, "timeout submitted");
        Ok(handle)
    }

    /// Start the driver loop on a long-running tokio task
    ///
    /// Idempotent: a second call while started is a no-op. The supplied token
    /// is the cooperative cancel signal; the driver checks it at every sleep
    /// and dequeue boundary and hands it to every dispatched task.
    ///
    /// 在长期运行的 tokio 任务上启动驱动器循环。幂等：已启动时再次调用为空操作。
    /// 传入的令牌是协作取消信号；驱动器在每次睡眠和出队边界检查它，
    /// 并把它交给每个被调度的任务。
    ///
    /// # Returns
    /// - `Ok(())`: 驱动器已在运行 (Driver is running)
    /// - `Err(TimerError::InvalidState)`: 定时器已关闭 (Timer already shut down)
    pub fn run(&self, token: CancellationToken) -> Result<(), TimerError> {
        match self.wheel.try_start() {
            StartOutcome::Started => {
                let wheel = Arc::clone(&self.wheel);
                let worker = tokio::spawn(wheel.drive(token));
                *self.worker.lock() = Some(worker);
                Ok(())
            }
            StartOutcome::AlreadyRunning => Ok(()),
            StartOutcome::ShutDown => Err(TimerError::InvalidState {
                reason: "timer is shut down",
            }),
        }
    }

    /// Stop the timer and collect every timeout that never fired
    ///
    /// The driver observes the shutdown at its next sleep or tick boundary
    /// and exits; this method waits for that, then drains the buckets. The
    /// first caller receives the unprocessed handles, pending entries before
    /// due entries within each bucket, buckets in order. Later calls return
    /// an empty vector. Canceled entries are filtered out.
    ///
    /// 停止定时器并收集所有从未触发的超时。驱动器在下一次睡眠或 tick 边界观察到关闭并退出；
    /// 本方法等待退出后排空所有桶。第一个调用者获得未处理句柄，
    /// 每个桶内等待条目在到期条目之前，桶按顺序排列。后续调用返回空向量。
    /// 已取消的条目会被过滤掉。
    ///
    /// # Examples (示例)
    /// ```no_run
    /// # use hashed_wheel_timer::{CallbackWrapper, CancellationToken, HashedWheelTimer};
    /// # use std::time::Duration;
    /// #
    /// # #[tokio::main]
    /// # async fn main() {
    /// let timer = HashedWheelTimer::with_defaults();
    /// timer.run(CancellationToken::new()).unwrap();
    ///
    /// let callback = CallbackWrapper::new(|| async {});
    /// timer.submit(callback, Duration::from_secs(60)).unwrap();
    ///
    /// let unprocessed = timer.stop().await;
    /// assert_eq!(unprocessed.len(), 1);
    /// # }
    /// ```
    pub async fn stop(&self) -> Vec<Arc<TimeoutHandle>> {
        let previous = self.wheel.shut_down();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        if previous == WORKER_SHUTDOWN {
            return Vec::new();
        }
        self.wheel.drain_unprocessed()
    }

    /// Install the hook invoked when a user task fails with a non-cancel
    /// error. Invoked at most once per failed execution, never from within a
    /// lock. Without a hook, failures are logged at warn level.
    ///
    /// 安装当用户任务以非取消错误失败时调用的回调。每次失败的执行至多调用一次，
    /// 绝不在持锁状态下调用。未安装回调时，失败以 warn 级别记录日志。
    pub fn set_unhandled_failure_hook(
        &self,
        hook: impl Fn(u64, TaskError) + Send + Sync + 'static,
    ) {
        self.wheel.hook.set(Arc::new(hook));
    }

    /// Number of submitted timeouts that have not yet left the pending set
    ///
    /// 已提交但尚未离开挂起集合的超时数量
    #[inline]
    pub fn pending_timeouts(&self) -> u64 {
        self.admission.count()
    }

    /// Tick duration of this wheel (本时间轮的 tick 时长)
    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.wheel.tick_millis())
    }

    /// Bucket count of this wheel, always a power of two
    ///
    /// 本时间轮的桶数量，总是 2 的幂次方
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.wheel.bucket_count()
    }
}

impl Drop for HashedWheelTimer {
    fn drop(&mut self) {
        self.wheel.shut_down();
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}
