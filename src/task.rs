//! 任务接口模块 (Task Interface Module)
//!
//! The timer never inspects what a task produces; it only needs a single
//! operation that receives the owning timeout handle and the cooperative
//! cancel token and resolves to a completion signal. Closure adapters are
//! layered on top of that one interface.
//!
//! 定时器从不关心任务产出的内容；它只需要一个接收所属超时句柄与协作取消令牌、
//! 并解析为完成信号的操作。闭包适配器构建在这一个接口之上。

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::handle::TimeoutHandle;

/// 任务完成信号 (Task completion signal)
///
/// `Canceled` means the task observed the run cancel token and bailed out
/// cooperatively; it flips the handle state and is never reported through the
/// failure hook. Any other failure is wrapped in `Failed`, swallowed by the
/// driver, and reported through the hook.
///
/// `Canceled` 表示任务观察到运行取消令牌并协作退出；它会翻转句柄状态，
/// 且永远不会通过失败回调上报。其他失败都包装为 `Failed`，被驱动器吞掉并通过回调上报。
#[derive(Debug)]
pub enum TaskError {
    /// 任务观察到取消令牌 (Task observed the cancel token)
    Canceled,
    /// 任务执行失败 (Task execution failed)
    Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Wrap an arbitrary error as a task failure
    ///
    /// 将任意错误包装为任务失败
    #[inline]
    pub fn failed(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        TaskError::Failed(error.into())
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Canceled => write!(f, "task observed cancellation"),
            TaskError::Failed(error) => write!(f, "task failed: {}", error),
        }
    }
}

impl std::error::Error for TaskError {}

/// 定时器任务接口 (Timer Task Interface)
///
/// The single operation the wheel dispatches when a timeout expires. The
/// returned future runs to completion inside the bounded per-bucket pool; the
/// timer ignores its success value and only reacts to the error kind.
///
/// 超时到期时时间轮调度的唯一操作。返回的 Future 在桶级有界并发池中运行；
/// 定时器忽略其成功值，只对错误类型作出反应。
///
/// # Examples (示例)
///
/// ```
/// use hashed_wheel_timer::{TaskError, TimerTask, TimeoutHandle, CancellationToken};
/// use futures::future::BoxFuture;
/// use std::sync::Arc;
///
/// struct Heartbeat;
///
/// impl TimerTask for Heartbeat {
///     fn run(
///         &self,
///         handle: Arc<TimeoutHandle>,
///         token: CancellationToken,
///     ) -> BoxFuture<'static, Result<(), TaskError>> {
///         Box::pin(async move {
///             if token.is_cancelled() {
///                 return Err(TaskError::Canceled);
///             }
///             println!("heartbeat #{}", handle.id());
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait TimerTask: Send + Sync + 'static {
    /// Execute the task, given the owning handle and the run cancel token
    ///
    /// 执行任务，参数为所属句柄和运行取消令牌
    fn run(
        &self,
        handle: Arc<TimeoutHandle>,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<(), TaskError>>;
}

/// 定时器回调特性 (Timer Callback Trait)
///
/// Types implementing this trait can be used as infallible timer callbacks.
/// A blanket impl covers `Fn() -> Future` closures, so periodic callbacks can
/// be invoked repeatedly.
///
/// 实现此特性的类型可以作为不可失败的定时器回调。
/// 针对 `Fn() -> Future` 闭包有统一实现，因此周期性回调可以被重复调用。
pub trait TimerCallback: Send + Sync + 'static {
    /// Execute callback, returns a Future
    ///
    /// 执行回调函数，返回一个 Future
    fn call(&self) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<F, Fut> TimerCallback for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self())
    }
}

/// Callback wrapper for standardized callback creation and management
///
/// The plainest member of the adapter family: ignores the handle and the
/// cancel token and always completes successfully.
///
/// Callback 包装器，用于标准化回调创建和管理。
/// 适配器家族中最朴素的一员：忽略句柄和取消令牌，并且总是成功完成。
///
/// # Examples (示例)
///
/// ```
/// use hashed_wheel_timer::CallbackWrapper;
///
/// let callback = CallbackWrapper::new(|| async {
///     println!("Timer fired!");
/// });
/// ```
#[derive(Clone)]
pub struct CallbackWrapper {
    callback: Arc<dyn TimerCallback>,
}

impl CallbackWrapper {
    /// Create a new callback wrapper
    ///
    /// # Parameters
    /// - `callback`: Callback object implementing the TimerCallback trait
    ///
    /// 创建一个新的回调包装器
    ///
    /// # 参数
    /// - `callback`: 实现 TimerCallback 特性的回调对象
    #[inline]
    pub fn new(callback: impl TimerCallback) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }
}

impl TimerTask for CallbackWrapper {
    fn run(
        &self,
        _handle: Arc<TimeoutHandle>,
        _token: CancellationToken,
    ) -> BoxFuture<'static, Result<(), TaskError>> {
        let future = self.callback.call();
        Box::pin(async move {
            future.await;
            Ok(())
        })
    }
}

/// 可取消回调特性 (Cancelable Callback Trait)
///
/// Fallible variant of [`TimerCallback`] for work that wants to observe the
/// run cancel token. A blanket impl covers
/// `Fn(CancellationToken) -> Future<Output = Result<(), TaskError>>` closures.
///
/// [`TimerCallback`] 的可失败变体，用于希望观察运行取消令牌的工作。
/// 针对返回 `Result` 的 `Fn(CancellationToken)` 闭包有统一实现。
pub trait CancelableCallback: Send + Sync + 'static {
    /// 执行回调函数 (Execute the callback)
    fn call(
        &self,
        token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;
}

impl<F, Fut> CancelableCallback for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn call(
        &self,
        token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>> {
        Box::pin(self(token))
    }
}

/// 可取消回调包装器 (Cancelable Callback Wrapper)
///
/// # Examples (示例)
///
/// ```
/// use hashed_wheel_timer::{CancelableWrapper, CancellationToken, TaskError};
///
/// let callback = CancelableWrapper::new(|token: CancellationToken| async move {
///     if token.is_cancelled() {
///         return Err(TaskError::Canceled);
///     }
///     Ok(())
/// });
/// ```
#[derive(Clone)]
pub struct CancelableWrapper {
    callback: Arc<dyn CancelableCallback>,
}

impl CancelableWrapper {
    /// 创建一个新的可取消回调包装器 (Create a new cancelable callback wrapper)
    #[inline]
    pub fn new(callback: impl CancelableCallback) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }
}

impl TimerTask for CancelableWrapper {
    fn run(
        &self,
        _handle: Arc<TimeoutHandle>,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<(), TaskError>> {
        self.callback.call(token)
    }
}

type HookFn = dyn Fn(u64, TaskError) + Send + Sync;

/// 未处理失败回调槽 (Unhandled failure hook slot)
///
/// Holds the user-installed hook invoked when a task fails with a non-cancel
/// error. The hook is cloned out of the lock before being invoked.
///
/// 保存用户安装的回调，当任务以非取消错误失败时被调用。回调在锁外调用。
pub(crate) struct FailureHook {
    slot: Mutex<Option<Arc<HookFn>>>,
}

impl FailureHook {
    pub(crate) fn new() -> Self {
        Self { slot: Mutex::new(None) }
    }

    pub(crate) fn set(&self, hook: Arc<HookFn>) {
        *self.slot.lock() = Some(hook);
    }

    /// Invoked at most once per failed execution, never from within a lock
    ///
    /// 每次失败的执行至多调用一次，绝不在持锁状态下调用
    pub(crate) fn report(&self, timeout_id: u64, error: TaskError) {
        let hook = self.slot.lock().clone();
        match hook {
            Some(hook) => hook(timeout_id, error),
            None => warn!(timeout_id, error = %error, "unhandled timer task failure"),
        }
    }
}
