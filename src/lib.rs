//! # 哈希时间轮定时器 (Hashed Wheel Timer)
//!
//! 基于哈希时间轮算法实现的近似定时器，支持 tokio 运行时。
//! (Approximate timer based on the hashed wheel algorithm, supports the tokio runtime)
//!
//! ## 特性 (Features)
//!
//! - **高性能 (High Performance)**: 插入、取消和每个 tick 的调度操作的摊还时间复杂度为 O(1)
//!   (O(1) amortized insertion, cancellation and per-tick dispatch)
//! - **大规模支持 (Large-Scale Support)**: 能够高效管理 10000+ 并发超时
//!   (Efficiently manages 10000+ concurrent timeouts)
//! - **异步支持 (Async Support)**: 单驱动器循环运行在 tokio 任务上，用户任务并行执行
//!   (Single driver loop on a tokio task, user tasks execute in parallel)
//! - **协作取消 (Cooperative Cancellation)**: 取消令牌贯穿驱动器和每个用户任务
//!   (The cancel token threads through the driver and every user task)
//!
//! ## 快速开始 (Quick Start)
//!
//! ```no_run
//! use hashed_wheel_timer::{CallbackWrapper, CancellationToken, HashedWheelTimer};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // 创建定时器并启动驱动器 (Create the timer and start the driver)
//!     let timer = HashedWheelTimer::with_defaults();
//!     let token = CancellationToken::new();
//!     timer.run(token.clone()).unwrap();
//!
//!     // 提交一个一秒后触发的任务 (Submit a task firing after one second)
//!     let callback = CallbackWrapper::new(|| async {
//!         println!("Timer fired after 1 second!");
//!     });
//!     let handle = timer.submit(callback, Duration::from_secs(1)).unwrap();
//!
//!     tokio::time::sleep(Duration::from_millis(1_200)).await;
//!     assert!(handle.expired());
//!
//!     // 停止并取回从未触发的超时 (Stop and collect timeouts that never fired)
//!     let unprocessed = timer.stop().await;
//!     assert!(unprocessed.is_empty());
//! }
//! ```
//!
//! ## 架构说明 (Architecture)
//!
//! ### 时间轮算法 (Wheel Algorithm)
//!
//! - 桶数量总是 2 的幂次方，桶索引通过掩码运算得出：`⌊deadline / tick⌋ & (N - 1)`
//!   (Bucket count is always a power of two; the index is computed by masking)
//! - 每个桶持有两个多生产者队列：到期队列和等待队列
//!   (Each bucket holds two multi-producer queues, due and pending)
//! - 超过一整圈的截止时间通过轮次计数处理，每次桶被访问时轮次减一
//!   (Deadlines beyond one revolution use round counting, decremented per visit)
//! - 一个 tick 内先排空到期队列再老化等待队列，因此本 tick 晋升的条目在下一圈触发
//!   (Due drains before aging within a tick, so entries promoted this tick fire next revolution)
//!
//! ### 并发模型 (Concurrency Model)
//!
//! - 单一驱动器按序推进 tick；tick k 的处理结束前 tick k+1 不会开始
//!   (One driver advances ticks sequentially)
//! - 一个桶的到期任务通过每次排空新建的信号量以有界并发执行
//!   (A bucket's due tasks run with bounded parallelism under a per-pass semaphore)
//! - 提交与取消和驱动器并发进行，句柄状态全部为带单向转换规则的原子变量
//!   (Submission and cancellation proceed concurrently with the driver; handle state is atomic with one-way transitions)

mod bucket;
mod clock;
mod config;
mod error;
mod handle;
mod task;
mod timer;
mod wheel;

mod tests;

// 重新导出公共 API (Re-export public API)
pub use clock::{ceil_to_millis, MonotonicClock};
pub use config::{
    TimerConfig, TimerConfigBuilder, MAX_BUCKET_COUNT, MAX_PARALLEL_EXPIRATIONS,
    MAX_PENDING_TIMEOUTS, MAX_WHEEL_SPAN_MS,
};
pub use error::TimerError;
pub use handle::TimeoutHandle;
pub use task::{
    CallbackWrapper, CancelableCallback, CancelableWrapper, TaskError, TimerCallback, TimerTask,
};
pub use timer::HashedWheelTimer;

// 方便起见重新导出取消令牌 (Re-export the cancel token for convenience)
pub use tokio_util::sync::CancellationToken;
