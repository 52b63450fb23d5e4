use crate::config::TimerConfig;
use crate::task::{CallbackWrapper, CancelableWrapper, TaskError};
use crate::timer::HashedWheelTimer;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast_timer() -> HashedWheelTimer {
    let config = TimerConfig::builder()
        .tick_interval(Duration::from_millis(10))
        .bucket_count(64)
        .build()
        .unwrap();
    HashedWheelTimer::new(config)
}

#[tokio::test]
async fn test_recurring_runs_recurring_plus_one_times() {
    let timer = fast_timer();
    timer.run(CancellationToken::new()).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);
    // recurring = 2 表示首次之后再执行两次，总共三次
    // (recurring = 2 means two more executions after the first, three in total)
    let handle = timer
        .submit_recurring(
            CallbackWrapper::new(move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
            Duration::from_millis(50),
            2,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert!(handle.expired());
    // 名额只释放一次，且在最后一次执行时释放
    // (The slot is released once, at the final execution)
    assert_eq!(timer.pending_timeouts(), 0);

    timer.stop().await;
}

#[tokio::test]
async fn test_recurring_executions_are_spaced_by_the_interval() {
    let timer = fast_timer();
    timer.run(CancellationToken::new()).unwrap();

    let stamps = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let stamps_clone = Arc::clone(&stamps);
    let started = std::time::Instant::now();

    timer
        .submit_recurring(
            CallbackWrapper::new(move || {
                let stamps = Arc::clone(&stamps_clone);
                async move {
                    stamps.lock().push(started.elapsed());
                }
            }),
            Duration::from_millis(60),
            2,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    let stamps = stamps.lock().clone();
    assert_eq!(stamps.len(), 3);
    // 第 n 次执行不早于 n 个间隔 (Execution n is never earlier than n intervals)
    for (n, stamp) in stamps.iter().enumerate() {
        let floor = Duration::from_millis(60 * (n as u64 + 1));
        assert!(*stamp >= floor, "run {} at {:?}, floor {:?}", n, stamp, floor);
    }

    timer.stop().await;
}

#[tokio::test]
async fn test_recurring_cancel_midway_stops_executions() {
    let timer = fast_timer();
    timer.run(CancellationToken::new()).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);
    let handle = timer
        .submit_recurring(
            CallbackWrapper::new(move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
            Duration::from_millis(50),
            10,
        )
        .unwrap();

    // 让前几次执行发生，然后取消 (Let the first runs happen, then cancel)
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(handle.cancel());
    let seen = counter.load(Ordering::SeqCst);
    assert!(seen >= 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(counter.load(Ordering::SeqCst), seen);
    assert!(handle.canceled());
    assert_eq!(timer.pending_timeouts(), 0);

    timer.stop().await;
}

#[tokio::test]
async fn test_recurring_cooperative_cancel_from_inside_the_task() {
    let timer = fast_timer();
    timer.run(CancellationToken::new()).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);
    // 第二次执行时任务自行协作退出 (The task bails out cooperatively on run two)
    let handle = timer
        .submit_recurring(
            CancelableWrapper::new(move |_token: CancellationToken| {
                let counter = Arc::clone(&counter_clone);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) >= 1 {
                        return Err(TaskError::Canceled);
                    }
                    Ok(())
                }
            }),
            Duration::from_millis(40),
            10,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(handle.canceled());
    assert!(!handle.expired());
    assert_eq!(timer.pending_timeouts(), 0);

    timer.stop().await;
}

#[tokio::test]
async fn test_failing_recurring_task_keeps_recurring() {
    let timer = fast_timer();
    timer.run(CancellationToken::new()).unwrap();

    let failures = Arc::new(AtomicU32::new(0));
    let failures_clone = Arc::clone(&failures);
    timer.set_unhandled_failure_hook(move |_, _| {
        failures_clone.fetch_add(1, Ordering::SeqCst);
    });

    let runs = Arc::new(AtomicU32::new(0));
    let runs_clone = Arc::clone(&runs);
    let handle = timer
        .submit_recurring(
            CancelableWrapper::new(move |_token: CancellationToken| {
                let runs = Arc::clone(&runs_clone);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Err(TaskError::failed("flaky"))
                }
            }),
            Duration::from_millis(40),
            2,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    // 失败不会中断周期调度 (Failures do not interrupt the recurrence)
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(failures.load(Ordering::SeqCst), 3);
    assert!(handle.expired());

    timer.stop().await;
}
