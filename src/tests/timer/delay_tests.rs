use crate::config::TimerConfig;
use crate::task::CallbackWrapper;
use crate::timer::HashedWheelTimer;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
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
async fn test_fires_after_requested_delay() {
    let timer = fast_timer();
    timer.run(CancellationToken::new()).unwrap();

    let fired_at = Arc::new(Mutex::new(None::<Duration>));
    let fired_clone = Arc::clone(&fired_at);
    let submitted = Instant::now();

    let handle = timer
        .submit(
            CallbackWrapper::new(move || {
                let fired_at = Arc::clone(&fired_clone);
                async move {
                    *fired_at.lock() = Some(submitted.elapsed());
                }
            }),
            Duration::from_millis(100),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    let elapsed = fired_at.lock().expect("task should have fired");
    // Never early; bounded lateness under quiescent load
    // (绝不提前；静载下延迟有界)
    assert!(elapsed >= Duration::from_millis(100), "fired early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(250), "fired late: {:?}", elapsed);
    assert!(handle.expired());

    timer.stop().await;
}

#[tokio::test]
async fn test_does_not_fire_before_delay() {
    let timer = fast_timer();
    timer.run(CancellationToken::new()).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);
    let handle = timer
        .submit(
            CallbackWrapper::new(move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
            Duration::from_millis(500),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(!handle.expired());

    // The unfired timeout comes back out at stop time
    // (未触发的超时在停止时被取回)
    let unprocessed = timer.stop().await;
    assert_eq!(unprocessed.len(), 1);
    assert_eq!(unprocessed[0].id(), handle.id());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_zero_delay_fires_on_an_early_tick() {
    let timer = fast_timer();
    timer.run(CancellationToken::new()).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);
    timer
        .submit(
            CallbackWrapper::new(move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
            Duration::ZERO,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    timer.stop().await;
}

#[tokio::test]
async fn test_same_bucket_entries_all_fire() {
    let timer = fast_timer();
    timer.run(CancellationToken::new()).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    // 同一延迟的条目共享同一个桶 (Entries with the same delay share a bucket)
    for _ in 0..50 {
        let counter_clone = Arc::clone(&counter);
        timer
            .submit(
                CallbackWrapper::new(move || {
                    let counter = Arc::clone(&counter_clone);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }),
                Duration::from_millis(50),
            )
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 50);
    assert_eq!(timer.pending_timeouts(), 0);

    timer.stop().await;
}
