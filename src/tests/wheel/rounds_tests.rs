use crate::config::TimerConfig;
use crate::task::CallbackWrapper;
use crate::timer::HashedWheelTimer;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// 10ms tick 和 16 个桶给出 160ms 的轮跨度，方便快速跨越多圈
/// (A 10ms tick with 16 buckets gives a 160ms span, quick to revolve past)
fn tiny_wheel_timer() -> HashedWheelTimer {
    let config = TimerConfig::builder()
        .tick_interval(Duration::from_millis(10))
        .bucket_count(16)
        .build()
        .unwrap();
    HashedWheelTimer::new(config)
}

#[tokio::test]
async fn test_deadline_beyond_the_span_fires_on_time() {
    let timer = tiny_wheel_timer();
    timer.run(CancellationToken::new()).unwrap();

    let fired_at = Arc::new(Mutex::new(None::<Duration>));
    let fired_clone = Arc::clone(&fired_at);
    let submitted = Instant::now();

    // 500ms 约为三整圈之后 (500ms is roughly three full revolutions out)
    timer
        .submit(
            CallbackWrapper::new(move || {
                let fired_at = Arc::clone(&fired_clone);
                async move {
                    *fired_at.lock() = Some(submitted.elapsed());
                }
            }),
            Duration::from_millis(500),
        )
        .unwrap();

    // 轮子扫过该桶两次时不得触发 (Two sweeps past the bucket must not fire it)
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(fired_at.lock().is_none());

    tokio::time::sleep(Duration::from_millis(350)).await;
    let elapsed = fired_at.lock().expect("task should have fired");
    assert!(elapsed >= Duration::from_millis(500), "fired early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(680), "fired late: {:?}", elapsed);

    timer.stop().await;
}

#[tokio::test]
async fn test_mixed_rounds_in_the_same_bucket() {
    let timer = tiny_wheel_timer();
    timer.run(CancellationToken::new()).unwrap();

    let near = Arc::new(AtomicU32::new(0));
    let far = Arc::new(AtomicU32::new(0));

    // 两个条目共享桶索引，但相差一整圈
    // (Two entries share a bucket index but differ by one full revolution)
    let near_clone = Arc::clone(&near);
    timer
        .submit(
            CallbackWrapper::new(move || {
                let near = Arc::clone(&near_clone);
                async move {
                    near.fetch_add(1, Ordering::SeqCst);
                }
            }),
            Duration::from_millis(80),
        )
        .unwrap();
    let far_clone = Arc::clone(&far);
    timer
        .submit(
            CallbackWrapper::new(move || {
                let far = Arc::clone(&far_clone);
                async move {
                    far.fetch_add(1, Ordering::SeqCst);
                }
            }),
            Duration::from_millis(80 + 160),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(near.load(Ordering::SeqCst), 1);
    assert_eq!(far.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(far.load(Ordering::SeqCst), 1);

    timer.stop().await;
}

#[tokio::test]
async fn test_recurring_interval_longer_than_the_span() {
    let timer = tiny_wheel_timer();
    timer.run(CancellationToken::new()).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);
    // 200ms 间隔超过 160ms 跨度，每次重排都要重新计轮
    // (A 200ms interval exceeds the 160ms span, every reschedule recounts rounds)
    let handle = timer
        .submit_recurring(
            CallbackWrapper::new(move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
            Duration::from_millis(200),
            2,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert!(handle.expired());

    timer.stop().await;
}
