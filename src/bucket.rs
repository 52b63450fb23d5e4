//! 桶模块 (Bucket Module)
//!
//! One bucket per wheel slot. Each bucket is backed by two multi-producer
//! FIFO queues: the due queue holds entries that fire on the bucket's next
//! visit, the pending queue holds entries that still owe one or more full
//! revolutions. Producers are submitters and the recurrence path; the single
//! consumer is the driver.
//!
//! 每个时间轮槽位对应一个桶。每个桶由两个多生产者 FIFO 队列支撑：
//! 到期队列保存将在该桶下次被访问时触发的条目，等待队列保存仍欠一整轮或多轮的条目。
//! 生产者是提交方和周期重调度路径；唯一的消费者是驱动器。

use std::sync::Arc;

use crossbeam_queue::SegQueue;
use smallvec::SmallVec;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::handle::TimeoutHandle;
use crate::task::{FailureHook, TaskError};

pub(crate) struct Bucket {
    due: SegQueue<Arc<TimeoutHandle>>,
    pending: SegQueue<Arc<TimeoutHandle>>,
}

impl Bucket {
    pub(crate) fn new() -> Self {
        Self {
            due: SegQueue::new(),
            pending: SegQueue::new(),
        }
    }

    /// Route an entry by its residual round count. Non-blocking, safe under
    /// concurrent producers.
    ///
    /// 按剩余轮数路由条目。非阻塞，可在并发生产者下安全调用。
    pub(crate) fn add(&self, handle: Arc<TimeoutHandle>) {
        if handle.remaining_rounds() == 0 {
            self.due.push(handle);
        } else {
            self.pending.push(handle);
        }
    }

    /// Drain the due queue and dispatch every live entry, at most
    /// `max_parallel` at a time. Returns the handles that finished a run and
    /// still owe recurrences; the wheel reschedules those.
    ///
    /// The drain is bounded by the queue length observed at entry, so entries
    /// pushed concurrently are left for the next revolution. A fresh semaphore
    /// scopes the parallelism to this pass alone, and every launched execution
    /// is awaited before returning.
    ///
    /// 排空到期队列并调度每个存活条目，同时最多执行 `max_parallel` 个。
    /// 返回已完成一次运行且仍有周期次数的句柄；由时间轮重新调度。
    ///
    /// 排空以进入时观察到的队列长度为界，因此并发推入的条目留到下一轮。
    /// 新建的信号量只作用于本次排空，所有已启动的执行在返回前全部等待完成。
    pub(crate) async fn expire_due(
        &self,
        now_ms: u64,
        max_parallel: usize,
        token: &CancellationToken,
        hook: &Arc<FailureHook>,
    ) -> Vec<Arc<TimeoutHandle>> {
        let budget = self.due.len();
        if budget == 0 {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(max_parallel));
        let mut running: SmallVec<[(Arc<TimeoutHandle>, JoinHandle<()>); 8]> = SmallVec::new();

        for _ in 0..budget {
            if token.is_cancelled() {
                break;
            }
            let handle = match self.due.pop() {
                Some(handle) => handle,
                None => break,
            };

            if handle.canceled() {
                handle.release_slot();
                continue;
            }

            // A recurrence can land an entry here before its deadline passes;
            // keep it queued for the next revolution instead of firing early.
            // 周期重调度可能在截止时间到达前把条目放到这里；
            // 保留在队列中等下一轮，而不是提前触发。
            if handle.deadline_millis() > now_ms {
                self.due.push(handle);
                continue;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    self.due.push(handle);
                    break;
                }
            };

            let entry = Arc::clone(&handle);
            let run_token = token.clone();
            let run_hook = Arc::clone(hook);
            let join = tokio::spawn(async move {
                let _permit = permit;
                entry.expire(&run_token, &run_hook).await;
            });
            running.push((handle, join));
        }

        let mut recurrences = Vec::new();
        for (handle, join) in running {
            if let Err(join_error) = join.await {
                if join_error.is_panic() {
                    hook.report(handle.id(), TaskError::failed("timer task panicked"));
                }
            }
            if handle.canceled() {
                // Canceled before or during the run; the entry leaves the
                // wheel here, so its admission slot goes back now.
                // 在运行前或运行中被取消；条目在此离开时间轮，立即归还准入名额。
                handle.release_slot();
            } else if handle.recurring_rounds() > 0 {
                recurrences.push(handle);
            }
        }
        recurrences
    }

    /// Age the pending queue by one visit: drop canceled entries, decrement
    /// the round count of the rest, and promote entries that reach zero to
    /// the due queue. Bounded by the length snapshot taken at entry so
    /// entries inserted during aging are not processed twice.
    ///
    /// 将等待队列老化一次：丢弃已取消的条目，递减其余条目的轮数，
    /// 轮数归零的条目晋升到到期队列。以进入时的长度快照为界，
    /// 避免重复处理老化期间插入的条目。
    pub(crate) fn age(&self, token: &CancellationToken) {
        let budget = self.pending.len();
        for _ in 0..budget {
            if token.is_cancelled() {
                return;
            }
            let handle = match self.pending.pop() {
                Some(handle) => handle,
                None => return,
            };

            if handle.canceled() {
                handle.release_slot();
                continue;
            }

            if handle.decrement_remaining_rounds() == 0 {
                self.due.push(handle);
            } else {
                self.pending.push(handle);
            }
        }
    }

    /// Drain everything still queued, pending entries first. Canceled entries
    /// are dropped on the way out with their admission slot released.
    ///
    /// 排空仍在队列中的所有条目，等待队列优先。
    /// 已取消的条目在排出时被丢弃并归还准入名额。
    pub(crate) fn unprocessed(&self) -> Vec<Arc<TimeoutHandle>> {
        let mut remaining = Vec::new();
        while let Some(handle) = self.pending.pop() {
            if handle.canceled() {
                handle.release_slot();
            } else {
                remaining.push(handle);
            }
        }
        while let Some(handle) = self.due.pop() {
            if handle.canceled() {
                handle.release_slot();
            } else {
                remaining.push(handle);
            }
        }
        remaining
    }

    #[cfg(test)]
    pub(crate) fn due_len(&self) -> usize {
        self.due.len()
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
