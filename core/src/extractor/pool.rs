//! 有界工作线程池
//!
//! 生产者在调用线程上按批次投递任务，队列深度为 1；
//! 工作线程满载时生产者阻塞，在途任务数因此有上限。

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, sync_channel};
use std::sync::{Mutex, PoisonError};
use std::thread;

use tracing::{debug, warn};

/// 固定并发数与批大小的线程池
#[derive(Debug, Clone, Copy)]
pub struct BoundedPool {
    workers: NonZeroUsize,
    batch_size: NonZeroUsize,
}

impl BoundedPool {
    /// 创建线程池
    #[must_use]
    pub const fn new(workers: NonZeroUsize, batch_size: NonZeroUsize) -> Self {
        Self {
            workers,
            batch_size,
        }
    }

    /// 工作线程数
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers.get()
    }

    /// 每批任务数
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// 同时存在的任务数上限：每个工作线程一批、队列中一批、生产者手中一批
    #[must_use]
    pub const fn in_flight_limit(&self) -> usize {
        (self.workers.get() + 2) * self.batch_size.get()
    }

    /// 对 `items` 中每一项执行 `work`，收集返回 `Some` 的结果
    ///
    /// 结果顺序不确定，由调用方自行排序。所有工作线程退出后才返回。
    /// 单项任务 panic 时按 `None` 处理，不影响其他任务。
    pub fn run<I, R, F>(&self, items: I, work: F) -> Vec<R>
    where
        I: IntoIterator,
        I::Item: Send,
        R: Send,
        F: Fn(I::Item) -> Option<R> + Sync,
    {
        let results = Mutex::new(Vec::new());
        let (batch_tx, batch_rx) = sync_channel::<Vec<I::Item>>(1);
        let batch_rx = Mutex::new(batch_rx);

        let spawned = thread::scope(|scope| {
            let mut spawned = 0usize;
            for id in 0..self.workers.get() {
                let handle = thread::Builder::new()
                    .name(format!("enhance-worker-{id}"))
                    .spawn_scoped(scope, || worker_loop(&batch_rx, &results, &work));
                match handle {
                    Ok(_) => spawned += 1,
                    Err(e) => warn!(worker = id, error = %e, "工作线程创建失败"),
                }
            }

            if spawned == 0 {
                // 没有工作线程可用，退化为在当前线程逐项执行
                drop(batch_tx);
                let mut local: Vec<R> = items
                    .into_iter()
                    .filter_map(|item| run_guarded(&work, item))
                    .collect();
                results
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .append(&mut local);
                return 0;
            }

            let mut batch = Vec::with_capacity(self.batch_size.get());
            for item in items {
                batch.push(item);
                if batch.len() == self.batch_size.get() {
                    let full =
                        std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size.get()));
                    if batch_tx.send(full).is_err() {
                        break;
                    }
                }
            }
            if !batch.is_empty() {
                let _ = batch_tx.send(batch);
            }
            // 关闭队列，工作线程取空后退出
            drop(batch_tx);
            spawned
        });

        debug!(workers = spawned, "线程池已退出");
        results.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 工作线程：取批次、逐项执行、写入结果，队列关闭后退出
fn worker_loop<T, R, F>(batch_rx: &Mutex<Receiver<Vec<T>>>, results: &Mutex<Vec<R>>, work: &F)
where
    F: Fn(T) -> Option<R>,
{
    loop {
        let batch = {
            let Ok(rx) = batch_rx.lock() else {
                break;
            };
            match rx.recv() {
                Ok(batch) => batch,
                Err(_) => break,
            }
        };
        let mut produced: Vec<R> = batch
            .into_iter()
            .filter_map(|item| run_guarded(work, item))
            .collect();
        if produced.is_empty() {
            continue;
        }
        results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(&mut produced);
    }
}

/// 执行单项任务，panic 视为失败
fn run_guarded<T, R, F>(work: &F, item: T) -> Option<R>
where
    F: Fn(T) -> Option<R>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| work(item))) {
        Ok(result) => result,
        Err(_) => {
            warn!("任务 panic，已丢弃该项");
            None
        }
    }
}
