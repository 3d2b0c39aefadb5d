//! 下载工作池。
//!
//! 所有链接先放进有界任务队列并关闭发送端，固定数量的 worker 线程
//! 取任务直到队列耗尽。每个任务带重试与线性退避；完成（成功或重试耗尽）
//! 后推进一次进度，并把结果发给主线程上唯一的汇总方。一个 worker 都起不来时
//! 由调用线程以 worker 1 的身份跑完队列。

use std::thread;

use crossbeam_channel::{self as channel, Receiver, Sender};
use tracing::{debug, warn};

use super::models::RunResult;
use super::progress::ConsoleMultiplexer;
use crate::base_system::retry::{Backoff, retry_with_backoff};

#[derive(Debug, Clone, Copy)]
pub struct DownloadPool {
    workers: usize,
    attempts: u32,
    backoff: Backoff,
    threaded: bool,
}

impl DownloadPool {
    pub fn new(workers: usize, attempts: u32) -> Self {
        Self {
            workers: workers.max(1),
            attempts: attempts.max(1),
            backoff: Backoff::default(),
            threaded: true,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// 不起线程，等同于所有 worker 都启动失败。
    #[cfg(test)]
    fn without_threads(mut self) -> Self {
        self.threaded = false;
        self
    }

    /// 阻塞直到所有任务结束。`per_job(url, worker_id)` 返回本次尝试是否成功；
    /// worker 编号从 1 开始。
    pub fn run<F>(&self, urls: &[String], console: &ConsoleMultiplexer, per_job: F) -> RunResult
    where
        F: Fn(&str, usize) -> bool + Sync,
    {
        let (job_tx, job_rx) = channel::bounded::<&str>(urls.len().max(1));
        for url in urls {
            // 容量等于任务数，不会阻塞
            let _ = job_tx.send(url.as_str());
        }
        drop(job_tx);

        let (result_tx, result_rx) = channel::unbounded::<bool>();
        let per_job = &per_job;

        thread::scope(|scope| {
            let mut started = 0usize;
            let workers = if self.threaded { self.workers } else { 0 };
            for worker_id in 1..=workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("worker-{worker_id}"))
                    .spawn_scoped(scope, move || {
                        self.drain(worker_id, &job_rx, &result_tx, console, per_job)
                    });
                match spawned {
                    Ok(_) => started += 1,
                    Err(err) => warn!(worker_id, "failed to spawn worker: {err}"),
                }
            }
            if started == 0 {
                warn!("no worker thread started, downloading on the calling thread");
                self.drain(1, &job_rx, &result_tx, console, per_job);
            }
            drop(result_tx);

            // 所有 worker 退出后发送端全部释放，迭代结束
            let mut result = RunResult::default();
            for success in result_rx.iter() {
                result.record(success);
            }
            result
        })
    }

    fn drain<F>(
        &self,
        worker_id: usize,
        jobs: &Receiver<&str>,
        results: &Sender<bool>,
        console: &ConsoleMultiplexer,
        per_job: &F,
    ) where
        F: Fn(&str, usize) -> bool + Sync,
    {
        let attempts = self.attempts;
        for url in jobs.iter() {
            let success = retry_with_backoff(
                attempts,
                self.backoff,
                |attempt| {
                    console.log(format!(
                        "[Worker {worker_id}] Retry attempt {attempt}/{attempts} for {url}"
                    ));
                },
                |_| per_job(url, worker_id),
            );
            if !success {
                console.log(format!(
                    "[Worker {worker_id}] Giving up on {url} after {attempts} attempts"
                ));
            }
            let _ = results.send(success);
            console.advance(1);
        }
        debug!(worker_id, "queue drained");
    }
}
