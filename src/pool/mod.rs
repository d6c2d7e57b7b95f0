//! 流式比对线程池。
//!
//! 控制线程维护一个无界待处理队列（backlog），每个 worker 拥有一对通道：
//! 容量为 `batch_size` 的输入通道与无界输出通道。通道两端各只有一方，
//! 因此锁竞争始终是两方的。`poll` 负责收集结果并按滞后阈值批量补充输入。
//!
//! backlog 本身无界：持续过量投递会使内存无限增长，背压只作用于每个 worker 的输入容量。
//! 打不开或读不出的信号源被记录并跳过，不会上报错误；调用方需要通过
//! [`PoolStats`] 自行区分"无事可做"与"全部失败"。

mod worker;

use std::collections::VecDeque;
use std::path::PathBuf;

use crossbeam_channel::TrySendError;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::align::{Aligner, LocationResult, MapStatus};
use crate::io::signal::{self, SignalOpener};
use worker::Worker;
pub use worker::WorkerState;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("pool already started")]
    AlreadyStarted,

    #[error("pool has been stopped")]
    Stopped,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    /// 每个 worker 输入队列的容量
    pub batch_size: usize,
    /// 队列长度低于该值时补充；默认 `batch_size / 2`（至少为 1）
    pub refill_below: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { workers: 1, batch_size: 16, refill_below: None }
    }
}

impl PoolConfig {
    fn refill_threshold(&self) -> usize {
        self.refill_below.unwrap_or(self.batch_size / 2).max(1)
    }

    fn validate(&self) -> Result<(), PoolError> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig("worker count must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(PoolError::InvalidConfig("batch size must be positive".into()));
        }
        if self.refill_threshold() > self.batch_size {
            return Err(PoolError::InvalidConfig(format!(
                "refill threshold {} exceeds batch size {}",
                self.refill_threshold(),
                self.batch_size
            )));
        }
        Ok(())
    }
}

/// 累计计数，供外部核对。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 已读取并交给 worker 的信号源
    pub dispatched: u64,
    /// 无法打开或读取的信号源
    pub skipped: u64,
    /// 已收集的 mapped / unmapped 结果
    pub completed: u64,
    /// 已收集的 `Failed` 结果
    pub failed: u64,
}

pub struct MapperPool<A: Aligner, O: SignalOpener> {
    opener: O,
    config: PoolConfig,
    refill_below: usize,
    backlog: VecDeque<PathBuf>,
    workers: Vec<Worker<A>>,
    stats: PoolStats,
    stopped: bool,
}

impl<A: Aligner, O: SignalOpener> MapperPool<A, O> {
    /// 创建各 worker 及其比对器，此时尚不启动线程。
    pub fn new(params: &A::Params, opener: O, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let workers = (0..config.workers)
            .map(|id| Worker::new(id, A::from_params(params), config.batch_size))
            .collect();
        Ok(Self {
            opener,
            config,
            refill_below: config.refill_threshold(),
            backlog: VecDeque::new(),
            workers,
            stats: PoolStats::default(),
            stopped: false,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn start_all(&mut self) -> Result<(), PoolError> {
        if self.stopped {
            return Err(PoolError::Stopped);
        }
        if self.workers.iter().any(Worker::is_started) {
            return Err(PoolError::AlreadyStarted);
        }
        for w in &mut self.workers {
            w.start()?;
        }
        info!(workers = self.workers.len(), batch_size = self.config.batch_size, "mapper pool started");
        Ok(())
    }

    /// 将信号源追加到 backlog，不会阻塞。
    pub fn enqueue_sources<I, P>(&mut self, sources: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.backlog.extend(sources.into_iter().map(Into::into));
    }

    /// 收集各 worker 已完成的结果，并为输入队列低于阈值的 worker 补充读段。
    pub fn poll(&mut self) -> Vec<LocationResult> {
        let mut out = Vec::new();
        for wi in 0..self.workers.len() {
            self.drain(wi, &mut out);
            self.refill(wi);
        }
        out
    }

    fn drain(&mut self, wi: usize, out: &mut Vec<LocationResult>) {
        let w = &mut self.workers[wi];
        for loc in w.output.try_iter() {
            w.outstanding -= 1;
            match loc.status {
                MapStatus::Failed => self.stats.failed += 1,
                _ => self.stats.completed += 1,
            }
            out.push(loc);
        }
    }

    fn refill(&mut self, wi: usize) {
        let w = &mut self.workers[wi];
        let Some(tx) = w.input.as_ref() else { return };
        if tx.len() >= self.refill_below {
            return;
        }
        while tx.len() < self.config.batch_size {
            let Some(path) = self.backlog.pop_front() else { break };
            let read = match signal::read_signal(&self.opener, &path) {
                Ok(read) => read,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable signal source");
                    self.stats.skipped += 1;
                    continue;
                }
            };
            match tx.try_send(read) {
                Ok(()) => {
                    w.outstanding += 1;
                    self.stats.dispatched += 1;
                }
                Err(TrySendError::Full(read)) | Err(TrySendError::Disconnected(read)) => {
                    // 只有控制线程发送，出现这种情况说明 worker 已退出
                    warn!(worker = w.id, read_id = %read.read_id, "worker input closed, dropping read");
                    self.stats.skipped += 1;
                    break;
                }
            }
        }
        debug!(worker = w.id, queued = tx.len(), backlog = self.backlog.len(), "refilled worker");
    }

    /// backlog 为空且所有已派发读段的结果都已通过 `poll` 收集时为真。
    pub fn all_finished(&self) -> bool {
        self.backlog.is_empty() && self.workers.iter().all(|w| w.outstanding == 0)
    }

    /// 通知所有 worker 停止并等待其退出。正在比对的 worker 会先完成当前读段，
    /// 队列中剩余的读段被丢弃。
    pub fn stop_all(&mut self) {
        if self.stopped {
            return;
        }
        for w in &mut self.workers {
            w.stop();
        }
        self.stopped = true;
        info!(
            dispatched = self.stats.dispatched,
            skipped = self.stats.skipped,
            completed = self.stats.completed,
            failed = self.stats.failed,
            "mapper pool stopped"
        );
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn queue_lens(&self) -> Vec<usize> {
        self.workers.iter().map(Worker::queue_len).collect()
    }

    /// 已派发但结果尚未收集的读段数。
    pub fn outstanding(&self) -> usize {
        self.workers.iter().map(|w| w.outstanding).sum()
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(|w| w.shared.state()).collect()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

impl<A: Aligner, O: SignalOpener> Drop for MapperPool<A, O> {
    fn drop(&mut self) {
        self.stop_all();
    }
}
