use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::align::{Aligner, LocationResult};
use crate::io::signal::SignalRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Aligning,
    Stopped,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Idle,
            1 => WorkerState::Aligning,
            _ => WorkerState::Stopped,
        }
    }
}

/// worker 线程与控制线程共享的状态。
#[derive(Debug)]
pub(crate) struct Shared {
    state: AtomicU8,
    running: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self { state: AtomicU8::new(WorkerState::Idle as u8), running: AtomicBool::new(true) }
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: WorkerState) {
        self.state.store(s as u8, Ordering::Release);
    }
}

/// 线程启动时接管的全部资源。
struct Parts<A> {
    aligner: A,
    input: Receiver<SignalRead>,
    output: Sender<LocationResult>,
}

/// 控制线程一侧的 worker 记录。
pub(crate) struct Worker<A: Aligner> {
    pub(crate) id: usize,
    /// 停止时丢弃，唤醒阻塞在 `recv` 上的 worker
    pub(crate) input: Option<Sender<SignalRead>>,
    pub(crate) output: Receiver<LocationResult>,
    /// 已派发但控制线程尚未收集
    pub(crate) outstanding: usize,
    pub(crate) shared: Arc<Shared>,
    parts: Option<Parts<A>>,
    handle: Option<JoinHandle<()>>,
}

impl<A: Aligner> Worker<A> {
    pub(crate) fn new(id: usize, aligner: A, batch_size: usize) -> Self {
        let (in_tx, in_rx) = crossbeam_channel::bounded(batch_size);
        let (out_tx, out_rx) = crossbeam_channel::unbounded();
        Self {
            id,
            input: Some(in_tx),
            output: out_rx,
            outstanding: 0,
            shared: Arc::new(Shared::new()),
            parts: Some(Parts { aligner, input: in_rx, output: out_tx }),
            handle: None,
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.parts.is_none()
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.input.as_ref().map_or(0, Sender::len)
    }

    pub(crate) fn start(&mut self) -> std::io::Result<()> {
        let Some(parts) = self.parts.take() else {
            return Ok(());
        };
        let shared = Arc::clone(&self.shared);
        let id = self.id;
        let handle = thread::Builder::new()
            .name(format!("rawmap-worker-{}", id))
            .spawn(move || run(id, parts, &shared))?;
        self.handle = Some(handle);
        Ok(())
    }

    /// 请求协作式停止并等待线程退出。
    pub(crate) fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.input = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(worker = self.id, "worker thread terminated abnormally");
            }
        }
        self.shared.set_state(WorkerState::Stopped);
    }
}

fn run<A: Aligner>(id: usize, parts: Parts<A>, shared: &Shared) {
    let Parts { mut aligner, input, output } = parts;
    debug!(worker = id, "worker started");
    loop {
        shared.set_state(WorkerState::Idle);
        // 阻塞等待；发送端被丢弃（stop）时返回 Err
        let Ok(read) = input.recv() else { break };
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        shared.set_state(WorkerState::Aligning);
        let result = align_one(id, &mut aligner, read);
        if output.send(result).is_err() {
            break;
        }
    }
    shared.set_state(WorkerState::Stopped);
    debug!(worker = id, "worker exited");
}

/// 错误与恐慌都转为 `Failed` 结果，循环继续。
fn align_one<A: Aligner>(worker: usize, aligner: &mut A, read: SignalRead) -> LocationResult {
    let SignalRead { read_id, samples } = read;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        aligner.new_read(&read_id);
        aligner.add_samples(&samples)
    }));
    match outcome {
        Ok(Ok(loc)) => loc,
        Ok(Err(e)) => {
            warn!(worker, read_id = %read_id, error = %e, "alignment failed");
            LocationResult::failed(read_id)
        }
        Err(_) => {
            warn!(worker, read_id = %read_id, "aligner panicked");
            LocationResult::failed(read_id)
        }
    }
}
