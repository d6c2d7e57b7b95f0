use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use rawmap::align::{Aligner, LocationResult, MapStatus, Strand};
use rawmap::io::signal::{SignalOpener, SignalSource, SourceError};
use rawmap::pool::{MapperPool, PoolConfig, PoolError, WorkerState};
use tempfile::TempDir;

/// `<read_id>\n<sample> <sample> ...\n`, extension `.sig`.
struct SigFile {
    read_id: String,
    body: String,
}

impl SignalSource for SigFile {
    fn read_id(&self) -> Result<String, SourceError> {
        Ok(self.read_id.clone())
    }

    fn raw_samples(&mut self) -> Result<Vec<f32>, SourceError> {
        self.body
            .split_whitespace()
            .map(|tok| tok.parse::<f32>().map_err(|_| SourceError::Malformed(format!("bad sample '{}'", tok))))
            .collect()
    }
}

struct SigOpener;

impl SignalOpener for SigOpener {
    type Source = SigFile;

    fn is_valid(&self, path: &Path) -> bool {
        path.extension().is_some_and(|e| e == "sig")
    }

    fn open(&self, path: &Path) -> Result<SigFile, SourceError> {
        let text = fs::read_to_string(path)?;
        let (read_id, body) = text
            .split_once('\n')
            .ok_or_else(|| SourceError::Open { path: path.to_path_buf(), reason: "missing header".into() })?;
        Ok(SigFile { read_id: read_id.to_string(), body: body.to_string() })
    }
}

/// Maps every read to chr1 at an offset equal to its sample count.
struct CountAligner {
    read_id: String,
    delay: Duration,
}

impl Aligner for CountAligner {
    type Params = Duration;

    fn from_params(delay: &Duration) -> Self {
        Self { read_id: String::new(), delay: *delay }
    }

    fn new_read(&mut self, read_id: &str) {
        self.read_id = read_id.to_string();
    }

    fn add_samples(&mut self, samples: &[f32]) -> anyhow::Result<LocationResult> {
        thread::sleep(self.delay);
        Ok(LocationResult::mapped(self.read_id.clone(), "chr1", samples.len() as u64, Strand::Forward, 0.9))
    }
}

/// Errors on reads named `err*`, panics on reads named `panic*`.
struct FlakyAligner {
    read_id: String,
}

impl Aligner for FlakyAligner {
    type Params = ();

    fn from_params(_: &()) -> Self {
        Self { read_id: String::new() }
    }

    fn new_read(&mut self, read_id: &str) {
        self.read_id = read_id.to_string();
    }

    fn add_samples(&mut self, _samples: &[f32]) -> anyhow::Result<LocationResult> {
        if self.read_id.starts_with("panic") {
            panic!("aligner blew up on {}", self.read_id);
        }
        if self.read_id.starts_with("err") {
            bail!("no seeds for {}", self.read_id);
        }
        Ok(LocationResult::unmapped(self.read_id.clone()))
    }
}

#[derive(Default)]
struct Gate {
    entered: AtomicBool,
    released: AtomicBool,
}

/// Blocks inside `add_samples` until the gate is released.
struct GatedAligner {
    gate: Arc<Gate>,
    read_id: String,
}

impl Aligner for GatedAligner {
    type Params = Arc<Gate>;

    fn from_params(gate: &Arc<Gate>) -> Self {
        Self { gate: Arc::clone(gate), read_id: String::new() }
    }

    fn new_read(&mut self, read_id: &str) {
        self.read_id = read_id.to_string();
    }

    fn add_samples(&mut self, _samples: &[f32]) -> anyhow::Result<LocationResult> {
        self.gate.entered.store(true, Ordering::SeqCst);
        while !self.gate.released.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(LocationResult::unmapped(self.read_id.clone()))
    }
}

fn write_sig(dir: &Path, name: &str, read_id: &str, samples: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("{}\n{}\n", read_id, samples)).unwrap();
    path
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Poll until finished, checking the accounting invariants on every round.
fn drain_all<A: Aligner, O: SignalOpener>(pool: &mut MapperPool<A, O>, batch_size: usize) -> Vec<LocationResult> {
    let mut results = Vec::new();
    wait_until(|| {
        results.extend(pool.poll());
        let stats = pool.stats();
        assert_eq!(results.len() as u64 + pool.outstanding() as u64, stats.dispatched);
        assert!(pool.queue_lens().iter().all(|&n| n <= batch_size));
        pool.all_finished()
    });
    results
}

#[test]
fn maps_every_readable_source_and_skips_the_rest() {
    let dir = TempDir::new().unwrap();
    let mut sources = Vec::new();
    for i in 0..10 {
        let samples = (0..=i).map(|s| format!("{}.5", 80 + s)).collect::<Vec<_>>().join(" ");
        sources.push(write_sig(dir.path(), &format!("r{}.sig", i), &format!("read{}", i), &samples));
    }
    sources.push(write_sig(dir.path(), "bad1.sig", "bad1", "1.0 oops 2.0"));
    sources.push(write_sig(dir.path(), "bad2.sig", "bad2", "NaNx"));
    sources.push(write_sig(dir.path(), "skip.txt", "skip", "1.0"));
    sources.push(dir.path().join("missing.sig"));

    let config = PoolConfig { workers: 2, batch_size: 4, refill_below: None };
    let mut pool = MapperPool::<CountAligner, _>::new(&Duration::from_millis(2), SigOpener, config).unwrap();
    pool.start_all().unwrap();
    pool.enqueue_sources(sources);
    let results = drain_all(&mut pool, 4);

    assert_eq!(results.len(), 10);
    let ids: HashSet<&str> = results.iter().map(|r| r.read_id.as_str()).collect();
    assert_eq!(ids.len(), 10);
    for r in &results {
        let i: u64 = r.read_id.trim_start_matches("read").parse().unwrap();
        assert_eq!(r.contig.as_deref(), Some("chr1"));
        assert_eq!(r.offset, i + 1);
        assert!(r.is_mapped());
    }

    let stats = pool.stats();
    assert_eq!(stats.dispatched, 10);
    assert_eq!(stats.skipped, 4);
    assert_eq!(stats.completed, 10);
    assert_eq!(stats.failed, 0);
    assert_eq!(pool.backlog_len(), 0);
    assert_eq!(pool.outstanding(), 0);

    pool.stop_all();
    assert_eq!(pool.worker_states(), vec![WorkerState::Stopped; 2]);
}

#[test]
fn errors_and_panics_become_failed_results() {
    let dir = TempDir::new().unwrap();
    let sources = vec![
        write_sig(dir.path(), "a.sig", "ok1", "1 2 3"),
        write_sig(dir.path(), "b.sig", "err1", "1 2 3"),
        write_sig(dir.path(), "c.sig", "panic1", "1 2 3"),
        write_sig(dir.path(), "d.sig", "ok2", "1 2 3"),
    ];
    let config = PoolConfig { workers: 1, batch_size: 2, refill_below: Some(1) };
    let mut pool = MapperPool::<FlakyAligner, _>::new(&(), SigOpener, config).unwrap();
    pool.start_all().unwrap();
    pool.enqueue_sources(sources);
    let results = drain_all(&mut pool, 2);

    assert_eq!(results.len(), 4);
    let status = |id: &str| results.iter().find(|r| r.read_id == id).map(|r| r.status);
    assert_eq!(status("ok1"), Some(MapStatus::Unmapped));
    assert_eq!(status("err1"), Some(MapStatus::Failed));
    assert_eq!(status("panic1"), Some(MapStatus::Failed));
    // 恐慌后 worker 仍继续处理
    assert_eq!(status("ok2"), Some(MapStatus::Unmapped));
    assert_eq!(pool.stats().failed, 2);
    assert_eq!(pool.stats().completed, 2);
}

#[test]
fn stop_waits_for_the_read_in_flight() {
    let dir = TempDir::new().unwrap();
    let sources: Vec<PathBuf> =
        (0..6).map(|i| write_sig(dir.path(), &format!("g{}.sig", i), &format!("g{}", i), "1 2")).collect();
    let gate = Arc::new(Gate::default());
    let config = PoolConfig { workers: 1, batch_size: 4, refill_below: None };
    let mut pool = MapperPool::<GatedAligner, _>::new(&gate, SigOpener, config).unwrap();
    pool.start_all().unwrap();
    pool.enqueue_sources(sources);

    assert!(pool.poll().is_empty());
    assert_eq!(pool.stats().dispatched, 4);
    assert_eq!(pool.backlog_len(), 2);
    wait_until(|| gate.entered.load(Ordering::SeqCst));
    assert_eq!(pool.worker_states(), vec![WorkerState::Aligning]);

    let release = Arc::clone(&gate);
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        release.released.store(true, Ordering::SeqCst);
    });
    pool.stop_all();
    releaser.join().unwrap();
    assert_eq!(pool.worker_states(), vec![WorkerState::Stopped]);

    // 只有正在比对的那条产出结果，其余排队的读段被丢弃
    let results = pool.poll();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].read_id, "g0");
    assert_eq!(pool.stats().dispatched, 4);
    assert_eq!(pool.backlog_len(), 2);
    assert!(!pool.all_finished());
    assert!(matches!(pool.start_all(), Err(PoolError::Stopped)));
}

#[test]
fn nothing_to_do_finishes_immediately() {
    let config = PoolConfig { workers: 3, batch_size: 2, refill_below: None };
    let mut pool = MapperPool::<FlakyAligner, _>::new(&(), SigOpener, config).unwrap();
    pool.start_all().unwrap();
    assert!(pool.poll().is_empty());
    assert!(pool.all_finished());
    assert_eq!(pool.queue_lens(), vec![0, 0, 0]);
}
