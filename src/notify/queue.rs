//! Bounded background work queue.
//!
//! Slow notification channels run on a fixed pool of worker threads fed by a
//! bounded channel. Submitting never blocks: when the queue is full the job is
//! dropped and counted. Workers are detached; jobs still queued at process
//! exit are abandoned.

use anyhow::{anyhow, Context, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitError {
    /// Queue at capacity; job dropped.
    Full,
    /// All workers are gone.
    Closed,
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "queue full"),
            Self::Closed => write!(f, "queue closed"),
        }
    }
}

impl std::error::Error for SubmitError {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub dropped: u64,
    pub completed: u64,
    pub panicked: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

pub struct WorkQueue {
    name: String,
    tx: SyncSender<Job>,
    counters: Arc<Counters>,
}

impl WorkQueue {
    pub fn new(name: &str, workers: usize, capacity: usize) -> Result<Self> {
        if workers == 0 {
            return Err(anyhow!("{} queue needs at least one worker", name));
        }
        if capacity == 0 {
            return Err(anyhow!("{} queue capacity must be greater than zero", name));
        }
        let (tx, rx) = sync_channel::<Job>(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());
        for index in 0..workers {
            let rx = rx.clone();
            let counters = counters.clone();
            let thread_name = format!("{name}-worker-{index}");
            std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || run_worker(&thread_name, rx, counters))
                .with_context(|| format!("spawn {name} worker {index}"))?;
        }
        Ok(Self {
            name: name.to_string(),
            tx,
            counters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue without blocking.
    pub fn submit(&self, job: Job) -> std::result::Result<(), SubmitError> {
        match self.tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SubmitError::Full)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SubmitError::Closed)
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }
}

fn run_worker(name: &str, rx: Arc<Mutex<Receiver<Job>>>, counters: Arc<Counters>) {
    loop {
        // Hold the lock only while waiting for the next job.
        let job = {
            let Ok(guard) = rx.lock() else {
                log::error!("{}: queue lock poisoned, worker exiting", name);
                return;
            };
            guard.recv()
        };
        let Ok(job) = job else {
            log::debug!("{}: queue closed, worker exiting", name);
            return;
        };
        match catch_unwind(AssertUnwindSafe(job)) {
            Ok(()) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                log::error!("{}: notification job panicked", name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn wait_for(queue: &WorkQueue, pred: impl Fn(QueueStats) -> bool) -> QueueStats {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let stats = queue.stats();
            if pred(stats) || Instant::now() > deadline {
                return stats;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn rejects_empty_pool() {
        assert!(WorkQueue::new("test", 0, 4).is_err());
        assert!(WorkQueue::new("test", 1, 0).is_err());
    }

    #[test]
    fn runs_submitted_jobs() {
        let queue = WorkQueue::new("test", 2, 8).unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..4 {
            let tx = tx.clone();
            queue.submit(Box::new(move || tx.send(i).unwrap())).unwrap();
        }
        let mut seen: Vec<i32> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(wait_for(&queue, |s| s.completed == 4).completed, 4);
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let queue = WorkQueue::new("test", 1, 1).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        queue
            .submit(Box::new(move || {
                started_tx.send(()).unwrap();
                let _ = release_rx.recv();
            }))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Worker busy: one slot in the channel, then full.
        queue.submit(Box::new(|| {})).unwrap();
        let started = Instant::now();
        assert_eq!(queue.submit(Box::new(|| {})), Err(SubmitError::Full));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(queue.stats().dropped, 1);

        release_tx.send(()).unwrap();
        assert_eq!(wait_for(&queue, |s| s.completed == 2).completed, 2);
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let queue = WorkQueue::new("test", 1, 4).unwrap();
        queue.submit(Box::new(|| panic!("boom"))).unwrap();
        let (tx, rx) = mpsc::channel();
        queue.submit(Box::new(move || tx.send(()).unwrap())).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let stats = wait_for(&queue, |s| s.panicked == 1 && s.completed == 1);
        assert_eq!(stats.panicked, 1);
    }
}
