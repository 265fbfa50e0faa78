//! Single-slot preview limiter.
//!
//! One worker thread decodes waveforms for the UI, most recent request first.
//! Requests that scroll out of view can be cancelled while still queued, and
//! a newer request for the same path supersedes the older one.

use super::{WaveformCache, WaveformError};
use crate::probe::WaveformData;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

type Reply = Result<Arc<WaveformData>, WaveformError>;

/// Default number of queued requests before the oldest is dropped.
pub const DEFAULT_CAPACITY: usize = 32;

struct Job {
    path: PathBuf,
    cancelled: Arc<AtomicBool>,
    reply: Sender<Reply>,
}

impl Job {
    fn cancel(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.reply.send(Err(WaveformError::Cancelled));
    }
}

#[derive(Default)]
struct QueueState {
    /// Oldest first; the worker pops from the back.
    pending: Vec<Job>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Condvar,
}

/// Handle for one queued waveform request.
pub struct PreviewTicket {
    path: PathBuf,
    cancelled: Arc<AtomicBool>,
    rx: Receiver<Reply>,
}

impl PreviewTicket {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Withdraw the request. Has no effect once decoding has started.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Block until the request completes or is cancelled.
    pub fn wait(self) -> Reply {
        self.rx.recv().unwrap_or(Err(WaveformError::Cancelled))
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Reply> {
        match self.rx.recv_timeout(timeout) {
            Ok(r) => Some(r),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(WaveformError::Cancelled)),
        }
    }
}

pub struct PreviewQueue {
    shared: Arc<Shared>,
    capacity: usize,
    worker: Option<JoinHandle<()>>,
}

impl PreviewQueue {
    pub fn new(cache: Arc<WaveformCache>, capacity: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wake: Condvar::new(),
        });
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("waveform-preview".into())
            .spawn(move || worker_loop(&worker_shared, &cache))
            .map_err(|e| log::error!("Could not start waveform preview worker: {e}"))
            .ok();

        Self {
            shared,
            capacity: capacity.max(1),
            worker,
        }
    }

    /// Queue a request. Pending requests for the same path are cancelled, and
    /// the oldest pending request is dropped when the queue is full.
    pub fn request(&self, path: &Path) -> PreviewTicket {
        let (tx, rx) = channel::bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let ticket = PreviewTicket {
            path: path.to_path_buf(),
            cancelled: cancelled.clone(),
            rx,
        };
        let job = Job {
            path: path.to_path_buf(),
            cancelled,
            reply: tx,
        };

        let Ok(mut state) = self.shared.state.lock() else {
            job.cancel();
            return ticket;
        };
        if state.shutdown || self.worker.is_none() {
            job.cancel();
            return ticket;
        }

        let (superseded, kept): (Vec<Job>, Vec<Job>) =
            std::mem::take(&mut state.pending).into_iter().partition(|j| j.path == job.path);
        state.pending = kept;
        superseded.into_iter().for_each(Job::cancel);

        while state.pending.len() >= self.capacity {
            let oldest = state.pending.remove(0);
            log::debug!("Preview queue full, dropping {}", oldest.path.display());
            oldest.cancel();
        }

        state.pending.push(job);
        drop(state);
        self.shared.wake.notify_one();
        ticket
    }

    /// Requests waiting for the worker.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().map(|s| s.pending.len()).unwrap_or(0)
    }
}

impl Drop for PreviewQueue {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.shutdown = true;
            std::mem::take(&mut state.pending).into_iter().for_each(Job::cancel);
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: &Shared, cache: &WaveformCache) {
    loop {
        let job = {
            let Ok(mut state) = shared.state.lock() else {
                return;
            };
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(job) = state.pending.pop() {
                    break job;
                }
                state = match shared.wake.wait(state) {
                    Ok(s) => s,
                    Err(_) => return,
                };
            }
        };

        if job.cancelled.load(Ordering::SeqCst) {
            log::debug!("Skipping cancelled preview for {}", job.path.display());
            let _ = job.reply.send(Err(WaveformError::Cancelled));
            continue;
        }

        let result = cache.get_or_compute(&job.path);
        let _ = job.reply.send(result);
    }
}
