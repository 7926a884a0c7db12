//! Auxiliary script execution on a worker thread
//!
//! `ScriptExecute` commands must not stall the cycle, so they are queued
//! and handed to the [`ScriptRunner`] by a dedicated worker. When the queue
//! is full new requests are dropped with a warning.

use hasi_core::{Command, ScriptRunner, VarStrAssignment, Vas};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

struct ScriptJob {
    script: String,
    vas: Vec<VarStrAssignment>,
}

struct Worker {
    queue: SyncSender<ScriptJob>,
    handle: JoinHandle<()>,
}

/// Queues `ScriptExecute` commands for the script runner
pub struct ScriptExecuteManager {
    queue_size: usize,
    pending: Arc<AtomicUsize>,
    worker: Option<Worker>,
}

impl ScriptExecuteManager {
    /// A manager without a runner; commands are dropped until one is set
    pub fn new(queue_size: usize) -> Self {
        Self {
            queue_size: queue_size.max(1),
            pending: Arc::new(AtomicUsize::new(0)),
            worker: None,
        }
    }

    /// Start a worker feeding `runner`, replacing any previous one
    ///
    /// The previous worker drains its queue in the background.
    pub fn set_runner(&mut self, runner: Arc<dyn ScriptRunner>) {
        self.close();

        let (queue, jobs) = mpsc::sync_channel::<ScriptJob>(self.queue_size);
        let pending = self.pending.clone();
        let spawned = thread::Builder::new()
            .name("hasi-script-runner".to_string())
            .spawn(move || {
                for job in jobs {
                    debug!(script = %job.script, "Executing script");
                    if let Err(e) = runner.run(&job.script, &job.vas) {
                        warn!(script = %job.script, "Script execution failed: {}", e);
                    }
                    pending.fetch_sub(1, Ordering::Relaxed);
                }
            });

        match spawned {
            Ok(handle) => self.worker = Some(Worker { queue, handle }),
            Err(e) => warn!("Unable to start script runner thread: {}", e),
        }
    }

    /// Queue a script execution command; returns false for any other command
    pub fn execute(&self, cmd: &Command, vas: &Vas) -> bool {
        let Command::ScriptExecute { script } = cmd else {
            return false;
        };

        let Some(worker) = &self.worker else {
            warn!(script = %script, "No script runner configured, dropping execution request");
            return true;
        };

        let job = ScriptJob {
            script: script.clone(),
            vas: vas.to_str_assignments(),
        };
        self.pending.fetch_add(1, Ordering::Relaxed);
        match worker.queue.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                self.pending.fetch_sub(1, Ordering::Relaxed);
                warn!(
                    script = %job.script,
                    queue_size = self.queue_size,
                    "Script queue full, dropping execution request"
                );
            }
            Err(TrySendError::Disconnected(job)) => {
                self.pending.fetch_sub(1, Ordering::Relaxed);
                warn!(script = %job.script, "Script runner stopped, dropping execution request");
            }
        }
        true
    }

    /// Requests queued or running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// One-line status for the thread listing
    pub fn status(&self) -> String {
        match &self.worker {
            Some(worker) if !worker.handle.is_finished() => {
                format!("script runner is running ({} pending)", self.pending())
            }
            Some(_) => "script runner is NOT running".to_string(),
            None => "no script runner configured".to_string(),
        }
    }

    /// Close the queue without waiting
    ///
    /// The worker finishes the queued requests and exits; its handle is
    /// returned so the caller can decide how long to wait for it.
    pub fn close(&mut self) -> Option<JoinHandle<()>> {
        let Worker { queue, handle } = self.worker.take()?;
        drop(queue);
        Some(handle)
    }

    /// Close the queue and block up to `timeout` for the worker to drain it
    ///
    /// A worker that does not finish in time is detached.
    pub fn shutdown(&mut self, timeout: Duration) {
        let Some(handle) = self.close() else {
            return;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        if handle.is_finished() {
            let _ = handle.join();
            info!("Script runner stopped");
        } else {
            warn!(
                pending = self.pending(),
                "Script runner did not stop within {:?}, detaching it", timeout
            );
        }
    }
}

impl Drop for ScriptExecuteManager {
    fn drop(&mut self) {
        // detached; the worker exits once the queue is drained
        self.close();
    }
}

impl std::fmt::Debug for ScriptExecuteManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptExecuteManager")
            .field("queue_size", &self.queue_size)
            .field("pending", &self.pending())
            .field("running", &self.worker.is_some())
            .finish()
    }
}
