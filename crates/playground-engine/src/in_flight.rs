use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};

/// Result of a finished job together with how long it was outstanding.
#[derive(Debug)]
pub struct Settled<T> {
    pub outcome: Result<T>,
    pub elapsed: Duration,
}

struct InFlight<T> {
    receiver: Receiver<T>,
    handle: Option<JoinHandle<()>>,
    started: Instant,
}

/// Single-slot guard: at most one job runs at a time and a new one can only
/// start after the previous result has been collected with `poll` or `wait`.
pub struct InFlightSlot<T> {
    thread_name: &'static str,
    slot: Option<InFlight<T>>,
}

impl<T: Send + 'static> InFlightSlot<T> {
    pub fn new(thread_name: &'static str) -> Self {
        Self {
            thread_name,
            slot: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_some()
    }

    pub fn start<F>(&mut self, job: F) -> Result<()>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        if self.slot.is_some() {
            bail!("{} already has a request in flight", self.thread_name);
        }
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(self.thread_name.to_string())
            .spawn(move || {
                let _ = tx.send(job());
            })
            .with_context(|| format!("{} thread spawn failed", self.thread_name))?;
        self.slot = Some(InFlight {
            receiver: rx,
            handle: Some(handle),
            started: Instant::now(),
        });
        Ok(())
    }

    /// Non-blocking; `None` while the job is still running or when idle.
    pub fn poll(&mut self) -> Option<Settled<T>> {
        let outcome = match self.slot.as_ref()?.receiver.try_recv() {
            Ok(value) => Ok(value),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(self.worker_lost()),
        };
        self.settle(outcome)
    }

    /// Blocks until the running job finishes; `None` when idle.
    pub fn wait(&mut self) -> Option<Settled<T>> {
        let outcome = match self.slot.as_ref()?.receiver.recv() {
            Ok(value) => Ok(value),
            Err(_) => Err(self.worker_lost()),
        };
        self.settle(outcome)
    }

    fn settle(&mut self, outcome: Result<T>) -> Option<Settled<T>> {
        let mut in_flight = self.slot.take()?;
        if let Some(handle) = in_flight.handle.take() {
            let _ = handle.join();
        }
        Some(Settled {
            outcome,
            elapsed: in_flight.started.elapsed(),
        })
    }

    fn worker_lost(&self) -> anyhow::Error {
        anyhow!("{} worker exited without a reply", self.thread_name)
    }
}
